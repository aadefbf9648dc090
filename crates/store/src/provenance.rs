//! The provenance codec: embedding and extracting generation records.
//!
//! The metadata container is the PNG text-chunk extension point: one
//! `provenance` iTXt chunk holding the record as JSON. Every embed
//! re-encodes the artifact and fully replaces the container, so partial
//! writes cannot occur; merging happens at the JSON level before a
//! record reaches this module. No other code touches the container.

use atelier_core::ProvenanceRecord;

/// Keyword of the text chunk carrying the record.
pub const PROVENANCE_KEYWORD: &str = "provenance";

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Errors from the provenance codec.
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    /// The artifact carries no provenance record. A normal outcome for
    /// externally-produced images; call sites treat it as "no data".
    #[error("Artifact carries no provenance record")]
    Missing,

    /// A record is present but cannot be interpreted.
    #[error("Provenance record is corrupt: {0}")]
    Corrupt(String),

    /// The artifact's pixel data could not be decoded for re-encoding.
    #[error("Failed to decode artifact image: {0}")]
    Image(#[from] image::ImageError),

    /// The PNG container could not be read or written.
    #[error("Artifact container error: {0}")]
    Container(String),
}

/// Embed `record` into an artifact, returning the new artifact bytes.
///
/// Accepts any encoding the `image` crate can decode; the result is
/// always a PNG whose container holds exactly one provenance chunk.
/// Any previously embedded record is replaced.
pub fn embed(image_bytes: &[u8], record: &ProvenanceRecord) -> Result<Vec<u8>, ProvenanceError> {
    let rgba = image::load_from_memory(image_bytes)?.to_rgba8();
    let json = serde_json::to_string(record).map_err(|e| ProvenanceError::Corrupt(e.to_string()))?;

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, rgba.width(), rgba.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .add_itxt_chunk(PROVENANCE_KEYWORD.to_string(), json)
        .map_err(container_error)?;

    let mut writer = encoder.write_header().map_err(container_error)?;
    writer.write_image_data(rgba.as_raw()).map_err(container_error)?;
    writer.finish().map_err(container_error)?;

    Ok(out)
}

/// Extract the provenance record from artifact bytes.
///
/// Returns [`ProvenanceError::Missing`] when the artifact has no
/// container of ours (including non-PNG artifacts) or no provenance
/// chunk, and [`ProvenanceError::Corrupt`] when a chunk is present but
/// not valid JSON.
pub fn decode(artifact: &[u8]) -> Result<ProvenanceRecord, ProvenanceError> {
    if artifact.len() < PNG_SIGNATURE.len() || &artifact[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(ProvenanceError::Missing);
    }

    let decoder = png::Decoder::new(std::io::Cursor::new(artifact));
    let reader = decoder.read_info().map_err(container_error)?;
    let info = reader.info();

    let mut payload: Option<String> = None;
    for chunk in &info.utf8_text {
        if chunk.keyword == PROVENANCE_KEYWORD {
            let text = chunk
                .get_text()
                .map_err(|e| ProvenanceError::Corrupt(e.to_string()))?;
            payload = Some(text);
            break;
        }
    }
    if payload.is_none() {
        // Tolerate records written as plain tEXt by other tooling.
        for chunk in &info.uncompressed_latin1_text {
            if chunk.keyword == PROVENANCE_KEYWORD {
                payload = Some(chunk.text.clone());
                break;
            }
        }
    }

    let payload = payload.ok_or(ProvenanceError::Missing)?;
    serde_json::from_str(&payload).map_err(|e| ProvenanceError::Corrupt(e.to_string()))
}

fn container_error(error: impl std::fmt::Display) -> ProvenanceError {
    ProvenanceError::Container(error.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

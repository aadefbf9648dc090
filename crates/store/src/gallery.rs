//! The gallery index: ordered artifacts plus best-effort provenance.
//!
//! A pure composition of [`ArtifactStore::list`] and the provenance
//! codec. A failure to decode any one entry leaves that entry's record
//! empty; it never aborts the listing.

use std::path::PathBuf;

use atelier_core::ProvenanceRecord;

use crate::artifact::{ArtifactStore, StoreError};
use crate::provenance::{self, ProvenanceError};

/// One gallery row: an artifact path and its decoded record, if any.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub path: PathBuf,
    pub provenance: Option<ProvenanceRecord>,
}

/// Rebuild the gallery from the store's directory.
///
/// Runs the store's encoding-normalization pass first, then lists
/// (newest first) and decodes provenance per entry.
pub fn refresh(store: &ArtifactStore) -> Result<Vec<GalleryEntry>, StoreError> {
    store.normalize()?;

    let mut gallery = Vec::new();
    for entry in store.list()? {
        let record = match store.load(&entry.path) {
            Ok(bytes) => match provenance::decode(&bytes) {
                Ok(record) => Some(record),
                Err(ProvenanceError::Missing) => None,
                Err(error) => {
                    tracing::debug!(
                        path = %entry.path.display(),
                        error = %error,
                        "Ignoring unreadable provenance",
                    );
                    None
                }
            },
            Err(error) => {
                // Raced with an external deletion; the next refresh
                // will drop the entry.
                tracing::warn!(
                    path = %entry.path.display(),
                    error = %error,
                    "Failed to read artifact while building gallery",
                );
                None
            }
        };
        gallery.push(GalleryEntry {
            path: entry.path,
            provenance: record,
        });
    }
    Ok(gallery)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{GenerationRequest, ModelVariant};

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn record_with_seed(seed: u32) -> ProvenanceRecord {
        let mut request = GenerationRequest::new(ModelVariant::Dev, "x");
        request.randomize_seed = false;
        request.seed = Some(seed);
        let properties = request.build_properties().unwrap();
        ProvenanceRecord::from_properties(ModelVariant::Dev, &properties)
    }

    #[test]
    fn entries_with_and_without_provenance_both_appear() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let tagged = provenance::embed(&tiny_png(), &record_with_seed(42)).unwrap();
        store.save("tagged.png", &tagged).unwrap();
        store.save("bare.png", &tiny_png()).unwrap();
        store.save("broken.png", b"\x89PNG\r\n\x1a\ntruncated").unwrap();

        let gallery = refresh(&store).unwrap();
        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.iter().filter(|e| e.provenance.is_some()).count(), 1);
    }

    #[test]
    fn decoded_record_exposes_generation_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let bytes = provenance::embed(&tiny_png(), &record_with_seed(42)).unwrap();
        store.save("img.png", &bytes).unwrap();

        let gallery = refresh(&store).unwrap();
        let record = gallery[0].provenance.as_ref().unwrap();
        assert_eq!(record.prompt, "x");
        assert_eq!(record.model, "dev");
        assert_eq!(record.parameters["seed"], 42);
    }

    #[test]
    fn record_replays_into_an_equivalent_property_map() {
        let record = record_with_seed(42);
        let replayed = record.to_request().unwrap();
        assert!(!replayed.randomize_seed);

        let properties = replayed.build_properties().unwrap();
        assert_eq!(properties["seed"], 42);
        assert_eq!(properties["prompt"], "x");
    }

    #[test]
    fn deletion_reflected_without_separate_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let path = store.save("img.png", &tiny_png()).unwrap();
        assert_eq!(refresh(&store).unwrap().len(), 1);

        store.delete(&path).unwrap();
        assert!(refresh(&store).unwrap().is_empty());
    }
}

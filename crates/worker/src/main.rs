//! Command-line worker: one generation run end to end.
//!
//! Usage: `atelier-worker [--upscale] [--face <path>] <variant> <prompt...>`
//!
//! Dispatches the request, streams per-artifact progress to the log,
//! and finishes with a gallery summary of the output directory.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_core::{GenerationRequest, ModelVariant};
use atelier_pipeline::{PipelineEvent, PipelineRunner};
use atelier_replicate::{BackendAdapter, ReplicateApi, ReplicateBackend};
use atelier_store::{gallery, ArtifactStore};

mod config;

use config::WorkerConfig;

struct Args {
    variant: ModelVariant,
    prompt: String,
    upscale: bool,
    face: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut upscale = false;
    let mut face = None;
    let mut rest = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--upscale" => upscale = true,
            "--face" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--face requires a path"))?;
                face = Some(PathBuf::from(path));
            }
            _ => rest.push(arg),
        }
    }

    if rest.len() < 2 {
        anyhow::bail!("usage: atelier-worker [--upscale] [--face <path>] <variant> <prompt...>");
    }
    let variant = ModelVariant::from_name(&rest[0])?;
    let prompt = rest[1..].join(" ");

    Ok(Args {
        variant,
        prompt,
        upscale,
        face,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=info,atelier_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    let args = parse_args()?;

    let api = ReplicateApi::new(&config.api_url, &config.api_token);
    let backend: Arc<dyn BackendAdapter> = Arc::new(ReplicateBackend::new(api));
    let store = ArtifactStore::new(&config.output_dir);
    let runner = PipelineRunner::new(backend, store.clone());

    let mut request = GenerationRequest::new(args.variant, args.prompt);
    request.upscale = args.upscale;

    tracing::info!(
        variant = %request.variant,
        upscale = request.upscale,
        output_dir = %config.output_dir.display(),
        "Dispatching generation",
    );

    let mut handle = runner.run(request, args.face)?;
    while let Some(event) = handle.events.recv().await {
        match event {
            PipelineEvent::Dispatched { artifact_count } => {
                tracing::info!(artifact_count, "Request accepted");
            }
            PipelineEvent::Stage { index, stage } => {
                tracing::info!(index, stage = %stage, "Artifact stage");
            }
            PipelineEvent::ArtifactFinished { index, outcome } => match &outcome.error {
                None => {
                    tracing::info!(
                        index,
                        path = %outcome.file_path.display(),
                        upscaled = outcome.upscaled,
                        face_swapped = ?outcome.face_swapped,
                        "Artifact ready",
                    );
                }
                Some(error) => {
                    tracing::warn!(
                        index,
                        path = %outcome.file_path.display(),
                        error = %error,
                        "Artifact finished with a failure",
                    );
                }
            },
            PipelineEvent::Completed { report } => {
                tracing::info!(
                    artifacts = report.outcomes.len(),
                    clean = report.fully_succeeded(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Run completed",
                );
                break;
            }
            PipelineEvent::Failed { error } => {
                anyhow::bail!("generation failed: {error}");
            }
        }
    }
    handle.join().await;

    let entries = gallery::refresh(&store)?;
    tracing::info!(
        artifacts = entries.len(),
        with_provenance = entries.iter().filter(|e| e.provenance.is_some()).count(),
        "Gallery refreshed",
    );

    Ok(())
}

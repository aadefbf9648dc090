//! Single-flight orchestration of one generation run.
//!
//! [`PipelineRunner`] owns the single-flight flag and spawns one
//! background task per run. The task dispatches the request, then
//! processes each result location independently: a failure in one
//! artifact never aborts the others, and only a dispatch failure is
//! terminal for the run. The consumer drains the returned event
//! channel; the single-flight flag is released together with the
//! terminal event, so observing it means a new run may start.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use atelier_core::{CoreError, GenerationRequest, ModelVariant, ProvenanceRecord};
use atelier_replicate::{BackendAdapter, BackendError};
use atelier_store::artifact::{generation_file_name, run_timestamp};
use atelier_store::{provenance, ArtifactStore, ProvenanceError, StoreError};

use crate::events::{ArtifactStage, PipelineEvent, RunReport};
use crate::outcome::{GenerationOutcome, StageError};

/// Errors returned synchronously by the runner's entry points.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Another run is active on this runner. Rejected, never queued.
    #[error("A generation run is already active")]
    AlreadyRunning,

    /// Request validation failed before dispatch.
    #[error(transparent)]
    Request(#[from] CoreError),

    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Artifact storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Provenance could not be embedded or read.
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),
}

/// Handle to a spawned run: the ordered event stream plus the task.
#[derive(Debug)]
pub struct RunHandle {
    /// Ordered progress events, ending in exactly one terminal event.
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Wait for the background task itself to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Clears the single-flight flag when dropped.
struct SingleFlight(Arc<AtomicBool>);

impl Drop for SingleFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates generation runs against one backend and one store.
pub struct PipelineRunner {
    backend: Arc<dyn BackendAdapter>,
    store: ArtifactStore,
    running: Arc<AtomicBool>,
}

impl PipelineRunner {
    pub fn new(backend: Arc<dyn BackendAdapter>, store: ArtifactStore) -> Self {
        Self {
            backend,
            store,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start one end-to-end generation run on a background task.
    ///
    /// Validation happens here, synchronously, so a bad request or a
    /// missing reference-face file fails fast with nothing dispatched.
    /// At most one run is active per runner; a second call is rejected
    /// with [`PipelineError::AlreadyRunning`] rather than queued.
    pub fn run(
        &self,
        request: GenerationRequest,
        reference_face: Option<PathBuf>,
    ) -> Result<RunHandle, PipelineError> {
        let properties = request.build_properties()?;
        if let Some(face) = &reference_face {
            if !face.is_file() {
                return Err(CoreError::InputNotFound {
                    path: face.display().to_string(),
                }
                .into());
            }
        }

        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PipelineError::AlreadyRunning)?;
        let guard = SingleFlight(Arc::clone(&self.running));

        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let store = self.store.clone();
        let variant = request.variant;
        let upscale = request.upscale;

        let task = tokio::spawn(run_task(
            backend,
            store,
            variant,
            properties,
            upscale,
            reference_face,
            guard,
            tx,
        ));

        Ok(RunHandle { events: rx, task })
    }

    /// Upscale an existing artifact into a sibling `<stem>_upscaled.png`.
    ///
    /// Provenance is carried over from the source artifact (or started
    /// fresh when the source has none) with `upscaled` set.
    pub async fn upscale_artifact(&self, path: &Path) -> Result<PathBuf, PipelineError> {
        let bytes = self.store.load(path)?;
        let record = carried_record(&bytes);

        let upscaled = self.backend.upscale(&bytes).await?;
        let tagged = provenance::embed(&upscaled, &record.upscaled())?;

        let target = sibling_path(path, |stem| format!("{stem}_upscaled.png"));
        self.store.write(&target, &tagged)?;
        tracing::info!(source = %path.display(), target = %target.display(), "Artifact upscaled");
        Ok(target)
    }

    /// Swap a reference face onto an existing artifact, writing
    /// `face_swapped_<name>.png` beside it.
    pub async fn swap_face_on_artifact(
        &self,
        face: &Path,
        target: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let face_bytes = std::fs::read(face).map_err(|_| CoreError::InputNotFound {
            path: face.display().to_string(),
        })?;
        let target_bytes = self.store.load(target)?;

        let location = self.backend.swap_face(&face_bytes, &target_bytes).await?;
        let swapped = self.backend.fetch(&location).await?;

        let record = carried_record(&target_bytes).face_swapped(true);
        let tagged = provenance::embed(&swapped, &record)?;

        let out = sibling_path(target, |stem| format!("face_swapped_{stem}.png"));
        self.store.write(&out, &tagged)?;
        tracing::info!(source = %target.display(), target = %out.display(), "Face swapped");
        Ok(out)
    }
}

/// The artifact's existing record, or a fresh one when it has none
/// (or an unreadable one).
fn carried_record(artifact: &[u8]) -> ProvenanceRecord {
    provenance::decode(artifact).unwrap_or_default()
}

fn sibling_path(path: &Path, name: impl Fn(&str) -> String) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(name(&stem))
}

// ---------------------------------------------------------------------------
// The background run
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn run_task(
    backend: Arc<dyn BackendAdapter>,
    store: ArtifactStore,
    variant: ModelVariant,
    properties: Map<String, Value>,
    upscale: bool,
    reference_face: Option<PathBuf>,
    guard: SingleFlight,
    tx: mpsc::UnboundedSender<PipelineEvent>,
) {
    let started = Instant::now();

    let locations = match backend.generate(variant, &properties).await {
        Ok(locations) => locations,
        Err(error) => {
            tracing::error!(variant = %variant, error = %error, "Dispatch failed");
            // Release the flag with the terminal event: a consumer that
            // observed it may immediately start the next run.
            drop(guard);
            let _ = tx.send(PipelineEvent::Failed {
                error: error.to_string(),
            });
            return;
        }
    };

    let _ = tx.send(PipelineEvent::Dispatched {
        artifact_count: locations.len(),
    });

    let timestamp = run_timestamp();
    let record = ProvenanceRecord::from_properties(variant, &properties);

    let mut outcomes = Vec::with_capacity(locations.len());
    for (index, location) in locations.iter().enumerate() {
        let file_name = generation_file_name(&timestamp, index, locations.len());
        let outcome = process_artifact(
            backend.as_ref(),
            &store,
            index,
            &file_name,
            location,
            &record,
            upscale,
            reference_face.as_deref(),
            &tx,
        )
        .await;
        let _ = tx.send(PipelineEvent::ArtifactFinished {
            index,
            outcome: outcome.clone(),
        });
        outcomes.push(outcome);
    }

    let report = RunReport {
        outcomes,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        artifacts = report.outcomes.len(),
        clean = report.fully_succeeded(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Run completed",
    );
    drop(guard);
    let _ = tx.send(PipelineEvent::Completed { report });
}

/// Drive one artifact through its stages, recording failures locally.
///
/// Each stage transition is announced on the event channel before the
/// stage runs, so a consumer can render per-artifact progress.
#[allow(clippy::too_many_arguments)]
async fn process_artifact(
    backend: &dyn BackendAdapter,
    store: &ArtifactStore,
    index: usize,
    file_name: &str,
    location: &str,
    record: &ProvenanceRecord,
    upscale: bool,
    reference_face: Option<&Path>,
    tx: &mpsc::UnboundedSender<PipelineEvent>,
) -> GenerationOutcome {
    let path = store.root().join(file_name);
    let mut outcome = GenerationOutcome::new(path.clone());
    let announce = |stage: ArtifactStage| {
        let _ = tx.send(PipelineEvent::Stage { index, stage });
    };

    // Fetch. Failure stops this artifact only.
    announce(ArtifactStage::Fetching);
    let fetched = match backend.fetch(location).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(location, error = %error, "Fetch failed");
            outcome.record_error(StageError::Fetch(error.to_string()));
            return outcome;
        }
    };

    // Persist raw bytes first: an artifact without provenance beats no
    // artifact at all.
    announce(ArtifactStage::Persisting);
    if let Err(error) = store.save(file_name, &fetched) {
        outcome.record_error(StageError::Save(error.to_string()));
        return outcome;
    }

    // Embed the initial record.
    announce(ArtifactStage::EmbeddingProvenance);
    let mut current = match provenance::embed(&fetched, record) {
        Ok(tagged) => match store.write(&path, &tagged) {
            Ok(()) => tagged,
            Err(error) => {
                outcome.record_error(StageError::Save(error.to_string()));
                return outcome;
            }
        },
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "Provenance embed failed");
            outcome.record_error(StageError::Embed(error.to_string()));
            return outcome;
        }
    };
    let mut record = record.clone();

    // Optional upscale, best-effort. Byte replacement and re-embed are
    // one atomic step: nothing touches the disk unless both succeed.
    if upscale {
        announce(ArtifactStage::Upscaling);
        match upscale_stage(backend, &current, &record).await {
            Ok(tagged) => match store.write(&path, &tagged) {
                Ok(()) => {
                    current = tagged;
                    record = record.upscaled();
                    outcome.upscaled = true;
                }
                Err(error) => outcome.record_error(StageError::Save(error.to_string())),
            },
            Err(detail) => {
                tracing::warn!(path = %path.display(), detail, "Upscale failed");
                outcome.record_error(StageError::Upscale(detail));
            }
        }
    }

    // Optional face swap, best-effort, same atomicity.
    if let Some(face) = reference_face {
        announce(ArtifactStage::FaceSwapping);
        match swap_stage(backend, face, &current, &record).await {
            Ok(tagged) => match store.write(&path, &tagged) {
                Ok(()) => {
                    outcome.face_swapped = Some(true);
                }
                Err(error) => {
                    outcome.face_swapped = Some(false);
                    outcome.record_error(StageError::Save(error.to_string()));
                }
            },
            Err(detail) => {
                tracing::warn!(path = %path.display(), detail, "Face swap failed");
                outcome.face_swapped = Some(false);
                outcome.record_error(StageError::FaceSwap(detail));
            }
        }
    }

    outcome
}

/// Upscale + re-embed as one step. Returns the replacement bytes.
async fn upscale_stage(
    backend: &dyn BackendAdapter,
    current: &[u8],
    record: &ProvenanceRecord,
) -> Result<Vec<u8>, String> {
    let upscaled = backend
        .upscale(current)
        .await
        .map_err(|e| e.to_string())?;
    provenance::embed(&upscaled, &record.clone().upscaled()).map_err(|e| e.to_string())
}

/// Face swap + fetch + re-embed as one step.
async fn swap_stage(
    backend: &dyn BackendAdapter,
    face: &Path,
    current: &[u8],
    record: &ProvenanceRecord,
) -> Result<Vec<u8>, String> {
    let face_bytes = std::fs::read(face)
        .map_err(|e| format!("reference face unreadable: {e}"))?;
    let location = backend
        .swap_face(&face_bytes, current)
        .await
        .map_err(|e| e.to_string())?;
    let swapped = backend.fetch(&location).await.map_err(|e| e.to_string())?;
    provenance::embed(&swapped, &record.clone().face_swapped(true)).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::io::Write as _;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    use atelier_core::GenerationRequest;

    const SWAP_LOCATION: &str = "mock://swapped";

    fn png_of_size(side: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(side, side, image::Rgba([5, 5, 5, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[derive(Default)]
    struct MockBackend {
        locations: Vec<String>,
        failing_fetches: HashSet<String>,
        fail_generate: bool,
        fail_upscale: bool,
        fail_swap: bool,
        /// Upscale returns these bytes (a larger PNG unless overridden).
        upscale_bytes: Option<Vec<u8>>,
        /// When set, `generate` blocks until notified.
        hold_generate: Option<Arc<Notify>>,
        generate_calls: AtomicUsize,
    }

    impl MockBackend {
        fn with_locations(locations: &[&str]) -> Self {
            Self {
                locations: locations.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for MockBackend {
        async fn generate(
            &self,
            _variant: ModelVariant,
            _properties: &Map<String, Value>,
        ) -> Result<Vec<String>, BackendError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.hold_generate {
                gate.notified().await;
            }
            if self.fail_generate {
                return Err(BackendError::Protocol("model exploded".into()));
            }
            Ok(self.locations.clone())
        }

        async fn upscale(&self, _image: &[u8]) -> Result<Vec<u8>, BackendError> {
            if self.fail_upscale {
                return Err(BackendError::Protocol("upscaler down".into()));
            }
            Ok(self.upscale_bytes.clone().unwrap_or_else(|| png_of_size(16)))
        }

        async fn swap_face(&self, _face: &[u8], _target: &[u8]) -> Result<String, BackendError> {
            if self.fail_swap {
                return Err(BackendError::Protocol("no face detected".into()));
            }
            Ok(SWAP_LOCATION.to_string())
        }

        async fn fetch(&self, location: &str) -> Result<Vec<u8>, BackendError> {
            if self.failing_fetches.contains(location) {
                return Err(BackendError::Protocol("503 from CDN".into()));
            }
            if location == SWAP_LOCATION {
                return Ok(png_of_size(8));
            }
            Ok(png_of_size(4))
        }
    }

    fn runner_with(backend: MockBackend) -> (PipelineRunner, Arc<MockBackend>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let runner = PipelineRunner::new(
            Arc::clone(&backend) as Arc<dyn BackendAdapter>,
            ArtifactStore::new(dir.path()),
        );
        (runner, backend, dir)
    }

    fn request() -> GenerationRequest {
        let mut request = GenerationRequest::new(ModelVariant::Dev, "a lighthouse in fog");
        request.randomize_seed = false;
        request.seed = Some(42);
        request
    }

    async fn drain(mut handle: RunHandle) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            let terminal = matches!(
                event,
                PipelineEvent::Completed { .. } | PipelineEvent::Failed { .. }
            );
            events.push(event);
            if terminal {
                break;
            }
        }
        handle.join().await;
        events
    }

    fn final_report(events: &[PipelineEvent]) -> &RunReport {
        match events.last().unwrap() {
            PipelineEvent::Completed { report } => report,
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_run_persists_artifact_with_provenance() {
        let (runner, _, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let events = drain(runner.run(request(), None).unwrap()).await;
        assert_matches!(events[0], PipelineEvent::Dispatched { artifact_count: 1 });

        let report = final_report(&events);
        assert!(report.fully_succeeded());
        let outcome = &report.outcomes[0];
        assert!(outcome.file_path.exists());

        let record = provenance::decode(&std::fs::read(&outcome.file_path).unwrap()).unwrap();
        assert_eq!(record.model, "dev");
        assert_eq!(record.prompt, "a lighthouse in fog");
        assert_eq!(record.parameters["seed"], 42);
        assert!(!record.upscaled);
    }

    #[tokio::test]
    async fn single_result_has_no_index_suffix() {
        let (runner, _, _dir) = runner_with(MockBackend::with_locations(&["mock://only"]));
        let events = drain(runner.run(request(), None).unwrap()).await;
        let name = final_report(&events).outcomes[0]
            .file_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("img_"));
        assert!(name.ends_with(".png"));
        // img_<ts>.png with the two timestamp underscores only.
        assert_eq!(name.matches('_').count(), 3);
    }

    #[tokio::test]
    async fn one_failed_fetch_does_not_abort_the_others() {
        let mut backend = MockBackend::with_locations(&["mock://1", "mock://2", "mock://3"]);
        backend.failing_fetches.insert("mock://2".into());
        let (runner, _, _dir) = runner_with(backend);

        let events = drain(runner.run(request(), None).unwrap()).await;
        let report = final_report(&events);

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].is_ok());
        assert_matches!(report.outcomes[1].error, Some(StageError::Fetch(_)));
        assert!(report.outcomes[2].is_ok());
        assert!(!report.outcomes[1].file_path.exists());
        assert!(report.outcomes[0].file_path.exists());
        assert!(report.outcomes[2].file_path.exists());

        // Indexed names for a multi-artifact run.
        let first = report.outcomes[0].file_path.to_string_lossy().into_owned();
        assert!(first.ends_with("_0.png"));
    }

    #[tokio::test]
    async fn dispatch_failure_is_terminal_with_no_artifacts() {
        let mut backend = MockBackend::with_locations(&["mock://a"]);
        backend.fail_generate = true;
        let (runner, _, dir) = runner_with(backend);

        let events = drain(runner.run(request(), None).unwrap()).await;
        assert_eq!(events.len(), 1);
        assert_matches!(&events[0], PipelineEvent::Failed { error } if error.contains("model exploded"));
        assert!(ArtifactStore::new(dir.path()).list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_run_while_active_is_rejected() {
        let gate = Arc::new(Notify::new());
        let mut backend = MockBackend::with_locations(&["mock://a"]);
        backend.hold_generate = Some(Arc::clone(&gate));
        let (runner, backend, _dir) = runner_with(backend);

        let first = runner.run(request(), None).unwrap();
        assert!(runner.is_running());

        let second = runner.run(request(), None);
        assert_matches!(second, Err(PipelineError::AlreadyRunning));

        gate.notify_one();
        drain(first).await;
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 1);
        assert!(!runner.is_running());

        // The runner is reusable once the terminal event landed.
        drain(runner.run(request(), None).unwrap()).await;
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_request_fails_fast_without_spawning() {
        let (runner, backend, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let bad = request().with_option("guidance_rescale", 1.0);
        assert_matches!(
            runner.run(bad, None),
            Err(PipelineError::Request(CoreError::UnknownOption { .. }))
        );
        assert!(!runner.is_running());
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_face_path_fails_fast_without_dispatch() {
        let (runner, backend, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let missing = PathBuf::from("/nonexistent/face.png");
        let error = runner.run(request(), Some(missing)).unwrap_err();
        assert_matches!(
            error,
            PipelineError::Request(CoreError::InputNotFound { .. })
        );
        assert!(!runner.is_running());
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stage_events_follow_processing_order() {
        let (runner, _, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let mut face = tempfile::NamedTempFile::new().unwrap();
        face.write_all(&png_of_size(2)).unwrap();

        let mut req = request();
        req.upscale = true;
        let events = drain(
            runner
                .run(req, Some(face.path().to_path_buf()))
                .unwrap(),
        )
        .await;

        let stages: Vec<ArtifactStage> = events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Stage { index: 0, stage } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                ArtifactStage::Fetching,
                ArtifactStage::Persisting,
                ArtifactStage::EmbeddingProvenance,
                ArtifactStage::Upscaling,
                ArtifactStage::FaceSwapping,
            ]
        );

        // Every stage is announced before the artifact's final report.
        let finished_at = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::ArtifactFinished { .. }))
            .unwrap();
        let last_stage_at = events
            .iter()
            .rposition(|e| matches!(e, PipelineEvent::Stage { .. }))
            .unwrap();
        assert!(last_stage_at < finished_at);
    }

    #[tokio::test]
    async fn skipped_optional_stages_are_not_announced() {
        let (runner, _, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let events = drain(runner.run(request(), None).unwrap()).await;
        let stages: Vec<ArtifactStage> = events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Stage { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                ArtifactStage::Fetching,
                ArtifactStage::Persisting,
                ArtifactStage::EmbeddingProvenance,
            ]
        );
    }

    #[tokio::test]
    async fn upscale_replaces_bytes_and_reembeds() {
        let (runner, _, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let mut req = request();
        req.upscale = true;
        let events = drain(runner.run(req, None).unwrap()).await;
        let outcome = &final_report(&events).outcomes[0];

        assert!(outcome.upscaled);
        assert!(outcome.is_ok());
        let bytes = std::fs::read(&outcome.file_path).unwrap();
        let record = provenance::decode(&bytes).unwrap();
        assert!(record.upscaled);
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 16);
    }

    #[tokio::test]
    async fn upscale_failure_keeps_prior_artifact() {
        let mut backend = MockBackend::with_locations(&["mock://a"]);
        backend.fail_upscale = true;
        let (runner, _, _dir) = runner_with(backend);

        let mut req = request();
        req.upscale = true;
        let events = drain(runner.run(req, None).unwrap()).await;
        let outcome = &final_report(&events).outcomes[0];

        assert!(!outcome.upscaled);
        assert_matches!(outcome.error, Some(StageError::Upscale(_)));
        // The artifact stays at its pre-stage state.
        let bytes = std::fs::read(&outcome.file_path).unwrap();
        assert!(!provenance::decode(&bytes).unwrap().upscaled);
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 4);
    }

    #[tokio::test]
    async fn upscale_embed_failure_keeps_prior_artifact() {
        // Upscale "succeeds" with undecodable bytes, so the re-embed
        // half of the atomic stage fails.
        let mut backend = MockBackend::with_locations(&["mock://a"]);
        backend.upscale_bytes = Some(b"not an image".to_vec());
        let (runner, _, _dir) = runner_with(backend);

        let mut req = request();
        req.upscale = true;
        let events = drain(runner.run(req, None).unwrap()).await;
        let outcome = &final_report(&events).outcomes[0];

        assert!(!outcome.upscaled);
        assert_matches!(outcome.error, Some(StageError::Upscale(_)));
        let bytes = std::fs::read(&outcome.file_path).unwrap();
        assert!(provenance::decode(&bytes).is_ok());
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 4);
    }

    #[tokio::test]
    async fn face_swap_success_marks_and_reembeds() {
        let (runner, _, _dir) = runner_with(MockBackend::with_locations(&["mock://a"]));

        let mut face = tempfile::NamedTempFile::new().unwrap();
        face.write_all(&png_of_size(2)).unwrap();

        let events = drain(
            runner
                .run(request(), Some(face.path().to_path_buf()))
                .unwrap(),
        )
        .await;
        let outcome = &final_report(&events).outcomes[0];

        assert_eq!(outcome.face_swapped, Some(true));
        let bytes = std::fs::read(&outcome.file_path).unwrap();
        let record = provenance::decode(&bytes).unwrap();
        assert_eq!(record.face_swapped, Some(true));
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 8);
    }

    #[tokio::test]
    async fn face_swap_failure_records_the_attempt() {
        let mut backend = MockBackend::with_locations(&["mock://a"]);
        backend.fail_swap = true;
        let (runner, _, _dir) = runner_with(backend);

        let mut face = tempfile::NamedTempFile::new().unwrap();
        face.write_all(&png_of_size(2)).unwrap();

        let events = drain(
            runner
                .run(request(), Some(face.path().to_path_buf()))
                .unwrap(),
        )
        .await;
        let outcome = &final_report(&events).outcomes[0];

        assert_eq!(outcome.face_swapped, Some(false));
        assert_matches!(outcome.error, Some(StageError::FaceSwap(_)));
        // Artifact unchanged; provenance carries no swap flag.
        let record = provenance::decode(&std::fs::read(&outcome.file_path).unwrap()).unwrap();
        assert_eq!(record.face_swapped, None);
    }

    #[tokio::test]
    async fn standalone_upscale_writes_a_sibling() {
        let (runner, _, dir) = runner_with(MockBackend::default());
        let store = ArtifactStore::new(dir.path());

        let record = ProvenanceRecord::from_properties(
            ModelVariant::Pro,
            &request().build_properties().unwrap(),
        );
        let tagged = provenance::embed(&png_of_size(4), &record).unwrap();
        let source = store.save("img_x.png", &tagged).unwrap();

        let target = runner.upscale_artifact(&source).await.unwrap();
        assert!(target.to_string_lossy().ends_with("img_x_upscaled.png"));

        let carried = provenance::decode(&std::fs::read(&target).unwrap()).unwrap();
        assert!(carried.upscaled);
        assert_eq!(carried.prompt, record.prompt);
        // Original untouched.
        assert!(source.exists());
    }

    #[tokio::test]
    async fn standalone_swap_requires_the_face_file() {
        let (runner, _, dir) = runner_with(MockBackend::default());
        let store = ArtifactStore::new(dir.path());
        let target = store.save("img_y.png", &png_of_size(4)).unwrap();

        let missing = Path::new("/nonexistent/face.png");
        let error = runner
            .swap_face_on_artifact(missing, &target)
            .await
            .unwrap_err();
        assert_matches!(
            error,
            PipelineError::Request(CoreError::InputNotFound { .. })
        );
    }

    #[tokio::test]
    async fn standalone_swap_writes_prefixed_sibling() {
        let (runner, _, dir) = runner_with(MockBackend::default());
        let store = ArtifactStore::new(dir.path());

        let mut face = tempfile::NamedTempFile::new().unwrap();
        face.write_all(&png_of_size(2)).unwrap();
        let target = store.save("img_z.png", &png_of_size(4)).unwrap();

        let out = runner
            .swap_face_on_artifact(face.path(), &target)
            .await
            .unwrap();
        assert!(out.to_string_lossy().ends_with("face_swapped_img_z.png"));

        let record = provenance::decode(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(record.face_swapped, Some(true));
    }
}

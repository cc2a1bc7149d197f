//! Session-level operations on top of the orchestrator.

use std::path::Path;
use std::sync::Arc;

use pawsense_media::{FfmpegSource, MediaSource, ModelRegistry};
use pawsense_models::{AnalysisReport, PipelineJob, SessionId};
use pawsense_storage::{LocalSessionStore, SessionStore, SessionSummary};
use tokio::sync::watch;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator::PipelineOrchestrator;

/// Analyzes videos into stored sessions and manages those sessions.
#[derive(Clone)]
pub struct AnalysisProcessor {
    orchestrator: PipelineOrchestrator,
    store: Arc<dyn SessionStore>,
    threshold: f64,
}

impl AnalysisProcessor {
    pub fn new(registry: ModelRegistry, config: &PipelineConfig, store: Arc<dyn SessionStore>) -> Self {
        let orchestrator = PipelineOrchestrator::new(registry, config.weights.clone())
            .with_timeout(config.job_timeout)
            .with_store(Arc::clone(&store));
        Self {
            orchestrator,
            store,
            threshold: config.keyframe_threshold,
        }
    }

    /// Load the configured models and open the local session store.
    pub fn from_config(config: &PipelineConfig) -> WorkerResult<Self> {
        let registry = ModelRegistry::load(&config.models)?;
        let store = Arc::new(LocalSessionStore::new(&config.sessions_dir));
        Ok(Self::new(registry, config, store))
    }

    /// Probe and analyze a video file with the FFmpeg collaborators.
    ///
    /// Configuration is checked before the file is probed, so a bad setup
    /// fails with a config error whatever the state of the input.
    pub async fn analyze_file(
        &self,
        video: &Path,
        threshold: Option<f64>,
        cancel: watch::Receiver<bool>,
    ) -> (PipelineJob, WorkerResult<AnalysisReport>) {
        let mut job = PipelineJob::new(video, threshold.unwrap_or(self.threshold));

        let opened = match self.orchestrator.validate(job.threshold) {
            Ok(()) => FfmpegSource::open(video).await.map_err(WorkerError::from),
            Err(e) => Err(e),
        };
        let source: Arc<dyn MediaSource> = match opened {
            Ok(source) => Arc::new(source),
            Err(err) => {
                job.fail(err.to_failure());
                return (job, Err(err));
            }
        };

        let result = self.run(&mut job, source, cancel).await;
        (job, result)
    }

    /// Run a prepared job against any media source.
    pub async fn run(
        &self,
        job: &mut PipelineJob,
        source: Arc<dyn MediaSource>,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<AnalysisReport> {
        self.orchestrator.run(job, source, cancel).await
    }

    pub async fn load(&self, id: &SessionId) -> WorkerResult<AnalysisReport> {
        Ok(self.store.load(id).await?)
    }

    pub async fn list(&self) -> WorkerResult<Vec<SessionSummary>> {
        Ok(self.store.list().await?)
    }

    pub async fn delete(&self, id: &SessionId) -> WorkerResult<()> {
        self.store.delete(id).await?;
        info!(session_id = %id, "Session removed");
        Ok(())
    }
}

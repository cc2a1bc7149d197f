//! Job orchestration: fan-out to the branches, fan-in, fusion.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use pawsense_media::{MediaSource, ModelRegistry};
use pawsense_storage::SessionStore;
use pawsense_models::{fuse, AnalysisReport, Branch, FusionWeights, JobStage, Modality, PipelineJob};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, Instrument, Span};

use crate::branches::{
    catch_branch_panic, run_audio_branch, run_frame_branch, BranchContext, BranchOutput,
    FrameOutput,
};
use crate::config::validate_pipeline;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Runs analysis jobs against a loaded model registry.
///
/// When a store is attached, the report is saved before the job is marked
/// succeeded; a failed save fails the job.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    registry: ModelRegistry,
    weights: FusionWeights,
    timeout: Option<Duration>,
    store: Option<Arc<dyn SessionStore>>,
}

impl PipelineOrchestrator {
    pub fn new(registry: ModelRegistry, weights: FusionWeights) -> Self {
        Self {
            registry,
            weights,
            timeout: None,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check `threshold` and the fusion weights against the loaded models.
    pub fn validate(&self, threshold: f64) -> WorkerResult<()> {
        validate_pipeline(threshold, &self.weights, self.registry.modalities())
    }

    /// Run one job to a terminal stage.
    ///
    /// On success the job ends `Succeeded` and the report is returned. On any
    /// failure the job ends `Failed` with its [`JobFailure`](pawsense_models::JobFailure)
    /// recorded and the same error is returned. `cancel` flipping to `true`
    /// cancels the job.
    pub async fn run(
        &self,
        job: &mut PipelineJob,
        source: Arc<dyn MediaSource>,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<AnalysisReport> {
        let logger = JobLogger::for_job(job, "analyze");
        let span = logger.create_span();

        let result = self
            .execute(job, source, cancel, &logger)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => logger.log_completion(&format!(
                "session {} dominant {:?} from {} keyframes",
                report.session_id,
                report.dominant().map(|(label, _)| label),
                report.keyframes
            )),
            Err(e) => {
                let failure = e.to_failure();
                logger.log_error(&failure);
                job.fail(failure);
            }
        }
        record_metrics(job);

        result
    }

    async fn execute(
        &self,
        job: &mut PipelineJob,
        source: Arc<dyn MediaSource>,
        mut external_cancel: watch::Receiver<bool>,
        logger: &JobLogger,
    ) -> WorkerResult<AnalysisReport> {
        self.validate(job.threshold)?;
        if *external_cancel.borrow() {
            return Err(WorkerError::Cancelled);
        }

        logger.log_start(&format!(
            "video {} threshold {} modalities {:?}",
            job.video.display(),
            job.threshold,
            self.registry.modalities().collect::<Vec<_>>()
        ));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let mut branches = JoinSet::new();

        if let Some(adapter) = self.registry.get(Modality::Audio) {
            let ctx = BranchContext::new(Branch::Audio, progress_tx.clone(), cancel_rx.clone());
            let source = Arc::clone(&source);
            let span = Span::current();
            branches.spawn_blocking(move || {
                let _entered = span.enter();
                catch_branch_panic(Branch::Audio, || run_audio_branch(source, adapter, ctx))
            });
        }

        let frame_adapters = self.registry.frame_adapters();
        if !frame_adapters.is_empty() {
            let ctx = BranchContext::new(Branch::Frames, progress_tx.clone(), cancel_rx.clone());
            let source = Arc::clone(&source);
            let threshold = job.threshold;
            let span = Span::current();
            branches.spawn_blocking(move || {
                let _entered = span.enter();
                catch_branch_panic(Branch::Frames, || {
                    run_frame_branch(source, frame_adapters, threshold, ctx)
                })
            });
        }
        drop(progress_tx);
        job.advance(JobStage::Extracting);

        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut audio = None;
        let mut frames: Option<FrameOutput> = None;
        let mut external_open = true;

        let outcome: WorkerResult<()> = loop {
            if branches.is_empty() {
                break Ok(());
            }

            tokio::select! {
                biased;

                changed = external_cancel.changed(), if external_open => {
                    match changed {
                        Ok(()) if *external_cancel.borrow() => break Err(WorkerError::Cancelled),
                        Ok(()) => {}
                        Err(_) => external_open = false,
                    }
                }
                _ = &mut deadline => {
                    break Err(WorkerError::Timeout(self.timeout.unwrap_or_default()));
                }
                Some(progress) = progress_rx.recv() => {
                    if job.advance(progress.stage) {
                        logger.log_progress(&format!("{} ({} branch)", progress.stage, progress.branch));
                    }
                }
                Some(joined) = branches.join_next() => {
                    match joined {
                        Ok((branch, Ok(output))) => {
                            debug!(branch = %branch, "Branch finished");
                            match output {
                                BranchOutput::Audio(vector) => audio = Some(vector),
                                BranchOutput::Frames(output) => frames = Some(output),
                            }
                        }
                        Ok((_, Err(e))) => break Err(e),
                        Err(join_error) => break Err(join_error.into()),
                    }
                }
            }
        };

        if let Err(e) = outcome {
            // Running blocking tasks cannot be aborted; they stop at their next
            // cancellation check.
            let _ = cancel_tx.send(true);
            branches.abort_all();
            return Err(e);
        }

        while let Ok(progress) = progress_rx.try_recv() {
            job.advance(progress.stage);
        }
        job.advance(JobStage::Fusing);

        if let Some(vector) = audio {
            job.record_result(Modality::Audio, vector);
        }
        let frames = frames.unwrap_or_default();
        for (modality, vector) in &frames.vectors {
            job.record_result(*modality, vector.clone());
        }
        job.no_signal = frames.no_signal;
        job.keyframes = frames.keyframes;
        if frames.no_signal {
            logger.log_warning("no keyframes extracted; frame modalities use uniform fallback");
        }

        let fused = fuse(&job.results, &self.weights)?;

        let report = AnalysisReport {
            session_id: job.session_id.clone(),
            job_id: job.id.clone(),
            created_at: job.created_at,
            video: job
                .video
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| job.video.display().to_string()),
            threshold: job.threshold,
            weights: self.weights.clone(),
            fused,
            modalities: job.results.clone(),
            timeline: frames.timeline,
            no_signal: frames.no_signal,
            keyframes: frames.keyframes,
        };

        if let Some(store) = &self.store {
            store.save(&report).await?;
        }

        job.advance(JobStage::Succeeded);
        Ok(report)
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("registry", &self.registry)
            .field("weights", &self.weights)
            .field("timeout", &self.timeout)
            .field("persists", &self.store.is_some())
            .finish()
    }
}

fn record_metrics(job: &PipelineJob) {
    metrics::counter!("pawsense_jobs_total", "status" => job.status().as_str()).increment(1);
    if let Some(secs) = job.duration_secs() {
        metrics::histogram!("pawsense_job_duration_seconds").record(secs);
    }
    metrics::counter!("pawsense_keyframes_total").increment(job.keyframes as u64);
    if let Some(failure) = &job.failure {
        metrics::counter!("pawsense_job_failures_total", "kind" => failure.kind.as_str()).increment(1);
    }
}

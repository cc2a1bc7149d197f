//! The two concurrent units of work inside a job.
//!
//! Both branches are plain blocking functions meant for the blocking thread
//! pool. They report stage progress over a channel, poll a cancellation flag
//! between steps (and between frames), and hand back either a complete
//! output or a failure. Neither touches the job itself.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use pawsense_media::{
    preprocess_audio, preprocess_image, Frame, InferenceAdapter, KeyframeExtractor, MediaError,
    MediaResult, MediaSource,
};
use pawsense_models::{
    Branch, EmotionScoreVector, JobStage, KeyframeScores, Modality, ScoreAccumulator,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::WorkerError;

/// Progress report from a running branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchProgress {
    pub branch: Branch,
    pub stage: JobStage,
}

/// What a finished frame branch hands back.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// Mean vector per frame-derived modality
    pub vectors: BTreeMap<Modality, EmotionScoreVector>,
    /// Per-keyframe scores in extraction order
    pub timeline: Vec<KeyframeScores>,
    pub frames_seen: u64,
    pub keyframes: usize,
    /// No keyframe was extracted and `vectors` holds uniform fallbacks
    pub no_signal: bool,
}

/// Successful result of one branch.
#[derive(Debug, Clone)]
pub enum BranchOutput {
    Audio(EmotionScoreVector),
    Frames(FrameOutput),
}

/// Channels a branch uses to talk to the orchestrator.
#[derive(Debug, Clone)]
pub struct BranchContext {
    branch: Branch,
    progress: mpsc::UnboundedSender<BranchProgress>,
    cancel: watch::Receiver<bool>,
}

impl BranchContext {
    pub fn new(
        branch: Branch,
        progress: mpsc::UnboundedSender<BranchProgress>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            branch,
            progress,
            cancel,
        }
    }

    fn report(&self, stage: JobStage) {
        // The orchestrator may already have stopped listening.
        let _ = self.progress.send(BranchProgress {
            branch: self.branch,
            stage,
        });
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn check_cancelled(&self) -> MediaResult<()> {
        if self.is_cancelled() {
            Err(MediaError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn fail(&self, modality: Option<Modality>, error: MediaError) -> WorkerError {
        WorkerError::branch_failed(self.branch, modality, error)
    }
}

/// Demux the audio track, build its feature tensor and score it.
pub fn run_audio_branch(
    source: Arc<dyn MediaSource>,
    adapter: Arc<dyn InferenceAdapter>,
    ctx: BranchContext,
) -> Result<BranchOutput, WorkerError> {
    let modality = adapter.modality();
    let step = |result: MediaResult<()>| result.map_err(|e| ctx.fail(Some(modality), e));

    ctx.report(JobStage::Extracting);
    step(ctx.check_cancelled())?;
    let signal = source
        .load_audio()
        .map_err(|e| ctx.fail(Some(modality), e))?;
    debug!(
        samples = signal.samples.len(),
        sample_rate = signal.sample_rate,
        duration_secs = signal.duration_secs(),
        "Audio demuxed"
    );

    step(ctx.check_cancelled())?;
    ctx.report(JobStage::Preprocessing);
    let tensor = preprocess_audio(&signal, adapter.input_shape())
        .map_err(|e| ctx.fail(Some(modality), e))?;

    step(ctx.check_cancelled())?;
    ctx.report(JobStage::Inferring);
    let vector = adapter
        .score(&tensor)
        .map_err(|e| ctx.fail(Some(modality), e))?;

    info!(modality = %modality, dominant = ?vector.dominant(), "Audio branch finished");
    Ok(BranchOutput::Audio(vector))
}

/// Decode frames, select keyframes and score each keyframe with every
/// frame-derived adapter, averaging per modality.
///
/// Extraction is fully drained before any keyframe is scored. With zero
/// keyframes every adapter contributes a uniform vector over its labels and
/// the output is flagged `no_signal`.
pub fn run_frame_branch(
    source: Arc<dyn MediaSource>,
    adapters: Vec<Arc<dyn InferenceAdapter>>,
    threshold: f64,
    ctx: BranchContext,
) -> Result<BranchOutput, WorkerError> {
    ctx.report(JobStage::Extracting);
    ctx.check_cancelled().map_err(|e| ctx.fail(None, e))?;

    let (keyframes, frames_seen) = extract_keyframes(source.as_ref(), threshold, &ctx)
        .map_err(|e| ctx.fail(None, e))?;
    info!(
        frames_seen,
        keyframes = keyframes.len(),
        threshold,
        "Processed {} frames; saved {} keyframes",
        frames_seen,
        keyframes.len()
    );

    if keyframes.is_empty() {
        warn!("No keyframes extracted, using uniform fallback scores");
        let vectors = adapters
            .iter()
            .map(|a| (a.modality(), EmotionScoreVector::uniform(a.labels())))
            .collect();
        return Ok(BranchOutput::Frames(FrameOutput {
            vectors,
            timeline: Vec::new(),
            frames_seen,
            keyframes: 0,
            no_signal: true,
        }));
    }

    ctx.report(JobStage::Preprocessing);
    let mut accumulators: BTreeMap<Modality, ScoreAccumulator> = adapters
        .iter()
        .map(|a| (a.modality(), ScoreAccumulator::new()))
        .collect();
    let mut timeline = Vec::with_capacity(keyframes.len());
    let mut inferring = false;

    for frame in &keyframes {
        let mut entry = KeyframeScores::new(frame.timestamp_seconds);

        for adapter in &adapters {
            let modality = adapter.modality();
            ctx.check_cancelled()
                .map_err(|e| ctx.fail(Some(modality), e))?;

            let tensor = preprocess_image(&frame.pixels, adapter.input_shape())
                .map_err(|e| ctx.fail(Some(modality), e))?;
            if !inferring {
                ctx.report(JobStage::Inferring);
                inferring = true;
            }
            let vector = adapter
                .score(&tensor)
                .map_err(|e| ctx.fail(Some(modality), e))?;

            if let Some(acc) = accumulators.get_mut(&modality) {
                acc.add(&vector);
            }
            entry.scores.insert(modality, vector);
        }

        timeline.push(entry);
    }

    let vectors = accumulators
        .into_iter()
        .map(|(modality, acc)| (modality, acc.mean()))
        .collect();

    Ok(BranchOutput::Frames(FrameOutput {
        vectors,
        timeline,
        frames_seen,
        keyframes: keyframes.len(),
        no_signal: false,
    }))
}

/// Run a branch body, turning a panic into a failure of that branch.
pub fn catch_branch_panic<F>(branch: Branch, body: F) -> (Branch, Result<BranchOutput, WorkerError>)
where
    F: FnOnce() -> Result<BranchOutput, WorkerError>,
{
    let result = std::panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(WorkerError::BranchPanicked { branch, message })
    });
    (branch, result)
}

fn extract_keyframes(
    source: &dyn MediaSource,
    threshold: f64,
    ctx: &BranchContext,
) -> MediaResult<(Vec<Frame>, u64)> {
    let stream = source.open_frames()?;
    let fps = stream.fps();
    let frames = stream.map(|frame| {
        ctx.check_cancelled()?;
        frame
    });
    let mut extractor = KeyframeExtractor::new(frames, fps, threshold);

    let mut keyframes = Vec::new();
    while let Some(frame) = extractor.next() {
        let frame = frame?;
        debug!(
            index = frame.index,
            timestamp = frame.timestamp_seconds,
            "Keyframe selected"
        );
        keyframes.push(frame);
    }

    Ok((keyframes, extractor.frames_seen()))
}

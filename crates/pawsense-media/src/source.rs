//! Video decoder and audio demuxer collaborators.
//!
//! A [`MediaSource`] hands out a sequential frame stream and the full audio
//! track of one input. The FFmpeg implementation decodes frames as packed
//! RGB24 from a child process pipe and demuxes audio as mono f32le.
//! Both calls block and are meant to run on the blocking thread pool.

use image::{DynamicImage, RgbImage};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind as IoErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaInfo};

/// Mono PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Sequential decoded frames plus the rate they were decoded at.
pub trait FrameStream: Iterator<Item = MediaResult<DynamicImage>> + Send {
    /// Frames per second; 0 or non-finite when unknown.
    fn fps(&self) -> f64;
}

/// Source of frames and audio for one job.
pub trait MediaSource: Send + Sync {
    /// Start decoding from the first frame.
    fn open_frames(&self) -> MediaResult<Box<dyn FrameStream>>;

    /// Load the whole audio track.
    fn load_audio(&self) -> MediaResult<AudioSignal>;
}

/// Packed RGB24 frames read from any byte stream.
pub struct RawVideoStream<R> {
    reader: R,
    width: u32,
    height: u32,
    fps: f64,
    done: bool,
}

impl<R: Read> RawVideoStream<R> {
    pub fn new(reader: R, width: u32, height: u32, fps: f64) -> Self {
        Self {
            reader,
            width,
            height,
            fps,
            done: false,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Fill one frame buffer. `Ok(None)` on a clean end of stream.
    fn read_frame(&mut self) -> MediaResult<Option<Vec<u8>>> {
        let len = self.frame_len();
        if len == 0 {
            return Err(MediaError::shape("zero-area video frames"));
        }

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(MediaError::unreadable(format!("frame read failed: {e}"))),
            }
        }

        match filled {
            0 => Ok(None),
            n if n < len => Err(MediaError::unreadable(format!(
                "truncated frame: {n} of {len} bytes"
            ))),
            _ => Ok(Some(buf)),
        }
    }
}

impl<R: Read> Iterator for RawVideoStream<R> {
    type Item = MediaResult<DynamicImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = match self.read_frame() {
            Ok(None) => {
                self.done = true;
                return None;
            }
            Ok(Some(buf)) => RgbImage::from_raw(self.width, self.height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| MediaError::shape("frame buffer does not match dimensions")),
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl<R: Read + Send> FrameStream for RawVideoStream<R> {
    fn fps(&self) -> f64 {
        self.fps
    }
}

/// Lines of FFmpeg stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Last `limit` lines of `reader`, newline-joined.
fn tail_lines(reader: impl BufRead, limit: usize) -> String {
    let mut tail = VecDeque::with_capacity(limit);
    for line in reader.lines().map_while(Result::ok) {
        if tail.len() == limit {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Drain stderr on its own thread so a chatty decoder never blocks on a full pipe.
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || tail_lines(BufReader::new(stderr), STDERR_TAIL_LINES))
}

/// Frame stream backed by an FFmpeg child process.
///
/// The child is killed when the stream is dropped.
pub struct FfmpegFrameStream {
    child: Child,
    frames: RawVideoStream<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

impl FfmpegFrameStream {
    fn check_exit(&mut self) -> Option<MediaResult<DynamicImage>> {
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => {
                let detail = self
                    .stderr
                    .take()
                    .and_then(|handle| handle.join().ok())
                    .unwrap_or_default();
                Some(Err(MediaError::unreadable(format!(
                    "FFmpeg decode exited with code {:?}: {}",
                    status.code(),
                    detail.trim()
                ))))
            }
            Err(e) => Some(Err(MediaError::unreadable(format!(
                "FFmpeg process error: {e}"
            )))),
        }
    }
}

impl Iterator for FfmpegFrameStream {
    type Item = MediaResult<DynamicImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.frames.next() {
            Some(Ok(frame)) => Some(Ok(frame)),
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                self.check_exit()
            }
        }
    }
}

impl FrameStream for FfmpegFrameStream {
    fn fps(&self) -> f64 {
        self.frames.fps()
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Killing FFmpeg decoder");
            if let Err(e) = self.child.kill() {
                warn!("Failed to kill FFmpeg decoder: {}", e);
            }
            let _ = self.child.wait();
        }
    }
}

/// FFmpeg-backed media source for a local file.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    path: PathBuf,
    info: MediaInfo,
}

impl FfmpegSource {
    /// Probe `path` and build a source for it.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_media(&path).await?;
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            rotation = info.rotation,
            audio_sample_rate = ?info.audio_sample_rate,
            "Probed media source"
        );
        Ok(Self { path, info })
    }

    pub fn with_info(path: impl Into<PathBuf>, info: MediaInfo) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }
}

impl MediaSource for FfmpegSource {
    fn open_frames(&self) -> MediaResult<Box<dyn FrameStream>> {
        // ffmpeg auto-rotates; decode straight to the rotated size
        let (width, height) = self.info.display_dimensions();
        let mut child = FfmpegCommand::rgb24_frames(&self.path, width, height).spawn()?;
        let stderr = child.stderr.take().map(drain_stderr);
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MediaError::unreadable_at(&self.path, "Failed to capture FFmpeg stdout"));
        };

        Ok(Box::new(FfmpegFrameStream {
            child,
            frames: RawVideoStream::new(stdout, width, height, self.info.fps),
            stderr,
            finished: false,
        }))
    }

    fn load_audio(&self) -> MediaResult<AudioSignal> {
        let sample_rate = self
            .info
            .audio_sample_rate
            .ok_or_else(|| MediaError::unreadable_at(&self.path, "No audio stream found"))?;

        let bytes = FfmpegCommand::f32le_mono(&self.path, sample_rate).output()?;

        // 4 bytes per sample, little-endian
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        debug!(
            samples = samples.len(),
            sample_rate,
            "Audio demux complete"
        );

        Ok(AudioSignal::new(samples, sample_rate))
    }
}

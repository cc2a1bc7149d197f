//! Media side of the PawSense pipeline.
//!
//! This crate provides:
//! - FFmpeg/FFprobe collaborators for frame decoding and audio demuxing
//! - Diff-based keyframe selection
//! - Image and audio feature preprocessing
//! - ONNX Runtime emotion classifiers behind the `InferenceAdapter` trait

pub mod command;
pub mod error;
pub mod inference;
pub mod keyframe;
pub mod preprocess;
pub mod probe;
pub mod source;
pub mod tensor;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use error::{MediaError, MediaResult};
pub use inference::{InferenceAdapter, ModelRegistry, ModelSpec, OnnxAdapter};
pub use keyframe::{Frame, KeyframeExtractor};
pub use preprocess::{preprocess_audio, preprocess_image};
pub use probe::{probe_media, MediaInfo};
pub use source::{AudioSignal, FfmpegSource, FrameStream, MediaSource, RawVideoStream};
pub use tensor::FeatureTensor;

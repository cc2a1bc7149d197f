//! Feature preprocessing.
//!
//! Pure functions turning decoded media into the fixed-shape tensor a model
//! declares. Same input and shape always give the same tensor.

pub mod audio;
pub mod image;
pub mod spectral;

pub use self::audio::{preprocess_audio, TARGET_SAMPLE_RATE};
pub use self::image::{preprocess_image, to_luma};

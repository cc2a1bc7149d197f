//! Diff-based keyframe selection.
//!
//! A frame is kept when its mean absolute luma difference against the last
//! kept frame reaches the threshold. The first frame is always kept.

use image::{DynamicImage, GrayImage};
use tracing::trace;

use crate::error::{MediaError, MediaResult};
use crate::preprocess::image::to_luma;

/// A selected frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the decoded stream
    pub index: u64,
    /// `index / fps`, or 0 when the rate is unknown
    pub timestamp_seconds: f64,
    pub pixels: DynamicImage,
}

/// Lazy keyframe selector over a decoded frame sequence.
pub struct KeyframeExtractor<I> {
    frames: I,
    fps: f64,
    threshold: f64,
    last_emitted: Option<GrayImage>,
    frames_seen: u64,
    emitted: u64,
    done: bool,
}

impl<I> KeyframeExtractor<I>
where
    I: Iterator<Item = MediaResult<DynamicImage>>,
{
    pub fn new(frames: I, fps: f64, threshold: f64) -> Self {
        Self {
            frames,
            fps,
            threshold,
            last_emitted: None,
            frames_seen: 0,
            emitted: 0,
            done: false,
        }
    }

    /// Frames pulled from the underlying stream so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Keyframes yielded so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn timestamp(&self, index: u64) -> f64 {
        if self.fps > 0.0 && self.fps.is_finite() {
            index as f64 / self.fps
        } else {
            0.0
        }
    }
}

impl<I> Iterator for KeyframeExtractor<I>
where
    I: Iterator<Item = MediaResult<DynamicImage>>,
{
    type Item = MediaResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let pixels = match self.frames.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(pixels)) => pixels,
            };

            let index = self.frames_seen;
            self.frames_seen += 1;

            let luma = to_luma(&pixels);
            if let Some(last) = &self.last_emitted {
                if last.dimensions() != luma.dimensions() {
                    self.done = true;
                    return Some(Err(MediaError::shape(format!(
                        "frame {index} is {:?}, previous keyframe is {:?}",
                        luma.dimensions(),
                        last.dimensions()
                    ))));
                }
                let score = mean_abs_diff(last, &luma);
                trace!(index, score, "Frame diff");
                if score < self.threshold {
                    continue;
                }
            }

            self.last_emitted = Some(luma);
            self.emitted += 1;
            return Some(Ok(Frame {
                index,
                timestamp_seconds: self.timestamp(index),
                pixels,
            }));
        }
    }
}

/// Mean absolute pixel difference of two equally sized luma images.
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    let n = a.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    total as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    fn gray(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([value])))
    }

    fn extract(frames: Vec<DynamicImage>, fps: f64, threshold: f64) -> Vec<Frame> {
        KeyframeExtractor::new(frames.into_iter().map(Ok), fps, threshold)
            .collect::<MediaResult<_>>()
            .unwrap()
    }

    #[test]
    fn test_identical_frames_yield_single_keyframe() {
        let frames = vec![gray(90); 10];
        let keyframes = extract(frames, 5.0, 30.0);

        assert_eq!(keyframes.len(), 1);
        assert_eq!(keyframes[0].timestamp_seconds, 0.0);
    }

    #[test]
    fn test_alternating_frames_are_all_kept() {
        let frames: Vec<_> = (0..10).map(|i| gray(if i % 2 == 0 { 100 } else { 150 })).collect();
        let keyframes = extract(frames, 10.0, 30.0);

        assert_eq!(keyframes.len(), 10);
        assert!((keyframes[3].timestamp_seconds - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_first_frame_always_kept() {
        let keyframes = extract(vec![gray(0), gray(255)], 30.0, 1_000.0);
        assert_eq!(keyframes.len(), 1);
        assert_eq!(keyframes[0].index, 0);
    }

    #[test]
    fn test_higher_threshold_never_keeps_more() {
        let ramp: Vec<_> = (0..=20).map(|i| gray(i * 5)).collect();

        let counts: Vec<usize> = [1.0, 5.0, 10.0, 20.0, 30.0, 50.0, 101.0]
            .iter()
            .map(|t| extract(ramp.clone(), 30.0, *t).len())
            .collect();

        assert_eq!(counts[1], 21);
        assert_eq!(counts[2], 11);
        assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
        assert_eq!(*counts.last().unwrap(), 1);
    }

    #[test]
    fn test_unknown_fps_stamps_zero() {
        let frames = vec![gray(0), gray(100), gray(200)];
        for fps in [0.0, f64::NAN, -1.0] {
            let keyframes = extract(frames.clone(), fps, 30.0);
            assert_eq!(keyframes.len(), 3);
            assert!(keyframes.iter().all(|f| f.timestamp_seconds == 0.0));
        }
    }

    #[test]
    fn test_timestamp_uses_source_index() {
        let frames = vec![gray(0), gray(0), gray(0), gray(200)];
        let keyframes = extract(frames, 10.0, 30.0);

        assert_eq!(keyframes.len(), 2);
        assert_eq!(keyframes[1].index, 3);
        assert!((keyframes[1].timestamp_seconds - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let keyframes = extract(Vec::new(), 30.0, 30.0);
        assert!(keyframes.is_empty());
    }

    #[test]
    fn test_dimension_change_is_shape_error() {
        let frames = vec![
            Ok(gray(0)),
            Ok(DynamicImage::ImageRgb8(RgbImage::new(4, 4))),
            Ok(gray(0)),
        ];
        let mut extractor = KeyframeExtractor::new(frames.into_iter(), 30.0, 30.0);

        assert!(extractor.next().unwrap().is_ok());
        assert!(matches!(extractor.next(), Some(Err(MediaError::Shape(_)))));
        assert!(extractor.next().is_none());
    }

    #[test]
    fn test_upstream_error_ends_iteration() {
        let frames = vec![
            Ok(gray(0)),
            Err(MediaError::unreadable("corrupt packet")),
            Ok(gray(200)),
        ];
        let mut extractor = KeyframeExtractor::new(frames.into_iter(), 30.0, 30.0);

        assert!(extractor.next().unwrap().is_ok());
        assert!(matches!(
            extractor.next(),
            Some(Err(MediaError::SourceUnreadable { .. }))
        ));
        assert!(extractor.next().is_none());
        assert_eq!(extractor.frames_seen(), 1);
    }

    #[test]
    fn test_frames_seen_counts_dropped_frames() {
        let frames = vec![gray(50); 6];
        let mut extractor = KeyframeExtractor::new(frames.into_iter().map(Ok), 30.0, 30.0);
        let kept = extractor.by_ref().count();

        assert_eq!(kept, 1);
        assert_eq!(extractor.frames_seen(), 6);
        assert_eq!(extractor.emitted(), 1);
    }

    #[test]
    fn test_mean_abs_diff() {
        let a = GrayImage::from_pixel(2, 2, Luma([100]));
        let b = GrayImage::from_pixel(2, 2, Luma([150]));
        assert_eq!(mean_abs_diff(&a, &b), 50.0);
        assert_eq!(mean_abs_diff(&b, &a), 50.0);
    }
}

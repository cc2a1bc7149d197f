//! Image preprocessing for frame-derived models.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};

use crate::error::{MediaError, MediaResult};
use crate::tensor::FeatureTensor;

/// BT.601 luma (0.299 R + 0.587 G + 0.114 B), rounded.
pub fn to_luma(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    let mut out = GrayImage::new(rgb.width(), rgb.height());
    for (src, dst) in rgb.pixels().zip(out.pixels_mut()) {
        let [r, g, b] = src.0;
        let y = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000;
        *dst = Luma([y as u8]);
    }
    out
}

/// Resize and scale a frame into a `[1, H, W, C]` tensor with values in [0, 1].
pub fn preprocess_image(image: &DynamicImage, input_shape: &[usize]) -> MediaResult<FeatureTensor> {
    let (height, width, channels) = match input_shape {
        [1, h, w, c] if *h > 0 && *w > 0 && (*c == 1 || *c == 3) => (*h, *w, *c),
        other => {
            return Err(MediaError::shape(format!(
                "unsupported image input shape {other:?}, expected [1, H, W, 1|3]"
            )))
        }
    };

    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(MediaError::shape("cannot resize a zero-area image"));
    }

    let target_w = u32::try_from(width).map_err(|_| MediaError::shape("input width too large"))?;
    let target_h = u32::try_from(height).map_err(|_| MediaError::shape("input height too large"))?;

    let resized;
    let image = if (src_w, src_h) == (target_w, target_h) {
        image
    } else {
        resized = image.resize_exact(target_w, target_h, FilterType::Triangle);
        &resized
    };

    let values: Vec<f32> = if channels == 1 {
        to_luma(image)
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect()
    } else {
        // HWC, matching the channels-last models
        image
            .to_rgb8()
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect()
    };

    FeatureTensor::from_shape_vec(input_shape, values)
}

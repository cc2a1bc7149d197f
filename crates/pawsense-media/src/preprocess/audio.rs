//! Audio preprocessing: 16 kHz MFCC or log-mel features, min-max scaled.

use crate::error::{MediaError, MediaResult};
use crate::preprocess::spectral::{
    dct_ii_ortho, min_max_normalize, power_to_db, resample_linear, stft_power, MelBank,
};
use crate::source::AudioSignal;
use crate::tensor::FeatureTensor;

/// Rate every audio model expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const MFCC_MEL_BANDS: usize = 128;
pub const TOP_DB: f32 = 80.0;
pub const NORMALIZE_EPS: f32 = 1e-6;

/// Build the audio tensor for a model declaring `input_shape`.
///
/// `[1, N]` yields N time-averaged MFCCs. `[1, B, T, 1]` yields a B-band
/// log-mel spectrogram of T frames, padded with its floor or truncated.
pub fn preprocess_audio(signal: &AudioSignal, input_shape: &[usize]) -> MediaResult<FeatureTensor> {
    if signal.samples.is_empty() {
        return Err(MediaError::shape("empty audio"));
    }
    if signal.sample_rate == 0 {
        return Err(MediaError::shape("audio sample rate is 0"));
    }

    let samples: Vec<f32> = signal
        .samples
        .iter()
        .map(|s| if s.is_finite() { *s } else { 0.0 })
        .collect();
    let samples = resample_linear(&samples, signal.sample_rate, TARGET_SAMPLE_RATE);

    let mut values = match input_shape {
        [1, n] if *n > 0 => mfcc_mean(&samples, *n)?,
        [1, bands, frames, 1] if *bands > 0 && *frames > 0 => log_mel_patch(&samples, *bands, *frames),
        other => {
            return Err(MediaError::shape(format!(
                "unsupported audio input shape {other:?}, expected [1, N] or [1, B, T, 1]"
            )))
        }
    };

    min_max_normalize(&mut values, NORMALIZE_EPS);
    FeatureTensor::from_shape_vec(input_shape, values)
}

/// Mean over time of the first `n_mfcc` cepstral coefficients.
fn mfcc_mean(samples: &[f32], n_mfcc: usize) -> MediaResult<Vec<f32>> {
    if n_mfcc > MFCC_MEL_BANDS {
        return Err(MediaError::shape(format!(
            "{n_mfcc} MFCCs requested from {MFCC_MEL_BANDS} mel bands"
        )));
    }

    let mut mel = mel_frames(samples, MFCC_MEL_BANDS);
    power_to_db(&mut mel, TOP_DB);

    let mut mean = vec![0.0f64; n_mfcc];
    for frame in &mel {
        for (acc, c) in mean.iter_mut().zip(dct_ii_ortho(frame, n_mfcc)) {
            *acc += f64::from(c);
        }
    }
    let count = mel.len().max(1) as f64;
    Ok(mean.into_iter().map(|v| (v / count) as f32).collect())
}

/// Band-major `[bands][frames]` log-mel patch.
fn log_mel_patch(samples: &[f32], bands: usize, frames: usize) -> Vec<f32> {
    let mut mel = mel_frames(samples, bands);
    power_to_db(&mut mel, TOP_DB);

    let floor = mel
        .iter()
        .flat_map(|f| f.iter())
        .copied()
        .fold(f32::INFINITY, f32::min);
    let floor = if floor.is_finite() { floor } else { 0.0 };

    let mut out = vec![floor; bands * frames];
    for (t, frame) in mel.iter().take(frames).enumerate() {
        for (b, value) in frame.iter().enumerate() {
            out[b * frames + t] = *value;
        }
    }
    out
}

fn mel_frames(samples: &[f32], bands: usize) -> Vec<Vec<f32>> {
    let bank = MelBank::new(TARGET_SAMPLE_RATE, N_FFT, bands);
    stft_power(samples, N_FFT, HOP_LENGTH)
        .iter()
        .map(|power| bank.apply(power))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, seconds: f32) -> AudioSignal {
        let n = (sample_rate as f32 * seconds) as usize;
        let samples = (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioSignal::new(samples, sample_rate)
    }

    #[test]
    fn test_empty_audio_is_rejected() {
        let err = preprocess_audio(&AudioSignal::new(Vec::new(), 16_000), &[1, 40]).unwrap_err();
        assert!(matches!(err, MediaError::Shape(_)));
        assert!(err.to_string().contains("empty audio"));
    }

    #[test]
    fn test_zero_sample_rate_is_rejected() {
        let err = preprocess_audio(&AudioSignal::new(vec![0.1; 100], 0), &[1, 40]).unwrap_err();
        assert!(matches!(err, MediaError::Shape(_)));
    }

    #[test]
    fn test_mfcc_vector_is_normalized() {
        let tensor = preprocess_audio(&tone(440.0, 44_100, 1.0), &[1, 40]).unwrap();

        assert_eq!(tensor.shape(), &[1, 40]);
        let values = tensor.to_vec();
        assert!(values.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
        assert!(values.iter().any(|v| *v == 0.0));
        assert!(values.iter().any(|v| *v > 0.99));
    }

    #[test]
    fn test_silence_stays_finite() {
        let signal = AudioSignal::new(vec![0.0; 16_000], 16_000);
        let tensor = preprocess_audio(&signal, &[1, 40]).unwrap();
        assert!(tensor
            .to_vec()
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_silent_log_mel_is_all_zero() {
        let signal = AudioSignal::new(vec![0.0; 8_000], 16_000);
        let tensor = preprocess_audio(&signal, &[1, 16, 40, 1]).unwrap();
        assert!(tensor.to_vec().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_non_finite_samples_are_sanitized() {
        let mut signal = tone(220.0, 16_000, 0.5);
        signal.samples[10] = f32::NAN;
        signal.samples[20] = f32::INFINITY;

        let tensor = preprocess_audio(&signal, &[1, 20]).unwrap();
        assert!(tensor.to_vec().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_log_mel_pads_short_audio_with_floor() {
        // 4000 samples -> 8 centered frames
        let signal = tone(1_000.0, 16_000, 0.25);
        let tensor = preprocess_audio(&signal, &[1, 64, 20, 1]).unwrap();

        assert_eq!(tensor.shape(), &[1, 64, 20, 1]);
        let view = tensor.view();
        for b in 0..64 {
            for t in 8..20 {
                assert_eq!(view[&[0, b, t, 0][..]], 0.0);
            }
        }
    }

    #[test]
    fn test_log_mel_truncates_long_audio() {
        let tensor = preprocess_audio(&tone(500.0, 22_050, 2.0), &[1, 32, 10, 1]).unwrap();
        assert_eq!(tensor.shape(), &[1, 32, 10, 1]);
    }

    #[test]
    fn test_unsupported_shapes() {
        let signal = tone(440.0, 16_000, 0.2);
        assert!(matches!(
            preprocess_audio(&signal, &[1, 200]),
            Err(MediaError::Shape(_))
        ));
        assert!(matches!(
            preprocess_audio(&signal, &[1, 8, 8]),
            Err(MediaError::Shape(_))
        ));
        assert!(matches!(
            preprocess_audio(&signal, &[2, 40]),
            Err(MediaError::Shape(_))
        ));
    }

    #[test]
    fn test_preprocessing_is_deterministic() {
        let signal = tone(330.0, 48_000, 0.5);
        let a = preprocess_audio(&signal, &[1, 40]).unwrap();
        let b = preprocess_audio(&signal, &[1, 40]).unwrap();
        assert_eq!(a, b);
    }
}

//! Spectral building blocks: resampling, STFT, mel filterbank, dB and DCT.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Linear-interpolation resampler.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64 / ratio).round() as usize).max(1);
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        })
        .collect()
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

/// Reflect-pad by `pad` on both sides, falling back to zeros when the
/// signal is too short to reflect.
fn pad_reflect(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    if n <= pad {
        out.resize(pad, 0.0);
        out.extend_from_slice(samples);
        out.resize(n + 2 * pad, 0.0);
        return out;
    }
    out.extend((1..=pad).rev().map(|i| samples[i]));
    out.extend_from_slice(samples);
    out.extend((0..pad).map(|i| samples[n - 2 - i]));
    out
}

/// Centered short-time power spectra, one `n_fft / 2 + 1` row per frame.
pub fn stft_power(samples: &[f32], n_fft: usize, hop: usize) -> Vec<Vec<f32>> {
    let n_fft = n_fft.max(2);
    let hop = hop.max(1);
    let padded = pad_reflect(samples, n_fft / 2);
    let n_frames = 1 + padded.len().saturating_sub(n_fft) / hop;

    let window = hann_window(n_fft);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    let bins = n_fft / 2 + 1;

    let mut frames = Vec::with_capacity(n_frames);
    for frame in 0..n_frames {
        let start = frame * hop;
        for (i, cell) in buffer.iter_mut().enumerate() {
            let sample = padded.get(start + i).copied().unwrap_or(0.0);
            *cell = Complex::new(sample * window[i], 0.0);
        }
        fft.process(&mut buffer);
        frames.push(buffer[..bins].iter().map(|c| c.norm_sqr()).collect());
    }
    frames
}

fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// Area-normalized triangular mel filterbank on the Slaney mel scale.
pub struct MelBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let sr = f64::from(sample_rate.max(1));
        let bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..bins).map(|k| k as f64 * sr / n_fft as f64).collect();

        let mel_max = hz_to_mel(sr / 2.0);
        let hz_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
                let enorm = 2.0 / (right - left);
                fft_freqs
                    .iter()
                    .enumerate()
                    .filter_map(|(k, f)| {
                        let lower = (f - left) / (center - left);
                        let upper = (right - f) / (right - center);
                        let w = lower.min(upper).max(0.0) * enorm;
                        (w > 0.0).then_some((k, w as f32))
                    })
                    .collect()
            })
            .collect();

        Self { filters }
    }

    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Number of frequency bins each band touches.
    pub fn band_widths(&self) -> Vec<usize> {
        self.filters.iter().map(Vec::len).collect()
    }

    pub fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| {
                filter
                    .iter()
                    .map(|&(bin, w)| power.get(bin).copied().unwrap_or(0.0) * w)
                    .sum()
            })
            .collect()
    }
}

/// Convert power to decibels in place, clipped to `top_db` below the peak.
pub fn power_to_db(frames: &mut [Vec<f32>], top_db: f32) {
    const AMIN: f32 = 1e-10;
    let mut peak = f32::NEG_INFINITY;
    for value in frames.iter_mut().flat_map(|f| f.iter_mut()) {
        *value = 10.0 * value.max(AMIN).log10();
        peak = peak.max(*value);
    }
    let floor = peak - top_db;
    for value in frames.iter_mut().flat_map(|f| f.iter_mut()) {
        *value = value.max(floor);
    }
}

/// First `n_out` coefficients of the orthonormal DCT-II.
pub fn dct_ii_ortho(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }
    let scale_0 = (1.0 / n as f64).sqrt();
    let scale_k = (2.0 / n as f64).sqrt();
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    let angle = std::f64::consts::PI / n as f64 * (i as f64 + 0.5) * k as f64;
                    f64::from(*x) * angle.cos()
                })
                .sum();
            let scale = if k == 0 { scale_0 } else { scale_k };
            (sum * scale) as f32
        })
        .collect()
}

/// Scale values to [0, 1]; constant input maps to zeros.
pub fn min_max_normalize(values: &mut [f32], eps: f32) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !min.is_finite() || !max.is_finite() {
        return;
    }
    let range = max - min + eps;
    for value in values.iter_mut() {
        *value = (*value - min) / range;
    }
}

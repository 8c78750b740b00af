use crate::preprocess::CubicSpline;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Metric column names in canonical output order.
pub const DATA_COLUMNS: [&str; 7] = ["BPM", "RMSSD", "SDNN", "SDSD", "pNN20", "pNN50", "HF"];

/// Grid rate for the interpolated IBI series (Hz).
const IBI_RESAMPLE_HZ: f64 = 5.0;
/// High-frequency band (Hz), half-open.
const HF_BAND: (f64, f64) = (0.15, 0.4);
/// Welch segment cap: 256 samples per Hz of the resampled grid.
const WELCH_MAX_SEGMENT: usize = 1280;

/// Per-window metric values; NaN where undefined.
///
/// Undefined values serialize as JSON null and come back as NaN.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowMetrics {
    #[serde(with = "nullable")]
    pub bpm: f64,
    #[serde(with = "nullable")]
    pub rmssd: f64,
    #[serde(with = "nullable")]
    pub sdnn: f64,
    #[serde(with = "nullable")]
    pub sdsd: f64,
    #[serde(with = "nullable")]
    pub pnn20: f64,
    #[serde(with = "nullable")]
    pub pnn50: f64,
    #[serde(with = "nullable")]
    pub hf: f64,
}

mod nullable {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

impl WindowMetrics {
    /// All-NaN row for windows with too few accepted peaks.
    pub fn undefined() -> Self {
        Self {
            bpm: f64::NAN,
            rmssd: f64::NAN,
            sdnn: f64::NAN,
            sdsd: f64::NAN,
            pnn20: f64::NAN,
            pnn50: f64::NAN,
            hf: f64::NAN,
        }
    }

    /// Values in [`DATA_COLUMNS`] order.
    pub fn values(&self) -> [f64; 7] {
        [
            self.bpm, self.rmssd, self.sdnn, self.sdsd, self.pnn20, self.pnn50, self.hf,
        ]
    }
}

/// Interbeat intervals in milliseconds from strictly increasing peak
/// sample indices.
pub fn interbeat_intervals(indices: &[usize], sample_rate: u32) -> Vec<f64> {
    indices
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * 1000.0 / sample_rate as f64)
        .collect()
}

/// Compute the full metric set for one window's accepted peaks.
///
/// Callers must have gated on the minimum peak count; at least 3 IBIs are
/// assumed here so every time-domain statistic is well defined.
pub fn window_metrics(indices: &[usize], ibi: &[f64], sample_rate: u32) -> WindowMetrics {
    let successive: Vec<f64> = ibi.windows(2).map(|w| w[1] - w[0]).collect();

    let span_s = (indices[indices.len() - 1] - indices[0]) as f64 / sample_rate as f64;
    let bpm = (indices.len() as f64 - 1.0) / span_s * 60.0;

    let rmssd = (successive.iter().map(|d| d * d).sum::<f64>() / successive.len() as f64).sqrt();
    let sdnn = population_sd(ibi);
    let sdsd = population_sd(&successive);
    let pnn20 = fraction_over(&successive, 20.0);
    let pnn50 = fraction_over(&successive, 50.0);
    let hf = high_frequency_power(ibi);

    WindowMetrics {
        bpm,
        rmssd,
        sdnn,
        sdsd,
        pnn20,
        pnn50,
        hf,
    }
}

fn population_sd(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn fraction_over(successive: &[f64], threshold_ms: f64) -> f64 {
    let count = successive
        .iter()
        .filter(|d| d.abs() > threshold_ms)
        .count();
    count as f64 / successive.len() as f64
}

/// Spectral power of the IBI series in the 0.15–0.4 Hz band.
///
/// The IBI sequence is cumulative-summed into beat timestamps, cubic-spline
/// interpolated onto a uniform 5 Hz grid, and passed through a Welch PSD;
/// the band is integrated with the trapezoidal rule. Undefined (NaN) below
/// 4 IBIs or when no frequency bin falls inside the band.
pub fn high_frequency_power(ibi: &[f64]) -> f64 {
    if ibi.len() < 4 {
        return f64::NAN;
    }

    let mut time = Vec::with_capacity(ibi.len());
    let mut acc = 0.0;
    for &interval in ibi {
        acc += interval;
        time.push(acc);
    }

    let spline = CubicSpline::fit(&time, ibi);
    let step = 1000.0 / IBI_RESAMPLE_HZ;
    let start = time[0];
    let end = time[time.len() - 1];
    let mut series = Vec::new();
    let mut k = 0usize;
    loop {
        let t = start + k as f64 * step;
        if t >= end {
            break;
        }
        series.push(spline.eval(t));
        k += 1;
    }
    if series.len() < 2 {
        return f64::NAN;
    }

    let nperseg = series.len().min(WELCH_MAX_SEGMENT);
    let (freqs, psd) = welch_psd(&series, IBI_RESAMPLE_HZ, nperseg);
    let band: Vec<(f64, f64)> = freqs
        .iter()
        .zip(&psd)
        .filter(|(f, _)| **f >= HF_BAND.0 && **f < HF_BAND.1)
        .map(|(&f, &p)| (f, p))
        .collect();
    if band.is_empty() {
        return f64::NAN;
    }
    band.windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) * 0.5)
        .sum()
}

/// Welch power spectral density: Hann window, 50% overlap, per-segment
/// constant detrend, one-sided density scaling.
fn welch_psd(signal: &[f64], fs: f64, nperseg: usize) -> (Vec<f64>, Vec<f64>) {
    let n = signal.len();
    let nperseg = nperseg.min(n).max(2);
    let step = nperseg - nperseg / 2;
    let window = hann(nperseg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * window_power);

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nperseg);
    let mut powers = vec![0.0; nperseg / 2 + 1];
    let mut segments = 0usize;
    let mut pos = 0usize;
    while pos + nperseg <= n {
        let slice = &signal[pos..pos + nperseg];
        let mean = slice.iter().sum::<f64>() / nperseg as f64;
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(&window)
            .map(|(x, w)| (x - mean) * w)
            .collect();
        let mut spectrum = r2c.make_output_vec();
        if r2c.process(&mut frame, &mut spectrum).is_ok() {
            for (k, value) in spectrum.iter().enumerate() {
                let mut p = value.norm_sqr() * scale;
                if k != 0 && !(nperseg % 2 == 0 && k == nperseg / 2) {
                    p *= 2.0;
                }
                powers[k] += p;
            }
            segments += 1;
        }
        pos += step;
    }
    if segments > 0 {
        for p in powers.iter_mut() {
            *p /= segments as f64;
        }
    }
    let freqs = (0..powers.len())
        .map(|k| k as f64 * fs / nperseg as f64)
        .collect();
    (freqs, powers)
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

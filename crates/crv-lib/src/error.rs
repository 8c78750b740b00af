use thiserror::Error;

/// Fatal configuration problems, surfaced before any window is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter 'n_required_peaks' must be at least 3, got {0}")]
    TooFewRequiredPeaks(usize),
    #[error("unknown outlier detection method '{0}' (expected liberal, moderate or conservative)")]
    UnknownOutlierMethod(String),
    #[error("signal contains NaN, first at sample {0}")]
    NanSample(usize),
    #[error("window overlap {overlap}s leaves no forward step at width {width}s")]
    NonPositiveStep { width: f64, overlap: f64 },
    #[error("window width {0}s spans less than one sample")]
    WindowTooNarrow(f64),
    #[error("resample rate {resample} Hz is not a multiple of the sampling rate {sample} Hz")]
    IndivisibleResampleRate { resample: u32, sample: u32 },
    #[error("sample rate must be positive")]
    ZeroSampleRate,
}

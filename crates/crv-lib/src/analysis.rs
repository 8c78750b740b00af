//! The windowing engine: slides a fixed-width window over the signal and
//! runs detection, metrics and outlier classification per window.

use crate::detectors::{detect_beat_peaks, peaks::PeakSet};
use crate::error::ConfigError;
use crate::metrics::hrv::{interbeat_intervals, window_metrics, WindowMetrics};
use crate::metrics::outliers::{is_window_outlier, OutlierPolicy};
use crate::signal::Signal;
use serde::{Deserialize, Serialize};

/// Result column names in canonical output order.
pub const FRAME_COLUMNS: [&str; 10] = [
    "Time", "BPM", "RMSSD", "SDNN", "SDSD", "pNN20", "pNN50", "HF", "Outlier", "Window",
];

/// Peak detection floor used in wave-clustering mode, where the amplitude
/// threshold is relaxed so all candidate waves reach the clusterer.
const CLUSTERING_PROMINENCE: f64 = 5.0;

/// Analysis parameters. [`Default`] gives a 10 s non-overlapping window
/// with the moderate outlier preset.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Window width in seconds.
    pub window_width: f64,
    /// Overlap between consecutive windows in seconds; must leave a
    /// positive forward step.
    pub window_overlap: f64,
    /// Minimum peak prominence on the 0-100 normalized segment scale.
    pub amplitude_threshold: f64,
    /// Minimum separation between accepted peaks, in milliseconds.
    pub distance_threshold_ms: f64,
    /// Windows with this many accepted peaks or fewer yield an undefined
    /// metric row. Must be at least 3.
    pub n_required_peaks: usize,
    /// Separate the dominant wave by clustering peak shapes. Needed for
    /// multi-wave morphologies such as ECG QRS complexes.
    pub wave_clustering: bool,
    /// Seed for the clustering initialisation.
    pub clustering_seed: u64,
    pub outlier_policy: OutlierPolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            window_width: 10.0,
            window_overlap: 0.0,
            amplitude_threshold: 50.0,
            distance_threshold_ms: 250.0,
            n_required_peaks: 3,
            wave_clustering: false,
            clustering_seed: 0,
            outlier_policy: OutlierPolicy::default(),
        }
    }
}

/// Per-window evidence retained for inspection and plotting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDiagnostics {
    /// The normalized segment the detector ran on.
    pub segment: Vec<f64>,
    /// Accepted peaks with their shape properties.
    pub peaks: PeakSet,
}

/// One row of the analysis output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    /// Window start time in seconds from the start of the signal.
    pub time: f64,
    #[serde(flatten)]
    pub metrics: WindowMetrics,
    /// True when any outlier rule fired or too few peaks were found.
    pub outlier: bool,
    pub window: WindowDiagnostics,
}

impl WindowResult {
    /// Scalar values in [`FRAME_COLUMNS`] order, excluding the trailing
    /// diagnostics payload; the outlier flag is rendered as 0.0 / 1.0.
    pub fn scalar_values(&self) -> [f64; 9] {
        let m = self.metrics.values();
        [
            self.time,
            m[0],
            m[1],
            m[2],
            m[3],
            m[4],
            m[5],
            m[6],
            if self.outlier { 1.0 } else { 0.0 },
        ]
    }
}

/// Run the windowed analysis over a whole signal.
///
/// Configuration is validated up front; per-window conditions (too few
/// peaks, implausible statistics) are reported in the row, never as
/// errors. The final windows may cover less than `window_width` of
/// signal; their rows are produced like any other and typically come out
/// flagged.
pub fn analyze(signal: &Signal, options: &AnalysisOptions) -> Result<Vec<WindowResult>, ConfigError> {
    if options.n_required_peaks < 3 {
        return Err(ConfigError::TooFewRequiredPeaks(options.n_required_peaks));
    }
    signal.ensure_nan_free()?;
    let settings = options.outlier_policy.resolve()?;

    let rate = signal.sample_rate as f64;
    let window_samples = (options.window_width * rate).round() as usize;
    if window_samples == 0 {
        return Err(ConfigError::WindowTooNarrow(options.window_width));
    }
    let step = ((options.window_width - options.window_overlap) * rate).round();
    if step < 1.0 {
        return Err(ConfigError::NonPositiveStep {
            width: options.window_width,
            overlap: options.window_overlap,
        });
    }
    let step = step as usize;

    let (distance, min_prominence) = if options.wave_clustering {
        (1, CLUSTERING_PROMINENCE)
    } else {
        let d = ((options.distance_threshold_ms / 1000.0) * rate).round();
        (d.max(1.0) as usize, options.amplitude_threshold)
    };

    let mut results = Vec::new();
    let mut start = 0usize;
    while start < signal.len() {
        let end = (start + window_samples).min(signal.len());
        let segment = minmax_scale(&signal.data[start..end]);
        let peaks = detect_beat_peaks(
            &segment,
            distance,
            min_prominence,
            options.wave_clustering,
            options.clustering_seed,
        );
        let time = start as f64 / rate;

        let (metrics, outlier) = if peaks.len() <= options.n_required_peaks {
            (WindowMetrics::undefined(), true)
        } else {
            let ibi = interbeat_intervals(&peaks.indices, signal.sample_rate);
            let metrics = window_metrics(&peaks.indices, &ibi, signal.sample_rate);
            let outlier = is_window_outlier(
                &peaks,
                &ibi,
                signal.sample_rate,
                options.window_width,
                metrics.bpm,
                metrics.rmssd,
                &settings,
            );
            (metrics, outlier)
        };
        log::debug!(
            "window t={:.2}s: {} peaks, bpm={:.1}, outlier={}",
            time,
            peaks.len(),
            metrics.bpm,
            outlier
        );

        results.push(WindowResult {
            time,
            metrics,
            outlier,
            window: WindowDiagnostics { segment, peaks },
        });
        start += step;
    }
    Ok(results)
}

/// Rescale a segment to the range [0, 100]. A constant segment maps to
/// all zeros.
pub fn minmax_scale(segment: &[f64]) -> Vec<f64> {
    let min = segment.iter().copied().fold(f64::INFINITY, f64::min);
    let max = segment.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if span == 0.0 {
        return vec![0.0; segment.len()];
    }
    segment.iter().map(|x| (x - min) / span * 100.0).collect()
}

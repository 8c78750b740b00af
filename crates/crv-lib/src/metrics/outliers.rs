use crate::detectors::peaks::PeakSet;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Acceptable-range and dispersion thresholds for flagging windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierDetectionSettings {
    /// Acceptable BPM range, exclusive bounds.
    pub bpm_range: (f64, f64),
    /// Acceptable RMSSD range, exclusive bounds.
    pub rmssd_range: (f64, f64),
    /// MAD-unit threshold for peak heights and prominences.
    pub mad_threshold: f64,
    /// MAD-unit threshold for interbeat intervals.
    pub ibi_mad_threshold: f64,
    /// Minimum ratio of the first-to-last-peak span to the window width.
    #[serde(default = "default_min_total_peak_distance")]
    pub min_total_peak_distance: f64,
}

fn default_min_total_peak_distance() -> f64 {
    0.5
}

impl OutlierDetectionSettings {
    /// Built-in presets. "conservative" is the most stringent, "liberal"
    /// the least, "moderate" in between.
    pub fn from_method(method: &str) -> Result<Self, ConfigError> {
        let (bpm_range, rmssd_range, mad) = match method {
            "liberal" => ((20.0, 200.0), (0.0, 300.0), 7.0),
            "moderate" => ((30.0, 190.0), (5.0, 262.0), 5.0),
            "conservative" => ((40.0, 180.0), (10.0, 200.0), 4.0),
            other => return Err(ConfigError::UnknownOutlierMethod(other.to_string())),
        };
        Ok(Self {
            bpm_range,
            rmssd_range,
            mad_threshold: mad,
            ibi_mad_threshold: mad,
            min_total_peak_distance: default_min_total_peak_distance(),
        })
    }
}

/// How the caller names the outlier policy; resolved once at pipeline
/// entry into a canonical settings value.
#[derive(Debug, Clone)]
pub enum OutlierPolicy {
    Preset(String),
    Custom(OutlierDetectionSettings),
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Preset("moderate".into())
    }
}

impl OutlierPolicy {
    pub fn resolve(&self) -> Result<OutlierDetectionSettings, ConfigError> {
        match self {
            OutlierPolicy::Preset(name) => OutlierDetectionSettings::from_method(name),
            OutlierPolicy::Custom(settings) => Ok(*settings),
        }
    }
}

/// Decide whether a window's metrics can be trusted. Any single failing
/// rule flags the whole window.
pub fn is_window_outlier(
    peaks: &PeakSet,
    ibi: &[f64],
    sample_rate: u32,
    window_width: f64,
    bpm: f64,
    rmssd: f64,
    settings: &OutlierDetectionSettings,
) -> bool {
    let bpm_in_range = settings.bpm_range.0 < bpm && bpm < settings.bpm_range.1;
    let rmssd_in_range = settings.rmssd_range.0 < rmssd && rmssd < settings.rmssd_range.1;
    if !bpm_in_range || !rmssd_in_range {
        return true;
    }

    let span = (peaks.indices[peaks.len() - 1] - peaks.indices[0]) as f64 / sample_rate as f64;
    if span < window_width * settings.min_total_peak_distance {
        return true;
    }

    has_mad_outlier(&peaks.prominences, settings.mad_threshold)
        || has_mad_outlier(&peaks.heights, settings.mad_threshold)
        || has_mad_outlier(ibi, settings.ibi_mad_threshold)
}

/// True when any mean-centred value exceeds `threshold` median absolute
/// deviations.
fn has_mad_outlier(values: &[f64], threshold: f64) -> bool {
    if values.is_empty() {
        return false;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let limit = median_abs_deviation(&centered) * threshold;
    centered.iter().any(|v| *v > limit || *v < -limit)
}

fn median_abs_deviation(values: &[f64]) -> f64 {
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_peaks(n: usize, gap: usize) -> PeakSet {
        PeakSet {
            indices: (0..n).map(|i| i * gap).collect(),
            heights: vec![90.0; n],
            prominences: vec![85.0; n],
            widths: vec![10.0; n],
        }
    }

    #[test]
    fn preset_table_is_exact() {
        let moderate = OutlierDetectionSettings::from_method("moderate").unwrap();
        assert_eq!(moderate.bpm_range, (30.0, 190.0));
        assert_eq!(moderate.rmssd_range, (5.0, 262.0));
        assert_eq!(moderate.mad_threshold, 5.0);
        assert_eq!(moderate.ibi_mad_threshold, 5.0);
        assert_eq!(moderate.min_total_peak_distance, 0.5);

        let liberal = OutlierDetectionSettings::from_method("liberal").unwrap();
        assert_eq!(liberal.bpm_range, (20.0, 200.0));
        assert_eq!(liberal.rmssd_range, (0.0, 300.0));
        assert_eq!(liberal.mad_threshold, 7.0);

        let conservative = OutlierDetectionSettings::from_method("conservative").unwrap();
        assert_eq!(conservative.bpm_range, (40.0, 180.0));
        assert_eq!(conservative.rmssd_range, (10.0, 200.0));
        assert_eq!(conservative.ibi_mad_threshold, 4.0);
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        assert!(matches!(
            OutlierDetectionSettings::from_method("strict"),
            Err(ConfigError::UnknownOutlierMethod(_))
        ));
    }

    #[test]
    fn policy_resolves_once() {
        let custom = OutlierDetectionSettings {
            bpm_range: (10.0, 220.0),
            rmssd_range: (0.0, 500.0),
            mad_threshold: 9.0,
            ibi_mad_threshold: 9.0,
            min_total_peak_distance: 0.25,
        };
        assert_eq!(OutlierPolicy::Custom(custom).resolve().unwrap(), custom);
        let preset = OutlierPolicy::default().resolve().unwrap();
        assert_eq!(preset.bpm_range, (30.0, 190.0));
    }

    #[test]
    fn clean_window_passes() {
        let peaks = regular_peaks(10, 100);
        let ibi = vec![1000.0, 1010.0, 990.0, 1000.0, 1010.0, 990.0, 1000.0, 1010.0, 990.0];
        let settings = OutlierDetectionSettings::from_method("moderate").unwrap();
        assert!(!is_window_outlier(
            &peaks, &ibi, 100, 10.0, 60.0, 10.0, &settings
        ));
    }

    #[test]
    fn bpm_out_of_range_flags() {
        let peaks = regular_peaks(10, 100);
        let ibi = vec![1000.0; 9];
        let settings = OutlierDetectionSettings::from_method("moderate").unwrap();
        assert!(is_window_outlier(
            &peaks, &ibi, 100, 10.0, 200.0, 10.0, &settings
        ));
    }

    #[test]
    fn rmssd_out_of_range_flags_even_with_good_bpm() {
        // the corrected rule: either quantity leaving its range flags
        let peaks = regular_peaks(10, 100);
        let ibi = vec![1000.0; 9];
        let settings = OutlierDetectionSettings::from_method("moderate").unwrap();
        assert!(is_window_outlier(
            &peaks, &ibi, 100, 10.0, 60.0, 300.0, &settings
        ));
        // rmssd exactly on the open lower bound is out of range too
        assert!(is_window_outlier(
            &peaks, &ibi, 100, 10.0, 60.0, 5.0, &settings
        ));
    }

    #[test]
    fn clustered_peaks_fail_span_rule() {
        // all peaks inside the first fifth of a 10 s window
        let peaks = regular_peaks(10, 20);
        let ibi = vec![200.0; 9];
        let settings = OutlierDetectionSettings {
            bpm_range: (0.0, 1000.0),
            rmssd_range: (0.0, 1000.0),
            mad_threshold: 100.0,
            ibi_mad_threshold: 100.0,
            min_total_peak_distance: 0.5,
        };
        assert!(is_window_outlier(
            &peaks, &ibi, 100, 10.0, 60.0, 10.0, &settings
        ));
    }

    #[test]
    fn height_spike_trips_mad_rule() {
        let mut peaks = regular_peaks(10, 100);
        peaks.heights[4] = 100.0;
        let ibi = vec![1000.0, 1010.0, 990.0, 1000.0, 1010.0, 990.0, 1000.0, 1010.0, 990.0];
        let settings = OutlierDetectionSettings::from_method("moderate").unwrap();
        assert!(is_window_outlier(
            &peaks, &ibi, 100, 10.0, 60.0, 10.0, &settings
        ));
    }

    #[test]
    fn ibi_jump_trips_its_own_threshold() {
        let peaks = regular_peaks(10, 100);
        let mut ibi = vec![1000.0, 1010.0, 990.0, 1000.0, 1010.0, 990.0, 1000.0, 1010.0];
        ibi.push(1400.0);
        let settings = OutlierDetectionSettings::from_method("moderate").unwrap();
        assert!(is_window_outlier(
            &peaks, &ibi, 100, 10.0, 60.0, 10.0, &settings
        ));
    }

    #[test]
    fn identical_values_never_mad_outliers() {
        assert!(!has_mad_outlier(&[5.0; 8], 5.0));
    }
}

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Uniformly sampled cardiac waveform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Samples, in acquisition order.
    pub data: Vec<f64>,
    /// Sampling rate in Hz.
    pub sample_rate: u32,
}

impl Signal {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate as f64
    }

    /// Reject signals that carry NaN samples, naming the first offender.
    pub fn ensure_nan_free(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        match self.data.iter().position(|x| x.is_nan()) {
            Some(idx) => Err(ConfigError::NanSample(idx)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_rate() {
        let sig = Signal::new(vec![0.0; 500], 250);
        assert!((sig.duration() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nan_scan_reports_first_index() {
        let sig = Signal::new(vec![0.0, 1.0, f64::NAN, f64::NAN], 10);
        match sig.ensure_nan_free() {
            Err(ConfigError::NanSample(idx)) => assert_eq!(idx, 2),
            other => panic!("expected NaN error, got {:?}", other),
        }
    }

    #[test]
    fn zero_rate_rejected() {
        let sig = Signal::new(vec![0.0], 0);
        assert!(sig.ensure_nan_free().is_err());
    }
}

//! CRV: windowed heart-rate and heart-rate-variability analysis.
//!
//! The pipeline slides a fixed-width window over a cardiac waveform (ECG or
//! PPG), detects beat peaks in each window, derives time- and
//! frequency-domain variability metrics, and flags windows whose statistics
//! are physiologically implausible.

pub mod analysis;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod preprocess;
pub mod signal;

pub use analysis::*;
pub use detectors::*;
pub use error::*;
pub use metrics::*;
pub use signal::*;

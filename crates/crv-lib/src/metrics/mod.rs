pub mod hrv;
pub mod outliers;

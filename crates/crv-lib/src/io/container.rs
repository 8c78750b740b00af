//! Native JSON container: a signal together with its sampling rate, so
//! preprocessed data can be stored and analyzed later without re-stating
//! acquisition parameters.

use crate::signal::Signal;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Container {
    version: u32,
    #[serde(flatten)]
    signal: Signal,
}

/// Save a signal to the native container format.
pub fn save_signal(path: &Path, signal: &Signal) -> Result<()> {
    let container = Container {
        version: FORMAT_VERSION,
        signal: signal.clone(),
    };
    let json = serde_json::to_string(&container).context("failed to encode signal")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load a signal previously written with [`save_signal`].
pub fn load_signal(path: &Path) -> Result<Signal> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let container: Container = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid signal container", path.display()))?;
    if container.version > FORMAT_VERSION {
        anyhow::bail!(
            "{} uses container version {}, this build reads up to {}",
            path.display(),
            container.version,
            FORMAT_VERSION
        );
    }
    Ok(container.signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.json");
        let signal = Signal::new(vec![0.25, -1.0, 3.5], 250);
        save_signal(&path, &signal).unwrap();
        let loaded = load_signal(&path).unwrap();
        assert_eq!(loaded.data, signal.data);
        assert_eq!(loaded.sample_rate, 250);
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.json");
        std::fs::write(&path, r#"{"version":99,"data":[1.0],"sample_rate":10}"#).unwrap();
        let err = load_signal(&path).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn garbage_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_signal(&path).is_err());
    }
}

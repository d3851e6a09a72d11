//! Run configuration loaded from JSON.
//!
//! ```json
//! {
//!     "random_seed": 42,
//!     "final_date": "2020-03-20T00:00:00",
//!     "time": { "initial_date": "2020-03-01", "total_days": 20, ... }
//! }
//! ```
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::schedule::TimeConfig;
use crate::SimulatorError;

/// Reads and deserializes a JSON file.
///
/// # Errors
///
/// Returns `SimulatorError::IoError` if the file cannot be read and
/// `SimulatorError::JsonError` if it does not deserialize into `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, SimulatorError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RunConfig {
    pub time: TimeConfig,
    #[serde(default)]
    pub random_seed: u64,
    /// Steps dated after this are not run. Defaults to the end of the schedule.
    #[serde(default)]
    pub final_date: Option<NaiveDateTime>,
}

impl RunConfig {
    /// # Errors
    ///
    /// Returns a `SimulatorError` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<RunConfig, SimulatorError> {
        load_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"{
        "random_seed": 7,
        "time": {
            "initial_date": "2020-03-01",
            "total_days": 2,
            "step_duration": { "weekday": { "0": 24 }, "weekend": { "0": 24 } },
            "step_activities": { "weekday": { "0": ["residence"] }, "weekend": { "0": ["residence"] } }
        }
    }"#;

    #[test]
    fn run_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.time.total_days, 2);
        assert!(config.final_date.is_none());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = RunConfig::from_file(Path::new("does/not/exist.json"));
        assert!(matches!(result, Err(SimulatorError::IoError(_))));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ \"time\": 3 }").unwrap();
        let result = RunConfig::from_file(file.path());
        assert!(matches!(result, Err(SimulatorError::JsonError(_))));
    }
}

//! Configuration for overhead analysis.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationSpec, LoopBody};
use crate::error::{OracleError, Result};
use crate::types::WaitSite;

/// Configuration options for `OverheadOracle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runs required before a standard deviation is reported (default: 2).
    pub min_runs_for_std: usize,

    /// A test case whose slowdown exceeds this multiple of the suite median
    /// is reported as an outlier (default: 2.0).
    pub outlier_multiple: f64,

    /// Wait site used as the blocked-time proxy (default: wait-front).
    ///
    /// The two sites can block at the same time, so exactly one is used for
    /// a whole report.
    pub blocked_site: WaitSite,

    /// Largest counter value accepted as genuine (default: 2^31 - 1).
    ///
    /// Published values above this, or lower than a previous publication on
    /// the same site, are flagged as counter overflow.
    pub expected_max_iterations: u32,

    /// Calibration provider (default: built-in static table).
    pub calibration: CalibrationSpec,

    /// Loop body compiled into the counter variant. Static calibrations
    /// taken for a different listing are rejected.
    pub loop_body: LoopBody,

    /// Zone marking KERNEL_LENGTH on the compute threads (default: `TRISC-KERNEL`).
    pub kernel_zone: String,

    /// File name of per-run device logs (default: `profile_log_device.csv`).
    pub log_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_runs_for_std: 2,
            outlier_multiple: 2.0,
            blocked_site: WaitSite::WaitFront,
            expected_max_iterations: u32::MAX / 2,
            calibration: CalibrationSpec::default(),
            loop_body: LoopBody::counter_poll_loop(),
            kernel_zone: "TRISC-KERNEL".to_string(),
            log_file_name: "profile_log_device.csv".to_string(),
        }
    }
}

impl Config {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| OracleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OVERHEAD_*` environment overrides.
    ///
    /// - `OVERHEAD_MIN_RUNS`
    /// - `OVERHEAD_OUTLIER_MULTIPLE`
    /// - `OVERHEAD_BLOCKED_SITE` (`front` / `back`)
    /// - `OVERHEAD_MAX_ITERATIONS`
    pub fn from_env(mut self) -> Result<Self> {
        if let Some(v) = parse_env::<usize>("OVERHEAD_MIN_RUNS")? {
            self.min_runs_for_std = v;
        }
        if let Some(v) = parse_env::<f64>("OVERHEAD_OUTLIER_MULTIPLE")? {
            self.outlier_multiple = v;
        }
        if let Some(v) = parse_env::<WaitSite>("OVERHEAD_BLOCKED_SITE")? {
            self.blocked_site = v;
        }
        if let Some(v) = parse_env::<u32>("OVERHEAD_MAX_ITERATIONS")? {
            self.expected_max_iterations = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values that make the analysis meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.min_runs_for_std < 2 {
            return Err(OracleError::Config(format!(
                "min_runs_for_std must be at least 2, got {}",
                self.min_runs_for_std
            )));
        }
        if !(self.outlier_multiple.is_finite() && self.outlier_multiple > 1.0) {
            return Err(OracleError::Config(format!(
                "outlier_multiple must be a finite value above 1, got {}",
                self.outlier_multiple
            )));
        }
        if self.kernel_zone.trim().is_empty() {
            return Err(OracleError::Config("kernel_zone must not be empty".to_string()));
        }
        if self.log_file_name.trim().is_empty() {
            return Err(OracleError::Config("log_file_name must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OracleError::Config(format!("{name}={raw}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blocked_site, WaitSite::WaitFront);
        assert_eq!(config.outlier_multiple, 2.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            min_runs_for_std: 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            outlier_multiple: 0.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"outlier_multiple": 3.0, "blocked_site": "reserve_back"}"#).unwrap();
        assert_eq!(config.outlier_multiple, 3.0);
        assert_eq!(config.blocked_site, WaitSite::ReserveBack);
        assert_eq!(config.min_runs_for_std, 2);
        assert_eq!(config.kernel_zone, "TRISC-KERNEL");
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"min_runs_for_std": 3}"#).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.min_runs_for_std, 3);

        fs::write(&path, r#"{"min_runs_for_std": 0}"#).unwrap();
        assert!(matches!(Config::from_json_file(&path), Err(OracleError::Config(_))));
    }
}

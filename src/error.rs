//! Error types.
//!
//! Only [`OracleError`] aborts a pipeline run. Record-scoped problems
//! (malformed logs, undefined statistics, unmatched baselines) are carried as
//! data inside the report so the remaining records are still analysed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline-fatal errors.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The input root is absent or not a directory.
    #[error("input root {path} is not a readable directory")]
    InputRoot {
        /// Root that was requested.
        path: PathBuf,
    },

    /// Filesystem failure outside of a single log record.
    #[error("i/o error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Invalid configuration value or file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Calibration could not be produced.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Failures of a calibration provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    /// No entry for the requested hardware target.
    #[error("no calibration for target {target}")]
    UnknownTarget {
        /// Target that was requested.
        target: String,
    },

    /// The loop body changed since the calibration was taken.
    #[error("calibration for {target} was taken for loop body {expected:#018x}, kernel uses {actual:#018x}")]
    Invalidated {
        /// Target of the calibration.
        target: String,
        /// Fingerprint recorded in the calibration.
        expected: u64,
        /// Fingerprint of the loop body in use.
        actual: u64,
    },

    /// Too few (counter, zone) pairs for a regression.
    #[error("empirical calibration needs at least {required} pairs, got {available}")]
    InsufficientPairs {
        /// Pairs supplied.
        available: usize,
        /// Minimum needed.
        required: usize,
    },

    /// Regression input has no spread in the counter dimension.
    #[error("empirical calibration is degenerate: {0}")]
    Degenerate(String),
}

/// Convenience alias for pipeline results.
pub type Result<T> = std::result::Result<T, OracleError>;

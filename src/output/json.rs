//! JSON serialization for overhead reports.

use std::fs;
use std::path::Path;

use crate::error::{OracleError, Result};
use crate::result::Report;

/// Compact JSON, one line.
pub fn to_json(report: &Report) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string(report)
}

/// Indented JSON as printed by `overhead-oracle analyze --format json`.
pub fn to_json_pretty(report: &Report) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Write a pretty-printed report to `path`.
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    let json = to_json_pretty(report)?;
    fs::write(path, json).map_err(|source| OracleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::make_report;

    #[test]
    fn test_to_json() {
        let report = make_report();
        let json = to_json(&report).unwrap();
        assert!(json.contains("\"variant\":\"profiler\""));
        assert!(json.contains("\"defined\":5.0"), "{json}");
    }

    #[test]
    fn test_to_json_pretty() {
        let report = make_report();
        let json = to_json_pretty(&report).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("comparisons"));
    }

    #[test]
    fn test_write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&make_report(), &path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metadata"]["measurements"], 6);
    }
}

//! Raw log extraction: run tree → flat [`Measurement`] collection.
//!
//! The tree is `<root>/<variant>/<run>/.../<log file>`. Each log is parsed
//! independently; a rejected file, row or kernel is recorded as a
//! [`SkippedRecord`] and extraction continues. Only an unusable root is fatal.

mod device_log;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibration::TargetId;
use crate::config::Config;
use crate::error::{OracleError, Result};
use crate::thread_pool;
use crate::types::{Measurement, RunIndex, TestCase, Variant};

pub use device_log::{
    parse_device_log, DeviceInfo, KernelRecord, MalformedLog, ParseOptions, ParsedLog, MIN_COLUMNS,
};

const REPORTS_DIR: &str = "reports";
const IGNORED_PATH_MARKER: &str = ".logs";

/// A log, row or kernel left out of the measurement set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Variant directory it came from.
    pub variant: Variant,
    /// Run index.
    pub run: RunIndex,
    /// Test case.
    pub test_case: TestCase,
    /// Log file.
    pub path: PathBuf,
    /// Why it was rejected.
    pub reason: MalformedLog,
}

/// Output of [`RawLogExtractor::extract`].
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Accepted measurements, ordered by (variant, run, test case, core, host id).
    pub measurements: Vec<Measurement>,
    /// Rejected records.
    pub skipped: Vec<SkippedRecord>,
    /// Device information per test case, from the first log that carried it.
    pub devices: BTreeMap<TestCase, DeviceInfo>,
    /// Log files read.
    pub files_read: usize,
}

impl Extraction {
    /// Calibration target a test case ran on.
    pub fn target(&self, test_case: &TestCase) -> Option<TargetId> {
        self.devices.get(test_case).and_then(DeviceInfo::target)
    }
}

/// One log discovered in the run tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct LogFile {
    variant: Variant,
    run: RunIndex,
    test_case: TestCase,
    path: PathBuf,
}

/// Parses a run tree into measurements.
#[derive(Debug, Clone, Copy)]
pub struct RawLogExtractor<'a> {
    config: &'a Config,
}

impl<'a> RawLogExtractor<'a> {
    /// Extractor using `config` for zone names and counter bounds.
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Walk `root` and parse every log found.
    pub fn extract(&self, root: &Path) -> Result<Extraction> {
        let logs = self.discover(root)?;
        tracing::info!(root = %root.display(), logs = logs.len(), "discovered device logs");

        #[cfg(feature = "parallel")]
        let outcomes: Vec<_> = thread_pool::install(|| logs.par_iter().map(|log| self.parse_file(log)).collect());
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<_> = thread_pool::install(|| logs.iter().map(|log| self.parse_file(log)).collect());

        let mut extraction = Extraction::default();
        for (log, outcome) in logs.iter().zip(outcomes) {
            let skip = |reason: MalformedLog| SkippedRecord {
                variant: log.variant,
                run: log.run,
                test_case: log.test_case.clone(),
                path: log.path.clone(),
                reason,
            };
            match outcome {
                Ok(parsed) => {
                    extraction.files_read += 1;
                    if parsed.device.arch.is_some() {
                        extraction
                            .devices
                            .entry(log.test_case.clone())
                            .or_insert_with(|| parsed.device.clone());
                    }
                    for issue in parsed.issues {
                        tracing::warn!(path = %log.path.display(), %issue, "skipping record");
                        extraction.skipped.push(skip(issue));
                    }
                    extraction.measurements.extend(parsed.kernels.into_iter().map(|k| Measurement {
                        test_case: log.test_case.clone(),
                        variant: log.variant,
                        run: log.run,
                        core: k.core,
                        host_id: k.host_id,
                        kernel_length_cycles: k.kernel_length_cycles,
                        wait: k.wait,
                    }));
                }
                Err(reason) => {
                    tracing::warn!(path = %log.path.display(), %reason, "skipping log");
                    extraction.skipped.push(skip(reason));
                }
            }
        }

        tracing::info!(
            measurements = extraction.measurements.len(),
            skipped = extraction.skipped.len(),
            "extraction finished"
        );
        Ok(extraction)
    }

    fn parse_file(&self, log: &LogFile) -> std::result::Result<ParsedLog, MalformedLog> {
        tracing::debug!(path = %log.path.display(), variant = %log.variant, run = log.run, "parsing");
        let file = File::open(&log.path).map_err(|e| MalformedLog::Unreadable { message: e.to_string() })?;
        let options = ParseOptions {
            kernel_zone: self.config.kernel_zone.clone(),
            variant: log.variant,
            expected_max_iterations: self.config.expected_max_iterations,
        };
        parse_device_log(file, &options)
    }

    fn discover(&self, root: &Path) -> Result<Vec<LogFile>> {
        if !root.is_dir() {
            return Err(OracleError::InputRoot { path: root.to_path_buf() });
        }

        let mut logs = Vec::new();
        for variant_dir in sorted_dirs(root)? {
            let name = dir_name(&variant_dir);
            let Ok(variant) = name.parse::<Variant>() else {
                tracing::debug!(dir = %variant_dir.display(), "not a variant directory");
                continue;
            };
            for run_dir in sorted_dirs(&variant_dir)? {
                let Ok(run) = dir_name(&run_dir).parse::<RunIndex>() else {
                    tracing::debug!(dir = %run_dir.display(), "not a run directory");
                    continue;
                };
                let mut files = Vec::new();
                collect_logs(&run_dir, &self.config.log_file_name, &mut files)?;
                for path in files {
                    let Ok(relative) = path.strip_prefix(&run_dir) else {
                        continue;
                    };
                    if is_ignored(relative) {
                        continue;
                    }
                    logs.push(LogFile {
                        variant,
                        run,
                        test_case: test_case_for(relative),
                        path,
                    });
                }
            }
        }
        logs.sort();
        Ok(logs)
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let io = |source| OracleError::Io { path: dir.to_path_buf(), source };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io)? {
        paths.push(entry.map_err(io)?.path());
    }
    paths.sort();
    Ok(paths)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_dir_paths(dir)?.into_iter().filter(|p| p.is_dir()).collect())
}

fn collect_logs(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for path in read_dir_paths(dir)? {
        if path.is_dir() {
            collect_logs(&path, file_name, out)?;
        } else if path.file_name().is_some_and(|n| n == file_name) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_ignored(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().contains(IGNORED_PATH_MARKER))
}

/// Test case of a log, from its path relative to the run directory.
fn test_case_for(relative: &Path) -> TestCase {
    let mut parts: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    if parts.first().is_some_and(|p| p == REPORTS_DIR) {
        parts.remove(0);
    }
    if parts.is_empty() {
        TestCase::new(TestCase::DEFAULT)
    } else {
        TestCase::new(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const LOG: &str = "ARCH: grayskull, CHIP_FREQ[MHz]: 1202\n\
PCIe slot, core_x, core_y, RISC processor type, timer_id, time[cycles since reset], data, run host ID, zone name, type, source line, source file\n\
0,1,1,TRISC_0,1,0,0,3,TRISC-KERNEL,ZONE_START,1,k.cpp\n\
0,1,1,TRISC_0,1,800,0,3,TRISC-KERNEL,ZONE_END,1,k.cpp\n";

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_test_case_naming() {
        assert_eq!(test_case_for(Path::new("reports/matmul/profile_log_device.csv")).as_str(), "matmul");
        assert_eq!(test_case_for(Path::new("reports/a/b/profile_log_device.csv")).as_str(), "a/b");
        assert_eq!(test_case_for(Path::new("reports/profile_log_device.csv")).as_str(), "default");
        assert_eq!(test_case_for(Path::new("profile_log_device.csv")).as_str(), "default");
        assert_eq!(test_case_for(Path::new("eltwise/profile_log_device.csv")).as_str(), "eltwise");
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let err = RawLogExtractor::new(&config).extract(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, OracleError::InputRoot { .. }));
    }

    #[test]
    fn test_walks_variants_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        for variant in ["baseline", "profiler"] {
            for run in 0..2 {
                write(dir.path(), &format!("{variant}/{run}/reports/matmul/profile_log_device.csv"), LOG);
            }
        }
        write(dir.path(), "profiler/0/reports/matmul.logs/profile_log_device.csv", LOG);
        write(dir.path(), "scratch/0/reports/profile_log_device.csv", LOG);
        write(dir.path(), "baseline/notes/profile_log_device.csv", LOG);

        let config = Config::default();
        let extraction = RawLogExtractor::new(&config).extract(dir.path()).unwrap();
        assert_eq!(extraction.files_read, 4);
        assert_eq!(extraction.measurements.len(), 4);
        assert!(extraction.skipped.is_empty());
        assert!(extraction.measurements.iter().all(|m| m.kernel_length_cycles == 800));
        assert_eq!(extraction.target(&TestCase::new("matmul")), Some(TargetId::new("grayskull")));
    }

    #[test]
    fn test_bad_log_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "baseline/0/reports/profile_log_device.csv", LOG);
        write(dir.path(), "baseline/1/reports/profile_log_device.csv", "not a log\n");

        let config = Config::default();
        let extraction = RawLogExtractor::new(&config).extract(dir.path()).unwrap();
        assert_eq!(extraction.measurements.len(), 1);
        assert_eq!(extraction.skipped.len(), 1);
        assert_eq!(extraction.skipped[0].run, 1);
        assert_eq!(extraction.skipped[0].reason, MalformedLog::MissingHeader);
    }
}

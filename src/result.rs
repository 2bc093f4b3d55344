//! Report types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::blocked::BlockedReport;
use crate::compare::VariantComparison;
use crate::extract::{DeviceInfo, SkippedRecord};
use crate::types::{TestCase, Variant, WaitSite};

/// Complete result of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// KERNEL_LENGTH statistics per (test case, variant).
    pub statistics: Aggregation,

    /// Comparison of each instrumented variant against baseline.
    pub comparisons: Vec<VariantComparison>,

    /// Blocked-time estimates, present when counter data exists.
    pub blocked: Option<BlockedReport>,

    /// Records left out of the analysis.
    pub skipped: SkippedSummary,

    /// Metadata for debugging.
    pub metadata: Metadata,
}

impl Report {
    /// Comparison for one variant.
    pub fn comparison(&self, variant: Variant) -> Option<&VariantComparison> {
        self.comparisons.iter().find(|c| c.variant == variant)
    }
}

/// Skipped-record counts and details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkippedSummary {
    /// Total records skipped.
    pub total: usize,
    /// Whole files skipped.
    pub files: usize,
    /// Skipped records per variant.
    pub by_variant: BTreeMap<Variant, usize>,
    /// Every skipped record.
    pub records: Vec<SkippedRecord>,
}

impl SkippedSummary {
    /// Summarise a list of skipped records.
    pub fn from_records(records: Vec<SkippedRecord>) -> Self {
        let mut by_variant = BTreeMap::new();
        for r in &records {
            *by_variant.entry(r.variant).or_insert(0) += 1;
        }
        Self {
            total: records.len(),
            files: records.iter().filter(|r| r.reason.is_file_level()).count(),
            by_variant,
            records,
        }
    }
}

/// Where the report came from and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Input root, when the report was built from a run tree.
    pub root: Option<PathBuf>,
    /// Log files read.
    pub files_read: usize,
    /// Measurements accepted.
    pub measurements: usize,
    /// Measurements per variant.
    pub measurements_by_variant: BTreeMap<Variant, usize>,
    /// Device information per test case.
    pub devices: BTreeMap<TestCase, DeviceInfo>,
    /// Wait site used for blocked-time estimates.
    pub blocked_site: WaitSite,
    /// Outlier multiple applied.
    pub outlier_multiple: f64,
    /// Runs required for a standard deviation.
    pub min_runs_for_std: usize,
    /// Wall time of the analysis.
    pub runtime_secs: f64,
}

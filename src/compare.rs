//! Overhead comparison of instrumented variants against baseline.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateStat, Aggregation, GroupAggregate};
use crate::statistics::{median, Statistic, Summary};
use crate::types::{CoreId, TestCase, Variant};

/// Why a slowdown could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Baseline mean is zero.
    ZeroBaseline,
    /// No baseline measurements exist.
    MissingBaseline,
    /// Baseline and variant share no series.
    DisjointCores,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UndefinedReason::ZeroBaseline => "zero baseline",
            UndefinedReason::MissingBaseline => "missing baseline",
            UndefinedReason::DisjointCores => "no common cores",
        })
    }
}

/// Percentage slowdown relative to baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slowdown {
    /// `(variant - baseline) / baseline * 100`.
    Defined(f64),
    /// ComparisonUndefined.
    Undefined(UndefinedReason),
}

impl Slowdown {
    /// The percentage, when defined.
    pub fn pct(&self) -> Option<f64> {
        match self {
            Slowdown::Defined(v) => Some(*v),
            Slowdown::Undefined(_) => None,
        }
    }
}

impl fmt::Display for Slowdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slowdown::Defined(v) => write!(f, "{v:+.2}%"),
            Slowdown::Undefined(reason) => write!(f, "undefined ({reason})"),
        }
    }
}

/// Relative change of `variant` over a non-zero `baseline` in percent.
pub fn slowdown_pct(baseline: f64, variant: f64) -> Slowdown {
    if baseline == 0.0 || !baseline.is_finite() || !variant.is_finite() {
        return Slowdown::Undefined(UndefinedReason::ZeroBaseline);
    }
    Slowdown::Defined((variant - baseline) / baseline * 100.0)
}

/// Per-series comparison of one variant against baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowdownResult {
    /// Workload name.
    pub test_case: TestCase,
    /// Instrumented variant.
    pub variant: Variant,
    /// Core coordinate.
    pub core: CoreId,
    /// Host program id.
    pub host_id: u64,
    /// Baseline mean KERNEL_LENGTH, in cycles.
    pub baseline_mean: Option<f64>,
    /// Variant mean KERNEL_LENGTH, in cycles.
    pub variant_mean: f64,
    /// Mean slowdown.
    pub slowdown: Slowdown,
    /// Relative change of the run-to-run standard deviation in percent.
    pub std_change_pct: Statistic,
}

/// Series present on only one side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMismatch {
    /// Workload name.
    pub test_case: TestCase,
    /// Series only baseline reported.
    pub baseline_only: usize,
    /// Series only the variant reported.
    pub variant_only: usize,
}

/// Whole-test slowdown from the roll-up means over shared series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseSlowdown {
    /// Workload name.
    pub test_case: TestCase,
    /// Series present in both variants.
    pub series_compared: usize,
    /// Mean of baseline series means.
    pub baseline_mean: Option<f64>,
    /// Mean of variant series means.
    pub variant_mean: Option<f64>,
    /// Slowdown of the roll-up mean.
    pub slowdown: Slowdown,
    /// Departs strongly from the suite median.
    pub outlier: bool,
}

/// Comparisons left out of the rollups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionCounts {
    /// Series with a zero baseline mean.
    pub zero_baseline: usize,
    /// Series of test cases without baseline data.
    pub missing_baseline: usize,
    /// Series dropped because only one side reported them.
    pub core_mismatch: usize,
    /// Test cases without a defined slowdown.
    pub undefined_test_cases: usize,
    /// Test cases flagged as outliers.
    pub outliers: usize,
}

/// Full comparison of one instrumented variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantComparison {
    /// Instrumented variant.
    pub variant: Variant,
    /// Per-series results.
    pub per_core: Vec<SlowdownResult>,
    /// Per-test-case results.
    pub test_cases: Vec<TestCaseSlowdown>,
    /// Test cases whose series sets differ.
    pub core_mismatches: Vec<CoreMismatch>,
    /// Rollup of defined per-series slowdowns.
    pub per_core_rollup: Option<Summary>,
    /// Rollup of defined test-case slowdowns, outliers excluded.
    pub aggregate: Option<Summary>,
    /// Rollup of defined test-case slowdowns, outliers included.
    pub aggregate_with_outliers: Option<Summary>,
    /// Rollup of defined per-series standard-deviation changes.
    pub std_change_rollup: Option<Summary>,
    /// Median test-case slowdown the outlier rule compares against.
    pub suite_median: Option<f64>,
    /// Exclusion counts.
    pub excluded: ExclusionCounts,
}

impl VariantComparison {
    /// Test cases flagged as outliers.
    pub fn outliers(&self) -> impl Iterator<Item = &TestCaseSlowdown> {
        self.test_cases.iter().filter(|t| t.outlier)
    }

    /// One-line reading of the main aggregate.
    pub fn interpretation(&self) -> String {
        match &self.aggregate {
            Some(summary) if summary.mean > 0.0 => {
                format!("{} is {:.2}% SLOWER than baseline on average", self.variant, summary.mean)
            }
            Some(summary) if summary.mean < 0.0 => {
                format!("{} is {:.2}% FASTER than baseline on average", self.variant, -summary.mean)
            }
            Some(_) => format!("{} matches baseline on average", self.variant),
            None => format!("{} has no defined comparison against baseline", self.variant),
        }
    }
}

/// Computes instrumentation overhead relative to baseline.
#[derive(Debug, Clone, Copy)]
pub struct OverheadComparator {
    outlier_multiple: f64,
}

impl Default for OverheadComparator {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl OverheadComparator {
    /// Comparator flagging test cases beyond `outlier_multiple` × median.
    pub fn new(outlier_multiple: f64) -> Self {
        Self { outlier_multiple }
    }

    /// Compare one series.
    pub fn compare_stats(&self, baseline: &AggregateStat, variant: &AggregateStat) -> SlowdownResult {
        SlowdownResult {
            test_case: variant.test_case.clone(),
            variant: variant.variant,
            core: variant.core,
            host_id: variant.host_id,
            baseline_mean: Some(baseline.summary.mean),
            variant_mean: variant.summary.mean,
            slowdown: slowdown_pct(baseline.summary.mean, variant.summary.mean),
            std_change_pct: std_change(baseline.summary.std, variant.summary.std),
        }
    }

    /// Compare one test case. `baseline` is `None` when baseline never ran it.
    pub fn compare_groups(
        &self,
        baseline: Option<&GroupAggregate>,
        variant: &GroupAggregate,
    ) -> (Vec<SlowdownResult>, TestCaseSlowdown, Option<CoreMismatch>) {
        let Some(baseline) = baseline else {
            let per_core = variant
                .stats
                .iter()
                .map(|v| SlowdownResult {
                    test_case: v.test_case.clone(),
                    variant: v.variant,
                    core: v.core,
                    host_id: v.host_id,
                    baseline_mean: None,
                    variant_mean: v.summary.mean,
                    slowdown: Slowdown::Undefined(UndefinedReason::MissingBaseline),
                    std_change_pct: Statistic::MissingBaseline,
                })
                .collect();
            let test_case = TestCaseSlowdown {
                test_case: variant.test_case.clone(),
                series_compared: 0,
                baseline_mean: None,
                variant_mean: variant.rollup.as_ref().map(|r| r.mean_of_means),
                slowdown: Slowdown::Undefined(UndefinedReason::MissingBaseline),
                outlier: false,
            };
            return (per_core, test_case, None);
        };

        let key = |s: &AggregateStat| (s.core, s.host_id);
        let baseline_keys: BTreeSet<_> = baseline.stats.iter().map(key).collect();
        let variant_keys: BTreeSet<_> = variant.stats.iter().map(key).collect();

        let per_core: Vec<SlowdownResult> = variant
            .stats
            .iter()
            .filter_map(|v| baseline.stat(v.core, v.host_id).map(|b| self.compare_stats(b, v)))
            .collect();

        let baseline_only = baseline_keys.difference(&variant_keys).count();
        let variant_only = variant_keys.difference(&baseline_keys).count();
        let mismatch = (baseline_only + variant_only > 0).then(|| CoreMismatch {
            test_case: variant.test_case.clone(),
            baseline_only,
            variant_only,
        });

        let defined: Vec<&SlowdownResult> = per_core.iter().filter(|r| r.slowdown.pct().is_some()).collect();
        let test_case = if per_core.is_empty() {
            TestCaseSlowdown {
                test_case: variant.test_case.clone(),
                series_compared: 0,
                baseline_mean: None,
                variant_mean: None,
                slowdown: Slowdown::Undefined(UndefinedReason::DisjointCores),
                outlier: false,
            }
        } else if defined.is_empty() {
            TestCaseSlowdown {
                test_case: variant.test_case.clone(),
                series_compared: 0,
                baseline_mean: None,
                variant_mean: None,
                slowdown: Slowdown::Undefined(UndefinedReason::ZeroBaseline),
                outlier: false,
            }
        } else {
            // Zero-baseline series are excluded from the roll-up means.
            let n = defined.len() as f64;
            let baseline_mean = defined.iter().filter_map(|r| r.baseline_mean).sum::<f64>() / n;
            let variant_mean = defined.iter().map(|r| r.variant_mean).sum::<f64>() / n;
            TestCaseSlowdown {
                test_case: variant.test_case.clone(),
                series_compared: defined.len(),
                baseline_mean: Some(baseline_mean),
                variant_mean: Some(variant_mean),
                slowdown: slowdown_pct(baseline_mean, variant_mean),
                outlier: false,
            }
        };

        (per_core, test_case, mismatch)
    }

    /// Compare every test case of `variant` against baseline.
    pub fn compare(&self, aggregation: &Aggregation, variant: Variant) -> VariantComparison {
        let mut per_core = Vec::new();
        let mut test_cases = Vec::new();
        let mut core_mismatches = Vec::new();
        let mut excluded = ExclusionCounts::default();

        for group in aggregation.variant_groups(variant) {
            let baseline = aggregation.group(&group.test_case, Variant::Baseline);
            let (results, test_case, mismatch) = self.compare_groups(baseline, group);
            if let Some(mismatch) = mismatch {
                tracing::warn!(
                    test_case = %mismatch.test_case,
                    %variant,
                    baseline_only = mismatch.baseline_only,
                    variant_only = mismatch.variant_only,
                    "core sets differ; comparing the intersection"
                );
                excluded.core_mismatch += mismatch.baseline_only + mismatch.variant_only;
                core_mismatches.push(mismatch);
            }
            for r in &results {
                match r.slowdown {
                    Slowdown::Undefined(UndefinedReason::ZeroBaseline) => excluded.zero_baseline += 1,
                    Slowdown::Undefined(UndefinedReason::MissingBaseline) => excluded.missing_baseline += 1,
                    _ => {}
                }
            }
            per_core.extend(results);
            test_cases.push(test_case);
        }

        let defined: Vec<f64> = test_cases.iter().filter_map(|t| t.slowdown.pct()).collect();
        excluded.undefined_test_cases = test_cases.len() - defined.len();
        let suite_median = (!defined.is_empty()).then(|| median(&defined));
        if let Some(m) = suite_median {
            for t in &mut test_cases {
                t.outlier = t.slowdown.pct().is_some_and(|s| is_outlier(s, m, self.outlier_multiple));
            }
        }
        excluded.outliers = test_cases.iter().filter(|t| t.outlier).count();

        let typical: Vec<f64> = test_cases
            .iter()
            .filter(|t| !t.outlier)
            .filter_map(|t| t.slowdown.pct())
            .collect();
        let per_core_values: Vec<f64> = per_core.iter().filter_map(|r| r.slowdown.pct()).collect();
        let std_changes: Vec<f64> = per_core.iter().filter_map(|r| r.std_change_pct.value()).collect();

        VariantComparison {
            variant,
            per_core_rollup: Summary::from_values(&per_core_values, 2),
            aggregate: Summary::from_values(&typical, 2),
            aggregate_with_outliers: Summary::from_values(&defined, 2),
            std_change_rollup: Summary::from_values(&std_changes, 2),
            suite_median,
            per_core,
            test_cases,
            core_mismatches,
            excluded,
        }
    }
}

/// `|s| > k·|m|` for a non-zero median `m`.
pub fn is_outlier(slowdown: f64, suite_median: f64, multiple: f64) -> bool {
    suite_median != 0.0 && slowdown.abs() > multiple * suite_median.abs()
}

fn std_change(baseline: Statistic, variant: Statistic) -> Statistic {
    match (baseline, variant) {
        (Statistic::Value(b), _) if b == 0.0 => Statistic::ZeroDenominator,
        (Statistic::Value(b), Statistic::Value(v)) => Statistic::Value((v - b) / b * 100.0),
        (Statistic::Value(_), undefined) | (undefined, _) => undefined,
    }
}

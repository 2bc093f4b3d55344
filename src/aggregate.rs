//! Run aggregation: per-series summary statistics across repeated runs.
//!
//! Measurements are grouped by (test case, variant) and, inside a group, by
//! series (core, host id). Every statistic is a pure function of the group's
//! value multiset, so results do not depend on the order records arrive in.

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::statistics::{quantile_sorted, Statistic, Summary};
use crate::thread_pool;
use crate::types::{CoreId, Measurement, SeriesKey, TestCase, Variant};

/// KERNEL_LENGTH statistics of one series for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    /// Workload name.
    pub test_case: TestCase,
    /// Instrumentation variant.
    pub variant: Variant,
    /// Core that executed the kernel.
    pub core: CoreId,
    /// Host program id.
    pub host_id: u64,
    /// Summary across runs, in cycles.
    pub summary: Summary,
    /// Coefficient of variation in percent.
    pub std_pct: Statistic,
}

impl AggregateStat {
    /// Series identity.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            test_case: self.test_case.clone(),
            core: self.core,
            host_id: self.host_id,
        }
    }
}

/// Whole-test roll-up over the series of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseRollup {
    /// Series aggregated.
    pub series: usize,
    /// Mean of per-series means.
    pub mean_of_means: f64,
    /// Median of per-series means.
    pub median_of_means: f64,
    /// Mean of the defined per-series standard deviations.
    pub mean_std: Statistic,
    /// Mean of the defined per-series coefficients of variation.
    pub mean_std_pct: Statistic,
}

/// All statistics for one (test case, variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    /// Workload name.
    pub test_case: TestCase,
    /// Instrumentation variant.
    pub variant: Variant,
    /// Distinct runs that contributed.
    pub runs: usize,
    /// Per-series statistics sorted by (core, host id).
    pub stats: Vec<AggregateStat>,
    /// Roll-up across series; `None` when the group is empty.
    pub rollup: Option<TestCaseRollup>,
}

impl GroupAggregate {
    /// Statistics of one series.
    pub fn stat(&self, core: CoreId, host_id: u64) -> Option<&AggregateStat> {
        self.stats
            .binary_search_by(|s| (s.core, s.host_id).cmp(&(core, host_id)))
            .ok()
            .map(|i| &self.stats[i])
    }
}

/// Distribution of per-series coefficients of variation for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdPctRollup {
    /// Instrumentation variant.
    pub variant: Variant,
    /// Series considered.
    pub series: usize,
    /// Series whose mean was zero.
    pub zero_mean: usize,
    /// Series with too few runs.
    pub insufficient_runs: usize,
    /// Mean of defined values.
    pub mean: Option<f64>,
    /// Median of defined values.
    pub median: Option<f64>,
    /// 25th percentile.
    pub p25: Option<f64>,
    /// 75th percentile.
    pub p75: Option<f64>,
    /// 95th percentile.
    pub p95: Option<f64>,
    /// 99th percentile.
    pub p99: Option<f64>,
}

impl StdPctRollup {
    fn from_stats<'a>(variant: Variant, stats: impl Iterator<Item = &'a AggregateStat>) -> Self {
        let mut values = Vec::new();
        let (mut series, mut zero_mean, mut insufficient_runs) = (0, 0, 0);
        for stat in stats {
            series += 1;
            match stat.std_pct {
                Statistic::Value(v) => values.push(v),
                Statistic::ZeroDenominator => zero_mean += 1,
                Statistic::InsufficientRuns { .. } | Statistic::MissingBaseline => insufficient_runs += 1,
            }
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let q = |p: f64| (!values.is_empty()).then(|| quantile_sorted(&values, p));
        Self {
            variant,
            series,
            zero_mean,
            insufficient_runs,
            mean: (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64),
            median: q(0.5),
            p25: q(0.25),
            p75: q(0.75),
            p95: q(0.95),
            p99: q(0.99),
        }
    }
}

/// Output of [`RunAggregator::aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Groups sorted by (test case, variant).
    pub groups: Vec<GroupAggregate>,
    /// Per-variant coefficient-of-variation distribution.
    pub std_pct: Vec<StdPctRollup>,
}

impl Aggregation {
    /// Group for one (test case, variant).
    pub fn group(&self, test_case: &TestCase, variant: Variant) -> Option<&GroupAggregate> {
        self.groups
            .binary_search_by(|g| (&g.test_case, g.variant).cmp(&(test_case, variant)))
            .ok()
            .map(|i| &self.groups[i])
    }

    /// Groups of one variant in test-case order.
    pub fn variant_groups(&self, variant: Variant) -> impl Iterator<Item = &GroupAggregate> {
        self.groups.iter().filter(move |g| g.variant == variant)
    }

    /// Test cases with at least one group.
    pub fn test_cases(&self) -> BTreeSet<&TestCase> {
        self.groups.iter().map(|g| &g.test_case).collect()
    }

    /// Variants with at least one group.
    pub fn variants(&self) -> BTreeSet<Variant> {
        self.groups.iter().map(|g| g.variant).collect()
    }
}

/// Combines repeated-run measurements into [`AggregateStat`]s.
#[derive(Debug, Clone, Copy)]
pub struct RunAggregator {
    min_runs_for_std: usize,
}

impl Default for RunAggregator {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RunAggregator {
    /// Aggregator requiring `min_runs_for_std` runs for a standard deviation.
    pub fn new(min_runs_for_std: usize) -> Self {
        Self {
            min_runs_for_std: min_runs_for_std.max(2),
        }
    }

    /// Aggregate measurements that all belong to one (test case, variant).
    pub fn aggregate_group<'a>(
        &self,
        test_case: &TestCase,
        variant: Variant,
        measurements: impl IntoIterator<Item = &'a Measurement>,
    ) -> GroupAggregate {
        let mut series: BTreeMap<(CoreId, u64), Vec<f64>> = BTreeMap::new();
        let mut runs = BTreeSet::new();
        for m in measurements {
            debug_assert!(m.test_case == *test_case && m.variant == variant);
            runs.insert(m.run);
            series
                .entry((m.core, m.host_id))
                .or_default()
                .push(m.kernel_length_cycles as f64);
        }

        let stats: Vec<AggregateStat> = series
            .into_iter()
            .filter_map(|((core, host_id), values)| {
                let summary = Summary::from_values(&values, self.min_runs_for_std)?;
                Some(AggregateStat {
                    test_case: test_case.clone(),
                    variant,
                    core,
                    host_id,
                    std_pct: summary.std_pct(),
                    summary,
                })
            })
            .collect();

        GroupAggregate {
            test_case: test_case.clone(),
            variant,
            runs: runs.len(),
            rollup: rollup(&stats),
            stats,
        }
    }

    /// Aggregate a whole measurement set. Groups are processed in parallel
    /// when the `parallel` feature is enabled.
    pub fn aggregate(&self, measurements: &[Measurement]) -> Aggregation {
        let mut grouped: BTreeMap<(&TestCase, Variant), Vec<&Measurement>> = BTreeMap::new();
        for m in measurements {
            grouped.entry((&m.test_case, m.variant)).or_default().push(m);
        }
        let grouped: Vec<_> = grouped.into_iter().collect();

        let run = |((test_case, variant), group): &((&TestCase, Variant), Vec<&Measurement>)| {
            self.aggregate_group(test_case, *variant, group.iter().copied())
        };
        #[cfg(feature = "parallel")]
        let groups: Vec<GroupAggregate> = thread_pool::install(|| grouped.par_iter().map(run).collect());
        #[cfg(not(feature = "parallel"))]
        let groups: Vec<GroupAggregate> = thread_pool::install(|| grouped.iter().map(run).collect());

        let std_pct = Variant::ALL
            .into_iter()
            .filter(|v| groups.iter().any(|g| g.variant == *v))
            .map(|v| {
                StdPctRollup::from_stats(
                    v,
                    groups.iter().filter(|g| g.variant == v).flat_map(|g| g.stats.iter()),
                )
            })
            .collect();

        Aggregation { groups, std_pct }
    }
}

fn mean_of_defined(values: impl Iterator<Item = Statistic>) -> Statistic {
    let mut defined = Vec::new();
    let mut first_undefined = None;
    for v in values {
        match v {
            Statistic::Value(x) => defined.push(x),
            other => {
                first_undefined.get_or_insert(other);
            }
        }
    }
    if defined.is_empty() {
        first_undefined.unwrap_or(Statistic::InsufficientRuns { runs: 0, required: 2 })
    } else {
        Statistic::Value(defined.iter().sum::<f64>() / defined.len() as f64)
    }
}

fn rollup(stats: &[AggregateStat]) -> Option<TestCaseRollup> {
    if stats.is_empty() {
        return None;
    }
    let mut means: Vec<f64> = stats.iter().map(|s| s.summary.mean).collect();
    let mean_of_means = means.iter().sum::<f64>() / means.len() as f64;
    means.sort_by(|a, b| a.total_cmp(b));
    Some(TestCaseRollup {
        series: stats.len(),
        mean_of_means,
        median_of_means: quantile_sorted(&means, 0.5),
        mean_std: mean_of_defined(stats.iter().map(|s| s.summary.std)),
        mean_std_pct: mean_of_defined(stats.iter().map(|s| s.std_pct)),
    })
}

//! Summary statistics with an explicit "undefined" state.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::quantile::quantile_sorted;

/// A statistic that may be undefined for the available sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Defined value.
    Value(f64),
    /// Fewer samples than the statistic requires.
    InsufficientRuns {
        /// Samples available.
        runs: usize,
        /// Samples required.
        required: usize,
    },
    /// Division by a zero denominator.
    ZeroDenominator,
    /// No baseline to compare against.
    MissingBaseline,
}

impl Statistic {
    /// The value, when defined.
    pub fn value(&self) -> Option<f64> {
        match self {
            Statistic::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the statistic is defined.
    pub fn is_defined(&self) -> bool {
        matches!(self, Statistic::Value(_))
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Value(v) => write!(f, "{v:.2}"),
            Statistic::InsufficientRuns { runs, required } => write!(f, "undefined (n={runs} < {required})"),
            Statistic::ZeroDenominator => f.write_str("undefined (zero mean)"),
            Statistic::MissingBaseline => f.write_str("undefined (missing baseline)"),
        }
    }
}

/// Descriptive statistics of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std: Statistic,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// 25th percentile.
    pub p25: f64,
    /// 75th percentile.
    pub p75: f64,
}

impl Summary {
    /// Summarise `values`, requiring `min_runs_for_std` samples for a standard
    /// deviation. Returns `None` for an empty or non-finite sample.
    pub fn from_values(values: &[f64], min_runs_for_std: usize) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        // Clamp rounding drift so mean stays within [min, max].
        let mean = mean.clamp(sorted[0], sorted[n - 1]);

        let required = min_runs_for_std.max(2);
        let std = if n < required {
            Statistic::InsufficientRuns { runs: n, required }
        } else {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            Statistic::Value((ss / (n - 1) as f64).sqrt())
        };

        Some(Self {
            count: n,
            mean,
            median: quantile_sorted(&sorted, 0.5),
            std,
            min: sorted[0],
            max: sorted[n - 1],
            p25: quantile_sorted(&sorted, 0.25),
            p75: quantile_sorted(&sorted, 0.75),
        })
    }

    /// Standard deviation as a percentage of the mean.
    pub fn std_pct(&self) -> Statistic {
        match self.std {
            Statistic::Value(std) if self.mean != 0.0 => Statistic::Value(std / self.mean * 100.0),
            Statistic::Value(_) => Statistic::ZeroDenominator,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_basic() {
        let s = Summary::from_values(&[1000.0, 1010.0, 990.0], 2).unwrap();
        assert_eq!(s.count, 3);
        assert!((s.mean - 1000.0).abs() < 1e-9);
        assert_eq!(s.median, 1000.0);
        assert_eq!(s.min, 990.0);
        assert_eq!(s.max, 1010.0);
        assert!((s.std.value().unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(s.p25, 995.0);
        assert_eq!(s.p75, 1005.0);
    }

    #[test]
    fn test_single_run_std_undefined() {
        let s = Summary::from_values(&[5.0], 2).unwrap();
        assert_eq!(s.std, Statistic::InsufficientRuns { runs: 1, required: 2 });
        assert_eq!(s.std_pct(), Statistic::InsufficientRuns { runs: 1, required: 2 });
        assert_eq!(s.mean, 5.0);
    }

    #[test]
    fn test_identical_values_std_zero() {
        let s = Summary::from_values(&[7.0, 7.0, 7.0], 2).unwrap();
        assert_eq!(s.std, Statistic::Value(0.0));
    }

    #[test]
    fn test_std_pct_zero_mean() {
        let s = Summary::from_values(&[0.0, 0.0], 2).unwrap();
        assert_eq!(s.std_pct(), Statistic::ZeroDenominator);
        let s = Summary::from_values(&[90.0, 110.0], 2).unwrap();
        let pct = s.std_pct().value().unwrap();
        assert!((pct - 14.142135623730951).abs() < 1e-9, "{pct}");
    }

    #[test]
    fn test_empty_or_non_finite_rejected() {
        assert!(Summary::from_values(&[], 2).is_none());
        assert!(Summary::from_values(&[1.0, f64::NAN], 2).is_none());
    }

    #[test]
    fn test_order_invariance_exact() {
        let a = [3.1, 1e9, 0.2, 17.0, 5.5, 1e-3];
        let mut b = a;
        b.reverse();
        assert_eq!(Summary::from_values(&a, 2), Summary::from_values(&b, 2));
    }
}

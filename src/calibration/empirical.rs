//! Empirical calibration by regression.
//!
//! The same kernel is run once with a timestamp zone and once with the
//! counter under matched workload. Each matched kernel yields one pair
//! (counter iterations, zone cycles); the least-squares slope of zone cycles
//! on iterations is the calibrated cycles-per-iteration.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Minimum pairs for a fit with a meaningful residual.
pub const MIN_CALIBRATION_PAIRS: usize = 3;

/// One matched observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPair {
    /// Counter iterations from the counter variant.
    pub iterations: f64,
    /// Zone-measured cycles from the profiler variant.
    pub zone_cycles: f64,
}

impl CalibrationPair {
    /// Pair from raw values.
    pub fn new(iterations: f64, zone_cycles: f64) -> Self {
        Self { iterations, zone_cycles }
    }
}

/// Result of a least-squares fit `zone_cycles = slope * iterations + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    /// Cycles per iteration.
    pub slope: f64,
    /// Fixed cycles per kernel not explained by iterations.
    pub intercept: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// Pairs used.
    pub pairs: usize,
}

/// Fit the calibration slope.
pub fn fit_pairs(pairs: &[CalibrationPair]) -> Result<RegressionFit, CalibrationError> {
    if pairs.len() < MIN_CALIBRATION_PAIRS {
        return Err(CalibrationError::InsufficientPairs {
            available: pairs.len(),
            required: MIN_CALIBRATION_PAIRS,
        });
    }
    if pairs.iter().any(|p| !p.iterations.is_finite() || !p.zone_cycles.is_finite()) {
        return Err(CalibrationError::Degenerate("non-finite pair".to_string()));
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.iterations).sum::<f64>() / n;
    let spread = pairs.iter().map(|p| (p.iterations - mean_x).powi(2)).sum::<f64>();
    if spread <= f64::EPSILON {
        return Err(CalibrationError::Degenerate(
            "all pairs have the same iteration count".to_string(),
        ));
    }

    let design = DMatrix::from_fn(pairs.len(), 2, |row, col| {
        if col == 0 {
            pairs[row].iterations
        } else {
            1.0
        }
    });
    let observed = DVector::from_iterator(pairs.len(), pairs.iter().map(|p| p.zone_cycles));

    let coefficients = design
        .clone()
        .svd(true, true)
        .solve(&observed, 1e-12)
        .map_err(|e| CalibrationError::Degenerate(e.to_string()))?;
    let slope = coefficients[0];
    let intercept = coefficients[1];

    let predicted = &design * &coefficients;
    let mean_y = observed.mean();
    let ss_res: f64 = observed.iter().zip(predicted.iter()).map(|(y, p)| (y - p).powi(2)).sum();
    let ss_tot: f64 = observed.iter().map(|y| (y - mean_y).powi(2)).sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };

    Ok(RegressionFit {
        slope,
        intercept,
        r_squared,
        pairs: pairs.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_line() {
        let pairs: Vec<_> = (1..=10)
            .map(|i| CalibrationPair::new(i as f64 * 100.0, i as f64 * 100.0 * 4.0 + 30.0))
            .collect();
        let fit = fit_pairs(&pairs).unwrap();
        assert!((fit.slope - 4.0).abs() < 1e-9, "slope={}", fit.slope);
        assert!((fit.intercept - 30.0).abs() < 1e-6, "intercept={}", fit.intercept);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_rejects_too_few_pairs() {
        let pairs = [CalibrationPair::new(1.0, 2.0), CalibrationPair::new(2.0, 4.0)];
        assert_eq!(
            fit_pairs(&pairs),
            Err(CalibrationError::InsufficientPairs { available: 2, required: 3 })
        );
    }

    #[test]
    fn test_fit_rejects_constant_iterations() {
        let pairs = [
            CalibrationPair::new(5.0, 20.0),
            CalibrationPair::new(5.0, 21.0),
            CalibrationPair::new(5.0, 19.0),
        ];
        assert!(matches!(fit_pairs(&pairs), Err(CalibrationError::Degenerate(_))));
    }
}

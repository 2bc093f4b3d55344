//! Quantiles using the R-7 definition (linear interpolation between order
//! statistics), the definition spreadsheet and dataframe tools default to.

/// Quantile `p` of data sorted in ascending order.
///
/// # Panics
///
/// Panics if `sorted` is empty or `p` is outside [0, 1].
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty(), "Cannot compute quantile of empty slice");
    assert!((0.0..=1.0).contains(&p), "Quantile probability must be in [0, 1]");

    let n = sorted.len();
    let h = (n - 1) as f64 * p;
    let lower = h.floor() as usize;
    let frac = h - h.floor();

    if lower >= n - 1 {
        sorted[n - 1]
    } else if frac == 0.0 {
        sorted[lower]
    } else {
        sorted[lower] + frac * (sorted[lower + 1] - sorted[lower])
    }
}

/// Quantile `p` of unsorted data. Sorts a copy.
///
/// # Panics
///
/// Panics if `data` is empty or `p` is outside [0, 1].
pub fn quantile(data: &[f64], p: f64) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, p)
}

/// Median of unsorted data.
pub fn median(data: &[f64]) -> f64 {
    quantile(data, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < 1e-12);
        assert!((median(&[4.0, 1.0, 3.0, 2.0]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_quartiles_interpolate() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile(&data, 0.25) - 2.0).abs() < 1e-12);
        assert!((quantile(&data, 0.75) - 4.0).abs() < 1e-12);
        // h = 3 * 0.25 = 0.75 -> 10 + 0.75 * 10
        assert!((quantile(&[10.0, 20.0, 30.0, 40.0], 0.25) - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_extremes() {
        let data = [5.0, -1.0, 7.0];
        assert_eq!(quantile(&data, 0.0), -1.0);
        assert_eq!(quantile(&data, 1.0), 7.0);
        assert_eq!(quantile(&[42.0], 0.3), 42.0);
    }

    #[test]
    #[should_panic(expected = "Cannot compute quantile of empty slice")]
    fn test_empty_slice_panics() {
        quantile(&[], 0.5);
    }
}

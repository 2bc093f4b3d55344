//! BLOCKED_TIME and compute-only estimates for the counter variant.
//!
//! Exactly one wait site is used per report. A run's blocked time is its
//! trusted iteration count times the calibrated cycles per iteration;
//! compute-only time is KERNEL_LENGTH minus that.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::calibration::{Calibration, CalibrationPair, TargetId};
use crate::statistics::Summary;
use crate::types::{CoreId, Measurement, RunIndex, SeriesKey, TestCase, Variant, WaitSite};

/// Calibration outcome for one hardware target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCalibration {
    /// Hardware target.
    pub target: TargetId,
    /// Calibration, when one could be produced.
    pub calibration: Option<Calibration>,
    /// Why none could be produced.
    pub error: Option<String>,
}

/// Estimates for one counter-variant series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedEstimate {
    /// Workload name.
    pub test_case: TestCase,
    /// Core coordinate.
    pub core: CoreId,
    /// Host program id.
    pub host_id: u64,
    /// Runs with a trusted counter reading.
    pub runs_used: usize,
    /// Runs whose reading was flagged as counter overflow.
    pub runs_overflowed: usize,
    /// Iteration counts.
    pub iterations: Summary,
    /// Blocked cycles.
    pub blocked_cycles: Summary,
    /// KERNEL_LENGTH minus blocked cycles.
    pub compute_cycles: Summary,
    /// Mean blocked cycles over mean KERNEL_LENGTH.
    pub blocked_fraction: Option<f64>,
}

/// Blocked-time section of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedReport {
    /// Wait site used as the blocked-time proxy.
    pub site: WaitSite,
    /// Calibrations per target.
    pub calibrations: Vec<TargetCalibration>,
    /// Per-series estimates.
    pub estimates: Vec<BlockedEstimate>,
    /// Counter readings flagged as overflow.
    pub overflowed_readings: usize,
    /// Counter-variant kernels without a reading on the site.
    pub missing_readings: usize,
    /// Test cases without a usable calibration.
    pub uncalibrated_test_cases: Vec<TestCase>,
}

impl BlockedReport {
    /// Calibration used for a target, if one was produced.
    pub fn calibration(&self, target: &TargetId) -> Option<&Calibration> {
        self.calibrations
            .iter()
            .find(|c| &c.target == target)
            .and_then(|c| c.calibration.as_ref())
    }
}

/// Estimate blocked and compute-only cycles for every counter series.
///
/// `target_of` maps a test case to the hardware target it ran on; test cases
/// whose target has no calibration in `calibrations` are listed as
/// uncalibrated.
pub fn estimate_blocked(
    measurements: &[Measurement],
    site: WaitSite,
    min_runs_for_std: usize,
    calibrations: Vec<TargetCalibration>,
    target_of: impl Fn(&TestCase) -> Option<TargetId>,
) -> BlockedReport {
    #[derive(Default)]
    struct Series {
        iterations: Vec<f64>,
        blocked: Vec<f64>,
        compute: Vec<f64>,
        kernel: Vec<f64>,
        overflowed: usize,
    }

    let mut report = BlockedReport {
        site,
        calibrations,
        estimates: Vec::new(),
        overflowed_readings: 0,
        missing_readings: 0,
        uncalibrated_test_cases: Vec::new(),
    };
    let mut series: BTreeMap<SeriesKey, Series> = BTreeMap::new();
    let mut uncalibrated = BTreeSet::new();

    for m in measurements.iter().filter(|m| m.variant == Variant::Counter) {
        let Some(reading) = m.counter(site) else {
            report.missing_readings += 1;
            continue;
        };
        let Some(iterations) = reading.trusted() else {
            report.overflowed_readings += 1;
            series.entry(m.series_key()).or_default().overflowed += 1;
            continue;
        };
        let Some(calibration) = target_of(&m.test_case).and_then(|t| report.calibration(&t)) else {
            uncalibrated.insert(m.test_case.clone());
            continue;
        };
        let blocked = calibration.blocked_cycles(iterations);
        let kernel = m.kernel_length_cycles as f64;
        let entry = series.entry(m.series_key()).or_default();
        entry.iterations.push(f64::from(iterations));
        entry.blocked.push(blocked);
        entry.compute.push(kernel - blocked);
        entry.kernel.push(kernel);
    }

    report.estimates = series
        .into_iter()
        .filter_map(|(key, s)| {
            let iterations = Summary::from_values(&s.iterations, min_runs_for_std)?;
            let blocked_cycles = Summary::from_values(&s.blocked, min_runs_for_std)?;
            let compute_cycles = Summary::from_values(&s.compute, min_runs_for_std)?;
            let kernel_mean = s.kernel.iter().sum::<f64>() / s.kernel.len() as f64;
            Some(BlockedEstimate {
                test_case: key.test_case,
                core: key.core,
                host_id: key.host_id,
                runs_used: s.iterations.len(),
                runs_overflowed: s.overflowed,
                blocked_fraction: (kernel_mean > 0.0).then(|| blocked_cycles.mean / kernel_mean),
                iterations,
                blocked_cycles,
                compute_cycles,
            })
        })
        .collect();
    report.uncalibrated_test_cases = uncalibrated.into_iter().collect();
    report
}

/// Matched (counter iterations, zone cycles) pairs for empirical calibration.
///
/// A profiler kernel and a counter kernel match when they share test case,
/// core, host id and run index. Runs carry no other identity, so run `N` of
/// the profiler sweep and run `N` of the counter sweep must execute the same
/// workload inputs. Only trusted counter readings are paired.
pub fn calibration_pairs(measurements: &[Measurement], site: WaitSite) -> Vec<(TestCase, CalibrationPair)> {
    let mut zones: BTreeMap<(&TestCase, CoreId, u64, RunIndex), u64> = BTreeMap::new();
    for m in measurements.iter().filter(|m| m.variant == Variant::Profiler) {
        if let Some(cycles) = m.zone_cycles(site) {
            zones.insert((&m.test_case, m.core, m.host_id, m.run), cycles);
        }
    }

    let mut pairs: Vec<(TestCase, CalibrationPair)> = measurements
        .iter()
        .filter(|m| m.variant == Variant::Counter)
        .filter_map(|m| {
            let iterations = m.counter(site)?.trusted()?;
            let cycles = zones.get(&(&m.test_case, m.core, m.host_id, m.run))?;
            Some((
                m.test_case.clone(),
                CalibrationPair::new(f64::from(iterations), *cycles as f64),
            ))
        })
        .collect();
    pairs.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.iterations.total_cmp(&b.1.iterations))
            .then(a.1.zone_cycles.total_cmp(&b.1.zone_cycles))
    });
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationProvider, StaticTable};
    use crate::types::{CounterOverflow, CounterReading, WaitObservation, WaitObservations};

    fn counter(run: usize, kernel: u64, iterations: u32, overflow: Option<CounterOverflow>) -> Measurement {
        Measurement {
            test_case: TestCase::new("t"),
            variant: Variant::Counter,
            run,
            core: CoreId::new(0, 1, 1),
            host_id: 1,
            kernel_length_cycles: kernel,
            wait: WaitObservations {
                wait_front: Some(WaitObservation::Counter(CounterReading { iterations, overflow })),
                reserve_back: Some(WaitObservation::Counter(CounterReading {
                    iterations: 9_999,
                    overflow: None,
                })),
            },
        }
    }

    fn profiler(run: usize, zone: u64) -> Measurement {
        Measurement {
            test_case: TestCase::new("t"),
            variant: Variant::Profiler,
            run,
            core: CoreId::new(0, 1, 1),
            host_id: 1,
            kernel_length_cycles: 5_000,
            wait: WaitObservations {
                wait_front: Some(WaitObservation::ZoneCycles(zone)),
                reserve_back: None,
            },
        }
    }

    fn calibrated(cycles: f64) -> Vec<TargetCalibration> {
        let target = TargetId::new("wormhole_b0");
        let calibration = StaticTable::new().with_cycles(target.clone(), cycles).calibrate(&target).unwrap();
        vec![TargetCalibration {
            target,
            calibration: Some(calibration),
            error: None,
        }]
    }

    fn estimate(ms: &[Measurement], calibrations: Vec<TargetCalibration>) -> BlockedReport {
        estimate_blocked(ms, WaitSite::WaitFront, 2, calibrations, |_| Some(TargetId::new("wormhole_b0")))
    }

    #[test]
    fn test_blocked_uses_selected_site_only() {
        let ms = vec![counter(0, 2_000, 100, None), counter(1, 2_000, 150, None)];
        let report = estimate(&ms, calibrated(4.0));
        assert_eq!((report.overflowed_readings, report.missing_readings), (0, 0));
        assert!(report.uncalibrated_test_cases.is_empty());
        let e = &report.estimates[0];
        assert_eq!(e.blocked_cycles.mean, 500.0);
        assert_eq!(e.compute_cycles.mean, 1_500.0);
        assert_eq!(e.blocked_fraction, Some(0.25));
    }

    #[test]
    fn test_overflowed_readings_excluded() {
        let wrapped = Some(CounterOverflow::Wrapped { previous: 10, observed: 2 });
        let ms = vec![counter(0, 2_000, 100, None), counter(1, 2_000, 2, wrapped)];
        let report = estimate(&ms, calibrated(4.0));
        assert_eq!(report.overflowed_readings, 1);
        assert_eq!(report.estimates[0].runs_used, 1);
        assert_eq!(report.estimates[0].runs_overflowed, 1);
        assert_eq!(report.estimates[0].blocked_cycles.mean, 400.0);
    }

    #[test]
    fn test_blocked_scales_linearly_with_iterations() {
        let short = estimate(&[counter(0, 10_000, 1_000, None)], calibrated(4.0));
        let long = estimate(&[counter(0, 10_000, 2_000, None)], calibrated(4.0));
        let a = short.estimates[0].blocked_cycles.mean;
        let b = long.estimates[0].blocked_cycles.mean;
        assert!((b / a - 2.0).abs() < 1e-12);
        let per_iteration = short.calibration(&TargetId::new("wormhole_b0")).unwrap().cycles_per_iteration;
        assert!((a / 1_000.0 - per_iteration).abs() < 1e-12);
    }

    #[test]
    fn test_uncalibrated_test_case_listed() {
        let ms = vec![counter(0, 2_000, 100, None), counter(1, 2_000, 100, None)];
        let failed = vec![TargetCalibration {
            target: TargetId::new("wormhole_b0"),
            calibration: None,
            error: Some("no calibration".to_string()),
        }];
        let report = estimate(&ms, failed);
        assert!(report.estimates.is_empty());
        assert_eq!(report.uncalibrated_test_cases, vec![TestCase::new("t")]);
    }

    #[test]
    fn test_pairs_match_by_run() {
        let ms = vec![
            profiler(0, 410),
            profiler(1, 810),
            profiler(2, 1_210),
            counter(0, 0, 100, None),
            counter(1, 0, 200, None),
            counter(3, 0, 400, None),
        ];
        let pairs = calibration_pairs(&ms, WaitSite::WaitFront);
        let values: Vec<(f64, f64)> = pairs.iter().map(|(_, p)| (p.iterations, p.zone_cycles)).collect();
        assert_eq!(values, vec![(100.0, 410.0), (200.0, 810.0)]);
        assert!(calibration_pairs(&ms, WaitSite::ReserveBack).is_empty());
    }

    #[test]
    fn test_pairs_need_same_run_index_and_host() {
        let mut other_host = counter(0, 0, 100, None);
        other_host.host_id = 2;
        let ms = vec![profiler(0, 410), other_host, counter(1, 0, 100, None)];
        assert!(calibration_pairs(&ms, WaitSite::WaitFront).is_empty());
    }
}

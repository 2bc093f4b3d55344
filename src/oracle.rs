//! Main `OverheadOracle` entry point and builder.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

use crate::aggregate::RunAggregator;
use crate::blocked::{calibration_pairs, estimate_blocked, TargetCalibration};
use crate::calibration::{
    Calibration, CalibrationProvider, CalibrationSpec, EmpiricalProvider, LoopBody, TargetId,
};
use crate::compare::OverheadComparator;
use crate::config::Config;
use crate::error::{CalibrationError, Result};
use crate::extract::{Extraction, RawLogExtractor};
use crate::result::{Metadata, Report, SkippedSummary};
use crate::types::{Variant, WaitSite};

/// Main entry point for overhead analysis.
///
/// Runs extraction, aggregation and comparison over a run tree and, when
/// counter data is present, the blocked-time estimates.
///
/// # Example
///
/// ```ignore
/// use overhead_oracle::{OverheadOracle, WaitSite};
///
/// let report = OverheadOracle::new()
///     .blocked_site(WaitSite::ReserveBack)
///     .outlier_multiple(3.0)
///     .analyze("results/")?;
///
/// for cmp in &report.comparisons {
///     println!("{}", cmp.interpretation());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct OverheadOracle {
    config: Config,
}

impl OverheadOracle {
    /// Oracle with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle using an existing configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Default settings with `OVERHEAD_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_config(Config::default().from_env()?))
    }

    /// Runs required before a standard deviation is reported.
    pub fn min_runs_for_std(mut self, n: usize) -> Self {
        self.config.min_runs_for_std = n;
        self
    }

    /// Multiple of the suite median beyond which a test case is an outlier.
    pub fn outlier_multiple(mut self, k: f64) -> Self {
        self.config.outlier_multiple = k;
        self
    }

    /// Wait site used as the blocked-time proxy.
    pub fn blocked_site(mut self, site: WaitSite) -> Self {
        self.config.blocked_site = site;
        self
    }

    /// Largest counter value accepted as genuine.
    pub fn expected_max_iterations(mut self, n: u32) -> Self {
        self.config.expected_max_iterations = n;
        self
    }

    /// Calibration strategy.
    pub fn calibration(mut self, spec: CalibrationSpec) -> Self {
        self.config.calibration = spec;
        self
    }

    /// Loop body compiled into the counter variant.
    pub fn loop_body(mut self, body: LoopBody) -> Self {
        self.config.loop_body = body;
        self
    }

    /// Zone marking KERNEL_LENGTH.
    pub fn kernel_zone(mut self, zone: impl Into<String>) -> Self {
        self.config.kernel_zone = zone.into();
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyse the run tree under `root`.
    ///
    /// # Errors
    ///
    /// Fails only for an invalid configuration or an unreadable input root.
    /// Malformed logs are reported in [`Report::skipped`].
    pub fn analyze(&self, root: impl AsRef<Path>) -> Result<Report> {
        let root = root.as_ref();
        self.config.validate()?;
        let start = Instant::now();
        tracing::info!(root = %root.display(), "starting overhead analysis");

        let extraction = RawLogExtractor::new(&self.config).extract(root)?;
        let mut report = self.analyze_extraction(extraction)?;
        report.metadata.root = Some(root.to_path_buf());
        report.metadata.runtime_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            runtime_secs = report.metadata.runtime_secs,
            skipped = report.skipped.total,
            "analysis finished"
        );
        Ok(report)
    }

    /// Analyse measurements that were already extracted.
    pub fn analyze_extraction(&self, extraction: Extraction) -> Result<Report> {
        self.config.validate()?;
        let start = Instant::now();

        let statistics = RunAggregator::new(self.config.min_runs_for_std).aggregate(&extraction.measurements);

        let comparator = OverheadComparator::new(self.config.outlier_multiple);
        let present = statistics.variants();
        let comparisons: Vec<_> = Variant::INSTRUMENTED
            .into_iter()
            .filter(|v| present.contains(v))
            .map(|v| {
                let cmp = comparator.compare(&statistics, v);
                tracing::info!(variant = %v, "{}", cmp.interpretation());
                cmp
            })
            .collect();

        let has_counter = extraction.measurements.iter().any(|m| m.variant == Variant::Counter);
        let blocked = has_counter.then(|| {
            let calibrations = self.calibrations(&extraction);
            estimate_blocked(
                &extraction.measurements,
                self.config.blocked_site,
                self.config.min_runs_for_std,
                calibrations,
                |test_case| extraction.target(test_case),
            )
        });

        let mut measurements_by_variant = BTreeMap::new();
        for m in &extraction.measurements {
            *measurements_by_variant.entry(m.variant).or_insert(0) += 1;
        }

        Ok(Report {
            statistics,
            comparisons,
            blocked,
            skipped: SkippedSummary::from_records(extraction.skipped),
            metadata: Metadata {
                root: None,
                files_read: extraction.files_read,
                measurements: extraction.measurements.len(),
                measurements_by_variant,
                devices: extraction.devices,
                blocked_site: self.config.blocked_site,
                outlier_multiple: self.config.outlier_multiple,
                min_runs_for_std: self.config.min_runs_for_std,
                runtime_secs: start.elapsed().as_secs_f64(),
            },
        })
    }

    /// Fit empirical calibrations from the profiler and counter runs under
    /// `root`, regardless of the configured strategy.
    pub fn calibrate(&self, root: impl AsRef<Path>) -> Result<Vec<TargetCalibration>> {
        self.config.validate()?;
        let extraction = RawLogExtractor::new(&self.config).extract(root.as_ref())?;
        let provider = self.empirical_provider(&extraction);
        Ok(self
            .counter_targets(&extraction)
            .into_iter()
            .map(|target| outcome(target.clone(), provider.calibrate(&target)))
            .collect())
    }

    /// Calibrations for every target the counter variant ran on.
    fn calibrations(&self, extraction: &Extraction) -> Vec<TargetCalibration> {
        let targets = self.counter_targets(extraction);
        match &self.config.calibration {
            CalibrationSpec::Static { table } => targets
                .into_iter()
                .map(|target| {
                    let result = table
                        .calibrate(&target)
                        .and_then(|c| c.validate(&self.config.loop_body).map(|()| c));
                    outcome(target, result)
                })
                .collect(),
            CalibrationSpec::Empirical => {
                let provider = self.empirical_provider(extraction);
                targets
                    .into_iter()
                    .map(|target| outcome(target.clone(), provider.calibrate(&target)))
                    .collect()
            }
        }
    }

    fn counter_targets(&self, extraction: &Extraction) -> BTreeSet<TargetId> {
        extraction
            .measurements
            .iter()
            .filter(|m| m.variant == Variant::Counter)
            .map(|m| &m.test_case)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|t| extraction.target(t))
            .collect()
    }

    fn empirical_provider(&self, extraction: &Extraction) -> EmpiricalProvider {
        let mut provider = EmpiricalProvider::new().for_loop_body(&self.config.loop_body);
        let mut by_target: BTreeMap<TargetId, Vec<_>> = BTreeMap::new();
        for (test_case, pair) in calibration_pairs(&extraction.measurements, self.config.blocked_site) {
            if let Some(target) = extraction.target(&test_case) {
                by_target.entry(target).or_default().push(pair);
            }
        }
        for (target, pairs) in by_target {
            tracing::debug!(%target, pairs = pairs.len(), "empirical calibration pairs");
            provider.add_pairs(&target, pairs);
        }
        provider
    }
}

fn outcome(target: TargetId, result: std::result::Result<Calibration, CalibrationError>) -> TargetCalibration {
    match result {
        Ok(calibration) => {
            tracing::info!(%target, cycles_per_iteration = calibration.cycles_per_iteration, "calibrated");
            TargetCalibration {
                target,
                calibration: Some(calibration),
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(%target, error = %e, "calibration unavailable");
            TargetCalibration {
                target,
                calibration: None,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::StaticTable;
    use crate::extract::DeviceInfo;
    use crate::types::{CoreId, CounterReading, Measurement, TestCase, WaitObservation, WaitObservations};

    fn measurement(variant: Variant, run: usize, cycles: u64, counter: Option<u32>) -> Measurement {
        Measurement {
            test_case: TestCase::new("matmul"),
            variant,
            run,
            core: CoreId::new(0, 1, 1),
            host_id: 1,
            kernel_length_cycles: cycles,
            wait: WaitObservations {
                wait_front: counter.map(|iterations| {
                    WaitObservation::Counter(CounterReading { iterations, overflow: None })
                }),
                reserve_back: None,
            },
        }
    }

    fn extraction(measurements: Vec<Measurement>) -> Extraction {
        let mut devices = BTreeMap::new();
        devices.insert(
            TestCase::new("matmul"),
            DeviceInfo {
                arch: Some("wormhole_b0".to_string()),
                chip_freq_mhz: Some(1000.0),
            },
        );
        Extraction {
            measurements,
            skipped: Vec::new(),
            devices,
            files_read: 3,
        }
    }

    #[test]
    fn test_builder_sets_config() {
        let oracle = OverheadOracle::new()
            .min_runs_for_std(3)
            .outlier_multiple(4.0)
            .blocked_site(WaitSite::ReserveBack)
            .kernel_zone("MATH-KERNEL");
        assert_eq!(oracle.config().min_runs_for_std, 3);
        assert_eq!(oracle.config().outlier_multiple, 4.0);
        assert_eq!(oracle.config().blocked_site, WaitSite::ReserveBack);
        assert_eq!(oracle.config().kernel_zone, "MATH-KERNEL");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = OverheadOracle::new().outlier_multiple(0.0).analyze_extraction(Extraction::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_analyze_extraction_end_to_end() {
        let ms = vec![
            measurement(Variant::Baseline, 0, 1000, None),
            measurement(Variant::Baseline, 1, 1010, None),
            measurement(Variant::Baseline, 2, 990, None),
            measurement(Variant::Counter, 0, 1020, Some(50)),
            measurement(Variant::Counter, 1, 1020, Some(50)),
        ];
        let table = StaticTable::new().with_cycles(TargetId::new("wormhole_b0"), 4.0);
        let report = OverheadOracle::new()
            .calibration(CalibrationSpec::Static { table })
            .analyze_extraction(extraction(ms))
            .unwrap();

        assert!(report.comparison(Variant::Profiler).is_none());
        let cmp = report.comparison(Variant::Counter).unwrap();
        assert!((cmp.per_core[0].slowdown.pct().unwrap() - 2.0).abs() < 1e-9);

        let blocked = report.blocked.unwrap();
        assert_eq!(blocked.estimates.len(), 1);
        assert_eq!(blocked.estimates[0].blocked_cycles.mean, 200.0);
        assert_eq!(blocked.estimates[0].compute_cycles.mean, 820.0);
        assert_eq!(report.metadata.measurements, 5);
        assert_eq!(report.metadata.measurements_by_variant[&Variant::Counter], 2);
    }

    #[test]
    fn test_stale_static_calibration_is_invalidated() {
        let ms = vec![
            measurement(Variant::Counter, 0, 1020, Some(50)),
            measurement(Variant::Counter, 1, 1020, Some(50)),
        ];
        let table = StaticTable::new().with_body(TargetId::new("wormhole_b0"), LoopBody::counter_poll_loop());
        let mut edited = LoopBody::counter_poll_loop();
        edited.instructions.pop();
        let report = OverheadOracle::new()
            .calibration(CalibrationSpec::Static { table })
            .loop_body(edited)
            .analyze_extraction(extraction(ms))
            .unwrap();

        let blocked = report.blocked.unwrap();
        assert!(blocked.calibrations[0].calibration.is_none());
        assert!(blocked.calibrations[0].error.as_deref().unwrap_or("").contains("loop body"));
        assert_eq!(blocked.uncalibrated_test_cases, vec![TestCase::new("matmul")]);
    }
}

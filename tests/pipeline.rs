//! End-to-end analysis of synthetic run trees.

mod common;

use std::fs;

use common::{device_log, lengths, Kernel, RunTree};
use overhead_oracle::output::{csv, write_json};
use overhead_oracle::{
    CalibrationSpec, LoopBody, MalformedLog, OracleError, OverheadOracle, Slowdown, TestCase, UndefinedReason,
    Variant,
};

const BASELINE: [u64; 3] = [10_000, 10_100, 9_900];
const PROFILER: [u64; 3] = [10_500, 10_605, 10_395];

fn five_percent_tree() -> RunTree {
    let tree = RunTree::new();
    tree.series("baseline", "matmul", &lengths(&BASELINE));
    tree.series("profiler", "matmul", &lengths(&PROFILER));
    tree
}

/// Profiler zones cost 4 cycles per counter iteration plus 30 fixed cycles.
fn counter_tree() -> RunTree {
    let tree = five_percent_tree();
    let iterations = [100u64, 200, 300];
    let profiler: Vec<Kernel> = PROFILER
        .iter()
        .zip(iterations)
        .map(|(&l, i)| Kernel::new(1, l).wait_front(4 * i + 30))
        .collect();
    tree.series("profiler", "matmul", &profiler);
    let counter: Vec<Kernel> = iterations.iter().map(|&i| Kernel::new(1, 10_200).wait_front(i)).collect();
    tree.series("counter", "matmul", &counter);
    tree
}

#[test]
fn profiler_overhead_from_device_logs() {
    let tree = five_percent_tree();
    let report = OverheadOracle::new().analyze(tree.root()).unwrap();

    assert_eq!(report.metadata.files_read, 6);
    assert_eq!(report.metadata.measurements, 6);
    assert_eq!(report.skipped.total, 0);
    assert!(report.blocked.is_none());
    assert!(report.comparison(Variant::Counter).is_none());

    let cmp = report.comparison(Variant::Profiler).unwrap();
    assert_eq!(cmp.per_core.len(), 1);
    assert_eq!(cmp.per_core[0].baseline_mean, Some(10_000.0));
    assert_eq!(cmp.per_core[0].variant_mean, 10_500.0);
    assert_eq!(cmp.per_core[0].slowdown, Slowdown::Defined(5.0));
    assert_eq!(cmp.test_cases[0].test_case, TestCase::new("matmul"));
    assert_eq!(cmp.aggregate.as_ref().unwrap().mean, 5.0);
    assert_eq!(cmp.interpretation(), "profiler is 5.00% SLOWER than baseline on average");

    let device = &report.metadata.devices[&TestCase::new("matmul")];
    assert_eq!(device.arch.as_deref(), Some("wormhole_b0"));
    assert_eq!(device.chip_freq_mhz, Some(1000.0));
}

#[test]
fn counter_with_static_calibration() {
    let tree = counter_tree();
    let report = OverheadOracle::new().analyze(tree.root()).unwrap();

    let cmp = report.comparison(Variant::Counter).unwrap();
    assert_eq!(cmp.per_core[0].slowdown, Slowdown::Defined(2.0));

    let blocked = report.blocked.as_ref().unwrap();
    let cpi = LoopBody::counter_poll_loop().cycles_per_iteration();
    assert_eq!(blocked.calibrations.len(), 1);
    let calibration = blocked.calibrations[0].calibration.as_ref().unwrap();
    assert_eq!(calibration.cycles_per_iteration, cpi);

    let estimate = &blocked.estimates[0];
    assert_eq!(estimate.runs_used, 3);
    assert_eq!(estimate.runs_overflowed, 0);
    assert_eq!(estimate.iterations.mean, 200.0);
    assert!((estimate.blocked_cycles.mean - 200.0 * cpi).abs() < 1e-6);
    assert!((estimate.compute_cycles.mean - (10_200.0 - 200.0 * cpi)).abs() < 1e-6);
}

#[test]
fn counter_with_empirical_calibration() {
    let tree = counter_tree();
    let oracle = OverheadOracle::new().calibration(CalibrationSpec::Empirical);

    let calibrations = oracle.calibrate(tree.root()).unwrap();
    assert_eq!(calibrations.len(), 1);
    assert_eq!(calibrations[0].target.arch, "wormhole_b0");
    let slope = calibrations[0].calibration.as_ref().unwrap().cycles_per_iteration;
    assert!((slope - 4.0).abs() < 1e-6, "slope={slope}");

    let report = oracle.analyze(tree.root()).unwrap();
    let estimate = &report.blocked.as_ref().unwrap().estimates[0];
    assert!((estimate.blocked_cycles.mean - 800.0).abs() < 1e-4);
    assert!((estimate.compute_cycles.mean - 9_400.0).abs() < 1e-4);
    let fraction = estimate.blocked_fraction.unwrap();
    assert!((fraction - 800.0 / 10_200.0).abs() < 1e-6);
}

#[test]
fn empirical_calibration_needs_matched_pairs() {
    let tree = five_percent_tree();
    let counter: Vec<Kernel> = [100, 200, 300].iter().map(|&i| Kernel::new(1, 10_200).wait_front(i)).collect();
    tree.series("counter", "matmul", &counter);

    let report = OverheadOracle::new()
        .calibration(CalibrationSpec::Empirical)
        .analyze(tree.root())
        .unwrap();
    let blocked = report.blocked.unwrap();
    assert!(blocked.calibrations[0].calibration.is_none());
    assert!(blocked.estimates.is_empty());
    assert_eq!(blocked.uncalibrated_test_cases, vec![TestCase::new("matmul")]);
}

#[test]
fn malformed_logs_are_skipped_and_counted() {
    let tree = five_percent_tree();
    tree.write("baseline", 3, "matmul", "not a profiler log\n");
    let broken = device_log("wormhole_b0", &[Kernel::new(1, 10_500)]).replacen("TRISC_0,1,100,", "TRISC_0,1,abc,", 1);
    tree.write("profiler", 3, "matmul", &broken);

    let report = OverheadOracle::new().analyze(tree.root()).unwrap();

    assert_eq!(report.metadata.files_read, 7);
    assert_eq!(report.metadata.measurements, 6);
    assert_eq!(report.skipped.files, 1);
    assert_eq!(report.skipped.by_variant[&Variant::Baseline], 1);
    // One issue for the broken kernel record, not one per symptom.
    assert_eq!(report.skipped.by_variant[&Variant::Profiler], 1);
    assert_eq!(report.skipped.total, 2);
    assert!(report
        .skipped
        .records
        .iter()
        .any(|r| r.reason == MalformedLog::MissingHeader && r.run == 3));
    assert!(report
        .skipped
        .records
        .iter()
        .any(|r| matches!(&r.reason, MalformedLog::BadField { column, value, .. } if column == "time_cycles" && value == "abc")));

    // The remaining runs still compare.
    let cmp = report.comparison(Variant::Profiler).unwrap();
    assert_eq!(cmp.per_core[0].slowdown, Slowdown::Defined(5.0));
}

#[test]
fn missing_baseline_is_undefined_not_fatal() {
    let tree = five_percent_tree();
    tree.series("profiler", "conv", &lengths(&[2_000, 2_000]));

    let report = OverheadOracle::new().analyze(tree.root()).unwrap();
    let cmp = report.comparison(Variant::Profiler).unwrap();

    let conv = cmp.test_cases.iter().find(|t| t.test_case == TestCase::new("conv")).unwrap();
    assert_eq!(conv.slowdown, Slowdown::Undefined(UndefinedReason::MissingBaseline));
    assert!(!conv.outlier);
    assert_eq!(cmp.excluded.missing_baseline, 1);
    assert_eq!(cmp.excluded.undefined_test_cases, 1);
    assert_eq!(cmp.aggregate.as_ref().unwrap().count, 1);
    assert_eq!(cmp.aggregate.as_ref().unwrap().mean, 5.0);
}

#[test]
fn ignored_directories_and_default_test_case() {
    let tree = RunTree::new();
    for (run, &length) in BASELINE.iter().enumerate() {
        let run_dir = tree.root().join("baseline").join(run.to_string());
        fs::create_dir_all(run_dir.join(".logs")).unwrap();
        let text = device_log("wormhole_b0", &[Kernel::new(1, length)]);
        fs::write(run_dir.join("profile_log_device.csv"), &text).unwrap();
        fs::write(run_dir.join(".logs").join("profile_log_device.csv"), &text).unwrap();
    }
    fs::create_dir_all(tree.root().join("notes")).unwrap();

    let report = OverheadOracle::new().analyze(tree.root()).unwrap();
    assert_eq!(report.metadata.files_read, 3);
    let group = report.statistics.group(&TestCase::new("default"), Variant::Baseline).unwrap();
    assert_eq!(group.runs, 3);
    assert_eq!(group.stats[0].summary.mean, 10_000.0);
    assert!(report.comparisons.is_empty());
}

#[test]
fn missing_root_is_fatal() {
    let tree = RunTree::new();
    let result = OverheadOracle::new().analyze(tree.root().join("absent"));
    assert!(matches!(result, Err(OracleError::InputRoot { .. })));
}

#[test]
fn json_and_csv_outputs() {
    let tree = counter_tree();
    let report = OverheadOracle::new().analyze(tree.root()).unwrap();
    let out = tempfile::tempdir().unwrap();

    let json_path = out.path().join("report.json");
    write_json(&report, &json_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["metadata"]["files_read"], 9);
    assert_eq!(value["comparisons"].as_array().unwrap().len(), 2);

    let tables = out.path().join("tables");
    csv::write_tables(&report, &tables).unwrap();
    let summary = fs::read_to_string(tables.join(csv::SUMMARY_FILE)).unwrap();
    assert!(summary.contains("profiler,slowdown_pct,mean,5.0,1"), "{summary}");
    assert!(summary.contains("counter,slowdown_pct,mean,2.0,1"), "{summary}");
    let comparison = fs::read_to_string(tables.join(csv::COMPARISON_FILE)).unwrap();
    assert_eq!(comparison.lines().count(), 3);
}

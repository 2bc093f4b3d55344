//! CSV tables: per-series statistics, per-series comparison and a long-form
//! summary (`implementation, metric, statistic, value, count`).

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::compare::{Slowdown, VariantComparison};
use crate::error::{OracleError, Result};
use crate::result::Report;
use crate::statistics::Summary;

/// File written by [`write_tables`] for per-series statistics.
pub const STATISTICS_FILE: &str = "statistics.csv";
/// File written by [`write_tables`] for per-series comparisons.
pub const COMPARISON_FILE: &str = "comparison.csv";
/// File written by [`write_tables`] for the summary.
pub const SUMMARY_FILE: &str = "summary.csv";

#[derive(Serialize)]
struct StatisticsRow<'a> {
    test_case: &'a str,
    variant: &'a str,
    device: u32,
    core_x: u32,
    core_y: u32,
    host_id: u64,
    runs: usize,
    mean: f64,
    median: f64,
    std: Option<f64>,
    std_pct: Option<f64>,
    min: f64,
    max: f64,
    p25: f64,
    p75: f64,
}

#[derive(Serialize)]
struct ComparisonRow<'a> {
    test_case: &'a str,
    variant: &'a str,
    device: u32,
    core_x: u32,
    core_y: u32,
    host_id: u64,
    baseline_mean: Option<f64>,
    variant_mean: f64,
    slowdown_pct: Option<f64>,
    std_change_pct: Option<f64>,
    status: String,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    implementation: &'a str,
    metric: &'a str,
    statistic: &'a str,
    value: Option<f64>,
    count: usize,
}

/// Per-series KERNEL_LENGTH statistics.
pub fn write_statistics<W: Write>(report: &Report, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for group in &report.statistics.groups {
        for stat in &group.stats {
            let s = &stat.summary;
            wtr.serialize(StatisticsRow {
                test_case: stat.test_case.as_str(),
                variant: stat.variant.as_str(),
                device: stat.core.device,
                core_x: stat.core.x,
                core_y: stat.core.y,
                host_id: stat.host_id,
                runs: s.count,
                mean: s.mean,
                median: s.median,
                std: s.std.value(),
                std_pct: stat.std_pct.value(),
                min: s.min,
                max: s.max,
                p25: s.p25,
                p75: s.p75,
            })?;
        }
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Per-series slowdown and standard-deviation change.
pub fn write_comparison<W: Write>(report: &Report, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for cmp in &report.comparisons {
        for r in &cmp.per_core {
            wtr.serialize(ComparisonRow {
                test_case: r.test_case.as_str(),
                variant: r.variant.as_str(),
                device: r.core.device,
                core_x: r.core.x,
                core_y: r.core.y,
                host_id: r.host_id,
                baseline_mean: r.baseline_mean,
                variant_mean: r.variant_mean,
                slowdown_pct: r.slowdown.pct(),
                std_change_pct: r.std_change_pct.value(),
                status: match r.slowdown {
                    Slowdown::Defined(_) => "defined".to_string(),
                    Slowdown::Undefined(reason) => reason.to_string(),
                },
            })?;
        }
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn summary_rows<'a>(implementation: &'a str, metric: &'a str, summary: &Summary) -> [SummaryRow<'a>; 5] {
    let row = |statistic, value| SummaryRow {
        implementation,
        metric,
        statistic,
        value,
        count: summary.count,
    };
    [
        row("mean", Some(summary.mean)),
        row("median", Some(summary.median)),
        row("std", summary.std.value()),
        row("min", Some(summary.min)),
        row("max", Some(summary.max)),
    ]
}

fn comparison_rows(cmp: &VariantComparison) -> Vec<SummaryRow<'_>> {
    let implementation = cmp.variant.as_str();
    let mut rows = Vec::new();
    for (metric, summary) in [
        ("slowdown_pct", &cmp.aggregate),
        ("slowdown_pct_with_outliers", &cmp.aggregate_with_outliers),
        ("per_core_slowdown_pct", &cmp.per_core_rollup),
        ("std_change_pct", &cmp.std_change_rollup),
    ] {
        if let Some(summary) = summary {
            rows.extend(summary_rows(implementation, metric, summary));
        }
    }
    rows.push(SummaryRow {
        implementation,
        metric: "slowdown_pct",
        statistic: "outliers",
        value: None,
        count: cmp.excluded.outliers,
    });
    rows.push(SummaryRow {
        implementation,
        metric: "slowdown_pct",
        statistic: "excluded",
        value: None,
        count: cmp.excluded.zero_baseline + cmp.excluded.missing_baseline + cmp.excluded.core_mismatch,
    });
    rows
}

/// Long-form summary of coefficient-of-variation and slowdown rollups.
pub fn write_summary<W: Write>(report: &Report, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for rollup in &report.statistics.std_pct {
        let implementation = rollup.variant.as_str();
        let defined = rollup.series - rollup.zero_mean - rollup.insufficient_runs;
        for (statistic, value) in [
            ("mean", rollup.mean),
            ("median", rollup.median),
            ("p25", rollup.p25),
            ("p75", rollup.p75),
            ("p95", rollup.p95),
            ("p99", rollup.p99),
        ] {
            wtr.serialize(SummaryRow {
                implementation,
                metric: "std_pct",
                statistic,
                value,
                count: defined,
            })?;
        }
        wtr.serialize(SummaryRow {
            implementation,
            metric: "std_pct",
            statistic: "zero_mean",
            value: None,
            count: rollup.zero_mean,
        })?;
    }
    for cmp in &report.comparisons {
        for row in comparison_rows(cmp) {
            wtr.serialize(row)?;
        }
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write all three tables into `dir`, creating it if needed.
pub fn write_tables(report: &Report, dir: &Path) -> Result<()> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| OracleError::Io { path, source }
    };
    fs::create_dir_all(dir).map_err(io(dir))?;

    let path = dir.join(STATISTICS_FILE);
    write_statistics(report, File::create(&path).map_err(io(&path))?)?;
    let path = dir.join(COMPARISON_FILE);
    write_comparison(report, File::create(&path).map_err(io(&path))?)?;
    let path = dir.join(SUMMARY_FILE);
    write_summary(report, File::create(&path).map_err(io(&path))?)?;
    tracing::info!(dir = %dir.display(), "wrote csv tables");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::make_report;

    fn render(f: impl Fn(&Report, &mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&make_report(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_statistics_table() {
        let text = render(|r, w| write_statistics(r, w));
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "test_case,variant,device,core_x,core_y,host_id,runs,mean,median,std,std_pct,min,max,p25,p75"
        );
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("matmul,baseline,0,1,1,1,3,1000.0,1000.0,10.0,1.0,990.0,1010.0,995.0,1005.0"));
    }

    #[test]
    fn test_comparison_table() {
        let text = render(|r, w| write_comparison(r, w));
        assert!(text.contains("matmul,profiler,0,1,1,1,1000.0,1050.0,5.0,0.0,defined"), "{text}");
    }

    #[test]
    fn test_summary_table_columns() {
        let text = render(|r, w| write_summary(r, w));
        assert!(text.starts_with("implementation,metric,statistic,value,count\n"));
        assert!(text.contains("profiler,slowdown_pct,mean,5.0,1"), "{text}");
        assert!(text.contains("baseline,std_pct,zero_mean,,0"));
    }

    #[test]
    fn test_write_tables_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tables");
        write_tables(&make_report(), &out).unwrap();
        for name in [STATISTICS_FILE, COMPARISON_FILE, SUMMARY_FILE] {
            assert!(out.join(name).is_file(), "{name} missing");
        }
    }
}

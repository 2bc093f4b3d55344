//! Terminal output formatting with colors and box drawing.

use colored::Colorize;

use crate::blocked::BlockedReport;
use crate::compare::{Slowdown, VariantComparison};
use crate::result::Report;
use crate::statistics::{Statistic, Summary};

/// Format a Report for human-readable terminal output.
pub fn format_report(report: &Report) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("overhead-oracle\n");
    output.push_str(&sep);
    output.push('\n');
    output.push('\n');

    if let Some(root) = &report.metadata.root {
        output.push_str(&format!("  Input: {}\n", root.display()));
    }
    output.push_str(&format!(
        "  Logs read: {}   Measurements: {}\n",
        report.metadata.files_read, report.metadata.measurements
    ));
    if report.skipped.total > 0 {
        output.push_str(&format!(
            "  {}\n",
            format!(
                "\u{26A0} Skipped {} malformed record(s) ({} whole file(s))",
                report.skipped.total, report.skipped.files
            )
            .yellow()
        ));
    }
    output.push('\n');

    output.push_str("  Kernel length (cycles, mean of per-core means)\n");
    for group in &report.statistics.groups {
        let Some(rollup) = &group.rollup else {
            continue;
        };
        output.push_str(&format!(
            "    {:<28} {:<9} {:>12.1}   cores {:>3}   runs {:>3}   std {}\n",
            truncate(group.test_case.as_str(), 28),
            group.variant.as_str(),
            rollup.mean_of_means,
            rollup.series,
            group.runs,
            format_pct_stat(rollup.mean_std_pct),
        ));
    }
    output.push('\n');

    for cmp in &report.comparisons {
        format_comparison(&mut output, cmp);
        output.push('\n');
    }

    if let Some(blocked) = &report.blocked {
        format_blocked(&mut output, blocked);
        output.push('\n');
    }

    output.push_str(&sep);
    output.push('\n');
    output.push_str("Note: wait-front and reserve-back can block at the same time; one site is used per report.\n");

    output
}

fn format_comparison(output: &mut String, cmp: &VariantComparison) {
    output.push_str(&format!("  {} vs baseline\n", cmp.variant.as_str().bold()));
    let line = cmp.interpretation();
    match cmp.aggregate.as_ref().map(|s| s.mean) {
        Some(mean) if mean.abs() < 1.0 => output.push_str(&format!("    {}\n", line.green())),
        Some(_) => output.push_str(&format!("    {}\n", line.yellow())),
        None => output.push_str(&format!("    {}\n", line.red())),
    }

    for t in &cmp.test_cases {
        let slowdown = format_slowdown(t.slowdown);
        let flag = if t.outlier {
            format!("  {}", "OUTLIER".red().bold())
        } else {
            String::new()
        };
        output.push_str(&format!(
            "      {:<28} {:>12}   cores {:>3}{}\n",
            truncate(t.test_case.as_str(), 28),
            slowdown,
            t.series_compared,
            flag
        ));
    }

    if let Some(s) = &cmp.aggregate {
        output.push_str(&format!("    Aggregate (outliers excluded): {}\n", format_summary(s)));
    }
    if cmp.excluded.outliers > 0 {
        if let Some(s) = &cmp.aggregate_with_outliers {
            output.push_str(&format!("    Aggregate (all test cases):    {}\n", format_summary(s)));
        }
    }
    if let Some(s) = &cmp.per_core_rollup {
        output.push_str(&format!("    Per core:                      {}\n", format_summary(s)));
    }
    if let Some(s) = &cmp.std_change_rollup {
        output.push_str(&format!("    Std change per core:           {}\n", format_summary(s)));
    }

    let e = &cmp.excluded;
    if e.zero_baseline + e.missing_baseline + e.core_mismatch + e.undefined_test_cases > 0 {
        output.push_str(&format!(
            "    Excluded: {} zero baseline, {} missing baseline, {} mismatched core(s), {} undefined test case(s)\n",
            e.zero_baseline, e.missing_baseline, e.core_mismatch, e.undefined_test_cases
        ));
    }
}

fn format_blocked(output: &mut String, blocked: &BlockedReport) {
    output.push_str(&format!("  Blocked time ({})\n", blocked.site));
    for c in &blocked.calibrations {
        match (&c.calibration, &c.error) {
            (Some(cal), _) => output.push_str(&format!(
                "    {}: {:.3} cycles/iteration\n",
                c.target, cal.cycles_per_iteration
            )),
            (None, error) => output.push_str(&format!(
                "    {}: {}\n",
                c.target,
                format!("uncalibrated ({})", error.as_deref().unwrap_or("unknown")).red()
            )),
        }
    }

    for e in &blocked.estimates {
        let fraction = e
            .blocked_fraction
            .map(|f| format!("{:.1}%", f * 100.0))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "      {:<20} {:<10} blocked {:>7}   compute {:>12.1} cycles\n",
            truncate(e.test_case.as_str(), 20),
            e.core.to_string(),
            fraction,
            e.compute_cycles.mean
        ));
    }
    if blocked.overflowed_readings > 0 {
        output.push_str(&format!(
            "    {}\n",
            format!("\u{26A0} {} counter reading(s) flagged as overflow", blocked.overflowed_readings).yellow()
        ));
    }
}

fn format_slowdown(slowdown: Slowdown) -> String {
    match slowdown {
        Slowdown::Defined(_) => slowdown.to_string(),
        Slowdown::Undefined(_) => slowdown.to_string().dimmed().to_string(),
    }
}

fn format_pct_stat(stat: Statistic) -> String {
    match stat {
        Statistic::Value(v) => format!("{v:.2}%"),
        other => other.to_string(),
    }
}

fn format_summary(s: &Summary) -> String {
    let std = match s.std {
        Statistic::Value(v) => format!("{v:.2}"),
        _ => "-".to_string(),
    };
    format!(
        "mean {:+.2}%  median {:+.2}%  std {}  (n={})",
        s.mean, s.median, std, s.count
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let keep: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{keep}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::make_report;

    #[test]
    fn test_format_report() {
        colored::control::set_override(false);
        let output = format_report(&make_report());
        assert!(output.contains("overhead-oracle"));
        assert!(output.contains("profiler vs baseline"));
        assert!(output.contains("profiler is 5.00% SLOWER than baseline on average"), "{output}");
        assert!(output.contains("+5.00%"));
        assert!(!output.contains("OUTLIER"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a_very_long_test_case", 8), "a_very_\u{2026}");
    }
}

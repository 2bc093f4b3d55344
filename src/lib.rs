//! # overhead-oracle
//!
//! Measure how much wait-site instrumentation distorts kernel timings on a
//! tile-based dataflow accelerator, and estimate compute-only time from a
//! cheap wait-loop counter.
//!
//! Three instrumentation variants of the same kernels are compared:
//! - `baseline`: no wait-site instrumentation
//! - `profiler`: a timestamp zone around every wait-loop entry
//! - `counter`: a register-resident iteration counter, published once per call
//!
//! The offline pipeline reads the per-run device logs, aggregates
//! KERNEL_LENGTH per (test case, variant, core) across repeated runs, and
//! reports the slowdown of each instrumented variant against baseline with
//! outlier flags and explicit counts of everything it had to leave out.
//!
//! ## Quick Start
//!
//! ```ignore
//! use overhead_oracle::{OverheadOracle, Variant};
//!
//! let report = OverheadOracle::new().analyze("bench_results/")?;
//! if let Some(cmp) = report.comparison(Variant::Counter) {
//!     println!("{}", cmp.interpretation());
//! }
//! println!("{}", overhead_oracle::output::format_report(&report));
//! ```
//!
//! ## Wait sites
//!
//! The input-side and output-side wait loops run on different hardware
//! threads and can block at the same time. Their counters are kept apart;
//! blocked-time estimates use exactly one site, chosen with
//! [`Config::blocked_site`].

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod error;
mod oracle;
mod result;
mod types;

// Functional modules
pub mod aggregate;
pub mod blocked;
pub mod calibration;
pub mod compare;
pub mod counter;
pub mod extract;
pub mod logging;
pub mod output;
pub mod statistics;
pub mod thread_pool;

// Re-exports for public API
pub use aggregate::{AggregateStat, Aggregation, GroupAggregate, RunAggregator};
pub use calibration::{Calibration, CalibrationProvider, CalibrationSpec, LoopBody, TargetId};
pub use compare::{OverheadComparator, Slowdown, SlowdownResult, UndefinedReason, VariantComparison};
pub use config::Config;
pub use error::{CalibrationError, OracleError, Result};
pub use extract::{Extraction, MalformedLog, RawLogExtractor, SkippedRecord};
pub use oracle::OverheadOracle;
pub use result::{Metadata, Report, SkippedSummary};
pub use statistics::{Statistic, Summary};
pub use types::{
    CoreId, CounterOverflow, CounterReading, Measurement, RunIndex, SeriesKey, TestCase, Variant, WaitObservation,
    WaitObservations, WaitSite,
};

/// Analyse a run tree with default settings and `OVERHEAD_*` overrides.
pub fn analyze(root: impl AsRef<std::path::Path>) -> Result<Report> {
    OverheadOracle::from_env()?.analyze(root)
}

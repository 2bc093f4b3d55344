//! Descriptive statistics over run samples.
//!
//! All functions sort their input before reducing it, so results do not
//! depend on the order samples are supplied in.

mod quantile;
mod summary;

pub use quantile::{median, quantile, quantile_sorted};
pub use summary::{Statistic, Summary};

//! In-kernel wait-time instrumentation.
//!
//! Two primitives instrument a polling wait loop:
//! - [`WaitLoopCounter`]: reads a prior count once, bumps a local per
//!   iteration, publishes once on exit (counter variant)
//! - [`TimestampZone`]: writes a zone id and samples the clock around every
//!   entry (profiler variant)
//!
//! The two wait sites ([`WaitSite::WaitFront`], [`WaitSite::ReserveBack`])
//! run on independent hardware threads. Their blocked intervals can overlap,
//! so their derived times are never added together.

mod clock;
mod wait_loop;

pub use crate::types::WaitSite;
pub use clock::{read_cycles, CycleSource, HostClock, StepClock};
pub use wait_loop::{
    CounterScope, CounterSlot, PublicationCheck, TimestampZone, WaitCounters, WaitLoopCounter, COUNTER_BITS,
};

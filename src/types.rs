//! Core identifiers and the immutable measurement record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Instrumentation configuration under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// No wait-site instrumentation.
    Baseline,
    /// Timestamp zone around every wait-site entry.
    Profiler,
    /// Register-resident iteration counter on each wait loop.
    Counter,
}

impl Variant {
    /// All variants in report order.
    pub const ALL: [Variant; 3] = [Variant::Baseline, Variant::Profiler, Variant::Counter];

    /// Variants compared against baseline.
    pub const INSTRUMENTED: [Variant; 2] = [Variant::Profiler, Variant::Counter];

    /// Directory / column name used by the benchmark driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Baseline => "baseline",
            Variant::Profiler => "profiler",
            Variant::Counter => "counter",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(Variant::Baseline),
            "profiler" => Ok(Variant::Profiler),
            "counter" => Ok(Variant::Counter),
            other => Err(format!("unknown variant '{other}'")),
        }
    }
}

/// Name of one benchmark workload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCase(pub String);

impl TestCase {
    /// Test case used for logs that sit directly in a run's report directory.
    pub const DEFAULT: &'static str = "default";

    /// Create a test case identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repetition index of a (test case, variant) pair.
pub type RunIndex = usize;

/// Physical core coordinate that executed a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreId {
    /// Device (PCIe slot) index.
    pub device: u32,
    /// Column on the tile grid.
    pub x: u32,
    /// Row on the tile grid.
    pub y: u32,
}

impl CoreId {
    /// Create a core coordinate.
    pub fn new(device: u32, x: u32, y: u32) -> Self {
        Self { device, x, y }
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:({},{})", self.device, self.x, self.y)
    }
}

/// Identity of a measured kernel series across runs.
///
/// `host_id` is the host-assigned program id inside one device log; identical
/// invocations carry the same id in every run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Workload name.
    pub test_case: TestCase,
    /// Core that executed the kernel.
    pub core: CoreId,
    /// Host program id.
    pub host_id: u64,
}

/// One of the two independent wait loops on the compute engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitSite {
    /// Input side: the unpacker waits for data to be ready.
    WaitFront,
    /// Output side: the packer waits for space to write into.
    ReserveBack,
}

impl WaitSite {
    /// Both sites.
    pub const ALL: [WaitSite; 2] = [WaitSite::WaitFront, WaitSite::ReserveBack];

    /// Zone name emitted by the device profiler for this site.
    pub fn zone_name(&self) -> &'static str {
        match self {
            WaitSite::WaitFront => "CB-COMPUTE-WAIT-FRONT",
            WaitSite::ReserveBack => "CB-COMPUTE-RESERVE-BACK",
        }
    }
}

impl fmt::Display for WaitSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitSite::WaitFront => f.write_str("wait-front"),
            WaitSite::ReserveBack => f.write_str("reserve-back"),
        }
    }
}

impl FromStr for WaitSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "wait-front" | "wait_front" => Ok(WaitSite::WaitFront),
            "back" | "reserve-back" | "reserve_back" => Ok(WaitSite::ReserveBack),
            other => Err(format!("unknown wait site '{other}' (expected front or back)")),
        }
    }
}

/// Why a published counter value is not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterOverflow {
    /// A later publication was lower than an earlier one on the same site.
    Wrapped {
        /// Last value before the decrease.
        previous: u32,
        /// Value after the decrease.
        observed: u32,
    },
    /// The value exceeds the configured iteration bound.
    AboveBound {
        /// Published value.
        observed: u32,
        /// Configured bound.
        bound: u32,
    },
}

/// Final value published by a wait-loop counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterReading {
    /// Iterations spent in the wait loop.
    pub iterations: u32,
    /// Set when the value failed the monotonic-growth check.
    pub overflow: Option<CounterOverflow>,
}

impl CounterReading {
    /// Reading that passed the overflow checks.
    pub fn trusted(&self) -> Option<u32> {
        self.overflow.is_none().then_some(self.iterations)
    }
}

/// What one wait site reported for one kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitObservation {
    /// Summed timestamp-zone cycles (profiler variant).
    ZoneCycles(u64),
    /// Published iteration count (counter variant).
    Counter(CounterReading),
}

/// Wait observations for both sites, kept separate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitObservations {
    /// Input-side wait loop.
    pub wait_front: Option<WaitObservation>,
    /// Output-side wait loop.
    pub reserve_back: Option<WaitObservation>,
}

impl WaitObservations {
    /// Observation for one site.
    pub fn site(&self, site: WaitSite) -> Option<&WaitObservation> {
        match site {
            WaitSite::WaitFront => self.wait_front.as_ref(),
            WaitSite::ReserveBack => self.reserve_back.as_ref(),
        }
    }

    /// Mutable slot for one site.
    pub fn site_mut(&mut self, site: WaitSite) -> &mut Option<WaitObservation> {
        match site {
            WaitSite::WaitFront => &mut self.wait_front,
            WaitSite::ReserveBack => &mut self.reserve_back,
        }
    }

    /// Whether either site reported anything.
    pub fn is_empty(&self) -> bool {
        self.wait_front.is_none() && self.reserve_back.is_none()
    }
}

/// One kernel's profiling result for one run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Workload name.
    pub test_case: TestCase,
    /// Instrumentation variant.
    pub variant: Variant,
    /// Repetition index.
    pub run: RunIndex,
    /// Core that executed the kernel.
    pub core: CoreId,
    /// Host program id.
    pub host_id: u64,
    /// KERNEL_LENGTH in device cycles.
    pub kernel_length_cycles: u64,
    /// Wait-site instrumentation output.
    pub wait: WaitObservations,
}

impl Measurement {
    /// Series this measurement belongs to.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            test_case: self.test_case.clone(),
            core: self.core,
            host_id: self.host_id,
        }
    }

    /// Counter reading for a site; only the counter variant carries one.
    pub fn counter(&self, site: WaitSite) -> Option<&CounterReading> {
        match self.wait.site(site) {
            Some(WaitObservation::Counter(reading)) if self.variant == Variant::Counter => Some(reading),
            _ => None,
        }
    }

    /// Zone cycles for a site; only the profiler variant carries them.
    pub fn zone_cycles(&self, site: WaitSite) -> Option<u64> {
        match self.wait.site(site) {
            Some(WaitObservation::ZoneCycles(cycles)) if self.variant == Variant::Profiler => Some(*cycles),
            _ => None,
        }
    }
}

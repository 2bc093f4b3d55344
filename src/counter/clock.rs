//! Cycle sources for the timestamp-zone primitive.
//!
//! The wall clock is only needed by [`TimestampZone`](super::TimestampZone);
//! the counter primitive never reads it.

/// Monotonic cycle counter.
pub trait CycleSource {
    /// Read the current cycle count.
    fn now(&mut self) -> u64;
}

/// Host cycle counter.
///
/// - x86_64: `lfence; rdtsc`
/// - aarch64: `isb; mrs cntvct_el0`
/// - elsewhere: nanoseconds since first use
#[derive(Debug, Clone, Copy, Default)]
pub struct HostClock;

impl CycleSource for HostClock {
    #[inline]
    fn now(&mut self) -> u64 {
        read_cycles()
    }
}

/// Read the host cycle counter with serialization around the read.
#[inline]
pub fn read_cycles() -> u64 {
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    let cycles = read_cycles_raw();
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    cycles
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn read_cycles_raw() -> u64 {
    let cycles: u64;
    unsafe {
        std::arch::asm!(
            "lfence",
            "rdtsc",
            "shl rdx, 32",
            "or rax, rdx",
            out("rax") cycles,
            out("rdx") _,
            options(nostack, nomem),
        );
    }
    cycles
}

#[cfg(target_arch = "aarch64")]
#[inline]
fn read_cycles_raw() -> u64 {
    let cycles: u64;
    unsafe {
        std::arch::asm!(
            "isb",
            "mrs {}, cntvct_el0",
            out(reg) cycles,
            options(nostack, nomem),
        );
    }
    cycles
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline]
fn read_cycles_raw() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static START: OnceLock<Instant> = OnceLock::new();

    START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Deterministic clock that advances a fixed number of cycles per read.
///
/// Used to replay synthetic wait loops where each poll costs a known number
/// of cycles.
#[derive(Debug, Clone)]
pub struct StepClock {
    cycles: u64,
    step: u64,
}

impl StepClock {
    /// Start at zero, advancing `step` cycles on every read.
    pub fn new(step: u64) -> Self {
        Self { cycles: 0, step }
    }

    /// Advance without reading, e.g. to model work between samples.
    pub fn advance(&mut self, cycles: u64) {
        self.cycles = self.cycles.wrapping_add(cycles);
    }

    /// Current value without advancing.
    pub fn peek(&self) -> u64 {
        self.cycles
    }
}

impl CycleSource for StepClock {
    fn now(&mut self) -> u64 {
        self.cycles = self.cycles.wrapping_add(self.step);
        self.cycles
    }
}

//! Wait-loop instrumentation primitives.

use crate::types::{CounterOverflow, WaitSite};

use super::clock::CycleSource;

/// Counter register width in bits. Increments wrap modulo 2^32.
pub const COUNTER_BITS: u32 = 32;

/// Storage a wait-loop counter publishes into.
///
/// Each slot belongs to the hardware thread that runs the loop; the `&mut`
/// borrow held by [`CounterScope`] is the only writer.
pub trait CounterSlot {
    /// Read the previously published value.
    fn load(&self) -> u32;
    /// Publish a new value.
    fn store(&mut self, value: u32);
}

impl CounterSlot for u32 {
    #[inline]
    fn load(&self) -> u32 {
        *self
    }

    #[inline]
    fn store(&mut self, value: u32) {
        *self = value;
    }
}

/// Scoped access to a counter slot.
///
/// The prior value is read once on entry and the running value is written
/// back exactly once, when the scope ends (by [`CounterScope::publish`] or
/// on drop). Between those points the count lives in a local.
#[derive(Debug)]
pub struct CounterScope<'a, S: CounterSlot> {
    slot: &'a mut S,
    value: u32,
    published: bool,
}

impl<'a, S: CounterSlot> CounterScope<'a, S> {
    /// Enter the scope, reading the slot once.
    #[inline]
    pub fn enter(slot: &'a mut S) -> Self {
        let value = slot.load();
        Self { slot, value, published: false }
    }

    /// Count one loop iteration.
    #[inline(always)]
    pub fn tick(&mut self) {
        self.value = self.value.wrapping_add(1);
    }

    /// Running value, including the prior publication.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// End the scope and return the published value.
    #[inline]
    pub fn publish(mut self) -> u32 {
        self.write_back();
        self.value
    }

    fn write_back(&mut self) {
        if !self.published {
            self.slot.store(self.value);
            self.published = true;
        }
    }
}

impl<S: CounterSlot> Drop for CounterScope<'_, S> {
    fn drop(&mut self) {
        self.write_back();
    }
}

/// Iteration counter around one polling wait site.
///
/// Per call: one slot read before the loop, one register increment per poll
/// that fails, one slot write after the loop. No timestamps are taken.
#[derive(Debug)]
pub struct WaitLoopCounter<S: CounterSlot = u32> {
    site: WaitSite,
    slot: S,
}

impl WaitLoopCounter<u32> {
    /// Counter backed by a plain owned cell, starting at zero.
    pub fn new(site: WaitSite) -> Self {
        Self { site, slot: 0 }
    }
}

impl<S: CounterSlot> WaitLoopCounter<S> {
    /// Counter publishing into caller-provided storage.
    pub fn with_slot(site: WaitSite, slot: S) -> Self {
        Self { site, slot }
    }

    /// Wait site this counter instruments.
    pub fn site(&self) -> WaitSite {
        self.site
    }

    /// Reset at the start of an instrumented kernel.
    pub fn reset(&mut self) {
        self.slot.store(0);
    }

    /// Spin until `ready` returns true, counting failed polls.
    ///
    /// Returns the number of iterations spent in this call. The slot then
    /// holds the cumulative count since the last [`reset`](Self::reset).
    #[inline]
    pub fn wait_until<P>(&mut self, mut ready: P) -> u32
    where
        P: FnMut() -> bool,
    {
        let mut scope = CounterScope::enter(&mut self.slot);
        let prior = scope.value();
        while !ready() {
            scope.tick();
        }
        scope.publish().wrapping_sub(prior)
    }

    /// Last published cumulative value.
    pub fn published(&self) -> u32 {
        self.slot.load()
    }

    /// Give back the underlying slot.
    pub fn into_slot(self) -> S {
        self.slot
    }
}

/// Timestamp zone around one wait site, as used by the profiler variant.
///
/// Every entry writes the zone id, samples the clock before and after the
/// loop, and updates a running cycle sum.
#[derive(Debug)]
pub struct TimestampZone<C: CycleSource> {
    site: WaitSite,
    clock: C,
    zone_id: Option<u32>,
    total_cycles: u64,
    entries: u64,
}

impl<C: CycleSource> TimestampZone<C> {
    /// Zone for `site` reading `clock`.
    pub fn new(site: WaitSite, clock: C) -> Self {
        Self {
            site,
            clock,
            zone_id: None,
            total_cycles: 0,
            entries: 0,
        }
    }

    /// Wait site this zone instruments.
    pub fn site(&self) -> WaitSite {
        self.site
    }

    /// Spin until `ready` returns true inside a timestamp zone.
    ///
    /// Returns the elapsed cycles for this entry.
    pub fn wait_until<P>(&mut self, zone_id: u32, mut ready: P) -> u64
    where
        P: FnMut() -> bool,
    {
        self.zone_id = Some(zone_id);
        let start = self.clock.now();
        while !ready() {}
        let end = self.clock.now();
        let elapsed = end.wrapping_sub(start);
        self.total_cycles = self.total_cycles.wrapping_add(elapsed);
        self.entries += 1;
        elapsed
    }

    /// Sum of elapsed cycles over all entries.
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Number of zone entries.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Zone id written by the last entry.
    pub fn last_zone_id(&self) -> Option<u32> {
        self.zone_id
    }

    /// Borrow the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutably borrow the clock.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

/// Final values of both wait-site counters for one kernel.
///
/// The two loops run on different hardware threads and their blocked
/// intervals may overlap, so this type has no combined total. Pick one site
/// with [`WaitCounters::select`] and use it for a whole comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitCounters {
    /// Input-side loop iterations.
    pub wait_front: u32,
    /// Output-side loop iterations.
    pub reserve_back: u32,
}

impl WaitCounters {
    /// Iterations of the chosen site.
    pub fn select(&self, site: WaitSite) -> u32 {
        match site {
            WaitSite::WaitFront => self.wait_front,
            WaitSite::ReserveBack => self.reserve_back,
        }
    }
}

/// Tracks successive publications of one counter and flags values that
/// break monotonic growth or exceed the expected iteration bound.
#[derive(Debug, Clone)]
pub struct PublicationCheck {
    bound: u32,
    last: Option<u32>,
    overflow: Option<CounterOverflow>,
}

impl PublicationCheck {
    /// Checker accepting values up to and including `bound`.
    pub fn new(bound: u32) -> Self {
        Self { bound, last: None, overflow: None }
    }

    /// Record the next publication.
    pub fn observe(&mut self, value: u32) {
        if self.overflow.is_none() {
            if let Some(previous) = self.last {
                if value < previous {
                    self.overflow = Some(CounterOverflow::Wrapped { previous, observed: value });
                }
            }
            if self.overflow.is_none() && value > self.bound {
                self.overflow = Some(CounterOverflow::AboveBound { observed: value, bound: self.bound });
            }
        }
        self.last = Some(value);
    }

    /// Last value seen.
    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// First violation seen, if any.
    pub fn overflow(&self) -> Option<CounterOverflow> {
        self.overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::clock::StepClock;
    use std::cell::Cell;

    fn ready_after(n: u32) -> impl FnMut() -> bool {
        let polls = Cell::new(0u32);
        move || {
            let seen = polls.get();
            polls.set(seen + 1);
            seen >= n
        }
    }

    #[test]
    fn test_counter_counts_failed_polls() {
        let mut counter = WaitLoopCounter::new(WaitSite::WaitFront);
        assert_eq!(counter.wait_until(ready_after(5)), 5);
        assert_eq!(counter.wait_until(ready_after(3)), 3);
        assert_eq!(counter.published(), 8);
        counter.reset();
        assert_eq!(counter.published(), 0);
    }

    #[test]
    fn test_counter_ready_immediately() {
        let mut counter = WaitLoopCounter::new(WaitSite::ReserveBack);
        assert_eq!(counter.wait_until(|| true), 0);
        assert_eq!(counter.published(), 0);
    }

    #[derive(Default)]
    struct AuditedSlot {
        value: u32,
        stores: usize,
    }

    impl CounterSlot for AuditedSlot {
        fn load(&self) -> u32 {
            self.value
        }
        fn store(&mut self, value: u32) {
            self.value = value;
            self.stores += 1;
        }
    }

    #[test]
    fn test_one_store_per_call_regardless_of_iterations() {
        let mut counter = WaitLoopCounter::with_slot(WaitSite::WaitFront, AuditedSlot::default());
        counter.wait_until(ready_after(1000));
        let slot = counter.into_slot();
        assert_eq!(slot.value, 1000);
        assert_eq!(slot.stores, 1);
    }

    #[test]
    fn test_scope_publishes_on_drop() {
        let mut slot = 7u32;
        {
            let mut scope = CounterScope::enter(&mut slot);
            scope.tick();
            scope.tick();
        }
        assert_eq!(slot, 9);
    }

    #[test]
    fn test_counter_wraps_at_width() {
        let mut counter = WaitLoopCounter::with_slot(WaitSite::WaitFront, u32::MAX - 1);
        assert_eq!(counter.wait_until(ready_after(3)), 3);
        assert_eq!(counter.published(), 1);
    }

    #[test]
    fn test_timestamp_zone_sums_entries() {
        let mut zone = TimestampZone::new(WaitSite::WaitFront, StepClock::new(4));
        let first = zone.wait_until(1, ready_after(2));
        let second = zone.wait_until(1, || true);
        assert_eq!(first, 4);
        assert_eq!(second, 4);
        assert_eq!(zone.total_cycles(), 8);
        assert_eq!(zone.entries(), 2);
        assert_eq!(zone.last_zone_id(), Some(1));
    }

    #[test]
    fn test_sites_on_separate_threads_own_their_counters() {
        let mut front = WaitLoopCounter::new(WaitSite::WaitFront);
        let mut back = WaitLoopCounter::new(WaitSite::ReserveBack);
        std::thread::scope(|s| {
            s.spawn(|| front.wait_until(ready_after(40)));
            s.spawn(|| back.wait_until(ready_after(25)));
        });
        let counters = WaitCounters {
            wait_front: front.published(),
            reserve_back: back.published(),
        };
        assert_eq!(counters.select(WaitSite::WaitFront), 40);
        assert_eq!(counters.select(WaitSite::ReserveBack), 25);
    }

    #[test]
    fn test_publication_check_flags_wrap_and_bound() {
        let mut check = PublicationCheck::new(1_000);
        for v in [10, 20, 20, 30] {
            check.observe(v);
        }
        assert!(check.overflow().is_none());
        assert_eq!(check.last(), Some(30));

        check.observe(5);
        assert_eq!(check.overflow(), Some(CounterOverflow::Wrapped { previous: 30, observed: 5 }));

        let mut bounded = PublicationCheck::new(100);
        bounded.observe(101);
        assert_eq!(bounded.overflow(), Some(CounterOverflow::AboveBound { observed: 101, bound: 100 }));
    }
}

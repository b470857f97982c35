//! Ping-pong delta state for kernel accumulators.
//!
//! Providers like `unix:0:sysinfo` and `unix:0:vminfo` keep running sums the
//! kernel adds to once per update tick; a scrape sees the accumulator, not a
//! rate. The tracker keeps the last two raw samples in alternating slots and
//! yields the per-tick delta, normalized with a round-to-nearest rule so the
//! integer division does not systematically truncate.

/// Nearest-integer normalization of a counter delta over `ticks` update
/// intervals: `(0.5 * ticks + delta) / ticks`, truncated. `ticks` is
/// clamped to at least 1; dividing by sub-tick intervals would only amplify
/// noise.
pub fn per_tick(delta: u64, ticks: u64) -> u64 {
    let ticks = ticks.max(1);
    ((0.5 * ticks as f64 + delta as f64) / ticks as f64) as u64
}

/// Two alternating raw slots plus the tick counter they were taken at.
/// `N` is the number of tracked fields of the metric group.
pub struct DeltaTracker<const N: usize> {
    slots: [[u64; N]; 2],
    ticks: [u64; 2],
    latest: usize,
    filled: u8,
}

impl<const N: usize> Default for DeltaTracker<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DeltaTracker<N> {
    pub fn new() -> Self {
        Self {
            slots: [[0; N]; 2],
            ticks: [0; 2],
            latest: 0,
            filled: 0,
        }
    }

    /// Record a new raw sample and produce the normalized per-tick deltas
    /// against the previous one. The very first call after start (or after
    /// [`reset`](Self::reset)) has no prior slot and returns `None`; the
    /// caller must emit nothing for the group this scrape.
    ///
    /// `tick_counter` is the kernel's own update counter for the provider
    /// (e.g. the `updates` field); its delta is the elapsed tick count.
    /// A raw field that moved backwards (provider reset) contributes a zero
    /// delta instead of an unsigned wrap.
    pub fn update(&mut self, raw: [u64; N], tick_counter: u64) -> Option<[u64; N]> {
        let slot = if self.filled == 0 { 0 } else { 1 - self.latest };
        let prev = self.latest;
        self.slots[slot] = raw;
        self.ticks[slot] = tick_counter;
        self.latest = slot;

        if self.filled < 2 {
            self.filled += 1;
            if self.filled < 2 {
                return None;
            }
        }

        let ticks = self.ticks[slot].saturating_sub(self.ticks[prev]).max(1);
        let mut out = [0u64; N];
        for (i, v) in out.iter_mut().enumerate() {
            let delta = self.slots[slot][i].saturating_sub(self.slots[prev][i]);
            *v = per_tick(delta, ticks);
        }
        Some(out)
    }

    /// Forget both slots; the next update is suppressed again. Used after a
    /// discontinuity (the provider's record vanished and came back).
    pub fn reset(&mut self) {
        self.filled = 0;
        self.latest = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_suppressed() {
        let mut t: DeltaTracker<1> = DeltaTracker::new();
        assert_eq!(t.update([100], 0), None);
        assert!(t.update([150], 5).is_some());
    }

    #[test]
    fn rounding_formula_literal_outputs() {
        // (0.5 * 5 + 50) / 5 = 10.5, truncated to 10
        assert_eq!(per_tick(50, 5), 10);
        // (0.5 * 5 + 53) / 5 = 11.1 -> 11: the half-tick term rounds up
        assert_eq!(per_tick(53, 5), 11);
        // (0.5 * 4 + 10) / 4 = 3.0 -> 3 (exact half rounds up)
        assert_eq!(per_tick(10, 4), 3);
        assert_eq!(per_tick(0, 7), 0);
        // sub-tick sampling clamps to one tick instead of dividing by zero
        assert_eq!(per_tick(9, 0), 9);
    }

    #[test]
    fn second_sample_yields_normalized_delta() {
        let mut t: DeltaTracker<2> = DeltaTracker::new();
        assert_eq!(t.update([100, 7], 10), None);
        let rates = t.update([150, 7], 15).expect("second sample");
        assert_eq!(rates, [10, 0]);
    }

    #[test]
    fn slots_alternate_across_updates() {
        let mut t: DeltaTracker<1> = DeltaTracker::new();
        assert_eq!(t.update([0], 0), None);
        assert_eq!(t.update([10], 1), Some([10]));
        assert_eq!(t.update([40], 4), Some([10]));
        assert_eq!(t.update([40], 5), Some([0]));
    }

    #[test]
    fn counter_regression_contributes_zero() {
        let mut t: DeltaTracker<1> = DeltaTracker::new();
        t.update([500], 0);
        // provider reset between samples
        assert_eq!(t.update([20], 5), Some([0]));
    }

    #[test]
    fn reset_suppresses_again() {
        let mut t: DeltaTracker<1> = DeltaTracker::new();
        t.update([0], 0);
        assert!(t.update([5], 1).is_some());
        t.reset();
        assert_eq!(t.update([10], 2), None);
        assert!(t.update([15], 3).is_some());
    }
}

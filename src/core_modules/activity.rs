// THEORY:
// The `activity` module is the temporal layer of the engine: a stateful,
// fixed-capacity record of how the world totals have been moving. It keeps
// a sliding window of one-second samples (oldest evicted, newest appended,
// every logical tick) and derives a chart scale from the deltas observed
// across the whole window.
//
// Key architectural principles:
// 1.  **Windowed Deltas**: each sample's deltas are measured against the
//     sample being evicted, not the previous tick. A bar therefore shows
//     "change over the window duration", which reads as sustained activity
//     rather than instantaneous jitter.
// 2.  **Drift-Free Cadence**: the tick marker advances by exactly one
//     second per tick regardless of when the caller happened to check in.
//     Only after a long gap (a paused tab, a stalled host) does the marker
//     resynchronize to the caller's clock, so a pause never produces a
//     burst of catch-up ticks.
// 3.  **Nice Scale**: chart bounds are the smallest multiples of a power of
//     ten strictly beyond the observed extremes, so gridlines land on round
//     numbers at any data magnitude. An all-zero window still yields a
//     usable (+10, -10) range.

use std::collections::VecDeque;

use crate::core_modules::geo::CountTotals;

/// Samples kept in the window: three minutes of one-second ticks.
pub const DEFAULT_WINDOW_CAPACITY: usize = 180;

const TICK_MS: u64 = 1_000;
const RESYNC_THRESHOLD_MS: u64 = 5_000;

/// One tick of change in the world totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySample {
    pub device_count: u64,
    pub device_delta: i64,
    pub happy_count: u64,
    pub happy_delta: i64,
    pub sad_count: u64,
    pub sad_delta: i64,
    pub time_ms: u64,
}

/// Symmetric "nice number" chart bounds derived from the window's deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartScale {
    pub pos: i64,
    pub neg: i64,
}

impl ChartScale {
    pub fn range(&self) -> i64 {
        self.pos - self.neg
    }
}

/// A fixed-length time series of per-second world-total deltas.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    samples: VecDeque<ActivitySample>,
    last_update_ms: u64,
    awaiting_first_totals: bool,
}

impl ActivityMonitor {
    /// A window of `capacity` zeroed samples. `now_ms` seeds the tick
    /// marker; all later `update` calls must use the same clock.
    pub fn new(capacity: usize, now_ms: u64) -> Self {
        let mut samples = VecDeque::with_capacity(capacity + 1);
        samples.resize(capacity, ActivitySample::default());
        Self {
            samples,
            last_update_ms: now_ms,
            awaiting_first_totals: true,
        }
    }

    pub fn samples(&self) -> &VecDeque<ActivitySample> {
        &self.samples
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Records one tick if at least a second has elapsed since the marker.
    /// Returns whether a tick was recorded.
    pub fn update(&mut self, now_ms: u64, totals: &CountTotals) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_update_ms);
        if elapsed < TICK_MS {
            return false;
        }

        // The first populated response becomes the baseline, so the first
        // delta is not a spurious jump from the zero-filled window.
        if self.awaiting_first_totals && totals.device_count > 0 {
            self.awaiting_first_totals = false;
            if let Some(oldest) = self.samples.front_mut() {
                oldest.device_count = totals.device_count;
                oldest.happy_count = totals.happy_count;
                oldest.sad_count = totals.sad_count;
            }
        }

        let baseline = self
            .samples
            .pop_front()
            .unwrap_or_default();
        self.samples.push_back(ActivitySample {
            device_count: totals.device_count,
            device_delta: totals.device_count as i64 - baseline.device_count as i64,
            happy_count: totals.happy_count,
            happy_delta: totals.happy_count as i64 - baseline.happy_count as i64,
            sad_count: totals.sad_count,
            sad_delta: totals.sad_count as i64 - baseline.sad_count as i64,
            time_ms: now_ms,
        });

        self.last_update_ms = if elapsed > RESYNC_THRESHOLD_MS {
            now_ms
        } else {
            self.last_update_ms + TICK_MS
        };
        true
    }

    /// Chart bounds covering every delta currently in the window.
    pub fn scale(&self) -> ChartScale {
        ChartScale {
            pos: scale_pos(self.max_delta()),
            neg: scale_neg(self.min_delta()),
        }
    }

    fn min_delta(&self) -> i64 {
        self.samples
            .iter()
            .flat_map(|s| [s.device_delta, s.happy_delta, s.sad_delta])
            .min()
            .unwrap_or(0)
    }

    fn max_delta(&self) -> i64 {
        self.samples
            .iter()
            .flat_map(|s| [s.device_delta, s.happy_delta, s.sad_delta])
            .max()
            .unwrap_or(0)
    }
}

/// Smallest `k * 10^n` (integer k >= 1) strictly greater than `max_delta`.
fn scale_pos(max_delta: i64) -> i64 {
    let mut scale = 10.0;
    while max_delta as f64 / scale > 10.0 {
        scale *= 10.0;
    }
    (max_delta as f64 / scale).floor() as i64 * scale as i64 + scale as i64
}

/// Mirror of `scale_pos` for the negative bound.
fn scale_neg(min_delta: i64) -> i64 {
    let mut scale = -10.0;
    while min_delta as f64 / scale > 10.0 {
        scale *= 10.0;
    }
    (min_delta as f64 / scale).floor() as i64 * scale as i64 + scale as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(device: u64, happy: u64, sad: u64) -> CountTotals {
        CountTotals {
            device_count: device,
            happy_count: happy,
            sad_count: sad,
        }
    }

    #[test]
    fn window_length_is_invariant() {
        let mut monitor = ActivityMonitor::new(5, 0);
        assert_eq!(monitor.capacity(), 5);

        let mut now = 0;
        for i in 0..6 {
            now += 1_000;
            assert!(monitor.update(now, &totals(100 + i, 0, 0)));
            assert_eq!(monitor.samples().len(), 5);
        }
    }

    #[test]
    fn oldest_sample_is_evicted_after_capacity_plus_one_ticks() {
        let mut monitor = ActivityMonitor::new(3, 0);
        let mut now = 0;

        // Three ticks replace the zero-filled window with marked samples.
        for i in 1..=3 {
            now += 1_000;
            monitor.update(now, &totals(i * 10, 0, 0));
        }
        assert_eq!(monitor.samples()[0].time_ms, 1_000);

        // The fourth tick evicts the first marked sample exactly once.
        now += 1_000;
        monitor.update(now, &totals(40, 0, 0));
        assert_eq!(monitor.samples()[0].time_ms, 2_000);
        assert!(monitor.samples().iter().all(|s| s.time_ms >= 2_000));
    }

    #[test]
    fn no_tick_before_a_full_second() {
        let mut monitor = ActivityMonitor::new(4, 0);
        assert!(!monitor.update(999, &totals(10, 0, 0)));
        assert!(monitor.update(1_000, &totals(10, 0, 0)));
    }

    #[test]
    fn deltas_are_measured_against_the_evicted_sample() {
        let mut monitor = ActivityMonitor::new(2, 0);
        monitor.update(1_000, &totals(100, 60, 10));
        monitor.update(2_000, &totals(150, 80, 30));
        // Window now holds the 100- and 150-device samples. The next tick
        // evicts the 100 baseline, so the delta spans the whole window.
        monitor.update(3_000, &totals(170, 90, 35));

        let newest = monitor.samples().back().unwrap();
        assert_eq!(newest.device_delta, 70);
        assert_eq!(newest.happy_delta, 30);
        assert_eq!(newest.sad_delta, 25);
    }

    #[test]
    fn first_populated_totals_backfill_the_baseline() {
        let mut monitor = ActivityMonitor::new(4, 0);
        // Empty world: ticks happen but the baseline wait continues.
        monitor.update(1_000, &totals(0, 0, 0));
        assert_eq!(monitor.samples().back().unwrap().device_delta, 0);

        // First populated response: no spurious jump from zero.
        monitor.update(2_000, &totals(5_000, 4_000, 500));
        let newest = monitor.samples().back().unwrap();
        assert_eq!(newest.device_delta, 0);
        assert_eq!(newest.happy_delta, 0);
        assert_eq!(newest.sad_delta, 0);
        assert_eq!(newest.device_count, 5_000);
    }

    #[test]
    fn marker_advances_one_second_per_tick_without_drift() {
        let mut monitor = ActivityMonitor::new(4, 0);
        // Caller checks in late every frame; the marker must not drift.
        assert!(monitor.update(1_300, &totals(10, 0, 0)));
        // Marker sits at 1,000, so 2,100 is a full tick later.
        assert!(monitor.update(2_100, &totals(10, 0, 0)));
        // ...and 2,900 is not.
        assert!(!monitor.update(2_900, &totals(10, 0, 0)));
        assert!(monitor.update(3_000, &totals(10, 0, 0)));
    }

    #[test]
    fn long_gaps_resynchronize_instead_of_bursting() {
        let mut monitor = ActivityMonitor::new(4, 0);
        assert!(monitor.update(1_000, &totals(10, 0, 0)));
        // A nine-second stall: one tick, then the marker snaps to now.
        assert!(monitor.update(10_000, &totals(10, 0, 0)));
        assert!(!monitor.update(10_500, &totals(10, 0, 0)));
        assert!(monitor.update(11_000, &totals(10, 0, 0)));
    }

    #[test]
    fn scale_picks_round_bounds_beyond_the_extremes() {
        assert_eq!(scale_pos(42), 50);
        assert_eq!(scale_neg(-3), -10);
        assert_eq!(scale_pos(7), 10);
        // A bound already on a round number steps to the next one.
        assert_eq!(scale_pos(50), 60);
        // The bound keeps a single-digit mantissa: 1,700 rounds up to 2,000.
        assert_eq!(scale_pos(1_700), 2_000);
        assert_eq!(scale_neg(-500), -600);
    }

    #[test]
    fn window_deltas_drive_the_scale() {
        let mut monitor = ActivityMonitor::new(3, 0);
        monitor.update(1_000, &totals(100, 50, 10));
        monitor.update(2_000, &totals(142, 57, 7));

        // Deltas in the window: {42, 7, -3} and zeros.
        let scale = monitor.scale();
        assert_eq!(scale.pos, 50);
        assert_eq!(scale.neg, -10);
        assert_eq!(scale.range(), 60);
    }

    #[test]
    fn all_zero_window_still_yields_a_usable_scale() {
        let monitor = ActivityMonitor::new(4, 0);
        let scale = monitor.scale();
        assert_eq!(scale.pos, 10);
        assert_eq!(scale.neg, -10);
        assert!(scale.range() > 0);
    }
}

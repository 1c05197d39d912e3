//! Drift-corrected periodic delay.

use std::thread;
use std::time::{Duration, Instant};

/// Real-time cadence helper for a worker's main loop.
///
/// `mark_start` records when a cycle began; `wait_remainder` sleeps for
/// whatever is left of the configured interval. A cycle that overruns its
/// interval is not compensated by running faster later — the next cycle
/// simply measures from real elapsed time again, which is what keeps the
/// cadence from drifting.
///
/// Owned and mutated by a single thread; never shared.
#[derive(Debug)]
pub struct DelayTimer {
    interval: Duration,
    started: Option<Instant>,
}

impl DelayTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: None,
        }
    }

    /// Change the target cadence; takes effect on the next cycle.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record the current monotonic time as the cycle start.
    pub fn mark_start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Block for `interval - elapsed` if positive; return immediately
    /// otherwise. Without a prior [`DelayTimer::mark_start`] this is a no-op.
    pub fn wait_remainder(&self) {
        let Some(started) = self.started else {
            return;
        };
        let elapsed = started.elapsed();
        if elapsed < self.interval {
            thread::sleep(self.interval - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_cycle_returns_immediately() {
        let mut timer = DelayTimer::new(Duration::from_millis(20));
        timer.mark_start();
        thread::sleep(Duration::from_millis(30));

        let before = Instant::now();
        timer.wait_remainder();
        assert!(
            before.elapsed() < Duration::from_millis(10),
            "no sleep expected once the interval is already spent"
        );
    }

    #[test]
    fn wait_covers_the_remainder_of_the_interval() {
        let mut timer = DelayTimer::new(Duration::from_millis(80));
        timer.mark_start();
        thread::sleep(Duration::from_millis(20));

        timer.wait_remainder();
        let cycle = timer.started.expect("marked").elapsed();
        assert!(
            cycle >= Duration::from_millis(80),
            "full interval should have elapsed, got {cycle:?}"
        );
        assert!(
            cycle < Duration::from_millis(200),
            "slept far beyond the interval: {cycle:?}"
        );
    }

    #[test]
    fn unmarked_timer_does_not_block() {
        let timer = DelayTimer::new(Duration::from_secs(5));
        let before = Instant::now();
        timer.wait_remainder();
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn interval_change_applies_to_next_cycle() {
        let mut timer = DelayTimer::new(Duration::from_millis(10));
        timer.set_interval(Duration::from_millis(25));
        timer.mark_start();
        timer.wait_remainder();
        assert!(timer.started.expect("marked").elapsed() >= Duration::from_millis(25));
    }
}

use std::time::{Duration, Instant};

/// Paces a loop to a fixed tick duration, sleeping off the surplus.
///
/// When the loop falls further behind than `max_difference` the internal
/// clock is snapped forward instead of trying to catch up tick by tick.
pub struct Interval {
    internal_time: Instant,
    max_difference: Duration,
    target_interval: Duration,
}
impl Interval {
    pub fn new(interval: Duration, max_difference: Duration) -> Self {
        Self {
            internal_time: Instant::now(),
            max_difference,
            target_interval: interval,
        }
    }

    pub fn step(&mut self) {
        let now = Instant::now();

        self.internal_time += self.target_interval;

        if let Some(behind) = now.checked_duration_since(self.internal_time) {
            if behind > self.max_difference {
                log::debug!(
                    "Tick loop behind by {}ms which is more than maximum of {}ms",
                    behind.as_millis(),
                    self.max_difference.as_millis()
                );
                self.internal_time = now - self.max_difference;
            }
        }

        if let Some(delay) = self.internal_time.checked_duration_since(now) {
            std::thread::sleep(delay);
        }
    }
}

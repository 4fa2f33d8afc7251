//! Adaptive batch sizing: grows or shrinks the fetch limit toward a
//! target per-fetch duration, clamped to configured bounds and to a memory
//! estimate ceiling.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub target_duration: Duration,
    /// Below this, fetch time is considered effectively instantaneous and
    /// left alone rather than growing unboundedly (hard floor ~0.1s).
    pub lower_floor: Duration,
    pub memory_cap_bytes: u64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 1_000,
            max_batch_size: 50_000,
            target_duration: Duration::from_secs(2),
            lower_floor: Duration::from_millis(100),
            memory_cap_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Owned by one Table Orchestrator for the lifetime of a table's run
///.
pub struct AdaptiveBatchSizer {
    config: SizingConfig,
    current: usize,
    avg_row_bytes: u64,
}

impl AdaptiveBatchSizer {
    pub fn new(config: SizingConfig, starting_size: usize) -> Self {
        let current = starting_size.clamp(config.min_batch_size, config.max_batch_size);
        Self { config, current, avg_row_bytes: 1024 }
    }

    pub fn current_size(&self) -> usize {
        self.current
    }

    /// Feeds the observed average serialized row size back into the sizer
    /// so the next memory-cap check reflects actual data, not a guess.
    pub fn observe_row_bytes(&mut self, avg_row_bytes: u64) {
        if avg_row_bytes > 0 {
            self.avg_row_bytes = avg_row_bytes;
        }
    }

    /// Adjusts `current` after one batch's fetch duration: below
    /// target, grow by 1.5x; above target, shrink by 0.5x; otherwise hold.
    /// Returns `true` if the result was clamped by the memory cap, which
    /// callers should log as a warning.
    pub fn record_fetch_duration(&mut self, fetch_duration: Duration) -> bool {
        if fetch_duration < self.config.target_duration.mul_f64(0.5).max(self.config.lower_floor) {
            self.current = ((self.current as f64) * 1.5) as usize;
        } else if fetch_duration > self.config.target_duration {
            self.current = ((self.current as f64) * 0.5).max(1.0) as usize;
        }

        self.current = self.current.clamp(self.config.min_batch_size, self.config.max_batch_size);

        let memory_estimate = self.current as u64 * self.avg_row_bytes * 2;
        if memory_estimate > self.config.memory_cap_bytes && self.avg_row_bytes > 0 {
            let capped = (self.config.memory_cap_bytes / (self.avg_row_bytes * 2)).max(1) as usize;
            if capped < self.current {
                self.current = capped.clamp(self.config.min_batch_size.min(capped), self.config.max_batch_size);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_when_fetch_is_fast() {
        let mut sizer = AdaptiveBatchSizer::new(SizingConfig::default(), 1_000);
        sizer.record_fetch_duration(Duration::from_millis(100));
        assert!(sizer.current_size() > 1_000);
    }

    #[test]
    fn shrinks_when_fetch_is_slow() {
        let mut sizer = AdaptiveBatchSizer::new(SizingConfig::default(), 10_000);
        sizer.record_fetch_duration(Duration::from_secs(5));
        assert!(sizer.current_size() < 10_000);
    }

    #[test]
    fn never_exceeds_configured_max() {
        let mut sizer = AdaptiveBatchSizer::new(SizingConfig::default(), 49_000);
        for _ in 0..5 {
            sizer.record_fetch_duration(Duration::from_millis(1));
        }
        assert!(sizer.current_size() <= 50_000);
    }

    #[test]
    fn never_drops_below_configured_min() {
        let mut sizer = AdaptiveBatchSizer::new(SizingConfig::default(), 1_500);
        for _ in 0..5 {
            sizer.record_fetch_duration(Duration::from_secs(10));
        }
        assert!(sizer.current_size() >= 1_000);
    }

    #[test]
    fn memory_cap_clamps_and_reports_warning() {
        let config = SizingConfig { memory_cap_bytes: 1_000, ..SizingConfig::default() };
        let mut sizer = AdaptiveBatchSizer::new(config, 1_000);
        sizer.observe_row_bytes(10_000);
        let clamped = sizer.record_fetch_duration(Duration::from_millis(1));
        assert!(clamped);
    }
}

//! Timing helpers for logging how long refresh phases take.

use log::{debug, info};
use std::time::{Duration, Instant};

/// A timer for measuring operation durations
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    /// Create a new timer for the given operation
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    /// Add a checkpoint to track intermediate timing
    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        debug!(
            "{} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
        self.checkpoints.push((checkpoint_name.to_string(), now));
    }

    /// Finish the timer and log the total duration with per-checkpoint segments
    pub fn finish(self) -> Duration {
        let total_duration = self.start_time.elapsed();
        info!(
            "{} completed in {:.2}s",
            self.operation_name,
            total_duration.as_secs_f64()
        );

        let mut last_time = self.start_time;
        for (name, time) in &self.checkpoints {
            info!("   └─ {}: {}ms", name, time.duration_since(last_time).as_millis());
            last_time = *time;
        }
        total_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reports_at_least_checkpoint_time() {
        let mut timer = Timer::start("unit");
        std::thread::sleep(Duration::from_millis(5));
        timer.checkpoint("slept");
        assert!(timer.finish() >= Duration::from_millis(5));
    }
}

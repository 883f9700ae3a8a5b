use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Spaces probe launches to at most `per_sec` per second across all workers.
pub struct LaunchPacer {
    ticks: Mutex<Interval>,
}

impl LaunchPacer {
    /// Returns `None` for 0, which means launches are not paced at all.
    pub fn new(per_sec: u32) -> Option<Self> {
        if per_sec == 0 {
            return None;
        }
        let period = Duration::from_micros(1_000_000 / per_sec as u64).max(Duration::from_micros(1));
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(LaunchPacer { ticks: Mutex::new(ticks) })
    }

    pub async fn wait(&self) {
        self.ticks.lock().await.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn zero_disables_pacing() {
        assert!(LaunchPacer::new(0).is_none());
    }

    #[tokio::test]
    async fn launches_are_spaced() {
        let pacer = LaunchPacer::new(100).unwrap();
        let started = Instant::now();
        for _ in 0..3 {
            pacer.wait().await;
        }
        // first tick is immediate, the next two are 10 ms apart
        assert!(started.elapsed() >= Duration::from_millis(18));
    }
}

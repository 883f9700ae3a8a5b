use std::time::Duration;

/// Tunables for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// A restart needs the prior score sum strictly above this...
    pub restart_high_score: i64,
    /// ...and the new score sum strictly below this.
    pub restart_low_score: i64,
    pub session_stale_after: Duration,
    pub server_lost_after: Duration,
    /// Trailing days (besides today) recomputed by the per-cycle rollup refresh.
    pub rollup_window_days: u32,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ReconcileSettings {
            restart_high_score: 500,
            restart_low_score: 200,
            session_stale_after: Duration::from_secs(6 * 60),
            server_lost_after: Duration::from_secs(15 * 60),
            rollup_window_days: 1,
        }
    }
}

impl ReconcileSettings {
    pub fn is_restart(&self, prior_total: i64, current_total: i64) -> bool {
        prior_total > self.restart_high_score && current_total < self.restart_low_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_thresholds_are_strict() {
        let s = ReconcileSettings { restart_high_score: 500, restart_low_score: 200, ..Default::default() };
        assert!(s.is_restart(600, 150));
        assert!(!s.is_restart(600, 400));
        assert!(!s.is_restart(500, 0));
        assert!(!s.is_restart(600, 200));
        assert!(s.is_restart(501, 199));
    }
}

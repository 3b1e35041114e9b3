use tokio::time::{Duration, Instant};

use crate::models::snapshot::ClockSnapshot;

/// Local accounting state for one subject.
///
/// Every method is a short mutation with no suspension point, so callers only
/// need to hold a mutex around each call to get run-to-completion semantics.
#[derive(Debug, Clone)]
pub struct SessionClock {
    accumulated_unsynced: f64,
    total_local: f64,
    last_activity: Instant,
    idle: bool,
    rate_multiplier: f64,
    idle_threshold: Duration,
}

impl SessionClock {
    pub fn new(rate_multiplier: f64, idle_threshold: Duration, now: Instant) -> Self {
        Self {
            accumulated_unsynced: 0.0,
            total_local: 0.0,
            last_activity: now,
            idle: false,
            rate_multiplier,
            idle_threshold,
        }
    }

    /// Adds the server-side total to the running display total.
    ///
    /// Seconds accrued before the seed arrived are kept, so the total never
    /// moves backwards. Negative remote values count as zero.
    pub fn seed(&mut self, remote_total: i64) {
        self.total_local += remote_total.max(0) as f64;
    }

    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.idle = false;
    }

    /// Credits one tick if the view is in the foreground and input was seen
    /// within the idle threshold. Returns whether anything was credited.
    pub fn tick(&mut self, now: Instant, foreground: bool) -> bool {
        let since_activity = now.saturating_duration_since(self.last_activity);
        if foreground && since_activity < self.idle_threshold {
            self.total_local += self.rate_multiplier;
            self.accumulated_unsynced += self.rate_multiplier;
            self.idle = false;
            true
        } else {
            self.idle = true;
            false
        }
    }

    /// Removes the whole-second part of the unsynced seconds and returns it,
    /// or `None` when less than one second is pending.
    pub fn take_pending(&mut self) -> Option<u64> {
        let whole = self.accumulated_unsynced.floor();
        if whole < 1.0 {
            return None;
        }
        self.accumulated_unsynced -= whole;
        Some(whole as u64)
    }

    /// Puts back seconds taken by [`take_pending`](Self::take_pending) after a failed flush.
    pub fn restore_pending(&mut self, seconds: u64) {
        self.accumulated_unsynced += seconds as f64;
    }

    pub fn accumulated_unsynced(&self) -> f64 {
        self.accumulated_unsynced
    }

    pub fn total_local(&self) -> f64 {
        self.total_local
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            total_seconds: self.total_local.floor() as u64,
            idle: self.idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(60);

    fn clock(multiplier: f64) -> (SessionClock, Instant) {
        let start = Instant::now();
        (SessionClock::new(multiplier, THRESHOLD, start), start)
    }

    #[test]
    fn test_active_tick_credits_both_counters() {
        let (mut clock, start) = clock(1.0);
        assert!(clock.tick(start + Duration::from_secs(1), true));
        assert!(clock.tick(start + Duration::from_secs(2), true));
        assert_eq!(clock.total_local(), 2.0);
        assert_eq!(clock.accumulated_unsynced(), 2.0);
        assert!(!clock.is_idle());
    }

    #[test]
    fn test_idle_threshold_is_exclusive() {
        let (mut clock, start) = clock(1.0);
        assert!(clock.tick(start + Duration::from_secs(59), true));
        assert!(!clock.tick(start + Duration::from_secs(60), true));
        assert!(clock.is_idle());
        assert_eq!(clock.total_local(), 1.0);
    }

    #[test]
    fn test_background_view_does_not_accrue() {
        let (mut clock, start) = clock(1.0);
        assert!(!clock.tick(start + Duration::from_secs(1), false));
        assert!(clock.is_idle());
        assert_eq!(clock.accumulated_unsynced(), 0.0);
    }

    #[test]
    fn test_activity_clears_idle_without_backfill() {
        let (mut clock, start) = clock(1.0);
        for s in 60..70 {
            clock.tick(start + Duration::from_secs(s), true);
        }
        assert!(clock.is_idle());
        assert_eq!(clock.total_local(), 0.0);

        clock.record_activity(start + Duration::from_secs(70));
        assert!(!clock.is_idle());
        assert!(clock.tick(start + Duration::from_secs(71), true));
        assert_eq!(clock.total_local(), 1.0);
    }

    #[test]
    fn test_multiplier_scales_credit() {
        let (mut clock, start) = clock(2.0);
        for s in 1..=5 {
            clock.tick(start + Duration::from_secs(s), true);
        }
        assert_eq!(clock.total_local(), 10.0);
        assert_eq!(clock.accumulated_unsynced(), 10.0);
    }

    #[test]
    fn test_take_pending_floors_and_keeps_fraction() {
        let (mut clock, start) = clock(1.5);
        for s in 1..=3 {
            clock.tick(start + Duration::from_secs(s), true);
        }
        assert_eq!(clock.take_pending(), Some(4));
        assert_eq!(clock.accumulated_unsynced(), 0.5);
        assert_eq!(clock.take_pending(), None);
    }

    #[test]
    fn test_restore_pending_undoes_take() {
        let (mut clock, start) = clock(1.5);
        for s in 1..=5 {
            clock.tick(start + Duration::from_secs(s), true);
        }
        let before = clock.accumulated_unsynced();
        let taken = clock.take_pending().unwrap();
        clock.restore_pending(taken);
        assert_eq!(clock.accumulated_unsynced(), before);
    }

    #[test]
    fn test_seed_keeps_local_accrual() {
        let (mut clock, start) = clock(1.0);
        clock.tick(start + Duration::from_secs(1), true);
        clock.seed(100);
        assert_eq!(clock.snapshot().total_seconds, 101);
        // Seeding is display only; nothing new is pending for the server.
        assert_eq!(clock.accumulated_unsynced(), 1.0);
    }

    #[test]
    fn test_negative_seed_counts_as_zero() {
        let (mut clock, _) = clock(1.0);
        clock.seed(-5);
        assert_eq!(clock.total_local(), 0.0);
    }

    #[test]
    fn test_snapshot_floors_fractional_total() {
        let (mut clock, start) = clock(0.5);
        for s in 1..=3 {
            clock.tick(start + Duration::from_secs(s), true);
        }
        assert_eq!(clock.snapshot().total_seconds, 1);
    }
}

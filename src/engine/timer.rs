use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// Optional wall-clock stop deadline. Zero means no timer is armed. Every
/// cooperating wait polls this once per second.
#[derive(Debug, Default)]
pub struct StopTimer {
    deadline_secs: AtomicI64,
}

impl StopTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hours(&self, hours: f64) {
        let deadline = Utc::now().timestamp() + (hours * 3600.0) as i64;
        self.deadline_secs.store(deadline, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.deadline_secs.store(0, Ordering::Relaxed);
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_secs.load(Ordering::Relaxed) != 0
    }

    pub fn is_expired(&self) -> bool {
        let deadline = self.deadline_secs.load(Ordering::Relaxed);
        deadline != 0 && Utc::now().timestamp() >= deadline
    }

    pub fn remaining_secs(&self) -> Option<i64> {
        let deadline = self.deadline_secs.load(Ordering::Relaxed);
        if deadline == 0 {
            None
        } else {
            Some((deadline - Utc::now().timestamp()).max(0))
        }
    }
}

/// Sleeps in one-second slices so a stop signal takes effect within a
/// second. Returns `true` when interrupted.
pub async fn interruptible_sleep<F>(total: Duration, should_stop: F) -> bool
where
    F: Fn() -> bool,
{
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if should_stop() {
            return true;
        }
        let slice = remaining.min(Duration::from_secs(1));
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    should_stop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_timer_unset_by_default() {
        let timer = StopTimer::new();
        assert!(!timer.is_armed());
        assert!(!timer.is_expired());
        assert_eq!(timer.remaining_secs(), None);
    }

    #[test]
    fn test_timer_set_and_clear() {
        let timer = StopTimer::new();
        timer.set_hours(2.0);
        assert!(timer.is_armed());
        assert!(!timer.is_expired());
        let remaining = timer.remaining_secs().unwrap();
        assert!(remaining > 7000 && remaining <= 7200);

        timer.clear();
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_timer_expiry() {
        let timer = StopTimer::new();
        timer.set_hours(0.0);
        assert!(timer.is_expired());
        assert_eq!(timer.remaining_secs(), Some(0));
    }

    #[tokio::test]
    async fn test_sleep_runs_to_completion() {
        let interrupted =
            interruptible_sleep(Duration::from_millis(50), || false).await;
        assert!(!interrupted);
    }

    #[tokio::test]
    async fn test_sleep_interrupts_quickly() {
        let flag = Arc::new(AtomicBool::new(true));
        let flag_clone = flag.clone();
        let start = std::time::Instant::now();
        let interrupted =
            interruptible_sleep(Duration::from_secs(30), move || flag_clone.load(Ordering::Relaxed))
                .await;
        assert!(interrupted);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}

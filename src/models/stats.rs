use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-owner run counters, incremented atomically by the workers and the
/// dispatcher and snapshotted for status requests and the stop report.
#[derive(Debug, Default)]
pub struct ParserStats {
    total_searches: AtomicU64,
    successful_searches: AtomicU64,
    items_found: AtomicU64,
    good_deals: AtomicU64,
    notifications_sent: AtomicU64,
    duplicates_blocked: AtomicU64,
    errors: AtomicU64,
    cycles: AtomicU64,
    started_at_secs: AtomicU64,
    last_reset_secs: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub total_searches: u64,
    pub successful_searches: u64,
    pub items_found: u64,
    pub good_deals: u64,
    pub notifications_sent: u64,
    pub duplicates_blocked: u64,
    pub errors: u64,
    pub cycles: u64,
    pub uptime_secs: u64,
    pub last_reset: Option<DateTime<Utc>>,
}

impl ParserStats {
    pub fn new() -> Self {
        let stats = Self::default();
        let now = Utc::now().timestamp() as u64;
        stats.started_at_secs.store(now, Ordering::Relaxed);
        stats.last_reset_secs.store(now, Ordering::Relaxed);
        stats
    }

    pub fn record_search(&self, success: bool) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_searches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_items_found(&self, count: u64) {
        self.items_found.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_good_deal(&self) {
        self.good_deals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        let started = self.started_at_secs.load(Ordering::Relaxed);
        (Utc::now().timestamp() as u64).saturating_sub(started)
    }

    pub fn reset(&self) {
        self.total_searches.store(0, Ordering::Relaxed);
        self.successful_searches.store(0, Ordering::Relaxed);
        self.items_found.store(0, Ordering::Relaxed);
        self.good_deals.store(0, Ordering::Relaxed);
        self.notifications_sent.store(0, Ordering::Relaxed);
        self.duplicates_blocked.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.cycles.store(0, Ordering::Relaxed);
        let now = Utc::now().timestamp() as u64;
        self.started_at_secs.store(now, Ordering::Relaxed);
        self.last_reset_secs.store(now, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_searches: self.total_searches.load(Ordering::Relaxed),
            successful_searches: self.successful_searches.load(Ordering::Relaxed),
            items_found: self.items_found.load(Ordering::Relaxed),
            good_deals: self.good_deals.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            duplicates_blocked: self.duplicates_blocked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
            last_reset: DateTime::from_timestamp(
                self.last_reset_secs.load(Ordering::Relaxed) as i64,
                0,
            ),
        }
    }
}

impl StatsSnapshot {
    pub fn uptime_formatted(&self) -> String {
        let hours = self.uptime_secs / 3600;
        let minutes = (self.uptime_secs % 3600) / 60;
        let seconds = self.uptime_secs % 60;
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }

    /// Run statistics as an HTML message for the operator chat.
    pub fn report_message(&self) -> String {
        let efficiency = if self.items_found > 0 {
            self.notifications_sent as f64 / self.items_found as f64 * 100.0
        } else {
            0.0
        };

        format!(
            "📊 <b>СТАТИСТИКА ПАРСЕРА</b>\n\n\
             ⏰ <b>Время работы:</b> {}\n\
             🔄 <b>Циклов завершено:</b> {}\n\
             🔍 <b>Поисков выполнено:</b> {} (успешных: {})\n\
             📦 <b>Найдено товаров:</b> {}\n\
             💰 <b>Выгодных сделок:</b> {}\n\
             📨 <b>Уведомлений отправлено:</b> {}\n\
             🚫 <b>Дубликатов отсеяно:</b> {}\n\
             ❌ <b>Ошибок:</b> {}\n\
             💪 <b>Эффективность:</b> {:.1}%",
            self.uptime_formatted(),
            self.cycles,
            self.total_searches,
            self.successful_searches,
            self.items_found,
            self.good_deals,
            self.notifications_sent,
            self.duplicates_blocked,
            self.errors,
            efficiency,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ParserStats::new();
        stats.record_search(true);
        stats.record_search(false);
        stats.add_items_found(3);
        stats.record_duplicate();
        stats.record_duplicate();
        stats.record_error();
        stats.record_cycle();

        let snap = stats.snapshot();
        assert_eq!(snap.total_searches, 2);
        assert_eq!(snap.successful_searches, 1);
        assert_eq!(snap.items_found, 3);
        assert_eq!(snap.duplicates_blocked, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.cycles, 1);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let stats = ParserStats::new();
        stats.add_items_found(10);
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.items_found, 0);
        assert!(snap.last_reset.is_some());
    }

    #[test]
    fn test_uptime_formatting() {
        let snap = StatsSnapshot {
            total_searches: 0,
            successful_searches: 0,
            items_found: 0,
            good_deals: 0,
            notifications_sent: 0,
            duplicates_blocked: 0,
            errors: 0,
            cycles: 0,
            uptime_secs: 3 * 3600 + 25 * 60 + 7,
            last_reset: None,
        };
        assert_eq!(snap.uptime_formatted(), "03:25:07");
    }

    #[test]
    fn test_report_message_contains_counts() {
        let stats = ParserStats::new();
        stats.add_items_found(4);
        stats.record_notification();
        let report = stats.snapshot().report_message();
        assert!(report.contains("Найдено товаров:</b> 4"));
        assert!(report.contains("Уведомлений отправлено:</b> 1"));
        assert!(report.contains("25.0%"));
    }
}

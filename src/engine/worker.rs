use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::timer::interruptible_sleep;
use crate::engine::{AdapterFactory, EngineShared};
use crate::models::{ListingRecord, SearchSpec};
use crate::notify::{NotificationDispatcher, TelegramApi};
use crate::scoring::FreshnessScorer;
use crate::sites::SiteAdapter;
use crate::storage::{DedupCache, SettingsSource};
use crate::utils::{AppError, Result};
use crate::validator;

/// One cooperative worker task bound to one browser window. Keywords are
/// processed serially; parallelism comes only from sibling workers.
pub struct Worker {
    pub index: usize,
    pub shared: Arc<EngineShared>,
    pub factory: Arc<dyn AdapterFactory>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub dedup: DedupCache,
    pub settings: SettingsSource,
    pub scorer: Arc<FreshnessScorer>,
    pub api: TelegramApi,
    pub keyword_delay: Duration,
    pub cycle_delay: Duration,
    pub max_restarts: u32,
}

impl Worker {
    pub async fn run(self) {
        self.shared.worker_started();
        info!(worker = self.index, "worker started");

        if let Err(reason) = self.run_inner().await {
            debug!(worker = self.index, %reason, "worker leaving");
        }

        let left = self.shared.worker_finished();
        info!(worker = self.index, remaining = left, "worker exited");
    }

    async fn run_inner(&self) -> std::result::Result<(), String> {
        let mut restarts: u32 = 0;
        let mut adapter = self.create_adapter().await.map_err(|e| e.to_string())?;

        while self.shared.is_running() {
            // Cycle boundary: the active spec is re-read here and nowhere else
            let spec = self.shared.current_spec().await;
            let keywords = spec.keywords_for_window(self.index);

            for keyword in &keywords {
                if !self.shared.is_running() {
                    return Err("stop requested".to_string());
                }

                match self.process_keyword(adapter.as_ref(), keyword, &spec).await {
                    Ok(()) => {}
                    Err(e) if e.is_block() => {
                        self.handle_block(&e).await;
                        return Err("blocked".to_string());
                    }
                    Err(e) if e.is_browser_failure() => {
                        restarts += 1;
                        self.shared.stats.record_error();
                        warn!(
                            worker = self.index,
                            restarts, "driver failure: {e}; recreating window"
                        );
                        if restarts > self.max_restarts {
                            return Err("window restart budget exhausted".to_string());
                        }
                        match self.create_adapter().await {
                            Ok(fresh) => adapter = fresh,
                            Err(e) => {
                                return Err(format!("window recreation failed: {e}"));
                            }
                        }
                    }
                    Err(e) => {
                        self.shared.stats.record_error();
                        warn!(worker = self.index, %keyword, "keyword failed: {e}");
                    }
                }

                if interruptible_sleep(self.keyword_delay, || !self.shared.is_running()).await {
                    return Err("stop requested".to_string());
                }
            }

            let cycle = self.shared.record_cycle();
            debug!(worker = self.index, cycle, "cycle complete");

            // Worker 0 re-reads the settings row every N cycles; changes
            // apply at the next cycle boundary
            if self.index == 0 && spec.settings_reload_cycles > 0
                && cycle % spec.settings_reload_cycles == 0
            {
                self.reload_settings(&spec).await;
            }

            if interruptible_sleep(self.cycle_delay, || !self.shared.is_running()).await {
                return Err("stop requested".to_string());
            }
        }

        Err("stop requested".to_string())
    }

    async fn create_adapter(&self) -> Result<Arc<dyn SiteAdapter>> {
        let site = self.shared.current_spec().await.site;
        self.factory.create(self.index, site).await
    }

    async fn reload_settings(&self, current: &SearchSpec) {
        match self.settings.load(self.shared.owner_id).await {
            Ok(fresh) => {
                if fresh != *current {
                    info!(worker = self.index, "settings changed, swapping spec");
                    self.shared.swap_spec(fresh).await;
                }
            }
            Err(e) => debug!(worker = self.index, "settings reload failed: {e}"),
        }
    }

    /// Search → dedup pre-check → enrich (one retry) → validate → score →
    /// dispatch in priority order.
    async fn process_keyword(
        &self,
        adapter: &dyn SiteAdapter,
        keyword: &str,
        spec: &SearchSpec,
    ) -> Result<()> {
        let summaries = match adapter.search(keyword, spec).await {
            Ok(summaries) => {
                self.shared.stats.record_search(true);
                summaries
            }
            Err(e) => {
                self.shared.stats.record_search(false);
                return Err(e);
            }
        };

        self.shared.stats.add_items_found(summaries.len() as u64);
        debug!(worker = self.index, %keyword, found = summaries.len(), "search done");

        let mut batch: Vec<ListingRecord> = Vec::new();
        for summary in &summaries {
            if !self.shared.is_running() {
                break;
            }

            if self.dedup.is_duplicate(&summary.id, &summary.url).await? {
                self.shared.stats.record_duplicate();
                continue;
            }

            let record = match self.enrich_with_retry(adapter, summary, spec).await {
                Ok(record) => record,
                Err(e) if e.is_block() || e.is_browser_failure() => return Err(e),
                Err(e) => {
                    debug!(id = %summary.id, "listing skipped after retry: {e}");
                    continue;
                }
            };

            if let Err(reason) = validator::validate(&record, spec) {
                debug!(id = %record.id, ?reason, "listing rejected");
                continue;
            }

            let mut record = record;
            self.scorer.annotate(&mut record);
            if record.economy() > 0 {
                self.shared.stats.record_good_deal();
            }
            batch.push(record);
        }

        // Within one keyword's batch, higher priority dispatches first
        batch.sort_by(|a, b| {
            b.priority_score
                .unwrap_or(0.0)
                .partial_cmp(&a.priority_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for record in &batch {
            if !self.shared.is_running() {
                break;
            }
            match self
                .dispatcher
                .process_and_notify(
                    record,
                    record.economy(),
                    record.economy_percent(),
                    spec.owner_id,
                )
                .await
            {
                Ok(true) => self.shared.stats.record_notification(),
                Ok(false) => {}
                Err(e) => {
                    self.shared.stats.record_error();
                    warn!(id = %record.id, "dispatch failed: {e}");
                }
            }
        }

        Ok(())
    }

    /// Transient failures get exactly one retry; the second failure skips
    /// the listing.
    async fn enrich_with_retry(
        &self,
        adapter: &dyn SiteAdapter,
        summary: &crate::models::ListingSummary,
        spec: &SearchSpec,
    ) -> Result<ListingRecord> {
        match adapter.enrich(summary, spec).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_block() => Err(e),
            Err(first) => {
                debug!(id = %summary.id, "enrich retry after: {first}");
                adapter.enrich(summary, spec).await
            }
        }
    }

    /// One operator alert per run; the worker then exits and the engine
    /// survives on its remaining windows.
    async fn handle_block(&self, error: &AppError) {
        warn!(worker = self.index, "block detected: {error}");
        self.shared.set_stop_reason("captcha detected").await;

        if self.shared.claim_captcha_alert() {
            let text = format!(
                "🚨 <b>Обнаружена капча!</b>\n\n\
                 Окно {} остановлено. Парсер продолжит работу на остальных окнах.\n\
                 Детали: {}",
                self.index + 1,
                crate::notify::message::escape_html(&error.to_string())
            );
            if let Err(e) = self.api.send_alert(&text).await {
                warn!("captcha alert failed: {e}");
            }
        }
    }
}

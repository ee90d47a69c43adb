use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::browser::WindowPool;
use crate::config::BrowserConfig;
use crate::models::{ParserStats, SearchSpec, Site};
use crate::sites::{AutoRuAdapter, AvitoAdapter, SiteAdapter};
use crate::utils::{AppError, Result};

pub mod controller;
pub mod timer;
pub mod worker;

pub use controller::ParserController;
pub use timer::StopTimer;

/// State shared by the controller, the workers and the timer watchdog of
/// one engine run.
pub struct EngineShared {
    pub owner_id: i64,
    running: AtomicBool,
    spec: RwLock<SearchSpec>,
    pub stats: Arc<ParserStats>,
    pub timer: StopTimer,
    captcha_alerted: AtomicBool,
    active_workers: AtomicUsize,
    cycles: AtomicU64,
    stop_reason: Mutex<Option<String>>,
}

impl EngineShared {
    pub fn new(spec: SearchSpec) -> Arc<Self> {
        Arc::new(Self {
            owner_id: spec.owner_id,
            running: AtomicBool::new(true),
            spec: RwLock::new(spec),
            stats: Arc::new(ParserStats::new()),
            timer: StopTimer::new(),
            captcha_alerted: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            cycles: AtomicU64::new(0),
            stop_reason: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn stop_reason(&self) -> Option<String> {
        self.stop_reason.lock().await.clone()
    }

    pub async fn set_stop_reason(&self, reason: &str) {
        let mut guard = self.stop_reason.lock().await;
        if guard.is_none() {
            *guard = Some(reason.to_string());
        }
    }

    pub async fn current_spec(&self) -> SearchSpec {
        self.spec.read().await.clone()
    }

    pub async fn swap_spec(&self, spec: SearchSpec) {
        *self.spec.write().await = spec;
    }

    /// First caller wins; the captcha alert goes out once per run.
    pub fn claim_captcha_alert(&self) -> bool {
        !self.captcha_alerted.swap(true, Ordering::SeqCst)
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of workers still active; the last one leaving
    /// flips the engine to not-running.
    pub fn worker_finished(&self) -> usize {
        let left = self.active_workers.fetch_sub(1, Ordering::SeqCst) - 1;
        if left == 0 {
            self.request_stop();
        }
        left
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn record_cycle(&self) -> u64 {
        self.stats.record_cycle();
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

/// Builds a site adapter for one worker window. The production factory
/// launches real browser windows; the test suite swaps in fixtures.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn create(&self, window_index: usize, site: Site) -> Result<Arc<dyn SiteAdapter>>;
}

/// Production factory backed by the window pool.
pub struct BrowserAdapterFactory {
    pool: Arc<WindowPool>,
    config: BrowserConfig,
}

impl BrowserAdapterFactory {
    pub fn new(pool: Arc<WindowPool>, config: BrowserConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl AdapterFactory for BrowserAdapterFactory {
    async fn create(&self, window_index: usize, site: Site) -> Result<Arc<dyn SiteAdapter>> {
        let window = match self.pool.window(window_index).await {
            Some(window) => window,
            None => self.pool.restart(window_index).await?,
        };

        if !window.is_healthy().await {
            let window = self.pool.restart(window_index).await?;
            return Ok(build_adapter(site, window, &self.config));
        }

        Ok(build_adapter(site, window, &self.config))
    }
}

fn build_adapter(
    site: Site,
    window: Arc<crate::browser::BrowserWindow>,
    config: &BrowserConfig,
) -> Arc<dyn SiteAdapter> {
    match site {
        Site::Avito => Arc::new(AvitoAdapter::new(window, config)),
        Site::AutoRu => Arc::new(AutoRuAdapter::new(window, config)),
    }
}

/// A start request for an owner whose engine is already live.
pub fn already_running_error(owner_id: i64) -> AppError {
    AppError::Engine(format!("engine already running for owner {owner_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_worker_leaving_stops_engine() {
        let shared = EngineShared::new(SearchSpec::default());
        shared.worker_started();
        shared.worker_started();
        assert!(shared.is_running());

        assert_eq!(shared.worker_finished(), 1);
        assert!(shared.is_running());
        assert_eq!(shared.worker_finished(), 0);
        assert!(!shared.is_running());
    }

    #[tokio::test]
    async fn test_captcha_alert_claimed_once() {
        let shared = EngineShared::new(SearchSpec::default());
        assert!(shared.claim_captcha_alert());
        assert!(!shared.claim_captcha_alert());
        assert!(!shared.claim_captcha_alert());
    }

    #[tokio::test]
    async fn test_spec_swap_at_cycle_boundary() {
        let shared = EngineShared::new(SearchSpec {
            keywords: vec!["phone".to_string()],
            ..Default::default()
        });

        let mut new_spec = SearchSpec::default();
        new_spec.keywords = vec!["laptop".to_string()];
        shared.swap_spec(new_spec).await;

        assert_eq!(shared.current_spec().await.keywords, vec!["laptop"]);
    }

    #[tokio::test]
    async fn test_stop_reason_first_write_wins() {
        let shared = EngineShared::new(SearchSpec::default());
        shared.set_stop_reason("captcha").await;
        shared.set_stop_reason("timer").await;
        assert_eq!(shared.stop_reason().await.as_deref(), Some("captcha"));
    }
}

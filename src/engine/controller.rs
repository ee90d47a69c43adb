use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser::WindowPool;
use crate::config::AppConfig;
use crate::engine::worker::Worker;
use crate::engine::{already_running_error, AdapterFactory, BrowserAdapterFactory, EngineShared};
use crate::models::{SearchSpec, StatsSnapshot};
use crate::notify::{NotificationDispatcher, TelegramApi};
use crate::scoring::FreshnessScorer;
use crate::storage::{DedupCache, ResultStore, SettingsSource};
use crate::utils::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub active_windows: usize,
    pub cycles: u64,
    pub stats: StatsSnapshot,
    pub stop_reason: Option<String>,
    pub timer_remaining_secs: Option<i64>,
}

struct EngineHandle {
    shared: Arc<EngineShared>,
    tasks: Vec<JoinHandle<()>>,
    pool: Option<Arc<WindowPool>>,
}

/// Owns one engine per owner in this process: start/stop/reconfigure/
/// status/set_timer, plus the operator chat notifications around a run.
pub struct ParserController {
    config: AppConfig,
    api: TelegramApi,
    dispatcher: Arc<NotificationDispatcher>,
    dedup: DedupCache,
    settings: SettingsSource,
    scorer: Arc<FreshnessScorer>,
    factory_override: Option<Arc<dyn AdapterFactory>>,
    engines: Mutex<HashMap<i64, EngineHandle>>,
}

impl ParserController {
    pub fn new(config: AppConfig, pool: SqlitePool) -> Self {
        let api = TelegramApi::new(&config.telegram, config.admin_chat_id());
        let dedup = DedupCache::new(pool.clone());
        let results = ResultStore::new(pool.clone());
        let settings = SettingsSource::new(pool);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            api.clone(),
            results,
            dedup.clone(),
            Duration::from_secs(config.telegram.media_fetch_timeout_secs),
        ));
        let scorer = Arc::new(FreshnessScorer::new(
            config
                .scoring
                .freshness_model_path
                .as_deref()
                .map(std::path::Path::new),
            config
                .scoring
                .price_model_path
                .as_deref()
                .map(std::path::Path::new),
        ));

        Self {
            config,
            api,
            dispatcher,
            dedup,
            settings,
            scorer,
            factory_override: None,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the browser-backed adapter factory; the test suite drives
    /// the whole pipeline through fixtures this way.
    pub fn with_adapter_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory_override = Some(factory);
        self
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn settings(&self) -> &SettingsSource {
        &self.settings
    }

    /// Starts an engine for the spec's owner. Errors when one is already
    /// running; a finished engine is replaced.
    pub async fn start(&self, spec: SearchSpec) -> Result<()> {
        if spec.keywords.is_empty() {
            return Err(AppError::Validation(
                "search spec has no keywords".to_string(),
            ));
        }
        let windows = spec.windows.clamp(1, self.config.engine.max_windows);
        let owner_id = spec.owner_id;

        let mut engines = self.engines.lock().await;
        if let Some(handle) = engines.get(&owner_id) {
            if handle.shared.is_running() {
                return Err(already_running_error(owner_id));
            }
        }

        // Real runs own a window pool; fixture runs skip the browser
        let (factory, pool): (Arc<dyn AdapterFactory>, Option<Arc<WindowPool>>) =
            match &self.factory_override {
                Some(factory) => (factory.clone(), None),
                None => {
                    let pool = Arc::new(WindowPool::new(self.config.browser.clone()));
                    pool.spawn(windows).await?;
                    (
                        Arc::new(BrowserAdapterFactory::new(
                            pool.clone(),
                            self.config.browser.clone(),
                        )),
                        Some(pool),
                    )
                }
            };

        let mut spec = spec;
        spec.windows = windows;
        spec.settings_reload_cycles = self.config.engine.settings_reload_cycles;
        let shared = EngineShared::new(spec.clone());

        let mut tasks = Vec::new();
        for index in 0..windows {
            let worker = Worker {
                index,
                shared: shared.clone(),
                factory: factory.clone(),
                dispatcher: self.dispatcher.clone(),
                dedup: self.dedup.clone(),
                settings: self.settings.clone(),
                scorer: self.scorer.clone(),
                api: self.api.clone(),
                keyword_delay: Duration::from_secs(self.config.engine.keyword_delay_secs),
                cycle_delay: Duration::from_secs(spec.check_interval_secs),
                max_restarts: self.config.browser.max_window_restarts,
            };
            tasks.push(tokio::spawn(worker.run()));
        }

        // Timer watchdog: polls once per second, stops the engine on expiry
        let watchdog_shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if !watchdog_shared.is_running() {
                    break;
                }
                if watchdog_shared.timer.is_expired() {
                    watchdog_shared.set_stop_reason("таймер истёк").await;
                    watchdog_shared.request_stop();
                    break;
                }
            }
        }));

        engines.insert(
            owner_id,
            EngineHandle {
                shared,
                tasks,
                pool,
            },
        );
        drop(engines);

        info!(owner_id, windows, "engine started");
        let text = format!(
            "🚀 <b>Парсер запущен</b>\n\n\
             🔍 Запросов: {}\n🪟 Окон: {}\n🌐 Сайт: {}\n🏙 Город: {}",
            spec.keywords.len(),
            windows,
            spec.site.as_str(),
            crate::notify::message::escape_html(&spec.city),
        );
        if let Err(e) = self.api.send_alert(&text).await {
            warn!("start notification failed: {e}");
        }

        Ok(())
    }

    /// Signals the workers, waits for them to finish their current listing,
    /// tears the windows down and reports final statistics.
    pub async fn stop(&self, owner_id: i64, reason: &str) -> Result<()> {
        let handle = {
            let mut engines = self.engines.lock().await;
            engines.remove(&owner_id)
        };
        let handle = handle.ok_or_else(|| AppError::NotFound {
            resource: format!("engine for owner {owner_id}"),
        })?;

        handle.shared.set_stop_reason(reason).await;
        handle.shared.request_stop();

        for task in handle.tasks {
            if tokio::time::timeout(Duration::from_secs(30), task)
                .await
                .is_err()
            {
                warn!(owner_id, "worker did not stop within 30s");
            }
        }

        if let Some(pool) = handle.pool {
            pool.emergency_cleanup().await;
        }

        let stats = handle.shared.stats.snapshot();
        info!(owner_id, reason, "engine stopped");
        let text = format!(
            "🛑 <b>Парсер остановлен</b>\n\nПричина: {}\n\n{}",
            crate::notify::message::escape_html(reason),
            stats.report_message(),
        );
        if let Err(e) = self.api.send_alert(&text).await {
            warn!("stop notification failed: {e}");
        }

        Ok(())
    }

    /// Swaps the active spec; workers pick it up at the next cycle
    /// boundary, never mid-keyword.
    pub async fn reconfigure(&self, spec: SearchSpec) -> Result<()> {
        let engines = self.engines.lock().await;
        let handle = engines.get(&spec.owner_id).ok_or_else(|| AppError::NotFound {
            resource: format!("engine for owner {}", spec.owner_id),
        })?;
        handle.shared.swap_spec(spec).await;
        Ok(())
    }

    pub async fn status(&self, owner_id: i64) -> EngineStatus {
        let engines = self.engines.lock().await;
        match engines.get(&owner_id) {
            Some(handle) => EngineStatus {
                running: handle.shared.is_running(),
                active_windows: handle.shared.active_workers(),
                cycles: handle.shared.cycles(),
                stats: handle.shared.stats.snapshot(),
                stop_reason: handle.shared.stop_reason().await,
                timer_remaining_secs: handle.shared.timer.remaining_secs(),
            },
            None => EngineStatus {
                running: false,
                active_windows: 0,
                cycles: 0,
                stats: crate::models::ParserStats::new().snapshot(),
                stop_reason: Some("not started".to_string()),
                timer_remaining_secs: None,
            },
        }
    }

    /// Arms the wall-clock stop timer for a running engine.
    pub async fn set_timer(&self, owner_id: i64, hours: f64) -> Result<()> {
        let engines = self.engines.lock().await;
        let handle = engines.get(&owner_id).ok_or_else(|| AppError::NotFound {
            resource: format!("engine for owner {owner_id}"),
        })?;
        handle.shared.timer.set_hours(hours);
        info!(owner_id, hours, "stop timer armed");
        Ok(())
    }

    /// Waits until the engine reports not-running, then finalizes it.
    pub async fn wait_until_stopped(&self, owner_id: i64) {
        loop {
            let running = {
                let engines = self.engines.lock().await;
                engines
                    .get(&owner_id)
                    .map(|h| h.shared.is_running())
                    .unwrap_or(false)
            };
            if !running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

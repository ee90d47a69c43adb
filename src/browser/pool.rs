use std::process::Command;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task;
use tracing::{info, warn};

use crate::browser::window::BrowserWindow;
use crate::config::BrowserConfig;
use crate::utils::{AppError, Result};

/// Process names force-killed when a driver dies or the engine stops. The
/// engine assumes it owns every chrome image on the host.
const RESIDUAL_PROCESS_NAMES: &[&str] = &["chrome", "chromium", "chromedriver"];

/// Manages 1–5 browser windows. Workers hold their window through an Arc;
/// the pool handles restarts and final teardown.
pub struct WindowPool {
    config: BrowserConfig,
    windows: RwLock<Vec<Option<Arc<BrowserWindow>>>>,
}

impl WindowPool {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(Vec::new()),
        }
    }

    /// Launches `count` windows. Partial failures tear the pool back down so
    /// the engine starts with all-or-nothing.
    pub async fn spawn(&self, count: usize) -> Result<()> {
        if !(1..=5).contains(&count) {
            return Err(AppError::Engine(format!(
                "window count {count} outside 1..=5"
            )));
        }

        let mut created = Vec::with_capacity(count);
        for index in 0..count {
            let config = self.config.clone();
            let window = task::spawn_blocking(move || BrowserWindow::launch(index, &config))
                .await
                .map_err(|e| AppError::Browser(format!("spawn task failed: {e}")))?;

            match window {
                Ok(w) => created.push(Some(Arc::new(w))),
                Err(e) => {
                    warn!(window = index, "window launch failed: {e}");
                    for w in created.iter().flatten() {
                        w.close().await;
                    }
                    self.kill_residual_processes().await;
                    return Err(e);
                }
            }
        }

        info!(count, "window pool ready");
        *self.windows.write().await = created;
        Ok(())
    }

    pub async fn window(&self, index: usize) -> Option<Arc<BrowserWindow>> {
        self.windows.read().await.get(index).cloned().flatten()
    }

    pub async fn active_count(&self) -> usize {
        self.windows
            .read()
            .await
            .iter()
            .filter(|w| w.is_some())
            .count()
    }

    pub async fn health_check(&self, index: usize) -> bool {
        match self.window(index).await {
            Some(window) => window.is_healthy().await,
            None => false,
        }
    }

    /// Replaces a dead window. Residual OS processes are killed first so the
    /// new driver does not inherit a wedged profile.
    pub async fn restart(&self, index: usize) -> Result<Arc<BrowserWindow>> {
        if let Some(old) = self.window(index).await {
            old.close().await;
        }
        self.drop_window(index).await;
        self.kill_residual_processes().await;

        let config = self.config.clone();
        let window = task::spawn_blocking(move || BrowserWindow::launch(index, &config))
            .await
            .map_err(|e| AppError::Browser(format!("restart task failed: {e}")))??;

        let window = Arc::new(window);
        let mut windows = self.windows.write().await;
        if index < windows.len() {
            windows[index] = Some(window.clone());
        }
        info!(window = index, "window restarted");
        Ok(window)
    }

    /// Marks a window as gone without replacing it (degraded mode).
    pub async fn drop_window(&self, index: usize) {
        let mut windows = self.windows.write().await;
        if index < windows.len() {
            windows[index] = None;
        }
    }

    /// Closes every window and kills whatever chrome processes remain.
    pub async fn emergency_cleanup(&self) {
        let windows: Vec<_> = self.windows.write().await.drain(..).flatten().collect();
        for window in windows {
            window.close().await;
        }
        self.kill_residual_processes().await;
    }

    /// Force-kills residual browser processes by name. Intentionally coarse.
    pub async fn kill_residual_processes(&self) {
        let _ = task::spawn_blocking(|| {
            for name in RESIDUAL_PROCESS_NAMES {
                let _ = Command::new("pkill").args(["-f", name]).status();
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BrowserConfig {
        BrowserConfig {
            chrome_path: None,
            page_load_timeout_secs: 10,
            element_wait_timeout_secs: 2,
            max_window_restarts: 3,
        }
    }

    #[tokio::test]
    async fn test_window_count_bounds() {
        let pool = WindowPool::new(test_config());
        assert!(pool.spawn(0).await.is_err());
        assert!(pool.spawn(6).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_pool_queries() {
        let pool = WindowPool::new(test_config());
        assert_eq!(pool.active_count().await, 0);
        assert!(pool.window(0).await.is_none());
        assert!(!pool.health_check(0).await);
    }

    #[tokio::test]
    async fn test_drop_window_marks_gone() {
        let pool = WindowPool::new(test_config());
        // No windows spawned; dropping must not panic
        pool.drop_window(0).await;
        assert_eq!(pool.active_count().await, 0);
    }
}

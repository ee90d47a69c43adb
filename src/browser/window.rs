use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::task;
use tracing::{debug, warn};

use crate::browser::user_agents::{browser_family, weighted_user_agent};
use crate::config::BrowserConfig;
use crate::utils::{AppError, Result};

/// Fingerprint override injected after every navigation.
const WEBDRIVER_OVERRIDE_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// One headless-browser window owned exclusively by one worker task. All
/// driver calls are synchronous and run on the blocking pool so the worker
/// task keeps yielding.
pub struct BrowserWindow {
    index: usize,
    // Keeps the chrome process alive for the lifetime of the window.
    _browser: Browser,
    tab: Arc<Tab>,
    user_agent: String,
    page_load_timeout: Duration,
}

impl BrowserWindow {
    /// Launches a window with stealth flags and a weighted-random user agent.
    /// Blocking; callers go through `WindowPool`.
    pub fn launch(index: usize, config: &BrowserConfig) -> Result<Self> {
        let user_agent = weighted_user_agent().to_string();
        debug!(
            window = index,
            family = browser_family(&user_agent),
            "launching browser window"
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(3600))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--window-size=1440,900"),
                OsStr::new("--lang=ru-RU"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("failed to create launch options: {e}")))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("failed to launch browser: {e}")))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Browser(format!("failed to create tab: {e}")))?;

        tab.set_user_agent(&user_agent, None, None)
            .map_err(|e| AppError::Browser(format!("failed to set user agent: {e}")))?;
        tab.set_default_timeout(Duration::from_secs(config.element_wait_timeout_secs));

        if let Err(e) = tab.evaluate(WEBDRIVER_OVERRIDE_JS, false) {
            warn!(window = index, "webdriver override failed: {e}");
        }

        Ok(Self {
            index,
            _browser: browser,
            tab,
            user_agent,
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Navigates and waits for the load event, re-applying the fingerprint
    /// override afterwards.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();
        let timeout = self.page_load_timeout;

        task::spawn_blocking(move || {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)
                .map_err(|e| AppError::Browser(format!("navigation failed: {e}")))?;
            tab.wait_until_navigated()
                .map_err(|e| AppError::Browser(format!("page load failed: {e}")))?;
            let _ = tab.evaluate(WEBDRIVER_OVERRIDE_JS, false);
            Ok(())
        })
        .await
        .map_err(|e| AppError::Browser(format!("blocking task failed: {e}")))?
    }

    /// Waits for an element, returning false on timeout instead of erroring;
    /// a missing element is an expected page shape, not a driver failure.
    pub async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = self.tab.clone();
        let selector = selector.to_string();

        task::spawn_blocking(move || {
            match tab.wait_for_element_with_custom_timeout(&selector, timeout) {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            }
        })
        .await
        .map_err(|e| AppError::Browser(format!("blocking task failed: {e}")))?
    }

    /// Full page HTML.
    pub async fn content(&self) -> Result<String> {
        let tab = self.tab.clone();
        task::spawn_blocking(move || {
            tab.get_content()
                .map_err(|e| AppError::Browser(format!("failed to get page content: {e}")))
        })
        .await
        .map_err(|e| AppError::Browser(format!("blocking task failed: {e}")))?
    }

    pub async fn title(&self) -> Result<String> {
        let tab = self.tab.clone();
        task::spawn_blocking(move || {
            tab.get_title()
                .map_err(|e| AppError::Browser(format!("failed to get page title: {e}")))
        })
        .await
        .map_err(|e| AppError::Browser(format!("blocking task failed: {e}")))?
    }

    pub async fn current_url(&self) -> Result<String> {
        let tab = self.tab.clone();
        task::spawn_blocking(move || Ok(tab.get_url()))
            .await
            .map_err(|e| AppError::Browser(format!("blocking task failed: {e}")))?
    }

    /// Clicks the first element matching any of the selectors. Returns false
    /// when nothing matched; gallery openers treat that as non-fatal.
    pub async fn click_first(&self, selectors: &[&str]) -> Result<bool> {
        let tab = self.tab.clone();
        let selectors: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();

        task::spawn_blocking(move || {
            for selector in &selectors {
                if let Ok(element) = tab.find_element(selector) {
                    if element.click().is_ok() {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        })
        .await
        .map_err(|e| AppError::Browser(format!("blocking task failed: {e}")))?
    }

    /// Cheap liveness probe used by the pool's health check.
    pub async fn is_healthy(&self) -> bool {
        let tab = self.tab.clone();
        task::spawn_blocking(move || tab.evaluate("1 + 1", false).is_ok())
            .await
            .unwrap_or(false)
    }

    /// Closes the tab; the chrome process exits when the window is dropped.
    pub async fn close(&self) {
        let tab = self.tab.clone();
        let index = self.index;
        let _ = task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                debug!(window = index, "tab close failed: {e}");
            }
        })
        .await;
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub browser: BrowserConfig,
    pub engine: EngineConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    /// Separate chat for operator alerts; falls back to chat_id when unset.
    pub admin_chat_id: Option<i64>,
    /// Overridable for tests; the Bot API host otherwise.
    pub api_base: String,
    pub text_timeout_secs: u64,
    pub album_timeout_secs: u64,
    pub media_fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub chrome_path: Option<String>,
    pub page_load_timeout_secs: u64,
    pub element_wait_timeout_secs: u64,
    pub max_window_restarts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_owner_id: i64,
    pub max_windows: usize,
    pub cycle_delay_secs: u64,
    pub keyword_delay_secs: u64,
    pub settings_reload_cycles: u64,
    pub max_items_per_keyword: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub freshness_model_path: Option<String>,
    pub price_model_path: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "DEALWATCH_"
            .add_source(Environment::with_prefix("DEALWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Chrome path and bot token may come from plain env vars
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }
        if config.telegram.bot_token.is_empty() {
            if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
                config.telegram.bot_token = token;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "Telegram bot token is not configured".into(),
            ));
        }

        if self.telegram.chat_id == 0 {
            return Err(ConfigError::Message(
                "Telegram chat_id is not configured".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.engine.max_windows == 0 || self.engine.max_windows > 5 {
            return Err(ConfigError::Message(
                "Engine max_windows must be between 1 and 5".into(),
            ));
        }

        if self.browser.page_load_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Browser page_load_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.engine.max_items_per_keyword == 0 {
            return Err(ConfigError::Message(
                "Engine max_items_per_keyword must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn admin_chat_id(&self) -> i64 {
        self.telegram.admin_chat_id.unwrap_or(self.telegram.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
                acquire_timeout: 30,
            },
            telegram: TelegramConfig {
                bot_token: "123456:test-token".to_string(),
                chat_id: -1000123,
                admin_chat_id: Some(-1000999),
                api_base: "https://api.telegram.org".to_string(),
                text_timeout_secs: 30,
                album_timeout_secs: 60,
                media_fetch_timeout_secs: 45,
            },
            browser: BrowserConfig {
                chrome_path: None,
                page_load_timeout_secs: 30,
                element_wait_timeout_secs: 10,
                max_window_restarts: 3,
            },
            engine: EngineConfig {
                default_owner_id: 1,
                max_windows: 5,
                cycle_delay_secs: 180,
                keyword_delay_secs: 5,
                settings_reload_cycles: 5,
                max_items_per_keyword: 20,
            },
            scoring: ScoringConfig {
                freshness_model_path: None,
                price_model_path: None,
            },
        }
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_token() {
        let mut config = valid_config();
        config.telegram.bot_token = "".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("bot token is not configured"));
    }

    #[test]
    fn test_config_validation_missing_chat_id() {
        let mut config = valid_config();
        config.telegram.chat_id = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("chat_id"));
    }

    #[test]
    fn test_config_validation_window_bounds() {
        let mut config = valid_config();
        config.engine.max_windows = 6;
        assert!(config.validate().is_err());

        config.engine.max_windows = 0;
        assert!(config.validate().is_err());

        config.engine.max_windows = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_admin_chat_fallback() {
        let mut config = valid_config();
        assert_eq!(config.admin_chat_id(), -1000999);
        config.telegram.admin_chat_id = None;
        assert_eq!(config.admin_chat_id(), -1000123);
    }
}

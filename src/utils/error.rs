use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Marketplace block detected: {0}")]
    Blocked(String),

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Blocks and driver deaths get dedicated handling in the worker loop;
    /// everything else bubbles up as an ordinary error.
    pub fn is_block(&self) -> bool {
        matches!(self, AppError::Blocked(_))
    }

    pub fn is_browser_failure(&self) -> bool {
        matches!(self, AppError::Browser(_))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

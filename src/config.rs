//! Session configuration.

use std::path::Path;

use serde::Deserialize;

/// Errors loading a [`SessionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one scanning session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Poll interval while waiting on a channel that offers no state
    /// subscription.
    pub poll_interval_ms: u64,
    /// Give up waiting on a submission after this long. `None` waits forever.
    pub settle_timeout_ms: Option<u64>,
    /// Capacity of the session event broadcast.
    pub event_buffer: usize,
    /// Capacity of the journal worker queue.
    pub journal_queue_bound: usize,
    /// Keep at most this many history entries.
    pub history_limit: Option<usize>,
    /// Page size for paginated tag searches.
    pub page_size: usize,
    /// Restore the pre-enqueue row status when a delete or re-add fails.
    pub rollback_on_failure: bool,
    /// Shop domain used to build admin links, scoped to this session.
    pub shop_domain: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            settle_timeout_ms: None,
            event_buffer: 1024,
            journal_queue_bound: 64,
            history_limit: None,
            page_size: 50,
            rollback_on_failure: false,
            shop_domain: None,
        }
    }
}

impl SessionConfig {
    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "history_limit must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Admin URL of a product for this session's shop.
    pub fn admin_url(&self, product_id: &str) -> Option<String> {
        let shop = self.shop_domain.as_deref()?;
        let numeric = product_id.rsplit('/').next().unwrap_or(product_id);
        Some(format!("https://{shop}/admin/products/{numeric}"))
    }
}

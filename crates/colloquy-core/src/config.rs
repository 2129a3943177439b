use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ColloquyError, Result};
use crate::types::{ERROR_HISTORY_CAP, STOP_THRESHOLD};

/// Top-level configuration for the resilience layer.
///
/// Loaded from `~/.colloquy/config.toml` by default. Each section
/// configures one component; missing sections fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl ColloquyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ColloquyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ColloquyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// What to do when the most recent message alone exceeds the token budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverBudgetPolicy {
    /// Send the latest message anyway, even though it is over budget.
    #[default]
    IncludeLatest,
    /// Send nothing; the active set is empty.
    Exclude,
}

/// Context window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Token budget for the assembled context.
    pub max_input_tokens: usize,
    /// Maximum number of active messages. 0 disables the count bound.
    pub context_size: usize,
    pub over_budget_policy: OverBudgetPolicy,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 4000,
            context_size: 100,
            over_budget_policy: OverBudgetPolicy::IncludeLatest,
        }
    }
}

/// Network retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter upper bound as a fraction of the base delay.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.3,
        }
    }
}

/// Connection timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutValues {
    pub open_secs: u64,
    pub read_secs: u64,
    pub write_secs: u64,
}

impl Default for TimeoutValues {
    fn default() -> Self {
        Self {
            open_secs: 10,
            read_secs: 120,
            write_secs: 120,
        }
    }
}

/// Per-provider timeout override. Each present field replaces the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_secs: Option<u64>,
}

impl TimeoutOverride {
    /// Apply this override on top of `base`, field by field.
    pub fn apply(&self, base: TimeoutValues) -> TimeoutValues {
        TimeoutValues {
            open_secs: self.open_secs.unwrap_or(base.open_secs),
            read_secs: self.read_secs.unwrap_or(base.read_secs),
            write_secs: self.write_secs.unwrap_or(base.write_secs),
        }
    }
}

/// Timeout table: a default plus overrides keyed by provider name.
///
/// Overrides listed here are layered on top of the built-in provider
/// overrides, so a file only needs to mention what it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub default: TimeoutValues,
    pub providers: BTreeMap<String, TimeoutOverride>,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// `similar_count` at which retries stop.
    pub stop_threshold: u32,
    /// Number of error records kept per session.
    pub history_cap: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            stop_threshold: STOP_THRESHOLD,
            history_cap: ERROR_HISTORY_CAP,
        }
    }
}

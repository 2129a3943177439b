use std::collections::HashMap;
use std::time::Duration;

use colloquy_core::config::{TimeoutOverride, TimeoutSettings, TimeoutValues};

/// Resolved open/read/write timeouts for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub open: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutValues::default().into()
    }
}

impl From<TimeoutValues> for TimeoutConfig {
    fn from(values: TimeoutValues) -> Self {
        Self {
            open: Duration::from_secs(values.open_secs),
            read: Duration::from_secs(values.read_secs),
            write: Duration::from_secs(values.write_secs),
        }
    }
}

fn builtin_overrides() -> HashMap<String, TimeoutOverride> {
    HashMap::from([
        (
            "claude".to_string(),
            TimeoutOverride {
                open_secs: None,
                read_secs: Some(300),
                write_secs: Some(300),
            },
        ),
        (
            "perplexity".to_string(),
            TimeoutOverride {
                open_secs: Some(5),
                read_secs: Some(600),
                write_secs: Some(600),
            },
        ),
    ])
}

/// Provider name to timeout table.
///
/// Lookups are case-insensitive. Unknown or missing providers fall back to
/// the default values.
#[derive(Debug, Clone)]
pub struct ProviderTimeouts {
    default: TimeoutValues,
    overrides: HashMap<String, TimeoutOverride>,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderTimeouts {
    /// The built-in table: slow-streaming providers get longer read windows.
    pub fn builtin() -> Self {
        Self {
            default: TimeoutValues::default(),
            overrides: builtin_overrides(),
        }
    }

    /// Built-in table with the configured default and overrides layered on top.
    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        let mut overrides = builtin_overrides();
        for (name, configured) in &settings.providers {
            let key = name.to_lowercase();
            let merged = match overrides.get(&key) {
                Some(builtin) => TimeoutOverride {
                    open_secs: configured.open_secs.or(builtin.open_secs),
                    read_secs: configured.read_secs.or(builtin.read_secs),
                    write_secs: configured.write_secs.or(builtin.write_secs),
                },
                None => *configured,
            };
            overrides.insert(key, merged);
        }
        Self {
            default: settings.default,
            overrides,
        }
    }

    pub fn for_provider(&self, provider: Option<&str>) -> TimeoutConfig {
        let values = provider
            .map(|name| name.trim().to_lowercase())
            .and_then(|key| self.overrides.get(&key))
            .map(|o| o.apply(self.default))
            .unwrap_or(self.default);
        values.into()
    }
}

/// Timeouts for `provider` from the built-in table.
pub fn timeout_config_for(provider: Option<&str>) -> TimeoutConfig {
    ProviderTimeouts::builtin().for_provider(provider)
}

//! Configuration management for the terminal app.

use hexmemo_engine::{config::DEFAULT_KEY_PREFIX, EngineConfig};
use std::env;
use std::path::PathBuf;

/// App configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one JSON file per stored key
    pub data_dir: PathBuf,
    /// Prefix for every storage key
    pub key_prefix: String,
    pub max_history: usize,
    pub max_scores: usize,
    /// Memorize window before the target is hidden
    pub memorize_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let data_dir = lookup("HEXMEMO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".hexmemo"));

        let key_prefix = lookup("HEXMEMO_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        let max_history = parse(&lookup, "HEXMEMO_MAX_HISTORY", defaults.max_history)?;
        let max_scores = parse(&lookup, "HEXMEMO_MAX_SCORES", defaults.max_scores)?;
        let memorize_ms = parse(&lookup, "HEXMEMO_MEMORIZE_MS", defaults.memorize_delay_ms)?;

        if max_scores == 0 {
            return Err(ConfigError::Invalid {
                name: "HEXMEMO_MAX_SCORES",
                value: "0".into(),
            });
        }

        Ok(Self {
            data_dir,
            key_prefix,
            max_history,
            max_scores,
            memorize_ms,
        })
    }

    /// The engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_key_prefix(self.key_prefix.clone())
            .with_max_history(self.max_history)
            .with_max_scores(self.max_scores)
            .with_memorize_delay_ms(self.memorize_ms)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}")]
    Invalid { name: &'static str, value: String },
}

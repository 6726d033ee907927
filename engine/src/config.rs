//! Tunables shared by the engine components.

use serde::{Deserialize, Serialize};

/// Default storage key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "colorGame_";

/// Engine configuration.
///
/// Every field has a default, so a partial JSON/TOML document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Prefix added to every storage key
    pub key_prefix: String,
    /// Maximum number of archived snapshots kept by the state manager
    pub max_history: usize,
    /// Maximum number of high-score entries
    pub max_scores: usize,
    /// Maximum length of the persisted accuracy history
    pub max_accuracy_history: usize,
    /// Maximum number of game results kept in `game_history`
    pub max_game_history: usize,
    /// Maximum number of entries in the in-state error buffer
    pub max_state_errors: usize,
    /// Maximum number of entries in the persisted `errors` document
    pub max_logged_errors: usize,
    /// Length of the memorize phase in milliseconds
    pub memorize_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_history: 50,
            max_scores: 100,
            max_accuracy_history: 50,
            max_game_history: 100,
            max_state_errors: 20,
            max_logged_errors: 50,
            memorize_delay_ms: 3000,
        }
    }
}

impl EngineConfig {
    /// Builder-style override of the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Builder-style override of the history bound.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Builder-style override of the high-score bound.
    pub fn with_max_scores(mut self, max_scores: usize) -> Self {
        self.max_scores = max_scores;
        self
    }

    /// Builder-style override of the memorize delay.
    pub fn with_memorize_delay_ms(mut self, ms: u64) -> Self {
        self.memorize_delay_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_history, 50);
        assert_eq!(config.max_scores, 100);
        assert_eq!(config.max_accuracy_history, 50);
        assert_eq!(config.max_state_errors, 20);
        assert_eq!(config.memorize_delay_ms, 3000);
    }

    #[test]
    fn partial_document_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"maxHistory": 5}"#).unwrap();
        assert_eq!(config.max_history, 5);
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
    }
}

//! Immutable application snapshots and their export format.
//!
//! A [`GameSnapshot`] is split into four sub-trees, each behind an [`Arc`].
//! Producing the next snapshot clones the four pointers and replaces only the
//! branches that change, so an untouched branch is pointer-equal across
//! versions and nobody holding an older snapshot can observe a mutation.

use crate::{
    action::Action,
    color::hex_to_rgb,
    config::EngineConfig,
    document::{Difficulty, GameStatistics, Theme, UserPreferences},
    error::{ErrorRecord, Result},
    Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Version of the exported state format.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Round state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    #[default]
    Idle,
    /// Target shown, input locked
    Memorizing,
    Active,
    Resolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// Round and cumulative game fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub generated_color: Option<String>,
    #[serde(default, with = "tagged_date::option")]
    pub start_time: Option<DateTime<Utc>>,
    pub score: u64,
    /// Remaining player tips
    pub tip_count: u32,
    /// Remaining computer tips
    pub computer_tip_count: u32,
    pub is_active: bool,
    pub difficulty: Difficulty,
    pub round: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub games_played: u64,
    pub games_won: u64,
    pub phase: RoundPhase,
}

impl GameState {
    fn initial(difficulty: Difficulty) -> Self {
        let settings = difficulty.settings();
        Self {
            generated_color: None,
            start_time: None,
            score: 0,
            tip_count: settings.tip_count,
            computer_tip_count: settings.computer_tip_count,
            is_active: false,
            difficulty,
            round: 0,
            streak: 0,
            best_streak: 0,
            games_played: 0,
            games_won: 0,
            phase: RoundPhase::Idle,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: FeedbackType,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub theme: Theme,
    pub sound_enabled: bool,
    pub animations_enabled: bool,
    pub feedback: Feedback,
    pub loading: bool,
}

impl UiState {
    fn from_preferences(preferences: &UserPreferences) -> Self {
        Self {
            theme: preferences.theme,
            sound_enabled: preferences.sound_enabled,
            animations_enabled: preferences.animations_enabled,
            feedback: Feedback::default(),
            loading: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub preferences: UserPreferences,
    /// Session mirror of the persisted statistics document
    pub statistics: GameStatistics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub dispatch_count: u64,
    pub last_dispatch_micros: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    /// Engine version that produced the snapshot
    pub version: String,
    #[serde(with = "tagged_date")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "tagged_date")]
    pub last_updated: DateTime<Utc>,
    pub performance: Performance,
    /// Most recent errors, oldest first
    pub errors: Vec<ErrorRecord>,
}

/// One immutable version of the application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game: Arc<GameState>,
    pub ui: Arc<UiState>,
    pub user: Arc<UserState>,
    pub system: Arc<SystemState>,
}

impl GameSnapshot {
    /// The template every manager starts from.
    pub fn initial(now: DateTime<Utc>) -> Self {
        let preferences = UserPreferences::default();
        Self {
            game: Arc::new(GameState::initial(preferences.difficulty)),
            ui: Arc::new(UiState::from_preferences(&preferences)),
            user: Arc::new(UserState {
                preferences,
                statistics: GameStatistics::new(now),
            }),
            system: Arc::new(SystemState {
                version: env!("CARGO_PKG_VERSION").to_string(),
                started_at: now,
                last_updated: now,
                performance: Performance::default(),
                errors: Vec::new(),
            }),
        }
    }

    /// Check the structural rules every committed snapshot satisfies.
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        let game = &self.game;
        let budget = game.difficulty.settings();

        if game.tip_count > budget.tip_count {
            return Err(Error::validation(
                "game.tipCount",
                format!("{} exceeds the {} budget of {}", game.tip_count, game.difficulty, budget.tip_count),
            ));
        }
        if game.computer_tip_count > budget.computer_tip_count {
            return Err(Error::validation(
                "game.computerTipCount",
                format!(
                    "{} exceeds the {} budget of {}",
                    game.computer_tip_count, game.difficulty, budget.computer_tip_count
                ),
            ));
        }
        if let Some(color) = &game.generated_color {
            hex_to_rgb(color)
                .map_err(|_| Error::validation("game.generatedColor", format!("'{color}' is not a hex color")))?;
        }
        if game.is_active != (game.phase == RoundPhase::Active) {
            return Err(Error::validation(
                "game.isActive",
                format!("isActive={} in phase {:?}", game.is_active, game.phase),
            ));
        }
        if game.phase == RoundPhase::Active && game.start_time.is_none() {
            return Err(Error::validation("game.startTime", "active round without a start time"));
        }
        if game.games_won > game.games_played {
            return Err(Error::validation("game.gamesWon", "more wins than games played"));
        }
        if game.best_streak < game.streak {
            return Err(Error::validation("game.bestStreak", "best streak below current streak"));
        }
        if self.system.errors.len() > config.max_state_errors {
            return Err(Error::validation(
                "system.errors",
                format!("{} entries exceed {}", self.system.errors.len(), config.max_state_errors),
            ));
        }
        self.user.statistics.validate(config.max_accuracy_history)
    }

    /// Copy-on-write access to the game branch.
    pub fn game_mut(&mut self) -> &mut GameState {
        Arc::make_mut(&mut self.game)
    }

    pub fn ui_mut(&mut self) -> &mut UiState {
        Arc::make_mut(&mut self.ui)
    }

    pub fn user_mut(&mut self) -> &mut UserState {
        Arc::make_mut(&mut self.user)
    }

    pub fn system_mut(&mut self) -> &mut SystemState {
        Arc::make_mut(&mut self.system)
    }
}

/// An archived snapshot and the action that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub state: GameSnapshot,
    pub action: Action,
    #[serde(with = "tagged_date")]
    pub timestamp: DateTime<Utc>,
}

/// Serialized form of a manager: current snapshot plus history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedState {
    pub format_version: u32,
    #[serde(with = "tagged_date")]
    pub exported_at: DateTime<Utc>,
    pub state: GameSnapshot,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub current_index: Option<usize>,
}

impl ExportedState {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let exported: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        if exported.format_version > STATE_FORMAT_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported state format version {}",
                exported.format_version
            )));
        }
        Ok(exported)
    }
}

/// Dates as `{"__type": "Date", "value": "<RFC 3339>"}`.
///
/// Plain RFC 3339 strings are accepted on input as well.
pub mod tagged_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const DATE_TAG: &str = "Date";

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "__type")]
        kind: String,
        value: DateTime<Utc>,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Tagged(Tagged),
        Plain(DateTime<Utc>),
    }

    fn tag(date: &DateTime<Utc>) -> Tagged {
        Tagged {
            kind: DATE_TAG.to_string(),
            value: *date,
        }
    }

    fn untag<E: serde::de::Error>(repr: Repr) -> Result<DateTime<Utc>, E> {
        match repr {
            Repr::Tagged(tagged) if tagged.kind == DATE_TAG => Ok(tagged.value),
            Repr::Tagged(tagged) => Err(E::custom(format!("unexpected tagged type '{}'", tagged.kind))),
            Repr::Plain(date) => Ok(date),
        }
    }

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        tag(date).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        untag(Repr::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            date.as_ref().map(tag).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<Repr>::deserialize(deserializer)?
                .map(untag::<D::Error>)
                .transpose()
        }
    }
}

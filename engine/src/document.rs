//! Persisted document types.
//!
//! These are the typed forms of the JSON documents kept by the
//! [`PersistenceStore`](crate::PersistenceStore). All of them serialize in
//! camelCase and tolerate missing fields so older documents still load.

use crate::{color::ColorComparison, error::Result, Error, SchemaVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current schema version of every versioned document.
pub const SCHEMA_VERSION: SchemaVersion = 2;

/// Locales the UI ships strings for.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "de", "es", "fr", "ja"];

// ---------------------------------------------------------------------------
// Closed enums
// ---------------------------------------------------------------------------

/// Game difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Per-difficulty budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultySettings {
    pub tip_count: u32,
    pub computer_tip_count: u32,
    pub base_score: u32,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Tip budgets and base score for this level.
    pub fn settings(self) -> DifficultySettings {
        match self {
            Difficulty::Easy => DifficultySettings {
                tip_count: 3,
                computer_tip_count: 3,
                base_score: 100,
            },
            Difficulty::Medium => DifficultySettings {
                tip_count: 2,
                computer_tip_count: 2,
                base_score: 200,
            },
            Difficulty::Hard => DifficultySettings {
                tip_count: 1,
                computer_tip_count: 1,
                base_score: 300,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(Error::UnknownDifficulty(other.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format the color controls display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    #[default]
    Hex,
    Rgb,
    Hsl,
}

impl FromStr for ColorFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hex" => Ok(ColorFormat::Hex),
            "rgb" => Ok(ColorFormat::Rgb),
            "hsl" => Ok(ColorFormat::Hsl),
            other => Err(Error::validation(
                "colorFormat",
                format!("unknown value '{other}'"),
            )),
        }
    }
}

/// UI theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            other => Err(Error::validation("theme", format!("unknown value '{other}'"))),
        }
    }
}

/// Deserialize a closed enum, falling back to its default on unknown input.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    match raw.as_str().map(str::parse::<T>) {
        Some(Ok(value)) => Ok(value),
        _ => {
            tracing::warn!(value = %raw, "unknown enum value in stored document, using default");
            Ok(T::default())
        }
    }
}

/// Validate a locale tag against [`SUPPORTED_LOCALES`].
pub fn validate_locale(locale: &str) -> Result<()> {
    if SUPPORTED_LOCALES.contains(&locale) {
        Ok(())
    } else {
        Err(Error::validation(
            "locale",
            format!("unsupported locale '{locale}'"),
        ))
    }
}

// ---------------------------------------------------------------------------
// UserPreferences
// ---------------------------------------------------------------------------

/// Accessibility switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Accessibility {
    pub high_contrast: bool,
    pub reduced_motion: bool,
    pub large_text: bool,
}

/// Player preferences (key `user_preferences`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub version: SchemaVersion,
    #[serde(deserialize_with = "lenient")]
    pub difficulty: Difficulty,
    pub sound_enabled: bool,
    pub animations_enabled: bool,
    pub hints_enabled: bool,
    pub show_timer: bool,
    #[serde(deserialize_with = "lenient")]
    pub color_format: ColorFormat,
    #[serde(deserialize_with = "lenient")]
    pub theme: Theme,
    pub accessibility: Accessibility,
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            difficulty: Difficulty::default(),
            sound_enabled: true,
            animations_enabled: true,
            hints_enabled: true,
            show_timer: true,
            color_format: ColorFormat::default(),
            theme: Theme::default(),
            accessibility: Accessibility::default(),
            locale: "en".to_string(),
            updated_at: None,
        }
    }
}

/// A single typed preference change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "camelCase")]
pub enum Preference {
    Difficulty(Difficulty),
    SoundEnabled(bool),
    AnimationsEnabled(bool),
    HintsEnabled(bool),
    ShowTimer(bool),
    ColorFormat(ColorFormat),
    Theme(Theme),
    HighContrast(bool),
    ReducedMotion(bool),
    LargeText(bool),
    Locale(String),
}

impl Preference {
    /// Check values that the type alone does not constrain.
    pub fn validate(&self) -> Result<()> {
        match self {
            Preference::Locale(locale) => validate_locale(locale),
            _ => Ok(()),
        }
    }
}

impl UserPreferences {
    /// Apply a validated change.
    pub fn apply(&mut self, preference: Preference) -> Result<()> {
        preference.validate()?;
        match preference {
            Preference::Difficulty(v) => self.difficulty = v,
            Preference::SoundEnabled(v) => self.sound_enabled = v,
            Preference::AnimationsEnabled(v) => self.animations_enabled = v,
            Preference::HintsEnabled(v) => self.hints_enabled = v,
            Preference::ShowTimer(v) => self.show_timer = v,
            Preference::ColorFormat(v) => self.color_format = v,
            Preference::Theme(v) => self.theme = v,
            Preference::HighContrast(v) => self.accessibility.high_contrast = v,
            Preference::ReducedMotion(v) => self.accessibility.reduced_motion = v,
            Preference::LargeText(v) => self.accessibility.large_text = v,
            Preference::Locale(v) => self.locale = v,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Game results and statistics
// ---------------------------------------------------------------------------

/// Outcome of one completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub won: bool,
    pub score: u32,
    pub difficulty: Difficulty,
    /// Similarity of the final guess, 0–100
    pub accuracy: f64,
    /// Elapsed round time in milliseconds
    #[serde(rename = "time")]
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess_color: Option<String>,
}

impl GameResult {
    pub fn win(score: u32, difficulty: Difficulty, accuracy: f64, time_ms: u64) -> Self {
        Self {
            won: true,
            score,
            difficulty,
            accuracy,
            time_ms,
            target_color: None,
            guess_color: None,
        }
    }

    pub fn loss(difficulty: Difficulty, accuracy: f64, time_ms: u64) -> Self {
        Self {
            won: false,
            score: 0,
            difficulty,
            accuracy,
            time_ms,
            target_color: None,
            guess_color: None,
        }
    }

    /// Attach the colors involved.
    pub fn with_colors(mut self, target: impl Into<String>, guess: impl Into<String>) -> Self {
        self.target_color = Some(target.into());
        self.guess_color = Some(guess.into());
        self
    }

    /// Build from a comparison, used when a round resolves.
    pub fn from_comparison(
        won: bool,
        score: u32,
        difficulty: Difficulty,
        comparison: &ColorComparison,
        time_ms: u64,
    ) -> Self {
        Self {
            won,
            score: if won { score } else { 0 },
            difficulty,
            accuracy: comparison.percentage,
            time_ms,
            target_color: None,
            guess_color: None,
        }
    }

    /// Check the ranges a stored result must satisfy.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.accuracy) {
            return Err(Error::validation(
                "accuracy",
                format!("{} is outside 0..=100", self.accuracy),
            ));
        }
        if !self.won && self.score > 0 {
            return Err(Error::validation("score", "a lost game cannot score"));
        }
        Ok(())
    }
}

/// Entry of the `game_history` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameHistoryEntry {
    #[serde(flatten)]
    pub result: GameResult,
    pub played_at: DateTime<Utc>,
}

/// Per-difficulty counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DifficultyStats {
    pub played: u64,
    pub won: u64,
    pub total_score: u64,
}

impl DifficultyStats {
    pub fn win_rate(&self) -> f64 {
        if self.played == 0 {
            0.0
        } else {
            self.won as f64 / self.played as f64
        }
    }
}

/// Counters for the current play session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStats {
    pub start_time: DateTime<Utc>,
    pub games_played: u64,
    pub games_won: u64,
}

/// Aggregated statistics (key `game_statistics`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameStatistics {
    pub version: SchemaVersion,
    pub total_games: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub total_score: u64,
    pub best_score: u32,
    pub average_score: f64,
    pub total_time_spent: u64,
    pub average_time: f64,
    pub best_time: Option<u64>,
    pub current_streak: u32,
    pub best_streak: u32,
    pub difficulty_stats: BTreeMap<Difficulty, DifficultyStats>,
    pub accuracy_history: Vec<f64>,
    pub session: SessionStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_played: Option<DateTime<Utc>>,
}

impl Default for GameStatistics {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl GameStatistics {
    /// A fresh document created at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            total_games: 0,
            games_won: 0,
            games_lost: 0,
            total_score: 0,
            best_score: 0,
            average_score: 0.0,
            total_time_spent: 0,
            average_time: 0.0,
            best_time: None,
            current_streak: 0,
            best_streak: 0,
            difficulty_stats: BTreeMap::new(),
            accuracy_history: Vec::new(),
            session: SessionStats {
                start_time: now,
                games_played: 0,
                games_won: 0,
            },
            created_at: now,
            updated_at: now,
            last_played: None,
        }
    }

    /// Fold one result into the aggregates.
    pub fn apply_result(&mut self, result: &GameResult, max_accuracy: usize, now: DateTime<Utc>) {
        self.total_games += 1;
        self.total_time_spent = self.total_time_spent.saturating_add(result.time_ms);
        self.session.games_played += 1;

        let per_difficulty = self.difficulty_stats.entry(result.difficulty).or_default();
        per_difficulty.played += 1;
        per_difficulty.total_score =
            per_difficulty.total_score.saturating_add(u64::from(result.score));

        if result.won {
            self.games_won += 1;
            self.session.games_won += 1;
            per_difficulty.won += 1;
            self.total_score = self.total_score.saturating_add(u64::from(result.score));
            self.best_score = self.best_score.max(result.score);
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
            self.best_time = Some(match self.best_time {
                Some(best) => best.min(result.time_ms),
                None => result.time_ms,
            });
        } else {
            self.games_lost += 1;
            self.current_streak = 0;
        }

        self.accuracy_history.push(result.accuracy);
        if self.accuracy_history.len() > max_accuracy {
            let excess = self.accuracy_history.len() - max_accuracy;
            self.accuracy_history.drain(..excess);
        }

        self.recompute_averages();
        self.last_played = Some(now);
        self.updated_at = now;
    }

    /// Recompute the derived averages from the counters.
    pub fn recompute_averages(&mut self) {
        self.average_score = if self.games_won == 0 {
            0.0
        } else {
            self.total_score as f64 / self.games_won as f64
        };
        self.average_time = if self.total_games == 0 {
            0.0
        } else {
            self.total_time_spent as f64 / self.total_games as f64
        };
    }

    /// Check the counter invariants.
    pub fn validate(&self, max_accuracy: usize) -> Result<()> {
        if self.games_won + self.games_lost != self.total_games {
            return Err(Error::validation(
                "totalGames",
                format!(
                    "gamesWon ({}) + gamesLost ({}) != totalGames ({})",
                    self.games_won, self.games_lost, self.total_games
                ),
            ));
        }
        if self.accuracy_history.len() > max_accuracy {
            return Err(Error::validation(
                "accuracyHistory",
                format!("length {} exceeds {}", self.accuracy_history.len(), max_accuracy),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// High scores
// ---------------------------------------------------------------------------

/// One high-score entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighScoreEntry {
    pub id: Uuid,
    pub score: u32,
    /// Elapsed time in milliseconds
    pub time: u64,
    pub difficulty: Difficulty,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess_color: Option<String>,
}

impl HighScoreEntry {
    pub fn from_result(result: &GameResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            score: result.score,
            time: result.time_ms,
            difficulty: result.difficulty,
            accuracy: result.accuracy,
            timestamp,
            target_color: result.target_color.clone(),
            guess_color: result.guess_color.clone(),
        }
    }

    /// Board order: score desc, then time asc, then older first, then id.
    pub fn board_order(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.time.cmp(&other.time))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sorted high-score board (key `high_scores`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighScoreBoard {
    pub version: SchemaVersion,
    pub scores: Vec<HighScoreEntry>,
}

impl Default for HighScoreBoard {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            scores: Vec::new(),
        }
    }
}

impl HighScoreBoard {
    /// Insert an entry, keep the board sorted and at most `max_scores` long.
    ///
    /// Returns the entry's rank, or `None` if it did not make the board.
    pub fn insert(&mut self, entry: HighScoreEntry, max_scores: usize) -> Option<usize> {
        let id = entry.id;
        self.scores.push(entry);
        self.scores.sort_by(HighScoreEntry::board_order);
        self.scores.truncate(max_scores);
        self.scores.iter().position(|e| e.id == id)
    }

    /// The best `n` entries, optionally for one difficulty.
    pub fn top(&self, n: usize, difficulty: Option<Difficulty>) -> Vec<&HighScoreEntry> {
        self.scores
            .iter()
            .filter(|e| difficulty.map_or(true, |d| e.difficulty == d))
            .take(n)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Whether the board satisfies its ordering and size invariants.
    pub fn is_well_ordered(&self, max_scores: usize) -> bool {
        self.scores.len() <= max_scores
            && self
                .scores
                .windows(2)
                .all(|pair| pair[0].board_order(&pair[1]) == std::cmp::Ordering::Less)
    }
}

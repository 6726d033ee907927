//! Authoritative round state for one player.
//!
//! A round moves `Idle → Memorizing → Active → Resolved`. The memorize window
//! is a single scheduled timer whose token is kept with the round; starting a
//! new round cancels it, and a token that no longer matches is ignored when it
//! fires. Outside `Active` every gameplay method is a no-op returning `None`.

use crate::{
    clock::Clock,
    color::{
        adjust_channel, channel_hint, compare_colors, generate_nearby_color,
        generate_random_color, normalize_hex, Channel, ChannelHint, ColorComparison,
    },
    config::EngineConfig,
    document::{Difficulty, GameResult},
    error::Result,
    scheduler::{Scheduler, TimerToken},
    snapshot::RoundPhase,
};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Neutral starting point for the player's guess.
pub const DEFAULT_GUESS: &str = "#808080";

/// What a submitted guess did to the round.
#[derive(Debug, Clone, PartialEq)]
pub enum GuessOutcome {
    /// Exact match; the round is resolved.
    Won {
        round_score: u32,
        comparison: ColorComparison,
        result: GameResult,
    },
    /// Not yet; the round stays active.
    Miss { comparison: ColorComparison },
}

impl GuessOutcome {
    pub fn comparison(&self) -> &ColorComparison {
        match self {
            GuessOutcome::Won { comparison, .. } | GuessOutcome::Miss { comparison } => comparison,
        }
    }

    /// The result to record, if the round ended.
    pub fn result(&self) -> Option<&GameResult> {
        match self {
            GuessOutcome::Won { result, .. } => Some(result),
            GuessOutcome::Miss { .. } => None,
        }
    }
}

/// Mutable state of the current round plus the cumulative score.
#[derive(Debug, Clone)]
pub struct GameSession {
    difficulty: Difficulty,
    score: u64,
    round: u32,
    phase: RoundPhase,
    generated_color: Option<String>,
    guess: String,
    start_time: Option<DateTime<Utc>>,
    tip_count: u32,
    computer_tip_count: u32,
    pending_timer: Option<TimerToken>,
    memorize_delay_ms: u64,
}

impl GameSession {
    pub fn new(config: &EngineConfig) -> Self {
        let difficulty = Difficulty::default();
        let settings = difficulty.settings();
        Self {
            difficulty,
            score: 0,
            round: 0,
            phase: RoundPhase::Idle,
            generated_color: None,
            guess: DEFAULT_GUESS.to_string(),
            start_time: None,
            tip_count: settings.tip_count,
            computer_tip_count: settings.computer_tip_count,
            pending_timer: None,
            memorize_delay_ms: config.memorize_delay_ms,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Cumulative score across rounds.
    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == RoundPhase::Active
    }

    pub fn generated_color(&self) -> Option<&str> {
        self.generated_color.as_deref()
    }

    pub fn guess(&self) -> &str {
        &self.guess
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn tip_count(&self) -> u32 {
        self.tip_count
    }

    pub fn computer_tip_count(&self) -> u32 {
        self.computer_tip_count
    }

    pub fn pending_timer(&self) -> Option<TimerToken> {
        self.pending_timer
    }

    /// Milliseconds since the round became active.
    pub fn elapsed_ms(&self, clock: &dyn Clock) -> u64 {
        self.start_time.map_or(0, |start| clock.elapsed_ms(start))
    }

    /// Clear per-round fields. Cumulative score and difficulty survive.
    pub fn reset_round(&mut self) {
        let settings = self.difficulty.settings();
        self.generated_color = None;
        self.guess = DEFAULT_GUESS.to_string();
        self.start_time = None;
        self.tip_count = settings.tip_count;
        self.computer_tip_count = settings.computer_tip_count;
        self.phase = RoundPhase::Idle;
        self.pending_timer = None;
    }

    /// Set the difficulty by name. See [`Self::set_difficulty_level`].
    pub fn set_difficulty(&mut self, level: &str) -> Result<bool> {
        let difficulty = level.parse::<Difficulty>()?;
        Ok(self.set_difficulty_level(difficulty))
    }

    /// Set the difficulty and reset both tip budgets from it.
    ///
    /// Ignored while a round is memorizing or active; returns whether the
    /// change was applied.
    pub fn set_difficulty_level(&mut self, difficulty: Difficulty) -> bool {
        if matches!(self.phase, RoundPhase::Memorizing | RoundPhase::Active) {
            tracing::debug!(%difficulty, phase = ?self.phase, "difficulty change ignored mid-round");
            return false;
        }
        let settings = difficulty.settings();
        self.difficulty = difficulty;
        self.tip_count = settings.tip_count;
        self.computer_tip_count = settings.computer_tip_count;
        tracing::debug!(%difficulty, "difficulty changed");
        true
    }

    /// Begin a new round and schedule the end of the memorize window.
    ///
    /// Returns the target color.
    pub fn start_round<R, S>(&mut self, rng: &mut R, scheduler: &mut S) -> String
    where
        R: Rng + ?Sized,
        S: Scheduler + ?Sized,
    {
        if let Some(stale) = self.pending_timer.take() {
            scheduler.cancel(stale);
            tracing::debug!(token = stale.0, "cancelled pending memorize timer");
        }
        self.reset_round();

        let target = generate_random_color(rng);
        self.generated_color = Some(target.clone());
        self.round += 1;
        self.phase = RoundPhase::Memorizing;
        self.pending_timer = Some(scheduler.schedule_once(self.memorize_delay_ms));

        tracing::info!(round = self.round, difficulty = %self.difficulty, "round started");
        target
    }

    /// Handle a fired timer. Returns true if it activated the round.
    pub fn on_timer(&mut self, token: TimerToken, clock: &dyn Clock) -> bool {
        if self.pending_timer != Some(token) || self.phase != RoundPhase::Memorizing {
            tracing::trace!(token = token.0, "ignoring stale timer");
            return false;
        }
        self.pending_timer = None;
        self.phase = RoundPhase::Active;
        self.start_time = Some(clock.now());
        true
    }

    /// Spend a player tip: which channel is furthest off.
    pub fn use_tip(&mut self) -> Option<ChannelHint> {
        if !self.is_active() || self.tip_count == 0 {
            return None;
        }
        let target = self.generated_color.as_deref()?;
        let hint = channel_hint(&self.guess, target).ok().flatten();
        self.tip_count -= 1;
        hint
    }

    /// Spend a computer tip: move the guess close to the target.
    pub fn use_computer_tip<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        if !self.is_active() || self.computer_tip_count == 0 {
            return None;
        }
        let target = self.generated_color.as_deref()?;
        let nearby = generate_nearby_color(target, rng).ok()?;
        self.computer_tip_count -= 1;
        self.guess = nearby.clone();
        Some(nearby)
    }

    /// Nudge one channel of the current guess.
    pub fn adjust_guess(&mut self, channel: Channel, delta: i32) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let adjusted = adjust_channel(&self.guess, channel, delta).ok()?;
        self.guess = adjusted.clone();
        Some(adjusted)
    }

    /// Submit a guess. An exact match wins the round.
    ///
    /// Errors only on a malformed color; `Ok(None)` when no round is active.
    pub fn submit_guess(&mut self, guess: &str, clock: &dyn Clock) -> Result<Option<GuessOutcome>> {
        let guess = normalize_hex(guess)?;
        if !self.is_active() {
            return Ok(None);
        }
        let Some(target) = self.generated_color.clone() else {
            return Ok(None);
        };

        self.guess = guess.clone();
        let comparison = compare_colors(&guess, &target)?;
        if guess != target {
            return Ok(Some(GuessOutcome::Miss { comparison }));
        }

        let elapsed_ms = self.elapsed_ms(clock);
        let elapsed_secs = u32::try_from(elapsed_ms / 1000).unwrap_or(u32::MAX);
        let round_score = self.difficulty.settings().base_score.saturating_sub(elapsed_secs);
        self.score += u64::from(round_score);
        self.phase = RoundPhase::Resolved;

        let result = GameResult::from_comparison(true, round_score, self.difficulty, &comparison, elapsed_ms)
            .with_colors(target, guess);
        tracing::info!(round = self.round, round_score, elapsed_ms, "round won");

        Ok(Some(GuessOutcome::Won {
            round_score,
            comparison,
            result,
        }))
    }

    /// Abandon the round as a loss, scored on the current guess.
    pub fn give_up(&mut self, clock: &dyn Clock) -> Option<GameResult> {
        if !self.is_active() {
            return None;
        }
        let target = self.generated_color.clone()?;
        let comparison = compare_colors(&self.guess, &target).ok()?;
        let elapsed_ms = self.elapsed_ms(clock);
        self.phase = RoundPhase::Resolved;

        tracing::info!(round = self.round, accuracy = comparison.percentage, "round given up");
        Some(
            GameResult::from_comparison(false, 0, self.difficulty, &comparison, elapsed_ms)
                .with_colors(target, self.guess.clone()),
        )
    }
}

//! The pure reducer: `(snapshot, action, now) -> snapshot`.
//!
//! The reducer never mutates its input and has no hidden inputs: the same
//! snapshot, action and timestamp always produce the same result. Every action
//! bumps `system.lastUpdated` and the dispatch counter. Gameplay actions that
//! arrive outside the phase they belong to leave `game` untouched.

use crate::{
    action::{Action, GameField, UiField},
    config::EngineConfig,
    error::Result,
    snapshot::{GameSnapshot, RoundPhase},
};
use chrono::{DateTime, Utc};

/// Produce the snapshot that follows `state` after `action`.
///
/// Fails only when the action's payload cannot be applied (for example an
/// unsupported locale); structural validation is the caller's job.
pub fn reduce(
    state: &GameSnapshot,
    action: &Action,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<GameSnapshot> {
    let mut next = match action {
        Action::ResetState => {
            let mut fresh = GameSnapshot::initial(now);
            let system = fresh.system_mut();
            system.started_at = state.system.started_at;
            system.performance = state.system.performance;
            fresh
        }
        _ => state.clone(),
    };

    match action {
        Action::ResetState | Action::Custom { .. } => {}

        Action::SetGameField(field) => set_game_field(&mut next, field),

        Action::SetUiField(field) => set_ui_field(&mut next, field),

        Action::UpdateScore { delta } => {
            if state.game.phase == RoundPhase::Active {
                let game = next.game_mut();
                game.score = game.score.saturating_add_signed(*delta);
            }
        }

        Action::StartGame { color, difficulty } => {
            let game = next.game_mut();
            if let Some(difficulty) = difficulty {
                game.difficulty = *difficulty;
            }
            let settings = game.difficulty.settings();
            game.generated_color = Some(color.to_ascii_lowercase());
            game.start_time = None;
            game.tip_count = settings.tip_count;
            game.computer_tip_count = settings.computer_tip_count;
            game.is_active = false;
            game.phase = RoundPhase::Memorizing;
            game.round += 1;

            let ui = next.ui_mut();
            ui.feedback.visible = false;
        }

        Action::ActivateRound => {
            if state.game.phase == RoundPhase::Memorizing {
                let game = next.game_mut();
                game.phase = RoundPhase::Active;
                game.is_active = true;
                game.start_time = Some(now);
            }
        }

        Action::UseTip => {
            if state.game.phase == RoundPhase::Active && state.game.tip_count > 0 {
                next.game_mut().tip_count -= 1;
            }
        }

        Action::UseComputerTip => {
            if state.game.phase == RoundPhase::Active && state.game.computer_tip_count > 0 {
                next.game_mut().computer_tip_count -= 1;
            }
        }

        Action::EndGame { won } => {
            if state.game.phase == RoundPhase::Active {
                let game = next.game_mut();
                game.phase = RoundPhase::Resolved;
                game.is_active = false;
                game.games_played += 1;
                if *won {
                    game.games_won += 1;
                    game.streak += 1;
                    game.best_streak = game.best_streak.max(game.streak);
                } else {
                    game.streak = 0;
                }
            }
        }

        Action::SetUserPreference(preference) => {
            let user = next.user_mut();
            user.preferences.apply(preference.clone())?;
            user.preferences.updated_at = Some(now);
            let preferences = user.preferences.clone();

            let ui = next.ui_mut();
            ui.theme = preferences.theme;
            ui.sound_enabled = preferences.sound_enabled;
            ui.animations_enabled = preferences.animations_enabled;
        }

        Action::SyncStatistics(statistics) => {
            next.user_mut().statistics = (**statistics).clone();
        }

        Action::AddError(record) => {
            let errors = &mut next.system_mut().errors;
            errors.push(record.clone());
            if errors.len() > config.max_state_errors {
                let excess = errors.len() - config.max_state_errors;
                errors.drain(..excess);
            }
        }
    }

    let system = next.system_mut();
    system.last_updated = now;
    system.performance.dispatch_count += 1;
    Ok(next)
}

fn set_game_field(next: &mut GameSnapshot, field: &GameField) {
    let game = next.game_mut();
    match field {
        GameField::GeneratedColor(color) => {
            game.generated_color = color.as_ref().map(|c| c.to_ascii_lowercase())
        }
        GameField::Score(score) => game.score = *score,
        GameField::TipCount(count) => game.tip_count = *count,
        GameField::ComputerTipCount(count) => game.computer_tip_count = *count,
        GameField::Difficulty(difficulty) => {
            if matches!(game.phase, RoundPhase::Memorizing | RoundPhase::Active) {
                return;
            }
            let settings = difficulty.settings();
            game.difficulty = *difficulty;
            game.tip_count = settings.tip_count;
            game.computer_tip_count = settings.computer_tip_count;
        }
        GameField::Round(round) => game.round = *round,
    }
}

fn set_ui_field(next: &mut GameSnapshot, field: &UiField) {
    let ui = next.ui_mut();
    match field {
        UiField::Theme(theme) => ui.theme = *theme,
        UiField::SoundEnabled(on) => ui.sound_enabled = *on,
        UiField::AnimationsEnabled(on) => ui.animations_enabled = *on,
        UiField::Loading(on) => ui.loading = *on,
        UiField::FeedbackMessage(message) => {
            ui.feedback.message = message.clone();
            ui.feedback.visible = true;
        }
        UiField::FeedbackType(kind) => ui.feedback.kind = *kind,
        UiField::FeedbackVisible(visible) => ui.feedback.visible = *visible,
    }
}

//! Actions dispatched to the [`StateManager`](crate::StateManager).
//!
//! On the wire an action is always `{"type": "...", "payload": ...}`. Known
//! types decode into typed variants; anything else is kept as
//! [`Action::Custom`] so middleware can react to it without the reducer
//! knowing about it.

use crate::{
    document::{Difficulty, GameStatistics, Preference, Theme},
    error::{ErrorRecord, Result},
    snapshot::FeedbackType,
    Error,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

pub const RESET_STATE: &str = "RESET_STATE";
pub const SET_GAME_FIELD: &str = "SET_GAME_FIELD";
pub const SET_UI_FIELD: &str = "SET_UI_FIELD";
pub const UPDATE_SCORE: &str = "UPDATE_SCORE";
pub const START_GAME: &str = "START_GAME";
pub const ACTIVATE_ROUND: &str = "ACTIVATE_ROUND";
pub const USE_TIP: &str = "USE_TIP";
pub const USE_COMPUTER_TIP: &str = "USE_COMPUTER_TIP";
pub const END_GAME: &str = "END_GAME";
pub const SET_USER_PREFERENCE: &str = "SET_USER_PREFERENCE";
pub const SYNC_STATISTICS: &str = "SYNC_STATISTICS";
pub const ADD_ERROR: &str = "ADD_ERROR";

/// A writable field of `game`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum GameField {
    GeneratedColor(Option<String>),
    Score(u64),
    TipCount(u32),
    ComputerTipCount(u32),
    /// Also resets both tip budgets
    Difficulty(Difficulty),
    Round(u32),
}

/// A writable field of `ui`, addressed by dot path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value")]
pub enum UiField {
    #[serde(rename = "theme")]
    Theme(Theme),
    #[serde(rename = "soundEnabled")]
    SoundEnabled(bool),
    #[serde(rename = "animationsEnabled")]
    AnimationsEnabled(bool),
    #[serde(rename = "loading")]
    Loading(bool),
    #[serde(rename = "feedback.message")]
    FeedbackMessage(String),
    #[serde(rename = "feedback.type")]
    FeedbackType(FeedbackType),
    #[serde(rename = "feedback.visible")]
    FeedbackVisible(bool),
}

impl UiField {
    /// Build from a dot path such as `feedback.message` and a JSON value.
    pub fn parse(path: &str, value: Value) -> Result<Self> {
        serde_json::from_value(json!({ "field": path, "value": value }))
            .map_err(|e| Error::validation(format!("ui.{path}"), e.to_string()))
    }
}

/// Something that happened, to be reduced into the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum Action {
    /// Restore the initial template
    ResetState,
    SetGameField(GameField),
    SetUiField(UiField),
    /// Add `delta` to the score, never going below zero
    UpdateScore { delta: i64 },
    /// Seed a new round and enter the memorize phase
    StartGame {
        color: String,
        difficulty: Option<Difficulty>,
    },
    /// The memorize window elapsed
    ActivateRound,
    UseTip,
    UseComputerTip,
    EndGame { won: bool },
    SetUserPreference(Preference),
    SyncStatistics(Box<GameStatistics>),
    AddError(ErrorRecord),
    /// Unknown to the reducer
    Custom { action_type: String, payload: Value },
}

impl Action {
    pub fn custom(action_type: impl Into<String>, payload: Value) -> Self {
        Action::Custom {
            action_type: action_type.into(),
            payload,
        }
    }

    pub fn start_game(color: impl Into<String>, difficulty: Option<Difficulty>) -> Self {
        Action::StartGame {
            color: color.into(),
            difficulty,
        }
    }

    /// The action's `type` string.
    pub fn type_tag(&self) -> &str {
        match self {
            Action::ResetState => RESET_STATE,
            Action::SetGameField(_) => SET_GAME_FIELD,
            Action::SetUiField(_) => SET_UI_FIELD,
            Action::UpdateScore { .. } => UPDATE_SCORE,
            Action::StartGame { .. } => START_GAME,
            Action::ActivateRound => ACTIVATE_ROUND,
            Action::UseTip => USE_TIP,
            Action::UseComputerTip => USE_COMPUTER_TIP,
            Action::EndGame { .. } => END_GAME,
            Action::SetUserPreference(_) => SET_USER_PREFERENCE,
            Action::SyncStatistics(_) => SYNC_STATISTICS,
            Action::AddError(_) => ADD_ERROR,
            Action::Custom { action_type, .. } => action_type.as_str(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Action::Custom { .. })
    }

    /// Parse the `{type, payload}` JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawAction =
            serde_json::from_str(json).map_err(|e| Error::validation("action", e.to_string()))?;
        Action::try_from(raw)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

/// The untyped wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Serialize, Deserialize)]
struct ScorePayload {
    delta: i64,
}

#[derive(Serialize, Deserialize)]
struct StartPayload {
    color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    difficulty: Option<Difficulty>,
}

#[derive(Serialize, Deserialize)]
struct EndPayload {
    won: bool,
}

fn payload<T: DeserializeOwned>(action_type: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| Error::validation(format!("{action_type}.payload"), e.to_string()))
}

impl TryFrom<RawAction> for Action {
    type Error = Error;

    fn try_from(raw: RawAction) -> Result<Self> {
        let RawAction {
            action_type,
            payload: body,
        } = raw;

        let action = match action_type.as_str() {
            "" => return Err(Error::validation("type", "action type must not be empty")),
            RESET_STATE => Action::ResetState,
            SET_GAME_FIELD => Action::SetGameField(payload(SET_GAME_FIELD, body)?),
            SET_UI_FIELD => Action::SetUiField(payload(SET_UI_FIELD, body)?),
            UPDATE_SCORE => {
                let ScorePayload { delta } = payload(UPDATE_SCORE, body)?;
                Action::UpdateScore { delta }
            }
            START_GAME => {
                let StartPayload { color, difficulty } = payload(START_GAME, body)?;
                Action::StartGame { color, difficulty }
            }
            ACTIVATE_ROUND => Action::ActivateRound,
            USE_TIP => Action::UseTip,
            USE_COMPUTER_TIP => Action::UseComputerTip,
            END_GAME => {
                let EndPayload { won } = payload(END_GAME, body)?;
                Action::EndGame { won }
            }
            SET_USER_PREFERENCE => Action::SetUserPreference(payload(SET_USER_PREFERENCE, body)?),
            SYNC_STATISTICS => Action::SyncStatistics(Box::new(payload(SYNC_STATISTICS, body)?)),
            ADD_ERROR => Action::AddError(payload(ADD_ERROR, body)?),
            _ => Action::Custom {
                action_type,
                payload: body,
            },
        };
        Ok(action)
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let action_type = action.type_tag().to_string();
        let payload = match action {
            Action::ResetState | Action::ActivateRound | Action::UseTip | Action::UseComputerTip => {
                Ok(Value::Null)
            }
            Action::SetGameField(field) => serde_json::to_value(field),
            Action::SetUiField(field) => serde_json::to_value(field),
            Action::UpdateScore { delta } => serde_json::to_value(ScorePayload { delta }),
            Action::StartGame { color, difficulty } => {
                serde_json::to_value(StartPayload { color, difficulty })
            }
            Action::EndGame { won } => serde_json::to_value(EndPayload { won }),
            Action::SetUserPreference(preference) => serde_json::to_value(preference),
            Action::SyncStatistics(statistics) => serde_json::to_value(statistics),
            Action::AddError(record) => serde_json::to_value(record),
            Action::Custom { payload, .. } => Ok(payload),
        };
        // Payloads are plain data with string keys.
        RawAction {
            action_type,
            payload: payload.unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_decode_to_variants() {
        let action: Action =
            serde_json::from_value(json!({"type": "UPDATE_SCORE", "payload": {"delta": -5}})).unwrap();
        assert_eq!(action, Action::UpdateScore { delta: -5 });

        let action: Action = serde_json::from_value(json!({"type": "RESET_STATE"})).unwrap();
        assert_eq!(action, Action::ResetState);
    }

    #[test]
    fn ui_field_dot_paths() {
        let action: Action = serde_json::from_value(json!({
            "type": "SET_UI_FIELD",
            "payload": {"field": "feedback.message", "value": "Close!"}
        }))
        .unwrap();
        assert_eq!(
            action,
            Action::SetUiField(UiField::FeedbackMessage("Close!".into()))
        );

        assert_eq!(
            UiField::parse("feedback.type", json!("success")).unwrap(),
            UiField::FeedbackType(FeedbackType::Success)
        );
        assert!(UiField::parse("feedback.colour", json!("x")).is_err());
        assert!(UiField::parse("loading", json!("yes")).is_err());
    }

    #[test]
    fn unknown_types_are_custom() {
        let action = Action::from_json(r#"{"type": "ANALYTICS_PING", "payload": {"n": 1}}"#).unwrap();
        assert_eq!(action.type_tag(), "ANALYTICS_PING");
        assert!(action.is_custom());
    }

    #[test]
    fn empty_type_is_rejected() {
        let result = Action::from_json(r#"{"type": "", "payload": null}"#);
        assert!(matches!(result, Err(Error::Validation { field, .. }) if field == "type"));
    }

    #[test]
    fn bad_payload_is_a_validation_error() {
        let result = Action::from_json(r#"{"type": "END_GAME", "payload": {"won": "maybe"}}"#);
        assert!(matches!(
            result,
            Err(Error::Validation { field, .. }) if field == "END_GAME.payload"
        ));
    }

    #[test]
    fn wire_form_is_type_and_payload() {
        let value = serde_json::to_value(Action::start_game("#a1b2c3", Some(Difficulty::Hard))).unwrap();
        assert_eq!(
            value,
            json!({"type": "START_GAME", "payload": {"color": "#a1b2c3", "difficulty": "hard"}})
        );

        let value = serde_json::to_value(Action::SetGameField(GameField::Score(12))).unwrap();
        assert_eq!(
            value,
            json!({"type": "SET_GAME_FIELD", "payload": {"field": "score", "value": 12}})
        );

        let value = serde_json::to_value(Action::UseTip).unwrap();
        assert_eq!(value, json!({"type": "USE_TIP", "payload": null}));
    }
}

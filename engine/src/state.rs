//! Reactive state manager.
//!
//! Single writer over [`GameSnapshot`]: actions go through middleware, the
//! pure [`reduce`] function and validation before they are committed. Each
//! commit archives the previous snapshot in a bounded history and notifies
//! path-scoped subscribers before `dispatch` returns.

use crate::{
    action::Action,
    clock::Clock,
    config::EngineConfig,
    error::Result,
    notify::{Registry, SubscriptionId},
    reducer::reduce,
    snapshot::{ExportedState, GameSnapshot, HistoryEntry, STATE_FORMAT_VERSION},
    Error,
};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Action type reported to subscribers after [`StateManager::time_travel`].
pub const TIME_TRAVEL: &str = "TIME_TRAVEL";
/// Action type reported to subscribers after [`StateManager::import_state`].
pub const IMPORT_STATE: &str = "IMPORT_STATE";

/// Callback invoked with `(state, previous, action)`.
pub type StateCallback = dyn FnMut(&GameSnapshot, &GameSnapshot, &Action);

/// Rewrites actions before they reach the reducer.
pub trait Middleware {
    fn process(&mut self, action: Action, state: &GameSnapshot) -> Action;
}

impl<F> Middleware for F
where
    F: FnMut(Action, &GameSnapshot) -> Action,
{
    fn process(&mut self, action: Action, state: &GameSnapshot) -> Action {
        self(action, state)
    }
}

/// Logs every action at debug level and passes it on unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn process(&mut self, action: Action, state: &GameSnapshot) -> Action {
        tracing::debug!(
            action = %action,
            phase = ?state.game.phase,
            round = state.game.round,
            "dispatching"
        );
        action
    }
}

/// A watchable location in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatePath {
    /// Every transition
    All,
    Game,
    GameScore,
    GamePhase,
    GameGeneratedColor,
    Ui,
    UiTheme,
    UiFeedback,
    User,
    UserPreferences,
    UserStatistics,
    System,
}

impl StatePath {
    pub fn as_str(self) -> &'static str {
        match self {
            StatePath::All => "*",
            StatePath::Game => "game",
            StatePath::GameScore => "game.score",
            StatePath::GamePhase => "game.phase",
            StatePath::GameGeneratedColor => "game.generatedColor",
            StatePath::Ui => "ui",
            StatePath::UiTheme => "ui.theme",
            StatePath::UiFeedback => "ui.feedback",
            StatePath::User => "user",
            StatePath::UserPreferences => "user.preferences",
            StatePath::UserStatistics => "user.statistics",
            StatePath::System => "system",
        }
    }

    /// Whether the value at this path differs between two snapshots.
    ///
    /// Sections compare by pointer, since the reducer replaces every branch
    /// it touches. Leaves compare by value.
    pub fn changed(self, previous: &GameSnapshot, next: &GameSnapshot) -> bool {
        match self {
            StatePath::All => true,
            StatePath::Game => !Arc::ptr_eq(&previous.game, &next.game),
            StatePath::GameScore => previous.game.score != next.game.score,
            StatePath::GamePhase => previous.game.phase != next.game.phase,
            StatePath::GameGeneratedColor => {
                previous.game.generated_color != next.game.generated_color
            }
            StatePath::Ui => !Arc::ptr_eq(&previous.ui, &next.ui),
            StatePath::UiTheme => previous.ui.theme != next.ui.theme,
            StatePath::UiFeedback => previous.ui.feedback != next.ui.feedback,
            StatePath::User => !Arc::ptr_eq(&previous.user, &next.user),
            StatePath::UserPreferences => previous.user.preferences != next.user.preferences,
            StatePath::UserStatistics => previous.user.statistics != next.user.statistics,
            StatePath::System => !Arc::ptr_eq(&previous.system, &next.system),
        }
    }
}

impl FromStr for StatePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let path = match s {
            "*" => StatePath::All,
            "game" => StatePath::Game,
            "game.score" => StatePath::GameScore,
            "game.phase" => StatePath::GamePhase,
            "game.generatedColor" => StatePath::GameGeneratedColor,
            "ui" => StatePath::Ui,
            "ui.theme" => StatePath::UiTheme,
            "ui.feedback" => StatePath::UiFeedback,
            "user" => StatePath::User,
            "user.preferences" => StatePath::UserPreferences,
            "user.statistics" => StatePath::UserStatistics,
            "system" => StatePath::System,
            other => {
                return Err(Error::validation(
                    "path",
                    format!("'{other}' is not a watchable path"),
                ))
            }
        };
        Ok(path)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the current snapshot and its history.
pub struct StateManager {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    current: GameSnapshot,
    history: VecDeque<HistoryEntry>,
    current_index: Option<usize>,
    middleware: Vec<Box<dyn Middleware>>,
    subscribers: Registry<StatePath, StateCallback>,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("phase", &self.current.game.phase)
            .field("history", &self.history.len())
            .field("current_index", &self.current_index)
            .field("middleware", &self.middleware.len())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

impl StateManager {
    /// Start from the initial template.
    pub fn new(config: EngineConfig, clock: impl Clock + 'static) -> Self {
        let current = GameSnapshot::initial(clock.now());
        Self {
            config,
            clock: Box::new(clock),
            current,
            history: VecDeque::new(),
            current_index: None,
            middleware: Vec::new(),
            subscribers: Registry::default(),
        }
    }

    /// The current snapshot.
    pub fn get_state(&self) -> &GameSnapshot {
        &self.current
    }

    /// Append a middleware; middleware runs in insertion order.
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middleware.push(Box::new(middleware));
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Index of the history entry the current snapshot corresponds to.
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Reduce an action into the next snapshot and commit it.
    pub fn dispatch(&mut self, action: Action) -> Result<GameSnapshot> {
        if action.type_tag().trim().is_empty() {
            return Err(Error::validation("type", "action type must not be empty"));
        }

        let current = &self.current;
        let action = self
            .middleware
            .iter_mut()
            .fold(action, |action, m| m.process(action, current));

        let now = self.clock.now();
        let mut next = reduce(&self.current, &action, now, &self.config)
            .and_then(|next| next.validate(&self.config).map(|()| next))
            .map_err(|e| {
                tracing::error!(
                    action = %action,
                    payload = %serde_json::to_string(&action).unwrap_or_default(),
                    error = %e,
                    "state transition rejected"
                );
                Error::transition(action.type_tag(), e.to_string())
            })?;

        let elapsed = (self.clock.now() - now).num_microseconds().unwrap_or(0).max(0);
        next.system_mut().performance.last_dispatch_micros = elapsed as u64;

        let previous = std::mem::replace(&mut self.current, next);
        self.archive(previous.clone(), action.clone(), now);
        self.notify(&previous, &action);
        Ok(self.current.clone())
    }

    fn archive(&mut self, state: GameSnapshot, action: Action, now: chrono::DateTime<chrono::Utc>) {
        self.history.push_back(HistoryEntry {
            state,
            action,
            timestamp: now,
        });
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }
        self.current_index = self.history.len().checked_sub(1);
    }

    fn notify(&mut self, previous: &GameSnapshot, action: &Action) {
        let current = &self.current;
        let failures = self.subscribers.notify(
            |path| path.changed(previous, current),
            |callback| callback(current, previous, action),
        );
        if failures > 0 {
            tracing::warn!(action = %action, failures, "some state subscribers failed");
        }
    }

    /// Subscribe to changes at `path`.
    pub fn subscribe<F>(&mut self, path: StatePath, callback: F) -> SubscriptionId
    where
        F: FnMut(&GameSnapshot, &GameSnapshot, &Action) + 'static,
    {
        self.subscribers.insert(path, Box::new(callback))
    }

    /// Subscribe using a dot-notation path such as `"game.score"` or `"*"`.
    pub fn subscribe_path<F>(&mut self, path: &str, callback: F) -> Result<SubscriptionId>
    where
        F: FnMut(&GameSnapshot, &GameSnapshot, &Action) + 'static,
    {
        Ok(self.subscribe(path.parse()?, callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    /// Make the archived snapshot at `index` current.
    ///
    /// History is left as it is; the next dispatch archives the restored
    /// snapshot and continues from there.
    pub fn time_travel(&mut self, index: usize) -> Result<()> {
        let entry = self.history.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.history.len(),
        })?;

        let restored = entry.state.clone();
        let previous = std::mem::replace(&mut self.current, restored);
        self.current_index = Some(index);
        tracing::info!(index, history = self.history.len(), "time travel");

        let action = Action::custom(TIME_TRAVEL, json!({ "index": index }));
        self.notify(&previous, &action);
        Ok(())
    }

    /// Serialize the current snapshot and history.
    pub fn export_state(&self) -> Result<String> {
        ExportedState {
            format_version: STATE_FORMAT_VERSION,
            exported_at: self.clock.now(),
            state: self.current.clone(),
            history: self.history.iter().cloned().collect(),
            current_index: self.current_index,
        }
        .to_json()
    }

    /// Replace the current snapshot and history from an export.
    ///
    /// Everything is validated first; on failure nothing changes.
    pub fn import_state(&mut self, json: &str) -> Result<()> {
        let reject = |reason: String| {
            tracing::error!(reason = %reason, "state import rejected");
            Error::transition(IMPORT_STATE, reason)
        };

        let exported = ExportedState::from_json(json).map_err(|e| reject(e.to_string()))?;
        exported
            .state
            .validate(&self.config)
            .map_err(|e| reject(e.to_string()))?;
        for (i, entry) in exported.history.iter().enumerate() {
            entry
                .state
                .validate(&self.config)
                .map_err(|e| reject(format!("history[{i}]: {e}")))?;
        }

        let mut history: VecDeque<HistoryEntry> = exported.history.into();
        let dropped = history.len().saturating_sub(self.config.max_history);
        history.drain(..dropped);

        let current_index = match exported.current_index {
            Some(index) if index < dropped => None,
            Some(index) if index - dropped >= history.len() => {
                return Err(reject(format!(
                    "currentIndex {index} outside history of {}",
                    history.len() + dropped
                )))
            }
            Some(index) => Some(index - dropped),
            None => history.len().checked_sub(1),
        };

        let previous = std::mem::replace(&mut self.current, exported.state);
        self.history = history;
        self.current_index = current_index;
        tracing::info!(history = self.history.len(), "state imported");

        self.notify(&previous, &Action::custom(IMPORT_STATE, serde_json::Value::Null));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{GameField, UiField};
    use crate::clock::ManualClock;
    use crate::document::Difficulty;
    use crate::snapshot::RoundPhase;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn manager() -> (StateManager, ManualClock) {
        let clock = ManualClock::at_millis(1_706_745_600_000);
        (StateManager::new(EngineConfig::default(), clock.clone()), clock)
    }

    fn start_and_activate(manager: &mut StateManager) {
        manager
            .dispatch(Action::start_game("#336699", Some(Difficulty::Medium)))
            .unwrap();
        manager.dispatch(Action::ActivateRound).unwrap();
    }

    #[test]
    fn dispatch_commits_and_archives() {
        let (mut manager, _) = manager();
        let initial = manager.get_state().clone();

        let next = manager.dispatch(Action::start_game("#336699", None)).unwrap();
        assert_eq!(next.game.phase, RoundPhase::Memorizing);
        assert_eq!(manager.get_state(), &next);
        assert_eq!(manager.history_len(), 1);
        assert_eq!(manager.current_index(), Some(0));
        assert_eq!(manager.history().next().map(|e| &e.state), Some(&initial));
    }

    #[test]
    fn invalid_transition_leaves_state_untouched() {
        let (mut manager, _) = manager();
        let before = manager.get_state().clone();

        let result = manager.dispatch(Action::SetGameField(GameField::TipCount(99)));
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { action, .. }) if action == "SET_GAME_FIELD"
        ));
        assert_eq!(manager.get_state(), &before);
        assert_eq!(manager.history_len(), 0);

        let result = manager.dispatch(Action::SetGameField(GameField::GeneratedColor(Some("blue".into()))));
        assert!(result.is_err());
    }

    #[test]
    fn empty_type_is_rejected() {
        let (mut manager, _) = manager();
        let result = manager.dispatch(Action::custom("  ", serde_json::Value::Null));
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn middleware_runs_in_order_and_can_rewrite() {
        let (mut manager, _) = manager();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        manager.use_middleware(move |action: Action, _: &GameSnapshot| {
            log.borrow_mut().push(format!("first:{action}"));
            match action {
                Action::Custom { action_type, .. } if action_type == "LEGACY_RESET" => Action::ResetState,
                other => other,
            }
        });
        let log = Rc::clone(&seen);
        manager.use_middleware(move |action: Action, _: &GameSnapshot| {
            log.borrow_mut().push(format!("second:{action}"));
            action
        });
        manager.use_middleware(LoggingMiddleware);

        manager.dispatch(Action::custom("LEGACY_RESET", serde_json::Value::Null)).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec!["first:LEGACY_RESET".to_string(), "second:RESET_STATE".to_string()]
        );
        assert_eq!(manager.history().last().map(|e| e.action.clone()), Some(Action::ResetState));
    }

    #[test]
    fn path_subscribers_fire_only_on_change() {
        let (mut manager, _) = manager();
        let hits = Rc::new(RefCell::new(Vec::new()));

        for path in ["*", "game.score", "ui.feedback", "user"] {
            let log = Rc::clone(&hits);
            manager
                .subscribe_path(path, move |_, _, action| {
                    log.borrow_mut().push(format!("{path}:{action}"))
                })
                .unwrap();
        }

        start_and_activate(&mut manager);
        manager.dispatch(Action::UpdateScore { delta: 20 }).unwrap();
        manager
            .dispatch(Action::SetUiField(UiField::FeedbackMessage("Nice".into())))
            .unwrap();

        let hits = hits.borrow();
        assert!(hits.contains(&"game.score:UPDATE_SCORE".to_string()));
        assert!(hits.contains(&"ui.feedback:SET_UI_FIELD".to_string()));
        assert!(!hits.contains(&"ui.feedback:START_GAME".to_string()));
        assert!(!hits.iter().any(|h| h.starts_with("user:")));
        assert_eq!(hits.iter().filter(|h| h.starts_with("*:")).count(), 4);
    }

    #[test]
    fn unknown_path_is_rejected() {
        let (mut manager, _) = manager();
        assert!(manager.subscribe_path("game.nope", |_, _, _| {}).is_err());
    }

    #[test]
    fn panicking_subscriber_does_not_abort_dispatch() {
        let (mut manager, _) = manager();
        let calls = Rc::new(RefCell::new(0));
        manager.subscribe(StatePath::All, |_, _, _| panic!("listener bug"));
        let counter = Rc::clone(&calls);
        manager.subscribe(StatePath::All, move |_, _, _| *counter.borrow_mut() += 1);

        assert!(manager.dispatch(Action::ResetState).is_ok());
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let (mut manager, _) = manager();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let id = manager.subscribe(StatePath::All, move |_, _, _| *counter.borrow_mut() += 1);

        manager.dispatch(Action::ResetState).unwrap();
        assert!(manager.unsubscribe(id));
        manager.dispatch(Action::ResetState).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let clock = ManualClock::at_millis(0);
        let config = EngineConfig::default().with_max_history(3);
        let mut manager = StateManager::new(config, clock);

        for delta in 1..=5 {
            manager
                .dispatch(Action::SetGameField(GameField::Score(delta)))
                .unwrap();
        }
        assert_eq!(manager.history_len(), 3);
        assert_eq!(manager.current_index(), Some(2));
        let scores: Vec<_> = manager.history().map(|e| e.state.game.score).collect();
        assert_eq!(scores, vec![2, 3, 4]);
    }

    #[test]
    fn time_travel_restores_archived_snapshot() {
        let (mut manager, clock) = manager();
        for score in [10, 20, 30] {
            clock.advance_ms(1000);
            manager.dispatch(Action::SetGameField(GameField::Score(score))).unwrap();
        }

        let archived = manager.history().nth(1).map(|e| e.state.clone()).unwrap();
        let phases = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&phases);
        manager.subscribe(StatePath::GameScore, move |state, previous, action| {
            log.borrow_mut().push((previous.game.score, state.game.score, action.to_string()))
        });

        manager.time_travel(1).unwrap();
        assert_eq!(manager.get_state(), &archived);
        assert_eq!(manager.history_len(), 3);
        assert_eq!(manager.current_index(), Some(1));
        assert_eq!(*phases.borrow(), vec![(30, 10, TIME_TRAVEL.to_string())]);

        assert!(matches!(
            manager.time_travel(3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        ));

        // Dispatching after time travel continues from the restored snapshot.
        manager.dispatch(Action::SetGameField(GameField::Score(99))).unwrap();
        assert_eq!(manager.history_len(), 4);
        assert_eq!(manager.current_index(), Some(3));
        assert_eq!(manager.history().last().map(|e| e.state.game.score), Some(10));
    }

    #[test]
    fn export_import_round_trip() {
        let (mut manager, clock) = manager();
        start_and_activate(&mut manager);
        clock.advance_ms(4000);
        manager.dispatch(Action::UpdateScore { delta: 196 }).unwrap();
        let json = manager.export_state().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["state"]["game"]["startTime"]["__type"], "Date");

        let (mut other, _) = self::manager();
        other.import_state(&json).unwrap();
        assert_eq!(other.get_state(), manager.get_state());
        assert_eq!(other.history_len(), manager.history_len());
        assert_eq!(other.current_index(), manager.current_index());
        assert!(other.get_state().game.start_time.is_some());
    }

    #[test]
    fn invalid_import_leaves_state_untouched() {
        let (mut manager, _) = manager();
        manager.dispatch(Action::SetGameField(GameField::Score(5))).unwrap();
        let before = manager.get_state().clone();

        assert!(matches!(
            manager.import_state("{\"state\": 1}"),
            Err(Error::InvalidStateTransition { .. })
        ));

        let mut exported: serde_json::Value =
            serde_json::from_str(&manager.export_state().unwrap()).unwrap();
        exported["state"]["game"]["tipCount"] = serde_json::json!(50);
        assert!(manager.import_state(&exported.to_string()).is_err());

        let mut exported: serde_json::Value =
            serde_json::from_str(&manager.export_state().unwrap()).unwrap();
        exported["currentIndex"] = serde_json::json!(7);
        assert!(manager.import_state(&exported.to_string()).is_err());

        assert_eq!(manager.get_state(), &before);
        assert_eq!(manager.history_len(), 1);
    }
}

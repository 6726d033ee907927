//! # hexmemo Engine
//!
//! The game core behind hexmemo, a color-memorization game: a target color
//! is shown briefly, hidden, and the player reconstructs it.
//!
//! This crate has no UI and no platform IO of its own. Time comes from a
//! [`Clock`], timers from a [`Scheduler`] and storage from a
//! [`StorageBackend`], so the same engine runs natively, in WASM, and under
//! test with fully controlled time.
//!
//! ## Core Concepts
//!
//! ### Snapshots and actions
//!
//! The whole game is one immutable [`GameSnapshot`] with four sections
//! (`game`, `ui`, `user`, `system`). Changes are expressed as [`Action`]s and
//! applied by the pure [`reduce`] function. The [`StateManager`] owns the
//! current snapshot, a bounded history for undo/time travel, middleware and
//! path-filtered subscribers.
//!
//! ### Persistence
//!
//! The [`PersistenceStore`] keeps versioned JSON documents (preferences,
//! statistics, high scores, game history, error log) in a namespaced
//! key-value backend. Documents are schema-checked, migrated on open, and
//! updated atomically per [`PersistenceStore::record_game`] call.
//!
//! ### Rounds
//!
//! [`GameSession`] runs a single round: generate, memorize, guess, score.
//! Color math (hex parsing, CIE Lab distance, match percentage) lives in
//! [`color`].
//!
//! ## Quick Start
//!
//! ```rust
//! use hexmemo_engine::{
//!     Action, Difficulty, EngineConfig, GameResult, ManualClock, MemoryStorage,
//!     PersistenceStore, RoundPhase, StateManager,
//! };
//!
//! let clock = ManualClock::at_millis(1_706_745_600_000);
//!
//! // 1. Drive the snapshot through a round
//! let mut state = StateManager::new(EngineConfig::default(), clock.clone());
//! state.dispatch(Action::start_game("#a1b2c3", Some(Difficulty::Hard))).unwrap();
//! state.dispatch(Action::ActivateRound).unwrap();
//! assert_eq!(state.get_state().game.phase, RoundPhase::Active);
//!
//! // 2. Persist the result
//! let mut store = PersistenceStore::new(MemoryStorage::new(), clock, EngineConfig::default());
//! let stats = store
//!     .record_game(&GameResult::win(290, Difficulty::Hard, 100.0, 10_000))
//!     .unwrap();
//! assert_eq!(stats.games_won, 1);
//! assert_eq!(store.high_scores().len(), 1);
//! ```

pub mod action;
pub mod backend;
pub mod clock;
pub mod color;
pub mod config;
pub mod document;
pub mod error;
pub mod notify;
pub mod reducer;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod store;

// Re-export main types at crate root
pub use action::{Action, GameField, RawAction, UiField};
pub use backend::{BackendError, MemoryStorage, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use color::{compare_colors, Channel, ColorComparison, MatchCategory, Rgb};
pub use config::EngineConfig;
pub use document::{
    Difficulty, GameHistoryEntry, GameResult, GameStatistics, HighScoreBoard, HighScoreEntry,
    Preference, Theme, UserPreferences,
};
pub use error::{Error, ErrorKind, ErrorRecord, Severity};
pub use notify::SubscriptionId;
pub use reducer::reduce;
pub use scheduler::{ManualScheduler, Scheduler, TimerToken};
pub use schema::DocumentKey;
pub use session::{GameSession, GuessOutcome};
pub use snapshot::{ExportedState, GameSnapshot, HistoryEntry, RoundPhase};
pub use state::{LoggingMiddleware, Middleware, StateManager, StatePath};
pub use stats::StatsSummary;
pub use store::{ExportBundle, PersistenceStore};

#[cfg(target_arch = "wasm32")]
pub use backend::WebStorage;

/// Version number carried by every persisted document.
pub type SchemaVersion = u32;

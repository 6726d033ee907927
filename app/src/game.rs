//! Terminal commands and the game they drive.
//!
//! [`Game`] owns the round, the reactive snapshot and the store. Every
//! session change is mirrored into the [`StateManager`] as an action, and
//! every resolved round is persisted through `record_game`.

use crate::error::{AppError, Result};
use hexmemo_engine::{
    Action, Channel, Clock, Difficulty, ErrorRecord, GameResult, GameSession, GuessOutcome,
    LoggingMiddleware, PersistenceStore, Preference, Scheduler, StateManager, StatePath,
    StatsSummary, StorageBackend, TimerToken, UiField,
};
use rand::rngs::StdRng;
use std::fmt::Write as _;
use std::str::FromStr;

pub const HELP: &str = "\
commands:
  new                   start a round
  guess <hex>           submit a guess, e.g. guess #a1b2c3
  adjust <r|g|b> <n>    nudge one channel of the guess
  tip                   which channel is furthest off
  computer              move the guess close to the target
  giveup                end the round as a loss
  stats                 statistics and high scores
  difficulty <level>    easy, medium or hard
  undo                  step the snapshot back one action
  export                print a backup of all saved data
  quit";

/// A parsed terminal line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    New,
    Guess(String),
    Adjust(Channel, i32),
    Tip,
    Computer,
    GiveUp,
    Stats,
    Difficulty(String),
    Undo,
    Export,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(AppError::Usage("type 'help' for commands"));
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "new" | "n" => Command::New,
            "guess" | "g" => {
                let hex = words.next().ok_or(AppError::Usage("guess <hex>"))?;
                Command::Guess(hex.to_string())
            }
            "adjust" | "a" => {
                let usage = AppError::Usage("adjust <r|g|b> <delta>");
                let channel = words.next().ok_or(AppError::Usage("adjust <r|g|b> <delta>"))?;
                let delta = words.next().and_then(|d| d.parse().ok()).ok_or(usage)?;
                Command::Adjust(channel.parse()?, delta)
            }
            "tip" => Command::Tip,
            "computer" => Command::Computer,
            "giveup" => Command::GiveUp,
            "stats" => Command::Stats,
            "difficulty" => {
                let level = words.next().ok_or(AppError::Usage("difficulty <easy|medium|hard>"))?;
                Command::Difficulty(level.to_string())
            }
            "undo" => Command::Undo,
            "export" => Command::Export,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(AppError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Say(String),
    Quit,
}

impl Reply {
    fn say(text: impl Into<String>) -> Self {
        Reply::Say(text.into())
    }
}

pub struct Game<C, S> {
    session: GameSession,
    state: StateManager,
    store: PersistenceStore,
    scheduler: S,
    clock: C,
    rng: StdRng,
    /// The snapshot sits on a history entry restored by `undo`.
    rewound: bool,
}

impl<C, S> Game<C, S>
where
    C: Clock + Clone + 'static,
    S: Scheduler,
{
    pub fn new(
        engine: hexmemo_engine::EngineConfig,
        backend: impl StorageBackend + 'static,
        clock: C,
        scheduler: S,
        rng: StdRng,
    ) -> Self {
        let mut store = PersistenceStore::new(backend, clock.clone(), engine.clone());
        if let Err(e) = store.start_session() {
            tracing::warn!(error = %e, "could not record session start");
        }
        store.subscribe("game_statistics", |_, key| {
            tracing::debug!(key, "statistics saved");
        });

        let preferences = store.preferences();
        let mut session = GameSession::new(&engine);
        session.set_difficulty_level(preferences.difficulty);

        let mut state = StateManager::new(engine, clock.clone());
        state.use_middleware(LoggingMiddleware);
        state.subscribe(StatePath::GamePhase, |next, previous, action| {
            tracing::debug!(
                from = ?previous.game.phase,
                to = ?next.game.phase,
                action = %action,
                "phase changed"
            );
        });

        let mut game = Self {
            session,
            state,
            store,
            scheduler,
            clock,
            rng,
            rewound: false,
        };
        let statistics = game.store.statistics();
        game.mirror(Action::SetGameField(hexmemo_engine::GameField::Difficulty(
            preferences.difficulty,
        )));
        game.mirror(Action::SyncStatistics(Box::new(statistics)));
        game
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn store_mut(&mut self) -> &mut PersistenceStore {
        &mut self.store
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Dispatch a mirror action. A rejected transition is logged and kept
    /// in the snapshot's error buffer; the session stays authoritative.
    fn mirror(&mut self, action: Action) {
        let outcome = self.state.dispatch(action).or_else(|e| {
            tracing::warn!(error = %e, "snapshot out of step with session");
            let record = ErrorRecord::from_error(&e, self.clock.now());
            self.state.dispatch(Action::AddError(record))
        });
        match outcome {
            Ok(_) => self.rewound = false,
            Err(e) => tracing::warn!(error = %e, "error record rejected by the snapshot"),
        }
    }

    fn feedback(&mut self, message: &str) {
        self.mirror(Action::SetUiField(UiField::FeedbackMessage(message.to_string())));
    }

    /// A timer fired. Returns a message when it revealed the guessing phase.
    pub fn on_timer(&mut self, token: TimerToken) -> Option<String> {
        if !self.session.on_timer(token, &self.clock) {
            return None;
        }
        self.mirror(Action::ActivateRound);
        Some(format!(
            "Color hidden. Your guess starts at {}. Go!",
            self.session.guess()
        ))
    }

    pub fn handle(&mut self, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::New => {
                let target = self.session.start_round(&mut self.rng, &mut self.scheduler);
                self.mirror(Action::start_game(&target, Some(self.session.difficulty())));
                Reply::say(format!(
                    "Round {} ({}). Memorize {target} ...",
                    self.session.round(),
                    self.session.difficulty()
                ))
            }

            Command::Guess(hex) => match self.session.submit_guess(&hex, &self.clock)? {
                None => Reply::say("No round in progress. Type 'new'."),
                Some(GuessOutcome::Miss { comparison }) => {
                    let message = format!("{:.2}% match, {}", comparison.percentage, comparison.category);
                    self.feedback(&message);
                    Reply::Say(message)
                }
                Some(GuessOutcome::Won { round_score, result, .. }) => {
                    self.mirror(Action::UpdateScore {
                        delta: i64::from(round_score),
                    });
                    self.mirror(Action::EndGame { won: true });
                    let mut message = format!(
                        "Exact match! +{round_score} points (total {}).",
                        self.session.score()
                    );
                    self.record(&result, &mut message);
                    self.feedback(&message);
                    Reply::Say(message)
                }
            },

            Command::Adjust(channel, delta) => match self.session.adjust_guess(channel, delta) {
                Some(guess) => Reply::say(format!("Guess is now {guess}")),
                None => Reply::say("No round in progress."),
            },

            Command::Tip => {
                if !self.session.is_active() {
                    Reply::say("No round in progress.")
                } else if self.session.tip_count() == 0 {
                    Reply::say("No tips left this round.")
                } else {
                    let hint = self.session.use_tip();
                    self.mirror(Action::UseTip);
                    match hint {
                        Some(hint) => Reply::say(format!(
                            "{} {} by about {} ({} tips left)",
                            if hint.is_increase() { "Increase" } else { "Decrease" },
                            hint.channel,
                            hint.difference.abs(),
                            self.session.tip_count()
                        )),
                        None => Reply::say("Your guess is already exact."),
                    }
                }
            }

            Command::Computer => {
                if !self.session.is_active() {
                    Reply::say("No round in progress.")
                } else {
                    match self.session.use_computer_tip(&mut self.rng) {
                        Some(guess) => {
                            self.mirror(Action::UseComputerTip);
                            Reply::say(format!(
                                "Guess moved to {guess} ({} computer tips left)",
                                self.session.computer_tip_count()
                            ))
                        }
                        None => Reply::say("No computer tips left this round."),
                    }
                }
            }

            Command::GiveUp => match self.session.give_up(&self.clock) {
                Some(result) => {
                    self.mirror(Action::EndGame { won: false });
                    let mut message = format!(
                        "The color was {}. Your guess matched {:.2}%.",
                        result.target_color.as_deref().unwrap_or("?"),
                        result.accuracy
                    );
                    self.record(&result, &mut message);
                    Reply::Say(message)
                }
                None => Reply::say("No round in progress."),
            },

            Command::Stats => Reply::Say(StatsSummary::from_store(&mut self.store).to_string()),

            Command::Difficulty(level) => {
                let difficulty: Difficulty = level.parse()?;
                if !self.session.set_difficulty_level(difficulty) {
                    return Ok(Reply::say("Finish the current round before changing difficulty."));
                }
                self.mirror(Action::SetGameField(hexmemo_engine::GameField::Difficulty(
                    difficulty,
                )));
                match self.store.update_preferences(Preference::Difficulty(difficulty)) {
                    Ok(_) => Reply::say(format!("Difficulty set to {difficulty}.")),
                    Err(e) => {
                        tracing::warn!(error = %e, "difficulty preference not saved");
                        Reply::say(format!("Difficulty set to {difficulty} (not saved)."))
                    }
                }
            }

            Command::Undo => {
                let target = match self.state.current_index() {
                    Some(index) if self.rewound => index.checked_sub(1),
                    other => other,
                };
                match target {
                    Some(index) => {
                        self.state.time_travel(index)?;
                        self.rewound = true;
                        let game = &self.state.get_state().game;
                        Reply::say(format!(
                            "Snapshot rewound to entry {index}: round {}, score {}, {:?}",
                            game.round, game.score, game.phase
                        ))
                    }
                    None => Reply::say("Nothing to undo."),
                }
            }

            Command::Export => Reply::Say(self.store.export_all().to_json_pretty()?),

            Command::Help => Reply::say(HELP),

            Command::Quit => Reply::Quit,
        };
        Ok(reply)
    }

    /// Persist a resolved round. Write failures are reported, not fatal.
    fn record(&mut self, result: &GameResult, message: &mut String) {
        match self.store.record_game(result) {
            Ok(statistics) => {
                let _ = write!(
                    message,
                    " Streak {} (best {}).",
                    statistics.current_streak, statistics.best_streak
                );
                self.mirror(Action::SyncStatistics(Box::new(statistics)));
            }
            Err(e) => {
                tracing::error!(error = %e, "game result not persisted");
                message.push_str(" Warning: progress not saved.");
                let record = ErrorRecord::from_error(&e, self.clock.now());
                if let Err(e) = self.store.log_error(&record) {
                    tracing::debug!(error = %e, "error log also unavailable");
                }
                self.mirror(Action::AddError(record));
            }
        }
    }
}

//! Persistence store - versioned documents over a key-value backend.
//!
//! The store owns an in-memory read cache in front of a [`StorageBackend`],
//! migrates stale documents when it is constructed, and notifies per-key
//! subscribers after every successful write. Reads never fail: a missing,
//! corrupt or unreachable document reads as its default. Writes do fail, and
//! the caller has to handle it.

use crate::{
    backend::{BackendError, StorageBackend},
    clock::Clock,
    config::EngineConfig,
    document::{
        validate_locale, GameHistoryEntry, GameResult, GameStatistics, HighScoreBoard,
        HighScoreEntry, Preference, UserPreferences, SCHEMA_VERSION,
    },
    error::{ErrorKind, ErrorRecord, Result},
    notify::{Registry, SubscriptionId},
    schema::{migrate_document, shallow_merge, DocumentKey},
    Error, SchemaVersion,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Callback invoked with `(new_value, key)`; `Value::Null` after a removal.
pub type KeyCallback = dyn FnMut(&Value, &str);

/// Backup of every well-known document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// Schema version at export time
    pub version: SchemaVersion,
    pub exported_at: DateTime<Utc>,
    /// Documents by logical key
    pub data: BTreeMap<String, Value>,
}

impl ExportBundle {
    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Durable key → document storage.
pub struct PersistenceStore {
    backend: Box<dyn StorageBackend>,
    clock: Box<dyn Clock>,
    config: EngineConfig,
    cache: HashMap<String, Value>,
    subscribers: Registry<String, KeyCallback>,
    migrated: Vec<DocumentKey>,
}

impl std::fmt::Debug for PersistenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("key_prefix", &self.config.key_prefix)
            .field("cached", &self.cache.len())
            .field("subscribers", &self.subscribers.len())
            .field("migrated", &self.migrated)
            .finish()
    }
}

impl PersistenceStore {
    /// Create a store and migrate stale documents.
    ///
    /// Migration problems are logged, never returned.
    pub fn new(
        backend: impl StorageBackend + 'static,
        clock: impl Clock + 'static,
        config: EngineConfig,
    ) -> Self {
        let mut store = Self {
            backend: Box::new(backend),
            clock: Box::new(clock),
            config,
            cache: HashMap::new(),
            subscribers: Registry::default(),
            migrated: Vec::new(),
        };
        store.migrated = store.migrate();
        store
    }

    /// Engine configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Keys rewritten by the construction-time migration.
    pub fn migrated_keys(&self) -> &[DocumentKey] {
        &self.migrated
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Raw document access
    // -----------------------------------------------------------------------

    /// Read a document, falling back to `default`.
    pub fn get(&mut self, key: &str, default: Value) -> Value {
        if let Some(cached) = self.cache.get(key) {
            return cached.clone();
        }

        match self.backend.get_item(&self.storage_key(key)) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    self.cache.insert(key.to_string(), value.clone());
                    value
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "stored document is not valid JSON, using default");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "storage read failed, using default");
                default
            }
        }
    }

    /// Write a document and notify subscribers of `key`.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.commit(vec![(key.to_string(), value)])
    }

    /// Remove a document and notify subscribers of `key` with `Null`.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let storage_key = self.storage_key(key);
        self.backend
            .remove_item(&storage_key)
            .map_err(|e| write_error(key, e))?;
        self.cache.remove(key);
        tracing::debug!(key, "document removed");
        self.notify(key, &Value::Null);
        Ok(())
    }

    /// Remove every well-known document.
    pub fn clear(&mut self) -> Result<()> {
        for key in DocumentKey::ALL {
            self.remove(key.as_str())?;
        }
        self.cache.clear();
        Ok(())
    }

    /// Subscribe to writes and removals of `key`.
    pub fn subscribe<F>(&mut self, key: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: FnMut(&Value, &str) + 'static,
    {
        self.subscribers.insert(key.into(), Box::new(callback))
    }

    /// Drop a subscription. Returns false if it was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    fn notify(&mut self, key: &str, value: &Value) {
        let failures = self
            .subscribers
            .notify(|filter| filter == key, |callback| callback(value, key));
        if failures > 0 {
            tracing::warn!(key, failures, "some store subscribers failed");
        }
    }

    /// Write several documents as one visible transition.
    ///
    /// Either every document is written, cached and announced, or none is:
    /// when a backend write fails the earlier writes of the batch are
    /// restored before the error is returned.
    fn commit(&mut self, writes: Vec<(String, Value)>) -> Result<()> {
        let encoded = writes
            .iter()
            .map(|(_, value)| serde_json::to_string(value))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut applied: Vec<(String, Option<String>)> = Vec::with_capacity(writes.len());

        for ((key, _), raw) in writes.iter().zip(&encoded) {
            let storage_key = self.storage_key(key);
            let previous = self.backend.get_item(&storage_key).ok().flatten();

            if let Err(e) = self.backend.set_item(&storage_key, raw) {
                tracing::error!(key = %key, error = %e, "storage write failed");
                self.rollback(applied);
                return Err(write_error(key, e));
            }
            applied.push((storage_key, previous));
        }

        for (key, value) in &writes {
            self.cache.insert(key.clone(), value.clone());
        }
        for (key, value) in &writes {
            self.notify(key, value);
        }
        Ok(())
    }

    fn rollback(&mut self, applied: Vec<(String, Option<String>)>) {
        for (storage_key, previous) in applied.into_iter().rev() {
            let restored = match previous {
                Some(raw) => self.backend.set_item(&storage_key, &raw),
                None => self.backend.remove_item(&storage_key),
            };
            if let Err(e) = restored {
                tracing::error!(key = %storage_key, error = %e, "rollback of partial write failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Typed documents
    // -----------------------------------------------------------------------

    /// Read a well-known document as its typed form.
    pub fn get_document<T>(&mut self, key: DocumentKey) -> T
    where
        T: DeserializeOwned + Default,
    {
        let default = key.default_document(self.now());
        let value = self.get(key.as_str(), default.clone());
        match serde_json::from_value(value) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "stored document has the wrong shape, using default");
                serde_json::from_value(default).unwrap_or_default()
            }
        }
    }

    /// Write a well-known document from its typed form.
    pub fn set_document<T: Serialize>(&mut self, key: DocumentKey, document: &T) -> Result<()> {
        let value = to_value(document)?;
        self.set(key.as_str(), value)
    }

    pub fn statistics(&mut self) -> GameStatistics {
        self.get_document(DocumentKey::GameStatistics)
    }

    pub fn preferences(&mut self) -> UserPreferences {
        self.get_document(DocumentKey::UserPreferences)
    }

    pub fn high_scores(&mut self) -> HighScoreBoard {
        self.get_document(DocumentKey::HighScores)
    }

    pub fn game_history(&mut self) -> Vec<GameHistoryEntry> {
        self.get_document(DocumentKey::GameHistory)
    }

    pub fn error_log(&mut self) -> Vec<ErrorRecord> {
        self.get_document(DocumentKey::Errors)
    }

    pub fn locale(&mut self) -> String {
        let value = self.get(DocumentKey::Locale.as_str(), Value::Null);
        value.as_str().unwrap_or("en").to_string()
    }

    /// Apply one preference change and persist it.
    pub fn update_preferences(&mut self, preference: Preference) -> Result<UserPreferences> {
        let mut preferences = self.preferences();
        preferences.apply(preference)?;
        preferences.updated_at = Some(self.now());
        self.set_document(DocumentKey::UserPreferences, &preferences)?;
        Ok(preferences)
    }

    /// Persist the UI locale.
    pub fn set_locale(&mut self, locale: &str) -> Result<()> {
        validate_locale(locale)?;
        self.set(DocumentKey::Locale.as_str(), Value::String(locale.to_string()))
    }

    /// Reset the session sub-record of the statistics document.
    pub fn start_session(&mut self) -> Result<()> {
        let now = self.now();
        let mut statistics = self.statistics();
        statistics.session.start_time = now;
        statistics.session.games_played = 0;
        statistics.session.games_won = 0;
        statistics.updated_at = now;
        self.set_document(DocumentKey::GameStatistics, &statistics)
    }

    /// Append an error to the persisted error log.
    pub fn log_error(&mut self, record: &ErrorRecord) -> Result<()> {
        let mut log = self.error_log();
        log.push(record.clone());
        trim_front(&mut log, self.config.max_logged_errors);
        self.set_document(DocumentKey::Errors, &log)
    }

    // -----------------------------------------------------------------------
    // Game outcomes
    // -----------------------------------------------------------------------

    /// Fold a finished round into statistics, high scores and history.
    ///
    /// All three documents change together or not at all.
    pub fn record_game(&mut self, result: &GameResult) -> Result<GameStatistics> {
        result.validate()?;
        let now = self.now();

        let mut statistics = self.statistics();
        statistics.apply_result(result, self.config.max_accuracy_history, now);

        let mut writes = vec![(
            DocumentKey::GameStatistics.as_str().to_string(),
            to_value(&statistics)?,
        )];

        if result.won && result.score > 0 {
            let mut board = self.high_scores();
            let rank = board.insert(
                HighScoreEntry::from_result(result, now),
                self.config.max_scores,
            );
            tracing::debug!(score = result.score, ?rank, "high score candidate");
            writes.push((DocumentKey::HighScores.as_str().to_string(), to_value(&board)?));
        }

        let mut history = self.game_history();
        history.push(GameHistoryEntry {
            result: result.clone(),
            played_at: now,
        });
        trim_front(&mut history, self.config.max_game_history);
        writes.push((DocumentKey::GameHistory.as_str().to_string(), to_value(&history)?));

        self.commit(writes)?;
        tracing::info!(
            won = result.won,
            score = result.score,
            difficulty = %result.difficulty,
            total_games = statistics.total_games,
            "game recorded"
        );
        Ok(statistics)
    }

    /// Insert a high-score entry. Returns its rank, or `None` if it did not
    /// make the board.
    pub fn add_high_score(&mut self, entry: HighScoreEntry) -> Result<Option<usize>> {
        let mut board = self.high_scores();
        let rank = board.insert(entry, self.config.max_scores);
        self.set_document(DocumentKey::HighScores, &board)?;
        Ok(rank)
    }

    // -----------------------------------------------------------------------
    // Migration, export and import
    // -----------------------------------------------------------------------

    /// Bring every versioned document up to the current schema version.
    ///
    /// Returns the keys that were rewritten. Runs once from [`Self::new`];
    /// running it again is a no-op.
    pub fn migrate(&mut self) -> Vec<DocumentKey> {
        let now = self.now();
        let mut migrated = Vec::new();

        for key in DocumentKey::ALL.into_iter().filter(|k| k.is_versioned()) {
            let storage_key = self.storage_key(key.as_str());
            let stored = match self.backend.get_item(&storage_key) {
                Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "skipping migration of corrupt document");
                        continue;
                    }
                },
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "storage unavailable, migration skipped");
                    continue;
                }
            };

            let upgraded = match migrate_document(key, &stored, now) {
                Ok(upgraded) if upgraded == stored => continue,
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::warn!(key = %key, kind = %ErrorKind::Migration, error = %e, "migration failed");
                    continue;
                }
            };

            let raw = match serde_json::to_string(&upgraded) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "migrated document not serializable");
                    continue;
                }
            };
            if let Err(e) = self.backend.set_item(&storage_key, &raw) {
                tracing::warn!(key = %key, error = %e, "could not write migrated document");
                continue;
            }

            tracing::info!(key = %key, to = SCHEMA_VERSION, "document migrated");
            self.cache.insert(key.as_str().to_string(), upgraded);
            migrated.push(key);
        }

        migrated
    }

    /// Snapshot every well-known document into one bundle.
    pub fn export_all(&mut self) -> ExportBundle {
        let now = self.now();
        let data = DocumentKey::ALL
            .into_iter()
            .map(|key| {
                let value = self.get(key.as_str(), key.default_document(now));
                (key.as_str().to_string(), value)
            })
            .collect();

        ExportBundle {
            version: SCHEMA_VERSION,
            exported_at: now,
            data,
        }
    }

    /// Restore documents from a bundle produced by [`Self::export_all`].
    ///
    /// With `merge`, top-level fields of each incoming object document are
    /// laid over the existing one; otherwise incoming documents replace the
    /// existing ones. Every document is validated before anything is written.
    pub fn import_all(&mut self, bundle: &Value, merge: bool) -> Result<()> {
        let bundle = bundle
            .as_object()
            .ok_or_else(|| Error::InvalidImport("bundle must be an object".into()))?;
        let data = bundle
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidImport("bundle has no 'data' object".into()))?;

        let now = self.now();
        let mut writes = Vec::new();

        for (name, incoming) in data {
            let key = match name.parse::<DocumentKey>() {
                Ok(key) => key,
                Err(_) => {
                    tracing::warn!(key = %name, "ignoring unknown key in import");
                    continue;
                }
            };

            let document = match (merge, incoming) {
                (true, Value::Object(incoming)) => {
                    match self.get(key.as_str(), key.default_document(now)) {
                        Value::Object(existing) => Value::Object(shallow_merge(&existing, incoming)),
                        _ => Value::Object(incoming.clone()),
                    }
                }
                _ => incoming.clone(),
            };

            key.schema()
                .validate(&document)
                .and_then(|()| self.check_import(key, &document))
                .map_err(|e| Error::InvalidImport(format!("{key}: {e}")))?;
            writes.push((key.as_str().to_string(), document));
        }

        let count = writes.len();
        self.commit(writes)?;
        tracing::info!(documents = count, merge, "import complete");
        Ok(())
    }

    /// Read an imported document back as its typed form and check the
    /// invariants the typed form carries.
    fn check_import(&self, key: DocumentKey, document: &Value) -> Result<()> {
        fn read<T: DeserializeOwned>(document: &Value) -> Result<T> {
            serde_json::from_value(document.clone())
                .map_err(|e| Error::validation("document", e.to_string()))
        }

        match key {
            DocumentKey::GameStatistics => {
                read::<GameStatistics>(document)?.validate(self.config.max_accuracy_history)
            }
            DocumentKey::UserPreferences => read::<UserPreferences>(document).map(drop),
            DocumentKey::HighScores => {
                if read::<HighScoreBoard>(document)?.is_well_ordered(self.config.max_scores) {
                    Ok(())
                } else {
                    Err(Error::validation("scores", "must be sorted and within the board size"))
                }
            }
            DocumentKey::GameHistory => read::<Vec<GameHistoryEntry>>(document)?
                .iter()
                .try_for_each(|entry| entry.result.validate()),
            DocumentKey::Errors => read::<Vec<ErrorRecord>>(document).map(drop),
            DocumentKey::Settings | DocumentKey::Locale => Ok(()),
        }
    }
}

/// An unreachable backend is reported as such; any other rejection is a
/// failed write of `key`.
fn write_error(key: &str, error: BackendError) -> Error {
    match error {
        BackendError::Unavailable(reason) => Error::StorageUnavailable(format!("{key}: {reason}")),
        other => Error::StorageWrite {
            key: key.to_string(),
            reason: other.to_string(),
        },
    }
}

fn to_value<T: Serialize>(document: &T) -> Result<Value> {
    serde_json::to_value(document).map_err(|e| Error::Serialization(e.to_string()))
}

fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStorage;
    use crate::clock::ManualClock;
    use crate::document::{Difficulty, Theme};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    const PREFIX: &str = "colorGame_";

    fn clock() -> ManualClock {
        ManualClock::at_millis(1_706_745_600_000)
    }

    fn test_store() -> (PersistenceStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        let store = PersistenceStore::new(storage.clone(), clock(), EngineConfig::default());
        (store, storage)
    }

    #[test]
    fn get_returns_default_on_miss() {
        let (mut store, _) = test_store();
        assert_eq!(store.get("anything", json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn set_then_get_uses_prefix_and_cache() {
        let (mut store, storage) = test_store();
        store.set("settings", json!({"version": 2, "x": 1})).unwrap();

        assert!(storage.raw(&format!("{PREFIX}settings")).is_some());
        // Changing the backend behind the store's back does not bypass the cache.
        storage.insert_raw(format!("{PREFIX}settings"), "{\"x\": 2}");
        assert_eq!(store.get("settings", Value::Null)["x"], 1);
    }

    #[test]
    fn corrupt_document_reads_as_default() {
        let storage = MemoryStorage::new();
        storage.insert_raw(format!("{PREFIX}game_history"), "{not json");
        let mut store = PersistenceStore::new(storage, clock(), EngineConfig::default());
        assert_eq!(store.get("game_history", json!([])), json!([]));
        assert!(store.game_history().is_empty());
    }

    #[test]
    fn unavailable_backend_reads_defaults() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);
        let mut store = PersistenceStore::new(storage, clock(), EngineConfig::default());
        assert_eq!(store.statistics().total_games, 0);
        let err = store.set("x", json!(1)).unwrap_err();
        assert!(matches!(&err, Error::StorageUnavailable(reason) if reason.starts_with("x:")));
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(matches!(store.remove("x"), Err(Error::StorageUnavailable(_))));
    }

    #[test]
    fn failed_write_leaves_cache_and_subscribers_untouched() {
        let (mut store, storage) = test_store();
        store.set("settings", json!({"v": 1})).unwrap();

        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        store.subscribe("settings", move |_, _| *counter.borrow_mut() += 1);

        storage.fail_writes_for(format!("{PREFIX}settings"));
        assert!(store.set("settings", json!({"v": 2})).is_err());
        assert_eq!(store.get("settings", Value::Null), json!({"v": 1}));
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn subscribers_receive_value_and_key() {
        let (mut store, _) = test_store();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        let id = store.subscribe("locale", move |value, key| {
            log.borrow_mut().push((key.to_string(), value.clone()))
        });
        store.subscribe("other", |_, _| panic!("wrong key"));

        store.set_locale("fr").unwrap();
        store.remove("locale").unwrap();
        assert!(store.unsubscribe(id));
        store.set_locale("de").unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                ("locale".to_string(), json!("fr")),
                ("locale".to_string(), Value::Null)
            ]
        );
    }

    #[test]
    fn panicking_subscriber_does_not_fail_the_write() {
        let (mut store, _) = test_store();
        let hits = Rc::new(RefCell::new(0));
        store.subscribe("settings", |_, _| panic!("subscriber bug"));
        let counter = Rc::clone(&hits);
        store.subscribe("settings", move |_, _| *counter.borrow_mut() += 1);

        assert!(store.set("settings", json!({})).is_ok());
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn set_locale_rejects_unsupported() {
        let (mut store, _) = test_store();
        assert!(matches!(
            store.set_locale("tlh"),
            Err(Error::Validation { field, .. }) if field == "locale"
        ));
        assert_eq!(store.locale(), "en");
    }

    #[test]
    fn record_loss_scenario() {
        let (mut store, _) = test_store();
        store
            .record_game(&GameResult::win(180, Difficulty::Medium, 97.0, 20_000))
            .unwrap();

        let loss: GameResult = serde_json::from_value(json!({
            "won": false, "score": 0, "difficulty": "easy", "accuracy": 42.5, "time": 15000
        }))
        .unwrap();
        let stats = store.record_game(&loss).unwrap();

        assert_eq!(stats.games_lost, 1);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.best_score, 180);
        assert_eq!(stats.games_won + stats.games_lost, stats.total_games);
        assert_eq!(store.high_scores().len(), 1);
        assert_eq!(store.game_history().len(), 2);
    }

    #[test]
    fn record_game_is_atomic() {
        let (mut store, storage) = test_store();
        store
            .record_game(&GameResult::win(100, Difficulty::Easy, 99.0, 5000))
            .unwrap();
        let before = store.statistics();

        let notified = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&notified);
        store.subscribe("game_statistics", move |_, _| *counter.borrow_mut() += 1);

        storage.fail_writes_for(format!("{PREFIX}high_scores"));
        let result = store.record_game(&GameResult::win(300, Difficulty::Hard, 99.5, 2000));
        assert!(matches!(result, Err(Error::StorageWrite { key, .. }) if key == "high_scores"));

        assert_eq!(store.statistics(), before);
        assert_eq!(*notified.borrow(), 0);

        // The backend was rolled back too: a fresh store sees the old document.
        storage.clear_write_failures();
        let mut reopened = PersistenceStore::new(storage, clock(), EngineConfig::default());
        assert_eq!(reopened.statistics(), before);
        assert_eq!(reopened.high_scores().len(), 1);
    }

    #[test]
    fn high_scores_are_bounded_and_sorted() {
        let storage = MemoryStorage::new();
        let config = EngineConfig::default().with_max_scores(3);
        let mut store = PersistenceStore::new(storage, clock(), config);

        for (score, time) in [(100, 9000), (250, 3000), (250, 1000), (90, 100), (300, 5000)] {
            store
                .record_game(&GameResult::win(score, Difficulty::Medium, 95.0, time))
                .unwrap();
        }

        let board = store.high_scores();
        let ranked: Vec<_> = board.scores.iter().map(|e| (e.score, e.time)).collect();
        assert_eq!(ranked, vec![(300, 5000), (250, 1000), (250, 3000)]);
        assert!(board.is_well_ordered(3));
    }

    #[test]
    fn zero_score_win_is_not_a_high_score() {
        let (mut store, _) = test_store();
        store
            .record_game(&GameResult::win(0, Difficulty::Hard, 100.0, 400_000))
            .unwrap();
        assert!(store.high_scores().is_empty());
        assert_eq!(store.statistics().games_won, 1);
    }

    #[test]
    fn add_high_score_reports_rank() {
        let (mut store, _) = test_store();
        let now = clock().now();
        let entry = |score| {
            HighScoreEntry::from_result(&GameResult::win(score, Difficulty::Easy, 90.0, 1000), now)
        };
        assert_eq!(store.add_high_score(entry(10)).unwrap(), Some(0));
        assert_eq!(store.add_high_score(entry(20)).unwrap(), Some(0));
        assert_eq!(store.add_high_score(entry(15)).unwrap(), Some(1));
    }

    #[test]
    fn construction_migrates_stale_documents() {
        let storage = MemoryStorage::new();
        storage.insert_raw(
            format!("{PREFIX}game_statistics"),
            json!({"version": 1, "totalGames": 3, "gamesWon": 2, "gamesLost": 1}).to_string(),
        );
        storage.insert_raw(
            format!("{PREFIX}user_preferences"),
            json!({"theme": "dark"}).to_string(),
        );

        let mut store = PersistenceStore::new(storage.clone(), clock(), EngineConfig::default());
        assert_eq!(
            store.migrated_keys(),
            &[DocumentKey::GameStatistics, DocumentKey::UserPreferences]
        );

        let stats = store.statistics();
        assert_eq!(stats.version, SCHEMA_VERSION);
        assert_eq!(stats.total_games, 3);
        assert_eq!(store.preferences().theme, Theme::Dark);

        let raw: Value =
            serde_json::from_str(&storage.raw(&format!("{PREFIX}user_preferences")).unwrap())
                .unwrap();
        assert_eq!(raw["version"], SCHEMA_VERSION);
        assert_eq!(raw["soundEnabled"], true);
    }

    #[test]
    fn migration_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.insert_raw(
            format!("{PREFIX}high_scores"),
            json!({"scores": []}).to_string(),
        );

        let mut store = PersistenceStore::new(storage.clone(), clock(), EngineConfig::default());
        let once = storage.raw(&format!("{PREFIX}high_scores"));
        assert!(store.migrate().is_empty());
        assert_eq!(storage.raw(&format!("{PREFIX}high_scores")), once);
    }

    #[test]
    fn migration_failure_does_not_prevent_construction() {
        let storage = MemoryStorage::new();
        storage.insert_raw(format!("{PREFIX}high_scores"), "[1, 2, 3]");
        storage.insert_raw(format!("{PREFIX}settings"), "{broken");

        let mut store = PersistenceStore::new(storage, clock(), EngineConfig::default());
        assert!(store.migrated_keys().is_empty());
        assert!(store.high_scores().is_empty());
    }

    #[test]
    fn export_contains_every_key() {
        let (mut store, _) = test_store();
        store.set_locale("ja").unwrap();
        let bundle = store.export_all();

        assert_eq!(bundle.version, SCHEMA_VERSION);
        assert_eq!(bundle.data.len(), DocumentKey::ALL.len());
        assert_eq!(bundle.data["locale"], json!("ja"));
    }

    #[test]
    fn import_merge_preserves_other_fields() {
        let (mut store, _) = test_store();
        store.update_preferences(Preference::SoundEnabled(false)).unwrap();
        store.update_preferences(Preference::Theme(Theme::Dark)).unwrap();

        let bundle = json!({"version": 2, "data": {"user_preferences": {"theme": "light"}}});
        store.import_all(&bundle, true).unwrap();

        let prefs = store.preferences();
        assert_eq!(prefs.theme, Theme::Light);
        assert!(!prefs.sound_enabled);
    }

    #[test]
    fn import_overwrite_replaces_document() {
        let (mut store, _) = test_store();
        store.update_preferences(Preference::SoundEnabled(false)).unwrap();

        let bundle = json!({"data": {"user_preferences": {"theme": "light"}}});
        store.import_all(&bundle, false).unwrap();

        let raw = store.get("user_preferences", Value::Null);
        assert_eq!(raw, json!({"theme": "light"}));
        assert!(store.preferences().sound_enabled);
    }

    #[test]
    fn import_rejects_malformed_bundles() {
        let (mut store, _) = test_store();
        assert!(matches!(store.import_all(&json!([1]), true), Err(Error::InvalidImport(_))));
        assert!(matches!(store.import_all(&json!({"data": 3}), true), Err(Error::InvalidImport(_))));

        let bad = json!({"data": {"locale": "en", "user_preferences": {"theme": "neon"}}});
        assert!(matches!(store.import_all(&bad, false), Err(Error::InvalidImport(_))));
        // Nothing was written, not even the valid document.
        assert_eq!(store.get("locale", Value::Null), Value::Null);
    }

    #[test]
    fn import_rejects_documents_that_do_not_read_back() {
        let (mut store, _) = test_store();
        for _ in 0..3 {
            store
                .record_game(&GameResult::win(200, Difficulty::Medium, 99.0, 5_000))
                .unwrap();
        }

        let negative = json!({"data": {"game_statistics": {"bestScore": -1}}});
        assert!(matches!(store.import_all(&negative, true), Err(Error::InvalidImport(_))));

        let inconsistent = json!({"data": {"game_statistics": {"totalGames": 7}}});
        assert!(matches!(store.import_all(&inconsistent, false), Err(Error::InvalidImport(_))));

        assert_eq!(store.statistics().total_games, 3);
        assert_eq!(store.statistics().best_score, 200);
    }

    #[test]
    fn import_rejects_unsorted_boards_and_bad_history() {
        let (mut store, _) = test_store();
        let at = clock().now();
        let board = serde_json::to_value(HighScoreBoard {
            scores: vec![
                HighScoreEntry::from_result(&GameResult::win(100, Difficulty::Easy, 90.0, 1_000), at),
                HighScoreEntry::from_result(&GameResult::win(300, Difficulty::Hard, 99.0, 1_000), at),
            ],
            ..HighScoreBoard::default()
        })
        .unwrap();
        let bundle = json!({"data": {"high_scores": board}});
        assert!(matches!(store.import_all(&bundle, false), Err(Error::InvalidImport(_))));
        assert!(store.high_scores().is_empty());

        let mut entry = serde_json::to_value(GameHistoryEntry {
            result: GameResult::loss(Difficulty::Easy, 40.0, 2_000),
            played_at: at,
        })
        .unwrap();
        entry["accuracy"] = json!(250.0);
        let bundle = json!({"data": {"game_history": [entry]}});
        assert!(matches!(store.import_all(&bundle, false), Err(Error::InvalidImport(_))));
    }

    #[test]
    fn export_import_round_trip() {
        let (mut store, _) = test_store();
        store
            .record_game(&GameResult::win(150, Difficulty::Medium, 96.0, 12_000))
            .unwrap();
        let bundle = serde_json::to_value(store.export_all()).unwrap();

        let (mut fresh, _) = test_store();
        fresh.import_all(&bundle, false).unwrap();
        assert_eq!(fresh.statistics(), store.statistics());
        assert_eq!(fresh.high_scores(), store.high_scores());
    }

    #[test]
    fn clear_removes_documents() {
        let (mut store, storage) = test_store();
        store.set_locale("fr").unwrap();
        store
            .record_game(&GameResult::loss(Difficulty::Easy, 10.0, 1000))
            .unwrap();
        store.clear().unwrap();
        assert!(storage.keys().is_empty());
        assert_eq!(store.statistics().total_games, 0);
    }

    #[test]
    fn error_log_is_bounded() {
        let storage = MemoryStorage::new();
        let mut config = EngineConfig::default();
        config.max_logged_errors = 2;
        let mut store = PersistenceStore::new(storage, clock(), config);

        for i in 0..3 {
            let record = ErrorRecord::new(ErrorKind::Validation, format!("e{i}"), clock().now());
            store.log_error(&record).unwrap();
        }
        let log = store.error_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].message, "e1");
    }

    #[test]
    fn start_session_resets_session_counters() {
        let (mut store, _) = test_store();
        store
            .record_game(&GameResult::win(10, Difficulty::Easy, 99.0, 1000))
            .unwrap();
        assert_eq!(store.statistics().session.games_played, 1);
        store.start_session().unwrap();
        let stats = store.statistics();
        assert_eq!(stats.session.games_played, 0);
        assert_eq!(stats.total_games, 1);
    }
}

//! Directory-backed [`StorageBackend`]: one file per key.

use hexmemo_engine::{BackendError, StorageBackend};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "file storage opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

fn unavailable(path: &Path, e: io::Error) -> BackendError {
    BackendError::Unavailable(format!("{}: {e}", path.display()))
}

impl StorageBackend for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        if let Err(e) = fs::write(&tmp_path, value) {
            let _ = fs::remove_file(&tmp_path);
            return Err(unavailable(&tmp_path, e));
        }
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            unavailable(&path, e)
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexmemo_engine::{Difficulty, EngineConfig, GameResult, ManualClock, PersistenceStore};

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            Self(std::env::temp_dir().join(format!("hexmemo-test-{}", Uuid::new_v4())))
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn set_get_remove() {
        let tmp = TempDir::new();
        let storage = FileStorage::open(&tmp.0).unwrap();

        assert_eq!(storage.get_item("colorGame_locale").unwrap(), None);
        storage.set_item("colorGame_locale", "\"fr\"").unwrap();
        assert_eq!(storage.get_item("colorGame_locale").unwrap().as_deref(), Some("\"fr\""));

        storage.remove_item("colorGame_locale").unwrap();
        storage.remove_item("colorGame_locale").unwrap();
        assert_eq!(storage.get_item("colorGame_locale").unwrap(), None);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let tmp = TempDir::new();
        let storage = FileStorage::open(&tmp.0).unwrap();
        storage.set_item("a", "1").unwrap();
        storage.set_item("a", "2").unwrap();

        let names: Vec<_> = fs::read_dir(&tmp.0)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
    }

    #[test]
    fn keys_are_sanitized() {
        let tmp = TempDir::new();
        let storage = FileStorage::open(&tmp.0).unwrap();
        storage.set_item("../escape", "x").unwrap();
        assert!(tmp.0.join("___escape.json").exists());
        assert_eq!(storage.get_item("../escape").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn progress_survives_restart() {
        let tmp = TempDir::new();
        let clock = ManualClock::at_millis(1_706_745_600_000);

        let mut store = PersistenceStore::new(
            FileStorage::open(&tmp.0).unwrap(),
            clock.clone(),
            EngineConfig::default(),
        );
        store
            .record_game(&GameResult::win(250, Difficulty::Medium, 100.0, 8_000))
            .unwrap();

        let mut reopened = PersistenceStore::new(
            FileStorage::open(&tmp.0).unwrap(),
            clock,
            EngineConfig::default(),
        );
        assert_eq!(reopened.statistics().best_score, 250);
        assert_eq!(reopened.high_scores().len(), 1);
    }
}

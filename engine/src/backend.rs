//! Key-value storage backends.
//!
//! The [`PersistenceStore`](crate::PersistenceStore) only needs a synchronous
//! string key-value capability. Browsers provide one as `localStorage`
//! ([`WebStorage`], wasm32 only); tests use [`MemoryStorage`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Failure reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A synchronous string key-value store.
pub trait StorageBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError>;

    fn remove_item(&self, key: &str) -> Result<(), BackendError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        (**self).remove_item(key)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
    unavailable: bool,
    fail_writes_for: Vec<String>,
}

impl MemoryInner {
    fn used_bytes(&self) -> usize {
        self.items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// In-memory backend with fault injection.
///
/// Clones share the same underlying map, so a test can keep a handle after
/// giving the backend to a store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes once the stored keys and values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::new();
        storage.inner.borrow_mut().quota_bytes = Some(bytes);
        storage
    }

    /// Make every call fail with [`BackendError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.borrow_mut().unavailable = unavailable;
    }

    /// Make writes to one exact key fail with [`BackendError::QuotaExceeded`].
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.inner.borrow_mut().fail_writes_for.push(key.into());
    }

    /// Stop injecting per-key write failures.
    pub fn clear_write_failures(&self) {
        self.inner.borrow_mut().fail_writes_for.clear();
    }

    /// Raw stored value, bypassing fault injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.borrow().items.get(key).cloned()
    }

    /// Store a raw value, bypassing fault injection.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.borrow_mut().items.insert(key.into(), value.into());
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().items.keys().cloned().collect()
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.inner.borrow().unavailable {
            Err(BackendError::Unavailable("memory storage disabled".into()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.check_available()?;
        Ok(self.inner.borrow().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.check_available()?;
        let mut inner = self.inner.borrow_mut();

        if inner.fail_writes_for.iter().any(|k| k == key) {
            return Err(BackendError::QuotaExceeded);
        }
        if let Some(quota) = inner.quota_bytes {
            let existing = inner.items.get(key).map_or(0, |v| key.len() + v.len());
            if inner.used_bytes() - existing + key.len() + value.len() > quota {
                return Err(BackendError::QuotaExceeded);
            }
        }

        inner.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        self.check_available()?;
        self.inner.borrow_mut().items.remove(key);
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::WebStorage;

#[cfg(target_arch = "wasm32")]
mod web {
    use super::{BackendError, StorageBackend};

    /// The browser's `window.localStorage`.
    #[derive(Debug, Clone)]
    pub struct WebStorage {
        storage: web_sys::Storage,
    }

    impl WebStorage {
        /// Open `localStorage`, failing when the window or storage is missing
        /// (private mode, disabled cookies, workers).
        pub fn local() -> Result<Self, BackendError> {
            let window = web_sys::window()
                .ok_or_else(|| BackendError::Unavailable("no window".into()))?;
            let storage = window
                .local_storage()
                .map_err(|e| BackendError::Unavailable(format!("{e:?}")))?
                .ok_or_else(|| BackendError::Unavailable("localStorage disabled".into()))?;
            Ok(Self { storage })
        }
    }

    impl StorageBackend for WebStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
            self.storage
                .get_item(key)
                .map_err(|e| BackendError::Unavailable(format!("{e:?}")))
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
            // Browsers report a full store as a DOMException from setItem.
            self.storage
                .set_item(key, value)
                .map_err(|_| BackendError::QuotaExceeded)
        }

        fn remove_item(&self, key: &str) -> Result<(), BackendError> {
            self.storage
                .remove_item(key)
                .map_err(|e| BackendError::Unavailable(format!("{e:?}")))
        }
    }
}

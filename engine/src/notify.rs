//! Subscriber bookkeeping shared by the store and the state manager.
//!
//! Callbacks run synchronously, in registration order. A callback that
//! panics is logged and skipped; the remaining callbacks still run and the
//! writer that triggered the notification never sees the failure.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

struct Entry<K, F: ?Sized> {
    id: SubscriptionId,
    filter: K,
    callback: Box<F>,
}

/// Ordered list of filtered callbacks.
pub(crate) struct Registry<K, F: ?Sized> {
    next_id: u64,
    entries: Vec<Entry<K, F>>,
}

impl<K, F: ?Sized> Default for Registry<K, F> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<K, F: ?Sized> Registry<K, F> {
    pub(crate) fn insert(&mut self, filter: K, callback: Box<F>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Entry {
            id,
            filter,
            callback,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Run `call` for every entry whose filter passes `select`.
    ///
    /// Returns the number of callbacks that panicked.
    pub(crate) fn notify<S, C>(&mut self, mut select: S, mut call: C) -> usize
    where
        S: FnMut(&K) -> bool,
        C: FnMut(&mut F),
    {
        let mut failures = 0;
        for entry in self.entries.iter_mut().filter(|e| select(&e.filter)) {
            let callback: &mut F = &mut entry.callback;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| call(callback))) {
                failures += 1;
                let kind = ErrorKind::Subscriber;
                tracing::error!(
                    kind = %kind,
                    severity = ?kind.severity(),
                    subscription = %entry.id,
                    reason = %panic_message(payload.as_ref()),
                    "subscriber callback panicked"
                );
            }
        }
        failures
    }
}

impl<K: fmt::Debug, F: ?Sized> fmt::Debug for Registry<K, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.id, &e.filter)))
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    type Callback = dyn FnMut(&i32);

    #[test]
    fn notifies_matching_entries_in_order() {
        let mut registry: Registry<&str, Callback> = Registry::default();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));

        for name in ["a", "b", "a"] {
            let log = Rc::clone(&log);
            registry.insert(name, Box::new(move |v: &i32| log.borrow_mut().push((name, *v))));
        }

        registry.notify(|k| *k == "a", |cb| cb(&7));
        assert_eq!(*log.borrow(), vec![("a", 7), ("a", 7)]);
    }

    #[test]
    fn unsubscribe_removes_entry() {
        let mut registry: Registry<(), Callback> = Registry::default();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let id = registry.insert((), Box::new(move |_: &i32| counter.set(counter.get() + 1)));

        registry.notify(|_| true, |cb| cb(&1));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.notify(|_| true, |cb| cb(&1));
        assert_eq!(hits.get(), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn panicking_callback_is_isolated() {
        let mut registry: Registry<(), Callback> = Registry::default();
        let hits = Rc::new(Cell::new(0));

        registry.insert((), Box::new(|_: &i32| panic!("boom")));
        let counter = Rc::clone(&hits);
        registry.insert((), Box::new(move |_: &i32| counter.set(counter.get() + 1)));

        let failures = registry.notify(|_| true, |cb| cb(&1));
        assert_eq!(failures, 1);
        assert_eq!(hits.get(), 1);
    }
}

//! Reported state: immutable snapshots and the shared store producers write to

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::mailbox::CoalescingMailbox;

/// Mapping of state keys to values
pub type StateMap = HashMap<String, String>;

/// Immutable key/value state snapshot
///
/// Cloning shares the underlying map, so the dispatch worker can keep the
/// last sent snapshot around for heartbeats at no cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    entries: Arc<StateMap>,
}

impl StateSnapshot {
    pub fn new(entries: StateMap) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Build a snapshot from any sequence of key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &StateMap {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<StateMap> for StateSnapshot {
    fn from(entries: StateMap) -> Self {
        Self::new(entries)
    }
}

/// Thread-safe holder of the current full state
///
/// Every write publishes the resulting full snapshot to the mailbox. The
/// publish happens while the store lock is held, so the mailbox can never
/// end up holding an older mapping than the store. Lock order is always
/// store then mailbox; the dispatch worker never touches the store lock.
#[derive(Debug)]
pub struct StateStore {
    current: Mutex<StateSnapshot>,
    mailbox: Arc<CoalescingMailbox>,
}

impl StateStore {
    pub fn new(mailbox: Arc<CoalescingMailbox>) -> Self {
        Self {
            current: Mutex::new(StateSnapshot::default()),
            mailbox,
        }
    }

    /// Replace the whole state and publish it
    pub fn set_full(&self, snapshot: StateSnapshot) {
        let mut current = self.lock_current();
        *current = snapshot.clone();
        self.mailbox.put(snapshot);
    }

    /// Upsert `updates` into the current state and publish the merged result
    ///
    /// Returns the published snapshot.
    pub fn merge_partial<I, K, V>(&self, updates: I) -> StateSnapshot
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut current = self.lock_current();
        let mut merged = current.as_map().clone();
        for (key, value) in updates {
            merged.insert(key.into(), value.into());
        }
        let snapshot = StateSnapshot::new(merged);
        *current = snapshot.clone();
        self.mailbox.put(snapshot.clone());
        snapshot
    }

    /// Current stored state
    pub fn current(&self) -> StateSnapshot {
        self.lock_current().clone()
    }

    fn lock_current(&self) -> MutexGuard<'_, StateSnapshot> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (StateStore, Arc<CoalescingMailbox>) {
        let mailbox = Arc::new(CoalescingMailbox::new());
        (StateStore::new(Arc::clone(&mailbox)), mailbox)
    }

    #[test]
    fn test_set_full_replaces_and_publishes() {
        let (store, mailbox) = store();
        store.set_full(StateSnapshot::from_pairs([("A", "1"), ("B", "2")]));
        store.set_full(StateSnapshot::from_pairs([("C", "3")]));

        let current = store.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current.get("C"), Some("3"));
        assert_eq!(mailbox.try_take(), Some(current));
    }

    #[test]
    fn test_merge_partial_upserts() {
        let (store, mailbox) = store();
        store.set_full(StateSnapshot::from_pairs([("A", "1")]));
        mailbox.try_take();

        let merged = store.merge_partial([("B", "2")]);
        assert_eq!(merged, StateSnapshot::from_pairs([("A", "1"), ("B", "2")]));
        assert_eq!(store.current(), merged);
        assert_eq!(mailbox.try_take(), Some(merged));

        let merged = store.merge_partial([("A", "9")]);
        assert_eq!(merged.get("A"), Some("9"));
        assert_eq!(merged.get("B"), Some("2"));
    }

    #[test]
    fn test_concurrent_merges_are_serialized() {
        let (store, mailbox) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.merge_partial([(format!("t{}-{}", t, i), i.to_string())]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.current().len(), 8 * 50);
        // The mailbox holds the same mapping as the store after the last write
        assert_eq!(mailbox.try_take(), Some(store.current()));
    }
}

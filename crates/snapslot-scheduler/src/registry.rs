use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use snapslot_core::types::{RunId, TargetKey};

/// At most one in-flight run per [`TargetKey`].
///
/// `try_acquire` goes through the map's entry API, so the check and the insert
/// happen under one shard lock and can never be split by a suspension point.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: DashMap<TargetKey, RunId>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Claim `key` for `run_id`. Returns false if any run already holds it.
    pub fn try_acquire(&self, key: TargetKey, run_id: RunId) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(key = %slot.key(), run_id = %run_id, "registry key acquired");
                slot.insert(run_id);
                true
            }
        }
    }

    /// Release `key` if `run_id` still holds it. Returns whether anything was removed.
    pub fn release(&self, key: &TargetKey, run_id: &RunId) -> bool {
        let removed = self.entries.remove_if(key, |_, holder| holder == run_id).is_some();
        if removed {
            debug!(key = %key, run_id = %run_id, "registry key released");
        }
        removed
    }

    pub fn holder(&self, key: &TargetKey) -> Option<RunId> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn is_held_by(&self, key: &TargetKey, run_id: &RunId) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.value() == run_id)
    }

    /// Drop every entry and return the run ids that were holding keys.
    pub fn clear(&self) -> Vec<RunId> {
        let keys: Vec<TargetKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|(_, id)| id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;

    fn key(resource: &str) -> TargetKey {
        TargetKey::new(
            resource,
            NaiveDate::from_ymd_opt(2025, 1, 19).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let reg = InFlightRegistry::new();
        let first = RunId::new();
        assert!(reg.try_acquire(key("a"), first.clone()));
        assert!(!reg.try_acquire(key("a"), RunId::new()));
        assert_eq!(reg.holder(&key("a")), Some(first.clone()));

        assert!(reg.release(&key("a"), &first));
        assert!(reg.try_acquire(key("a"), RunId::new()));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let reg = InFlightRegistry::new();
        assert!(reg.try_acquire(key("a"), RunId::new()));
        assert!(reg.try_acquire(key("b"), RunId::new()));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn only_the_holder_can_release() {
        let reg = InFlightRegistry::new();
        let holder = RunId::new();
        reg.try_acquire(key("a"), holder.clone());
        assert!(!reg.release(&key("a"), &RunId::new()));
        assert!(reg.is_held_by(&key("a"), &holder));
    }

    #[test]
    fn clear_returns_holders() {
        let reg = InFlightRegistry::new();
        let a = RunId::new();
        let b = RunId::new();
        reg.try_acquire(key("a"), a.clone());
        reg.try_acquire(key("b"), b.clone());

        let mut cleared = reg.clear();
        cleared.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(cleared, expected);
        assert!(reg.is_empty());
    }

    #[test]
    fn concurrent_acquire_admits_exactly_one() {
        let reg = Arc::new(InFlightRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.try_acquire(key("hot"), RunId::new()))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}

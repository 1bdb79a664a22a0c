//! Resource ledger: which in-flight task holds which resource category.
//!
//! Acquisition is all-or-nothing. Exclusive categories admit a single holder;
//! shareable categories always grant and only keep holder accounting. The
//! ledger is not internally synchronized; the coordinator owns it behind its
//! admission lock.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::util::serde::{ResourceKind, TaskId};

/// How a category may be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// At most one holder.
    Exclusive,
    /// Any number of holders.
    Shared,
}

/// Current holders of one resource category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Tasks holding the category.
    pub holders: BTreeSet<TaskId>,
}

/// Tracks resource holders for in-flight tasks.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    exclusive: HashSet<ResourceKind>,
    locks: BTreeMap<ResourceKind, ResourceLock>,
}

impl ResourceLedger {
    /// Create a ledger where `exclusive` categories admit one holder.
    pub fn new(exclusive: impl IntoIterator<Item = ResourceKind>) -> Self {
        Self {
            exclusive: exclusive.into_iter().collect(),
            locks: BTreeMap::new(),
        }
    }

    /// Mode of a category.
    pub fn mode(&self, kind: ResourceKind) -> LockMode {
        if self.exclusive.contains(&kind) {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }

    /// Grant every requested category to `task_id`, or none of them.
    ///
    /// A task re-acquiring a category it already holds is granted.
    pub fn try_acquire(&mut self, task_id: &str, resources: &[ResourceKind]) -> bool {
        let blocked = resources.iter().any(|kind| {
            self.mode(*kind) == LockMode::Exclusive
                && self
                    .locks
                    .get(kind)
                    .is_some_and(|lock| lock.holders.iter().any(|h| h != task_id))
        });
        if blocked {
            return false;
        }
        for kind in resources {
            self.locks
                .entry(*kind)
                .or_default()
                .holders
                .insert(task_id.to_string());
        }
        true
    }

    /// Remove `task_id` from every holder set. Releasing nothing is a no-op.
    ///
    /// Returns the number of categories the task was removed from.
    pub fn release(&mut self, task_id: &str) -> usize {
        let mut released = 0;
        self.locks.retain(|_, lock| {
            if lock.holders.remove(task_id) {
                released += 1;
            }
            !lock.holders.is_empty()
        });
        released
    }

    /// Holder count per category that currently has holders.
    pub fn usage(&self) -> BTreeMap<ResourceKind, usize> {
        self.locks
            .iter()
            .map(|(kind, lock)| (*kind, lock.holders.len()))
            .collect()
    }

    /// Holders of one category.
    pub fn holders(&self, kind: ResourceKind) -> Vec<TaskId> {
        self.locks
            .get(&kind)
            .map(|lock| lock.holders.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total (category, holder) pairs.
    pub fn active_lock_count(&self) -> usize {
        self.locks.values().map(|lock| lock.holders.len()).sum()
    }

    /// Whether `task_id` holds anything.
    pub fn holds_any(&self, task_id: &str) -> bool {
        self.locks.values().any(|lock| lock.holders.contains(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ResourceLedger {
        ResourceLedger::new([ResourceKind::SshConnection, ResourceKind::Database])
    }

    #[test]
    fn exclusive_category_admits_one_holder() {
        let mut l = ledger();
        assert!(l.try_acquire("t3", &[ResourceKind::SshConnection]));
        assert!(!l.try_acquire("t4", &[ResourceKind::SshConnection]));
        l.release("t3");
        assert!(l.try_acquire("t4", &[ResourceKind::SshConnection]));
    }

    #[test]
    fn shared_category_always_grants() {
        let mut l = ledger();
        assert!(l.try_acquire("a", &[ResourceKind::NetworkIo]));
        assert!(l.try_acquire("b", &[ResourceKind::NetworkIo]));
        assert_eq!(l.usage()[&ResourceKind::NetworkIo], 2);
    }

    #[test]
    fn acquisition_is_all_or_nothing() {
        let mut l = ledger();
        assert!(l.try_acquire("a", &[ResourceKind::Database]));
        assert!(!l.try_acquire("b", &[ResourceKind::NetworkIo, ResourceKind::Database]));
        assert!(!l.holds_any("b"));
        assert!(l.holders(ResourceKind::NetworkIo).is_empty());
    }

    #[test]
    fn release_is_idempotent_and_restores_baseline() {
        let mut l = ledger();
        assert!(l.try_acquire("a", &[ResourceKind::SshConnection, ResourceKind::CpuIntensive]));
        assert_eq!(l.active_lock_count(), 2);
        assert_eq!(l.release("a"), 2);
        assert_eq!(l.release("a"), 0);
        assert_eq!(l.active_lock_count(), 0);
        assert!(l.usage().is_empty());
    }

    #[test]
    fn empty_request_is_granted() {
        let mut l = ledger();
        assert!(l.try_acquire("a", &[]));
        assert!(!l.holds_any("a"));
    }
}

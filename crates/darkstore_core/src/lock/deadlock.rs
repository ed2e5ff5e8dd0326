//! Deadlock detection.
//!
//! Run by a locker right after it starts waiting. The checker walks the
//! waits-for graph from that locker; each edge leads from a waiting locker
//! to the owners of the key it waits for and to the waiters queued ahead of
//! it. Every cycle found costs one victim, the youngest locker on the cycle,
//! and the walk repeats until no cycle is reachable.

use super::locker::Locker;
use super::manager::LockManager;
use super::LockError;
use crate::types::TransactionId;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) struct DeadlockChecker<'a, K> {
    manager: &'a LockManager<K>,
    root: Arc<Locker<K>>,
    edges: HashMap<TransactionId, Option<Vec<Arc<Locker<K>>>>>,
}

impl<'a, K> DeadlockChecker<'a, K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync,
{
    pub(crate) fn new(manager: &'a LockManager<K>, root: Arc<Locker<K>>) -> Self {
        Self {
            manager,
            root,
            edges: HashMap::new(),
        }
    }

    /// Resolves every cycle reachable from the root. Returns the deadlock
    /// error if the root itself was chosen as a victim.
    pub(crate) fn check(mut self) -> Option<LockError> {
        while let Some(cycle) = self.find_cycle() {
            let mut victim_index = 0;
            for (i, locker) in cycle.iter().enumerate() {
                if locker.younger_than(&cycle[victim_index]) {
                    victim_index = i;
                }
            }
            let victim = cycle[victim_index].clone();
            let conflicting = cycle[(victim_index + 1) % cycle.len()].txn();
            let error = LockError::Deadlock { conflicting };

            debug!(
                root = %self.root.txn(),
                victim = %victim.txn(),
                cycle_len = cycle.len(),
                "deadlock detected"
            );

            self.edges.insert(victim.txn(), None);
            victim.notify_victim(error.clone());
            if victim.txn() == self.root.txn() {
                return Some(error);
            }
        }
        trace!(root = %self.root.txn(), "no deadlock");
        None
    }

    fn find_cycle(&mut self) -> Option<Vec<Arc<Locker<K>>>> {
        let mut path = Vec::new();
        let mut explored = HashSet::new();
        let root = self.root.clone();
        self.visit(root, &mut path, &mut explored)
    }

    fn visit(
        &mut self,
        locker: Arc<Locker<K>>,
        path: &mut Vec<Arc<Locker<K>>>,
        explored: &mut HashSet<TransactionId>,
    ) -> Option<Vec<Arc<Locker<K>>>> {
        path.push(locker.clone());
        for next in self.edges_of(&locker) {
            if let Some(start) = path.iter().position(|p| p.txn() == next.txn()) {
                return Some(path[start..].to_vec());
            }
            if explored.contains(&next.txn()) {
                continue;
            }
            if let Some(cycle) = self.visit(next, path, explored) {
                return Some(cycle);
            }
        }
        path.pop();
        explored.insert(locker.txn());
        None
    }

    fn edges_of(&mut self, locker: &Arc<Locker<K>>) -> Vec<Arc<Locker<K>>> {
        let manager = self.manager;
        self.edges
            .entry(locker.txn())
            .or_insert_with(|| manager.blockers(locker))
            .clone()
            .unwrap_or_default()
    }
}

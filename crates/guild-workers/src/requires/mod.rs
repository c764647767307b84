//! Dependency Tracker.
//!
//! Stores each worker's current dependency edges and a reverse reference
//! count per target. Replacing a worker's edges adjusts the counts
//! incrementally, so `require_by_count` always equals the number of workers
//! whose latest edge set contains the target.

use std::collections::{BTreeSet, HashMap};

use crate::id::{RequireId, WorkerId};

/// Dependency edges and reference counts.
#[derive(Debug, Clone, Default)]
pub struct RequireManager {
    edges: HashMap<WorkerId, BTreeSet<RequireId>>,
    counts: HashMap<RequireId, usize>,
}

impl RequireManager {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the edge set owned by `id`.
    pub fn set<I>(&mut self, id: &WorkerId, requires: I)
    where
        I: IntoIterator<Item = RequireId>,
    {
        let next: BTreeSet<RequireId> = requires.into_iter().collect();
        let previous = self.edges.remove(id).unwrap_or_default();
        for removed in previous.difference(&next) {
            self.decrement(removed);
        }
        for added in next.difference(&previous) {
            *self.counts.entry(added.clone()).or_insert(0) += 1;
        }
        if !next.is_empty() {
            self.edges.insert(id.clone(), next);
        }
    }

    /// Removes the edge set owned by `id`.
    pub fn del(&mut self, id: &WorkerId) {
        if let Some(previous) = self.edges.remove(id) {
            for removed in &previous {
                self.decrement(removed);
            }
        }
    }

    /// Number of workers whose edges target `id`.
    #[must_use]
    pub fn require_by_count(&self, id: &str) -> usize {
        self.counts
            .get(&RequireId::new(id))
            .copied()
            .unwrap_or_default()
    }

    /// Current edges owned by `id`.
    #[must_use]
    pub fn requires_of(&self, id: &WorkerId) -> Option<&BTreeSet<RequireId>> {
        self.edges.get(id)
    }

    /// Workers whose edges target `id`, in id order.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<WorkerId> {
        let target = RequireId::new(id);
        let mut dependents: Vec<WorkerId> = self
            .edges
            .iter()
            .filter(|(_, requires)| requires.contains(&target))
            .map(|(owner, _)| owner.clone())
            .collect();
        dependents.sort();
        dependents
    }

    fn decrement(&mut self, id: &RequireId) {
        if let Some(count) = self.counts.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests;

//! Pending delivery queue.

use crate::build::BuildReference;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct QueueState {
    /// Pending references in insertion order.
    order: VecDeque<BuildReference>,
    /// Generic failure count per pending reference. Holds a key for every
    /// reference in `order`.
    failures: HashMap<BuildReference, u32>,
    /// Builds abandoned after exhausting their retries.
    discards: u64,
}

/// Ordered, duplicate-free set of builds awaiting delivery.
///
/// Shared between the producer (the host's build-completion path) and the
/// dispatcher; every operation takes the single internal lock briefly and
/// never blocks on I/O.
#[derive(Debug, Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference. Returns `false` if it was already pending, or if its
    /// project name has empty, `.` or `..` segments.
    pub fn add(&self, reference: BuildReference) -> bool {
        if !reference.has_canonical_project_name() {
            warn!(build = %reference, "Refusing build with non-canonical project name");
            return false;
        }

        let mut state = self.state.lock();
        if state.failures.contains_key(&reference) {
            debug!(build = %reference, "Build already pending");
            return false;
        }
        state.failures.insert(reference.clone(), 0);
        state.order.push_back(reference);
        true
    }

    /// Add several references, returning how many were new.
    pub fn add_all<I>(&self, references: I) -> usize
    where
        I: IntoIterator<Item = BuildReference>,
    {
        references
            .into_iter()
            .filter(|reference| self.add(reference.clone()))
            .count()
    }

    /// Current pending references in order, without removing them.
    pub fn drain_snapshot(&self) -> Vec<BuildReference> {
        self.state.lock().order.iter().cloned().collect()
    }

    /// Remove a reference and forget its failure count.
    pub fn remove(&self, reference: &BuildReference) -> bool {
        let mut state = self.state.lock();
        Self::remove_locked(&mut state, reference)
    }

    /// Remove a reference permanently and count it as discarded.
    pub fn discard(&self, reference: &BuildReference) -> bool {
        let mut state = self.state.lock();
        let removed = Self::remove_locked(&mut state, reference);
        if removed {
            state.discards += 1;
        }
        removed
    }

    /// Increment the generic failure count of a pending reference and return
    /// the new count. Returns 0 if the reference is not pending.
    pub fn record_failure(&self, reference: &BuildReference) -> u32 {
        let mut state = self.state.lock();
        match state.failures.get_mut(reference) {
            Some(count) => {
                *count = count.saturating_add(1);
                *count
            }
            None => 0,
        }
    }

    pub fn failure_count(&self, reference: &BuildReference) -> u32 {
        self.state
            .lock()
            .failures
            .get(reference)
            .copied()
            .unwrap_or(0)
    }

    pub fn contains(&self, reference: &BuildReference) -> bool {
        self.state.lock().failures.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cumulative number of discarded builds.
    pub fn discards(&self) -> u64 {
        self.state.lock().discards
    }

    fn remove_locked(state: &mut QueueState, reference: &BuildReference) -> bool {
        if state.failures.remove(reference).is_none() {
            return false;
        }
        if let Some(index) = state.order.iter().position(|r| r == reference) {
            state.order.remove(index);
        }
        true
    }
}

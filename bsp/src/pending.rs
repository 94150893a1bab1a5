//! Advisory tracking of in-flight compile/test/run operations.
//!
//! One entry per issued call, keyed by (operation kind, target, sequence
//! number). [`PendingOperations::begin`] returns a guard that removes the
//! entry on drop, so completion, failure, and a caller dropping the
//! operation future all clean up the same way. The tracker is
//! observational only: it never prevents a second concurrent operation on
//! the same target. Callers that want de-duplication check
//! [`PendingOperations::active_count`] before issuing a call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gantry_types::{BuildTargetId, OperationKind};

/// Key of one tracked in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub kind: OperationKind,
    pub target: BuildTargetId,
    /// Monotonically increasing per-tracker sequence number, so two
    /// concurrent operations on the same target stay distinct.
    pub seq: u64,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    active: HashMap<(OperationKind, BuildTargetId), Vec<u64>>,
}

/// Shared tracker, cloneable across tasks.
#[derive(Clone, Default)]
pub struct PendingOperations {
    inner: Arc<Mutex<Inner>>,
}

impl PendingOperations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of an operation. The entry lives as long as the
    /// returned guard.
    pub fn begin(&self, kind: OperationKind, target: BuildTargetId) -> OperationGuard {
        let mut inner = self.inner.lock().expect("pending ops lock poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .active
            .entry((kind, target.clone()))
            .or_default()
            .push(seq);
        OperationGuard {
            ops: self.clone(),
            key: OperationKey { kind, target, seq },
        }
    }

    /// Remove an operation entry. Unknown keys are ignored.
    fn finish(&self, key: &OperationKey) {
        let mut inner = self.inner.lock().expect("pending ops lock poisoned");
        let map_key = (key.kind, key.target.clone());
        if let Some(seqs) = inner.active.get_mut(&map_key) {
            seqs.retain(|&s| s != key.seq);
            if seqs.is_empty() {
                inner.active.remove(&map_key);
            }
        }
    }

    /// How many operations of `kind` are in flight for `target`.
    #[must_use]
    pub fn active_count(&self, kind: OperationKind, target: &BuildTargetId) -> usize {
        self.inner
            .lock()
            .expect("pending ops lock poisoned")
            .active
            .get(&(kind, target.clone()))
            .map_or(0, Vec::len)
    }

    /// Total in-flight operations across all targets.
    #[must_use]
    pub fn total_active(&self) -> usize {
        self.inner
            .lock()
            .expect("pending ops lock poisoned")
            .active
            .values()
            .map(Vec::len)
            .sum()
    }
}

/// Removes its tracker entry when dropped, so an operation whose future
/// is cancelled mid-flight still releases its slot.
#[must_use]
pub struct OperationGuard {
    ops: PendingOperations,
    key: OperationKey,
}

impl OperationGuard {
    #[must_use]
    pub fn key(&self) -> &OperationKey {
        &self.key
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.ops.finish(&self.key);
    }
}

//! Immutable blocklist snapshots with lock-free reads
//!
//! The dispatch loop consults the blocklist on every DNS query, so reads
//! must never block. The whole rule set is rebuilt into a fresh
//! [`BlocklistSnapshot`] on every change pushed by the external store and
//! swapped in atomically via `ArcSwap`. A packet mid-flight keeps its
//! `Arc` guard, so it always sees one consistent snapshot for its whole
//! evaluation; the old snapshot is dropped once the last in-flight reader
//! releases it.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::matcher::normalize_domain;
use super::types::BlockRule;

/// An immutable view of the active block rules
///
/// Keyed by the normalized (lower-cased) pattern. Disabled rules are
/// dropped at build time, so matching never re-checks the flag.
#[derive(Debug, Clone, Default)]
pub struct BlocklistSnapshot {
    rules: HashMap<String, BlockRule>,
}

impl BlocklistSnapshot {
    /// An empty snapshot (blocks nothing)
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from the store's current rule list
    ///
    /// Disabled rules are excluded. When two rules normalize to the same
    /// pattern the later one wins; with no precedence between rules this
    /// is harmless.
    #[must_use]
    pub fn build(rules: &[BlockRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| (normalize_domain(&rule.pattern), rule.clone()))
            .collect();
        Self { rules }
    }

    /// The rules in this snapshot, keyed by normalized pattern
    #[must_use]
    pub fn rules(&self) -> &HashMap<String, BlockRule> {
        &self.rules
    }

    /// Number of active rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if the snapshot holds no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Shared, lock-free handle to the current snapshot
///
/// Cloning is cheap; all clones observe the same underlying slot. Readers
/// call [`load`](Self::load) per packet and never block, even while a
/// refresh is swapping in a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<ArcSwap<BlocklistSnapshot>>,
}

impl SnapshotHandle {
    /// Create a handle holding an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle pre-loaded with a snapshot
    #[must_use]
    pub fn with_snapshot(snapshot: BlocklistSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(snapshot))),
        }
    }

    /// Load the current snapshot
    ///
    /// The returned `Arc` pins the snapshot for as long as the caller
    /// holds it; concurrent swaps do not affect it.
    #[must_use]
    pub fn load(&self) -> Arc<BlocklistSnapshot> {
        self.inner.load_full()
    }

    /// Atomically replace the current snapshot
    pub fn store(&self, snapshot: BlocklistSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

/// Spawn the refresher task consuming the store's change stream
///
/// The external blocklist store pushes the full current rule list on every
/// insert/update/delete. Each push is rebuilt wholesale into a new
/// snapshot and swapped into `handle`. The task ends when the store drops
/// its sender.
pub fn spawn_refresher(
    handle: SnapshotHandle,
    mut updates: mpsc::Receiver<Vec<BlockRule>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(rules) = updates.recv().await {
            let snapshot = BlocklistSnapshot::build(&rules);
            debug!(rules = snapshot.len(), "blocklist snapshot rebuilt");
            handle.store(snapshot);
        }
        info!("blocklist update stream closed");
    })
}

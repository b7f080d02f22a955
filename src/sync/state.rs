//! Shared client state
//!
//! One [`Collection`] per resource kind. Readers take cheap `Arc` snapshots;
//! a writer holds the kind's write lock for the whole read-merge-replace, so a
//! stale read can never interleave with a concurrent replace.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::model::{AidRequest, HazardZone, ReliefCenter, SosAlert};
use crate::seed::seed_centers;
use crate::sync::merge::{merge_by_id, Reconcile};

pub struct Collection<T> {
    seed: Vec<T>,
    current: RwLock<Arc<Vec<T>>>,
    generation: AtomicU64,
}

impl<T: Reconcile> Collection<T> {
    pub fn new(seed: Vec<T>) -> Self {
        let current = RwLock::new(Arc::new(seed.clone()));
        Self {
            seed,
            current,
            generation: AtomicU64::new(0),
        }
    }

    pub fn seed(&self) -> &[T] {
        &self.seed
    }

    /// Current records, as last replaced.
    pub async fn snapshot(&self) -> Arc<Vec<T>> {
        self.current.read().await.clone()
    }

    /// Number of whole-collection replacements applied so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start from a cached snapshot (seed underneath).
    pub async fn restore(&self, cached: Vec<T>) {
        let mut guard = self.current.write().await;
        *guard = Arc::new(merge_by_id(&self.seed, &cached));
    }

    /// Take the writer lock for this kind.
    pub async fn writer(&self) -> CollectionWriter<'_, T> {
        CollectionWriter {
            guard: self.current.write().await,
            generation: &self.generation,
        }
    }
}

/// Exclusive access to one collection; dropped without `replace` it changes nothing.
pub struct CollectionWriter<'a, T> {
    guard: RwLockWriteGuard<'a, Arc<Vec<T>>>,
    generation: &'a AtomicU64,
}

impl<T> CollectionWriter<'_, T> {
    pub fn current(&self) -> &[T] {
        self.guard.as_slice()
    }

    /// Replace the whole collection; returns the new generation.
    pub fn replace(mut self, records: Vec<T>) -> u64 {
        *self.guard = Arc::new(records);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Injected container for everything the dashboards render
pub struct ClientState {
    pub centers: Collection<ReliefCenter>,
    pub requests: Collection<AidRequest>,
    pub hazards: Collection<HazardZone>,
    pub alerts: Collection<SosAlert>,
}

impl ClientState {
    /// State holding the bundled seed centers and nothing else.
    pub fn with_seed() -> Self {
        Self::new(seed_centers())
    }

    pub fn new(seed: Vec<ReliefCenter>) -> Self {
        Self {
            centers: Collection::new(seed),
            requests: Collection::new(Vec::new()),
            hazards: Collection::new(Vec::new()),
            alerts: Collection::new(Vec::new()),
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::with_seed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CenterStatus;

    #[tokio::test]
    async fn test_restore_keeps_seed_underneath() {
        let state = ClientState::with_seed();
        let mut cached = state.centers.seed()[2].clone();
        cached.status = CenterStatus::Closed;

        state.centers.restore(vec![cached.clone()]).await;
        let snapshot = state.centers.snapshot().await;
        assert_eq!(snapshot.len(), 8);
        assert_eq!(snapshot[2], cached);
    }

    #[tokio::test]
    async fn test_writer_replace_bumps_generation() {
        let state = ClientState::with_seed();
        let before = state.centers.snapshot().await;

        let writer = state.centers.writer().await;
        let shorter = writer.current()[..3].to_vec();
        assert_eq!(writer.replace(shorter), 1);

        assert_eq!(state.centers.snapshot().await.len(), 3);
        // Old snapshots stay valid
        assert_eq!(before.len(), 8);

        let writer = state.centers.writer().await;
        drop(writer);
        assert_eq!(state.centers.generation(), 1);
    }
}

//! Poll tick: fetch -> decode -> merge -> write-through
//!
//! A tick never fails from the caller's point of view. Offline ticks are
//! skipped without touching the network, and any fetch failure leaves the
//! previous state in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::directory::DirectoryClient;
use crate::error::{CoreError, Result};
use crate::model::{
    decode_records, AidRequest, CanonicalId, HazardZone, LocalIdentity, ReliefCenter, RequestStatus,
    SosAlert,
};
use crate::sync::merge::Reconcile;
use crate::sync::state::{ClientState, Collection};
use crate::sync::{Connectivity, ResourceKind};

/// Result of one poll tick, for logging and tests
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Offline; the network was not touched
    SkippedOffline,
    /// A fresh snapshot replaced the collection
    Applied {
        kind: ResourceKind,
        records: usize,
        dropped: usize,
        generation: u64,
    },
    /// The payload held no usable records; the previous snapshot stays
    KeptPrevious { kind: ResourceKind, dropped: usize },
    /// Fetch or decode failed; the previous snapshot stays
    Failed { kind: ResourceKind, error: String },
}

/// User-facing events raised by background sync
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    Updated {
        kind: ResourceKind,
        records: usize,
    },
    RequestRejected {
        request_id: CanonicalId,
        item_name: String,
        reason: Option<String>,
    },
    RequestFulfilled {
        request_id: CanonicalId,
        item_name: String,
    },
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on a single fetch
    pub fetch_timeout: Duration,
    /// Restrict the requests feed to one center
    pub request_center_id: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            request_center_id: None,
        }
    }
}

pub struct SyncEngine {
    directory: Arc<dyn DirectoryClient>,
    store: Arc<Mutex<CacheStore>>,
    state: Arc<ClientState>,
    connectivity: Connectivity,
    options: EngineOptions,
    notices: broadcast::Sender<SyncNotice>,
    issued: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        store: Arc<Mutex<CacheStore>>,
        state: Arc<ClientState>,
        connectivity: Connectivity,
        options: EngineOptions,
    ) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            directory,
            store,
            state,
            connectivity,
            options,
            notices,
            issued: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn store(&self) -> &Arc<Mutex<CacheStore>> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryClient> {
        &self.directory
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Load the last good snapshots so the first render never waits on the network.
    pub async fn restore_from_cache(&self) -> Result<()> {
        let (centers, requests, hazards, alerts) = {
            let store = self.store.lock().await;
            (
                store.load::<Vec<ReliefCenter>>(ResourceKind::Centers.cache_key())?,
                store.load::<Vec<AidRequest>>(ResourceKind::Requests.cache_key())?,
                store.load::<Vec<HazardZone>>(ResourceKind::HazardZones.cache_key())?,
                store.load::<Vec<SosAlert>>(ResourceKind::SosAlerts.cache_key())?,
            )
        };
        restore_kind(ResourceKind::Centers, &self.state.centers, centers).await;
        restore_kind(ResourceKind::Requests, &self.state.requests, requests).await;
        restore_kind(ResourceKind::HazardZones, &self.state.hazards, hazards).await;
        restore_kind(ResourceKind::SosAlerts, &self.state.alerts, alerts).await;
        Ok(())
    }

    /// Run one poll tick for `kind`.
    pub async fn tick(&self, kind: ResourceKind) -> TickOutcome {
        if !self.connectivity.is_online() {
            debug!(%kind, "Offline, skipping tick");
            return TickOutcome::SkippedOffline;
        }

        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = match self.fetch(kind).await {
            Ok(payload) => payload,
            Err(e) => {
                debug!(%kind, seq, error = %e, "Fetch failed, keeping previous state");
                return TickOutcome::Failed {
                    kind,
                    error: e.to_string(),
                };
            }
        };

        let outcome = match kind {
            ResourceKind::Centers => self.apply(kind, &self.state.centers, payload).await,
            ResourceKind::Requests => self.apply(kind, &self.state.requests, payload).await,
            ResourceKind::HazardZones => self.apply(kind, &self.state.hazards, payload).await,
            ResourceKind::SosAlerts => self.apply(kind, &self.state.alerts, payload).await,
        };

        if let TickOutcome::Applied { records, .. } = outcome {
            let _ = self.notices.send(SyncNotice::Updated { kind, records });
            if kind == ResourceKind::Requests {
                let requests = self.state.requests.snapshot().await;
                if let Err(e) = self.raise_request_notices(&requests).await {
                    warn!(error = %e, "Could not evaluate request notices");
                }
            }
        }

        debug!(%kind, seq, ?outcome, "Tick complete");
        outcome
    }

    async fn fetch(&self, kind: ResourceKind) -> Result<Value> {
        let filter = self.options.request_center_id.as_deref();
        let timeout = self.options.fetch_timeout;
        tokio::time::timeout(timeout, self.directory.fetch(kind, filter))
            .await
            .map_err(|_| CoreError::Timeout(timeout.as_millis() as u64))?
    }

    async fn apply<T: Reconcile>(
        &self,
        kind: ResourceKind,
        collection: &Collection<T>,
        payload: Value,
    ) -> TickOutcome {
        let decoded = match decode_records::<T>(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(%kind, error = %e, "Malformed payload, keeping previous state");
                return TickOutcome::Failed {
                    kind,
                    error: e.to_string(),
                };
            }
        };

        if decoded.records.is_empty() {
            debug!(%kind, dropped = decoded.dropped, "Empty payload, keeping previous state");
            return TickOutcome::KeptPrevious {
                kind,
                dropped: decoded.dropped,
            };
        }

        let records = decoded.records.len();
        let writer = collection.writer().await;
        let merged = T::reconcile(writer.current(), collection.seed(), decoded.records);

        // Persist under the writer lock so cache and state cannot diverge
        // when two ticks of the same kind complete back to back.
        if let Err(e) = self.store.lock().await.replace(kind.cache_key(), &merged) {
            warn!(%kind, error = %e, "Write-through to cache failed");
        }
        let generation = writer.replace(merged);

        TickOutcome::Applied {
            kind,
            records,
            dropped: decoded.dropped,
            generation,
        }
    }

    /// Persist a locally-changed collection (after a successful write-through action).
    pub async fn replace_local<T: Reconcile>(
        &self,
        kind: ResourceKind,
        collection: &Collection<T>,
        change: impl FnOnce(&[T]) -> Vec<T>,
    ) -> Result<u64> {
        let writer = collection.writer().await;
        let next = change(writer.current());
        self.store.lock().await.replace(kind.cache_key(), &next)?;
        Ok(writer.replace(next))
    }

    /// Raise one notice per terminal request owned by the local identity.
    async fn raise_request_notices(&self, requests: &[AidRequest]) -> Result<()> {
        let store = self.store.lock().await;
        let Some(identity) = store.load_identity()? else {
            return Ok(());
        };

        for request in requests.iter().filter(|r| owned_by(r, &identity)) {
            if !request.is_terminal() || !store.mark_notified(&request.id)? {
                continue;
            }
            let notice = match request.status {
                RequestStatus::Rejected => SyncNotice::RequestRejected {
                    request_id: request.id.clone(),
                    item_name: request.item_name.clone(),
                    reason: request.rejection_reason.clone(),
                },
                RequestStatus::Fulfilled => SyncNotice::RequestFulfilled {
                    request_id: request.id.clone(),
                    item_name: request.item_name.clone(),
                },
                RequestStatus::Pending => continue,
            };
            info!(request_id = %request.id, ?notice, "Request reached a terminal state");
            let _ = self.notices.send(notice);
        }
        Ok(())
    }
}

fn owned_by(request: &AidRequest, identity: &LocalIdentity) -> bool {
    request.requester_name == identity.name
}

async fn restore_kind<T: Reconcile>(kind: ResourceKind, collection: &Collection<T>, cached: Option<Vec<T>>) {
    if let Some(cached) = cached {
        debug!(%kind, records = cached.len(), "Restored from cache");
        collection.restore(cached).await;
    }
}

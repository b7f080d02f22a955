//! Recurring pollers, one per resource kind
//!
//! Each poller fires on its own interval measured from registration, not from
//! tick completion, so a slow fetch may overlap the next tick. Ticks are
//! spawned rather than awaited inline; the collection writer lock orders their
//! completions and the last one to complete wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::sync::{ResourceKind, SyncEngine};

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    pollers: HashMap<ResourceKind, JoinHandle<()>>,
    refresh_on_reconnect: bool,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, refresh_on_reconnect: bool) -> Self {
        Self {
            engine,
            pollers: HashMap::new(),
            refresh_on_reconnect,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Register a recurring fetch for `kind`, replacing any existing one.
    ///
    /// A zero period is refused and leaves any existing poller running.
    pub fn start_polling(&mut self, kind: ResourceKind, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(CoreError::Validation(format!(
                "poll interval for {} must be positive",
                kind
            )));
        }

        if let Some(previous) = self.pollers.remove(&kind) {
            previous.abort();
            debug!(%kind, "Replaced existing poller");
        }

        let engine = self.engine.clone();
        let refresh_on_reconnect = self.refresh_on_reconnect;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut online = engine.connectivity().subscribe();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        spawn_tick(&engine, kind);
                    }
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let is_online = *online.borrow_and_update();
                        if is_online && refresh_on_reconnect {
                            debug!(%kind, "Back online, refreshing now");
                            spawn_tick(&engine, kind);
                        }
                    }
                }
            }
        });

        info!(%kind, period_ms = period.as_millis() as u64, "Polling started");
        self.pollers.insert(kind, handle);
        Ok(())
    }

    pub fn stop_polling(&mut self, kind: ResourceKind) -> bool {
        match self.pollers.remove(&kind) {
            Some(handle) => {
                handle.abort();
                info!(%kind, "Polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self, kind: ResourceKind) -> bool {
        self.pollers.get(&kind).is_some_and(|h| !h.is_finished())
    }

    /// Cancel every poller. In-flight ticks finish and apply on their own.
    pub fn shutdown(&mut self) {
        for (kind, handle) in self.pollers.drain() {
            handle.abort();
            debug!(%kind, "Poller cancelled");
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_tick(engine: &Arc<SyncEngine>, kind: ResourceKind) {
    let engine = engine.clone();
    tokio::spawn(async move {
        engine.tick(kind).await;
    });
}

//! Connectivity observer
//!
//! A single boolean shared by every poller. Pollers skip their ticks while it
//! is false; the scheduler can also react to the offline -> online edge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip the flag; observers are only woken on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("Connectivity restored");
            } else {
                warn!("Connectivity lost, serving cached state");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Periodically check whether the directory answers at all.
    ///
    /// Any HTTP response counts as online; only transport failures count as offline.
    pub fn spawn_probe(&self, base_url: String, interval: Duration, timeout: Duration) -> JoinHandle<()> {
        let connectivity = self.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reachable = client.get(&base_url).timeout(timeout).send().await;
                match reachable {
                    Ok(response) => {
                        debug!(status = %response.status(), "Connectivity probe answered");
                        connectivity.set_online(true);
                    }
                    Err(e) => {
                        debug!(error = %e, "Connectivity probe failed");
                        connectivity.set_online(false);
                    }
                }
            }
        })
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observers_see_only_real_changes() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!connectivity.is_online());
    }
}

//! Transit simulator
//!
//! Moves a simulated vehicle one path index per tick. Each run is tagged with
//! a generation; starting a new run bumps the generation and aborts the old
//! task, and a stale task that still wakes up refuses to publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::model::LatLng;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitState {
    pub path: Arc<Vec<LatLng>>,
    pub current_index: usize,
    pub progress_percent: u8,
}

impl TransitState {
    fn start(path: Arc<Vec<LatLng>>) -> Self {
        Self {
            path,
            current_index: 0,
            progress_percent: 0,
        }
    }

    fn idle() -> Self {
        Self::start(Arc::new(Vec::new()))
    }

    /// Move one step. Returns false once the run is over.
    pub fn advance(&mut self) -> bool {
        let len = self.path.len();
        if self.current_index >= len {
            return false;
        }
        self.current_index += 1;
        self.progress_percent = progress_percent(self.current_index, len);
        true
    }

    /// Where the vehicle is drawn; it parks on the last point after arrival.
    pub fn position(&self) -> Option<LatLng> {
        let last = self.path.len().checked_sub(1)?;
        self.path.get(self.current_index.min(last)).copied()
    }

    pub fn is_arrived(&self) -> bool {
        !self.path.is_empty() && self.current_index >= self.path.len()
    }
}

/// `round(index / len * 100)`, clamped to 100.
pub fn progress_percent(index: usize, len: usize) -> u8 {
    if len == 0 {
        return 100;
    }
    let pct = (index as f64 / len as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

pub struct TransitSimulator {
    tick: Duration,
    generation: Arc<AtomicU64>,
    state: watch::Sender<TransitState>,
    task: Option<JoinHandle<()>>,
}

impl TransitSimulator {
    pub fn new(tick: Duration) -> Self {
        let (state, _) = watch::channel(TransitState::idle());
        Self {
            tick,
            generation: Arc::new(AtomicU64::new(0)),
            state,
            task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TransitState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> TransitState {
        self.state.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a run along `path`, superseding any run in progress.
    pub fn start_transit(&mut self, path: Vec<LatLng>) -> Result<u64> {
        if path.is_empty() {
            return Err(CoreError::Validation("transit path is empty".to_string()));
        }
        if self.tick.is_zero() {
            return Err(CoreError::Validation("transit tick must be positive".to_string()));
        }
        self.cancel();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let path = Arc::new(path);
        self.state.send_replace(TransitState::start(path.clone()));

        let tx = self.state.clone();
        let current = self.generation.clone();
        let period = self.tick;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    debug!(generation, "Transit superseded");
                    return;
                }
                let mut arrived = false;
                tx.send_modify(|state| {
                    state.advance();
                    arrived = state.is_arrived();
                });
                if arrived {
                    info!(generation, "Transit arrived");
                    return;
                }
            }
        }));

        info!(generation, points = path.len(), "Transit started");
        Ok(generation)
    }

    /// Stop the running simulation, leaving the last published state in place.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for TransitSimulator {
    fn drop(&mut self) {
        self.cancel();
    }
}

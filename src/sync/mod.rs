//! Sync engine - keeps the local view of remote collections eventually consistent
//!
//! Handles:
//! - Recurring per-kind polling with bounded-timeout fetches
//! - Decoding and merging remote records over the bundled seed set
//! - Write-through to the cache store, silent degrade when offline

pub mod connectivity;
pub mod engine;
pub mod merge;
pub mod scheduler;
pub mod state;

use std::fmt;

// Re-exports
pub use connectivity::Connectivity;
pub use engine::{EngineOptions, SyncEngine, SyncNotice, TickOutcome};
pub use merge::{merge_by_id, Reconcile};
pub use scheduler::SyncScheduler;
pub use state::{ClientState, Collection};

/// A remote collection the engine keeps in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Centers,
    Requests,
    HazardZones,
    SosAlerts,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Centers,
        ResourceKind::Requests,
        ResourceKind::HazardZones,
        ResourceKind::SosAlerts,
    ];

    /// Directory endpoint serving this collection
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Centers => "/centers",
            ResourceKind::Requests => "/food-requests",
            ResourceKind::HazardZones => "/risk-zones",
            ResourceKind::SosAlerts => "/sos-alerts",
        }
    }

    /// Cache store key of the last good snapshot
    pub fn cache_key(&self) -> &'static str {
        match self {
            ResourceKind::Centers => "centers",
            ResourceKind::Requests => "requests",
            ResourceKind::HazardZones => "hazard_zones",
            ResourceKind::SosAlerts => "sos_alerts",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

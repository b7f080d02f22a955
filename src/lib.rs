//! relief-sync: client-side sync and hazard-aware routing core for perishable-aid relief
//!
//! Shared by the requester, supplier and emergency-authority clients. It keeps a local
//! view of relief centers, aid requests, hazard zones and SOS alerts eventually
//! consistent with the remote directory, survives losing connectivity, routes around
//! reported hazards and gates guest submissions behind a one-time code.
//!
//! ## Layout
//!
//! ```text
//! directory  (remote collections)  ──►  sync::engine  ──►  sync::merge  ──►  sync::state
//!                                            │                                    │
//!                                            └──────────►  cache (SQLite)  ◄──────┘
//! desk (foreground actions) ──► guest gate ──► directory ──► routing::planner ──► routing::transit
//! ```
//!
//! Background sync never fails loudly: an offline or failed tick leaves the last good
//! snapshot in place. Foreground actions in [`desk`] surface every failure.

pub mod cache;
pub mod config;
pub mod desk;
pub mod directory;
pub mod error;
pub mod geo;
pub mod guest;
pub mod model;
pub mod routing;
pub mod seed;
pub mod sync;

pub use cache::CacheStore;
pub use config::Config;
pub use desk::{ActionDesk, PendingSubmission, RequestForm, SubmitOutcome};
pub use directory::{DirectoryClient, HttpDirectory};
pub use error::{CoreError, ErrorKind, Result};
pub use guest::{GuestGate, GuestState, HttpOtp, OtpService};
pub use model::{AidRequest, CanonicalId, HazardZone, LatLng, LocalIdentity, ReliefCenter, SosAlert};
pub use routing::{HttpRouting, RoutePlanner, RoutingService, TransitSimulator};
pub use sync::{ClientState, Connectivity, ResourceKind, SyncEngine, SyncScheduler};

//! In-process stand-ins for the directory, routing and OTP services

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use relief_sync::config::GuestConfig;
use relief_sync::directory::CenterPatch;
use relief_sync::guest::GuestGate;
use relief_sync::model::{NewHazardZone, NewSosAlert, RequestDraft};
use relief_sync::routing::SafeRoute;
use relief_sync::sync::EngineOptions;
use relief_sync::{
    ActionDesk, CacheStore, CanonicalId, ClientState, Connectivity, CoreError, DirectoryClient,
    LatLng, OtpService, ResourceKind, Result, RoutePlanner, RoutingService, SyncEngine,
    TransitSimulator,
};

// =============================================================================
// Directory
// =============================================================================

#[derive(Clone)]
pub enum Reply {
    Payload(Value),
    Fail,
    Delayed(Duration, Value),
}

#[derive(Default)]
pub struct FakeDirectory {
    replies: StdMutex<HashMap<ResourceKind, VecDeque<Reply>>>,
    fetches: AtomicUsize,
    writes: StdMutex<Vec<String>>,
    echo: StdMutex<Value>,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, kind: ResourceKind, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(reply);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// What write endpoints answer with
    pub fn set_echo(&self, echo: Value) {
        *self.echo.lock().unwrap() = echo;
    }

    fn record(&self, write: String) {
        self.writes.lock().unwrap().push(write);
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn fetch(&self, kind: ResourceKind, _center_filter: Option<&str>) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Payload(json!([])));

        match reply {
            Reply::Payload(value) => Ok(value),
            Reply::Fail => Err(CoreError::TransientNetwork("connection refused".into())),
            Reply::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    }

    async fn patch_center(&self, id: &CanonicalId, patch: &CenterPatch) -> Result<()> {
        self.record(format!("patch {} {}", id, serde_json::to_string(patch)?));
        Ok(())
    }

    async fn submit_request(&self, draft: &RequestDraft) -> Result<Value> {
        self.record(format!("submit {}", serde_json::to_string(draft)?));
        Ok(self.echo.lock().unwrap().clone())
    }

    async fn fulfill_request(&self, id: &CanonicalId) -> Result<()> {
        self.record(format!("fulfill {}", id));
        Ok(())
    }

    async fn reject_request(&self, id: &CanonicalId, reason: &str) -> Result<()> {
        self.record(format!("reject {} {}", id, reason));
        Ok(())
    }

    async fn create_hazard_zone(&self, zone: &NewHazardZone) -> Result<Value> {
        self.record(format!("zone {}", serde_json::to_string(zone)?));
        Ok(self.echo.lock().unwrap().clone())
    }

    async fn delete_hazard_zone(&self, id: &CanonicalId) -> Result<()> {
        self.record(format!("unzone {}", id));
        Ok(())
    }

    async fn send_sos(&self, alert: &NewSosAlert) -> Result<()> {
        self.record(format!("sos {}", serde_json::to_string(alert)?));
        Ok(())
    }
}

// =============================================================================
// Routing
// =============================================================================

pub enum RouteReply {
    Route(SafeRoute),
    Fail,
    /// Never answers within any sane timeout
    Hang,
}

pub struct FakeRouting {
    reply: StdMutex<Option<RouteReply>>,
    calls: AtomicUsize,
}

impl FakeRouting {
    pub fn new(reply: RouteReply) -> Arc<Self> {
        Arc::new(Self {
            reply: StdMutex::new(Some(reply)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingService for FakeRouting {
    async fn safe_route(&self, _origin: LatLng, _destination: LatLng) -> Result<SafeRoute> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.lock().unwrap().take().unwrap_or(RouteReply::Fail);
        match reply {
            RouteReply::Route(route) => Ok(route),
            RouteReply::Fail => Err(CoreError::TransientNetwork("routing down".into())),
            RouteReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CoreError::TransientNetwork("gave up".into()))
            }
        }
    }
}

/// A two-waypoint detour around one danger zone
pub fn detour(origin: LatLng, destination: LatLng) -> SafeRoute {
    SafeRoute {
        start: origin,
        end: destination,
        waypoints: vec![
            LatLng::new(origin.lat + 0.1, origin.lng),
            LatLng::new(destination.lat, destination.lng - 0.1),
        ],
        has_danger_zones: true,
        danger_zones: vec![json!({"id": 1, "radius": 500})],
    }
}

// =============================================================================
// OTP
// =============================================================================

#[derive(Default)]
pub struct FakeOtp {
    codes: StdMutex<VecDeque<String>>,
    phones: StdMutex<Vec<String>>,
}

impl FakeOtp {
    pub fn with_codes(codes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            codes: StdMutex::new(codes.iter().map(|c| c.to_string()).collect()),
            phones: StdMutex::new(Vec::new()),
        })
    }

    pub fn phones(&self) -> Vec<String> {
        self.phones.lock().unwrap().clone()
    }
}

#[async_trait]
impl OtpService for FakeOtp {
    async fn send_otp(&self, phone: &str) -> Result<String> {
        self.phones.lock().unwrap().push(phone.to_string());
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::TransientNetwork("OTP service down".into()))
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn engine_with(directory: Arc<FakeDirectory>, state: ClientState) -> Arc<SyncEngine> {
    engine_on(directory, state, CacheStore::open_in_memory().unwrap())
}

pub fn engine_on(directory: Arc<FakeDirectory>, state: ClientState, store: CacheStore) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        directory,
        Arc::new(Mutex::new(store)),
        Arc::new(state),
        Connectivity::new(true),
        EngineOptions {
            fetch_timeout: Duration::from_secs(5),
            request_center_id: None,
        },
    ))
}

pub fn desk_with(
    engine: Arc<SyncEngine>,
    routing: Arc<FakeRouting>,
    otp: Arc<FakeOtp>,
) -> ActionDesk {
    ActionDesk::new(
        engine,
        RoutePlanner::new(routing, Duration::from_secs(10)),
        GuestGate::new(otp, GuestConfig::default()),
        TransitSimulator::new(Duration::from_millis(200)),
    )
}

pub fn center_json(id: Value, lat: f64, lng: f64, status: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Center {}", id),
        "address": "Relief Road",
        "lat": lat,
        "lng": lng,
        "status": status,
        "crowd": "Medium"
    })
}

pub fn request_json(id: u64, requester: &str, status: &str) -> Value {
    let reason = if status == "rejected" {
        json!("Out of stock")
    } else {
        Value::Null
    };
    json!({
        "id": id,
        "consumer_name": requester,
        "item_name": "Khichdi",
        "quantity": 2,
        "center_id": 2,
        "delivery_type": "pickup",
        "status": status,
        "rejection_reason": reason
    })
}

//! Domain records and the wire decode step
//!
//! Remote payloads are loosely shaped: ids arrive as numbers or strings,
//! coordinates as numbers or numeric strings, optional fields go missing.
//! Every record passes through [`Record::decode`] before it can enter the
//! merge pipeline; records that fail are dropped, never merged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Menu used for remote centers that do not publish one
pub const DEFAULT_MENU: [&str; 2] = ["Rice Meals", "Dal Chawal"];

/// Item count assumed for remote centers that do not publish one
pub const DEFAULT_ITEM_COUNT: u32 = 50;

/// A WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build from loosely-typed JSON values, coercing numeric strings.
    pub fn from_loose(lat: &Value, lng: &Value) -> Option<Self> {
        Some(Self::new(coerce_f64(lat)?, coerce_f64(lng)?))
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lng)
    }
}

/// Identifier normalized to one string form so that `1`, `1.0` and `"1"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else if let Some(u) = n.as_u64() {
                    Some(Self(u.to_string()))
                } else {
                    let f = n.as_f64()?;
                    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                        Some(Self((f as i64).to_string()))
                    } else {
                        Some(Self(f.to_string()))
                    }
                }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }
            _ => None,
        }
    }

    /// JSON form for outgoing payloads: integers go out as numbers.
    pub fn to_json(&self) -> Value {
        match self.0.parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => Value::String(self.0.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for CanonicalId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CanonicalId {
    fn from(id: &str) -> Self {
        Self(id.trim().to_string())
    }
}

/// A record kind that can be synced, merged and cached.
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Short name used in logs
    const KIND: &'static str;

    fn canonical_id(&self) -> &CanonicalId;

    /// Validate and coerce one remote record.
    fn decode(value: Value) -> std::result::Result<Self, String>;
}

/// Outcome of decoding a remote array payload
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

/// Decode a remote payload that must be a JSON array.
///
/// A non-array payload is malformed as a whole; individual bad records are dropped.
pub fn decode_records<T: Record>(payload: Value) -> Result<Decoded<T>> {
    let items = match payload {
        Value::Array(items) => items,
        other => {
            return Err(CoreError::InvalidResponse(format!(
                "expected an array of {} records, got {}",
                T::KIND,
                json_type(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match T::decode(item) {
            Ok(record) => records.push(record),
            Err(reason) => {
                dropped += 1;
                debug!(kind = T::KIND, %reason, "Dropped invalid record");
            }
        }
    }

    Ok(Decoded { records, dropped })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accept a finite number or a string holding one.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn require_id(value: &Value) -> std::result::Result<CanonicalId, String> {
    CanonicalId::from_json(value).ok_or_else(|| format!("unusable id {}", value))
}

fn require_coords(lat: &Value, lng: &Value) -> std::result::Result<LatLng, String> {
    LatLng::from_loose(lat, lng).ok_or_else(|| format!("non-numeric coordinates ({}, {})", lat, lng))
}

// =============================================================================
// Relief centers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CenterStatus {
    Open,
    Closed,
}

impl CenterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CenterStatus::Open => "open",
            CenterStatus::Closed => "closed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(CenterStatus::Open),
            "closed" => Some(CenterStatus::Closed),
            _ => None,
        }
    }
}

/// Crowd level; the directory spells these capitalized ("High")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

impl CrowdLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdLevel::Low => "Low",
            CrowdLevel::Medium => "Medium",
            CrowdLevel::High => "High",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(CrowdLevel::Low),
            "medium" => Some(CrowdLevel::Medium),
            "high" => Some(CrowdLevel::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliefCenter {
    pub id: CanonicalId,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub status: CenterStatus,
    pub crowd: CrowdLevel,
    pub item_count: u32,
    pub serves_cooked_food: bool,
    pub menu: Vec<String>,
}

impl ReliefCenter {
    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn is_open(&self) -> bool {
        self.status == CenterStatus::Open
    }
}

#[derive(Debug, Deserialize)]
struct WireCenter {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    lat: Value,
    #[serde(default)]
    lng: Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "crowdLevel", alias = "crowd_level")]
    crowd: Option<String>,
    #[serde(default, alias = "itemCount", alias = "item_count")]
    items: Value,
    #[serde(default, alias = "cookedFood", alias = "serves_cooked_food")]
    cooked_food: Option<bool>,
    #[serde(default)]
    menu: Option<Vec<String>>,
}

impl Record for ReliefCenter {
    const KIND: &'static str = "center";

    fn canonical_id(&self) -> &CanonicalId {
        &self.id
    }

    fn decode(value: Value) -> std::result::Result<Self, String> {
        let wire: WireCenter = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let id = require_id(&wire.id)?;
        let at = require_coords(&wire.lat, &wire.lng)?;

        let item_count = coerce_f64(&wire.items)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_ITEM_COUNT);

        Ok(ReliefCenter {
            name: wire.name.unwrap_or_else(|| format!("Center {}", id)),
            id,
            address: wire.address.unwrap_or_default(),
            lat: at.lat,
            lng: at.lng,
            status: wire
                .status
                .as_deref()
                .and_then(CenterStatus::parse)
                .unwrap_or(CenterStatus::Open),
            crowd: wire
                .crowd
                .as_deref()
                .and_then(CrowdLevel::parse)
                .unwrap_or(CrowdLevel::Medium),
            item_count,
            serves_cooked_food: wire.cooked_food.unwrap_or(true),
            menu: wire
                .menu
                .unwrap_or_else(|| DEFAULT_MENU.iter().map(|s| s.to_string()).collect()),
        })
    }
}

// =============================================================================
// Aid requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AidRequest {
    pub id: CanonicalId,
    pub requester_name: String,
    pub item_name: String,
    pub quantity: f64,
    pub center_id: Option<CanonicalId>,
    pub center_name: Option<String>,
    pub delivery_type: DeliveryType,
    pub phone: String,
    pub is_priority: bool,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
}

impl AidRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `pending -> fulfilled`; any other transition is refused.
    pub fn fulfill(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = RequestStatus::Fulfilled;
        Ok(())
    }

    /// `pending -> rejected`; any other transition is refused.
    pub fn reject(&mut self, reason: &str) -> Result<()> {
        self.ensure_pending()?;
        self.status = RequestStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(CoreError::Validation(format!(
                "request {} is already {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    id: Value,
    #[serde(default, alias = "consumer_name", alias = "requesterName")]
    requester_name: Option<String>,
    #[serde(default, alias = "itemName")]
    item_name: Option<String>,
    #[serde(default)]
    quantity: Value,
    #[serde(default, alias = "centerId")]
    center_id: Value,
    #[serde(default)]
    center_name: Option<String>,
    #[serde(default, alias = "deliveryType")]
    delivery_type: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, alias = "isPriority")]
    is_priority: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "rejectionReason")]
    rejection_reason: Option<String>,
}

impl Record for AidRequest {
    const KIND: &'static str = "request";

    fn canonical_id(&self) -> &CanonicalId {
        &self.id
    }

    fn decode(value: Value) -> std::result::Result<Self, String> {
        let wire: WireRequest = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let id = require_id(&wire.id)?;
        let quantity = coerce_f64(&wire.quantity)
            .filter(|q| *q > 0.0)
            .ok_or_else(|| format!("request {} has no positive quantity", id))?;

        let delivery_type = match wire.delivery_type.as_deref().map(str::to_ascii_lowercase) {
            Some(ref t) if t == "delivery" => DeliveryType::Delivery,
            _ => DeliveryType::Pickup,
        };
        let status = match wire.status.as_deref().map(str::to_ascii_lowercase) {
            None => RequestStatus::Pending,
            Some(s) => match s.as_str() {
                "pending" => RequestStatus::Pending,
                "fulfilled" => RequestStatus::Fulfilled,
                "rejected" => RequestStatus::Rejected,
                other => return Err(format!("request {} has unknown status {}", id, other)),
            },
        };

        Ok(AidRequest {
            id,
            requester_name: wire.requester_name.unwrap_or_default(),
            item_name: wire.item_name.unwrap_or_default(),
            quantity,
            center_id: CanonicalId::from_json(&wire.center_id),
            center_name: wire.center_name,
            delivery_type,
            phone: wire.phone.unwrap_or_default(),
            is_priority: wire.is_priority.unwrap_or(false),
            status,
            rejection_reason: wire.rejection_reason,
        })
    }
}

/// Payload of `POST /request-food`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub consumer_name: String,
    pub item_name: String,
    pub quantity: f64,
    pub center_id: Option<Value>,
    pub center_name: Option<String>,
    pub delivery_type: DeliveryType,
    pub phone: String,
    pub is_priority: bool,
}

// =============================================================================
// Hazard zones
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardZone {
    pub id: CanonicalId,
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
    pub reason: String,
}

impl HazardZone {
    pub fn center(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Deserialize)]
struct WireZone {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    lat: Value,
    #[serde(default)]
    lng: Value,
    #[serde(default, alias = "radius_meters", alias = "radiusMeters")]
    radius: Value,
    #[serde(default)]
    reason: Option<String>,
}

impl Record for HazardZone {
    const KIND: &'static str = "hazard";

    fn canonical_id(&self) -> &CanonicalId {
        &self.id
    }

    fn decode(value: Value) -> std::result::Result<Self, String> {
        let wire: WireZone = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let id = require_id(&wire.id)?;
        let at = require_coords(&wire.lat, &wire.lng)?;
        let radius_meters = coerce_f64(&wire.radius)
            .filter(|r| *r > 0.0)
            .ok_or_else(|| format!("hazard {} has no positive radius", id))?;

        Ok(HazardZone {
            id,
            lat: at.lat,
            lng: at.lng,
            radius_meters,
            reason: wire.reason.unwrap_or_default(),
        })
    }
}

/// Payload of `POST /risk-zones`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewHazardZone {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
    pub reason: String,
}

// =============================================================================
// SOS alerts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    pub id: CanonicalId,
    pub lat: f64,
    pub lng: f64,
    pub reason: String,
    pub sender_name: String,
    pub sender_type: String,
    pub status: AlertStatus,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAlert {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    lat: Value,
    #[serde(default)]
    lng: Value,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default, alias = "senderName")]
    sender_name: Option<String>,
    #[serde(default, alias = "senderType")]
    sender_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "created_at")]
    timestamp: Value,
}

impl Record for SosAlert {
    const KIND: &'static str = "sos";

    fn canonical_id(&self) -> &CanonicalId {
        &self.id
    }

    fn decode(value: Value) -> std::result::Result<Self, String> {
        let wire: WireAlert = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let id = require_id(&wire.id)?;
        let at = require_coords(&wire.lat, &wire.lng)?;
        let status = match wire.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("verified") => AlertStatus::Verified,
            Some("rejected") => AlertStatus::Rejected,
            _ => AlertStatus::Pending,
        };

        Ok(SosAlert {
            id,
            lat: at.lat,
            lng: at.lng,
            reason: wire.reason.unwrap_or_default(),
            sender_name: wire.sender_name.unwrap_or_default(),
            sender_type: wire.sender_type.unwrap_or_default(),
            status,
            timestamp: CanonicalId::from_json(&wire.timestamp).map(|t| t.to_string()),
        })
    }
}

/// Payload of `POST /sos-alert`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSosAlert {
    pub lat: f64,
    pub lng: f64,
    pub reason: String,
    pub sender_name: String,
    pub sender_type: String,
}

// =============================================================================
// Local identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Consumer,
    Supplier,
    Emergency,
    Admin,
}

/// The identity this client acts as, persisted in the cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub name: String,
    pub role: Role,
    pub is_guest: bool,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub phone: Option<String>,
}

impl LocalIdentity {
    pub fn guest() -> Self {
        Self {
            name: "Guest User".to_string(),
            role: Role::Consumer,
            is_guest: true,
            phone_verified: false,
            phone: None,
        }
    }

    /// Guests must pass the one-time-code gate before mutating anything.
    pub fn needs_verification(&self) -> bool {
        self.is_guest && !self.phone_verified
    }
}

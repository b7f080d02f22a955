//! Hazard-aware routing
//!
//! - `planner`: asks the routing service for a detour-aware path, falls back to a direct one
//! - `transit`: animates a simulated vehicle along a planned path

pub mod planner;
pub mod transit;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::directory::send_checked;
use crate::error::{CoreError, Result};
use crate::model::{coerce_f64, LatLng};

// Re-exports
pub use planner::{RouteAdvisory, RouteOutcome, RoutePlan, RoutePlanner};
pub use transit::{TransitSimulator, TransitState};

/// Response of `GET /safe-route`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SafeRoute {
    #[serde(deserialize_with = "loose_point")]
    pub start: LatLng,
    #[serde(deserialize_with = "loose_point")]
    pub end: LatLng,
    #[serde(default, deserialize_with = "loose_points")]
    pub waypoints: Vec<LatLng>,
    #[serde(default)]
    pub has_danger_zones: bool,
    #[serde(default, deserialize_with = "nullable_list")]
    pub danger_zones: Vec<Value>,
}

/// Points arrive either as `{lat, lng}` objects or `[lat, lng]` pairs,
/// with numbers or numeric strings.
fn parse_point(value: &Value) -> Option<LatLng> {
    match value {
        Value::Object(map) => LatLng::from_loose(map.get("lat")?, map.get("lng")?),
        Value::Array(pair) if pair.len() >= 2 => LatLng::from_loose(&pair[0], &pair[1]),
        _ => None,
    }
}

fn loose_point<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<LatLng, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_point(&value).ok_or_else(|| serde::de::Error::custom(format!("not a coordinate: {}", value)))
}

fn loose_points<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<LatLng>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    values
        .iter()
        .map(|v| parse_point(v).ok_or_else(|| serde::de::Error::custom(format!("not a coordinate: {}", v))))
        .collect()
}

fn nullable_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error> {
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn safe_route(&self, origin: LatLng, destination: LatLng) -> Result<SafeRoute>;
}

/// reqwest-backed routing service client
pub struct HttpRouting {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRouting {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl RoutingService for HttpRouting {
    async fn safe_route(&self, origin: LatLng, destination: LatLng) -> Result<SafeRoute> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let request = self
            .client
            .get(format!("{}/safe-route", self.base_url))
            .query(&[
                ("start_lat", origin.lat),
                ("start_lng", origin.lng),
                ("end_lat", destination.lat),
                ("end_lng", destination.lng),
            ]);
        let response = send_checked(request, "/safe-route", self.timeout).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| CoreError::from_transport(e, timeout_ms))?;
        serde_json::from_value(body).map_err(|e| CoreError::InvalidResponse(e.to_string()))
    }
}

/// Accept a `"lat,lng"` pair as typed on the command line.
pub fn parse_lat_lng(s: &str) -> std::result::Result<LatLng, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got '{}'", s))?;
    let lat = coerce_f64(&Value::String(lat.to_string()));
    let lng = coerce_f64(&Value::String(lng.to_string()));
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok(LatLng::new(lat, lng)),
        _ => Err(format!("non-numeric coordinates in '{}'", s)),
    }
}

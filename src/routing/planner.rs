//! Hazard-aware route planner
//!
//! The routing service owns road geometry and the detour decision; the
//! planner only validates inputs, assembles the path and decides on a
//! fallback when the service cannot answer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::geo::segment_crosses;
use crate::model::{HazardZone, LatLng};
use crate::routing::{RoutingService, SafeRoute};

/// Message shown when the routing service could not be used
pub const DIRECT_PATH_MESSAGE: &str = "Could not calculate safe route. Showing direct path.";

/// A renderable path; `waypoints` includes both endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub origin: LatLng,
    pub destination: LatLng,
    pub waypoints: Vec<LatLng>,
    pub had_hazard_detour: bool,
    pub hazards_avoided: usize,
}

impl RoutePlan {
    /// Straight two-point path.
    pub fn direct(origin: LatLng, destination: LatLng) -> Self {
        Self {
            origin,
            destination,
            waypoints: vec![origin, destination],
            had_hazard_detour: false,
            hazards_avoided: 0,
        }
    }

    /// `[start] + waypoints + [end]`, with the service's echoed endpoints taken as authoritative.
    pub fn from_safe_route(route: SafeRoute) -> Self {
        let mut waypoints = Vec::with_capacity(route.waypoints.len() + 2);
        waypoints.push(route.start);
        waypoints.extend(route.waypoints);
        waypoints.push(route.end);

        let hazards_avoided = if route.has_danger_zones {
            route.danger_zones.len()
        } else {
            0
        };
        Self {
            origin: route.start,
            destination: route.end,
            waypoints,
            had_hazard_detour: route.has_danger_zones,
            hazards_avoided,
        }
    }
}

/// One-time, non-blocking message to show alongside a plan
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAdvisory {
    HazardsAvoided { count: usize },
    DirectPath { message: String, crossed_hazards: usize },
}

impl std::fmt::Display for RouteAdvisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteAdvisory::HazardsAvoided { count } => {
                write!(f, "Route adjusted to avoid {} danger zone(s).", count)
            }
            RouteAdvisory::DirectPath {
                message,
                crossed_hazards: 0,
            } => f.write_str(message),
            RouteAdvisory::DirectPath {
                message,
                crossed_hazards,
            } => write!(f, "{} It crosses {} known danger zone(s).", message, crossed_hazards),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub plan: RoutePlan,
    /// Set when the plan is the direct two-point fallback
    pub fallback: bool,
    pub advisory: Option<RouteAdvisory>,
}

pub struct RoutePlanner {
    service: Arc<dyn RoutingService>,
    timeout: Duration,
}

impl RoutePlanner {
    pub fn new(service: Arc<dyn RoutingService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Plan a route between two coordinates.
    ///
    /// Missing coordinates fail with [`CoreError::MissingLocation`] before any
    /// network call. Every service failure, timeouts included, yields the
    /// direct path with a `DirectPath` advisory instead of an error.
    pub async fn plan_route(
        &self,
        origin: Option<LatLng>,
        destination: Option<LatLng>,
        hazards: &[HazardZone],
    ) -> Result<RouteOutcome> {
        let (origin, destination) = match (origin, destination) {
            (Some(o), Some(d)) if is_finite(o) && is_finite(d) => (o, d),
            _ => return Err(CoreError::MissingLocation),
        };

        let answer = tokio::time::timeout(self.timeout, self.service.safe_route(origin, destination))
            .await
            .map_err(|_| CoreError::Timeout(self.timeout.as_millis() as u64))
            .and_then(|r| r);

        match answer {
            Ok(route) => {
                let plan = RoutePlan::from_safe_route(route);
                debug!(
                    points = plan.waypoints.len(),
                    detour = plan.had_hazard_detour,
                    "Safe route planned"
                );
                let advisory = plan.had_hazard_detour.then(|| {
                    info!(count = plan.hazards_avoided, "Route detours around danger zones");
                    RouteAdvisory::HazardsAvoided {
                        count: plan.hazards_avoided,
                    }
                });
                Ok(RouteOutcome {
                    plan,
                    fallback: false,
                    advisory,
                })
            }
            Err(e) => {
                warn!(error = %e, %origin, %destination, "Safe routing failed, using direct path");
                let crossed_hazards = hazards
                    .iter()
                    .filter(|zone| segment_crosses(zone, origin, destination))
                    .count();
                Ok(RouteOutcome {
                    plan: RoutePlan::direct(origin, destination),
                    fallback: true,
                    advisory: Some(RouteAdvisory::DirectPath {
                        message: DIRECT_PATH_MESSAGE.to_string(),
                        crossed_hazards,
                    }),
                })
            }
        }
    }
}

fn is_finite(p: LatLng) -> bool {
    p.lat.is_finite() && p.lng.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_concatenates_echoed_endpoints() {
        let route = SafeRoute {
            start: LatLng::new(24.0001, 93.0),
            end: LatLng::new(24.5, 93.4999),
            waypoints: vec![LatLng::new(24.2, 93.1)],
            has_danger_zones: true,
            danger_zones: vec![json!({"id": 1})],
        };
        let plan = RoutePlan::from_safe_route(route);
        assert_eq!(plan.waypoints.len(), 3);
        assert_eq!(plan.waypoints[0], LatLng::new(24.0001, 93.0));
        assert_eq!(plan.waypoints[2], LatLng::new(24.5, 93.4999));
        assert_eq!(plan.hazards_avoided, 1);
    }

    #[test]
    fn test_advisory_text() {
        let a = RouteAdvisory::DirectPath {
            message: DIRECT_PATH_MESSAGE.into(),
            crossed_hazards: 0,
        };
        assert_eq!(a.to_string(), DIRECT_PATH_MESSAGE);

        let b = RouteAdvisory::HazardsAvoided { count: 2 };
        assert_eq!(b.to_string(), "Route adjusted to avoid 2 danger zone(s).");
    }
}

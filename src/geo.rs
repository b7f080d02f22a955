//! Geodesy helpers and center discovery

use std::cmp::Ordering;

use crate::model::{CrowdLevel, HazardZone, LatLng, ReliefCenter};

const EARTH_RADIUS_KM: f64 = 6371.0;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Great-circle distance in kilometres.
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn contains(zone: &HazardZone, point: LatLng) -> bool {
    haversine_km(zone.center(), point) * 1000.0 <= zone.radius_meters
}

/// Whether the straight segment `a -> b` passes through the zone.
///
/// Uses a local equirectangular projection around the zone center, which is
/// accurate enough at hazard-zone scales.
pub fn segment_crosses(zone: &HazardZone, a: LatLng, b: LatLng) -> bool {
    let origin = zone.center();
    let scale_lng = METERS_PER_DEGREE_LAT * origin.lat.to_radians().cos();
    let project = |p: LatLng| {
        (
            (p.lng - origin.lng) * scale_lng,
            (p.lat - origin.lat) * METERS_PER_DEGREE_LAT,
        )
    };

    let (ax, ay) = project(a);
    let (bx, by) = project(b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt() <= zone.radius_meters
}

/// Nearest open center to `origin`, with its distance in km.
pub fn nearest_open_center(origin: LatLng, centers: &[ReliefCenter]) -> Option<(&ReliefCenter, f64)> {
    centers
        .iter()
        .filter(|c| c.is_open())
        .map(|c| (c, haversine_km(origin, c.location())))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

/// Quick filters offered next to the search box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CenterChip {
    Open,
    LowCrowd,
    HotMeals,
    /// Sort by distance; needs an origin
    Nearest,
}

impl std::str::FromStr for CenterChip {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(CenterChip::Open),
            "low" | "low-crowd" => Ok(CenterChip::LowCrowd),
            "hot" | "hot-meals" => Ok(CenterChip::HotMeals),
            "nearest" => Ok(CenterChip::Nearest),
            other => Err(format!("unknown filter '{}'", other)),
        }
    }
}

/// Text search over name, address and menu, then the chip filter.
pub fn filter_centers(
    centers: &[ReliefCenter],
    query: &str,
    chip: Option<CenterChip>,
    origin: Option<LatLng>,
) -> Vec<ReliefCenter> {
    let term = query.trim().to_lowercase();
    let mut list: Vec<ReliefCenter> = centers
        .iter()
        .filter(|c| {
            term.is_empty()
                || c.name.to_lowercase().contains(&term)
                || c.address.to_lowercase().contains(&term)
                || c.menu.iter().any(|m| m.to_lowercase().contains(&term))
        })
        .cloned()
        .collect();

    match chip {
        Some(CenterChip::Open) => list.retain(|c| c.is_open()),
        Some(CenterChip::LowCrowd) => list.retain(|c| c.crowd == CrowdLevel::Low),
        Some(CenterChip::HotMeals) => list.retain(|c| c.serves_cooked_food),
        Some(CenterChip::Nearest) => {
            if let Some(origin) = origin {
                list.sort_by(|a, b| {
                    haversine_km(origin, a.location())
                        .partial_cmp(&haversine_km(origin, b.location()))
                        .unwrap_or(Ordering::Equal)
                });
            }
        }
        None => {}
    }

    list
}

//! Bundled relief centers shipped with every client
//!
//! Rendered before the first successful fetch and kept underneath remote
//! data; a remote record with the same id always replaces its seed entry.

use crate::model::{CanonicalId, CenterStatus, CrowdLevel, ReliefCenter};

struct SeedCenter {
    id: u64,
    name: &'static str,
    address: &'static str,
    lat: f64,
    lng: f64,
    crowd: CrowdLevel,
    items: u32,
    cooked_food: bool,
    menu: &'static [&'static str],
}

const SEED_CENTERS: &[SeedCenter] = &[
    SeedCenter {
        id: 1,
        name: "Moirang Bazar Food Center",
        address: "Moirang Bazar, Bishnupur",
        lat: 24.5167,
        lng: 93.7667,
        crowd: CrowdLevel::High,
        items: 45,
        cooked_food: true,
        menu: &["Rice Meals", "Dal Chawal", "Khichdi", "Vegetable Curry", "Chapati Pack"],
    },
    SeedCenter {
        id: 2,
        name: "Imphal Community Kitchen",
        address: "Thangal Bazar, Imphal West",
        lat: 24.8170,
        lng: 93.9368,
        crowd: CrowdLevel::Low,
        items: 62,
        cooked_food: true,
        menu: &["Rice Meals", "Dal Chawal", "Hot Soup", "Chapati Pack", "Vegetable Curry"],
    },
    SeedCenter {
        id: 3,
        name: "Thoubal Relief Center",
        address: "Thoubal Bazar, Thoubal",
        lat: 24.6340,
        lng: 93.9856,
        crowd: CrowdLevel::Medium,
        items: 38,
        cooked_food: true,
        menu: &["Khichdi", "Dal Chawal", "Rice Meals", "Hot Soup"],
    },
    SeedCenter {
        id: 4,
        name: "Churachandpur Food Hub",
        address: "Tuibong, Churachandpur",
        lat: 24.3333,
        lng: 93.6833,
        crowd: CrowdLevel::Low,
        items: 52,
        cooked_food: true,
        menu: &["Rice Meals", "Vegetable Curry", "Chapati Pack", "Dal Chawal", "Khichdi"],
    },
    SeedCenter {
        id: 5,
        name: "Kakching Distribution Center",
        address: "Kakching Khunou, Kakching",
        lat: 24.4980,
        lng: 93.9810,
        crowd: CrowdLevel::Medium,
        items: 41,
        cooked_food: false,
        menu: &["Rice", "Dal", "Wheat Flour", "Onion", "Potato", "Tomato"],
    },
    SeedCenter {
        id: 6,
        name: "Ukhrul Relief Station",
        address: "Ukhrul Town, Ukhrul",
        lat: 25.0500,
        lng: 94.3600,
        crowd: CrowdLevel::High,
        items: 29,
        cooked_food: true,
        menu: &["Rice Meals", "Dal Chawal", "Chapati Pack"],
    },
    SeedCenter {
        id: 7,
        name: "Senapati Emergency Kitchen",
        address: "Senapati Bazar, Senapati",
        lat: 25.2667,
        lng: 94.0167,
        crowd: CrowdLevel::Low,
        items: 55,
        cooked_food: true,
        menu: &["Rice Meals", "Khichdi", "Hot Soup", "Vegetable Curry", "Dal Chawal"],
    },
    SeedCenter {
        id: 8,
        name: "Jiribam Food Point",
        address: "Jiribam Town, Jiribam",
        lat: 24.8050,
        lng: 93.1100,
        crowd: CrowdLevel::Medium,
        items: 34,
        cooked_food: false,
        menu: &["Rice", "Dal", "Wheat Flour", "Potato", "Onion"],
    },
];

/// The fixed seed collection, in display order.
pub fn seed_centers() -> Vec<ReliefCenter> {
    SEED_CENTERS
        .iter()
        .map(|s| ReliefCenter {
            id: CanonicalId::from(s.id),
            name: s.name.to_string(),
            address: s.address.to_string(),
            lat: s.lat,
            lng: s.lng,
            status: CenterStatus::Open,
            crowd: s.crowd,
            item_count: s.items,
            serves_cooked_food: s.cooked_food,
            menu: s.menu.iter().map(|m| m.to_string()).collect(),
        })
        .collect()
}

//! Geographic primitives shared by the codec and the viewport filter.

use serde::{Deserialize, Serialize};

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Returns `None` when either coordinate is out of range or not a number.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if is_valid(lat, lon) {
            Some(Self { lat, lon })
        } else {
            None
        }
    }
}

/// True if `lat` is in [-90, 90] and `lon` in [-180, 180]. NaN is never valid.
pub fn is_valid(lat: f64, lon: f64) -> bool {
    (MIN_LAT..=MAX_LAT).contains(&lat) && (MIN_LON..=MAX_LON).contains(&lon)
}

/// An axis-aligned viewport. Edges are inclusive.
///
/// Viewports crossing the antimeridian are not supported; `west` must not
/// exceed `east`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self { south, west, north, east }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lon)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.south + self.north) / 2.0,
            lon: (self.west + self.east) / 2.0,
        }
    }

    /// A viewport whose edges are inside the valid coordinate range and correctly ordered.
    pub fn is_well_formed(&self) -> bool {
        is_valid(self.south, self.west)
            && is_valid(self.north, self.east)
            && self.south <= self.north
            && self.west <= self.east
    }
}

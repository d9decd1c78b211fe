// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Geographic primitives: points, footprints and reporting polygons.
//!
//! Coordinates are WGS84 degrees. Polygons are tested in plain lon/lat space,
//! which is adequate for the region sizes reported on (no antimeridian
//! crossing).

use crate::error::{CoverError, Result};
use crate::formulas::haversine_m;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Axis-aligned lat/lon box, bounds inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// Simple polygon (exterior ring only) used to select pixels for a region
/// summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    #[serde(default)]
    pub id: Option<String>,
    pub exterior: Vec<GeoPoint>,
}

impl Polygon {
    pub fn new(id: Option<String>, exterior: Vec<GeoPoint>) -> Result<Self> {
        if exterior.len() < 3 {
            return Err(CoverError::InvalidInput(format!(
                "polygon needs at least 3 vertices, got {}",
                exterior.len()
            )));
        }
        if exterior.iter().any(|p| !p.is_valid()) {
            return Err(CoverError::InvalidInput("polygon vertex out of range".into()));
        }
        Ok(Polygon { id, exterior })
    }

    /// Parse a GeoJSON `Polygon` geometry, or a `Feature` wrapping one.
    /// Holes are ignored; the feature's `id` or `properties.name` becomes
    /// the polygon id.
    pub fn from_geojson(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        let (geometry, id) = match doc.get("type").and_then(Value::as_str) {
            Some("Feature") => {
                let id = doc
                    .get("id")
                    .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
                    .or_else(|| {
                        doc.pointer("/properties/name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    });
                let geometry = doc
                    .get("geometry")
                    .ok_or_else(|| CoverError::InvalidInput("feature has no geometry".into()))?;
                (geometry, id)
            }
            _ => (&doc, None),
        };

        match geometry.get("type").and_then(Value::as_str) {
            Some("Polygon") => {}
            other => {
                return Err(CoverError::InvalidInput(format!(
                    "expected Polygon geometry, got {}",
                    other.unwrap_or("nothing")
                )))
            }
        }

        let ring = geometry
            .pointer("/coordinates/0")
            .and_then(Value::as_array)
            .ok_or_else(|| CoverError::InvalidInput("polygon has no exterior ring".into()))?;

        let mut exterior = Vec::with_capacity(ring.len());
        for position in ring {
            let lon = position.get(0).and_then(Value::as_f64);
            let lat = position.get(1).and_then(Value::as_f64);
            match (lat, lon) {
                (Some(lat), Some(lon)) => exterior.push(GeoPoint::new(lat, lon)),
                _ => return Err(CoverError::InvalidInput("malformed polygon position".into())),
            }
        }
        // GeoJSON rings repeat the first vertex at the end
        if exterior.len() > 1 && exterior.first() == exterior.last() {
            exterior.pop();
        }
        Polygon::new(id, exterior)
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut b = BoundingBox {
            min_lat: f64::INFINITY,
            min_lon: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            max_lon: f64::NEG_INFINITY,
        };
        for p in &self.exterior {
            b.min_lat = b.min_lat.min(p.lat);
            b.max_lat = b.max_lat.max(p.lat);
            b.min_lon = b.min_lon.min(p.lon);
            b.max_lon = b.max_lon.max(p.lon);
        }
        b
    }

    /// Even-odd ray casting test.
    pub fn contains(&self, p: &GeoPoint) -> bool {
        if !self.bounds().contains(p) {
            return false;
        }
        let n = self.exterior.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (&self.exterior[i], &self.exterior[j]);
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let cross_lon = a.lon + (p.lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
                if p.lon < cross_lon {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

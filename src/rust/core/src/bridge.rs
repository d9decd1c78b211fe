// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//
// CoverBridge: JSON in, JSON out for the browser dashboard
//
// Every entry point returns a JSON string. Failures come back as
// `{"error": "..."}` instead of a thrown exception.

use crate::error::{CoverError, Result};
use crate::science::{rank_value, Direction, FractionImage, RegionSummarizer, RegionSummary, UnmixingEngine};
use crate::spectra::{EndmemberSet, FractionVector, Reflectance};
use crate::survey::Polygon;
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct UnmixResponse {
    endmembers: Vec<String>,
    fingerprint: String,
    fractions: FractionVector,
    classes: Vec<String>,
    /// Per-class totals in `classes` order, absent for invalid pixels.
    class_fractions: Option<Vec<f64>>,
}

#[derive(Serialize)]
struct RankResponse {
    percentile: f64,
    decile: u8,
    anomaly: bool,
    direction: Option<Direction>,
}

fn respond<T: Serialize>(context: &str, result: Result<T>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_default(),
        Err(e) => serde_json::to_string(&serde_json::json!({
            "error": format!("{context}: {e}")
        }))
        .unwrap_or_default(),
    }
}

#[wasm_bindgen]
pub struct CoverBridge;

#[wasm_bindgen]
impl CoverBridge {
    /// Unmix one pixel.
    ///
    /// `reflectance_json` is an array in the set's band order, `null` for a
    /// masked band.
    #[wasm_bindgen]
    pub fn unmix_json(endmembers_json: &str, reflectance_json: &str) -> String {
        respond("unmix", Self::unmix(endmembers_json, reflectance_json))
    }

    /// Summarize a serialized `FractionImage` inside a GeoJSON polygon.
    #[wasm_bindgen]
    pub fn summarize_json(endmembers_json: &str, image_json: &str, polygon_geojson: &str) -> String {
        respond(
            "summarize",
            Self::summarize(endmembers_json, image_json, polygon_geojson),
        )
    }

    /// Rank `value` against a JSON array of past values.
    #[wasm_bindgen]
    pub fn rank_json(history_json: &str, value: f64, anomaly_threshold: f64) -> String {
        let result = serde_json::from_str::<Vec<f64>>(history_json)
            .map_err(CoverError::from)
            .map(|past| {
                let rank = rank_value(&past, value, anomaly_threshold);
                RankResponse {
                    percentile: rank.percentile,
                    decile: rank.decile,
                    anomaly: rank.direction.is_some(),
                    direction: rank.direction,
                }
            });
        respond("rank", result)
    }
}

impl CoverBridge {
    fn unmix(endmembers_json: &str, reflectance_json: &str) -> Result<UnmixResponse> {
        let set: EndmemberSet = serde_json::from_str(endmembers_json)?;
        let bands: Vec<Option<f64>> = serde_json::from_str(reflectance_json)?;
        let fractions = UnmixingEngine::default().unmix(&Reflectance::from_bands(bands), &set);
        let layout = set.class_layout();
        let class_fractions = fractions
            .fractions()
            .map(|f| f.by_class(&layout.component_class, layout.classes.len()));
        Ok(UnmixResponse {
            endmembers: set.names().into_iter().map(str::to_string).collect(),
            fingerprint: set.fingerprint(),
            fractions,
            classes: layout.classes,
            class_fractions,
        })
    }

    fn summarize(
        endmembers_json: &str,
        image_json: &str,
        polygon_geojson: &str,
    ) -> Result<RegionSummary> {
        let set: EndmemberSet = serde_json::from_str(endmembers_json)?;
        let image: FractionImage = serde_json::from_str(image_json)?;
        let polygon = Polygon::from_geojson(polygon_geojson)?;
        Ok(RegionSummarizer::new(set.class_layout()).summarize_polygon(&image, &polygon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const SET: &str = r#"{
        "band_names": ["red", "nir", "swir"],
        "endmembers": [
            {"name": "soil", "class": "bare", "signature": [0.30, 0.20, 0.10]},
            {"name": "grass", "class": "green", "signature": [0.10, 0.40, 0.30]},
            {"name": "litter", "class": "dead", "signature": [0.20, 0.10, 0.40]}
        ]
    }"#;

    #[test]
    fn test_unmix_json() {
        let out: Value = serde_json::from_str(&CoverBridge::unmix_json(SET, "[0.22, 0.24, 0.22]")).unwrap();
        assert_eq!(out["endmembers"][1], "grass");
        assert_eq!(out["fractions"]["status"], "valid");
        let green = out["class_fractions"][1].as_f64().unwrap();
        assert!((green - 0.3).abs() < 1e-9);

        let masked: Value = serde_json::from_str(&CoverBridge::unmix_json(SET, "[0.22, null, 0.22]")).unwrap();
        assert_eq!(masked["fractions"]["status"], "invalid");
        assert!(masked["class_fractions"].is_null());
    }

    #[test]
    fn test_errors_are_json() {
        let out: Value = serde_json::from_str(&CoverBridge::unmix_json("{", "[]")).unwrap();
        assert!(out["error"].as_str().unwrap().starts_with("unmix:"));
        let out: Value = serde_json::from_str(&CoverBridge::rank_json("nope", 0.5, 0.0)).unwrap();
        assert!(out.get("error").is_some());
    }

    #[test]
    fn test_rank_json() {
        let out: Value =
            serde_json::from_str(&CoverBridge::rank_json("[0.1,0.2,0.3,0.4,0.5,0.6,0.7,0.8,0.9,1.0]", 2.0, 0.0))
                .unwrap();
        assert_eq!(out["decile"], 10);
        assert_eq!(out["anomaly"], true);
    }
}

// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Pure Formulas for Cover Estimation
//!
//! Scalar and slice functions shared by the matcher, optimizer, ranker and
//! region summarizer. No state, no allocation beyond what the caller hands in
//! (except `quantile`, which sorts a copy).
//!
//! References:
//! - Sinnott (1984): Haversine great-circle distance
//! - Hyndman & Fan (1996): Sample quantiles, definition 7

use wasm_bindgen::prelude::*;

/// Mean Earth radius (IUGG), metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// ============================================================================
// GEODESY
// ============================================================================

/// Haversine great-circle distance in metres between two lat/lon points
/// given in degrees.
#[wasm_bindgen]
pub fn haversine_m(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let (phi_a, phi_b) = (lat_a.to_radians(), lat_b.to_radians());
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lon_b - lon_a).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Ground area of a `pixel_height` x `pixel_width` degree cell centred at `lat`,
/// in square metres (spherical approximation).
pub fn pixel_area_m2(lat: f64, pixel_height: f64, pixel_width: f64) -> f64 {
    let metres_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let height = pixel_height.abs() * metres_per_degree;
    let width = pixel_width.abs() * metres_per_degree * lat.to_radians().cos().max(0.0);
    height * width
}

// ============================================================================
// ERROR METRICS
// ============================================================================

/// Root-mean-square of a residual slice. Empty input yields 0.
pub fn rmse(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = residuals.iter().map(|r| r * r).sum();
    (sum_sq / residuals.len() as f64).sqrt()
}

/// Mean absolute value of a residual slice. Empty input yields 0.
pub fn mae(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    residuals.iter().map(|r| r.abs()).sum::<f64>() / residuals.len() as f64
}

// ============================================================================
// RANKING
// ============================================================================

/// Mid-rank percentile of `value` within `history`: the share of history
/// strictly below it, counting ties as half.
///
/// percentile = (less + equal / 2) / n
///
/// A new strict maximum returns 1.0 and a new strict minimum 0.0 for any
/// history length. Empty history returns 0.5.
pub fn average_rank_percentile(history: &[f64], value: f64) -> f64 {
    if history.is_empty() {
        return 0.5;
    }
    let mut less = 0usize;
    let mut equal = 0usize;
    for &h in history {
        if h < value {
            less += 1;
        } else if h == value {
            equal += 1;
        }
    }
    (less as f64 + equal as f64 / 2.0) / history.len() as f64
}

/// Decile bucket (1-10) for a percentile in [0, 1].
#[wasm_bindgen]
pub fn decile_from_percentile(percentile: f64) -> u8 {
    let d = (percentile * 10.0).ceil();
    d.clamp(1.0, 10.0) as u8
}

/// Sample quantile with linear interpolation between order statistics
/// (Hyndman & Fan definition 7). Returns `None` for empty input.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

// ============================================================================
// WEIGHTED MOMENTS
// ============================================================================

/// Weighted mean and (population) standard deviation.
/// Returns `None` if the total weight is not positive.
pub fn weighted_mean_std(values: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    let total: f64 = weights.iter().sum();
    if values.len() != weights.len() || total <= 0.0 {
        return None;
    }
    let mean = values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total;
    let var = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    Some((mean, var.max(0.0).sqrt()))
}

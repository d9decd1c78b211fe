// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Per-band surface reflectance for one pixel.
///
/// A band is `None` when the source flagged it as cloud, no-data, non-finite
/// or out of the physical reflectance range. Numeric sentinels never leave the
/// raster boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reflectance {
    bands: Vec<Option<f64>>,
}

impl Reflectance {
    /// Fully observed pixel.
    pub fn new(values: Vec<f64>) -> Self {
        Reflectance {
            bands: values.into_iter().map(Some).collect(),
        }
    }

    pub fn from_bands(bands: Vec<Option<f64>>) -> Self {
        Reflectance { bands }
    }

    /// Every band masked (cloud over the whole pixel).
    pub fn masked(band_count: usize) -> Self {
        Reflectance {
            bands: vec![None; band_count],
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Option<f64>] {
        &self.bands
    }

    pub fn is_complete(&self) -> bool {
        self.bands.iter().all(|b| b.is_some_and(f64::is_finite))
    }

    /// All band values, or `None` if any band is masked.
    pub fn values(&self) -> Option<Vec<f64>> {
        self.bands
            .iter()
            .map(|b| b.filter(|v| v.is_finite()))
            .collect()
    }
}

impl From<Vec<f64>> for Reflectance {
    fn from(values: Vec<f64>) -> Self {
        Reflectance::new(values)
    }
}

// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Image acquisitions as handed over by the imagery catalog.
//!
//! Rasters arrive already resolved (footprint, timestamp, band arrays, mask).
//! This module only validates their shape and turns raw band values into
//! tagged `Reflectance` at the boundary: no-data sentinels, cloud flags,
//! non-finite values and out-of-range reflectance all become `None`.

use super::geometry::{BoundingBox, GeoPoint};
use crate::error::{CoverError, Result};
use crate::formulas::pixel_area_m2;
use crate::spectra::Reflectance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical surface reflectance range after scaling.
pub const REFLECTANCE_RANGE: (f64, f64) = (0.0, 1.0);

/// Row/column address of a pixel. Orders row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PixelKey {
    pub row: u32,
    pub col: u32,
}

impl PixelKey {
    pub fn new(row: u32, col: u32) -> Self {
        PixelKey { row, col }
    }
}

impl fmt::Display for PixelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}c{}", self.row, self.col)
    }
}

/// North-up regular lat/lon grid. `origin_*` is the north-west corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    pub origin_lat: f64,
    pub origin_lon: f64,
    /// Degrees per pixel, positive.
    pub pixel_height: f64,
    pub pixel_width: f64,
    pub rows: usize,
    pub cols: usize,
}

impl RasterGrid {
    pub fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn footprint(&self) -> BoundingBox {
        BoundingBox {
            min_lat: self.origin_lat - self.rows as f64 * self.pixel_height,
            min_lon: self.origin_lon,
            max_lat: self.origin_lat,
            max_lon: self.origin_lon + self.cols as f64 * self.pixel_width,
        }
    }

    /// Pixel containing `p`. Points on the south or east footprint edge
    /// belong to the last row or column.
    pub fn pixel_at(&self, p: &GeoPoint) -> Option<PixelKey> {
        if !self.footprint().contains(p) {
            return None;
        }
        let row = ((self.origin_lat - p.lat) / self.pixel_height).floor() as usize;
        let col = ((p.lon - self.origin_lon) / self.pixel_width).floor() as usize;
        Some(PixelKey::new(
            row.min(self.rows - 1) as u32,
            col.min(self.cols - 1) as u32,
        ))
    }

    pub fn pixel_center(&self, key: PixelKey) -> GeoPoint {
        GeoPoint::new(
            self.origin_lat - (key.row as f64 + 0.5) * self.pixel_height,
            self.origin_lon + (key.col as f64 + 0.5) * self.pixel_width,
        )
    }

    pub fn pixel_area_m2(&self, key: PixelKey) -> f64 {
        pixel_area_m2(self.pixel_center(key).lat, self.pixel_height, self.pixel_width)
    }

    pub fn index(&self, key: PixelKey) -> usize {
        key.row as usize * self.cols + key.col as usize
    }

    pub fn key(&self, index: usize) -> PixelKey {
        PixelKey::new((index / self.cols) as u32, (index % self.cols) as u32)
    }

    fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(CoverError::InvalidInput("raster grid is empty".into()));
        }
        if !(self.pixel_height > 0.0 && self.pixel_width > 0.0) {
            return Err(CoverError::InvalidInput(
                "raster pixel size must be positive".into(),
            ));
        }
        let fp = self.footprint();
        let corners_ok = GeoPoint::new(fp.min_lat, fp.min_lon).is_valid()
            && GeoPoint::new(fp.max_lat, fp.max_lon).is_valid();
        if !corners_ok {
            return Err(CoverError::InvalidInput(
                "raster footprint outside WGS84 range".into(),
            ));
        }
        Ok(())
    }
}

/// One scene: timestamp, grid and band-major pixel arrays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AcquisitionRecord")]
pub struct ImageAcquisition {
    scene_id: String,
    acquired: DateTime<Utc>,
    grid: RasterGrid,
    band_names: Vec<String>,
    /// `bands[b][row * cols + col]`
    bands: Vec<Vec<f64>>,
    cloud_mask: Option<Vec<bool>>,
    nodata: Option<f64>,
    scale_factor: f64,
}

#[derive(Deserialize)]
struct AcquisitionRecord {
    scene_id: String,
    acquired: DateTime<Utc>,
    grid: RasterGrid,
    band_names: Vec<String>,
    bands: Vec<Vec<f64>>,
    #[serde(default)]
    cloud_mask: Option<Vec<bool>>,
    #[serde(default)]
    nodata: Option<f64>,
    #[serde(default = "default_scale")]
    scale_factor: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl TryFrom<AcquisitionRecord> for ImageAcquisition {
    type Error = CoverError;

    fn try_from(r: AcquisitionRecord) -> Result<Self> {
        ImageAcquisition::new(r.scene_id, r.acquired, r.grid, r.band_names, r.bands)?
            .with_mask(r.cloud_mask)?
            .with_encoding(r.nodata, r.scale_factor)
    }
}

impl ImageAcquisition {
    /// # Errors
    /// `InvalidInput` if the grid is degenerate, there are no bands, or a band
    /// does not hold exactly `rows * cols` values.
    pub fn new(
        scene_id: impl Into<String>,
        acquired: DateTime<Utc>,
        grid: RasterGrid,
        band_names: Vec<String>,
        bands: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let scene_id = scene_id.into();
        grid.validate()?;
        if bands.is_empty() || bands.len() != band_names.len() {
            return Err(CoverError::InvalidInput(format!(
                "scene {scene_id}: {} band arrays for {} band names",
                bands.len(),
                band_names.len()
            )));
        }
        let expected = grid.pixel_count();
        if let Some((b, _)) = bands.iter().enumerate().find(|(_, v)| v.len() != expected) {
            return Err(CoverError::InvalidInput(format!(
                "scene {scene_id}: band {} has {} values, grid has {expected}",
                band_names[b],
                bands[b].len()
            )));
        }
        Ok(ImageAcquisition {
            scene_id,
            acquired,
            grid,
            band_names,
            bands,
            cloud_mask: None,
            nodata: None,
            scale_factor: 1.0,
        })
    }

    /// Attach a per-pixel cloud mask (`true` = unusable).
    pub fn with_mask(mut self, mask: Option<Vec<bool>>) -> Result<Self> {
        if let Some(m) = &mask {
            if m.len() != self.grid.pixel_count() {
                return Err(CoverError::InvalidInput(format!(
                    "scene {}: mask has {} values, grid has {}",
                    self.scene_id,
                    m.len(),
                    self.grid.pixel_count()
                )));
            }
        }
        self.cloud_mask = mask;
        Ok(self)
    }

    /// Source no-data value and the factor turning stored values into
    /// reflectance (MODIS stores reflectance x 10000, factor 0.0001).
    pub fn with_encoding(mut self, nodata: Option<f64>, scale_factor: f64) -> Result<Self> {
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return Err(CoverError::InvalidInput(format!(
                "scene {}: scale factor {scale_factor} must be positive",
                self.scene_id
            )));
        }
        self.nodata = nodata;
        self.scale_factor = scale_factor;
        Ok(self)
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn acquired(&self) -> DateTime<Utc> {
        self.acquired
    }

    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn footprint(&self) -> BoundingBox {
        self.grid.footprint()
    }

    pub fn is_cloudy(&self, key: PixelKey) -> bool {
        self.cloud_mask
            .as_ref()
            .is_some_and(|m| m[self.grid.index(key)])
    }

    fn decode(&self, raw: f64) -> Option<f64> {
        if !raw.is_finite() || self.nodata == Some(raw) {
            return None;
        }
        let value = raw * self.scale_factor;
        let (lo, hi) = REFLECTANCE_RANGE;
        (lo..=hi).contains(&value).then_some(value)
    }

    /// Tagged reflectance at `key`. A cloudy pixel is masked in every band.
    pub fn reflectance_at(&self, key: PixelKey) -> Reflectance {
        if key.row as usize >= self.grid.rows || key.col as usize >= self.grid.cols || self.is_cloudy(key) {
            return Reflectance::masked(self.band_count());
        }
        let idx = self.grid.index(key);
        Reflectance::from_bands(self.bands.iter().map(|band| self.decode(band[idx])).collect())
    }

    pub fn pixel_keys(&self) -> impl Iterator<Item = PixelKey> + '_ {
        (0..self.grid.pixel_count()).map(|i| self.grid.key(i))
    }
}

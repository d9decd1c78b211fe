// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Area-weighted per-class statistics over a set of pixels.

use super::unmixing::FractionImage;
use crate::formulas::weighted_mean_std;
use crate::spectra::{ClassLayout, FractionVector};
use crate::survey::{PixelKey, Polygon};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const HISTOGRAM_BINS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class: String,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Share of valid area per tenth of [0, 1]. Sums to one.
    pub histogram: Vec<f64>,
}

/// Per-class distribution for one region at one time.
///
/// `classes` is empty when no valid pixel contributed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub classes: Vec<ClassSummary>,
    pub valid_pixels: usize,
    /// Invalid fractions, wrong-length fractions and non-positive areas.
    pub invalid_pixels: usize,
    pub valid_area: f64,
}

impl RegionSummary {
    pub fn class(&self, name: &str) -> Option<&ClassSummary> {
        self.classes.iter().find(|c| c.class == name)
    }

    pub fn coverage(&self) -> f64 {
        let total = self.valid_pixels + self.invalid_pixels;
        if total == 0 {
            0.0
        } else {
            self.valid_pixels as f64 / total as f64
        }
    }
}

fn histogram_bin(value: f64) -> usize {
    ((value * HISTOGRAM_BINS as f64).floor().max(0.0) as usize).min(HISTOGRAM_BINS - 1)
}

#[derive(Clone, Debug)]
pub struct RegionSummarizer {
    layout: ClassLayout,
}

impl RegionSummarizer {
    pub fn new(layout: ClassLayout) -> Self {
        RegionSummarizer { layout }
    }

    /// Aggregate `(location, fractions, area)` items in the order given.
    pub fn summarize<'a, I>(&self, pixels: I) -> RegionSummary
    where
        I: IntoIterator<Item = (PixelKey, &'a FractionVector, f64)>,
    {
        let n_classes = self.layout.classes.len();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); n_classes];
        let mut weights = Vec::new();
        let mut invalid = 0usize;

        for (location, fractions, area) in pixels {
            let Some(f) = fractions.fractions() else {
                invalid += 1;
                continue;
            };
            if f.values.len() != self.layout.component_class.len() {
                debug!(%location, "fraction length does not match class layout");
                invalid += 1;
                continue;
            }
            if !(area.is_finite() && area > 0.0) {
                debug!(%location, area, "pixel without positive area");
                invalid += 1;
                continue;
            }
            let by_class = f.by_class(&self.layout.component_class, n_classes);
            for (column, v) in columns.iter_mut().zip(by_class) {
                column.push(v);
            }
            weights.push(area);
        }

        let valid_area: f64 = weights.iter().sum();
        let classes = if weights.is_empty() {
            Vec::new()
        } else {
            self.layout
                .classes
                .iter()
                .zip(&columns)
                .filter_map(|(class, values)| {
                    let (mean, std_dev) = weighted_mean_std(values, &weights)?;
                    let mut histogram = vec![0.0; HISTOGRAM_BINS];
                    for (v, w) in values.iter().zip(&weights) {
                        histogram[histogram_bin(*v)] += w / valid_area;
                    }
                    Some(ClassSummary {
                        class: class.clone(),
                        mean,
                        std_dev,
                        min: values.iter().copied().fold(f64::INFINITY, f64::min),
                        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        histogram,
                    })
                })
                .collect()
        };

        RegionSummary {
            region: None,
            classes,
            valid_pixels: weights.len(),
            invalid_pixels: invalid,
            valid_area,
        }
    }

    /// Pixels whose centres fall in `polygon`, weighted by ground area.
    pub fn summarize_polygon(&self, image: &FractionImage, polygon: &Polygon) -> RegionSummary {
        let grid = &image.grid;
        let inside = image
            .iter()
            .filter(|(key, _)| polygon.contains(&grid.pixel_center(*key)))
            .map(|(key, f)| (key, f, grid.pixel_area_m2(key)));
        let mut summary = self.summarize(inside);
        summary.region = polygon.id.clone();
        summary
    }

    /// Polygon summary for every image, oldest first.
    pub fn region_time_series(
        &self,
        images: &[FractionImage],
        polygon: &Polygon,
    ) -> Vec<(DateTime<Utc>, RegionSummary)> {
        let mut series: Vec<(DateTime<Utc>, RegionSummary)> = images
            .iter()
            .map(|image| (image.acquired, self.summarize_polygon(image, polygon)))
            .collect();
        series.sort_by_key(|(t, _)| *t);
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::science::unmixing::PixelCounts;
    use crate::spectra::{CoverFractions, Endmember, InvalidReason};
    use crate::survey::{GeoPoint, RasterGrid};
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn layout() -> ClassLayout {
        ClassLayout::from_endmembers(&[
            Endmember::new("bare", vec![]),
            Endmember::new("green", vec![]),
            Endmember::new("dead", vec![]),
        ])
    }

    fn fv(values: [f64; 3]) -> FractionVector {
        FractionVector::Valid(CoverFractions {
            values: values.to_vec(),
            residual_rmse: 0.0,
        })
    }

    #[test]
    fn test_weighted_mean_excludes_invalid() {
        let a = fv([0.2, 0.5, 0.3]);
        let b = fv([0.6, 0.1, 0.3]);
        let masked = FractionVector::invalid(InvalidReason::Masked);
        let pixels = vec![
            (PixelKey::new(0, 0), &a, 3.0),
            (PixelKey::new(0, 1), &b, 1.0),
            (PixelKey::new(0, 2), &masked, 1.0),
        ];
        let s = RegionSummarizer::new(layout()).summarize(pixels);

        assert_eq!(s.valid_pixels, 2);
        assert_eq!(s.invalid_pixels, 1);
        assert_abs_diff_eq!(s.valid_area, 4.0);

        let bare = s.class("bare").unwrap();
        assert_abs_diff_eq!(bare.mean, 0.3, epsilon = 1e-12);
        // weights 3:1 around 0.3 -> sqrt((3*0.01 + 0.09) / 4)
        assert_abs_diff_eq!(bare.std_dev, (0.12f64 / 4.0).sqrt(), epsilon = 1e-12);
        assert_eq!((bare.min, bare.max), (0.2, 0.6));
        assert_abs_diff_eq!(bare.histogram[2], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(bare.histogram[6], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(bare.histogram.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.coverage(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_full_cover_lands_in_last_bin() {
        let full = fv([0.0, 1.0, 0.0]);
        let s = RegionSummarizer::new(layout()).summarize(vec![(PixelKey::new(0, 0), &full, 1.0)]);
        assert_eq!(s.class("green").unwrap().histogram[9], 1.0);
        assert_eq!(s.class("bare").unwrap().histogram[0], 1.0);
    }

    #[test]
    fn test_all_invalid_region() {
        let masked = FractionVector::invalid(InvalidReason::Singular);
        let s = RegionSummarizer::new(layout()).summarize(vec![(PixelKey::new(0, 0), &masked, 1.0)]);
        assert!(s.classes.is_empty());
        assert_eq!(s.invalid_pixels, 1);
        assert_eq!(s.coverage(), 0.0);
    }

    #[test]
    fn test_polygon_summary_and_series() {
        let grid = RasterGrid {
            origin_lat: -20.0,
            origin_lon: 140.0,
            pixel_height: 0.01,
            pixel_width: 0.01,
            rows: 2,
            cols: 2,
        };
        let image = |day: u32, green: f64| FractionImage {
            scene_id: format!("d{day}"),
            acquired: Utc.with_ymd_and_hms(2016, 3, day, 0, 0, 0).unwrap(),
            grid,
            endmembers: vec!["bare".into(), "green".into(), "dead".into()],
            pixels: vec![
                fv([0.5, green, 0.5 - green]),
                fv([0.5, green, 0.5 - green]),
                fv([1.0, 0.0, 0.0]),
                fv([1.0, 0.0, 0.0]),
            ],
            counts: PixelCounts::default(),
        };
        // covers only the top row
        let polygon = Polygon::new(
            Some("paddock-7".into()),
            vec![
                GeoPoint::new(-20.0, 140.0),
                GeoPoint::new(-20.0, 140.02),
                GeoPoint::new(-20.01, 140.02),
                GeoPoint::new(-20.01, 140.0),
            ],
        )
        .unwrap();

        let summarizer = RegionSummarizer::new(layout());
        let s = summarizer.summarize_polygon(&image(1, 0.2), &polygon);
        assert_eq!(s.region.as_deref(), Some("paddock-7"));
        assert_eq!(s.valid_pixels, 2);
        assert_abs_diff_eq!(s.class("green").unwrap().mean, 0.2, epsilon = 1e-12);
        // ~1.1 km x ~1.04 km pixels at 20 S
        assert!(s.valid_area > 2.0e6 && s.valid_area < 2.5e6);

        let series = summarizer.region_time_series(&[image(9, 0.4), image(1, 0.2)], &polygon);
        assert_eq!(series.len(), 2);
        assert!(series[0].0 < series[1].0);
        assert_abs_diff_eq!(series[1].1.class("green").unwrap().mean, 0.4, epsilon = 1e-12);
    }
}

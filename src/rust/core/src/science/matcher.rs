// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Field site to image matching.
//!
//! Candidate filter: footprint contains the site, the pixel under the site is
//! clear in every band, and |dt| is within the window. Ranking is time first:
//! candidates within `time_tolerance_secs` of the best |dt| form a shortlist,
//! ordered by spatial offset, then |dt|, then scene id.

use crate::error::{CoverError, Result};
use crate::survey::{FieldSite, GeoPoint, ImageAcquisition, PixelKey};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

const SECS_PER_DAY: f64 = 86_400.0;

/// Spatial measure used to break time ties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialTiebreak {
    /// Distance from the site to the centre of the pixel it falls in.
    #[default]
    PixelOffset,
    /// Distance from the site to the centre of the scene footprint.
    FootprintCenter,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub max_time_window_days: f64,
    /// Width of the time shortlist handed to the spatial tiebreak.
    pub time_tolerance_secs: i64,
    pub spatial_tiebreak: SpatialTiebreak,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            max_time_window_days: 16.0,
            time_tolerance_secs: 0,
            spatial_tiebreak: SpatialTiebreak::PixelOffset,
        }
    }
}

impl MatchConfig {
    fn window_secs(&self) -> i64 {
        (self.max_time_window_days * SECS_PER_DAY).round() as i64
    }
}

/// A field site paired with the reflectance of its best image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchedObservation {
    pub site: FieldSite,
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    pub pixel: PixelKey,
    /// Band order of `reflectance`, as stored in the acquisition.
    pub band_names: Vec<String>,
    pub reflectance: Vec<f64>,
    /// acquired - observed, signed.
    pub time_offset_secs: i64,
    pub spatial_offset_m: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchReport {
    /// Same order as the input sites.
    pub matched: Vec<MatchedObservation>,
    /// `(site_id, reason)`
    pub not_found: Vec<(String, String)>,
}

struct Candidate<'a> {
    acquisition: &'a ImageAcquisition,
    pixel: PixelKey,
    values: Vec<f64>,
    abs_dt: i64,
    offset_m: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ReflectanceMatcher {
    config: MatchConfig,
}

impl ReflectanceMatcher {
    pub fn new(config: MatchConfig) -> Self {
        ReflectanceMatcher { config }
    }

    fn spatial_offset(&self, site: &GeoPoint, acquisition: &ImageAcquisition, pixel: PixelKey) -> f64 {
        let reference = match self.config.spatial_tiebreak {
            SpatialTiebreak::PixelOffset => acquisition.grid().pixel_center(pixel),
            SpatialTiebreak::FootprintCenter => acquisition.footprint().center(),
        };
        site.distance_m(&reference)
    }

    /// Best acquisition for one site.
    ///
    /// # Errors
    /// `NotFound` when no clear pixel lies within the time window.
    pub fn match_site(
        &self,
        site: &FieldSite,
        candidates: &[ImageAcquisition],
    ) -> Result<MatchedObservation> {
        let location = site.location();
        let window = self.config.window_secs();

        let mut covering = 0usize;
        let mut clear = 0usize;
        let mut in_window: Vec<Candidate> = Vec::new();
        for acquisition in candidates {
            let Some(pixel) = acquisition.grid().pixel_at(&location) else {
                continue;
            };
            covering += 1;
            let Some(values) = acquisition.reflectance_at(pixel).values() else {
                continue;
            };
            clear += 1;
            let abs_dt = (acquisition.acquired() - site.observed()).num_seconds().abs();
            if abs_dt <= window {
                in_window.push(Candidate {
                    acquisition,
                    pixel,
                    values,
                    abs_dt,
                    offset_m: 0.0,
                });
            }
        }

        let Some(best_dt) = in_window.iter().map(|c| c.abs_dt).min() else {
            let reason = if covering == 0 {
                "no acquisition covers the site".to_string()
            } else if clear == 0 {
                format!("site masked in all {covering} covering acquisitions")
            } else {
                format!(
                    "no clear acquisition within {} days ({clear} outside the window)",
                    self.config.max_time_window_days
                )
            };
            debug!(site = site.id(), %reason, "no match");
            return Err(CoverError::NotFound {
                site: site.id().to_string(),
                reason,
            });
        };

        let cutoff = best_dt.saturating_add(self.config.time_tolerance_secs.max(0));
        let best = in_window
            .into_iter()
            .filter(|c| c.abs_dt <= cutoff)
            .map(|mut c| {
                c.offset_m = self.spatial_offset(&location, c.acquisition, c.pixel);
                c
            })
            .min_by(|a, b| {
                a.offset_m
                    .total_cmp(&b.offset_m)
                    .then(a.abs_dt.cmp(&b.abs_dt))
                    .then_with(|| a.acquisition.scene_id().cmp(b.acquisition.scene_id()))
            })
            .ok_or_else(|| CoverError::NotFound {
                site: site.id().to_string(),
                reason: "empty shortlist".into(),
            })?;
        Ok(MatchedObservation {
            site: site.clone(),
            scene_id: best.acquisition.scene_id().to_string(),
            acquired: best.acquisition.acquired(),
            pixel: best.pixel,
            band_names: best.acquisition.band_names().to_vec(),
            reflectance: best.values,
            time_offset_secs: (best.acquisition.acquired() - site.observed()).num_seconds(),
            spatial_offset_m: best.offset_m,
        })
    }

    /// Match every site in parallel. Misses are collected, never fatal.
    pub fn match_all(&self, sites: &[FieldSite], candidates: &[ImageAcquisition]) -> MatchReport {
        let outcomes: Vec<Result<MatchedObservation>> = sites
            .par_iter()
            .map(|site| self.match_site(site, candidates))
            .collect();

        let mut report = MatchReport::default();
        for (site, outcome) in sites.iter().zip(outcomes) {
            match outcome {
                Ok(m) => report.matched.push(m),
                Err(CoverError::NotFound { reason, .. }) => {
                    report.not_found.push((site.id().to_string(), reason))
                }
                Err(e) => report.not_found.push((site.id().to_string(), e.to_string())),
            }
        }
        info!(
            sites = sites.len(),
            matched = report.matched.len(),
            not_found = report.not_found.len(),
            "matched field sites"
        );
        report
    }
}

/// Newest acquisition; equal timestamps resolve to the larger scene id.
pub fn latest_acquisition(candidates: &[ImageAcquisition]) -> Option<&ImageAcquisition> {
    candidates.iter().max_by(|a, b| match a.acquired().cmp(&b.acquired()) {
        Ordering::Equal => a.scene_id().cmp(b.scene_id()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::{FieldCover, RasterGrid};
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap() + Duration::days(n - 1)
    }

    fn grid(origin_lat: f64, origin_lon: f64) -> RasterGrid {
        RasterGrid {
            origin_lat,
            origin_lon,
            pixel_height: 0.01,
            pixel_width: 0.01,
            rows: 4,
            cols: 4,
        }
    }

    fn scene(id: &str, when: DateTime<Utc>, g: RasterGrid, value: f64) -> ImageAcquisition {
        let n = g.rows * g.cols;
        ImageAcquisition::new(
            id,
            when,
            g,
            vec!["red".into(), "nir".into()],
            vec![vec![value; n], vec![value + 0.1; n]],
        )
        .unwrap()
    }

    fn site_at(observed: DateTime<Utc>) -> FieldSite {
        let cover = FieldCover::new(vec!["bare".into(), "green".into()], vec![0.4, 0.6]).unwrap();
        FieldSite::new("S1", GeoPoint::new(-20.015, 140.015), observed, cover).unwrap()
    }

    #[test]
    fn test_time_window_selects_nearest() {
        let site = site_at(day(10));
        let candidates = vec![
            scene("d40", day(40), grid(-20.0, 140.0), 0.3),
            scene("d5", day(5), grid(-20.0, 140.0), 0.2),
        ];

        let wide = ReflectanceMatcher::new(MatchConfig {
            max_time_window_days: 20.0,
            ..MatchConfig::default()
        });
        let m = wide.match_site(&site, &candidates).unwrap();
        assert_eq!(m.scene_id, "d5");
        assert_eq!(m.time_offset_secs, -5 * 86_400);
        assert_eq!(m.reflectance.len(), 2);
        assert_eq!(m.reflectance[0], 0.2);

        let narrow = ReflectanceMatcher::new(MatchConfig {
            max_time_window_days: 3.0,
            ..MatchConfig::default()
        });
        let err = narrow.match_site(&site, &candidates).unwrap_err();
        assert!(matches!(err, CoverError::NotFound { ref site, .. } if site == "S1"));
    }

    #[test]
    fn test_masked_pixel_is_skipped() {
        let site = site_at(day(10));
        let cloudy = scene("d10", day(10), grid(-20.0, 140.0), 0.2)
            .with_mask(Some(vec![true; 16]))
            .unwrap();
        let clear = scene("d12", day(12), grid(-20.0, 140.0), 0.25);
        let m = ReflectanceMatcher::default()
            .match_site(&site, &[cloudy.clone(), clear])
            .unwrap();
        assert_eq!(m.scene_id, "d12");

        let err = ReflectanceMatcher::default().match_site(&site, &[cloudy]).unwrap_err();
        assert!(err.to_string().contains("masked"));
    }

    #[test]
    fn test_spatial_tiebreak_within_tolerance() {
        let site = site_at(day(10));
        // centred on the site vs. site near the footprint corner
        let centred = scene("centred", day(11), grid(-19.995, 139.995), 0.2);
        let corner = scene("corner", day(10), grid(-20.0, 140.0), 0.3);

        // exact time wins without tolerance
        let strict = ReflectanceMatcher::new(MatchConfig {
            spatial_tiebreak: SpatialTiebreak::FootprintCenter,
            ..MatchConfig::default()
        });
        let m = strict.match_site(&site, &[centred.clone(), corner.clone()]).unwrap();
        assert_eq!(m.scene_id, "corner");

        // one-day tolerance lets the better-centred scene win
        let loose = ReflectanceMatcher::new(MatchConfig {
            time_tolerance_secs: 86_400,
            spatial_tiebreak: SpatialTiebreak::FootprintCenter,
            ..MatchConfig::default()
        });
        let m = loose.match_site(&site, &[corner, centred]).unwrap();
        assert_eq!(m.scene_id, "centred");
    }

    #[test]
    fn test_match_all_reports_misses_in_order() {
        let candidates = vec![scene("d5", day(5), grid(-20.0, 140.0), 0.2)];
        let near = site_at(day(6));
        let cover = FieldCover::new(vec!["bare".into(), "green".into()], vec![0.5, 0.5]).unwrap();
        let outside = FieldSite::new("S2", GeoPoint::new(-30.0, 150.0), day(6), cover).unwrap();

        let report = ReflectanceMatcher::default().match_all(&[outside, near], &candidates);
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.not_found.len(), 1);
        assert_eq!(report.not_found[0].0, "S2");
        assert!(report.not_found[0].1.contains("covers"));
    }

    #[test]
    fn test_latest_acquisition() {
        let scenes = vec![
            scene("a", day(3), grid(-20.0, 140.0), 0.2),
            scene("c", day(9), grid(-20.0, 140.0), 0.2),
            scene("b", day(9), grid(-20.0, 140.0), 0.2),
        ];
        assert_eq!(latest_acquisition(&scenes).map(|s| s.scene_id()), Some("c"));
        assert!(latest_acquisition(&[]).is_none());
    }
}

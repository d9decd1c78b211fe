// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//
// End-to-end: field calibration, per-scene unmixing, ranking and summaries.

use crate::cover_kernel::{CoverConfig, CoverKernel, Severity};
use crate::error::CoverError;
use crate::science::{Direction, HistoryState};
use crate::spectra::{Endmember, EndmemberLibrary, SpectralTransform};
use crate::survey::{FieldCover, FieldSite, GeoPoint, ImageAcquisition, PixelKey, Polygon, RasterGrid};
use chrono::{DateTime, Duration, TimeZone, Utc};

const SOIL: [f64; 3] = [0.30, 0.20, 0.10];
const GRASS: [f64; 3] = [0.10, 0.40, 0.30];
const LITTER: [f64; 3] = [0.20, 0.10, 0.40];

fn bands() -> Vec<String> {
    vec!["red".into(), "nir".into(), "swir".into()]
}

fn library() -> EndmemberLibrary {
    EndmemberLibrary::new(
        bands(),
        SpectralTransform::Identity,
        vec![
            Endmember::new("soil", SOIL.to_vec()).with_class("bare"),
            Endmember::new("grass", GRASS.to_vec()).with_class("green"),
            Endmember::new("litter", LITTER.to_vec()).with_class("dead"),
            Endmember::new("red_soil", vec![0.35, 0.30, 0.05]).with_class("bare"),
            Endmember::new("shrub", vec![0.05, 0.30, 0.20]).with_class("green"),
        ],
    )
    .unwrap()
}

fn grid() -> RasterGrid {
    RasterGrid {
        origin_lat: -25.0,
        origin_lon: 135.0,
        pixel_height: 0.01,
        pixel_width: 0.01,
        rows: 2,
        cols: 2,
    }
}

fn mix(f: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (b, v) in out.iter_mut().enumerate() {
        *v = SOIL[b] * f[0] + GRASS[b] * f[1] + LITTER[b] * f[2];
    }
    out
}

/// Scene whose four pixels (row-major) are mixtures of soil, grass, litter.
fn scene(id: &str, when: DateTime<Utc>, pixels: [[f64; 3]; 4]) -> ImageAcquisition {
    let mut data = vec![Vec::with_capacity(4); 3];
    for f in pixels {
        for (b, v) in mix(f).into_iter().enumerate() {
            data[b].push(v);
        }
    }
    ImageAcquisition::new(id, when, grid(), bands(), data).unwrap()
}

const STEADY: [f64; 3] = [0.4, 0.4, 0.2];

fn april(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 4, day, 0, 30, 0).unwrap()
}

/// Five surveyed sites on pixel (0, 0), each with a same-day clear scene.
fn calibration_inputs(count: usize) -> (Vec<FieldSite>, Vec<ImageAcquisition>) {
    let covers = [
        [0.5, 0.3, 0.2],
        [0.1, 0.6, 0.3],
        [0.7, 0.1, 0.2],
        [0.2, 0.2, 0.6],
        [0.4, 0.4, 0.2],
    ];
    let site_point = grid().pixel_center(PixelKey::new(0, 0));
    let mut sites = Vec::new();
    let mut scenes = Vec::new();
    for (i, f) in covers.iter().take(count).enumerate() {
        let when = april(1 + 3 * i as u32);
        let cover = FieldCover::new(vec!["bare".into(), "green".into(), "dead".into()], f.to_vec()).unwrap();
        sites.push(FieldSite::new(format!("SA{i:02}"), site_point, when, cover).unwrap());
        scenes.push(scene(&format!("cal-{i}"), when, [*f, STEADY, STEADY, STEADY]));
    }
    (sites, scenes)
}

fn region() -> Polygon {
    Polygon::new(
        Some("paddock".into()),
        vec![
            GeoPoint::new(-24.999, 135.001),
            GeoPoint::new(-24.999, 135.019),
            GeoPoint::new(-25.019, 135.019),
            GeoPoint::new(-25.019, 135.001),
        ],
    )
    .unwrap()
}

fn calibrated_kernel() -> CoverKernel {
    let (sites, scenes) = calibration_inputs(5);
    let mut kernel = CoverKernel::new(CoverConfig::default());
    kernel.calibrate(&sites, &scenes, &library()).unwrap();
    kernel
}

#[test]
fn test_calibration_selects_generating_endmembers() {
    let (sites, scenes) = calibration_inputs(5);
    let mut kernel = CoverKernel::new(CoverConfig::default());
    let run = kernel.calibrate(&sites, &scenes, &library()).unwrap();

    assert_eq!(run.matched, 5);
    assert!(run.not_found.is_empty());
    assert_eq!(run.calibration.endmembers.names(), vec!["soil", "grass", "litter"]);
    assert!(run.calibration.report.aggregate_error < 1e-9);

    let installed = kernel.endmembers().unwrap();
    assert_eq!(installed.fingerprint(), run.fingerprint);
    assert!(run.events.iter().all(|e| e.severity == Severity::Info));
}

#[test]
fn test_insufficient_samples_installs_nothing() {
    let (sites, scenes) = calibration_inputs(3);
    let mut kernel = CoverKernel::new(CoverConfig::default());
    let err = kernel.calibrate(&sites, &scenes, &library()).unwrap_err();
    assert!(matches!(
        err,
        CoverError::InsufficientSamples {
            required: 4,
            available: 3
        }
    ));
    assert!(kernel.endmembers().is_none());
    assert!(kernel.process_acquisition(&scenes[0], None).is_err());
}

/// Same pixels, stored swir-nir-red.
fn reversed_bands(stored: &ImageAcquisition) -> ImageAcquisition {
    let mut data = vec![Vec::new(); 3];
    for key in stored.pixel_keys() {
        let values = stored.reflectance_at(key).values().unwrap();
        for (b, v) in values.into_iter().rev().enumerate() {
            data[b].push(v);
        }
    }
    let bands = vec!["swir".into(), "nir".into(), "red".into()];
    ImageAcquisition::new(stored.scene_id(), stored.acquired(), grid(), bands, data).unwrap()
}

#[test]
fn test_scene_in_other_band_order_is_excluded() {
    let (mut sites, mut scenes) = calibration_inputs(5);
    let f = [0.3, 0.3, 0.4];
    let when = april(20);
    let cover = FieldCover::new(vec!["bare".into(), "green".into(), "dead".into()], f.to_vec()).unwrap();
    sites.push(FieldSite::new("SA05", grid().pixel_center(PixelKey::new(0, 0)), when, cover).unwrap());
    scenes.push(reversed_bands(&scene("swapped", when, [f, STEADY, STEADY, STEADY])));

    let mut kernel = CoverKernel::new(CoverConfig::default());
    let run = kernel.calibrate(&sites, &scenes, &library()).unwrap();
    assert_eq!(run.matched, 6);
    assert_eq!(run.calibration.report.samples_used, 5);
    assert_eq!(run.calibration.report.samples_excluded, 1);
    assert!(run
        .events
        .iter()
        .any(|e| e.topic == "CALIBRATION.SAMPLES" && e.severity == Severity::Warning));

    let reordered: Vec<ImageAcquisition> = scenes.iter().map(reversed_bands).collect();
    let mut kernel = CoverKernel::new(CoverConfig::default());
    let err = kernel.calibrate(&sites, &reordered, &library()).unwrap_err();
    assert!(matches!(err, CoverError::InsufficientSamples { available: 0, .. }));
    assert!(kernel.endmembers().is_none());
}

#[test]
fn test_unmatched_sites_are_reported() {
    let (mut sites, scenes) = calibration_inputs(5);
    let far = GeoPoint::new(-30.0, 120.0);
    let cover = FieldCover::new(vec!["bare".into()], vec![1.0]).unwrap();
    sites.push(FieldSite::new("WA99", far, april(2), cover).unwrap());

    let mut kernel = CoverKernel::new(CoverConfig::default());
    let run = kernel.calibrate(&sites, &scenes, &library()).unwrap();
    assert_eq!(run.sites, 6);
    assert_eq!(run.matched, 5);
    assert_eq!(run.not_found.len(), 1);
    assert_eq!(run.not_found[0].0, "WA99");
    assert!(run
        .events
        .iter()
        .any(|e| e.topic == "CALIBRATION.MATCHING" && e.severity == Severity::Warning));
}

#[test]
fn test_season_of_scenes_raises_anomaly() {
    let mut kernel = calibrated_kernel();
    let start = Utc.with_ymd_and_hms(2014, 5, 1, 0, 30, 0).unwrap();
    let greens = [0.25, 0.31, 0.28, 0.34, 0.30, 0.27, 0.33, 0.26, 0.32, 0.29];

    for (i, g) in greens.iter().enumerate() {
        let when = start + Duration::days(16 * i as i64);
        let acq = scene(&format!("s{i}"), when, [[0.8 - g, *g, 0.2], STEADY, STEADY, STEADY]);
        let run = kernel.process_acquisition(&acq, None).unwrap();
        assert!(run.flags.is_empty(), "ranked before history was ready");
        assert_eq!(run.counts.valid, 4);
    }
    let ranker = kernel.ranker().unwrap();
    assert_eq!(ranker.state(PixelKey::new(0, 0)), HistoryState::Ready);

    let when = start + Duration::days(160);
    let flush = scene("flush", when, [[0.1, 0.7, 0.2], STEADY, STEADY, STEADY]);
    let run = kernel.process_acquisition(&flush, Some(&region())).unwrap();

    let origin = PixelKey::new(0, 0);
    let green = run
        .flags
        .iter()
        .find(|f| f.location == origin && f.class == "green")
        .unwrap();
    assert_eq!(green.decile, 10);
    assert_eq!(green.direction, Some(Direction::High));
    let bare = run
        .flags
        .iter()
        .find(|f| f.location == origin && f.class == "bare")
        .unwrap();
    assert_eq!(bare.decile, 1);
    assert_eq!(bare.direction, Some(Direction::Low));

    // unchanged pixels tie with their whole history
    let steady: Vec<_> = run.flags.iter().filter(|f| f.location != origin).collect();
    assert_eq!(steady.len(), 9);
    assert!(steady.iter().all(|f| f.decile == 5 && !f.anomaly));

    let summary = run.summary.unwrap();
    assert_eq!(summary.region.as_deref(), Some("paddock"));
    assert_eq!(summary.valid_pixels, 4);
    let mean_green = summary.class("green").unwrap().mean;
    // area weights differ slightly between rows
    assert!((mean_green - (0.7 + 3.0 * 0.4) / 4.0).abs() < 1e-4);
    assert!(run.events.iter().any(|e| e.topic == "COVER.ANOMALY"));
}

#[test]
fn test_cloudy_pixel_is_recorded_not_ranked() {
    let mut kernel = calibrated_kernel();
    let start = Utc.with_ymd_and_hms(2014, 5, 1, 0, 30, 0).unwrap();
    let mut last = start;
    for i in 0..3 {
        last = start + Duration::days(16 * i);
        let acq = scene(&format!("s{i}"), last, [STEADY; 4]);
        kernel.process_acquisition(&acq, None).unwrap();
    }

    let cloudy = scene("cloudy", last + Duration::days(16), [STEADY; 4])
        .with_mask(Some(vec![true, false, false, true]))
        .unwrap();
    let run = kernel.process_acquisition(&cloudy, Some(&region())).unwrap();
    assert_eq!(run.counts.valid, 2);
    assert_eq!(run.counts.masked, 2);
    assert!(run.events.iter().all(|e| e.topic != "COVER.COVERAGE"));

    let history = kernel.ranker().unwrap().history(PixelKey::new(0, 0)).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history.valid_count(), 3);

    let summary = run.summary.unwrap();
    assert_eq!(summary.valid_pixels, 2);
    assert_eq!(summary.invalid_pixels, 2);
}

#[test]
fn test_low_coverage_warning() {
    let mut kernel = calibrated_kernel();
    let when = Utc.with_ymd_and_hms(2014, 5, 1, 0, 30, 0).unwrap();
    let overcast = scene("overcast", when, [STEADY; 4])
        .with_mask(Some(vec![true, true, true, false]))
        .unwrap();
    let run = kernel.process_acquisition(&overcast, None).unwrap();
    assert!(run
        .events
        .iter()
        .any(|e| e.topic == "COVER.COVERAGE" && e.severity == Severity::Warning));
}

#[test]
fn test_recalibration_swaps_set_and_keeps_compatible_history() {
    let mut kernel = calibrated_kernel();
    let before = kernel.endmembers().unwrap();
    let when = Utc.with_ymd_and_hms(2014, 5, 1, 0, 30, 0).unwrap();
    let acq = scene("s0", when, [STEADY; 4]);
    let first = kernel.process_acquisition(&acq, None).unwrap();
    assert_eq!(first.fingerprint, before.fingerprint());

    // same classes, one swapped member: history survives
    let swapped = library().subset(&[3, 1, 2], 1e-10).unwrap();
    kernel.install(swapped);
    let after = kernel.endmembers().unwrap();
    assert_ne!(after.fingerprint(), before.fingerprint());
    assert_eq!(kernel.ranker().unwrap().history(PixelKey::new(0, 0)).map(|h| h.len()), Some(1));
    // the old Arc is still usable by whoever holds it
    assert_eq!(before.len(), 3);

    // a set with different classes resets the ranker
    let two = library().subset(&[0, 1], 1e-10).unwrap();
    kernel.install(two);
    assert_eq!(kernel.ranker().unwrap().location_count(), 0);
}

#[test]
fn test_process_latest_and_truncate() {
    let mut kernel = calibrated_kernel();
    let base = Utc.with_ymd_and_hms(2014, 5, 1, 0, 30, 0).unwrap();
    let scenes = vec![
        scene("old", base, [STEADY; 4]),
        scene("new", base + Duration::days(16), [STEADY; 4]),
    ];
    let run = kernel.process_latest(&scenes, None).unwrap();
    assert_eq!(run.scene_id, "new");
    assert_eq!(kernel.truncate_history(base + Duration::days(17)), 4);
    assert!(kernel.process_latest(&[], None).is_err());
}

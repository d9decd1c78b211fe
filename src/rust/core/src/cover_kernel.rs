// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//
// CoverKernel: fractional cover orchestrator
//

// ============================================================================
// CoverKernel
// ============================================================================
// Calibration: match field sites to imagery, then select endmembers.
// Per acquisition: unmix, update the per-pixel ranker, summarize a region.
// The active EndmemberSet is shared read-only and replaced wholesale on
// recalibration.
// ============================================================================

use crate::error::{CoverError, Result};
use crate::optimization::{Calibration, EndmemberOptimizer, OptimizerConfig};
use crate::science::{
    latest_acquisition, FractionImage, MatchConfig, PixelCounts, RankFlag, RankerConfig, ReflectanceMatcher, RegionSummarizer,
    RegionSummary, TimeSeriesRanker, UnmixConfig, UnmixingEngine,
};
use crate::spectra::{EndmemberLibrary, EndmemberSet};
use crate::survey::{FieldSite, ImageAcquisition, Polygon, SurveyConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Valid-pixel share below which a run raises a coverage warning.
const LOW_COVERAGE: f64 = 0.5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub matching: MatchConfig,
    pub unmixing: UnmixConfig,
    pub optimization: OptimizerConfig,
    pub ranking: RankerConfig,
    pub survey: SurveyConfig,
}

impl CoverConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoverError::io(path, e))?;
        Self::from_json_str(&text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Audit record attached to a run, for the dashboard and operators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub topic: String,
    pub message: String,
    pub severity: Severity,
}

impl RunEvent {
    fn new(topic: &str, message: String, severity: Severity) -> Self {
        RunEvent {
            topic: topic.to_string(),
            message,
            severity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalibrationRun {
    pub calibration: Calibration,
    pub fingerprint: String,
    pub sites: usize,
    pub matched: usize,
    /// `(site_id, reason)` for sites without a usable image.
    pub not_found: Vec<(String, String)>,
    pub events: Vec<RunEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AcquisitionRun {
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    /// Fingerprint of the endmember set the scene was unmixed with.
    pub fingerprint: String,
    pub counts: PixelCounts,
    pub flags: Vec<RankFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RegionSummary>,
    pub events: Vec<RunEvent>,
}

pub struct CoverKernel {
    config: CoverConfig,
    endmembers: Option<Arc<EndmemberSet>>,
    ranker: Option<TimeSeriesRanker>,
}

impl CoverKernel {
    pub fn new(config: CoverConfig) -> Self {
        CoverKernel {
            config,
            endmembers: None,
            ranker: None,
        }
    }

    pub fn with_endmembers(config: CoverConfig, endmembers: EndmemberSet) -> Self {
        let mut kernel = Self::new(config);
        kernel.install(endmembers);
        kernel
    }

    pub fn config(&self) -> &CoverConfig {
        &self.config
    }

    pub fn engine(&self) -> UnmixingEngine {
        UnmixingEngine::new(self.config.unmixing.clone())
    }

    pub fn endmembers(&self) -> Option<Arc<EndmemberSet>> {
        self.endmembers.clone()
    }

    pub fn ranker(&self) -> Option<&TimeSeriesRanker> {
        self.ranker.as_ref()
    }

    fn active(&self) -> Result<Arc<EndmemberSet>> {
        self.endmembers
            .clone()
            .ok_or_else(|| CoverError::InvalidInput("no endmember set installed".into()))
    }

    /// Swap in a new endmember set. Ranker history survives only if the
    /// class layout is unchanged.
    pub fn install(&mut self, endmembers: EndmemberSet) {
        let layout = endmembers.class_layout();
        let keep_history = self.ranker.as_ref().is_some_and(|r| r.layout() == &layout);
        if !keep_history {
            if self.ranker.is_some() {
                warn!("endmember class layout changed, ranker history reset");
            }
            self.ranker = Some(TimeSeriesRanker::new(self.config.ranking.clone(), layout));
        }
        info!(
            fingerprint = endmembers.fingerprint().as_str(),
            endmembers = ?endmembers.names(),
            "installed endmember set"
        );
        self.endmembers = Some(Arc::new(endmembers));
    }

    /// Match sites, select endmembers, install them.
    ///
    /// # Errors
    /// `InsufficientSamples` is fatal: nothing is installed.
    pub fn calibrate(
        &mut self,
        sites: &[FieldSite],
        scenes: &[ImageAcquisition],
        library: &EndmemberLibrary,
    ) -> Result<CalibrationRun> {
        let matcher = ReflectanceMatcher::new(self.config.matching.clone());
        let report = matcher.match_all(sites, scenes);

        let optimizer = EndmemberOptimizer::new(self.config.optimization.clone(), self.engine());
        let calibration = optimizer.optimize(&report.matched, library)?;

        let mut events = Vec::new();
        if !report.not_found.is_empty() {
            events.push(RunEvent::new(
                "CALIBRATION.MATCHING",
                format!("{} of {} sites had no usable image", report.not_found.len(), sites.len()),
                Severity::Warning,
            ));
        }
        if calibration.report.samples_excluded > 0 {
            events.push(RunEvent::new(
                "CALIBRATION.SAMPLES",
                format!("{} matched samples excluded", calibration.report.samples_excluded),
                Severity::Warning,
            ));
        }
        events.push(RunEvent::new(
            "CALIBRATION.ERROR",
            format!(
                "{:?} {:.4} over {} samples, {} subsets evaluated",
                calibration.report.metric,
                calibration.report.aggregate_error,
                calibration.report.samples_used,
                calibration.report.subsets_evaluated
            ),
            Severity::Info,
        ));

        let fingerprint = calibration.endmembers.fingerprint();
        self.install(calibration.endmembers.clone());
        info!(
            sites = sites.len(),
            matched = report.matched.len(),
            error = calibration.report.aggregate_error,
            "calibration run complete"
        );

        Ok(CalibrationRun {
            calibration,
            fingerprint,
            sites: sites.len(),
            matched: report.matched.len(),
            not_found: report.not_found,
            events,
        })
    }

    /// Unmix a scene with the active set. Does not touch ranker history.
    pub fn unmix_scene(&self, acquisition: &ImageAcquisition) -> Result<FractionImage> {
        let endmembers = self.active()?;
        self.engine().unmix_scene(acquisition, &endmembers)
    }

    pub fn summarize(&self, image: &FractionImage, polygon: &Polygon) -> Result<RegionSummary> {
        let endmembers = self.active()?;
        Ok(RegionSummarizer::new(endmembers.class_layout()).summarize_polygon(image, polygon))
    }

    /// Unmix, rank and optionally summarize one acquisition.
    pub fn process_acquisition(
        &mut self,
        acquisition: &ImageAcquisition,
        polygon: Option<&Polygon>,
    ) -> Result<AcquisitionRun> {
        let endmembers = self.active()?;
        let image = self.engine().unmix_scene(acquisition, &endmembers)?;
        let ranker = self
            .ranker
            .as_mut()
            .ok_or_else(|| CoverError::InvalidInput("ranker not initialised".into()))?;
        let flags = ranker.ingest_image(&image)?;
        let summary = polygon
            .map(|p| RegionSummarizer::new(endmembers.class_layout()).summarize_polygon(&image, p));

        let mut events = Vec::new();
        let total = image.pixels.len().max(1);
        let coverage = image.counts.valid as f64 / total as f64;
        if coverage < LOW_COVERAGE {
            events.push(RunEvent::new(
                "COVER.COVERAGE",
                format!(
                    "only {:.0}% of pixels unmixed ({} masked, {} singular, {} transform)",
                    coverage * 100.0,
                    image.counts.masked,
                    image.counts.singular,
                    image.counts.transform
                ),
                Severity::Warning,
            ));
        }
        let anomalies = flags.iter().filter(|f| f.anomaly).count();
        if anomalies > 0 {
            events.push(RunEvent::new(
                "COVER.ANOMALY",
                format!("{anomalies} class values outside the historical decile range"),
                Severity::Info,
            ));
        }

        info!(
            scene = acquisition.scene_id(),
            valid = image.counts.valid,
            flags = flags.len(),
            anomalies,
            "processed acquisition"
        );

        Ok(AcquisitionRun {
            scene_id: image.scene_id.clone(),
            acquired: image.acquired,
            fingerprint: endmembers.fingerprint(),
            counts: image.counts,
            flags,
            summary,
            events,
        })
    }

    /// Process the newest of `scenes`.
    pub fn process_latest(
        &mut self,
        scenes: &[ImageAcquisition],
        polygon: Option<&Polygon>,
    ) -> Result<AcquisitionRun> {
        let latest = latest_acquisition(scenes)
            .ok_or_else(|| CoverError::InvalidInput("no acquisitions supplied".into()))?;
        self.process_acquisition(latest, polygon)
    }

    /// Explicit windowing of ranker history.
    pub fn truncate_history(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.ranker
            .as_mut()
            .map_or(0, |r| r.truncate_before(cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::SearchStrategy;
    use crate::survey::loader::CoverUnits;

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config = CoverConfig::from_json_str(
            r#"{
                "matching": {"max_time_window_days": 8},
                "optimization": {"strategy": {"kind": "greedy"}, "metric": "mae"},
                "survey": {"units": "percent"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.matching.max_time_window_days, 8.0);
        assert_eq!(config.matching.time_tolerance_secs, 0);
        assert_eq!(config.optimization.strategy, SearchStrategy::Greedy);
        assert_eq!(config.optimization.exhaustive_limit, 50_000);
        assert_eq!(config.ranking.min_history, 10);
        assert_eq!(config.survey.units, CoverUnits::Percent);
        assert_eq!(config.survey.sum_tolerance, 0.05);
        assert_eq!(config.unmixing.singular_tolerance, 1e-10);

        assert_eq!(CoverConfig::from_json_str("{}").unwrap(), CoverConfig::default());
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.json");
        std::fs::write(&path, r#"{"ranking": {"min_history": 4, "anomaly_threshold": 0.05}}"#).unwrap();
        let config = CoverConfig::from_json_file(&path).unwrap();
        assert_eq!(config.ranking.min_history, 4);
        assert!(matches!(
            CoverConfig::from_json_file(dir.path().join("missing.json")),
            Err(CoverError::Io { .. })
        ));
    }

    #[test]
    fn test_requires_endmembers() {
        let kernel = CoverKernel::new(CoverConfig::default());
        assert!(kernel.endmembers().is_none());
        let err = kernel.active().unwrap_err();
        assert!(matches!(err, CoverError::InvalidInput(_)));
    }
}

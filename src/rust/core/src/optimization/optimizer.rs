// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Endmember Calibration
//!
//! Picks the subset of a candidate library whose unmixing best reproduces the
//! field-measured cover at matched sites.

use super::scoring::{ErrorMetric, ScoringContext};
use super::search::{best_of, SearchStrategy};
use crate::error::{CoverError, Result};
use crate::science::{MatchedObservation, UnmixingEngine};
use crate::spectra::{EndmemberLibrary, EndmemberSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Smallest subset tried. `None`: number of field classes.
    pub min_endmembers: Option<usize>,
    /// Largest subset tried. `None`: number of field classes.
    pub max_endmembers: Option<usize>,
    pub metric: ErrorMetric,
    pub strategy: SearchStrategy,
    /// `Auto` searches exhaustively up to this many subsets.
    pub exhaustive_limit: u64,
    /// Aggregate errors closer than this are ties.
    pub tie_epsilon: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            min_endmembers: None,
            max_endmembers: None,
            metric: ErrorMetric::Rmse,
            strategy: SearchStrategy::Auto,
            exhaustive_limit: 50_000,
            tie_epsilon: 1e-12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub metric: ErrorMetric,
    pub aggregate_error: f64,
    pub rmse: f64,
    pub mae: f64,
    pub classes: Vec<String>,
    pub per_class_rmse: Vec<f64>,
    pub max_class_error: f64,
    pub selected: Vec<String>,
    pub samples_used: usize,
    pub samples_excluded: usize,
    pub subsets_evaluated: usize,
    pub subsets_rejected: usize,
    pub strategy: String,
}

/// A calibrated endmember set and how well it fits the field data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Calibration {
    pub endmembers: EndmemberSet,
    pub report: CalibrationReport,
}

#[derive(Clone, Debug, Default)]
pub struct EndmemberOptimizer {
    config: OptimizerConfig,
    engine: UnmixingEngine,
}

impl EndmemberOptimizer {
    pub fn new(config: OptimizerConfig, engine: UnmixingEngine) -> Self {
        EndmemberOptimizer { config, engine }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// # Errors
    /// - `InsufficientSamples` with fewer than `max_endmembers + 1` valid
    ///   samples; raised before any subset is scored
    /// - `InvalidInput` if the size range is empty for this library
    /// - `SingularSystem` if no subset is admissible
    pub fn optimize(
        &self,
        samples: &[MatchedObservation],
        library: &EndmemberLibrary,
    ) -> Result<Calibration> {
        let ctx = ScoringContext::new(samples, library, self.engine.clone(), self.config.metric);
        for (site, reason) in &ctx.excluded {
            warn!(site = site.as_str(), %reason, "sample excluded from calibration");
        }

        let n_classes = ctx.classes.len().max(1);
        let cap = (library.feature_dim() + 1).min(library.len());
        let lo = self.config.min_endmembers.unwrap_or(n_classes).max(1);
        let hi = self.config.max_endmembers.unwrap_or(n_classes).max(lo).min(cap);
        if lo > hi {
            return Err(CoverError::InvalidInput(format!(
                "cannot select {lo} endmembers from {} candidates in {} features",
                library.len(),
                library.feature_dim()
            )));
        }

        let required = hi + 1;
        if ctx.samples.len() < required {
            return Err(CoverError::InsufficientSamples {
                required,
                available: ctx.samples.len(),
            });
        }

        let sizes = lo..=hi;
        let search = self.config.strategy.resolve(
            library.len(),
            &sizes,
            self.config.exhaustive_limit,
            self.config.tie_epsilon,
        );
        info!(
            strategy = search.name(),
            candidates = library.len(),
            min = lo,
            max = hi,
            samples = ctx.samples.len(),
            "searching endmember subsets"
        );

        let outcome = search.search(&ctx, sizes);
        let best = best_of(&outcome, self.config.tie_epsilon).ok_or_else(|| {
            CoverError::SingularSystem(format!(
                "none of {} subsets was admissible",
                outcome.evaluated
            ))
        })?;

        let endmembers = library.subset(&best.indices, self.engine.config().singular_tolerance)?;
        let report = CalibrationReport {
            metric: self.config.metric,
            aggregate_error: best.aggregate_error,
            rmse: best.rmse,
            mae: best.mae,
            classes: ctx.classes.clone(),
            per_class_rmse: best.per_class_rmse.clone(),
            max_class_error: best.max_class_error,
            selected: endmembers.names().into_iter().map(str::to_string).collect(),
            samples_used: ctx.samples.len(),
            samples_excluded: ctx.excluded.len(),
            subsets_evaluated: outcome.evaluated,
            subsets_rejected: outcome.rejected,
            strategy: search.name().to_string(),
        };
        info!(
            selected = ?report.selected,
            error = report.aggregate_error,
            evaluated = report.subsets_evaluated,
            rejected = report.subsets_rejected,
            "calibration selected endmember set"
        );

        Ok(Calibration { endmembers, report })
    }
}

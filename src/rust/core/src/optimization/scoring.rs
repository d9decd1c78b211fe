// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Subset scoring for endmember selection.
//!
//! `score_subset` is a pure function of candidate indices and an immutable
//! `ScoringContext`. Search strategies only decide which subsets to ask for.

use crate::error::{CoverError, Result};
use crate::formulas::{mae, rmse};
use crate::science::{MatchedObservation, UnmixingEngine};
use crate::spectra::EndmemberLibrary;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
    #[default]
    Rmse,
    Mae,
}

impl ErrorMetric {
    pub fn apply(&self, residuals: &[f64]) -> f64 {
        match self {
            ErrorMetric::Rmse => rmse(residuals),
            ErrorMetric::Mae => mae(residuals),
        }
    }
}

/// A matched sample ready for scoring: transformed features plus field truth
/// in context class order.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedSample {
    pub site_id: String,
    pub features: Vec<f64>,
    pub truth: Vec<f64>,
}

/// Everything `score_subset` reads. Built once per calibration run.
#[derive(Debug)]
pub struct ScoringContext<'a> {
    pub library: &'a EndmemberLibrary,
    pub engine: UnmixingEngine,
    pub metric: ErrorMetric,
    /// Field cover classes, first-appearance order over the samples.
    pub classes: Vec<String>,
    /// Field class slot fed by each candidate, if its class was surveyed.
    pub candidate_slot: Vec<Option<usize>>,
    pub samples: Vec<PreparedSample>,
    /// Site ids of samples dropped during preparation, with the reason.
    pub excluded: Vec<(String, String)>,
}

impl<'a> ScoringContext<'a> {
    /// Keep samples with one finite value per library band whose transform
    /// succeeds. Everything else is recorded in `excluded`.
    pub fn new(
        observations: &[MatchedObservation],
        library: &'a EndmemberLibrary,
        engine: UnmixingEngine,
        metric: ErrorMetric,
    ) -> Self {
        let mut classes: Vec<String> = Vec::new();
        for obs in observations {
            for class in obs.site.cover().classes() {
                if !classes.contains(class) {
                    classes.push(class.clone());
                }
            }
        }

        let mut samples = Vec::new();
        let mut excluded = Vec::new();
        for obs in observations {
            match prepare(obs, library, &classes) {
                Ok(sample) => samples.push(sample),
                Err(e) => excluded.push((obs.site.id().to_string(), e.to_string())),
            }
        }

        let candidate_slot = library
            .candidates()
            .iter()
            .map(|c| classes.iter().position(|k| k == c.class_name()))
            .collect();

        ScoringContext {
            library,
            engine,
            metric,
            classes,
            candidate_slot,
            samples,
            excluded,
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.library.len()
    }
}

fn prepare(obs: &MatchedObservation, library: &EndmemberLibrary, classes: &[String]) -> Result<PreparedSample> {
    if obs.band_names != library.band_names() {
        return Err(CoverError::InvalidInput(format!(
            "scene {} bands [{}] do not match library bands [{}]",
            obs.scene_id,
            obs.band_names.join(", "),
            library.band_names().join(", ")
        )));
    }
    if obs.reflectance.len() != library.band_names().len() {
        return Err(CoverError::InvalidInput(format!(
            "{} reflectance bands, library has {}",
            obs.reflectance.len(),
            library.band_names().len()
        )));
    }
    let features = library.transform().apply(&obs.reflectance)?;
    let cover = obs.site.cover();
    Ok(PreparedSample {
        site_id: obs.site.id().to_string(),
        features,
        truth: classes.iter().map(|c| cover.get(c).unwrap_or(0.0)).collect(),
    })
}

/// Errors of one admissible subset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsetScore {
    /// Candidate indices, ascending.
    pub indices: Vec<usize>,
    pub aggregate_error: f64,
    pub rmse: f64,
    pub mae: f64,
    /// RMSE per context class.
    pub per_class_rmse: Vec<f64>,
    pub max_class_error: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubsetOutcome {
    Scored(SubsetScore),
    Rejected { indices: Vec<usize>, reason: String },
}

/// Score one subset. Rejects singular subsets and subsets that leave any
/// sample without a valid unmixing.
pub fn score_subset(ctx: &ScoringContext, indices: &[usize]) -> SubsetOutcome {
    let mut indices = indices.to_vec();
    indices.sort_unstable();
    indices.dedup();

    let set = match ctx
        .library
        .subset(&indices, ctx.engine.config().singular_tolerance)
    {
        Ok(set) => set,
        Err(e) => {
            return SubsetOutcome::Rejected {
                indices,
                reason: e.to_string(),
            }
        }
    };

    let n_classes = ctx.classes.len();
    let mut residuals = Vec::with_capacity(ctx.samples.len() * n_classes);
    let mut per_class: Vec<Vec<f64>> = vec![Vec::with_capacity(ctx.samples.len()); n_classes];
    for sample in &ctx.samples {
        let fractions = match ctx.engine.unmix_features(&sample.features, &set) {
            Ok(f) => f,
            Err(e) => {
                return SubsetOutcome::Rejected {
                    indices,
                    reason: format!("site {}: {e}", sample.site_id),
                }
            }
        };
        let mut predicted = vec![0.0; n_classes];
        for (&candidate, f) in indices.iter().zip(&fractions.values) {
            if let Some(slot) = ctx.candidate_slot[candidate] {
                predicted[slot] += f;
            }
        }
        for (slot, (p, t)) in predicted.iter().zip(&sample.truth).enumerate() {
            residuals.push(p - t);
            per_class[slot].push(p - t);
        }
    }

    let per_class_rmse: Vec<f64> = per_class.iter().map(|r| rmse(r)).collect();
    SubsetOutcome::Scored(SubsetScore {
        aggregate_error: ctx.metric.apply(&residuals),
        rmse: rmse(&residuals),
        mae: mae(&residuals),
        max_class_error: per_class_rmse.iter().copied().fold(0.0, f64::max),
        per_class_rmse,
        indices,
    })
}

/// Score many subsets in parallel; results keep proposal order.
pub fn score_batch(ctx: &ScoringContext, subsets: &[Vec<usize>]) -> Vec<SubsetOutcome> {
    subsets.par_iter().map(|s| score_subset(ctx, s)).collect()
}

/// Selection order: aggregate error, then fewer endmembers, then lower
/// worst-class error, then smaller index list.
///
/// Errors tie when they fall in the same `epsilon`-wide bucket
/// (`floor(error / epsilon)`), which keeps the order transitive. Two errors
/// closer than `epsilon` on either side of a bucket edge do not tie.
/// A non-positive or non-finite `epsilon` compares errors exactly.
pub fn compare_scores(a: &SubsetScore, b: &SubsetScore, epsilon: f64) -> Ordering {
    let by_error = if epsilon.is_finite() && epsilon > 0.0 {
        let bucket = |e: f64| (e / epsilon).floor();
        bucket(a.aggregate_error).total_cmp(&bucket(b.aggregate_error))
    } else {
        a.aggregate_error.total_cmp(&b.aggregate_error)
    };
    by_error
        .then(a.indices.len().cmp(&b.indices.len()))
        .then(a.max_class_error.total_cmp(&b.max_class_error))
        .then_with(|| a.indices.cmp(&b.indices))
}

/// Sequential fold in the order given, so the winner never depends on
/// which worker finished first.
pub fn select_best<'s>(scores: impl IntoIterator<Item = &'s SubsetScore>, epsilon: f64) -> Option<&'s SubsetScore> {
    scores.into_iter().fold(None, |best, s| match best {
        Some(b) if compare_scores(s, b, epsilon) != Ordering::Less => Some(b),
        _ => Some(s),
    })
}

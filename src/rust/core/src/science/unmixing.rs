// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Fully Constrained Linear Unmixing
//!
//! Solves r ~ E f subject to sum(f) = 1 and f >= 0.
//!
//! Sum-to-one is enforced exactly at every iteration by eliminating the last
//! active fraction: f_k = 1 - sum(f_i), leaving the unconstrained problem
//! min |(E_i - e_k) f_i - (r - e_k)|, solved through SVD. While any
//! component is negative, the most negative class is pinned to zero and the
//! reduced system is re-solved.
//!
//! References:
//! - Heinz & Chang (2001): Fully constrained least squares linear spectral
//!   mixture analysis

use crate::error::{CoverError, Result};
use crate::formulas::rmse;
use crate::spectra::endmember::{difference_matrix, DEFAULT_SINGULAR_TOLERANCE};
use crate::spectra::{CoverFractions, EndmemberSet, FractionVector, InvalidReason, Reflectance};
use crate::survey::{ImageAcquisition, PixelKey, RasterGrid};
use chrono::{DateTime, Utc};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Negative components closer to zero than this are rounding noise.
const NEGATIVE_NOISE: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmixConfig {
    /// Reciprocal condition number below which a reduced system is singular.
    pub singular_tolerance: f64,
}

impl Default for UnmixConfig {
    fn default() -> Self {
        UnmixConfig {
            singular_tolerance: DEFAULT_SINGULAR_TOLERANCE,
        }
    }
}

/// Stateless per-pixel solver. Safe to share across threads.
#[derive(Clone, Debug, Default)]
pub struct UnmixingEngine {
    config: UnmixConfig,
}

impl UnmixingEngine {
    pub fn new(config: UnmixConfig) -> Self {
        UnmixingEngine { config }
    }

    pub fn config(&self) -> &UnmixConfig {
        &self.config
    }

    /// Unmix one pixel. Never fails: problems come back as `Invalid`.
    pub fn unmix(&self, reflectance: &Reflectance, endmembers: &EndmemberSet) -> FractionVector {
        if reflectance.band_count() != endmembers.band_count() {
            debug!(
                bands = reflectance.band_count(),
                expected = endmembers.band_count(),
                "reflectance band count does not match endmember set"
            );
            return FractionVector::invalid(InvalidReason::Masked);
        }
        let Some(values) = reflectance.values() else {
            return FractionVector::invalid(InvalidReason::Masked);
        };
        let features = match endmembers.transform().apply(&values) {
            Ok(f) => f,
            Err(_) => return FractionVector::invalid(InvalidReason::Transform),
        };
        match self.unmix_features(&features, endmembers) {
            Ok(fractions) => FractionVector::Valid(fractions),
            Err(_) => FractionVector::invalid(InvalidReason::Singular),
        }
    }

    /// As `unmix`, but with the failure cause as an error.
    ///
    /// # Errors
    /// - `InvalidInput`: band count mismatch, masked band, or transform failure
    /// - `SingularSystem`: the reduced system lost rank
    pub fn try_unmix(
        &self,
        reflectance: &Reflectance,
        endmembers: &EndmemberSet,
    ) -> Result<CoverFractions> {
        if reflectance.band_count() != endmembers.band_count() {
            return Err(CoverError::InvalidInput(format!(
                "reflectance has {} bands, endmember set expects {}",
                reflectance.band_count(),
                endmembers.band_count()
            )));
        }
        let values = reflectance
            .values()
            .ok_or_else(|| CoverError::InvalidInput("reflectance has a masked band".into()))?;
        let features = endmembers.transform().apply(&values)?;
        self.unmix_features(&features, endmembers)
    }

    /// FCLS on an already transformed feature vector.
    pub fn unmix_features(&self, features: &[f64], endmembers: &EndmemberSet) -> Result<CoverFractions> {
        if features.len() != endmembers.feature_dim() {
            return Err(CoverError::InvalidInput(format!(
                "{} features, endmember set has {}",
                features.len(),
                endmembers.feature_dim()
            )));
        }
        let signatures: Vec<&[f64]> = endmembers
            .endmembers()
            .iter()
            .map(|e| e.signature.as_slice())
            .collect();
        let values = fcls(features, &signatures, self.config.singular_tolerance)?;

        let residuals: Vec<f64> = features
            .iter()
            .enumerate()
            .map(|(b, r)| {
                let modelled: f64 = signatures.iter().zip(&values).map(|(s, f)| s[b] * f).sum();
                r - modelled
            })
            .collect();

        Ok(CoverFractions {
            residual_rmse: rmse(&residuals),
            values,
        })
    }

    /// Unmix every pixel of a scene in parallel.
    ///
    /// # Errors
    /// `InvalidInput` if the scene's bands are not the set's bands in order.
    pub fn unmix_scene(
        &self,
        acquisition: &ImageAcquisition,
        endmembers: &EndmemberSet,
    ) -> Result<FractionImage> {
        if acquisition.band_names() != endmembers.band_names() {
            return Err(CoverError::InvalidInput(format!(
                "scene {} bands [{}] do not match endmember bands [{}]",
                acquisition.scene_id(),
                acquisition.band_names().join(", "),
                endmembers.band_names().join(", ")
            )));
        }
        let grid = *acquisition.grid();
        let pixels: Vec<FractionVector> = (0..grid.pixel_count())
            .into_par_iter()
            .map(|i| self.unmix(&acquisition.reflectance_at(grid.key(i)), endmembers))
            .collect();

        let counts = PixelCounts::tally(&pixels);
        info!(
            scene = acquisition.scene_id(),
            valid = counts.valid,
            masked = counts.masked,
            singular = counts.singular,
            transform = counts.transform,
            "unmixed scene"
        );

        Ok(FractionImage {
            scene_id: acquisition.scene_id().to_string(),
            acquired: acquisition.acquired(),
            grid,
            endmembers: endmembers.names().into_iter().map(str::to_string).collect(),
            pixels,
            counts,
        })
    }
}

/// Active-set FCLS over `signatures` (one slice per endmember).
fn fcls(features: &[f64], signatures: &[&[f64]], tolerance: f64) -> Result<Vec<f64>> {
    let k = signatures.len();
    let mut active: Vec<usize> = (0..k).collect();

    let solved = loop {
        let Some(&last) = active.last() else {
            return Err(CoverError::SingularSystem("no class survived".into()));
        };
        if active.len() == 1 {
            break vec![1.0];
        }

        let reduced: Vec<&[f64]> = active.iter().map(|&i| signatures[i]).collect();
        let a = difference_matrix(&reduced);
        if a.nrows() < a.ncols() {
            return Err(CoverError::SingularSystem(format!(
                "{} classes in {} features",
                active.len(),
                features.len()
            )));
        }
        let svd = a.svd(true, true);
        let (smax, smin) = (svd.singular_values.max(), svd.singular_values.min());
        if !(smax.is_finite() && smax > 0.0) || smin / smax < tolerance {
            return Err(CoverError::SingularSystem(format!(
                "reduced system over {} classes has reciprocal condition {:.3e}",
                active.len(),
                if smax > 0.0 { smin / smax } else { 0.0 }
            )));
        }

        let e_last = signatures[last];
        let y = DVector::from_iterator(
            features.len(),
            features.iter().zip(e_last).map(|(r, e)| r - e),
        );
        let x = svd
            .solve(&y, smax * tolerance)
            .map_err(|e| CoverError::SingularSystem(e.to_string()))?;

        let mut trial: Vec<f64> = x.iter().copied().collect();
        trial.push(1.0 - trial.iter().sum::<f64>());

        let (worst, min) = trial
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        if min < -NEGATIVE_NOISE {
            active.remove(worst);
            continue;
        }
        break trial;
    };

    let mut values = vec![0.0; k];
    for (&slot, f) in active.iter().zip(solved) {
        values[slot] = f.max(0.0);
    }
    let total: f64 = values.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(CoverError::SingularSystem("degenerate solution".into()));
    }
    values.iter_mut().for_each(|v| *v /= total);
    Ok(values)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCounts {
    pub valid: usize,
    pub masked: usize,
    pub singular: usize,
    pub transform: usize,
}

impl PixelCounts {
    pub fn tally<'a>(pixels: impl IntoIterator<Item = &'a FractionVector>) -> Self {
        let mut c = PixelCounts::default();
        for p in pixels {
            match p.invalid_reason() {
                None => c.valid += 1,
                Some(InvalidReason::Masked) => c.masked += 1,
                Some(InvalidReason::Singular) => c.singular += 1,
                Some(InvalidReason::Transform) => c.transform += 1,
            }
        }
        c
    }

    pub fn invalid(&self) -> usize {
        self.masked + self.singular + self.transform
    }
}

/// Per-pixel fractions for one scene, row-major over `grid`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FractionImage {
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    pub grid: RasterGrid,
    /// Endmember names, in fraction order.
    pub endmembers: Vec<String>,
    pub pixels: Vec<FractionVector>,
    pub counts: PixelCounts,
}

impl FractionImage {
    pub fn get(&self, key: PixelKey) -> Option<&FractionVector> {
        if key.row as usize >= self.grid.rows || key.col as usize >= self.grid.cols {
            return None;
        }
        self.pixels.get(self.grid.index(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PixelKey, &FractionVector)> + '_ {
        self.pixels
            .iter()
            .enumerate()
            .map(|(i, f)| (self.grid.key(i), f))
    }
}

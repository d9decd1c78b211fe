// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Band-space transforms applied before unmixing.
//!
//! The interactive-terms expansion turns six MODIS nadir BRDF-adjusted
//! bands into 78 features: band products, band x log-band products,
//! log-band products, the raw and logged bands and a constant. Unmixing in the
//! expanded space captures the non-linear mixing between soil and the two
//! vegetation classes while keeping the solver linear.

use crate::error::{CoverError, Result};
use serde::{Deserialize, Serialize};

/// Constant feature appended to interactive-term vectors. It acts as a soft
/// sum-to-one band in the calibrated endmembers.
pub const INTERACTIVE_CONSTANT: f64 = 0.25;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpectralTransform {
    /// Unmix raw band reflectance.
    #[default]
    Identity,
    /// Products, log products, raw, logged and constant terms.
    ///
    /// `omit_log_pairs` lists (i, j) band pairs, i < j, whose log x log
    /// product is left out. The calibrated MODIS set omits (2, 5).
    InteractiveTerms {
        #[serde(default)]
        omit_log_pairs: Vec<(usize, usize)>,
    },
}

impl SpectralTransform {
    /// Layout used by the built-in MODIS endmembers
    /// (bands B4, B1, B2, B5, B6, B7).
    pub fn modis_interactive() -> Self {
        SpectralTransform::InteractiveTerms {
            omit_log_pairs: vec![(2, 5)],
        }
    }

    /// Feature count produced for `bands` input bands.
    pub fn output_dim(&self, bands: usize) -> usize {
        match self {
            SpectralTransform::Identity => bands,
            SpectralTransform::InteractiveTerms { omit_log_pairs } => {
                interactive_dim(bands, omit_log_pairs)
            }
        }
    }

    /// Apply the transform to a complete reflectance vector.
    ///
    /// # Errors
    /// `InvalidInput` if a value is non-finite, or if the interactive terms
    /// need the log of a non-positive reflectance.
    pub fn apply(&self, bands: &[f64]) -> Result<Vec<f64>> {
        if let Some(bad) = bands.iter().position(|v| !v.is_finite()) {
            return Err(CoverError::InvalidInput(format!(
                "band {bad} is not finite"
            )));
        }
        match self {
            SpectralTransform::Identity => Ok(bands.to_vec()),
            SpectralTransform::InteractiveTerms { omit_log_pairs } => {
                interactive_terms(bands, omit_log_pairs)
            }
        }
    }
}

fn interactive_dim(n: usize, omit_log_pairs: &[(usize, usize)]) -> usize {
    let pairs = n * n.saturating_sub(1) / 2;
    let omitted = omit_log_pairs
        .iter()
        .filter(|(i, j)| i < j && *j < n)
        .count();
    pairs + n * n + (pairs - omitted) + 2 * n + 1
}

fn interactive_terms(bands: &[f64], omit_log_pairs: &[(usize, usize)]) -> Result<Vec<f64>> {
    if let Some(bad) = bands.iter().position(|v| *v <= 0.0) {
        return Err(CoverError::InvalidInput(format!(
            "band {bad} is non-positive, cannot take log"
        )));
    }
    let n = bands.len();
    let logs: Vec<f64> = bands.iter().map(|v| v.ln()).collect();
    let mut out = Vec::with_capacity(interactive_dim(n, omit_log_pairs));

    // Band products, each band followed by its product with every log band
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(bands[i] * bands[j]);
        }
        out.extend(logs.iter().map(|l| bands[i] * l));
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if !omit_log_pairs.contains(&(i, j)) {
                out.push(logs[i] * logs[j]);
            }
        }
    }

    out.extend_from_slice(bands);
    out.extend_from_slice(&logs);
    out.push(INTERACTIVE_CONSTANT);
    Ok(out)
}

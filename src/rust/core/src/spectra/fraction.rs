// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Per-pixel unmixing output.

use serde::{Deserialize, Serialize};

/// Tolerance used when checking that fractions sum to one.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Why a pixel carries no fractions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Cloud, no-data or missing band in the input reflectance.
    Masked,
    /// Mixing matrix singular, or no class survived the active-set reduction.
    Singular,
    /// Band transform undefined for this pixel (log of a non-positive value).
    Transform,
}

/// Fractions for each endmember, in endmember-set order.
///
/// Components are non-negative and sum to one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoverFractions {
    pub values: Vec<f64>,
    /// RMS misfit between the observed and the modelled reflectance.
    pub residual_rmse: f64,
}

impl CoverFractions {
    /// Sum fractions of endmembers that share a cover class.
    /// `component_class[i]` is the class slot of endmember `i`.
    pub fn by_class(&self, component_class: &[usize], class_count: usize) -> Vec<f64> {
        let mut out = vec![0.0; class_count];
        for (value, &slot) in self.values.iter().zip(component_class) {
            if let Some(acc) = out.get_mut(slot) {
                *acc += value;
            }
        }
        out
    }

    pub fn is_simplex(&self) -> bool {
        let sum: f64 = self.values.iter().sum();
        self.values.iter().all(|v| *v >= 0.0) && (sum - 1.0).abs() <= SUM_TOLERANCE
    }
}

/// Unmixing result for one pixel: fractions, or an explicit invalid marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FractionVector {
    Valid(CoverFractions),
    Invalid { reason: InvalidReason },
}

impl FractionVector {
    pub fn invalid(reason: InvalidReason) -> Self {
        FractionVector::Invalid { reason }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, FractionVector::Valid(_))
    }

    pub fn fractions(&self) -> Option<&CoverFractions> {
        match self {
            FractionVector::Valid(f) => Some(f),
            FractionVector::Invalid { .. } => None,
        }
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            FractionVector::Valid(_) => None,
            FractionVector::Invalid { reason } => Some(*reason),
        }
    }
}

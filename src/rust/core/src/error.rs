// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Error taxonomy for calibration and unmixing.
//!
//! `NotFound` and `SingularSystem` are recoverable at the per-site and
//! per-pixel level: callers exclude and count them. `InsufficientSamples`
//! aborts a calibration run.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoverError>;

#[derive(Debug, Error)]
pub enum CoverError {
    /// No unmasked acquisition within the time window for a field site.
    #[error("no match for site {site}: {reason}")]
    NotFound { site: String, reason: String },

    /// Too few valid matched samples to calibrate the requested endmember count.
    #[error("insufficient samples: need at least {required}, have {available}")]
    InsufficientSamples { required: usize, available: usize },

    /// Mixing matrix not invertible for a subset or pixel.
    #[error("singular mixing system: {0}")]
    SingularSystem(String),

    /// Masked, missing or malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl CoverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoverError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that exclude a single sample or pixel but must not
    /// abort a batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoverError::NotFound { .. } | CoverError::SingularSystem(_) | CoverError::InvalidInput(_)
        )
    }
}

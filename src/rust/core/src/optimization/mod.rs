// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
pub mod optimizer;
pub mod scoring;
pub mod search;

pub use optimizer::{Calibration, CalibrationReport, EndmemberOptimizer, OptimizerConfig};
pub use scoring::{score_subset, ErrorMetric, ScoringContext, SubsetOutcome, SubsetScore};
pub use search::{ExhaustiveSearch, GreedySearch, MonteCarloSearch, SearchStrategy, SubsetSearch};

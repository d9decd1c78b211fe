// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//
// FCOVER: Fractional Ground Cover Core
// Field calibration, constrained spectral unmixing, decile anomaly ranking
//

pub mod bridge;
pub mod cover_kernel;
pub mod error;
pub mod formulas;
pub mod optimization;
pub mod science;
pub mod spectra; // endmembers, reflectance, fractions
pub mod survey;
#[cfg(test)]
mod tests_pipeline;

// Re-export core types
pub use bridge::CoverBridge;
pub use cover_kernel::{AcquisitionRun, CalibrationRun, CoverConfig, CoverKernel, RunEvent, Severity};
pub use error::{CoverError, Result};
pub use optimization::{Calibration, CalibrationReport, EndmemberOptimizer, OptimizerConfig, SearchStrategy};
pub use science::{
    FractionImage, MatchedObservation, RankFlag, ReflectanceMatcher, RegionSummarizer, RegionSummary,
    TimeSeriesRanker, UnmixingEngine,
};
pub use spectra::{Endmember, EndmemberLibrary, EndmemberSet, FractionVector, Reflectance};
pub use survey::{FieldSite, GeoPoint, ImageAcquisition, PixelKey, Polygon, RasterGrid};

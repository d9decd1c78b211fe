// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT

pub mod calibrated;
pub mod endmember;
pub mod fraction;
pub mod reflectance;
pub mod transform;

pub use endmember::{ClassLayout, Endmember, EndmemberLibrary, EndmemberSet};
pub use fraction::{CoverFractions, FractionVector, InvalidReason};
pub use reflectance::Reflectance;
pub use transform::SpectralTransform;

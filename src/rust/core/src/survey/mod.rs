// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Field observations, image acquisitions and the geometry tying them together.

pub mod acquisition;
pub mod geometry;
pub mod loader;
pub mod site;

pub use acquisition::{ImageAcquisition, PixelKey, RasterGrid};
pub use geometry::{BoundingBox, GeoPoint, Polygon};
pub use loader::{CoverUnits, SiteTable, SkippedRow, SurveyConfig};
pub use site::{FieldCover, FieldSite};

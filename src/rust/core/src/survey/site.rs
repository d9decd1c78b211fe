// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
use super::geometry::GeoPoint;
use crate::error::{CoverError, Result};
use crate::spectra::fraction::SUM_TOLERANCE;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Field-measured cover, one fraction per named class.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldCover {
    classes: Vec<String>,
    values: Vec<f64>,
}

impl FieldCover {
    /// # Errors
    /// `InvalidInput` unless every value is in [0, 1] and the values sum to 1.
    pub fn new(classes: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if classes.is_empty() || classes.len() != values.len() {
            return Err(CoverError::InvalidInput(format!(
                "{} classes for {} cover values",
                classes.len(),
                values.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = classes.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(CoverError::InvalidInput(format!("duplicate cover class '{dup}'")));
        }
        if let Some(v) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(CoverError::InvalidInput(format!(
                "cover fraction {v} outside [0, 1]"
            )));
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(CoverError::InvalidInput(format!(
                "cover fractions sum to {sum:.4}, expected 1"
            )));
        }
        Ok(FieldCover { classes, values })
    }

    /// Rescale values summing to within `tolerance` of one before validating.
    /// Field surveys record whole-percent cover, so rows rarely sum exactly.
    pub fn normalized(classes: Vec<String>, values: Vec<f64>, tolerance: f64) -> Result<Self> {
        let sum: f64 = values.iter().sum();
        if sum > 0.0 && (sum - 1.0).abs() <= tolerance {
            let scaled = values.iter().map(|v| (v / sum).clamp(0.0, 1.0)).collect();
            return FieldCover::new(classes, scaled);
        }
        FieldCover::new(classes, values)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, class: &str) -> Option<f64> {
        self.classes
            .iter()
            .position(|c| c == class)
            .map(|i| self.values[i])
    }
}

/// One ground-truth observation. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldSite {
    id: String,
    location: GeoPoint,
    observed: DateTime<Utc>,
    cover: FieldCover,
}

impl FieldSite {
    pub fn new(
        id: impl Into<String>,
        location: GeoPoint,
        observed: DateTime<Utc>,
        cover: FieldCover,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoverError::InvalidInput("field site without id".into()));
        }
        if !location.is_valid() {
            return Err(CoverError::InvalidInput(format!(
                "site {id} location ({}, {}) out of range",
                location.lat, location.lon
            )));
        }
        Ok(FieldSite {
            id,
            location,
            observed,
            cover,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn observed(&self) -> DateTime<Utc> {
        self.observed
    }

    pub fn cover(&self) -> &FieldCover {
        &self.cover
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn classes() -> Vec<String> {
        vec!["bare".into(), "green".into(), "dead".into()]
    }

    #[test]
    fn test_cover_must_sum_to_one() {
        assert!(FieldCover::new(classes(), vec![0.2, 0.3, 0.5]).is_ok());
        assert!(FieldCover::new(classes(), vec![0.2, 0.3, 0.4]).is_err());
        assert!(FieldCover::new(classes(), vec![1.2, -0.2, 0.0]).is_err());
    }

    #[test]
    fn test_normalized_within_tolerance() {
        let cover = FieldCover::normalized(classes(), vec![0.21, 0.30, 0.50], 0.05).unwrap();
        let sum: f64 = cover.values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(FieldCover::normalized(classes(), vec![0.1, 0.1, 0.1], 0.05).is_err());
    }

    #[test]
    fn test_site_validation() {
        let cover = FieldCover::new(classes(), vec![0.2, 0.3, 0.5]).unwrap();
        let when = Utc.with_ymd_and_hms(2012, 3, 10, 0, 0, 0).unwrap();
        let site = FieldSite::new("QLD-042", GeoPoint::new(-23.4, 144.2), when, cover.clone()).unwrap();
        assert_eq!(site.cover().get("green"), Some(0.3));

        assert!(FieldSite::new("bad", GeoPoint::new(-123.4, 144.2), when, cover).is_err());
    }
}

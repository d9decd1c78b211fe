// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Endmember signatures, validated endmember sets and candidate libraries.
//!
//! An `EndmemberSet` is produced once per calibration epoch and shared
//! read-only by every unmixing call until a new calibration replaces it
//! wholesale. Construction checks the structural invariants (one finite value
//! per feature, at most `features + 1` members) and the conditioning of the
//! mixing matrix, so a set that exists can always be inverted.

use super::transform::SpectralTransform;
use crate::error::{CoverError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Reciprocal condition number below which a mixing matrix is treated as
/// singular.
pub const DEFAULT_SINGULAR_TOLERANCE: f64 = 1e-10;

/// Reference signature of one pure cover class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endmember {
    pub name: String,
    /// Cover class this endmember contributes to. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub signature: Vec<f64>,
}

impl Endmember {
    pub fn new(name: impl Into<String>, signature: Vec<f64>) -> Self {
        Endmember {
            name: name.into(),
            class: None,
            signature,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn class_name(&self) -> &str {
        self.class.as_deref().unwrap_or(&self.name)
    }
}

/// Maps each endmember to a cover-class slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLayout {
    /// Distinct classes in first-appearance order.
    pub classes: Vec<String>,
    /// `component_class[i]` is the slot in `classes` of endmember `i`.
    pub component_class: Vec<usize>,
}

impl ClassLayout {
    pub fn from_endmembers(endmembers: &[Endmember]) -> Self {
        let mut classes: Vec<String> = Vec::new();
        let mut component_class = Vec::with_capacity(endmembers.len());
        for em in endmembers {
            let class = em.class_name();
            let slot = match classes.iter().position(|c| c == class) {
                Some(slot) => slot,
                None => {
                    classes.push(class.to_string());
                    classes.len() - 1
                }
            };
            component_class.push(slot);
        }
        ClassLayout {
            classes,
            component_class,
        }
    }

    pub fn slot(&self, class: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }
}

// ============================================================================
// LINEAR ALGEBRA HELPERS
// ============================================================================

/// Columns `e_i - e_last` for every endmember but the last. This is the
/// system left after eliminating the last fraction with the sum-to-one
/// constraint.
pub(crate) fn difference_matrix(signatures: &[&[f64]]) -> DMatrix<f64> {
    let k = signatures.len();
    let rows = signatures.first().map_or(0, |s| s.len());
    if k < 2 {
        return DMatrix::zeros(rows, 0);
    }
    let last = signatures[k - 1];
    DMatrix::from_fn(rows, k - 1, |r, c| signatures[c][r] - last[r])
}

/// sigma_min / sigma_max of `m`, or 0 for rank-deficient shapes.
/// An empty matrix is trivially well conditioned.
pub(crate) fn reciprocal_condition(m: &DMatrix<f64>) -> f64 {
    if m.ncols() == 0 {
        return 1.0;
    }
    if m.nrows() < m.ncols() {
        return 0.0;
    }
    let sv = m.clone().svd(false, false).singular_values;
    let max = sv.max();
    if !(max.is_finite() && max > 0.0) {
        return 0.0;
    }
    sv.min() / max
}

fn check_members(endmembers: &[Endmember], dim: usize) -> Result<()> {
    let mut seen = HashSet::new();
    for em in endmembers {
        if em.name.trim().is_empty() {
            return Err(CoverError::InvalidInput("endmember with empty name".into()));
        }
        if !seen.insert(em.name.as_str()) {
            return Err(CoverError::InvalidInput(format!(
                "duplicate endmember name '{}'",
                em.name
            )));
        }
        if em.signature.len() != dim {
            return Err(CoverError::InvalidInput(format!(
                "endmember '{}' has {} values, expected {}",
                em.name,
                em.signature.len(),
                dim
            )));
        }
        if em.signature.iter().any(|v| !v.is_finite()) {
            return Err(CoverError::InvalidInput(format!(
                "endmember '{}' has a non-finite value",
                em.name
            )));
        }
    }
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| CoverError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).map_err(|e| CoverError::io(path, e))
}

// ============================================================================
// ENDMEMBER SET
// ============================================================================

/// Ordered, validated set of endmembers with a fixed band ordering.
///
/// Persisted as JSON: `band_names`, `transform` and an ordered list of
/// `{name, class, signature}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EndmemberSetRecord")]
pub struct EndmemberSet {
    band_names: Vec<String>,
    transform: SpectralTransform,
    endmembers: Vec<Endmember>,
}

#[derive(Deserialize)]
struct EndmemberSetRecord {
    band_names: Vec<String>,
    #[serde(default)]
    transform: SpectralTransform,
    endmembers: Vec<Endmember>,
}

impl TryFrom<EndmemberSetRecord> for EndmemberSet {
    type Error = CoverError;

    fn try_from(record: EndmemberSetRecord) -> Result<Self> {
        EndmemberSet::new(record.band_names, record.transform, record.endmembers)
    }
}

impl EndmemberSet {
    pub fn new(
        band_names: Vec<String>,
        transform: SpectralTransform,
        endmembers: Vec<Endmember>,
    ) -> Result<Self> {
        Self::with_tolerance(band_names, transform, endmembers, DEFAULT_SINGULAR_TOLERANCE)
    }

    /// # Errors
    /// - `InvalidInput` for structural problems (no bands, no endmembers,
    ///   duplicate names, wrong signature length, more than `features + 1`
    ///   endmembers)
    /// - `SingularSystem` if the mixing matrix is not invertible within
    ///   `tolerance`
    pub fn with_tolerance(
        band_names: Vec<String>,
        transform: SpectralTransform,
        endmembers: Vec<Endmember>,
        tolerance: f64,
    ) -> Result<Self> {
        if band_names.is_empty() {
            return Err(CoverError::InvalidInput("endmember set has no bands".into()));
        }
        if endmembers.is_empty() {
            return Err(CoverError::InvalidInput("endmember set is empty".into()));
        }
        let dim = transform.output_dim(band_names.len());
        check_members(&endmembers, dim)?;
        if endmembers.len() > dim + 1 {
            return Err(CoverError::InvalidInput(format!(
                "{} endmembers exceed {} features + 1",
                endmembers.len(),
                dim
            )));
        }

        let signatures: Vec<&[f64]> = endmembers.iter().map(|e| e.signature.as_slice()).collect();
        let rcond = reciprocal_condition(&difference_matrix(&signatures));
        if rcond < tolerance {
            return Err(CoverError::SingularSystem(format!(
                "endmember set [{}] has reciprocal condition {rcond:.3e}",
                endmembers
                    .iter()
                    .map(|e| e.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(EndmemberSet {
            band_names,
            transform,
            endmembers,
        })
    }

    pub fn len(&self) -> usize {
        self.endmembers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endmembers.is_empty()
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn band_count(&self) -> usize {
        self.band_names.len()
    }

    /// Length of every signature (band count after the transform).
    pub fn feature_dim(&self) -> usize {
        self.transform.output_dim(self.band_names.len())
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    pub fn endmembers(&self) -> &[Endmember] {
        &self.endmembers
    }

    pub fn names(&self) -> Vec<&str> {
        self.endmembers.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn class_layout(&self) -> ClassLayout {
        ClassLayout::from_endmembers(&self.endmembers)
    }

    /// Mixing matrix, one column per endmember.
    pub fn matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.feature_dim(), self.len(), |r, c| {
            self.endmembers[c].signature[r]
        })
    }

    /// SHA-256 over bands, transform, names, classes and signatures.
    /// Changes whenever a recalibration changes the set.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for band in &self.band_names {
            hasher.update(band.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(format!("{:?}", self.transform).as_bytes());
        for em in &self.endmembers {
            hasher.update(em.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(em.class_name().as_bytes());
            hasher.update([0u8]);
            for v in &em.signature {
                hasher.update(v.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        read_json_file(path.as_ref())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_file(path.as_ref(), self)
    }
}

// ============================================================================
// CANDIDATE LIBRARY
// ============================================================================

/// Candidate endmembers searched by the optimizer. Unlike a set, a library
/// may hold more members than the band count allows and may be ill
/// conditioned as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EndmemberLibraryRecord")]
pub struct EndmemberLibrary {
    band_names: Vec<String>,
    transform: SpectralTransform,
    candidates: Vec<Endmember>,
}

#[derive(Deserialize)]
struct EndmemberLibraryRecord {
    band_names: Vec<String>,
    #[serde(default)]
    transform: SpectralTransform,
    candidates: Vec<Endmember>,
}

impl TryFrom<EndmemberLibraryRecord> for EndmemberLibrary {
    type Error = CoverError;

    fn try_from(record: EndmemberLibraryRecord) -> Result<Self> {
        EndmemberLibrary::new(record.band_names, record.transform, record.candidates)
    }
}

impl EndmemberLibrary {
    pub fn new(
        band_names: Vec<String>,
        transform: SpectralTransform,
        candidates: Vec<Endmember>,
    ) -> Result<Self> {
        if band_names.is_empty() {
            return Err(CoverError::InvalidInput("library has no bands".into()));
        }
        check_members(&candidates, transform.output_dim(band_names.len()))?;
        Ok(EndmemberLibrary {
            band_names,
            transform,
            candidates,
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    pub fn feature_dim(&self) -> usize {
        self.transform.output_dim(self.band_names.len())
    }

    pub fn candidates(&self) -> &[Endmember] {
        &self.candidates
    }

    /// Build a validated set from candidate indices (in the given order).
    pub fn subset(&self, indices: &[usize], tolerance: f64) -> Result<EndmemberSet> {
        let members = indices
            .iter()
            .map(|&i| {
                self.candidates.get(i).cloned().ok_or_else(|| {
                    CoverError::InvalidInput(format!("candidate index {i} out of range"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        EndmemberSet::with_tolerance(
            self.band_names.clone(),
            self.transform.clone(),
            members,
            tolerance,
        )
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        read_json_file(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> Vec<String> {
        vec!["red".into(), "nir".into(), "swir".into()]
    }

    fn scenario_set() -> EndmemberSet {
        EndmemberSet::new(
            bands(),
            SpectralTransform::Identity,
            vec![
                Endmember::new("soil", vec![0.3, 0.2, 0.1]),
                Endmember::new("green", vec![0.1, 0.4, 0.3]),
                Endmember::new("dry", vec![0.2, 0.1, 0.4]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_valid_set() {
        let set = scenario_set();
        assert_eq!(set.len(), 3);
        assert_eq!(set.feature_dim(), 3);
        assert_eq!(set.names(), vec!["soil", "green", "dry"]);
        let m = set.matrix();
        assert_eq!(m[(1, 0)], 0.2);
        assert_eq!(m[(2, 2)], 0.4);
    }

    #[test]
    fn test_rejects_collinear_members() {
        let err = EndmemberSet::new(
            bands(),
            SpectralTransform::Identity,
            vec![
                Endmember::new("a", vec![0.1, 0.2, 0.3]),
                Endmember::new("b", vec![0.2, 0.3, 0.4]),
                // midpoint of a and b: affinely dependent
                Endmember::new("c", vec![0.15, 0.25, 0.35]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, CoverError::SingularSystem(_)));
    }

    #[test]
    fn test_rejects_too_many_members() {
        let members = (0..5)
            .map(|i| Endmember::new(format!("e{i}"), vec![i as f64 * 0.1, 0.2, 0.3]))
            .collect();
        let err = EndmemberSet::new(bands(), SpectralTransform::Identity, members).unwrap_err();
        assert!(matches!(err, CoverError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_duplicate_and_short_signatures() {
        let dup = EndmemberSet::new(
            bands(),
            SpectralTransform::Identity,
            vec![
                Endmember::new("a", vec![0.1, 0.2, 0.3]),
                Endmember::new("a", vec![0.3, 0.2, 0.1]),
            ],
        );
        assert!(matches!(dup, Err(CoverError::InvalidInput(_))));

        let short = EndmemberSet::new(
            bands(),
            SpectralTransform::Identity,
            vec![Endmember::new("a", vec![0.1, 0.2])],
        );
        assert!(matches!(short, Err(CoverError::InvalidInput(_))));
    }

    #[test]
    fn test_class_layout_groups_members() {
        let layout = ClassLayout::from_endmembers(&[
            Endmember::new("soil_red", vec![]).with_class("bare"),
            Endmember::new("grass", vec![]).with_class("green"),
            Endmember::new("soil_grey", vec![]).with_class("bare"),
        ]);
        assert_eq!(layout.classes, vec!["bare", "green"]);
        assert_eq!(layout.component_class, vec![0, 1, 0]);
        assert_eq!(layout.slot("green"), Some(1));
    }

    #[test]
    fn test_json_round_trip_revalidates() {
        let set = scenario_set();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endmembers.json");
        set.save_json(&path).unwrap();

        let loaded = EndmemberSet::load_json(&path).unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.fingerprint(), set.fingerprint());

        // A hand-edited singular file is refused on load
        let bad = r#"{"band_names":["a","b"],"endmembers":[
            {"name":"x","signature":[0.1,0.2]},
            {"name":"y","signature":[0.1,0.2]}]}"#;
        assert!(serde_json::from_str::<EndmemberSet>(bad).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_signatures() {
        let a = scenario_set();
        let b = EndmemberSet::new(
            bands(),
            SpectralTransform::Identity,
            vec![
                Endmember::new("soil", vec![0.3, 0.2, 0.1]),
                Endmember::new("green", vec![0.1, 0.4, 0.3]),
                Endmember::new("dry", vec![0.2, 0.1, 0.41]),
            ],
        )
        .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_library_subset() {
        let library = EndmemberLibrary::new(
            bands(),
            SpectralTransform::Identity,
            vec![
                Endmember::new("soil", vec![0.3, 0.2, 0.1]),
                Endmember::new("green", vec![0.1, 0.4, 0.3]),
                Endmember::new("dry", vec![0.2, 0.1, 0.4]),
                Endmember::new("soil_dup", vec![0.3, 0.2, 0.1]),
            ],
        )
        .unwrap();
        let set = library.subset(&[2, 0], DEFAULT_SINGULAR_TOLERANCE).unwrap();
        assert_eq!(set.names(), vec!["dry", "soil"]);
        assert!(library.subset(&[0, 3], DEFAULT_SINGULAR_TOLERANCE).is_err());
        assert!(library.subset(&[9], DEFAULT_SINGULAR_TOLERANCE).is_err());
    }
}

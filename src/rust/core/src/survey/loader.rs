// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Field-site CSV and acquisition JSON loading.
//!
//! CSV layout: `site_id, latitude, longitude, observed`, then one column per
//! cover class. A bad header is fatal; a bad row is skipped, logged and
//! reported back so the exclusion can be audited.

use super::acquisition::ImageAcquisition;
use super::geometry::GeoPoint;
use super::site::{FieldCover, FieldSite};
use crate::error::{CoverError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

const FIXED_COLUMNS: [&str; 4] = ["site_id", "latitude", "longitude", "observed"];

/// How cover values are written in the CSV.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverUnits {
    #[default]
    Fraction,
    /// 0-100, divided by 100 on load.
    Percent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub units: CoverUnits,
    /// Rows whose cover sums to within this of one are rescaled to sum to one.
    pub sum_tolerance: f64,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        SurveyConfig {
            units: CoverUnits::Fraction,
            sum_tolerance: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SiteTable {
    pub classes: Vec<String>,
    pub sites: Vec<FieldSite>,
    pub skipped: Vec<SkippedRow>,
}

/// `observed` accepts RFC 3339 or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_number(field: &str, column: &str) -> std::result::Result<f64, String> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("{column}: '{field}' is not a number"))
}

fn parse_row(
    record: &csv::StringRecord,
    classes: &[String],
    config: &SurveyConfig,
) -> std::result::Result<FieldSite, String> {
    if record.len() != FIXED_COLUMNS.len() + classes.len() {
        return Err(format!(
            "expected {} columns, found {}",
            FIXED_COLUMNS.len() + classes.len(),
            record.len()
        ));
    }
    let id = record[0].trim();
    let lat = parse_number(&record[1], "latitude")?;
    let lon = parse_number(&record[2], "longitude")?;
    let observed = parse_timestamp(&record[3])
        .ok_or_else(|| format!("observed: '{}' is not a date", &record[3]))?;

    let scale = match config.units {
        CoverUnits::Fraction => 1.0,
        CoverUnits::Percent => 0.01,
    };
    let values = classes
        .iter()
        .enumerate()
        .map(|(i, class)| parse_number(&record[FIXED_COLUMNS.len() + i], class).map(|v| v * scale))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let cover = FieldCover::normalized(classes.to_vec(), values, config.sum_tolerance)
        .map_err(|e| e.to_string())?;
    FieldSite::new(id, GeoPoint::new(lat, lon), observed, cover).map_err(|e| e.to_string())
}

/// Parse field sites from any CSV reader.
pub fn read_field_sites<R: Read>(reader: R, config: &SurveyConfig) -> Result<SiteTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let header = rdr.headers().map_err(|e| CoverError::Parse {
        line: 1,
        message: e.to_string(),
    })?;
    let leading: Vec<String> = header
        .iter()
        .take(FIXED_COLUMNS.len())
        .map(str::to_ascii_lowercase)
        .collect();
    if leading != FIXED_COLUMNS {
        return Err(CoverError::Parse {
            line: 1,
            message: format!(
                "header must start with {}, found {}",
                FIXED_COLUMNS.join(","),
                leading.join(",")
            ),
        });
    }
    let classes: Vec<String> = header
        .iter()
        .skip(FIXED_COLUMNS.len())
        .map(str::to_string)
        .collect();
    if classes.is_empty() {
        return Err(CoverError::Parse {
            line: 1,
            message: "no cover class columns".into(),
        });
    }

    let mut sites = Vec::new();
    let mut skipped = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        // header is line 1
        let mut line = i + 2;
        let outcome = match row {
            Ok(record) => {
                if let Some(pos) = record.position() {
                    line = pos.line() as usize;
                }
                parse_row(&record, &classes, config)
            }
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(site) => sites.push(site),
            Err(reason) => {
                warn!(line, %reason, "skipping field site row");
                skipped.push(SkippedRow { line, reason });
            }
        }
    }

    info!(
        sites = sites.len(),
        skipped = skipped.len(),
        classes = classes.len(),
        "loaded field sites"
    );
    Ok(SiteTable {
        classes,
        sites,
        skipped,
    })
}

pub fn parse_field_sites(text: &str, config: &SurveyConfig) -> Result<SiteTable> {
    read_field_sites(text.as_bytes(), config)
}

pub fn load_field_sites(path: impl AsRef<Path>, config: &SurveyConfig) -> Result<SiteTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| CoverError::io(path, e))?;
    read_field_sites(file, config)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AcquisitionDocument {
    Many(Vec<ImageAcquisition>),
    One(Box<ImageAcquisition>),
}

/// Acquisitions from a JSON file holding one scene object or an array of them.
pub fn load_acquisitions(path: impl AsRef<Path>) -> Result<Vec<ImageAcquisition>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| CoverError::io(path, e))?;
    let doc: AcquisitionDocument = serde_json::from_str(&text)?;
    Ok(match doc {
        AcquisitionDocument::Many(scenes) => scenes,
        AcquisitionDocument::One(scene) => vec![*scene],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::io::Write;

    const SITES: &str = "\
site_id,latitude,longitude,observed,bare,green,dead
QLD-001,-23.40,144.20,2012-03-10,0.20,0.30,0.50
QLD-002,-23.41,144.25,2012-03-11T02:30:00Z,0.21,0.30,0.50
QLD-003,-95.00,144.25,2012-03-11,0.20,0.30,0.50
QLD-004,-23.42,144.26,not-a-date,0.20,0.30,0.50
QLD-005,-23.43,144.27,2012-03-12,0.10,0.10,0.10
";

    #[test]
    fn test_parse_skips_bad_rows() {
        let table = parse_field_sites(SITES, &SurveyConfig::default()).unwrap();
        assert_eq!(table.classes, vec!["bare", "green", "dead"]);
        assert_eq!(table.sites.len(), 2);
        assert_eq!(table.skipped.len(), 3);
        assert_eq!(table.skipped[0].line, 4);

        let second = &table.sites[1];
        assert_eq!(second.id(), "QLD-002");
        assert_eq!(second.observed().hour(), 2);
        // 1.01 total rescaled
        let sum: f64 = second.cover().values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_units() {
        let text = "site_id,latitude,longitude,observed,bare,green\nA,-20,140,2015-01-02,40,60\n";
        let config = SurveyConfig {
            units: CoverUnits::Percent,
            ..SurveyConfig::default()
        };
        let table = parse_field_sites(text, &config).unwrap();
        let green = table.sites[0].cover().get("green").unwrap();
        assert!((green - 0.6).abs() < 1e-12);
        assert_eq!(table.sites[0].observed().day(), 2);
    }

    #[test]
    fn test_bad_header_is_fatal() {
        let err = parse_field_sites("id,lat,lon,date,bare\n", &SurveyConfig::default()).unwrap_err();
        assert!(matches!(err, CoverError::Parse { line: 1, .. }));

        let err = parse_field_sites("site_id,latitude,longitude,observed\n", &SurveyConfig::default())
            .unwrap_err();
        assert!(matches!(err, CoverError::Parse { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SITES.as_bytes()).unwrap();
        let table = load_field_sites(file.path(), &SurveyConfig::default()).unwrap();
        assert_eq!(table.sites.len(), 2);

        let missing = load_field_sites("/nonexistent/sites.csv", &SurveyConfig::default());
        assert!(matches!(missing, Err(CoverError::Io { .. })));
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2012-03-10").is_some());
        assert!(parse_timestamp("2012-03-10T10:00:00+10:00").is_some());
        assert!(parse_timestamp("10/03/2012").is_none());
    }
}

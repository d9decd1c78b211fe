// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Per-location decile ranking of cover fractions.
//!
//! Each location keeps an append-only, time-ordered history. Once a location
//! holds `min_history` valid entries it is `Ready`, and every further valid
//! observation is ranked per class against the history that precedes it.
//! Invalid observations are recorded but never ranked and never enter a
//! distribution.
//!
//! History is only shortened by an explicit `truncate_before`.

use super::unmixing::FractionImage;
use crate::error::{CoverError, Result};
use crate::formulas::{average_rank_percentile, decile_from_percentile, quantile};
use crate::spectra::{ClassLayout, FractionVector};
use crate::survey::{PixelKey, RasterGrid};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryState {
    Empty,
    Accumulating,
    Ready,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    High,
    Low,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Valid entries required before ranking starts.
    pub min_history: usize,
    /// Distance beyond q90 (or below q10) required to flag an anomaly.
    pub anomaly_threshold: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        RankerConfig {
            min_history: 10,
            anomaly_threshold: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub fractions: FractionVector,
}

/// Append-only log for one location, strictly increasing timestamps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelHistory {
    entries: Vec<HistoryEntry>,
}

impl PixelHistory {
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.fractions.is_valid()).count()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.timestamp)
    }

    pub fn state(&self, min_history: usize) -> HistoryState {
        if self.entries.is_empty() {
            HistoryState::Empty
        } else if self.valid_count() >= min_history {
            HistoryState::Ready
        } else {
            HistoryState::Accumulating
        }
    }

    /// # Errors
    /// `InvalidInput` if `timestamp` is not after the last entry.
    pub fn append(&mut self, timestamp: DateTime<Utc>, fractions: FractionVector) -> Result<()> {
        if let Some(last) = self.last_timestamp() {
            if timestamp <= last {
                return Err(CoverError::InvalidInput(format!(
                    "history append at {timestamp} is not after {last}"
                )));
            }
        }
        self.entries.push(HistoryEntry {
            timestamp,
            fractions,
        });
        Ok(())
    }

    /// Drop entries strictly older than `cutoff`. Returns the number removed.
    pub fn truncate_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let keep_from = self.entries.partition_point(|e| e.timestamp < cutoff);
        self.entries.drain(..keep_from).count()
    }

    /// Replace the entry recorded at exactly `timestamp`.
    pub fn replace(&mut self, timestamp: DateTime<Utc>, fractions: FractionVector) -> Result<()> {
        let idx = self
            .entries
            .binary_search_by(|e| e.timestamp.cmp(&timestamp))
            .map_err(|_| CoverError::InvalidInput(format!("no history entry at {timestamp}")))?;
        self.entries[idx].fractions = fractions;
        Ok(())
    }

    /// Valid per-class values for class `slot`, in time order.
    pub fn class_values(&self, layout: &ClassLayout, slot: usize) -> Vec<f64> {
        self.entries
            .iter()
            .filter_map(|e| e.fractions.fractions())
            .map(|f| f.by_class(&layout.component_class, layout.classes.len())[slot])
            .collect()
    }
}

/// Ranking of one class value at one location and time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankFlag {
    pub location: PixelKey,
    pub timestamp: DateTime<Utc>,
    pub class: String,
    pub value: f64,
    pub decile: u8,
    pub percentile: f64,
    pub anomaly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

/// Percentile, decile and anomaly direction of one value against a sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRank {
    pub percentile: f64,
    pub decile: u8,
    pub direction: Option<Direction>,
}

/// Rank `value` against `past`. High anomalies need decile 10 and a margin
/// of at least `threshold` over the 90th percentile; low ones mirror that
/// at decile 1 and the 10th percentile.
pub fn rank_value(past: &[f64], value: f64, threshold: f64) -> ValueRank {
    let percentile = average_rank_percentile(past, value);
    let decile = decile_from_percentile(percentile);
    let direction = match decile {
        10 => quantile(past, 0.9)
            .filter(|q90| value - q90 >= threshold)
            .map(|_| Direction::High),
        1 => quantile(past, 0.1)
            .filter(|q10| q10 - value >= threshold)
            .map(|_| Direction::Low),
        _ => None,
    };
    ValueRank {
        percentile,
        decile,
        direction,
    }
}

/// Outcome of a single `observe` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    /// State before the new entry was appended.
    pub ranked_against: HistoryState,
    pub state: HistoryState,
    pub flags: Vec<RankFlag>,
}

/// Rank `fractions` against `history` without mutating anything.
fn rank_against(
    history: &PixelHistory,
    layout: &ClassLayout,
    config: &RankerConfig,
    location: PixelKey,
    timestamp: DateTime<Utc>,
    fractions: &FractionVector,
) -> Vec<RankFlag> {
    let Some(current) = fractions.fractions() else {
        return Vec::new();
    };
    if history.state(config.min_history) != HistoryState::Ready {
        return Vec::new();
    }
    let by_class = current.by_class(&layout.component_class, layout.classes.len());

    let mut flags = Vec::with_capacity(layout.classes.len());
    for (slot, class) in layout.classes.iter().enumerate() {
        let past = history.class_values(layout, slot);
        let value = by_class[slot];
        let ValueRank {
            percentile,
            decile,
            direction,
        } = rank_value(&past, value, config.anomaly_threshold);
        if let Some(d) = direction {
            debug!(%location, class = class.as_str(), value, decile, direction = ?d, "anomaly");
        }

        flags.push(RankFlag {
            location,
            timestamp,
            class: class.clone(),
            value,
            decile,
            percentile,
            anomaly: direction.is_some(),
            direction,
        });
    }
    flags
}

/// Histories for many locations, ranked per class.
#[derive(Clone, Debug)]
pub struct TimeSeriesRanker {
    config: RankerConfig,
    layout: ClassLayout,
    /// Grid the pixel keys refer to, bound by the first ingested image.
    grid: Option<RasterGrid>,
    histories: BTreeMap<PixelKey, PixelHistory>,
}

impl TimeSeriesRanker {
    pub fn new(config: RankerConfig, layout: ClassLayout) -> Self {
        TimeSeriesRanker {
            config,
            layout,
            grid: None,
            histories: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    pub fn layout(&self) -> &ClassLayout {
        &self.layout
    }

    pub fn grid(&self) -> Option<&RasterGrid> {
        self.grid.as_ref()
    }

    pub fn location_count(&self) -> usize {
        self.histories.len()
    }

    pub fn history(&self, location: PixelKey) -> Option<&PixelHistory> {
        self.histories.get(&location)
    }

    pub fn state(&self, location: PixelKey) -> HistoryState {
        self.histories
            .get(&location)
            .map_or(HistoryState::Empty, |h| h.state(self.config.min_history))
    }

    fn check_shape(&self, fractions: &FractionVector) -> Result<()> {
        match fractions.fractions() {
            Some(f) if f.values.len() != self.layout.component_class.len() => {
                Err(CoverError::InvalidInput(format!(
                    "{} fractions, ranker expects {}",
                    f.values.len(),
                    self.layout.component_class.len()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Rank (if `Ready`) and then append one observation.
    ///
    /// # Errors
    /// `InvalidInput` for a wrong fraction count or an out-of-order timestamp.
    pub fn observe(
        &mut self,
        location: PixelKey,
        timestamp: DateTime<Utc>,
        fractions: FractionVector,
    ) -> Result<Observation> {
        self.check_shape(&fractions)?;
        let history = self.histories.entry(location).or_default();
        let ranked_against = history.state(self.config.min_history);
        let flags = rank_against(history, &self.layout, &self.config, location, timestamp, &fractions);
        history.append(timestamp, fractions)?;
        Ok(Observation {
            ranked_against,
            state: history.state(self.config.min_history),
            flags,
        })
    }

    /// Observe every pixel of an image, one writer per location.
    /// Flags come back ordered by location, then class.
    ///
    /// # Errors
    /// `InvalidInput` if the image's fraction layout does not match, if its
    /// grid differs from the one already ingested, or if it is not newer than
    /// a location's last entry. Nothing is appended then.
    pub fn ingest_image(&mut self, image: &FractionImage) -> Result<Vec<RankFlag>> {
        if image.endmembers.len() != self.layout.component_class.len() {
            return Err(CoverError::InvalidInput(format!(
                "image {} has {} endmembers, ranker expects {}",
                image.scene_id,
                image.endmembers.len(),
                self.layout.component_class.len()
            )));
        }
        if let Some(grid) = &self.grid {
            if *grid != image.grid {
                return Err(CoverError::InvalidInput(format!(
                    "image {} is on a different grid than the ranked history",
                    image.scene_id
                )));
            }
        }
        for (key, _) in image.iter() {
            if let Some(last) = self.histories.get(&key).and_then(PixelHistory::last_timestamp) {
                if image.acquired <= last {
                    return Err(CoverError::InvalidInput(format!(
                        "image {} at {} is not after {key} history end {last}",
                        image.scene_id, image.acquired
                    )));
                }
            }
        }
        self.grid = Some(image.grid);
        for (key, _) in image.iter() {
            self.histories.entry(key).or_default();
        }

        let (config, layout) = (&self.config, &self.layout);
        let timestamp = image.acquired;
        let outcomes: Vec<Result<Vec<RankFlag>>> = self
            .histories
            .par_iter_mut()
            .filter_map(|(key, history)| {
                let fractions = image.get(*key)?;
                let flags = rank_against(history, layout, config, *key, timestamp, fractions);
                Some(history.append(timestamp, fractions.clone()).map(|_| flags))
            })
            .collect();

        let mut flags = Vec::new();
        for outcome in outcomes {
            flags.extend(outcome?);
        }
        flags.sort_by_key(|f| f.location);

        info!(
            scene = image.scene_id.as_str(),
            ranked = flags.len(),
            anomalies = flags.iter().filter(|f| f.anomaly).count(),
            "ingested image into ranker"
        );
        Ok(flags)
    }

    /// Explicit windowing: drop entries older than `cutoff` everywhere.
    /// Locations left empty are removed, and the grid binding with them once
    /// nothing is left. Returns the number of entries dropped.
    pub fn truncate_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let removed = self
            .histories
            .values_mut()
            .map(|h| h.truncate_before(cutoff))
            .sum();
        self.histories.retain(|_, h| !h.is_empty());
        if self.histories.is_empty() {
            self.grid = None;
        }
        removed
    }

    /// Replace a previously recorded observation, e.g. after recalibration.
    ///
    /// # Errors
    /// `InvalidInput` if nothing was recorded at that location and time, or
    /// the fraction count is wrong.
    pub fn reprocess(
        &mut self,
        location: PixelKey,
        timestamp: DateTime<Utc>,
        fractions: FractionVector,
    ) -> Result<()> {
        self.check_shape(&fractions)?;
        self.histories
            .get_mut(&location)
            .ok_or_else(|| CoverError::InvalidInput(format!("no history at {location}")))?
            .replace(timestamp, fractions)
    }
}

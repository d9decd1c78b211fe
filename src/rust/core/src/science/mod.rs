// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
pub mod matcher; // field site -> best clear pixel
pub mod ranking;
pub mod region;
pub mod unmixing; // [CORE] FCLS

pub use matcher::{latest_acquisition, MatchConfig, MatchReport, MatchedObservation, ReflectanceMatcher, SpatialTiebreak};
pub use ranking::{rank_value, Direction, HistoryState, PixelHistory, RankFlag, RankerConfig, TimeSeriesRanker, ValueRank};
pub use region::{ClassSummary, RegionSummarizer, RegionSummary};
pub use unmixing::{FractionImage, PixelCounts, UnmixConfig, UnmixingEngine};

//! # Round Pace
//!
//! Round pace baselines and live finish-time projection.
//!
//! This library provides:
//! - Historical sampling of completed rounds on a course layout, bounded by a
//!   plausibility window and a hard recency cutoff
//! - Group-size and per-player speed factors composed into an adjusted
//!   expected round duration (the *baseline*)
//! - A pure live blender that interpolates from the baseline toward the card's
//!   own observed pace as holes are completed
//!
//! ## Features
//!
//! - **`parallel`** - Compute baselines for batches of rounds with rayon
//! - **`persistence`** - SQLite-backed historical round store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use round_pace::{
//!     compute_baseline, project, ActiveRound, CompletedRound, HistoricalDurationSampler,
//!     InMemoryRoundSource,
//! };
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
//! let history: Vec<CompletedRound> = (0..5)
//!     .map(|i| {
//!         let begun = start + Duration::days(i);
//!         CompletedRound::new(format!("r{}", i), "course-1", "main")
//!             .with_times(begun, begun + Duration::minutes(80))
//!             .with_participants(["ada", "bo", "cy"])
//!     })
//!     .collect();
//!
//! let sampler = HistoricalDurationSampler::new(InMemoryRoundSource::new(history));
//! let round = ActiveRound::new("live", "course-1", "main", 18, ["ada", "bo", "cy"]);
//! let samples = sampler.sample(&round.course_id, &round.layout, round.total_holes).unwrap();
//!
//! let baseline = compute_baseline(&round, &samples);
//! assert!(baseline.is_reliable());
//!
//! let now = start + Duration::days(10);
//! let state = project(9, 18, 40.0, &baseline, now);
//! assert!((state.estimated_total_minutes - 80.0).abs() < 1e-9);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PaceError, Result};

// Serialization-boundary rounding
pub mod rounding;

// Injected time source
pub mod clock;
pub use clock::{Clock, FixedClock, SystemClock};

// Historical sample collection
pub mod sampler;
pub use sampler::{filter_qualifying, HistoricalDurationSampler, InMemoryRoundSource, RoundSource};

// Group-size and per-player speed factors
pub mod factors;
pub use factors::{compute_baseline, player_count_factor, PaceBaseline, PaceFactorCalculator};

// Live pace projection
pub mod blender;
pub use blender::{
    format_minutes, project, LivePaceBlender, LivePaceState, LiveProgress, PaceStatus,
};

// LRU cache for computed baselines
pub mod lru_cache;

// Caching engine facade
pub mod engine;
pub use engine::{EngineStats, PaceEngine};

// SQLite-backed historical round store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteRoundStore;

// ============================================================================
// Core Types
// ============================================================================

/// A historical round as exposed by round storage.
///
/// Either timestamp may be missing for rounds that were never started or
/// never finished; those rounds never qualify as samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRound {
    pub round_id: String,
    pub course_id: String,
    pub layout: String,
    pub start_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub participant_names: Vec<String>,
}

impl CompletedRound {
    /// Create a round with no timestamps and no participants.
    pub fn new(
        round_id: impl Into<String>,
        course_id: impl Into<String>,
        layout: impl Into<String>,
    ) -> Self {
        Self {
            round_id: round_id.into(),
            course_id: course_id.into(),
            layout: layout.into(),
            start_time: None,
            completed_at: None,
            participant_names: Vec::new(),
        }
    }

    pub fn with_times(mut self, start_time: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self.completed_at = Some(completed_at);
        self
    }

    pub fn with_participants<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participant_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Duration in minutes, if both timestamps are set.
    pub fn duration_minutes(&self) -> Option<f64> {
        match (self.start_time, self.completed_at) {
            (Some(start), Some(end)) => Some(minutes_between(start, end)),
            _ => None,
        }
    }

    /// Convert to a duration sample. Returns `None` if either timestamp is missing.
    pub fn into_sample(self) -> Option<RoundDurationSample> {
        Some(RoundDurationSample {
            round_id: self.round_id,
            start_time: self.start_time?,
            completed_at: self.completed_at?,
            participant_names: self.participant_names,
        })
    }
}

/// A historical round duration usable as evidence for a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDurationSample {
    pub round_id: String,
    pub start_time: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub participant_names: Vec<String>,
}

impl RoundDurationSample {
    /// Round duration in fractional minutes.
    pub fn duration_minutes(&self) -> f64 {
        minutes_between(self.start_time, self.completed_at)
    }

    /// Whether the named player was on the card for this round.
    pub fn includes_player(&self, name: &str) -> bool {
        self.participant_names.iter().any(|p| p == name)
    }
}

/// The in-progress round a baseline is computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRound {
    pub round_id: String,
    pub course_id: String,
    pub layout: String,
    pub total_holes: u32,
    pub player_names: Vec<String>,
}

impl ActiveRound {
    pub fn new<I, S>(
        round_id: impl Into<String>,
        course_id: impl Into<String>,
        layout: impl Into<String>,
        total_holes: u32,
        player_names: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            round_id: round_id.into(),
            course_id: course_id.into(),
            layout: layout.into(),
            total_holes,
            player_names: player_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of players on the card (duplicates count).
    pub fn player_count(&self) -> usize {
        self.player_names.len()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for sampling and factor calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceConfig {
    /// Minimum qualifying samples for a course average (and for a per-player
    /// factor). Below this the baseline is unreliable.
    /// Default: 3
    pub min_samples: usize,

    /// Most recent qualifying rounds kept. Older rounds are ignored entirely.
    /// Default: 50
    pub sample_limit: usize,

    /// Lower plausibility bound in minutes per hole (inclusive).
    /// Default: 1.5
    pub min_minutes_per_hole: f64,

    /// Upper plausibility bound in minutes per hole (exclusive).
    /// Default: 15.0
    pub max_minutes_per_hole: f64,

    /// Group-size factors indexed by `player_count - 1`. Three players is the
    /// reference card.
    /// Default: [0.85, 0.92, 1.0, 1.07, 1.12, 1.18]
    pub player_count_factors: Vec<f64>,

    /// Factor added per player beyond the end of `player_count_factors`.
    /// Default: 0.06
    pub extra_player_factor_step: f64,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            sample_limit: 50,
            min_minutes_per_hole: 1.5,
            max_minutes_per_hole: 15.0,
            player_count_factors: vec![0.85, 0.92, 1.0, 1.07, 1.12, 1.18],
            extra_player_factor_step: 0.06,
        }
    }
}

impl PaceConfig {
    /// Check the configuration for values that would make estimates meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.min_samples == 0 {
            return Err(PaceError::config("min_samples must be at least 1"));
        }
        if self.sample_limit == 0 {
            return Err(PaceError::config("sample_limit must be at least 1"));
        }
        if !(self.min_minutes_per_hole.is_finite() && self.min_minutes_per_hole > 0.0) {
            return Err(PaceError::config(format!(
                "min_minutes_per_hole must be positive, got {}",
                self.min_minutes_per_hole
            )));
        }
        if !self.max_minutes_per_hole.is_finite()
            || self.max_minutes_per_hole <= self.min_minutes_per_hole
        {
            return Err(PaceError::config(format!(
                "max_minutes_per_hole ({}) must exceed min_minutes_per_hole ({})",
                self.max_minutes_per_hole, self.min_minutes_per_hole
            )));
        }
        if self.player_count_factors.is_empty() {
            return Err(PaceError::config("player_count_factors must not be empty"));
        }
        if let Some(bad) = self
            .player_count_factors
            .iter()
            .find(|f| !(f.is_finite() && **f > 0.0))
        {
            return Err(PaceError::config(format!(
                "player_count_factors must be positive, got {}",
                bad
            )));
        }
        if !self.extra_player_factor_step.is_finite() {
            return Err(PaceError::config("extra_player_factor_step must be finite"));
        }
        Ok(())
    }

    /// Group-size factor for a card of `count` players.
    ///
    /// Counts past the table extrapolate linearly from its last entry; an empty
    /// card is neutral.
    pub fn player_count_factor(&self, count: usize) -> f64 {
        if count == 0 {
            return 1.0;
        }
        match self.player_count_factors.get(count - 1) {
            Some(&factor) => factor,
            None => match self.player_count_factors.last() {
                Some(&last) => {
                    let extra = (count - self.player_count_factors.len()) as f64;
                    last + extra * self.extra_player_factor_step
                }
                None => 1.0,
            },
        }
    }
}

/// Plausible duration range for a round of a given length, in minutes.
///
/// Rounds outside `[min_minutes, max_minutes)` are treated as abandoned,
/// left open, or test data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityWindow {
    pub min_minutes: f64,
    pub max_minutes: f64,
}

impl PlausibilityWindow {
    pub fn for_holes(total_holes: u32, config: &PaceConfig) -> Self {
        let holes = total_holes as f64;
        Self {
            min_minutes: holes * config.min_minutes_per_hole,
            max_minutes: holes * config.max_minutes_per_hole,
        }
    }

    pub fn contains(&self, duration_minutes: f64) -> bool {
        duration_minutes >= self.min_minutes && duration_minutes < self.max_minutes
    }
}

pub(crate) fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

// ============================================================================
// Tests
// ============================================================================

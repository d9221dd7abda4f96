//! Pace factor calculation.
//!
//! Turns a qualifying sample set plus the current card's roster into a
//! [`PaceBaseline`]: the course average, scaled by a group-size factor and by
//! the card's mean per-player speed factor.
//!
//! ## Example
//! ```rust
//! use round_pace::factors::player_count_factor;
//!
//! assert_eq!(player_count_factor(3), 1.0);
//! assert!(player_count_factor(4) > player_count_factor(2));
//! ```

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::rounding::{serialize_factor, serialize_factor_map, serialize_minutes};
use crate::{ActiveRound, PaceConfig, RoundDurationSample};

/// Historically derived expected duration for one round.
///
/// Computed fresh per request and never persisted. Values are kept at full
/// precision; rounding happens only on serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaceBaseline {
    /// Mean qualifying round duration, or 0 with too few samples
    #[serde(serialize_with = "serialize_minutes")]
    pub average_course_duration_minutes: f64,
    /// Course average × group-size factor × card speed factor
    #[serde(serialize_with = "serialize_minutes")]
    pub adjusted_duration_minutes: f64,
    #[serde(serialize_with = "serialize_factor")]
    pub player_count_factor: f64,
    /// Mean of the per-player factors
    #[serde(serialize_with = "serialize_factor")]
    pub card_speed_factor: f64,
    pub sample_count: usize,
    pub total_holes: u32,
    /// Per-player speed factor (1.0 = course average)
    #[serde(serialize_with = "serialize_factor_map")]
    pub player_factors: BTreeMap<String, f64>,
}

impl PaceBaseline {
    /// Neutral baseline for a round with no usable history.
    pub fn insufficient(total_holes: u32, player_names: &[String]) -> Self {
        Self {
            average_course_duration_minutes: 0.0,
            adjusted_duration_minutes: 0.0,
            player_count_factor: player_count_factor(player_names.len()),
            card_speed_factor: 1.0,
            sample_count: 0,
            total_holes,
            player_factors: player_names.iter().map(|p| (p.clone(), 1.0)).collect(),
        }
    }

    /// Whether the baseline carries enough evidence to project from.
    pub fn is_reliable(&self) -> bool {
        self.is_reliable_with(PaceConfig::default().min_samples)
    }

    pub(crate) fn is_reliable_with(&self, min_samples: usize) -> bool {
        self.sample_count >= min_samples && self.adjusted_duration_minutes > 0.0
    }

    /// Serialize to JSON (rounded at the boundary).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Group-size factor with the default table.
pub fn player_count_factor(count: usize) -> f64 {
    PaceConfig::default().player_count_factor(count)
}

/// Compute a baseline with the default configuration.
pub fn compute_baseline(round: &ActiveRound, samples: &[RoundDurationSample]) -> PaceBaseline {
    PaceFactorCalculator::default().compute(round, samples)
}

/// Composes course, group-size and player factors into a [`PaceBaseline`].
#[derive(Debug, Clone, Default)]
pub struct PaceFactorCalculator {
    config: PaceConfig,
}

impl PaceFactorCalculator {
    pub fn new(config: PaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PaceConfig {
        &self.config
    }

    pub fn compute(&self, round: &ActiveRound, samples: &[RoundDurationSample]) -> PaceBaseline {
        let sample_count = samples.len();
        let average = self.course_average(samples);

        let player_count_factor = self.config.player_count_factor(round.player_count());

        let mut player_factors = BTreeMap::new();
        let mut factor_sum = 0.0;
        for name in &round.player_names {
            let factor = *player_factors
                .entry(name.clone())
                .or_insert_with(|| self.player_factor(name, samples, average));
            factor_sum += factor;
        }

        let card_speed_factor = if round.player_names.is_empty() {
            1.0
        } else {
            factor_sum / round.player_names.len() as f64
        };

        let adjusted_duration_minutes = if average > 0.0 {
            average * player_count_factor * card_speed_factor
        } else {
            0.0
        };

        if average > 0.0 {
            debug!(
                "[PaceFactors] round {}: avg {:.1} min over {} samples, group {:.2}, card {:.2} -> {:.1} min",
                round.round_id,
                average,
                sample_count,
                player_count_factor,
                card_speed_factor,
                adjusted_duration_minutes
            );
        } else {
            info!(
                "[PaceFactors] round {}: only {} qualifying samples, baseline unavailable",
                round.round_id, sample_count
            );
        }

        PaceBaseline {
            average_course_duration_minutes: average,
            adjusted_duration_minutes,
            player_count_factor,
            card_speed_factor,
            sample_count,
            total_holes: round.total_holes,
            player_factors,
        }
    }

    fn course_average(&self, samples: &[RoundDurationSample]) -> f64 {
        if samples.len() < self.config.min_samples {
            return 0.0;
        }
        mean(samples.iter().map(RoundDurationSample::duration_minutes)).unwrap_or(0.0)
    }

    /// Player's mean duration relative to the course average. Neutral without
    /// at least `min_samples` rounds featuring the player.
    fn player_factor(&self, name: &str, samples: &[RoundDurationSample], average: f64) -> f64 {
        if average <= 0.0 {
            return 1.0;
        }

        let durations: Vec<f64> = samples
            .iter()
            .filter(|s| s.includes_player(name))
            .map(RoundDurationSample::duration_minutes)
            .collect();

        if durations.len() < self.config.min_samples {
            return 1.0;
        }

        match mean(durations.into_iter()) {
            Some(player_mean) => player_mean / average,
            None => 1.0,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

//! # Live Pace Blender
//!
//! Projects an in-progress round from a cached [`PaceBaseline`] and the card's
//! live progress. Every call is an independent, total recomputation: no state
//! is carried between calls and no historical query is made.
//!
//! The estimate interpolates linearly between the baseline (nothing played)
//! and the card's own extrapolated pace (everything played), weighted by the
//! fraction of holes completed.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::rounding::{serialize_factor, serialize_factor_map, serialize_minutes};
use crate::{minutes_between, Clock, PaceBaseline, PaceConfig};

/// Live inputs for one projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveProgress {
    pub completed_holes: u32,
    pub elapsed_minutes: f64,
}

impl LiveProgress {
    pub fn new(completed_holes: u32, elapsed_minutes: f64) -> Self {
        Self {
            completed_holes,
            elapsed_minutes,
        }
    }

    /// Progress measured from the round's start time. A start in the future
    /// counts as zero elapsed.
    pub fn from_start(start_time: DateTime<Utc>, completed_holes: u32, now: DateTime<Utc>) -> Self {
        Self::new(completed_holes, minutes_between(start_time, now).max(0.0))
    }
}

/// Projection of an in-progress round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePaceState {
    /// Whether the baseline carried enough evidence to project from
    pub reliable: bool,
    /// `None` while the baseline is unreliable, or when the finish instant
    /// is past the representable date range
    pub estimated_finish_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_minutes")]
    pub minutes_per_hole: f64,
    pub is_ahead: bool,
    pub completed_holes: u32,
    pub total_holes: u32,
    #[serde(serialize_with = "serialize_minutes")]
    pub elapsed_minutes: f64,
    /// 0 while the baseline is unreliable
    #[serde(serialize_with = "serialize_minutes")]
    pub estimated_total_minutes: f64,
    #[serde(serialize_with = "serialize_minutes")]
    pub estimated_minutes_remaining: f64,
    /// Elapsed time the baseline implies for the holes completed so far
    #[serde(serialize_with = "serialize_minutes")]
    pub expected_elapsed_minutes: f64,
    #[serde(serialize_with = "serialize_factor")]
    pub card_speed_factor: f64,
    #[serde(serialize_with = "serialize_factor_map")]
    pub player_factors: BTreeMap<String, f64>,
}

/// Presentation-level reading of a [`LivePaceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaceStatus {
    /// Not enough history; show a neutral "calculating" state
    Calculating,
    /// Reliable baseline but no hole completed yet
    NotStarted,
    /// Faster than the baseline for the holes played
    Ahead,
    /// At or slower than the baseline for the holes played
    Behind,
}

impl LivePaceState {
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    pub fn progress(&self) -> f64 {
        progress(self.completed_holes, self.total_holes)
    }

    pub fn status(&self) -> PaceStatus {
        if !self.is_reliable() {
            PaceStatus::Calculating
        } else if self.completed_holes == 0 {
            PaceStatus::NotStarted
        } else if self.is_ahead {
            PaceStatus::Ahead
        } else {
            PaceStatus::Behind
        }
    }

    /// Minutes ahead (negative) or behind (positive) the baseline so far.
    pub fn pace_delta_minutes(&self) -> f64 {
        if self.is_reliable() && self.completed_holes > 0 {
            self.elapsed_minutes - self.expected_elapsed_minutes
        } else {
            0.0
        }
    }

    /// One-line human summary, e.g. "Hole 9/18 · 1h 20min total · 40min left".
    pub fn summary(&self) -> String {
        let holes = format!("Hole {}/{}", self.completed_holes, self.total_holes);
        match self.status() {
            PaceStatus::Calculating => format!("{} · calculating pace", holes),
            _ => format!(
                "{} · {} total · {} left",
                holes,
                format_minutes(self.estimated_total_minutes),
                format_minutes(self.estimated_minutes_remaining)
            ),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Format a minute count as "45min" or "1h 5min".
pub fn format_minutes(minutes: f64) -> String {
    let total = if minutes.is_finite() && minutes > 0.0 {
        minutes.round() as u64
    } else {
        0
    };
    if total < 60 {
        format!("{}min", total)
    } else {
        let hours = total / 60;
        let mins = total % 60;
        if mins > 0 {
            format!("{}h {}min", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

/// Project a round from its baseline and live progress.
///
/// `now` is the instant the finish time is measured from; pass it explicitly
/// (or use [`LivePaceBlender`] with a [`Clock`]).
pub fn project(
    completed_holes: u32,
    total_holes: u32,
    elapsed_minutes: f64,
    baseline: &PaceBaseline,
    now: DateTime<Utc>,
) -> LivePaceState {
    project_with_min_samples(
        completed_holes,
        total_holes,
        elapsed_minutes,
        baseline,
        now,
        PaceConfig::default().min_samples,
    )
}

pub(crate) fn project_with_min_samples(
    completed_holes: u32,
    total_holes: u32,
    elapsed_minutes: f64,
    baseline: &PaceBaseline,
    now: DateTime<Utc>,
    min_samples: usize,
) -> LivePaceState {
    let elapsed = if elapsed_minutes.is_finite() && elapsed_minutes > 0.0 {
        elapsed_minutes
    } else {
        0.0
    };
    let minutes_per_hole = if completed_holes > 0 {
        elapsed / completed_holes as f64
    } else {
        0.0
    };

    let mut state = LivePaceState {
        reliable: false,
        estimated_finish_time: None,
        minutes_per_hole,
        is_ahead: false,
        completed_holes,
        total_holes,
        elapsed_minutes: elapsed,
        estimated_total_minutes: 0.0,
        estimated_minutes_remaining: 0.0,
        expected_elapsed_minutes: 0.0,
        card_speed_factor: baseline.card_speed_factor,
        player_factors: baseline.player_factors.clone(),
    };

    if !baseline.is_reliable_with(min_samples) {
        return state;
    }

    let adjusted = baseline.adjusted_duration_minutes;
    let progress = progress(completed_holes, total_holes);

    // With nothing played, the live pace is the baseline itself
    let actual_projected_total = if completed_holes > 0 {
        minutes_per_hole * total_holes as f64
    } else {
        adjusted
    };

    let estimated_total = (1.0 - progress) * adjusted + progress * actual_projected_total;
    let remaining = (estimated_total - elapsed).max(0.0);
    let expected_elapsed = adjusted * progress;

    state.reliable = true;
    state.estimated_total_minutes = estimated_total;
    state.estimated_minutes_remaining = remaining;
    state.expected_elapsed_minutes = expected_elapsed;
    state.estimated_finish_time = finish_time(now, remaining);
    state.is_ahead = completed_holes > 0 && elapsed < expected_elapsed;
    state
}

fn progress(completed_holes: u32, total_holes: u32) -> f64 {
    if total_holes == 0 {
        return 0.0;
    }
    (completed_holes as f64 / total_holes as f64).clamp(0.0, 1.0)
}

fn finish_time(now: DateTime<Utc>, remaining_minutes: f64) -> Option<DateTime<Utc>> {
    let millis = (remaining_minutes * 60_000.0).round() as i64;
    TimeDelta::try_milliseconds(millis).and_then(|delta| now.checked_add_signed(delta))
}

/// Blender bound to an injected time source.
#[derive(Debug, Clone)]
pub struct LivePaceBlender<C> {
    clock: C,
    min_samples: usize,
}

impl<C: Clock> LivePaceBlender<C> {
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, &PaceConfig::default())
    }

    pub fn with_config(clock: C, config: &PaceConfig) -> Self {
        Self {
            clock,
            min_samples: config.min_samples,
        }
    }

    pub fn project(&self, baseline: &PaceBaseline, live: LiveProgress) -> LivePaceState {
        self.project_at(baseline, live, self.clock.now())
    }

    /// Project against an explicit instant instead of the clock.
    pub fn project_at(
        &self,
        baseline: &PaceBaseline,
        live: LiveProgress,
        now: DateTime<Utc>,
    ) -> LivePaceState {
        project_with_min_samples(
            live.completed_holes,
            baseline.total_holes,
            live.elapsed_minutes,
            baseline,
            now,
            self.min_samples,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedClock;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 10, 15, 0, 0).unwrap()
    }

    fn baseline(adjusted: f64, sample_count: usize) -> PaceBaseline {
        let mut player_factors = BTreeMap::new();
        player_factors.insert("ada".to_string(), 1.1);
        PaceBaseline {
            average_course_duration_minutes: adjusted,
            adjusted_duration_minutes: adjusted,
            player_count_factor: 1.0,
            card_speed_factor: 1.1,
            sample_count,
            total_holes: 18,
            player_factors,
        }
    }

    #[test]
    fn test_unreliable_few_samples() {
        let state = project(5, 18, 25.0, &baseline(80.0, 2), now());
        assert_eq!(state.estimated_finish_time, None);
        assert_eq!(state.estimated_total_minutes, 0.0);
        assert!(!state.is_ahead);
        assert_eq!(state.minutes_per_hole, 5.0);
        assert_eq!(state.status(), PaceStatus::Calculating);
        assert_eq!(state.card_speed_factor, 1.1);
    }

    #[test]
    fn test_unreliable_zero_baseline() {
        let state = project(0, 18, 0.0, &baseline(0.0, 10), now());
        assert_eq!(state.estimated_finish_time, None);
        assert_eq!(state.estimated_total_minutes, 0.0);
        assert_eq!(state.minutes_per_hole, 0.0);
    }

    #[test]
    fn test_not_started_uses_baseline() {
        let state = project(0, 18, 3.0, &baseline(80.0, 12), now());
        assert_eq!(state.estimated_total_minutes, 80.0);
        assert!(!state.is_ahead);
        assert_eq!(state.estimated_minutes_remaining, 77.0);
        assert_eq!(state.estimated_finish_time, Some(now() + Duration::minutes(77)));
        assert_eq!(state.status(), PaceStatus::NotStarted);
    }

    #[test]
    fn test_matching_pace() {
        let state = project(9, 18, 40.0, &baseline(80.0, 12), now());
        assert!((state.estimated_total_minutes - 80.0).abs() < 1e-9);
        assert!(!state.is_ahead);
        assert_eq!(state.status(), PaceStatus::Behind);
        assert!(state.pace_delta_minutes().abs() < 1e-9);
    }

    #[test]
    fn test_fast_card_is_ahead() {
        let state = project(9, 18, 30.0, &baseline(80.0, 12), now());
        assert!(state.is_ahead);
        assert!((state.estimated_total_minutes - 70.0).abs() < 1e-9);
        assert!((state.estimated_minutes_remaining - 40.0).abs() < 1e-9);
        assert!((state.pace_delta_minutes() + 10.0).abs() < 1e-9);
        assert_eq!(state.status(), PaceStatus::Ahead);
    }

    #[test]
    fn test_late_round_follows_live_pace() {
        let state = project(17, 18, 76.5, &baseline(80.0, 12), now());
        let actual: f64 = 76.5 / 17.0 * 18.0;
        assert!((actual - 81.0).abs() < 1e-9);
        assert!((state.estimated_total_minutes - actual).abs() < 1.0);
    }

    #[test]
    fn test_overrun_clamps_remaining() {
        // Finished all holes but well over the projection
        let state = project(18, 18, 108.0, &baseline(80.0, 12), now());
        assert_eq!(state.estimated_total_minutes, 108.0);
        assert_eq!(state.estimated_minutes_remaining, 0.0);
        assert_eq!(state.estimated_finish_time, Some(now()));
    }

    #[test]
    fn test_unrepresentable_finish_stays_reliable() {
        // A finish hundreds of millions of years out cannot be a DateTime
        let state = project(0, 18, 0.0, &baseline(1e15, 12), now());
        assert!(state.is_reliable());
        assert_eq!(state.estimated_finish_time, None);
        assert_eq!(state.estimated_total_minutes, 1e15);
        assert_eq!(state.status(), PaceStatus::NotStarted);

        let state = project(9, 18, 40.0, &baseline(1e15, 12), now());
        assert_eq!(state.status(), PaceStatus::Ahead);
        assert!(state.summary().contains("total"));
    }

    #[test]
    fn test_progress_clamped() {
        let state = project(20, 18, 90.0, &baseline(80.0, 12), now());
        assert_eq!(state.progress(), 1.0);
        assert!(state.estimated_total_minutes.is_finite());
    }

    #[test]
    fn test_zero_total_holes() {
        let state = project(0, 0, 10.0, &baseline(80.0, 12), now());
        assert_eq!(state.estimated_total_minutes, 80.0);
        assert!(!state.is_ahead);
    }

    #[test]
    fn test_negative_elapsed_treated_as_zero() {
        let state = project(2, 18, -5.0, &baseline(80.0, 12), now());
        assert_eq!(state.elapsed_minutes, 0.0);
        assert_eq!(state.minutes_per_hole, 0.0);
        assert!(state.estimated_total_minutes.is_finite());

        let state = project(2, 18, f64::NAN, &baseline(80.0, 12), now());
        assert_eq!(state.elapsed_minutes, 0.0);
    }

    #[test]
    fn test_blender_uses_injected_clock() {
        let blender = LivePaceBlender::new(FixedClock(now()));
        let state = blender.project(&baseline(80.0, 12), LiveProgress::new(0, 0.0));
        assert_eq!(state.estimated_finish_time, Some(now() + Duration::minutes(80)));
    }

    #[test]
    fn test_blender_min_samples_from_config() {
        let config = PaceConfig {
            min_samples: 10,
            ..PaceConfig::default()
        };
        let blender = LivePaceBlender::with_config(FixedClock(now()), &config);
        let state = blender.project(&baseline(80.0, 5), LiveProgress::new(3, 12.0));
        assert_eq!(state.status(), PaceStatus::Calculating);
    }

    #[test]
    fn test_progress_from_start() {
        let start = now() - Duration::minutes(42);
        let live = LiveProgress::from_start(start, 10, now());
        assert_eq!(live.elapsed_minutes, 42.0);

        let future = LiveProgress::from_start(now() + Duration::minutes(5), 0, now());
        assert_eq!(future.elapsed_minutes, 0.0);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0.0), "0min");
        assert_eq!(format_minutes(44.6), "45min");
        assert_eq!(format_minutes(60.0), "1h");
        assert_eq!(format_minutes(80.2), "1h 20min");
        assert_eq!(format_minutes(-3.0), "0min");
    }

    #[test]
    fn test_summary() {
        let state = project(9, 18, 40.0, &baseline(80.0, 12), now());
        assert_eq!(state.summary(), "Hole 9/18 · 1h 20min total · 40min left");

        let state = project(9, 18, 40.0, &baseline(80.0, 1), now());
        assert_eq!(state.summary(), "Hole 9/18 · calculating pace");
    }

    #[test]
    fn test_serialization() {
        let state = project(17, 18, 76.5, &baseline(80.0, 12), now());
        let json: serde_json::Value = serde_json::from_str(&state.to_json()).unwrap();
        assert_eq!(json["estimatedTotalMinutes"], 80.9);
        assert_eq!(json["minutesPerHole"], 4.5);
        assert_eq!(json["cardSpeedFactor"], 1.1);
        assert_eq!(json["playerFactors"]["ada"], 1.1);
        assert!(json["estimatedFinishTime"].is_string());
        assert_eq!(json["reliable"], true);

        let unreliable = project(1, 18, 5.0, &baseline(80.0, 0), now());
        let json: serde_json::Value = serde_json::from_str(&unreliable.to_json()).unwrap();
        assert!(json["estimatedFinishTime"].is_null());
        assert_eq!(json["reliable"], false);
    }
}

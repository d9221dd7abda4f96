//! # Pace Engine
//!
//! Stateful facade over the sampler, factor calculator and blender.
//!
//! ## Architecture
//!
//! The engine owns a [`RoundSource`] and caches one [`PaceBaseline`] per live
//! round. A baseline is computed once (one historical query) and reused for
//! every live update until the round's descriptor changes (roster, hole count,
//! course or layout) or it is invalidated. Live projections are recomputed on
//! every call from the cached baseline without touching the source.
//!
//! The engine is not internally synchronized. Share it behind a `Mutex` when
//! several request handlers update the same set of rounds.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::blender::project_with_min_samples;
use crate::lru_cache::LruCache;
use crate::{
    ActiveRound, HistoricalDurationSampler, LivePaceState, LiveProgress, OptionExt,
    PaceBaseline, PaceConfig, PaceFactorCalculator, Result, RoundSource,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Default number of live rounds whose baselines are kept.
pub const DEFAULT_BASELINE_CACHE_SIZE: usize = 64;

/// Cache statistics for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub cached_baselines: u32,
    pub cache_capacity: u32,
    /// Baselines computed from history (each one is a source query)
    pub baseline_computations: u64,
    /// Baseline requests answered from the cache
    pub cache_hits: u64,
}

#[derive(Debug, Clone)]
struct CachedBaseline {
    round: ActiveRound,
    baseline: PaceBaseline,
}

/// Baseline cache plus live projection for in-progress rounds.
pub struct PaceEngine<S> {
    sampler: HistoricalDurationSampler<S>,
    calculator: PaceFactorCalculator,
    config: PaceConfig,
    baselines: LruCache<String, CachedBaseline>,
    computations: u64,
}

impl<S: RoundSource> PaceEngine<S> {
    /// Create an engine with the default configuration.
    pub fn new(source: S) -> Self {
        Self::build(source, PaceConfig::default(), DEFAULT_BASELINE_CACHE_SIZE)
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(source: S, config: PaceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(source, config, DEFAULT_BASELINE_CACHE_SIZE))
    }

    /// Set how many live rounds keep a cached baseline. Clears the cache.
    pub fn with_cache_size(mut self, capacity: usize) -> Self {
        self.baselines = LruCache::new(capacity);
        self
    }

    fn build(source: S, config: PaceConfig, cache_size: usize) -> Self {
        Self {
            sampler: HistoricalDurationSampler::with_config(source, config.clone()),
            calculator: PaceFactorCalculator::new(config.clone()),
            config,
            baselines: LruCache::new(cache_size),
            computations: 0,
        }
    }

    pub fn config(&self) -> &PaceConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        self.sampler.source()
    }

    /// Mutable access to the source. Cached baselines are not invalidated;
    /// call [`clear_cache`](Self::clear_cache) if new history should apply
    /// to rounds already in play.
    pub fn source_mut(&mut self) -> &mut S {
        self.sampler.source_mut()
    }

    // ========================================================================
    // Baselines
    // ========================================================================

    /// Baseline for `round`, from the cache when the round is unchanged.
    pub fn baseline(&mut self, round: &ActiveRound) -> Result<PaceBaseline> {
        validate_round(round)?;

        // Only an unchanged round counts as a cache hit
        let fresh = match self.baselines.peek(&round.round_id) {
            Some(cached) if cached.round == *round => true,
            Some(_) => {
                debug!(
                    "[PaceEngine] Round {} changed since its baseline was computed",
                    round.round_id
                );
                false
            }
            None => false,
        };

        if fresh {
            if let Some(cached) = self.baselines.get(&round.round_id) {
                return Ok(cached.baseline.clone());
            }
        }

        self.refresh_baseline(round)
    }

    /// Recompute the baseline for `round` from history, replacing any cached one.
    pub fn refresh_baseline(&mut self, round: &ActiveRound) -> Result<PaceBaseline> {
        validate_round(round)?;

        let samples = self
            .sampler
            .sample(&round.course_id, &round.layout, round.total_holes)?;
        let baseline = self.calculator.compute(round, &samples);
        self.store(round, &baseline);

        info!(
            "[PaceEngine] Baseline for round {}: {:.1} min from {} samples",
            round.round_id, baseline.adjusted_duration_minutes, baseline.sample_count
        );

        Ok(baseline)
    }

    /// Recompute baselines for many rounds at once.
    ///
    /// History is fetched sequentially (one query per round); factor
    /// calculation runs in parallel with the `parallel` feature. Every round
    /// is recomputed, cached or not.
    pub fn baselines_for_rounds(&mut self, rounds: &[ActiveRound]) -> Result<Vec<PaceBaseline>> {
        for round in rounds {
            validate_round(round)?;
        }

        let sampled = rounds
            .iter()
            .map(|round| {
                self.sampler
                    .sample(&round.course_id, &round.layout, round.total_holes)
                    .map(|samples| (round, samples))
            })
            .collect::<Result<Vec<_>>>()?;

        let calculator = &self.calculator;

        #[cfg(feature = "parallel")]
        let baselines: Vec<PaceBaseline> = sampled
            .par_iter()
            .map(|(round, samples)| calculator.compute(round, samples))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let baselines: Vec<PaceBaseline> = sampled
            .iter()
            .map(|(round, samples)| calculator.compute(round, samples))
            .collect();

        for (round, baseline) in rounds.iter().zip(&baselines) {
            self.store(round, baseline);
        }

        info!("[PaceEngine] Computed {} baselines in batch", baselines.len());
        Ok(baselines)
    }

    fn store(&mut self, round: &ActiveRound, baseline: &PaceBaseline) {
        self.computations += 1;
        self.baselines.insert(
            round.round_id.clone(),
            CachedBaseline {
                round: round.clone(),
                baseline: baseline.clone(),
            },
        );
    }

    // ========================================================================
    // Live projection
    // ========================================================================

    /// Project `round` at `now` from its (cached) baseline and live progress.
    pub fn live_state(
        &mut self,
        round: &ActiveRound,
        live: LiveProgress,
        now: DateTime<Utc>,
    ) -> Result<LivePaceState> {
        let baseline = self.baseline(round)?;
        Ok(project_with_min_samples(
            live.completed_holes,
            round.total_holes,
            live.elapsed_minutes,
            &baseline,
            now,
            self.config.min_samples,
        ))
    }

    // ========================================================================
    // Cache management
    // ========================================================================

    /// Drop the cached baseline for a round (e.g. when it finishes).
    pub fn invalidate(&mut self, round_id: &str) -> bool {
        self.baselines.invalidate(&round_id.to_string()).is_some()
    }

    pub fn clear_cache(&mut self) {
        if !self.baselines.is_empty() {
            debug!("[PaceEngine] Dropping {} cached baselines", self.baselines.len());
        }
        self.baselines.clear();
    }

    /// Cached baseline for a round, without computing one.
    pub fn cached_baseline(&self, round_id: &str) -> Option<&PaceBaseline> {
        self.baselines
            .peek(&round_id.to_string())
            .map(|cached| &cached.baseline)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cached_baselines: self.baselines.len() as u32,
            cache_capacity: self.baselines.capacity() as u32,
            baseline_computations: self.computations,
            cache_hits: self.baselines.hits(),
        }
    }
}

fn validate_round(round: &ActiveRound) -> Result<()> {
    Some(round.round_id.as_str())
        .filter(|id| !id.trim().is_empty())
        .ok_or_invalid_round(&round.round_id, "round id is empty")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompletedRound, InMemoryRoundSource, PaceError, PaceStatus};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap()
    }

    fn history(count: i64, minutes: i64) -> InMemoryRoundSource {
        InMemoryRoundSource::new(
            (0..count)
                .map(|i| {
                    let start = t0() + Duration::days(i);
                    CompletedRound::new(format!("h{}", i), "park", "long")
                        .with_times(start, start + Duration::minutes(minutes))
                        .with_participants(["ada", "bo", "cy"])
                })
                .collect(),
        )
    }

    fn live_round(players: &[&str]) -> ActiveRound {
        ActiveRound::new("live-1", "park", "long", 18, players.iter().copied())
    }

    #[test]
    fn test_baseline_is_cached() {
        let mut engine = PaceEngine::new(history(5, 90));
        let round = live_round(&["ada", "bo", "cy"]);

        let first = engine.baseline(&round).unwrap();
        let second = engine.baseline(&round).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.adjusted_duration_minutes, 90.0);
        let stats = engine.stats();
        assert_eq!(stats.baseline_computations, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cached_baselines, 1);
    }

    #[test]
    fn test_roster_change_recomputes() {
        let mut engine = PaceEngine::new(history(5, 90));
        engine.baseline(&live_round(&["ada", "bo", "cy"])).unwrap();

        let bigger = engine.baseline(&live_round(&["ada", "bo", "cy", "dee"])).unwrap();
        assert_eq!(bigger.player_count_factor, 1.07);
        assert_eq!(engine.stats().baseline_computations, 2);
        assert_eq!(engine.stats().cached_baselines, 1);
        assert_eq!(engine.stats().cache_hits, 0);
    }

    #[test]
    fn test_player_factor_counts_qualifying_rounds_only() {
        let mut source = history(5, 90);
        for (i, minutes) in [108, 108, 300].into_iter().enumerate() {
            let start = t0() + Duration::days(10 + i as i64);
            source.insert(
                CompletedRound::new(format!("dee{}", i), "park", "long")
                    .with_times(start, start + Duration::minutes(minutes))
                    .with_participants(["dee"]),
            );
        }
        let mut engine = PaceEngine::new(source);

        // The 300 minute round is outside the window, leaving dee two rounds
        let baseline = engine.baseline(&live_round(&["dee"])).unwrap();
        assert_eq!(baseline.sample_count, 7);
        assert_eq!(baseline.player_factors["dee"], 1.0);
        assert_eq!(baseline.card_speed_factor, 1.0);

        engine.source_mut().insert(
            CompletedRound::new("dee3", "park", "long")
                .with_times(t0(), t0() + Duration::minutes(108))
                .with_participants(["dee"]),
        );
        let baseline = engine.refresh_baseline(&live_round(&["dee"])).unwrap();
        assert!(baseline.player_factors["dee"] > 1.0);
    }

    #[test]
    fn test_cache_hits_survive_clear() {
        let mut engine = PaceEngine::new(history(5, 90));
        let round = live_round(&["ada", "bo", "cy"]);
        engine.baseline(&round).unwrap();
        engine.baseline(&round).unwrap();
        engine.baseline(&round).unwrap();
        assert_eq!(engine.stats().cache_hits, 2);

        engine.clear_cache();
        engine.baseline(&round).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.baseline_computations, 2);
    }

    #[test]
    fn test_live_state_from_cache() {
        let mut engine = PaceEngine::new(history(5, 90));
        let round = live_round(&["ada", "bo", "cy"]);

        let state = engine
            .live_state(&round, LiveProgress::new(9, 40.0), t0())
            .unwrap();
        assert!(state.is_ahead);
        assert_eq!(state.status(), PaceStatus::Ahead);

        engine
            .live_state(&round, LiveProgress::new(10, 44.0), t0())
            .unwrap();
        assert_eq!(engine.stats().baseline_computations, 1);
    }

    #[test]
    fn test_insufficient_history_calculates() {
        let mut engine = PaceEngine::new(history(2, 90));
        let state = engine
            .live_state(&live_round(&["ada"]), LiveProgress::new(3, 12.0), t0())
            .unwrap();
        assert_eq!(state.status(), PaceStatus::Calculating);
        assert_eq!(state.estimated_total_minutes, 0.0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut engine = PaceEngine::new(history(5, 90));
        let round = live_round(&["ada"]);
        engine.baseline(&round).unwrap();

        assert!(engine.cached_baseline("live-1").is_some());
        assert!(engine.invalidate("live-1"));
        assert!(!engine.invalidate("live-1"));
        assert!(engine.cached_baseline("live-1").is_none());

        engine.baseline(&round).unwrap();
        engine.clear_cache();
        assert_eq!(engine.stats().cached_baselines, 0);
    }

    #[test]
    fn test_empty_round_id_rejected() {
        let mut engine = PaceEngine::new(history(5, 90));
        let round = ActiveRound::new("  ", "park", "long", 18, ["ada"]);
        let err = engine.baseline(&round).unwrap_err();
        assert!(matches!(err, PaceError::InvalidRound { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PaceConfig {
            min_samples: 0,
            ..PaceConfig::default()
        };
        assert!(PaceEngine::with_config(history(1, 90), config).is_err());
    }

    #[test]
    fn test_batch_baselines() {
        let mut engine = PaceEngine::new(history(6, 80));
        let rounds = vec![
            ActiveRound::new("a", "park", "long", 18, ["ada", "bo", "cy"]),
            ActiveRound::new("b", "park", "long", 18, ["ada"]),
            ActiveRound::new("c", "park", "short", 18, ["ada"]),
        ];

        let baselines = engine.baselines_for_rounds(&rounds).unwrap();
        assert_eq!(baselines.len(), 3);
        assert_eq!(baselines[0].adjusted_duration_minutes, 80.0);
        assert!((baselines[1].adjusted_duration_minutes - 68.0).abs() < 1e-9);
        assert_eq!(baselines[2].sample_count, 0);
        assert_eq!(engine.stats().cached_baselines, 3);

        // Cached afterwards
        engine.baseline(&rounds[1]).unwrap();
        assert_eq!(engine.stats().cache_hits, 1);
    }

    #[test]
    fn test_cache_capacity() {
        let mut engine = PaceEngine::new(history(5, 90)).with_cache_size(2);
        for id in ["r1", "r2", "r3"] {
            engine
                .baseline(&ActiveRound::new(id, "park", "long", 18, ["ada"]))
                .unwrap();
        }
        let stats = engine.stats();
        assert_eq!(stats.cached_baselines, 2);
        assert_eq!(stats.cache_capacity, 2);
        assert!(engine.cached_baseline("r1").is_none());
    }
}

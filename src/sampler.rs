//! # Historical Duration Sampler
//!
//! Collects the evidence a baseline is built from: completed rounds on the
//! same course and layout whose durations fall inside the plausibility window.
//!
//! The recency bias is a hard cutoff (most recent `sample_limit` qualifying
//! rounds by completion time), not decay weighting. An empty result is the
//! normal "insufficient data" input to the factor calculator, not an error.

use log::debug;

use crate::{CompletedRound, PaceConfig, PlausibilityWindow, Result, RoundDurationSample};

/// Read access to historical completed rounds.
///
/// Implementations return rounds for the given course and layout. They may
/// use `window` and `limit` to narrow the query, but a source that applies
/// `limit` must apply `window` first and order by completion time descending,
/// so the cutoff only ever drops older qualifying rounds.
pub trait RoundSource {
    fn completed_rounds(
        &self,
        course_id: &str,
        layout: &str,
        window: &PlausibilityWindow,
        limit: usize,
    ) -> Result<Vec<CompletedRound>>;
}

impl<T: RoundSource + ?Sized> RoundSource for &T {
    fn completed_rounds(
        &self,
        course_id: &str,
        layout: &str,
        window: &PlausibilityWindow,
        limit: usize,
    ) -> Result<Vec<CompletedRound>> {
        (**self).completed_rounds(course_id, layout, window, limit)
    }
}

impl<T: RoundSource + ?Sized> RoundSource for Box<T> {
    fn completed_rounds(
        &self,
        course_id: &str,
        layout: &str,
        window: &PlausibilityWindow,
        limit: usize,
    ) -> Result<Vec<CompletedRound>> {
        (**self).completed_rounds(course_id, layout, window, limit)
    }
}

/// A round source backed by a plain vector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoundSource {
    rounds: Vec<CompletedRound>,
}

impl InMemoryRoundSource {
    pub fn new(rounds: Vec<CompletedRound>) -> Self {
        Self { rounds }
    }

    /// Add a round, replacing any existing round with the same id.
    pub fn insert(&mut self, round: CompletedRound) {
        self.rounds.retain(|r| r.round_id != round.round_id);
        self.rounds.push(round);
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

impl RoundSource for InMemoryRoundSource {
    fn completed_rounds(
        &self,
        course_id: &str,
        layout: &str,
        _window: &PlausibilityWindow,
        _limit: usize,
    ) -> Result<Vec<CompletedRound>> {
        Ok(self
            .rounds
            .iter()
            .filter(|r| r.course_id == course_id && r.layout == layout)
            .cloned()
            .collect())
    }
}

/// Reduce raw rounds to the qualifying sample set.
///
/// Keeps rounds with both timestamps whose duration lies in the plausibility
/// window for `total_holes`, newest first, truncated to `config.sample_limit`.
pub fn filter_qualifying(
    rounds: Vec<CompletedRound>,
    total_holes: u32,
    config: &PaceConfig,
) -> Vec<RoundDurationSample> {
    let window = PlausibilityWindow::for_holes(total_holes, config);

    let mut samples: Vec<RoundDurationSample> = rounds
        .into_iter()
        .filter_map(CompletedRound::into_sample)
        .filter(|s| window.contains(s.duration_minutes()))
        .collect();

    samples.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    samples.truncate(config.sample_limit);
    samples
}

/// Fetches and filters historical rounds for a course layout.
#[derive(Debug, Clone)]
pub struct HistoricalDurationSampler<S> {
    source: S,
    config: PaceConfig,
}

impl<S: RoundSource> HistoricalDurationSampler<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, PaceConfig::default())
    }

    pub fn with_config(source: S, config: PaceConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn config(&self) -> &PaceConfig {
        &self.config
    }

    /// Qualifying samples for `course_id`/`layout`, most recent first.
    pub fn sample(
        &self,
        course_id: &str,
        layout: &str,
        total_holes: u32,
    ) -> Result<Vec<RoundDurationSample>> {
        let window = PlausibilityWindow::for_holes(total_holes, &self.config);
        let rounds =
            self.source
                .completed_rounds(course_id, layout, &window, self.config.sample_limit)?;
        let fetched = rounds.len();

        let samples = filter_qualifying(rounds, total_holes, &self.config);

        debug!(
            "[Sampler] {}/{}: {} of {} rounds qualify (window {:.1}-{:.1} min)",
            course_id,
            layout,
            samples.len(),
            fetched,
            window.min_minutes,
            window.max_minutes
        );

        Ok(samples)
    }
}

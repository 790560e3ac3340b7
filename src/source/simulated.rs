//! Deterministic simulated metric source
//!
//! Each (entity, metric) series is a bounded random walk driven by a seeded
//! ChaCha8 generator, with occasional larger shocks so the monitor has
//! something to alert on. The same seed always produces the same readings
//! for the same sequence of calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, VecDeque};

use super::{MetricSource, SourceResult};
use crate::models::MetricKind;

/// Readings kept per series
const HISTORY_LIMIT: usize = 64;

/// Walk parameters for one metric kind
#[derive(Debug, Clone, Copy)]
struct WalkProfile {
    base: f64,
    spread: f64,
    step: f64,
    shock: f64,
    min: f64,
    max: f64,
}

impl WalkProfile {
    fn for_kind(kind: MetricKind) -> Self {
        match kind {
            MetricKind::SupportRate => Self {
                base: 0.35,
                spread: 0.10,
                step: 0.01,
                shock: 0.06,
                min: 0.0,
                max: 1.0,
            },
            MetricKind::RecognitionRate => Self {
                base: 0.55,
                spread: 0.15,
                step: 0.015,
                shock: 0.08,
                min: 0.0,
                max: 1.0,
            },
            MetricKind::PollMargin => Self {
                base: 0.06,
                spread: 0.04,
                step: 0.01,
                shock: 0.06,
                min: -1.0,
                max: 1.0,
            },
            MetricKind::MediaCoverage => Self {
                base: 20.0,
                spread: 10.0,
                step: 3.0,
                shock: 40.0,
                min: 0.0,
                max: f64::MAX,
            },
            MetricKind::CampaignActivity => Self {
                base: 6.0,
                spread: 3.0,
                step: 1.0,
                shock: 8.0,
                min: 0.0,
                max: f64::MAX,
            },
            MetricKind::SocialSentiment => Self {
                base: 0.05,
                spread: 0.2,
                step: 0.04,
                shock: 0.3,
                min: -1.0,
                max: 1.0,
            },
        }
    }
}

#[derive(Debug)]
struct State {
    rng: ChaCha8Rng,
    series: HashMap<(String, MetricKind), VecDeque<f64>>,
}

/// Simulated source backed by seeded random walks
#[derive(Debug)]
pub struct SimulatedSource {
    state: Mutex<State>,
    shock_probability: f64,
    warmup: usize,
}

impl SimulatedSource {
    /// Create a source with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(State {
                rng: ChaCha8Rng::seed_from_u64(seed),
                series: HashMap::new(),
            }),
            shock_probability: 0.05,
            warmup: 10,
        }
    }

    /// Set the per-step probability of a shock (clamped to 0.0 - 1.0)
    pub fn with_shock_probability(mut self, probability: f64) -> Self {
        self.shock_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Number of readings generated when a series is first touched
    pub fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup;
        self
    }

    /// Advance a series by one step and return the new reading
    fn advance(&self, entity_id: &str, kind: MetricKind) -> f64 {
        let profile = WalkProfile::for_kind(kind);
        let mut guard = self.state.lock();
        let State { rng, series } = &mut *guard;

        let history = series
            .entry((entity_id.to_string(), kind))
            .or_insert_with(|| {
                let mut history = VecDeque::with_capacity(HISTORY_LIMIT);
                history.push_back(profile.base + rng.gen_range(-profile.spread..=profile.spread));
                history
            });

        while history.len() < self.warmup {
            let next = Self::step(rng, profile, history, self.shock_probability);
            push_bounded(history, next);
        }

        let next = Self::step(rng, profile, history, self.shock_probability);
        push_bounded(history, next);
        next
    }

    fn step(
        rng: &mut ChaCha8Rng,
        profile: WalkProfile,
        history: &VecDeque<f64>,
        shock_probability: f64,
    ) -> f64 {
        let last = history.back().copied().unwrap_or(profile.base);
        let delta = if rng.gen_bool(shock_probability) {
            let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            sign * profile.shock
        } else {
            rng.gen_range(-profile.step..=profile.step)
        };
        (last + delta).clamp(profile.min, profile.max)
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64) {
    if history.len() >= HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(value);
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(2025)
    }
}

#[async_trait]
impl MetricSource for SimulatedSource {
    async fn fetch_metric(&self, entity_id: &str, kind: MetricKind) -> SourceResult<f64> {
        Ok(self.advance(entity_id, kind))
    }

    async fn fetch_previous(&self, entity_id: &str, kind: MetricKind) -> SourceResult<Option<f64>> {
        let state = self.state.lock();
        Ok(state
            .series
            .get(&(entity_id.to_string(), kind))
            .and_then(|h| h.iter().rev().nth(1).copied()))
    }

    async fn fetch_history(
        &self,
        entity_id: &str,
        kind: MetricKind,
        limit: usize,
    ) -> SourceResult<Vec<f64>> {
        let state = self.state.lock();
        Ok(state
            .series
            .get(&(entity_id.to_string(), kind))
            .map(|h| h.iter().skip(h.len().saturating_sub(limit)).copied().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

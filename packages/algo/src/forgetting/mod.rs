//! Forgetting Curve Model
//!
//! Mastery regresses toward a baseline B while a skill is not practiced:
//!
//!   m(t) = B + (m0 - B) * exp(-λ t)
//!
//! - λ: decay rate per hour (0 disables decay)
//! - t: hours since the state was last brought current
//! - B: configured floor, or the skill prior P(L0)
//!
//! Decay composes over time (decaying t1 then t2 equals decaying t1 + t2), so
//! a caller may persist a decayed value and restamp `updated_at` freely.
//!
//! The module also owns the spaced-review schedule used by the recommender's
//! spacing term.

use crate::error::AlgoError;
use crate::sanitize::{clamp_probability, ensure_probability, ensure_rate};
use crate::types::{KnowledgeState, ModelParameters, MS_PER_DAY, MS_PER_HOUR};

// ==================== Constants ====================

/// Review intervals in days, indexed by observation count
pub const DEFAULT_REVIEW_INTERVALS_DAYS: [f64; 6] = [1.0, 2.0, 4.0, 7.0, 15.0, 30.0];

// ==================== Decay ====================

/// Stateless exponential decay toward a baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForgettingCurve {
    rate_per_hour: f64,
    baseline: f64,
}

impl ForgettingCurve {
    pub fn new(rate_per_hour: f64, baseline: f64) -> Result<Self, AlgoError> {
        Ok(Self {
            rate_per_hour: ensure_rate("decay_rate", rate_per_hour)?,
            baseline: ensure_probability("decay_baseline", baseline)?,
        })
    }

    pub fn from_params(params: &ModelParameters) -> Result<Self, AlgoError> {
        Self::new(params.decay_rate, params.baseline())
    }

    pub fn rate_per_hour(&self) -> f64 {
        self.rate_per_hour
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Fraction of the distance to the baseline still retained after `elapsed_ms`
    pub fn retention(&self, elapsed_ms: i64) -> f64 {
        if elapsed_ms <= 0 || self.rate_per_hour == 0.0 {
            return 1.0;
        }
        let hours = elapsed_ms as f64 / MS_PER_HOUR;
        (-self.rate_per_hour * hours).exp()
    }

    /// Decay `mastery` from `last` to `now`
    pub fn decay(&self, mastery: f64, last: i64, now: i64) -> Result<f64, AlgoError> {
        ensure_probability("mastery_probability", mastery)?;
        if now < last {
            return Err(AlgoError::InvalidTimestamp { now, last });
        }
        let elapsed = now - last;
        // exact identity; B + (m - B) is not always m in floating point
        if elapsed == 0 || self.rate_per_hour == 0.0 {
            return Ok(mastery);
        }
        let retained = self.retention(elapsed);
        Ok(clamp_probability(
            self.baseline + (mastery - self.baseline) * retained,
        ))
    }
}

/// Bring a state current to `now`
///
/// Never-practiced states carry only the prior and are returned untouched
/// apart from the timestamp check.
pub fn decay_state(
    state: &KnowledgeState,
    now: i64,
    params: &ModelParameters,
) -> Result<KnowledgeState, AlgoError> {
    if now < state.updated_at {
        return Err(AlgoError::InvalidTimestamp {
            now,
            last: state.updated_at,
        });
    }
    if state.last_practiced_at.is_none() {
        return Ok(*state);
    }

    let curve = ForgettingCurve::from_params(params)?;
    let mastery = curve.decay(state.mastery_probability, state.updated_at, now)?;

    Ok(KnowledgeState {
        mastery_probability: mastery,
        updated_at: now,
        ..*state
    })
}

// ==================== Review Schedule ====================

/// Target gap before the next review, in milliseconds
///
/// Counts past the end of the schedule reuse its last entry. An empty
/// schedule falls back to the default one.
pub fn review_interval_ms(observation_count: u32, schedule_days: &[f64]) -> f64 {
    let schedule = if schedule_days.is_empty() {
        &DEFAULT_REVIEW_INTERVALS_DAYS[..]
    } else {
        schedule_days
    };
    let idx = (observation_count as usize).min(schedule.len() - 1);
    schedule[idx] * MS_PER_DAY
}

/// When the skill falls due, `None` if never practiced
pub fn next_review_at(state: &KnowledgeState, schedule_days: &[f64]) -> Option<i64> {
    let last = state.last_practiced_at?;
    let interval = review_interval_ms(state.observation_count, schedule_days);
    Some(last.saturating_add(interval.round() as i64))
}

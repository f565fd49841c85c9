//! Common Types and Constants
//!
//! Shared data structures used across all algorithm modules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AlgoError;
use crate::sanitize::{ensure_band, ensure_probability, ensure_rate};

// ==================== Constants ====================

/// Numerical stability epsilon for Bayes denominators
pub const EPSILON: f64 = 1e-12;

pub const MS_PER_HOUR: f64 = 3_600_000.0;
pub const MS_PER_DAY: f64 = 86_400_000.0;

pub const DEFAULT_PRIOR_MASTERY: f64 = 0.1;
pub const DEFAULT_TRANSIT: f64 = 0.3;
pub const DEFAULT_SLIP: f64 = 0.1;
pub const DEFAULT_GUESS: f64 = 0.1;

/// 0.1 per day, expressed per hour
pub const DEFAULT_DECAY_RATE: f64 = 0.1 / 24.0;

/// Zone of maximal informativeness
pub const DEFAULT_TARGET_BAND: (f64, f64) = (0.4, 0.8);

/// Attempts after which the observed correct rate replaces the catalog difficulty
pub const EMPIRICAL_DIFFICULTY_MIN_ATTEMPTS: u32 = 6;

// ==================== Model Parameters ====================

/// Per-skill BKT and decay parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelParameters {
    /// P(L0), mastery assumed before any observation
    pub prior_mastery: f64,
    /// P(T), chance of learning during one attempt
    pub transit: f64,
    /// P(S), wrong answer despite mastery
    pub slip: f64,
    /// P(G), right answer without mastery
    pub guess: f64,
    /// λ per hour
    pub decay_rate: f64,
    /// Decay floor; `None` decays toward `prior_mastery`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_baseline: Option<f64>,
    pub target_mastery_band: (f64, f64),
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            prior_mastery: DEFAULT_PRIOR_MASTERY,
            transit: DEFAULT_TRANSIT,
            slip: DEFAULT_SLIP,
            guess: DEFAULT_GUESS,
            decay_rate: DEFAULT_DECAY_RATE,
            decay_baseline: None,
            target_mastery_band: DEFAULT_TARGET_BAND,
        }
    }
}

impl ModelParameters {
    /// Baseline B the forgetting curve regresses toward
    pub fn baseline(&self) -> f64 {
        self.decay_baseline.unwrap_or(self.prior_mastery)
    }

    /// Hard-check every value and collect soft warnings
    ///
    /// Out-of-range values are errors. A slip/guess pair summing to 1 or more
    /// makes correct and incorrect answers indistinguishable (or inverted); that
    /// is reported as a warning and left to the caller.
    pub fn validate(&self) -> Result<Vec<ParameterWarning>, AlgoError> {
        ensure_probability("prior_mastery", self.prior_mastery)?;
        ensure_probability("transit", self.transit)?;
        ensure_probability("slip", self.slip)?;
        ensure_probability("guess", self.guess)?;
        ensure_rate("decay_rate", self.decay_rate)?;
        if let Some(baseline) = self.decay_baseline {
            ensure_probability("decay_baseline", baseline)?;
        }
        ensure_band("target_mastery_band", self.target_mastery_band)?;

        let mut warnings = Vec::new();
        if self.slip + self.guess >= 1.0 {
            warnings.push(ParameterWarning::DegenerateSlipGuess {
                slip: self.slip,
                guess: self.guess,
            });
        }
        Ok(warnings)
    }
}

/// Non-fatal parameter findings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterWarning {
    DegenerateSlipGuess { slip: f64, guess: f64 },
}

impl fmt::Display for ParameterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterWarning::DegenerateSlipGuess { slip, guess } => write!(
                f,
                "slip ({slip}) + guess ({guess}) >= 1: answers carry no evidence about mastery"
            ),
        }
    }
}

// ==================== Knowledge State ====================

/// Mastery estimate for one (user, skill) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeState {
    /// Always within [0, 1]
    pub mastery_probability: f64,
    /// Timestamp (ms) of the last folded-in answer
    pub last_practiced_at: Option<i64>,
    /// Timestamp (ms) the probability was last brought current
    pub updated_at: i64,
    pub observation_count: u32,
}

impl KnowledgeState {
    pub fn new(prior_mastery: f64, created_at: i64) -> Self {
        Self {
            mastery_probability: prior_mastery,
            last_practiced_at: None,
            updated_at: created_at,
            observation_count: 0,
        }
    }

    /// Milliseconds since the last answer, `None` if never practiced
    pub fn elapsed_since_practice(&self, now: i64) -> Option<i64> {
        self.last_practiced_at.map(|ts| (now - ts).max(0))
    }
}

// ==================== Question Metadata ====================

/// Ordinal difficulty band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    Easy,
    Medium,
    Hard,
}

impl DifficultyBand {
    pub fn level(&self) -> f64 {
        match self {
            DifficultyBand::Easy => 0.25,
            DifficultyBand::Medium => 0.5,
            DifficultyBand::Hard => 0.75,
        }
    }
}

/// Question difficulty, either a value in [0, 1] or an ordinal band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Difficulty {
    Value(f64),
    Band(DifficultyBand),
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Band(DifficultyBand::Medium)
    }
}

impl Difficulty {
    pub fn level(&self) -> f64 {
        match self {
            Difficulty::Value(v) => crate::sanitize::clamp_probability(*v),
            Difficulty::Band(band) => band.level(),
        }
    }

    pub fn validate(&self) -> Result<(), AlgoError> {
        if let Difficulty::Value(v) = self {
            ensure_probability("difficulty", *v)?;
        }
        Ok(())
    }
}

/// One user's answer tally on one question
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionHistory {
    pub attempts: u32,
    pub correct: u32,
}

impl QuestionHistory {
    pub fn record(&mut self, correct: bool) {
        self.attempts = self.attempts.saturating_add(1);
        if correct {
            self.correct = self.correct.saturating_add(1);
        }
    }

    pub fn correct_rate(&self) -> Option<f64> {
        if self.attempts == 0 {
            None
        } else {
            Some(self.correct as f64 / self.attempts as f64)
        }
    }

    /// 1 - correct rate, once enough attempts have been seen
    pub fn empirical_difficulty(&self) -> Option<f64> {
        if self.attempts < EMPIRICAL_DIFFICULTY_MIN_ATTEMPTS {
            return None;
        }
        self.correct_rate().map(|rate| 1.0 - rate)
    }

    /// Retired questions leave the candidate pool; 0 disables retirement
    pub fn is_retired(&self, retire_after_correct: u32) -> bool {
        retire_after_correct > 0 && self.correct >= retire_after_correct
    }
}

//! Question Recommender
//!
//! Scores each candidate question against the state of its primary skill:
//!
//! - gap: 1 inside the target mastery band, falling linearly to 0 at the
//!   far edge of [0, 1]
//! - spacing: 1 - exp(-elapsed / interval), interval taken from the review
//!   schedule; never-practiced skills score 1
//! - difficulty: exp(-(d - m)^2 / (2 w^2)), ZPD-style match of question
//!   difficulty d to mastery m
//! - novelty: 1 / (1 + attempts) on the question itself
//!
//! score = Σ weight_i * term_i
//!
//! Ties break on longer elapsed time since practice (never practiced is the
//! longest), then on the lower question id. The ordering is total, so equal
//! inputs always give the same sequence.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AlgoError;
use crate::forgetting::{review_interval_ms, DEFAULT_REVIEW_INTERVALS_DAYS};
use crate::sanitize::{clamp_probability, ensure_rate};

// ==================== Constants ====================

/// Pools at least this large are scored on the rayon pool
const PARALLEL_THRESHOLD: usize = 512;

const DEFAULT_GAP_WEIGHT: f64 = 0.4;
const DEFAULT_SPACING_WEIGHT: f64 = 0.3;
const DEFAULT_DIFFICULTY_WEIGHT: f64 = 0.2;
const DEFAULT_NOVELTY_WEIGHT: f64 = 0.1;
const DEFAULT_DIFFICULTY_WIDTH: f64 = 0.25;
const DEFAULT_RETIRE_AFTER_CORRECT: u32 = 3;

// ==================== Data Structures ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommenderConfig {
    pub gap_weight: f64,
    pub spacing_weight: f64,
    pub difficulty_weight: f64,
    pub novelty_weight: f64,
    /// Width of the difficulty-match bell curve
    pub difficulty_width: f64,
    /// Caps how many candidates are scored per request
    pub max_candidates: Option<usize>,
    /// Correct answers after which a question leaves the pool (0 = never)
    pub retire_after_correct: u32,
    pub review_intervals_days: Vec<f64>,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            gap_weight: DEFAULT_GAP_WEIGHT,
            spacing_weight: DEFAULT_SPACING_WEIGHT,
            difficulty_weight: DEFAULT_DIFFICULTY_WEIGHT,
            novelty_weight: DEFAULT_NOVELTY_WEIGHT,
            difficulty_width: DEFAULT_DIFFICULTY_WIDTH,
            max_candidates: None,
            retire_after_correct: DEFAULT_RETIRE_AFTER_CORRECT,
            review_intervals_days: DEFAULT_REVIEW_INTERVALS_DAYS.to_vec(),
        }
    }
}

impl RecommenderConfig {
    pub fn validate(&self) -> Result<(), AlgoError> {
        ensure_rate("gap_weight", self.gap_weight)?;
        ensure_rate("spacing_weight", self.spacing_weight)?;
        ensure_rate("difficulty_weight", self.difficulty_weight)?;
        ensure_rate("novelty_weight", self.novelty_weight)?;
        if !(self.difficulty_width.is_finite() && self.difficulty_width > 0.0) {
            return Err(AlgoError::InvalidParameter {
                name: "difficulty_width",
                value: self.difficulty_width,
            });
        }
        if self.max_candidates == Some(0) {
            return Err(AlgoError::InvalidParameter {
                name: "max_candidates",
                value: 0.0,
            });
        }
        for &days in &self.review_intervals_days {
            if !(days.is_finite() && days > 0.0) {
                return Err(AlgoError::InvalidParameter {
                    name: "review_intervals_days",
                    value: days,
                });
            }
        }
        Ok(())
    }
}

/// A question still available to the user
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuestion {
    pub question_id: String,
    /// Primary skill, the first one listed on the question
    pub skill_id: String,
    /// Effective difficulty in [0, 1]
    pub difficulty: f64,
    /// The user's attempts on this question
    pub attempts: u32,
}

/// Decayed view of one skill at ranking time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillSnapshot {
    pub mastery: f64,
    /// Milliseconds since last practice, `None` if never practiced
    pub elapsed_ms: Option<i64>,
    pub observation_count: u32,
    pub target_band: (f64, f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub gap: f64,
    pub spacing: f64,
    pub difficulty: f64,
    pub novelty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredQuestion {
    pub question_id: String,
    pub skill_id: String,
    pub score: f64,
    pub elapsed_ms: Option<i64>,
    pub breakdown: ScoreBreakdown,
}

// ==================== Scoring Terms ====================

/// Closeness of mastery to the target band
pub fn gap_term(mastery: f64, band: (f64, f64)) -> f64 {
    let (low, high) = band;
    let m = clamp_probability(mastery);
    if m < low {
        1.0 - (low - m) / low
    } else if m > high {
        let span = 1.0 - high;
        if span <= 0.0 {
            1.0
        } else {
            1.0 - (m - high) / span
        }
    } else {
        1.0
    }
}

/// Overdue pressure, increasing with elapsed time
pub fn spacing_term(elapsed_ms: Option<i64>, observation_count: u32, schedule_days: &[f64]) -> f64 {
    match elapsed_ms {
        None => 1.0,
        Some(elapsed) => {
            let interval = review_interval_ms(observation_count, schedule_days);
            1.0 - (-(elapsed.max(0) as f64) / interval).exp()
        }
    }
}

/// Penalty for a difficulty far from the current mastery level
pub fn difficulty_term(difficulty: f64, mastery: f64, width: f64) -> f64 {
    let distance = difficulty - mastery;
    (-distance.powi(2) / (2.0 * width.powi(2))).exp()
}

pub fn novelty_term(attempts: u32) -> f64 {
    1.0 / (1.0 + attempts as f64)
}

pub fn score_candidate(
    candidate: &CandidateQuestion,
    skill: &SkillSnapshot,
    config: &RecommenderConfig,
) -> ScoredQuestion {
    let breakdown = ScoreBreakdown {
        gap: gap_term(skill.mastery, skill.target_band),
        spacing: spacing_term(
            skill.elapsed_ms,
            skill.observation_count,
            &config.review_intervals_days,
        ),
        difficulty: difficulty_term(candidate.difficulty, skill.mastery, config.difficulty_width),
        novelty: novelty_term(candidate.attempts),
    };

    let score = config.gap_weight * breakdown.gap
        + config.spacing_weight * breakdown.spacing
        + config.difficulty_weight * breakdown.difficulty
        + config.novelty_weight * breakdown.novelty;

    ScoredQuestion {
        question_id: candidate.question_id.clone(),
        skill_id: candidate.skill_id.clone(),
        score,
        elapsed_ms: skill.elapsed_ms,
        breakdown,
    }
}

// ==================== Ordering ====================

/// `Greater` means `a` is presented before `b`
pub fn rank_cmp(a: &ScoredQuestion, b: &ScoredQuestion) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| match (a.elapsed_ms, b.elapsed_ms) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.cmp(&y),
        })
        .then_with(|| b.question_id.cmp(&a.question_id))
}

struct Ranked<'a>(&'a ScoredQuestion);

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        rank_cmp(self.0, other.0) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_cmp(self.0, other.0)
    }
}

// ==================== Ranking ====================

/// Scored candidates, consumed in descending order
///
/// Building a `Ranking` scores every candidate once; ordering is deferred.
/// Each call to [`Ranking::iter`] restarts from the best question and only
/// pays for the prefix it yields.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    scored: Vec<ScoredQuestion>,
}

impl Ranking {
    pub fn len(&self) -> usize {
        self.scored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty()
    }

    pub fn iter(&self) -> RankingIter<'_> {
        RankingIter {
            heap: self.scored.iter().map(Ranked).collect(),
        }
    }

    /// Best `k` questions, fully ordered
    pub fn top_k(&self, k: usize) -> Vec<&ScoredQuestion> {
        if k == 0 {
            return Vec::new();
        }
        let mut refs: Vec<&ScoredQuestion> = self.scored.iter().collect();
        if k < refs.len() {
            refs.select_nth_unstable_by(k - 1, |a, b| rank_cmp(b, a));
            refs.truncate(k);
        }
        refs.sort_unstable_by(|a, b| rank_cmp(b, a));
        refs
    }

    pub fn question_ids(&self, k: usize) -> Vec<String> {
        self.top_k(k)
            .into_iter()
            .map(|q| q.question_id.clone())
            .collect()
    }

    /// Entire ranking, materialized
    pub fn into_sorted_vec(mut self) -> Vec<ScoredQuestion> {
        self.scored.sort_unstable_by(|a, b| rank_cmp(b, a));
        self.scored
    }
}

impl<'a> IntoIterator for &'a Ranking {
    type Item = &'a ScoredQuestion;
    type IntoIter = RankingIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct RankingIter<'a> {
    heap: BinaryHeap<Ranked<'a>>,
}

impl<'a> Iterator for RankingIter<'a> {
    type Item = &'a ScoredQuestion;

    fn next(&mut self) -> Option<Self::Item> {
        self.heap.pop().map(|r| r.0)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.heap.len(), Some(self.heap.len()))
    }
}

impl ExactSizeIterator for RankingIter<'_> {}

/// Score a candidate pool
///
/// Candidates whose skill has no snapshot are skipped. With `max_candidates`
/// set, only the first N candidates by question id are scored. Fails with
/// [`AlgoError::EmptyCandidatePool`] when no candidate is left at all.
pub fn rank(
    candidates: Vec<CandidateQuestion>,
    skills: &HashMap<String, SkillSnapshot>,
    config: &RecommenderConfig,
) -> Result<Ranking, AlgoError> {
    rank_bounded(candidates, skills, config, None)
}

/// [`rank`] with a caller-imposed bound on top of `max_candidates`
///
/// The bound only limits how much is scored; a bound of 0 yields an empty
/// ranking, not [`AlgoError::EmptyCandidatePool`].
pub fn rank_bounded(
    mut candidates: Vec<CandidateQuestion>,
    skills: &HashMap<String, SkillSnapshot>,
    config: &RecommenderConfig,
    bound: Option<usize>,
) -> Result<Ranking, AlgoError> {
    config.validate()?;

    candidates.retain(|c| skills.contains_key(&c.skill_id));
    if candidates.is_empty() {
        return Err(AlgoError::EmptyCandidatePool);
    }
    candidates.sort_unstable_by(|a, b| a.question_id.cmp(&b.question_id));
    let limit = match (config.max_candidates, bound) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    if let Some(limit) = limit {
        candidates.truncate(limit);
    }

    let score = |c: &CandidateQuestion| {
        // retained above, the lookup cannot miss
        skills
            .get(&c.skill_id)
            .map(|skill| score_candidate(c, skill, config))
    };

    let scored: Vec<ScoredQuestion> = if candidates.len() >= PARALLEL_THRESHOLD {
        candidates.par_iter().filter_map(score).collect()
    } else {
        candidates.iter().filter_map(score).collect()
    };

    Ok(Ranking { scored })
}

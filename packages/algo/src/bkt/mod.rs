//! Bayesian Knowledge Tracing
//!
//! Core theory:
//! - Mastery is a hidden binary state; answers are noisy observations of it
//! - Slip P(S): wrong answer although the skill is mastered
//! - Guess P(G): right answer although it is not
//! - Transit P(T): chance the attempt itself moves the learner to mastery
//!
//! Update, one observation at a time:
//! - Correct:   P(L|obs) = P(L)(1-S) / (P(L)(1-S) + (1-P(L))G)
//! - Incorrect: P(L|obs) = P(L)S / (P(L)S + (1-P(L))(1-G))
//! - Transit:   P(L') = P(L|obs) + (1-P(L|obs))T
//!
//! A numerically zero denominator (prior at 0 or 1 with extreme S/G) skips
//! the evidence step: the posterior equals the prior.
//!
//! References:
//! - Corbett, A. T., & Anderson, J. R. (1994). Knowledge tracing.

use crate::error::AlgoError;
use crate::sanitize::{clamp_probability, ensure_probability};
use crate::types::{KnowledgeState, ModelParameters, EPSILON};

/// Intermediate values of one update, kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BktStep {
    pub prior: f64,
    pub posterior: f64,
    pub mastery: f64,
    /// True when the evidence step was skipped
    pub degenerate: bool,
}

/// Evidence step only
pub fn posterior(prior: f64, correct: bool, slip: f64, guess: f64) -> (f64, bool) {
    let (numerator, denominator) = if correct {
        let mastered = prior * (1.0 - slip);
        (mastered, mastered + (1.0 - prior) * guess)
    } else {
        let mastered = prior * slip;
        (mastered, mastered + (1.0 - prior) * (1.0 - guess))
    };

    if denominator.abs() < EPSILON {
        return (prior, true);
    }
    (clamp_probability(numerator / denominator), false)
}

/// Learning transit step
pub fn transit(posterior: f64, p_transit: f64) -> f64 {
    clamp_probability(posterior + (1.0 - posterior) * p_transit)
}

/// Full update of a bare probability
pub fn step(prior: f64, correct: bool, params: &ModelParameters) -> Result<BktStep, AlgoError> {
    ensure_probability("prior_mastery", prior)?;
    let slip = ensure_probability("slip", params.slip)?;
    let guess = ensure_probability("guess", params.guess)?;
    let p_transit = ensure_probability("transit", params.transit)?;

    let (posterior, degenerate) = posterior(prior, correct, slip, guess);
    let mastery = transit(posterior, p_transit);

    Ok(BktStep {
        prior,
        posterior,
        mastery,
        degenerate,
    })
}

pub fn update_mastery(
    prior: f64,
    correct: bool,
    params: &ModelParameters,
) -> Result<f64, AlgoError> {
    step(prior, correct, params).map(|s| s.mastery)
}

/// Fold one answer into a state that has already been decayed to `timestamp`
///
/// Increments the observation count and stamps both `last_practiced_at` and
/// `updated_at` with the answer time.
pub fn apply_observation(
    state: &KnowledgeState,
    correct: bool,
    timestamp: i64,
    params: &ModelParameters,
) -> Result<KnowledgeState, AlgoError> {
    if timestamp < state.updated_at {
        return Err(AlgoError::InvalidTimestamp {
            now: timestamp,
            last: state.updated_at,
        });
    }

    let mastery = update_mastery(state.mastery_probability, correct, params)?;

    Ok(KnowledgeState {
        mastery_probability: mastery,
        last_practiced_at: Some(timestamp),
        updated_at: timestamp,
        observation_count: state.observation_count.saturating_add(1),
    })
}

/// Mastery after a whole answer sequence, starting from the prior
pub fn replay<I>(answers: I, params: &ModelParameters) -> Result<f64, AlgoError>
where
    I: IntoIterator<Item = bool>,
{
    answers
        .into_iter()
        .try_fold(params.prior_mastery, |mastery, correct| {
            update_mastery(mastery, correct, params)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_params() -> ModelParameters {
        ModelParameters {
            prior_mastery: 0.3,
            transit: 0.1,
            slip: 0.1,
            guess: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn test_correct_then_incorrect_scenario() {
        let params = scenario_params();

        let first = step(0.3, true, &params).unwrap();
        assert!((first.posterior - 0.27 / 0.41).abs() < 1e-9);
        assert!((first.mastery - 0.6927).abs() < 1e-4);

        let second = step(first.mastery, false, &params).unwrap();
        assert!((second.posterior - 0.2198).abs() < 1e-4);
        assert!((second.mastery - 0.2978).abs() < 1e-4);
    }

    #[test]
    fn test_repeated_correct_increases_toward_one() {
        let params = scenario_params();
        let mut mastery = params.prior_mastery;
        for _ in 0..30 {
            let next = update_mastery(mastery, true, &params).unwrap();
            assert!(next >= mastery - 1e-12);
            assert!(next <= 1.0);
            mastery = next;
        }
        assert!(mastery > 0.99);
    }

    #[test]
    fn test_repeated_incorrect_never_reaches_zero() {
        let params = scenario_params();
        let mut mastery = 0.9;
        for _ in 0..50 {
            let next = update_mastery(mastery, false, &params).unwrap();
            assert!(next <= mastery + 1e-12);
            assert!(next >= params.transit);
            mastery = next;
        }
        assert!(mastery > 0.0);
    }

    #[test]
    fn test_degenerate_denominator_keeps_prior() {
        let params = ModelParameters {
            slip: 0.0,
            guess: 0.0,
            transit: 0.0,
            ..Default::default()
        };
        // prior 0, correct answer: 0*(1-0) + 1*0 = 0
        let result = step(0.0, true, &params).unwrap();
        assert!(result.degenerate);
        assert_eq!(result.posterior, 0.0);
        assert_eq!(result.mastery, 0.0);

        // prior 1, incorrect answer: 1*0 + 0*1 = 0
        let result = step(1.0, false, &params).unwrap();
        assert!(result.degenerate);
        assert_eq!(result.mastery, 1.0);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let params = ModelParameters {
            slip: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            update_mastery(0.5, true, &params),
            Err(AlgoError::InvalidParameter { name: "slip", .. })
        ));
        assert!(update_mastery(1.5, true, &ModelParameters::default()).is_err());
    }

    #[test]
    fn test_apply_observation_stamps_state() {
        let params = scenario_params();
        let state = KnowledgeState::new(0.3, 1_000);
        let next = apply_observation(&state, true, 2_000, &params).unwrap();
        assert_eq!(next.observation_count, 1);
        assert_eq!(next.last_practiced_at, Some(2_000));
        assert_eq!(next.updated_at, 2_000);
        assert!((next.mastery_probability - 0.6927).abs() < 1e-4);
    }

    #[test]
    fn test_apply_observation_rejects_past_timestamp() {
        let state = KnowledgeState::new(0.3, 5_000);
        let err = apply_observation(&state, true, 4_000, &scenario_params()).unwrap_err();
        assert_eq!(
            err,
            AlgoError::InvalidTimestamp {
                now: 4_000,
                last: 5_000
            }
        );
    }

    #[test]
    fn test_replay_matches_stepwise() {
        let params = scenario_params();
        let replayed = replay([true, false], &params).unwrap();
        assert!((replayed - 0.2978).abs() < 1e-4);
        assert_eq!(replay(std::iter::empty(), &params).unwrap(), 0.3);
    }
}

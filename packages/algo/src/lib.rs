//! # kt-algo - adaptive practice core algorithms
//!
//! Pure Rust implementations of the learning models behind the engine:
//!
//! - **Bayesian Knowledge Tracing** - four-parameter hidden mastery estimate
//! - **Forgetting Curve** - exponential decay of mastery toward a baseline
//! - **Recommender** - gap / spacing / difficulty / novelty scoring with a lazy ranking
//!
//! ## Module layout
//!
//! - [`bkt`] - posterior update and learning transit
//! - [`forgetting`] - time decay and the review-interval schedule
//! - [`recommender`] - candidate scoring, tie-break and ranking
//! - [`sanitize`] - probability validation and defensive clamping
//! - [`types`] - shared types and constants
//! - [`error`] - error type
//!
//! Every function here is stateless and performs no I/O; callers own the
//! state and decide when to persist it.
//!
//! ## Example
//!
//! ```rust
//! use kt_algo::{bkt, forgetting, KnowledgeState, ModelParameters};
//!
//! let params = ModelParameters::default();
//! let state = KnowledgeState::new(params.prior_mastery, 0);
//! let decayed = forgetting::decay_state(&state, 0, &params).unwrap();
//! let updated = bkt::apply_observation(&decayed, true, 0, &params).unwrap();
//! assert!(updated.mastery_probability > state.mastery_probability);
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod bkt;
pub mod error;
pub mod forgetting;
pub mod recommender;
pub mod sanitize;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::AlgoError;
pub use recommender::{
    CandidateQuestion, Ranking, RankingIter, RecommenderConfig, ScoreBreakdown, ScoredQuestion,
    SkillSnapshot,
};
pub use types::*;

#![allow(dead_code)]

use std::sync::Arc;

use kt_engine::kt_algo::{Difficulty, DifficultyBand, ModelParameters};
use kt_engine::{
    EngineConfig, InMemoryCatalog, LearningEngine, ManualClock, MemoryPersistence, Question,
    Skill, StatePersistence,
};

pub const HOUR: i64 = 3_600_000;
/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000;

/// P(L0)=0.3, P(T)=0.1, P(S)=0.1, P(G)=0.2, no decay
pub fn scenario_params() -> ModelParameters {
    ModelParameters {
        prior_mastery: 0.3,
        transit: 0.1,
        slip: 0.1,
        guess: 0.2,
        decay_rate: 0.0,
        ..Default::default()
    }
}

pub fn scenario_config() -> EngineConfig {
    EngineConfig {
        defaults: scenario_params(),
        ..Default::default()
    }
}

/// Two skills; `fractions` has three questions, `decimals` two
pub fn sample_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(
        vec![
            Skill::new("fractions", "Fractions"),
            Skill::new("decimals", "Decimals"),
        ],
        vec![
            Question::new("f-easy", &["fractions"], Difficulty::Value(0.1)),
            Question::new("f-mid", &["fractions"], Difficulty::Band(DifficultyBand::Medium)),
            Question::new("f-hard", &["fractions"], Difficulty::Value(0.9)),
            Question::new("d-easy", &["decimals", "fractions"], Difficulty::Value(0.3)),
            Question::new("d-hard", &["decimals"], Difficulty::Band(DifficultyBand::Hard)),
        ],
    )
}

pub struct Harness {
    pub engine: Arc<LearningEngine>,
    pub clock: Arc<ManualClock>,
    pub persistence: Arc<MemoryPersistence>,
}

pub fn harness(config: EngineConfig) -> Harness {
    harness_with(config, Arc::new(MemoryPersistence::new()))
}

pub fn harness_with(config: EngineConfig, persistence: Arc<MemoryPersistence>) -> Harness {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = LearningEngine::with_clock(
        config,
        Arc::new(sample_catalog()),
        Arc::clone(&persistence) as Arc<dyn StatePersistence>,
        Arc::clone(&clock) as Arc<dyn kt_engine::Clock>,
    )
    .expect("engine builds");
    Harness {
        engine: Arc::new(engine),
        clock,
        persistence,
    }
}

pub fn approx(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

//! # kt-engine - adaptive practice engine
//!
//! Stateful shell around [`kt_algo`]: a per-user knowledge state store,
//! catalog and persistence collaborators, boundary validation of answer
//! events and the three presentation entry points
//! ([`LearningEngine::record_answer`], [`LearningEngine::get_mastery`],
//! [`LearningEngine::next_questions`]).

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod persistence;
pub mod store;

pub use catalog::{CatalogIndex, InMemoryCatalog, Question, QuestionCatalog, Skill};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, LoggingConfig, ParameterOverride, UnknownEntityPolicy};
pub use engine::{LearningEngine, RankOptions, ReplaySummary};
pub use error::EngineError;
pub use events::{AnswerEvent, RawAnswer};
pub use persistence::{JsonFilePersistence, MemoryPersistence, StatePersistence};
pub use store::{KnowledgeStateStore, UserSnapshot};

pub use kt_algo;

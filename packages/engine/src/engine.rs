//! Learning engine
//!
//! Wires the store, catalog, persistence and clock around the pure models in
//! `kt_algo`. Every call names its user explicitly; there is no session
//! state. One user's calls are serialized on that user's store partition,
//! different users proceed in parallel.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use kt_algo::recommender::rank_bounded;
use kt_algo::{
    bkt, forgetting, AlgoError, CandidateQuestion, KnowledgeState, ModelParameters, Ranking,
    SkillSnapshot,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogIndex, QuestionCatalog};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, UnknownEntityPolicy};
use crate::error::EngineError;
use crate::events::{AnswerEvent, RawAnswer};
use crate::persistence::StatePersistence;
use crate::store::{KnowledgeStateStore, UserPartition, UserSnapshot};

/// Per-request ranking knobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankOptions {
    /// Caller-imposed bound on the candidate pool, tighter than the config's
    pub max_candidates: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
    /// Users touched by the replay, sorted
    pub users: Vec<String>,
}

pub struct LearningEngine {
    config: EngineConfig,
    catalog_source: Arc<dyn QuestionCatalog>,
    catalog: RwLock<Arc<CatalogIndex>>,
    persistence: Arc<dyn StatePersistence>,
    clock: Arc<dyn Clock>,
    store: KnowledgeStateStore,
}

impl LearningEngine {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn QuestionCatalog>,
        persistence: Arc<dyn StatePersistence>,
    ) -> Result<Self, EngineError> {
        Self::with_clock(config, catalog, persistence, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        catalog: Arc<dyn QuestionCatalog>,
        persistence: Arc<dyn StatePersistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        for (skill_id, warning) in config.validate()? {
            warn!(skill_id = skill_id.as_deref().unwrap_or("*"), %warning, "model parameters");
        }

        let index = CatalogIndex::build(catalog.as_ref(), config.unknown_entity_policy)?;
        info!(
            questions = index.question_count(),
            skills = index.skill_count(),
            "catalog indexed"
        );

        Ok(Self {
            config,
            catalog_source: catalog,
            catalog: RwLock::new(Arc::new(index)),
            persistence,
            clock,
            store: KnowledgeStateStore::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> Arc<CatalogIndex> {
        Arc::clone(&self.catalog.read())
    }

    /// Re-index the catalog source; in-flight calls keep the old index
    pub fn reload_catalog(&self) -> Result<(), EngineError> {
        let index = CatalogIndex::build(
            self.catalog_source.as_ref(),
            self.config.unknown_entity_policy,
        )?;
        info!(
            questions = index.question_count(),
            skills = index.skill_count(),
            "catalog reloaded"
        );
        *self.catalog.write() = Arc::new(index);
        Ok(())
    }

    // ==================== Users ====================

    /// In-memory partition, falling back to persistence
    fn load_partition(&self, user_id: &str) -> Result<Option<UserPartition>, EngineError> {
        if let Some(partition) = self.store.partition(user_id) {
            return Ok(Some(partition));
        }
        match self.persistence.load_state(user_id)? {
            Some(snapshot) => {
                info!(user_id, skills = snapshot.skills.len(), "user state loaded");
                Ok(Some(
                    self.store.partition_or_insert_with(user_id, move || snapshot),
                ))
            }
            None => Ok(None),
        }
    }

    fn require_partition(&self, user_id: &str) -> Result<UserPartition, EngineError> {
        self.load_partition(user_id)?
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))
    }

    pub fn is_known_user(&self, user_id: &str) -> Result<bool, EngineError> {
        Ok(self.load_partition(user_id)?.is_some())
    }

    /// Returns false when the user already exists
    pub fn register_user(&self, user_id: &str) -> Result<bool, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::InvalidEvent("userId is empty".to_string()));
        }
        if self.load_partition(user_id)?.is_some() {
            return Ok(false);
        }
        let partition = self
            .store
            .partition_or_insert_with(user_id, UserSnapshot::default);
        if self.config.autosave {
            self.persistence.save_state(user_id, &partition.lock())?;
        }
        info!(user_id, "user registered");
        Ok(true)
    }

    /// Forget everything learned about a user, keeping the user registered
    pub fn reset_user(&self, user_id: &str) -> Result<(), EngineError> {
        let partition = self.require_partition(user_id)?;
        let mut snapshot = partition.lock();
        let empty = UserSnapshot::default();
        self.persistence.save_state(user_id, &empty)?;
        *snapshot = empty;
        info!(user_id, "user state reset");
        Ok(())
    }

    /// Drop a user from memory and persistence
    pub fn remove_user(&self, user_id: &str) -> Result<(), EngineError> {
        let partition = self.require_partition(user_id)?;
        let _guard = partition.lock();
        self.persistence.delete_state(user_id)?;
        self.store.remove_user(user_id);
        info!(user_id, "user removed");
        Ok(())
    }

    pub fn flush_user(&self, user_id: &str) -> Result<(), EngineError> {
        let partition = self
            .store
            .partition(user_id)
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;
        let snapshot = partition.lock();
        self.persistence.save_state(user_id, &snapshot)
    }

    /// Save every user held in memory
    pub fn flush_all(&self) -> Result<usize, EngineError> {
        let users = self.store.user_ids();
        for user_id in &users {
            self.flush_user(user_id)?;
        }
        Ok(users.len())
    }

    // ==================== Answers ====================

    pub fn record_answer(&self, event: AnswerEvent) -> Result<KnowledgeState, EngineError> {
        self.apply_event(&event, self.config.autosave)
    }

    /// Validate a loosely typed record, then record it
    pub fn record_raw_answer(&self, value: Value) -> Result<KnowledgeState, EngineError> {
        let event = self.parse_raw_answer(value)?;
        self.record_answer(event)
    }

    pub fn parse_raw_answer(&self, value: Value) -> Result<AnswerEvent, EngineError> {
        let catalog = self.catalog();
        RawAnswer::from_value(value)?
            .into_event(|question_id| catalog.primary_skill(question_id).map(str::to_string))
    }

    fn check_event(&self, event: &AnswerEvent, catalog: &CatalogIndex) -> Result<(), EngineError> {
        event.validate()?;

        let now = self.clock.now_ms();
        if event.timestamp > now.saturating_add(self.config.max_future_skew_ms) {
            return Err(EngineError::FutureTimestamp {
                timestamp: event.timestamp,
                now,
            });
        }

        let question = catalog
            .question(&event.question_id)
            .ok_or_else(|| EngineError::UnknownQuestion(event.question_id.clone()))?;
        if !catalog.has_skill(&event.skill_id) {
            return Err(EngineError::UnknownSkill(event.skill_id.clone()));
        }
        if !question.skill_ids.contains(&event.skill_id) {
            return Err(EngineError::InvalidEvent(format!(
                "question {} does not exercise skill {}",
                event.question_id, event.skill_id
            )));
        }
        Ok(())
    }

    /// Decay to the answer time, fold the answer in, store, optionally save
    ///
    /// A failed save rolls the in-memory records back, and drops the user
    /// again when this answer created it.
    fn apply_event(
        &self,
        event: &AnswerEvent,
        persist: bool,
    ) -> Result<KnowledgeState, EngineError> {
        let catalog = self.catalog();
        self.check_event(event, &catalog)?;

        let params = self.config.params_for(&event.skill_id);
        let (partition, created) = match self.load_partition(&event.user_id)? {
            Some(partition) => (partition, false),
            None => {
                let partition = self
                    .store
                    .partition_or_insert_with(&event.user_id, UserSnapshot::default);
                (partition, true)
            }
        };
        let mut snapshot = partition.lock();

        let previous_state = snapshot.state(&event.skill_id).copied();
        let previous_history = snapshot.questions.get(&event.question_id).copied();

        let outcome = fold_answer(&mut snapshot, event, &params).and_then(|folded| {
            if persist {
                self.persistence.save_state(&event.user_id, &snapshot)?;
            }
            Ok(folded)
        });
        let (decayed, updated) = match outcome {
            Ok(folded) => folded,
            Err(err) => {
                match previous_state {
                    Some(state) => snapshot.put(&event.skill_id, state),
                    None => {
                        snapshot.skills.remove(&event.skill_id);
                    }
                }
                match previous_history {
                    Some(history) => {
                        snapshot.questions.insert(event.question_id.clone(), history);
                    }
                    None => {
                        snapshot.questions.remove(&event.question_id);
                    }
                }
                drop(snapshot);
                if created {
                    self.store.remove_user(&event.user_id);
                }
                warn!(user_id = %event.user_id, error = %err, "answer rolled back");
                return Err(err);
            }
        };
        if created {
            info!(user_id = %event.user_id, "user created on first answer");
        }

        debug!(
            user_id = %event.user_id,
            skill_id = %event.skill_id,
            question_id = %event.question_id,
            correct = event.correct,
            decayed = decayed.mastery_probability,
            mastery = updated.mastery_probability,
            "answer recorded"
        );
        Ok(updated)
    }

    /// Fold a batch of past answers in timestamp order
    ///
    /// Unknown questions, skills and users abort the replay or are skipped
    /// per the configured policy; any other error aborts. Users touched
    /// before an abort keep the answers already applied and are saved.
    pub fn replay_history(
        &self,
        mut events: Vec<AnswerEvent>,
    ) -> Result<ReplaySummary, EngineError> {
        events.sort_by_key(|e| e.timestamp);

        let mut summary = ReplaySummary::default();
        let mut touched = BTreeSet::new();
        let mut outcome = Ok(());

        for event in &events {
            match self.apply_event(event, false) {
                Ok(_) => {
                    summary.applied += 1;
                    touched.insert(event.user_id.clone());
                }
                Err(err)
                    if err.is_unknown_entity()
                        && self.config.unknown_entity_policy == UnknownEntityPolicy::Skip =>
                {
                    warn!(
                        user_id = %event.user_id,
                        question_id = %event.question_id,
                        error = %err,
                        "skipping answer"
                    );
                    summary.skipped += 1;
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        if self.config.autosave {
            for user_id in &touched {
                self.flush_user(user_id)?;
            }
        }
        outcome?;

        summary.users = touched.into_iter().collect();
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            users = summary.users.len(),
            "history replayed"
        );
        Ok(summary)
    }

    // ==================== Queries ====================

    /// Mastery decayed to the current time; does not write
    pub fn get_mastery(&self, user_id: &str, skill_id: &str) -> Result<f64, EngineError> {
        if !self.catalog().has_skill(skill_id) {
            return Err(EngineError::UnknownSkill(skill_id.to_string()));
        }
        let partition = self.require_partition(user_id)?;
        let params = self.config.params_for(skill_id);
        let now = self.clock.now_ms();

        let snapshot = partition.lock();
        let mastery = match snapshot.state(skill_id) {
            Some(state) => current_state(state, now, &params)?.mastery_probability,
            None => params.prior_mastery,
        };
        Ok(mastery)
    }

    /// When the skill is next due for review, `None` if never practiced
    pub fn next_review_at(
        &self,
        user_id: &str,
        skill_id: &str,
    ) -> Result<Option<i64>, EngineError> {
        if !self.catalog().has_skill(skill_id) {
            return Err(EngineError::UnknownSkill(skill_id.to_string()));
        }
        let partition = self.require_partition(user_id)?;
        let snapshot = partition.lock();
        Ok(snapshot.state(skill_id).and_then(|state| {
            forgetting::next_review_at(state, &self.config.recommender.review_intervals_days)
        }))
    }

    /// Score the user's remaining questions
    pub fn ranking(&self, user_id: &str, options: RankOptions) -> Result<Ranking, EngineError> {
        let partition = self.require_partition(user_id)?;
        let catalog = self.catalog();
        let now = self.clock.now_ms();
        let recommender = &self.config.recommender;

        let (skills, candidates) = {
            let snapshot = partition.lock();

            let mut skills = HashMap::with_capacity(catalog.skill_count());
            for skill_id in catalog.skill_ids() {
                let params = self.config.params_for(skill_id);
                let state = match snapshot.state(skill_id) {
                    Some(state) => current_state(state, now, &params)?,
                    None => KnowledgeState::new(params.prior_mastery, now),
                };
                skills.insert(
                    skill_id.to_string(),
                    SkillSnapshot {
                        mastery: state.mastery_probability,
                        elapsed_ms: state.elapsed_since_practice(state.updated_at),
                        observation_count: state.observation_count,
                        target_band: params.target_mastery_band,
                    },
                );
            }

            let candidates: Vec<CandidateQuestion> = catalog
                .questions()
                .filter_map(|question| {
                    let history = snapshot.question_history(&question.id);
                    if history.is_retired(recommender.retire_after_correct) {
                        return None;
                    }
                    Some(CandidateQuestion {
                        question_id: question.id.clone(),
                        skill_id: question.primary_skill()?.to_string(),
                        difficulty: history
                            .empirical_difficulty()
                            .unwrap_or_else(|| question.difficulty.level()),
                        attempts: history.attempts,
                    })
                })
                .collect();

            (skills, candidates)
        };

        let ranking = rank_bounded(candidates, &skills, recommender, options.max_candidates)
            .map_err(|err| match err {
                AlgoError::EmptyCandidatePool => EngineError::EmptyCandidatePool {
                    user_id: user_id.to_string(),
                },
                other => other.into(),
            })?;

        debug!(user_id, candidates = ranking.len(), "ranking built");
        Ok(ranking)
    }

    /// Ids of the best `k` questions, best first
    pub fn next_questions(&self, user_id: &str, k: usize) -> Result<Vec<String>, EngineError> {
        Ok(self.ranking(user_id, RankOptions::default())?.question_ids(k))
    }

    /// [`LearningEngine::next_questions`] on the blocking pool
    pub async fn next_questions_async(
        self: Arc<Self>,
        user_id: String,
        k: usize,
    ) -> Result<Vec<String>, EngineError> {
        tokio::task::spawn_blocking(move || self.next_questions(&user_id, k))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }
}

/// Decay the skill to the answer time and fold the answer in
///
/// Returns the decayed and the updated state.
fn fold_answer(
    snapshot: &mut UserSnapshot,
    event: &AnswerEvent,
    params: &ModelParameters,
) -> Result<(KnowledgeState, KnowledgeState), EngineError> {
    let current = snapshot.get(&event.skill_id, params.prior_mastery, event.timestamp);
    let decayed = forgetting::decay_state(&current, event.timestamp, params)?;
    let updated = bkt::apply_observation(&decayed, event.correct, event.timestamp, params)?;
    snapshot.put(&event.skill_id, updated);
    snapshot.record_question(&event.question_id, event.correct);
    Ok((decayed, updated))
}

/// Decay a stored state to `now`
///
/// Answers accepted within the future skew may sit ahead of the clock; such
/// states are read as they are.
fn current_state(
    state: &KnowledgeState,
    now: i64,
    params: &ModelParameters,
) -> Result<KnowledgeState, AlgoError> {
    forgetting::decay_state(state, now.max(state.updated_at), params)
}

//! Knowledge State Store
//!
//! Pure keyed storage, partitioned by user. No decay or update logic lives
//! here. Each partition sits behind its own mutex, which is also what
//! serializes one user's operations in the engine; distinct users never
//! contend beyond the brief map lookup.
//!
//! Record-level reads and writes (`get`, `put`) live on [`UserSnapshot`]
//! and are made through a locked partition, so that one answer's skill and
//! question records change together.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kt_algo::{KnowledgeState, QuestionHistory};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Everything the engine remembers about one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    #[serde(default)]
    pub skills: BTreeMap<String, KnowledgeState>,
    #[serde(default)]
    pub questions: BTreeMap<String, QuestionHistory>,
}

impl UserSnapshot {
    pub fn state(&self, skill_id: &str) -> Option<&KnowledgeState> {
        self.skills.get(skill_id)
    }

    /// State for one skill, created at `prior` if absent
    pub fn get(&mut self, skill_id: &str, prior: f64, now: i64) -> KnowledgeState {
        *self
            .skills
            .entry(skill_id.to_string())
            .or_insert_with(|| KnowledgeState::new(prior, now))
    }

    /// Overwrite one record
    pub fn put(&mut self, skill_id: &str, state: KnowledgeState) {
        self.skills.insert(skill_id.to_string(), state);
    }

    pub fn record_question(&mut self, question_id: &str, correct: bool) {
        self.questions
            .entry(question_id.to_string())
            .or_default()
            .record(correct);
    }

    pub fn question_history(&self, question_id: &str) -> QuestionHistory {
        self.questions.get(question_id).copied().unwrap_or_default()
    }
}

pub type UserPartition = Arc<Mutex<UserSnapshot>>;

#[derive(Debug, Default)]
pub struct KnowledgeStateStore {
    users: RwLock<HashMap<String, UserPartition>>,
}

impl KnowledgeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_user(&self, user_id: &str) -> bool {
        self.users.read().contains_key(user_id)
    }

    pub fn partition(&self, user_id: &str) -> Option<UserPartition> {
        self.users.read().get(user_id).cloned()
    }

    /// Existing partition, or one built from `init`
    ///
    /// `init` runs outside the map lock; if another caller wins the race the
    /// built snapshot is discarded.
    pub fn partition_or_insert_with<F>(&self, user_id: &str, init: F) -> UserPartition
    where
        F: FnOnce() -> UserSnapshot,
    {
        if let Some(existing) = self.partition(user_id) {
            return existing;
        }
        let built = Arc::new(Mutex::new(init()));
        let mut users = self.users.write();
        Arc::clone(users.entry(user_id.to_string()).or_insert(built))
    }

    pub fn snapshot(&self, user_id: &str) -> Option<UserSnapshot> {
        self.partition(user_id).map(|p| p.lock().clone())
    }

    pub fn remove_user(&self, user_id: &str) -> bool {
        self.users.write().remove(user_id).is_some()
    }

    /// Sorted for stable iteration
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.users.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(store: &KnowledgeStateStore, user_id: &str) -> UserPartition {
        store.partition_or_insert_with(user_id, UserSnapshot::default)
    }

    #[test]
    fn test_get_creates_with_prior() {
        let mut snapshot = UserSnapshot::default();
        assert!(snapshot.state("fractions").is_none());

        let state = snapshot.get("fractions", 0.25, 1_000);
        assert_eq!(state, KnowledgeState::new(0.25, 1_000));
        assert_eq!(snapshot.state("fractions"), Some(&state));

        // second read returns the stored record, not a new prior
        let again = snapshot.get("fractions", 0.9, 5_000);
        assert_eq!(again, state);
    }

    #[test]
    fn test_put_is_idempotent_overwrite() {
        let store = KnowledgeStateStore::new();
        let state = KnowledgeState {
            mastery_probability: 0.7,
            last_practiced_at: Some(10),
            updated_at: 10,
            observation_count: 2,
        };
        let partition = user(&store, "u1");
        partition.lock().put("s", state);
        partition.lock().put("s", state);
        assert_eq!(partition.lock().get("s", 0.1, 0), state);
        assert_eq!(store.snapshot("u1").unwrap().skills.len(), 1);
    }

    #[test]
    fn test_users_are_partitioned() {
        let store = KnowledgeStateStore::new();
        user(&store, "a").lock().put("s", KnowledgeState::new(0.4, 0));
        user(&store, "b").lock().put("s", KnowledgeState::new(0.6, 0));
        assert_eq!(user(&store, "a").lock().get("s", 0.0, 0).mastery_probability, 0.4);
        assert_eq!(user(&store, "b").lock().get("s", 0.0, 0).mastery_probability, 0.6);
        assert_eq!(store.user_ids(), vec!["a".to_string(), "b".to_string()]);

        assert!(store.remove_user("a"));
        assert!(!store.remove_user("a"));
        assert!(store.partition("a").is_none());
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_partition_race_keeps_first() {
        let store = KnowledgeStateStore::new();
        let first = store.partition_or_insert_with("u", || {
            let mut snapshot = UserSnapshot::default();
            snapshot.record_question("q1", true);
            snapshot
        });
        let second = user(&store, "u");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().question_history("q1").correct, 1);
    }

    #[test]
    fn test_concurrent_users() {
        let store = Arc::new(KnowledgeStateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let partition = user(&store, &format!("u{i}"));
                    for n in 0..100 {
                        let mut snapshot = partition.lock();
                        let mut state = snapshot.get("s", 0.1, 0);
                        state.observation_count += 1;
                        state.updated_at = n;
                        snapshot.put("s", state);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.user_count(), 8);
        for i in 0..8 {
            let snapshot = store.snapshot(&format!("u{i}")).unwrap();
            assert_eq!(snapshot.skills["s"].observation_count, 100);
        }
    }
}

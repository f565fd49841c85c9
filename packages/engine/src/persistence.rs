//! Persistence collaborator
//!
//! Per-user replace semantics: a save swaps the whole user document or
//! leaves the previous one in place.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::EngineError;
use crate::store::UserSnapshot;

const FORMAT_VERSION: u32 = 1;

pub trait StatePersistence: Send + Sync {
    /// `None` when nothing was ever saved for the user
    fn load_state(&self, user_id: &str) -> Result<Option<UserSnapshot>, EngineError>;

    fn save_state(&self, user_id: &str, snapshot: &UserSnapshot) -> Result<(), EngineError>;

    /// Removing an absent user is not an error
    fn delete_state(&self, user_id: &str) -> Result<(), EngineError>;
}

// ==================== In-memory ====================

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    users: RwLock<HashMap<String, UserSnapshot>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl StatePersistence for MemoryPersistence {
    fn load_state(&self, user_id: &str) -> Result<Option<UserSnapshot>, EngineError> {
        Ok(self.users.read().get(user_id).cloned())
    }

    fn save_state(&self, user_id: &str, snapshot: &UserSnapshot) -> Result<(), EngineError> {
        self.users
            .write()
            .insert(user_id.to_string(), snapshot.clone());
        Ok(())
    }

    fn delete_state(&self, user_id: &str) -> Result<(), EngineError> {
        self.users.write().remove(user_id);
        Ok(())
    }
}

// ==================== JSON files ====================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedUser {
    version: u32,
    user_id: String,
    saved_at: String,
    snapshot: UserSnapshot,
}

/// One JSON document per user inside a directory
///
/// File names are the hex-encoded user id, so any id maps to a safe name.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(user_id)))
    }
}

impl StatePersistence for JsonFilePersistence {
    fn load_state(&self, user_id: &str) -> Result<Option<UserSnapshot>, EngineError> {
        let raw = match fs::read_to_string(self.path_for(user_id)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let persisted: PersistedUser = serde_json::from_str(&raw)?;

        if persisted.version > FORMAT_VERSION {
            return Err(EngineError::Persistence(format!(
                "state for {user_id} has unsupported version {}",
                persisted.version
            )));
        }
        if persisted.user_id != user_id {
            return Err(EngineError::Persistence(format!(
                "state file for {user_id} belongs to {}",
                persisted.user_id
            )));
        }
        for (skill_id, state) in &persisted.snapshot.skills {
            if !kt_algo::sanitize::is_probability(state.mastery_probability) {
                return Err(EngineError::Persistence(format!(
                    "stored mastery {} for {user_id}/{skill_id} is not a probability",
                    state.mastery_probability
                )));
            }
        }

        Ok(Some(persisted.snapshot))
    }

    fn save_state(&self, user_id: &str, snapshot: &UserSnapshot) -> Result<(), EngineError> {
        let document = PersistedUser {
            version: FORMAT_VERSION,
            user_id: user_id.to_string(),
            saved_at: Utc::now().to_rfc3339(),
            snapshot: snapshot.clone(),
        };
        let body = serde_json::to_vec_pretty(&document)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(user_id))
            .map_err(|e| EngineError::Io(e.error))?;
        Ok(())
    }

    fn delete_state(&self, user_id: &str) -> Result<(), EngineError> {
        match fs::remove_file(self.path_for(user_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_algo::KnowledgeState;
    use tempfile::TempDir;

    fn sample() -> UserSnapshot {
        let mut snapshot = UserSnapshot::default();
        snapshot.put(
            "fractions",
            KnowledgeState {
                mastery_probability: 0.6927,
                last_practiced_at: Some(1_000),
                updated_at: 1_000,
                observation_count: 1,
            },
        );
        snapshot.record_question("q1", true);
        snapshot
    }

    #[test]
    fn test_memory_round_trip() {
        let persistence = MemoryPersistence::new();
        assert!(persistence.load_state("u").unwrap().is_none());
        persistence.save_state("u", &sample()).unwrap();
        assert_eq!(persistence.load_state("u").unwrap(), Some(sample()));
        persistence.delete_state("u").unwrap();
        persistence.delete_state("u").unwrap();
        assert!(persistence.is_empty());
    }

    #[test]
    fn test_file_round_trip_with_awkward_id() {
        let dir = TempDir::new().unwrap();
        let persistence = JsonFilePersistence::new(dir.path()).unwrap();
        let user = "../étudiant 42/";

        persistence.save_state(user, &sample()).unwrap();
        assert_eq!(persistence.load_state(user).unwrap(), Some(sample()));

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);

        persistence.delete_state(user).unwrap();
        assert!(persistence.load_state(user).unwrap().is_none());
        persistence.delete_state(user).unwrap();
    }

    #[test]
    fn test_save_replaces_previous_document() {
        let dir = TempDir::new().unwrap();
        let persistence = JsonFilePersistence::new(dir.path()).unwrap();
        persistence.save_state("u", &sample()).unwrap();
        persistence.save_state("u", &UserSnapshot::default()).unwrap();
        assert_eq!(
            persistence.load_state("u").unwrap(),
            Some(UserSnapshot::default())
        );
    }

    #[test]
    fn test_foreign_document_rejected() {
        let dir = TempDir::new().unwrap();
        let persistence = JsonFilePersistence::new(dir.path()).unwrap();
        persistence.save_state("alice", &sample()).unwrap();
        fs::rename(
            dir.path().join(format!("{}.json", hex::encode("alice"))),
            dir.path().join(format!("{}.json", hex::encode("bob"))),
        )
        .unwrap();
        assert!(matches!(
            persistence.load_state("bob"),
            Err(EngineError::Persistence(_))
        ));
    }

    #[test]
    fn test_corrupt_probability_rejected() {
        let dir = TempDir::new().unwrap();
        let persistence = JsonFilePersistence::new(dir.path()).unwrap();
        let mut snapshot = sample();
        snapshot.skills.get_mut("fractions").unwrap().mastery_probability = 1.7;
        persistence.save_state("u", &snapshot).unwrap();
        assert!(matches!(
            persistence.load_state("u"),
            Err(EngineError::Persistence(_))
        ));
    }
}

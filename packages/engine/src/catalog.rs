//! Question catalog collaborator
//!
//! The engine only reads the catalog. [`CatalogIndex`] is the validated,
//! ordered view built from whatever [`QuestionCatalog`] supplies.

use std::collections::{BTreeMap, HashMap};

use kt_algo::Difficulty;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::UnknownEntityPolicy;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

impl Skill {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    /// Skills exercised; the first one is primary
    pub skill_ids: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl Question {
    pub fn new(id: impl Into<String>, skill_ids: &[&str], difficulty: Difficulty) -> Self {
        Self {
            id: id.into(),
            skill_ids: skill_ids.iter().map(|s| s.to_string()).collect(),
            difficulty,
        }
    }

    pub fn primary_skill(&self) -> Option<&str> {
        self.skill_ids.first().map(String::as_str)
    }
}

/// Read-only source of questions and skills
pub trait QuestionCatalog: Send + Sync {
    fn load_questions(&self) -> Result<Vec<Question>, EngineError>;

    /// Skills a question exercises, `None` for an unknown question
    fn skills_of(&self, question_id: &str) -> Option<Vec<Skill>>;

    /// Every known skill
    fn skills(&self) -> Result<Vec<Skill>, EngineError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    skills: Vec<Skill>,
    questions: Vec<Question>,
}

/// Catalog held in memory, usually loaded from a JSON document
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    skills: Vec<Skill>,
    questions: Vec<Question>,
    skill_lookup: HashMap<String, usize>,
    question_lookup: HashMap<String, usize>,
}

impl InMemoryCatalog {
    /// Skills referenced by questions but not listed get an empty label
    pub fn new(mut skills: Vec<Skill>, questions: Vec<Question>) -> Self {
        let mut skill_lookup: HashMap<String, usize> = skills
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        for question in &questions {
            for skill_id in &question.skill_ids {
                if !skill_lookup.contains_key(skill_id) {
                    skill_lookup.insert(skill_id.clone(), skills.len());
                    skills.push(Skill::new(skill_id.clone(), ""));
                }
            }
        }
        let question_lookup = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id.clone(), i))
            .collect();

        Self {
            skills,
            questions,
            skill_lookup,
            question_lookup,
        }
    }

    /// `{"skills": [...], "questions": [...]}`; `skills` may be omitted
    pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.skills, file.questions))
    }
}

impl QuestionCatalog for InMemoryCatalog {
    fn load_questions(&self) -> Result<Vec<Question>, EngineError> {
        Ok(self.questions.clone())
    }

    fn skills_of(&self, question_id: &str) -> Option<Vec<Skill>> {
        let question = &self.questions[*self.question_lookup.get(question_id)?];
        Some(
            question
                .skill_ids
                .iter()
                .filter_map(|id| self.skill_lookup.get(id).map(|&i| self.skills[i].clone()))
                .collect(),
        )
    }

    fn skills(&self) -> Result<Vec<Skill>, EngineError> {
        Ok(self.skills.clone())
    }
}

/// Validated, id-ordered view over a catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    questions: BTreeMap<String, Question>,
    skills: BTreeMap<String, Skill>,
}

impl CatalogIndex {
    /// Index everything a catalog offers
    ///
    /// Duplicate ids and invalid difficulties always fail. A question with
    /// no skill or an unlisted skill fails or is dropped per `policy`.
    pub fn build(
        catalog: &dyn QuestionCatalog,
        policy: UnknownEntityPolicy,
    ) -> Result<Self, EngineError> {
        let mut skills = BTreeMap::new();
        for skill in catalog.skills()? {
            if skill.id.trim().is_empty() {
                return Err(EngineError::InvalidCatalog("skill with empty id".to_string()));
            }
            if skills.insert(skill.id.clone(), skill.clone()).is_some() {
                return Err(EngineError::InvalidCatalog(format!(
                    "duplicate skill id {}",
                    skill.id
                )));
            }
        }

        let mut questions = BTreeMap::new();
        for question in catalog.load_questions()? {
            if question.id.trim().is_empty() {
                return Err(EngineError::InvalidCatalog("question with empty id".to_string()));
            }
            if questions.contains_key(&question.id) {
                return Err(EngineError::InvalidCatalog(format!(
                    "duplicate question id {}",
                    question.id
                )));
            }
            question.difficulty.validate()?;

            let problem = if question.skill_ids.is_empty() {
                Some(EngineError::InvalidCatalog(format!(
                    "question {} has no skill",
                    question.id
                )))
            } else {
                question
                    .skill_ids
                    .iter()
                    .find(|id| !skills.contains_key(*id))
                    .map(|id| EngineError::UnknownSkill(id.clone()))
            };

            match (problem, policy) {
                (None, _) => {
                    questions.insert(question.id.clone(), question);
                }
                (Some(err), UnknownEntityPolicy::Skip) => {
                    warn!(question_id = %question.id, error = %err, "dropping catalog question");
                }
                (Some(err), UnknownEntityPolicy::Fail) => return Err(err),
            }
        }

        Ok(Self { questions, skills })
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.get(question_id)
    }

    pub fn primary_skill(&self, question_id: &str) -> Option<&str> {
        self.questions.get(question_id)?.primary_skill()
    }

    pub fn has_skill(&self, skill_id: &str) -> bool {
        self.skills.contains_key(skill_id)
    }

    /// Questions in id order
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.values()
    }

    /// Skill ids in order
    pub fn skill_ids(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_algo::DifficultyBand;

    const CATALOG: &str = r#"{
        "skills": [
            { "id": "fractions", "label": "Fractions" },
            { "id": "decimals", "label": "Decimals" }
        ],
        "questions": [
            { "id": "q2", "skillIds": ["decimals"], "difficulty": "hard" },
            { "id": "q1", "skillIds": ["fractions", "decimals"], "difficulty": 0.3 },
            { "id": "q3", "skillIds": ["fractions"] }
        ]
    }"#;

    #[test]
    fn test_json_catalog() {
        let catalog = InMemoryCatalog::from_json_str(CATALOG).unwrap();
        let index = CatalogIndex::build(&catalog, UnknownEntityPolicy::Fail).unwrap();

        let ids: Vec<&str> = index.questions().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3"]);
        assert_eq!(index.primary_skill("q1"), Some("fractions"));
        assert_eq!(
            index.question("q2").unwrap().difficulty,
            Difficulty::Band(DifficultyBand::Hard)
        );
        assert_eq!(index.question("q3").unwrap().difficulty.level(), 0.5);

        let skills = catalog.skills_of("q1").unwrap();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[1].label, "Decimals");
        assert!(catalog.skills_of("missing").is_none());
    }

    #[test]
    fn test_unlisted_skill_is_synthesized() {
        let catalog = InMemoryCatalog::new(
            Vec::new(),
            vec![Question::new("q1", &["algebra"], Difficulty::Value(0.4))],
        );
        let index = CatalogIndex::build(&catalog, UnknownEntityPolicy::Fail).unwrap();
        assert!(index.has_skill("algebra"));
        assert_eq!(index.skill_count(), 1);
    }

    #[test]
    fn test_skillless_question_policy() {
        let catalog = InMemoryCatalog::new(
            vec![Skill::new("s", "S")],
            vec![
                Question::new("ok", &["s"], Difficulty::default()),
                Question::new("orphan", &[], Difficulty::default()),
            ],
        );
        assert!(matches!(
            CatalogIndex::build(&catalog, UnknownEntityPolicy::Fail),
            Err(EngineError::InvalidCatalog(_))
        ));
        let index = CatalogIndex::build(&catalog, UnknownEntityPolicy::Skip).unwrap();
        assert_eq!(index.question_count(), 1);
        assert!(index.question("orphan").is_none());
    }

    #[test]
    fn test_duplicates_and_bad_difficulty_rejected() {
        let duplicate = InMemoryCatalog::new(
            Vec::new(),
            vec![
                Question::new("q", &["s"], Difficulty::default()),
                Question::new("q", &["s"], Difficulty::default()),
            ],
        );
        assert!(matches!(
            CatalogIndex::build(&duplicate, UnknownEntityPolicy::Skip),
            Err(EngineError::InvalidCatalog(_))
        ));

        let bad = InMemoryCatalog::new(
            Vec::new(),
            vec![Question::new("q", &["s"], Difficulty::Value(1.4))],
        );
        assert!(matches!(
            CatalogIndex::build(&bad, UnknownEntityPolicy::Skip),
            Err(EngineError::InvalidParameter { .. })
        ));
    }
}

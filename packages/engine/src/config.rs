use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use kt_algo::{ModelParameters, ParameterWarning, RecommenderConfig};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// What batch operations do with dangling references
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownEntityPolicy {
    /// Abort on the first unknown skill, question or user
    #[default]
    Fail,
    /// Log and drop the offending item
    Skip,
}

impl UnknownEntityPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Some(Self::Fail),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Per-skill tweaks; unset fields fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterOverride {
    pub prior_mastery: Option<f64>,
    pub transit: Option<f64>,
    pub slip: Option<f64>,
    pub guess: Option<f64>,
    pub decay_rate: Option<f64>,
    pub decay_baseline: Option<f64>,
    pub target_mastery_band: Option<(f64, f64)>,
}

impl ParameterOverride {
    pub fn apply(&self, base: &ModelParameters) -> ModelParameters {
        ModelParameters {
            prior_mastery: self.prior_mastery.unwrap_or(base.prior_mastery),
            transit: self.transit.unwrap_or(base.transit),
            slip: self.slip.unwrap_or(base.slip),
            guess: self.guess.unwrap_or(base.guess),
            decay_rate: self.decay_rate.unwrap_or(base.decay_rate),
            decay_baseline: self.decay_baseline.or(base.decay_baseline),
            target_mastery_band: self.target_mastery_band.unwrap_or(base.target_mastery_band),
        }
    }
}

/// Where and how much the binary logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `kt_engine=debug`
    pub level: String,
    /// Copy logs into a daily rolling file under `dir`
    pub file_logs: bool,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logs: false,
            dir: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub defaults: ModelParameters,
    pub skill_overrides: HashMap<String, ParameterOverride>,
    pub recommender: RecommenderConfig,
    pub unknown_entity_policy: UnknownEntityPolicy,
    /// Write each user's state through to persistence after every answer
    pub autosave: bool,
    /// How far past the engine clock an answer timestamp may be
    pub max_future_skew_ms: i64,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: ModelParameters::default(),
            skill_overrides: HashMap::new(),
            recommender: RecommenderConfig::default(),
            unknown_entity_policy: UnknownEntityPolicy::default(),
            autosave: true,
            max_future_skew_ms: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Layer `KT_*` environment variables over this config
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::with_env`], reading from any lookup
    ///
    /// Values that fail to parse are ignored.
    pub fn with_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "KT_PRIOR_MASTERY") {
            self.defaults.prior_mastery = v;
        }
        if let Some(v) = parsed(&lookup, "KT_TRANSIT") {
            self.defaults.transit = v;
        }
        if let Some(v) = parsed(&lookup, "KT_SLIP") {
            self.defaults.slip = v;
        }
        if let Some(v) = parsed(&lookup, "KT_GUESS") {
            self.defaults.guess = v;
        }
        if let Some(v) = parsed(&lookup, "KT_DECAY_RATE") {
            self.defaults.decay_rate = v;
        }
        if let Some(v) = parsed(&lookup, "KT_DECAY_BASELINE") {
            self.defaults.decay_baseline = Some(v);
        }
        if let Some(v) = parsed(&lookup, "KT_AUTOSAVE") {
            self.autosave = v;
        }
        if let Some(v) = parsed(&lookup, "KT_MAX_CANDIDATES") {
            self.recommender.max_candidates = Some(v);
        }
        if let Some(level) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        if let Some(flag) = lookup("KT_FILE_LOGS") {
            self.logging.file_logs = matches!(flag.trim(), "true" | "1");
        }
        if let Some(dir) = lookup("KT_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Some(v) = parsed(&lookup, "KT_RETIRE_AFTER_CORRECT") {
            self.recommender.retire_after_correct = v;
        }
        if let Some(policy) = lookup("KT_UNKNOWN_ENTITY_POLICY")
            .as_deref()
            .and_then(UnknownEntityPolicy::parse)
        {
            self.unknown_entity_policy = policy;
        }

        self
    }

    pub fn params_for(&self, skill_id: &str) -> ModelParameters {
        match self.skill_overrides.get(skill_id) {
            Some(overrides) => overrides.apply(&self.defaults),
            None => self.defaults,
        }
    }

    /// Check every parameter set; returns soft warnings keyed by skill
    /// (`None` for the defaults)
    pub fn validate(&self) -> Result<Vec<(Option<String>, ParameterWarning)>, EngineError> {
        let mut warnings: Vec<(Option<String>, ParameterWarning)> = self
            .defaults
            .validate()?
            .into_iter()
            .map(|w| (None, w))
            .collect();

        let mut skills: Vec<&String> = self.skill_overrides.keys().collect();
        skills.sort();
        for skill_id in skills {
            for warning in self.params_for(skill_id).validate()? {
                warnings.push((Some(skill_id.clone()), warning));
            }
        }

        self.recommender.validate()?;
        if self.max_future_skew_ms < 0 {
            return Err(EngineError::InvalidParameter {
                name: "max_future_skew_ms".to_string(),
                value: self.max_future_skew_ms as f64,
            });
        }

        Ok(warnings)
    }
}

//! Answer events and boundary validation
//!
//! Presentation layers hand over loosely typed records (string booleans,
//! RFC 3339 or epoch timestamps, camelCase or snake_case keys). They are
//! validated into [`AnswerEvent`] here; nothing past this module sees
//! unvalidated input.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// One validated answer, the unit of input to the updater
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub user_id: String,
    pub question_id: String,
    pub skill_id: String,
    pub correct: bool,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl AnswerEvent {
    pub fn new(
        user_id: impl Into<String>,
        question_id: impl Into<String>,
        skill_id: impl Into<String>,
        correct: bool,
        timestamp: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            question_id: question_id.into(),
            skill_id: skill_id.into(),
            correct,
            timestamp,
            latency_ms: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Shape checks that need no catalog or clock
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.user_id.trim().is_empty() {
            return Err(EngineError::InvalidEvent("userId is empty".to_string()));
        }
        if self.question_id.trim().is_empty() {
            return Err(EngineError::InvalidEvent("questionId is empty".to_string()));
        }
        if self.skill_id.trim().is_empty() {
            return Err(EngineError::InvalidEvent("skillId is empty".to_string()));
        }
        if self.timestamp < 0 {
            return Err(EngineError::InvalidEvent(format!(
                "timestamp {} is before the epoch",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Answer record as it arrives from an event system
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnswer {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
    #[serde(alias = "questionId")]
    pub question_id: Option<Value>,
    #[serde(alias = "skillId")]
    pub skill_id: Option<String>,
    #[serde(alias = "isCorrect", alias = "is_correct")]
    pub correct: Option<Value>,
    #[serde(alias = "answeredAt")]
    pub timestamp: Option<Value>,
    #[serde(alias = "latencyMs", alias = "latency_ms")]
    pub latency: Option<Value>,
}

impl RawAnswer {
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        if !value.is_object() {
            return Err(EngineError::InvalidEvent(
                "answer record must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| EngineError::InvalidEvent(e.to_string()))
    }

    /// Validate into an [`AnswerEvent`]
    ///
    /// `primary_skill` supplies the skill when the record names none.
    pub fn into_event<F>(self, primary_skill: F) -> Result<AnswerEvent, EngineError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let user_id = required_text(self.user_id, "userId")?;
        let question_id = match self.question_id {
            Some(Value::String(s)) => required_text(Some(s), "questionId")?,
            // numeric row indices are common in question banks
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(missing("questionId")),
        };
        let skill_id = match self.skill_id.filter(|s| !s.trim().is_empty()) {
            Some(skill) => skill,
            None => primary_skill(&question_id)
                .ok_or_else(|| EngineError::UnknownQuestion(question_id.clone()))?,
        };
        let correct = parse_bool(self.correct.as_ref().ok_or_else(|| missing("correct"))?)?;
        let timestamp =
            parse_timestamp(self.timestamp.as_ref().ok_or_else(|| missing("timestamp"))?)?;
        let latency_ms = self.latency.as_ref().map(parse_latency).transpose()?;

        let event = AnswerEvent {
            user_id,
            question_id,
            skill_id,
            correct,
            timestamp,
            latency_ms,
        };
        event.validate()?;
        Ok(event)
    }
}

fn missing(field: &str) -> EngineError {
    EngineError::InvalidEvent(format!("missing field {field}"))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, EngineError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(field)),
    }
}

fn parse_bool(value: &Value) -> Result<bool, EngineError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(EngineError::InvalidEvent(format!("correct: {n} is not 0 or 1"))),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(true),
            "false" | "0" | "no" | "n" => Ok(false),
            other => Err(EngineError::InvalidEvent(format!(
                "correct: {other:?} is not a boolean"
            ))),
        },
        other => Err(EngineError::InvalidEvent(format!(
            "correct: unexpected value {other}"
        ))),
    }
}

fn parse_timestamp(value: &Value) -> Result<i64, EngineError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| {
            EngineError::InvalidEvent(format!("timestamp: {n} is not an integer"))
        }),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Ok(ms);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| EngineError::InvalidEvent(format!("timestamp {s:?}: {e}")))
        }
        other => Err(EngineError::InvalidEvent(format!(
            "timestamp: unexpected value {other}"
        ))),
    }
}

fn parse_latency(value: &Value) -> Result<u64, EngineError> {
    let invalid = || EngineError::InvalidEvent(format!("latency: {value} is not a duration in ms"));
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.is_finite()).map(|f| f.round() as u64))
            .ok_or_else(invalid),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_skill(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_camel_case_record() {
        let raw = RawAnswer::from_value(json!({
            "userId": "u1",
            "questionId": "q7",
            "skillId": "fractions",
            "isCorrect": "true",
            "timestamp": 1_700_000_000_000i64,
            "latencyMs": 2500
        }))
        .unwrap();
        let event = raw.into_event(no_skill).unwrap();
        assert_eq!(
            event,
            AnswerEvent::new("u1", "q7", "fractions", true, 1_700_000_000_000).with_latency(2500)
        );
    }

    #[test]
    fn test_numeric_question_and_default_skill() {
        let raw = RawAnswer::from_value(json!({
            "user_id": "u1",
            "question_id": 12,
            "correct": 0,
            "timestamp": "2023-11-14T22:13:20Z"
        }))
        .unwrap();
        let event = raw
            .into_event(|qid| (qid == "12").then(|| "algebra".to_string()))
            .unwrap();
        assert_eq!(event.question_id, "12");
        assert_eq!(event.skill_id, "algebra");
        assert!(!event.correct);
        assert_eq!(event.timestamp, 1_700_000_000_000);
        assert_eq!(event.latency_ms, None);
    }

    #[test]
    fn test_unknown_question_without_skill() {
        let raw = RawAnswer::from_value(json!({
            "userId": "u1", "questionId": "nope", "correct": true, "timestamp": 5
        }))
        .unwrap();
        assert!(matches!(
            raw.into_event(no_skill),
            Err(EngineError::UnknownQuestion(q)) if q == "nope"
        ));
    }

    #[test]
    fn test_rejects_malformed_fields() {
        let base = json!({
            "userId": "u",
            "questionId": "q",
            "skillId": "s",
            "correct": true,
            "timestamp": 1
        });
        let with = |field: &str, value: Value| {
            let mut case = base.clone();
            case[field] = value;
            case
        };
        let mut missing_user = base.clone();
        if let Value::Object(map) = &mut missing_user {
            map.remove("userId");
        }
        let cases = vec![
            missing_user,
            with("correct", json!("maybe")),
            with("correct", json!(2)),
            with("timestamp", json!("yesterday")),
            with("timestamp", json!(-5)),
            with("latency", json!(-3)),
            with("userId", json!(" ")),
        ];
        for case in cases {
            let result = RawAnswer::from_value(case.clone()).and_then(|r| r.into_event(no_skill));
            assert!(
                matches!(result, Err(EngineError::InvalidEvent(_))),
                "expected rejection for {case}"
            );
        }
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            RawAnswer::from_value(json!([1, 2, 3])),
            Err(EngineError::InvalidEvent(_))
        ));
    }
}

//! Interview answer values.
//!
//! Answers arrive as arbitrary JSON from the editor. They are checked once at
//! the boundary (shape, nesting depth, encoded size) and then carried as a
//! typed [`AnswerValue`] until they are stored as an opaque JSON blob.

use crate::domain::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub static QUESTION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.:\-]{1,128}$").unwrap());

/// All answers of one session, keyed by question id. Absent key == unanswered.
pub type Answers = BTreeMap<String, AnswerValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Only valid nested inside a list or object; a top-level null deletes.
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<AnswerValue>),
    Object(BTreeMap<String, AnswerValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerLimits {
    pub max_bytes: usize,
    pub max_depth: usize,
}

impl Default for AnswerLimits {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024,
            max_depth: 16,
        }
    }
}

impl AnswerValue {
    fn from_json(value: Value, depth: usize, limits: &AnswerLimits) -> Result<Self> {
        if depth > limits.max_depth {
            return Err(AppError::ValidationError(format!(
                "Answer nesting exceeds {} levels",
                limits.max_depth
            )));
        }

        Ok(match value {
            Value::Null => AnswerValue::Null,
            Value::Bool(flag) => AnswerValue::Bool(flag),
            Value::Number(number) => AnswerValue::Number(number),
            Value::String(text) => AnswerValue::Text(text),
            Value::Array(items) => AnswerValue::List(
                items
                    .into_iter()
                    .map(|item| Self::from_json(item, depth + 1, limits))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(fields) => AnswerValue::Object(
                fields
                    .into_iter()
                    .map(|(key, item)| Ok((key, Self::from_json(item, depth + 1, limits)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            ),
        })
    }

    /// A value the editor treats as "no answer".
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Null => true,
            AnswerValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }
}

impl From<AnswerValue> for Value {
    fn from(value: AnswerValue) -> Self {
        match value {
            AnswerValue::Null => Value::Null,
            AnswerValue::Bool(flag) => Value::Bool(flag),
            AnswerValue::Number(number) => Value::Number(number),
            AnswerValue::Text(text) => Value::String(text),
            AnswerValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            AnswerValue::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, item)| (key, Value::from(item)))
                    .collect(),
            ),
        }
    }
}

/// A single-question change carried by a diff-save.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerPatch {
    Set(AnswerValue),
    Delete,
}

impl AnswerPatch {
    /// `None`, `null` and `""` all mean "remove this answer".
    pub fn from_client(value: Option<Value>, limits: &AnswerLimits) -> Result<Self> {
        let value = match value {
            None | Some(Value::Null) => return Ok(AnswerPatch::Delete),
            Some(Value::String(text)) if text.is_empty() => return Ok(AnswerPatch::Delete),
            Some(value) => value,
        };

        let encoded_len = serde_json::to_vec(&value)?.len();
        if encoded_len > limits.max_bytes {
            return Err(AppError::ValidationError(format!(
                "Answer is {} bytes, limit is {}",
                encoded_len, limits.max_bytes
            )));
        }

        Ok(AnswerPatch::Set(AnswerValue::from_json(value, 1, limits)?))
    }

    pub fn from_local(value: Option<&AnswerValue>) -> Self {
        match value {
            Some(value) if !value.is_blank() => AnswerPatch::Set(value.clone()),
            _ => AnswerPatch::Delete,
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            AnswerPatch::Set(value) => Value::from(value.clone()),
            AnswerPatch::Delete => Value::Null,
        }
    }

    pub fn apply(self, answers: &mut Answers, question_id: &str) {
        match self {
            AnswerPatch::Set(value) => {
                answers.insert(question_id.to_string(), value);
            }
            AnswerPatch::Delete => {
                answers.remove(question_id);
            }
        }
    }
}

pub fn validate_question_id(question_id: &str) -> Result<()> {
    if QUESTION_ID_PATTERN.is_match(question_id) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Invalid question id: {:?}",
            question_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_empty_string_delete() {
        let limits = AnswerLimits::default();
        assert_eq!(AnswerPatch::from_client(None, &limits).unwrap(), AnswerPatch::Delete);
        assert_eq!(
            AnswerPatch::from_client(Some(Value::Null), &limits).unwrap(),
            AnswerPatch::Delete
        );
        assert_eq!(
            AnswerPatch::from_client(Some(json!("")), &limits).unwrap(),
            AnswerPatch::Delete
        );
    }

    #[test]
    fn test_whitespace_is_a_real_answer() {
        let patch = AnswerPatch::from_client(Some(json!(" ")), &AnswerLimits::default()).unwrap();
        assert_eq!(patch, AnswerPatch::Set(AnswerValue::Text(" ".into())));
    }

    #[test]
    fn test_nested_values_keep_their_shape() {
        let raw = json!({"items": ["a", 2, true, null], "note": {"text": "x"}});
        let patch = AnswerPatch::from_client(Some(raw.clone()), &AnswerLimits::default()).unwrap();
        assert_eq!(patch.to_wire(), raw);
    }

    #[test]
    fn test_depth_limit() {
        let limits = AnswerLimits {
            max_depth: 3,
            ..Default::default()
        };
        assert!(AnswerPatch::from_client(Some(json!([["ok"]])), &limits).is_ok());
        let err = AnswerPatch::from_client(Some(json!([[["too deep"]]])), &limits).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_size_limit() {
        let limits = AnswerLimits {
            max_bytes: 8,
            ..Default::default()
        };
        let err = AnswerPatch::from_client(Some(json!("0123456789")), &limits).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_apply_set_and_delete() {
        let mut answers = Answers::new();
        AnswerPatch::Set(AnswerValue::Text("hello".into())).apply(&mut answers, "q1");
        assert_eq!(answers.get("q1"), Some(&AnswerValue::Text("hello".into())));
        AnswerPatch::Delete.apply(&mut answers, "q1");
        assert!(!answers.contains_key("q1"));
    }

    #[test]
    fn test_stored_blob_roundtrip() {
        let mut answers = Answers::new();
        answers.insert("q1".into(), AnswerValue::Text("hello".into()));
        answers.insert(
            "q2".into(),
            AnswerValue::List(vec![AnswerValue::Number(3.into()), AnswerValue::Null]),
        );
        let blob = serde_json::to_string(&answers).unwrap();
        let decoded: Answers = serde_json::from_str(&blob).unwrap();
        assert_eq!(decoded, answers);
    }

    #[test]
    fn test_question_id_pattern() {
        assert!(validate_question_id("q1").is_ok());
        assert!(validate_question_id("services.pricing:2").is_ok());
        assert!(validate_question_id("").is_err());
        assert!(validate_question_id("has space").is_err());
        assert!(validate_question_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_local_blank_values_delete() {
        assert_eq!(AnswerPatch::from_local(None), AnswerPatch::Delete);
        assert_eq!(
            AnswerPatch::from_local(Some(&AnswerValue::Text(String::new()))),
            AnswerPatch::Delete
        );
    }
}

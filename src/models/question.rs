use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::bson_datetime_as_chrono;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    Click,
    Drag,
    Draw,
    Paint,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::Click => "click",
            QuestionType::Drag => "drag",
            QuestionType::Draw => "draw",
            QuestionType::Paint => "paint",
        }
    }

    /// Drawing and painting answers are reviewed by a person, never by
    /// the grader.
    pub fn is_auto_graded(&self) -> bool {
        !matches!(self, QuestionType::Draw | QuestionType::Paint)
    }
}

/// Typed view of the stored correct-answer string, keyed on the question
/// type. Parsing happens on admin writes so malformed keys are rejected
/// before a learner ever hits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    /// `text` / `click`: a single normalized literal.
    Exact(String),
    /// `drag`: comma-joined tokens, compared as sorted sequences.
    TokenList(Vec<String>),
    /// `draw` / `paint`: no machine-checkable key.
    Manual,
}

impl AnswerKey {
    pub fn parse(question_type: QuestionType, raw: Option<&str>) -> Result<Self, String> {
        match question_type {
            QuestionType::Draw | QuestionType::Paint => Ok(AnswerKey::Manual),
            QuestionType::Text | QuestionType::Click => {
                let value = raw
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        format!("{} questions require a correct answer", question_type.as_str())
                    })?;
                Ok(AnswerKey::Exact(value.to_lowercase()))
            }
            QuestionType::Drag => {
                let value = raw
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| "drag questions require a correct answer".to_string())?;
                let tokens: Vec<String> = value
                    .split(',')
                    .map(|token| token.trim().to_lowercase())
                    .collect();
                if tokens.iter().any(|token| token.is_empty()) {
                    return Err("drag answer contains an empty token".to_string());
                }
                Ok(AnswerKey::TokenList(tokens))
            }
        }
    }
}

/// Question stored in MongoDB "questions" collection. Leaf of the content
/// tree; immutable to learners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub topic_id: ObjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<ObjectId>,

    pub question_type: QuestionType,
    pub content: String,

    #[serde(default)]
    pub options: Vec<String>,

    /// Raw stored key; shape validated against `question_type` on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Learner-facing view: the answer key and explanation stay server-side
/// until an answer is submitted.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub topic_id: String,
    pub section_id: Option<String>,
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<String>,
    pub images: Vec<String>,
}

impl From<QuestionRecord> for QuestionView {
    fn from(question: QuestionRecord) -> Self {
        QuestionView {
            id: question.id.map(|id| id.to_hex()).unwrap_or_default(),
            topic_id: question.topic_id.to_hex(),
            section_id: question.section_id.map(|id| id.to_hex()),
            question_type: question.question_type,
            content: question.content,
            options: question.options,
            images: question.images,
        }
    }
}

/// Admin view includes the key and explanation.
#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    pub id: String,
    pub topic_id: String,
    pub section_id: Option<String>,
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub images: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<QuestionRecord> for QuestionDetail {
    fn from(question: QuestionRecord) -> Self {
        QuestionDetail {
            id: question.id.map(|id| id.to_hex()).unwrap_or_default(),
            topic_id: question.topic_id.to_hex(),
            section_id: question.section_id.map(|id| id.to_hex()),
            question_type: question.question_type,
            content: question.content,
            options: question.options,
            correct_answer: question.correct_answer,
            explanation: question.explanation,
            images: question.images,
            updated_at: question.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuestionCreateRequest {
    pub topic_id: String,

    #[serde(default)]
    pub section_id: Option<String>,

    pub question_type: QuestionType,

    #[validate(length(min = 1, message = "Question content must not be empty"))]
    pub content: String,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub correct_answer: Option<String>,

    #[serde(default)]
    pub explanation: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionUpdateRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub question_type: Option<QuestionType>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub section_id: Option<String>,
}

/// Body of POST /api/v1/quiz/questions/answer
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: String,
    pub answer: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub is_correct: bool,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_normalizes_case_and_whitespace() {
        let key = AnswerKey::parse(QuestionType::Text, Some("  Paris ")).unwrap();
        assert_eq!(key, AnswerKey::Exact("paris".to_string()));
    }

    #[test]
    fn drag_key_splits_and_normalizes_tokens() {
        let key = AnswerKey::parse(QuestionType::Drag, Some("Dog, cat ,Bird")).unwrap();
        assert_eq!(
            key,
            AnswerKey::TokenList(vec![
                "dog".to_string(),
                "cat".to_string(),
                "bird".to_string()
            ])
        );
    }

    #[test]
    fn drag_key_rejects_empty_tokens() {
        assert!(AnswerKey::parse(QuestionType::Drag, Some("a,,b")).is_err());
        assert!(AnswerKey::parse(QuestionType::Drag, Some("")).is_err());
    }

    #[test]
    fn gradable_types_require_a_key() {
        assert!(AnswerKey::parse(QuestionType::Text, None).is_err());
        assert!(AnswerKey::parse(QuestionType::Click, Some("   ")).is_err());
    }

    #[test]
    fn manual_types_accept_missing_keys() {
        assert_eq!(
            AnswerKey::parse(QuestionType::Draw, None).unwrap(),
            AnswerKey::Manual
        );
        assert_eq!(
            AnswerKey::parse(QuestionType::Paint, Some("sketch")).unwrap(),
            AnswerKey::Manual
        );
        assert!(!QuestionType::Draw.is_auto_graded());
        assert!(QuestionType::Drag.is_auto_graded());
    }
}

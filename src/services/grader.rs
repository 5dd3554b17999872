use crate::error::ApiError;
use crate::models::question::{AnswerKey, QuestionType};

/// Decides whether a submitted answer matches the stored key. Pure; the
/// caller persists the verdict into quiz progress.
///
/// Comparison rules by question type:
/// - `text` / `click`: trimmed, lowercased equality
/// - `drag`: both sides split on `,`, tokens trimmed and lowercased,
///   sorted independently, compared element-wise. Submission order never
///   matters; sorting (rather than set equality) also means duplicate
///   tokens compare positionally, which is intentional and must not be
///   "fixed" to set semantics.
/// - `draw` / `paint`: no automatic verdict
pub fn grade_answer(
    question_type: QuestionType,
    correct_answer_raw: Option<&str>,
    submitted_answer: Option<&str>,
) -> Result<bool, ApiError> {
    if !question_type.is_auto_graded() {
        return Err(ApiError::ManualGradingOnly);
    }

    let submitted = submitted_answer
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingAnswer)?;

    let key = AnswerKey::parse(question_type, correct_answer_raw)
        .map_err(ApiError::InvalidQuestionState)?;

    match key {
        AnswerKey::Exact(expected) => Ok(submitted.to_lowercase() == expected),
        AnswerKey::TokenList(mut expected) => {
            let mut submitted_tokens: Vec<String> = submitted
                .split(',')
                .map(|token| token.trim().to_lowercase())
                .collect();
            submitted_tokens.sort();
            expected.sort();
            Ok(submitted_tokens == expected)
        }
        // Unreachable: manual types bail out above, and parse() only
        // returns Manual for those.
        AnswerKey::Manual => Err(ApiError::ManualGradingOnly),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_answers_ignore_case_and_whitespace() {
        assert!(grade_answer(QuestionType::Text, Some("Paris"), Some("  paris ")).unwrap());
        assert!(grade_answer(QuestionType::Click, Some("TRUE"), Some("true")).unwrap());
        assert!(!grade_answer(QuestionType::Text, Some("Paris"), Some("London")).unwrap());
    }

    #[test]
    fn drag_answers_are_order_invariant() {
        assert!(grade_answer(QuestionType::Drag, Some("dog,cat"), Some("Cat, dog")).unwrap());
        assert!(grade_answer(QuestionType::Drag, Some("a,b,c"), Some("c,b,a")).unwrap());
        assert!(!grade_answer(QuestionType::Drag, Some("a,b"), Some("a,c")).unwrap());
    }

    #[test]
    fn drag_answers_compare_token_multiplicity() {
        // Sorted-sequence comparison: duplicates must match one-for-one.
        assert!(grade_answer(QuestionType::Drag, Some("a,a,b"), Some("a,b,a")).unwrap());
        assert!(!grade_answer(QuestionType::Drag, Some("a,b"), Some("a,a,b")).unwrap());
    }

    #[test]
    fn missing_submission_is_a_client_error() {
        let err = grade_answer(QuestionType::Text, Some("x"), None).unwrap_err();
        assert!(matches!(err, ApiError::MissingAnswer));

        let err = grade_answer(QuestionType::Text, Some("x"), Some("   ")).unwrap_err();
        assert!(matches!(err, ApiError::MissingAnswer));
    }

    #[test]
    fn missing_key_is_an_invalid_question() {
        let err = grade_answer(QuestionType::Click, None, Some("a")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidQuestionState(_)));

        let err = grade_answer(QuestionType::Drag, Some(""), Some("a")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidQuestionState(_)));
    }

    #[test]
    fn manual_types_are_never_auto_graded() {
        let err = grade_answer(QuestionType::Draw, Some("anything"), Some("sketch")).unwrap_err();
        assert!(matches!(err, ApiError::ManualGradingOnly));

        let err = grade_answer(QuestionType::Paint, None, Some("art")).unwrap_err();
        assert!(matches!(err, ApiError::ManualGradingOnly));
    }
}

use learnsphere_api::error::ApiError;
use learnsphere_api::models::question::{AnswerKey, QuestionType};
use learnsphere_api::services::grader::grade_answer;

#[test]
fn drag_grading_is_invariant_under_token_permutation() {
    let correct = "dog,cat";
    for submitted in ["Cat, dog", "dog,cat", " DOG ,CAT", "cat,dog"] {
        assert!(
            grade_answer(QuestionType::Drag, Some(correct), Some(submitted)).unwrap(),
            "{submitted:?} should match {correct:?}"
        );
    }
}

#[test]
fn drag_grading_rejects_wrong_token_sets() {
    assert!(!grade_answer(QuestionType::Drag, Some("dog,cat"), Some("dog,bird")).unwrap());
    assert!(!grade_answer(QuestionType::Drag, Some("dog,cat"), Some("dog")).unwrap());
    assert!(!grade_answer(QuestionType::Drag, Some("dog"), Some("dog,cat")).unwrap());
}

#[test]
fn text_and_click_grading_ignore_case_and_whitespace() {
    for question_type in [QuestionType::Text, QuestionType::Click] {
        assert!(grade_answer(question_type, Some("Photosynthesis"), Some("  photosynthesis  ")).unwrap());
        assert!(grade_answer(question_type, Some("  TRUE"), Some("true")).unwrap());
        assert!(!grade_answer(question_type, Some("Paris"), Some("Pari")).unwrap());
    }
}

#[test]
fn text_grading_does_not_split_on_commas() {
    // Commas are only meaningful for drag questions.
    assert!(grade_answer(QuestionType::Text, Some("a,b"), Some("A,B")).unwrap());
    assert!(!grade_answer(QuestionType::Text, Some("a,b"), Some("b,a")).unwrap());
}

#[test]
fn missing_submission_maps_to_missing_answer() {
    let err = grade_answer(QuestionType::Text, Some("x"), None).unwrap_err();
    assert!(matches!(err, ApiError::MissingAnswer));
}

#[test]
fn missing_key_maps_to_invalid_question_state() {
    let err = grade_answer(QuestionType::Drag, None, Some("a,b")).unwrap_err();
    assert!(matches!(err, ApiError::InvalidQuestionState(_)));
}

#[test]
fn draw_and_paint_are_never_auto_graded() {
    for question_type in [QuestionType::Draw, QuestionType::Paint] {
        let err = grade_answer(question_type, Some("key"), Some("submission")).unwrap_err();
        assert!(matches!(err, ApiError::ManualGradingOnly));
    }
}

#[test]
fn stored_keys_are_validated_per_type_at_write_time() {
    // What the content service enforces before a question is saved.
    assert!(AnswerKey::parse(QuestionType::Text, Some("Paris")).is_ok());
    assert!(AnswerKey::parse(QuestionType::Drag, Some("a, b, c")).is_ok());
    assert!(AnswerKey::parse(QuestionType::Drag, Some("a,,c")).is_err());
    assert!(AnswerKey::parse(QuestionType::Click, None).is_err());
    assert_eq!(
        AnswerKey::parse(QuestionType::Paint, None).unwrap(),
        AnswerKey::Manual
    );
}

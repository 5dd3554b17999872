use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    models::{content::NodeSummary, question::QuestionView},
    services::{
        content_service::{parse_object_id, ContentService},
        AppState,
    },
};

/// Learner-facing, read-only browse of the content tree. Question
/// payloads never include keys or explanations.

pub async fn list_grades(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<NodeSummary>>, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    Ok(Json(service.list_grades().await?))
}

pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
    Path(grade_id): Path<String>,
) -> Result<Json<Vec<NodeSummary>>, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let grade_id = parse_object_id(&grade_id, "grade_id")?;
    Ok(Json(service.list_subjects(grade_id).await?))
}

pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<NodeSummary>>, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let subject_id = parse_object_id(&subject_id, "subject_id")?;
    Ok(Json(service.list_topics(subject_id).await?))
}

pub async fn list_sections(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<String>,
) -> Result<Json<Vec<NodeSummary>>, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let topic_id = parse_object_id(&topic_id, "topic_id")?;
    Ok(Json(service.list_sections(topic_id).await?))
}

pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<String>,
) -> Result<Json<Vec<QuestionView>>, ApiError> {
    let service = ContentService::new(state.mongo.clone());
    let topic_id = parse_object_id(&topic_id, "topic_id")?;
    Ok(Json(service.list_questions(topic_id).await?))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::{
        content::{
            GradeCreateRequest, NodeSummary, NodeUpdateRequest, SectionCreateRequest,
            SubjectCreateRequest, TopicCreateRequest,
        },
        question::{QuestionCreateRequest, QuestionDetail, QuestionUpdateRequest},
    },
    services::{
        content_service::{parse_object_id, ContentService},
        AppState,
    },
};

fn content_service(state: &AppState) -> ContentService {
    ContentService::new(state.mongo.clone())
}

// ---- grades ----

pub async fn create_grade(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<GradeCreateRequest>,
) -> Result<(StatusCode, Json<NodeSummary>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;
    let summary = content_service(&state).create_grade(req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn update_grade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<NodeUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "grade_id")?;
    content_service(&state).update_node("grades", id, req).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_grade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_object_id(&id, "grade_id")?;
    content_service(&state).delete_grade(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- subjects ----

pub async fn create_subject(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SubjectCreateRequest>,
) -> Result<(StatusCode, Json<NodeSummary>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;
    let summary = content_service(&state).create_subject(req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn update_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<NodeUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "subject_id")?;
    content_service(&state)
        .update_node("subjects", id, req)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_object_id(&id, "subject_id")?;
    content_service(&state).delete_subject(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- topics ----

pub async fn create_topic(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<TopicCreateRequest>,
) -> Result<(StatusCode, Json<NodeSummary>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;
    let summary = content_service(&state).create_topic(req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn update_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<NodeUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "topic_id")?;
    content_service(&state).update_node("topics", id, req).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_object_id(&id, "topic_id")?;
    content_service(&state).delete_topic(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- sections ----

pub async fn create_section(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SectionCreateRequest>,
) -> Result<(StatusCode, Json<NodeSummary>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;
    let summary = content_service(&state).create_section(req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn update_section(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<NodeUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_object_id(&id, "section_id")?;
    content_service(&state)
        .update_node("sections", id, req)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_section(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_object_id(&id, "section_id")?;
    content_service(&state).delete_section(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- questions ----

pub async fn create_question(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<QuestionCreateRequest>,
) -> Result<(StatusCode, Json<QuestionDetail>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;
    let detail = content_service(&state).create_question(req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QuestionDetail>, ApiError> {
    let id = parse_object_id(&id, "question_id")?;
    let detail = content_service(&state).get_question_detail(id).await?;
    Ok(Json(detail))
}

pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<QuestionUpdateRequest>,
) -> Result<Json<QuestionDetail>, ApiError> {
    let id = parse_object_id(&id, "question_id")?;
    let detail = content_service(&state).update_question(id, req).await?;
    Ok(Json(detail))
}

pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_object_id(&id, "question_id")?;
    content_service(&state).delete_question(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

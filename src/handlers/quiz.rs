use axum::{
    extract::{Path, State},
    Extension, Json,
};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        progress::{QuizProgressView, StartQuizRequest},
        question::{SubmitAnswerRequest, SubmitAnswerResponse},
    },
    services::{content_service::parse_object_id, quiz_service::QuizService, AppState},
};

fn claims_user_id(claims: &JwtClaims) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid subject in token"))
}

/// POST /api/v1/quiz/questions/answer - Grade one submission
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let response = service.submit_answer(user_id, &req).await?;
    Ok(Json(response))
}

/// POST /api/v1/quiz/topics/{id}/start - Start (or resume) a quiz run
pub async fn start_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(topic_id): Path<String>,
    AppJson(req): AppJson<StartQuizRequest>,
) -> Result<Json<QuizProgressView>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let topic_id = parse_object_id(&topic_id, "topic_id")?;

    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let record = service.start_quiz(user_id, topic_id, req.total_count).await?;
    Ok(Json(QuizProgressView::from(record)))
}

/// POST /api/v1/quiz/topics/{id}/abandon - Abandon the in-progress run
pub async fn abandon_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(topic_id): Path<String>,
) -> Result<Json<QuizProgressView>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let topic_id = parse_object_id(&topic_id, "topic_id")?;

    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let record = service.abandon_quiz(user_id, topic_id).await?;
    Ok(Json(QuizProgressView::from(record)))
}

/// GET /api/v1/quiz/progress - The caller's quiz history
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<Vec<QuizProgressView>>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let records = service.progress_for_user(user_id).await?;
    Ok(Json(records.into_iter().map(QuizProgressView::from).collect()))
}

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use std::str::FromStr;
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::user::{ListUsersQuery, UpdateUserRequest, User, UserProfile, UserRole},
    services::{content_service::parse_object_id, AppState},
    utils::time::chrono_to_bson,
};

const MAX_LIST_LIMIT: i64 = 100;

/// GET /admin/users - List users with optional role/blocked/search filters
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let mut filter = Document::new();

    if let Some(role) = query.role.as_deref() {
        let parsed = UserRole::from_str(role).map_err(ApiError::bad_request)?;
        filter.insert("role", parsed.as_str());
    }
    if let Some(is_blocked) = query.is_blocked {
        filter.insert("is_blocked", is_blocked);
    }
    if let Some(search) = query.search.as_deref() {
        let escaped = regex::escape(search);
        filter.insert(
            "$or",
            vec![
                doc! { "email": { "$regex": &escaped, "$options": "i" } },
                doc! { "username": { "$regex": &escaped, "$options": "i" } },
            ],
        );
    }

    let collection = state.mongo.collection::<User>("users");
    let cursor = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(query.offset.unwrap_or(0) as u64)
        .limit(query.limit.map(|v| v as i64).unwrap_or(50).min(MAX_LIST_LIMIT))
        .await
        .context("Failed to query users")?;

    let users: Vec<User> = cursor.try_collect().await.context("Failed to collect users")?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// GET /admin/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let id = parse_object_id(&id, "user_id")?;
    let user = state
        .mongo
        .collection::<User>("users")
        .find_one(doc! { "_id": id })
        .await
        .context("Failed to query user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserProfile::from(user)))
}

/// PATCH /admin/users/{id} - Update username, role (promotion), or
/// blocked flag
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateUserRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let id = parse_object_id(&id, "user_id")?;

    let mut set = Document::new();
    if let Some(username) = req.username {
        if username.trim().is_empty() {
            return Err(ApiError::bad_request("Username must not be empty"));
        }
        set.insert("username", username);
    }
    if let Some(role) = req.role {
        set.insert("role", role.as_str());
    }
    if let Some(is_blocked) = req.is_blocked {
        set.insert("is_blocked", is_blocked);
    }
    if set.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    set.insert("updatedAt", chrono_to_bson(Utc::now()));

    let collection = state.mongo.collection::<User>("users");
    let updated = collection
        .update_one(doc! { "_id": id }, doc! { "$set": set })
        .await
        .context("Failed to update user")?;
    if updated.matched_count == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    let user = collection
        .find_one(doc! { "_id": id })
        .await
        .context("Failed to re-read user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(user_id = %id.to_hex(), "User updated by admin");
    Ok(Json(UserProfile::from(user)))
}

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    middlewares::auth::JwtService,
    models::subscription::{
        ListSubscriptionsQuery, SubscriptionStatusResponse, SubscriptionView,
    },
    services::{
        content_service::parse_object_id, subscription_service::SubscriptionService, AppState,
    },
};

fn subscription_service(state: &AppState) -> SubscriptionService {
    let jwt_service = JwtService::new(&state.config.jwt_secret);
    SubscriptionService::new(state.mongo_client.clone(), state.mongo.clone(), jwt_service)
}

/// GET /admin/subscriptions - List subscriptions with optional filters
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<Json<Vec<SubscriptionView>>, ApiError> {
    let service = subscription_service(&state);
    let subscriptions = service.list(query).await?;
    Ok(Json(
        subscriptions.into_iter().map(SubscriptionView::from).collect(),
    ))
}

/// GET /admin/subscriptions/{id}
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionView>, ApiError> {
    let id = parse_object_id(&id, "subscription_id")?;
    let subscription = subscription_service(&state).get(id).await?;
    Ok(Json(SubscriptionView::from(subscription)))
}

/// PUT /admin/subscriptions/{id}/freeze - Flip active ⇄ frozen. Any other
/// state is reported back unchanged.
pub async fn freeze_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionStatusResponse>, ApiError> {
    let id = parse_object_id(&id, "subscription_id")?;
    let response = subscription_service(&state).toggle_frozen(id).await?;
    Ok(Json(response))
}

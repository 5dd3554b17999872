use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        pricing::{QuoteQuery, QuoteResponse},
        subscription::{
            StartTrialRequest, StartTrialResponse, SubscriptionStatusResponse, SubscriptionView,
        },
    },
    services::{
        content_service::parse_object_id,
        pricing_service::{quote_from_table, PricingService},
        subscription_service::SubscriptionService,
        AppState,
    },
};

fn subscription_service(state: &AppState) -> SubscriptionService {
    let jwt_service = JwtService::new(&state.config.jwt_secret);
    SubscriptionService::new(state.mongo_client.clone(), state.mongo.clone(), jwt_service)
}

/// Pricing snapshot, loading it lazily if startup found none configured.
async fn pricing_snapshot(
    state: &AppState,
) -> Result<Arc<crate::models::pricing::PricingTable>, ApiError> {
    if let Some(snapshot) = state.pricing.snapshot() {
        return Ok(snapshot);
    }
    let service = PricingService::new(state.mongo.clone());
    let table = service.reload_into(&state.pricing).await?;
    Ok(Arc::new(table))
}

/// GET /api/v1/subscriptions/quote - Price preview for a plan selection
pub async fn quote(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let table = pricing_snapshot(&state).await?;
    let response = quote_from_table(&table, &query)?;
    Ok(Json(response))
}

/// POST /api/v1/subscriptions/trial - Start a 7-day trial
pub async fn start_trial(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StartTrialRequest>,
) -> Result<Json<StartTrialResponse>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    // The amount that will be due when the trial converts; quoted now so
    // the stored subscription is self-contained.
    let table = pricing_snapshot(&state).await?;
    let quote = quote_from_table(
        &table,
        &QuoteQuery {
            plan_type: req.plan_type,
            billing_cycle: req.billing_cycle,
            children_count: req.children_count,
        },
    )?;

    let service = subscription_service(&state);
    let response = service
        .start_trial(req, quote.total, state.config.trial_days)
        .await?;

    Ok(Json(response))
}

/// GET /api/v1/subscriptions/current - The caller's current subscription
pub async fn current_subscription(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<Option<SubscriptionView>>, ApiError> {
    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid subject in token"))?;

    let service = subscription_service(&state);
    let subscription = service.current_for_user(user_id).await?;
    Ok(Json(subscription.map(SubscriptionView::from)))
}

/// PUT /api/v1/subscriptions/{id}/cancel - Cancel (idempotent). Owners
/// may cancel their own subscription; admins may cancel any.
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionStatusResponse>, ApiError> {
    let subscription_id = parse_object_id(&id, "subscription_id")?;
    let service = subscription_service(&state);

    let subscription = service.get(subscription_id).await?;
    let is_admin = claims
        .parsed_role()
        .map(|role| role.is_admin())
        .unwrap_or(false);
    if !is_admin && subscription.user_id.to_hex() != claims.sub {
        return Err(ApiError::forbidden(
            "Cannot cancel another user's subscription",
        ));
    }

    let response = service.cancel(subscription_id).await?;
    Ok(Json(response))
}

use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::pricing::{PricingTable, PricingUpdateRequest},
    services::{pricing_service::PricingService, AppState},
};

/// GET /admin/settings/pricing - Current pricing table (from the store,
/// not the cache, so admins see exactly what is persisted)
pub async fn get_pricing(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PricingTable>, ApiError> {
    let service = PricingService::new(state.mongo.clone());
    let table = service.load().await?.ok_or_else(|| {
        ApiError::not_found("No pricing configured; PUT /admin/settings/pricing to create it")
    })?;
    Ok(Json(table))
}

/// PUT /admin/settings/pricing - Replace the pricing table. Yearly prices
/// are derived from the submitted monthly price and percentage discount.
pub async fn update_pricing(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<PricingUpdateRequest>,
) -> Result<Json<PricingTable>, ApiError> {
    let service = PricingService::new(state.mongo.clone());
    let table = service
        .update(req.into_table(), &claims.sub, &state.pricing)
        .await?;
    Ok(Json(table))
}

/// POST /admin/settings/pricing/reload - Re-read the persisted blob into
/// the process-wide snapshot (e.g. after a manual DB edit)
pub async fn reload_pricing(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PricingTable>, ApiError> {
    let service = PricingService::new(state.mongo.clone());
    let table = service.reload_into(&state.pricing).await?;
    Ok(Json(table))
}

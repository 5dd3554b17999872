use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        refresh_token::RefreshTokenResponse,
        user::{
            AuthResponseCookie, ChangePasswordRequest, LoginRequest, RegisterRequest,
            SetPasswordRequest, UserProfile,
        },
    },
    services::{auth_service::AuthService, AppState},
};

fn auth_service(state: &AppState) -> AuthService {
    let jwt_service = JwtService::new(&state.config.jwt_secret);
    AuthService::new(state.mongo.clone(), state.redis.clone(), jwt_service)
}

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build(("refresh_token", token))
        .path("/api/v1/auth")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .max_age(time::Duration::days(30))
        .build()
}

/// POST /api/v1/auth/register - Register a new user
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!("Registering new user: {}", req.email);

    let service = auth_service(&state);
    let response = service.register(req).await?;

    let jar = jar.add(refresh_cookie(&state, response.refresh_token.clone()));

    let response_body = AuthResponseCookie {
        access_token: response.access_token,
        user: response.user,
    };

    Ok((StatusCode::CREATED, jar, Json(response_body)))
}

/// POST /api/v1/auth/login - Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    // Extract IP and User-Agent before consuming the body
    let headers = request.headers();
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let body_bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read body: {}", e)))?;

    let req: LoginRequest = serde_json::from_slice(&body_bytes)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!("Login attempt for user: {}", req.email);

    let service = auth_service(&state);
    let email = req.email.clone();

    // Default to unlocked if the Redis check itself fails
    let is_locked = service.check_failed_attempts(&email).await.unwrap_or(false);
    if is_locked {
        tracing::warn!("Login blocked for {}: too many failed attempts", email);
        return Err(ApiError::TooManyRequests(
            "Too many failed login attempts. Please try again later.".to_string(),
        ));
    }

    match service.login(req, ip, user_agent).await {
        Ok(response) => {
            let _ = service.clear_failed_attempts(&email).await;

            let jar = jar.add(refresh_cookie(&state, response.refresh_token.clone()));

            let response_body = AuthResponseCookie {
                access_token: response.access_token,
                user: response.user,
            };

            Ok((StatusCode::OK, jar, Json(response_body)))
        }
        Err(err) => {
            if matches!(err, ApiError::Unauthorized(_)) {
                let _ = service.increment_failed_attempts(&email).await;
            }
            Err(err)
        }
    }
}

/// POST /api/v1/auth/refresh - Exchange the refresh cookie for a new
/// access token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let token = jar
        .get("refresh_token")
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Missing refresh token"))?;

    let service = auth_service(&state);
    let access_token = service.refresh_token(&token).await?;

    Ok(Json(RefreshTokenResponse { access_token }))
}

/// POST /api/v1/auth/logout - Revoke the refresh token
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get("refresh_token")
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Missing refresh token"))?;

    let service = auth_service(&state);
    let user_id = service.logout(&token).await?;

    tracing::info!(user_id = %user_id, "User logged out");

    let jar = jar.remove(Cookie::build(("refresh_token", "")).path("/api/v1/auth").build());
    Ok((StatusCode::OK, jar, Json(serde_json::json!({ "ok": true }))))
}

/// POST /api/v1/auth/set-password - Replace a trial account's placeholder
/// password (promotes trial → user)
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SetPasswordRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let service = auth_service(&state);
    let profile = service.set_password(req).await?;
    Ok(Json(profile))
}

/// GET /api/v1/auth/me - Current user profile
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<UserProfile>, ApiError> {
    let service = auth_service(&state);
    let user = service.get_user_by_id(&claims.sub).await?;
    Ok(Json(UserProfile::from(user)))
}

/// POST /api/v1/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let service = auth_service(&state);
    service.change_password(&claims.sub, req).await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

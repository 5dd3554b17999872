use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS for the browser frontend
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to the frontend origin in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Auth endpoints (mixed: some public, some protected)
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        // Public catalog browse
        .nest("/api/v1/catalog", catalog_routes())
        // Subscriptions (public signup/quote + protected management)
        .nest("/api/v1/subscriptions", subscription_routes(app_state.clone()))
        // Quiz flow (requires JWT)
        .nest(
            "/api/v1/quiz",
            quiz_routes()
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::rate_limit::rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .nest(
            "/admin",
            admin_routes()
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::rate_limit::rate_limit_middleware,
                ))
                .route_layer(middleware::from_fn(
                    middlewares::auth::admin_guard_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn catalog_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/grades", get(handlers::catalog::list_grades))
        .route(
            "/grades/{id}/subjects",
            get(handlers::catalog::list_subjects),
        )
        .route(
            "/subjects/{id}/topics",
            get(handlers::catalog::list_topics),
        )
        .route(
            "/topics/{id}/sections",
            get(handlers::catalog::list_sections),
        )
        .route(
            "/topics/{id}/questions",
            get(handlers::catalog::list_questions),
        )
}

fn quiz_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/questions/answer",
            post(handlers::quiz::submit_answer),
        )
        .route("/topics/{id}/start", post(handlers::quiz::start_quiz))
        .route("/topics/{id}/abandon", post(handlers::quiz::abandon_quiz))
        .route("/progress", get(handlers::quiz::get_progress))
}

fn subscription_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // Public signup with its own rate-limit window
    let trial_route = Router::new()
        .route("/trial", post(handlers::subscriptions::start_trial))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::trial_rate_limit_middleware,
        ));

    let quote_route = Router::new().route("/quote", get(handlers::subscriptions::quote));

    // Protected management routes
    let protected_routes = Router::new()
        .route(
            "/current",
            get(handlers::subscriptions::current_subscription),
        )
        .route(
            "/{id}/cancel",
            put(handlers::subscriptions::cancel_subscription),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    trial_route.merge(quote_route).merge(protected_routes)
}

fn admin_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        // Content management
        .route("/grades", post(handlers::admin::create_grade))
        .route(
            "/grades/{id}",
            put(handlers::admin::update_grade).delete(handlers::admin::delete_grade),
        )
        .route("/subjects", post(handlers::admin::create_subject))
        .route(
            "/subjects/{id}",
            put(handlers::admin::update_subject).delete(handlers::admin::delete_subject),
        )
        .route("/topics", post(handlers::admin::create_topic))
        .route(
            "/topics/{id}",
            put(handlers::admin::update_topic).delete(handlers::admin::delete_topic),
        )
        .route("/sections", post(handlers::admin::create_section))
        .route(
            "/sections/{id}",
            put(handlers::admin::update_section).delete(handlers::admin::delete_section),
        )
        .route("/questions", post(handlers::admin::create_question))
        .route(
            "/questions/{id}",
            get(handlers::admin::get_question)
                .put(handlers::admin::update_question)
                .delete(handlers::admin::delete_question),
        )
        // Pricing settings
        .route(
            "/settings/pricing",
            get(handlers::admin::get_pricing).put(handlers::admin::update_pricing),
        )
        .route(
            "/settings/pricing/reload",
            post(handlers::admin::reload_pricing),
        )
        // User management
        .route("/users", get(handlers::admin::list_users))
        .route(
            "/users/{id}",
            get(handlers::admin::get_user).patch(handlers::admin::update_user),
        )
        // Subscription management
        .route("/subscriptions", get(handlers::admin::list_subscriptions))
        .route(
            "/subscriptions/{id}",
            get(handlers::admin::get_subscription),
        )
        .route(
            "/subscriptions/{id}/freeze",
            put(handlers::admin::freeze_subscription),
        )
}

fn auth_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // Public routes with rate limiting
    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let refresh_route = Router::new().route("/refresh", post(handlers::auth::refresh_token));

    // Trial accounts claim their password here (promotes trial → user)
    let set_password_route =
        Router::new().route("/set-password", post(handlers::auth::set_password));

    let public_routes = register_route
        .merge(login_route)
        .merge(refresh_route)
        .merge(set_password_route);

    // Protected routes (require JWT auth)
    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::get_current_user))
        .route("/logout", post(handlers::auth::logout))
        .route("/change-password", post(handlers::auth::change_password))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

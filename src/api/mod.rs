//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints for the Tilldesk service:
//! - Auth endpoints (login/logout/me, bootstrap registration)
//! - Staff management endpoints
//! - Till session endpoints (enforcement, open, closing wizard, reports)
//! - Order endpoints
//! - Schedule endpoints

pub mod auth;
pub mod common;
pub mod middleware;
pub mod orders;
pub mod schedule;
pub mod till;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::CorsLayer;

pub use common::{PageQuery, Paginated};
pub use middleware::{ApiError, AppState, RequestStats, CSRF_HEADER};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Manager routes
    let manager_routes = Router::new()
        .nest("/schedule", schedule::manager_router())
        .route_layer(axum_middleware::from_fn(middleware::require_manager));

    // Admin routes
    let admin_routes = Router::new()
        .nest("/users", auth::users_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin));

    // Everything below requires a valid session; mutating requests also
    // need the CSRF header. Layer order: auth runs first, then CSRF.
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/till", till::router())
        .nest("/orders", orders::router())
        .nest("/schedule", schedule::router())
        .merge(manager_routes)
        .merge(admin_routes)
        .route_layer(axum_middleware::from_fn(middleware::csrf_guard))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // CORS configuration - cookie auth needs credentials and the CSRF header
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static("x-csrftoken"),
        ])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

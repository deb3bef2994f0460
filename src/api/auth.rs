//! Authentication API endpoints
//!
//! Handles HTTP requests for staff authentication:
//! - POST /api/v1/auth/register - Bootstrap registration (first user = admin)
//! - POST /api/v1/auth/login - Login, sets session + csrftoken cookies
//! - POST /api/v1/auth/logout - Logout
//! - GET /api/v1/auth/me - Current user
//! - POST /api/v1/users - Create staff account (admin)
//! - GET /api/v1/users - List staff accounts (manager)

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionContext};
use crate::models::{Session, UserRole};
use crate::services::{LoginInput, RegisterInput, UserServiceError};

/// Request body for registration and staff creation
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Request body for creating a staff account
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub csrf_token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub active: bool,
    pub created_at: String,
}

impl From<crate::models::User> for UserResponse {
    fn from(user: crate::models::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role.to_string(),
            active: user.active,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// Build staff management routes (auth + role middleware applied by caller)
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user))
        .route("/", get(list_users))
}

fn map_user_error(e: UserServiceError) -> ApiError {
    match e {
        UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        UserServiceError::UserExists(msg) => ApiError::conflict(msg),
        UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
        UserServiceError::InternalError(e) => ApiError::internal_error(e.to_string()),
    }
}

/// Session cookie (HttpOnly) plus a csrftoken cookie the client echoes back
/// in the `X-CSRFToken` header.
fn session_cookies(session: &Session) -> HeaderMap {
    let max_age = 7 * 24 * 60 * 60;
    let session_cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id, max_age
    );
    let csrf_cookie = format!(
        "csrftoken={}; Path=/; SameSite=Lax; Max-Age={}",
        session.csrf_token, max_age
    );

    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_str(&session_cookie).unwrap(),
    );
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_str(&csrf_cookie).unwrap(),
    );
    headers
}

/// POST /api/v1/auth/register - Bootstrap registration
///
/// Only valid while the system has no users; the first account becomes
/// admin and registration closes.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = RegisterInput::new(body.username, body.password.clone());
    let username = input.username.clone();

    let user = state
        .user_service
        .register(input)
        .await
        .map_err(map_user_error)?;

    // Log the new admin straight in
    let session = state
        .user_service
        .login(LoginInput::new(username, body.password))
        .await
        .map_err(map_user_error)?;

    let headers = session_cookies(&session);
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: user.into(),
            csrf_token: session.csrf_token,
        }),
    ))
}

/// POST /api/v1/auth/login - Login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip_address = extract_ip_address(&headers);

    // IP rate limit (10 requests per minute)
    if let Some(ip) = ip_address.as_ref().and_then(|s| s.parse().ok()) {
        if state.rate_limiter.is_ip_limited(ip).await {
            return Err(ApiError::with_details(
                "RATE_LIMIT",
                "Too many requests; try again shortly",
                serde_json::json!({"retry_after": 60}),
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    // Username rate limit (5 failures per 15 minutes)
    if state.rate_limiter.is_username_limited(&body.username).await {
        return Err(ApiError::with_details(
            "RATE_LIMIT",
            "Too many failed logins; try again in 15 minutes",
            serde_json::json!({"retry_after": 900}),
        ));
    }

    let session = match state
        .user_service
        .login(LoginInput::new(body.username.clone(), body.password))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.rate_limiter.record_failed_attempt(&body.username).await;
            }
            return Err(map_user_error(e));
        }
    };

    state
        .rate_limiter
        .clear_username_attempts(&body.username)
        .await;

    let (user, _) = state
        .user_service
        .validate_session(&session.id)
        .await
        .map_err(map_user_error)?
        .ok_or_else(|| ApiError::internal_error("Session validation failed"))?;

    let headers = session_cookies(&session);
    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            csrf_token: session.csrf_token,
        }),
    ))
}

/// POST /api/v1/auth/logout - Logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    session: axum::Extension<SessionContext>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .user_service
        .logout(&session.0 .0.id)
        .await
        .map_err(map_user_error)?;

    // Clear both cookies
    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_static("csrftoken=; Path=/; SameSite=Lax; Max-Age=0"),
    );

    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me - Current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// POST /api/v1/users - Create a staff account (admin only)
async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = UserRole::from_str(&body.role)
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let user = state
        .user_service
        .create_user(RegisterInput::new(body.username, body.password), role)
        .await
        .map_err(map_user_error)?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /api/v1/users - List staff accounts (manager)
async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.list().await.map_err(map_user_error)?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Extract IP address from request headers
/// Checks X-Forwarded-For and X-Real-IP (proxy/load balancer)
fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                return Some(ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

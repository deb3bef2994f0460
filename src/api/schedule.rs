//! Shift schedule API endpoints
//!
//! Only what the enforcement flow needs:
//! - POST /api/v1/schedule - assign a cashier to a shift (manager)
//! - GET /api/v1/schedule/today - the caller's assignment for the active window

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ShiftAssignment, ShiftKind};

/// Request body for assigning a shift
#[derive(Debug, Deserialize)]
pub struct AssignShiftRequest {
    pub cashier_id: i64,
    pub date: NaiveDate,
    pub shift: String,
}

/// Response for the today lookup
#[derive(Debug, Serialize)]
pub struct TodayResponse {
    /// The shift window the wall clock currently falls in, if any
    pub active_shift: Option<ShiftKind>,
    /// The caller's assignment for that window
    pub assignment: Option<ShiftAssignment>,
}

/// Build the manager-only schedule routes
pub fn manager_router() -> Router<AppState> {
    Router::new().route("/", post(assign_shift))
}

/// Build the schedule routes every authenticated user may call
pub fn router() -> Router<AppState> {
    Router::new().route("/today", get(today))
}

/// POST /api/v1/schedule - assign a cashier to a shift (upsert)
async fn assign_shift(
    State(state): State<AppState>,
    Json(body): Json<AssignShiftRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let shift = ShiftKind::from_str(&body.shift)
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let cashier = state
        .user_service
        .get_by_id(body.cashier_id)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Cashier not found"))?;
    if !cashier.is_cashier() {
        return Err(ApiError::validation_error(
            "Shifts are assigned to cashiers only",
        ));
    }

    let assignment = state
        .schedule_repo
        .assign(body.cashier_id, body.date, shift)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// GET /api/v1/schedule/today - the caller's assignment for the active window
async fn today(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<TodayResponse>, ApiError> {
    let now = Local::now().naive_local();
    let active_shift = state.windows.classify_at(now);

    let assignment = match active_shift {
        Some(shift) => {
            let date = state.windows.business_date(now, shift);
            state
                .schedule_repo
                .get(user.0.id, date, shift)
                .await
                .map_err(|e| ApiError::internal_error(e.to_string()))?
        }
        None => None,
    };

    Ok(Json(TodayResponse {
        active_shift,
        assignment,
    }))
}

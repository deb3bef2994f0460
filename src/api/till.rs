//! Till session API endpoints
//!
//! - GET /api/v1/till/enforcement - the open/close directive for the cashier
//! - POST /api/v1/till/sessions - open a session
//! - GET /api/v1/till/sessions - paginated session history
//! - GET /api/v1/till/sessions/active - the caller's open session
//! - GET /api/v1/till/sessions/{id} - one session
//! - GET /api/v1/till/sessions/{id}/validation - can-close check
//! - POST /api/v1/till/sessions/{id}/close/validate - wizard step 1
//! - POST /api/v1/till/sessions/{id}/close/cash-count - wizard step 2
//! - POST /api/v1/till/sessions/{id}/close/back - summary -> cash-count
//! - POST /api/v1/till/sessions/{id}/close/confirm - close + report
//! - GET /api/v1/till/sessions/{id}/report - the frozen report

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::common::{PageQuery, Paginated};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CashVariance, Order, SessionReport, SessionValidation, SettlementTotals, ShiftKind,
    TillSession, User,
};
use crate::services::{TillSessionError, WizardError, WizardStep};

/// Request body for opening a session
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub opening_float: i64,
    /// Defaults to the currently active shift window
    pub shift: Option<String>,
}

/// Request body for the cash-count step
#[derive(Debug, Deserialize)]
pub struct CashCountRequest {
    pub actual_cash: i64,
}

/// Request body for the confirm step
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    pub notes: Option<String>,
}

/// Wizard step 1 response
#[derive(Debug, Serialize)]
pub struct ValidateStepResponse {
    pub step: WizardStep,
    pub can_close: bool,
    pub unsettled_orders: Vec<Order>,
}

/// Wizard step 2 response: the reconciliation preview
#[derive(Debug, Serialize)]
pub struct CashCountStepResponse {
    pub step: WizardStep,
    pub totals: SettlementTotals,
    pub reconciliation: CashVariance,
}

/// Wizard back-transition response
#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub step: WizardStep,
}

/// Wizard confirm response: terminal state plus the printable report
#[derive(Debug, Serialize)]
pub struct ConfirmStepResponse {
    pub step: WizardStep,
    pub report: SessionReport,
}

/// Build the till router (auth applied by the caller)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/enforcement", get(enforcement))
        .route("/sessions", post(open_session))
        .route("/sessions", get(list_sessions))
        .route("/sessions/active", get(active_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/validation", get(session_validation))
        .route("/sessions/{id}/close/validate", post(close_validate))
        .route("/sessions/{id}/close/cash-count", post(close_cash_count))
        .route("/sessions/{id}/close/back", post(close_back))
        .route("/sessions/{id}/close/confirm", post(close_confirm))
        .route("/sessions/{id}/report", get(session_report))
}

fn map_till_error(e: TillSessionError) -> ApiError {
    match e {
        TillSessionError::NotFound => ApiError::not_found("Till session not found"),
        TillSessionError::NotOpen => ApiError::conflict("Till session is already closed"),
        TillSessionError::NoActiveShift => {
            ApiError::validation_error("No shift window is active right now")
        }
        TillSessionError::NotScheduled(shift) => {
            ApiError::forbidden(format!("Not scheduled for the {} shift", shift))
        }
        TillSessionError::AlreadyOpen => {
            ApiError::conflict("An open session already exists for this shift")
        }
        TillSessionError::Blocked(n) => ApiError::with_details(
            "SESSION_BLOCKED",
            format!("{} unsettled order(s) block closing this session", n),
            serde_json::json!({ "unsettled": n }),
        ),
        TillSessionError::ValidationError(msg) => ApiError::validation_error(msg),
        TillSessionError::InternalError(e) => ApiError::internal_error(e.to_string()),
    }
}

fn map_wizard_error(e: WizardError) -> ApiError {
    match e {
        WizardError::WrongStep { at, wanted } => ApiError::with_details(
            "WIZARD_STEP",
            e.to_string(),
            serde_json::json!({ "at": at.to_string(), "wanted": wanted.to_string() }),
        ),
        WizardError::Blocked(n) => ApiError::with_details(
            "SESSION_BLOCKED",
            e.to_string(),
            serde_json::json!({ "unsettled": n }),
        ),
        WizardError::NegativeCash => ApiError::validation_error(e.to_string()),
    }
}

/// Load a session the caller may work on: their own, or any for managers
async fn load_owned_session(
    state: &AppState,
    user: &User,
    id: i64,
) -> Result<TillSession, ApiError> {
    let session = state.till_service.get(id).await.map_err(map_till_error)?;
    if session.cashier_id != user.id && !user.is_manager() {
        return Err(ApiError::forbidden("Not your till session"));
    }
    Ok(session)
}

/// GET /api/v1/till/enforcement
///
/// The poll target: clients call this every few minutes and redirect based
/// on the returned action. Always 200; failures inside resolve to no action.
async fn enforcement(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> impl IntoResponse {
    let now = Local::now().naive_local();
    let decision = state.enforcement.evaluate(&user.0, now).await;
    Json(decision)
}

/// POST /api/v1/till/sessions - open a session
async fn open_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<OpenSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.0.is_cashier() {
        return Err(ApiError::forbidden("Only cashiers run till sessions"));
    }

    let shift = body
        .shift
        .as_deref()
        .map(ShiftKind::from_str)
        .transpose()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let now = Local::now().naive_local();
    let session = state
        .till_service
        .open(&user.0, body.opening_float, shift, now)
        .await
        .map_err(map_till_error)?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/till/sessions - paginated history
///
/// Cashiers see their own sessions; managers see everyone's.
async fn list_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<TillSession>>, ApiError> {
    let query = query.clamped();
    let cashier_filter = if user.0.is_manager() {
        None
    } else {
        Some(user.0.id)
    };

    let (sessions, count) = state
        .till_service
        .list(cashier_filter, query.limit(), query.offset())
        .await
        .map_err(map_till_error)?;

    Ok(Json(Paginated::new(
        "/api/v1/till/sessions",
        query,
        count,
        sessions,
    )))
}

/// GET /api/v1/till/sessions/active - the caller's open session
async fn active_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Option<TillSession>>, ApiError> {
    let session = state
        .till_service
        .active_for(user.0.id)
        .await
        .map_err(map_till_error)?;
    Ok(Json(session))
}

/// GET /api/v1/till/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<TillSession>, ApiError> {
    let session = load_owned_session(&state, &user.0, id).await?;
    Ok(Json(session))
}

/// GET /api/v1/till/sessions/{id}/validation - can-close check
async fn session_validation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SessionValidation>, ApiError> {
    let session = load_owned_session(&state, &user.0, id).await?;
    let validation = state
        .till_service
        .validate(&session)
        .await
        .map_err(map_till_error)?;
    Ok(Json(validation))
}

/// POST /api/v1/till/sessions/{id}/close/validate - wizard step 1
///
/// A blocked validation is not an error: the response lists the unsettled
/// orders and the wizard stays at the validate step for a retry.
async fn close_validate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ValidateStepResponse>, ApiError> {
    let session = load_owned_session(&state, &user.0, id).await?;
    if !session.is_open() {
        return Err(ApiError::conflict("Till session is already closed"));
    }

    let validation = state
        .till_service
        .validate(&session)
        .await
        .map_err(map_till_error)?;

    let result = state
        .wizards
        .transition(id, |w| w.pass_validation(&validation))
        .await;

    match result {
        Ok(()) => Ok(Json(ValidateStepResponse {
            step: WizardStep::CashCount,
            can_close: true,
            unsettled_orders: vec![],
        })),
        Err(WizardError::Blocked(_)) => Ok(Json(ValidateStepResponse {
            step: WizardStep::Validate,
            can_close: false,
            unsettled_orders: validation.unsettled_orders,
        })),
        Err(e) => Err(map_wizard_error(e)),
    }
}

/// POST /api/v1/till/sessions/{id}/close/cash-count - wizard step 2
async fn close_cash_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CashCountRequest>,
) -> Result<Json<CashCountStepResponse>, ApiError> {
    let session = load_owned_session(&state, &user.0, id).await?;
    if !session.is_open() {
        return Err(ApiError::conflict("Till session is already closed"));
    }

    // Preview first: a failed aggregation must leave the wizard where it is
    let (totals, reconciliation) = state
        .till_service
        .reconcile(&session, body.actual_cash)
        .await
        .map_err(map_till_error)?;

    state
        .wizards
        .transition(id, |w| w.record_cash(body.actual_cash))
        .await
        .map_err(map_wizard_error)?;

    Ok(Json(CashCountStepResponse {
        step: WizardStep::Summary,
        totals,
        reconciliation,
    }))
}

/// POST /api/v1/till/sessions/{id}/close/back - summary -> cash-count
async fn close_back(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<StepResponse>, ApiError> {
    load_owned_session(&state, &user.0, id).await?;

    state
        .wizards
        .transition(id, |w| w.back_to_cash_count())
        .await
        .map_err(map_wizard_error)?;

    Ok(Json(StepResponse {
        step: WizardStep::CashCount,
    }))
}

/// POST /api/v1/till/sessions/{id}/close/confirm - close and report
async fn close_confirm(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Json<ConfirmStepResponse>, ApiError> {
    let session = load_owned_session(&state, &user.0, id).await?;
    let notes = body.and_then(|Json(b)| b.notes);

    let actual_cash = state
        .wizards
        .transition(id, |w| w.confirm())
        .await
        .map_err(map_wizard_error)?;

    // Orders may have changed since validation passed; close re-checks and
    // the wizard is wound back so the operator starts from validate again.
    let report = match state.till_service.close(&session, actual_cash, notes).await {
        Ok(report) => report,
        Err(e) => {
            state.wizards.remove(id).await;
            return Err(map_till_error(e));
        }
    };

    state.wizards.remove(id).await;
    Ok(Json(ConfirmStepResponse {
        step: WizardStep::Success,
        report,
    }))
}

/// GET /api/v1/till/sessions/{id}/report - the frozen report (404 until closed)
async fn session_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SessionReport>, ApiError> {
    load_owned_session(&state, &user.0, id).await?;
    let report = state
        .till_service
        .report(id)
        .await
        .map_err(map_till_error)?;
    Ok(Json(report))
}

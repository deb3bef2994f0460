//! Order API endpoints
//!
//! The minimum order surface the session flows need:
//! - POST /api/v1/orders - ring up an order on the caller's open session
//! - GET /api/v1/orders - paginated list, filterable by session and status
//! - POST /api/v1/orders/{id}/settle - settle with a payment method

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;

use crate::api::common::{PageQuery, Paginated};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::db::repositories::OrderFilter;
use crate::models::{Order, OrderStatus, PaymentMethod};

/// Request body for ringing up an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub reference: String,
    pub amount: i64,
}

/// Request body for settling an order
#[derive(Debug, Deserialize)]
pub struct SettleOrderRequest {
    pub method: String,
}

/// Query parameters for listing orders
///
/// Page fields are spelled out rather than flattened; serde_urlencoded does
/// not deserialize numbers through `#[serde(flatten)]`.
#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub session_id: Option<i64>,
    pub status: Option<String>,
    #[serde(default = "crate::api::common::default_page")]
    pub page: i64,
    #[serde(default = "crate::api::common::default_page_size")]
    pub page_size: i64,
}

/// Build the orders router (auth applied by the caller)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/{id}/settle", post(settle_order))
}

/// POST /api/v1/orders - ring up an order on the caller's open session
async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.amount <= 0 {
        return Err(ApiError::validation_error("Order amount must be positive"));
    }
    if body.reference.trim().is_empty() {
        return Err(ApiError::validation_error("Order reference is required"));
    }

    let session = state
        .till_service
        .active_for(user.0.id)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::conflict("No open till session to ring orders on"))?;

    let order = state
        .order_repo
        .create(&Order {
            id: 0,
            session_id: session.id,
            reference: body.reference.trim().to_string(),
            amount: body.amount,
            method: None,
            status: OrderStatus::Open,
            created_at: Utc::now(),
            settled_at: None,
        })
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/v1/orders - paginated list
async fn list_orders(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Paginated<Order>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let filter = OrderFilter {
        session_id: query.session_id,
        status,
    };
    let page = PageQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .clamped();

    let orders = state
        .order_repo
        .list(filter, page.limit(), page.offset())
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    let count = state
        .order_repo
        .count(filter)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(Paginated::new("/api/v1/orders", page, count, orders)))
}

/// POST /api/v1/orders/{id}/settle - settle with a payment method
async fn settle_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<SettleOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let method = PaymentMethod::from_str(&body.method)
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let order = state
        .order_repo
        .get_by_id(id)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    // Only the session's cashier (or a manager) settles its orders
    let session = state
        .till_service
        .get(order.session_id)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    if session.cashier_id != user.0.id && !user.0.is_manager() {
        return Err(ApiError::forbidden("Not your till session"));
    }

    if order.is_settled() {
        return Err(ApiError::conflict("Order is already settled"));
    }

    let settled = state
        .order_repo
        .settle(id, method, Utc::now())
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(settled))
}

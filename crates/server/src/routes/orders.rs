//! Order draft persistence route handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use natucart_core::{OrderContext, OrderRecord};
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::validate_order_id;

/// Persist an order draft as a pending-payment record.
///
/// Re-posting an existing draft returns the stored record unchanged, so a
/// client retry after a lost response cannot reset an order that has
/// already advanced past `pending_payment`.
#[instrument(skip_all, fields(order_id = %draft.order_id))]
pub async fn create_order(
    State(state): State<AppState>,
    Json(draft): Json<OrderContext>,
) -> Result<(StatusCode, Json<OrderRecord>), AppError> {
    if validate_order_id(&draft.order_id).is_err() {
        return Err(AppError::BadRequest("invalid order id".to_string()));
    }
    if draft.items.is_empty() {
        return Err(AppError::Unprocessable(
            "order has no line items".to_string(),
        ));
    }
    if draft.totals.total != draft.totals.subtotal + draft.totals.freight {
        return Err(AppError::Unprocessable(
            "order totals do not add up".to_string(),
        ));
    }

    if let Some(existing) = state.orders().get(&draft.order_id).await? {
        tracing::info!("draft already persisted");
        return Ok((StatusCode::OK, Json(existing)));
    }

    let record = OrderRecord::from_draft(draft, Utc::now());
    state.orders().put(&record).await?;
    tracing::info!("order draft persisted");

    Ok((StatusCode::CREATED, Json(record)))
}

/// Fetch a persisted order record.
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderRecord>, AppError> {
    if validate_order_id(&order_id).is_err() {
        return Err(AppError::BadRequest("invalid order id".to_string()));
    }
    match state.orders().get(&order_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(format!("order {order_id} not found"))),
    }
}

//! Payment route handlers.
//!
//! The charge handler forwards to Mercado Pago and records the gateway's
//! answer on the order. A *rejected* payment is still a successful HTTP
//! exchange here; only transport and gateway failures surface as errors.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use natucart_core::{ChargeRequest, ChargeResponse, OrderContext, PaymentRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Hosted-checkout redirect target.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceResponse {
    pub init_point: String,
}

/// AbacatePay billing session redirect target.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub checkout_url: String,
}

/// Create a Mercado Pago payment for a persisted order draft.
///
/// The gateway outcome is merged onto the order record before responding,
/// so a crash after this handler leaves the record consistent with what
/// the gateway believes.
#[instrument(skip_all, fields(order_id = %request.order.order_id))]
pub async fn charge(
    State(state): State<AppState>,
    Json(request): Json<ChargeRequest>,
) -> Result<Json<ChargeResponse>, AppError> {
    if request.idempotency_key.trim().is_empty() {
        return Err(AppError::Unprocessable(
            "missing idempotency key".to_string(),
        ));
    }
    if request.order.totals.total <= Decimal::ZERO {
        return Err(AppError::Unprocessable(
            "order total must be positive".to_string(),
        ));
    }

    let response = state.payments().create_payment(&request).await?;
    tracing::info!(
        payment_id = %response.payment_id,
        status = response.status.as_str(),
        "payment created"
    );

    record_outcome(&state, &request.order.order_id, &response).await;

    Ok(Json(response))
}

/// Create a hosted-checkout preference for an order.
#[instrument(skip_all, fields(order_id = %order.order_id))]
pub async fn create_preference(
    State(state): State<AppState>,
    Json(order): Json<OrderContext>,
) -> Result<Json<PreferenceResponse>, AppError> {
    let init_point = state.payments().create_preference(&order).await?;
    Ok(Json(PreferenceResponse { init_point }))
}

/// Create an `AbacatePay` pix billing session for an order.
#[instrument(skip_all, fields(order_id = %order.order_id))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(order): Json<OrderContext>,
) -> Result<Json<SessionResponse>, AppError> {
    let Some(abacatepay) = state.abacatepay() else {
        return Err(AppError::BadRequest(
            "pix billing gateway is not configured".to_string(),
        ));
    };
    let checkout_url = abacatepay.create_billing(&order).await?;
    Ok(Json(SessionResponse { checkout_url }))
}

/// Merge the synchronous gateway answer onto the order record.
///
/// Store failures here are logged, not returned: the payment already
/// exists at the gateway, and the webhook will re-deliver the outcome.
async fn record_outcome(state: &AppState, order_id: &str, response: &ChargeResponse) {
    let payment = PaymentRecord {
        payment_id: response.payment_id.clone(),
        status: response.status.as_str().to_string(),
        status_detail: response.status_detail.clone(),
        payment_method_id: None,
        amount: None,
        approved_at: None,
    };
    let status = response.status;

    let result = state
        .orders()
        .update(order_id, &move |record| {
            record.payment = Some(payment.clone());
            if let Some(next) = status.terminal_order_status() {
                record.transition(next, Utc::now());
            } else if status.disposition() == natucart_core::PaymentDisposition::Approved {
                record.transition(natucart_core::OrderStatus::Approved, Utc::now());
            }
        })
        .await;

    match result {
        Ok(Some(_)) => {}
        Ok(None) => tracing::warn!(order_id, "charge for an unknown order draft"),
        Err(err) => tracing::error!(order_id, error = %err, "failed to record payment outcome"),
    }
}

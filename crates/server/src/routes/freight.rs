//! Freight quoting route handlers.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use natucart_core::{FreightQuote, RateRequest};
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Quote shipping services for a destination CEP and a set of packages.
///
/// Quotes are cached per CEP and package set for a few minutes; the carrier
/// only sees cache misses.
#[instrument(skip_all, fields(postal_code = %request.postal_code))]
pub async fn quote(
    State(state): State<AppState>,
    Json(mut request): Json<RateRequest>,
) -> Result<Json<FreightQuote>, AppError> {
    let postal_code: String = request
        .postal_code
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if postal_code.len() != 8 {
        return Err(AppError::BadRequest(
            "postal code must have 8 digits".to_string(),
        ));
    }
    if request.packages.is_empty() {
        return Err(AppError::Unprocessable("no packages to quote".to_string()));
    }
    request.postal_code = postal_code.clone();

    let key = cache_key(&request);
    if let Some(options) = state.quote_cache().get(&key).await {
        tracing::debug!("freight quote cache hit");
        return Ok(Json(FreightQuote {
            postal_code,
            options: options.as_ref().clone(),
        }));
    }

    let options = state
        .quotes()
        .quote(&state.config().freight.origin_postal_code, &request)
        .await?;
    tracing::info!(options = options.len(), "freight quoted");

    state
        .quote_cache()
        .insert(key, Arc::new(options.clone()))
        .await;

    Ok(Json(FreightQuote {
        postal_code,
        options,
    }))
}

/// Cache key: destination CEP plus the package list shape.
fn cache_key(request: &RateRequest) -> String {
    let mut key = request.postal_code.clone();
    for package in &request.packages {
        let _ = write!(
            key,
            "|{}x{}@{}",
            package.quantity, package.spec.weight_kg, package.insurance_value
        );
    }
    key
}

//! AbacatePay billing client (alternate pix gateway).
//!
//! One operation: create a hosted ONE_TIME pix billing and hand back its
//! checkout URL. Amounts go over the wire in centavos.

use natucart_core::OrderContext;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::instrument;

use super::GatewayError;
use crate::config::AbacatePayConfig;

/// `AbacatePay` API client.
pub struct AbacatePayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    return_url: String,
    completion_url: String,
}

impl AbacatePayClient {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(config: &AbacatePayConfig, public_base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(super::REQUEST_TIMEOUT)
            .build()?;
        let base = public_base_url.trim_end_matches('/');
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            return_url: base.to_string(),
            completion_url: format!("{base}?payment=completed"),
        })
    }

    /// Create a billing for the order and return its hosted checkout URL.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx gateway answers.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn create_billing(&self, order: &OrderContext) -> Result<String, GatewayError> {
        let payload = billing_payload(order, &self.return_url, &self.completion_url);

        let response = self
            .http
            .post(format!("{}/v1/billing/create", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .get("error")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| body.to_string(), ToString::to_string);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        // The checkout URL sits at data.url on success answers.
        body.pointer("/data/url")
            .or_else(|| body.get("url"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| GatewayError::Unexpected("billing without checkout url".to_string()))
    }
}

/// BRL to integer centavos, rounding to the nearest cent.
fn centavos(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or_default()
}

fn billing_payload(order: &OrderContext, return_url: &str, completion_url: &str) -> Value {
    json!({
        "frequency": "ONE_TIME",
        "methods": ["PIX"],
        "products": order.items.iter().map(|item| json!({
            "externalId": item.sku,
            "name": item.name,
            "description": "",
            "quantity": item.quantity,
            "price": centavos(item.unit_price),
        })).chain(std::iter::once(json!({
            "externalId": "freight",
            "name": format!("Frete ({})", order.freight.service),
            "description": "",
            "quantity": 1,
            "price": centavos(order.freight.price),
        }))).collect::<Vec<_>>(),
        "returnUrl": return_url,
        "completionUrl": completion_url,
        "customer": {
            "name": order.customer.name,
            "email": order.customer.email,
            "cellphone": order.customer.phone,
            "taxId": order.customer.tax_id,
        },
        "externalId": order.external_reference,
    })
}

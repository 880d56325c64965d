//! Frenet shipping quote client.
//!
//! Quote-only carrier; fulfillment always ships through Melhor Envio.
//! Frenet's API speaks PascalCase and pt-BR dimension names.

use async_trait::async_trait;
use natucart_core::{FreightOption, RateRequest};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::instrument;

use super::{GatewayError, QuoteCarrier};
use crate::config::FrenetConfig;

/// Frenet API client.
pub struct FrenetClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl FrenetClient {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(config: &FrenetConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(super::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl QuoteCarrier for FrenetClient {
    #[instrument(skip_all, fields(postal_code = %request.postal_code))]
    async fn quote(
        &self,
        origin: &str,
        request: &RateRequest,
    ) -> Result<Vec<FreightOption>, GatewayError> {
        let payload = quote_payload(origin, request);

        let response = self
            .http
            .post(format!("{}/shipping/quote", self.base_url))
            .header("token", self.token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }

        Ok(parse_services(&body))
    }
}

fn quote_payload(origin: &str, request: &RateRequest) -> Value {
    let invoice_value: Decimal = request
        .packages
        .iter()
        .map(|line| line.insurance_value)
        .sum();

    json!({
        "SellerCEP": origin,
        "RecipientCEP": request.postal_code,
        "ShipmentInvoiceValue": invoice_value.to_f64().unwrap_or_default(),
        "ShippingItemArray": request.packages.iter().map(|line| json!({
            "SKU": line.sku,
            "Peso": line.spec.weight_kg.to_f64().unwrap_or_default(),
            "Altura": line.spec.height_cm.to_f64().unwrap_or_default(),
            "Largura": line.spec.width_cm.to_f64().unwrap_or_default(),
            "Comprimento": line.spec.length_cm.to_f64().unwrap_or_default(),
            "Valor": line.insurance_value.to_f64().unwrap_or_default(),
            "Quantidade": 1,
        })).collect::<Vec<_>>(),
    })
}

fn parse_services(body: &Value) -> Vec<FreightOption> {
    let Some(services) = body.get("ShippingSevicesArray").and_then(Value::as_array) else {
        return Vec::new();
    };

    services
        .iter()
        .filter(|srv| {
            srv.get("ServiceAvailable")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .filter_map(|srv| {
            let price = srv
                .get("ShippingPrice")
                .and_then(price_decimal)
                .filter(|p| *p > Decimal::ZERO)?;
            Some(FreightOption {
                service: srv
                    .get("ServiceDescription")
                    .and_then(Value::as_str)
                    .unwrap_or("Serviço de Entrega")
                    .to_string(),
                service_code: srv
                    .get("ServiceCode")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                carrier: srv
                    .get("Carrier")
                    .and_then(Value::as_str)
                    .unwrap_or("Frenet")
                    .to_string(),
                price,
                delivery_time_days: srv
                    .get("DeliveryTime")
                    .and_then(delivery_days)
                    .unwrap_or(0),
            })
        })
        .collect()
}

/// `ShippingPrice` arrives as a string ("15,50" or "15.50") or a number.
fn price_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.replace(',', ".").parse().ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
        _ => None,
    }
    .map(|price: Decimal| price.round_dp(2))
}

fn delivery_days(value: &Value) -> Option<u32> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|d| u32::try_from(d).ok()),
        _ => None,
    }
}

//! Melhor Envio carrier client: rate quoting, shipment creation, labels.
//!
//! `base_url` may point at the carrier API directly or at a workflow relay
//! that manages the OAuth token; relay answers are unwrapped with
//! [`super::unwrap_envelope`] either way.

use async_trait::async_trait;
use natucart_core::packaging::spec_for_quantity;
use natucart_core::{FreightOption, OrderRecord, RateRequest};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::instrument;

use super::{GatewayError, QuoteCarrier, unwrap_envelope};
use crate::config::MelhorEnvioConfig;
use crate::fulfillment::ShipmentCarrier;

/// Service ids quoted by default (PAC, SEDEX, and the common couriers).
const QUOTED_SERVICES: &str = "1,2,3,4,17";

const SENDER_NAME: &str = "NATUCART";
const SENDER_EMAIL: &str = "alladistribuidora@gmail.com";

/// Melhor Envio API client.
pub struct MelhorEnvioClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    origin_postal_code: String,
}

impl MelhorEnvioClient {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(
        config: &MelhorEnvioConfig,
        origin_postal_code: &str,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(super::REQUEST_TIMEOUT)
            .user_agent("Natucart/1.0")
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            origin_postal_code: origin_postal_code.to_string(),
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, GatewayError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map_or_else(|| body.to_string(), ToString::to_string);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(unwrap_envelope(body))
    }
}

#[async_trait]
impl QuoteCarrier for MelhorEnvioClient {
    #[instrument(skip_all, fields(postal_code = %request.postal_code))]
    async fn quote(
        &self,
        origin: &str,
        request: &RateRequest,
    ) -> Result<Vec<FreightOption>, GatewayError> {
        let payload = calculate_payload(origin, request);
        let body = self.post("/api/v2/me/shipment/calculate", &payload).await?;
        Ok(parse_services(&body))
    }
}

#[async_trait]
impl ShipmentCarrier for MelhorEnvioClient {
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    async fn create_shipment(&self, order: &OrderRecord) -> Result<String, GatewayError> {
        let payload = shipment_payload(order, &self.origin_postal_code);
        let body = self.post("/api/v2/me/shipment", &payload).await?;
        match body.get("id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(GatewayError::Unexpected(
                "shipment created without an id".to_string(),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn generate_label(&self, shipment_id: &str) -> Result<(), GatewayError> {
        let payload = json!({ "orders": [shipment_id] });
        self.post("/api/v2/me/shipment/generate", &payload).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn label_url(&self, shipment_id: &str) -> Result<Option<String>, GatewayError> {
        let payload = json!({ "orders": [shipment_id] });
        let body = self.post("/api/v2/me/shipment/print", &payload).await?;
        Ok(body
            .get("url")
            .or_else(|| body.get("pdf"))
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }
}

// ====== Payload shaping ======

fn calculate_payload(origin: &str, request: &RateRequest) -> Value {
    let mut to = json!({ "postal_code": request.postal_code });
    if let Some(address) = &request.address {
        // A full destination lets the carrier price door-to-door services.
        to["address"] = json!(address.street);
        to["number"] = json!(address.number);
        to["district"] = json!(address.district);
        to["city"] = json!(address.city);
        to["state"] = json!(address.state);
        if !address.complement.is_empty() {
            to["complement"] = json!(address.complement);
        }
    }

    json!({
        "from": { "postal_code": origin },
        "to": to,
        "products": request.packages.iter().map(|line| json!({
            "id": line.sku,
            "width": decimal_f64(line.spec.width_cm),
            "height": decimal_f64(line.spec.height_cm),
            "length": decimal_f64(line.spec.length_cm),
            "weight": decimal_f64(line.spec.weight_kg),
            "insurance_value": decimal_f64(line.insurance_value),
            "quantity": line.quantity,
        })).collect::<Vec<_>>(),
        "services": QUOTED_SERVICES,
    })
}

fn shipment_payload(order: &OrderRecord, origin: &str) -> Value {
    json!({
        "service": order.freight.service_code,
        "from": {
            "name": SENDER_NAME,
            "email": SENDER_EMAIL,
            "country_id": "BR",
            "postal_code": origin,
        },
        "to": {
            "name": order.customer.name,
            "phone": order.customer.phone,
            "email": order.customer.email,
            "document": order.customer.tax_id,
            "address": order.address.street,
            "complement": order.address.complement,
            "number": order.address.number,
            "district": order.address.district,
            "city": order.address.city,
            "state_abbr": order.address.state,
            "country_id": "BR",
            "postal_code": order.address.postal_code,
        },
        "products": order.items.iter().map(|item| {
            let spec = spec_for_quantity(item.quantity);
            json!({
                "name": item.name,
                "quantity": item.quantity,
                "unitary_value": decimal_f64(item.unit_price),
                "weight": decimal_f64(spec.weight_kg),
                "width": decimal_f64(spec.width_cm),
                "height": decimal_f64(spec.height_cm),
                "length": decimal_f64(spec.length_cm),
            })
        }).collect::<Vec<_>>(),
        "volumes": order.items.len(),
        "options": {
            "insurance_value": decimal_f64(order.totals.total),
            "receipt": false,
            "own_hand": false,
            "reverse": false,
            "non_commercial": false,
            "platform": "NATUCART",
        },
    })
}

fn decimal_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

// ====== Response parsing ======

/// The carrier sends prices as strings, relays sometimes as numbers.
fn parse_price(value: Option<&Value>) -> Option<Decimal> {
    match value {
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_f64().and_then(Decimal::from_f64_retain),
        _ => None,
    }
    .map(|price: Decimal| price.round_dp(2))
}

fn parse_delivery_time(service: &Value) -> u32 {
    service
        .get("delivery_time")
        .and_then(Value::as_u64)
        .or_else(|| service.pointer("/delivery_range/min").and_then(Value::as_u64))
        .or_else(|| service.pointer("/delivery_range/max").and_then(Value::as_u64))
        .and_then(|days| u32::try_from(days).ok())
        .unwrap_or(0)
}

fn parse_service(service: &Value) -> Option<FreightOption> {
    // Per-service errors ("area not served") arrive inline, not as HTTP
    // failures; drop those entries.
    if service.get("error").is_some_and(|e| !e.is_null()) {
        return None;
    }
    let price = parse_price(service.get("price"))
        .or_else(|| parse_price(service.get("custom_price")))
        .filter(|price| *price > Decimal::ZERO)?;

    let name = service
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Serviço de Entrega");
    let service_code = match service.get("id") {
        Some(Value::Number(id)) => id.to_string(),
        Some(Value::String(id)) => id.clone(),
        _ => name.to_uppercase(),
    };

    Some(FreightOption {
        service: name.to_string(),
        service_code,
        carrier: service
            .pointer("/company/name")
            .and_then(Value::as_str)
            .unwrap_or("Transportadora")
            .to_string(),
        price,
        delivery_time_days: parse_delivery_time(service),
    })
}

fn parse_services(body: &Value) -> Vec<FreightOption> {
    let services = if let Some(array) = body.as_array() {
        array.as_slice()
    } else if let Some(array) = body.get("services").and_then(Value::as_array) {
        array.as_slice()
    } else if body.get("id").is_some() {
        return parse_service(body).into_iter().collect();
    } else {
        return Vec::new();
    };
    services.iter().filter_map(parse_service).collect()
}

//! Mercado Pago payments client.
//!
//! Three operations: direct charge creation (card/pix/boleto), payment
//! lookup (used by the webhook receiver), and hosted-checkout preference
//! creation. Payload shaping quirks live in pure functions so they can be
//! tested without a network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use natucart_core::{ChargeMethod, ChargeRequest, ChargeResponse, OrderContext, PaymentStatus};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::instrument;

use super::GatewayError;
use crate::config::MercadoPagoConfig;

/// Payment state as fetched from the gateway.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    /// Our order id, echoed back by the gateway.
    pub external_reference: Option<String>,
    pub payment_method_id: Option<String>,
    pub amount: Option<Decimal>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Mercado Pago API client.
pub struct MercadoPagoClient {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
    /// Public URL webhook notifications should be sent to.
    notification_url: String,
    /// Public base the shopper is sent back to after hosted checkout.
    back_url_base: String,
}

impl MercadoPagoClient {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(config: &MercadoPagoConfig, public_base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(super::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            notification_url: format!(
                "{}/webhooks/mercadopago",
                public_base_url.trim_end_matches('/')
            ),
            back_url_base: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a payment.
    ///
    /// The gateway's answer is forwarded as-is in the response status; a
    /// *rejected* payment is a successful call here.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx gateway answers ([`GatewayError`]).
    #[instrument(skip_all, fields(order_id = %request.order.order_id))]
    pub async fn create_payment(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        let payload = payment_payload(request, &self.notification_url);

        let response = self
            .http
            .post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .header("X-Idempotency-Key", &request.idempotency_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(parse_charge_response(&body))
    }

    /// Create a hosted-checkout preference and return its redirect URL.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx gateway answers.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn create_preference(&self, order: &OrderContext) -> Result<String, GatewayError> {
        let payload = preference_payload(order, &self.notification_url, &self.back_url_base);

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        body.get("init_point")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| GatewayError::Unexpected("preference without init_point".to_string()))
    }
}

#[async_trait]
impl super::PaymentLookup for MercadoPagoClient {
    #[instrument(skip(self))]
    async fn payment_details(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(parse_payment_details(&body))
    }
}

// ====== Payload shaping ======

/// Split a full name into the gateway's first/last pair.
fn split_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// BRL amount in the f64 dialect the gateway expects.
fn money(amount: Decimal) -> f64 {
    amount.round_dp(2).to_f64().unwrap_or_default()
}

fn payer(order: &OrderContext, with_boleto_address: bool) -> Value {
    let (first_name, last_name) = split_name(&order.customer.name);
    let mut payer = json!({
        "email": order.customer.email,
        "first_name": first_name,
        "last_name": last_name,
        "identification": {
            "type": "CPF",
            "number": order.customer.tax_id,
        },
    });
    if with_boleto_address {
        // Boleto issuance requires the payer's full address.
        payer["address"] = json!({
            "zip_code": order.address.postal_code,
            "street_name": order.address.street,
            "street_number": order.address.number,
            "neighborhood": order.address.district,
            "city": order.address.city,
            "federal_unit": order.address.state,
        });
    }
    payer
}

/// Brazilian phone into the gateway's area code / number pair.
fn split_phone(digits: &str) -> (&str, &str) {
    let area = digits.get(..2).unwrap_or_default();
    let number = digits.get(2..).unwrap_or_default();
    (area, number)
}

fn additional_info(order: &OrderContext) -> Value {
    let (area_code, number) = split_phone(&order.customer.phone);
    json!({
        "items": order.items.iter().map(|item| json!({
            "id": item.sku,
            "title": item.name,
            "quantity": item.quantity,
            "unit_price": money(item.unit_price),
        })).collect::<Vec<_>>(),
        "payer": {
            "phone": {
                "area_code": area_code,
                "number": number,
            },
        },
        "shipments": {
            "receiver_address": {
                "zip_code": order.address.postal_code,
                "street_name": order.address.street,
                "street_number": order.address.number,
            },
        },
    })
}

/// Build the payment creation payload.
fn payment_payload(request: &ChargeRequest, notification_url: &str) -> Value {
    let order = &request.order;
    let boleto = matches!(request.method, ChargeMethod::Boleto);

    let mut payload = json!({
        "transaction_amount": money(order.totals.total),
        "description": format!("Pedido Natucart {}", order.order_id),
        "external_reference": order.external_reference,
        "statement_descriptor": "NATUCART",
        "notification_url": notification_url,
        "payer": payer(order, boleto),
        "additional_info": additional_info(order),
        "metadata": { "order_id": order.order_id, "source": "natucart_checkout" },
    });

    match &request.method {
        ChargeMethod::Card {
            token,
            installments,
            issuer_id,
        } => {
            payload["token"] = json!(token);
            payload["installments"] = json!(installments);
            if let Some(issuer) = issuer_id {
                payload["issuer_id"] = json!(issuer);
            }
        }
        ChargeMethod::Pix => {
            payload["payment_method_id"] = json!("pix");
        }
        ChargeMethod::Boleto => {
            payload["payment_method_id"] = json!("bolbradesco");
        }
    }

    payload
}

fn preference_payload(order: &OrderContext, notification_url: &str, back_url_base: &str) -> Value {
    json!({
        "items": order.items.iter().map(|item| json!({
            "id": item.sku,
            "title": item.name,
            "quantity": item.quantity,
            "currency_id": "BRL",
            "unit_price": money(item.unit_price),
        })).chain(std::iter::once(json!({
            "id": "freight",
            "title": format!("Frete ({})", order.freight.service),
            "quantity": 1,
            "currency_id": "BRL",
            "unit_price": money(order.freight.price),
        }))).collect::<Vec<_>>(),
        "payer": payer(order, false),
        "external_reference": order.external_reference,
        "notification_url": notification_url,
        "back_urls": {
            "success": format!("{back_url_base}?payment=approved"),
            "pending": format!("{back_url_base}?payment=pending"),
            "failure": format!("{back_url_base}?payment=failure"),
        },
        "auto_return": "approved",
        "statement_descriptor": "NATUCART",
    })
}

// ====== Response parsing ======

/// Gateway ids arrive as numbers on payments and strings elsewhere.
fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn str_field(body: &Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn parse_charge_response(body: &Value) -> ChargeResponse {
    let transaction_data = body
        .pointer("/point_of_interaction/transaction_data")
        .cloned()
        .unwrap_or(Value::Null);

    ChargeResponse {
        payment_id: id_string(body.get("id")),
        status: PaymentStatus::parse(body.get("status").and_then(Value::as_str).unwrap_or("")),
        status_detail: str_field(body, "status_detail"),
        pix_qr_code: str_field(&transaction_data, "qr_code"),
        pix_qr_code_base64: str_field(&transaction_data, "qr_code_base64"),
        boleto_barcode: body
            .pointer("/barcode/content")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        boleto_ticket_url: body
            .pointer("/transaction_details/external_resource_url")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

fn parse_payment_details(body: &Value) -> PaymentDetails {
    PaymentDetails {
        payment_id: id_string(body.get("id")),
        status: PaymentStatus::parse(body.get("status").and_then(Value::as_str).unwrap_or("")),
        status_detail: str_field(body, "status_detail"),
        external_reference: str_field(body, "external_reference"),
        payment_method_id: str_field(body, "payment_method_id"),
        amount: body
            .get("transaction_amount")
            .and_then(Value::as_f64)
            .and_then(Decimal::from_f64_retain)
            .map(|d| d.round_dp(2)),
        approved_at: str_field(body, "date_approved")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Join the gateway's top-level message with its `cause` entries.
fn error_message(body: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        parts.push(message.to_string());
    }
    if let Some(causes) = body.get("cause").and_then(Value::as_array) {
        for cause in causes {
            if let Some(description) = cause.get("description").and_then(Value::as_str) {
                parts.push(description.to_string());
            }
        }
    }
    if parts.is_empty() {
        return body.to_string();
    }
    parts.join("; ")
}

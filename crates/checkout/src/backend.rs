//! HTTP clients behind the checkout capability traits.
//!
//! Everything except card tokenization goes through the storefront backend,
//! which holds the merchant credentials and proxies the carriers and
//! gateways. Tokenization talks to the gateway directly with the public key
//! so the raw card number never reaches our backend.

use std::time::Duration;

use async_trait::async_trait;
use natucart_core::{ChargeRequest, ChargeResponse, FreightQuote, OrderContext, RateRequest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::instrument;

use crate::draft::DraftStore;
use crate::freight::{FreightError, RateCarrier};
use crate::payment::{CardDetails, CardTokenizer, ChargeGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MERCADO_PAGO_API: &str = "https://api.mercadopago.com";

/// Error envelope the backend answers with on non-2xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Redirect target for the hosted checkout flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRedirect {
    pub init_point: String,
}

/// Hosted billing session for the alternate pix gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSession {
    pub checkout_url: String,
}

/// Client for the storefront backend API.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, String> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|err| format!("request to {path} failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map_or(text, |body| body.error);
            return Err(format!("{path} answered {status}: {message}"));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| format!("invalid response from {path}: {err}"))
    }

    /// Create a hosted-checkout preference for the draft.
    ///
    /// # Errors
    ///
    /// Connectivity failures and non-2xx backend answers.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn create_preference(
        &self,
        order: &OrderContext,
    ) -> Result<CheckoutRedirect, String> {
        self.post_json("/payments/preference", order).await
    }

    /// Create a hosted pix billing session for the draft.
    ///
    /// # Errors
    ///
    /// Connectivity failures and non-2xx backend answers.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn create_billing_session(
        &self,
        order: &OrderContext,
    ) -> Result<BillingSession, String> {
        self.post_json("/payments/session", order).await
    }
}

#[async_trait]
impl RateCarrier for BackendClient {
    #[instrument(skip_all, fields(postal_code = %request.postal_code))]
    async fn rates(&self, request: &RateRequest) -> Result<FreightQuote, FreightError> {
        self.post_json("/freight/quote", request)
            .await
            .map_err(FreightError::Carrier)
    }
}

#[async_trait]
impl DraftStore for BackendClient {
    #[instrument(skip_all, fields(order_id = %draft.order_id))]
    async fn save_draft(&self, draft: &OrderContext) -> Result<(), String> {
        let _: serde_json::Value = self.post_json("/orders", draft).await?;
        Ok(())
    }
}

#[async_trait]
impl ChargeGateway for BackendClient {
    #[instrument(skip_all, fields(order_id = %request.order.order_id))]
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, String> {
        self.post_json("/payments/charge", request).await
    }
}

// ====== Card tokenization ======

/// Tokenizes cards straight at the gateway with the publishable key.
pub struct MercadoPagoTokenizer {
    http: reqwest::Client,
    base_url: String,
    public_key: String,
}

impl MercadoPagoTokenizer {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(public_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: MERCADO_PAGO_API.to_string(),
            public_key: public_key.into(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Token creation payload in the gateway's own (snake_case) dialect.
fn card_token_payload(card: &CardDetails, holder_tax_id: &str) -> serde_json::Value {
    serde_json::json!({
        "card_number": card.number.chars().filter(char::is_ascii_digit).collect::<String>(),
        "cardholder": {
            "name": card.holder_name,
            "identification": { "type": "CPF", "number": holder_tax_id },
        },
        "expiration_month": card.expiration_month,
        "expiration_year": card.expiration_year,
        "security_code": card.security_code,
    })
}

#[async_trait]
impl CardTokenizer for MercadoPagoTokenizer {
    #[instrument(skip_all)]
    async fn tokenize(&self, card: &CardDetails, holder_tax_id: &str) -> Result<String, String> {
        #[derive(Deserialize)]
        struct TokenBody {
            id: String,
        }

        let url = format!(
            "{}/v1/card_tokens?public_key={}",
            self.base_url, self.public_key
        );
        let response = self
            .http
            .post(url)
            .json(&card_token_payload(card, holder_tax_id))
            .send()
            .await
            .map_err(|err| format!("token request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("token request answered {status}: {text}"));
        }

        let body: TokenBody = response
            .json()
            .await
            .map_err(|err| format!("invalid token response: {err}"))?;
        Ok(body.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("https://api.natucart.com.br/").unwrap();
        assert_eq!(
            client.url("/freight/quote"),
            "https://api.natucart.com.br/freight/quote"
        );
    }

    #[test]
    fn token_payload_strips_formatting_and_carries_cpf() {
        let card = CardDetails {
            number: "5031 4332 1540 6351".to_string(),
            holder_name: "MARIA DA SILVA".to_string(),
            expiration_month: 11,
            expiration_year: 2030,
            security_code: "123".to_string(),
        };
        let payload = card_token_payload(&card, "12345678909");

        assert_eq!(payload["card_number"], "5031433215406351");
        assert_eq!(payload["cardholder"]["name"], "MARIA DA SILVA");
        assert_eq!(payload["cardholder"]["identification"]["type"], "CPF");
        assert_eq!(
            payload["cardholder"]["identification"]["number"],
            "12345678909"
        );
        assert_eq!(payload["expiration_month"], 11);
        assert_eq!(payload["security_code"], "123");
    }

    #[test]
    fn tokenizer_base_url_is_overridable_for_tests() {
        let tokenizer = MercadoPagoTokenizer::new("TEST-pk")
            .unwrap()
            .with_base_url("http://127.0.0.1:9999");
        assert_eq!(tokenizer.base_url, "http://127.0.0.1:9999");
    }
}

//! Payment attempt orchestration.
//!
//! One attempt runs the fixed pipeline: validate the method locally, persist
//! the order draft, tokenize card data when needed, submit the charge, and
//! classify the gateway's answer. Raw card data never crosses the gateway
//! seam and is never persisted; only a one-shot token travels with the
//! charge request.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use natucart_core::{
    Address, CartSnapshot, ChargeMethod, ChargeRequest, ChargeResponse, Customer, OrderContext,
    PaymentDisposition, rejection_message,
};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::cart::CartStore;
use crate::draft::{DraftError, OrderDraftBuilder, validate_customer};
use crate::freight::sanitize_postal_code;

// ====== Method selection ======

/// Sensitive card input. Deliberately not serializable.
#[derive(Clone)]
pub struct CardDetails {
    pub number: String,
    pub holder_name: String,
    pub expiration_month: u8,
    pub expiration_year: u16,
    pub security_code: String,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("holder_name", &self.holder_name)
            .field("number", &"[redacted]")
            .field("security_code", &"[redacted]")
            .finish_non_exhaustive()
    }
}

/// How the shopper wants to pay.
#[derive(Debug, Clone)]
pub enum PaymentMethod {
    Card {
        card: CardDetails,
        installments: u32,
        issuer_id: Option<String>,
    },
    Pix,
    Boleto,
}

impl PaymentMethod {
    fn label(&self) -> &'static str {
        match self {
            Self::Card { .. } => "card",
            Self::Pix => "pix",
            Self::Boleto => "boleto",
        }
    }
}

// ====== Gateway seam ======

/// Exchanges raw card data for a one-shot gateway token.
#[async_trait]
pub trait CardTokenizer: Send + Sync {
    async fn tokenize(&self, card: &CardDetails, holder_tax_id: &str) -> Result<String, String>;
}

/// Creates payments at the gateway.
#[async_trait]
pub trait ChargeGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, String>;
}

// ====== Outcome ======

/// Method-specific voucher the shopper needs to finish paying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentArtifact {
    PixQr {
        code: String,
        image_base64: Option<String>,
    },
    Boleto {
        barcode: Option<String>,
        ticket_url: Option<String>,
    },
}

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Payment confirmed synchronously. The cart has been cleared.
    Approved { order_id: String, payment_id: String },
    /// Payment awaits shopper action or asynchronous confirmation. The cart
    /// is kept so a failed pix/boleto can be retried.
    Pending {
        order_id: String,
        payment_id: String,
        artifact: Option<PaymentArtifact>,
    },
    /// Gateway declined. `message` is the shopper-facing (pt-BR) reason.
    Rejected {
        order_id: String,
        payment_id: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("a payment attempt is already in flight")]
    AttemptInProgress,

    #[error("invalid payment input: {0}")]
    InvalidPayment(String),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error("card tokenization failed: {0}")]
    Tokenization(String),

    /// Could not reach the gateway or it answered with an error body.
    #[error("payment gateway error: {0}")]
    Gateway(String),
}

/// Where a checkout attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptState {
    #[default]
    Idle,
    Validating,
    DraftPersisted,
    Submitting,
    AwaitingConfirmation,
    Succeeded,
    Failed,
}

impl AttemptState {
    const fn is_in_flight(self) -> bool {
        matches!(self, Self::Validating | Self::DraftPersisted | Self::Submitting)
    }
}

// ====== Orchestrator ======

/// Runs payment attempts end to end.
pub struct PaymentOrchestrator {
    drafts: OrderDraftBuilder,
    tokenizer: Arc<dyn CardTokenizer>,
    gateway: Arc<dyn ChargeGateway>,
    state: Mutex<AttemptState>,
    /// Draft left over by a failed attempt. A retry with unchanged inputs
    /// reuses it, keeping the order id stable across attempts.
    retained: Mutex<Option<OrderContext>>,
}

impl PaymentOrchestrator {
    #[must_use]
    pub fn new(
        drafts: OrderDraftBuilder,
        tokenizer: Arc<dyn CardTokenizer>,
        gateway: Arc<dyn ChargeGateway>,
    ) -> Self {
        Self {
            drafts,
            tokenizer,
            gateway,
            state: Mutex::new(AttemptState::Idle),
            retained: Mutex::new(None),
        }
    }

    /// Current attempt state, for UI gating.
    pub fn attempt_state(&self) -> AttemptState {
        self.state.lock().map_or(AttemptState::Failed, |s| *s)
    }

    /// Run one payment attempt.
    ///
    /// On approval the cart is cleared; on pending or rejection it is kept.
    /// Retrying after a failed attempt with the same cart, customer, and
    /// address reuses the already-persisted draft and its order id; only
    /// the idempotency key is fresh. Changing any input starts a new order.
    /// A second call while an attempt is in flight fails immediately with
    /// [`PaymentError::AttemptInProgress`] without touching the store or the
    /// gateway.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only; a gateway *rejection* is a normal
    /// [`PaymentOutcome::Rejected`], not an error.
    #[instrument(skip_all, fields(method = method.label()))]
    pub async fn submit_payment(
        &self,
        cart: &mut CartStore,
        customer: &Customer,
        address: &Address,
        method: PaymentMethod,
    ) -> Result<PaymentOutcome, PaymentError> {
        self.enter(AttemptState::Validating)?;
        let result = self
            .run_attempt(cart, customer, address, method)
            .await;
        let terminal = match &result {
            Ok(PaymentOutcome::Approved { .. }) => AttemptState::Succeeded,
            Ok(PaymentOutcome::Pending { .. }) => AttemptState::AwaitingConfirmation,
            Ok(PaymentOutcome::Rejected { .. }) | Err(_) => AttemptState::Failed,
        };
        if terminal != AttemptState::Failed {
            self.clear_retained();
        }
        self.set_state(terminal);
        result
    }

    async fn run_attempt(
        &self,
        cart: &mut CartStore,
        customer: &Customer,
        address: &Address,
        method: PaymentMethod,
    ) -> Result<PaymentOutcome, PaymentError> {
        validate_method(&method)?;

        let snapshot: CartSnapshot = cart.snapshot();
        let reusable = self
            .take_retained()
            .filter(|draft| draft_matches(draft, customer, address, &snapshot));
        let draft = match reusable {
            Some(draft) => {
                tracing::info!(order_id = %draft.order_id, "retrying with the pending draft");
                draft
            }
            None => {
                self.drafts
                    .build_and_persist_draft(customer, address, &snapshot)
                    .await?
            }
        };
        self.set_state(AttemptState::DraftPersisted);
        self.retain(draft.clone());

        let charge_method = match method {
            PaymentMethod::Card {
                card,
                installments,
                issuer_id,
            } => {
                let token = self
                    .tokenizer
                    .tokenize(&card, &draft.customer.tax_id)
                    .await
                    .map_err(PaymentError::Tokenization)?;
                ChargeMethod::Card {
                    token,
                    installments,
                    issuer_id,
                }
            }
            PaymentMethod::Pix => ChargeMethod::Pix,
            PaymentMethod::Boleto => ChargeMethod::Boleto,
        };

        let request = ChargeRequest {
            order: draft.clone(),
            method: charge_method,
            idempotency_key: Uuid::new_v4().to_string(),
        };

        self.set_state(AttemptState::Submitting);
        let response = self
            .gateway
            .charge(&request)
            .await
            .map_err(PaymentError::Gateway)?;

        tracing::info!(
            order_id = %draft.order_id,
            payment_id = %response.payment_id,
            status = %response.status.as_str(),
            "payment attempt answered"
        );

        Ok(classify(cart, &draft, response))
    }

    fn enter(&self, state: AttemptState) -> Result<(), PaymentError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| PaymentError::AttemptInProgress)?;
        if guard.is_in_flight() {
            return Err(PaymentError::AttemptInProgress);
        }
        *guard = state;
        Ok(())
    }

    fn set_state(&self, state: AttemptState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn take_retained(&self) -> Option<OrderContext> {
        self.retained.lock().ok().and_then(|mut guard| guard.take())
    }

    fn retain(&self, draft: OrderContext) {
        if let Ok(mut guard) = self.retained.lock() {
            *guard = Some(draft);
        }
    }

    fn clear_retained(&self) {
        if let Ok(mut guard) = self.retained.lock() {
            *guard = None;
        }
    }
}

/// Whether a retained draft still describes the shopper's inputs. Inputs
/// are compared in their normalized form, the same one the draft stores.
fn draft_matches(
    draft: &OrderContext,
    customer: &Customer,
    address: &Address,
    snapshot: &CartSnapshot,
) -> bool {
    let Ok(customer) = validate_customer(customer) else {
        return false;
    };
    let mut address = address.clone();
    address.postal_code = sanitize_postal_code(&address.postal_code);

    draft.customer == customer
        && draft.address == address
        && draft.items == snapshot.items
        && snapshot.freight.as_ref() == Some(&draft.freight)
}

fn validate_method(method: &PaymentMethod) -> Result<(), PaymentError> {
    if let PaymentMethod::Card {
        card, installments, ..
    } = method
    {
        if *installments == 0 {
            return Err(PaymentError::InvalidPayment(
                "installments must be at least 1".to_string(),
            ));
        }
        if card.number.chars().filter(char::is_ascii_digit).count() < 13 {
            return Err(PaymentError::InvalidPayment(
                "card number is too short".to_string(),
            ));
        }
        if card.holder_name.trim().is_empty() {
            return Err(PaymentError::InvalidPayment(
                "card holder name is required".to_string(),
            ));
        }
        if !(1..=12).contains(&card.expiration_month) {
            return Err(PaymentError::InvalidPayment(
                "card expiration month is invalid".to_string(),
            ));
        }
        if card.security_code.trim().is_empty() {
            return Err(PaymentError::InvalidPayment(
                "card security code is required".to_string(),
            ));
        }
    }
    Ok(())
}

fn classify(cart: &mut CartStore, draft: &OrderContext, response: ChargeResponse) -> PaymentOutcome {
    match response.status.disposition() {
        PaymentDisposition::Approved => {
            cart.clear();
            PaymentOutcome::Approved {
                order_id: draft.order_id.clone(),
                payment_id: response.payment_id,
            }
        }
        PaymentDisposition::Pending => {
            let artifact = if let Some(code) = response.pix_qr_code {
                Some(PaymentArtifact::PixQr {
                    code,
                    image_base64: response.pix_qr_code_base64,
                })
            } else if response.boleto_barcode.is_some() || response.boleto_ticket_url.is_some() {
                Some(PaymentArtifact::Boleto {
                    barcode: response.boleto_barcode,
                    ticket_url: response.boleto_ticket_url,
                })
            } else {
                None
            };
            PaymentOutcome::Pending {
                order_id: draft.order_id.clone(),
                payment_id: response.payment_id,
                artifact,
            }
        }
        PaymentDisposition::Rejected => PaymentOutcome::Rejected {
            order_id: draft.order_id.clone(),
            payment_id: response.payment_id,
            message: rejection_message(response.status_detail.as_deref()).to_string(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use natucart_core::{FreightOption, PaymentStatus};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::catalog::Catalog;
    use crate::draft::DraftStore;

    struct MemoryDrafts {
        saves: AtomicU32,
    }

    #[async_trait]
    impl DraftStore for MemoryDrafts {
        async fn save_draft(&self, _draft: &OrderContext) -> Result<(), String> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubTokenizer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CardTokenizer for StubTokenizer {
        async fn tokenize(&self, _card: &CardDetails, _tax_id: &str) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("tok_test_123".to_string())
        }
    }

    struct ScriptedGateway {
        response: ChargeResponse,
        calls: AtomicU32,
        last_request: Mutex<Option<ChargeRequest>>,
    }

    impl ScriptedGateway {
        fn answering(status: PaymentStatus) -> Self {
            Self {
                response: ChargeResponse {
                    payment_id: "12345".to_string(),
                    status,
                    ..ChargeResponse::default()
                },
                calls: AtomicU32::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChargeGateway for ScriptedGateway {
        async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            Ok(self.response.clone())
        }
    }

    struct Harness {
        orchestrator: PaymentOrchestrator,
        drafts: Arc<MemoryDrafts>,
        tokenizer: Arc<StubTokenizer>,
        gateway: Arc<ScriptedGateway>,
    }

    fn harness(gateway: ScriptedGateway) -> Harness {
        let drafts = Arc::new(MemoryDrafts {
            saves: AtomicU32::new(0),
        });
        let tokenizer = Arc::new(StubTokenizer {
            calls: AtomicU32::new(0),
        });
        let gateway = Arc::new(gateway);
        Harness {
            orchestrator: PaymentOrchestrator::new(
                OrderDraftBuilder::new(Arc::clone(&drafts) as Arc<dyn DraftStore>),
                Arc::clone(&tokenizer) as Arc<dyn CardTokenizer>,
                Arc::clone(&gateway) as Arc<dyn ChargeGateway>,
            ),
            drafts,
            tokenizer,
            gateway,
        }
    }

    fn loaded_cart() -> CartStore {
        let mut cart = CartStore::new(Catalog::natucart());
        cart.add_item("natucart-single", 1);
        cart.set_freight(Some(FreightOption {
            service: "PAC".to_string(),
            service_code: "1".to_string(),
            carrier: "Correios".to_string(),
            price: dec!(15.50),
            delivery_time_days: 7,
        }));
        cart
    }

    fn customer() -> Customer {
        Customer {
            name: "Maria da Silva".to_string(),
            email: "maria@example.com".to_string(),
            phone: "11988887777".to_string(),
            tax_id: "12345678909".to_string(),
        }
    }

    fn address() -> Address {
        Address {
            postal_code: "01001000".to_string(),
            state: "SP".to_string(),
            city: "São Paulo".to_string(),
            street: "Praça da Sé".to_string(),
            number: "100".to_string(),
            district: "Sé".to_string(),
            complement: String::new(),
        }
    }

    fn card_method() -> PaymentMethod {
        PaymentMethod::Card {
            card: CardDetails {
                number: "5031433215406351".to_string(),
                holder_name: "MARIA DA SILVA".to_string(),
                expiration_month: 11,
                expiration_year: 2030,
                security_code: "123".to_string(),
            },
            installments: 1,
            issuer_id: None,
        }
    }

    #[tokio::test]
    async fn approved_card_clears_cart_and_sends_token_not_pan() {
        let h = harness(ScriptedGateway::answering(PaymentStatus::Approved));
        let mut cart = loaded_cart();

        let outcome = h
            .orchestrator
            .submit_payment(&mut cart, &customer(), &address(), card_method())
            .await
            .unwrap();

        assert!(matches!(outcome, PaymentOutcome::Approved { .. }));
        assert!(cart.snapshot().is_empty());
        assert_eq!(h.drafts.saves.load(Ordering::SeqCst), 1);
        assert_eq!(h.tokenizer.calls.load(Ordering::SeqCst), 1);

        let request = h.gateway.last_request.lock().unwrap().clone().unwrap();
        match request.method {
            ChargeMethod::Card { token, .. } => assert_eq!(token, "tok_test_123"),
            other => panic!("unexpected method: {other:?}"),
        }
        assert_eq!(request.order.totals.total, dec!(115.40));
        assert!(!request.idempotency_key.is_empty());
        assert_eq!(h.orchestrator.attempt_state(), AttemptState::Succeeded);
    }

    #[tokio::test]
    async fn pending_pix_keeps_cart_and_surfaces_qr() {
        let mut gateway = ScriptedGateway::answering(PaymentStatus::Pending);
        gateway.response.pix_qr_code = Some("00020126...".to_string());
        gateway.response.pix_qr_code_base64 = Some("iVBORw0K".to_string());
        let h = harness(gateway);
        let mut cart = loaded_cart();

        let outcome = h
            .orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();

        match outcome {
            PaymentOutcome::Pending { artifact, .. } => {
                assert_eq!(
                    artifact,
                    Some(PaymentArtifact::PixQr {
                        code: "00020126...".to_string(),
                        image_base64: Some("iVBORw0K".to_string()),
                    })
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!cart.snapshot().is_empty());
        assert_eq!(h.tokenizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.orchestrator.attempt_state(),
            AttemptState::AwaitingConfirmation
        );
    }

    #[tokio::test]
    async fn rejection_maps_status_detail_to_shopper_message() {
        let mut gateway = ScriptedGateway::answering(PaymentStatus::Rejected);
        gateway.response.status_detail = Some("cc_rejected_insufficient_amount".to_string());
        let h = harness(gateway);
        let mut cart = loaded_cart();

        let outcome = h
            .orchestrator
            .submit_payment(&mut cart, &customer(), &address(), card_method())
            .await
            .unwrap();

        match outcome {
            PaymentOutcome::Rejected { message, .. } => {
                assert_eq!(message, rejection_message(Some("cc_rejected_insufficient_amount")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!cart.snapshot().is_empty());
        assert_eq!(h.orchestrator.attempt_state(), AttemptState::Failed);
    }

    #[tokio::test]
    async fn invalid_card_fails_before_any_side_effect() {
        let h = harness(ScriptedGateway::answering(PaymentStatus::Approved));
        let mut cart = loaded_cart();

        let method = PaymentMethod::Card {
            card: CardDetails {
                number: "4111".to_string(),
                holder_name: "MARIA".to_string(),
                expiration_month: 11,
                expiration_year: 2030,
                security_code: "123".to_string(),
            },
            installments: 1,
            issuer_id: None,
        };
        let err = h
            .orchestrator
            .submit_payment(&mut cart, &customer(), &address(), method)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InvalidPayment(_)));
        assert_eq!(h.drafts.saves.load(Ordering::SeqCst), 0);
        assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_tax_id_stops_before_gateway() {
        let h = harness(ScriptedGateway::answering(PaymentStatus::Approved));
        let mut cart = loaded_cart();
        let mut bad = customer();
        bad.tax_id = "123".to_string();

        let err = h
            .orchestrator
            .submit_payment(&mut cart, &bad, &address(), PaymentMethod::Pix)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Draft(DraftError::InvalidCustomer(_))));
        assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_after_rejection_reuses_the_draft_with_a_fresh_key() {
        let h = harness(ScriptedGateway::answering(PaymentStatus::Rejected));
        let mut cart = loaded_cart();

        h.orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();
        let first = h.gateway.last_request.lock().unwrap().clone().unwrap();

        h.orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();
        let second = h.gateway.last_request.lock().unwrap().clone().unwrap();

        assert_ne!(first.idempotency_key, second.idempotency_key);
        assert_eq!(first.order.order_id, second.order.order_id);
        // One pending draft carried across both attempts.
        assert_eq!(h.drafts.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changing_the_cart_between_attempts_starts_a_new_order() {
        let h = harness(ScriptedGateway::answering(PaymentStatus::Rejected));
        let mut cart = loaded_cart();

        h.orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();
        let first = h.gateway.last_request.lock().unwrap().clone().unwrap();

        cart.add_item("natucart-single", 1);
        h.orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();
        let second = h.gateway.last_request.lock().unwrap().clone().unwrap();

        assert_ne!(first.order.order_id, second.order.order_id);
        assert_eq!(h.drafts.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn approval_drops_the_retained_draft() {
        let h = harness(ScriptedGateway::answering(PaymentStatus::Approved));
        let mut cart = loaded_cart();

        h.orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();
        let first = h.gateway.last_request.lock().unwrap().clone().unwrap();

        // A fresh purchase after approval is a fresh order.
        cart.add_item("natucart-single", 1);
        cart.set_freight(Some(first.order.freight.clone()));
        h.orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap();
        let second = h.gateway.last_request.lock().unwrap().clone().unwrap();

        assert_ne!(first.order.order_id, second.order.order_id);
        assert_eq!(h.drafts.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gateway_connectivity_error_is_surfaced() {
        struct DownGateway;

        #[async_trait]
        impl ChargeGateway for DownGateway {
            async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeResponse, String> {
                Err("connection refused".to_string())
            }
        }

        let drafts = Arc::new(MemoryDrafts {
            saves: AtomicU32::new(0),
        });
        let orchestrator = PaymentOrchestrator::new(
            OrderDraftBuilder::new(Arc::clone(&drafts) as Arc<dyn DraftStore>),
            Arc::new(StubTokenizer {
                calls: AtomicU32::new(0),
            }),
            Arc::new(DownGateway),
        );
        let mut cart = loaded_cart();

        let err = orchestrator
            .submit_payment(&mut cart, &customer(), &address(), PaymentMethod::Pix)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Gateway(_)));
        // Draft was persisted before the gateway call; it stays pending.
        assert_eq!(drafts.saves.load(Ordering::SeqCst), 1);
        assert!(!cart.snapshot().is_empty());
    }
}

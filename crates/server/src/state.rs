//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use natucart_core::FreightOption;

use crate::config::{CarrierChoice, ServerConfig};
use crate::fulfillment::{FulfillmentService, ShipmentCarrier};
use crate::gateways::{
    AbacatePayClient, FrenetClient, MelhorEnvioClient, MercadoPagoClient, PaymentLookup,
    QuoteCarrier,
};
use crate::store::OrderStore;

/// Quote cache TTL. Carrier prices change rarely; a short TTL keeps repeat
/// quotes for the same CEP and cart off the carrier API.
const QUOTE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const QUOTE_CACHE_CAPACITY: u64 = 1_000;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("freight carrier {0} selected but not configured")]
    MissingCarrierToken(&'static str),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the order store, gateway clients, and
/// configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    orders: Arc<dyn OrderStore>,
    payments: Arc<MercadoPagoClient>,
    quotes: Arc<dyn QuoteCarrier>,
    fulfillment: Option<Arc<FulfillmentService>>,
    abacatepay: Option<AbacatePayClient>,
    quote_cache: Cache<String, Arc<Vec<FreightOption>>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Builds the gateway clients from configuration. Freight quotes use the
    /// configured carrier; shipments always go through Melhor Envio, so
    /// fulfillment is only wired when Melhor Envio is also the quote
    /// carrier (its service codes end up on the shipment payload).
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn new(config: ServerConfig, orders: Arc<dyn OrderStore>) -> Result<Self, StateError> {
        let payments = Arc::new(MercadoPagoClient::new(
            &config.mercado_pago,
            &config.base_url,
        )?);

        let melhor_envio = config
            .freight
            .melhor_envio
            .as_ref()
            .map(|me| MelhorEnvioClient::new(me, &config.freight.origin_postal_code))
            .transpose()?
            .map(Arc::new);

        // from_env already validated the chosen carrier has a token
        let quotes: Arc<dyn QuoteCarrier> = match config.freight.carrier {
            CarrierChoice::MelhorEnvio => melhor_envio
                .clone()
                .map(|client| client as Arc<dyn QuoteCarrier>)
                .ok_or(StateError::MissingCarrierToken("melhorenvio"))?,
            CarrierChoice::Frenet => {
                let frenet = config
                    .freight
                    .frenet
                    .as_ref()
                    .ok_or(StateError::MissingCarrierToken("frenet"))?;
                Arc::new(FrenetClient::new(frenet)?)
            }
        };

        // Shipment payloads carry the service code straight off the quoted
        // freight option, and those codes are Melhor Envio's. Quoting with
        // Frenet therefore disables fulfillment rather than posting Frenet
        // codes to the Melhor Envio shipment API.
        let fulfillment = match config.freight.carrier {
            CarrierChoice::MelhorEnvio => melhor_envio.map(|client| {
                Arc::new(FulfillmentService::new(
                    client as Arc<dyn ShipmentCarrier>,
                    Arc::clone(&orders),
                ))
            }),
            CarrierChoice::Frenet => None,
        };

        let abacatepay = config
            .abacatepay
            .as_ref()
            .map(|ap| AbacatePayClient::new(ap, &config.base_url))
            .transpose()?;

        let quote_cache = Cache::builder()
            .max_capacity(QUOTE_CACHE_CAPACITY)
            .time_to_live(QUOTE_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                orders,
                payments,
                quotes,
                fulfillment,
                abacatepay,
                quote_cache,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the order store.
    #[must_use]
    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.inner.orders
    }

    /// Get a reference to the Mercado Pago client.
    #[must_use]
    pub fn payments(&self) -> &MercadoPagoClient {
        &self.inner.payments
    }

    /// The Mercado Pago client as a payment-details lookup.
    #[must_use]
    pub fn payment_lookup(&self) -> Arc<dyn PaymentLookup> {
        Arc::clone(&self.inner.payments) as Arc<dyn PaymentLookup>
    }

    /// Get a reference to the configured freight quote carrier.
    #[must_use]
    pub fn quotes(&self) -> &Arc<dyn QuoteCarrier> {
        &self.inner.quotes
    }

    /// Fulfillment service, absent when Melhor Envio is not the freight
    /// carrier.
    #[must_use]
    pub fn fulfillment(&self) -> Option<&Arc<FulfillmentService>> {
        self.inner.fulfillment.as_ref()
    }

    /// Alternate pix billing gateway, when enabled.
    #[must_use]
    pub fn abacatepay(&self) -> Option<&AbacatePayClient> {
        self.inner.abacatepay.as_ref()
    }

    /// Freight quote cache, keyed by destination CEP and package set.
    #[must_use]
    pub fn quote_cache(&self) -> &Cache<String, Arc<Vec<FreightOption>>> {
        &self.inner.quote_cache
    }
}

//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `NATUCART_BASE_URL` - Public URL of this API (webhook callbacks point here)
//! - `NATUCART_ORIGIN_POSTAL_CODE` - Warehouse CEP freight is quoted from
//! - `MERCADO_PAGO_ACCESS_TOKEN` - Mercado Pago private access token
//! - Token for the configured freight carrier (`MELHOR_ENVIO_TOKEN` or `FRENET_TOKEN`)
//!
//! ## Optional
//! - `NATUCART_HOST` - Bind address (default: 127.0.0.1)
//! - `NATUCART_PORT` - Listen port (default: 3000)
//! - `NATUCART_ORDERS_DIR` - Order record directory (default: data/orders)
//! - `NATUCART_FREIGHT_CARRIER` - `melhorenvio` (default) or `frenet`
//! - `MERCADO_PAGO_WEBHOOK_SECRET` - Webhook signature secret
//! - `MERCADO_PAGO_BASE_URL` - Gateway base URL override
//! - `MELHOR_ENVIO_BASE_URL` - Carrier base URL override (point at a relay here)
//! - `FRENET_BASE_URL` - Carrier base URL override
//! - `ABACATEPAY_API_KEY` - Enables the alternate pix billing gateway
//! - `ABACATEPAY_BASE_URL` - Alternate gateway base URL override
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;

const MERCADO_PAGO_API: &str = "https://api.mercadopago.com";
const MELHOR_ENVIO_API: &str = "https://melhorenvio.com.br";
const FRENET_API: &str = "https://api.frenet.com.br";
const ABACATEPAY_API: &str = "https://api.abacatepay.com";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of this API
    pub base_url: String,
    /// Directory order records are written to
    pub orders_dir: PathBuf,
    /// Freight quoting configuration
    pub freight: FreightConfig,
    /// Mercado Pago gateway configuration
    pub mercado_pago: MercadoPagoConfig,
    /// Alternate pix billing gateway, enabled when the key is set
    pub abacatepay: Option<AbacatePayConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Which carrier answers freight quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierChoice {
    MelhorEnvio,
    Frenet,
}

/// Freight quoting configuration.
#[derive(Debug, Clone)]
pub struct FreightConfig {
    pub carrier: CarrierChoice,
    /// Warehouse CEP, 8 digits
    pub origin_postal_code: String,
    pub melhor_envio: Option<MelhorEnvioConfig>,
    pub frenet: Option<FrenetConfig>,
}

/// Melhor Envio API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct MelhorEnvioConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl std::fmt::Debug for MelhorEnvioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MelhorEnvioConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Frenet API configuration.
#[derive(Clone)]
pub struct FrenetConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl std::fmt::Debug for FrenetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrenetConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Mercado Pago API configuration.
#[derive(Clone)]
pub struct MercadoPagoConfig {
    pub base_url: String,
    pub access_token: SecretString,
    /// When set, webhook signatures are validated (mismatches are logged,
    /// not rejected).
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// `AbacatePay` API configuration.
#[derive(Clone)]
pub struct AbacatePayConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

impl std::fmt::Debug for AbacatePayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbacatePayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("NATUCART_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("NATUCART_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("NATUCART_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("NATUCART_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("NATUCART_BASE_URL")?;
        let orders_dir = PathBuf::from(get_env_or_default("NATUCART_ORDERS_DIR", "data/orders"));

        let freight = FreightConfig::from_env()?;
        let mercado_pago = MercadoPagoConfig::from_env()?;
        let abacatepay = AbacatePayConfig::from_env();
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            host,
            port,
            base_url,
            orders_dir,
            freight,
            mercado_pago,
            abacatepay,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl FreightConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let carrier = match get_env_or_default("NATUCART_FREIGHT_CARRIER", "melhorenvio").as_str() {
            "melhorenvio" => CarrierChoice::MelhorEnvio,
            "frenet" => CarrierChoice::Frenet,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "NATUCART_FREIGHT_CARRIER".to_string(),
                    format!("unknown carrier {other:?}"),
                ));
            }
        };

        let origin_postal_code = get_required_env("NATUCART_ORIGIN_POSTAL_CODE")?;

        let melhor_envio = get_optional_env("MELHOR_ENVIO_TOKEN").map(|token| MelhorEnvioConfig {
            base_url: get_env_or_default("MELHOR_ENVIO_BASE_URL", MELHOR_ENVIO_API),
            token: SecretString::from(token),
        });
        let frenet = get_optional_env("FRENET_TOKEN").map(|token| FrenetConfig {
            base_url: get_env_or_default("FRENET_BASE_URL", FRENET_API),
            token: SecretString::from(token),
        });

        // The configured carrier must have a token.
        match carrier {
            CarrierChoice::MelhorEnvio if melhor_envio.is_none() => {
                return Err(ConfigError::MissingEnvVar("MELHOR_ENVIO_TOKEN".to_string()));
            }
            CarrierChoice::Frenet if frenet.is_none() => {
                return Err(ConfigError::MissingEnvVar("FRENET_TOKEN".to_string()));
            }
            _ => {}
        }

        Ok(Self {
            carrier,
            origin_postal_code,
            melhor_envio,
            frenet,
        })
    }
}

impl MercadoPagoConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: get_env_or_default("MERCADO_PAGO_BASE_URL", MERCADO_PAGO_API),
            access_token: get_required_secret("MERCADO_PAGO_ACCESS_TOKEN")?,
            webhook_secret: get_optional_env("MERCADO_PAGO_WEBHOOK_SECRET")
                .map(SecretString::from),
        })
    }
}

impl AbacatePayConfig {
    fn from_env() -> Option<Self> {
        get_optional_env("ABACATEPAY_API_KEY").map(|key| Self {
            base_url: get_env_or_default("ABACATEPAY_BASE_URL", ABACATEPAY_API),
            api_key: SecretString::from(key),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

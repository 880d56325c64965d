//! Shared fixtures for unit tests.

use std::net::IpAddr;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::{
    CarrierChoice, FreightConfig, FrenetConfig, MelhorEnvioConfig, MercadoPagoConfig, ServerConfig,
};

/// A full server configuration with both carrier tokens present, so tests
/// can exercise either carrier choice.
pub(crate) fn server_config(carrier: CarrierChoice) -> ServerConfig {
    ServerConfig {
        host: IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "https://api.natucart.com.br".to_string(),
        orders_dir: PathBuf::from("data/orders"),
        freight: FreightConfig {
            carrier,
            origin_postal_code: "01310100".to_string(),
            melhor_envio: Some(MelhorEnvioConfig {
                base_url: "https://melhorenvio.com.br".to_string(),
                token: SecretString::from("me-test-token".to_string()),
            }),
            frenet: Some(FrenetConfig {
                base_url: "https://api.frenet.com.br".to_string(),
                token: SecretString::from("frenet-test-token".to_string()),
            }),
        },
        mercado_pago: MercadoPagoConfig {
            base_url: "https://api.mercadopago.com".to_string(),
            access_token: SecretString::from("mp-test-token".to_string()),
            webhook_secret: None,
        },
        abacatepay: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

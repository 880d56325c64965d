//! Natucart backend library.
//!
//! This crate provides the checkout backend as a library, allowing it to
//! be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod fulfillment;
pub mod gateways;
pub mod routes;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the application router over a prepared state.
///
/// The checkout page is served from the shop's own origin, so the API
/// answers browser preflights permissively.
#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .merge(routes::routes())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use tower::ServiceExt;

    use super::*;
    use crate::config::CarrierChoice;
    use crate::store::MemoryOrderStore;

    #[tokio::test]
    async fn browser_preflight_is_answered_with_cors_headers() {
        let state = AppState::new(
            crate::testutil::server_config(CarrierChoice::MelhorEnvio),
            Arc::new(MemoryOrderStore::new()),
        )
        .unwrap();

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/freight/quote")
            .header(header::ORIGIN, "https://natucart.com.br")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}

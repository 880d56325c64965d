//! Client-side checkout layer for the Natucart storefront.
//!
//! This crate is the headless counterpart of the browser checkout: it owns
//! the cart for one browsing session, quotes freight, assembles and persists
//! an order draft, and drives a payment attempt through the backend proxy.
//!
//! # Architecture
//!
//! - [`cart::CartStore`] - in-memory cart with pluggable persistence and
//!   synchronous change notifications
//! - [`freight::FreightQuoter`] - carrier rate quoting over the packaging
//!   table shared with shipment creation
//! - [`draft::OrderDraftBuilder`] - validation, order id generation, and
//!   draft persistence (always before any gateway call)
//! - [`payment::PaymentOrchestrator`] - card/PIX/boleto dispatch, gateway
//!   status normalization, and the per-attempt state machine
//! - [`backend::BackendClient`] - `reqwest` implementations of the remote
//!   capability traits, talking to the natucart-server endpoints
//!
//! Remote capabilities are traits so every flow can be exercised against
//! in-process fakes; the single wired implementation is the backend client.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod catalog;
pub mod draft;
pub mod freight;
pub mod payment;

//! Shared domain types for the Natucart checkout.
//!
//! This crate holds the vocabulary shared by the client-side checkout layer
//! and the server-side proxies: cart items and snapshots, freight options,
//! customer/address data, the order record lifecycle, the payment status
//! normalization table, and the quantity-tiered packaging table used both
//! for freight quoting and shipment creation.
//!
//! Everything here is plain data. No I/O, no clients.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod packaging;
pub mod types;

pub use types::*;

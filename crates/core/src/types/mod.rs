//! Domain types shared across crates.

mod cart;
mod charge;
mod freight;
mod order;
mod payment;

pub use cart::*;
pub use charge::*;
pub use freight::*;
pub use order::*;
pub use payment::*;

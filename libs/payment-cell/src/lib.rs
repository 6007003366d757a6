//! Payment gateway integration: order creation, refunds, and verification of
//! signed webhook callbacks.

pub mod models;
pub mod services;

pub use models::*;
pub use services::*;

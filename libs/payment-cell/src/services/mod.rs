pub mod gateway;
pub mod signature;

pub use gateway::{PaymentGateway, RazorpayClient};
pub use signature::{verify_signature, WebhookSignature};

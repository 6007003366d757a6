// libs/payment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use shared_models::error::AppError;

pub const PAYMENT_CAPTURED: &str = "payment.captured";

// ==============================================================================
// GATEWAY API MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateOrderRequest {
    /// Smallest currency unit (paise for INR).
    pub amount: u64,
    pub currency: String,
    pub receipt: String,
    /// Auto-capture once the customer authorizes the payment.
    pub payment_capture: bool,
    pub notes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
    #[serde(default)]
    pub notes: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Omitted for a full refund.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    pub notes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: u64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayErrorBody {
    pub error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayErrorDetail {
    pub code: Option<String>,
    pub description: Option<String>,
}

// ==============================================================================
// WEBHOOK MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<PaymentWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWrapper {
    pub entity: PaymentEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub status: String,
    pub order_id: Option<String>,
    pub method: Option<String>,
    /// Object of strings, or `[]` when the order carried no notes.
    #[serde(default)]
    pub notes: Value,
}

impl WebhookEvent {
    pub fn is_payment_captured(&self) -> bool {
        self.event == PAYMENT_CAPTURED
    }

    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|wrapper| &wrapper.entity)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway not configured")]
    NotConfigured,

    #[error("Payment gateway request timed out")]
    Timeout,

    #[error("Payment gateway error: {message}")]
    Gateway { status: Option<u16>, message: String },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl PaymentError {
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            PaymentError::Timeout
        } else {
            PaymentError::Gateway { status: None, message: error.to_string() }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        match error {
            e @ PaymentError::InvalidSignature => AppError::Auth(e.to_string()),
            PaymentError::MalformedPayload(msg) => AppError::BadRequest(msg),
            e => AppError::ExternalService(e.to_string()),
        }
    }
}

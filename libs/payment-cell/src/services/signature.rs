// libs/payment-cell/src/services/signature.rs
use headers::{Error as HeaderError, Header};
use hmac::{Hmac, Mac};
use http::{HeaderName, HeaderValue};
use sha2::Sha256;

use crate::models::PaymentError;

type HmacSha256 = Hmac<Sha256>;

static X_RAZORPAY_SIGNATURE: HeaderName = HeaderName::from_static("x-razorpay-signature");

/// `X-Razorpay-Signature`: hex HMAC-SHA256 of the raw webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature(pub String);

impl Header for WebhookSignature {
    fn name() -> &'static HeaderName {
        &X_RAZORPAY_SIGNATURE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, HeaderError>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(HeaderError::invalid)?;
        let signature = value.to_str().map_err(|_| HeaderError::invalid())?;
        Ok(WebhookSignature(signature.trim().to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

/// Verify `signature` over the exact bytes received. The MAC comparison is
/// constant time.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> Result<(), PaymentError> {
    if secret.is_empty() {
        return Err(PaymentError::NotConfigured);
    }

    let expected = decode_hex(signature).ok_or(PaymentError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::InvalidSignature)
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    raw.as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}

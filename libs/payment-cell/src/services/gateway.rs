// libs/payment-cell/src/services/gateway.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{
    CreateOrderRequest, GatewayErrorBody, GatewayOrder, GatewayRefund, PaymentError, RefundRequest,
};

/// Outbound calls to the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, PaymentError>;

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<GatewayRefund, PaymentError>;

    /// Public key id handed to the checkout widget.
    fn key_id(&self) -> &str;
}

/// Razorpay REST client (basic auth with key id + secret).
/// See https://razorpay.com/docs/api/orders/
#[derive(Debug)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_payment_configured() {
            return Err(PaymentError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.external_request_timeout_secs))
            .build()
            .map_err(PaymentError::from_transport)?;

        Ok(Self {
            client,
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            base_url: config.razorpay_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, PaymentError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Sending gateway request to: {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await
            .map_err(PaymentError::from_transport)?;

        let status = response.status();
        let response_text = response.text().await.map_err(PaymentError::from_transport)?;

        if !status.is_success() {
            error!("Gateway request to {} failed: {} - {}", path, status, response_text);
            let message = serde_json::from_str::<GatewayErrorBody>(&response_text)
                .ok()
                .and_then(|body| {
                    let code = body.error.code.unwrap_or_default();
                    body.error.description.map(|description| format!("{} {}", code, description))
                })
                .unwrap_or_else(|| format!("HTTP {}: {}", status, response_text));

            return Err(PaymentError::Gateway {
                status: Some(status.as_u16()),
                message: message.trim().to_string(),
            });
        }

        serde_json::from_str(&response_text).map_err(|e| PaymentError::Gateway {
            status: Some(status.as_u16()),
            message: format!("Failed to parse gateway response: {}", e),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, PaymentError> {
        let order: GatewayOrder = self.post("/orders", request).await?;
        info!("Created gateway order {} for {} {}", order.id, order.amount, order.currency);
        Ok(order)
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<GatewayRefund, PaymentError> {
        let refund: GatewayRefund = self
            .post(&format!("/payments/{}/refund", payment_id), request)
            .await?;
        info!("Refund {} issued for payment {}", refund.id, payment_id);
        Ok(refund)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

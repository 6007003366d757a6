use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub razorpay_base_url: String,
    pub webhook_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            razorpay_base_url: "http://localhost:54399/v1".to_string(),
            webhook_secret: "test-webhook-secret".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(mut self, url: &str) -> Self {
        self.supabase_url = url.to_string();
        self
    }

    pub fn with_gateway_url(mut self, url: &str) -> Self {
        self.razorpay_base_url = url.to_string();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: "test-service-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            razorpay_key_id: "rzp_test_key".to_string(),
            razorpay_key_secret: "rzp_test_secret".to_string(),
            razorpay_webhook_secret: self.webhook_secret.clone(),
            razorpay_base_url: self.razorpay_base_url.clone(),
            payment_currency: "INR".to_string(),
            redis_url: None,
            external_request_timeout_secs: 2,
            pending_booking_ttl_minutes: 30,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub clinic_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "user".to_string(),
            clinic_id: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            clinic_id: None,
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "user")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn clinic(clinic_id: &str) -> Self {
        Self {
            clinic_id: Some(clinic_id.to_string()),
            ..Self::new("clinic@example.com", "clinic")
        }
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            clinic_id: self.clinic_id.clone(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "app_metadata": { "clinic_id": user.clinic_id },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct WebhookTestUtils;

impl WebhookTestUtils {
    /// Hex HMAC-SHA256 of `body`, as the gateway sends in its signature header.
    pub fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(body);
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    pub fn payment_captured(
        payment_id: &str,
        order_id: &str,
        amount_minor_units: u64,
        notes: serde_json::Value,
    ) -> serde_json::Value {
        json!({
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": payment_id,
                        "entity": "payment",
                        "amount": amount_minor_units,
                        "currency": "INR",
                        "status": "captured",
                        "order_id": order_id,
                        "method": "upi",
                        "notes": notes
                    }
                }
            }
        })
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn clinic_response(clinic_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": clinic_id,
            "name": name,
            "email": "clinic@example.com",
            "phone_number": "+919876543210",
            "address_one": "12 MG Road",
            "address_two": "Suite 4",
            "city": "Pune",
            "state": "MH",
            "pincode": "411001"
        })
    }

    pub fn doctor_response(
        doctor_id: &str,
        clinic_id: &str,
        slot_id: &str,
        version: i64,
    ) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "full_name": "Dr. Asha Rao",
            "email": "asha@example.com",
            "specialization": "Cardiology",
            "registration_number": "REG-1001",
            "phone_number": "+919812345678",
            "clinics": [clinic_id],
            "fees": [{ "clinicId": clinic_id, "fee": 500.0 }],
            "version": version,
            "doctor_schedules": [{
                "clinic_id": clinic_id,
                "schedule": [{
                    "id": slot_id,
                    "day": "Monday",
                    "startTime": "09:00",
                    "endTime": "12:00",
                    "maxSlots": 2
                }]
            }]
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

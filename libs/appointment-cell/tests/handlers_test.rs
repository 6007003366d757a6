// libs/appointment-cell/tests/handlers_test.rs
mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::models::SLOT_FULL_MESSAGE;
use appointment_cell::router::{appointment_routes, payment_routes, AppointmentState};
use shared_utils::test_utils::{JwtTestUtils, TestUser};

use common::{fixture, Fixture};

fn routers(fx: &Fixture) -> (Router, Router) {
    let state = Arc::new(AppointmentState {
        booking: fx.booking.clone(),
        confirmation: fx.confirmation.clone(),
    });

    (appointment_routes(fx.config.to_arc(), state.clone()), payment_routes(state))
}

fn patient_token(fx: &Fixture) -> (String, TestUser) {
    let user = TestUser::patient("patient@example.com");
    (JwtTestUtils::create_test_token(&user, &fx.config.jwt_secret, None), user)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn order_request(fx: &Fixture, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/orders")
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = serde_json::to_value(fx.intent()).unwrap();
    builder.body(Body::from(body.to_string())).unwrap()
}

fn webhook_request(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Razorpay-Signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn order_requires_authentication() {
    let fx = fixture().await;
    let (appointments, _) = routers(&fx);

    let (status, body) = send(&appointments, order_request(&fx, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    assert_eq!(fx.gateway.order_count(), 0);
}

#[tokio::test]
async fn order_is_issued_for_the_caller() {
    let fx = fixture().await;
    let (appointments, _) = routers(&fx);
    let (token, user) = patient_token(&fx);

    let (status, body) = send(&appointments, order_request(&fx, Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], "order_1");
    assert_eq!(body["amountMinorUnits"], 100);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["keyId"], "rzp_test_key");
    assert_eq!(fx.gateway.notes_for("order_1")["userId"], user.id.as_str());
}

#[tokio::test]
async fn full_slot_returns_bad_request() {
    let fx = fixture().await;
    fx.appointments.insert_appointment(fx.booked(1)).await;
    fx.appointments.insert_appointment(fx.booked(2)).await;
    let (appointments, _) = routers(&fx);
    let (token, _) = patient_token(&fx);

    let (status, body) = send(&appointments, order_request(&fx, Some(&token))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], SLOT_FULL_MESSAGE);
}

#[tokio::test]
async fn slot_availability_over_http() {
    let fx = fixture().await;
    fx.appointments.insert_appointment(fx.booked(1)).await;
    let (appointments, _) = routers(&fx);
    let (token, _) = patient_token(&fx);

    let uri = format!(
        "/slots?doctorId={}&clinicId={}&scheduledId={}&appointmentDate=10-06-2024",
        fx.doctor_id, fx.clinic_id, fx.slot.id
    );
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&appointments, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["maxSlots"], 2);
    assert_eq!(body["bookedSlot"], 1);
    assert_eq!(body["scheduleEntryId"], json!(fx.slot.id));
}

#[tokio::test]
async fn webhook_always_answers_ok() {
    let fx = fixture().await;
    let (appointments, payments) = routers(&fx);
    let (token, _) = patient_token(&fx);

    let (_, order) = send(&appointments, order_request(&fx, Some(&token))).await;
    let order = serde_json::from_value(order).unwrap();
    let (body, signature) = fx.captured("pay_1", &order);

    let (status, _) = send(&payments, webhook_request(body.clone(), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&payments, webhook_request(body.clone(), Some("deadbeef"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(fx.appointments.appointments().await.is_empty());

    let (status, _) = send(&payments, webhook_request(body, Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fx.appointments.appointments().await.len(), 1);
}

// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use headers::HeaderMapExt;
use tracing::{debug, info, warn};

use payment_cell::services::WebhookSignature;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BookingIntentRequest, OrderIssued, SlotAvailability, SlotAvailabilityQuery, WebhookOutcome,
};
use crate::router::AppointmentState;

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_order(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookingIntentRequest>,
) -> Result<Json<OrderIssued>, AppError> {
    let order = state.booking.issue_order(&user.id, request).await?;
    Ok(Json(order))
}

#[axum::debug_handler]
pub async fn get_slot_availability(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<SlotAvailabilityQuery>,
) -> Result<Json<SlotAvailability>, AppError> {
    let availability = state.booking.slot_availability(query).await?;
    Ok(Json(availability))
}

// ==============================================================================
// GATEWAY CALLBACKS
// ==============================================================================

/// Always answers 200 so the gateway stops retrying; the outcome only
/// reaches the logs.
#[axum::debug_handler]
pub async fn payment_webhook(
    State(state): State<Arc<AppointmentState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers.typed_get::<WebhookSignature>();

    let outcome = state
        .confirmation
        .handle_webhook(&body, signature.as_ref().map(|signature| signature.0.as_str()))
        .await;

    match &outcome {
        WebhookOutcome::Confirmed { appointment_id } => {
            info!("Webhook confirmed appointment {}", appointment_id)
        }
        WebhookOutcome::Rejected { reason, refund_id } => {
            warn!("Webhook payment rejected ({}), refund {:?}", reason, refund_id)
        }
        other => debug!("Webhook handled: {:?}", other),
    }

    StatusCode::OK
}

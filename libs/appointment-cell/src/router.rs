// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::BookingService;
use crate::services::confirmation::ConfirmationService;

pub struct AppointmentState {
    pub booking: Arc<BookingService>,
    pub confirmation: Arc<ConfirmationService>,
}

pub fn appointment_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    // Booking requires an authenticated user
    let protected_routes = Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/slots", get(handlers::get_slot_availability))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

/// Gateway callbacks. Authenticated by body signature, not by bearer token.
pub fn payment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/webhook", post(handlers::payment_webhook))
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::schedule::ScheduleService;

pub fn doctor_routes(config: Arc<AppConfig>, service: Arc<ScheduleService>) -> Router {
    let public_routes = Router::new()
        .route("/{doctor_id}/clinics/{clinic_id}/schedule", get(handlers::get_clinic_schedule));

    // Clinic accounts (or admins) only
    let protected_routes = Router::new()
        .route("/affiliations", post(handlers::affiliate_doctor))
        .route("/{doctor_id}/schedule", put(handlers::set_schedule))
        .route("/{doctor_id}/schedule/{schedule_entry_id}", delete(handlers::delete_day_slot))
        .route("/{doctor_id}/affiliation", delete(handlers::remove_affiliation))
        .route("/{doctor_id}/fee", put(handlers::set_clinic_fee))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(service)
}

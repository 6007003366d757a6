use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, payment_routes, AppointmentState};
use doctor_cell::router::doctor_routes;
use doctor_cell::services::ScheduleService;
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    schedules: Arc<ScheduleService>,
    appointments: Arc<AppointmentState>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/doctors", doctor_routes(config.clone(), schedules))
        .nest("/appointments", appointment_routes(config, appointments.clone()))
        .nest("/payments", payment_routes(appointments))
}

pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

// Re-export models and services for the API binary
pub use models::*;
pub use router::AppointmentState;
pub use services::*;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::router::AppointmentState;
use appointment_cell::services::{
    AppointmentStore, BookingService, CommissionSource, ConfirmationService, FixedCommission,
    InMemoryAppointmentStore, SupabaseAppointmentStore, SupabaseCommissionSource,
};
use doctor_cell::services::{
    DoctorLockManager, DoctorStore, InMemoryDoctorStore, LocalDoctorLocks, RedisDoctorLocks,
    ScheduleService, SupabaseDoctorStore,
};
use payment_cell::services::RazorpayClient;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

const LOCK_LEASE_TTL: Duration = Duration::from_secs(10);
const LOCK_WAIT: Duration = Duration::from_secs(5);
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic booking API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Storage: Supabase when configured, process memory otherwise
    let (doctor_store, appointment_store, commission): (
        Arc<dyn DoctorStore>,
        Arc<dyn AppointmentStore>,
        Arc<dyn CommissionSource>,
    ) = if config.is_configured() {
        let supabase = Arc::new(SupabaseClient::new(&config));
        (
            Arc::new(SupabaseDoctorStore::new(&config, supabase.clone())),
            Arc::new(SupabaseAppointmentStore::new(&config, supabase.clone())),
            Arc::new(SupabaseCommissionSource::new(&config, supabase)),
        )
    } else {
        warn!("Supabase is not configured, using in-memory storage");
        (
            Arc::new(InMemoryDoctorStore::new()),
            Arc::new(InMemoryAppointmentStore::new()),
            Arc::new(FixedCommission(Default::default())),
        )
    };

    // Per-doctor schedule locks, shared across instances when Redis is available
    let locks: Arc<dyn DoctorLockManager> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisDoctorLocks::new(url, LOCK_LEASE_TTL, LOCK_WAIT)
                .context("failed to set up Redis schedule locks")?,
        ),
        None => {
            warn!("REDIS_URL not set, schedule locks are local to this process");
            Arc::new(LocalDoctorLocks::new(LOCK_WAIT))
        }
    };

    let gateway = Arc::new(RazorpayClient::new(&config).context("payment gateway is not configured")?);
    let call_timeout = Duration::from_secs(config.external_request_timeout_secs);

    let schedules = Arc::new(ScheduleService::new(doctor_store, locks));

    let booking = Arc::new(
        BookingService::new(schedules.clone(), appointment_store.clone(), gateway.clone(), commission.clone())
            .with_currency(&config.payment_currency)
            .with_pending_ttl(chrono::Duration::minutes(config.pending_booking_ttl_minutes))
            .with_call_timeout(call_timeout),
    );
    let confirmation = Arc::new(
        ConfirmationService::new(
            schedules.clone(),
            appointment_store,
            gateway,
            commission,
            &config.razorpay_webhook_secret,
        )
        .with_call_timeout(call_timeout),
    );

    // Expire abandoned orders in the background
    let sweeper = booking.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PENDING_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.expire_pending_bookings(chrono::Utc::now()).await {
                error!("Pending booking sweep failed: {}", e);
            }
        }
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let appointments = Arc::new(AppointmentState { booking, confirmation });

    // Build the application router
    let app = router::create_router(config, schedules, appointments)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

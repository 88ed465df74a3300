//! Turf Booking reservation engine runner
//!
//! Connects to PostgreSQL, applies migrations and runs the completion
//! sweep that moves elapsed CONFIRMED reservations to COMPLETED. Request
//! handling lives with the callers that embed `turf-services`.

use anyhow::Context;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use turf_core::{AppConfig, SystemClock};
use turf_db::{
    create_pool, run_migrations, PgPaymentRepository, PgReservationRepository, PgResourceCatalog,
};
use turf_services::ReservationEngine;

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "turf_booking={},turf_services={},turf_db={},sqlx=warn",
            log_level, log_level, log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!(
        "Starting Turf Booking reservation engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load().context("failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("failed to apply migrations")?;

    let engine = Arc::new(ReservationEngine::new(
        Arc::new(PgResourceCatalog::new(pool.clone())),
        Arc::new(PgReservationRepository::new(pool.clone())),
        Arc::new(PgPaymentRepository::new(pool.clone())),
        Arc::new(SystemClock),
        config.booking.clone(),
    ));

    let interval_secs = config.sweeper.interval_secs.max(1);
    info!(
        "Completion sweep every {}s, cancellation window {} minutes",
        interval_secs, config.booking.cancellation_window_minutes
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.complete_elapsed().await {
                    error!("Completion sweep failed [{}]: {}", e.error_code(), e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    pool.close().await;
    info!("Turf Booking reservation engine stopped");
    Ok(())
}

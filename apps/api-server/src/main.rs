//! # Quill API Server
//!
//! Actix-web HTTP server for the blog: posts, pages, comments and sign-in,
//! with per-client fixed-window rate limits.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod background;
mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

use config::AppConfig;
use observability::RequestIdMiddleware;
use quill_core::rate_limit::ExpirySweep;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        site_url = %config.site_url,
        "Starting Quill API Server on {}:{} ({})",
        config.host,
        config.port,
        config.environment
    );

    let state = AppState::new(&config).await;

    let sweep = ExpirySweep::new(state.counter_store.clone());
    #[cfg(feature = "scheduler")]
    let _scheduler = start_scheduler(&config, sweep).await;
    #[cfg(not(feature = "scheduler"))]
    spawn_sweep_loop(sweep);

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .configure(handlers::configure_routes(&server_state))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

/// Schedule the expiry sweep. A broken schedule is logged and the server
/// runs without sweeping; expired windows are still reset on their next hit.
#[cfg(feature = "scheduler")]
async fn start_scheduler(
    config: &AppConfig,
    sweep: ExpirySweep,
) -> Option<background::Scheduler> {
    let scheduler = match background::Scheduler::new(config.scheduler.clone()).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create scheduler");
            return None;
        }
    };
    if let Err(e) = scheduler.add_sweep(sweep).await {
        tracing::error!(
            error = %e,
            schedule = %config.scheduler.sweep_schedule,
            "Invalid sweep schedule"
        );
        return None;
    }
    if let Err(e) = scheduler.start().await {
        tracing::error!(error = %e, "Failed to start scheduler");
        return None;
    }
    Some(scheduler)
}

#[cfg(not(feature = "scheduler"))]
fn spawn_sweep_loop(sweep: ExpirySweep) {
    actix_rt::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5 * 60));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            background::run_sweep(&sweep).await;
        }
    });
}

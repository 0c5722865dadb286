//! EventPlat Server - Main entry point.
//!
//! This binary starts the EventPlat realtime gateway with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background rate limiter cleanup
//!
//! # Configuration
//!
//! See [`eventplat_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (no auth)
//! EVENTPLAT_UNSAFE_NO_AUTH=true cargo run --bin eventplat-server
//!
//! # Production mode
//! EVENTPLAT_JWT_SECRET="shared-session-secret" \
//! EVENTPLAT_NOTIFIER_TOKEN="hook-token" \
//! PORT=8080 \
//! cargo run --release --bin eventplat-server
//! ```

use std::process::ExitCode;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use eventplat_server::config::Config;
use eventplat_server::routes::{create_router, AppState};

/// Cleanup interval for stale rate limiter buckets (30 seconds).
const RATE_LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables (when auth enabled):");
            eprintln!("  EVENTPLAT_JWT_SECRET     - Shared secret for session tokens");
            eprintln!("  EVENTPLAT_NOTIFIER_TOKEN - Bearer token for the CRUD layer");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                     - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                 - Log level filter (default: info)");
            eprintln!("  EVENTPLAT_UNSAFE_NO_AUTH - Disable auth (dev only, set to 'true')");
            return ExitCode::from(1);
        }
    };

    // Log startup information
    let auth_mode = if config.unsafe_no_auth {
        "disabled (UNSAFE)"
    } else {
        "enabled"
    };
    info!(
        port = config.port,
        auth_mode = auth_mode,
        "EventPlat server starting"
    );

    // Create application state
    let state = AppState::new(config.clone());

    // Spawn rate limiter cleanup task
    let cleanup_handle = state
        .rate_limiter
        .spawn_cleanup_task(RATE_LIMITER_CLEANUP_INTERVAL);
    info!(
        interval_secs = RATE_LIMITER_CLEANUP_INTERVAL.as_secs(),
        "Rate limiter cleanup task started"
    );

    // Create router
    let app = create_router(state);

    // Bind to address
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(
                port = config.port,
                address = %bind_addr,
                "Server listening"
            );
            listener
        }
        Err(err) => {
            error!(
                error = %err,
                address = %bind_addr,
                "Failed to bind to address"
            );
            return ExitCode::from(1);
        }
    };

    // Start server with graceful shutdown
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    // Run the server
    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    // Shutdown cleanup
    info!("Server shutting down gracefully");

    cleanup_handle.abort();
    info!("Rate limiter cleanup task stopped");

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// Configures JSON-formatted output for production use with:
/// - Environment-based log level filtering via RUST_LOG
/// - Default log level of `info`
/// - Target and level information
fn init_logging() {
    // Build env filter from RUST_LOG or use default
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default: info level for our crates, more detail for HTTP tracing
        EnvFilter::new("info,tower_http=debug,axum::rejection=trace")
    });

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

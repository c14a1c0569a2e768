mod bootstrap;
mod health;
mod identity;
mod rate_limit;
mod routes;

use std::time::Duration;

use anyhow::Result;
use geochat_core::config::{AppConfig, LoadOptions};
use geochat_core::domain::user::UserId;
use tokio::net::TcpListener;

fn init_logging(config: &AppConfig) {
    use geochat_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let default_user = UserId::parse(&app.config.chat.default_user_id)
        .ok_or_else(|| anyhow::anyhow!("chat.default_user_id is not a usable user id"))?;
    let state = routes::AppState {
        runtime: app.runtime.clone(),
        rate_limiter: app.rate_limiter.clone(),
        default_user,
    };
    let router = routes::router(state)
        .merge(health::router(health::HealthState::new(app.repository.clone())));

    let addr = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %addr,
        "geochat-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown(grace)).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "geochat-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(
                event_name = "system.server.signal_failed",
                correlation_id = "shutdown",
                error = %error,
                "failed to listen for ctrl-c"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        event_name = "system.server.shutdown_requested",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "shutdown signal received, draining connections"
    );

    // In-flight streams get the grace period, then the process exits.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!(
            event_name = "system.server.shutdown_forced",
            correlation_id = "shutdown",
            "grace period elapsed with connections still open"
        );
        std::process::exit(0);
    });
}

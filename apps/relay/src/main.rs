use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchboard_relay::{build_app, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    switchboard_shared_config::load_dotenv();

    let config = Config::from_env()?;
    let addr = config.common.listen.socket_addr();

    tracing::info!(
        environment = %config.environment(),
        message_auth = config.message_auth_enabled,
        ticket_ttl_secs = config.ticket_ttl.as_secs(),
        "Starting Switchboard relay"
    );

    let app = build_app(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// Prayer engine - access, ordering and subject-linking core
// Entry point: opens the store, runs migrations and keeps the notification
// dispatcher alive until interrupted.

use prayer_engine::app;
use prayer_engine::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prayer_engine=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting prayer engine v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    let (state, dispatcher) = app::setup(&config).await?;

    tracing::info!("Prayer engine ready; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    drop(state);
    dispatcher.await?;

    Ok(())
}

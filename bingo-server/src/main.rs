use anyhow::Context;
use bingo_server::{app, AppState, Config};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("reading configuration")?;
    let addr = config.addr;
    if config.admin_password == Config::default().admin_password {
        warn!("ADMIN_PASSWORD is unset; using the default");
    }

    let state = AppState::with_persistence(config).await;
    let broadcaster = state.broadcaster.clone();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "bingo server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            broadcaster.shutdown();
        })
        .await
        .context("server error")?;

    Ok(())
}

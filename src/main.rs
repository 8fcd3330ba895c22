use std::sync::Arc;

use log::{info, warn};

use framecast::config::Config;
use framecast::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();

    let config = Config::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState::new(config)?;
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("framecast listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close the browser and stop the driver before exiting.
    state.renderer.shutdown().await;
    info!("framecast stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to install shutdown handler: {}", e);
        // Without a signal handler the future must never resolve, or the
        // server would exit immediately.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

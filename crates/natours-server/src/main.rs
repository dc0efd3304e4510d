use anyhow::Context;
use natours_server::{app_with_store, Config};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("reading configuration")?;
    let store = match config.database.open() {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "DB connection failed");
            return Err(e).context("opening tour store");
        }
    };
    info!(tours = store.count().await.unwrap_or(0), "DB connection successful");

    let app = app_with_store(store);

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    info!("App running on {}...", config.addr);
    axum_server::bind(config.addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("http server")?;
    Ok(())
}

// Food Safety Permits - Web Server
// Read-only REST API over the migrated permit database

use anyhow::Result;
use food_permits::api::{router, AppState};
use food_permits::logging::init_logging;
use food_permits::{connect, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let settings = Settings::from_env()?;
    let store = connect(&settings).await?;
    store.ping().await?;
    info!(backend = store.backend(), "Database opened");

    let app = router(AppState {
        store: store.clone(),
    });

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    info!("food-permits API listening on {}", settings.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    store.close().await;
    Ok(())
}

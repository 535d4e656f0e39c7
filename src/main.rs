use exam_permits::app::{self, AppState};
use exam_permits::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;
    let state = AppState::from_config(&config).await?;
    if let Some(path) = state.store.snapshot_path() {
        log::info!("Persisting permits to {}", path.display());
    }
    let app = app::router(state);

    log::info!(
        "Starting exam permit HTTP server on http://{} (duplicate policy: {:?})",
        config.bind_addr,
        config.duplicates
    );
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

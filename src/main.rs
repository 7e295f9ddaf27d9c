use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docqa_backend::config::Settings;
use docqa_backend::logging;
use docqa_backend::server::router::router;
use docqa_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    logging::init(&settings.log_dir);

    let state = AppState::initialize(settings).await?;
    tracing::info!("Embeddings backend: {}", state.embedder.describe());

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(8000);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

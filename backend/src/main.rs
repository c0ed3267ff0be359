use std::sync::Arc;

use tracing::info;

use backend::api;
use backend::api::search::SearchEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let engine = Arc::new(SearchEngine::from_env());
    let app = api::router(engine);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or("0.0.0.0:8404".to_string());
    info!("listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

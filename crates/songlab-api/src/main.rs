//! Songlab API server.

use anyhow::Context;
use songlab_api::{AppState, routes};
use songlab_db::{create_pool, run_migrations};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let bind_addr =
        std::env::var("SONGLAB_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    info!("Connecting to database...");
    let pool = create_pool(&database_url)
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;
    info!("Database ready");

    let state = AppState::new(pool);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("Starting server on {}", bind_addr);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .context("binding listen address")?;
    axum::serve(listener, app).await?;

    Ok(())
}

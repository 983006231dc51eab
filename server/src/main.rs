//! HTTP server: reads settings from the environment (and `.env`), prepares the database, serves
//! the API.
//!
//! Run from repo root: `cargo run -p dental-server`

use dental_api::{build_router, ensure_database_exists, ensure_schema, AppState, Database, Settings};
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dental_api=info,dental_server=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let db = Database::connect(&settings.database_url, settings.db_max_connections).await?;
    ensure_schema(db.pool()).await?;

    let bind_addr = settings.bind_addr.clone();
    let environment = settings.environment;
    let state = AppState::from_settings(db, settings)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, ?environment, "dental API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

// crates/server/src/main.rs
//! statline server binary.
//!
//! Opens the SQLite job store (falling back to a process-local store when
//! the database is unavailable), then serves the API.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Result;
use statline_db::{Database, DbResult};
use statline_server::{create_app, AppState, JobStore};
use tracing_subscriber::EnvFilter;

/// Default port for the server.
const DEFAULT_PORT: u16 = 47311;

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("STATLINE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Open the database: explicit `STATLINE_DB` path if set, otherwise the
/// platform cache directory.
async fn open_database() -> DbResult<Database> {
    match std::env::var("STATLINE_DB") {
        Ok(path) => Database::new(Path::new(&path)).await,
        Err(_) => Database::open_default().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    eprintln!("\nstatline v{}\n", env!("CARGO_PKG_VERSION"));

    // Backend capability check happens exactly once, here. Everything
    // downstream sees only the JobStore seam.
    let store = match open_database().await {
        Ok(db) => {
            tracing::info!(path = %db.path().display(), "using durable job store");
            JobStore::durable(db)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "SQLite unavailable; using process-local job store \
                 (jobs are lost on restart and not deduplicated across processes)"
            );
            JobStore::ephemeral()
        }
    };

    let state = AppState::new(store);
    let app = create_app(state);

    let port = get_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    eprintln!("  -> http://localhost:{port}\n");

    axum::serve(listener, app).await?;

    Ok(())
}

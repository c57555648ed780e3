//! Clinic - staff authentication and patient records over REST
//! Mission: Serve the versioned API and keep the token denylist tidy

use anyhow::{Context, Result};
use clap::Parser;
use clinic_backend::{
    api::{self, AppState, API_PREFIX},
    auth::{denylist::run_cleanup_loop, JwtHandler},
    store::{Database, Repositories, SqliteTokenStore, TokenRepository},
    Config,
};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    info!("🏥 Clinic backend starting");

    if config.uses_dev_secret() {
        warn!("⚠️  JWT_SECRET not set - using the development secret. SET IT IN PRODUCTION!");
    }

    let db = Database::open(
        &config.database.path,
        config.database.max_connections,
        config.busy_timeout(),
    )
    .context("Failed to open database")?;

    let repos = Repositories::sqlite(&db);

    // Sweeper gets its own handle so it never waits on request connections.
    let sweeper_tokens: Arc<dyn TokenRepository> =
        Arc::new(SqliteTokenStore::new(db.detached(1)));
    let cleanup = tokio::spawn(run_cleanup_loop(sweeper_tokens, config.cleanup_interval()));
    info!(
        "🧹 Denylist cleanup every {}s",
        config.database.cleanup_interval_secs
    );

    let state = AppState::new(
        repos,
        Arc::new(JwtHandler::new(
            config.jwt.secret.as_bytes(),
            config.token_validity(),
        )),
        config.jwt.bcrypt_cost,
    )?;

    let app = api::router(state, config.request_timeout());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}{}", addr, API_PREFIX);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cleanup.abort();
    info!("👋 Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_backend=info,clinic=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

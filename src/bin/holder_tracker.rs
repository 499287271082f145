//! Holder Tracker - polls one mint and runs the holder analytics session
//!
//! - Loads configuration from the environment (.env supported)
//! - Restores the previous session for the same mint, if saved
//! - Polls the RPC node on a fixed cadence (non-overlapping)
//! - Writes poll reports and lottery draws to SQLite
//! - Autosaves the session to JSON
//!
//! Usage:
//!   cargo run --release --bin holder_tracker
//!
//! Environment variables:
//!   RPC_ENDPOINT - Solana RPC URL (required)
//!   TOKEN_MINT - Mint to track (required)
//!   POLL_INTERVAL_MS - Poll cadence (default: 2000)
//!   COHORT_SIZE - Top cohort size (default: 50)
//!   HOLDERFLOW_DB_PATH - SQLite database path (default: holderflow.db)

use dotenv::dotenv;
use holderflow::{
    config::TrackerConfig,
    db::{run_schema_migrations, ReportDbWriter, SqliteReportWriter},
    fetcher::{RpcSnapshotSource, SnapshotSource},
    persistence::{load_snapshot, persistence_task, save_snapshot},
    scheduler::poll_loop,
    session::TrackingSession,
};
use log::{error, info, warn};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = TrackerConfig::from_env()?;

    info!("🚀 Starting Holder Tracker");
    info!("   ├─ Mint: {}", config.token_mint);
    info!("   ├─ RPC: {}", config.rpc_endpoint);
    info!("   ├─ Poll interval: {}ms", config.poll_interval_ms);
    info!("   ├─ Cohort size: {}", config.cohort_size);
    info!("   ├─ Database: {}", config.db_path);
    if config.lottery_every_polls > 0 {
        info!(
            "   └─ Lottery: {} every {} polls, band {}%..{}%",
            config.lottery_mode,
            config.lottery_every_polls,
            config.lottery_min_pct,
            config.lottery_max_pct
        );
    } else {
        info!("   └─ Lottery: disabled");
    }

    info!("🔧 Initializing database...");
    let mut conn = Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, "sql")?;
    drop(conn);

    let db_writer: Arc<dyn ReportDbWriter> = Arc::new(SqliteReportWriter::new(&config.db_path)?);
    info!("✅ Database initialized");

    let settings = config.session_settings();
    let session = match load_snapshot(&config.snapshot_path) {
        Ok(Some(saved)) => TrackingSession::restore(config.token_mint.clone(), settings, saved),
        Ok(None) => TrackingSession::start(config.token_mint.clone(), settings),
        Err(e) => {
            warn!("⚠️  Could not load session snapshot ({}), starting fresh", e);
            TrackingSession::start(config.token_mint.clone(), settings)
        }
    };
    let session = Arc::new(Mutex::new(session));

    let source: Arc<dyn SnapshotSource> =
        Arc::new(RpcSnapshotSource::new(config.rpc_endpoint.clone(), config.fetch_max_retries)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let session_poll = session.clone();
    let poll_interval = config.poll_interval_ms;
    let poll_handle = tokio::spawn(async move {
        poll_loop(session_poll, source, Some(db_writer), poll_interval, shutdown_rx).await;
    });
    info!("   └─ ✅ Poll loop spawned");

    let session_save = session.clone();
    let persistence_config = config.persistence_config();
    let autosave_handle = tokio::spawn(async move {
        persistence_task(session_save, persistence_config).await;
    });
    info!("   └─ ✅ Autosave task spawned");

    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = poll_handle.await {
        error!("❌ Poll loop task failed: {}", e);
    }
    autosave_handle.abort();

    let final_snapshot = {
        let session = session.lock().await;
        info!("📈 Final status: {}", serde_json::to_string(&session.status())?);
        session.to_snapshot(chrono::Utc::now().timestamp_millis())
    };
    save_snapshot(&final_snapshot, &config.snapshot_path)?;

    info!("✅ Holder Tracker stopped");
    Ok(())
}

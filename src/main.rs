//! CAMTC Ledger node binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camtc_ledger::{config::Args, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("camtc_ledger={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  CAMTC Healthcare Ledger");
    info!("======================================");
    info!("Network: {}", args.network_id);
    info!("Data root: {}", args.data_root.display());
    info!("Listen: {}:{}", args.host, args.port);
    info!("API prefix: {}", args.api_prefix());
    info!(
        "Audit retention: {}",
        if args.audit_retention_days == 0 {
            "disabled".to_string()
        } else {
            format!("{} days", args.audit_retention_days)
        }
    );
    info!(
        "Audit rotation: {}",
        if args.audit_log_max_bytes == 0 {
            "disabled".to_string()
        } else {
            format!("{} bytes", args.audit_log_max_bytes)
        }
    );
    info!("Nonce TTL: {}s", args.wallet_nonce_ttl_seconds);
    info!("======================================");

    let state = match server::AppState::bootstrap(args).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let tail = state.audit.last_integrity_hash().await;
    info!(
        "State loaded: {} wallets, {} mempool entries, audit tail {}",
        state.registry.count().await,
        state.mempool.stats(0, 0).await.total_size,
        &tail[..tail.len().min(12)]
    );

    state.spawn_background_tasks();

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}

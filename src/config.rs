//! Configuration for the ledger node
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::path::PathBuf;

/// CAMTC Ledger - healthcare transaction ledger node
#[derive(Parser, Debug, Clone)]
#[command(name = "camtc-ledger")]
#[command(about = "Persistence and ingestion backbone for the CAMTC healthcare ledger")]
pub struct Args {
    /// Root directory for durable state (audit log, mempool snapshot, registry)
    #[arg(long, env = "DATA_ROOT", default_value = "./camtc-data")]
    pub data_root: PathBuf,

    /// Logical network identifier for this deployment
    #[arg(long, env = "NETWORK_ID", default_value = "camtc-mainnet")]
    pub network_id: String,

    /// Prefix under which the HTTP API is mounted
    #[arg(long, env = "API_PREFIX", default_value = "/api")]
    pub api_prefix: String,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Audit entries older than this many days are pruned on sweeps (0 disables)
    #[arg(long, env = "AUDIT_RETENTION_DAYS", default_value = "0")]
    pub audit_retention_days: u32,

    /// Rotate the audit log once it exceeds this many bytes (0 disables)
    #[arg(long, env = "AUDIT_LOG_MAX_BYTES", default_value = "0")]
    pub audit_log_max_bytes: u64,

    /// Lifetime of an issued wallet challenge nonce
    #[arg(long, env = "WALLET_NONCE_TTL_SECONDS", default_value = "300")]
    pub wallet_nonce_ttl_seconds: u64,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Optional external-signer address registered at startup for demos
    #[arg(long, env = "DEMO_EXTERNAL_SIGNER_ADDRESS")]
    pub demo_external_signer_address: Option<String>,
}

impl Args {
    /// Normalized API prefix: leading slash, no trailing slash
    pub fn api_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return String::new();
        }
        if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Validate configuration; failures here abort the process
    pub fn validate(&self) -> Result<(), String> {
        if self.network_id.trim().is_empty() {
            return Err("NETWORK_ID must not be empty".to_string());
        }
        if self.wallet_nonce_ttl_seconds == 0 {
            return Err("WALLET_NONCE_TTL_SECONDS must be positive".to_string());
        }
        std::fs::create_dir_all(&self.data_root)
            .map_err(|e| format!("DATA_ROOT {} is not writable: {}", self.data_root.display(), e))?;
        Ok(())
    }
}

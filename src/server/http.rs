//! HTTP server implementation
//!
//! hyper http1 with TokioIo. One accept loop; every connection is served on
//! its own task. The dispatcher collects the body, applies the request
//! timeout, and hands off to the route handlers. The dispatcher holds
//! references to every subsystem; subsystems never reference back.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::audit::{spawn_audit_sweep_task, AuditConfig, AuditLog};
use crate::chain::ChainSnapshot;
use crate::config::Args;
use crate::context::ContextEngine;
use crate::mempool::TieredMempool;
use crate::reference::Directory;
use crate::routes;
use crate::storage::FileStore;
use crate::transactions::TransactionStore;
use crate::types::{LedgerError, Result};
use crate::wallet::{
    spawn_nonce_sweep_task, NonceStore, RegisterWallet, WalletAuthService, WalletFamily,
    WalletRegistry,
};

const NONCE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const AUDIT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub prefix: String,
    pub storage: FileStore,
    pub context: ContextEngine,
    pub mempool: Arc<TieredMempool>,
    pub audit: Arc<AuditLog>,
    pub registry: Arc<WalletRegistry>,
    pub nonces: Arc<NonceStore>,
    pub auth: WalletAuthService,
    pub transactions: Arc<TransactionStore>,
    pub directory: Arc<Directory>,
    pub chain: ChainSnapshot,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every subsystem from durable state under the data root.
    pub async fn bootstrap(args: Args) -> Result<Self> {
        let storage = FileStore::open(&args.data_root).await?;

        let mempool = Arc::new(TieredMempool::load(storage.clone()).await?);
        let audit = Arc::new(
            AuditLog::open(
                storage.clone(),
                AuditConfig {
                    retention_days: args.audit_retention_days,
                    max_log_bytes: args.audit_log_max_bytes,
                },
            )
            .await?,
        );
        let registry = Arc::new(WalletRegistry::load(storage.clone()).await?);
        let nonces = Arc::new(NonceStore::load(storage.clone()).await?);
        let transactions = Arc::new(TransactionStore::load(storage.clone()).await?);
        let directory = Arc::new(Directory::load(&storage).await?);
        let chain = ChainSnapshot::load(&storage).await?;

        let auth = WalletAuthService::new(
            Arc::clone(&registry),
            Arc::clone(&nonces),
            args.network_id.clone(),
            args.wallet_nonce_ttl_seconds,
        );

        // Optional demo bootstrap: materialize one external-signer wallet so
        // a fresh deployment has a known actor.
        if let Some(ref address) = args.demo_external_signer_address {
            registry
                .register(RegisterWallet {
                    address: address.clone(),
                    family: WalletFamily::ExternalSigner,
                    label: Some("demo signer".to_string()),
                    public_key: None,
                    metadata: serde_json::Map::new(),
                })
                .await?;
        }

        Ok(Self {
            prefix: args.api_prefix(),
            storage,
            context: ContextEngine::new(),
            mempool,
            audit,
            registry,
            nonces,
            auth,
            transactions,
            directory,
            chain,
            started_at: Instant::now(),
            args,
        })
    }

    /// Start the background sweeps (nonce expiry, audit retention/rotation).
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        spawn_nonce_sweep_task(Arc::clone(&self.nonces), NONCE_SWEEP_INTERVAL);
        if self.args.audit_retention_days > 0 {
            spawn_audit_sweep_task(Arc::clone(&self.audit), AUDIT_SWEEP_INTERVAL);
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.args.host, state.args.port)
        .parse()
        .map_err(|e| LedgerError::Config(format!("invalid listen address: {}", e)))?;
    let listener = TcpListener::bind(addr).await?;

    info!(
        "CAMTC ledger listening on {} (api prefix: {})",
        addr,
        if state.prefix.is_empty() { "/" } else { state.prefix.as_str() }
    );

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, peer, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    let remote_ip = Some(peer.ip());

    info!("[{}] {} {}", peer, method, path);

    if method == Method::OPTIONS {
        return Ok(routes::preflight());
    }

    // Collect the body up front; all bodies on this surface are small JSON.
    let body = req.collect().await?.to_bytes();

    let timeout = Duration::from_millis(state.args.request_timeout_ms);
    let response = match tokio::time::timeout(
        timeout,
        dispatch(&state, &method, &path, query.as_deref(), &body, remote_ip),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => {
            warn!("[{}] {} {} timed out after {:?}", peer, method, path, timeout);
            routes::error_response(&LedgerError::Internal("request timed out".into()))
        }
    };

    Ok(response)
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    remote_ip: Option<IpAddr>,
) -> Response<Full<Bytes>> {
    // Everything lives under the configured prefix.
    let Some(rest) = path.strip_prefix(state.prefix.as_str()) else {
        return routes::not_found(path);
    };
    let rest = if rest.is_empty() { "/" } else { rest };

    match (method, rest) {
        (&Method::GET, "/health") => routes::handle_health(state).await,
        (&Method::GET, "/metrics") => routes::handle_metrics(state).await,

        (&Method::GET, p) if p.starts_with("/reference/") => {
            let collection = p.strip_prefix("/reference/").unwrap_or("");
            routes::handle_reference(state, collection).await
        }

        (&Method::GET, "/transactions") => {
            routes::handle_list_transactions(state, query).await
        }
        (&Method::POST, "/transactions") => {
            routes::handle_submit_transaction(state, body, remote_ip).await
        }

        (&Method::GET, "/audit") => routes::handle_audit_query(state, query).await,
        (&Method::GET, "/audit/export") => routes::handle_audit_export(state, query).await,

        (&Method::POST, "/wallet/challenge") => {
            routes::handle_wallet_challenge(state, body).await
        }
        (&Method::POST, "/wallet/verify") => {
            routes::handle_wallet_verify(state, body, remote_ip).await
        }

        _ => routes::not_found(path),
    }
}

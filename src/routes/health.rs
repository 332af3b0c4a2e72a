//! Health endpoint

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::chain::ChainSnapshot;
use crate::mempool::MempoolStats;
use crate::server::AppState;

use super::json_response;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    network_id: String,
    uptime_seconds: u64,
    timestamp: String,
    chain: ChainSnapshot,
    mempool: MempoolStats,
    wallet_count: usize,
    directory: DirectoryCounts,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryCounts {
    providers: usize,
    patients: usize,
    validators: usize,
}

/// GET /health
pub async fn handle_health(state: &AppState) -> Response<Full<Bytes>> {
    let mempool = state
        .mempool
        .stats(
            state.directory.validators_online(),
            state.directory.validators_total(),
        )
        .await;

    let response = HealthResponse {
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        network_id: state.args.network_id.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
        chain: state.chain.clone(),
        mempool,
        wallet_count: state.registry.count().await,
        directory: DirectoryCounts {
            providers: state.directory.providers.len(),
            patients: state.directory.patients.len(),
            validators: state.directory.validators.len(),
        },
    };

    json_response(StatusCode::OK, &response)
}

//! Metrics endpoint for the operator dashboard
//!
//! Throughput figures derive from the transaction store; block count and
//! network latency are opaque figures read from the collaborator-owned chain
//! snapshot.

use bytes::Bytes;
use chrono::Duration;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::reference::ValidatorInfo;
use crate::server::AppState;

use super::data_response;

const TREND_HOURS: usize = 24;
const TOP_VALIDATORS: usize = 5;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsData {
    validators_active: usize,
    current_tps: f64,
    network_latency: u64,
    total_blocks: u64,
    tps_trend: Vec<f64>,
    transaction_distribution: [usize; 3],
    validator_scores: Vec<ValidatorInfo>,
}

/// GET /metrics
pub async fn handle_metrics(state: &AppState) -> Response<Full<Bytes>> {
    let stats = state.mempool.stats(0, 0).await;
    let last_minute = state.transactions.count_since(Duration::seconds(60)).await;
    let hourly = state.transactions.hourly_counts(TREND_HOURS).await;

    let data = MetricsData {
        validators_active: state.directory.validators_online(),
        current_tps: last_minute as f64 / 60.0,
        network_latency: state.chain.network_latency_ms,
        total_blocks: state.chain.total_blocks,
        tps_trend: hourly.iter().map(|c| *c as f64 / 3600.0).collect(),
        transaction_distribution: stats.tier_sizes,
        validator_scores: state.directory.top_validators(TOP_VALIDATORS),
    };

    data_response(StatusCode::OK, &data)
}

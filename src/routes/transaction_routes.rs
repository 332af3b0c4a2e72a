//! Transaction endpoints: filtered listing and ingestion
//!
//! The write path is the spine of the ledger: resolve the actor, normalize
//! the event, score it against live mempool stats, admit it to the tiered
//! mempool, upsert the durable record, and append one audit entry describing
//! the submission.

use std::net::IpAddr;

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit::{AuditInput, OUTCOME_SUCCESS};
use crate::server::AppState;
use crate::transactions::{
    parse_tier_label, Transaction, TransactionFilter, TransactionRecord, MAX_LIST_LIMIT,
    STATUS_PENDING,
};
use crate::types::{LedgerError, Result};

use super::{data_response, error_response, json_response, parse_query};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub patient_id: Option<String>,
    pub provider: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Priority label: "Tier-1" | "Tier-2" | "Tier-3"
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_type: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// GET /transactions
pub async fn handle_list_transactions(
    state: &AppState,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let params = parse_query(query);

    let tier = match params.get("priority").map(|p| parse_tier_label(p)) {
        Some(Ok(tier)) => Some(tier),
        Some(Err(e)) => return error_response(&e),
        None => None,
    };
    let limit = match params.get("limit").map(|l| l.parse::<usize>()) {
        Some(Ok(limit)) => Some(limit.min(MAX_LIST_LIMIT)),
        Some(Err(_)) => {
            return error_response(&LedgerError::Validation("limit must be a number".into()))
        }
        None => None,
    };

    let filter = TransactionFilter {
        patient_id: params.get("patientId").cloned(),
        record_type: params.get("type").cloned(),
        tier,
        status: params.get("status").cloned(),
        limit,
    };

    let transactions = state.transactions.query(&filter).await;
    let snapshot = state.mempool.snapshot().await;
    let stats = state
        .mempool
        .stats(
            state.directory.validators_online(),
            state.directory.validators_total(),
        )
        .await;

    data_response(
        StatusCode::OK,
        &json!({
            "transactions": transactions,
            "snapshot": snapshot,
            "stats": stats,
        }),
    )
}

/// POST /transactions
pub async fn handle_submit_transaction(
    state: &AppState,
    body: &[u8],
    remote_ip: Option<IpAddr>,
) -> Response<Full<Bytes>> {
    let request: SubmitTransactionRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(&LedgerError::Validation(format!("invalid JSON body: {}", e)))
        }
    };

    match submit(state, request, remote_ip).await {
        Ok(outcome) => json_response(StatusCode::CREATED, &outcome),
        Err(e) => error_response(&e),
    }
}

async fn submit(
    state: &AppState,
    request: SubmitTransactionRequest,
    remote_ip: Option<IpAddr>,
) -> Result<Value> {
    let record_type = require(request.record_type.as_deref(), "type")?.to_string();
    let patient_id = require(request.patient_id.as_deref(), "patientId")?.to_string();
    let provider = require(request.provider.as_deref(), "provider")?.to_string();
    let priority_label = require(request.priority.as_deref(), "priority")?;
    let hint = parse_tier_label(priority_label)?;

    let mut payload = match request.payload {
        None => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(LedgerError::Validation(
                "payload must be a JSON object".into(),
            ))
        }
    };
    payload.insert("patientId".to_string(), json!(patient_id));
    payload.insert("provider".to_string(), json!(provider));
    if let Some(ref provider_id) = request.provider_id {
        payload.insert("providerId".to_string(), json!(provider_id));
    }

    let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    // Read the stats snapshot once for this request; the engine is pure
    // with respect to it.
    let stats = state
        .mempool
        .stats(
            state.directory.validators_online(),
            state.directory.validators_total(),
        )
        .await;
    let breakdown = state.context.score(&record_type, &payload, Some(&stats));

    let transaction = Transaction {
        id: id.clone(),
        record_type: record_type.clone(),
        tier: 0,
        priority: 0.0,
        payload,
        signature: request.signature.unwrap_or_default(),
        created_at: Utc::now().to_rfc3339(),
    };

    let admission = state
        .mempool
        .add(transaction, breakdown, Some(hint))
        .await?;

    let record = TransactionRecord {
        transaction: admission.entry.transaction.clone(),
        status: request.status.unwrap_or_else(|| STATUS_PENDING.to_string()),
        block_hash: None,
    };
    state.transactions.upsert(record.clone()).await?;

    let mut metadata = serde_json::Map::new();
    metadata.insert("tier".to_string(), json!(admission.tier));
    metadata.insert("priority".to_string(), json!(breakdown.priority));
    metadata.insert("type".to_string(), json!(record_type));
    state
        .audit
        .record(AuditInput {
            action: "transaction.submitted".to_string(),
            actor_id: request.actor_id.unwrap_or_else(|| "system".to_string()),
            actor_type: request.actor_type.unwrap_or_else(|| "system".to_string()),
            resource: format!("transaction/{}", id),
            outcome: OUTCOME_SUCCESS.to_string(),
            patient_id: Some(patient_id),
            ip_address: remote_ip.map(|ip| ip.to_string()),
            details: request.details,
            metadata,
            tags: vec!["transaction".to_string()],
            channel: Some("api".to_string()),
            ..AuditInput::default()
        })
        .await?;

    let stats = state
        .mempool
        .stats(
            state.directory.validators_online(),
            state.directory.validators_total(),
        )
        .await;

    let mut data = json!({
        "transaction": record,
        "breakdown": breakdown,
        "tier": admission.tier,
    });
    if let Some(evicted) = admission.evicted {
        data["evicted"] = serde_json::to_value(evicted)?;
    }

    Ok(json!({ "data": data, "stats": stats }))
}

fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LedgerError::Validation(format!(
            "missing required field '{}'",
            field
        ))),
    }
}

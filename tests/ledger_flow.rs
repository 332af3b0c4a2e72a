//! End-to-end flows through the route layer: ingestion, audit trail,
//! wallet challenge/verify, and the read surfaces.

use std::sync::Arc;

use clap::Parser;
use http_body_util::BodyExt;
use hyper::StatusCode;
use serde_json::{json, Value};

use camtc_ledger::audit::{AuditInput, AuditQuery, OUTCOME_SUCCESS};
use camtc_ledger::config::Args;
use camtc_ledger::routes;
use camtc_ledger::server::AppState;
use camtc_ledger::wallet::verifier::{ethereum_address, personal_sign_digest};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

async fn state(dir: &tempfile::TempDir) -> Arc<AppState> {
    let mut args = Args::parse_from(["camtc-ledger"]);
    args.data_root = dir.path().to_path_buf();
    args.network_id = "camtc-testnet".to_string();
    Arc::new(AppState::bootstrap(args).await.unwrap())
}

async fn body_json(response: hyper::Response<http_body_util::Full<bytes::Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn eth_sign(key: &SigningKey, message: &str) -> String {
    let (sig, recovery_id) = key
        .sign_digest_recoverable(personal_sign_digest(message))
        .unwrap();
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(27 + recovery_id.to_byte());
    format!("0x{}", hex::encode(bytes))
}

#[tokio::test]
async fn test_submit_transaction_flow() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(&dir).await;

    let request = json!({
        "type": "Emergency Record",
        "patientId": "PAT-001",
        "provider": "Dr. Osei",
        "priority": "Tier-1",
        "payload": {
            "chiefComplaint": "Cardiac Arrest, stat",
            "severity": "Cardiac Arrest"
        },
        "actorId": "0xclinician",
        "actorType": "clinician",
        "details": "ER admission"
    });
    let response = routes::handle_submit_transaction(
        &state,
        serde_json::to_vec(&request).unwrap().as_slice(),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let breakdown = &body["data"]["breakdown"];
    assert!((breakdown["criticality"].as_f64().unwrap() - 0.95).abs() < 1e-9);
    assert!((breakdown["sensitivity"].as_f64().unwrap() - 0.95).abs() < 1e-9);
    // Empty mempool with no validators: resources = 0.20 + 0.60 - 0 = 0.80,
    // which lifts the aggregate to the tier-1 threshold.
    assert!((breakdown["resources"].as_f64().unwrap() - 0.80).abs() < 1e-9);
    assert!((breakdown["priority"].as_f64().unwrap() - 0.85).abs() < 1e-9);
    assert_eq!(body["data"]["tier"], 1);
    assert_eq!(body["data"]["transaction"]["status"], "pending");
    assert_eq!(
        body["data"]["transaction"]["payload"]["patientId"],
        "PAT-001"
    );
    assert_eq!(body["stats"]["tierSizes"][0], 1);

    // The submission is on the audit trail.
    let audit = routes::handle_audit_query(&state, Some("action=transaction.submitted")).await;
    let audit_body = body_json(audit).await;
    assert_eq!(audit_body["data"]["totalMatches"], 1);
    let entry = &audit_body["data"]["entries"][0];
    assert_eq!(entry["sequence"], 1);
    assert_eq!(entry["prevHash"], "AUDIT_ROOT");
    assert_eq!(entry["actorId"], "0xclinician");
    assert_eq!(entry["patientId"], "PAT-001");
    assert_eq!(entry["channel"], "api");

    // And on the read surface, filtered by patient.
    let list =
        routes::handle_list_transactions(&state, Some("patientId=PAT-001&priority=Tier-1")).await;
    let list_body = body_json(list).await;
    assert_eq!(list_body["data"]["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(&dir).await;

    // Missing type
    let response = routes::handle_submit_transaction(
        &state,
        serde_json::to_vec(&json!({
            "patientId": "PAT-001",
            "provider": "Dr. Osei",
            "priority": "Tier-2"
        }))
        .unwrap()
        .as_slice(),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("'type'"));

    // Malformed priority label
    let response = routes::handle_submit_transaction(
        &state,
        serde_json::to_vec(&json!({
            "type": "Lab Result",
            "patientId": "PAT-001",
            "provider": "Dr. Osei",
            "priority": "Critical"
        }))
        .unwrap()
        .as_slice(),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Non-object payload
    let response = routes::handle_submit_transaction(
        &state,
        serde_json::to_vec(&json!({
            "type": "Lab Result",
            "patientId": "PAT-001",
            "provider": "Dr. Osei",
            "priority": "Tier-3",
            "payload": ["not", "an", "object"]
        }))
        .unwrap()
        .as_slice(),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the audit chain or the mempool.
    let audit = body_json(routes::handle_audit_query(&state, None).await).await;
    assert_eq!(audit["data"]["totalMatches"], 0);
}

#[tokio::test]
async fn test_wallet_challenge_verify_over_routes() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(&dir).await;

    let key = SigningKey::random(&mut OsRng);
    let address = ethereum_address(key.verifying_key());

    let challenge = body_json(
        routes::handle_wallet_challenge(
            &state,
            serde_json::to_vec(&json!({ "address": address })).unwrap().as_slice(),
        )
        .await,
    )
    .await;
    let message = challenge["data"]["message"].as_str().unwrap().to_string();
    let nonce = challenge["data"]["nonce"].as_str().unwrap();
    assert!(nonce.starts_with("CAMTC-"));
    assert!(message.contains("Sign this message to authenticate"));

    let signature = eth_sign(&key, &message);
    let verify = routes::handle_wallet_verify(
        &state,
        serde_json::to_vec(&json!({ "address": address, "signature": signature }))
            .unwrap()
            .as_slice(),
        None,
    )
    .await;
    assert_eq!(verify.status(), StatusCode::OK);
    let verified = body_json(verify).await;
    assert_eq!(verified["data"]["success"], true);
    assert_eq!(verified["data"]["sessionToken"].as_str().unwrap().len(), 64);
    assert_eq!(verified["data"]["proof"].as_str().unwrap().len(), 64);

    // Replay fails and both attempts are audited.
    let replay = routes::handle_wallet_verify(
        &state,
        serde_json::to_vec(&json!({ "address": address, "signature": signature }))
            .unwrap()
            .as_slice(),
        None,
    )
    .await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

    let audit = body_json(routes::handle_audit_query(&state, Some("action=wallet.verify")).await)
        .await;
    assert_eq!(audit["data"]["totalMatches"], 2);
    let outcomes: Vec<&str> = audit["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["outcome"].as_str().unwrap())
        .collect();
    assert!(outcomes.contains(&"success"));
    assert!(outcomes.contains(&"failed"));
}

#[tokio::test]
async fn test_audit_roundtrip_is_field_identical() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(&dir).await;

    let recorded = state
        .audit
        .record(AuditInput {
            action: "registry.status".to_string(),
            actor_id: "operator-1".to_string(),
            actor_type: "operator".to_string(),
            resource: "wallet/0xabc".to_string(),
            outcome: OUTCOME_SUCCESS.to_string(),
            details: Some("suspended pending review".to_string()),
            tags: vec!["registry".to_string()],
            ..AuditInput::default()
        })
        .await
        .unwrap();

    let result = state
        .audit
        .query(&AuditQuery {
            action: Some("registry.status".to_string()),
            ..AuditQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total_matches, 1);
    assert_eq!(result.entries[0], recorded);
}

#[tokio::test]
async fn test_audit_export_csv() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(&dir).await;

    state
        .audit
        .record(AuditInput {
            action: "node.start".to_string(),
            actor_id: "system".to_string(),
            actor_type: "system".to_string(),
            resource: "ledger".to_string(),
            outcome: OUTCOME_SUCCESS.to_string(),
            ..AuditInput::default()
        })
        .await
        .unwrap();

    let response = routes::handle_audit_export(&state, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("Content-Type").unwrap(),
        "text/csv"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "sequence,id,timestamp,action,actorId,actorType,resource,outcome,patientId,ipAddress,blockHash,channel,tags,details"
    );
    assert!(lines.next().unwrap().starts_with("1,"));
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(&dir).await;

    let health = body_json(routes::handle_health(&state).await).await;
    assert_eq!(health["status"], "online");
    assert_eq!(health["networkId"], "camtc-testnet");
    assert_eq!(health["walletCount"], 0);
    assert_eq!(health["mempool"]["totalCapacity"], 10100);
    assert_eq!(health["chain"]["totalBlocks"], 0);

    let metrics = body_json(routes::handle_metrics(&state).await).await;
    assert_eq!(metrics["data"]["tpsTrend"].as_array().unwrap().len(), 24);
    assert_eq!(
        metrics["data"]["transactionDistribution"].as_array().unwrap().len(),
        3
    );
    assert_eq!(metrics["data"]["totalBlocks"], 0);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let state = state(&dir).await;
        let request = json!({
            "type": "Lab Result",
            "patientId": "PAT-002",
            "provider": "Dr. Chen",
            "priority": "Tier-3",
            "payload": { "testType": "CBC", "notes": "routine" }
        });
        let response = routes::handle_submit_transaction(
            &state,
            serde_json::to_vec(&request).unwrap().as_slice(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // A fresh process over the same data root sees the durable state.
    let state = state(&dir).await;
    assert_eq!(state.mempool.stats(0, 0).await.tier_sizes[2], 1);

    let audit = body_json(routes::handle_audit_query(&state, None).await).await;
    assert_eq!(audit["data"]["totalMatches"], 1);

    // The chain continues where it left off.
    let next = state
        .audit
        .record(AuditInput {
            action: "node.start".to_string(),
            actor_id: "system".to_string(),
            actor_type: "system".to_string(),
            resource: "ledger".to_string(),
            outcome: OUTCOME_SUCCESS.to_string(),
            ..AuditInput::default()
        })
        .await
        .unwrap();
    assert_eq!(next.sequence, 2);
    assert_ne!(next.prev_hash, "AUDIT_ROOT");
}

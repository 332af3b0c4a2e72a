//! Wallet challenge and verification endpoints
//!
//! Verification attempts, successful or not, are recorded on the audit
//! trail by this layer; the auth service itself never touches the chain.

use std::net::IpAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::audit::{AuditInput, OUTCOME_FAILED, OUTCOME_SUCCESS};
use crate::server::AppState;
use crate::types::LedgerError;
use crate::wallet::{ChallengeOptions, WalletFamily};

use super::{data_response, error_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub address: Option<String>,
    /// Wallet family: "external-signer" (default) or "custom-keypair"
    #[serde(rename = "type")]
    pub family: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub custom_public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub address: Option<String>,
    pub signature: Option<String>,
}

/// POST /wallet/challenge
pub async fn handle_wallet_challenge(state: &AppState, body: &[u8]) -> Response<Full<Bytes>> {
    let request: ChallengeRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(&LedgerError::Validation(format!("invalid JSON body: {}", e)))
        }
    };
    let Some(address) = request.address.filter(|a| !a.trim().is_empty()) else {
        return error_response(&LedgerError::Validation(
            "missing required field 'address'".into(),
        ));
    };

    let family = match request.family.as_deref() {
        None => None,
        Some(raw) => match WalletFamily::parse(raw) {
            Some(family) => Some(family),
            None => {
                return error_response(&LedgerError::Validation(format!(
                    "unknown wallet type '{}'",
                    raw
                )))
            }
        },
    };

    let options = ChallengeOptions {
        family,
        label: request.label,
        metadata: request.metadata,
        public_key: request.custom_public_key,
        context: None,
    };

    match state.auth.issue_nonce(&address, options).await {
        Ok(challenge) => data_response(StatusCode::OK, &challenge),
        Err(e) => error_response(&e),
    }
}

/// POST /wallet/verify
pub async fn handle_wallet_verify(
    state: &AppState,
    body: &[u8],
    remote_ip: Option<IpAddr>,
) -> Response<Full<Bytes>> {
    let request: VerifyRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(&LedgerError::Validation(format!("invalid JSON body: {}", e)))
        }
    };
    let Some(address) = request.address.filter(|a| !a.trim().is_empty()) else {
        return error_response(&LedgerError::Validation(
            "missing required field 'address'".into(),
        ));
    };
    let Some(signature) = request.signature.filter(|s| !s.trim().is_empty()) else {
        return error_response(&LedgerError::Validation(
            "missing required field 'signature'".into(),
        ));
    };

    match state.auth.verify(&address, &signature).await {
        Ok(session) => {
            record_attempt(
                state,
                &session.wallet.id,
                &address,
                OUTCOME_SUCCESS,
                None,
                remote_ip,
            )
            .await;
            data_response(
                StatusCode::OK,
                &json!({
                    "success": true,
                    "wallet": session.wallet,
                    "verifiedAt": session.verified_at,
                    "sessionToken": session.session_token,
                    "proof": session.proof,
                }),
            )
        }
        Err(e) => {
            record_attempt(state, &address, &address, OUTCOME_FAILED, Some(&e), remote_ip).await;
            error_response(&e)
        }
    }
}

async fn record_attempt(
    state: &AppState,
    actor_id: &str,
    address: &str,
    outcome: &str,
    error: Option<&LedgerError>,
    remote_ip: Option<IpAddr>,
) {
    let result = state
        .audit
        .record(AuditInput {
            action: "wallet.verify".to_string(),
            actor_id: actor_id.to_string(),
            actor_type: "wallet".to_string(),
            resource: format!("wallet/{}", address.trim().to_lowercase()),
            outcome: outcome.to_string(),
            details: error.map(|e| e.to_string()),
            tags: vec!["auth".to_string()],
            channel: Some("api".to_string()),
            ip_address: remote_ip.map(|ip| ip.to_string()),
            ..AuditInput::default()
        })
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to audit wallet verification attempt");
    }
}

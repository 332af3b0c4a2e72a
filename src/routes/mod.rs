//! HTTP routes for the ledger API
//!
//! Handlers are thin adapters: parse the request, call the owning
//! subsystem, render the JSON envelope. Success payloads ride under
//! `{"data": ...}`; failures render as `{"error": {"message": ...}}` with
//! the status the error kind maps to.

pub mod audit_routes;
pub mod health;
pub mod metrics;
pub mod reference_routes;
pub mod transaction_routes;
pub mod wallet_routes;

use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::LedgerError;

pub use audit_routes::{handle_audit_export, handle_audit_query};
pub use health::handle_health;
pub use metrics::handle_metrics;
pub use reference_routes::handle_reference;
pub use transaction_routes::{handle_list_transactions, handle_submit_transaction};
pub use wallet_routes::{handle_wallet_challenge, handle_wallet_verify};

/// Serialize a value as a JSON response with CORS headers.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"error":{"message":"serialization failed"}}"#.to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Success envelope: `{"data": ...}`.
pub fn data_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "data": value }))
}

/// Failure envelope: `{"error": {"message": ...}}`.
pub fn error_response(err: &LedgerError) -> Response<Full<Bytes>> {
    json_response(
        err.status_code(),
        &serde_json::json!({ "error": { "message": err.to_string() } }),
    )
}

pub fn not_found(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": { "message": format!("no route for {}", path) } }),
    )
}

/// CORS preflight response.
pub fn preflight() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Split a query string into decoded key/value pairs.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        params.insert(percent_decode(key), percent_decode(value));
    }
    params
}

/// Minimal application/x-www-form-urlencoded decoding: `+` and `%XX`.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        out.push((h * 16 + l) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

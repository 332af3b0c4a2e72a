//! Audit trail endpoints: filtered query and CSV export

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::audit::{AuditQuery, Direction};
use crate::server::AppState;
use crate::types::LedgerError;

use super::{data_response, error_response, parse_query};

fn build_query(query: Option<&str>) -> Result<AuditQuery, LedgerError> {
    let params = parse_query(query);

    let direction = match params.get("direction") {
        None => Direction::default(),
        Some(raw) => Direction::parse(raw).ok_or_else(|| {
            LedgerError::Validation("direction must be 'asc' or 'desc'".into())
        })?,
    };
    let limit = match params.get("limit") {
        None => None,
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| LedgerError::Validation("limit must be a number".into()))?,
        ),
    };
    let cursor = match params.get("cursor") {
        None => None,
        Some(raw) => Some(
            raw.parse::<u64>()
                .map_err(|_| LedgerError::Validation("cursor must be a sequence number".into()))?,
        ),
    };
    let tags = params
        .get("tags")
        .map(|csv| {
            csv.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(AuditQuery {
        actor_id: params.get("actorId").cloned(),
        actor_type: params.get("actorType").cloned(),
        patient_id: params.get("patientId").cloned(),
        resource: params.get("resource").cloned(),
        action: params.get("action").cloned(),
        outcome: params.get("outcome").cloned(),
        from: params.get("from").cloned(),
        to: params.get("to").cloned(),
        search: params.get("search").cloned(),
        tags,
        limit,
        cursor,
        direction,
    })
}

/// GET /audit
pub async fn handle_audit_query(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    let audit_query = match build_query(query) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };
    match state.audit.query(&audit_query).await {
        Ok(result) => data_response(StatusCode::OK, &result),
        Err(e) => error_response(&e),
    }
}

/// GET /audit/export
pub async fn handle_audit_export(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    let audit_query = match build_query(query) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };
    match state.audit.export_csv(&audit_query).await {
        Ok(csv) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/csv")
            .header(
                "Content-Disposition",
                "attachment; filename=\"audit-export.csv\"",
            )
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(csv)))
            .unwrap(),
        Err(e) => error_response(&e),
    }
}

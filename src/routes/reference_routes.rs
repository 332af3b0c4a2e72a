//! Reference directory endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::server::AppState;

use super::{data_response, not_found};

/// GET /reference/{providers|patients|validators}
pub async fn handle_reference(state: &AppState, collection: &str) -> Response<Full<Bytes>> {
    match collection {
        "providers" => data_response(StatusCode::OK, &state.directory.providers),
        "patients" => data_response(StatusCode::OK, &state.directory.patients),
        "validators" => data_response(StatusCode::OK, &state.directory.validators),
        other => not_found(&format!("/reference/{}", other)),
    }
}

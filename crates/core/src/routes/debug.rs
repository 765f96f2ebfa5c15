use crate::{AppState, policy::APIKEY};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct DebugHeadersResponse {
    headers: Map<String, Value>,
    has_apikey: bool,
    has_authorization: bool,
    authorization_is_bearer: bool,
    has_content_type: bool,
    upstream: String,
}

/// Echo the received headers back, with repeated headers collected into arrays.
pub async fn debug_headers_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<DebugHeadersResponse> {
    let mut echoed = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        echoed.insert(name.as_str().to_owned(), value);
    }

    let authorization_is_bearer = headers
        .get(header::AUTHORIZATION)
        .map(|v| v.as_bytes().starts_with(b"Bearer "))
        .unwrap_or(false);

    Json(DebugHeadersResponse {
        has_apikey: headers.contains_key(&APIKEY),
        has_authorization: headers.contains_key(header::AUTHORIZATION),
        authorization_is_bearer,
        has_content_type: headers.contains_key(header::CONTENT_TYPE),
        upstream: state.settings.upstream_settings.url.to_string(),
        headers: echoed,
    })
}

use crate::{AppState, error::ProxyError, forward::OutboundRequest};
use axum::{
    body::to_bytes,
    extract::{Request, State},
    response::Response,
};
use std::sync::Arc;

/// Forward any request that did not match an administrative route to the upstream.
///
/// Exactly one upstream request is made. Every failure along the way is answered with
/// the proxy error envelope instead of being propagated.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let payload = to_bytes(body, state.settings.max_body_size)
        .await
        .map_err(ProxyError::InboundBody)?;

    OutboundRequest::build(
        &state.settings.upstream_settings.url,
        &state.header_policy,
        parts.method.clone(),
        path_and_query,
        &parts.headers,
        payload,
    )?
    .dispatch(&state.client, state.settings.upstream_settings.request_timeout)
    .await
}

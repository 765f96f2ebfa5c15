use crate::{error::ProxyError, http_client::HttpClient, policy};
use axum::{
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, Uri},
    response::Response,
};
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A fully built request to the upstream, constructed without any I/O.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Append the inbound path and query to the upstream origin without touching either.
///
/// The result is only checked for URI syntax. Dot segments, repeated slashes and
/// percent-escapes reach the upstream exactly as the client sent them.
pub fn target_uri(upstream: &Url, path_and_query: &str) -> Result<Uri, ProxyError> {
    let base = upstream.as_str().trim_end_matches('/');
    Ok(format!("{base}{path_and_query}").parse::<Uri>()?)
}

fn method_has_body(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD && *method != Method::OPTIONS
}

/// The body to send upstream for `payload` received with `method`.
///
/// JSON payloads are re-serialized, anything that does not parse as JSON is passed along
/// untouched for the upstream to judge. Numbers keep their exact textual form.
pub fn outbound_body(method: &Method, payload: Bytes) -> Result<Option<Bytes>, ProxyError> {
    if !method_has_body(method) || payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<serde_json::Value>(&payload) {
        Ok(value) => Ok(Some(Bytes::from(serde_json::to_vec(&value)?))),
        Err(err) => {
            debug!("Request body is not valid JSON ({err}), forwarding raw bytes");
            Ok(Some(payload))
        }
    }
}

impl OutboundRequest {
    pub fn build(
        upstream: &Url,
        header_policy: &policy::HeaderPolicy,
        method: Method,
        path_and_query: &str,
        inbound_headers: &HeaderMap,
        payload: Bytes,
    ) -> Result<Self, ProxyError> {
        Ok(Self {
            uri: target_uri(upstream, path_and_query)?,
            headers: header_policy.outbound_headers(inbound_headers),
            body: outbound_body(&method, payload)?,
            method,
        })
    }

    /// Send the request once and relay the upstream response, whatever its status.
    ///
    /// `timeout` bounds the whole exchange, including reading the response body.
    pub async fn dispatch(
        self,
        client: &HttpClient,
        timeout: Option<Duration>,
    ) -> Result<Response, ProxyError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(client))
                .await
                .map_err(|_| ProxyError::Timeout(limit))?,
            None => self.exchange(client).await,
        }
    }

    async fn exchange(self, client: &HttpClient) -> Result<Response, ProxyError> {
        debug!("Forwarding {} {}", self.method, self.uri);
        let mut request = Request::new(self.body.map_or_else(Body::empty, Body::from));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;

        let (parts, body) = client
            .request(request)
            .await
            .map_err(ProxyError::Upstream)?
            .into_parts();
        let body = to_bytes(Body::new(body), usize::MAX)
            .await
            .map_err(ProxyError::UpstreamBody)?;
        debug!("Upstream responded with {} ({} bytes)", parts.status, body.len());

        let mut headers = HeaderMap::new();
        policy::relay_response_headers(&parts.headers, &mut headers);
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::{any::Any, error::Error as StdError, time::Duration};
use thiserror::Error;
use tracing::{error, warn};

/// Value of the `error` field of every proxy failure envelope.
pub const PROXY_FAILED: &str = "Proxy failed";

/// A failure that prevented an upstream response from being relayed.
///
/// Statuses returned by the upstream are never represented here, those are relayed verbatim.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream url")]
    InvalidUrl(#[from] axum::http::uri::InvalidUri),

    #[error("failed to read request body")]
    InboundBody(#[source] axum::Error),

    #[error("failed to serialize request body")]
    SerializeBody(#[from] serde_json::Error),

    #[error("failed to send request to upstream")]
    Upstream(#[source] hyper_util::client::legacy::Error),

    #[error("failed to read response body from upstream")]
    UpstreamBody(#[source] axum::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("request handler panicked: {0}")]
    Panic(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    error: &'static str,
    details: String,
    timestamp: String,
}

impl ErrorEnvelope {
    fn new(details: String) -> Self {
        Self {
            error: PROXY_FAILED,
            details,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl ProxyError {
    /// The error message followed by every underlying cause, separated by `: `.
    pub fn details(&self) -> String {
        let mut details = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            details.push_str(": ");
            details.push_str(&cause.to_string());
            source = cause.source();
        }
        details
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let details = self.details();
        warn!("Proxying failed: {details}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorEnvelope::new(details)),
        )
            .into_response()
    }
}

/// Turns a panic caught while handling a request into the regular failure envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_owned()
    };
    error!("Request handler panicked: {message}");
    ProxyError::Panic(message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn envelope_of(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn details_include_the_cause_chain() {
        let err = ProxyError::from("http://bad host/".parse::<axum::http::Uri>().unwrap_err());
        assert_eq!(err.details(), "invalid upstream url: invalid uri character");
    }

    #[test]
    fn timeout_names_the_limit() {
        assert_eq!(
            ProxyError::Timeout(Duration::from_millis(250)).details(),
            "upstream did not respond within 250ms"
        );
    }

    #[tokio::test]
    async fn envelope_has_fixed_shape() {
        let response = ProxyError::Panic("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let envelope = envelope_of(response).await;
        assert_eq!(envelope["error"], PROXY_FAILED);
        assert_eq!(envelope["details"], "request handler panicked: boom");
        let timestamp = envelope["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn panic_payloads_are_reported() {
        let response = panic_response(Box::new("static message"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            envelope_of(response).await["details"],
            "request handler panicked: static message"
        );

        let response = panic_response(Box::new(42_u8));
        assert_eq!(
            envelope_of(response).await["details"],
            "request handler panicked: unknown panic payload"
        );
    }
}

use crate::{AppState, CorsSettings};
use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use core::{fmt, str::FromStr};
use std::sync::Arc;
use tracing::debug;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, apikey";

/// How the `Access-Control-Allow-Origin` header is chosen.
///
/// Browsers reject a wildcard origin on credentialed requests, so [`AllowOriginPolicy::Mirror`]
/// echoes the caller's `Origin` back whenever one is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllowOriginPolicy {
    /// Reflect the request's `Origin` header, or `*` when it has none.
    #[default]
    Mirror,
    /// Always send `*`.
    Wildcard,
}

impl FromStr for AllowOriginPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirror" => Ok(Self::Mirror),
            "wildcard" | "*" => Ok(Self::Wildcard),
            other => Err(format!(
                "unknown allow-origin policy '{other}', expected 'mirror' or 'wildcard'"
            )),
        }
    }
}

impl fmt::Display for AllowOriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mirror => f.write_str("mirror"),
            Self::Wildcard => f.write_str("wildcard"),
        }
    }
}

/// Pre-rendered CORS header values applied to every response.
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    allow_origin: AllowOriginPolicy,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
}

impl CorsHeaders {
    /// Prepare the header values once. Configured extra header names are trimmed, empty
    /// entries skipped, and the rest appended to the fixed allow-headers list with `, `.
    pub fn new(settings: &CorsSettings) -> Result<Self> {
        let allow_headers = std::iter::once(ALLOW_HEADERS)
            .chain(
                settings
                    .extra_allowed_headers
                    .iter()
                    .map(|h| h.trim())
                    .filter(|h| !h.is_empty()),
            )
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Self {
            allow_origin: settings.allow_origin,
            allow_methods: HeaderValue::from_static(ALLOW_METHODS),
            allow_headers: HeaderValue::from_str(&allow_headers)?,
        })
    }

    /// Set the CORS headers on `headers` for a request that carried `origin`.
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        let allow_origin = match (self.allow_origin, origin) {
            (AllowOriginPolicy::Mirror, Some(origin)) => {
                headers.append(header::VARY, HeaderValue::from_static("Origin"));
                origin.clone()
            }
            _ => HeaderValue::from_static("*"),
        };
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
}

/// Answers every `OPTIONS` request itself and attaches CORS headers to all other responses,
/// including failures.
pub async fn cors_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = if request.method() == Method::OPTIONS {
        debug!("Answering preflight for {} locally", request.uri());
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    state
        .cors_headers
        .apply(origin.as_ref(), response.headers_mut());
    response
}

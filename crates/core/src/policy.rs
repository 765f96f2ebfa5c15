//! Header allow-lists for both directions of the proxy.
//!
//! Inbound headers are only ever forwarded when they have an entry in the forwarding
//! table. Upstream response headers are only ever relayed when they are named in
//! [`RELAYED_RESPONSE_HEADERS`]. Anything else is dropped, which keeps client transport
//! headers such as `host`, `connection` or `content-length` away from the rebuilt request.

use anyhow::{Result, bail};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

/// Headers forwarded by default on top of `apikey`, `authorization` and `content-type`.
///
/// These are the client identification and query-shaping headers sent by the upstream's SDKs.
pub const DEFAULT_FORWARDED_HEADERS: &[&str] = &[
    "x-client-info",
    "accept",
    "accept-profile",
    "content-profile",
    "prefer",
    "range",
    "range-unit",
];

pub const APIKEY: HeaderName = HeaderName::from_static("apikey");

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Upstream response headers that are relayed to the client when present.
pub const RELAYED_RESPONSE_HEADERS: [HeaderName; 8] = [
    header::CONTENT_TYPE,
    header::CONTENT_RANGE,
    header::RANGE,
    header::CACHE_CONTROL,
    HeaderName::from_static("x-ratelimit-limit"),
    HeaderName::from_static("x-ratelimit-remaining"),
    HeaderName::from_static("x-ratelimit-reset"),
    header::RETRY_AFTER,
];

// Describe the connection to the proxy rather than to the upstream.
const UNFORWARDABLE_HEADERS: [HeaderName; 7] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum ForwardRule {
    /// Copy every value of the header byte-for-byte, send nothing when absent.
    Verbatim,
    /// Copy every value of the header byte-for-byte, send the fallback when absent.
    VerbatimOr(HeaderValue),
}

/// The inbound header forwarding table.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    rules: Box<[(HeaderName, ForwardRule)]>,
}

impl HeaderPolicy {
    /// Build the forwarding table.
    ///
    /// `apikey` is used when the client sends no `apikey` of its own. Fails when a
    /// forwarded header name is invalid or describes the client's own connection.
    pub fn new(apikey: Option<&str>, forwarded_headers: &[String]) -> Result<Self> {
        let apikey_rule = match apikey {
            Some(key) => ForwardRule::VerbatimOr(HeaderValue::from_str(key)?),
            None => ForwardRule::Verbatim,
        };
        let mut rules = vec![
            (APIKEY, apikey_rule),
            (header::AUTHORIZATION, ForwardRule::Verbatim),
            (
                header::CONTENT_TYPE,
                ForwardRule::VerbatimOr(HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
            ),
        ];

        for name in forwarded_headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())?;
            if UNFORWARDABLE_HEADERS.contains(&name) {
                bail!("refusing to forward connection header '{name}' to the upstream");
            }
            if rules.iter().any(|(existing, _)| *existing == name) {
                continue;
            }
            rules.push((name, ForwardRule::Verbatim));
        }

        Ok(Self {
            rules: rules.into_boxed_slice(),
        })
    }

    /// The header set to send upstream for a request carrying `inbound`.
    pub fn outbound_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut outbound = HeaderMap::with_capacity(self.rules.len());
        for (name, rule) in self.rules.iter() {
            let mut present = false;
            for value in inbound.get_all(name) {
                outbound.append(name.clone(), value.clone());
                present = true;
            }
            if let (false, ForwardRule::VerbatimOr(fallback)) = (present, rule) {
                outbound.insert(name.clone(), fallback.clone());
            }
        }
        outbound
    }
}

/// Copy the allow-listed headers of an upstream response onto the client response.
pub fn relay_response_headers(upstream: &HeaderMap, client: &mut HeaderMap) {
    for name in RELAYED_RESPONSE_HEADERS {
        for value in upstream.get_all(&name) {
            client.append(name.clone(), value.clone());
        }
    }
}

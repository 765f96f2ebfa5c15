use axum::body::Body;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};

#[cfg(feature = "rustls-tls")]
type Connector = hyper_rustls::HttpsConnector<HttpConnector>;

#[cfg(not(feature = "rustls-tls"))]
type Connector = HttpConnector;

/// Connection-pooled upstream client.
///
/// Requests go out with exactly the URI and headers they were built with. Only `host`
/// and, for requests carrying a body, `content-length` are added by the transport.
pub type HttpClient = Client<Connector, Body>;

#[cfg(feature = "rustls-tls")]
fn connector() -> Connector {
    hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build()
}

#[cfg(not(feature = "rustls-tls"))]
fn connector() -> Connector {
    HttpConnector::new()
}

/// Create a new [`HttpClient`].
pub fn build_http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(connector())
}

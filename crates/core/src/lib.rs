//! Crate for Restgate, a transparent reverse proxy for a single REST upstream.
//!
//! Every inbound request that is not an administrative route is rebuilt against the
//! configured upstream origin with the exact same path and query, a fixed allow-list of
//! request headers and a method-appropriate body. The upstream status, body and an
//! allow-list of response headers are relayed back verbatim.

pub extern crate url;

mod cors;
mod error;
mod forward;
mod http_client;
mod policy;
mod routes;

pub use cors::AllowOriginPolicy;
pub use policy::DEFAULT_FORWARDED_HEADERS;

use anyhow::Result;
use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::get,
};
use core::{net::SocketAddr, time::Duration};
use cors::CorsHeaders;
use http_client::{HttpClient, build_http_client};
use policy::HeaderPolicy;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{self, TraceLayer},
};
use tracing::{Level, info};
use url::Url;

/// # Example
/// ```rust,no_run
/// use std::net::{SocketAddr, IpAddr, Ipv4Addr};
/// use restgate::{Server, ServerSettings, url::Url};
///
/// # #[tokio::main]
/// # async fn main() {
/// let upstream = Url::parse("https://project.example.co").unwrap();
/// let server = Server::new(ServerSettings::new(upstream)).unwrap();
/// server.start(&SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 3000)).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct Server {
    router_inner: Router,
}

/// Settings to run the Restgate server with.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// The largest inbound request body (in bytes) that will be read before the request is failed.
    pub max_body_size: usize,

    /// See [`UpstreamSettings`].
    pub upstream_settings: UpstreamSettings,

    /// See [`CorsSettings`].
    pub cors_settings: CorsSettings,
}

/// Configuration options used when making any call to the upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// The fixed upstream origin. Inbound paths and queries are appended to it verbatim.
    pub url: Url,

    /// API key sent as the `apikey` header when the client did not send one itself.
    ///
    /// The `authorization` header is never filled in on behalf of the client.
    pub apikey: Option<String>,

    /// Headers, in addition to `apikey`, `authorization` and `content-type`, that are passed
    /// from the client to the upstream verbatim if they are present.
    pub forwarded_headers: Box<[String]>,

    /// How long a full upstream exchange may take before the request is considered failed.
    ///
    /// When unset the proxy waits for as long as the upstream keeps the connection open.
    pub request_timeout: Option<Duration>,
}

/// Configuration of the CORS headers attached to every response.
#[derive(Debug, Clone, Default)]
pub struct CorsSettings {
    /// See [`AllowOriginPolicy`].
    pub allow_origin: AllowOriginPolicy,

    /// Header names advertised in `Access-Control-Allow-Headers` on top of
    /// `Content-Type, Authorization, apikey`.
    pub extra_allowed_headers: Box<[String]>,
}

impl ServerSettings {
    /// Settings for proxying to `upstream` with every other option left at its default.
    pub fn new(upstream: Url) -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
            upstream_settings: UpstreamSettings::new(upstream),
            cors_settings: CorsSettings::default(),
        }
    }
}

impl UpstreamSettings {
    /// Upstream settings for `url` using the default forwarded headers and no timeout.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            apikey: None,
            forwarded_headers: DEFAULT_FORWARDED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            request_timeout: None,
        }
    }
}

#[derive(Debug)]
struct AppState {
    client: HttpClient,
    header_policy: HeaderPolicy,
    cors_headers: CorsHeaders,
    settings: ServerSettings,
}

impl Server {
    /// Create a new server with the provided settings.
    pub fn new(settings: ServerSettings) -> Result<Self> {
        let state = Arc::new(AppState {
            client: build_http_client(),
            header_policy: HeaderPolicy::new(
                settings.upstream_settings.apikey.as_deref(),
                &settings.upstream_settings.forwarded_headers,
            )?,
            cors_headers: CorsHeaders::new(&settings.cors_settings)?,
            settings,
        });

        let router = Router::new()
            .route(
                "/health",
                get(routes::health_handler).fallback(routes::proxy_handler),
            )
            .route(
                "/debug-headers",
                get(routes::debug_headers_handler).fallback(routes::proxy_handler),
            )
            .fallback(routes::proxy_handler)
            .layer(CatchPanicLayer::custom(error::panic_response))
            .layer(axum_middleware::from_fn_with_state(
                state.clone(),
                cors::cors_middleware,
            ))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(axum_middleware::from_fn(Server::header_middleware))
            .with_state(state);

        Ok(Self {
            router_inner: router,
        })
    }

    /// Start the server and expose it locally on the provided [`SocketAddr`].
    pub async fn start(self, address: &SocketAddr) -> Result<()> {
        let tcp_listener = TcpListener::bind(&address).await?;
        self.serve(tcp_listener).await
    }

    /// Serve requests accepted by an already bound [`TcpListener`] until a shutdown signal is received.
    pub async fn serve(self, tcp_listener: TcpListener) -> Result<()> {
        info!("Listening on http://{}", tcp_listener.local_addr()?);
        axum::serve(tcp_listener, self.router_inner)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await?;
        Ok(())
    }

    // https://github.com/tokio-rs/axum/blob/15917c6dbcb4a48707a20e9cfd021992a279a662/examples/graceful-shutdown/src/main.rs#L55
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        info!("Shutdown signal received, draining connections");
    }

    async fn header_middleware(request: Request, next: Next) -> Response {
        let mut response = next.run(request).await;
        response.headers_mut().insert(
            header::SERVER,
            HeaderValue::from_static(env!("CARGO_PKG_NAME")),
        );
        response
    }
}

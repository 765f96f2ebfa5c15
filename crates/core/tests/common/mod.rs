//! Shared utilities for end-to-end proxy tests.

use axum::{
    Router,
    body::{Bytes, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use restgate::{Server, ServerSettings, url::Url};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// A request as it arrived at the mock upstream.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the mock upstream answers every request with.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: &'static str,
    pub delay: Option<Duration>,
}

impl CannedResponse {
    pub fn ok(body: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("content-type", "application/json")],
            body,
            delay: None,
        }
    }
}

#[derive(Clone)]
struct MockState {
    canned: CannedResponse,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// A running mock upstream recording every request it receives.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().unwrap().clone()
    }

    /// The single request received so far.
    pub fn only_request(&self) -> CapturedRequest {
        let captured = self.captured();
        assert_eq!(captured.len(), 1, "expected exactly one upstream request");
        captured.into_iter().next().unwrap()
    }
}

async fn mock_handler(State(state): State<MockState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap();
    state.captured.lock().unwrap().push(CapturedRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    });

    if let Some(delay) = state.canned.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = Response::new(state.canned.body.into());
    *response.status_mut() = state.canned.status;
    for &(name, value) in &state.canned.headers {
        response.headers_mut().append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// Start a mock upstream on an ephemeral port.
pub async fn start_mock_upstream(canned: CannedResponse) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new().fallback(mock_handler).with_state(MockState {
        canned,
        captured: captured.clone(),
    });
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    MockUpstream { addr, captured }
}

/// Start the proxy on an ephemeral port and return its base URL.
pub async fn start_proxy_with(settings: ServerSettings) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(settings).unwrap();
    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn start_proxy(upstream: Url) -> String {
    start_proxy_with(ServerSettings::new(upstream)).await
}

/// An address nothing is listening on.
pub fn refused_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Send a hand-written `GET` to the proxy and return the raw response.
///
/// HTTP client libraries normalize the target and add headers of their own, this does neither.
pub async fn raw_get(proxy: &str, target: &str, headers: &[(&str, &str)]) -> String {
    let addr = proxy.trim_start_matches("http://");
    let mut request = format!("GET {target} HTTP/1.1\r\nhost: {addr}\r\nconnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

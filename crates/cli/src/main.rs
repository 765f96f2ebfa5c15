use anyhow::Result;
use bytesize::ByteSize;
use clap::{
    Parser,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use dotenvy::dotenv;
use restgate::{AllowOriginPolicy, CorsSettings, Server, ServerSettings, UpstreamSettings};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;
use url::Url;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightMagenta.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightMagenta.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about, styles = styles())]
struct Arguments {
    /// Internet socket address that the server should be ran on.
    #[arg(
        long = "address",
        env = "RESTGATE_ADDRESS",
        default_value = "127.0.0.1:3000"
    )]
    address: SocketAddr,

    /// Port to listen on, overriding the port given by `--address`.
    ///
    /// Hosting platforms usually hand this out through the `PORT` environment variable.
    #[arg(long = "port", env = "PORT")]
    port: Option<u16>,

    /// Origin of the upstream REST API. Inbound paths and queries are appended to it unchanged.
    #[arg(long = "upstream-url", env = "RESTGATE_UPSTREAM_URL")]
    upstream_url: Url,

    /// API key sent as the `apikey` header when a client does not send one itself.
    #[arg(long = "upstream-apikey", env = "RESTGATE_UPSTREAM_APIKEY")]
    upstream_apikey: Option<String>,

    /// Headers to pass from the original request to the upstream if they are present,
    /// in addition to `apikey`, `authorization` and `content-type`.
    #[arg(
        long = "upstream-forwarded-headers",
        env = "RESTGATE_UPSTREAM_FORWARDED_HEADERS",
        default_values_t = restgate::DEFAULT_FORWARDED_HEADERS.iter().map(|h| h.to_string()),
        value_delimiter = ','
    )]
    upstream_forwarded_headers: Vec<String>,

    /// Maximum waiting time before requests to the upstream are aborted.
    ///
    /// Requests wait indefinitely when this is not set.
    #[arg(
        long = "upstream-request-timeout",
        env = "RESTGATE_UPSTREAM_REQUEST_TIMEOUT"
    )]
    upstream_request_timeout: Option<humantime::Duration>,

    /// Maximum size of an inbound request body.
    #[arg(
        long = "max-body-size",
        env = "RESTGATE_MAX_BODY_SIZE",
        default_value = "2MB"
    )]
    max_body_size: ByteSize,

    /// How `Access-Control-Allow-Origin` is chosen: `mirror` reflects the request's
    /// `Origin` (required for credentialed browser requests), `wildcard` always sends `*`.
    #[arg(
        long = "cors-allow-origin",
        env = "RESTGATE_CORS_ALLOW_ORIGIN",
        default_value = "mirror"
    )]
    cors_allow_origin: AllowOriginPolicy,

    /// Header names advertised to browsers in `Access-Control-Allow-Headers`
    /// on top of `Content-Type, Authorization, apikey`.
    #[arg(
        long = "cors-extra-allowed-headers",
        env = "RESTGATE_CORS_EXTRA_ALLOWED_HEADERS",
        default_values_t = [
            "x-client-info".to_owned(),
            "accept-profile".to_owned(),
            "content-profile".to_owned(),
            "prefer".to_owned(),
            "range".to_owned(),
        ],
        value_delimiter = ','
    )]
    cors_extra_allowed_headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();
    let args = Arguments::parse();

    let mut address = args.address;
    if let Some(port) = args.port {
        address.set_port(port);
    }

    Server::new(ServerSettings {
        max_body_size: usize::try_from(args.max_body_size.as_u64())?,
        upstream_settings: UpstreamSettings {
            url: args.upstream_url,
            apikey: args.upstream_apikey,
            forwarded_headers: args.upstream_forwarded_headers.into_boxed_slice(),
            request_timeout: args.upstream_request_timeout.map(|t| *t),
        },
        cors_settings: CorsSettings {
            allow_origin: args.cors_allow_origin,
            extra_allowed_headers: args.cors_extra_allowed_headers.into_boxed_slice(),
        },
    })?
    .start(&address)
    .await
}

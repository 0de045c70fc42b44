//! Docker Engine API client for the image load endpoint.
//!
//! Talks HTTP/1.1 to the daemon over its unix socket (or TCP), streaming
//! the request body straight from a [`PipeReader`].

use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};
use imgload_core::error::{LoadError, Result};
use serde::Deserialize;

use super::pipe::PipeReader;

const LOAD_PATH: &str = "/images/load";

type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Response body of a load call.
///
/// Owned by whoever reads it; dropping it releases the connection.
pub struct LoadResponse {
    body: BodyStream,
}

impl LoadResponse {
    pub fn new<S>(body: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            body: Box::pin(body),
        }
    }
}

impl Stream for LoadResponse {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx)
    }
}

/// Daemon endpoint that imports `docker save` archives.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Start a load of `archive`.
    ///
    /// Returns once the daemon has answered with a success status; the
    /// archive keeps streaming while the caller reads the response.
    async fn load(&self, archive: PipeReader) -> Result<LoadResponse>;
}

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl DaemonEndpoint {
    /// Parse `unix:///var/run/docker.sock` or `tcp://127.0.0.1:2375`.
    pub fn parse(host: &str) -> Result<Self> {
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(LoadError::Config(format!("Empty socket path in '{}'", host)));
            }
            Ok(DaemonEndpoint::Unix(PathBuf::from(path)))
        } else if let Some(authority) = host.strip_prefix("tcp://") {
            let authority = authority.trim_end_matches('/');
            if authority.is_empty() {
                return Err(LoadError::Config(format!("Empty address in '{}'", host)));
            }
            Ok(DaemonEndpoint::Tcp(authority.to_string()))
        } else {
            Err(LoadError::Config(format!(
                "Unsupported daemon host '{}': expected unix:// or tcp://",
                host
            )))
        }
    }
}

impl std::fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            DaemonEndpoint::Tcp(authority) => write!(f, "tcp://{}", authority),
        }
    }
}

enum Transport {
    Unix(Client<UnixConnector>),
    Tcp(Client<HttpConnector>),
}

/// Docker-compatible daemon reached over its Engine API.
pub struct DockerDaemon {
    endpoint: DaemonEndpoint,
    transport: Transport,
}

impl DockerDaemon {
    pub fn new(endpoint: DaemonEndpoint) -> Self {
        let transport = match endpoint {
            DaemonEndpoint::Unix(_) => Transport::Unix(Client::unix()),
            DaemonEndpoint::Tcp(_) => Transport::Tcp(Client::new()),
        };
        Self {
            endpoint,
            transport,
        }
    }

    /// Client for a `unix://` or `tcp://` host string.
    pub fn connect(host: &str) -> Result<Self> {
        Ok(Self::new(DaemonEndpoint::parse(host)?))
    }

    pub fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    fn load_uri(&self) -> Result<hyper::Uri> {
        match self.endpoint {
            DaemonEndpoint::Unix(ref socket) => Ok(UnixUri::new(socket, LOAD_PATH).into()),
            DaemonEndpoint::Tcp(ref authority) => format!("http://{}{}", authority, LOAD_PATH)
                .parse()
                .map_err(|e| LoadError::Config(format!("Invalid daemon address '{}': {}", authority, e))),
        }
    }
}

#[async_trait]
impl ImageLoader for DockerDaemon {
    async fn load(&self, archive: PipeReader) -> Result<LoadResponse> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.load_uri()?)
            .header("Content-Type", "application/x-tar")
            .body(Body::wrap_stream(archive))
            .map_err(|e| LoadError::Config(format!("Invalid load request: {}", e)))?;

        tracing::debug!(endpoint = %self.endpoint, "POST {}", LOAD_PATH);

        let response = match self.transport {
            Transport::Unix(ref client) => client.request(request).await,
            Transport::Tcp(ref client) => client.request(request).await,
        }
        .map_err(|e| LoadError::LoadTransport(error_chain(&e)))?;

        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            let bytes = hyper::body::to_bytes(body).await.unwrap_or_default();
            return Err(LoadError::Daemon {
                status: status.as_u16(),
                message: daemon_message(status, &bytes),
            });
        }

        Ok(LoadResponse::new(body.map_err(|e| {
            std::io::Error::other(error_chain(&e))
        })))
    }
}

/// `{"message": "..."}` from an error reply, else the raw text.
fn daemon_message(status: StatusCode, body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorReply {
        message: String,
    }

    match serde_json::from_slice::<ErrorReply>(body) {
        Ok(reply) => reply.message,
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        }
    }
}

/// Error message including its sources, `outer: inner: root`.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// What a load reported, read from the daemon's JSON-lines progress output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadOutput {
    /// `Loaded image: ...` / `Loaded image ID: ...` lines
    pub loaded: Vec<String>,
    /// Error the daemon reported in-stream
    pub error: Option<String>,
}

impl LoadOutput {
    /// Parse a load response body. Non-JSON lines are kept as plain messages.
    pub fn parse(response: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Message {
            stream: Option<String>,
            error: Option<String>,
            error_detail: Option<ErrorDetail>,
        }

        let mut output = LoadOutput::default();
        for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => {
                    if let Some(stream) = msg.stream {
                        let stream = stream.trim();
                        if !stream.is_empty() {
                            output.loaded.push(stream.to_string());
                        }
                    }
                    let error = msg
                        .error_detail
                        .and_then(|d| d.message)
                        .or(msg.error);
                    if error.is_some() && output.error.is_none() {
                        output.error = error;
                    }
                }
                Err(_) => output.loaded.push(line.to_string()),
            }
        }
        output
    }
}

/// Collect a response into a string, keeping what was read on failure.
pub(crate) async fn read_response(
    response: &mut LoadResponse,
) -> std::result::Result<String, (String, std::io::Error)> {
    let mut body = Vec::new();
    while let Some(chunk) = response.next().await {
        match chunk {
            Ok(bytes) => body.extend_from_slice(&bytes),
            Err(e) => return Err((String::from_utf8_lossy(&body).into_owned(), e)),
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

use anyhow::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

/// Type alias for the Hyper client behind [`HyperTransport`].
pub type HyperClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Build a Hyper client configured with HTTP/2, connection pooling, and a TLS connector
/// that prefers native roots but falls back to the bundled WebPKI store.
pub fn build_hyper_client() -> Result<HyperClient> {
    let https_builder = HttpsConnectorBuilder::new()
        .with_native_roots()
        .unwrap_or_else(|err| {
            tracing::debug!(error = %err, "native roots unavailable, falling back to webpki roots");
            HttpsConnectorBuilder::new().with_webpki_roots()
        });

    let https = https_builder
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    Ok(Client::builder(TokioExecutor::new())
        .http2_adaptive_window(true)
        .pool_max_idle_per_host(128)
        .build::<_, Full<Bytes>>(https))
}

/// Failure class of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    TimedOut,
    Connect,
    Cancelled,
    Body,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::TimedOut => "timed-out",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Other => "other",
        }
    }
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, Error)]
#[error("transport error ({}): {message}", .kind.as_str())]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::new(TransportErrorKind::TimedOut, "request timed out")
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "request cancelled")
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Stable short code, used by compact diagnostics.
    pub fn code(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Sends a fully built request and returns the aggregated response.
///
/// Any status code is a successful exchange; only the absence of a response is an error.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, std::result::Result<Response<Bytes>, TransportError>>;
}

/// [`Transport`] over the pooled hyper + rustls client.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl HyperTransport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_hyper_client()?,
        })
    }

    pub fn from_client(client: HyperClient) -> Self {
        Self { client }
    }
}

impl Transport for HyperTransport {
    fn execute(
        &self,
        request: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, std::result::Result<Response<Bytes>, TransportError>> {
        Box::pin(async move {
            let resp = self.client.request(request).await.map_err(|err| {
                let kind = if err.is_connect() {
                    TransportErrorKind::Connect
                } else {
                    TransportErrorKind::Other
                };
                TransportError::new(kind, err.to_string())
            })?;

            let (parts, body) = resp.into_parts();
            let collected = body
                .collect()
                .await
                .map_err(|err| TransportError::new(TransportErrorKind::Body, err.to_string()))?;

            Ok(Response::from_parts(parts, collected.to_bytes()))
        })
    }
}

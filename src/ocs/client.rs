use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use futures::{StreamExt, stream::FuturesOrdered};
use http_body_util::Full;
use hyper::{HeaderMap, Method, Request, Response, Uri, header};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::common::headers::{
    ACCOUNT_HEADER, OCS_API_REQUEST_HEADER, set_account, set_skip_fault_check,
};
use crate::common::http::{HyperTransport, Transport, TransportError};
use crate::lifecycle::config::LogConfig;
use crate::lifecycle::gate::{GateRejection, RequestGate};
use crate::lifecycle::handle::OperationHandle;
use crate::lifecycle::monitor::{
    DiagnosticSink, ExchangeOutcome, RequestSummary, ResponseDelegate, ResponseMonitor,
};
use crate::lifecycle::registry::AccountFaultRegistry;
use crate::ocs::types::{BatchItem, Depth, RequestOptions};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP layer for a WebDAV/OCS server account.
///
/// Every request runs through the [`RequestGate`] before transmission and through the
/// [`ResponseMonitor`] at start and completion. Clients built from the same
/// [`AccountFaultRegistry`] share fault state.
#[derive(Clone)]
pub struct OcsClient {
    base: Uri,
    transport: Arc<dyn Transport>,
    auth_header: Option<header::HeaderValue>,
    account: Option<String>,
    default_timeout: Duration,
    gate: RequestGate,
    monitor: ResponseMonitor,
    callback_runtime: Option<Handle>,
}

impl OcsClient {
    /// Create a new client from a **base URL** and optional **Basic** credentials.
    ///
    /// When a user is given, the account identifier defaults to `"{user} {base_url}"`.
    pub fn new(base_url: &str, basic_user: Option<&str>, basic_pass: Option<&str>) -> Result<Self> {
        let mut builder = Self::builder(base_url);
        if let (Some(u), Some(p)) = (basic_user, basic_pass) {
            builder = builder.basic_auth(u, p);
        }
        if let Some(u) = basic_user {
            builder = builder.account(format!("{} {}", u, base_url));
        }
        builder.build()
    }

    pub fn builder(base_url: &str) -> OcsClientBuilder {
        OcsClientBuilder::new(base_url)
    }

    pub fn registry(&self) -> &Arc<AccountFaultRegistry> {
        self.gate.registry()
    }

    pub fn log_config(&self) -> &LogConfig {
        self.monitor.config()
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn monitor(&self) -> &ResponseMonitor {
        &self.monitor
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn build_uri(&self, path: &str) -> Result<Uri> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(path.parse()?);
        }

        let mut parts = self.base.clone().into_parts();
        let existing_path = parts
            .path_and_query
            .as_ref()
            .map(|pq| pq.path())
            .unwrap_or("/");

        let (path_only, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let combined = if path_only.is_empty() {
            existing_path.to_string()
        } else if path_only.starts_with('/') {
            path_only.to_string()
        } else {
            format!("{}/{}", existing_path.trim_end_matches('/'), path_only)
        };

        let path_and_query = match query {
            Some(q) => format!("{}?{}", combined, q).parse()?,
            None => combined.parse()?,
        };

        parts.path_and_query = Some(path_and_query);
        Ok(Uri::from_parts(parts)?)
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        mut headers: HeaderMap,
        body: Option<Bytes>,
        options: &RequestOptions,
    ) -> Result<(RequestSummary, Request<Full<Bytes>>)> {
        let uri = self.build_uri(path)?;

        if let Some(auth) = &self.auth_header {
            headers.insert(header::AUTHORIZATION, auth.clone());
        }
        headers.insert(
            OCS_API_REQUEST_HEADER,
            header::HeaderValue::from_static("true"),
        );
        match options.account.as_deref().or(self.account.as_deref()) {
            Some(account) => set_account(&mut headers, account)?,
            None => debug!(%uri, "request issued without an account"),
        }
        if options.skip_fault_check {
            set_skip_fault_check(&mut headers, true);
        }
        if body.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/xml; charset=utf-8"),
            );
        }

        let body = body.unwrap_or_default();
        let mut req_builder = Request::builder().method(method.clone()).uri(uri.clone());
        for (k, v) in headers.iter() {
            req_builder = req_builder.header(k, v);
        }
        let request = req_builder.body(Full::new(body.clone()))?;

        Ok((RequestSummary::new(method, uri, headers, body), request))
    }

    // ----------- Gated, monitored send -----------

    /// Generic send through gate, monitor and transport.
    ///
    /// Gate rejections come back as `Ok` responses carrying the fault's status code and
    /// an empty body, exactly like a server rejection. Transport failures, timeouts and
    /// cancellation are `Err` wrapping a [`TransportError`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body_bytes: Option<Bytes>,
        options: RequestOptions,
    ) -> Result<Response<Bytes>> {
        let (summary, request) = self.prepare(method, path, headers, body_bytes, &options)?;

        let token = CancellationToken::new();
        if let Some(handle) = &options.handle {
            handle.bind_request(token.clone());
        }

        let per_req_timeout = options.timeout.unwrap_or(self.default_timeout);
        self.execute(summary, request, token, per_req_timeout).await
    }

    async fn execute(
        &self,
        summary: RequestSummary,
        request: Request<Full<Bytes>>,
        token: CancellationToken,
        per_req_timeout: Duration,
    ) -> Result<Response<Bytes>> {
        let request = match self.gate.intercept(request) {
            Ok(request) => request,
            Err(rejection) => {
                let resp = rejection_response(&rejection)?;
                self.monitor
                    .response_parsed(&summary, ExchangeOutcome::Response(&resp));
                return Ok(resp);
            }
        };

        if token.is_cancelled() {
            let err = TransportError::cancelled();
            self.monitor
                .response_parsed(&summary, ExchangeOutcome::Failed(&err));
            return Err(err.into());
        }

        self.monitor.request_started(&summary);

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::cancelled()),
            res = timeout(per_req_timeout, self.transport.execute(request)) => {
                res.unwrap_or_else(|_| Err(TransportError::timed_out()))
            }
        };

        match result {
            Ok(resp) => {
                self.monitor
                    .response_parsed(&summary, ExchangeOutcome::Response(&resp));
                Ok(resp)
            }
            Err(err) => {
                self.monitor
                    .response_parsed(&summary, ExchangeOutcome::Failed(&err));
                Err(err.into())
            }
        }
    }

    /// Download `path` in a spawned task bound to the handle as its task-level primitive.
    pub async fn download(&self, path: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        let handle = options.handle.clone();
        let this = self.clone();
        let path = path.to_owned();
        let task = tokio::spawn(async move {
            this.send(Method::GET, &path, HeaderMap::new(), None, options)
                .await
        });
        if let Some(handle) = handle {
            handle.bind_task(task.abort_handle());
        }

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(TransportError::cancelled().into()),
            Err(err) => Err(anyhow!("download task failed: {}", err)),
        }
    }

    /// Spawn a request and deliver its result to `callback` on the configured callback
    /// runtime (or the dispatching task when none is set).
    ///
    /// Returns the handle bound to the request; a handle passed in `options` is reused.
    /// Must be called from within a tokio runtime.
    pub fn dispatch<F>(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body_bytes: Option<Bytes>,
        mut options: RequestOptions,
        callback: F,
    ) -> OperationHandle
    where
        F: FnOnce(Result<Response<Bytes>>) + Send + 'static,
    {
        let handle = options
            .handle
            .get_or_insert_with(OperationHandle::new)
            .clone();
        let this = self.clone();
        let path = path.to_owned();
        let callback_runtime = self.callback_runtime.clone();

        tokio::spawn(async move {
            let result = this.send(method, &path, headers, body_bytes, options).await;
            match callback_runtime {
                Some(rt) => {
                    rt.spawn(async move { callback(result) });
                }
                None => callback(result),
            }
        });

        handle
    }

    // ----------- HTTP/WebDAV/OCS Verbs -----------

    /// Send an `OPTIONS` request.
    pub async fn options(&self, path: &str) -> Result<Response<Bytes>> {
        self.send(Method::OPTIONS, path, HeaderMap::new(), None, RequestOptions::default())
            .await
    }

    /// Send a `HEAD` request.
    pub async fn head(&self, path: &str) -> Result<Response<Bytes>> {
        self.send(Method::HEAD, path, HeaderMap::new(), None, RequestOptions::default())
            .await
    }

    /// Send a `GET` request and return the aggregated body.
    pub async fn get(&self, path: &str) -> Result<Response<Bytes>> {
        self.send(Method::GET, path, HeaderMap::new(), None, RequestOptions::default())
            .await
    }

    /// Send a `DELETE` request.
    pub async fn delete(&self, path: &str) -> Result<Response<Bytes>> {
        self.send(Method::DELETE, path, HeaderMap::new(), None, RequestOptions::default())
            .await
    }

    /// Send a `PUT` with the given body and content type.
    pub async fn put(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<Response<Bytes>> {
        let mut h = HeaderMap::new();
        h.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_str(content_type)?,
        );
        self.send(Method::PUT, path, h, Some(body), RequestOptions::default())
            .await
    }

    /// Send a WebDAV `PROPFIND` with a custom XML body and `Depth` header.
    pub async fn propfind(
        &self,
        path: &str,
        depth: Depth,
        xml_body: &str,
    ) -> Result<Response<Bytes>> {
        let mut h = HeaderMap::new();
        h.insert("Depth", header::HeaderValue::from_static(depth.as_str()));
        h.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/xml; charset=utf-8"),
        );
        self.send(
            Method::from_bytes(b"PROPFIND")?,
            path,
            h,
            Some(Bytes::from(xml_body.to_owned())),
            RequestOptions::default(),
        )
        .await
    }

    /// Send a WebDAV `MKCOL` to create a collection.
    pub async fn mkcol(&self, path: &str) -> Result<Response<Bytes>> {
        self.send(
            Method::from_bytes(b"MKCOL")?,
            path,
            HeaderMap::new(),
            None,
            RequestOptions::default(),
        )
        .await
    }

    /// `GET` an OCS endpoint, asking for a JSON payload.
    pub async fn ocs_get(&self, path: &str) -> Result<Response<Bytes>> {
        let mut h = HeaderMap::new();
        h.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        self.send(Method::GET, path, h, None, RequestOptions::default())
            .await
    }

    /// Run many `GET`s concurrently with a semaphore-bound concurrency limit.
    pub async fn get_many(
        &self,
        paths: impl IntoIterator<Item = String>,
        max_concurrency: usize,
    ) -> Vec<BatchItem<Response<Bytes>>> {
        let sem = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut tasks = FuturesOrdered::new();

        for path in paths {
            let sem_clone = sem.clone();
            let this = self.clone();
            tasks.push_back(async move {
                let result = match sem_clone.acquire_owned().await {
                    Ok(_permit) => this.get(&path).await,
                    Err(err) => Err(err.into()),
                };
                BatchItem {
                    pub_path: path,
                    result,
                }
            });
        }

        let mut out = Vec::new();
        while let Some(item) = tasks.next().await {
            out.push(item);
        }
        out
    }
}

fn rejection_response(rejection: &GateRejection) -> Result<Response<Bytes>> {
    Ok(Response::builder()
        .status(rejection.status())
        .body(Bytes::new())?)
}

/// Builder for [`OcsClient`].
pub struct OcsClientBuilder {
    base_url: String,
    auth_header: Option<String>,
    account: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    registry: Option<Arc<AccountFaultRegistry>>,
    log_config: Option<LogConfig>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    delegate: Option<Arc<dyn ResponseDelegate>>,
    timeout: Duration,
    callback_runtime: Option<Handle>,
}

impl OcsClientBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
            auth_header: None,
            account: None,
            transport: None,
            registry: None,
            log_config: None,
            sink: None,
            delegate: None,
            timeout: DEFAULT_TIMEOUT,
            callback_runtime: None,
        }
    }

    pub fn basic_auth(mut self, user: &str, pass: &str) -> Self {
        let token = format!("{}:{}", user, pass);
        self.auth_header = Some(format!("Basic {}", B64.encode(token)));
        self
    }

    /// Account identifier sent in the `X-NC-Account` header.
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share fault state with other clients. A fresh registry is created otherwise.
    pub fn registry(mut self, registry: Arc<AccountFaultRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = Some(config);
        self
    }

    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn ResponseDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runtime completion callbacks of [`OcsClient::dispatch`] run on.
    pub fn callback_runtime(mut self, runtime: Handle) -> Self {
        self.callback_runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<OcsClient> {
        let base: Uri = self.base_url.parse()?;
        let auth_header = self
            .auth_header
            .map(|v| header::HeaderValue::from_str(&v))
            .transpose()?;
        if let Some(account) = &self.account {
            header::HeaderValue::from_str(account)
                .map_err(|_| anyhow!("account is not a valid {} value", ACCOUNT_HEADER))?;
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HyperTransport::new()?),
        };
        let registry = self.registry.unwrap_or_default();
        let mut monitor =
            ResponseMonitor::new(registry.clone(), self.log_config.unwrap_or_default());
        if let Some(sink) = self.sink {
            monitor = monitor.with_sink(sink);
        }
        if let Some(delegate) = self.delegate {
            monitor = monitor.with_delegate(delegate);
        }

        Ok(OcsClient {
            base,
            transport,
            auth_header,
            account: self.account,
            default_timeout: self.timeout,
            gate: RequestGate::new(registry),
            monitor,
            callback_runtime: self.callback_runtime,
        })
    }
}

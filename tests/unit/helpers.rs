use bytes::Bytes;
use fast_ocs_rs::{
    AccountFaultRegistry, Cancellable, DiagnosticRecord, DiagnosticSink, ExchangeOutcome,
    LogConfig, OcsClient, RequestSummary, ResponseDelegate, Transport, TransportError, Verbosity,
};
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "https://cloud.example.com/remote.php/dav/";

/// Transport double: answers every request with the same canned response or error.
pub struct FakeTransport {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
    delay: Option<Duration>,
    error: Option<TransportError>,
    calls: AtomicUsize,
    seen: Mutex<Vec<HeaderMap>>,
}

impl FakeTransport {
    pub fn responding(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status"),
            body: Bytes::new(),
            headers: HeaderMap::new(),
            delay: None,
            error: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::responding(200)
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Bytes::from(body.to_owned());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_headers(&self) -> Vec<HeaderMap> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Transport for FakeTransport {
    fn execute(
        &self,
        request: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<Bytes>, TransportError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .expect("seen lock")
                .push(request.headers().clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = &self.error {
                return Err(err.clone());
            }
            let mut resp = Response::builder()
                .status(self.status)
                .body(self.body.clone())
                .expect("valid response");
            *resp.headers_mut() = self.headers.clone();
            Ok(resp)
        })
    }
}

#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<DiagnosticRecord>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().expect("records lock").clone()
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&self, record: &DiagnosticRecord) {
        self.records
            .lock()
            .expect("records lock")
            .push(record.clone());
    }
}

/// Delegate double: remembers the status (or `None` for transport errors) of each exchange.
#[derive(Default)]
pub struct RecordingDelegate {
    outcomes: Mutex<Vec<Option<u16>>>,
}

impl RecordingDelegate {
    pub fn outcomes(&self) -> Vec<Option<u16>> {
        self.outcomes.lock().expect("outcomes lock").clone()
    }
}

impl ResponseDelegate for RecordingDelegate {
    fn did_complete(&self, _request: &RequestSummary, outcome: ExchangeOutcome<'_>) {
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .push(outcome.status().map(|s| s.as_u16()));
    }
}

/// Primitive double counting how often it was cancelled.
#[derive(Default)]
pub struct CountingPrimitive {
    cancels: AtomicUsize,
}

impl CountingPrimitive {
    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl Cancellable for CountingPrimitive {
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestClient {
    pub client: OcsClient,
    pub transport: Arc<FakeTransport>,
    pub registry: Arc<AccountFaultRegistry>,
    pub sink: Arc<CollectingSink>,
    pub delegate: Arc<RecordingDelegate>,
    pub config: LogConfig,
}

pub fn test_client(account: &str, transport: FakeTransport) -> TestClient {
    test_client_with_registry(account, transport, Arc::new(AccountFaultRegistry::new()))
}

pub fn test_client_with_registry(
    account: &str,
    transport: FakeTransport,
    registry: Arc<AccountFaultRegistry>,
) -> TestClient {
    let transport = Arc::new(transport);
    let sink = Arc::new(CollectingSink::default());
    let delegate = Arc::new(RecordingDelegate::default());
    let config = LogConfig::with_verbosity(Verbosity::Normal);
    config.set_print_log(false);

    let client = OcsClient::builder(BASE_URL)
        .basic_auth("user", "pass")
        .account(account)
        .transport(transport.clone())
        .registry(registry.clone())
        .log_config(config.clone())
        .diagnostic_sink(sink.clone())
        .delegate(delegate.clone())
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client builds");

    TestClient {
        client,
        transport,
        registry,
        sink,
        delegate,
        config,
    }
}

pub fn summary(method: Method, uri: &str, headers: HeaderMap) -> RequestSummary {
    RequestSummary::new(
        method,
        uri.parse().expect("valid uri"),
        headers,
        Bytes::new(),
    )
}

pub fn account_headers(account: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    fast_ocs_rs::common::set_account(&mut headers, account).expect("valid account");
    headers
}

pub fn response(status: u16, body: &str) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .body(Bytes::from(body.to_owned()))
        .expect("valid response")
}

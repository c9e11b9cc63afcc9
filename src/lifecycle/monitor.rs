//! Observer for request lifecycle events: diagnostics and fault detection.
//!
//! The monitor sees two points per request: transmission start and the parsed
//! response (or transport failure). At each point it renders a diagnostic record
//! whose shape depends on the [`Verbosity`] in effect *at that moment*, and on
//! completion it records account faults in the [`AccountFaultRegistry`] before
//! handing the exchange to the optional [`ResponseDelegate`].

use std::sync::Arc;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Response, StatusCode, Uri, header};
use serde_json::Value;
use tracing::{info, warn};

use crate::common::headers::{
    TERMS_REQUIRED_HEADER, account_from_headers, parse_bool, skips_fault_check,
};
use crate::common::http::TransportError;
use crate::lifecycle::config::{LogConfig, Verbosity};
use crate::lifecycle::registry::{AccountFaultRegistry, FaultClass};

const TERMS_MARKER: &str = "terms_of_service";
const REDACTED: &str = "<redacted>";

/// What the monitor knows about an outbound request.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestSummary {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn account(&self) -> Option<&str> {
        account_from_headers(&self.headers)
    }
}

/// Result of one exchange as seen at the response-parsed point.
#[derive(Debug, Clone, Copy)]
pub enum ExchangeOutcome<'a> {
    /// Any HTTP response, including gate-synthesized rejections.
    Response(&'a Response<Bytes>),
    /// No response was produced.
    Failed(&'a TransportError),
}

impl ExchangeOutcome<'_> {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ExchangeOutcome::Response(resp) => Some(resp.status()),
            ExchangeOutcome::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_some_and(|s| s.is_success())
    }
}

/// Lifecycle point a [`DiagnosticRecord`] was produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Started,
    Completed,
}

/// Rendered diagnostic output for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub event: MonitorEvent,
    pub verbosity: Verbosity,
    pub lines: Vec<String>,
}

/// Receives every rendered record (for example a file log writer).
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, record: &DiagnosticRecord);
}

/// Receives every completed exchange after the monitor's own bookkeeping.
pub trait ResponseDelegate: Send + Sync {
    fn did_complete(&self, request: &RequestSummary, outcome: ExchangeOutcome<'_>);
}

/// Post-event observer shared by all requests of a client.
#[derive(Clone)]
pub struct ResponseMonitor {
    registry: Arc<AccountFaultRegistry>,
    config: LogConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    delegate: Option<Arc<dyn ResponseDelegate>>,
}

impl ResponseMonitor {
    pub fn new(registry: Arc<AccountFaultRegistry>, config: LogConfig) -> Self {
        Self {
            registry,
            config,
            sink: None,
            delegate: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn ResponseDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Transmission is about to start.
    pub fn request_started(&self, request: &RequestSummary) {
        let verbosity = self.config.verbosity();
        let lines = match verbosity {
            Verbosity::Silent | Verbosity::Compact => return,
            Verbosity::Normal => vec![start_line(request)],
            Verbosity::Verbose => {
                let mut lines = vec![start_line(request)];
                dump_headers(&mut lines, &request.headers);
                dump_body(&mut lines, &request.body);
                lines
            }
        };
        self.emit(DiagnosticRecord {
            event: MonitorEvent::Started,
            verbosity,
            lines,
        });
    }

    /// The exchange finished. Records faults, renders diagnostics, then informs the
    /// delegate regardless of the outcome.
    pub fn response_parsed(&self, request: &RequestSummary, outcome: ExchangeOutcome<'_>) {
        if let ExchangeOutcome::Response(response) = outcome {
            self.detect_fault(request, response);
        }

        let verbosity = self.config.verbosity();
        let lines = match verbosity {
            Verbosity::Silent => Vec::new(),
            Verbosity::Compact => vec![compact_line(request, outcome)],
            Verbosity::Normal => vec![completion_line(request, outcome)],
            Verbosity::Verbose => {
                let mut lines = vec![completion_line(request, outcome)];
                if let ExchangeOutcome::Response(response) = outcome {
                    dump_headers(&mut lines, response.headers());
                    dump_body(&mut lines, response.body());
                }
                lines
            }
        };
        if !lines.is_empty() {
            self.emit(DiagnosticRecord {
                event: MonitorEvent::Completed,
                verbosity,
                lines,
            });
        }

        if let Some(delegate) = &self.delegate {
            delegate.did_complete(request, outcome);
        }
    }

    fn detect_fault(&self, request: &RequestSummary, response: &Response<Bytes>) {
        if skips_fault_check(&request.headers) {
            return;
        }
        let Some(account) = request.account() else {
            return;
        };

        let class = match response.status() {
            StatusCode::UNAUTHORIZED => FaultClass::Unauthorized,
            StatusCode::SERVICE_UNAVAILABLE => FaultClass::Unavailable,
            StatusCode::FORBIDDEN if is_terms_response(response) => FaultClass::TermsPending,
            _ => return,
        };

        if self.registry.record_fault(account, class) {
            warn!(
                account,
                fault = %class,
                status = response.status().as_u16(),
                uri = %request.uri,
                "account fault recorded"
            );
        }
    }

    fn emit(&self, record: DiagnosticRecord) {
        if self.config.settings().print_log {
            for line in &record.lines {
                info!(target: "fast_ocs_rs::monitor", "{line}");
            }
        }
        if let Some(sink) = &self.sink {
            sink.record(&record);
        }
    }
}

/// A 403 caused by terms of service the account has not accepted yet.
///
/// Only structured signals count: the [`TERMS_REQUIRED_HEADER`] flag, or an OCS
/// JSON error payload whose `ocs.data.reason` or `ocs.meta.message` is exactly
/// `terms_of_service`. Free text elsewhere in the body is ignored.
pub fn is_terms_response(response: &Response<Bytes>) -> bool {
    if response.status() != StatusCode::FORBIDDEN {
        return false;
    }
    let flagged = response
        .headers()
        .get(TERMS_REQUIRED_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(parse_bool);
    flagged || ocs_terms_reason(response.body())
}

fn ocs_terms_reason(body: &[u8]) -> bool {
    let Ok(payload) = serde_json::from_slice::<Value>(body) else {
        return false;
    };
    let ocs = &payload["ocs"];
    [&ocs["data"]["reason"], &ocs["meta"]["message"]]
        .into_iter()
        .filter_map(Value::as_str)
        .any(|field| field.trim().eq_ignore_ascii_case(TERMS_MARKER))
}

fn start_line(request: &RequestSummary) -> String {
    format!("[REQUEST] {} {}", request.method, request.uri)
}

fn completion_line(request: &RequestSummary, outcome: ExchangeOutcome<'_>) -> String {
    match outcome {
        ExchangeOutcome::Response(resp) => {
            format!("[RESPONSE] {} {} {}", request.method, request.uri, resp.status())
        }
        ExchangeOutcome::Failed(err) => {
            format!("[RESPONSE] {} {} failed: {}", request.method, request.uri, err)
        }
    }
}

fn compact_line(request: &RequestSummary, outcome: ExchangeOutcome<'_>) -> String {
    let class = if outcome.is_success() { "success" } else { "error" };
    match outcome {
        ExchangeOutcome::Failed(err) => format!(
            "{} {} {} [{}]",
            request.method,
            request.uri,
            class,
            err.code()
        ),
        ExchangeOutcome::Response(_) => {
            format!("{} {} {}", request.method, request.uri, class)
        }
    }
}

fn dump_headers(lines: &mut Vec<String>, headers: &HeaderMap) {
    lines.push("headers:".to_string());
    for (name, value) in headers {
        let shown = if name == header::AUTHORIZATION {
            REDACTED.into()
        } else {
            String::from_utf8_lossy(value.as_bytes())
        };
        lines.push(format!("  {name}: {shown}"));
    }
}

fn dump_body(lines: &mut Vec<String>, body: &Bytes) {
    if body.is_empty() {
        lines.push("body: <empty>".to_string());
    } else {
        lines.push(format!("body: {}", String::from_utf8_lossy(body)));
    }
}

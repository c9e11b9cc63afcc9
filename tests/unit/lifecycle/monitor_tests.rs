use crate::helpers::{CollectingSink, RecordingDelegate, account_headers, response, summary};
use bytes::Bytes;
use fast_ocs_rs::common::set_skip_fault_check;
use fast_ocs_rs::lifecycle::is_terms_response;
use fast_ocs_rs::{
    AccountFaultRegistry, ExchangeOutcome, FaultClass, LogConfig, MonitorEvent, ResponseMonitor,
    TERMS_REQUIRED_HEADER, TransportError, TransportErrorKind, Verbosity,
};
use hyper::header::{self, HeaderValue};
use hyper::{HeaderMap, Method};
use std::sync::Arc;

const URI: &str = "https://cloud.example.com/ocs/v2.php/cloud/user";

struct Fixture {
    monitor: ResponseMonitor,
    registry: Arc<AccountFaultRegistry>,
    config: LogConfig,
    sink: Arc<CollectingSink>,
    delegate: Arc<RecordingDelegate>,
}

fn fixture(verbosity: Verbosity) -> Fixture {
    let registry = Arc::new(AccountFaultRegistry::new());
    let config = LogConfig::with_verbosity(verbosity);
    config.set_print_log(false);
    let sink = Arc::new(CollectingSink::default());
    let delegate = Arc::new(RecordingDelegate::default());
    let monitor = ResponseMonitor::new(registry.clone(), config.clone())
        .with_sink(sink.clone())
        .with_delegate(delegate.clone());
    Fixture {
        monitor,
        registry,
        config,
        sink,
        delegate,
    }
}

#[test]
fn test_silent_records_nothing_but_informs_delegate() {
    let f = fixture(Verbosity::Silent);
    let req = summary(Method::GET, URI, account_headers("alice"));
    let resp = response(200, "ok");

    f.monitor.request_started(&req);
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    assert!(f.sink.records().is_empty());
    assert_eq!(f.delegate.outcomes(), vec![Some(200)]);
}

#[test]
fn test_normal_records_one_line_per_event() {
    let f = fixture(Verbosity::Normal);
    let req = summary(Method::GET, URI, account_headers("alice"));
    let resp = response(404, "missing");

    f.monitor.request_started(&req);
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    let records = f.sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event, MonitorEvent::Started);
    assert_eq!(records[0].lines, vec![format!("[REQUEST] GET {URI}")]);
    assert_eq!(records[1].event, MonitorEvent::Completed);
    assert_eq!(records[1].lines, vec![format!("[RESPONSE] GET {URI} 404 Not Found")]);
}

#[test]
fn test_compact_records_single_completion_line() {
    let f = fixture(Verbosity::Compact);
    let req = summary(Method::PUT, URI, account_headers("alice"));
    let ok = response(201, "");
    let failed = response(500, "boom");

    f.monitor.request_started(&req);
    f.monitor.response_parsed(&req, ExchangeOutcome::Response(&ok));
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&failed));

    let records = f.sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.event == MonitorEvent::Completed));
    assert_eq!(records[0].lines, vec![format!("PUT {URI} success")]);
    assert_eq!(records[1].lines, vec![format!("PUT {URI} error")]);
}

#[test]
fn test_compact_includes_transport_error_code() {
    let f = fixture(Verbosity::Compact);
    let req = summary(Method::GET, URI, HeaderMap::new());
    let err = TransportError::timed_out();

    f.monitor.response_parsed(&req, ExchangeOutcome::Failed(&err));

    let records = f.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].lines, vec![format!("GET {URI} error [timed-out]")]);
    assert_eq!(f.delegate.outcomes(), vec![None]);
}

#[test]
fn test_verbose_dumps_headers_and_bodies() {
    let f = fixture(Verbosity::Verbose);
    let mut headers = account_headers("alice");
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_static("Basic c2VjcmV0"),
    );
    let req = fast_ocs_rs::RequestSummary::new(
        Method::POST,
        URI.parse().expect("valid uri"),
        headers,
        Bytes::from_static(b"{\"displayname\":\"Alice\"}"),
    );
    let mut resp = response(200, "{\"ocs\":{}}");
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    f.monitor.request_started(&req);
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    let records = f.sink.records();
    assert_eq!(records.len(), 2);

    let started = &records[0].lines;
    assert_eq!(started[0], format!("[REQUEST] POST {URI}"));
    assert!(started.contains(&"  x-nc-account: alice".to_string()));
    assert!(started.contains(&"  authorization: <redacted>".to_string()));
    assert!(!started.iter().any(|l| l.contains("c2VjcmV0")));
    assert!(started.contains(&"body: {\"displayname\":\"Alice\"}".to_string()));

    let completed = &records[1].lines;
    assert_eq!(completed[0], format!("[RESPONSE] POST {URI} 200 OK"));
    assert!(completed.contains(&"  content-type: application/json".to_string()));
    assert!(completed.contains(&"body: {\"ocs\":{}}".to_string()));
}

#[test]
fn test_verbosity_change_affects_only_later_events() {
    let f = fixture(Verbosity::Normal);
    let req = summary(Method::GET, URI, account_headers("alice"));
    let resp = response(200, "ok");

    f.monitor.request_started(&req);
    f.config.set_verbosity(Verbosity::Compact);
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    let records = f.sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].verbosity, Verbosity::Normal);
    assert_eq!(records[0].lines, vec![format!("[REQUEST] GET {URI}")]);
    assert_eq!(records[1].verbosity, Verbosity::Compact);
    assert_eq!(records[1].lines, vec![format!("GET {URI} success")]);
}

#[test]
fn test_status_codes_record_matching_faults() {
    let f = fixture(Verbosity::Silent);

    let cases = [
        ("alice", 401, "", Some(FaultClass::Unauthorized)),
        ("bob", 503, "", Some(FaultClass::Unavailable)),
        (
            "carol",
            403,
            "{\"ocs\":{\"meta\":{\"statuscode\":403},\"data\":{\"reason\":\"terms_of_service\"}}}",
            Some(FaultClass::TermsPending),
        ),
        ("dave", 403, "forbidden", None),
        ("erin", 500, "", None),
        ("frank", 200, "", None),
    ];

    for (account, status, body, expected) in cases {
        let req = summary(Method::GET, URI, account_headers(account));
        let resp = response(status, body);
        f.monitor
            .response_parsed(&req, ExchangeOutcome::Response(&resp));
        assert_eq!(f.registry.faults(account), expected.into_iter().collect::<Vec<_>>(), "{account}");
    }
}

#[test]
fn test_terms_header_marks_forbidden_as_terms_pending() {
    let f = fixture(Verbosity::Silent);
    let req = summary(Method::GET, URI, account_headers("carol"));
    let mut resp = response(403, "");
    resp.headers_mut()
        .insert(TERMS_REQUIRED_HEADER, HeaderValue::from_static("true"));

    assert!(is_terms_response(&resp));
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    assert!(f.registry.has_fault("carol", FaultClass::TermsPending));
}

#[test]
fn test_terms_marker_requires_forbidden_status() {
    let payload = "{\"ocs\":{\"meta\":{\"message\":\"TERMS_OF_SERVICE\"}}}";
    assert!(!is_terms_response(&response(401, payload)));
    assert!(is_terms_response(&response(403, payload)));
}

#[test]
fn test_forbidden_mentioning_terms_file_is_not_terms_pending() {
    let f = fixture(Verbosity::Silent);
    let req = summary(Method::DELETE, URI, account_headers("dave"));
    let sabre = response(
        403,
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <d:error xmlns:d=\"DAV:\" xmlns:s=\"http://sabredav.org/ns\">\
         <s:exception>Sabre\\DAV\\Exception\\Forbidden</s:exception>\
         <s:message>No delete permission for /files/dave/legal/terms_of_service.pdf</s:message>\
         </d:error>",
    );
    let ocs_message = response(
        403,
        "{\"ocs\":{\"meta\":{\"message\":\"cannot share terms_of_service.pdf\"}}}",
    );

    assert!(!is_terms_response(&sabre));
    assert!(!is_terms_response(&ocs_message));
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&sabre));
    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&ocs_message));

    assert!(f.registry.faults("dave").is_empty());
}

#[test]
fn test_skip_header_disables_fault_detection() {
    let f = fixture(Verbosity::Silent);
    let mut headers = account_headers("alice");
    set_skip_fault_check(&mut headers, true);
    let req = summary(Method::GET, URI, headers);
    let resp = response(401, "");

    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    assert!(f.registry.is_empty());
    assert_eq!(f.delegate.outcomes(), vec![Some(401)]);
}

#[test]
fn test_missing_account_disables_fault_detection() {
    let f = fixture(Verbosity::Silent);
    let req = summary(Method::GET, URI, HeaderMap::new());
    let resp = response(503, "");

    f.monitor
        .response_parsed(&req, ExchangeOutcome::Response(&resp));

    assert!(f.registry.is_empty());
}

#[test]
fn test_transport_errors_record_no_fault() {
    let f = fixture(Verbosity::Normal);
    let req = summary(Method::GET, URI, account_headers("alice"));
    let err = TransportError::new(TransportErrorKind::Connect, "connection refused");

    f.monitor.response_parsed(&req, ExchangeOutcome::Failed(&err));

    assert!(f.registry.is_empty());
    let records = f.sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].lines[0].starts_with(&format!("[RESPONSE] GET {URI} failed:")));
    assert!(records[0].lines[0].contains("connection refused"));
    assert_eq!(f.delegate.outcomes(), vec![None]);
}

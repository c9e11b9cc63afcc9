//! Well-known request headers understood by the request gate and the response monitor.
//!
//! Endpoint code must set [`ACCOUNT_HEADER`] on every request that belongs to a
//! configured account; without it the gate lets the request through and the monitor
//! never records a fault for it.

use hyper::{HeaderMap, header};

/// Identifies the account a request is issued for.
pub const ACCOUNT_HEADER: &str = "X-NC-Account";

/// When `true`, the request bypasses the fault gate and is not used for fault detection.
pub const SKIP_FAULT_CHECK_HEADER: &str = "X-NC-Skip-Fault-Check";

/// Set by servers that answer 403 because terms of service are pending.
pub const TERMS_REQUIRED_HEADER: &str = "X-NC-Terms-Required";

/// Marks a request as an OCS API call.
pub const OCS_API_REQUEST_HEADER: &str = "OCS-APIRequest";

/// Account identifier carried by `headers`, ignoring empty or non-ASCII values.
pub fn account_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Whether the caller opted out of the fault check.
pub fn skips_fault_check(headers: &HeaderMap) -> bool {
    headers
        .get(SKIP_FAULT_CHECK_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(parse_bool)
}

/// Insert the account header, replacing any previous value.
pub fn set_account(headers: &mut HeaderMap, account: &str) -> anyhow::Result<()> {
    headers.insert(ACCOUNT_HEADER, header::HeaderValue::from_str(account)?);
    Ok(())
}

/// Insert the opt-out header.
pub fn set_skip_fault_check(headers: &mut HeaderMap, skip: bool) {
    headers.insert(
        SKIP_FAULT_CHECK_HEADER,
        header::HeaderValue::from_static(if skip { "true" } else { "false" }),
    );
}

pub(crate) fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

pub mod headers;
pub mod http;

pub use headers::{
    ACCOUNT_HEADER, OCS_API_REQUEST_HEADER, SKIP_FAULT_CHECK_HEADER, TERMS_REQUIRED_HEADER,
    account_from_headers, set_account, set_skip_fault_check, skips_fault_check,
};
pub use http::{
    HyperClient, HyperTransport, Transport, TransportError, TransportErrorKind, build_hyper_client,
};

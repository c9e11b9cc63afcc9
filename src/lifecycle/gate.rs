//! Pre-transmission check against the account fault registry.

use std::sync::Arc;

use hyper::{HeaderMap, Request, StatusCode};
use tracing::warn;

use crate::common::headers::{account_from_headers, skips_fault_check};
use crate::lifecycle::registry::{AccountFaultRegistry, FaultClass};

/// Outcome of [`RequestGate::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Reject(GateRejection),
}

/// A request stopped by the gate. The HTTP layer turns it into a response
/// carrying [`status`](Self::status) without contacting the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRejection {
    pub account: String,
    pub class: FaultClass,
}

impl GateRejection {
    pub fn status(&self) -> StatusCode {
        self.class.status()
    }
}

/// Interceptor run once per outbound request.
#[derive(Clone)]
pub struct RequestGate {
    registry: Arc<AccountFaultRegistry>,
}

impl RequestGate {
    pub fn new(registry: Arc<AccountFaultRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AccountFaultRegistry> {
        &self.registry
    }

    /// Decide from the request headers alone. Only reads in-memory state.
    ///
    /// Requests with the skip header set, or without an account, always proceed.
    /// Otherwise the first class the account belongs to, in the order
    /// unauthorized → unavailable → terms pending, rejects the request.
    pub fn check(&self, headers: &HeaderMap) -> GateDecision {
        if skips_fault_check(headers) {
            return GateDecision::Proceed;
        }

        let Some(account) = account_from_headers(headers) else {
            return GateDecision::Proceed;
        };

        match self.registry.first_fault(account) {
            Some(class) => {
                warn!(
                    account,
                    fault = %class,
                    status = class.status().as_u16(),
                    "request rejected before transmission"
                );
                GateDecision::Reject(GateRejection {
                    account: account.to_owned(),
                    class,
                })
            }
            None => GateDecision::Proceed,
        }
    }

    /// Hand `request` back untouched, or the rejection that stops it.
    pub fn intercept<B>(&self, request: Request<B>) -> Result<Request<B>, GateRejection> {
        match self.check(request.headers()) {
            GateDecision::Proceed => Ok(request),
            GateDecision::Reject(rejection) => Err(rejection),
        }
    }
}

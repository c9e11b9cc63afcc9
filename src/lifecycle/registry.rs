//! Per-account fault state shared between the request gate and the response monitor.

use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hyper::StatusCode;

/// Reason a request for an account should be rejected before it reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// Credentials were rejected (401).
    Unauthorized,
    /// The server or service is failing (503).
    Unavailable,
    /// The account has terms of service left to accept (403).
    TermsPending,
}

impl FaultClass {
    /// Gate priority order.
    pub const ALL: [FaultClass; 3] = [
        FaultClass::Unauthorized,
        FaultClass::Unavailable,
        FaultClass::TermsPending,
    ];

    /// Status code carried by a gate-synthesized failure for this class.
    pub fn status(self) -> StatusCode {
        match self {
            FaultClass::Unauthorized => StatusCode::UNAUTHORIZED,
            FaultClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            FaultClass::TermsPending => StatusCode::FORBIDDEN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FaultClass::Unauthorized => "unauthorized",
            FaultClass::Unavailable => "unavailable",
            FaultClass::TermsPending => "terms-pending",
        }
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct FaultSets {
    unauthorized: HashSet<String>,
    unavailable: HashSet<String>,
    terms_pending: HashSet<String>,
}

impl FaultSets {
    fn set(&self, class: FaultClass) -> &HashSet<String> {
        match class {
            FaultClass::Unauthorized => &self.unauthorized,
            FaultClass::Unavailable => &self.unavailable,
            FaultClass::TermsPending => &self.terms_pending,
        }
    }

    fn set_mut(&mut self, class: FaultClass) -> &mut HashSet<String> {
        match class {
            FaultClass::Unauthorized => &mut self.unauthorized,
            FaultClass::Unavailable => &mut self.unavailable,
            FaultClass::TermsPending => &mut self.terms_pending,
        }
    }
}

/// Thread-safe account → fault class store.
///
/// Create one per session and share it behind an `Arc`. The gate only reads,
/// the monitor only adds; entries leave the registry exclusively through
/// [`clear_fault`](Self::clear_fault) / [`clear_account`](Self::clear_account),
/// which belong to whatever flow repairs the account (re-login, accepting
/// terms, server back online).
///
/// Reads and writes are not ordered against in-flight requests: a request
/// racing a `record_fault` may still reach the server.
///
/// Account identifiers are compared with surrounding whitespace trimmed, the
/// way the account header is read.
#[derive(Default)]
pub struct AccountFaultRegistry {
    sets: RwLock<FaultSets>,
}

impl AccountFaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: the sets stay valid across a panicking writer.
    fn read(&self) -> RwLockReadGuard<'_, FaultSets> {
        self.sets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FaultSets> {
        self.sets.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `account` to the set for `class`. Returns `true` if it was not already there.
    pub fn record_fault(&self, account: &str, class: FaultClass) -> bool {
        self.write().set_mut(class).insert(key(account).to_owned())
    }

    pub fn has_fault(&self, account: &str, class: FaultClass) -> bool {
        self.read().set(class).contains(key(account))
    }

    /// Every class `account` belongs to, in gate priority order.
    pub fn faults(&self, account: &str) -> Vec<FaultClass> {
        let account = key(account);
        let guard = self.read();
        FaultClass::ALL
            .into_iter()
            .filter(|class| guard.set(*class).contains(account))
            .collect()
    }

    /// First class `account` belongs to, in gate priority order.
    pub fn first_fault(&self, account: &str) -> Option<FaultClass> {
        let account = key(account);
        let guard = self.read();
        FaultClass::ALL
            .into_iter()
            .find(|class| guard.set(*class).contains(account))
    }

    /// Remove one membership. Returns whether it was present.
    pub fn clear_fault(&self, account: &str, class: FaultClass) -> bool {
        self.write().set_mut(class).remove(key(account))
    }

    /// Remove `account` from every class.
    pub fn clear_account(&self, account: &str) {
        let account = key(account);
        let mut guard = self.write();
        for class in FaultClass::ALL {
            guard.set_mut(class).remove(account);
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.read();
        FaultClass::ALL
            .into_iter()
            .all(|class| guard.set(class).is_empty())
    }
}

// Same normalization as `account_from_headers`.
fn key(account: &str) -> &str {
    account.trim()
}

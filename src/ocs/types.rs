use std::time::Duration;

use anyhow::Result;

use crate::lifecycle::handle::OperationHandle;

/// WebDAV Depth
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}
impl Depth {
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// Annotated result of a batch operation
pub struct BatchItem<T> {
    pub pub_path: String,
    pub result: Result<T>,
}

/// Per-request settings layered over the client defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Account the request belongs to; overrides the client's account.
    pub account: Option<String>,
    /// Bypass the fault gate and fault detection for this request.
    pub skip_fault_check: bool,
    pub timeout: Option<Duration>,
    /// Handle the HTTP layer binds the live request/task to.
    pub handle: Option<OperationHandle>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn skip_fault_check(mut self, skip: bool) -> Self {
        self.skip_fault_check = skip;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn handle(mut self, handle: OperationHandle) -> Self {
        self.handle = Some(handle);
        self
    }
}

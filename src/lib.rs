//! Request lifecycle core for WebDAV/OCS collaboration servers.
//!
//! This library coordinates what happens around every request a client sends to a
//! collaboration server, on top of hyper 1.x, rustls and tokio. Endpoint-specific
//! payloads are left to the caller; what this crate owns is the lifecycle:
//!
//! - **Account fault registry**: which accounts are known to be unauthorized,
//!   unavailable, or waiting on terms of service
//! - **Request gate**: rejects requests for faulted accounts before they reach the
//!   network, with the same status the server would have returned (401/503/403)
//! - **Response monitor**: diagnostics at a runtime-configurable verbosity and fault
//!   detection from response status codes
//! - **Operation handles**: cancel or observe a dispatched request from any thread,
//!   even before the request has actually been created
//!
//! # Examples
//!
//! ## Basic Setup
//!
//! ```no_run
//! use fast_ocs_rs::OcsClient;
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = OcsClient::new(
//!         "https://cloud.example.com/",
//!         Some("alice"),
//!         Some("app-password"),
//!     )?;
//!
//!     let response = client.ocs_get("ocs/v2.php/cloud/capabilities").await?;
//!     println!("Capabilities: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Sharing Fault State Between Clients
//!
//! Once the server answers 401 for an account, every later request for that account is
//! rejected locally until the re-authentication flow clears the fault.
//!
//! ```no_run
//! use fast_ocs_rs::{AccountFaultRegistry, FaultClass, OcsClient};
//! use anyhow::Result;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = Arc::new(AccountFaultRegistry::new());
//!
//!     let files = OcsClient::builder("https://cloud.example.com/remote.php/dav/files/alice/")
//!         .basic_auth("alice", "app-password")
//!         .account("alice@cloud.example.com")
//!         .registry(registry.clone())
//!         .build()?;
//!
//!     let response = files.get("notes.md").await?;
//!     if response.status() == 401 {
//!         // Every client sharing `registry` now fails fast for this account.
//!         assert!(registry.has_fault("alice@cloud.example.com", FaultClass::Unauthorized));
//!
//!         // ...after the user logs in again:
//!         registry.clear_account("alice@cloud.example.com");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Cancelling a Dispatched Request
//!
//! ```no_run
//! use fast_ocs_rs::{LifecycleEvent, OcsClient, OperationHandle, RequestOptions};
//! use hyper::{HeaderMap, Method};
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = OcsClient::new("https://cloud.example.com/", Some("alice"), Some("secret"))?;
//!
//!     let handle = OperationHandle::new();
//!     let mut events = handle.subscribe();
//!
//!     client.dispatch(
//!         Method::GET,
//!         "remote.php/dav/files/alice/large.iso",
//!         HeaderMap::new(),
//!         None,
//!         RequestOptions::new().handle(handle.clone()),
//!         |result| match result {
//!             Ok(response) => println!("finished: {}", response.status()),
//!             Err(err) => println!("stopped: {err}"),
//!         },
//!     );
//!
//!     // Safe even if the request has not been created yet.
//!     handle.cancel();
//!
//!     while let Some(event) = events.next_event().await {
//!         if event == LifecycleEvent::Cancelled {
//!             handle.clear();
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Diagnostics
//!
//! The monitor reads the verbosity every time an event fires, so changing it takes
//! effect on the next request event:
//!
//! ```no_run
//! use fast_ocs_rs::{LogConfig, OcsClient, Verbosity};
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = LogConfig::with_verbosity(Verbosity::Compact);
//!     let client = OcsClient::builder("https://cloud.example.com/")
//!         .log_config(config.clone())
//!         .build()?;
//!
//!     client.get("status.php").await?;
//!     config.set_verbosity("verbose".parse()?);
//!     client.get("status.php").await?;
//!     Ok(())
//! }
//! ```
pub mod common;
pub mod lifecycle;
pub mod ocs;

pub use common::headers::{ACCOUNT_HEADER, SKIP_FAULT_CHECK_HEADER, TERMS_REQUIRED_HEADER};
pub use common::http::{HyperTransport, Transport, TransportError, TransportErrorKind};
pub use lifecycle::{
    AccountFaultRegistry, Cancellable, DiagnosticRecord, DiagnosticSink, ExchangeOutcome,
    FaultClass, GateDecision, GateRejection, LifecycleEvent, LifecycleEvents, LogConfig,
    LogSettings, MonitorEvent, OperationHandle, RequestGate, RequestSummary, ResponseDelegate,
    ResponseMonitor, Verbosity,
};
pub use ocs::{BatchItem, Depth, OcsClient, OcsClientBuilder, RequestOptions};

//! Request lifecycle coordination: fault registry, request gate, response monitor
//! and operation handles.

pub mod config;
pub mod gate;
pub mod handle;
pub mod monitor;
pub mod registry;

pub use config::{LogConfig, LogSettings, Verbosity};
pub use gate::{GateDecision, GateRejection, RequestGate};
pub use handle::{Cancellable, LifecycleEvent, LifecycleEvents, OperationHandle};
pub use monitor::{
    DiagnosticRecord, DiagnosticSink, ExchangeOutcome, MonitorEvent, RequestSummary,
    ResponseDelegate, ResponseMonitor, is_terms_response,
};
pub use registry::{AccountFaultRegistry, FaultClass};

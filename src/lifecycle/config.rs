//! Runtime-mutable diagnostic settings read by the response monitor.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::anyhow;

/// How much the response monitor records per lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Record nothing.
    Silent,
    /// One summary line per event.
    #[default]
    Normal,
    /// One line per completed request: method, URL, status class, transport error code.
    Compact,
    /// Summary lines plus header and body dumps.
    Verbose,
}

impl Verbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Silent => "silent",
            Verbosity::Normal => "normal",
            Verbosity::Compact => "compact",
            Verbosity::Verbose => "verbose",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = anyhow::Error;

    /// Accepts level names as well as the numeric levels `0`–`3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "disabled" | "off" | "0" => Ok(Verbosity::Silent),
            "normal" | "1" => Ok(Verbosity::Normal),
            "compact" | "2" => Ok(Verbosity::Compact),
            "verbose" | "3" => Ok(Verbosity::Verbose),
            other => Err(anyhow!("unknown verbosity level: {other}")),
        }
    }
}

/// Snapshot of the diagnostic configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub verbosity: Verbosity,
    /// Emit rendered records through `tracing` in addition to the diagnostic sink.
    pub print_log: bool,
    /// Days of file logs to keep. Read by file-log writers, not by the monitor.
    pub retention_days: u32,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            print_log: true,
            retention_days: 30,
        }
    }
}

/// Shared handle to the current [`LogSettings`].
///
/// Clones observe each other's updates. The monitor reads the settings every time
/// an event fires, so a change applies from the next event on.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    inner: Arc<RwLock<LogSettings>>,
}

impl LogConfig {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn with_verbosity(verbosity: Verbosity) -> Self {
        Self::new(LogSettings {
            verbosity,
            ..LogSettings::default()
        })
    }

    pub fn settings(&self) -> LogSettings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn verbosity(&self) -> Verbosity {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .verbosity
    }

    pub fn set_verbosity(&self, verbosity: Verbosity) {
        self.update(|s| s.verbosity = verbosity);
    }

    pub fn set_print_log(&self, print_log: bool) {
        self.update(|s| s.print_log = print_log);
    }

    pub fn set_retention_days(&self, days: u32) {
        self.update(|s| s.retention_days = days);
    }

    pub fn update(&self, f: impl FnOnce(&mut LogSettings)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

//! Service lifecycle state snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Health value meaning "working normally". Values 0–5 are reserved for the
/// runtime; a concrete service defines its own values above that range.
pub const STATE_OK: i64 = 1;

/// Health value published by the runtime after a recoverable downstream
/// fault.
pub const STATE_ERROR: i64 = 2;

/// Immutable snapshot of a worker's lifecycle and health.
///
/// Structural equality gates state publication: the worker sends a STATE
/// message only when the recomputed snapshot differs from the last one sent,
/// so the channel carries actual changes and nothing else.
///
/// The optional `value`/`message` pair is domain-specific health information;
/// the runtime treats it opaquely apart from the reserved values above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireState", into = "WireState")]
pub struct ServiceState {
    enabled: bool,
    shutting_down: bool,
    value: Option<i64>,
    message: Option<String>,
}

impl ServiceState {
    /// A shutting-down service is never enabled; the constructor enforces it.
    pub fn new(
        enabled: bool,
        shutting_down: bool,
        value: Option<i64>,
        message: Option<String>,
    ) -> Self {
        Self {
            enabled: enabled && !shutting_down,
            shutting_down,
            value,
            message,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn value(&self) -> Option<i64> {
        self.value
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new(false, false, None, None)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service [enabled={} shutdown={}",
            self.enabled, self.shutting_down
        )?;
        if let Some(value) = self.value {
            write!(f, " value={value}")?;
            if let Some(message) = &self.message {
                write!(f, " msg={message}")?;
            }
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// On-the-wire shape: `{service: {enable, shutdown}, value, msg}`.
#[derive(Serialize, Deserialize)]
struct WireState {
    service: WireFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireFlags {
    enable: bool,
    shutdown: bool,
}

impl From<WireState> for ServiceState {
    fn from(wire: WireState) -> Self {
        Self::new(
            wire.service.enable,
            wire.service.shutdown,
            wire.value,
            wire.msg,
        )
    }
}

impl From<ServiceState> for WireState {
    fn from(state: ServiceState) -> Self {
        Self {
            service: WireFlags {
                enable: state.enabled,
                shutdown: state.shutting_down,
            },
            value: state.value,
            msg: state.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Error types for the service control-plane.

use thiserror::Error;

/// All errors that can arise from the channel, the protocol, and the worker
/// runtime.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Underlying socket I/O failure.
    #[error("channel I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Malformed wire envelope. Should not occur with a trusted peer; the
    /// runtime treats it as fatal when it happens mid-loop.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON encoding failure on the send path.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer closed the channel.
    #[error("channel closed by peer during {0}")]
    ChannelClosed(&'static str),

    /// Settings lookup or validation failure surfaced through a hook.
    #[error("settings error: {0}")]
    Settings(#[from] lumo_core::SettingsError),

    /// Connector operation attempted before a worker connected.
    #[error("no worker connected; call accept() first")]
    NotConnected,

    /// Connector shutdown requires the state monitor.
    #[error("state monitor is not running; call start_monitor() first")]
    MonitorNotRunning,

    /// A fatal fault escaped the periodic work function.
    #[error("service work failed fatally: {0}")]
    Work(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub(crate) fn io_err(context: &'static str, source: std::io::Error) -> ServiceError {
    ServiceError::Io { context, source }
}

/// Failure of one periodic work invocation.
///
/// `Downstream` is the one recoverable case: the runtime publishes an error
/// state and retries after a backoff. Anything else terminates the worker.
#[derive(Debug, Error)]
pub enum WorkError {
    /// Typed fault from the external collaborator the work depends on.
    #[error("downstream fault: {0}")]
    Downstream(String),

    /// Unanticipated failure; propagates out of the worker's main loop.
    #[error(transparent)]
    Fatal(Box<dyn std::error::Error + Send + Sync>),
}

impl From<ServiceError> for WorkError {
    fn from(err: ServiceError) -> Self {
        WorkError::Fatal(Box::new(err))
    }
}

impl From<lumo_core::SettingsError> for WorkError {
    fn from(err: lumo_core::SettingsError) -> Self {
        WorkError::Fatal(Box::new(err))
    }
}

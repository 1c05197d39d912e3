//! Boundary to the downstream LED controller protocol client.

use thiserror::Error;

use crate::frame::Frame;

/// Typed fault raised by the LED protocol client (connection refused, send
/// timeout, protocol rejection). The runtime recovers from these: it
/// publishes an error state and retries after a backoff.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LedFault {
    message: String,
}

impl LedFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Where the LED controller listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedEndpoint {
    pub address: String,
    pub port: u16,
}

/// Protocol client surface the capture service depends on.
///
/// Implementations speak the actual controller protocol; this crate ships
/// only [`DrySink`]. A client is reconfigured (not recreated) when the
/// endpoint settings change: the service disconnects it first, then the next
/// connect uses the new endpoint.
pub trait LedClient {
    fn configure(&mut self, endpoint: LedEndpoint);

    fn connect(&mut self) -> Result<(), LedFault>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Push one frame with a priority and an on-screen duration in
    /// milliseconds.
    fn send_frame(&mut self, frame: &Frame, priority: i64, duration_ms: u64)
        -> Result<(), LedFault>;
}

/// Stand-in client that counts and discards frames. Lets the worker binary
/// run without a reachable LED controller.
#[derive(Debug, Default)]
pub struct DrySink {
    endpoint: Option<LedEndpoint>,
    connected: bool,
    frames: u64,
}

impl DrySink {
    pub fn frames_sent(&self) -> u64 {
        self.frames
    }
}

impl LedClient for DrySink {
    fn configure(&mut self, endpoint: LedEndpoint) {
        tracing::debug!(address = %endpoint.address, port = endpoint.port, "dry sink configured");
        self.endpoint = Some(endpoint);
    }

    fn connect(&mut self) -> Result<(), LedFault> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_frame(
        &mut self,
        frame: &Frame,
        priority: i64,
        duration_ms: u64,
    ) -> Result<(), LedFault> {
        self.frames += 1;
        tracing::trace!(
            width = frame.width,
            height = frame.height,
            priority,
            duration_ms,
            total = self.frames,
            "frame discarded"
        );
        Ok(())
    }
}

//! Controller-side connector.
//!
//! Binds the channel endpoint, sends fire-and-forget control messages, and
//! tracks the worker's published state from a background monitor thread. The
//! cached state is the only thing the two threads share; it sits behind a
//! mutex, with a condition variable signalling each fresh update.

use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lumo_core::{ServiceState, SettingsSnapshot};

use crate::channel::ServiceChannel;
use crate::error::{io_err, ServiceError};
use crate::message::{MessageType, ServiceMessage};

struct StateCell {
    inner: Mutex<CellInner>,
    signal: Condvar,
}

struct CellInner {
    state: ServiceState,
    /// Resettable update event: set by the monitor, cleared by the waiter
    /// that consumes it.
    fresh: bool,
}

/// Controller-side handle to one worker.
pub struct ServiceConnector {
    listener: TcpListener,
    channel: Option<ServiceChannel>,
    cell: Arc<StateCell>,
    monitor: Option<JoinHandle<()>>,
}

impl ServiceConnector {
    /// Bind a listener on an OS-assigned localhost port. The port is handed
    /// to the worker process out-of-band (e.g. as `--port`).
    pub fn bind() -> Result<(Self, u16), ServiceError> {
        let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| io_err("bind", e))?;
        let port = listener.local_addr().map_err(|e| io_err("bind", e))?.port();
        tracing::info!(port, "connector bound");
        let connector = Self {
            listener,
            channel: None,
            cell: Arc::new(StateCell {
                inner: Mutex::new(CellInner {
                    state: ServiceState::default(),
                    fresh: false,
                }),
                signal: Condvar::new(),
            }),
            monitor: None,
        };
        Ok((connector, port))
    }

    /// Block until the worker connects.
    pub fn accept(&mut self) -> Result<(), ServiceError> {
        let (stream, peer) = self.listener.accept().map_err(|e| io_err("accept", e))?;
        stream.set_nodelay(true).map_err(|e| io_err("accept", e))?;
        tracing::debug!(peer = %peer, "worker connected");
        self.channel = Some(ServiceChannel::new(stream));
        Ok(())
    }

    /// Spawn the monitor: an indefinitely-blocking receive loop that consumes
    /// STATE messages only, refreshes the cached state, and wakes waiters.
    /// Any other message it reads off the channel is discarded by the
    /// filtering receive, so the channel must not carry non-STATE traffic
    /// toward the controller while monitoring is active.
    pub fn start_monitor(&mut self) -> Result<(), ServiceError> {
        let channel = self.channel.as_ref().ok_or(ServiceError::NotConnected)?;
        let mut monitor_channel = channel.try_clone()?;
        let cell = Arc::clone(&self.cell);
        let handle = thread::spawn(move || loop {
            match monitor_channel.recv_matching(Some(MessageType::State)) {
                Ok(message) => match message.service_state() {
                    Ok(state) => {
                        tracing::debug!(state = %state, "state update received");
                        let mut inner = cell.inner.lock().expect("state cell poisoned");
                        inner.state = state;
                        inner.fresh = true;
                        cell.signal.notify_all();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring malformed state payload");
                    }
                },
                Err(err) => {
                    tracing::debug!(error = %err, "monitor stopped");
                    break;
                }
            }
        });
        self.monitor = Some(handle);
        Ok(())
    }

    // -- control messages (fire-and-forget) --------------------------------

    pub fn send_enable(&mut self, enable: bool) -> Result<(), ServiceError> {
        self.send(&ServiceMessage::enable(enable))
    }

    pub fn send_kill(&mut self) -> Result<(), ServiceError> {
        self.send(&ServiceMessage::kill())
    }

    pub fn send_settings(&mut self, snapshot: &SettingsSnapshot) -> Result<(), ServiceError> {
        self.send(&ServiceMessage::settings(snapshot)?)
    }

    fn send(&mut self, message: &ServiceMessage) -> Result<(), ServiceError> {
        self.channel
            .as_mut()
            .ok_or(ServiceError::NotConnected)?
            .send(message)
    }

    // -- state observation --------------------------------------------------

    /// Latest cached state. Updated only while the monitor runs; a connector
    /// that never started monitoring reports the default state forever.
    pub fn state(&self) -> ServiceState {
        self.cell
            .inner
            .lock()
            .expect("state cell poisoned")
            .state
            .clone()
    }

    /// Block until the monitor records a state update, or until `timeout`
    /// elapses. Returns whether an update occurred; the update event resets
    /// on consumption.
    pub fn wait_for_update(&self, timeout: Option<Duration>) -> bool {
        let mut inner = self.cell.inner.lock().expect("state cell poisoned");
        match timeout {
            None => {
                while !inner.fresh {
                    inner = self.cell.signal.wait(inner).expect("state cell poisoned");
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !inner.fresh {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    inner = self
                        .cell
                        .signal
                        .wait_timeout(inner, deadline - now)
                        .expect("state cell poisoned")
                        .0;
                }
            }
        }
        inner.fresh = false;
        true
    }

    /// Send KILL and wait until the worker reports it is shutting down.
    ///
    /// No built-in timeout: a non-responsive worker blocks the caller
    /// indefinitely. Wrap externally when bounded behavior is required.
    pub fn shutdown(&mut self) -> Result<(), ServiceError> {
        if self.monitor.is_none() {
            return Err(ServiceError::MonitorNotRunning);
        }
        self.send_kill()?;
        while !self.state().is_shutting_down() {
            if !self.wait_for_update(None) {
                break;
            }
        }
        tracing::info!("worker confirmed shutdown");
        Ok(())
    }
}

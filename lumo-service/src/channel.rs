//! Blocking point-to-point transport: newline-delimited JSON over TCP.
//!
//! One reliable ordered connection per (controller, worker) pair. The
//! controller binds a localhost port and shares it out-of-band; the worker
//! connects. There is no broadcast and no queueing beyond the socket's own
//! buffering.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use crate::error::{io_err, ServiceError};
use crate::message::{MessageType, ServiceMessage};

const READ_CHUNK: usize = 4096;

/// One side of the private controller↔worker link.
pub struct ServiceChannel {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl ServiceChannel {
    /// Worker side: connect to the controller's listener on localhost.
    pub fn connect(port: u16) -> Result<Self, ServiceError> {
        let stream =
            TcpStream::connect(("127.0.0.1", port)).map_err(|e| io_err("connect", e))?;
        stream.set_nodelay(true).map_err(|e| io_err("connect", e))?;
        Ok(Self::new(stream))
    }

    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Clone the underlying socket for a second reader/writer thread.
    ///
    /// Must happen before any receive: buffered bytes are not shared between
    /// clones.
    pub(crate) fn try_clone(&self) -> Result<Self, ServiceError> {
        debug_assert!(self.pending.is_empty(), "clone before reading");
        let stream = self.stream.try_clone().map_err(|e| io_err("clone", e))?;
        Ok(Self::new(stream))
    }

    /// Send one message.
    pub fn send(&mut self, message: &ServiceMessage) -> Result<(), ServiceError> {
        let mut line = message.encode()?;
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .map_err(|e| io_err("send", e))
    }

    /// Non-blocking poll: `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Result<Option<ServiceMessage>, ServiceError> {
        if let Some(line) = self.take_line() {
            return ServiceMessage::decode(&line).map(Some);
        }

        self.stream
            .set_nonblocking(true)
            .map_err(|e| io_err("poll", e))?;
        let outcome = self.fill_once(true);
        self.stream
            .set_nonblocking(false)
            .map_err(|e| io_err("poll", e))?;
        outcome?;

        match self.take_line() {
            Some(line) => ServiceMessage::decode(&line).map(Some),
            None => Ok(None),
        }
    }

    /// Block until the next message arrives.
    pub fn recv(&mut self) -> Result<ServiceMessage, ServiceError> {
        self.recv_matching(None)
    }

    /// Block until a message of `wanted` type arrives.
    ///
    /// Any message of a different type read in the meantime is silently
    /// discarded: this is a filtering wait over a single-purpose link, not a
    /// queryable queue, and discarded messages are gone for good.
    pub fn recv_matching(
        &mut self,
        wanted: Option<MessageType>,
    ) -> Result<ServiceMessage, ServiceError> {
        loop {
            while let Some(line) = self.take_line() {
                let message = ServiceMessage::decode(&line)?;
                match wanted {
                    None => return Ok(message),
                    Some(kind) if message.kind() == kind => return Ok(message),
                    Some(_) => {
                        tracing::trace!(discarded = ?message.kind(), "filtering receive dropped message");
                    }
                }
            }
            self.fill_once(false)?;
        }
    }

    /// Read from the socket into the pending buffer.
    ///
    /// In non-blocking mode returns as soon as the socket would block or a
    /// full line is buffered; in blocking mode returns after one successful
    /// read.
    fn fill_once(&mut self, nonblocking: bool) -> Result<(), ServiceError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ServiceError::ChannelClosed("receive")),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if !nonblocking || self.pending.contains(&b'\n') {
                        return Ok(());
                    }
                }
                Err(err) if nonblocking && err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_err("receive", err)),
            }
        }
    }

    /// Pop one complete line off the pending buffer, if present.
    fn take_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

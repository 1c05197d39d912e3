//! Lumo service control-plane.
//!
//! A controller process starts, enables, configures, and observes
//! independent long-running workers over one private point-to-point channel.
//! This crate holds both halves:
//!
//! - [`message`] — the JSON-line wire envelope
//! - [`channel`] — blocking transport with non-blocking poll and filtering
//!   receive
//! - [`runtime`] — the worker-side lifecycle loop and the [`Service`] trait
//! - [`connector`] — the controller-side API with a background state monitor
//! - [`telemetry`] — tracing bootstrap for worker binaries

pub mod channel;
pub mod connector;
pub mod error;
pub mod message;
pub mod runtime;
pub mod telemetry;

pub use channel::ServiceChannel;
pub use connector::ServiceConnector;
pub use error::{ServiceError, WorkError};
pub use message::{MessageType, ServiceMessage};
pub use runtime::{Service, ServiceContext, ServiceRuntime};

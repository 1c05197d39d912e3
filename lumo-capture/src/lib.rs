//! Lumo capture worker — periodic screen frames pushed to an LED controller.
//!
//! The heavy lifting (OS screen capture, the LED controller's wire protocol)
//! lives behind the [`FrameSource`] and [`LedClient`] traits; this crate
//! supplies the service logic that ties them to the control-plane runtime.

pub mod frame;
pub mod led;
pub mod service;
pub mod settings;

pub use frame::{Frame, FrameSource, TestPattern};
pub use led::{DrySink, LedClient, LedEndpoint, LedFault};
pub use service::CaptureService;

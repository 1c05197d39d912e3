//! Worker-side lifecycle runtime.
//!
//! [`ServiceRuntime`] owns the channel, the settings store, and the lifecycle
//! flags, and drives a single-threaded cooperative loop: run the periodic
//! work while enabled, otherwise block on the next control message. Nothing
//! here is shared across threads, so there are no locks.
//!
//! Lifecycle, driven entirely by incoming messages:
//! - start: initial state published; setup runs immediately, or is deferred
//!   until the first SETTINGS snapshot when the service requires one
//! - ENABLE toggles the enabled flag and the service's enable hook
//! - KILL (idempotent) forces disable, runs the shutdown hook, publishes the
//!   final state, and ends the loop
//!
//! A state message goes out only when the recomputed [`ServiceState`] differs
//! from the last one sent.

use std::thread;
use std::time::Duration;

use lumo_core::{ServiceState, SettingsStore, STATE_ERROR};

use crate::channel::ServiceChannel;
use crate::error::{ServiceError, WorkError};
use crate::message::{MessageType, ServiceMessage};

/// Polling granularity for interruptible delays: pending control messages
/// are checked this often while the runtime sits out an error backoff.
const SAFE_DELAY_INCREMENT: Duration = Duration::from_millis(500);

/// Default pause after a recoverable downstream fault.
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Capability set a concrete worker implements; the runtime invokes these
/// hooks, the service never calls the runtime back except through
/// [`ServiceContext`].
pub trait Service {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// When true the runtime defers [`Service::setup`] until the first
    /// SETTINGS snapshot arrives, buffering any earlier enable request.
    fn requires_settings(&self) -> bool {
        false
    }

    /// Register settings units on the store. Runs once, before the loop.
    fn register_settings(&mut self, _store: &mut SettingsStore) {}

    /// One-time setup.
    fn setup(&mut self, _ctx: &mut ServiceContext<'_>) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Called on every enable/disable transition once setup has run.
    fn on_enable(
        &mut self,
        _enable: bool,
        _ctx: &mut ServiceContext<'_>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Called once when a KILL message starts shutdown.
    fn on_shutdown(&mut self, _ctx: &mut ServiceContext<'_>) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Called for received messages the runtime itself does not consume.
    fn on_message(
        &mut self,
        _message: ServiceMessage,
        _ctx: &mut ServiceContext<'_>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    /// One periodic work invocation. Runs only while enabled and set up.
    fn run_once(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), WorkError>;
}

/// Runtime facilities handed to service hooks.
pub struct ServiceContext<'a> {
    channel: &'a mut ServiceChannel,
    publisher: &'a mut StatePublisher,
    settings: &'a SettingsStore,
}

impl ServiceContext<'_> {
    pub fn settings(&self) -> &SettingsStore {
        self.settings
    }

    /// Publish a new health value and message. Deduplicated: nothing is sent
    /// when the resulting state equals the last published one.
    pub fn update_state(
        &mut self,
        value: i64,
        message: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.publisher
            .publish(self.channel, Some(value), message.map(str::to_owned))
    }
}

/// Publication-side state tracking with value-equality dedup.
#[derive(Default)]
struct StatePublisher {
    enabled: bool,
    shutting_down: bool,
    value: Option<i64>,
    published: Option<ServiceState>,
}

impl StatePublisher {
    /// Recompute the public state and send it if it changed. A `None` value
    /// carries the previous health value forward; the message never carries.
    fn publish(
        &mut self,
        channel: &mut ServiceChannel,
        value: Option<i64>,
        message: Option<String>,
    ) -> Result<(), ServiceError> {
        let value = value.or(self.value);
        self.value = value;
        let state = ServiceState::new(self.enabled, self.shutting_down, value, message);
        if self.published.as_ref() != Some(&state) {
            tracing::debug!(state = %state, "publishing state");
            channel.send(&ServiceMessage::state(&state)?)?;
            self.published = Some(state);
        }
        Ok(())
    }
}

/// Generic worker runtime; see the module docs for the lifecycle it drives.
pub struct ServiceRuntime<S: Service> {
    service: S,
    channel: ServiceChannel,
    settings: SettingsStore,
    publisher: StatePublisher,
    initialized: bool,
    error_backoff: Duration,
}

impl<S: Service> ServiceRuntime<S> {
    /// Build a runtime with an empty settings store.
    pub fn new(channel: ServiceChannel, service: S) -> Result<Self, ServiceError> {
        Self::with_store(channel, service, SettingsStore::new())
    }

    /// Build a runtime around a pre-seeded settings store, publish the
    /// initial state, and run setup unless the service requires settings
    /// first.
    pub fn with_store(
        channel: ServiceChannel,
        mut service: S,
        mut settings: SettingsStore,
    ) -> Result<Self, ServiceError> {
        service.register_settings(&mut settings);
        let mut runtime = Self {
            service,
            channel,
            settings,
            publisher: StatePublisher::default(),
            initialized: false,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        };
        runtime.publish(None, None)?;
        if !runtime.service.requires_settings() {
            runtime.initialize()?;
        }
        Ok(runtime)
    }

    /// Override the pause after a recoverable downstream fault.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Main loop; returns once shutdown completes or a fatal error occurs.
    pub fn run(mut self) -> Result<(), ServiceError> {
        tracing::info!(service = self.service.name(), "service loop started");
        while !self.publisher.shutting_down {
            let message = if self.publisher.enabled && self.initialized {
                self.work_once()?;
                if self.publisher.shutting_down {
                    // A KILL handled during the fault backoff.
                    break;
                }
                self.channel.try_recv()?
            } else {
                Some(self.channel.recv()?)
            };
            if let Some(message) = message {
                self.handle_message(message)?;
            }
        }
        tracing::info!(service = self.service.name(), "service loop exited");
        Ok(())
    }

    // -- message handling --------------------------------------------------

    fn handle_message(&mut self, message: ServiceMessage) -> Result<(), ServiceError> {
        tracing::debug!(
            service = self.service.name(),
            kind = ?message.kind(),
            "message received"
        );
        match message.kind() {
            MessageType::Enable => {
                let enable = message.enable_flag()?;
                if enable != self.publisher.enabled {
                    self.publisher.enabled = enable;
                    if self.initialized {
                        self.hook_enable(enable)?;
                    }
                    self.publish(None, None)?;
                }
            }
            MessageType::Kill => {
                if !self.publisher.shutting_down {
                    self.publisher.shutting_down = true;
                    self.publisher.enabled = false;
                    if self.initialized {
                        self.hook_enable(false)?;
                    }
                    self.hook_shutdown()?;
                    self.publish(None, None)?;
                }
            }
            MessageType::Settings => {
                let snapshot = message.settings_snapshot()?;
                match self.settings.apply_snapshot(&snapshot) {
                    Ok(notified) => {
                        if !notified.is_empty() {
                            tracing::debug!(units = notified.len(), "settings units notified");
                        }
                        if !self.initialized {
                            self.initialize()?;
                        }
                        self.publish(None, None)?;
                    }
                    // Policy: an invalid snapshot is rejected wholesale and
                    // the previous values stay in force.
                    Err(err) => {
                        tracing::warn!(error = %err, "settings snapshot rejected");
                    }
                }
            }
            MessageType::State => {
                let Self {
                    service,
                    channel,
                    publisher,
                    settings,
                    ..
                } = self;
                let mut ctx = ServiceContext {
                    channel,
                    publisher,
                    settings,
                };
                service.on_message(message, &mut ctx)?;
            }
        }
        Ok(())
    }

    // -- work and recovery -------------------------------------------------

    fn work_once(&mut self) -> Result<(), ServiceError> {
        let outcome = {
            let Self {
                service,
                channel,
                publisher,
                settings,
                ..
            } = self;
            let mut ctx = ServiceContext {
                channel,
                publisher,
                settings,
            };
            service.run_once(&mut ctx)
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(WorkError::Downstream(message)) => {
                tracing::warn!(
                    service = self.service.name(),
                    error = %message,
                    "downstream fault; backing off"
                );
                self.publish(Some(STATE_ERROR), Some(message))?;
                self.interruptible_delay(self.error_backoff)
            }
            Err(WorkError::Fatal(source)) => Err(ServiceError::Work(source)),
        }
    }

    /// Sleep for `delay`, waking every [`SAFE_DELAY_INCREMENT`] to process
    /// pending control messages. Returns early once shutdown begins, so a
    /// KILL lands within one increment rather than after the full delay.
    fn interruptible_delay(&mut self, delay: Duration) -> Result<(), ServiceError> {
        let mut remaining = delay;
        while remaining > SAFE_DELAY_INCREMENT {
            thread::sleep(SAFE_DELAY_INCREMENT);
            remaining -= SAFE_DELAY_INCREMENT;
            if let Some(message) = self.channel.try_recv()? {
                self.handle_message(message)?;
            }
            if self.publisher.shutting_down {
                return Ok(());
            }
        }
        thread::sleep(remaining);
        Ok(())
    }

    // -- lifecycle helpers -------------------------------------------------

    fn initialize(&mut self) -> Result<(), ServiceError> {
        {
            let Self {
                service,
                channel,
                publisher,
                settings,
                ..
            } = self;
            let mut ctx = ServiceContext {
                channel,
                publisher,
                settings,
            };
            service.setup(&mut ctx)?;
        }
        self.initialized = true;
        tracing::debug!(service = self.service.name(), "setup complete");
        // Re-apply an enable request buffered while waiting for settings.
        if self.publisher.enabled {
            self.hook_enable(true)?;
        }
        Ok(())
    }

    fn hook_enable(&mut self, enable: bool) -> Result<(), ServiceError> {
        let Self {
            service,
            channel,
            publisher,
            settings,
            ..
        } = self;
        let mut ctx = ServiceContext {
            channel,
            publisher,
            settings,
        };
        service.on_enable(enable, &mut ctx)
    }

    fn hook_shutdown(&mut self) -> Result<(), ServiceError> {
        let Self {
            service,
            channel,
            publisher,
            settings,
            ..
        } = self;
        let mut ctx = ServiceContext {
            channel,
            publisher,
            settings,
        };
        service.on_shutdown(&mut ctx)
    }

    fn publish(&mut self, value: Option<i64>, message: Option<String>) -> Result<(), ServiceError> {
        self.publisher.publish(&mut self.channel, value, message)
    }
}

//! Lumo core library — service state, settings, and timing primitives.
//!
//! Leaf building blocks shared by the worker runtime and the controller:
//! - [`state`] — [`ServiceState`] lifecycle/health snapshot
//! - [`settings`] — keyed store with change-gated unit callbacks
//! - [`timer`] — [`DelayTimer`] drift-corrected cadence
//! - [`error`] — [`SettingsError`]

pub mod error;
pub mod settings;
pub mod state;
pub mod timer;

pub use error::SettingsError;
pub use settings::{
    SettingKey, SettingSpec, SettingValue, SettingsRegistry, SettingsSnapshot, SettingsStore,
    UnitId,
};
pub use state::{ServiceState, STATE_ERROR, STATE_OK};
pub use timer::DelayTimer;

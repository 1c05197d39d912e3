//! Error types for lumo-core.

use thiserror::Error;

use crate::settings::SettingKey;

/// All errors that can arise from settings validation and lookup.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A snapshot value does not have the type the registry declares for its
    /// key. The whole snapshot is rejected when this happens.
    #[error("invalid value for setting '{key}': expected {expected}, got {found}")]
    TypeMismatch {
        key: SettingKey,
        expected: &'static str,
        found: &'static str,
    },

    /// A setting was read before any value was applied to it.
    #[error("setting '{0}' has no value")]
    Undefined(SettingKey),

    /// A setting was read as a type it does not hold.
    #[error("setting '{key}' is not a {expected}")]
    WrongType {
        key: SettingKey,
        expected: &'static str,
    },
}

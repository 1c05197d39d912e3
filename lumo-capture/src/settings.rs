//! Capture worker settings: keys and typed defaults.
//!
//! The key set is owned by the surrounding application; the controller sends
//! the complete snapshot (these keys plus whatever other services own) on
//! every settings update.

use lumo_core::{SettingKey, SettingSpec, SettingValue, SettingsRegistry};

pub const SCALE_WIDTH: &str = "capture_width";
pub const SCALE_HEIGHT: &str = "capture_height";
pub const PRIORITY: &str = "capture_priority";
pub const FRAME_RATE: &str = "capture_frame_rate";
pub const LED_ADDRESS: &str = "led_address";
pub const LED_PORT: &str = "led_port";

/// Immutable registry of every capture setting with its default.
pub fn registry() -> SettingsRegistry {
    SettingsRegistry::new(vec![
        spec(SCALE_WIDTH, "capture", SettingValue::Int(64)),
        spec(SCALE_HEIGHT, "capture", SettingValue::Int(64)),
        spec(PRIORITY, "capture", SettingValue::Int(900)),
        spec(FRAME_RATE, "capture", SettingValue::Int(30)),
        spec(LED_ADDRESS, "led", SettingValue::from("127.0.0.1")),
        spec(LED_PORT, "led", SettingValue::Int(19445)),
    ])
}

fn spec(key: &str, section: &'static str, default: SettingValue) -> SettingSpec {
    SettingSpec {
        key: SettingKey::from(key),
        section,
        default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_key_with_a_typed_default() {
        let defaults = registry().defaults();
        for key in [SCALE_WIDTH, SCALE_HEIGHT, PRIORITY, FRAME_RATE, LED_PORT] {
            assert!(
                defaults.get(&SettingKey::from(key)).and_then(SettingValue::as_int).is_some(),
                "{key} must default to an integer"
            );
        }
        assert_eq!(
            defaults
                .get(&SettingKey::from(LED_ADDRESS))
                .and_then(SettingValue::as_str),
            Some("127.0.0.1")
        );
    }
}

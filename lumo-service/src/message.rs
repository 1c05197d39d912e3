//! Wire envelope for the control channel.
//!
//! `{"type": <integer>, "data": <self-describing JSON>}`, one envelope per
//! line. Messages are immutable once constructed and are never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lumo_core::{ServiceState, SettingsSnapshot};

use crate::error::ServiceError;

/// Message discriminants as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `data: bool` — enable or disable the worker.
    Enable,
    /// `data: none` — begin shutdown.
    Kill,
    /// `data: mapping` — complete settings snapshot.
    Settings,
    /// `data: state` — worker's published lifecycle/health state.
    State,
}

impl MessageType {
    fn code(self) -> u8 {
        match self {
            MessageType::Enable => 0,
            MessageType::Kill => 1,
            MessageType::Settings => 2,
            MessageType::State => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self, ServiceError> {
        match code {
            0 => Ok(MessageType::Enable),
            1 => Ok(MessageType::Kill),
            2 => Ok(MessageType::Settings),
            3 => Ok(MessageType::State),
            other => Err(ServiceError::Protocol(format!(
                "unknown message type {other}"
            ))),
        }
    }
}

/// One control-channel message: a type plus an optional opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMessage {
    kind: MessageType,
    data: Option<Value>,
}

impl ServiceMessage {
    pub fn enable(flag: bool) -> Self {
        Self {
            kind: MessageType::Enable,
            data: Some(Value::Bool(flag)),
        }
    }

    pub fn kill() -> Self {
        Self {
            kind: MessageType::Kill,
            data: None,
        }
    }

    pub fn settings(snapshot: &SettingsSnapshot) -> Result<Self, ServiceError> {
        Ok(Self {
            kind: MessageType::Settings,
            data: Some(serde_json::to_value(snapshot)?),
        })
    }

    pub fn state(state: &ServiceState) -> Result<Self, ServiceError> {
        Ok(Self {
            kind: MessageType::State,
            data: Some(serde_json::to_value(state)?),
        })
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    // -- typed payload accessors -------------------------------------------

    pub fn enable_flag(&self) -> Result<bool, ServiceError> {
        self.data
            .as_ref()
            .and_then(Value::as_bool)
            .ok_or_else(|| ServiceError::Protocol("ENABLE payload must be a boolean".into()))
    }

    pub fn settings_snapshot(&self) -> Result<SettingsSnapshot, ServiceError> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| ServiceError::Protocol("SETTINGS payload missing".into()))?;
        serde_json::from_value(data)
            .map_err(|err| ServiceError::Protocol(format!("bad SETTINGS payload: {err}")))
    }

    pub fn service_state(&self) -> Result<ServiceState, ServiceError> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| ServiceError::Protocol("STATE payload missing".into()))?;
        serde_json::from_value(data)
            .map_err(|err| ServiceError::Protocol(format!("bad STATE payload: {err}")))
    }

    // -- wire form ---------------------------------------------------------

    /// Encode as a single JSON line (no trailing newline).
    pub fn encode(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string(&WireEnvelope {
            kind: self.kind.code(),
            data: self.data.clone(),
        })?)
    }

    /// Decode one JSON line. Malformed input is a
    /// [`ServiceError::Protocol`].
    pub fn decode(line: &str) -> Result<Self, ServiceError> {
        let envelope: WireEnvelope = serde_json::from_str(line)
            .map_err(|err| ServiceError::Protocol(format!("malformed envelope: {err}")))?;
        Ok(Self {
            kind: MessageType::from_code(envelope.kind)?,
            data: envelope.data,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lumo_core::SettingValue;
    use rstest::rstest;

    use super::*;

    fn sample_snapshot() -> SettingsSnapshot {
        [
            ("led_address".into(), SettingValue::from("10.0.0.2")),
            ("led_port".into(), SettingValue::Int(19445)),
            ("capture_enabled".into(), SettingValue::Bool(true)),
        ]
        .into_iter()
        .collect()
    }

    #[rstest]
    #[case::enable(ServiceMessage::enable(true))]
    #[case::disable(ServiceMessage::enable(false))]
    #[case::kill(ServiceMessage::kill())]
    #[case::settings(ServiceMessage::settings(&sample_snapshot()).expect("settings"))]
    #[case::state(
        ServiceMessage::state(&ServiceState::new(true, false, Some(2), Some("led timeout".into())))
            .expect("state")
    )]
    fn encode_decode_round_trip(#[case] message: ServiceMessage) {
        let line = message.encode().expect("encode");
        let decoded = ServiceMessage::decode(&line).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn wire_uses_integer_type_codes() {
        let line = ServiceMessage::kill().encode().expect("encode");
        assert_eq!(line, r#"{"type":1}"#);

        let line = ServiceMessage::enable(true).encode().expect("encode");
        assert_eq!(line, r#"{"type":0,"data":true}"#);
    }

    #[test]
    fn malformed_input_is_a_protocol_error() {
        for bad in ["", "not json", r#"{"type":"enable"}"#, r#"{"data":true}"#] {
            let err = ServiceMessage::decode(bad).expect_err("must fail");
            assert!(matches!(err, ServiceError::Protocol(_)), "input: {bad:?}");
        }
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        let err = ServiceMessage::decode(r#"{"type":9}"#).expect_err("must fail");
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[test]
    fn typed_accessors_check_payload_shape() {
        assert!(ServiceMessage::enable(true).enable_flag().expect("flag"));
        assert!(ServiceMessage::kill().enable_flag().is_err());

        let message = ServiceMessage::settings(&sample_snapshot()).expect("settings");
        let snapshot = message.settings_snapshot().expect("snapshot");
        assert_eq!(
            snapshot.get(&"led_port".into()),
            Some(&SettingValue::Int(19445))
        );

        let state = ServiceState::new(false, true, None, None);
        let message = ServiceMessage::state(&state).expect("state");
        assert_eq!(message.service_state().expect("state"), state);
    }
}

//! Keyed settings store with change-gated unit callbacks.
//!
//! A worker receives the *complete* settings snapshot on every update, never
//! a delta. The store diffs the snapshot against its current values and fires
//! each unit's callback at most once per applied snapshot, only when at least
//! one of the unit's keys actually changed. Callbacks run in unit
//! registration order, which keeps notification order deterministic.
//!
//! The store is owned by the worker's single execution thread and is never
//! shared, so callbacks may capture `Rc`/`Cell` state freely.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

// ---------------------------------------------------------------------------
// Keys and values
// ---------------------------------------------------------------------------

/// A strongly-typed settings key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SettingKey(pub String);

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SettingKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SettingKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A typed scalar setting value.
///
/// Variant order matters for deserialization: `Bool` must come before `Int`
/// so JSON booleans are not read as integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SettingValue {
    /// Human-readable type name, used in validation errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "boolean",
            SettingValue::Int(_) => "integer",
            SettingValue::Str(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for SettingValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// A complete settings mapping, sent wholesale between processes.
pub type SettingsSnapshot = BTreeMap<SettingKey, SettingValue>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One known setting: key, diagnostic section, and typed default.
#[derive(Debug, Clone)]
pub struct SettingSpec {
    pub key: SettingKey,
    pub section: &'static str,
    pub default: SettingValue,
}

/// Immutable table of known settings with their defaults and expected types.
///
/// Constructed explicitly at startup and passed into the store — there is no
/// process-wide registry to mutate.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    specs: Vec<SettingSpec>,
}

impl SettingsRegistry {
    pub fn new(specs: Vec<SettingSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[SettingSpec] {
        &self.specs
    }

    /// The full default snapshot.
    pub fn defaults(&self) -> SettingsSnapshot {
        self.specs
            .iter()
            .map(|spec| (spec.key.clone(), spec.default.clone()))
            .collect()
    }

    /// Check every known key in `snapshot` against its registered type.
    ///
    /// Unknown keys are allowed: one snapshot is shared by every service in
    /// the application and carries keys other services own.
    pub fn validate(&self, snapshot: &SettingsSnapshot) -> Result<(), SettingsError> {
        for spec in &self.specs {
            if let Some(value) = snapshot.get(&spec.key) {
                if value.kind() != spec.default.kind() {
                    return Err(SettingsError::TypeMismatch {
                        key: spec.key.clone(),
                        expected: spec.default.kind(),
                        found: value.kind(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle for a registered settings unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitId(usize);

/// Change-notification callback attached to a unit.
pub type UnitCallback = Box<dyn FnMut()>;

struct Unit {
    keys: BTreeSet<SettingKey>,
    callback: Option<UnitCallback>,
}

/// Keyed value store plus units: named groups of keys sharing one callback.
pub struct SettingsStore {
    registry: SettingsRegistry,
    values: BTreeMap<SettingKey, Option<SettingValue>>,
    units: Vec<Unit>,
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("values", &self.values)
            .field("units", &self.units.len())
            .finish()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    /// Empty store with no known defaults; keys appear via
    /// [`SettingsStore::register_unit`] and stay undefined until the first
    /// snapshot supplies them.
    pub fn new() -> Self {
        Self::with_registry(SettingsRegistry::default())
    }

    /// Store seeded with the registry's defaults. Snapshots are validated
    /// against the registry before application.
    pub fn with_registry(registry: SettingsRegistry) -> Self {
        let values = registry
            .specs()
            .iter()
            .map(|spec| (spec.key.clone(), Some(spec.default.clone())))
            .collect();
        Self {
            registry,
            values,
            units: Vec::new(),
        }
    }

    /// Register a unit. Keys not yet known to the store are added with no
    /// value. Call during setup, before the first snapshot arrives.
    pub fn register_unit(
        &mut self,
        keys: impl IntoIterator<Item = SettingKey>,
        callback: Option<UnitCallback>,
    ) -> UnitId {
        let keys: BTreeSet<SettingKey> = keys.into_iter().collect();
        for key in &keys {
            self.values.entry(key.clone()).or_insert(None);
        }
        self.units.push(Unit { keys, callback });
        UnitId(self.units.len() - 1)
    }

    pub fn get(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.values.get(key).and_then(|slot| slot.as_ref())
    }

    fn require(&self, key: &SettingKey) -> Result<&SettingValue, SettingsError> {
        self.get(key)
            .ok_or_else(|| SettingsError::Undefined(key.clone()))
    }

    pub fn int(&self, key: &SettingKey) -> Result<i64, SettingsError> {
        self.require(key)?
            .as_int()
            .ok_or_else(|| SettingsError::WrongType {
                key: key.clone(),
                expected: "integer",
            })
    }

    pub fn string(&self, key: &SettingKey) -> Result<&str, SettingsError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| SettingsError::WrongType {
                key: key.clone(),
                expected: "string",
            })
    }

    pub fn boolean(&self, key: &SettingKey) -> Result<bool, SettingsError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| SettingsError::WrongType {
                key: key.clone(),
                expected: "boolean",
            })
    }

    /// Currently defined values as a snapshot.
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.values
            .iter()
            .filter_map(|(key, slot)| slot.as_ref().map(|value| (key.clone(), value.clone())))
            .collect()
    }

    /// Apply a complete snapshot.
    ///
    /// Keys unknown to the store are ignored. For each known key whose value
    /// differs, the value is updated and the key marked changed; afterwards
    /// every unit with at least one changed key has its callback invoked once,
    /// in registration order. Returns the ids of those units.
    ///
    /// An invalid snapshot (type mismatch against the registry) is rejected
    /// wholesale: no value changes, no callbacks.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &SettingsSnapshot,
    ) -> Result<Vec<UnitId>, SettingsError> {
        self.registry.validate(snapshot)?;

        let mut changed = BTreeSet::new();
        for (key, value) in snapshot {
            let Some(slot) = self.values.get_mut(key) else {
                continue;
            };
            if slot.as_ref() != Some(value) {
                *slot = Some(value.clone());
                changed.insert(key.clone());
            }
        }

        let mut notified = Vec::new();
        for (index, unit) in self.units.iter_mut().enumerate() {
            if unit.keys.iter().any(|key| changed.contains(key)) {
                if let Some(callback) = unit.callback.as_mut() {
                    callback();
                }
                notified.push(UnitId(index));
            }
        }
        Ok(notified)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

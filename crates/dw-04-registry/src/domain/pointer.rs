//! Chunk pointer state machine.
//!
//! ```text
//! NoPointer ──update(pointer)──▶ Active ──expiresAt <= now──▶ Expired
//!     ▲                            │                             │
//!     └────────update(null)────────┘◀───────────sweep────────────┘
//! ```
//!
//! The stored record keeps pointer and expiry together; the state is derived
//! from them and the current time.

use serde_json::Value;
use shared_types::{ChunkRecord, Timestamp};

use super::errors::RegistryError;

const MAX_POINTER_LEN: usize = 2048;

/// Derived pointer state of a chunk at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerState {
    NoPointer,
    Active,
    /// Expiry elapsed, value still present until the next sweep.
    Expired,
}

/// Compute the pointer state of `record` at `now`.
pub fn pointer_state(record: &ChunkRecord, now: Timestamp) -> PointerState {
    match (&record.pointer, record.pointer_expires_at) {
        (Some(_), Some(expires_at)) if expires_at <= now => PointerState::Expired,
        (Some(_), _) => PointerState::Active,
        (None, _) => PointerState::NoPointer,
    }
}

/// Whether the sweep should clear this record at `now`.
pub fn is_sweepable(record: &ChunkRecord, now: Timestamp) -> bool {
    matches!(record.pointer_expires_at, Some(expires_at) if expires_at <= now)
}

/// Body of `PATCH /manifests/:id/chunks/:index`.
///
/// `pointer` and `expires_at` are tri-state: absent (`None`), explicit null
/// (`Some(None)`), or a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerUpdate {
    pub pointer: Option<Option<String>>,
    pub expires_at: Option<Option<Timestamp>>,
    pub remove_data: bool,
}

impl PointerUpdate {
    pub fn set(pointer: impl Into<String>, expires_at: Option<Timestamp>) -> Self {
        Self {
            pointer: Some(Some(pointer.into())),
            expires_at: Some(expires_at),
            remove_data: false,
        }
    }

    pub fn clear() -> Self {
        Self {
            pointer: Some(None),
            ..Self::default()
        }
    }

    /// Parse from a JSON body, keeping the absent/null distinction.
    pub fn from_json(body: &Value) -> Result<Self, RegistryError> {
        let object = body
            .as_object()
            .ok_or_else(|| RegistryError::InvalidJson("expected a JSON object".into()))?;

        let pointer = match object.get("pointer") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(pointer)) => {
                validate_pointer(pointer)?;
                Some(Some(pointer.clone()))
            }
            Some(other) => {
                return Err(RegistryError::InvalidPointer(format!(
                    "expected string or null, got {other}"
                )))
            }
        };

        let expires_at = match object.get("expiresAt") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => {
                let expiry = value.as_u64().ok_or_else(|| {
                    RegistryError::InvalidExpiry(format!("expected epoch millis, got {value}"))
                })?;
                validate_expiry(expiry)?;
                Some(Some(expiry))
            }
        };

        let remove_data = match object.get("removeData") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(RegistryError::InvalidJson(format!(
                    "removeData must be boolean, got {other}"
                )))
            }
        };

        Ok(Self {
            pointer,
            expires_at,
            remove_data,
        })
    }

    /// Apply to `record`. Returns true when the effective pointer or expiry
    /// changed (value or presence).
    pub fn apply(&self, record: &mut ChunkRecord) -> bool {
        let before = (record.pointer.clone(), record.pointer_expires_at);

        match &self.pointer {
            Some(pointer) => {
                record.pointer = pointer.clone();
                record.pointer_expires_at = self.expires_at.flatten();
            }
            None => {
                if let Some(expires_at) = self.expires_at {
                    record.pointer_expires_at = expires_at;
                }
            }
        }
        if self.remove_data {
            record.data = None;
        }

        before != (record.pointer.clone(), record.pointer_expires_at)
    }
}

pub fn validate_pointer(pointer: &str) -> Result<(), RegistryError> {
    if pointer.trim().is_empty() {
        return Err(RegistryError::InvalidPointer("pointer is empty".into()));
    }
    if pointer.len() > MAX_POINTER_LEN {
        return Err(RegistryError::InvalidPointer(format!(
            "pointer exceeds {MAX_POINTER_LEN} bytes"
        )));
    }
    if pointer.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(RegistryError::InvalidPointer(
            "pointer contains whitespace or control characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_expiry(expires_at: Timestamp) -> Result<(), RegistryError> {
    if expires_at == 0 {
        return Err(RegistryError::InvalidExpiry("expiresAt must be positive".into()));
    }
    Ok(())
}

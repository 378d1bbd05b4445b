//! Breaker phase and the exportable state snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Normal operation, calls pass through
    #[default]
    Closed,

    /// Circuit is open, calls are rejected without being invoked
    Open,

    /// A trial call decides whether to close or reopen
    HalfOpen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Closed => write!(f, "CLOSED"),
            Phase::Open => write!(f, "OPEN"),
            Phase::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Snapshot of everything a breaker remembers.
///
/// This is the unit of external persistence: export it after a call, store
/// it wherever the caller likes, and seed a new breaker with it on the next
/// invocation. Timestamps are milliseconds since the Unix epoch. On the wire
/// an absent timestamp is written as `0`, and both `0` and `null` read back
/// as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerState {
    /// Current phase
    #[serde(default)]
    pub phase: Phase,

    /// Failures in the current window (CLOSED) or trial (HALF_OPEN)
    #[serde(default)]
    pub failure_count: u32,

    /// Successes in the current window (CLOSED) or trial (HALF_OPEN)
    #[serde(default)]
    pub success_count: u32,

    /// Start of the evaluation window, `None` when no window is open
    #[serde(default, with = "zero_as_none")]
    pub first_failure_time: Option<u64>,

    /// Most recent failure
    #[serde(default, with = "zero_as_none")]
    pub last_failure_time: Option<u64>,

    /// Calls are rejected before this instant while OPEN
    #[serde(default, with = "zero_as_none")]
    pub next_attempt: Option<u64>,
}

impl BreakerState {
    /// A fresh CLOSED state with every counter at zero.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Total outcomes counted in the current window or trial.
    pub fn attempts(&self) -> u32 {
        self.failure_count.saturating_add(self.success_count)
    }

    /// Serialize to the JSON snapshot format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

mod zero_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.filter(|&m| m != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_wire_format() {
        let state = BreakerState {
            phase: Phase::HalfOpen,
            failure_count: 2,
            success_count: 1,
            first_failure_time: Some(1_000),
            last_failure_time: Some(1_500),
            next_attempt: None,
        };

        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(json["phase"], "HALF_OPEN");
        assert_eq!(json["failureCount"], 2);
        assert_eq!(json["firstFailureTime"], 1_000);
        assert_eq!(json["nextAttempt"], 0);
    }

    #[test]
    fn test_zero_and_null_read_as_absent() {
        let state = BreakerState::from_json(
            r#"{"phase":"OPEN","failureCount":3,"successCount":0,
                "firstFailureTime":0,"lastFailureTime":null,"nextAttempt":9000}"#,
        )
        .unwrap();

        assert_eq!(state.phase, Phase::Open);
        assert_eq!(state.first_failure_time, None);
        assert_eq!(state.last_failure_time, None);
        assert_eq!(state.next_attempt, Some(9_000));
    }

    #[test]
    fn test_missing_fields_default_to_closed() {
        let state = BreakerState::from_json("{}").unwrap();
        assert_eq!(state, BreakerState::closed());
    }
}

//! The wire envelope every message bus payload travels inside.
use registry_core::PlayerId;
use serde::Deserialize;
use serde::Serialize;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wraps a typed payload with the bus-level routing fields common to
/// every message, per the external message bus contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub correlation_id: String,
    pub timestamp: u64,
    pub version: u32,
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    /// `target_id == None` means broadcast.
    pub fn new(msg_type: &str, sender_id: impl Into<String>, payload: T) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            sender_id: sender_id.into(),
            target_id: None,
            correlation_id: uuid::Uuid::now_v7().to_string(),
            timestamp: now_millis(),
            version: 1,
            payload,
        }
    }

    pub fn targeted(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn correlated_with(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serialize envelope")
    }

    /// Age of this envelope relative to now, for stale-message discard.
    pub fn age_millis(&self) -> u64 {
        now_millis().saturating_sub(self.timestamp)
    }
}

impl<'de, T: Deserialize<'de>> Envelope<T> {
    pub fn from_json(raw: &'de str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Convenience for callers that need to name themselves as a player.
pub fn player_sender(player_id: &PlayerId) -> String {
    player_id.to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time moves forward")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let envelope = Envelope::new("test.message", "sender-1", 42u32).targeted("target-1");
        let json = envelope.to_json();
        let decoded: Envelope<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.payload, 42);
        assert_eq!(decoded.target_id.as_deref(), Some("target-1"));
    }

    #[test]
    fn age_grows_from_zero() {
        let envelope = Envelope::new("test.message", "sender-1", ());
        assert!(envelope.age_millis() < 1000);
    }
}

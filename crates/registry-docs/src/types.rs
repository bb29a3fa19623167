//! Document shapes held by the external document store.
//!
//! These mirror the two collections the registry actually reads: player
//! profiles (consulted for social filtering during routing) and network
//! environment descriptors (consulted for slot family/variant capacity
//! rules). Neither is owned by the registry — it is a read-mostly client
//! of documents written by other services.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A player's durable profile document, keyed `players/<uuid>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDocument {
    pub id: String,
    #[serde(default)]
    pub social: SocialDocument,
}

/// The social subdocument embedded in a [`PlayerDocument`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialDocument {
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub ignores: Vec<String>,
}

impl SocialDocument {
    /// Whether `other` is on this player's ignore list, blocking it from
    /// being routed into the same party/slot.
    pub fn ignores(&self, other: &str) -> bool {
        self.ignores.iter().any(|id| id == other)
    }
}

/// A network environment's descriptor, keyed `network_environments/<envId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDescriptorView {
    pub id: String,
    pub tag: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub min_players: u32,
    pub max_players: u32,
    pub player_factor: f64,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
}

//! Value types exchanged with the routing store, distinct from the
//! pure identity/config types in `registry-core` since these carry
//! store-specific shapes (flattened hash fields, JSON blobs).
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::SlotId;
use registry_core::VariantId;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Provisioning,
    Available,
    Full,
    Closed,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Available => "available",
            Self::Full => "full",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "provisioning" => Some(Self::Provisioning),
            "available" => Some(Self::Available),
            "full" => Some(Self::Full),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Mirror of a `LogicalSlot`, as stored in the `fulcrum:registry:slots:<id>`
/// hash. `metadata` entries are stored under `meta:<key>` fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot_id: SlotId,
    pub server_id: BackendId,
    pub slot_suffix: String,
    pub family: FamilyId,
    #[serde(default)]
    pub variant: Option<VariantId>,
    pub status: SlotStatus,
    pub max_players: u32,
    pub online_players: u32,
    pub last_updated: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SlotRecord {
    /// Flattens into `field, value, field, value, ...` pairs for the
    /// `store_slot` script's ARGV.
    pub fn to_field_pairs(&self) -> Vec<String> {
        let mut pairs = vec![
            "serverId".to_string(),
            self.server_id.to_string(),
            "slotSuffix".to_string(),
            self.slot_suffix.clone(),
            "family".to_string(),
            self.family.to_string(),
            "status".to_string(),
            self.status.as_str().to_string(),
            "maxPlayers".to_string(),
            self.max_players.to_string(),
            "onlinePlayers".to_string(),
            self.online_players.to_string(),
            "lastUpdated".to_string(),
            self.last_updated.to_string(),
        ];
        if let Some(variant) = &self.variant {
            pairs.push("variant".to_string());
            pairs.push(variant.to_string());
        }
        for (key, value) in &self.metadata {
            pairs.push(format!("meta:{key}"));
            pairs.push(value.clone());
        }
        pairs
    }

    /// Reconstructs a record from a `HGETALL`-style flat field map.
    pub fn from_field_map(slot_id: SlotId, fields: HashMap<String, String>) -> Option<Self> {
        let mut metadata = HashMap::new();
        let mut core = HashMap::new();
        for (key, value) in fields {
            if let Some(meta_key) = key.strip_prefix("meta:") {
                metadata.insert(meta_key.to_string(), value);
            } else {
                core.insert(key, value);
            }
        }
        Some(Self {
            slot_id,
            server_id: core.get("serverId")?.as_str().into(),
            slot_suffix: core.get("slotSuffix")?.clone(),
            family: core.get("family")?.as_str().into(),
            variant: core.get("variant").map(|v| v.as_str().into()),
            status: SlotStatus::parse(core.get("status")?)?,
            max_players: core.get("maxPlayers")?.parse().ok()?,
            online_players: core.get("onlinePlayers")?.parse().ok()?,
            last_updated: core.get("lastUpdated")?.parse().ok()?,
            metadata,
        })
    }

    /// `remainingCapacity = max(maxPlayers - onlinePlayers - occupancy, 0)`.
    pub fn remaining_capacity(&self, occupancy: u32) -> u32 {
        self.max_players
            .saturating_sub(self.online_players)
            .saturating_sub(occupancy)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRosterRecord {
    pub match_id: String,
    pub players: Vec<PlayerId>,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_pairs_round_trip() {
        let mut metadata = HashMap::new();
        metadata.insert("team.max".to_string(), "4".to_string());
        let record = SlotRecord {
            slot_id: SlotId::from("b1-A"),
            server_id: BackendId::from("b1"),
            slot_suffix: "A".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            status: SlotStatus::Available,
            max_players: 2,
            online_players: 0,
            last_updated: 1000,
            metadata,
        };
        let pairs = record.to_field_pairs();
        let mut fields = HashMap::new();
        for chunk in pairs.chunks(2) {
            fields.insert(chunk[0].clone(), chunk[1].clone());
        }
        let roundtrip = SlotRecord::from_field_map(record.slot_id.clone(), fields).unwrap();
        assert_eq!(roundtrip.family, record.family);
        assert_eq!(roundtrip.metadata.get("team.max").unwrap(), "4");
    }

    #[test]
    fn remaining_capacity_floors_at_zero() {
        let record = SlotRecord {
            slot_id: SlotId::from("b1-A"),
            server_id: BackendId::from("b1"),
            slot_suffix: "A".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            status: SlotStatus::Available,
            max_players: 2,
            online_players: 2,
            last_updated: 1000,
            metadata: HashMap::new(),
        };
        assert_eq!(record.remaining_capacity(5), 0);
    }
}

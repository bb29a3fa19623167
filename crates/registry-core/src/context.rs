//! [`PlayerRequestContext`] is shared between the party reservation
//! coordinator and the player routing service (spec 4.F / 4.G); it
//! lives here rather than in either crate to avoid the dependency cycle
//! the two would otherwise form (spec §9's "cyclic references between
//! services" design note).
use crate::FamilyId;
use crate::PlayerId;
use crate::SlotId;
use crate::VariantId;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;

/// A single-player routing attempt in flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRequestContext {
    pub player_id: PlayerId,
    pub player_name: String,
    pub family_id: FamilyId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub preferred_slot_id: Option<SlotId>,
    #[serde(default)]
    pub rejoin: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at_millis: u64,
    pub last_enqueued_at_millis: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub blocked_slot_ids: HashSet<SlotId>,
    /// Recently-left slots (spec §8 "Recent-slot blocklist"): a *soft*
    /// avoidance, distinct from `blocked_slot_ids`'s hard nack-driven
    /// block. Selection prefers a non-recent candidate but falls back to
    /// a recent one rather than failing outright.
    #[serde(default)]
    pub recent_slot_ids: HashSet<SlotId>,
    #[serde(default)]
    pub current_slot_id: Option<SlotId>,
}

impl PlayerRequestContext {
    pub fn new(
        player_id: PlayerId,
        player_name: String,
        family_id: FamilyId,
        variant_id: Option<VariantId>,
        preferred_slot_id: Option<SlotId>,
        rejoin: bool,
        metadata: HashMap<String, String>,
        now_millis: u64,
    ) -> Self {
        Self {
            player_id,
            player_name,
            family_id,
            variant_id,
            preferred_slot_id,
            rejoin,
            metadata,
            created_at_millis: now_millis,
            last_enqueued_at_millis: now_millis,
            retries: 0,
            blocked_slot_ids: HashSet::new(),
            recent_slot_ids: HashSet::new(),
            current_slot_id: None,
        }
    }

    pub fn age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.created_at_millis)
    }

    pub fn block_slot(&mut self, slot_id: SlotId) {
        self.blocked_slot_ids.insert(slot_id);
    }

    pub fn bump_retry(&mut self, now_millis: u64) {
        self.retries += 1;
        self.last_enqueued_at_millis = now_millis;
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serialize player request context")
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let context = PlayerRequestContext::new(
            PlayerId::from("p1"),
            "Player One".to_string(),
            FamilyId::from("duel"),
            None,
            None,
            false,
            HashMap::new(),
            1_000,
        );
        let json = context.to_json();
        let decoded = PlayerRequestContext::from_json(&json).unwrap();
        assert_eq!(decoded.player_id, context.player_id);
        assert_eq!(decoded.created_at_millis, 1_000);
    }

    #[test]
    fn age_grows_from_creation() {
        let context = PlayerRequestContext::new(
            PlayerId::from("p1"),
            "Player One".to_string(),
            FamilyId::from("duel"),
            None,
            None,
            false,
            HashMap::new(),
            1_000,
        );
        assert_eq!(context.age_millis(1_500), 500);
    }
}

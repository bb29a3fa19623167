//! Wire-independent state for a single party reservation, persisted as
//! a JSON blob through [`registry_store::RoutingStore::save_party_allocation`].
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::SlotId;
use registry_core::VariantId;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;

/// What a reservation-creator asked for, before a slot has been picked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyReservationSnapshot {
    pub reservation_id: String,
    pub family_id: FamilyId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub party_size: u32,
    /// Per-player join tokens, checked against the token a player's
    /// request carries before it is honored.
    pub tokens: HashMap<PlayerId, String>,
    #[serde(default)]
    pub target_server_id: Option<BackendId>,
    #[serde(default)]
    pub assigned_team_index: Option<i32>,
    pub created_at_millis: u64,
}

/// A reservation that has been pinned to a concrete slot and team.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyReservationAllocation {
    pub snapshot: PartyReservationSnapshot,
    pub server_id: BackendId,
    pub slot_id: SlotId,
    pub team_index: i32,
    #[serde(default)]
    pub dispatched: HashSet<PlayerId>,
    #[serde(default)]
    pub acked: HashSet<PlayerId>,
    #[serde(default)]
    pub claims: HashMap<PlayerId, bool>,
    pub allocated_at_millis: u64,
}

impl PartyReservationAllocation {
    pub fn party_size(&self) -> u32 {
        self.snapshot.party_size
    }

    pub fn reservation_id(&self) -> &str {
        &self.snapshot.reservation_id
    }

    /// Returns `false` if the player was already marked dispatched
    /// (idempotent re-delivery of a party player request).
    pub fn mark_dispatched(&mut self, player_id: PlayerId) -> bool {
        self.dispatched.insert(player_id)
    }

    pub fn is_fully_acked(&self) -> bool {
        !self.dispatched.is_empty()
            && self.dispatched.len() as u32 == self.party_size()
            && self.acked.len() == self.dispatched.len()
    }

    pub fn is_fully_claimed(&self) -> bool {
        self.claims.len() as u32 >= self.party_size()
    }

    pub fn all_claims_succeeded(&self) -> bool {
        self.claims.values().all(|success| *success)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serialize party reservation allocation")
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Metadata attached to the provision-trigger hint fired whenever a
/// reservation can't be seated immediately.
pub fn provision_hint(snapshot: &PartyReservationSnapshot) -> HashMap<String, String> {
    let mut hint = HashMap::new();
    hint.insert("partyReservationId".to_string(), snapshot.reservation_id.clone());
    hint.insert("partySize".to_string(), snapshot.party_size.to_string());
    if let Some(variant) = &snapshot.variant_id {
        hint.insert("variant".to_string(), variant.to_string());
    }
    hint
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PartyReservationSnapshot {
        PartyReservationSnapshot {
            reservation_id: "r1".to_string(),
            family_id: FamilyId::from("duel"),
            variant_id: None,
            party_size: 2,
            tokens: HashMap::new(),
            target_server_id: None,
            assigned_team_index: None,
            created_at_millis: 0,
        }
    }

    #[test]
    fn fully_acked_requires_whole_party_dispatched() {
        let mut allocation = PartyReservationAllocation {
            snapshot: snapshot(),
            server_id: BackendId::from("b1"),
            slot_id: SlotId::from("b1-A"),
            team_index: 0,
            dispatched: HashSet::new(),
            acked: HashSet::new(),
            claims: HashMap::new(),
            allocated_at_millis: 0,
        };
        let p1 = PlayerId::from("p1");
        let p2 = PlayerId::from("p2");
        assert!(allocation.mark_dispatched(p1.clone()));
        allocation.acked.insert(p1.clone());
        assert!(!allocation.is_fully_acked());
        assert!(allocation.mark_dispatched(p2.clone()));
        allocation.acked.insert(p2);
        assert!(allocation.is_fully_acked());
        assert!(!allocation.mark_dispatched(p1));
    }

    #[test]
    fn claims_require_unanimous_success() {
        let mut allocation = PartyReservationAllocation {
            snapshot: snapshot(),
            server_id: BackendId::from("b1"),
            slot_id: SlotId::from("b1-A"),
            team_index: 0,
            dispatched: HashSet::new(),
            acked: HashSet::new(),
            claims: HashMap::new(),
            allocated_at_millis: 0,
        };
        allocation.claims.insert(PlayerId::from("p1"), true);
        assert!(!allocation.is_fully_claimed());
        allocation.claims.insert(PlayerId::from("p2"), false);
        assert!(allocation.is_fully_claimed());
        assert!(!allocation.all_claims_succeeded());
    }
}

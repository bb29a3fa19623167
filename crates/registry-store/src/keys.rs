//! Redis key layout, matched exactly to the external interface key
//! naming so an operator inspecting Redis directly can cross-reference
//! this module.
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::SlotId;

pub fn family_capacity(server_id: &BackendId) -> String {
    format!("fulcrum:registry:servers:{server_id}:family-capacity")
}

pub fn family_total(server_id: &BackendId) -> String {
    format!("fulcrum:registry:servers:{server_id}:family-total")
}

pub fn server_families(server_id: &BackendId) -> String {
    format!("fulcrum:registry:servers:{server_id}:families")
}

pub fn family_servers(family_id: &FamilyId) -> String {
    format!("fulcrum:registry:slots:by-family:{family_id}")
}

pub fn slot(slot_id: &SlotId) -> String {
    format!("fulcrum:registry:slots:{slot_id}")
}

pub fn occupancy(slot_id: &SlotId) -> String {
    format!("fulcrum:registry:route:occupancy:{slot_id}")
}

pub fn active_slot_map() -> &'static str {
    "fulcrum:registry:route:active-slot"
}

pub fn active_players_for_slot(slot_id: &SlotId) -> String {
    format!("fulcrum:registry:route:active-by-slot:{slot_id}")
}

pub fn recent_slots(player_id: &PlayerId) -> String {
    format!("fulcrum:registry:route:recent-slots:{player_id}")
}

/// `SCAN MATCH` pattern covering every player's recent-slots key, used
/// by the purge sweeper to find entries that need TTL/bound trimming
/// even when their owning player never pushes again.
pub fn recent_slots_scan_pattern() -> &'static str {
    "fulcrum:registry:route:recent-slots:*"
}

/// Recovers the playerId suffix from a key matched by
/// [`recent_slots_scan_pattern`].
pub fn player_id_from_recent_slots_key(key: &str) -> Option<&str> {
    key.strip_prefix("fulcrum:registry:route:recent-slots:")
}

pub fn match_roster(slot_id: &SlotId) -> String {
    format!("fulcrum:registry:route:match-roster:{slot_id}")
}

pub fn party_queue(family_id: &FamilyId) -> String {
    format!("fulcrum:registry:route:party-queue:{family_id}")
}

pub fn party_allocations() -> &'static str {
    "fulcrum:registry:route:party-allocations"
}

pub fn pending_reservation_players(reservation_id: &str) -> String {
    format!("fulcrum:registry:route:pending-reservation:{reservation_id}")
}

pub fn block_expiry() -> &'static str {
    "fulcrum:registry:route:block-expiry"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_matches_layout() {
        let id = SlotId::from("b1-A");
        assert_eq!(slot(&id), "fulcrum:registry:slots:b1-A");
    }

    #[test]
    fn family_capacity_key_is_per_server() {
        let id = BackendId::from("b1");
        assert_eq!(
            family_capacity(&id),
            "fulcrum:registry:servers:b1:family-capacity"
        );
    }

    #[test]
    fn player_id_roundtrips_through_the_scan_pattern() {
        let id = PlayerId::from("p1");
        let key = recent_slots(&id);
        assert_eq!(player_id_from_recent_slots_key(&key), Some("p1"));
    }
}

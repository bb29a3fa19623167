//! In-memory stand-in for [`crate::store::RoutingStore`], used by
//! integration tests across the workspace. The store's operations are
//! few enough and well-typed enough to fake directly rather than
//! spinning up a real Redis in tests.
#![cfg(feature = "fake")]

use crate::records::MatchRosterRecord;
use crate::records::SlotRecord;
use crate::store::RoutingStore;
use crate::store::StoreResult;
use async_trait::async_trait;
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::SlotId;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    family_capacity: HashMap<(BackendId, FamilyId), i64>,
    slots: HashMap<SlotId, SlotRecord>,
    occupancy: HashMap<SlotId, i64>,
    active_slot: HashMap<PlayerId, SlotId>,
    active_by_slot: HashMap<SlotId, Vec<PlayerId>>,
    recent_slots: HashMap<PlayerId, Vec<(SlotId, u64)>>,
    match_rosters: HashMap<SlotId, MatchRosterRecord>,
    party_queues: HashMap<FamilyId, VecDeque<String>>,
    party_allocations: HashMap<String, String>,
    pending_reservation_players: HashMap<String, Vec<String>>,
    block_expiry: HashMap<String, u64>,
}

/// Mirrors [`crate::store::RedisRoutingStore`]'s semantics without a
/// network round trip.
#[derive(Default)]
pub struct FakeRoutingStore {
    state: Mutex<State>,
}

impl FakeRoutingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds declared family capacity for a backend, mirroring what
    /// `sync_server` would have written.
    pub fn seed_capacity(&self, server_id: &BackendId, family_id: &FamilyId, capacity: i64) {
        self.state
            .lock()
            .unwrap()
            .family_capacity
            .insert((server_id.clone(), family_id.clone()), capacity);
    }

    pub fn seed_slot(&self, record: SlotRecord) {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(record.slot_id.clone(), record);
    }
}

#[async_trait]
impl RoutingStore for FakeRoutingStore {
    async fn reserve_family_capacity(
        &self,
        server_id: &BackendId,
        family_id: &FamilyId,
    ) -> StoreResult<Option<u32>> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .family_capacity
            .entry((server_id.clone(), family_id.clone()))
            .or_insert(0);
        if *entry <= 0 {
            return Ok(None);
        }
        *entry -= 1;
        Ok(Some(*entry as u32))
    }

    async fn release_family_capacity(
        &self,
        server_id: &BackendId,
        family_id: &FamilyId,
    ) -> StoreResult<u32> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .family_capacity
            .entry((server_id.clone(), family_id.clone()))
            .or_insert(0);
        *entry += 1;
        Ok((*entry).max(0) as u32)
    }

    async fn sync_server(
        &self,
        server_id: &BackendId,
        family_capacities: &HashMap<FamilyId, u32>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        for (family_id, capacity) in family_capacities {
            state
                .family_capacity
                .insert((server_id.clone(), family_id.clone()), *capacity as i64);
        }
        Ok(())
    }

    async fn store_slot(&self, record: &SlotRecord) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(record.slot_id.clone(), record.clone());
        Ok(())
    }

    async fn remove_slot(&self, slot_id: &SlotId, _family_id: &FamilyId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.slots.remove(slot_id);
        state.occupancy.remove(slot_id);
        Ok(())
    }

    async fn get_slot(&self, slot_id: &SlotId) -> StoreResult<Option<SlotRecord>> {
        Ok(self.state.lock().unwrap().slots.get(slot_id).cloned())
    }

    async fn family_slot_ids(&self, family_id: &FamilyId) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .slots
            .values()
            .filter(|slot| &slot.family == family_id)
            .map(|slot| slot.slot_id.to_string())
            .collect())
    }

    async fn increment_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32> {
        let mut state = self.state.lock().unwrap();
        let entry = state.occupancy.entry(slot_id.clone()).or_insert(0);
        *entry += 1;
        Ok((*entry).max(0) as u32)
    }

    async fn increment_occupancy_by(&self, slot_id: &SlotId, by: u32) -> StoreResult<u32> {
        let mut state = self.state.lock().unwrap();
        let entry = state.occupancy.entry(slot_id.clone()).or_insert(0);
        *entry += by as i64;
        Ok((*entry).max(0) as u32)
    }

    async fn decrement_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32> {
        let mut state = self.state.lock().unwrap();
        let entry = state.occupancy.entry(slot_id.clone()).or_insert(0);
        if *entry > 0 {
            *entry -= 1;
        }
        Ok((*entry).max(0) as u32)
    }

    async fn get_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32> {
        let state = self.state.lock().unwrap();
        Ok(state.occupancy.get(slot_id).copied().unwrap_or(0).max(0) as u32)
    }

    async fn set_active_slot(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
    ) -> StoreResult<Option<SlotId>> {
        let mut state = self.state.lock().unwrap();
        let previous = state.active_slot.insert(player_id.clone(), slot_id.clone());
        if let Some(prev) = &previous {
            if prev != slot_id {
                if let Some(members) = state.active_by_slot.get_mut(prev) {
                    members.retain(|p| p != player_id);
                }
            }
        }
        state
            .active_by_slot
            .entry(slot_id.clone())
            .or_default()
            .push(player_id.clone());
        Ok(previous)
    }

    async fn get_active_slot(&self, player_id: &PlayerId) -> StoreResult<Option<SlotId>> {
        Ok(self.state.lock().unwrap().active_slot.get(player_id).cloned())
    }

    async fn remove_active_players_for_slot(&self, slot_id: &SlotId) -> StoreResult<Vec<PlayerId>> {
        let mut state = self.state.lock().unwrap();
        let players = state.active_by_slot.remove(slot_id).unwrap_or_default();
        for player in &players {
            state.active_slot.remove(player);
        }
        Ok(players)
    }

    async fn clear_active_slot(&self, player_id: &PlayerId) -> StoreResult<Option<SlotId>> {
        let mut state = self.state.lock().unwrap();
        let previous = state.active_slot.remove(player_id);
        if let Some(slot_id) = &previous {
            if let Some(members) = state.active_by_slot.get_mut(slot_id) {
                members.retain(|p| p != player_id);
            }
        }
        Ok(previous)
    }

    async fn push_recent_slot(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
        now_millis: u64,
        history_bound: usize,
        ttl_millis: u64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let entries = state.recent_slots.entry(player_id.clone()).or_default();
        entries.push((slot_id.clone(), now_millis));
        let cutoff = now_millis.saturating_sub(ttl_millis);
        entries.retain(|(_, at)| *at >= cutoff);
        if entries.len() > history_bound {
            let overflow = entries.len() - history_bound;
            entries.drain(0..overflow);
        }
        Ok(())
    }

    async fn get_recent_slots(&self, player_id: &PlayerId) -> StoreResult<Vec<SlotId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .recent_slots
            .get(player_id)
            .map(|entries| entries.iter().map(|(slot, _)| slot.clone()).collect())
            .unwrap_or_default())
    }

    async fn trim_recent_slots(
        &self,
        player_id: &PlayerId,
        now_millis: u64,
        history_bound: usize,
        ttl_millis: u64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(entries) = state.recent_slots.get_mut(player_id) {
            let cutoff = now_millis.saturating_sub(ttl_millis);
            entries.retain(|(_, at)| *at >= cutoff);
            if entries.len() > history_bound {
                let overflow = entries.len() - history_bound;
                entries.drain(0..overflow);
            }
        }
        Ok(())
    }

    async fn recent_slot_tracked_players(&self) -> StoreResult<Vec<PlayerId>> {
        Ok(self.state.lock().unwrap().recent_slots.keys().cloned().collect())
    }

    async fn store_match_roster(
        &self,
        slot_id: &SlotId,
        record: &MatchRosterRecord,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .match_rosters
            .insert(slot_id.clone(), record.clone());
        Ok(())
    }

    async fn get_match_roster(&self, slot_id: &SlotId) -> StoreResult<Option<MatchRosterRecord>> {
        Ok(self.state.lock().unwrap().match_rosters.get(slot_id).cloned())
    }

    async fn remove_match_roster(&self, slot_id: &SlotId) -> StoreResult<()> {
        self.state.lock().unwrap().match_rosters.remove(slot_id);
        Ok(())
    }

    async fn enqueue_party_reservation(
        &self,
        family_id: &FamilyId,
        reservation_id: &str,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .party_queues
            .entry(family_id.clone())
            .or_default()
            .push_back(reservation_id.to_string());
        Ok(())
    }

    async fn enqueue_party_reservation_front(
        &self,
        family_id: &FamilyId,
        reservation_id: &str,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .party_queues
            .entry(family_id.clone())
            .or_default()
            .push_front(reservation_id.to_string());
        Ok(())
    }

    async fn poll_party_reservation(&self, family_id: &FamilyId) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .party_queues
            .entry(family_id.clone())
            .or_default()
            .pop_front())
    }

    async fn save_party_allocation(&self, reservation_id: &str, blob: &str) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .party_allocations
            .insert(reservation_id.to_string(), blob.to_string());
        Ok(())
    }

    async fn get_party_allocation(&self, reservation_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .party_allocations
            .get(reservation_id)
            .cloned())
    }

    async fn remove_party_allocation(
        &self,
        reservation_id: &str,
        slot_id: &SlotId,
        party_size: u32,
    ) -> StoreResult<(bool, bool)> {
        let mut state = self.state.lock().unwrap();
        let removed = state.party_allocations.remove(reservation_id).is_some();
        let entry = state.occupancy.entry(slot_id.clone()).or_insert(0);
        *entry -= party_size as i64;
        if *entry < 0 {
            *entry = 0;
        }
        Ok((removed, *entry == 0))
    }

    async fn get_party_allocations(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.state.lock().unwrap().party_allocations.clone())
    }

    async fn enqueue_pending_reservation_player(
        &self,
        reservation_id: &str,
        context_json: &str,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .pending_reservation_players
            .entry(reservation_id.to_string())
            .or_default()
            .push(context_json.to_string());
        Ok(())
    }

    async fn drain_pending_reservation_players(
        &self,
        reservation_id: &str,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pending_reservation_players
            .remove(reservation_id)
            .unwrap_or_default())
    }

    async fn block_expiry_add(&self, member: &str, expires_at_millis: u64) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .block_expiry
            .insert(member.to_string(), expires_at_millis);
        Ok(())
    }

    async fn block_expiry_poll_expired(
        &self,
        now_millis: u64,
        limit: isize,
    ) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut expired: Vec<(String, u64)> = state
            .block_expiry
            .iter()
            .filter(|(_, at)| **at <= now_millis)
            .map(|(member, at)| (member.clone(), *at))
            .collect();
        expired.sort_by_key(|(_, at)| *at);
        if limit >= 0 {
            expired.truncate(limit as usize);
        }
        Ok(expired.into_iter().map(|(member, _)| member).collect())
    }

    async fn block_expiry_remove(&self, member: &str) -> StoreResult<()> {
        self.state.lock().unwrap().block_expiry.remove(member);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_then_release_restores_capacity() {
        let store = FakeRoutingStore::new();
        let server = BackendId::from("b1");
        let family = FamilyId::from("duel");
        store.seed_capacity(&server, &family, 2);
        let first = store.reserve_family_capacity(&server, &family).await.unwrap();
        assert_eq!(first, Some(1));
        store.release_family_capacity(&server, &family).await.unwrap();
        let second = store.reserve_family_capacity(&server, &family).await.unwrap();
        assert_eq!(second, Some(1));
    }

    #[tokio::test]
    async fn reserve_returns_none_at_zero_capacity() {
        let store = FakeRoutingStore::new();
        let server = BackendId::from("b1");
        let family = FamilyId::from("duel");
        store.seed_capacity(&server, &family, 0);
        assert_eq!(
            store.reserve_family_capacity(&server, &family).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn decrement_occupancy_floors_at_zero() {
        let store = FakeRoutingStore::new();
        let slot = SlotId::from("b1-A");
        assert_eq!(store.decrement_occupancy(&slot).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tracked_players_lists_everyone_with_history() {
        let store = FakeRoutingStore::new();
        let player = PlayerId::from("p1");
        store
            .push_recent_slot(&player, &SlotId::from("b1-A"), 1_000, 5, 60_000)
            .await
            .unwrap();
        assert_eq!(store.recent_slot_tracked_players().await.unwrap(), vec![player]);
    }
}

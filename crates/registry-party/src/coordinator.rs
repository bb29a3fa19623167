//! Party Reservation Coordinator (spec 4.F): seats a pre-formed group
//! onto one slot as a unit, holding per-player requests until every
//! member of the party can be dispatched together.
use crate::types::provision_hint;
use crate::types::PartyReservationAllocation;
use crate::types::PartyReservationSnapshot;
use crate::RoutingCallbacks;
use registry_core::FamilyId;
use registry_core::PlayerRequestContext;
use registry_core::StoreError;
use registry_store::records::SlotRecord;
use registry_store::records::SlotStatus;
use registry_store::RoutingStore;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

/// Coordinates party reservations against a family's live slot set.
///
/// `pending_snapshots` caches the snapshot of a reservation that's
/// waiting in the family queue — the queue itself only holds reservation
/// ids, so a snapshot has to live somewhere between `enqueue` and the
/// next `process_pending_reservations` pass that might seat it.
pub struct PartyReservationCoordinator {
    store: Arc<dyn RoutingStore>,
    callbacks: Arc<dyn RoutingCallbacks>,
    pending_snapshots: DashMap<String, PartyReservationSnapshot>,
}

impl PartyReservationCoordinator {
    pub fn new(store: Arc<dyn RoutingStore>, callbacks: Arc<dyn RoutingCallbacks>) -> Self {
        Self {
            store,
            callbacks,
            pending_snapshots: DashMap::new(),
        }
    }

    /// A new reservation has arrived. Tries `targetServerId` first (if
    /// given), then the fullest-fitting eligible slot in the family,
    /// and finally falls back to the family's pending queue.
    pub async fn handle_reservation_created(
        &self,
        snapshot: PartyReservationSnapshot,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        if self.store.get_party_allocation(&snapshot.reservation_id).await?.is_some() {
            log::warn!(
                "[party] duplicate reservationCreated for {}, ignoring",
                snapshot.reservation_id
            );
            return Ok(());
        }
        if snapshot.party_size == 0 {
            log::warn!("[party] rejecting reservation {} with partySize 0", snapshot.reservation_id);
            return Ok(());
        }

        if let Some(target) = snapshot.target_server_id.clone() {
            if let Some(slot) = self.find_slot_on_server(&target, &snapshot).await? {
                return self.allocate(slot, snapshot, now_millis).await;
            }
            log::warn!(
                "[party] targetServerId {target} has no eligible slot for family {}; falling back to a family-wide scan",
                snapshot.family_id
            );
        }

        if let Some(slot) = self.find_best_slot_for_party(&snapshot).await? {
            return self.allocate(slot, snapshot, now_millis).await;
        }

        log::info!(
            "[party] no eligible slot for reservation {} ({} players); enqueuing",
            snapshot.reservation_id, snapshot.party_size
        );
        self.pending_snapshots
            .insert(snapshot.reservation_id.clone(), snapshot.clone());
        self.store
            .enqueue_party_reservation(&snapshot.family_id, &snapshot.reservation_id)
            .await?;
        self.callbacks
            .trigger_provision(&snapshot.family_id, provision_hint(&snapshot))
            .await;
        Ok(())
    }

    /// A single party member's routing request. Returns `true` if an
    /// allocation already exists and the request was consumed by it
    /// (dispatched or disconnected); `false` if there's no allocation
    /// yet, in which case the caller falls through to normal solo
    /// routing while this context also waits to be drained once the
    /// reservation allocates.
    pub async fn handle_party_player_request(
        &self,
        context: PlayerRequestContext,
        reservation_id: &str,
        now_millis: u64,
    ) -> Result<bool, StoreError> {
        let Some(blob) = self.store.get_party_allocation(reservation_id).await? else {
            self.store
                .enqueue_pending_reservation_player(reservation_id, &context.to_json())
                .await?;
            return Ok(false);
        };
        let mut allocation = match PartyReservationAllocation::from_json(&blob) {
            Ok(allocation) => allocation,
            Err(err) => {
                log::warn!("[party] corrupt allocation blob for {reservation_id}: {err}");
                return Ok(true);
            }
        };

        let Some(expected_token) = allocation.snapshot.tokens.get(&context.player_id).cloned() else {
            self.callbacks
                .send_disconnect(&context.player_id, "party-token-missing")
                .await;
            return Ok(true);
        };
        if let Some(supplied) = context.metadata.get("partyTokenId") {
            if supplied != &expected_token {
                self.callbacks
                    .send_disconnect(&context.player_id, "party-token-mismatch")
                    .await;
                return Ok(true);
            }
        }

        let slot = self.store.get_slot(&allocation.slot_id).await?;
        let slot_live = matches!(&slot, Some(slot) if slot.status == SlotStatus::Available);
        if !slot_live {
            self.store
                .enqueue_pending_reservation_player(reservation_id, &context.to_json())
                .await?;
            self.requeue_allocation(allocation, now_millis).await?;
            return Ok(true);
        }

        if !allocation.mark_dispatched(context.player_id.clone()) {
            // Already dispatched; re-delivery of the same request, no-op.
            return Ok(true);
        }
        self.store
            .save_party_allocation(reservation_id, &allocation.to_json())
            .await?;
        self.callbacks
            .dispatch_with_reservation(&context, &allocation.slot_id, reservation_id)
            .await;
        Ok(true)
    }

    /// A player's proxy acknowledged the route. Once every dispatched
    /// player in the party has acked, the allocation is released as a
    /// success.
    pub async fn handle_route_ack(
        &self,
        reservation_id: &str,
        player_id: registry_core::PlayerId,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        let Some(blob) = self.store.get_party_allocation(reservation_id).await? else {
            return Ok(());
        };
        let mut allocation = match PartyReservationAllocation::from_json(&blob) {
            Ok(allocation) => allocation,
            Err(_) => return Ok(()),
        };
        allocation.acked.insert(player_id);
        if allocation.is_fully_acked() {
            self.release(reservation_id, allocation, true, now_millis).await
        } else {
            self.store
                .save_party_allocation(reservation_id, &allocation.to_json())
                .await
        }
    }

    /// An external party manager confirmed (or denied) a player's claim
    /// on the reservation. Once every party member has a claim result,
    /// the allocation is released — successfully only if every claim
    /// succeeded.
    pub async fn handle_reservation_claimed(
        &self,
        reservation_id: &str,
        player_id: registry_core::PlayerId,
        success: bool,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        let Some(blob) = self.store.get_party_allocation(reservation_id).await? else {
            return Ok(());
        };
        let mut allocation = match PartyReservationAllocation::from_json(&blob) {
            Ok(allocation) => allocation,
            Err(_) => return Ok(()),
        };
        allocation.claims.insert(player_id, success);
        if allocation.is_fully_claimed() {
            let succeeded = allocation.all_claims_succeeded();
            self.release(reservation_id, allocation, succeeded, now_millis).await
        } else {
            self.store
                .save_party_allocation(reservation_id, &allocation.to_json())
                .await
        }
    }

    /// Pops reservations off `family_id`'s queue one at a time and
    /// tries to seat the first one that fits `slot`; anything that
    /// doesn't fit is pushed back onto the front of the queue, in
    /// order, once the scan is done.
    pub async fn process_pending_reservations(
        &self,
        family_id: &FamilyId,
        slot: &SlotRecord,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        let mut deferred = Vec::new();
        loop {
            let Some(reservation_id) = self.store.poll_party_reservation(family_id).await? else {
                break;
            };
            let Some(snapshot) = self
                .pending_snapshots
                .get(&reservation_id)
                .map(|entry| entry.clone())
            else {
                log::warn!("[party] queued reservation {reservation_id} has no cached snapshot, dropping");
                continue;
            };

            if self.eligible_with_team(slot, &snapshot).await? {
                self.pending_snapshots.remove(&reservation_id);
                self.allocate(slot.clone(), snapshot, now_millis).await?;
                break;
            }
            deferred.push(reservation_id);
        }

        for reservation_id in deferred.into_iter().rev() {
            self.store
                .enqueue_party_reservation_front(family_id, &reservation_id)
                .await?;
        }
        Ok(())
    }

    /// Requeues every allocation pinned to `server_id`'s slots (spec
    /// 4.I/scenario 6: a backend dies with parties mid-dispatch). Called
    /// by the purge sweeper once it has evicted the dead backend from
    /// the fleet registry.
    pub async fn requeue_allocations_for_server(
        &self,
        server_id: &registry_core::BackendId,
        now_millis: u64,
    ) -> Result<usize, StoreError> {
        let mut requeued = 0;
        for (reservation_id, blob) in self.store.get_party_allocations().await? {
            let allocation = match PartyReservationAllocation::from_json(&blob) {
                Ok(allocation) => allocation,
                Err(err) => {
                    log::warn!("[party] corrupt allocation blob for {reservation_id}: {err}");
                    continue;
                }
            };
            if &allocation.server_id != server_id {
                continue;
            }
            self.requeue_allocation(allocation, now_millis).await?;
            requeued += 1;
        }
        if requeued > 0 {
            log::info!("[party] requeued {requeued} allocation(s) stranded on dead server {server_id}");
        }
        Ok(requeued)
    }

    /// Forces a seated-but-stalled allocation back onto its family's
    /// queue (e.g. its slot closed mid-dispatch), releasing the
    /// occupancy it was holding.
    async fn requeue_allocation(
        &self,
        allocation: PartyReservationAllocation,
        _now_millis: u64,
    ) -> Result<(), StoreError> {
        let reservation_id = allocation.reservation_id().to_string();
        let family_id = allocation.snapshot.family_id.clone();
        let party_size = allocation.party_size();
        self.store
            .remove_party_allocation(&reservation_id, &allocation.slot_id, party_size)
            .await?;
        self.pending_snapshots
            .insert(reservation_id.clone(), allocation.snapshot.clone());
        self.store
            .enqueue_party_reservation_front(&family_id, &reservation_id)
            .await?;
        self.callbacks
            .trigger_provision(&family_id, provision_hint(&allocation.snapshot))
            .await;
        Ok(())
    }

    async fn release(
        &self,
        reservation_id: &str,
        allocation: PartyReservationAllocation,
        success: bool,
        _now_millis: u64,
    ) -> Result<(), StoreError> {
        let party_size = allocation.party_size();
        let family_id = allocation.snapshot.family_id.clone();
        self.store
            .remove_party_allocation(reservation_id, &allocation.slot_id, party_size)
            .await?;
        if success {
            log::info!("[party] reservation {reservation_id} released (seated)");
        } else {
            log::warn!("[party] reservation {reservation_id} released (failed claims)");
        }

        let pending = self.store.drain_pending_reservation_players(reservation_id).await?;
        for raw in pending {
            match PlayerRequestContext::from_json(&raw) {
                Ok(context) => self.callbacks.retry_request(context).await,
                Err(err) => log::warn!("[party] dropping corrupt pending context for {reservation_id}: {err}"),
            }
        }
        self.callbacks
            .trigger_provision(&family_id, provision_hint(&allocation.snapshot))
            .await;
        Ok(())
    }

    async fn allocate(
        &self,
        slot: SlotRecord,
        mut snapshot: PartyReservationSnapshot,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        let team_index = self.next_team_index(&slot).await?;
        snapshot.target_server_id = Some(slot.server_id.clone());
        snapshot.assigned_team_index = Some(team_index);
        let reservation_id = snapshot.reservation_id.clone();
        let party_size = snapshot.party_size;

        let allocation = PartyReservationAllocation {
            snapshot,
            server_id: slot.server_id.clone(),
            slot_id: slot.slot_id.clone(),
            team_index,
            dispatched: Default::default(),
            acked: Default::default(),
            claims: Default::default(),
            allocated_at_millis: now_millis,
        };
        self.store
            .save_party_allocation(&reservation_id, &allocation.to_json())
            .await?;
        self.store
            .increment_occupancy_by(&slot.slot_id, party_size)
            .await?;
        self.pending_snapshots.remove(&reservation_id);
        log::info!(
            "[party] allocated reservation {reservation_id} to {} (team {team_index})",
            slot.slot_id
        );

        let pending = self.store.drain_pending_reservation_players(&reservation_id).await?;
        for raw in pending {
            match PlayerRequestContext::from_json(&raw) {
                Ok(context) => self.callbacks.retry_request(context).await,
                Err(err) => log::warn!("[party] dropping corrupt pending context for {reservation_id}: {err}"),
            }
        }
        Ok(())
    }

    async fn find_slot_on_server(
        &self,
        server_id: &registry_core::BackendId,
        snapshot: &PartyReservationSnapshot,
    ) -> Result<Option<SlotRecord>, StoreError> {
        for slot in self.store.slots_for_family(&snapshot.family_id).await? {
            if &slot.server_id != server_id {
                continue;
            }
            if self.eligible_with_team(&slot, snapshot).await? {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    async fn find_best_slot_for_party(
        &self,
        snapshot: &PartyReservationSnapshot,
    ) -> Result<Option<SlotRecord>, StoreError> {
        let mut best: Option<(SlotRecord, f64)> = None;
        for slot in self.store.slots_for_family(&snapshot.family_id).await? {
            if !self.eligible_with_team(&slot, snapshot).await? {
                continue;
            }
            let occupancy = self.store.get_occupancy(&slot.slot_id).await?;
            let fill_ratio = if slot.max_players == 0 {
                0.0
            } else {
                (slot.online_players + occupancy) as f64 / slot.max_players as f64
            };
            if best.as_ref().map(|(_, ratio)| fill_ratio > *ratio).unwrap_or(true) {
                best = Some((slot, fill_ratio));
            }
        }
        Ok(best.map(|(slot, _)| slot))
    }

    fn is_eligible(&self, slot: &SlotRecord, snapshot: &PartyReservationSnapshot, occupancy: u32) -> bool {
        if slot.status != SlotStatus::Available {
            return false;
        }
        if !slot.family.as_str().eq_ignore_ascii_case(snapshot.family_id.as_str()) {
            return false;
        }
        if let Some(variant) = &snapshot.variant_id {
            let matches = slot
                .metadata
                .get("variant")
                .map(|value| value.eq_ignore_ascii_case(variant.as_str()))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        if slot.remaining_capacity(occupancy) < snapshot.party_size {
            return false;
        }
        if let Some(max) = slot.metadata.get("team.max").and_then(|v| v.parse::<u32>().ok()) {
            if snapshot.party_size > max {
                return false;
            }
        }
        true
    }

    async fn eligible_with_team(
        &self,
        slot: &SlotRecord,
        snapshot: &PartyReservationSnapshot,
    ) -> Result<bool, StoreError> {
        let occupancy = self.store.get_occupancy(&slot.slot_id).await?;
        if !self.is_eligible(slot, snapshot, occupancy) {
            return Ok(false);
        }
        self.team_has_room(slot).await
    }

    /// Checks `team.count` metadata against allocations already seated
    /// on `slot`; slots without `team.count` are single-team and always
    /// have room at index 0.
    async fn team_has_room(&self, slot: &SlotRecord) -> Result<bool, StoreError> {
        let Some(team_count) = slot.metadata.get("team.count").and_then(|v| v.parse::<u32>().ok()) else {
            return Ok(true);
        };
        let used = self.team_indices_in_use(&slot.slot_id).await?;
        Ok((used.len() as u32) < team_count)
    }

    async fn next_team_index(&self, slot: &SlotRecord) -> Result<i32, StoreError> {
        let Some(team_count) = slot.metadata.get("team.count").and_then(|v| v.parse::<u32>().ok()) else {
            return Ok(0);
        };
        let used = self.team_indices_in_use(&slot.slot_id).await?;
        for candidate in 0..team_count as i32 {
            if !used.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Ok(team_count as i32)
    }

    async fn team_indices_in_use(&self, slot_id: &registry_core::SlotId) -> Result<Vec<i32>, StoreError> {
        let mut used = Vec::new();
        for (_, blob) in self.store.get_party_allocations().await? {
            if let Ok(allocation) = PartyReservationAllocation::from_json(&blob) {
                if &allocation.slot_id == slot_id {
                    used.push(allocation.team_index);
                }
            }
        }
        Ok(used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use registry_core::BackendId;
    use registry_core::FamilyId;
    use registry_core::PlayerId;
    use registry_core::SlotId;
    use registry_store::FakeRoutingStore;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingCallbacks {
        dispatched: StdMutex<Vec<(PlayerId, SlotId, String)>>,
        disconnected: StdMutex<Vec<(PlayerId, String)>>,
        retried: StdMutex<Vec<PlayerId>>,
        provisions: StdMutex<u32>,
    }

    #[async_trait]
    impl RoutingCallbacks for RecordingCallbacks {
        async fn dispatch_with_reservation(
            &self,
            context: &PlayerRequestContext,
            slot_id: &SlotId,
            reservation_id: &str,
        ) {
            self.dispatched.lock().unwrap().push((
                context.player_id.clone(),
                slot_id.clone(),
                reservation_id.to_string(),
            ));
        }
        async fn send_disconnect(&self, player_id: &PlayerId, reason: &str) {
            self.disconnected
                .lock()
                .unwrap()
                .push((player_id.clone(), reason.to_string()));
        }
        async fn trigger_provision(&self, _family_id: &FamilyId, _metadata: HashMap<String, String>) {
            *self.provisions.lock().unwrap() += 1;
        }
        async fn retry_request(&self, context: PlayerRequestContext) {
            self.retried.lock().unwrap().push(context.player_id);
        }
    }

    fn seed_slot(store: &FakeRoutingStore, slot_id: &str, server_id: &str, max_players: u32) {
        store.seed_slot(SlotRecord {
            slot_id: SlotId::from(slot_id),
            server_id: BackendId::from(server_id),
            slot_suffix: "A".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            status: SlotStatus::Available,
            max_players,
            online_players: 0,
            last_updated: 0,
            metadata: HashMap::new(),
        });
    }

    fn snapshot(id: &str, party_size: u32, tokens: HashMap<PlayerId, String>) -> PartyReservationSnapshot {
        PartyReservationSnapshot {
            reservation_id: id.to_string(),
            family_id: FamilyId::from("duel"),
            variant_id: None,
            party_size,
            tokens,
            target_server_id: None,
            assigned_team_index: None,
            created_at_millis: 0,
        }
    }

    #[tokio::test]
    async fn reservation_created_allocates_against_best_fitting_slot() {
        let store = Arc::new(FakeRoutingStore::new());
        seed_slot(&store, "b1-A", "b1", 4);
        let callbacks = Arc::new(RecordingCallbacks::default());
        let coordinator = PartyReservationCoordinator::new(store.clone(), callbacks.clone());

        let mut tokens = HashMap::new();
        tokens.insert(PlayerId::from("p1"), "t1".to_string());
        tokens.insert(PlayerId::from("p2"), "t2".to_string());
        coordinator
            .handle_reservation_created(snapshot("r1", 2, tokens), 1_000)
            .await
            .unwrap();

        let blob = store.get_party_allocation("r1").await.unwrap().unwrap();
        let allocation = PartyReservationAllocation::from_json(&blob).unwrap();
        assert_eq!(allocation.slot_id, SlotId::from("b1-A"));
        assert_eq!(store.get_occupancy(&SlotId::from("b1-A")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn player_request_dispatches_once_allocated_then_releases_on_full_ack() {
        let store = Arc::new(FakeRoutingStore::new());
        seed_slot(&store, "b1-A", "b1", 4);
        let callbacks = Arc::new(RecordingCallbacks::default());
        let coordinator = PartyReservationCoordinator::new(store.clone(), callbacks.clone());

        let mut tokens = HashMap::new();
        tokens.insert(PlayerId::from("p1"), "t1".to_string());
        tokens.insert(PlayerId::from("p2"), "t2".to_string());
        coordinator
            .handle_reservation_created(snapshot("r1", 2, tokens), 1_000)
            .await
            .unwrap();

        let context1 = PlayerRequestContext::new(
            PlayerId::from("p1"),
            "One".to_string(),
            FamilyId::from("duel"),
            None,
            None,
            false,
            HashMap::new(),
            1_000,
        );
        let context2 = PlayerRequestContext::new(
            PlayerId::from("p2"),
            "Two".to_string(),
            FamilyId::from("duel"),
            None,
            None,
            false,
            HashMap::new(),
            1_000,
        );
        coordinator.handle_party_player_request(context1, "r1", 1_000).await.unwrap();
        coordinator.handle_party_player_request(context2, "r1", 1_000).await.unwrap();
        assert_eq!(callbacks.dispatched.lock().unwrap().len(), 2);

        coordinator
            .handle_route_ack("r1", PlayerId::from("p1"), 1_100)
            .await
            .unwrap();
        assert!(store.get_party_allocation("r1").await.unwrap().is_some());
        coordinator
            .handle_route_ack("r1", PlayerId::from("p2"), 1_100)
            .await
            .unwrap();
        assert!(store.get_party_allocation("r1").await.unwrap().is_none());
        assert_eq!(store.get_occupancy(&SlotId::from("b1-A")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mismatched_token_disconnects_the_player() {
        let store = Arc::new(FakeRoutingStore::new());
        seed_slot(&store, "b1-A", "b1", 4);
        let callbacks = Arc::new(RecordingCallbacks::default());
        let coordinator = PartyReservationCoordinator::new(store.clone(), callbacks.clone());

        let mut tokens = HashMap::new();
        tokens.insert(PlayerId::from("p1"), "t1".to_string());
        coordinator
            .handle_reservation_created(snapshot("r1", 1, tokens), 1_000)
            .await
            .unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("partyTokenId".to_string(), "wrong".to_string());
        let context = PlayerRequestContext::new(
            PlayerId::from("p1"),
            "One".to_string(),
            FamilyId::from("duel"),
            None,
            None,
            false,
            metadata,
            1_000,
        );
        coordinator.handle_party_player_request(context, "r1", 1_000).await.unwrap();
        assert_eq!(callbacks.disconnected.lock().unwrap().len(), 1);
        assert!(callbacks.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_capacity_enqueues_and_process_pending_seats_it_later() {
        let store = Arc::new(FakeRoutingStore::new());
        let callbacks = Arc::new(RecordingCallbacks::default());
        let coordinator = PartyReservationCoordinator::new(store.clone(), callbacks.clone());

        let mut tokens = HashMap::new();
        tokens.insert(PlayerId::from("p1"), "t1".to_string());
        tokens.insert(PlayerId::from("p2"), "t2".to_string());
        coordinator
            .handle_reservation_created(snapshot("r1", 2, tokens), 1_000)
            .await
            .unwrap();
        assert!(store.get_party_allocation("r1").await.unwrap().is_none());
        assert_eq!(*callbacks.provisions.lock().unwrap(), 1);

        seed_slot(&store, "b1-A", "b1", 4);
        let slot = store.get_slot(&SlotId::from("b1-A")).await.unwrap().unwrap();
        coordinator
            .process_pending_reservations(&FamilyId::from("duel"), &slot, 2_000)
            .await
            .unwrap();
        assert!(store.get_party_allocation("r1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn requeue_allocations_for_server_clears_stranded_allocations_only() {
        let store = Arc::new(FakeRoutingStore::new());
        seed_slot(&store, "b1-A", "b1", 4);
        seed_slot(&store, "b2-A", "b2", 4);
        let callbacks = Arc::new(RecordingCallbacks::default());
        let coordinator = PartyReservationCoordinator::new(store.clone(), callbacks.clone());

        let mut tokens = HashMap::new();
        tokens.insert(PlayerId::from("p1"), "t1".to_string());
        coordinator
            .handle_reservation_created(snapshot("r1", 1, tokens.clone()), 1_000)
            .await
            .unwrap();
        let mut other_tokens = HashMap::new();
        other_tokens.insert(PlayerId::from("p2"), "t2".to_string());
        let mut survivor = snapshot("r2", 1, other_tokens);
        survivor.target_server_id = Some(BackendId::from("b2"));
        coordinator.handle_reservation_created(survivor, 1_000).await.unwrap();

        let requeued = coordinator
            .requeue_allocations_for_server(&BackendId::from("b1"), 2_000)
            .await
            .unwrap();
        assert_eq!(requeued, 1);
        assert!(store.get_party_allocation("r1").await.unwrap().is_none());
        assert!(store.get_party_allocation("r2").await.unwrap().is_some());
    }
}

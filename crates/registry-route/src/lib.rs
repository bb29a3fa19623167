//! Player Routing Service (spec 4.G): the single entry point proxies
//! and backends talk to for seating a player, solo or as part of a
//! pre-formed party, onto a slot.
//!
//! Split across three modules to resolve the cyclic reference between
//! this service and [`registry_party::PartyReservationCoordinator`]
//! (spec §9): [`core::RouteCore`] holds the shared state, [`callbacks`]
//! implements the coordinator's callback seam against that state, and
//! this module wires the two together behind the public API.
mod callbacks;
mod core;
mod pipeline;

use crate::callbacks::RouteCallbacks;
use crate::core::RouteCore;
use registry_bus::messages::PlayerRouteAck;
use registry_bus::messages::PlayerSlotRequest;
use registry_bus::messages::SlotStatusUpdate;
use registry_bus::MessageBus;
use registry_core::ProxyId;
use registry_core::RegistryConfig;
use registry_fleet::ServerRegistry;
use registry_party::PartyReservationCoordinator;
use registry_provision::SlotProvisionService;
use registry_shutdown::ShutdownIntentManager;
use registry_store::RoutingStore;
use registry_store::StoreResult;
use registry_tracker::ActivePlayerTracker;
use std::sync::Arc;

/// Public facade over the routing pipeline and the party reservation
/// coordinator it delegates to.
pub struct PlayerRoutingService {
    core: Arc<RouteCore>,
}

impl PlayerRoutingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RoutingStore>,
        fleet: Arc<ServerRegistry>,
        bus: Arc<dyn MessageBus>,
        tracker: Arc<ActivePlayerTracker>,
        provision: Arc<SlotProvisionService>,
        shutdown: Arc<ShutdownIntentManager>,
        config: RegistryConfig,
    ) -> Self {
        let core = RouteCore::new(store.clone(), fleet, bus, tracker, provision, shutdown, config);
        let callbacks = Arc::new(RouteCallbacks(core.clone()));
        let party = Arc::new(PartyReservationCoordinator::new(store, callbacks));
        core.install_party(party);
        Self { core }
    }

    /// A proxy forwarded a player's slot request (pipeline steps 1-6).
    pub async fn handle_player_request(
        &self,
        request: PlayerSlotRequest,
        proxy_id: ProxyId,
        now_millis: u64,
    ) -> StoreResult<()> {
        self.core.handle_player_request(request, proxy_id, now_millis).await
    }

    /// A proxy acknowledged or nacked a dispatched route (steps 7-8).
    pub async fn handle_route_ack(&self, ack: PlayerRouteAck, now_millis: u64) -> StoreResult<()> {
        self.core.handle_route_ack(ack, now_millis).await
    }

    /// A backend advertised a slot status change; wakes waiting party
    /// and solo requests when the slot becomes available (step 9).
    pub async fn handle_slot_status_update(&self, update: SlotStatusUpdate, now_millis: u64) -> StoreResult<()> {
        self.core.handle_slot_status_update(update, now_millis).await
    }

    /// An external party manager confirmed or denied a player's claim
    /// on a reservation (forwarded straight to the coordinator, since
    /// this message never touches solo routing state).
    pub async fn handle_reservation_claimed(
        &self,
        reservation_id: &str,
        player_id: registry_core::PlayerId,
        success: bool,
        now_millis: u64,
    ) -> StoreResult<()> {
        self.core
            .party()
            .handle_reservation_claimed(reservation_id, player_id, success, now_millis)
            .await
    }

    /// A party manager created a new reservation (forwarded straight to
    /// the coordinator).
    pub async fn handle_reservation_created(
        &self,
        snapshot: registry_party::PartyReservationSnapshot,
        now_millis: u64,
    ) -> StoreResult<()> {
        self.core.party().handle_reservation_created(snapshot, now_millis).await
    }

    /// Accessor for callers (the sweeper, console tooling) that need to
    /// reach the party coordinator directly.
    pub fn party(&self) -> &Arc<PartyReservationCoordinator> {
        self.core.party()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_bus::InMemoryBus;
    use registry_core::BackendId;
    use registry_core::FamilyId;
    use registry_core::PlayerId;
    use registry_fleet::BackendDescriptor;
    use registry_fleet::BackendStatus;
    use registry_fleet::FamilyCapacity;
    use registry_store::FakeRoutingStore;
    use registry_store::SlotRecord;
    use registry_store::SlotStatus;
    use std::collections::HashMap;

    fn service_with_one_open_slot() -> (PlayerRoutingService, Arc<FakeRoutingStore>) {
        let store = Arc::new(FakeRoutingStore::new());
        let fleet = Arc::new(ServerRegistry::new());
        let mut families = HashMap::new();
        families.insert(
            FamilyId::from("duel"),
            FamilyCapacity {
                max_concurrent_slots: 2,
                available: 2,
                player_equivalent_factor: 1.0,
                min_players: 2,
                max_players: 4,
            },
        );
        let (backend, _) = fleet.register_backend(
            BackendDescriptor {
                id: BackendId::from("b1"),
                soft_player_cap: 100,
                hard_player_cap: 200,
                families,
            },
            0,
        );
        fleet.update_backend_status(backend.id(), BackendStatus::Available).unwrap();

        store.seed_slot(SlotRecord {
            slot_id: registry_core::SlotId::from("b1-A"),
            server_id: BackendId::from("b1"),
            slot_suffix: "A".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            status: SlotStatus::Available,
            max_players: 4,
            online_players: 0,
            last_updated: 0,
            metadata: HashMap::new(),
        });

        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let tracker = Arc::new(ActivePlayerTracker::new(store.clone() as Arc<dyn RoutingStore>, &RegistryConfig::default()));
        let provision = Arc::new(SlotProvisionService::new(
            store.clone() as Arc<dyn RoutingStore>,
            fleet.clone(),
            bus.clone(),
        ));
        let shutdown = Arc::new(ShutdownIntentManager::new(fleet.clone(), bus.clone(), &RegistryConfig::default()));
        let service = PlayerRoutingService::new(
            store.clone() as Arc<dyn RoutingStore>,
            fleet,
            bus,
            tracker,
            provision,
            shutdown,
            RegistryConfig::default(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn solo_request_dispatches_to_the_open_slot() {
        let (service, store) = service_with_one_open_slot();
        let request = PlayerSlotRequest {
            player_id: PlayerId::from("p1"),
            player_name: "One".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            preferred_slot_id: None,
            rejoin: false,
            metadata: HashMap::new(),
        };
        service
            .handle_player_request(request, ProxyId::from("proxy-1"), 1_000)
            .await
            .unwrap();
        assert_eq!(store.get_occupancy(&registry_core::SlotId::from("b1-A")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn request_with_no_capacity_enqueues_for_later() {
        let store = Arc::new(FakeRoutingStore::new());
        let fleet = Arc::new(ServerRegistry::new());
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let tracker = Arc::new(ActivePlayerTracker::new(store.clone() as Arc<dyn RoutingStore>, &RegistryConfig::default()));
        let provision = Arc::new(SlotProvisionService::new(
            store.clone() as Arc<dyn RoutingStore>,
            fleet.clone(),
            bus.clone(),
        ));
        let shutdown = Arc::new(ShutdownIntentManager::new(fleet.clone(), bus.clone(), &RegistryConfig::default()));
        let service = PlayerRoutingService::new(
            store.clone() as Arc<dyn RoutingStore>,
            fleet,
            bus,
            tracker,
            provision,
            shutdown,
            RegistryConfig::default(),
        );
        let request = PlayerSlotRequest {
            player_id: PlayerId::from("p1"),
            player_name: "One".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            preferred_slot_id: None,
            rejoin: false,
            metadata: HashMap::new(),
        };
        service
            .handle_player_request(request, ProxyId::from("proxy-1"), 1_000)
            .await
            .unwrap();
        assert_eq!(store.get_occupancy(&registry_core::SlotId::from("b1-A")).await.unwrap(), 0);
    }

    /// Spec §8 "Recent-slot blocklist" is a soft avoidance: a player
    /// whose only eligible slot is one they recently left must still be
    /// routed there rather than enqueued with a needless provision.
    #[tokio::test]
    async fn falls_back_to_a_recent_slot_when_no_other_candidate_exists() {
        let (service, store) = service_with_one_open_slot();
        let player = PlayerId::from("p1");
        store
            .push_recent_slot(&player, &registry_core::SlotId::from("b1-A"), 500, 10, 60_000)
            .await
            .unwrap();

        let request = PlayerSlotRequest {
            player_id: player,
            player_name: "One".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            preferred_slot_id: None,
            rejoin: false,
            metadata: HashMap::new(),
        };
        service
            .handle_player_request(request, ProxyId::from("proxy-1"), 1_000)
            .await
            .unwrap();
        assert_eq!(store.get_occupancy(&registry_core::SlotId::from("b1-A")).await.unwrap(), 1);
    }

    /// DESIGN.md Open Question 1: a `preferredSlotId` wins even if it's
    /// in the player's recent-slot set, as long as it isn't hard-blocked
    /// by an explicit nack this request cycle.
    #[tokio::test]
    async fn preferred_slot_wins_even_if_recently_left() {
        let (service, store) = service_with_one_open_slot();
        let player = PlayerId::from("p1");
        store
            .push_recent_slot(&player, &registry_core::SlotId::from("b1-A"), 500, 10, 60_000)
            .await
            .unwrap();

        let request = PlayerSlotRequest {
            player_id: player,
            player_name: "One".to_string(),
            family: FamilyId::from("duel"),
            variant: None,
            preferred_slot_id: Some(registry_core::SlotId::from("b1-A")),
            rejoin: false,
            metadata: HashMap::new(),
        };
        service
            .handle_player_request(request, ProxyId::from("proxy-1"), 1_000)
            .await
            .unwrap();
        assert_eq!(store.get_occupancy(&registry_core::SlotId::from("b1-A")).await.unwrap(), 1);
    }

    /// A party-reservation ack must not decrement store occupancy a
    /// second time: `allocate`/`release` already own the whole party's
    /// occupancy in one `+party_size`/`-party_size` pair, so the
    /// per-player pipeline ack (unlike a solo ack) must leave it alone.
    #[tokio::test]
    async fn party_route_ack_does_not_double_decrement_occupancy() {
        let (service, store) = service_with_one_open_slot();
        let slot_id = registry_core::SlotId::from("b1-A");
        store.increment_occupancy_by(&slot_id, 2).await.unwrap();

        let ack = PlayerRouteAck {
            player_id: PlayerId::from("p1"),
            slot_id: slot_id.clone(),
            reservation_id: Some("r1".to_string()),
            success: true,
            reason: None,
        };
        service.handle_route_ack(ack, 1_000).await.unwrap();
        assert_eq!(store.get_occupancy(&slot_id).await.unwrap(), 2);
    }
}

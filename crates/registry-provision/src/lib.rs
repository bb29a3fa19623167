//! Slot Provision Service (spec 4.C): given `(familyId, metadata)`,
//! atomically reserves budget on the best backend and dispatches a
//! provision command over the message bus.
//!
//! Grounded on `rbp-gameroom::actor`'s spawn/dispatch shape generalized
//! to a request/response call rather than a standing task, plus the
//! matchmaking-worker `lobby_create` candidate/compensate pattern named
//! in DESIGN.md.
use registry_bus::channels;
use registry_bus::messages::SlotProvisionCommand as WireProvisionCommand;
use registry_bus::Envelope;
use registry_bus::MessageBus;
use registry_core::FamilyId;
use registry_core::StoreError;
use registry_core::VariantId;
use registry_fleet::ServerRegistry;
use registry_store::RoutingStore;
use std::collections::HashMap;
use std::sync::Arc;

/// What a successful provision attempt produced.
#[derive(Clone, Debug)]
pub struct ProvisionResult {
    pub server_id: registry_core::BackendId,
    pub family_id: FamilyId,
    pub remaining_slots: u32,
    pub command: WireProvisionCommand,
}

pub struct SlotProvisionService {
    store: Arc<dyn RoutingStore>,
    fleet: Arc<ServerRegistry>,
    bus: Arc<dyn MessageBus>,
}

impl SlotProvisionService {
    pub fn new(store: Arc<dyn RoutingStore>, fleet: Arc<ServerRegistry>, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, fleet, bus }
    }

    /// Attempts to provision a new slot for `family_id`, trying
    /// candidates in packing order (fewest remaining slots first, then
    /// most current players, then id) until one succeeds or all are
    /// exhausted.
    pub async fn request_provision(
        &self,
        family_id: &FamilyId,
        metadata: HashMap<String, String>,
    ) -> Result<Option<ProvisionResult>, StoreError> {
        let mut candidates: Vec<_> = self
            .fleet
            .routable_backends()
            .into_iter()
            .filter(|backend| {
                backend.supports_family(family_id) && backend.available_family_slots(family_id) > 0
            })
            .collect();

        // Pack existing servers before scattering: fewest remaining slots
        // first, ties broken by more current players (keep hot servers
        // hot), then lexical id for determinism.
        candidates.sort_by(|a, b| {
            a.available_family_slots(family_id)
                .cmp(&b.available_family_slots(family_id))
                .then(b.current_player_count().cmp(&a.current_player_count()))
                .then(a.id().as_str().cmp(b.id().as_str()))
        });

        for backend in candidates {
            let server_id = backend.id().clone();

            let Some(remaining) = self.store.reserve_family_capacity(&server_id, family_id).await? else {
                log::debug!("[provision] {server_id}/{family_id}: store capacity exhausted");
                continue;
            };

            if !self.fleet.reserve_family_slot(&server_id, family_id) {
                log::warn!(
                    "[provision] {server_id}/{family_id}: lost in-memory reservation race, compensating"
                );
                self.store.release_family_capacity(&server_id, family_id).await?;
                continue;
            }

            let variant = metadata.get("variant").map(|v| VariantId::from(v.as_str()));
            let command = WireProvisionCommand {
                server_id: server_id.clone(),
                family: family_id.clone(),
                variant,
                metadata: metadata.clone(),
                request_id: uuid::Uuid::new_v4().to_string(),
            };

            let envelope = Envelope::new("server.slot.provision", "registry", command.clone())
                .targeted(server_id.to_string());
            self.bus
                .publish(&channels::slot_provision_channel(&server_id), envelope.to_json());

            log::info!("[provision] dispatched {family_id} provision to {server_id} ({remaining} left)");
            return Ok(Some(ProvisionResult {
                server_id,
                family_id: family_id.clone(),
                remaining_slots: remaining,
                command,
            }));
        }

        log::info!("[provision] no eligible backend for family {family_id}");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_bus::InMemoryBus;
    use registry_core::BackendId;
    use registry_fleet::BackendDescriptor;
    use registry_fleet::FamilyCapacity;
    use registry_store::FakeRoutingStore;

    fn fleet_with_backend(id: &str, available: u32) -> Arc<ServerRegistry> {
        let fleet = Arc::new(ServerRegistry::new());
        let mut families = HashMap::new();
        families.insert(
            FamilyId::from("duel"),
            FamilyCapacity {
                max_concurrent_slots: available,
                available,
                player_equivalent_factor: 1.0,
                min_players: 2,
                max_players: 4,
            },
        );
        let (backend, _) = fleet.register_backend(
            BackendDescriptor {
                id: BackendId::from(id),
                soft_player_cap: 100,
                hard_player_cap: 200,
                families,
            },
            0,
        );
        fleet.update_backend_status(backend.id(), registry_fleet::BackendStatus::Available).unwrap();
        fleet
    }

    #[tokio::test]
    async fn picks_the_backend_with_fewest_remaining_slots() {
        let fleet = fleet_with_backend("b1", 2);
        let mut families = HashMap::new();
        families.insert(
            FamilyId::from("duel"),
            FamilyCapacity {
                max_concurrent_slots: 5,
                available: 5,
                player_equivalent_factor: 1.0,
                min_players: 2,
                max_players: 4,
            },
        );
        let (backend2, _) = fleet.register_backend(
            BackendDescriptor {
                id: BackendId::from("b2"),
                soft_player_cap: 100,
                hard_player_cap: 200,
                families,
            },
            0,
        );
        fleet.update_backend_status(backend2.id(), registry_fleet::BackendStatus::Available).unwrap();

        let store = Arc::new(FakeRoutingStore::new());
        store.seed_capacity(&BackendId::from("b1"), &FamilyId::from("duel"), 2);
        store.seed_capacity(&BackendId::from("b2"), &FamilyId::from("duel"), 5);
        let bus = Arc::new(InMemoryBus::new());
        let service = SlotProvisionService::new(store, fleet, bus);

        let result = service
            .request_provision(&FamilyId::from("duel"), HashMap::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.server_id, BackendId::from("b1"));
    }

    #[tokio::test]
    async fn returns_none_when_no_backend_has_capacity() {
        let fleet = Arc::new(ServerRegistry::new());
        let store = Arc::new(FakeRoutingStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let service = SlotProvisionService::new(store, fleet, bus);
        let result = service
            .request_provision(&FamilyId::from("duel"), HashMap::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn in_memory_race_loss_compensates_store_reservation() {
        let fleet = fleet_with_backend("b1", 1);
        // Exhaust the in-memory reservation out from under the service to
        // simulate a lost race with a concurrent provisioning attempt.
        fleet.reserve_family_slot(&BackendId::from("b1"), &FamilyId::from("duel"));

        let store = Arc::new(FakeRoutingStore::new());
        store.seed_capacity(&BackendId::from("b1"), &FamilyId::from("duel"), 1);
        let bus = Arc::new(InMemoryBus::new());
        let service = SlotProvisionService::new(store.clone(), fleet, bus);

        let result = service
            .request_provision(&FamilyId::from("duel"), HashMap::new())
            .await
            .unwrap();
        assert!(result.is_none());
        // Compensated: store capacity restored to its pre-attempt value.
        let remaining = store
            .reserve_family_capacity(&BackendId::from("b1"), &FamilyId::from("duel"))
            .await
            .unwrap();
        assert_eq!(remaining, Some(0));
    }
}

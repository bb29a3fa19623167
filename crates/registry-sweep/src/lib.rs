//! Expiry/Purge Sweeper (spec 4.I): a single periodic ticker that
//! sweeps expired social blocks, expired shutdown tickets, stale
//! recent-slot history, and (per §5's timer bucket, `heartbeatTimeout`
//! detection) dead backends.
//!
//! Grounded on `gameroom::timer`'s deadline/tick shape, generalized from
//! one in-process `Instant` deadline to a `tokio::time::interval` loop
//! driving several store-backed sweeps per tick.
use registry_core::BackendId;
use registry_core::RegistryConfig;
use registry_core::StoreError;
use registry_fleet::ServerRegistry;
use registry_party::PartyReservationCoordinator;
use registry_shutdown::ShutdownIntentManager;
use registry_store::RoutingStore;
use registry_tracker::ActivePlayerTracker;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Upper bound on social blocks reaped from the sorted set per tick, so
/// one slow sweep never holds up the interval indefinitely.
const BLOCK_PURGE_LIMIT: isize = 500;

/// Tallies of what one [`PurgeSweeper::sweep_once`] pass did, surfaced
/// to the console and to logs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepReport {
    pub expired_blocks: usize,
    pub expired_tickets: usize,
    pub recent_slot_players_trimmed: usize,
    pub dead_backends: usize,
    pub requeued_allocations: usize,
}

/// Owns every dependency the periodic sweep needs. Stateless between
/// ticks: all durable state lives in the store, the fleet registry, and
/// the shutdown/party services it drives.
pub struct PurgeSweeper {
    store: Arc<dyn RoutingStore>,
    fleet: Arc<ServerRegistry>,
    tracker: Arc<ActivePlayerTracker>,
    shutdown: Arc<ShutdownIntentManager>,
    party: Arc<PartyReservationCoordinator>,
    heartbeat_timeout_millis: u64,
    recent_slot_history: usize,
    recent_slot_ttl_millis: u64,
    interval: Duration,
}

impl PurgeSweeper {
    pub fn new(
        store: Arc<dyn RoutingStore>,
        fleet: Arc<ServerRegistry>,
        tracker: Arc<ActivePlayerTracker>,
        shutdown: Arc<ShutdownIntentManager>,
        party: Arc<PartyReservationCoordinator>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            store,
            fleet,
            tracker,
            shutdown,
            party,
            heartbeat_timeout_millis: config.heartbeat_timeout.as_millis() as u64,
            recent_slot_history: config.recent_slot_history,
            recent_slot_ttl_millis: config.recent_slot_ttl.as_millis() as u64,
            interval: config.sweep_interval,
        }
    }

    /// Runs every sweep once, in the order named by spec 4.I plus the
    /// heartbeat-timeout dead-backend check named in 4.B. Each phase is
    /// independent; a failure partway through still returns counts for
    /// whatever completed before the error.
    pub async fn sweep_once(&self, now_millis: u64) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        let expired_blocks = self.store.block_expiry_poll_expired(now_millis, BLOCK_PURGE_LIMIT).await?;
        for member in &expired_blocks {
            self.store.block_expiry_remove(member).await?;
        }
        report.expired_blocks = expired_blocks.len();

        report.expired_tickets = self.shutdown.purge_expired_tickets(now_millis);

        let tracked_players = self.store.recent_slot_tracked_players().await?;
        for player_id in &tracked_players {
            self.store
                .trim_recent_slots(player_id, now_millis, self.recent_slot_history, self.recent_slot_ttl_millis)
                .await?;
        }
        report.recent_slot_players_trimmed = tracked_players.len();

        let dead = self.fleet.sweep_dead_backends(now_millis, self.heartbeat_timeout_millis);
        report.dead_backends = dead.len();
        for backend in &dead {
            self.release_dead_backend(backend.id(), &backend.slots(), now_millis, &mut report).await?;
        }

        if report.expired_blocks > 0
            || report.expired_tickets > 0
            || report.dead_backends > 0
            || report.requeued_allocations > 0
        {
            log::info!(
                "[sweep] blocks={} tickets={} recent-slot-players={} dead-backends={} requeued={}",
                report.expired_blocks,
                report.expired_tickets,
                report.recent_slot_players_trimmed,
                report.dead_backends,
                report.requeued_allocations,
            );
        }
        Ok(report)
    }

    async fn release_dead_backend(
        &self,
        server_id: &BackendId,
        slots: &[registry_core::SlotId],
        now_millis: u64,
        report: &mut SweepReport,
    ) -> Result<(), StoreError> {
        for slot_id in slots {
            if let Some(record) = self.store.get_slot(slot_id).await? {
                self.store.remove_slot(slot_id, &record.family).await?;
            }
            self.tracker.clear_active_players_for_slot(slot_id, now_millis).await?;
        }
        report.requeued_allocations += self.party.requeue_allocations_for_server(server_id, now_millis).await?;
        Ok(())
    }

    /// Spawns the tick loop on the current Tokio runtime. Returns the
    /// `JoinHandle` so callers (the bootstrap binary) can hold it for
    /// the process lifetime or abort it on shutdown.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut ticker = tokio::time::interval(self.interval);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let now_millis = now_millis();
                if let Err(err) = self.sweep_once(now_millis).await {
                    log::warn!("[sweep] tick failed: {err}");
                }
            }
        })
    }
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
    use async_trait::async_trait;
    use registry_bus::InMemoryBus;
    use registry_core::FamilyId;
    use registry_core::PlayerId;
    use registry_core::PlayerRequestContext;
    use registry_core::SlotId;
    use registry_fleet::BackendDescriptor;
    use registry_fleet::BackendStatus;
    use registry_fleet::FamilyCapacity;
    use registry_party::RoutingCallbacks;
    use registry_shutdown::ShutdownIntentManager;
    use registry_store::FakeRoutingStore;
    use registry_store::SlotRecord;
    use registry_store::SlotStatus;
    use std::collections::HashMap;

    struct NoopCallbacks;

    #[async_trait]
    impl RoutingCallbacks for NoopCallbacks {
        async fn dispatch_with_reservation(&self, _context: &PlayerRequestContext, _slot_id: &SlotId, _reservation_id: &str) {}
        async fn send_disconnect(&self, _player_id: &PlayerId, _reason: &str) {}
        async fn trigger_provision(&self, _family_id: &FamilyId, _metadata: HashMap<String, String>) {}
        async fn retry_request(&self, _context: PlayerRequestContext) {}
    }

    fn sweeper_with_backend(
        id: &str,
    ) -> (
        Arc<PurgeSweeper>,
        Arc<FakeRoutingStore>,
        Arc<ServerRegistry>,
        Arc<PartyReservationCoordinator>,
    ) {
        let store = Arc::new(FakeRoutingStore::new());
        let dyn_store: Arc<dyn RoutingStore> = store.clone();
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
                id: BackendId::from(id),
                soft_player_cap: 100,
                hard_player_cap: 200,
                families,
            },
            0,
        );
        fleet.update_backend_status(backend.id(), BackendStatus::Available).unwrap();

        let config = RegistryConfig::default();
        let tracker = Arc::new(ActivePlayerTracker::new(dyn_store.clone(), &config));
        let bus = Arc::new(InMemoryBus::new());
        let shutdown = Arc::new(ShutdownIntentManager::new(fleet.clone(), bus, &config));
        let party = Arc::new(PartyReservationCoordinator::new(dyn_store.clone(), Arc::new(NoopCallbacks)));
        let sweeper = Arc::new(PurgeSweeper::new(
            dyn_store,
            fleet.clone(),
            tracker,
            shutdown,
            party.clone(),
            &config,
        ));
        (sweeper, store, fleet, party)
    }

    #[tokio::test]
    async fn purges_expired_blocks() {
        let (sweeper, store, _fleet, _party) = sweeper_with_backend("b1");
        store.block_expiry_add("player:p1", 1_000).await.unwrap();
        store.block_expiry_add("player:p2", 5_000).await.unwrap();
        let report = sweeper.sweep_once(2_000).await.unwrap();
        assert_eq!(report.expired_blocks, 1);
        assert_eq!(store.block_expiry_poll_expired(10_000, -1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trims_recent_slot_history_for_every_tracked_player() {
        let (sweeper, store, _fleet, _party) = sweeper_with_backend("b1");
        store
            .push_recent_slot(&PlayerId::from("p1"), &SlotId::from("b1-A"), 1_000, 5, 1_000)
            .await
            .unwrap();
        let report = sweeper.sweep_once(5_000).await.unwrap();
        assert_eq!(report.recent_slot_players_trimmed, 1);
        assert!(store.get_recent_slots(&PlayerId::from("p1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dead_backend_is_swept_and_its_slots_removed() {
        let (sweeper, store, fleet, _party) = sweeper_with_backend("b1");
        let backend = fleet.backend(&BackendId::from("b1")).unwrap();
        backend.record_slot(SlotId::from("b1-A"));
        store.seed_slot(SlotRecord {
            slot_id: SlotId::from("b1-A"),
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

        let report = sweeper.sweep_once(100_000).await.unwrap();
        assert_eq!(report.dead_backends, 1);
        assert!(fleet.backend(&BackendId::from("b1")).is_none());
        assert!(store.get_slot(&SlotId::from("b1-A")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dead_backend_requeues_its_stranded_party_allocations() {
        let (sweeper, store, fleet, party) = sweeper_with_backend("b1");
        store.seed_slot(SlotRecord {
            slot_id: SlotId::from("b1-A"),
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
        let mut tokens = HashMap::new();
        tokens.insert(PlayerId::from("p1"), "t1".to_string());
        party
            .handle_reservation_created(
                registry_party::PartyReservationSnapshot {
                    reservation_id: "r1".to_string(),
                    family_id: FamilyId::from("duel"),
                    variant_id: None,
                    party_size: 1,
                    tokens,
                    target_server_id: None,
                    assigned_team_index: None,
                    created_at_millis: 0,
                },
                1_000,
            )
            .await
            .unwrap();
        assert!(store.get_party_allocation("r1").await.unwrap().is_some());

        let backend = fleet.backend(&BackendId::from("b1")).unwrap();
        backend.record_slot(SlotId::from("b1-A"));
        let report = sweeper.sweep_once(100_000).await.unwrap();
        assert_eq!(report.dead_backends, 1);
        assert_eq!(report.requeued_allocations, 1);
        assert!(store.get_party_allocation("r1").await.unwrap().is_none());
    }
}

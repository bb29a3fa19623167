//! Builds the full dependency graph for one registry process and keeps
//! the in-memory fleet registry in sync with the message bus and the
//! external document store.
//!
//! Grounded on `crates/server/src/lib.rs` (`rbp-server`)'s `web::Data`
//! app-state construction — one struct holding every client/service the
//! route handlers need — generalized from a handful of flat clients
//! (`API`, `Crypto`, `Casino`, `Client`) to the full service graph named
//! in spec §2, and on `rbp_database::db()`'s env-driven connect-or-fail
//! shape for `RegistryApp::connect`.
use registry_bus::channels;
use registry_bus::messages::MatchRosterCreated;
use registry_bus::messages::MatchRosterEnded;
use registry_bus::messages::PartyReservationClaimed;
use registry_bus::messages::PartyReservationCreated;
use registry_bus::messages::PlayerRouteAck;
use registry_bus::messages::PlayerSlotRequest;
use registry_bus::messages::ShutdownIntentUpdate;
use registry_bus::messages::SlotFamilyAdvertisement;
use registry_bus::messages::SlotStatusUpdate;
use registry_bus::Envelope;
use registry_bus::InMemoryBus;
use registry_bus::MessageBus;
use registry_core::FamilyId;
use registry_core::ProxyId;
use registry_core::RegistryConfig;
use registry_docs::network_environments;
use registry_docs::players;
use registry_docs::Collection;
use registry_docs::EnvironmentDescriptorView;
use registry_docs::PlayerDocument;
use registry_docs::PostgresCollection;
use registry_fleet::BackendDescriptor;
use registry_fleet::BackendStatus;
use registry_fleet::FamilyCapacity;
use registry_fleet::RegisterOutcome;
use registry_fleet::ServerRegistry;
use registry_party::PartyReservationSnapshot;
use registry_provision::SlotProvisionService;
use registry_route::PlayerRoutingService;
use registry_shutdown::ShutdownIntentManager;
use registry_store::RedisRoutingStore;
use registry_store::RoutingStore;
use registry_sweep::PurgeSweeper;
use registry_tracker::ActivePlayerTracker;
use registry_tracker::MatchRosterService;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use tokio_postgres::Client;

#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("routing store connection failed: {0}")]
    Store(#[from] registry_core::StoreError),
    #[error("document store connection failed: {0}")]
    Docs(#[from] registry_docs::DocError),
}

/// The fully-wired dependency graph backing one running registry
/// process. Every field is reachable from the `/health` handler and the
/// operator console, so both stay thin wrappers over this struct rather
/// than growing their own state.
pub struct RegistryApp {
    pub config: RegistryConfig,
    pub store: Arc<dyn RoutingStore>,
    pub docs: Arc<Client>,
    pub fleet: Arc<ServerRegistry>,
    pub bus: Arc<dyn MessageBus>,
    pub tracker: Arc<ActivePlayerTracker>,
    pub roster: Arc<MatchRosterService>,
    pub provision: Arc<SlotProvisionService>,
    pub shutdown: Arc<ShutdownIntentManager>,
    pub routing: Arc<PlayerRoutingService>,
    pub sweeper: Arc<PurgeSweeper>,
    pub environments: PostgresCollection<EnvironmentDescriptorView>,
    pub players: PostgresCollection<PlayerDocument>,
}

impl RegistryApp {
    pub async fn connect(config: RegistryConfig) -> Result<Self, WiringError> {
        let store: Arc<dyn RoutingStore> = Arc::new(RedisRoutingStore::connect(&config.redis_url).await?);
        let docs = registry_docs::connect().await?;
        let fleet = Arc::new(ServerRegistry::new());
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());

        let tracker = Arc::new(ActivePlayerTracker::new(store.clone(), &config));
        let roster = Arc::new(MatchRosterService::new(store.clone(), tracker.clone()));
        let provision = Arc::new(SlotProvisionService::new(store.clone(), fleet.clone(), bus.clone()));
        let shutdown = Arc::new(ShutdownIntentManager::new(fleet.clone(), bus.clone(), &config));
        let routing = Arc::new(PlayerRoutingService::new(
            store.clone(),
            fleet.clone(),
            bus.clone(),
            tracker.clone(),
            provision.clone(),
            shutdown.clone(),
            config.clone(),
        ));
        let sweeper = Arc::new(PurgeSweeper::new(
            store.clone(),
            fleet.clone(),
            tracker.clone(),
            shutdown.clone(),
            routing.party().clone(),
            &config,
        ));

        let environments = network_environments(docs.clone());
        let players = players(docs.clone());

        Ok(Self {
            config,
            store,
            docs,
            fleet,
            bus,
            tracker,
            roster,
            provision,
            shutdown,
            routing,
            sweeper,
            environments,
            players,
        })
    }

    /// Subscribes one consumer task per inbound channel named in spec §6
    /// and dispatches each decoded envelope to the owning service.
    /// Mirrors `rbp_server::run()`'s fire-and-forget `tokio::spawn` per
    /// background collaborator, generalized from a fixed handful of
    /// tasks to one per bus channel. The scheduling model (spec §5)
    /// treats each channel as an independently-ordered stream: messages
    /// within a channel are handled in receipt order, but channels run
    /// concurrently with respect to each other.
    pub fn spawn_bus_consumers(self: &Arc<Self>) {
        macro_rules! consume {
            ($channel:expr, $handler:ident) => {{
                let app = self.clone();
                let mut receiver = app.bus.subscribe($channel);
                tokio::spawn(async move {
                    loop {
                        match receiver.recv().await {
                            Ok(raw) => app.$handler(raw, now_millis()).await,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                log::warn!("[wiring] {} consumer lagged, dropped {skipped} message(s)", $channel);
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            }};
        }

        consume!(channels::SLOT_FAMILY, on_slot_family_advertisement);
        consume!(channels::SLOT_STATUS, on_slot_status_update);
        consume!(channels::PLAYER_REQUEST, on_player_request);
        consume!(channels::PLAYER_ROUTE_ACK, on_route_ack);
        consume!(channels::PARTY_RESERVATION_CREATED, on_reservation_created);
        consume!(channels::PARTY_RESERVATION_CLAIMED, on_reservation_claimed);
        consume!(channels::MATCH_ROSTER_CREATED, on_roster_created);
        consume!(channels::MATCH_ROSTER_ENDED, on_roster_ended);
        consume!(channels::SHUTDOWN_UPDATE, on_shutdown_update);
    }

    async fn on_slot_family_advertisement(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<SlotFamilyAdvertisement>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed slot.family envelope: {err}");
                return;
            }
        };
        let advertisement = envelope.payload;
        let mut families = HashMap::with_capacity(advertisement.capacities.len());
        for (family_id, capacity) in &advertisement.capacities {
            families.insert(family_id.clone(), self.family_capacity_for(family_id, *capacity).await);
        }

        if let Some(backend) = self.fleet.backend(&advertisement.server_id) {
            backend.touch_heartbeat(now_millis);
            backend.sync_families(families.clone());
        } else {
            let (backend, outcome) = self.fleet.register_backend(
                BackendDescriptor {
                    id: advertisement.server_id.clone(),
                    soft_player_cap: self.config.default_soft_player_cap,
                    hard_player_cap: self.config.default_hard_player_cap,
                    families: families.clone(),
                },
                now_millis,
            );
            if outcome == RegisterOutcome::Added {
                if let Err(err) = self.fleet.update_backend_status(backend.id(), BackendStatus::Available) {
                    log::warn!("[wiring] {} failed to become available: {err}", advertisement.server_id);
                }
            }
        }

        let capacities: HashMap<FamilyId, u32> = families
            .iter()
            .map(|(family_id, capacity)| (family_id.clone(), capacity.max_concurrent_slots))
            .collect();
        if let Err(err) = self.store.sync_server(&advertisement.server_id, &capacities).await {
            log::warn!("[wiring] sync_server({}) failed: {err}", advertisement.server_id);
        }
    }

    /// Looks up the declared min/max players and player-equivalent factor
    /// for `family_id` from the document store, falling back to the
    /// configured defaults when no `EnvironmentDescriptorView` is on file
    /// yet (a family can be advertised before an operator documents it).
    async fn family_capacity_for(&self, family_id: &FamilyId, available: u32) -> FamilyCapacity {
        let descriptor = self.environments.document(family_id.as_str()).await.ok().flatten();
        match descriptor {
            Some(descriptor) => FamilyCapacity {
                max_concurrent_slots: available,
                available,
                player_equivalent_factor: descriptor.player_factor,
                min_players: descriptor.min_players,
                max_players: descriptor.max_players,
            },
            None => FamilyCapacity {
                max_concurrent_slots: available,
                available,
                player_equivalent_factor: self.config.default_player_equivalent_factor,
                min_players: 2,
                max_players: 8,
            },
        }
    }

    async fn on_slot_status_update(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<SlotStatusUpdate>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed slot.status envelope: {err}");
                return;
            }
        };
        if let Err(err) = self.routing.handle_slot_status_update(envelope.payload, now_millis).await {
            log::warn!("[wiring] handle_slot_status_update failed: {err}");
        }
    }

    /// The proxy that forwarded this request names itself as the
    /// envelope's `senderId`, the same convention `player_sender` uses
    /// in reverse for proxy-bound envelopes.
    async fn on_player_request(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<PlayerSlotRequest>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed player.request envelope: {err}");
                return;
            }
        };
        let proxy_id = ProxyId::from(envelope.sender_id.as_str());
        self.fleet.register_proxy(proxy_id.clone(), now_millis);
        if let Err(err) = self.routing.handle_player_request(envelope.payload, proxy_id, now_millis).await {
            log::warn!("[wiring] handle_player_request failed: {err}");
        }
    }

    async fn on_route_ack(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<PlayerRouteAck>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed player.route.ack envelope: {err}");
                return;
            }
        };
        if let Err(err) = self.routing.handle_route_ack(envelope.payload, now_millis).await {
            log::warn!("[wiring] handle_route_ack failed: {err}");
        }
    }

    async fn on_reservation_created(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<PartyReservationCreated>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed reservation.created envelope: {err}");
                return;
            }
        };
        let created = envelope.payload;
        let snapshot = PartyReservationSnapshot {
            reservation_id: created.reservation_id,
            family_id: created.family_id,
            variant_id: created.variant_id,
            party_size: created.party_size,
            tokens: created.tokens,
            target_server_id: created.target_server_id,
            assigned_team_index: None,
            created_at_millis: now_millis,
        };
        if let Err(err) = self.routing.handle_reservation_created(snapshot, now_millis).await {
            log::warn!("[wiring] handle_reservation_created failed: {err}");
        }
    }

    async fn on_reservation_claimed(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<PartyReservationClaimed>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed reservation.claimed envelope: {err}");
                return;
            }
        };
        let claimed = envelope.payload;
        if let Err(err) = self
            .routing
            .handle_reservation_claimed(&claimed.reservation_id, claimed.player_id, claimed.success, now_millis)
            .await
        {
            log::warn!("[wiring] handle_reservation_claimed failed: {err}");
        }
    }

    async fn on_roster_created(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<MatchRosterCreated>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed roster.created envelope: {err}");
                return;
            }
        };
        let created = envelope.payload;
        if let Err(err) = self
            .roster
            .on_roster_created(&created.slot_id, &created.match_id, created.players, now_millis)
            .await
        {
            log::warn!("[wiring] on_roster_created failed: {err}");
        }
    }

    async fn on_roster_ended(&self, raw: String, now_millis: u64) {
        let envelope = match Envelope::<MatchRosterEnded>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed roster.ended envelope: {err}");
                return;
            }
        };
        if let Err(err) = self.roster.on_roster_ended(&envelope.payload.slot_id, now_millis).await {
            log::warn!("[wiring] on_roster_ended failed: {err}");
        }
    }

    async fn on_shutdown_update(&self, raw: String, _now_millis: u64) {
        let envelope = match Envelope::<ShutdownIntentUpdate>::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[wiring] malformed shutdown.update envelope: {err}");
                return;
            }
        };
        self.shutdown.handle_update(envelope.payload);
    }

    /// Backend ids known to this process's in-memory fleet registry, one
    /// per registered server. The operator console's `environment list`
    /// reflects this set; restarting the process against a cold fleet
    /// (no backends re-registered yet) reports none, the same as any
    /// other in-memory view the registry keeps.
    pub fn known_family_ids(&self) -> Vec<FamilyId> {
        let mut seen = std::collections::HashSet::new();
        for backend in self.fleet.backends() {
            for family_id in backend.family_ids() {
                seen.insert(family_id);
            }
        }
        seen.into_iter().collect()
    }

    /// Re-pulls every registered backend's family capacities from the
    /// document store, picking up operator edits to min/max players or
    /// the player-equivalent factor without requiring a fresh
    /// `SlotFamilyAdvertisement`.
    pub async fn refresh_environments(&self) -> usize {
        let mut refreshed = 0;
        for backend in self.fleet.backends() {
            let mut families = HashMap::new();
            for family_id in backend.family_ids() {
                let available = backend.available_family_slots(&family_id);
                families.insert(family_id.clone(), self.family_capacity_for(&family_id, available).await);
            }
            backend.sync_families(families);
            refreshed += 1;
        }
        refreshed
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time moves forward")
        .as_millis() as u64
}

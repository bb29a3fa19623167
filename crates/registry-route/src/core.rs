//! Shared state behind the player routing service. Split out from
//! [`crate::PlayerRoutingService`] so [`crate::callbacks::RouteCallbacks`]
//! (which the party coordinator holds) and the service itself can share
//! one instance without either owning the other.
use dashmap::DashMap;
use parking_lot::Mutex;
use registry_bus::MessageBus;
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::PlayerRequestContext;
use registry_core::ProxyId;
use registry_core::RegistryConfig;
use registry_core::SlotId;
use registry_fleet::ServerRegistry;
use registry_party::PartyReservationCoordinator;
use registry_provision::SlotProvisionService;
use registry_shutdown::ShutdownIntentManager;
use registry_store::RoutingStore;
use registry_tracker::ActivePlayerTracker;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::OnceLock;

/// Everything the routing pipeline touches, minus the party coordinator
/// (set once, after construction, via [`RouteCore::install_party`] —
/// the coordinator needs an `Arc<dyn RoutingCallbacks>` built from this
/// same core, so it can't be passed in at construction time).
pub struct RouteCore {
    pub(crate) store: Arc<dyn RoutingStore>,
    pub(crate) fleet: Arc<ServerRegistry>,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) tracker: Arc<ActivePlayerTracker>,
    pub(crate) provision: Arc<SlotProvisionService>,
    pub(crate) shutdown: Arc<ShutdownIntentManager>,
    pub(crate) config: RegistryConfig,
    party: OnceLock<Arc<PartyReservationCoordinator>>,
    /// Per-family FIFO of solo requests waiting for capacity. Drained
    /// (oldest first) whenever a slot in that family becomes available.
    pub(crate) solo_queues: DashMap<FamilyId, Mutex<VecDeque<PlayerRequestContext>>>,
    /// Requests dispatched to a solo candidate and awaiting an ack;
    /// consulted on nack to rebuild the context for a retry.
    pub(crate) pending_acks: DashMap<PlayerId, (SlotId, PlayerRequestContext)>,
    /// Last proxy a given player's request arrived from, since route
    /// acks/nacks and failures don't carry the proxy id on the wire.
    pub(crate) player_proxy: DashMap<PlayerId, ProxyId>,
    /// Backend a given slot belongs to, used to check evacuating status
    /// quickly during slot removal bookkeeping.
    pub(crate) slot_backend: DashMap<SlotId, BackendId>,
}

impl RouteCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RoutingStore>,
        fleet: Arc<ServerRegistry>,
        bus: Arc<dyn MessageBus>,
        tracker: Arc<ActivePlayerTracker>,
        provision: Arc<SlotProvisionService>,
        shutdown: Arc<ShutdownIntentManager>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            fleet,
            bus,
            tracker,
            provision,
            shutdown,
            config,
            party: OnceLock::new(),
            solo_queues: DashMap::new(),
            pending_acks: DashMap::new(),
            player_proxy: DashMap::new(),
            slot_backend: DashMap::new(),
        })
    }

    pub(crate) fn install_party(&self, party: Arc<PartyReservationCoordinator>) {
        self.party
            .set(party)
            .unwrap_or_else(|_| panic!("party coordinator installed twice"));
    }

    pub(crate) fn party(&self) -> &Arc<PartyReservationCoordinator> {
        self.party
            .get()
            .expect("party coordinator installed during PlayerRoutingService::new")
    }

    pub(crate) fn enqueue_solo(&self, context: PlayerRequestContext) {
        let evicted = {
            let queue = self
                .solo_queues
                .entry(context.family_id.clone())
                .or_insert_with(|| Mutex::new(VecDeque::new()));
            let mut queue = queue.lock();
            let evicted = if queue.len() >= self.config.family_queue_capacity {
                log::warn!(
                    "[route] family queue for {} at capacity ({}), evicting oldest waiting request",
                    context.family_id,
                    self.config.family_queue_capacity
                );
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(context);
            evicted
        };
        // Fail-closed: the oldest waiter loses its place and is told so,
        // rather than silently timing out with no reply (spec §5).
        if let Some(evicted) = evicted {
            self.send_route_failure(&evicted.player_id, "no-capacity");
        }
    }

    pub(crate) fn drain_solo_queue(&self, family_id: &FamilyId) -> Vec<PlayerRequestContext> {
        let Some(queue) = self.solo_queues.get(family_id) else {
            return Vec::new();
        };
        queue.lock().drain(..).collect()
    }
}

//! The concurrent index of all registered backends and proxies.
use crate::backend::Backend;
use crate::backend::BackendDescriptor;
use crate::backend::BackendStatus;
use crate::proxy::Proxy;
use crate::proxy::ProxyStatus;
use dashmap::DashMap;
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::ProxyId;
use std::sync::Arc;

/// Whether `register` created a new entry or found an existing one.
/// Callers use this to decide whether to emit a `server.added` event —
/// registration must be idempotent by id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterOutcome {
    Added,
    AlreadyRegistered,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusTransitionError {
    #[error("unknown backend {0}")]
    UnknownBackend(BackendId),
    #[error("unknown proxy {0}")]
    UnknownProxy(ProxyId),
    #[error("{from:?} -> {to:?} is not a valid transition")]
    Invalid {
        from: BackendStatus,
        to: BackendStatus,
    },
}

/// In-memory `serverId -> Backend` and `proxyId -> Proxy` index, mirrored
/// into the routing store by the caller (the registry never calls into
/// 4.A directly, to keep this crate free of the store dependency — see
/// DESIGN.md).
#[derive(Default)]
pub struct ServerRegistry {
    backends: DashMap<BackendId, Arc<Backend>>,
    proxies: DashMap<ProxyId, Arc<Proxy>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent by id. Returns [`RegisterOutcome::Added`] only the
    /// first time a given `serverId` registers.
    pub fn register_backend(
        &self,
        descriptor: BackendDescriptor,
        now_millis: u64,
    ) -> (Arc<Backend>, RegisterOutcome) {
        if let Some(existing) = self.backends.get(&descriptor.id) {
            existing.touch_heartbeat(now_millis);
            return (existing.clone(), RegisterOutcome::AlreadyRegistered);
        }
        let id = descriptor.id.clone();
        let backend = Arc::new(Backend::new(descriptor, now_millis));
        self.backends.insert(id, backend.clone());
        log::info!("[fleet] registered backend {}", backend.id());
        (backend, RegisterOutcome::Added)
    }

    pub fn register_proxy(&self, id: ProxyId, now_millis: u64) -> (Arc<Proxy>, RegisterOutcome) {
        if let Some(existing) = self.proxies.get(&id) {
            existing.touch_heartbeat(now_millis);
            return (existing.clone(), RegisterOutcome::AlreadyRegistered);
        }
        let proxy = Arc::new(Proxy::new(id.clone(), now_millis));
        self.proxies.insert(id, proxy.clone());
        log::info!("[fleet] registered proxy {}", proxy.id());
        (proxy, RegisterOutcome::Added)
    }

    pub fn backend(&self, id: &BackendId) -> Option<Arc<Backend>> {
        self.backends.get(id).map(|entry| entry.clone())
    }

    pub fn proxy(&self, id: &ProxyId) -> Option<Arc<Proxy>> {
        self.proxies.get(id).map(|entry| entry.clone())
    }

    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.backends.iter().map(|entry| entry.clone()).collect()
    }

    pub fn proxies(&self) -> Vec<Arc<Proxy>> {
        self.proxies.iter().map(|entry| entry.clone()).collect()
    }

    pub fn remove_backend(&self, id: &BackendId) -> Option<Arc<Backend>> {
        self.backends.remove(id).map(|(_, backend)| backend)
    }

    pub fn update_backend_status(
        &self,
        id: &BackendId,
        status: BackendStatus,
    ) -> Result<(), StatusTransitionError> {
        let backend = self
            .backends
            .get(id)
            .ok_or_else(|| StatusTransitionError::UnknownBackend(id.clone()))?;
        let current = backend.status();
        if !current.can_transition_to(status) {
            return Err(StatusTransitionError::Invalid {
                from: current,
                to: status,
            });
        }
        backend.set_status(status);
        log::debug!("[fleet] backend {id} {current:?} -> {status:?}");
        Ok(())
    }

    pub fn update_proxy_status(&self, id: &ProxyId, status: ProxyStatus) -> Result<(), StatusTransitionError> {
        let proxy = self
            .proxies
            .get(id)
            .ok_or_else(|| StatusTransitionError::UnknownProxy(id.clone()))?;
        proxy.set_status(status);
        Ok(())
    }

    pub fn supports_family(&self, server_id: &BackendId, family_id: &FamilyId) -> bool {
        self.backend(server_id)
            .map(|backend| backend.supports_family(family_id))
            .unwrap_or(false)
    }

    pub fn available_family_slots(&self, server_id: &BackendId, family_id: &FamilyId) -> u32 {
        self.backend(server_id)
            .map(|backend| backend.available_family_slots(family_id))
            .unwrap_or(0)
    }

    pub fn reserve_family_slot(&self, server_id: &BackendId, family_id: &FamilyId) -> bool {
        self.backend(server_id)
            .map(|backend| backend.reserve_family_slot(family_id))
            .unwrap_or(false)
    }

    pub fn release_family_slot(&self, server_id: &BackendId, family_id: &FamilyId) {
        if let Some(backend) = self.backend(server_id) {
            backend.release_family_slot(family_id);
        }
    }

    /// Backends eligible to host new traffic: `RUNNING`/`AVAILABLE` and
    /// not evacuating.
    pub fn routable_backends(&self) -> Vec<Arc<Backend>> {
        self.backends()
            .into_iter()
            .filter(|backend| backend.status().is_routable())
            .collect()
    }

    pub fn is_server_evacuating(&self, server_id: &BackendId) -> bool {
        self.backend(server_id)
            .map(|backend| backend.is_evacuating())
            .unwrap_or(false)
    }

    /// Backends whose heartbeat is older than `timeout_millis`, transitioned
    /// to `DEAD` and removed from the index. Callers (the sweeper) are
    /// responsible for releasing the backend's slots/allocations in the
    /// routing store and requeuing affected party allocations.
    pub fn sweep_dead_backends(&self, now_millis: u64, timeout_millis: u64) -> Vec<Arc<Backend>> {
        let mut dead = Vec::new();
        for backend in self.backends() {
            if backend.status() == BackendStatus::Dead {
                continue;
            }
            if backend.heartbeat_age_millis(now_millis) > timeout_millis {
                backend.set_status(BackendStatus::Dead);
                dead.push(backend);
            }
        }
        for backend in &dead {
            self.backends.remove(backend.id());
            log::warn!("[fleet] backend {} timed out, marked DEAD", backend.id());
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FamilyCapacity;
    use std::collections::HashMap;

    fn descriptor(id: &str) -> BackendDescriptor {
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
        BackendDescriptor {
            id: BackendId::from(id),
            soft_player_cap: 100,
            hard_player_cap: 200,
            families,
        }
    }

    #[test]
    fn register_is_idempotent() {
        let registry = ServerRegistry::new();
        let (_, first) = registry.register_backend(descriptor("b1"), 0);
        let (_, second) = registry.register_backend(descriptor("b1"), 10);
        assert_eq!(first, RegisterOutcome::Added);
        assert_eq!(second, RegisterOutcome::AlreadyRegistered);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let registry = ServerRegistry::new();
        registry.register_backend(descriptor("b1"), 0);
        let id = BackendId::from("b1");
        let err = registry
            .update_backend_status(&id, BackendStatus::Running)
            .unwrap_err();
        assert!(matches!(err, StatusTransitionError::Invalid { .. }));
    }

    #[test]
    fn dead_sweep_removes_stale_backend() {
        let registry = ServerRegistry::new();
        registry.register_backend(descriptor("b1"), 0);
        let dead = registry.sweep_dead_backends(100_000, 30_000);
        assert_eq!(dead.len(), 1);
        assert!(registry.backend(&BackendId::from("b1")).is_none());
    }

    #[test]
    fn fresh_heartbeat_survives_sweep() {
        let registry = ServerRegistry::new();
        registry.register_backend(descriptor("b1"), 90_000);
        let dead = registry.sweep_dead_backends(100_000, 30_000);
        assert!(dead.is_empty());
    }
}

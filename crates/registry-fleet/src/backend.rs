//! A single registered game server and its declared family capacities.
use dashmap::DashMap;
use dashmap::DashSet;
use parking_lot::Mutex;
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::SlotId;
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Lifecycle of a registered backend. Transitions are validated by
/// [`crate::registry::ServerRegistry::update_status`]; `EVACUATING` is
/// absorbing until the shutdown intent completes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BackendStatus {
    Registering,
    Available,
    Running,
    Full,
    Evacuating,
    Stopping,
    Dead,
}

impl BackendStatus {
    /// Whether `self -> next` is an allowed transition, per the lifecycle
    /// `REGISTERING -> AVAILABLE -> RUNNING <-> FULL -> EVACUATING ->
    /// STOPPING -> DEAD`. `DEAD` is reachable from any state (heartbeat
    /// timeout doesn't wait for a tidy handoff).
    pub fn can_transition_to(self, next: BackendStatus) -> bool {
        use BackendStatus::*;
        if next == Dead {
            return true;
        }
        matches!(
            (self, next),
            (Registering, Available)
                | (Available, Running)
                | (Running, Full)
                | (Full, Running)
                | (Running, Evacuating)
                | (Full, Evacuating)
                | (Available, Evacuating)
                | (Evacuating, Stopping)
                | (Evacuating, Available) // shutdown cancellation
        )
    }

    pub fn is_routable(self) -> bool {
        matches!(self, BackendStatus::Running | BackendStatus::Available)
    }
}

/// Declared capacity for one family on one backend.
#[derive(Clone, Debug)]
pub struct FamilyCapacity {
    pub max_concurrent_slots: u32,
    pub available: u32,
    pub player_equivalent_factor: f64,
    pub min_players: u32,
    pub max_players: u32,
}

/// What a backend advertises at registration time.
#[derive(Clone, Debug)]
pub struct BackendDescriptor {
    pub id: BackendId,
    pub soft_player_cap: u32,
    pub hard_player_cap: u32,
    pub families: HashMap<FamilyId, FamilyCapacity>,
}

/// A registered game server. Counters use field-level atomics /
/// `parking_lot::Mutex` rather than a lock over the whole struct, since
/// heartbeat touches and family-slot reservations happen far more often
/// than status transitions.
pub struct Backend {
    id: BackendId,
    status: Mutex<BackendStatus>,
    soft_player_cap: u32,
    hard_player_cap: u32,
    current_player_count: AtomicU32,
    last_heartbeat_millis: AtomicU64,
    families: Mutex<HashMap<FamilyId, FamilyCapacity>>,
    suffix_counters: DashMap<FamilyId, AtomicU32>,
    hosted_slots: DashSet<SlotId>,
}

impl Backend {
    pub fn new(descriptor: BackendDescriptor, now_millis: u64) -> Self {
        Self {
            id: descriptor.id,
            status: Mutex::new(BackendStatus::Registering),
            soft_player_cap: descriptor.soft_player_cap,
            hard_player_cap: descriptor.hard_player_cap,
            current_player_count: AtomicU32::new(0),
            last_heartbeat_millis: AtomicU64::new(now_millis),
            families: Mutex::new(descriptor.families),
            suffix_counters: DashMap::new(),
            hosted_slots: DashSet::new(),
        }
    }

    pub fn id(&self) -> &BackendId {
        &self.id
    }

    pub fn status(&self) -> BackendStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: BackendStatus) {
        *self.status.lock() = status;
    }

    pub fn is_evacuating(&self) -> bool {
        self.status() == BackendStatus::Evacuating
    }

    pub fn current_player_count(&self) -> u32 {
        self.current_player_count.load(Ordering::Relaxed)
    }

    pub fn set_current_player_count(&self, count: u32) {
        self.current_player_count.store(count, Ordering::Relaxed);
    }

    pub fn touch_heartbeat(&self, now_millis: u64) {
        self.last_heartbeat_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn heartbeat_age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.last_heartbeat_millis.load(Ordering::Relaxed))
    }

    pub fn supports_family(&self, family_id: &FamilyId) -> bool {
        self.families.lock().contains_key(family_id)
    }

    pub fn available_family_slots(&self, family_id: &FamilyId) -> u32 {
        self.families
            .lock()
            .get(family_id)
            .map(|capacity| capacity.available)
            .unwrap_or(0)
    }

    pub fn family_capacity(&self, family_id: &FamilyId) -> Option<FamilyCapacity> {
        self.families.lock().get(family_id).cloned()
    }

    pub fn family_ids(&self) -> Vec<FamilyId> {
        self.families.lock().keys().cloned().collect()
    }

    pub fn sync_families(&self, families: HashMap<FamilyId, FamilyCapacity>) {
        *self.families.lock() = families;
    }

    /// Paired with the routing store's `reserveFamilyCapacity` script;
    /// both must succeed for a provision attempt to proceed. Returns
    /// `false` if another task already claimed the last slot (lost the
    /// race) or the hard player-equivalent cap would be exceeded.
    pub fn reserve_family_slot(&self, family_id: &FamilyId) -> bool {
        let mut families = self.families.lock();
        let Some(capacity) = families.get_mut(family_id) else {
            return false;
        };
        if capacity.available == 0 {
            return false;
        }
        let active_after = (capacity.max_concurrent_slots - capacity.available + 1) as f64;
        let load_after = active_after * capacity.player_equivalent_factor;
        if load_after > self.hard_player_cap as f64 {
            log::warn!(
                "[fleet] {} refusing provision on {family_id}: hard cap {} exceeded",
                self.id,
                self.hard_player_cap
            );
            return false;
        }
        if load_after > self.soft_player_cap as f64 {
            log::warn!(
                "[fleet] {} soft cap {} exceeded provisioning {family_id}",
                self.id,
                self.soft_player_cap
            );
        }
        capacity.available -= 1;
        true
    }

    pub fn release_family_slot(&self, family_id: &FamilyId) {
        if let Some(capacity) = self.families.lock().get_mut(family_id) {
            capacity.available = (capacity.available + 1).min(capacity.max_concurrent_slots);
        }
    }

    /// Next base-26 (`A..Z, AA..`) suffix for a new slot on this backend
    /// within `family_id`.
    pub fn next_slot_suffix(&self, family_id: &FamilyId) -> String {
        let counter = self
            .suffix_counters
            .entry(family_id.clone())
            .or_insert_with(|| AtomicU32::new(0));
        let n = counter.fetch_add(1, Ordering::Relaxed);
        base26(n)
    }

    pub fn record_slot(&self, slot_id: SlotId) {
        self.hosted_slots.insert(slot_id);
    }

    pub fn forget_slot(&self, slot_id: &SlotId) {
        self.hosted_slots.remove(slot_id);
    }

    pub fn slots(&self) -> Vec<SlotId> {
        self.hosted_slots.iter().map(|entry| entry.clone()).collect()
    }
}

fn base26(mut n: u32) -> String {
    let mut chars = Vec::new();
    loop {
        let rem = (n % 26) as u8;
        chars.push((b'A' + rem) as char);
        n = n / 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    chars.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(family: &str, slots: u32) -> BackendDescriptor {
        let mut families = HashMap::new();
        families.insert(
            FamilyId::from(family),
            FamilyCapacity {
                max_concurrent_slots: slots,
                available: slots,
                player_equivalent_factor: 1.0,
                min_players: 2,
                max_players: 4,
            },
        );
        BackendDescriptor {
            id: BackendId::from("b1"),
            soft_player_cap: 100,
            hard_player_cap: 200,
            families,
        }
    }

    #[test]
    fn reserve_then_release_restores_availability() {
        let backend = Backend::new(descriptor("duel", 2), 0);
        let family = FamilyId::from("duel");
        assert!(backend.reserve_family_slot(&family));
        assert_eq!(backend.available_family_slots(&family), 1);
        backend.release_family_slot(&family);
        assert_eq!(backend.available_family_slots(&family), 2);
    }

    #[test]
    fn reserve_fails_at_zero_availability() {
        let backend = Backend::new(descriptor("duel", 1), 0);
        let family = FamilyId::from("duel");
        assert!(backend.reserve_family_slot(&family));
        assert!(!backend.reserve_family_slot(&family));
    }

    #[test]
    fn reserve_refuses_past_hard_cap() {
        let mut families = HashMap::new();
        families.insert(
            FamilyId::from("duel"),
            FamilyCapacity {
                max_concurrent_slots: 10,
                available: 10,
                player_equivalent_factor: 5.0,
                min_players: 2,
                max_players: 4,
            },
        );
        let backend = Backend::new(
            BackendDescriptor {
                id: BackendId::from("b1"),
                soft_player_cap: 5,
                hard_player_cap: 9,
                families,
            },
            0,
        );
        let family = FamilyId::from("duel");
        assert!(!backend.reserve_family_slot(&family));
    }

    #[test]
    fn suffix_counter_goes_a_through_z_then_aa() {
        let backend = Backend::new(descriptor("duel", 1), 0);
        let family = FamilyId::from("duel");
        let suffixes: Vec<String> = (0..27).map(|_| backend.next_slot_suffix(&family)).collect();
        assert_eq!(suffixes[0], "A");
        assert_eq!(suffixes[25], "Z");
        assert_eq!(suffixes[26], "AA");
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        assert!(BackendStatus::Registering.can_transition_to(BackendStatus::Available));
        assert!(!BackendStatus::Registering.can_transition_to(BackendStatus::Running));
        assert!(BackendStatus::Running.can_transition_to(BackendStatus::Full));
        assert!(BackendStatus::Evacuating.can_transition_to(BackendStatus::Stopping));
        assert!(BackendStatus::Available.can_transition_to(BackendStatus::Dead));
    }
}

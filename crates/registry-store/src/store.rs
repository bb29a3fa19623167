//! The typed routing store: every multi-key mutation that must be
//! atomic goes through a script in [`crate::scripts`]; single-key
//! operations use plain Redis commands.
use crate::keys;
use crate::records::MatchRosterRecord;
use crate::records::SlotRecord;
use crate::scripts;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::SlotId;
use registry_core::StoreError;
use std::collections::HashMap;

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed accessor over the Redis-backed routing state named in the
/// external interface's key layout.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn reserve_family_capacity(
        &self,
        server_id: &BackendId,
        family_id: &FamilyId,
    ) -> StoreResult<Option<u32>>;
    async fn release_family_capacity(
        &self,
        server_id: &BackendId,
        family_id: &FamilyId,
    ) -> StoreResult<u32>;
    async fn sync_server(
        &self,
        server_id: &BackendId,
        family_capacities: &HashMap<FamilyId, u32>,
    ) -> StoreResult<()>;

    async fn store_slot(&self, record: &SlotRecord) -> StoreResult<()>;
    async fn remove_slot(&self, slot_id: &SlotId, family_id: &FamilyId) -> StoreResult<()>;
    async fn get_slot(&self, slot_id: &SlotId) -> StoreResult<Option<SlotRecord>>;
    async fn family_slot_ids(&self, family_id: &FamilyId) -> StoreResult<Vec<String>>;

    async fn increment_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32>;
    /// Bumps occupancy by `by` in one round trip, used when a whole party
    /// lands on a slot at once rather than one player at a time.
    async fn increment_occupancy_by(&self, slot_id: &SlotId, by: u32) -> StoreResult<u32>;
    async fn decrement_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32>;
    async fn get_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32>;

    async fn set_active_slot(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
    ) -> StoreResult<Option<SlotId>>;
    async fn get_active_slot(&self, player_id: &PlayerId) -> StoreResult<Option<SlotId>>;
    async fn remove_active_players_for_slot(&self, slot_id: &SlotId) -> StoreResult<Vec<PlayerId>>;
    /// Clears a single player's active-slot mapping, independent of any
    /// other player sharing the same slot.
    async fn clear_active_slot(&self, player_id: &PlayerId) -> StoreResult<Option<SlotId>>;

    async fn push_recent_slot(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
        now_millis: u64,
        history_bound: usize,
        ttl_millis: u64,
    ) -> StoreResult<()>;
    async fn get_recent_slots(&self, player_id: &PlayerId) -> StoreResult<Vec<SlotId>>;
    async fn trim_recent_slots(
        &self,
        player_id: &PlayerId,
        now_millis: u64,
        history_bound: usize,
        ttl_millis: u64,
    ) -> StoreResult<()>;
    /// Every player with a recent-slot history entry, for the purge
    /// sweeper to drive [`RoutingStore::trim_recent_slots`] over players
    /// who haven't pushed a fresh entry recently enough to self-trim.
    async fn recent_slot_tracked_players(&self) -> StoreResult<Vec<PlayerId>>;

    async fn store_match_roster(
        &self,
        slot_id: &SlotId,
        record: &MatchRosterRecord,
    ) -> StoreResult<()>;
    async fn get_match_roster(&self, slot_id: &SlotId) -> StoreResult<Option<MatchRosterRecord>>;
    async fn remove_match_roster(&self, slot_id: &SlotId) -> StoreResult<()>;

    async fn enqueue_party_reservation(
        &self,
        family_id: &FamilyId,
        reservation_id: &str,
    ) -> StoreResult<()>;
    async fn enqueue_party_reservation_front(
        &self,
        family_id: &FamilyId,
        reservation_id: &str,
    ) -> StoreResult<()>;
    async fn poll_party_reservation(&self, family_id: &FamilyId) -> StoreResult<Option<String>>;

    async fn save_party_allocation(&self, reservation_id: &str, blob: &str) -> StoreResult<()>;
    async fn get_party_allocation(&self, reservation_id: &str) -> StoreResult<Option<String>>;
    /// Removes the allocation and decrements `slot_id`'s occupancy by
    /// `party_size` in one round trip. Returns `(removed, slot_now_idle)`.
    async fn remove_party_allocation(
        &self,
        reservation_id: &str,
        slot_id: &SlotId,
        party_size: u32,
    ) -> StoreResult<(bool, bool)>;
    async fn get_party_allocations(&self) -> StoreResult<HashMap<String, String>>;

    async fn enqueue_pending_reservation_player(
        &self,
        reservation_id: &str,
        context_json: &str,
    ) -> StoreResult<()>;
    async fn drain_pending_reservation_players(
        &self,
        reservation_id: &str,
    ) -> StoreResult<Vec<String>>;

    async fn block_expiry_add(&self, member: &str, expires_at_millis: u64) -> StoreResult<()>;
    async fn block_expiry_poll_expired(&self, now_millis: u64, limit: isize)
        -> StoreResult<Vec<String>>;
    async fn block_expiry_remove(&self, member: &str) -> StoreResult<()>;

    /// Every live [`SlotRecord`] advertised for `family_id`.
    ///
    /// `family_slot_ids` mixes serverIds (added by `reserveFamilyCapacity`)
    /// and slotIds (added by `storeSlot`) in the same set per the external
    /// interface's key layout; a serverId has no `slots:<id>` hash, so
    /// `get_slot` naturally filters it out without needing a second index.
    async fn slots_for_family(&self, family_id: &FamilyId) -> StoreResult<Vec<SlotRecord>> {
        let mut slots = Vec::new();
        for candidate in self.family_slot_ids(family_id).await? {
            let slot_id = SlotId::from(candidate);
            if let Some(record) = self.get_slot(&slot_id).await? {
                slots.push(record);
            }
        }
        Ok(slots)
    }
}

/// Redis-backed implementation. Cheap to clone: `ConnectionManager`
/// multiplexes over a single connection and reconnects transparently.
#[derive(Clone)]
pub struct RedisRoutingStore {
    conn: ConnectionManager,
}

impl RedisRoutingStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RoutingStore for RedisRoutingStore {
    async fn reserve_family_capacity(
        &self,
        server_id: &BackendId,
        family_id: &FamilyId,
    ) -> StoreResult<Option<u32>> {
        let mut conn = self.conn.clone();
        let remaining: i64 = scripts::RESERVE_FAMILY_CAPACITY
            .key(keys::family_capacity(server_id))
            .key(keys::family_servers(family_id))
            .key(keys::server_families(server_id))
            .arg(family_id.as_str())
            .arg(server_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        log::debug!("[store] reserveFamilyCapacity {server_id}/{family_id} -> {remaining}");
        Ok(if remaining < 0 {
            None
        } else {
            Some(remaining as u32)
        })
    }

    async fn release_family_capacity(
        &self,
        server_id: &BackendId,
        family_id: &FamilyId,
    ) -> StoreResult<u32> {
        let mut conn = self.conn.clone();
        let remaining: i64 = scripts::RELEASE_FAMILY_CAPACITY
            .key(keys::family_capacity(server_id))
            .key(keys::family_servers(family_id))
            .arg(family_id.as_str())
            .arg(server_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        log::debug!("[store] releaseFamilyCapacity {server_id}/{family_id} -> {remaining}");
        Ok(remaining.max(0) as u32)
    }

    async fn sync_server(
        &self,
        server_id: &BackendId,
        family_capacities: &HashMap<FamilyId, u32>,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let total_key = keys::family_total(server_id);
        let capacity_key = keys::family_capacity(server_id);
        let families_key = keys::server_families(server_id);
        for (family_id, capacity) in family_capacities {
            let _: () = conn.hset(&total_key, family_id.as_str(), *capacity).await?;
            let _: () = conn
                .hset(&capacity_key, family_id.as_str(), *capacity)
                .await?;
            let _: () = conn.sadd(&families_key, family_id.as_str()).await?;
        }
        log::debug!("[store] syncServer {server_id}: {} families", family_capacities.len());
        Ok(())
    }

    async fn store_slot(&self, record: &SlotRecord) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let fields = record.to_field_pairs();
        let _: () = scripts::STORE_SLOT
            .key(keys::slot(&record.slot_id))
            .key(keys::family_servers(&record.family))
            .arg(record.slot_id.as_str())
            .arg(&fields)
            .invoke_async(&mut conn)
            .await?;
        log::debug!("[store] storeSlot {}", record.slot_id);
        Ok(())
    }

    async fn remove_slot(&self, slot_id: &SlotId, family_id: &FamilyId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = scripts::REMOVE_SLOT
            .key(keys::slot(slot_id))
            .key(keys::family_servers(family_id))
            .key(keys::occupancy(slot_id))
            .arg(slot_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        log::debug!("[store] removeSlot {slot_id}");
        Ok(())
    }

    async fn get_slot(&self, slot_id: &SlotId) -> StoreResult<Option<SlotRecord>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(keys::slot(slot_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(SlotRecord::from_field_map(slot_id.clone(), fields))
    }

    async fn family_slot_ids(&self, family_id: &FamilyId) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(keys::family_servers(family_id)).await?;
        Ok(members)
    }

    async fn increment_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(keys::occupancy(slot_id), 1).await?;
        Ok(value.max(0) as u32)
    }

    async fn increment_occupancy_by(&self, slot_id: &SlotId, by: u32) -> StoreResult<u32> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(keys::occupancy(slot_id), by as i64).await?;
        Ok(value.max(0) as u32)
    }

    async fn decrement_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32> {
        let mut conn = self.conn.clone();
        let value: i64 = scripts::DECREMENT_OCCUPANCY
            .key(keys::occupancy(slot_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(value.max(0) as u32)
    }

    async fn get_occupancy(&self, slot_id: &SlotId) -> StoreResult<u32> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(keys::occupancy(slot_id)).await?;
        Ok(value.unwrap_or(0).max(0) as u32)
    }

    async fn set_active_slot(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
    ) -> StoreResult<Option<SlotId>> {
        let mut conn = self.conn.clone();
        let previous: Option<String> = scripts::SET_ACTIVE_SLOT
            .key(keys::active_slot_map())
            .arg(player_id.as_str())
            .arg(slot_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(previous.map(SlotId::from))
    }

    async fn get_active_slot(&self, player_id: &PlayerId) -> StoreResult<Option<SlotId>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(keys::active_slot_map(), player_id.as_str()).await?;
        Ok(value.map(SlotId::from))
    }

    async fn remove_active_players_for_slot(&self, slot_id: &SlotId) -> StoreResult<Vec<PlayerId>> {
        let mut conn = self.conn.clone();
        let players: Vec<String> = scripts::REMOVE_ACTIVE_PLAYERS_FOR_SLOT
            .key(keys::active_slot_map())
            .key(keys::active_players_for_slot(slot_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(players.into_iter().map(PlayerId::from).collect())
    }

    async fn clear_active_slot(&self, player_id: &PlayerId) -> StoreResult<Option<SlotId>> {
        let mut conn = self.conn.clone();
        let prev: Option<String> = scripts::CLEAR_ACTIVE_SLOT
            .key(keys::active_slot_map())
            .arg(player_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(prev.map(SlotId::from))
    }

    async fn push_recent_slot(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
        now_millis: u64,
        history_bound: usize,
        ttl_millis: u64,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = scripts::PUSH_RECENT_SLOT
            .key(keys::recent_slots(player_id))
            .arg(slot_id.as_str())
            .arg(now_millis)
            .arg(history_bound)
            .arg(ttl_millis)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_recent_slots(&self, player_id: &PlayerId) -> StoreResult<Vec<SlotId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(keys::recent_slots(player_id), 0, -1).await?;
        Ok(members.into_iter().map(SlotId::from).collect())
    }

    async fn trim_recent_slots(
        &self,
        player_id: &PlayerId,
        now_millis: u64,
        history_bound: usize,
        ttl_millis: u64,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = scripts::TRIM_RECENT_SLOTS
            .key(keys::recent_slots(player_id))
            .arg(now_millis)
            .arg(history_bound)
            .arg(ttl_millis)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recent_slot_tracked_players(&self) -> StoreResult<Vec<PlayerId>> {
        let mut conn = self.conn.clone();
        let mut players = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::recent_slots_scan_pattern())
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            for key in keys {
                if let Some(suffix) = keys::player_id_from_recent_slots_key(&key) {
                    players.push(PlayerId::from(suffix));
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(players)
    }

    async fn store_match_roster(
        &self,
        slot_id: &SlotId,
        record: &MatchRosterRecord,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let blob = serde_json::to_string(record).expect("serialize match roster");
        let _: () = conn.set(keys::match_roster(slot_id), blob).await?;
        Ok(())
    }

    async fn get_match_roster(&self, slot_id: &SlotId) -> StoreResult<Option<MatchRosterRecord>> {
        let mut conn = self.conn.clone();
        let blob: Option<String> = conn.get(keys::match_roster(slot_id)).await?;
        Ok(blob.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    async fn remove_match_roster(&self, slot_id: &SlotId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys::match_roster(slot_id)).await?;
        Ok(())
    }

    async fn enqueue_party_reservation(
        &self,
        family_id: &FamilyId,
        reservation_id: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(keys::party_queue(family_id), reservation_id).await?;
        Ok(())
    }

    async fn enqueue_party_reservation_front(
        &self,
        family_id: &FamilyId,
        reservation_id: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(keys::party_queue(family_id), reservation_id).await?;
        Ok(())
    }

    async fn poll_party_reservation(&self, family_id: &FamilyId) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.lpop(keys::party_queue(family_id), None).await?;
        Ok(value)
    }

    async fn save_party_allocation(&self, reservation_id: &str, blob: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(keys::party_allocations(), reservation_id, blob)
            .await?;
        Ok(())
    }

    async fn get_party_allocation(&self, reservation_id: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(keys::party_allocations(), reservation_id).await?;
        Ok(value)
    }

    async fn remove_party_allocation(
        &self,
        reservation_id: &str,
        slot_id: &SlotId,
        party_size: u32,
    ) -> StoreResult<(bool, bool)> {
        let mut conn = self.conn.clone();
        let (removed, slot_now_idle): (bool, bool) = scripts::RELEASE_PARTY_ALLOCATION
            .key(keys::party_allocations())
            .key(keys::occupancy(slot_id))
            .arg(reservation_id)
            .arg(party_size)
            .invoke_async(&mut conn)
            .await?;
        Ok((removed, slot_now_idle))
    }

    async fn get_party_allocations(&self) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let all: HashMap<String, String> = conn.hgetall(keys::party_allocations()).await?;
        Ok(all)
    }

    async fn enqueue_pending_reservation_player(
        &self,
        reservation_id: &str,
        context_json: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .rpush(keys::pending_reservation_players(reservation_id), context_json)
            .await?;
        Ok(())
    }

    async fn drain_pending_reservation_players(
        &self,
        reservation_id: &str,
    ) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = scripts::DRAIN_PENDING_RESERVATION_PLAYERS
            .key(keys::pending_reservation_players(reservation_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(items)
    }

    async fn block_expiry_add(&self, member: &str, expires_at_millis: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(keys::block_expiry(), member, expires_at_millis)
            .await?;
        Ok(())
    }

    async fn block_expiry_poll_expired(
        &self,
        now_millis: u64,
        limit: isize,
    ) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let expired: Vec<String> = conn
            .zrangebyscore_limit(keys::block_expiry(), 0, now_millis, 0, limit)
            .await?;
        Ok(expired)
    }

    async fn block_expiry_remove(&self, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(keys::block_expiry(), member).await?;
        Ok(())
    }
}

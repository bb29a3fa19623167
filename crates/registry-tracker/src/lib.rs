//! Active Player Tracker (spec 4.D) and Match Roster Service (4.E).
//!
//! Both wrap [`registry_store::RoutingStore`]'s player-slot operations;
//! grounded on `rbp-gameroom::table`'s eviction bookkeeping, generalized
//! from an in-process `HashSet<Position>` to store-backed state that
//! must survive a registry restart.
use registry_core::PlayerId;
use registry_core::RegistryConfig;
use registry_core::SlotId;
use registry_core::StoreError;
use registry_store::MatchRosterRecord;
use registry_store::RoutingStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Wraps the routing store's player-slot operations with the
/// recent-slot-history and previous-slot-eviction policies from 4.D.
pub struct ActivePlayerTracker {
    store: Arc<dyn RoutingStore>,
    recent_slot_history: usize,
    recent_slot_ttl_millis: u64,
}

impl ActivePlayerTracker {
    pub fn new(store: Arc<dyn RoutingStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            recent_slot_history: config.recent_slot_history,
            recent_slot_ttl_millis: config.recent_slot_ttl.as_millis() as u64,
        }
    }

    /// Sets `slotId` as the active slot for each player. If a player had
    /// a *different* previous active slot, pushes it into their
    /// recent-slot history.
    pub async fn record_active_players(
        &self,
        slot_id: &SlotId,
        players: &[PlayerId],
        now_millis: u64,
    ) -> Result<(), StoreError> {
        for player_id in players {
            let previous = self.store.set_active_slot(player_id, slot_id).await?;
            if let Some(previous_slot) = previous {
                if &previous_slot != slot_id {
                    self.push_recent(player_id, &previous_slot, now_millis).await?;
                }
            }
        }
        Ok(())
    }

    /// Evicts every player currently active on `slotId`, pushing each
    /// into their recent-slot history. Returns the evicted player ids.
    pub async fn clear_active_players_for_slot(
        &self,
        slot_id: &SlotId,
        now_millis: u64,
    ) -> Result<Vec<PlayerId>, StoreError> {
        let evicted = self.store.remove_active_players_for_slot(slot_id).await?;
        for player_id in &evicted {
            self.push_recent(player_id, slot_id, now_millis).await?;
        }
        Ok(evicted)
    }

    /// Clears one player's active-slot mapping (independent of others on
    /// the same slot) and pushes it into their recent-slot history.
    pub async fn clear_active_player(
        &self,
        player_id: &PlayerId,
        now_millis: u64,
    ) -> Result<Option<SlotId>, StoreError> {
        let previous = self.store.clear_active_slot(player_id).await?;
        if let Some(slot_id) = &previous {
            self.push_recent(player_id, slot_id, now_millis).await?;
        }
        Ok(previous)
    }

    /// The player's current recent-slot blocklist, trimmed of anything
    /// past `recentSlotTtl` or beyond `recentSlotHistory` entries.
    pub async fn resolve_recent_blocked_slots(
        &self,
        player_id: &PlayerId,
        now_millis: u64,
    ) -> Result<HashSet<SlotId>, StoreError> {
        self.store
            .trim_recent_slots(
                player_id,
                now_millis,
                self.recent_slot_history,
                self.recent_slot_ttl_millis,
            )
            .await?;
        Ok(self.store.get_recent_slots(player_id).await?.into_iter().collect())
    }

    async fn push_recent(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        self.store
            .push_recent_slot(
                player_id,
                slot_id,
                now_millis,
                self.recent_slot_history,
                self.recent_slot_ttl_millis,
            )
            .await
    }
}

/// Keeps the active-player map consistent with in-progress matches.
pub struct MatchRosterService {
    store: Arc<dyn RoutingStore>,
    tracker: Arc<ActivePlayerTracker>,
}

impl MatchRosterService {
    pub fn new(store: Arc<dyn RoutingStore>, tracker: Arc<ActivePlayerTracker>) -> Self {
        Self { store, tracker }
    }

    /// Handles `MatchRosterCreated`. An empty player list tears the
    /// roster back down immediately rather than storing a vacuous one.
    pub async fn on_roster_created(
        &self,
        slot_id: &SlotId,
        match_id: &str,
        players: Vec<PlayerId>,
        now_millis: u64,
    ) -> Result<(), StoreError> {
        if players.is_empty() {
            self.store.remove_match_roster(slot_id).await?;
            self.tracker.clear_active_players_for_slot(slot_id, now_millis).await?;
            return Ok(());
        }
        let record = MatchRosterRecord {
            match_id: match_id.to_string(),
            players: players.clone(),
            created_at: now_millis,
        };
        self.store.store_match_roster(slot_id, &record).await?;
        self.tracker.record_active_players(slot_id, &players, now_millis).await
    }

    /// Handles `MatchRosterEnded`. Uses the stored roster's player list
    /// when present (it may have drifted from the store's by-slot
    /// reverse index); falls back to the bulk by-slot clear when no
    /// roster was ever recorded for this slot.
    pub async fn on_roster_ended(&self, slot_id: &SlotId, now_millis: u64) -> Result<(), StoreError> {
        let roster = self.store.get_match_roster(slot_id).await?;
        self.store.remove_match_roster(slot_id).await?;
        match roster {
            Some(record) => {
                for player_id in &record.players {
                    self.tracker.clear_active_player(player_id, now_millis).await?;
                }
                Ok(())
            }
            None => {
                self.tracker.clear_active_players_for_slot(slot_id, now_millis).await?;
                Ok(())
            }
        }
    }
}

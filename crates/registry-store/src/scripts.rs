//! Atomic Lua scripts backing the routing store's multi-key mutations,
//! loaded once at process startup. Grounded on the `REDIS_SCRIPT` +
//! `include_str!` loading pattern used for `lobby_create.lua` /
//! `player_remove.lua` in the matchmaking worker prior art.
use lazy_static::lazy_static;
use redis::Script;

lazy_static! {
    pub static ref RESERVE_FAMILY_CAPACITY: Script =
        Script::new(include_str!("scripts/reserve_family_capacity.lua"));
    pub static ref RELEASE_FAMILY_CAPACITY: Script =
        Script::new(include_str!("scripts/release_family_capacity.lua"));
    pub static ref STORE_SLOT: Script = Script::new(include_str!("scripts/store_slot.lua"));
    pub static ref REMOVE_SLOT: Script = Script::new(include_str!("scripts/remove_slot.lua"));
    pub static ref SET_ACTIVE_SLOT: Script =
        Script::new(include_str!("scripts/set_active_slot.lua"));
    pub static ref CLEAR_ACTIVE_SLOT: Script =
        Script::new(include_str!("scripts/clear_active_slot.lua"));
    pub static ref REMOVE_ACTIVE_PLAYERS_FOR_SLOT: Script =
        Script::new(include_str!("scripts/remove_active_players_for_slot.lua"));
    pub static ref PUSH_RECENT_SLOT: Script =
        Script::new(include_str!("scripts/push_recent_slot.lua"));
    pub static ref TRIM_RECENT_SLOTS: Script =
        Script::new(include_str!("scripts/trim_recent_slots.lua"));
    pub static ref DECREMENT_OCCUPANCY: Script =
        Script::new(include_str!("scripts/decrement_occupancy.lua"));
    pub static ref RELEASE_PARTY_ALLOCATION: Script =
        Script::new(include_str!("scripts/release_party_allocation.lua"));
    pub static ref DRAIN_PENDING_RESERVATION_PLAYERS: Script =
        Script::new(include_str!("scripts/drain_pending_reservation_players.lua"));
}

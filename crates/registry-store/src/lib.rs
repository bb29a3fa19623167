//! Redis-backed routing store: the single source of truth for capacity,
//! slot, occupancy, active-player, and queue state that must survive a
//! registry restart.
#[cfg(feature = "fake")]
pub mod fake;
pub mod keys;
pub mod records;
pub mod scripts;
pub mod store;

#[cfg(feature = "fake")]
pub use fake::FakeRoutingStore;
pub use records::MatchRosterRecord;
pub use records::SlotRecord;
pub use records::SlotStatus;
pub use store::RedisRoutingStore;
pub use store::RoutingStore;
pub use store::StoreResult;

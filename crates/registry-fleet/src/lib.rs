//! In-memory index of registered backends and proxies (spec §4.B).
//!
//! Authoritative for "live" registration; the routing store (4.A) mirrors
//! the facts that must survive a registry restart. Grounded on
//! `rbp-gameroom::room`'s ownership-by-id pattern, generalized from a
//! single `HashMap<RoomId, Room>` to a concurrent `DashMap` per
//! `other_examples/` registries of this shape.
pub mod backend;
pub mod proxy;
pub mod registry;

pub use backend::Backend;
pub use backend::BackendDescriptor;
pub use backend::BackendStatus;
pub use backend::FamilyCapacity;
pub use proxy::Proxy;
pub use proxy::ProxyStatus;
pub use registry::RegisterOutcome;
pub use registry::ServerRegistry;
pub use registry::StatusTransitionError;

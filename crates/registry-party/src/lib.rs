//! Party Reservation Coordinator (spec 4.F): seats a group of players
//! onto one slot as a unit rather than routing them independently.
pub mod callbacks;
pub mod coordinator;
pub mod types;

pub use callbacks::RoutingCallbacks;
pub use coordinator::PartyReservationCoordinator;
pub use types::provision_hint;
pub use types::PartyReservationAllocation;
pub use types::PartyReservationSnapshot;

//! Error kinds shared across the registry, per the spec's §7 propagation
//! policy: handlers log and continue, callers retry transient failures,
//! and `Fatal` is the only variant that halts intake.
use thiserror::Error;

use crate::ids::BackendId;
use crate::ids::FamilyId;

/// Reason code for a rejected or malformed protocol message.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProtocolViolation {
    /// A party-scoped message arrived without a reservation token.
    PartyTokenMissing,
    /// The reservation token on a party message doesn't match the
    /// reservation it claims to belong to.
    PartyTokenMismatch,
    /// A family-wide scan found no eligible slot.
    NoCapacity,
    /// A request or command aged past its staleness bound.
    Timeout,
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::PartyTokenMissing => "party token missing",
            Self::PartyTokenMismatch => "party token mismatch",
            Self::NoCapacity => "no capacity",
            Self::Timeout => "timeout",
        };
        f.write_str(reason)
    }
}

/// Top-level error returned by every registry component.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The routing store is unreachable or returned a transient failure.
    /// Callers retry; the sweeper and provision pipeline both do.
    #[error("transient store failure: {0}")]
    Store(#[from] StoreError),

    /// No eligible slot could absorb the request at this time.
    #[error("capacity exhausted on backend {server_id} family {family_id}")]
    CapacityExhausted {
        server_id: BackendId,
        family_id: FamilyId,
    },

    /// An operation observed state that invalidated its own precondition
    /// (e.g. a slot already claimed by another allocation).
    #[error("state conflict: {0}")]
    StateConflict(&'static str),

    /// A caller violated the wire protocol.
    #[error("protocol violation: {0}")]
    Protocol(ProtocolViolation),

    /// Unrecoverable; the registry stops accepting new work until
    /// restarted or manually recovered.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Failure from the Redis-backed routing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("store operation timed out")]
    Timeout,
}

pub type RegistryResult<T> = Result<T, RegistryError>;

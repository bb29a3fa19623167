//! Runtime configuration for the registry.
//!
//! Deliberately not a YAML-file loader — that bootstrap concern stays
//! external. `from_env()` covers the full extent of "configuration
//! loading" this crate owns.
use std::time::Duration;

/// Tunables for slot provisioning, routing, and shutdown orchestration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// A backend with no heartbeat for this long transitions to DEAD.
    pub heartbeat_timeout: Duration,
    /// Routing attempts before a solo request is failed with `no-capacity`.
    pub max_routing_retries: u32,
    /// A request older than this is rejected with `timeout`.
    pub request_max_age: Duration,
    /// Bound on entries kept in a player's recent-slot history.
    pub recent_slot_history: usize,
    /// TTL applied to recent-slot history entries.
    pub recent_slot_ttl: Duration,
    /// Extra time added to a shutdown intent's countdown before tickets expire.
    pub evict_buffer: Duration,
    /// Further buffer added on top of `evict_buffer` for ticket expiry.
    pub ticket_buffer: Duration,
    /// Duration of lost routing-store connectivity before the registry
    /// stops accepting new requests (spec §7, `Fatal`).
    pub store_failover_deadline: Duration,
    /// Bound on the in-process per-family solo/party request queues.
    pub family_queue_capacity: usize,
    /// Interval between sweeper ticks (expired blocks/tickets/recent-slots).
    pub sweep_interval: Duration,
    /// Redis connection string backing the routing store.
    pub redis_url: String,
    /// Connection string for the external document store.
    pub document_store_url: String,
    /// Soft player-equivalent cap applied to a newly registered backend
    /// when its advertisement carries no explicit value (the wire
    /// `SlotFamilyAdvertisement` only carries per-family slot counts).
    pub default_soft_player_cap: u32,
    /// Hard player-equivalent cap applied the same way.
    pub default_hard_player_cap: u32,
    /// Per-family player-equivalent factor used when no
    /// `EnvironmentDescriptorView` is on file for a family yet.
    pub default_player_equivalent_factor: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            max_routing_retries: 3,
            request_max_age: Duration::from_secs(60),
            recent_slot_history: 5,
            recent_slot_ttl: Duration::from_secs(300),
            evict_buffer: Duration::from_secs(10),
            ticket_buffer: Duration::from_secs(15),
            store_failover_deadline: Duration::from_secs(20),
            family_queue_capacity: 512,
            sweep_interval: Duration::from_secs(10),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            document_store_url: "postgres://localhost/fulcrum".to_string(),
            default_soft_player_cap: 500,
            default_hard_player_cap: 600,
            default_player_equivalent_factor: 1.0,
        }
    }
}

impl RegistryConfig {
    /// Reads overrides from the environment, falling back to [`Default`]
    /// for anything unset. Mirrors the `std::env::var`-with-fallback
    /// convention used across the workspace's `from_env()` constructors.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REGISTRY_REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(url) = std::env::var("REGISTRY_DOCUMENT_STORE_URL") {
            config.document_store_url = url;
        }
        if let Ok(secs) = std::env::var("REGISTRY_HEARTBEAT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.heartbeat_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(retries) = std::env::var("REGISTRY_MAX_ROUTING_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.max_routing_retries = retries;
            }
        }
        if let Ok(cap) = std::env::var("REGISTRY_DEFAULT_SOFT_PLAYER_CAP") {
            if let Ok(cap) = cap.parse() {
                config.default_soft_player_cap = cap;
            }
        }
        if let Ok(cap) = std::env::var("REGISTRY_DEFAULT_HARD_PLAYER_CAP") {
            if let Ok(cap) = cap.parse() {
                config.default_hard_player_cap = cap;
            }
        }
        config
    }

    /// Hard deadline for minted shutdown tickets, given a countdown.
    pub fn ticket_expires_after(&self, countdown: Duration) -> Duration {
        countdown + self.evict_buffer + self.ticket_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RegistryConfig::default();
        assert!(config.max_routing_retries > 0);
        assert!(config.heartbeat_timeout > Duration::ZERO);
    }

    #[test]
    fn ticket_expiry_adds_buffers() {
        let config = RegistryConfig::default();
        let expires = config.ticket_expires_after(Duration::from_secs(30));
        assert_eq!(
            expires,
            Duration::from_secs(30) + config.evict_buffer + config.ticket_buffer
        );
    }
}

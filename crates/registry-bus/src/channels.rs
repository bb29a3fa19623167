//! Dot-separated channel name constants and the per-target channel
//! builders used for directed (non-broadcast) traffic.
use registry_core::BackendId;
use registry_core::ProxyId;

pub const SLOT_FAMILY: &str = "fulcrum.registry.slot.family";
pub const SLOT_STATUS: &str = "fulcrum.registry.slot.status";
pub const PLAYER_REQUEST: &str = "fulcrum.registry.player.request";
pub const PLAYER_ROUTE_ACK: &str = "fulcrum.registry.player.route.ack";
pub const PARTY_RESERVATION_CREATED: &str = "fulcrum.party.reservation.created";
pub const PARTY_RESERVATION_CLAIMED: &str = "fulcrum.party.reservation.claimed";
pub const MATCH_ROSTER_CREATED: &str = "fulcrum.match.roster.created";
pub const MATCH_ROSTER_ENDED: &str = "fulcrum.match.roster.ended";
pub const SHUTDOWN_INTENT: &str = "fulcrum.registry.shutdown.intent";
pub const SHUTDOWN_UPDATE: &str = "fulcrum.registry.shutdown.update";

/// `fulcrum.server.slot.provision.<serverId>`
pub fn slot_provision_channel(server_id: &BackendId) -> String {
    format!("fulcrum.server.slot.provision.{server_id}")
}

/// `fulcrum.registry.player.route.<proxyId>`
pub fn player_route_channel(proxy_id: &ProxyId) -> String {
    format!("fulcrum.registry.player.route.{proxy_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_per_target_channel_names() {
        let server_id = BackendId::from("b1");
        assert_eq!(
            slot_provision_channel(&server_id),
            "fulcrum.server.slot.provision.b1"
        );
        let proxy_id = ProxyId::from("proxy-1");
        assert_eq!(
            player_route_channel(&proxy_id),
            "fulcrum.registry.player.route.proxy-1"
        );
    }
}

//! Typed payloads carried by [`crate::envelope::Envelope`], one struct per
//! message named in the external interface surface.
use registry_core::BackendId;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::ProxyId;
use registry_core::SlotId;
use registry_core::VariantId;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

/// backend → registry, channel `fulcrum.registry.slot.family`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotFamilyAdvertisement {
    pub server_id: BackendId,
    pub capacities: HashMap<FamilyId, u32>,
}

/// backend → registry, channel `fulcrum.registry.slot.status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotStatusUpdate {
    pub server_id: BackendId,
    pub slot_id: SlotId,
    pub slot_suffix: String,
    pub status: SlotStatus,
    pub max_players: u32,
    pub online_players: u32,
    pub family: FamilyId,
    #[serde(default)]
    pub variant: Option<VariantId>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Provisioning,
    Available,
    Full,
    Closed,
}

/// registry → backend, channel `fulcrum.server.slot.provision.<serverId>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotProvisionCommand {
    pub server_id: BackendId,
    pub family: FamilyId,
    #[serde(default)]
    pub variant: Option<VariantId>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub request_id: String,
}

/// proxy → registry, channel `fulcrum.registry.player.request`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerSlotRequest {
    pub player_id: PlayerId,
    pub player_name: String,
    pub family: FamilyId,
    #[serde(default)]
    pub variant: Option<VariantId>,
    #[serde(default)]
    pub preferred_slot_id: Option<SlotId>,
    #[serde(default)]
    pub rejoin: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// registry → proxy, channel `fulcrum.registry.player.route.<proxyId>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRouteCommand {
    pub player_id: PlayerId,
    pub slot_id: SlotId,
    #[serde(default)]
    pub reservation_token: Option<String>,
    #[serde(default)]
    pub pre_reserved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// proxy → registry, channel `fulcrum.registry.player.route.ack`.
///
/// `success = false` is what the component design calls a "nack"; it is
/// the same wire shape, distinguished only by this field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRouteAck {
    pub player_id: PlayerId,
    pub slot_id: SlotId,
    #[serde(default)]
    pub reservation_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// registry → proxy, channel `fulcrum.registry.player.route.<proxyId>`.
///
/// Sent instead of a [`PlayerRouteCommand`] when a request can't be
/// seated at all (no eligible slot and retries exhausted, or a stale
/// request past `requestMaxAge`); distinguished from a route command by
/// `Envelope::msg_type` rather than by an optional `slotId`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRouteFailure {
    pub player_id: PlayerId,
    pub reason: String,
}

/// party manager → registry, channel `fulcrum.party.reservation.created`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyReservationCreated {
    pub reservation_id: String,
    pub family_id: FamilyId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub party_size: u32,
    pub tokens: HashMap<PlayerId, String>,
    #[serde(default)]
    pub target_server_id: Option<BackendId>,
}

/// party manager → registry, channel `fulcrum.party.reservation.claimed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyReservationClaimed {
    pub reservation_id: String,
    pub player_id: PlayerId,
    pub success: bool,
}

/// backend → registry, channel `fulcrum.match.roster.created`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRosterCreated {
    pub slot_id: SlotId,
    pub match_id: String,
    pub players: Vec<PlayerId>,
}

/// backend → registry, channel `fulcrum.match.roster.ended`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRosterEnded {
    pub slot_id: SlotId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownTargetType {
    Proxy,
    Backend,
}

/// registry → services, channel `fulcrum.registry.shutdown.intent`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownIntentMessage {
    pub intent_id: String,
    pub targets: Vec<ShutdownTarget>,
    pub countdown_seconds: u64,
    pub reason: String,
    #[serde(default)]
    pub fallback_family: Option<FamilyId>,
    pub force: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownTarget {
    pub service_id: String,
    pub target_type: ShutdownTargetType,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    Evacuate,
    Shutdown,
}

/// services → registry, channel `fulcrum.registry.shutdown.update`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownIntentUpdate {
    pub intent_id: String,
    pub service_id: String,
    pub phase: ShutdownPhase,
    #[serde(default)]
    pub player_ids: Vec<PlayerId>,
    pub timestamp: u64,
}

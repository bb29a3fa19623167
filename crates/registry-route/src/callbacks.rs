//! Implements [`registry_party::RoutingCallbacks`] against a shared
//! [`RouteCore`], so the party coordinator can reach back into the
//! routing pipeline without depending on it directly (spec §9).
use crate::core::RouteCore;
use async_trait::async_trait;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::PlayerRequestContext;
use registry_core::SlotId;
use registry_party::RoutingCallbacks;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub struct RouteCallbacks(pub Arc<RouteCore>);

#[async_trait]
impl RoutingCallbacks for RouteCallbacks {
    /// The party coordinator already reserved this player's share of
    /// occupancy when the allocation was made, so unlike a solo
    /// dispatch this never touches `store.increment_occupancy` — only
    /// the wire command and the active-player bookkeeping.
    async fn dispatch_with_reservation(
        &self,
        context: &PlayerRequestContext,
        slot_id: &SlotId,
        reservation_id: &str,
    ) {
        let now_millis = now_millis();
        if let Err(err) = self
            .0
            .tracker
            .record_active_players(slot_id, std::slice::from_ref(&context.player_id), now_millis)
            .await
        {
            log::warn!(
                "[route] failed to record active player {} on {slot_id}: {err}",
                context.player_id
            );
        }
        self.0.send_route_command(
            &context.player_id,
            slot_id,
            Some(reservation_id.to_string()),
            true,
            None,
        );
    }

    async fn send_disconnect(&self, player_id: &PlayerId, reason: &str) {
        self.0.send_route_failure(player_id, reason);
    }

    async fn trigger_provision(&self, family_id: &FamilyId, metadata: HashMap<String, String>) {
        if let Err(err) = self.0.provision.request_provision(family_id, metadata).await {
            log::warn!("[route] provision trigger for {family_id} failed: {err}");
        }
    }

    async fn retry_request(&self, context: PlayerRequestContext) {
        let now_millis = now_millis();
        if let Err(err) = self.0.route_request(context, now_millis).await {
            log::warn!("[route] retry_request failed: {err}");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time moves forward")
        .as_millis() as u64
}

//! The seam that keeps the party coordinator from depending on the
//! player routing service. Registry-route implements this trait and
//! injects it at construction; registry-party only ever calls through
//! it, so the dependency edge points one way.
use async_trait::async_trait;
use registry_core::FamilyId;
use registry_core::PlayerId;
use registry_core::PlayerRequestContext;
use registry_core::SlotId;
use std::collections::HashMap;

#[async_trait]
pub trait RoutingCallbacks: Send + Sync {
    /// Dispatch `context`'s player straight to `slot_id`, carrying the
    /// reservation id so the player-facing route response can echo it.
    async fn dispatch_with_reservation(
        &self,
        context: &PlayerRequestContext,
        slot_id: &SlotId,
        reservation_id: &str,
    );

    /// Tell a player's proxy to drop them, e.g. on a token mismatch.
    async fn send_disconnect(&self, player_id: &PlayerId, reason: &str);

    /// Ask the provision service to consider growing capacity for
    /// `family_id`. Metadata-only; no guarantee of a new slot.
    async fn trigger_provision(&self, family_id: &FamilyId, metadata: HashMap<String, String>);

    /// Feed a drained or released per-player context back into the
    /// full routing pipeline (party delegation, then solo fallback).
    async fn retry_request(&self, context: PlayerRequestContext);
}

//! The orchestration pipeline itself (spec 4.G): per-request candidate
//! selection, dispatch, and ack/nack handling, plus the family-queue
//! wake-up that runs when a new slot reports AVAILABLE.
//!
//! Grounded on `rbp-gameroom::room::run`'s loop-until-done request
//! handling shape and `rbp-gameroom::actor::run`'s recv-dispatch loop,
//! generalized from a single table's seat assignment to a fleet-wide
//! slot search with party delegation and shutdown-ticket overrides.
use crate::core::RouteCore;
use registry_bus::channels;
use registry_bus::messages::PlayerRouteAck;
use registry_bus::messages::PlayerRouteCommand;
use registry_bus::messages::PlayerRouteFailure;
use registry_bus::messages::PlayerSlotRequest;
use registry_bus::messages::SlotStatus as WireSlotStatus;
use registry_bus::messages::SlotStatusUpdate;
use registry_bus::Envelope;
use registry_core::PlayerId;
use registry_core::PlayerRequestContext;
use registry_core::ProxyId;
use registry_core::SlotId;
use registry_store::SlotRecord;
use registry_store::SlotStatus;
use registry_store::StoreResult;

impl RouteCore {
    /// Entry point for a proxy-originated player request (spec 4.G,
    /// pipeline step 1).
    pub async fn handle_player_request(
        &self,
        request: PlayerSlotRequest,
        proxy_id: ProxyId,
        now_millis: u64,
    ) -> StoreResult<()> {
        self.player_proxy.insert(request.player_id.clone(), proxy_id);
        let recent = self
            .tracker
            .resolve_recent_blocked_slots(&request.player_id, now_millis)
            .await?;

        let mut context = PlayerRequestContext::new(
            request.player_id,
            request.player_name,
            request.family,
            request.variant,
            request.preferred_slot_id,
            request.rejoin,
            request.metadata,
            now_millis,
        );
        context.recent_slot_ids = recent;
        self.route_request(context, now_millis).await
    }

    /// Steps 2-6 of the pipeline: party delegation, the shutdown-ticket
    /// override, candidate selection, and dispatch or enqueue. Re-entered
    /// by nacks, by drained party/solo queue entries, and by the
    /// callbacks [`crate::callbacks::RouteCallbacks::retry_request`] hands
    /// back after a party reservation releases.
    pub(crate) async fn route_request(
        &self,
        mut context: PlayerRequestContext,
        now_millis: u64,
    ) -> StoreResult<()> {
        if context.age_millis(now_millis) > self.config.request_max_age.as_millis() as u64 {
            self.send_route_failure(&context.player_id, "timeout");
            return Ok(());
        }

        if let Some(reservation_id) = context.metadata.get("partyReservationId").cloned() {
            let handled = self
                .party()
                .handle_party_player_request(context.clone(), &reservation_id, now_millis)
                .await?;
            if handled {
                return Ok(());
            }
        }

        if let Some(ticket) = self.shutdown.consume_ticket_for_player(&context.player_id, now_millis) {
            if let Some(fallback) = ticket.fallback_family {
                log::debug!(
                    "[route] {} carries a shutdown ticket, rerouting family {} -> {}",
                    context.player_id,
                    context.family_id,
                    fallback
                );
                context.family_id = fallback;
            }
            if ticket.force {
                context.blocked_slot_ids.clear();
                context.recent_slot_ids.clear();
            }
        }

        match self.select_candidate(&context).await? {
            Some(slot) => self.dispatch_solo(context, slot, now_millis).await,
            None => self.handle_no_candidate(context, now_millis).await,
        }
    }

    /// Candidate selection for solo requests (pipeline step 4): all
    /// `RUNNING`/`AVAILABLE` slots matching family/variant, not hard-blocked
    /// (`blocked_slot_ids`, populated by nacks this request cycle), with
    /// room for one more player. `preferredSlotId` wins outright if still
    /// eligible — even if it's in the player's *recent*-slot set, per
    /// `DESIGN.md` Open Question 1 — otherwise the fullest-fitting
    /// non-recent slot wins, ties broken by slot id; recent slots
    /// (spec §8's soft avoidance) are only used as a last resort, when no
    /// non-recent candidate is eligible.
    pub(crate) async fn select_candidate(
        &self,
        context: &PlayerRequestContext,
    ) -> StoreResult<Option<SlotRecord>> {
        let mut eligible = Vec::new();
        for slot in self.store.slots_for_family(&context.family_id).await? {
            if context.blocked_slot_ids.contains(&slot.slot_id) {
                continue;
            }
            if !self.is_routable_server(&slot.server_id) {
                continue;
            }
            if !slot_matches(&slot, context) {
                continue;
            }
            let occupancy = self.store.get_occupancy(&slot.slot_id).await?;
            if slot.remaining_capacity(occupancy) < 1 {
                continue;
            }
            let fill_ratio = fill_ratio(&slot, occupancy);
            eligible.push((slot, fill_ratio));
        }

        if let Some(preferred_id) = &context.preferred_slot_id {
            if let Some(pos) = eligible.iter().position(|(slot, _)| &slot.slot_id == preferred_id) {
                return Ok(Some(eligible.swap_remove(pos).0));
            }
        }

        let (mut fresh, recent): (Vec<_>, Vec<_>) = eligible
            .into_iter()
            .partition(|(slot, _)| !context.recent_slot_ids.contains(&slot.slot_id));
        if fresh.is_empty() {
            fresh = recent;
        }

        fresh.sort_by(|(slot_a, fill_a), (slot_b, fill_b)| {
            fill_b
                .partial_cmp(fill_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| slot_a.slot_id.as_str().cmp(slot_b.slot_id.as_str()))
        });
        Ok(fresh.into_iter().next().map(|(slot, _)| slot))
    }

    fn is_routable_server(&self, server_id: &registry_core::BackendId) -> bool {
        self.fleet
            .backend(server_id)
            .map(|backend| backend.status().is_routable())
            .unwrap_or(false)
    }

    async fn dispatch_solo(
        &self,
        context: PlayerRequestContext,
        slot: SlotRecord,
        now_millis: u64,
    ) -> StoreResult<()> {
        self.store.increment_occupancy(&slot.slot_id).await?;
        self.tracker
            .record_active_players(&slot.slot_id, std::slice::from_ref(&context.player_id), now_millis)
            .await?;
        self.send_route_command(&context.player_id, &slot.slot_id, None, false, None);
        self.pending_acks
            .insert(context.player_id.clone(), (slot.slot_id.clone(), context));
        Ok(())
    }

    /// Pipeline step 6: retry if budget remains, otherwise fail the
    /// request outright with `no-capacity`.
    async fn handle_no_candidate(&self, mut context: PlayerRequestContext, now_millis: u64) -> StoreResult<()> {
        if context.retries < self.config.max_routing_retries {
            context.bump_retry(now_millis);
            let metadata = context.metadata.clone();
            let family_id = context.family_id.clone();
            log::debug!(
                "[route] no capacity for {} on {family_id}, enqueuing (retry {})",
                context.player_id,
                context.retries
            );
            self.enqueue_solo(context);
            self.provision.request_provision(&family_id, metadata).await?;
        } else {
            log::info!("[route] {} exhausted retries on {}, failing", context.player_id, context.family_id);
            self.send_route_failure(&context.player_id, "no-capacity");
        }
        Ok(())
    }

    /// Pipeline steps 7-8: a proxy acknowledged (or nacked) a dispatched
    /// route. Occupancy is decremented unconditionally for solo
    /// dispatches — ack or nack, the slot is no longer holding a solo
    /// reservation for this player. Party dispatches never incremented
    /// per-player occupancy in the first place (`callbacks.rs`'s
    /// `dispatch_with_reservation` skips it, since `allocate` reserved
    /// the whole party at once); their release is symmetric, via
    /// `remove_party_allocation`'s `-party_size` in
    /// `handle_route_ack`/`release`, so acks carrying a `reservation_id`
    /// must not also decrement here.
    pub async fn handle_route_ack(&self, ack: PlayerRouteAck, now_millis: u64) -> StoreResult<()> {
        if ack.reservation_id.is_none() {
            self.store.decrement_occupancy(&ack.slot_id).await?;
        }

        if let Some(reservation_id) = &ack.reservation_id {
            if ack.success {
                self.party().handle_route_ack(reservation_id, ack.player_id.clone(), now_millis).await?;
            } else {
                log::warn!(
                    "[route] party member {} nacked route on reservation {}: {:?}",
                    ack.player_id,
                    reservation_id,
                    ack.reason
                );
            }
            return Ok(());
        }

        if ack.success {
            self.pending_acks.remove(&ack.player_id);
            return Ok(());
        }
        self.handle_route_nack(ack, now_millis).await
    }

    async fn handle_route_nack(&self, ack: PlayerRouteAck, now_millis: u64) -> StoreResult<()> {
        let Some((_, (_, mut context))) = self.pending_acks.remove(&ack.player_id) else {
            log::warn!("[route] nack for {} with no pending dispatch, dropping", ack.player_id);
            return Ok(());
        };
        context.block_slot(ack.slot_id.clone());
        context.bump_retry(now_millis);
        log::debug!(
            "[route] {} nacked on {} ({:?}), retrying (attempt {})",
            context.player_id,
            ack.slot_id,
            ack.reason,
            context.retries
        );
        self.route_request(context, now_millis).await
    }

    /// A backend advertised a new status for one of its slots (spec
    /// §6's `slot.status` channel). Mirrors the update into the routing
    /// store and, for a transition into `AVAILABLE`, wakes up the
    /// family's waiting party and solo queues (pipeline step 9).
    pub async fn handle_slot_status_update(&self, update: SlotStatusUpdate, now_millis: u64) -> StoreResult<()> {
        self.slot_backend.insert(update.slot_id.clone(), update.server_id.clone());

        if update.status == WireSlotStatus::Closed {
            self.store.remove_slot(&update.slot_id, &update.family).await?;
            self.tracker.clear_active_players_for_slot(&update.slot_id, now_millis).await?;
            self.slot_backend.remove(&update.slot_id);
            if let Some(backend) = self.fleet.backend(&update.server_id) {
                backend.forget_slot(&update.slot_id);
            }
            return Ok(());
        }

        if let Some(backend) = self.fleet.backend(&update.server_id) {
            backend.record_slot(update.slot_id.clone());
        }

        let record = SlotRecord {
            slot_id: update.slot_id.clone(),
            server_id: update.server_id,
            slot_suffix: update.slot_suffix,
            family: update.family.clone(),
            variant: update.variant,
            status: wire_to_store_status(update.status),
            max_players: update.max_players,
            online_players: update.online_players,
            last_updated: now_millis,
            metadata: update.metadata,
        };
        self.store.store_slot(&record).await?;

        if record.status == SlotStatus::Available {
            self.on_slot_available(record, now_millis).await?;
        }
        Ok(())
    }

    /// Wakes the family's waiting requests: party reservations first,
    /// then solo requests in FIFO order (spec's party-before-solo
    /// ordering guarantee).
    async fn on_slot_available(&self, slot: SlotRecord, now_millis: u64) -> StoreResult<()> {
        self.party().process_pending_reservations(&slot.family, &slot, now_millis).await?;
        for context in self.drain_solo_queue(&slot.family) {
            self.route_request(context, now_millis).await?;
        }
        Ok(())
    }

    pub(crate) fn send_route_command(
        &self,
        player_id: &PlayerId,
        slot_id: &SlotId,
        reservation_token: Option<String>,
        pre_reserved: bool,
        reason: Option<String>,
    ) {
        let Some(proxy_id) = self.player_proxy.get(player_id).map(|entry| entry.clone()) else {
            log::warn!("[route] no known proxy for {player_id}, dropping route command");
            return;
        };
        let command = PlayerRouteCommand {
            player_id: player_id.clone(),
            slot_id: slot_id.clone(),
            reservation_token,
            pre_reserved,
            reason,
        };
        let envelope = Envelope::new("registry.player.route", "registry", command).targeted(proxy_id.to_string());
        self.bus.publish(&channels::player_route_channel(&proxy_id), envelope.to_json());
    }

    pub(crate) fn send_route_failure(&self, player_id: &PlayerId, reason: &str) {
        let Some(proxy_id) = self.player_proxy.get(player_id).map(|entry| entry.clone()) else {
            log::warn!("[route] no known proxy for {player_id}, dropping route failure");
            return;
        };
        let failure = PlayerRouteFailure {
            player_id: player_id.clone(),
            reason: reason.to_string(),
        };
        let envelope =
            Envelope::new("registry.player.route.failure", "registry", failure).targeted(proxy_id.to_string());
        self.bus.publish(&channels::player_route_channel(&proxy_id), envelope.to_json());
    }
}

fn slot_matches(slot: &SlotRecord, context: &PlayerRequestContext) -> bool {
    if slot.status != SlotStatus::Available {
        return false;
    }
    if !slot.family.as_str().eq_ignore_ascii_case(context.family_id.as_str()) {
        return false;
    }
    if let Some(variant) = &context.variant_id {
        let matches = slot
            .metadata
            .get("variant")
            .map(|value| value.eq_ignore_ascii_case(variant.as_str()))
            .unwrap_or(false);
        if !matches {
            return false;
        }
    }
    true
}

fn fill_ratio(slot: &SlotRecord, occupancy: u32) -> f64 {
    if slot.max_players == 0 {
        0.0
    } else {
        (slot.online_players + occupancy) as f64 / slot.max_players as f64
    }
}

fn wire_to_store_status(status: WireSlotStatus) -> SlotStatus {
    match status {
        WireSlotStatus::Provisioning => SlotStatus::Provisioning,
        WireSlotStatus::Available => SlotStatus::Available,
        WireSlotStatus::Full => SlotStatus::Full,
        WireSlotStatus::Closed => SlotStatus::Closed,
    }
}

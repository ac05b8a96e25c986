//! Inventory ledger: the authoritative ticket and prize counters.
//!
//! RULE: every mutation of product.remaining, tier.remaining or the issued
//! ticket set goes through reserve / commit / rollback. Nothing else writes
//! inventory state.
//!
//! Concurrency: each call runs in one SQLite IMMEDIATE transaction (one
//! writer per database at a time), and commit decrements counters only if
//! they still hold the values observed in the caller's snapshot. A lost
//! race surfaces as `TierExhaustedRace` / `ConcurrentUpdate`; the held
//! reservation survives so the caller can re-select and retry.

use crate::{
    clock,
    catalog::PrizeTier,
    error::{DrawError, DrawResult},
    selector::{DrawSnapshot, TierWeight},
    store::DrawStore,
    types::{ProductId, ReservationId, TicketNumber, TierId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Provisional hold on a set of ticket slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationToken {
    pub reservation_id: ReservationId,
    pub product_id:     ProductId,
    /// Ascending.
    pub ticket_numbers: Vec<TicketNumber>,
}

/// Point-in-time counters for one product. Selection runs against this,
/// and commit uses it as the set of expected values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub product_id:        ProductId,
    pub total_tickets:     u64,
    pub remaining:         u64,
    pub issued:            u64,
    pub profit_rate_milli: u64,
    /// Level ascending.
    pub tiers:             Vec<PrizeTier>,
}

impl InventorySnapshot {
    pub fn last_one_tier(&self) -> Option<&PrizeTier> {
        self.tiers.iter().find(|t| t.last_one)
    }

    /// Replayable selection input for the ticket at `position`.
    pub fn draw_snapshot(&self, position: u64) -> DrawSnapshot {
        DrawSnapshot {
            profit_rate_milli: self.profit_rate_milli,
            total_tickets:     self.total_tickets,
            position,
            last_one_tier:     self
                .last_one_tier()
                .filter(|t| t.remaining > 0)
                .map(|t| t.tier_id.clone()),
            tiers: self
                .tiers
                .iter()
                .filter(|t| !t.last_one && t.remaining > 0)
                .map(|t| TierWeight {
                    tier_id: t.tier_id.clone(),
                    level:   t.level,
                    weight:  t.weight,
                })
                .collect(),
        }
    }

    /// Account for one ticket drawn against `tier_id` inside a batch.
    pub fn take(&mut self, tier_id: &str) -> DrawResult<()> {
        let tier = self
            .tiers
            .iter_mut()
            .find(|t| t.tier_id == tier_id && t.remaining > 0)
            .ok_or(DrawError::InventoryExhausted)?;
        tier.remaining -= 1;
        self.remaining = self.remaining.saturating_sub(1);
        self.issued += 1;
        Ok(())
    }
}

/// One ticket's outcome, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketAllocation {
    pub ticket_number: TicketNumber,
    pub tier_id:       TierId,
    pub last_one:      bool,
    pub random_value:  u64,
    pub ticket_hash:   String,
    pub snapshot:      DrawSnapshot,
}

/// Immutable issued ticket, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub product_id:     ProductId,
    pub ticket_number:  TicketNumber,
    pub draw_position:  u64,
    pub tier_id:        TierId,
    pub last_one:       bool,
    pub random_value:   u64,
    pub ticket_hash:    String,
    pub seed_hash:      String,
    pub draw_snapshot:  DrawSnapshot,
    pub reservation_id: ReservationId,
    pub allocated_at:   String,
}

pub struct InventoryLedger<'a> {
    store: &'a DrawStore,
}

impl<'a> InventoryLedger<'a> {
    pub fn new(store: &'a DrawStore) -> Self {
        Self { store }
    }

    /// Atomically check range, uniqueness and stock, then hold the slots.
    pub fn reserve(
        &self,
        product_id: &str,
        ticket_numbers: &BTreeSet<TicketNumber>,
    ) -> DrawResult<ReservationToken> {
        let numbers: Vec<TicketNumber> = ticket_numbers.iter().copied().collect();
        if numbers.is_empty() {
            return Err(anyhow::anyhow!("reserve called with no ticket numbers").into());
        }
        let reservation_id = uuid::Uuid::new_v4().to_string();
        let now = clock::now();
        self.store
            .reserve_slots(product_id, &reservation_id, &numbers, &now)?;
        log::debug!(
            "product={product_id} reservation {reservation_id} holds {} tickets",
            numbers.len()
        );
        Ok(ReservationToken {
            reservation_id,
            product_id: product_id.to_string(),
            ticket_numbers: numbers,
        })
    }

    pub fn snapshot(&self, product_id: &str) -> DrawResult<InventorySnapshot> {
        self.store.inventory_snapshot(product_id)
    }

    /// Write the tickets and apply the conditional decrements observed in
    /// `observed`. All or nothing.
    pub fn commit(
        &self,
        token: &ReservationToken,
        observed: &InventorySnapshot,
        allocations: &[TicketAllocation],
    ) -> DrawResult<Vec<TicketRecord>> {
        let allocated: Vec<TicketNumber> =
            allocations.iter().map(|a| a.ticket_number).collect();
        if allocated != token.ticket_numbers {
            return Err(anyhow::anyhow!(
                "allocations {allocated:?} do not match reservation {}",
                token.reservation_id
            )
            .into());
        }
        if observed.product_id != token.product_id {
            return Err(anyhow::anyhow!(
                "snapshot of '{}' used for reservation on '{}'",
                observed.product_id,
                token.product_id
            )
            .into());
        }
        let now = clock::now();
        self.store.commit_allocations(token, observed, allocations, &now)
    }

    /// Release held slots. Safe to call on an already-released token.
    pub fn rollback(&self, token: &ReservationToken) -> DrawResult<()> {
        let released = self.store.release_reservation(&token.reservation_id)?;
        if released {
            log::debug!(
                "product={} reservation {} released",
                token.product_id,
                token.reservation_id
            );
        }
        Ok(())
    }

    /// Release reservations older than `max_age` (abandoned checkouts).
    pub fn purge_stale_reservations(&self, max_age: chrono::Duration) -> DrawResult<usize> {
        let cutoff = clock::cutoff(max_age);
        let purged = self.store.purge_reservations_before(&cutoff)?;
        if purged > 0 {
            log::warn!("released {purged} stale reservations older than {cutoff}");
        }
        Ok(purged)
    }

    pub fn tickets(&self, product_id: &str) -> DrawResult<Vec<TicketRecord>> {
        self.store.tickets(product_id)
    }

    pub fn ticket(
        &self,
        product_id: &str,
        ticket_number: TicketNumber,
    ) -> DrawResult<Option<TicketRecord>> {
        self.store.ticket(product_id, ticket_number)
    }

    /// Ticket numbers neither issued nor held, ascending.
    pub fn available_numbers(&self, product_id: &str) -> DrawResult<Vec<TicketNumber>> {
        self.store.available_numbers(product_id)
    }
}

//! Batch allocation orchestrator.
//!
//! One purchase = one batch. Sequence:
//!   1. reserve every requested ticket (one atomic stock check)
//!   2. snapshot the inventory
//!   3. for each ticket, ascending: derive → resolve tier → deplete the
//!      working snapshot, so later tickets see earlier picks
//!   4. commit against the snapshot's observed counters
//!   5. on a lost race go back to 2; on any other failure roll back
//!
//! Either every ticket of the batch is written or none is.

use crate::{
    commitment::CommitmentStore,
    config::EngineConfig,
    derivation::derive_ticket,
    error::{DrawError, DrawResult},
    ledger::{InventoryLedger, InventorySnapshot, ReservationToken, TicketAllocation, TicketRecord},
    rng::PickRng,
    store::DrawStore,
    types::{ProductId, ReservationId, TicketNumber, TierId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-ticket engine output handed back to the checkout surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub product_id:    ProductId,
    pub ticket_number: TicketNumber,
    pub tier_id:       TierId,
    pub last_one:      bool,
    pub random_value:  u64,
    pub ticket_hash:   String,
    /// The published commitment, never the seed.
    pub seed_hash:     String,
}

impl From<&TicketRecord> for AllocationResult {
    fn from(r: &TicketRecord) -> Self {
        Self {
            product_id:    r.product_id.clone(),
            ticket_number: r.ticket_number,
            tier_id:       r.tier_id.clone(),
            last_one:      r.last_one,
            random_value:  r.random_value,
            ticket_hash:   r.ticket_hash.clone(),
            seed_hash:     r.seed_hash.clone(),
        }
    }
}

/// A committed batch.
#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub reservation_id: ReservationId,
    /// Commit attempts used, 1 when no race was lost.
    pub attempts:       u32,
    pub records:        Vec<TicketRecord>,
}

/// Resolve every ticket of a batch against `snapshot`, ascending, with
/// in-batch depletion. Pure: no store access.
pub fn plan_batch(
    snapshot: &InventorySnapshot,
    ticket_numbers: &[TicketNumber],
    seed: &[u8],
) -> DrawResult<Vec<TicketAllocation>> {
    let mut ordered = ticket_numbers.to_vec();
    ordered.sort_unstable();

    let mut working = snapshot.clone();
    let mut plan = Vec::with_capacity(ordered.len());
    for n in ordered {
        let draw = working.draw_snapshot(working.issued);
        let derived = derive_ticket(seed, n);
        let (tier_id, last_one) = match draw.resolve(derived.random_value) {
            Ok(outcome) => outcome,
            Err(DrawError::InventoryExhausted) => {
                log::error!(
                    "product={} ticket={n} position={}: no regular tier left to draw from",
                    snapshot.product_id,
                    draw.position
                );
                return Err(DrawError::InventoryExhausted);
            }
            Err(e) => return Err(e),
        };
        working.take(&tier_id)?;
        log::debug!(
            "product={} ticket={n} value={} -> {tier_id}{}",
            snapshot.product_id,
            derived.random_value,
            if last_one { " (last one)" } else { "" }
        );
        plan.push(TicketAllocation {
            ticket_number: n,
            tier_id,
            last_one,
            random_value: derived.random_value,
            ticket_hash: derived.ticket_hash,
            snapshot: draw,
        });
    }
    Ok(plan)
}

pub struct BatchAllocator<'a> {
    store:  &'a DrawStore,
    config: &'a EngineConfig,
}

impl<'a> BatchAllocator<'a> {
    pub fn new(store: &'a DrawStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    fn ledger(&self) -> InventoryLedger<'a> {
        InventoryLedger::new(self.store)
    }

    /// Allocate exactly the requested ticket numbers, all or nothing.
    pub fn allocate_batch(
        &self,
        product_id: &str,
        ticket_numbers: &[TicketNumber],
    ) -> DrawResult<BatchReceipt> {
        let mut numbers = BTreeSet::new();
        for &n in ticket_numbers {
            if !numbers.insert(n) {
                return Err(DrawError::DuplicateTicket {
                    product_id:    product_id.to_string(),
                    ticket_number: n,
                });
            }
        }

        let token = self.reserve_with_retry(product_id, &numbers)?;
        match self.draw_and_commit(&token) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                if let Err(rb) = self.ledger().rollback(&token) {
                    log::error!(
                        "product={product_id} reservation {} rollback failed: {rb}",
                        token.reservation_id
                    );
                }
                Err(e)
            }
        }
    }

    /// Pick `count` free numbers with `rng`, then allocate them. Numbers
    /// taken by a concurrent checkout in between are re-picked.
    pub fn allocate_random(
        &self,
        product_id: &str,
        count: usize,
        rng: &mut PickRng,
    ) -> DrawResult<BatchReceipt> {
        let attempts = self.config.max_reserve_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let available = self.ledger().available_numbers(product_id)?;
            if available.len() < count {
                return Err(DrawError::StockExceeded {
                    product_id: product_id.to_string(),
                    requested:  count as u64,
                    available:  available.len() as u64,
                });
            }
            let picks = rng.choose(&available, count);
            match self.allocate_batch(product_id, &picks) {
                Err(DrawError::DuplicateTicket { ticket_number, .. }) if attempt < attempts => {
                    log::warn!(
                        "product={product_id} ticket {ticket_number} taken concurrently, re-picking \
                         (attempt {attempt}/{attempts})"
                    );
                }
                other => return other,
            }
        }
    }

    fn reserve_with_retry(
        &self,
        product_id: &str,
        numbers: &BTreeSet<TicketNumber>,
    ) -> DrawResult<ReservationToken> {
        let attempts = self.config.max_reserve_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.ledger().reserve(product_id, numbers) {
                Err(e) if e.is_busy() && attempt < attempts => {
                    log::warn!(
                        "product={product_id} reserve hit a busy database (attempt {attempt}/{attempts})"
                    );
                }
                other => return other,
            }
        }
    }

    fn draw_and_commit(&self, token: &ReservationToken) -> DrawResult<BatchReceipt> {
        let ledger = self.ledger();
        self.commit_with_retry(token, || ledger.snapshot(&token.product_id))
    }

    /// Select and commit, re-reading counters from `snapshot` after every
    /// lost race, up to `max_selection_attempts`.
    fn commit_with_retry<F>(&self, token: &ReservationToken, mut snapshot: F) -> DrawResult<BatchReceipt>
    where
        F: FnMut() -> DrawResult<InventorySnapshot>,
    {
        let product_id = token.product_id.as_str();
        let seed = CommitmentStore::new(self.store).draw_seed(product_id)?;
        let ledger = self.ledger();
        let attempts = self.config.max_selection_attempts.max(1);

        let mut last_race = None;
        for attempt in 1..=attempts {
            let observed = snapshot()?;
            let plan = plan_batch(&observed, &token.ticket_numbers, &seed)?;
            match ledger.commit(token, &observed, &plan) {
                Ok(records) => {
                    return Ok(BatchReceipt {
                        reservation_id: token.reservation_id.clone(),
                        attempts: attempt,
                        records,
                    });
                }
                Err(e) if e.is_transient() => {
                    log::warn!(
                        "product={product_id} reservation {} lost a race: {e} \
                         (attempt {attempt}/{attempts})",
                        token.reservation_id
                    );
                    last_race = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let latest = ledger.snapshot(product_id)?;
        Err(exhausted_or_race(
            &latest,
            token.ticket_numbers.len() as u64,
            last_race,
        ))
    }
}

/// Out of selection attempts: report `StockExceeded` when the latest
/// counters cannot cover the batch, otherwise the last lost race.
pub fn exhausted_or_race(
    latest: &InventorySnapshot,
    requested: u64,
    last_race: Option<DrawError>,
) -> DrawError {
    let prizes_left = latest
        .tiers
        .iter()
        .fold(0u64, |acc, t| acc.saturating_add(t.remaining));
    let available = latest.remaining.min(prizes_left);
    if available < requested {
        return DrawError::StockExceeded {
            product_id: latest.product_id.clone(),
            requested,
            available,
        };
    }
    last_race.unwrap_or_else(|| DrawError::ConcurrentUpdate {
        product_id: latest.product_id.clone(),
    })
}

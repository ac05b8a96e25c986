//! Public verification surface.
//!
//! Everything here needs only what is public after reveal: the seed, the
//! published seed hash and the ticket records. No ledger internals.

use crate::{
    catalog::{PrizeTier, Product},
    commitment::{hash_seed, verify_commitment, CommitmentStore},
    derivation::{derive_ticket, parse_seed},
    error::DrawResult,
    ledger::{InventorySnapshot, TicketRecord},
    store::DrawStore,
    types::{ProductId, TicketNumber, TierId},
};
use serde::{Deserialize, Serialize};

/// Outcome of re-deriving one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub ticket_number:        TicketNumber,
    pub recorded_tier:        TierId,
    pub recomputed_tier:      TierId,
    pub commitment_matches:   bool,
    pub random_value_matches: bool,
    pub hash_matches:         bool,
    pub tier_matches:         bool,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.commitment_matches && self.random_value_matches && self.hash_matches && self.tier_matches
    }
}

/// Recompute a ticket from the revealed seed and its recorded snapshot.
pub fn verify_ticket(seed_hex: &str, record: &TicketRecord) -> DrawResult<Verification> {
    let seed = parse_seed(seed_hex)?;
    let derived = derive_ticket(&seed, record.ticket_number);
    let (tier_id, last_one) = record.draw_snapshot.resolve(derived.random_value)?;
    Ok(Verification {
        ticket_number:        record.ticket_number,
        recorded_tier:        record.tier_id.clone(),
        commitment_matches:   hash_seed(&seed) == record.seed_hash,
        random_value_matches: derived.random_value == record.random_value,
        hash_matches:         derived.ticket_hash == record.ticket_hash,
        tier_matches:         tier_id == record.tier_id && last_one == record.last_one,
        recomputed_tier:      tier_id,
    })
}

/// Full post-reveal audit of one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub product_id:          ProductId,
    pub seed_hash:           String,
    pub commitment_valid:    bool,
    pub total_tickets:       u64,
    pub issued:              u64,
    pub remaining:           u64,
    pub tickets_checked:     u64,
    /// Tickets whose value, hash or tier did not re-derive.
    pub mismatched:          Vec<TicketNumber>,
    /// Tickets whose recorded snapshot differs from an independent replay
    /// of the draw sequence.
    pub snapshot_mismatches: Vec<TicketNumber>,
    pub oversold_tiers:      Vec<TierId>,
    pub counters_consistent: bool,
    pub last_one_awards:     u64,
    pub last_one_consistent: bool,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.commitment_valid
            && self.mismatched.is_empty()
            && self.snapshot_mismatches.is_empty()
            && self.oversold_tiers.is_empty()
            && self.counters_consistent
            && self.last_one_consistent
    }
}

/// Audit a revealed product. Fails with `PrematureReveal` before reveal.
pub fn audit(store: &DrawStore, product_id: &str) -> DrawResult<AuditReport> {
    let commitments = CommitmentStore::new(store);
    let seed_hex = commitments.revealed_seed(product_id)?;
    let commitment = commitments.commitment(product_id)?;
    let product = store.product(product_id)?;
    let tiers = store.tiers(product_id)?;
    let tickets = store.tickets(product_id)?;
    let issued_by_tier = store.issued_by_tier(product_id)?;

    let mut mismatched = Vec::new();
    for record in &tickets {
        let ok = match verify_ticket(&seed_hex, record) {
            Ok(v) => v.is_valid(),
            Err(e) => {
                log::warn!("product={product_id} ticket {} failed to verify: {e}", record.ticket_number);
                false
            }
        };
        if !ok {
            mismatched.push(record.ticket_number);
        }
    }

    let snapshot_mismatches = replay_snapshots(&product, &tiers, &tickets);

    let issued = tickets.len() as u64;
    let mut oversold_tiers = Vec::new();
    let mut counters_consistent = product.remaining + issued == product.total_tickets;
    for tier in &tiers {
        let drawn = issued_by_tier
            .iter()
            .find(|(id, _)| *id == tier.tier_id)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        if drawn > tier.total {
            oversold_tiers.push(tier.tier_id.clone());
        }
        if tier.remaining + drawn != tier.total {
            counters_consistent = false;
        }
    }

    let last_one_awards = tickets.iter().filter(|t| t.last_one).count() as u64;
    let has_last_one = tiers.iter().any(|t| t.last_one);
    let last_one_consistent = if has_last_one && product.remaining == 0 {
        last_one_awards == 1
            && tickets
                .iter()
                .any(|t| t.last_one && t.draw_position + 1 == product.total_tickets)
    } else {
        last_one_awards == 0
    };

    let report = AuditReport {
        product_id: product_id.to_string(),
        commitment_valid: verify_commitment(&seed_hex, &commitment.seed_hash),
        seed_hash: commitment.seed_hash,
        total_tickets: product.total_tickets,
        issued,
        remaining: product.remaining,
        tickets_checked: issued,
        mismatched,
        snapshot_mismatches,
        oversold_tiers,
        counters_consistent,
        last_one_awards,
        last_one_consistent,
    };
    if report.is_clean() {
        log::info!("product={product_id} audit clean: {issued} tickets verified");
    } else {
        log::warn!("product={product_id} audit found problems: {report:?}");
    }
    Ok(report)
}

/// Rebuild every ticket's selection input from the catalog totals and the
/// recorded outcomes, in draw order, and compare with what was stored.
fn replay_snapshots(
    product: &Product,
    tiers: &[PrizeTier],
    tickets: &[TicketRecord],
) -> Vec<TicketNumber> {
    let mut state = InventorySnapshot {
        product_id:        product.product_id.clone(),
        total_tickets:     product.total_tickets,
        remaining:         product.total_tickets,
        issued:            0,
        profit_rate_milli: product.profit_rate_milli,
        tiers:             tiers
            .iter()
            .map(|t| PrizeTier { remaining: t.total, ..t.clone() })
            .collect(),
    };
    let mut mismatches = Vec::new();
    for record in tickets {
        let expected = state.draw_snapshot(state.issued);
        if expected != record.draw_snapshot {
            mismatches.push(record.ticket_number);
        }
        if state.take(&record.tier_id).is_err() {
            mismatches.push(record.ticket_number);
        }
    }
    mismatches.dedup();
    mismatches
}

//! Lifecycle events: the audit trail of every product.
//!
//! RULE: every state change the engine makes is recorded here after the
//! ledger transaction commits. Variants are append-only.

use crate::types::{ProductId, ReservationId, TicketNumber, TierId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawEvent {
    ProductCreated {
        product_id:        ProductId,
        total_tickets:     u64,
        tier_count:        usize,
        profit_rate_milli: u64,
    },
    SeedCommitted {
        product_id: ProductId,
        seed_hash:  String,
    },
    BatchAllocated {
        product_id:     ProductId,
        reservation_id: ReservationId,
        tickets:        Vec<AllocatedTicket>,
        attempts:       u32,
    },
    BatchRejected {
        product_id:     ProductId,
        /// Empty for random checkouts rejected before numbers were picked.
        ticket_numbers: Vec<TicketNumber>,
        requested:      u64,
        reason:         String,
    },
    ProductSoldOut {
        product_id: ProductId,
    },
    ProductClosed {
        product_id: ProductId,
        remaining:  u64,
    },
    SeedRevealed {
        product_id: ProductId,
        seed_hex:   String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedTicket {
    pub ticket_number: TicketNumber,
    pub tier_id:       TierId,
    pub last_one:      bool,
}

impl DrawEvent {
    pub fn product_id(&self) -> &str {
        match self {
            Self::ProductCreated { product_id, .. }
            | Self::SeedCommitted { product_id, .. }
            | Self::BatchAllocated { product_id, .. }
            | Self::BatchRejected { product_id, .. }
            | Self::ProductSoldOut { product_id }
            | Self::ProductClosed { product_id, .. }
            | Self::SeedRevealed { product_id, .. } => product_id,
        }
    }

    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ProductCreated { .. } => "product_created",
            Self::SeedCommitted { .. }  => "seed_committed",
            Self::BatchAllocated { .. } => "batch_allocated",
            Self::BatchRejected { .. }  => "batch_rejected",
            Self::ProductSoldOut { .. } => "product_sold_out",
            Self::ProductClosed { .. }  => "product_closed",
            Self::SeedRevealed { .. }   => "seed_revealed",
        }
    }
}

/// A persisted event_log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub product_id: ProductId,
    pub event_type: String,
    pub payload:    String,
    pub created_at: String,
}

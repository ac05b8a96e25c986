use crate::types::{ProductId, TicketNumber, TierId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrawError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Product '{product_id}' not found")]
    ProductNotFound { product_id: ProductId },

    #[error("Reservation '{reservation_id}' not found")]
    ReservationNotFound { reservation_id: String },

    #[error("Invalid catalog entry for '{product_id}': {reason}")]
    InvalidCatalog { product_id: ProductId, reason: String },

    #[error("Product '{product_id}' has no seed commitment")]
    NotCommitted { product_id: ProductId },

    #[error("Product '{product_id}' is already committed")]
    AlreadyCommitted { product_id: ProductId },

    #[error("Sale for product '{product_id}' is closed")]
    SaleClosed { product_id: ProductId },

    #[error("Ticket {ticket_number} is outside 0..{total_tickets} for product '{product_id}'")]
    TicketOutOfRange {
        product_id: ProductId,
        ticket_number: TicketNumber,
        total_tickets: u64,
    },

    #[error("Seed for product '{product_id}' cannot be revealed while {remaining} tickets remain on sale")]
    PrematureReveal { product_id: ProductId, remaining: u64 },

    #[error("Ticket {ticket_number} of product '{product_id}' is already issued or held")]
    DuplicateTicket {
        product_id: ProductId,
        ticket_number: TicketNumber,
    },

    #[error("Requested {requested} tickets of product '{product_id}' but only {available} are available")]
    StockExceeded {
        product_id: ProductId,
        requested: u64,
        available: u64,
    },

    #[error("Tier '{tier_id}' of product '{product_id}' changed between selection and commit")]
    TierExhaustedRace { product_id: ProductId, tier_id: TierId },

    #[error("Inventory of product '{product_id}' changed between selection and commit")]
    ConcurrentUpdate { product_id: ProductId },

    #[error("Inventory exhausted: no regular tier has stock left")]
    InventoryExhausted,

    #[error("Tier '{tier_id}' has an unusable weight")]
    InvalidWeight { tier_id: TierId },

    #[error("Invalid seed: {reason}")]
    InvalidSeed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DrawError {
    /// Errors the checkout surface shows to buyers as
    /// "not enough tickets available, please choose again".
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::StockExceeded { .. } | Self::DuplicateTicket { .. })
    }

    /// Lost optimistic races. The orchestrator retries these against a
    /// refreshed inventory snapshot.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TierExhaustedRace { .. } | Self::ConcurrentUpdate { .. }
        ) || self.is_busy()
    }

    /// SQLite could not obtain the write lock within the busy timeout.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type DrawResult<T> = Result<T, DrawError>;

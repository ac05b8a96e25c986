//! Shared primitive types used across the engine.

/// Catalog identifier of a product (one draw pool).
pub type ProductId = String;

/// Identifier of a prize tier, unique within its product.
pub type TierId = String;

/// A ticket slot within a product. Valid numbers are `0..total_tickets`.
pub type TicketNumber = u64;

/// Identifier of a provisional hold on ticket slots.
pub type ReservationId = String;

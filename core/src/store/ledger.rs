//! Store methods for the inventory ledger: reservations, counters, tickets.
//!
//! Counter writes are compare-and-swap: `... WHERE remaining = ?observed`.
//! Zero affected rows means another writer committed first.

use super::{
    catalog::{load_product, load_tiers},
    is_constraint_violation, DrawStore,
};
use crate::{
    catalog::ProductStatus,
    error::{DrawError, DrawResult},
    ledger::{InventorySnapshot, ReservationToken, TicketAllocation, TicketRecord},
    types::{TicketNumber, TierId},
};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{BTreeMap, HashSet};

const TICKET_COLUMNS: &str = "product_id, ticket_number, draw_position, tier_id, last_one,
    random_value, ticket_hash, seed_hash, draw_snapshot, reservation_id, allocated_at";

impl DrawStore {
    /// Check and hold `numbers` for one reservation, all or nothing.
    pub fn reserve_slots(
        &self,
        product_id: &str,
        reservation_id: &str,
        numbers: &[TicketNumber],
        reserved_at: &str,
    ) -> DrawResult<()> {
        let tx = self.write_txn()?;
        let product = load_product(&tx, product_id)?;
        let requested = numbers.len() as u64;

        match product.status {
            ProductStatus::Closed => {
                return Err(DrawError::SaleClosed {
                    product_id: product_id.to_string(),
                });
            }
            ProductStatus::SoldOut => {
                return Err(DrawError::StockExceeded {
                    product_id: product_id.to_string(),
                    requested,
                    available: 0,
                });
            }
            ProductStatus::OnSale => {}
        }

        let committed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM commitment WHERE product_id = ?1)",
            params![product_id],
            |row| row.get(0),
        )?;
        if !committed {
            return Err(DrawError::NotCommitted {
                product_id: product_id.to_string(),
            });
        }

        for &n in numbers {
            if n >= product.total_tickets {
                return Err(DrawError::TicketOutOfRange {
                    product_id:    product_id.to_string(),
                    ticket_number: n,
                    total_tickets: product.total_tickets,
                });
            }
        }

        for &n in numbers {
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM ticket WHERE product_id = ?1 AND ticket_number = ?2)
                     OR EXISTS(SELECT 1 FROM reservation_slot
                               WHERE product_id = ?1 AND ticket_number = ?2)",
                params![product_id, n as i64],
                |row| row.get(0),
            )?;
            if taken {
                return Err(DrawError::DuplicateTicket {
                    product_id:    product_id.to_string(),
                    ticket_number: n,
                });
            }
        }

        let held: i64 = tx.query_row(
            "SELECT COUNT(*) FROM reservation_slot WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        let available = product.remaining.saturating_sub(held as u64);
        if requested > available {
            return Err(DrawError::StockExceeded {
                product_id: product_id.to_string(),
                requested,
                available,
            });
        }

        tx.execute(
            "INSERT INTO reservation (reservation_id, product_id, quantity, reserved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![reservation_id, product_id, requested as i64, reserved_at],
        )?;
        for &n in numbers {
            tx.execute(
                "INSERT INTO reservation_slot (product_id, ticket_number, reservation_id)
                 VALUES (?1, ?2, ?3)",
                params![product_id, n as i64, reservation_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Consistent view of product and tier counters.
    pub fn inventory_snapshot(&self, product_id: &str) -> DrawResult<InventorySnapshot> {
        let tx = self.read_txn()?;
        let product = load_product(&tx, product_id)?;
        let tiers = load_tiers(&tx, product_id)?;
        let issued: i64 = tx.query_row(
            "SELECT COUNT(*) FROM ticket WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(InventorySnapshot {
            product_id:        product.product_id,
            total_tickets:     product.total_tickets,
            remaining:         product.remaining,
            issued:            issued as u64,
            profit_rate_milli: product.profit_rate_milli,
            tiers,
        })
    }

    /// Insert tickets and decrement counters conditionally on `observed`.
    /// On any failure nothing is written and the reservation is kept.
    pub fn commit_allocations(
        &self,
        token: &ReservationToken,
        observed: &InventorySnapshot,
        allocations: &[TicketAllocation],
        allocated_at: &str,
    ) -> DrawResult<Vec<TicketRecord>> {
        let product_id = token.product_id.as_str();
        let tx = self.write_txn()?;

        let product = load_product(&tx, product_id)?;
        if product.status == ProductStatus::Closed {
            return Err(DrawError::SaleClosed {
                product_id: product_id.to_string(),
            });
        }

        let reserved: Option<i64> = tx
            .query_row(
                "SELECT quantity FROM reservation
                 WHERE reservation_id = ?1 AND product_id = ?2",
                params![token.reservation_id, product_id],
                |row| row.get(0),
            )
            .optional()?;
        if reserved.is_none() {
            return Err(DrawError::ReservationNotFound {
                reservation_id: token.reservation_id.clone(),
            });
        }

        let seed_hash: String = tx
            .query_row(
                "SELECT seed_hash FROM commitment WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DrawError::NotCommitted {
                product_id: product_id.to_string(),
            })?;

        // Tier counters.
        let mut per_tier: BTreeMap<&str, u64> = BTreeMap::new();
        for a in allocations {
            *per_tier.entry(a.tier_id.as_str()).or_default() += 1;
        }
        for (tier_id, taken) in per_tier {
            let race = || DrawError::TierExhaustedRace {
                product_id: product_id.to_string(),
                tier_id:    tier_id.to_string(),
            };
            let seen = observed
                .tiers
                .iter()
                .find(|t| t.tier_id == tier_id)
                .map(|t| t.remaining)
                .ok_or_else(race)?;
            let left = seen.checked_sub(taken).ok_or_else(race)?;
            let changed = tx.execute(
                "UPDATE prize_tier SET remaining = ?1
                 WHERE product_id = ?2 AND tier_id = ?3 AND remaining = ?4",
                params![left as i64, product_id, tier_id, seen as i64],
            )?;
            if changed == 0 {
                return Err(race());
            }
        }

        // Product counter.
        let conflict = || DrawError::ConcurrentUpdate {
            product_id: product_id.to_string(),
        };
        let left = observed
            .remaining
            .checked_sub(allocations.len() as u64)
            .ok_or_else(conflict)?;
        let changed = tx.execute(
            "UPDATE product
             SET remaining = ?1,
                 status = CASE WHEN ?1 = 0 THEN 'sold_out' ELSE status END
             WHERE product_id = ?2 AND remaining = ?3 AND status = 'on_sale'",
            params![left as i64, product_id, observed.remaining as i64],
        )?;
        if changed == 0 {
            return Err(conflict());
        }

        // Write-once ticket rows.
        let mut records = Vec::with_capacity(allocations.len());
        for a in allocations {
            let record = TicketRecord {
                product_id:     product_id.to_string(),
                ticket_number:  a.ticket_number,
                draw_position:  a.snapshot.position,
                tier_id:        a.tier_id.clone(),
                last_one:       a.last_one,
                random_value:   a.random_value,
                ticket_hash:    a.ticket_hash.clone(),
                seed_hash:      seed_hash.clone(),
                draw_snapshot:  a.snapshot.clone(),
                reservation_id: token.reservation_id.clone(),
                allocated_at:   allocated_at.to_string(),
            };
            let inserted = tx.execute(
                &format!(
                    "INSERT INTO ticket ({TICKET_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.product_id,
                    record.ticket_number as i64,
                    record.draw_position as i64,
                    record.tier_id,
                    record.last_one as i64,
                    record.random_value as i64,
                    record.ticket_hash,
                    record.seed_hash,
                    serde_json::to_string(&record.draw_snapshot)?,
                    record.reservation_id,
                    record.allocated_at,
                ],
            );
            match inserted {
                Err(e) if is_constraint_violation(&e) => {
                    return Err(DrawError::DuplicateTicket {
                        product_id:    product_id.to_string(),
                        ticket_number: a.ticket_number,
                    });
                }
                other => {
                    other?;
                }
            }
            records.push(record);
        }

        tx.execute(
            "DELETE FROM reservation_slot WHERE reservation_id = ?1",
            params![token.reservation_id],
        )?;
        tx.execute(
            "DELETE FROM reservation WHERE reservation_id = ?1",
            params![token.reservation_id],
        )?;
        tx.commit()?;
        Ok(records)
    }

    /// Drop a reservation and its slots. Returns false if it was already gone.
    pub fn release_reservation(&self, reservation_id: &str) -> DrawResult<bool> {
        let tx = self.write_txn()?;
        tx.execute(
            "DELETE FROM reservation_slot WHERE reservation_id = ?1",
            params![reservation_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM reservation WHERE reservation_id = ?1",
            params![reservation_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn purge_reservations_before(&self, cutoff: &str) -> DrawResult<usize> {
        let tx = self.write_txn()?;
        tx.execute(
            "DELETE FROM reservation_slot WHERE reservation_id IN (
                SELECT reservation_id FROM reservation WHERE reserved_at < ?1
             )",
            params![cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM reservation WHERE reserved_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Issued tickets in draw order.
    pub fn tickets(&self, product_id: &str) -> DrawResult<Vec<TicketRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket
             WHERE product_id = ?1 ORDER BY draw_position ASC"
        ))?;
        let rows = stmt
            .query_map(params![product_id], ticket_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TicketRow::into_record).collect()
    }

    pub fn ticket(
        &self,
        product_id: &str,
        ticket_number: TicketNumber,
    ) -> DrawResult<Option<TicketRecord>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM ticket
                     WHERE product_id = ?1 AND ticket_number = ?2"
                ),
                params![product_id, ticket_number as i64],
                ticket_row,
            )
            .optional()?;
        row.map(TicketRow::into_record).transpose()
    }

    pub fn held_count(&self, product_id: &str) -> DrawResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reservation_slot WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Tickets issued per tier, including tiers with none.
    pub fn issued_by_tier(&self, product_id: &str) -> DrawResult<Vec<(TierId, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT pt.tier_id, COUNT(t.ticket_number)
             FROM prize_tier pt
             LEFT JOIN ticket t
               ON t.product_id = pt.product_id AND t.tier_id = pt.tier_id
             WHERE pt.product_id = ?1
             GROUP BY pt.tier_id, pt.level
             ORDER BY pt.level ASC",
        )?;
        let counts = stmt
            .query_map(params![product_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Ticket numbers neither issued nor held, ascending.
    pub fn available_numbers(&self, product_id: &str) -> DrawResult<Vec<TicketNumber>> {
        let tx = self.read_txn()?;
        let product = load_product(&tx, product_id)?;
        let taken: HashSet<TicketNumber> = {
            let mut stmt = tx.prepare(
                "SELECT ticket_number FROM ticket WHERE product_id = ?1
                 UNION
                 SELECT ticket_number FROM reservation_slot WHERE product_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![product_id], |row| {
                    Ok(row.get::<_, i64>(0)? as TicketNumber)
                })?
                .collect::<Result<HashSet<_>, _>>()?;
            rows
        };
        tx.commit()?;
        Ok((0..product.total_tickets)
            .filter(|n| !taken.contains(n))
            .collect())
    }
}

/// Raw ticket columns; the snapshot JSON is decoded outside the row closure.
struct TicketRow {
    product_id:     String,
    ticket_number:  i64,
    draw_position:  i64,
    tier_id:        String,
    last_one:       i64,
    random_value:   i64,
    ticket_hash:    String,
    seed_hash:      String,
    draw_snapshot:  String,
    reservation_id: String,
    allocated_at:   String,
}

fn ticket_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        product_id:     row.get(0)?,
        ticket_number:  row.get(1)?,
        draw_position:  row.get(2)?,
        tier_id:        row.get(3)?,
        last_one:       row.get(4)?,
        random_value:   row.get(5)?,
        ticket_hash:    row.get(6)?,
        seed_hash:      row.get(7)?,
        draw_snapshot:  row.get(8)?,
        reservation_id: row.get(9)?,
        allocated_at:   row.get(10)?,
    })
}

impl TicketRow {
    fn into_record(self) -> DrawResult<TicketRecord> {
        Ok(TicketRecord {
            product_id:     self.product_id,
            ticket_number:  self.ticket_number as u64,
            draw_position:  self.draw_position as u64,
            tier_id:        self.tier_id,
            last_one:       self.last_one != 0,
            random_value:   self.random_value as u64,
            ticket_hash:    self.ticket_hash,
            seed_hash:      self.seed_hash,
            draw_snapshot:  serde_json::from_str(&self.draw_snapshot)?,
            reservation_id: self.reservation_id,
            allocated_at:   self.allocated_at,
        })
    }
}

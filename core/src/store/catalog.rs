//! Store methods for products and prize tiers.

use super::{is_constraint_violation, not_found, DrawStore};
use crate::{
    catalog::{PrizeTier, Product, ProductSpec, ProductStatus},
    error::{DrawError, DrawResult},
};
use rusqlite::{params, Connection, OptionalExtension, Row};

impl DrawStore {
    /// Insert a validated product and its tiers in one transaction.
    pub fn insert_product(
        &self,
        spec: &ProductSpec,
        profit_rate_milli: u64,
        created_at: &str,
    ) -> DrawResult<()> {
        let tx = self.write_txn()?;
        let inserted = tx.execute(
            "INSERT INTO product (
                product_id, title, total_tickets, remaining,
                profit_rate_milli, status, created_at
            ) VALUES (?1, ?2, ?3, ?3, ?4, 'on_sale', ?5)",
            params![
                spec.product_id,
                spec.title,
                spec.total_tickets as i64,
                profit_rate_milli as i64,
                created_at,
            ],
        );
        match inserted {
            Err(e) if is_constraint_violation(&e) => {
                return Err(DrawError::InvalidCatalog {
                    product_id: spec.product_id.clone(),
                    reason:     "product already exists".into(),
                });
            }
            other => {
                other?;
            }
        }
        for t in &spec.tiers {
            tx.execute(
                "INSERT INTO prize_tier (
                    product_id, tier_id, level, label, weight, total, remaining, last_one
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
                params![
                    spec.product_id,
                    t.tier_id,
                    t.level as i64,
                    t.label,
                    t.weight as i64,
                    t.total as i64,
                    t.last_one as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn product(&self, product_id: &str) -> DrawResult<Product> {
        load_product(&self.conn, product_id)
    }

    pub fn product_ids(&self) -> DrawResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT product_id FROM product ORDER BY product_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Tiers of a product, level ascending.
    pub fn tiers(&self, product_id: &str) -> DrawResult<Vec<PrizeTier>> {
        load_tiers(&self.conn, product_id)
    }

    /// Administratively close a sale. Returns the new status and the
    /// number of tickets left unsold. Sold-out products stay sold out.
    pub fn close_product(&self, product_id: &str) -> DrawResult<(ProductStatus, u64)> {
        let tx = self.write_txn()?;
        let product = load_product(&tx, product_id)?;
        if product.status == ProductStatus::OnSale {
            tx.execute(
                "UPDATE product SET status = 'closed'
                 WHERE product_id = ?1 AND status = 'on_sale'",
                params![product_id],
            )?;
        }
        tx.commit()?;
        let status = match product.status {
            ProductStatus::OnSale => ProductStatus::Closed,
            other => other,
        };
        Ok((status, product.remaining))
    }
}

pub(super) fn load_product(conn: &Connection, product_id: &str) -> DrawResult<Product> {
    conn.query_row(
        "SELECT product_id, title, total_tickets, remaining, profit_rate_milli, status
         FROM product WHERE product_id = ?1",
        params![product_id],
        product_from_row,
    )
    .optional()?
    .ok_or_else(|| not_found(product_id))
}

pub(super) fn load_tiers(conn: &Connection, product_id: &str) -> DrawResult<Vec<PrizeTier>> {
    let mut stmt = conn.prepare(
        "SELECT tier_id, level, label, weight, total, remaining, last_one
         FROM prize_tier WHERE product_id = ?1
         ORDER BY level ASC",
    )?;
    let tiers = stmt
        .query_map(params![product_id], |row| {
            Ok(PrizeTier {
                tier_id:   row.get(0)?,
                level:     row.get::<_, i64>(1)? as u32,
                label:     row.get(2)?,
                weight:    row.get::<_, i64>(3)? as u64,
                total:     row.get::<_, i64>(4)? as u64,
                remaining: row.get::<_, i64>(5)? as u64,
                last_one:  row.get::<_, i64>(6)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tiers)
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let status: String = row.get(5)?;
    let status = ProductStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown product status '{status}'").into(),
        )
    })?;
    Ok(Product {
        product_id:        row.get(0)?,
        title:             row.get(1)?,
        total_tickets:     row.get::<_, i64>(2)? as u64,
        remaining:         row.get::<_, i64>(3)? as u64,
        profit_rate_milli: row.get::<_, i64>(4)? as u64,
        status,
    })
}

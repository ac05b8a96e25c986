//! Store methods for seed commitments.

use super::{catalog::load_product, DrawStore};
use crate::{
    commitment::Commitment,
    error::{DrawError, DrawResult},
};
use rusqlite::{params, OptionalExtension};

impl DrawStore {
    pub fn insert_commitment(
        &self,
        product_id: &str,
        seed_hex: &str,
        seed_hash: &str,
        committed_at: &str,
    ) -> DrawResult<()> {
        let tx = self.write_txn()?;
        load_product(&tx, product_id)?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM commitment WHERE product_id = ?1)",
            params![product_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(DrawError::AlreadyCommitted {
                product_id: product_id.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO commitment (product_id, seed_hex, seed_hash, committed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_id, seed_hex, seed_hash, committed_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Public commitment data. Never includes the seed.
    pub fn commitment(&self, product_id: &str) -> DrawResult<Option<Commitment>> {
        let row = self
            .conn
            .query_row(
                "SELECT product_id, seed_hash, committed_at, revealed_at
                 FROM commitment WHERE product_id = ?1",
                params![product_id],
                |row| {
                    Ok(Commitment {
                        product_id:   row.get(0)?,
                        seed_hash:    row.get(1)?,
                        committed_at: row.get(2)?,
                        revealed_at:  row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Mark the commitment revealed and return the seed. Only allowed once
    /// the product is sold out or closed; repeat reveals return the same seed.
    pub fn reveal_commitment(&self, product_id: &str, revealed_at: &str) -> DrawResult<String> {
        let tx = self.write_txn()?;
        let product = load_product(&tx, product_id)?;
        if !product.status.allows_reveal() {
            return Err(DrawError::PrematureReveal {
                product_id: product_id.to_string(),
                remaining:  product.remaining,
            });
        }
        let seed_hex: String = tx
            .query_row(
                "SELECT seed_hex FROM commitment WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DrawError::NotCommitted {
                product_id: product_id.to_string(),
            })?;
        tx.execute(
            "UPDATE commitment SET revealed_at = ?1
             WHERE product_id = ?2 AND revealed_at IS NULL",
            params![revealed_at, product_id],
        )?;
        tx.commit()?;
        Ok(seed_hex)
    }

    /// The seed, only if it has been revealed.
    pub fn revealed_seed(&self, product_id: &str) -> DrawResult<Option<String>> {
        let seed = self
            .conn
            .query_row(
                "SELECT seed_hex FROM commitment
                 WHERE product_id = ?1 AND revealed_at IS NOT NULL",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seed)
    }

    /// The seed regardless of reveal state. Derivation only.
    pub(crate) fn private_seed(&self, product_id: &str) -> DrawResult<Option<String>> {
        let seed = self
            .conn
            .query_row(
                "SELECT seed_hex FROM commitment WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seed)
    }
}

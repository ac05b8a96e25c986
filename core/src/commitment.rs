//! Commitment store: per-product secret seeds and their public hashes.
//!
//! Lifecycle:
//!   commit  → seed generated, SHA-256(seed) published (seed stays private)
//!   draws   → every ticket derives from the private seed
//!   reveal  → only once the product is sold out or closed
//!
//! RULE: the raw seed never leaves this module before reveal, except into
//! the derivation step of the batch orchestrator.

use crate::{
    clock,
    derivation::{parse_seed, Seed, SEED_LEN},
    error::{DrawError, DrawResult},
    store::DrawStore,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub product_id:   String,
    pub seed_hash:    String,
    pub committed_at: String,
    pub revealed_at:  Option<String>,
}

/// Fresh 256-bit seed from the operating system CSPRNG.
pub fn generate_seed() -> Seed {
    let mut seed = [0u8; SEED_LEN];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Published commitment: lowercase hex SHA-256 of the raw seed bytes.
pub fn hash_seed(seed: &[u8]) -> String {
    hex::encode(Sha256::digest(seed))
}

/// Check a revealed seed against the hash published before the sale.
pub fn verify_commitment(seed_hex: &str, seed_hash: &str) -> bool {
    match parse_seed(seed_hex) {
        Ok(seed) => hash_seed(&seed).eq_ignore_ascii_case(seed_hash.trim()),
        Err(_) => false,
    }
}

pub struct CommitmentStore<'a> {
    store: &'a DrawStore,
}

impl<'a> CommitmentStore<'a> {
    pub fn new(store: &'a DrawStore) -> Self {
        Self { store }
    }

    /// Generate and commit a seed. Returns the public seed hash.
    pub fn commit(&self, product_id: &str) -> DrawResult<String> {
        self.commit_seed(product_id, &generate_seed())
    }

    /// Commit a caller-supplied seed (replays, imports, tests).
    pub fn commit_seed(&self, product_id: &str, seed: &Seed) -> DrawResult<String> {
        let seed_hash = hash_seed(seed);
        let now = clock::now();
        self.store
            .insert_commitment(product_id, &hex::encode(seed), &seed_hash, &now)?;
        log::info!("product={product_id} commitment published: {seed_hash}");
        Ok(seed_hash)
    }

    pub fn commitment(&self, product_id: &str) -> DrawResult<Commitment> {
        self.store
            .commitment(product_id)?
            .ok_or_else(|| DrawError::NotCommitted {
                product_id: product_id.to_string(),
            })
    }

    pub fn seed_hash(&self, product_id: &str) -> DrawResult<String> {
        Ok(self.commitment(product_id)?.seed_hash)
    }

    /// Release the raw seed. Rejected with `PrematureReveal` while the
    /// product is still on sale.
    pub fn reveal(&self, product_id: &str) -> DrawResult<String> {
        let now = clock::now();
        let seed_hex = self.store.reveal_commitment(product_id, &now)?;
        log::info!("product={product_id} seed revealed");
        Ok(seed_hex)
    }

    /// The revealed seed, or `PrematureReveal` if reveal has not happened.
    pub fn revealed_seed(&self, product_id: &str) -> DrawResult<String> {
        match self.store.revealed_seed(product_id)? {
            Some(seed_hex) => Ok(seed_hex),
            None => {
                let remaining = self.store.product(product_id)?.remaining;
                Err(DrawError::PrematureReveal {
                    product_id: product_id.to_string(),
                    remaining,
                })
            }
        }
    }

    /// Private seed for derivation. Never exposed through the public API.
    pub(crate) fn draw_seed(&self, product_id: &str) -> DrawResult<Seed> {
        let seed_hex = self
            .store
            .private_seed(product_id)?
            .ok_or_else(|| DrawError::NotCommitted {
                product_id: product_id.to_string(),
            })?;
        parse_seed(&seed_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_seeds_differ() {
        assert_ne!(generate_seed(), generate_seed());
    }

    #[test]
    fn commitment_verifies_only_its_own_seed() {
        let seed = [9u8; SEED_LEN];
        let hash = hash_seed(&seed);
        assert!(verify_commitment(&hex::encode(seed), &hash));
        assert!(!verify_commitment(&hex::encode([8u8; SEED_LEN]), &hash));
        assert!(!verify_commitment("not-hex", &hash));
    }
}

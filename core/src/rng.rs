//! Deterministic RNG for choosing ticket numbers on a buyer's behalf.
//!
//! RULE: this stream only decides WHICH free ticket numbers a
//! "give me N random tickets" checkout receives. Prize outcomes never touch
//! it; they come from `derivation` alone.
//!
//! Each worker gets its own stream, seeded from (seed XOR worker_index·φ),
//! so adding workers never changes existing workers' picks.

use crate::types::TicketNumber;
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct PickRng {
    inner: Pcg64Mcg,
}

impl PickRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Independent stream for one concurrent checkout worker.
    pub fn for_worker(seed: u64, worker_index: u64) -> Self {
        Self::new(seed ^ worker_index.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n). Returns 0 when n is 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.inner.next_u64() % n
    }

    /// Pick `count` distinct numbers from `pool` (partial Fisher–Yates),
    /// returned ascending. Picks everything if `count >= pool.len()`.
    pub fn choose(&mut self, pool: &[TicketNumber], count: usize) -> Vec<TicketNumber> {
        let mut pool = pool.to_vec();
        let count = count.min(pool.len());
        for i in 0..count {
            let j = i + self.next_u64_below((pool.len() - i) as u64) as usize;
            pool.swap(i, j);
        }
        pool.truncate(count);
        pool.sort_unstable();
        pool
    }
}

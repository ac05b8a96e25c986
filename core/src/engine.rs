//! The draw engine, the entry point the catalog, checkout and
//! verification surfaces call.
//!
//! LIFECYCLE of a product:
//!   create_product → commit → allocate_batch* → (sold out | close) → reveal → audit
//!
//! RULES:
//!   - All inventory mutation goes through the ledger (via BatchAllocator).
//!   - Outcomes depend only on (seed, ticket number, inventory snapshot).
//!   - Every lifecycle step is appended to the event log after it commits.

use crate::{
    batch::{AllocationResult, BatchAllocator, BatchReceipt},
    catalog::{PrizeTier, Product, ProductSpec, ProductStatus},
    clock,
    commitment::{Commitment, CommitmentStore},
    config::EngineConfig,
    derivation::Seed,
    error::{DrawError, DrawResult},
    event::{AllocatedTicket, DrawEvent},
    ledger::{InventoryLedger, TicketRecord},
    rng::PickRng,
    store::DrawStore,
    types::TicketNumber,
    verify::{self, AuditReport, Verification},
};

pub struct DrawEngine {
    store:  DrawStore,
    config: EngineConfig,
}

impl DrawEngine {
    pub fn new(store: DrawStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Migrated in-memory engine with default config. Used in tests.
    pub fn in_memory() -> DrawResult<Self> {
        let store = DrawStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, EngineConfig::default()))
    }

    pub fn store(&self) -> &DrawStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Catalog ────────────────────────────────────────────────

    pub fn create_product(&self, spec: &ProductSpec) -> DrawResult<Product> {
        let rate = spec.validate()?;
        self.store.insert_product(spec, rate, &clock::now())?;
        log::info!(
            "product={} created: {} tickets, {} tiers, profit rate {rate}/1000",
            spec.product_id,
            spec.total_tickets,
            spec.tiers.len()
        );
        self.record(&DrawEvent::ProductCreated {
            product_id:        spec.product_id.clone(),
            total_tickets:     spec.total_tickets,
            tier_count:        spec.tiers.len(),
            profit_rate_milli: rate,
        })?;
        self.store.product(&spec.product_id)
    }

    pub fn product(&self, product_id: &str) -> DrawResult<Product> {
        self.store.product(product_id)
    }

    pub fn tiers(&self, product_id: &str) -> DrawResult<Vec<PrizeTier>> {
        self.store.tiers(product_id)
    }

    /// Stop selling. Unsold tickets stay unissued; the seed becomes revealable.
    pub fn close(&self, product_id: &str) -> DrawResult<ProductStatus> {
        let (status, remaining) = self.store.close_product(product_id)?;
        if status == ProductStatus::Closed {
            log::info!("product={product_id} closed with {remaining} tickets unsold");
            self.record(&DrawEvent::ProductClosed {
                product_id: product_id.to_string(),
                remaining,
            })?;
        }
        Ok(status)
    }

    // ── Commitment ─────────────────────────────────────────────

    /// Generate the product's seed and publish its hash.
    pub fn commit(&self, product_id: &str) -> DrawResult<String> {
        let seed_hash = CommitmentStore::new(&self.store).commit(product_id)?;
        self.record_commit(product_id, &seed_hash)?;
        Ok(seed_hash)
    }

    /// Commit a known seed instead of a generated one.
    pub fn commit_seed(&self, product_id: &str, seed: &Seed) -> DrawResult<String> {
        let seed_hash = CommitmentStore::new(&self.store).commit_seed(product_id, seed)?;
        self.record_commit(product_id, &seed_hash)?;
        Ok(seed_hash)
    }

    pub fn seed_hash(&self, product_id: &str) -> DrawResult<String> {
        CommitmentStore::new(&self.store).seed_hash(product_id)
    }

    pub fn commitment(&self, product_id: &str) -> DrawResult<Commitment> {
        CommitmentStore::new(&self.store).commitment(product_id)
    }

    /// Release the seed. `PrematureReveal` while the product is on sale.
    pub fn reveal(&self, product_id: &str) -> DrawResult<String> {
        let commitments = CommitmentStore::new(&self.store);
        let first_reveal = commitments.commitment(product_id)?.revealed_at.is_none();
        let seed_hex = commitments.reveal(product_id)?;
        if first_reveal {
            self.record(&DrawEvent::SeedRevealed {
                product_id: product_id.to_string(),
                seed_hex:   seed_hex.clone(),
            })?;
        }
        Ok(seed_hex)
    }

    // ── Allocation ─────────────────────────────────────────────

    /// Allocate the given ticket numbers as one atomic purchase.
    pub fn allocate_batch(
        &self,
        product_id: &str,
        ticket_numbers: &[TicketNumber],
    ) -> DrawResult<Vec<AllocationResult>> {
        if ticket_numbers.is_empty() {
            return Ok(Vec::new());
        }
        let outcome = BatchAllocator::new(&self.store, &self.config)
            .allocate_batch(product_id, ticket_numbers);
        self.finish_batch(product_id, ticket_numbers, ticket_numbers.len(), outcome)
    }

    /// Allocate `count` randomly chosen free ticket numbers.
    pub fn allocate_random(
        &self,
        product_id: &str,
        count: usize,
        rng: &mut PickRng,
    ) -> DrawResult<Vec<AllocationResult>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let outcome = BatchAllocator::new(&self.store, &self.config)
            .allocate_random(product_id, count, rng);
        self.finish_batch(product_id, &[], count, outcome)
    }

    /// Log the outcome of a batch. Once the ledger has committed, the
    /// purchase stands: event log failures are reported, never returned.
    fn finish_batch(
        &self,
        product_id: &str,
        ticket_numbers: &[TicketNumber],
        requested: usize,
        outcome: DrawResult<BatchReceipt>,
    ) -> DrawResult<Vec<AllocationResult>> {
        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                if e.is_user_facing() {
                    log::info!("product={product_id} batch rejected: {e}");
                } else {
                    log::warn!("product={product_id} batch failed: {e}");
                }
                self.record_best_effort(&DrawEvent::BatchRejected {
                    product_id:     product_id.to_string(),
                    ticket_numbers: ticket_numbers.to_vec(),
                    requested:      requested as u64,
                    reason:         e.to_string(),
                });
                return Err(e);
            }
        };

        log::info!(
            "product={product_id} batch {} allocated {} tickets in {} attempt(s)",
            receipt.reservation_id,
            receipt.records.len(),
            receipt.attempts
        );
        self.record_best_effort(&DrawEvent::BatchAllocated {
            product_id:     product_id.to_string(),
            reservation_id: receipt.reservation_id.clone(),
            tickets:        receipt
                .records
                .iter()
                .map(|r| AllocatedTicket {
                    ticket_number: r.ticket_number,
                    tier_id:       r.tier_id.clone(),
                    last_one:      r.last_one,
                })
                .collect(),
            attempts:       receipt.attempts,
        });

        let sold_out = receipt
            .records
            .iter()
            .any(|r| r.draw_position + 1 == r.draw_snapshot.total_tickets);
        if sold_out {
            log::info!("product={product_id} sold out");
            self.record_best_effort(&DrawEvent::ProductSoldOut {
                product_id: product_id.to_string(),
            });
        }

        Ok(receipt.records.iter().map(AllocationResult::from).collect())
    }

    // ── Ledger queries ─────────────────────────────────────────

    pub fn tickets(&self, product_id: &str) -> DrawResult<Vec<TicketRecord>> {
        InventoryLedger::new(&self.store).tickets(product_id)
    }

    pub fn ticket(
        &self,
        product_id: &str,
        ticket_number: TicketNumber,
    ) -> DrawResult<Option<TicketRecord>> {
        InventoryLedger::new(&self.store).ticket(product_id, ticket_number)
    }

    pub fn available_numbers(&self, product_id: &str) -> DrawResult<Vec<TicketNumber>> {
        InventoryLedger::new(&self.store).available_numbers(product_id)
    }

    pub fn purge_stale_reservations(&self, max_age: chrono::Duration) -> DrawResult<usize> {
        InventoryLedger::new(&self.store).purge_stale_reservations(max_age)
    }

    // ── Verification ───────────────────────────────────────────

    /// Re-derive one ticket from the revealed seed.
    pub fn verify_ticket(
        &self,
        product_id: &str,
        ticket_number: TicketNumber,
    ) -> DrawResult<Verification> {
        let seed_hex = CommitmentStore::new(&self.store).revealed_seed(product_id)?;
        let record = self
            .ticket(product_id, ticket_number)?
            .ok_or_else(|| {
                DrawError::Other(anyhow::anyhow!(
                    "ticket {ticket_number} of product '{product_id}' was never issued"
                ))
            })?;
        verify::verify_ticket(&seed_hex, &record)
    }

    pub fn audit(&self, product_id: &str) -> DrawResult<AuditReport> {
        verify::audit(&self.store, product_id)
    }

    fn record_commit(&self, product_id: &str, seed_hash: &str) -> DrawResult<()> {
        self.record(&DrawEvent::SeedCommitted {
            product_id: product_id.to_string(),
            seed_hash:  seed_hash.to_string(),
        })
    }

    fn record(&self, event: &DrawEvent) -> DrawResult<()> {
        self.store.append_event(event, &clock::now())
    }

    fn record_best_effort(&self, event: &DrawEvent) {
        if let Err(e) = self.record(event) {
            log::error!(
                "product={} could not log {}: {e}",
                event.product_id(),
                event.type_name()
            );
        }
    }
}

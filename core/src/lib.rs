//! Provably-fair weighted draw engine.
//!
//! Sells numbered tickets against a fixed prize pool. Each product commits
//! to a secret seed before sale; every ticket's prize is derived from
//! (seed, ticket number) and the remaining inventory, so after the seed is
//! revealed anyone can re-derive every outcome. The ledger guarantees no
//! tier is ever oversold under concurrent purchases.

pub mod batch;
pub mod catalog;
pub mod clock;
pub mod commitment;
pub mod config;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod event;
pub mod ledger;
pub mod rng;
pub mod selector;
pub mod store;
pub mod types;
pub mod verify;

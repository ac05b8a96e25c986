use kuji_core::{
    catalog::{ProductSpec, TierSpec},
    commitment::{hash_seed, verify_commitment},
    derivation::derive,
    engine::DrawEngine,
    error::DrawError,
    verify::verify_ticket,
};
use sha2::{Digest, Sha256};

// ── Test helpers ────────────────────────────────────────────────────────────

fn tier(id: &str, level: u32, weight: u64, total: u64, last_one: bool) -> TierSpec {
    TierSpec {
        tier_id: id.into(),
        level,
        label: format!("{id} Prize"),
        weight,
        total,
        last_one,
    }
}

/// 12-ticket product, sold out in three purchases and revealed.
fn sold_out_engine() -> (DrawEngine, String) {
    let engine = DrawEngine::in_memory().unwrap();
    engine
        .create_product(&ProductSpec {
            product_id: "verify".into(),
            title: "Verify".into(),
            total_tickets: 12,
            profit_rate: 1.2,
            tiers: vec![
                tier("A", 1, 1, 1, false),
                tier("B", 2, 3, 3, false),
                tier("C", 3, 8, 7, false),
                tier("LAST", 99, 0, 1, true),
            ],
        })
        .unwrap();
    engine.commit("verify").unwrap();
    engine.allocate_batch("verify", &[3, 7, 11]).unwrap();
    engine.allocate_batch("verify", &[0, 1, 2, 4, 5]).unwrap();
    engine.allocate_batch("verify", &[6, 8, 9, 10]).unwrap();
    let seed_hex = engine.reveal("verify").unwrap();
    (engine, seed_hex)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn every_ticket_verifies_after_reveal() {
    let (engine, _) = sold_out_engine();
    for t in engine.tickets("verify").unwrap() {
        let v = engine.verify_ticket("verify", t.ticket_number).unwrap();
        assert!(v.is_valid(), "ticket {} failed: {v:?}", t.ticket_number);
        assert_eq!(v.recomputed_tier, t.tier_id);
    }
}

#[test]
fn audit_is_clean() {
    let (engine, _) = sold_out_engine();
    let report = engine.audit("verify").unwrap();
    assert!(report.is_clean(), "audit: {report:?}");
    assert_eq!(report.tickets_checked, 12);
    assert_eq!(report.remaining, 0);
    assert_eq!(report.last_one_awards, 1);
}

/// Anyone can recompute a ticket with nothing but SHA-256.
#[test]
fn independent_recomputation() {
    let (engine, seed_hex) = sold_out_engine();
    let seed = hex::decode(&seed_hex).unwrap();
    let published = engine.seed_hash("verify").unwrap();
    assert_eq!(hex::encode(Sha256::digest(&seed)), published);

    for t in engine.tickets("verify").unwrap() {
        let mut hasher = Sha256::new();
        hasher.update(&seed);
        hasher.update(t.ticket_number.to_be_bytes());
        let digest = hasher.finalize();
        let value = u64::from_be_bytes(digest[..8].try_into().unwrap());
        assert_eq!(value, t.random_value);
        assert_eq!(value, derive(&seed, t.ticket_number));
        assert_eq!(hex::encode(digest), t.ticket_hash);
        assert_eq!(t.seed_hash, published);
    }
}

#[test]
fn tampered_tier_is_detected() {
    let (engine, seed_hex) = sold_out_engine();
    let mut record = engine
        .tickets("verify")
        .unwrap()
        .into_iter()
        .find(|t| !t.last_one)
        .unwrap();
    record.tier_id = if record.tier_id == "A" { "C".into() } else { "A".into() };

    let v = verify_ticket(&seed_hex, &record).unwrap();
    assert!(!v.tier_matches);
    assert!(v.random_value_matches);
    assert!(!v.is_valid());
}

#[test]
fn tampered_value_is_detected() {
    let (engine, seed_hex) = sold_out_engine();
    let mut record = engine.ticket("verify", 4).unwrap().unwrap();
    record.random_value ^= 1;
    let v = verify_ticket(&seed_hex, &record).unwrap();
    assert!(!v.random_value_matches);
    assert!(!v.is_valid());
}

#[test]
fn wrong_seed_fails_commitment() {
    let (engine, seed_hex) = sold_out_engine();
    let published = engine.seed_hash("verify").unwrap();
    assert!(verify_commitment(&seed_hex, &published));

    let forged = hex::encode([0u8; 32]);
    assert!(!verify_commitment(&forged, &published));
    assert_ne!(hash_seed(&[0u8; 32]), published);

    let record = engine.ticket("verify", 0).unwrap().unwrap();
    let v = verify_ticket(&forged, &record).unwrap();
    assert!(!v.commitment_matches);
    assert!(!v.is_valid());

    assert!(matches!(
        verify_ticket("not-hex", &record),
        Err(DrawError::InvalidSeed { .. })
    ));
}

#[test]
fn audit_before_reveal_is_premature() {
    let engine = DrawEngine::in_memory().unwrap();
    engine
        .create_product(&ProductSpec {
            product_id: "early".into(),
            title: "Early".into(),
            total_tickets: 2,
            profit_rate: 1.0,
            tiers: vec![tier("A", 1, 1, 2, false)],
        })
        .unwrap();
    engine.commit("early").unwrap();
    engine.allocate_batch("early", &[0]).unwrap();

    assert!(matches!(
        engine.audit("early"),
        Err(DrawError::PrematureReveal { .. })
    ));
    assert!(matches!(
        engine.verify_ticket("early", 0),
        Err(DrawError::PrematureReveal { .. })
    ));
}

/// A closed product audits clean with unsold tickets and no last-one award.
#[test]
fn closed_product_audits_clean() {
    let engine = DrawEngine::in_memory().unwrap();
    engine
        .create_product(&ProductSpec {
            product_id: "closed".into(),
            title: "Closed".into(),
            total_tickets: 6,
            profit_rate: 1.0,
            tiers: vec![tier("A", 1, 1, 2, false), tier("B", 2, 2, 3, false), tier("LAST", 99, 0, 1, true)],
        })
        .unwrap();
    engine.commit("closed").unwrap();
    engine.allocate_batch("closed", &[1, 2, 3]).unwrap();
    engine.close("closed").unwrap();
    engine.reveal("closed").unwrap();

    let report = engine.audit("closed").unwrap();
    assert!(report.is_clean(), "audit: {report:?}");
    assert_eq!(report.remaining, 3);
    assert_eq!(report.last_one_awards, 0);
}

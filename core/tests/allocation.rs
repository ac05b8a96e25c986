use kuji_core::{
    catalog::{ProductSpec, ProductStatus, TierSpec},
    engine::DrawEngine,
    error::DrawError,
    rng::PickRng,
};

// ── Test helpers ────────────────────────────────────────────────────────────

fn tier(id: &str, level: u32, weight: u64, total: u64) -> TierSpec {
    TierSpec {
        tier_id: id.into(),
        level,
        label: format!("{id} Prize"),
        weight,
        total,
        last_one: false,
    }
}

fn last_one() -> TierSpec {
    TierSpec {
        tier_id: "LAST".into(),
        level: 99,
        label: "Last One".into(),
        weight: 0,
        total: 1,
        last_one: true,
    }
}

/// 3 tickets: A(weight 1, qty 1), B(weight 9, qty 1) and a last-one prize.
fn three_ticket_product(product_id: &str) -> ProductSpec {
    ProductSpec {
        product_id: product_id.into(),
        title: "Three tickets".into(),
        total_tickets: 3,
        profit_rate: 1.0,
        tiers: vec![tier("A", 1, 1, 1), tier("B", 2, 9, 1), last_one()],
    }
}

fn sixty_ticket_product(product_id: &str) -> ProductSpec {
    ProductSpec {
        product_id: product_id.into(),
        title: "Sixty tickets".into(),
        total_tickets: 60,
        profit_rate: 1.0,
        tiers: vec![
            tier("A", 1, 2, 2),
            tier("B", 2, 4, 4),
            tier("C", 3, 13, 13),
            tier("D", 4, 40, 40),
            last_one(),
        ],
    }
}

fn make_engine(spec: &ProductSpec) -> DrawEngine {
    let engine = DrawEngine::in_memory().unwrap();
    engine.create_product(spec).unwrap();
    engine.commit(&spec.product_id).unwrap();
    engine
}

/// remaining == total − issued, and every tier's counter matches its tickets.
fn assert_counters_consistent(engine: &DrawEngine, product_id: &str) {
    let product = engine.product(product_id).unwrap();
    let tickets = engine.tickets(product_id).unwrap();
    assert_eq!(
        product.remaining + tickets.len() as u64,
        product.total_tickets,
        "product remaining out of step with issued tickets"
    );
    for t in engine.tiers(product_id).unwrap() {
        let drawn = tickets.iter().filter(|r| r.tier_id == t.tier_id).count() as u64;
        assert!(drawn <= t.total, "tier {} oversold: {drawn} > {}", t.tier_id, t.total);
        assert_eq!(t.remaining + drawn, t.total, "tier {} counter drifted", t.tier_id);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Tickets [1,2] in one batch consume both A and B; ticket 0 is then the
/// product's final ticket and always wins the last-one prize.
#[test]
fn two_tier_batch_then_last_one() {
    let spec = three_ticket_product("alloc-scenario");
    let engine = make_engine(&spec);

    let first = engine.allocate_batch("alloc-scenario", &[1, 2]).unwrap();
    assert_eq!(first.len(), 2);
    let mut won: Vec<&str> = first.iter().map(|r| r.tier_id.as_str()).collect();
    won.sort_unstable();
    assert_eq!(won, vec!["A", "B"]);
    assert!(first.iter().all(|r| !r.last_one));

    let last = engine.allocate_batch("alloc-scenario", &[0]).unwrap();
    assert_eq!(last[0].tier_id, "LAST");
    assert!(last[0].last_one);

    let product = engine.product("alloc-scenario").unwrap();
    assert_eq!(product.remaining, 0);
    assert_eq!(product.status, ProductStatus::SoldOut);
    assert_counters_consistent(&engine, "alloc-scenario");
}

/// The last-one award follows position, not ticket number: buying ticket 0
/// first gives it a regular prize.
#[test]
fn last_one_is_positional() {
    let spec = three_ticket_product("alloc-positional");
    let engine = make_engine(&spec);

    let first = engine.allocate_batch("alloc-positional", &[0]).unwrap();
    assert!(!first[0].last_one);
    engine.allocate_batch("alloc-positional", &[2]).unwrap();
    let last = engine.allocate_batch("alloc-positional", &[1]).unwrap();
    assert!(last[0].last_one);
    assert_eq!(last[0].tier_id, "LAST");
}

/// Results carry the published seed hash, never the seed itself.
#[test]
fn results_carry_seed_hash() {
    let spec = three_ticket_product("alloc-hash");
    let engine = make_engine(&spec);
    let hash = engine.seed_hash("alloc-hash").unwrap();

    let results = engine.allocate_batch("alloc-hash", &[1]).unwrap();
    assert_eq!(results[0].seed_hash, hash);
    assert_eq!(results[0].ticket_hash.len(), 64);
}

/// Asking for more tickets than remain rejects the whole batch.
#[test]
fn stock_exceeded_rejects_batch() {
    let spec = three_ticket_product("alloc-stock");
    let engine = make_engine(&spec);
    engine.allocate_batch("alloc-stock", &[0, 1]).unwrap();

    let err = engine.allocate_batch("alloc-stock", &[2, 3]).unwrap_err();
    // 3 is out of range, range is checked first
    assert!(matches!(err, DrawError::TicketOutOfRange { ticket_number: 3, .. }), "got {err:?}");

    engine.allocate_batch("alloc-stock", &[2]).unwrap();
    let err = engine.allocate_batch("alloc-stock", &[1]).unwrap_err();
    assert!(matches!(err, DrawError::StockExceeded { available: 0, .. }), "got {err:?}");
    assert!(err.is_user_facing());
}

/// A ticket number already issued can never be issued again.
#[test]
fn duplicate_ticket_is_rejected() {
    let spec = sixty_ticket_product("alloc-dup");
    let engine = make_engine(&spec);
    let before = engine.allocate_batch("alloc-dup", &[5]).unwrap();

    let err = engine.allocate_batch("alloc-dup", &[4, 5, 6]).unwrap_err();
    assert!(
        matches!(err, DrawError::DuplicateTicket { ticket_number: 5, .. }),
        "got {err:?}"
    );
    // Original record untouched; neighbours not issued.
    let record = engine.ticket("alloc-dup", 5).unwrap().unwrap();
    assert_eq!(record.tier_id, before[0].tier_id);
    assert!(engine.ticket("alloc-dup", 4).unwrap().is_none());
    assert!(engine.ticket("alloc-dup", 6).unwrap().is_none());

    let err = engine.allocate_batch("alloc-dup", &[7, 7]).unwrap_err();
    assert!(matches!(err, DrawError::DuplicateTicket { ticket_number: 7, .. }));
}

/// Selling a whole product ticket by ticket never oversells a tier and
/// awards exactly one last-one prize on the final ticket.
#[test]
fn sell_out_one_by_one() {
    let spec = sixty_ticket_product("alloc-sellout");
    let engine = make_engine(&spec);

    for n in (0..60).rev() {
        engine.allocate_batch("alloc-sellout", &[n]).unwrap();
        assert_counters_consistent(&engine, "alloc-sellout");
    }

    let tickets = engine.tickets("alloc-sellout").unwrap();
    let last_ones: Vec<_> = tickets.iter().filter(|t| t.last_one).collect();
    assert_eq!(last_ones.len(), 1);
    assert_eq!(last_ones[0].draw_position, 59);
    assert_eq!(last_ones[0].ticket_number, 0);
    assert_eq!(engine.product("alloc-sellout").unwrap().status, ProductStatus::SoldOut);
}

/// Random picks sell the product out through mixed batch sizes.
#[test]
fn random_batches_sell_out() {
    let spec = sixty_ticket_product("alloc-random");
    let engine = make_engine(&spec);
    let mut rng = PickRng::new(2024);

    let mut sold = 0;
    while sold < 60 {
        let want = (1 + rng.next_u64_below(7) as usize).min(60 - sold);
        let got = engine.allocate_random("alloc-random", want, &mut rng).unwrap();
        assert_eq!(got.len(), want);
        sold += want;
    }

    assert!(engine.available_numbers("alloc-random").unwrap().is_empty());
    let err = engine.allocate_random("alloc-random", 1, &mut rng).unwrap_err();
    assert!(matches!(err, DrawError::StockExceeded { .. }));
    assert_counters_consistent(&engine, "alloc-random");
    assert_eq!(
        engine.tickets("alloc-random").unwrap().iter().filter(|t| t.last_one).count(),
        1
    );
}

/// Within a batch later tickets see the depletion caused by earlier ones.
#[test]
fn batch_sees_its_own_depletion() {
    let spec = ProductSpec {
        product_id: "alloc-depletion".into(),
        title: "Depletion".into(),
        total_tickets: 5,
        profit_rate: 1.0,
        tiers: vec![tier("A", 1, 1000, 1), tier("B", 2, 1, 4)],
    };
    let engine = make_engine(&spec);

    let results = engine.allocate_batch("alloc-depletion", &[0, 1, 2, 3, 4]).unwrap();
    let a_count = results.iter().filter(|r| r.tier_id == "A").count();
    assert_eq!(a_count, 1, "A has a single unit regardless of its weight");

    let tickets = engine.tickets("alloc-depletion").unwrap();
    for (i, t) in tickets.iter().enumerate() {
        assert_eq!(t.draw_position, i as u64);
        assert_eq!(t.draw_snapshot.position, i as u64);
    }
    assert_counters_consistent(&engine, "alloc-depletion");
}

/// Catalog validation rejects products that could never sell out cleanly.
#[test]
fn invalid_catalog_is_rejected() {
    let engine = DrawEngine::in_memory().unwrap();
    let mut spec = three_ticket_product("alloc-invalid");
    spec.total_tickets = 10;
    let err = engine.create_product(&spec).unwrap_err();
    assert!(matches!(err, DrawError::InvalidCatalog { .. }), "got {err:?}");

    let ok = three_ticket_product("alloc-valid");
    engine.create_product(&ok).unwrap();
    assert_eq!(engine.store().product_ids().unwrap(), vec!["alloc-valid".to_string()]);
    let err = engine.create_product(&ok).unwrap_err();
    assert!(matches!(err, DrawError::InvalidCatalog { .. }), "got {err:?}");
}

/// Values SQLite cannot store are a catalog error, not a database error.
#[test]
fn oversized_weight_is_a_catalog_error() {
    let engine = DrawEngine::in_memory().unwrap();
    let mut spec = three_ticket_product("alloc-oversized");
    spec.tiers[0].weight = u64::MAX;
    let err = engine.create_product(&spec).unwrap_err();
    assert!(matches!(err, DrawError::InvalidCatalog { .. }), "got {err:?}");
    assert!(matches!(
        engine.product("alloc-oversized"),
        Err(DrawError::ProductNotFound { .. })
    ));
}

/// Every allocation is reflected in the event log.
#[test]
fn lifecycle_events_are_logged() {
    let spec = three_ticket_product("alloc-events");
    let engine = make_engine(&spec);
    engine.allocate_batch("alloc-events", &[0, 1]).unwrap();
    let _ = engine.allocate_batch("alloc-events", &[1]);
    engine.allocate_batch("alloc-events", &[2]).unwrap();

    let store = engine.store();
    assert_eq!(store.event_count("alloc-events", "product_created").unwrap(), 1);
    assert_eq!(store.event_count("alloc-events", "seed_committed").unwrap(), 1);
    assert_eq!(store.event_count("alloc-events", "batch_allocated").unwrap(), 2);
    assert_eq!(store.event_count("alloc-events", "batch_rejected").unwrap(), 1);
    assert_eq!(store.event_count("alloc-events", "product_sold_out").unwrap(), 1);

    let types: Vec<String> = store
        .events_for_product("alloc-events")
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            "product_created",
            "seed_committed",
            "batch_allocated",
            "batch_rejected",
            "batch_allocated",
            "product_sold_out",
        ]
    );
}

/// A rejected random checkout records how many tickets were asked for.
#[test]
fn rejected_random_checkout_records_request() {
    let spec = three_ticket_product("alloc-random-reject");
    let engine = make_engine(&spec);
    let err = engine
        .allocate_random("alloc-random-reject", 5, &mut PickRng::new(3))
        .unwrap_err();
    assert!(matches!(err, DrawError::StockExceeded { requested: 5, .. }), "got {err:?}");

    let rejected = engine
        .store()
        .events_for_product("alloc-random-reject")
        .unwrap()
        .into_iter()
        .find(|e| e.event_type == "batch_rejected")
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(&rejected.payload).unwrap();
    assert_eq!(payload["requested"], 5);
    assert_eq!(payload["ticket_numbers"], serde_json::json!([]));
}

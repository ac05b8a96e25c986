//! draw-runner: headless checkout simulation for the draw engine.
//!
//! Usage:
//!   draw-runner --data-dir ./data --seed 12345 --batch-max 5 --db run.db
//!   draw-runner --data-dir ./data --tickets 20          (close after 20 per product)
//!   draw-runner --verify <seed-hex> <ticket-number>     (re-derive one ticket)
//!   draw-runner --verify <seed-hex> <ticket-number> --db run.db --product kuji-spring-01

use anyhow::Result;
use kuji_core::{
    catalog::ProductStatus,
    commitment::hash_seed,
    config::CatalogConfig,
    derivation::{derive_ticket, parse_seed},
    engine::DrawEngine,
    rng::PickRng,
    store::DrawStore,
    verify::{self, AuditReport},
};
use std::env;

#[derive(serde::Serialize)]
struct ProductSummary {
    product_id:  String,
    seed_hash:   String,
    seed_hex:    String,
    sold:        u64,
    unsold:      u64,
    checkouts:   u64,
    rejected:    u64,
    tier_counts: Vec<(String, u64)>,
    audit:       AuditReport,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let batch_max = parse_arg(&args, "--batch-max", 5u64).max(1);
    let ticket_budget = parse_arg(&args, "--tickets", u64::MAX);
    let json = args.iter().any(|a| a == "--json");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");

    if let Some(pos) = args.iter().position(|a| a == "--verify") {
        let seed_hex = args
            .get(pos + 1)
            .ok_or_else(|| anyhow::anyhow!("--verify needs <seed-hex> <ticket-number>"))?;
        let ticket_number: u64 = args
            .get(pos + 2)
            .ok_or_else(|| anyhow::anyhow!("--verify needs <seed-hex> <ticket-number>"))?
            .parse()?;
        return run_verify(seed_hex, ticket_number, db, flag_value(&args, "--product"));
    }

    let config = CatalogConfig::load(data_dir)?;

    if !json {
        println!("Kuji draw-runner");
        println!("  seed:       {seed}");
        println!("  batch max:  {batch_max}");
        println!("  db:         {db}");
        println!("  data_dir:   {data_dir}");
        println!("  products:   {}", config.products.len());
        println!();
    }

    // For :memory: use a shared-memory URI so the file-style open path
    // (WAL pragma, busy timeout) is the same as for a real database.
    let db_effective: String = if db == ":memory:" {
        format!(
            "file:drawrun_{}?mode=memory&cache=shared",
            chrono::Utc::now().timestamp()
        )
    } else {
        db.to_string()
    };
    let store = DrawStore::open_with_timeout(&db_effective, config.engine.busy_timeout_ms)?;
    store.migrate()?;
    let engine = DrawEngine::new(store, config.engine.clone());

    let existing = engine.store().product_ids()?;
    let mut summaries = Vec::new();
    for (index, spec) in config.products.iter().enumerate() {
        if existing.contains(&spec.product_id) {
            log::warn!("product={} already in {db}, skipping", spec.product_id);
            continue;
        }
        engine.create_product(spec)?;
        let seed_hash = engine.commit(&spec.product_id)?;
        if !json {
            println!("{} committed: {seed_hash}", spec.product_id);
        }

        let mut rng = PickRng::for_worker(seed, index as u64);
        let summary = simulate(&engine, &spec.product_id, &mut rng, batch_max, ticket_budget)?;
        summaries.push(summary);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_summary(&summaries);
    }

    if summaries.iter().any(|s| !s.audit.is_clean()) {
        anyhow::bail!("audit failed for at least one product");
    }
    Ok(())
}

/// Buy random batches until sold out or the ticket budget is spent, then
/// close if needed, reveal and audit.
fn simulate(
    engine: &DrawEngine,
    product_id: &str,
    rng: &mut PickRng,
    batch_max: u64,
    ticket_budget: u64,
) -> Result<ProductSummary> {
    let mut sold = 0u64;
    let mut checkouts = 0u64;
    let mut rejected = 0u64;

    loop {
        let remaining = engine.product(product_id)?.remaining;
        if remaining == 0 || sold >= ticket_budget {
            break;
        }
        let want = (1 + rng.next_u64_below(batch_max))
            .min(remaining)
            .min(ticket_budget - sold);
        match engine.allocate_random(product_id, want as usize, rng) {
            Ok(results) => {
                checkouts += 1;
                sold += results.len() as u64;
                for r in results.iter().filter(|r| r.last_one) {
                    log::info!("product={product_id} ticket {} took the last-one prize", r.ticket_number);
                }
            }
            Err(e) if e.is_user_facing() || e.is_transient() => rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }

    if engine.product(product_id)?.status == ProductStatus::OnSale {
        engine.close(product_id)?;
    }
    let seed_hex = engine.reveal(product_id)?;
    let audit = engine.audit(product_id)?;

    let tickets = engine.tickets(product_id)?;
    let tier_counts = engine
        .tiers(product_id)?
        .into_iter()
        .map(|t| {
            let n = tickets.iter().filter(|r| r.tier_id == t.tier_id).count() as u64;
            (t.tier_id, n)
        })
        .collect();

    Ok(ProductSummary {
        product_id: product_id.to_string(),
        seed_hash: audit.seed_hash.clone(),
        seed_hex,
        sold,
        unsold: audit.remaining,
        checkouts,
        rejected,
        tier_counts,
        audit,
    })
}

/// Re-derive one ticket from a revealed seed. With `--db` and `--product`,
/// also check it against the stored record.
fn run_verify(seed_hex: &str, ticket_number: u64, db: &str, product: Option<&str>) -> Result<()> {
    let seed = parse_seed(seed_hex)?;
    let derived = derive_ticket(&seed, ticket_number);
    println!("=== TICKET {ticket_number} ===");
    println!("  seed hash:    {}", hash_seed(&seed));
    println!("  random value: {}", derived.random_value);
    println!("  ticket hash:  {}", derived.ticket_hash);

    let (Some(product_id), false) = (product, db == ":memory:") else {
        return Ok(());
    };
    let store = DrawStore::open(db)?;
    let record = store
        .ticket(product_id, ticket_number)?
        .ok_or_else(|| anyhow::anyhow!("ticket {ticket_number} of {product_id} not found in {db}"))?;
    let v = verify::verify_ticket(seed_hex, &record)?;
    println!("  recorded:     {} (last one: {})", v.recorded_tier, record.last_one);
    println!("  recomputed:   {}", v.recomputed_tier);
    println!("  commitment:   {}", ok(v.commitment_matches));
    println!("  value:        {}", ok(v.random_value_matches));
    println!("  hash:         {}", ok(v.hash_matches));
    println!("  tier:         {}", ok(v.tier_matches));
    if !v.is_valid() {
        anyhow::bail!("ticket {ticket_number} of {product_id} does not verify");
    }
    Ok(())
}

fn print_summary(summaries: &[ProductSummary]) {
    println!();
    println!("=== RUN SUMMARY ===");
    for s in summaries {
        println!("  {}", s.product_id);
        println!("    sold / unsold:  {} / {}", s.sold, s.unsold);
        println!("    checkouts:      {} ({} rejected)", s.checkouts, s.rejected);
        for (tier_id, n) in &s.tier_counts {
            println!("    {tier_id:<14}  {n}");
        }
        println!("    seed hash:      {}", s.seed_hash);
        println!("    seed:           {}", s.seed_hex);
        println!(
            "    audit:          {} ({} tickets checked)",
            if s.audit.is_clean() { "CLEAN" } else { "FAILED" },
            s.audit.tickets_checked
        );
    }
}

fn ok(matches: bool) -> &'static str {
    if matches { "ok" } else { "MISMATCH" }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

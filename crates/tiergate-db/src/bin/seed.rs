//! # Seed Data Generator
//!
//! Populates a ledger database with accounts spread across the standard
//! discount bands, plus a handful of transfer records per account.
//!
//! ## Usage
//! ```bash
//! # Seed 200 accounts (default)
//! cargo run -p tiergate-db --bin seed
//!
//! # Custom amount and database path
//! cargo run -p tiergate-db --bin seed -- --accounts 1000 --db ./data/tiergate.db
//! ```
//!
//! ## Generated Accounts
//! Account ids are deterministic (`00000000-0000-0000-0000-<index>`), so
//! re-running against a fresh file gives the same data. Counts cycle through
//! values on both sides of every standard threshold (0, 4, 5, 9, 10, 19, 20,
//! 57).

use chrono::{Duration, Utc};
use std::env;
use tiergate_core::{
    AccountId, Amount, PurchaseCount, TraceId, TransferRecord, TransferRequest, MAX_BATCH_SIZE,
};
use tiergate_db::{Database, DbConfig};

/// Purchase counts straddling the standard tier thresholds
const BAND_COUNTS: &[PurchaseCount] = &[0, 4, 5, 9, 10, 19, 20, 57];

/// Records generated per account (capped by its count)
const RECORDS_PER_ACCOUNT: u64 = 3;

/// Source and destination used for every seeded record
const TREASURY: AccountId = AccountId::from_u128(0xFFFF_0001);
const MERCHANT: AccountId = AccountId::from_u128(0xFFFF_0002);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut accounts: usize = 200;
    let mut db_path = String::from("./tiergate_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--accounts" | "-a" => {
                if i + 1 < args.len() {
                    accounts = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("TierGate Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -a, --accounts <N>  Number of accounts to generate (default: 200)");
                println!("  -d, --db <PATH>     Database file path (default: ./tiergate_dev.db)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 TierGate Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Accounts: {}", accounts);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.purchases().count_accounts().await?;
    if existing > 0 {
        println!("⚠ Database already has {} accounts", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating accounts...");
    let start = std::time::Instant::now();

    let entries: Vec<(AccountId, PurchaseCount)> = (0..accounts)
        .map(|idx| {
            let account = AccountId::from_u128(idx as u128 + 1);
            (account, BAND_COUNTS[idx % BAND_COUNTS.len()])
        })
        .collect();

    for chunk in entries.chunks(MAX_BATCH_SIZE) {
        db.purchases().bulk_set(chunk).await?;
    }

    let mut records = 0;
    let now = Utc::now();
    for (idx, (account, count)) in entries.iter().enumerate() {
        for n in 0..(*count).min(RECORDS_PER_ACCOUNT) {
            let record = generate_record(*account, idx, n, now - Duration::hours(n as i64));
            if let Err(e) = db.transfers().insert(&record).await {
                eprintln!("Failed to insert {}: {}", record.trace_id, e);
                continue;
            }
            records += 1;
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Generated {} accounts and {} records in {:?}",
        entries.len(),
        records,
        elapsed
    );

    println!();
    println!("Top accounts:");
    for stats in db.purchases().top(5).await? {
        println!("  {}  {} purchases", stats.account, stats.purchase_count);
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds one historical record for `account`.
fn generate_record(
    account: AccountId,
    idx: usize,
    n: u64,
    at: chrono::DateTime<Utc>,
) -> TransferRecord {
    let seed = idx as u64 * 31 + n;
    let amount = Amount::from_units(500 + (seed * 37) % 4_500);
    let trace_id = TraceId::from_u128(((idx as u128 + 1) << 32) | n as u128);

    let request = TransferRequest::new(
        account,
        TREASURY,
        MERCHANT,
        amount,
        format!("seed purchase #{}", n + 1),
        trace_id,
    )
    .with_aux(seed, 0);

    // Seeded history is charged at full price
    TransferRecord::from_request(&request, amount, n, at)
}

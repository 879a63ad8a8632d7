//! Print recent finished rounds and ledger journal entries from a database

use clap::Parser;
use crashline::ledger::RocksLedger;
use crashline::round_store::{RocksRoundStore, RoundStore};
use crashline::storage::OptimizedStorage;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "inspect_rounds")]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/crash_data")]
    db_path: String,

    /// Number of rounds to show
    #[arg(long, default_value = "10")]
    limit: usize,

    /// Also dump the ledger journal
    #[arg(long)]
    journal: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !Path::new(&args.db_path).exists() {
        println!("❌ No data found at {}", args.db_path);
        return Ok(());
    }

    let storage = OptimizedStorage::new(&args.db_path)?;
    let store = RocksRoundStore::new(storage.clone());

    println!("🔍 Round Inspector");
    println!("==================");

    let rounds = store.recent(args.limit).await?;
    if rounds.is_empty() {
        println!("   (no finished rounds)");
    }
    for round in &rounds {
        println!("💥 Round {}", round.id);
        println!("   Started:    {}", round.start_time);
        println!("   Duration:   {}ms", round.duration);
        println!("   Multiplier: {}x", round.multiplier);
        println!("   Players:    {} ({} won)", round.players, round.winners);
        println!();
    }

    if args.journal {
        let ledger = RocksLedger::new(storage);
        println!("📒 Ledger journal");
        for entry in ledger.journal_entries(args.limit)? {
            println!(
                "   {} {:?} {} {} {} -> {} ({}, round {})",
                entry.recorded_at,
                entry.kind,
                entry.wallet,
                entry.amount,
                entry.currency,
                entry.balance_after,
                entry.reason,
                entry.round_id
            );
        }
    }

    Ok(())
}

//! Gunny CLI - gunny-bag allocation and downgrade ledger
//!
//! Usage: gunny <COMMAND>
//!
//! Commands:
//!   intake   Record a grain intake receipt with per-grade capacities
//!   deposit  Record a deposit drawing bags from a receipt
//!   edit     Re-allocate an existing deposit transaction
//!   remove   Delete a deposit transaction, releasing its bags
//!   status   Show capacity, usage and remaining bags for a receipt

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gunny::engine::ReceiptStatus;
use gunny::{
    AllocationDraft, DepositEngine, DepositLedger, DepositTransaction, FileStore, Grade,
    GrainReceipt, GunnyConfig, GunnyError, ReceiptStore,
};

mod cli;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli) {
        report_error(&err, json);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = GunnyConfig::load(&cwd)?;
    let store_path: PathBuf = cli.store.clone().unwrap_or_else(|| config.store_path());

    let options = config.engine_options();
    let store = FileStore::new(store_path);
    // Held for the whole command so validate-then-commit is serialized
    // against other gunny processes sharing the store file. Bounded: a
    // stalled holder surfaces as retriable contention, not a hang.
    let _lock = store.lock_exclusive(options.lock_timeout)?;
    let engine = DepositEngine::with_options(store, options);

    match &cli.command {
        Commands::Intake {
            branch,
            nb,
            onb,
            ss,
            swp,
        } => {
            let capacity = AllocationDraft::new(*nb, *onb, *ss, *swp).validate()?;
            let receipt = engine.store().add_receipt(branch, capacity).map_err(storage)?;
            print_receipt(&receipt, cli.json);
        }
        Commands::Deposit {
            receipt_id,
            nb,
            onb,
            ss,
            swp,
        } => {
            let draft = AllocationDraft::new(*nb, *onb, *ss, *swp);
            let txn = engine.create_deposit_with_retry(receipt_id, &draft)?;
            print_transaction("Deposit", &txn, cli.json);
        }
        Commands::Edit {
            transaction_id,
            nb,
            onb,
            ss,
            swp,
        } => {
            let draft = AllocationDraft::new(*nb, *onb, *ss, *swp);
            let txn = engine.update_deposit_with_retry(transaction_id, &draft)?;
            print_transaction("Updated", &txn, cli.json);
        }
        Commands::Remove { transaction_id } => {
            let removed = engine.delete_deposit(transaction_id)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "removed": removed.id, "receipt_id": removed.receipt_id })
                );
            } else {
                println!(
                    "✓ Removed {} ({} bags returned to {})",
                    removed.id,
                    removed.allocation.total(),
                    removed.receipt_id
                );
            }
        }
        Commands::Status { receipt_id } => {
            let status = engine.receipt_status(receipt_id)?;
            print_status(&status, engine.store(), cli.json)?;
        }
    }

    Ok(())
}

fn storage(err: gunny::StoreError) -> GunnyError {
    match err {
        gunny::StoreError::NotFound { id } => GunnyError::ReceiptNotFound { id },
        gunny::StoreError::Unavailable { message } => GunnyError::Storage { message },
    }
}

fn print_receipt(receipt: &GrainReceipt, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(receipt).unwrap_or_default()
        );
        return;
    }
    println!(
        "✓ Receipt {} recorded for branch {} ({} bags)",
        receipt.id, receipt.branch, receipt.total_bags
    );
    println!(
        "  NB {}  ONB {}  SS {}  SWP {}",
        receipt.capacity.nb, receipt.capacity.onb, receipt.capacity.ss, receipt.capacity.swp
    );
}

fn print_transaction(verb: &str, txn: &DepositTransaction, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(txn).unwrap_or_default());
        return;
    }
    println!("✓ {} {} against {}", verb, txn.id, txn.receipt_id);
    println!(
        "  drawn:  NB {}  ONB {}  SS {}  SWP {}",
        txn.allocation.nb, txn.allocation.onb, txn.allocation.ss, txn.allocation.swp
    );
    println!(
        "  output: ONB {}  SS {}  SWP {}",
        txn.output.onb, txn.output.ss, txn.output.swp
    );
}

fn print_status(status: &ReceiptStatus, ledger: &impl DepositLedger, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(status).unwrap_or_default()
        );
        return Ok(());
    }

    let receipt = &status.receipt;
    println!(
        "Receipt {} (branch {}, {} bags)",
        receipt.id, receipt.branch, receipt.total_bags
    );
    println!("  {:<6} {:>9} {:>6} {:>10}", "grade", "capacity", "used", "remaining");
    for grade in Grade::ALL {
        println!(
            "  {:<6} {:>9} {:>6} {:>10}",
            grade.to_string(),
            receipt.capacity.get(grade),
            status.used.get(grade),
            status.remaining.get(grade)
        );
    }

    let transactions = ledger.transactions_for(&receipt.id).map_err(storage)?;
    if transactions.is_empty() {
        println!("  no deposit transactions");
    } else {
        println!("  {} deposit transaction(s):", transactions.len());
        for txn in transactions {
            println!(
                "    {}  NB {}  ONB {}  SS {}  SWP {}",
                txn.id, txn.allocation.nb, txn.allocation.onb, txn.allocation.ss, txn.allocation.swp
            );
        }
    }
    Ok(())
}

fn report_error(err: &anyhow::Error, json: bool) {
    if json {
        let (kind, retriable) = match err.downcast_ref::<GunnyError>() {
            Some(gunny_err) => (gunny_err.kind(), gunny_err.is_retriable()),
            None => ("storage", false),
        };
        eprintln!(
            "{}",
            serde_json::json!({
                "error": err.to_string(),
                "kind": kind,
                "retriable": retriable,
            })
        );
    } else {
        eprintln!("✗ {}", err);
    }
}

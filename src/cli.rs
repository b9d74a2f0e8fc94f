use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Gunny - gunny-bag allocation and downgrade ledger
#[derive(Parser, Debug)]
#[command(name = "gunny")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the mill state file (overrides config and GUNNY_STORE)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a grain intake receipt with per-grade bag capacities
    Intake {
        /// Branch the receipt belongs to
        #[arg(long, default_value = "main")]
        branch: String,

        /// New bags received
        #[arg(long, default_value_t = 0)]
        nb: i64,

        /// Once-used new bags received
        #[arg(long, default_value_t = 0)]
        onb: i64,

        /// Second-sort bags received
        #[arg(long, default_value_t = 0)]
        ss: i64,

        /// Worn-out bags received
        #[arg(long, default_value_t = 0)]
        swp: i64,
    },

    /// Record a deposit drawing bags from a receipt
    Deposit {
        /// Receipt to draw from
        receipt_id: String,

        #[arg(long, default_value_t = 0)]
        nb: i64,

        #[arg(long, default_value_t = 0)]
        onb: i64,

        #[arg(long, default_value_t = 0)]
        ss: i64,

        #[arg(long, default_value_t = 0)]
        swp: i64,
    },

    /// Re-allocate an existing deposit transaction
    Edit {
        /// Transaction to re-allocate
        transaction_id: String,

        #[arg(long, default_value_t = 0)]
        nb: i64,

        #[arg(long, default_value_t = 0)]
        onb: i64,

        #[arg(long, default_value_t = 0)]
        ss: i64,

        #[arg(long, default_value_t = 0)]
        swp: i64,
    },

    /// Delete a deposit transaction, releasing its bags
    Remove {
        /// Transaction to delete
        transaction_id: String,
    },

    /// Show capacity, committed usage and remaining bags for a receipt
    Status {
        /// Receipt to inspect
        receipt_id: String,
    },
}

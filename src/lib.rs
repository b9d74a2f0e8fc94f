//! Gunny - gunny-bag grade allocation and downgrade ledger
//!
//! Gunny tracks how the jute sacks received with a grain intake batch
//! (graded NB, ONB, SS, SWP from newest to most worn) are drawn down by
//! later deposit transactions. Every accepted allocation gets a
//! deterministic one-step quality downgrade, and the sum of allocations
//! per grade across a receipt's transactions never exceeds what the
//! receipt brought in - enforced under concurrent submissions via a
//! per-receipt critical section.

pub mod config;
pub mod downgrade;
pub mod engine;
pub mod error;
pub mod filestore;
pub mod models;
pub mod store;
pub mod usage;
pub mod validator;

// Re-exports for convenience
pub use config::GunnyConfig;
pub use downgrade::downgrade;
pub use engine::{DepositEngine, EngineOptions, ReceiptStatus};
pub use error::{GunnyError, GunnyResult};
pub use filestore::{FileStore, StoreLock};
pub use models::{
    Allocation, AllocationDraft, DepositTransaction, DowngradeOutput, Grade, GrainReceipt,
};
pub use store::{DepositLedger, MemoryStore, ReceiptStore, StoreError};
pub use usage::committed_usage;
pub use validator::{check_capacity, remaining};

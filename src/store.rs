//! Storage ports and the in-memory store
//!
//! The ledger logic never talks to a concrete database. It goes through
//! two traits: `ReceiptStore` for the intake side (read-only as far as the
//! allocation subsystem is concerned) and `DepositLedger` for committed
//! deposit transactions. `MemoryStore` implements both and backs unit and
//! concurrency tests; `FileStore` (see `filestore`) is the on-disk
//! implementation used by the CLI.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Allocation, DepositTransaction, DowngradeOutput, GrainReceipt};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation errors.
///
/// `NotFound` maps to a business not-found error at the engine boundary;
/// `Unavailable` is an infrastructure failure and stays fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record '{id}' not found")]
    NotFound { id: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

/// Read access to grain receipts and their capacity pools
pub trait ReceiptStore {
    /// Look up a receipt by id
    fn receipt(&self, id: &str) -> StoreResult<GrainReceipt>;

    /// Record a new intake receipt and assign it an id
    fn add_receipt(&self, branch: &str, capacity: Allocation) -> StoreResult<GrainReceipt>;
}

/// Persistence for committed deposit transactions.
///
/// Each write (`insert`, `update`, `remove`) must be atomic: a failed call
/// leaves the ledger exactly as it was. Removed transactions no longer
/// appear in `allocations_for`, which implicitly releases their bags back
/// to the receipt's remaining capacity.
pub trait DepositLedger {
    /// Look up a transaction by id
    fn transaction(&self, id: &str) -> StoreResult<DepositTransaction>;

    /// Committed allocations referencing a receipt, optionally excluding
    /// one transaction (used when re-validating an edit against its own
    /// prior committed state)
    fn allocations_for(&self, receipt_id: &str, exclude: Option<&str>)
        -> StoreResult<Vec<Allocation>>;

    /// All committed transactions referencing a receipt
    fn transactions_for(&self, receipt_id: &str) -> StoreResult<Vec<DepositTransaction>>;

    /// Persist a new accepted transaction, assigning id and timestamps
    fn insert(
        &self,
        receipt_id: &str,
        allocation: Allocation,
        output: DowngradeOutput,
    ) -> StoreResult<DepositTransaction>;

    /// Replace the allocation and output of an existing transaction
    fn update(
        &self,
        id: &str,
        allocation: Allocation,
        output: DowngradeOutput,
    ) -> StoreResult<DepositTransaction>;

    /// Delete a transaction, returning the removed record
    fn remove(&self, id: &str) -> StoreResult<DepositTransaction>;
}

pub(crate) fn receipt_id(n: u64) -> String {
    format!("GR-{:06}", n)
}

pub(crate) fn transaction_id(n: u64) -> String {
    format!("DT-{:06}", n)
}

/// In-memory store implementing both ports.
///
/// Clones share state through `Arc<RwLock<_>>`, so a `MemoryStore` can be
/// handed to threads exercising the engine concurrently.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    receipts: Vec<GrainReceipt>,
    transactions: Vec<DepositTransaction>,
    next_receipt: u64,
    next_transaction: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReceiptStore for MemoryStore {
    fn receipt(&self, id: &str) -> StoreResult<GrainReceipt> {
        let inner = self.inner.read();
        inner
            .receipts
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    fn add_receipt(&self, branch: &str, capacity: Allocation) -> StoreResult<GrainReceipt> {
        let mut inner = self.inner.write();
        inner.next_receipt += 1;
        let receipt = GrainReceipt::new(receipt_id(inner.next_receipt), branch, capacity);
        inner.receipts.push(receipt.clone());
        Ok(receipt)
    }
}

impl DepositLedger for MemoryStore {
    fn transaction(&self, id: &str) -> StoreResult<DepositTransaction> {
        let inner = self.inner.read();
        inner
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    fn allocations_for(
        &self,
        receipt_id: &str,
        exclude: Option<&str>,
    ) -> StoreResult<Vec<Allocation>> {
        let inner = self.inner.read();
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.receipt_id == receipt_id && Some(t.id.as_str()) != exclude)
            .map(|t| t.allocation)
            .collect())
    }

    fn transactions_for(&self, receipt_id: &str) -> StoreResult<Vec<DepositTransaction>> {
        let inner = self.inner.read();
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.receipt_id == receipt_id)
            .cloned()
            .collect())
    }

    fn insert(
        &self,
        receipt_id: &str,
        allocation: Allocation,
        output: DowngradeOutput,
    ) -> StoreResult<DepositTransaction> {
        let mut inner = self.inner.write();
        if !inner.receipts.iter().any(|r| r.id == receipt_id) {
            return Err(StoreError::NotFound {
                id: receipt_id.to_string(),
            });
        }
        inner.next_transaction += 1;
        let now = Utc::now();
        let txn = DepositTransaction {
            id: transaction_id(inner.next_transaction),
            receipt_id: receipt_id.to_string(),
            allocation,
            output,
            created_at: now,
            updated_at: now,
        };
        inner.transactions.push(txn.clone());
        Ok(txn)
    }

    fn update(
        &self,
        id: &str,
        allocation: Allocation,
        output: DowngradeOutput,
    ) -> StoreResult<DepositTransaction> {
        let mut inner = self.inner.write();
        let txn = inner
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        txn.allocation = allocation;
        txn.output = output;
        txn.updated_at = Utc::now();
        Ok(txn.clone())
    }

    fn remove(&self, id: &str) -> StoreResult<DepositTransaction> {
        let mut inner = self.inner.write();
        let pos = inner
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        Ok(inner.transactions.remove(pos))
    }
}

//! Deposit engine: validate-then-commit under a per-receipt lock
//!
//! Validation is a read (aggregate committed sibling usage) followed by a
//! write (persist the accepted allocation). Two concurrent submissions
//! against the same receipt could both read the same pre-commit snapshot
//! and both be accepted, so the engine serializes the whole
//! aggregate-check-commit sequence per receipt. Operations on different
//! receipts never block each other.
//!
//! The critical section is short (one aggregation read, four comparisons,
//! one write) and lock acquisition has a bounded timeout; on timeout the
//! operation returns a retriable [`GunnyError::Contention`] instead of
//! blocking indefinitely. Rejection at any point leaves no partial state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::downgrade::downgrade;
use crate::error::{GunnyError, GunnyResult};
use crate::models::{Allocation, AllocationDraft, DepositTransaction, GrainReceipt};
use crate::store::{DepositLedger, ReceiptStore, StoreError};
use crate::usage::committed_usage;
use crate::validator::{check_capacity, remaining};

/// Tuning knobs for the deposit engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How long to wait for the per-receipt lock before reporting
    /// `Contention`
    pub lock_timeout: Duration,
    /// Automatic retries of `Contention` in the `*_with_retry` operations
    pub contention_retries: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2000),
            contention_retries: 3,
        }
    }
}

/// Capacity, committed usage and remaining headroom for one receipt
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptStatus {
    pub receipt: GrainReceipt,
    pub used: Allocation,
    pub remaining: Allocation,
    pub deposits: usize,
}

/// Allocation engine over a receipt store and deposit ledger.
///
/// Generic over the storage implementation; `MemoryStore` and `FileStore`
/// both satisfy the bound. The engine owns a lazily-populated map of
/// per-receipt locks, so a single engine instance must front all writers
/// within a process; idle entries are pruned on each acquisition, so the
/// map stays bounded by the receipts currently in flight. Cross-process
/// callers additionally hold the store's file lock (see
/// `FileStore::lock_exclusive`).
pub struct DepositEngine<S> {
    store: S,
    options: EngineOptions,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: ReceiptStore + DepositLedger> DepositEngine<S> {
    /// Create an engine with default options
    pub fn new(store: S) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: S, options: EngineOptions) -> Self {
        Self {
            store,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Direct access to the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a new deposit transaction against a receipt.
    ///
    /// Validates the draft, serializes against sibling writers on the same
    /// receipt, checks per-grade capacity, computes the downgraded output
    /// and persists. Rejection at any step is a typed error with no state
    /// change.
    pub fn create_deposit(
        &self,
        receipt_id: &str,
        draft: &AllocationDraft,
    ) -> GunnyResult<DepositTransaction> {
        let allocation = draft.validate()?;
        let receipt = self
            .store
            .receipt(receipt_id)
            .map_err(|e| receipt_error(receipt_id, e))?;

        let lock = self.receipt_lock(receipt_id);
        let _guard = lock
            .try_lock_for(self.options.lock_timeout)
            .ok_or_else(|| GunnyError::Contention {
                resource: receipt_id.to_string(),
            })?;

        let usage = committed_usage(&self.store, receipt_id, None)
            .map_err(|e| receipt_error(receipt_id, e))?;
        check_capacity(&allocation, &receipt.capacity, &usage)?;

        let output = downgrade(&allocation);
        self.store
            .insert(receipt_id, allocation, output)
            .map_err(|e| receipt_error(receipt_id, e))
    }

    /// Re-allocate an existing deposit transaction.
    ///
    /// The transaction re-enters validation against its siblings with its
    /// own prior committed allocation excluded, so shrinking an allocation
    /// frees headroom and growing one is checked against what is actually
    /// left.
    pub fn update_deposit(
        &self,
        transaction_id: &str,
        draft: &AllocationDraft,
    ) -> GunnyResult<DepositTransaction> {
        let allocation = draft.validate()?;
        let prior = self
            .store
            .transaction(transaction_id)
            .map_err(|e| transaction_error(transaction_id, e))?;
        let receipt = self
            .store
            .receipt(&prior.receipt_id)
            .map_err(|e| receipt_error(&prior.receipt_id, e))?;

        let lock = self.receipt_lock(&prior.receipt_id);
        let _guard = lock
            .try_lock_for(self.options.lock_timeout)
            .ok_or_else(|| GunnyError::Contention {
                resource: prior.receipt_id.clone(),
            })?;

        let usage = committed_usage(&self.store, &prior.receipt_id, Some(transaction_id))
            .map_err(|e| receipt_error(&prior.receipt_id, e))?;
        check_capacity(&allocation, &receipt.capacity, &usage)?;

        let output = downgrade(&allocation);
        self.store
            .update(transaction_id, allocation, output)
            .map_err(|e| transaction_error(transaction_id, e))
    }

    /// Delete a deposit transaction, returning the removed record.
    ///
    /// The aggregator only sums stored transactions, so deletion releases
    /// the allocation back to the receipt's remaining capacity. This is an
    /// inferred business rule; see DESIGN.md.
    pub fn delete_deposit(&self, transaction_id: &str) -> GunnyResult<DepositTransaction> {
        let prior = self
            .store
            .transaction(transaction_id)
            .map_err(|e| transaction_error(transaction_id, e))?;

        let lock = self.receipt_lock(&prior.receipt_id);
        let _guard = lock
            .try_lock_for(self.options.lock_timeout)
            .ok_or_else(|| GunnyError::Contention {
                resource: prior.receipt_id.clone(),
            })?;

        self.store
            .remove(transaction_id)
            .map_err(|e| transaction_error(transaction_id, e))
    }

    /// `create_deposit` with bounded automatic retry on `Contention`.
    ///
    /// `CapacityExceeded` and other non-retriable errors surface
    /// immediately; after the configured retries, `Contention` itself
    /// surfaces.
    pub fn create_deposit_with_retry(
        &self,
        receipt_id: &str,
        draft: &AllocationDraft,
    ) -> GunnyResult<DepositTransaction> {
        self.retry(|| self.create_deposit(receipt_id, draft))
    }

    /// `update_deposit` with bounded automatic retry on `Contention`
    pub fn update_deposit_with_retry(
        &self,
        transaction_id: &str,
        draft: &AllocationDraft,
    ) -> GunnyResult<DepositTransaction> {
        self.retry(|| self.update_deposit(transaction_id, draft))
    }

    /// Capacity, usage and remaining headroom for a receipt
    pub fn receipt_status(&self, receipt_id: &str) -> GunnyResult<ReceiptStatus> {
        let receipt = self
            .store
            .receipt(receipt_id)
            .map_err(|e| receipt_error(receipt_id, e))?;
        let used = committed_usage(&self.store, receipt_id, None)
            .map_err(|e| receipt_error(receipt_id, e))?;
        let deposits = self
            .store
            .transactions_for(receipt_id)
            .map_err(|e| receipt_error(receipt_id, e))?
            .len();
        Ok(ReceiptStatus {
            remaining: remaining(&receipt.capacity, &used),
            receipt,
            used,
            deposits,
        })
    }

    fn receipt_lock(&self, receipt_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        // Entries no operation holds have a strong count of 1 (the map's
        // own Arc); dropping them keeps the map bounded by the number of
        // receipts currently in flight.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(receipt_id.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }

    fn retry<T>(&self, op: impl Fn() -> GunnyResult<T>) -> GunnyResult<T> {
        let mut attempts = 0;
        loop {
            match op() {
                Err(err) if err.is_retriable() && attempts < self.options.contention_retries => {
                    attempts += 1;
                }
                other => return other,
            }
        }
    }
}

fn receipt_error(receipt_id: &str, err: StoreError) -> GunnyError {
    match err {
        StoreError::NotFound { .. } => GunnyError::ReceiptNotFound {
            id: receipt_id.to_string(),
        },
        StoreError::Unavailable { message } => GunnyError::Storage { message },
    }
}

fn transaction_error(transaction_id: &str, err: StoreError) -> GunnyError {
    match err {
        StoreError::NotFound { .. } => GunnyError::TransactionNotFound {
            id: transaction_id.to_string(),
        },
        StoreError::Unavailable { message } => GunnyError::Storage { message },
    }
}

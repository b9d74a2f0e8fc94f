//! JSON file-backed store
//!
//! Persists the whole mill state (receipts plus deposit transactions) as a
//! single pretty-printed JSON document. Writes go through a tempfile and
//! an atomic rename, so a crash mid-save never leaves a torn file.
//!
//! Locking happens at two levels:
//! - an in-process mutex serializes load-modify-save cycles between
//!   threads sharing one `FileStore` (clones share the mutex);
//! - an advisory `fs2` file lock (`<store>.lock`), taken via
//!   [`FileStore::lock_exclusive`] with a bounded timeout, serializes
//!   whole commands across processes. The CLI acquires it before running
//!   the engine so the validate-then-commit sequence is safe against a
//!   second process; if the holder stalls past the timeout, the caller
//!   gets a retriable `Contention` error instead of waiting forever.

use fs2::FileExt;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{GunnyError, GunnyResult};
use crate::models::{Allocation, DepositTransaction, DowngradeOutput, GrainReceipt};
use crate::store::{
    receipt_id, transaction_id, DepositLedger, ReceiptStore, StoreError, StoreResult,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MillState {
    #[serde(default)]
    receipts: Vec<GrainReceipt>,
    #[serde(default)]
    transactions: Vec<DepositTransaction>,
    #[serde(default)]
    next_receipt: u64,
    #[serde(default)]
    next_transaction: u64,
}

/// File-backed store implementing both storage ports.
///
/// A missing file reads as an empty state; the file is created on first
/// write.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    state_lock: Arc<Mutex<()>>,
}

/// Guard for the cross-process advisory lock; unlocks on drop
#[derive(Debug)]
pub struct StoreLock {
    file: fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Take the advisory file lock, polling until `timeout` elapses.
    ///
    /// Hold the returned guard for the duration of a validate-then-commit
    /// sequence when other processes may share the store file. If the lock
    /// stays held past the timeout, the caller gets a retriable
    /// [`GunnyError::Contention`] instead of blocking indefinitely.
    pub fn lock_exclusive(&self, timeout: Duration) -> GunnyResult<StoreLock> {
        fs::create_dir_all(self.parent_dir()).map_err(lock_failure)?;
        let file = fs::File::create(self.lock_path()).map_err(lock_failure)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { file }),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(GunnyError::Contention {
                            resource: self.path.display().to_string(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL.min(timeout));
                }
                Err(err) => return Err(lock_failure(err)),
            }
        }
    }

    fn load(&self) -> StoreResult<MillState> {
        if !self.path.exists() {
            return Ok(MillState::default());
        }
        let content = fs::read_to_string(&self.path).map_err(unavailable)?;
        serde_json::from_str(&content).map_err(|e| StoreError::Unavailable {
            message: format!("corrupted store {}: {}", self.path.display(), e),
        })
    }

    fn save(&self, state: &MillState) -> StoreResult<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(&parent).map_err(unavailable)?;
        let content = serde_json::to_string_pretty(state).map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(unavailable)?;
        tmp.write_all(content.as_bytes()).map_err(unavailable)?;
        tmp.persist(&self.path).map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn read<T>(&self, op: impl FnOnce(&MillState) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.state_lock.lock();
        let state = self.load()?;
        op(&state)
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut MillState) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.state_lock.lock();
        let mut state = self.load()?;
        let value = op(&mut state)?;
        self.save(&state)?;
        Ok(value)
    }
}

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

fn unavailable(err: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        message: err.to_string(),
    }
}

fn lock_failure(err: std::io::Error) -> GunnyError {
    GunnyError::Storage {
        message: err.to_string(),
    }
}

impl ReceiptStore for FileStore {
    fn receipt(&self, id: &str) -> StoreResult<GrainReceipt> {
        self.read(|state| {
            state
                .receipts
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
        })
    }

    fn add_receipt(&self, branch: &str, capacity: Allocation) -> StoreResult<GrainReceipt> {
        self.mutate(|state| {
            state.next_receipt += 1;
            let receipt = GrainReceipt::new(receipt_id(state.next_receipt), branch, capacity);
            state.receipts.push(receipt.clone());
            Ok(receipt)
        })
    }
}

impl DepositLedger for FileStore {
    fn transaction(&self, id: &str) -> StoreResult<DepositTransaction> {
        self.read(|state| {
            state
                .transactions
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
        })
    }

    fn allocations_for(
        &self,
        receipt_id: &str,
        exclude: Option<&str>,
    ) -> StoreResult<Vec<Allocation>> {
        self.read(|state| {
            Ok(state
                .transactions
                .iter()
                .filter(|t| t.receipt_id == receipt_id && Some(t.id.as_str()) != exclude)
                .map(|t| t.allocation)
                .collect())
        })
    }

    fn transactions_for(&self, receipt_id: &str) -> StoreResult<Vec<DepositTransaction>> {
        self.read(|state| {
            Ok(state
                .transactions
                .iter()
                .filter(|t| t.receipt_id == receipt_id)
                .cloned()
                .collect())
        })
    }

    fn insert(
        &self,
        receipt_id: &str,
        allocation: Allocation,
        output: DowngradeOutput,
    ) -> StoreResult<DepositTransaction> {
        self.mutate(|state| {
            if !state.receipts.iter().any(|r| r.id == receipt_id) {
                return Err(StoreError::NotFound {
                    id: receipt_id.to_string(),
                });
            }
            state.next_transaction += 1;
            let now = chrono::Utc::now();
            let txn = DepositTransaction {
                id: transaction_id(state.next_transaction),
                receipt_id: receipt_id.to_string(),
                allocation,
                output,
                created_at: now,
                updated_at: now,
            };
            state.transactions.push(txn.clone());
            Ok(txn)
        })
    }

    fn update(
        &self,
        id: &str,
        allocation: Allocation,
        output: DowngradeOutput,
    ) -> StoreResult<DepositTransaction> {
        self.mutate(|state| {
            let txn = state
                .transactions
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
            txn.allocation = allocation;
            txn.output = output;
            txn.updated_at = chrono::Utc::now();
            Ok(txn.clone())
        })
    }

    fn remove(&self, id: &str) -> StoreResult<DepositTransaction> {
        self.mutate(|state| {
            let pos = state
                .transactions
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
            Ok(state.transactions.remove(pos))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downgrade::downgrade;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_reads_as_empty_store() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("gunny.json"));
        assert!(matches!(
            store.receipt("GR-000001"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gunny.json");

        let store = FileStore::new(&path);
        let receipt = store
            .add_receipt("main", Allocation::new(100, 10, 5, 0))
            .unwrap();
        let alloc = Allocation::new(60, 5, 0, 0);
        let txn = store.insert(&receipt.id, alloc, downgrade(&alloc)).unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.receipt(&receipt.id).unwrap(), receipt);
        assert_eq!(reopened.transaction(&txn.id).unwrap(), txn);
        assert_eq!(
            reopened.allocations_for(&receipt.id, None).unwrap(),
            vec![alloc]
        );
    }

    #[test]
    fn test_ids_continue_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gunny.json");

        FileStore::new(&path)
            .add_receipt("main", Allocation::default())
            .unwrap();
        let second = FileStore::new(&path)
            .add_receipt("main", Allocation::default())
            .unwrap();
        assert_eq!(second.id, "GR-000002");
    }

    #[test]
    fn test_remove_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gunny.json");
        let store = FileStore::new(&path);
        let receipt = store
            .add_receipt("main", Allocation::new(10, 0, 0, 0))
            .unwrap();
        let alloc = Allocation::new(10, 0, 0, 0);
        let txn = store.insert(&receipt.id, alloc, downgrade(&alloc)).unwrap();

        store.remove(&txn.id).unwrap();
        let reopened = FileStore::new(&path);
        assert!(reopened
            .allocations_for(&receipt.id, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_corrupted_store_is_unavailable_not_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gunny.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.receipt("GR-000001"),
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_lock_guard_acquires_and_releases() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("gunny.json"));

        let guard = store.lock_exclusive(Duration::from_millis(200)).unwrap();
        drop(guard);
        // Releasing lets the next holder in.
        let _again = store.lock_exclusive(Duration::from_millis(200)).unwrap();
    }

    #[test]
    fn test_held_lock_times_out_with_retriable_contention() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gunny.json");

        let holder = FileStore::new(&path);
        let _held = holder.lock_exclusive(Duration::from_millis(200)).unwrap();

        // A second handle (as a second process would open) must not block
        // forever; it reports retriable contention once the bound elapses.
        let waiter = FileStore::new(&path);
        let err = waiter
            .lock_exclusive(Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, GunnyError::Contention { .. }));
        assert!(err.is_retriable());
    }
}

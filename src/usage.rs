//! Committed-usage aggregation
//!
//! Sums the per-grade allocations of every committed deposit transaction
//! referencing a receipt. A consistent snapshot relative to the
//! validate-then-commit step is the engine's job: it calls this inside the
//! per-receipt critical section.

use crate::models::Allocation;
use crate::store::{DepositLedger, StoreResult};

/// Total committed allocation per grade for a receipt.
///
/// `exclude` names a transaction to leave out of the sum, so an edit is
/// validated against its siblings rather than against its own prior
/// committed allocation. Deleted transactions no longer appear in the
/// ledger and therefore free their bags implicitly.
pub fn committed_usage<L: DepositLedger + ?Sized>(
    ledger: &L,
    receipt_id: &str,
    exclude: Option<&str>,
) -> StoreResult<Allocation> {
    let mut usage = Allocation::default();
    for allocation in ledger.allocations_for(receipt_id, exclude)? {
        usage = usage.saturating_add(&allocation);
    }
    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downgrade::downgrade;
    use crate::store::{MemoryStore, ReceiptStore};

    fn seed(store: &MemoryStore, receipt_id: &str, alloc: Allocation) -> String {
        let txn = store.insert(receipt_id, alloc, downgrade(&alloc)).unwrap();
        txn.id
    }

    #[test]
    fn test_usage_empty_receipt_is_zero() {
        let store = MemoryStore::new();
        let receipt = store
            .add_receipt("main", Allocation::new(10, 10, 10, 10))
            .unwrap();
        let usage = committed_usage(&store, &receipt.id, None).unwrap();
        assert!(usage.is_zero());
    }

    #[test]
    fn test_usage_sums_per_grade_across_siblings() {
        let store = MemoryStore::new();
        let receipt = store
            .add_receipt("main", Allocation::new(100, 50, 50, 50))
            .unwrap();
        seed(&store, &receipt.id, Allocation::new(60, 5, 0, 1));
        seed(&store, &receipt.id, Allocation::new(10, 0, 3, 2));

        let usage = committed_usage(&store, &receipt.id, None).unwrap();
        assert_eq!(usage, Allocation::new(70, 5, 3, 3));
    }

    #[test]
    fn test_usage_excludes_named_transaction() {
        let store = MemoryStore::new();
        let receipt = store
            .add_receipt("main", Allocation::new(100, 0, 0, 0))
            .unwrap();
        let own = seed(&store, &receipt.id, Allocation::new(60, 0, 0, 0));
        seed(&store, &receipt.id, Allocation::new(30, 0, 0, 0));

        let usage = committed_usage(&store, &receipt.id, Some(&own)).unwrap();
        assert_eq!(usage, Allocation::new(30, 0, 0, 0));
    }

    #[test]
    fn test_usage_ignores_other_receipts() {
        let store = MemoryStore::new();
        let a = store
            .add_receipt("main", Allocation::new(100, 0, 0, 0))
            .unwrap();
        let b = store
            .add_receipt("main", Allocation::new(100, 0, 0, 0))
            .unwrap();
        seed(&store, &a.id, Allocation::new(60, 0, 0, 0));

        let usage = committed_usage(&store, &b.id, None).unwrap();
        assert!(usage.is_zero());
    }
}

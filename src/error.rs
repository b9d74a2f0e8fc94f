//! Error types for Gunny
//!
//! Uses `thiserror` for library errors. Business rejections
//! (`CapacityExceeded`), invalid input (`InvalidAllocation`) and transient
//! conflicts (`Contention`) are separate variants so callers can react to
//! each without string matching. Infrastructure failures surface as
//! `Storage` and are never confused with a business rejection.

use thiserror::Error;

use crate::models::Grade;

/// Result type alias for Gunny operations
pub type GunnyResult<T> = Result<T, GunnyError>;

/// Main error type for Gunny operations
#[derive(Error, Debug)]
pub enum GunnyError {
    /// Referenced grain receipt does not exist
    #[error("grain receipt '{id}' not found")]
    ReceiptNotFound { id: String },

    /// Referenced deposit transaction does not exist
    #[error("deposit transaction '{id}' not found")]
    TransactionNotFound { id: String },

    /// Allocation field is negative or out of range (rejected before any
    /// capacity check)
    #[error("invalid allocation: {field} must be a non-negative bag count (got {value})")]
    InvalidAllocation { field: Grade, value: i64 },

    /// Requested cumulative allocation exceeds receipt capacity for a grade.
    ///
    /// `requested` is the existing committed usage plus the candidate
    /// allocation; `available` is the receipt's capacity for that grade.
    #[error("capacity exceeded for {grade} bags: requested {requested}, available {available}")]
    CapacityExceeded {
        grade: Grade,
        requested: u64,
        available: u64,
    },

    /// Concurrent modification of the same resource (a receipt, or the
    /// shared store file) detected; safe to retry with the same input
    #[error("'{resource}' is being modified concurrently, retry")]
    Contention { resource: String },

    /// Invalid configuration file
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Storage failure (unreachable or corrupted store); fatal, not a
    /// business rejection
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl GunnyError {
    /// Whether retrying the same operation unchanged may succeed.
    ///
    /// Only `Contention` qualifies; a `CapacityExceeded` rejection requires
    /// the caller to resubmit a smaller allocation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GunnyError::Contention { .. })
    }

    /// Stable machine-readable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            GunnyError::ReceiptNotFound { .. } => "receipt_not_found",
            GunnyError::TransactionNotFound { .. } => "transaction_not_found",
            GunnyError::InvalidAllocation { .. } => "invalid_allocation",
            GunnyError::CapacityExceeded { .. } => "capacity_exceeded",
            GunnyError::Contention { .. } => "contention",
            GunnyError::Config { .. } => "config",
            GunnyError::Storage { .. } => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_capacity_exceeded() {
        let err = GunnyError::CapacityExceeded {
            grade: Grade::Nb,
            requested: 110,
            available: 100,
        };
        assert_eq!(
            err.to_string(),
            "capacity exceeded for NB bags: requested 110, available 100"
        );
    }

    #[test]
    fn test_error_display_invalid_allocation() {
        let err = GunnyError::InvalidAllocation {
            field: Grade::Ss,
            value: -5,
        };
        assert_eq!(
            err.to_string(),
            "invalid allocation: SS must be a non-negative bag count (got -5)"
        );
    }

    #[test]
    fn test_only_contention_is_retriable() {
        let contention = GunnyError::Contention {
            resource: "GR-000001".to_string(),
        };
        assert!(contention.is_retriable());

        let exceeded = GunnyError::CapacityExceeded {
            grade: Grade::Swp,
            requested: 1,
            available: 0,
        };
        assert!(!exceeded.is_retriable());
    }

    #[test]
    fn test_kind_tags() {
        let err = GunnyError::ReceiptNotFound {
            id: "GR-000009".to_string(),
        };
        assert_eq!(err.kind(), "receipt_not_found");
    }
}

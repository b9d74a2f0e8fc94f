//! Core data models for Gunny
//!
//! Defines the fundamental data structures used throughout Gunny:
//! - `Grade`: the four gunny-bag quality tiers
//! - `Allocation`: validated per-grade bag counts
//! - `AllocationDraft`: raw caller input, validated into an `Allocation`
//! - `GrainReceipt`: an intake batch with its fixed capacity pool
//! - `DepositTransaction`: bags drawn from a receipt plus the downgraded output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GunnyError, GunnyResult};

/// Gunny-bag quality tier, ordered from newest to most worn.
///
/// Capacity checks evaluate grades in this declaration order
/// (NB, ONB, SS, SWP). Grades are non-fungible: a shortfall in one grade is
/// never covered by surplus in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    /// New bags
    Nb,
    /// Once-used new bags
    Onb,
    /// Second sort
    Ss,
    /// Worn-out stock, the lowest tier
    Swp,
}

impl Grade {
    /// All grades in fixed evaluation order
    pub const ALL: [Grade; 4] = [Grade::Nb, Grade::Onb, Grade::Ss, Grade::Swp];
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Grade::Nb => "NB",
            Grade::Onb => "ONB",
            Grade::Ss => "SS",
            Grade::Swp => "SWP",
        };
        write!(f, "{}", label)
    }
}

/// Validated per-grade bag counts.
///
/// Used both for a receipt's capacity pool and for the quantity a deposit
/// transaction draws from it. Absent fields deserialize to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(default)]
    pub nb: u32,
    #[serde(default)]
    pub onb: u32,
    #[serde(default)]
    pub ss: u32,
    #[serde(default)]
    pub swp: u32,
}

impl Allocation {
    pub fn new(nb: u32, onb: u32, ss: u32, swp: u32) -> Self {
        Self { nb, onb, ss, swp }
    }

    /// Bag count for a single grade
    pub fn get(&self, grade: Grade) -> u32 {
        match grade {
            Grade::Nb => self.nb,
            Grade::Onb => self.onb,
            Grade::Ss => self.ss,
            Grade::Swp => self.swp,
        }
    }

    /// Total bag count across all grades
    pub fn total(&self) -> u64 {
        self.nb as u64 + self.onb as u64 + self.ss as u64 + self.swp as u64
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    /// Per-grade sum. Committed usage for a valid receipt is bounded by its
    /// capacity, so saturation never triggers on well-formed stores.
    pub fn saturating_add(&self, other: &Allocation) -> Allocation {
        Allocation {
            nb: self.nb.saturating_add(other.nb),
            onb: self.onb.saturating_add(other.onb),
            ss: self.ss.saturating_add(other.ss),
            swp: self.swp.saturating_add(other.swp),
        }
    }

    /// Per-grade difference, clamped at zero
    pub fn saturating_sub(&self, other: &Allocation) -> Allocation {
        Allocation {
            nb: self.nb.saturating_sub(other.nb),
            onb: self.onb.saturating_sub(other.onb),
            ss: self.ss.saturating_sub(other.ss),
            swp: self.swp.saturating_sub(other.swp),
        }
    }
}

/// Raw per-grade bag counts as received from a caller.
///
/// Fields are signed because the outside world can hand us negatives;
/// `validate` turns a draft into an `Allocation` or rejects it with
/// `InvalidAllocation` before any capacity logic runs. Absent fields
/// default to 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AllocationDraft {
    #[serde(default)]
    pub nb: i64,
    #[serde(default)]
    pub onb: i64,
    #[serde(default)]
    pub ss: i64,
    #[serde(default)]
    pub swp: i64,
}

impl AllocationDraft {
    pub fn new(nb: i64, onb: i64, ss: i64, swp: i64) -> Self {
        Self { nb, onb, ss, swp }
    }

    /// Validate the draft into a well-formed `Allocation`.
    ///
    /// Rejects negative values and values that do not fit a `u32` bag
    /// count. Checks fields in fixed grade order and reports the first
    /// offender.
    pub fn validate(&self) -> GunnyResult<Allocation> {
        let fields = [
            (Grade::Nb, self.nb),
            (Grade::Onb, self.onb),
            (Grade::Ss, self.ss),
            (Grade::Swp, self.swp),
        ];
        for (grade, value) in fields {
            if value < 0 || value > u32::MAX as i64 {
                return Err(GunnyError::InvalidAllocation {
                    field: grade,
                    value,
                });
            }
        }
        Ok(Allocation::new(
            self.nb as u32,
            self.onb as u32,
            self.ss as u32,
            self.swp as u32,
        ))
    }
}

/// Output grade distribution computed by the downgrade transform.
///
/// Never contains an NB component: every consumed bag comes out at least
/// one tier worse. Fields are `u64` so the SS+SWP merge cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DowngradeOutput {
    #[serde(default)]
    pub onb: u64,
    #[serde(default)]
    pub ss: u64,
    #[serde(default)]
    pub swp: u64,
}

impl DowngradeOutput {
    /// Total bag count across output grades
    pub fn total(&self) -> u64 {
        self.onb + self.ss + self.swp
    }
}

/// Record of an intake batch, carrying a fixed per-grade bag capacity.
///
/// The capacity pool is immutable once recorded; deposit transactions draw
/// from it but never change it. `total_bags` is derived from the four
/// capacities at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainReceipt {
    pub id: String,
    /// Owning branch; scoping only, never affects allocation
    pub branch: String,
    pub capacity: Allocation,
    pub total_bags: u64,
    pub created_at: DateTime<Utc>,
}

impl GrainReceipt {
    pub fn new(id: impl Into<String>, branch: impl Into<String>, capacity: Allocation) -> Self {
        Self {
            id: id.into(),
            branch: branch.into(),
            total_bags: capacity.total(),
            capacity,
            created_at: Utc::now(),
        }
    }
}

/// A committed deposit drawing bags from exactly one grain receipt.
///
/// `output` is always computed from `allocation` by the downgrade
/// transform, never set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositTransaction {
    pub id: String,
    pub receipt_id: String,
    pub allocation: Allocation,
    pub output: DowngradeOutput,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//! One-step quality downgrade for consumed bags
//!
//! Bags drawn from a receipt come back one tier worse: NB turns into ONB,
//! ONB into SS, and both SS and SWP land on the SWP pile. Total bag count
//! is conserved; only the grade distribution shifts.

use crate::models::{Allocation, DowngradeOutput};

/// Compute the output grade distribution for a consumed allocation.
///
/// Pure and deterministic; needs no knowledge of capacity or sibling
/// transactions. `output.total() == allocation.total()` holds for every
/// input.
pub fn downgrade(allocation: &Allocation) -> DowngradeOutput {
    DowngradeOutput {
        onb: allocation.nb as u64,
        ss: allocation.onb as u64,
        swp: allocation.ss as u64 + allocation.swp as u64,
    }
}

//! Per-grade capacity validation
//!
//! Grades are checked independently in fixed order (NB, ONB, SS, SWP) and
//! the first violation is reported. Grades are non-fungible: a shortfall in
//! one grade is never covered by surplus in another; only the fixed
//! downgrade applies to accepted allocations.

use crate::error::GunnyError;
use crate::models::{Allocation, Grade};

/// Check a candidate allocation against a receipt's capacity and the
/// committed sibling usage.
///
/// Per grade: `usage + candidate <= capacity`. A zero candidate passes
/// trivially regardless of capacity; a grade with capacity 0 rejects any
/// nonzero candidate immediately. On violation, reports the grade, the
/// requested cumulative total (usage plus candidate) and the available
/// capacity.
pub fn check_capacity(
    candidate: &Allocation,
    capacity: &Allocation,
    usage: &Allocation,
) -> Result<(), GunnyError> {
    for grade in Grade::ALL {
        let requested = usage.get(grade) as u64 + candidate.get(grade) as u64;
        let available = capacity.get(grade) as u64;
        if requested > available {
            return Err(GunnyError::CapacityExceeded {
                grade,
                requested,
                available,
            });
        }
    }
    Ok(())
}

/// Per-grade bags still available to allocate, clamped at zero
pub fn remaining(capacity: &Allocation, usage: &Allocation) -> Allocation {
    capacity.saturating_sub(usage)
}

//! Process-wide switches that make a chunk fail right before it commits.

use std::{collections::HashMap, sync::OnceLock};

use parking_lot::Mutex;

use crate::errors::ContentGraphError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    ChunkInsertBeforeCommit,
    ChunkUpdateBeforeCommit,
}

struct FaultEntry {
    /// Chunks that still commit before the fault fires.
    skip: usize,
    remaining: usize,
}

fn registry() -> &'static Mutex<HashMap<FaultPoint, FaultEntry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<FaultPoint, FaultEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn reset_faults() {
    registry().lock().clear();
}

/// Fail the next `failures` chunks reaching `point`.
pub fn configure_fault(point: FaultPoint, failures: usize) {
    configure_fault_after(point, 0, failures);
}

/// Let `skip` chunks through, then fail the following `failures` chunks.
pub fn configure_fault_after(point: FaultPoint, skip: usize, failures: usize) {
    let mut guard = registry().lock();
    if failures == 0 {
        guard.remove(&point);
    } else {
        guard.insert(
            point,
            FaultEntry {
                skip,
                remaining: failures,
            },
        );
    }
}

pub(crate) fn check_fault(point: FaultPoint) -> Result<(), ContentGraphError> {
    let mut guard = registry().lock();
    let Some(entry) = guard.get_mut(&point) else {
        return Ok(());
    };
    if entry.skip > 0 {
        entry.skip -= 1;
        return Ok(());
    }
    entry.remaining -= 1;
    if entry.remaining == 0 {
        guard.remove(&point);
    }
    Err(ContentGraphError::fault_injection(format!("{point:?}")))
}

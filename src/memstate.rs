//! Memory-pressure summary for the overview bar.

use serde::{Deserialize, Serialize};

use crate::{AccumulatedSnapshot, MemFactor};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryRatios {
    pub critical: f64,
    pub low_moderate: f64,
    pub normal: f64,
}

/// Share of `total_time_ms` spent in each pressure band. `None` when there is
/// no elapsed time. Time outside the recorded buckets is left out, so the
/// three ratios may sum to less than one.
pub fn summarize_memory_ratios(
    snapshot: &AccumulatedSnapshot,
    total_time_ms: u64,
) -> Option<MemoryRatios> {
    if total_time_ms == 0 {
        return None;
    }
    let total = total_time_ms as f64;
    let table = &snapshot.mem_durations;
    let ratio = |ms: u64| (ms as f64 / total).clamp(0.0, 1.0);
    Some(MemoryRatios {
        critical: ratio(table.for_factor(MemFactor::Critical)),
        low_moderate: ratio(
            table
                .for_factor(MemFactor::Low)
                .saturating_add(table.for_factor(MemFactor::Moderate)),
        ),
        normal: ratio(table.for_factor(MemFactor::Normal)),
    })
}

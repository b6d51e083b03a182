//! Snapshot file format read/write and the accumulated multi-file snapshot.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::{
    MemDurationTable, MemState, PackageKey, PackageRecord, ProcessKey, ProcessRecord, StatsError,
    StatsResult,
};

pub const SNAPSHOT_FORMAT: &str = "procstats-snapshot";
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// One historical (or the current) statistics record as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub format: String,
    pub version: u32,
    /// Monotonic start of the covered period, in ms.
    pub period_start_ms: u64,
    /// Monotonic end of the covered period, in ms.
    pub period_end_ms: u64,
    /// Wall-clock start of the period, unix ms.
    #[serde(default)]
    pub period_start_clock_ms: i64,
    #[serde(default)]
    pub mem_durations: MemDurationTable,
    /// Memory state in effect when the snapshot was taken, not yet in `mem_durations`.
    #[serde(default)]
    pub active_mem_state: Option<MemState>,
    #[serde(default)]
    pub active_since_ms: u64,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
    #[serde(skip)]
    pub read_error: Option<String>,
}

impl SnapshotFile {
    pub fn new(period_start_ms: u64, period_end_ms: u64) -> Self {
        Self {
            format: SNAPSHOT_FORMAT.to_string(),
            version: CURRENT_SNAPSHOT_VERSION,
            period_start_ms,
            period_end_ms,
            period_start_clock_ms: 0,
            mem_durations: MemDurationTable::default(),
            active_mem_state: None,
            active_since_ms: 0,
            processes: Vec::new(),
            packages: Vec::new(),
            read_error: None,
        }
    }

    /// A placeholder for a stream that could not be parsed.
    pub fn with_read_error(message: impl Into<String>) -> Self {
        let mut file = Self::new(0, 0);
        file.read_error = Some(message.into());
        file
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.period_end_ms.saturating_sub(self.period_start_ms)
    }

    /// Reads a snapshot; any failure is recorded in `read_error` instead of returned.
    pub fn read_from(mut reader: impl Read) -> Self {
        let mut bytes = Vec::new();
        if let Err(err) = reader.read_to_end(&mut bytes) {
            return Self::with_read_error(format!("failed to read stream: {err}"));
        }
        match Self::parse(&bytes) {
            Ok(file) => file,
            Err(err) => Self::with_read_error(err.to_string()),
        }
    }

    pub fn parse(bytes: &[u8]) -> StatsResult<Self> {
        let file: SnapshotFile = serde_json::from_slice(bytes)?;
        file.validate()?;
        Ok(file)
    }

    pub fn read_json(path: &Path) -> StatsResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn write_json(&self, path: &Path) -> StatsResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn validate(&self) -> StatsResult<()> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(StatsError::Snapshot(format!(
                "unexpected format {:?} (expected {SNAPSHOT_FORMAT:?})",
                self.format
            )));
        }
        if self.version != CURRENT_SNAPSHOT_VERSION {
            return Err(StatsError::Snapshot(format!(
                "unsupported snapshot version {} (expected {CURRENT_SNAPSHOT_VERSION})",
                self.version
            )));
        }
        if self.period_end_ms < self.period_start_ms {
            return Err(StatsError::Snapshot(format!(
                "period ends ({}) before it starts ({})",
                self.period_end_ms, self.period_start_ms
            )));
        }
        Ok(())
    }

    /// Renders the wall-clock start for log lines.
    pub fn period_start_clock_str(&self) -> String {
        let nanos = i128::from(self.period_start_clock_ms) * 1_000_000;
        time::OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|t| {
                t.format(&time::format_description::well_known::Rfc3339)
                    .ok()
            })
            .unwrap_or_else(|| self.period_start_clock_ms.to_string())
    }
}

/// The union of one or more snapshot files.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedSnapshot {
    pub period_start_ms: u64,
    pub period_end_ms: u64,
    pub period_start_clock_ms: i64,
    pub mem_durations: MemDurationTable,
    pub active_mem_state: Option<MemState>,
    pub active_since_ms: u64,
    /// Monotonic time the primary snapshot was taken; unaffected by merging.
    pub captured_at_ms: u64,
    pub processes: BTreeMap<ProcessKey, ProcessRecord>,
    pub packages: BTreeMap<PackageKey, PackageRecord>,
}

impl AccumulatedSnapshot {
    pub fn from_file(file: SnapshotFile) -> Self {
        let mut acc = Self {
            period_start_ms: file.period_start_ms,
            period_end_ms: file.period_end_ms,
            period_start_clock_ms: file.period_start_clock_ms,
            mem_durations: file.mem_durations,
            active_mem_state: file.active_mem_state,
            active_since_ms: file.active_since_ms,
            captured_at_ms: file.period_end_ms,
            processes: BTreeMap::new(),
            packages: BTreeMap::new(),
        };
        acc.absorb_records(file.processes, file.packages);
        acc
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.period_end_ms.saturating_sub(self.period_start_ms)
    }

    /// Adds an older file's data. The period grows by the file's own length.
    pub fn add(&mut self, other: SnapshotFile) {
        self.period_end_ms = self.period_end_ms.saturating_add(other.elapsed_ms());
        self.mem_durations.add(&other.mem_durations);
        self.absorb_records(other.processes, other.packages);
    }

    /// Total accounted time, including the in-progress memory state up to `now_ms`.
    pub fn total_time_ms(&self, now_ms: u64) -> u64 {
        let recorded = self.mem_durations.total();
        match self.active_mem_state {
            Some(_) => recorded.saturating_add(now_ms.saturating_sub(self.active_since_ms)),
            None => recorded,
        }
    }

    pub fn packages_for_process(&self, key: &ProcessKey) -> Vec<&PackageRecord> {
        self.packages
            .values()
            .filter(|pkg| pkg.uid == key.uid && pkg.processes.contains_key(&key.name))
            .collect()
    }

    fn absorb_records(&mut self, processes: Vec<ProcessRecord>, packages: Vec<PackageRecord>) {
        for proc in processes {
            match self.processes.get_mut(&proc.key()) {
                Some(existing) => existing.states.add(&proc.states),
                None => {
                    self.processes.insert(proc.key(), proc);
                }
            }
        }
        for pkg in packages {
            match self.packages.get_mut(&pkg.key()) {
                Some(existing) => existing.add(&pkg),
                None => {
                    self.packages.insert(pkg.key(), pkg);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::{MemFactor, RunState, ScreenState, StateKey, StateUsage, StateTable};

    pub fn usage(duration_ms: u64, pss_kb: u64) -> StateUsage {
        StateUsage {
            duration_ms,
            sample_count: 1,
            avg_pss_kb: pss_kb,
            max_pss_kb: pss_kb,
            avg_uss_kb: pss_kb / 2,
            max_uss_kb: pss_kb / 2,
        }
    }

    pub fn process(name: &str, uid: u32, cells: &[(RunState, u64, u64)]) -> ProcessRecord {
        ProcessRecord {
            name: name.to_string(),
            uid,
            package: name.split(':').next().unwrap_or(name).to_string(),
            states: table(cells),
        }
    }

    pub fn table(cells: &[(RunState, u64, u64)]) -> StateTable {
        let mut table = StateTable::default();
        for (run, duration_ms, pss) in cells {
            table.add_usage(
                StateKey::new(ScreenState::On, *run),
                &usage(*duration_ms, *pss),
            );
        }
        table
    }

    pub fn snapshot(start_ms: u64, end_ms: u64) -> SnapshotFile {
        let mut file = SnapshotFile::new(start_ms, end_ms);
        file.mem_durations.add_duration(
            MemState {
                screen: ScreenState::On,
                mem: MemFactor::Normal,
            },
            end_ms - start_ms,
        );
        file
    }
}

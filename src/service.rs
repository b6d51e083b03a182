//! Access to the statistics-collection service.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{FileSource, SnapshotFile, SnapshotSource, StatsError, StatsResult, find_snapshot_files};

pub const CURRENT_SNAPSHOT_FILE: &str = "current.json";
pub const DEVICE_STATE_FILE: &str = "state.json";

/// Value reported when the service does not know the memory level.
pub const UNKNOWN_MEM_STATE: i32 = -1;

/// Where current and historical snapshots come from.
pub trait StatsService {
    type Source: SnapshotSource;

    /// Raw memory level; values outside the known range render as unknown.
    fn current_memory_state(&self) -> StatsResult<i32>;

    /// The in-progress snapshot plus historical sources, newest first.
    fn current_stats(&self) -> StatsResult<(SnapshotFile, Vec<Self::Source>)>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceState {
    mem_factor: i32,
}

/// A stats directory laid out as `current.json`, optional `state.json`, and
/// historical snapshot files matching a glob.
#[derive(Debug, Clone)]
pub struct DirStatsService {
    dir: PathBuf,
    history_glob: String,
}

impl DirStatsService {
    pub fn new(dir: impl Into<PathBuf>, history_glob: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            history_glob: history_glob.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StatsService for DirStatsService {
    type Source = FileSource;

    fn current_memory_state(&self) -> StatsResult<i32> {
        let path = self.dir.join(DEVICE_STATE_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no device state at {}", path.display());
                return Ok(UNKNOWN_MEM_STATE);
            }
            Err(err) => {
                return Err(StatsError::Service(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };
        let state: DeviceState = serde_json::from_slice(&bytes).map_err(|err| {
            StatsError::Service(format!("invalid device state {}: {err}", path.display()))
        })?;
        Ok(state.mem_factor)
    }

    fn current_stats(&self) -> StatsResult<(SnapshotFile, Vec<FileSource>)> {
        let current_path = self.dir.join(CURRENT_SNAPSHOT_FILE);
        let current = SnapshotFile::read_json(&current_path).map_err(|err| {
            StatsError::Service(format!(
                "failed to load current snapshot {}: {err}",
                current_path.display()
            ))
        })?;

        let paths = find_snapshot_files(
            &self.dir,
            &self.history_glob,
            &[CURRENT_SNAPSHOT_FILE, DEVICE_STATE_FILE],
        )?;
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            match FileSource::open(&path) {
                Ok(source) => sources.push(source),
                Err(err) => {
                    tracing::warn!("skipping unreadable snapshot {}: {err}", path.display())
                }
            }
        }
        tracing::debug!(
            dir = %self.dir.display(),
            historical = sources.len(),
            "loaded current stats"
        );
        Ok((current, sources))
    }
}

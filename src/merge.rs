//! Merging historical snapshot files into the current snapshot.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::{AccumulatedSnapshot, SnapshotFile, StatsResult, format_duration};

/// A readable historical snapshot. Reading consumes the source, so whatever
/// handle it holds is released as soon as the read returns.
pub trait SnapshotSource {
    fn describe(&self) -> String;

    fn read_snapshot(self) -> SnapshotFile;
}

/// An already-open snapshot file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
}

impl FileSource {
    pub fn open(path: &Path) -> StatsResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_snapshot(self) -> SnapshotFile {
        SnapshotFile::read_from(BufReader::new(self.file))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: usize,
    pub skipped: usize,
    pub released: usize,
}

/// Starts from `primary` and folds in `historical` (newest first) until the
/// accumulated period covers `min_coverage_ms` or the sources run out. Sources
/// past the stopping point are released unread.
pub fn merge<S, I>(
    primary: SnapshotFile,
    historical: I,
    min_coverage_ms: u64,
) -> (AccumulatedSnapshot, MergeOutcome)
where
    S: SnapshotSource,
    I: IntoIterator<Item = S>,
{
    let mut acc = AccumulatedSnapshot::from_file(primary);
    let mut outcome = MergeOutcome::default();
    let mut sources = historical.into_iter().enumerate();

    while acc.elapsed_ms() < min_coverage_ms {
        let Some((index, source)) = sources.next() else {
            break;
        };
        tracing::info!("Not enough data, loading next file @ {index}");
        let name = source.describe();
        let stats = source.read_snapshot();
        if let Some(err) = &stats.read_error {
            tracing::warn!("Read error: {err} ({name})");
            outcome.skipped += 1;
            continue;
        }
        tracing::info!(
            "Added stats: {}, over {}",
            stats.period_start_clock_str(),
            format_duration(stats.elapsed_ms())
        );
        acc.add(stats);
        outcome.merged += 1;
    }

    for (_, source) in sources {
        tracing::debug!(source = %source.describe(), "releasing unread snapshot");
        drop(source);
        outcome.released += 1;
    }

    (acc, outcome)
}

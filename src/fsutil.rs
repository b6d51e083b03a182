//! Small filesystem utilities.

use globset::{Glob, GlobMatcher};

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{StatsError, StatsResult};

/// Files directly under `dir` whose name matches `pattern`, newest name first.
/// Snapshot files carry a sortable timestamp in their name, so reverse
/// lexical order is newest-to-oldest.
pub fn find_snapshot_files(
    dir: &Path,
    pattern: &str,
    exclude: &[&str],
) -> StatsResult<Vec<PathBuf>> {
    let matcher = compile_glob(pattern)?;
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            StatsError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(msg)),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if exclude.contains(&name) || !matcher.is_match(name) {
            continue;
        }
        out.push(entry.path().to_path_buf());
    }
    out.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(out)
}

fn compile_glob(pattern: &str) -> StatsResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| StatsError::InvalidArgument(format!("invalid glob {pattern:?}: {e}")))
}

//! `procstats.toml` config loading.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{StatsDuration, ViewOptions, duration::MS_PER_DAY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory holding `current.json` and historical snapshots.
    #[serde(default = "default_stats_dir")]
    pub stats_dir: PathBuf,

    /// File-name glob selecting historical snapshots inside `stats_dir`.
    #[serde(default = "default_history_glob")]
    pub history_glob: String,

    /// Merge history until the accumulated period covers at least this long.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: StatsDuration,

    #[serde(default)]
    pub reporter: Reporter,

    /// Initial list options.
    #[serde(default)]
    pub view: ViewOptions,
}

fn default_stats_dir() -> PathBuf {
    PathBuf::from(".procstats")
}

fn default_history_glob() -> String {
    "*.procstats.json".to_string()
}

fn default_min_coverage() -> StatsDuration {
    StatsDuration(MS_PER_DAY)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_dir: default_stats_dir(),
            history_glob: default_history_glob(),
            min_coverage: default_min_coverage(),
            reporter: Reporter::default(),
            view: ViewOptions::default(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatsCategory;

    #[test]
    fn parses_partial_config_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
stats_dir = "/data/procstats"
min_coverage = "12h"

[view]
stats_type = "cached"
use_uss = true
"#,
        )
        .expect("parse");
        assert_eq!(cfg.stats_dir, PathBuf::from("/data/procstats"));
        assert_eq!(cfg.min_coverage.as_millis(), MS_PER_DAY / 2);
        assert_eq!(cfg.history_glob, "*.procstats.json");
        assert_eq!(cfg.reporter, Reporter::Pretty);
        assert_eq!(cfg.view.stats_type, StatsCategory::Cached);
        assert!(cfg.view.use_uss);
        assert!(!cfg.view.show_system);
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("procstats-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let missing = Config::load_optional(&dir.join("absent.toml"));
        assert_eq!(missing.min_coverage.as_millis(), MS_PER_DAY);

        let broken = dir.join("broken.toml");
        std::fs::write(&broken, "min_coverage = [").expect("write");
        let cfg = Config::load_optional(&broken);
        assert_eq!(cfg.stats_dir, PathBuf::from(".procstats"));
    }
}

//! CLI stats commands (`procstats show|memory|inspect`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::{
    Config, DirStatsService, FileSource, MemoryRatios, SnapshotSource, StatsCategory,
    StatsDuration, StatsReport, StatsResult, StatsSession, ViewOptions, format_elapsed,
    summarize_memory_ratios,
};

#[derive(Debug, Subcommand)]
pub enum StatsCommand {
    /// Rank processes by memory weight over the merged stats period
    Show {
        #[arg(long)]
        category: Option<StatsCategory>,
        /// Include persistent system processes (background category only).
        /// `--show-system=false` overrides the config.
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        show_system: Option<bool>,
        /// Weigh by unique set size instead of proportional set size
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        use_uss: Option<bool>,
        #[arg(long)]
        min_coverage: Option<StatsDuration>,
        /// Stats directory; overrides `stats_dir` from the config
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Monotonic "now" in ms for in-progress memory state time
        #[arg(long)]
        now_ms: Option<u64>,
    },
    /// Show how long the device spent in each memory-pressure band
    Memory {
        #[arg(long)]
        min_coverage: Option<StatsDuration>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Read a single snapshot file and summarize it
    Inspect {
        #[arg(value_name = "SNAPSHOT")]
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    pub elapsed_ms: u64,
    pub elapsed: String,
    pub total_time_ms: u64,
    pub mem_state: String,
    pub ratios: Option<MemoryRatios>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub path: String,
    #[serde(rename = "readError")]
    pub read_error: Option<String>,
    #[serde(rename = "periodStart")]
    pub period_start: String,
    pub elapsed: String,
    pub processes: usize,
    pub packages: usize,
    pub services: usize,
}

#[derive(Debug)]
pub enum StatsOutput {
    Report(Box<StatsReport>),
    Value(serde_json::Value),
}

pub fn stats_command(config: &Config, command: &StatsCommand) -> StatsResult<StatsOutput> {
    match command {
        StatsCommand::Show {
            category,
            show_system,
            use_uss,
            min_coverage,
            dir,
            now_ms,
        } => {
            let options = ViewOptions {
                show_system: show_system.unwrap_or(config.view.show_system),
                use_uss: use_uss.unwrap_or(config.view.use_uss),
                stats_type: category.unwrap_or(config.view.stats_type),
            };
            let service = service_for(config, dir.as_ref());
            let mut session = StatsSession::new(options, coverage(config, *min_coverage));
            let report = session.refresh(&service, *now_ms)?;
            Ok(StatsOutput::Report(Box::new(report.clone())))
        }

        StatsCommand::Memory { min_coverage, dir } => {
            let service = service_for(config, dir.as_ref());
            let mut session = StatsSession::new(config.view, coverage(config, *min_coverage));
            let report = session.refresh(&service, None)?;
            let total_time_ms = report.total_time_ms;
            let mem_state = report.mem_state.clone();
            let Some(snapshot) = session.snapshot() else {
                return Err(crate::StatsError::Service("no snapshot loaded".to_string()));
            };
            let out = MemorySummary {
                elapsed_ms: snapshot.elapsed_ms(),
                elapsed: format_elapsed(snapshot.elapsed_ms()),
                total_time_ms,
                mem_state,
                ratios: summarize_memory_ratios(snapshot, total_time_ms),
            };
            Ok(StatsOutput::Value(serde_json::to_value(out)?))
        }

        StatsCommand::Inspect { file } => {
            let source = FileSource::open(file)?;
            let path = source.describe();
            let snapshot = source.read_snapshot();
            let out = SnapshotSummary {
                path,
                read_error: snapshot.read_error.clone(),
                period_start: snapshot.period_start_clock_str(),
                elapsed: format_elapsed(snapshot.elapsed_ms()),
                processes: snapshot.processes.len(),
                packages: snapshot.packages.len(),
                services: snapshot.packages.iter().map(|p| p.services.len()).sum(),
            };
            Ok(StatsOutput::Value(serde_json::to_value(out)?))
        }
    }
}

fn service_for(config: &Config, dir: Option<&PathBuf>) -> DirStatsService {
    let dir = dir.cloned().unwrap_or_else(|| config.stats_dir.clone());
    DirStatsService::new(dir, config.history_glob.clone())
}

fn coverage(config: &Config, override_: Option<StatsDuration>) -> u64 {
    override_.unwrap_or(config.min_coverage).as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::MS_PER_HOUR;
    use crate::snapshot::test_support::{process, snapshot};
    use crate::{CURRENT_SNAPSHOT_FILE, RunState};

    fn workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("procstats-cmd-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("workspace");
        dir
    }

    fn seed(dir: &std::path::Path) {
        let mut current = snapshot(0, 5 * MS_PER_HOUR);
        current.processes.push(process(
            "com.example",
            10_001,
            &[(RunState::Service, 5 * MS_PER_HOUR, 8_000)],
        ));
        current.write_json(&dir.join(CURRENT_SNAPSHOT_FILE)).expect("current");
        std::fs::write(dir.join("0001.procstats.json"), b"{ truncated").expect("broken");
        snapshot(0, 24 * MS_PER_HOUR)
            .write_json(&dir.join("0000.procstats.json"))
            .expect("older");
    }

    #[test]
    fn show_merges_past_broken_history() {
        let dir = workspace("show");
        seed(&dir);
        let cfg = Config {
            stats_dir: dir.clone(),
            ..Config::default()
        };
        let cmd = StatsCommand::Show {
            category: None,
            show_system: None,
            use_uss: None,
            min_coverage: None,
            dir: None,
            now_ms: None,
        };
        let StatsOutput::Report(report) = stats_command(&cfg, &cmd).expect("show") else {
            panic!("expected report");
        };
        assert_eq!(report.elapsed_ms, 29 * MS_PER_HOUR);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].entry.name, "com.example");
    }

    #[test]
    fn show_flags_override_config_view() {
        let dir = workspace("override");
        seed(&dir);
        let mut cfg = Config {
            stats_dir: dir.clone(),
            ..Config::default()
        };
        cfg.view.use_uss = true;
        let show = |use_uss: Option<bool>| StatsCommand::Show {
            category: None,
            show_system: None,
            use_uss,
            min_coverage: None,
            dir: None,
            now_ms: None,
        };

        let StatsOutput::Report(report) = stats_command(&cfg, &show(None)).expect("config") else {
            panic!("expected report");
        };
        assert!(report.use_uss);
        let StatsOutput::Report(report) = stats_command(&cfg, &show(Some(false))).expect("cli")
        else {
            panic!("expected report");
        };
        assert!(!report.use_uss);
    }

    #[test]
    fn show_flag_parses_bare_and_explicit_forms() {
        use clap::Parser;

        #[derive(Debug, Parser)]
        struct Cli {
            #[command(subcommand)]
            command: StatsCommand,
        }

        let bare = Cli::try_parse_from(["procstats", "show", "--use-uss"]).expect("bare");
        let off = Cli::try_parse_from(["procstats", "show", "--use-uss=false"]).expect("off");
        assert!(matches!(bare.command, StatsCommand::Show { use_uss: Some(true), .. }));
        assert!(matches!(off.command, StatsCommand::Show { use_uss: Some(false), .. }));
    }

    #[test]
    fn memory_reports_ratios() {
        let dir = workspace("memory");
        seed(&dir);
        let cmd = StatsCommand::Memory {
            min_coverage: Some("1h".parse().expect("duration")),
            dir: Some(dir.clone()),
        };
        let StatsOutput::Value(out) = stats_command(&Config::default(), &cmd).expect("memory")
        else {
            panic!("expected value");
        };
        assert_eq!(out.get("elapsed_ms").and_then(|v| v.as_u64()), Some(5 * MS_PER_HOUR));
        assert_eq!(out["ratios"]["normal"].as_f64(), Some(1.0));
        assert_eq!(out["mem_state"], "?");
    }

    #[test]
    fn inspect_reports_read_errors() {
        let dir = workspace("inspect");
        seed(&dir);
        let cmd = StatsCommand::Inspect {
            file: dir.join("0001.procstats.json"),
        };
        let StatsOutput::Value(out) = stats_command(&Config::default(), &cmd).expect("inspect")
        else {
            panic!("expected value");
        };
        assert!(out["readError"].is_string());
        assert_eq!(out["processes"], 0);
    }
}

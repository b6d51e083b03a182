//! Category selection: which run-states count toward a process's weight.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::RunState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StatsCategory {
    #[default]
    Background,
    Foreground,
    Cached,
}

impl StatsCategory {
    pub fn label(self) -> &'static str {
        match self {
            StatsCategory::Background => "Background processes",
            StatsCategory::Foreground => "Foreground processes",
            StatsCategory::Cached => "Cached processes",
        }
    }

    /// Background weights scale with time spent; the other categories rank by size.
    pub fn weights_with_time(self) -> bool {
        self == StatsCategory::Background
    }
}

pub const BACKGROUND_PROC_STATES: [RunState; 7] = [
    RunState::ImportantForeground,
    RunState::ImportantBackground,
    RunState::Backup,
    RunState::HeavyWeight,
    RunState::Service,
    RunState::ServiceRestarting,
    RunState::Receiver,
];

pub const BACKGROUND_AND_SYSTEM_PROC_STATES: [RunState; 8] = [
    RunState::Persistent,
    RunState::ImportantForeground,
    RunState::ImportantBackground,
    RunState::Backup,
    RunState::HeavyWeight,
    RunState::Service,
    RunState::ServiceRestarting,
    RunState::Receiver,
];

pub const FOREGROUND_PROC_STATES: [RunState; 1] = [RunState::Top];

pub const CACHED_PROC_STATES: [RunState; 3] = [
    RunState::CachedActivity,
    RunState::CachedActivityClient,
    RunState::CachedEmpty,
];

/// `include_system` only has an effect for [`StatsCategory::Background`].
pub fn resolve_states(category: StatsCategory, include_system: bool) -> BTreeSet<RunState> {
    match category {
        StatsCategory::Foreground => FOREGROUND_PROC_STATES.into_iter().collect(),
        StatsCategory::Cached => CACHED_PROC_STATES.into_iter().collect(),
        StatsCategory::Background if include_system => {
            BACKGROUND_AND_SYSTEM_PROC_STATES.into_iter().collect()
        }
        StatsCategory::Background => BACKGROUND_PROC_STATES.into_iter().collect(),
    }
}

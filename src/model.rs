//! Process statistics record model: states, usage cells and per-process tables.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    Off,
    On,
}

impl ScreenState {
    pub const ALL: [ScreenState; 2] = [ScreenState::Off, ScreenState::On];
}

/// Memory-pressure level the device was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemFactor {
    Normal,
    Moderate,
    Low,
    Critical,
}

impl MemFactor {
    pub const ALL: [MemFactor; 4] = [
        MemFactor::Normal,
        MemFactor::Moderate,
        MemFactor::Low,
        MemFactor::Critical,
    ];

    /// Maps the raw level reported by the stats service; out-of-range values are unknown.
    pub fn from_index(raw: i32) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn label(self) -> &'static str {
        match self {
            MemFactor::Normal => "normal",
            MemFactor::Moderate => "moderate",
            MemFactor::Low => "low",
            MemFactor::Critical => "critical",
        }
    }
}

/// Process importance bucket, most important first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Persistent,
    Top,
    ImportantForeground,
    ImportantBackground,
    Backup,
    HeavyWeight,
    Service,
    ServiceRestarting,
    Receiver,
    Home,
    LastActivity,
    CachedActivity,
    CachedActivityClient,
    CachedEmpty,
}

impl RunState {
    pub const ALL: [RunState; 14] = [
        RunState::Persistent,
        RunState::Top,
        RunState::ImportantForeground,
        RunState::ImportantBackground,
        RunState::Backup,
        RunState::HeavyWeight,
        RunState::Service,
        RunState::ServiceRestarting,
        RunState::Receiver,
        RunState::Home,
        RunState::LastActivity,
        RunState::CachedActivity,
        RunState::CachedActivityClient,
        RunState::CachedEmpty,
    ];

    /// Cost multiplier applied to memory held while in this state.
    pub fn weight_multiplier(self) -> f64 {
        match self {
            RunState::Persistent | RunState::Top | RunState::ImportantForeground => 1.0,
            RunState::ImportantBackground | RunState::Backup | RunState::HeavyWeight => 0.75,
            RunState::Service
            | RunState::ServiceRestarting
            | RunState::Receiver
            | RunState::Home
            | RunState::LastActivity => 0.5,
            RunState::CachedActivity | RunState::CachedActivityClient | RunState::CachedEmpty => {
                0.25
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub screen: ScreenState,
    pub run: RunState,
}

impl StateKey {
    pub fn new(screen: ScreenState, run: RunState) -> Self {
        Self { screen, run }
    }

    pub fn all() -> impl Iterator<Item = StateKey> {
        ScreenState::ALL
            .into_iter()
            .flat_map(|screen| RunState::ALL.into_iter().map(move |run| StateKey { screen, run }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemState {
    pub screen: ScreenState,
    pub mem: MemFactor,
}

/// Time and sampled memory for one (screen, run-state) cell. Memory is in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUsage {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub avg_pss_kb: u64,
    #[serde(default)]
    pub max_pss_kb: u64,
    #[serde(default)]
    pub avg_uss_kb: u64,
    #[serde(default)]
    pub max_uss_kb: u64,
}

impl StateUsage {
    pub fn add(&mut self, other: &StateUsage) {
        let total = self.sample_count.saturating_add(other.sample_count);
        if total > 0 {
            self.avg_pss_kb = weighted_avg(
                self.avg_pss_kb,
                self.sample_count,
                other.avg_pss_kb,
                other.sample_count,
            );
            self.avg_uss_kb = weighted_avg(
                self.avg_uss_kb,
                self.sample_count,
                other.avg_uss_kb,
                other.sample_count,
            );
        }
        self.sample_count = total;
        self.duration_ms = self.duration_ms.saturating_add(other.duration_ms);
        self.max_pss_kb = self.max_pss_kb.max(other.max_pss_kb);
        self.max_uss_kb = self.max_uss_kb.max(other.max_uss_kb);
    }

    pub fn avg_kb(&self, use_uss: bool) -> u64 {
        if use_uss {
            self.avg_uss_kb
        } else {
            self.avg_pss_kb
        }
    }
}

fn weighted_avg(a: u64, a_n: u64, b: u64, b_n: u64) -> u64 {
    let n = a_n as u128 + b_n as u128;
    if n == 0 {
        return 0;
    }
    ((a as u128 * a_n as u128 + b as u128 * b_n as u128) / n) as u64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCell {
    screen: ScreenState,
    run: RunState,
    #[serde(flatten)]
    usage: StateUsage,
}

/// Usage per (screen, run-state) cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StateCell>", into = "Vec<StateCell>")]
pub struct StateTable {
    cells: BTreeMap<StateKey, StateUsage>,
}

impl From<Vec<StateCell>> for StateTable {
    fn from(cells: Vec<StateCell>) -> Self {
        let mut table = StateTable::default();
        for cell in cells {
            table.add_usage(StateKey::new(cell.screen, cell.run), &cell.usage);
        }
        table
    }
}

impl From<StateTable> for Vec<StateCell> {
    fn from(table: StateTable) -> Self {
        table
            .cells
            .into_iter()
            .map(|(key, usage)| StateCell {
                screen: key.screen,
                run: key.run,
                usage,
            })
            .collect()
    }
}

impl StateTable {
    pub fn get(&self, key: StateKey) -> Option<&StateUsage> {
        self.cells.get(&key)
    }

    pub fn add_usage(&mut self, key: StateKey, usage: &StateUsage) {
        self.cells.entry(key).or_default().add(usage);
    }

    /// Field-wise sum with another table.
    pub fn add(&mut self, other: &StateTable) {
        for (key, usage) in &other.cells {
            self.add_usage(*key, usage);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateKey, &StateUsage)> {
        self.cells.iter().map(|(k, v)| (*k, v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemDurationCell {
    screen: ScreenState,
    mem: MemFactor,
    duration_ms: u64,
}

/// Time spent in each (screen, memory-pressure) state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MemDurationCell>", into = "Vec<MemDurationCell>")]
pub struct MemDurationTable {
    durations: BTreeMap<MemState, u64>,
}

impl From<Vec<MemDurationCell>> for MemDurationTable {
    fn from(cells: Vec<MemDurationCell>) -> Self {
        let mut table = MemDurationTable::default();
        for cell in cells {
            table.add_duration(
                MemState {
                    screen: cell.screen,
                    mem: cell.mem,
                },
                cell.duration_ms,
            );
        }
        table
    }
}

impl From<MemDurationTable> for Vec<MemDurationCell> {
    fn from(table: MemDurationTable) -> Self {
        table
            .durations
            .into_iter()
            .map(|(state, duration_ms)| MemDurationCell {
                screen: state.screen,
                mem: state.mem,
                duration_ms,
            })
            .collect()
    }
}

impl MemDurationTable {
    pub fn get(&self, state: MemState) -> u64 {
        self.durations.get(&state).copied().unwrap_or(0)
    }

    pub fn add_duration(&mut self, state: MemState, ms: u64) {
        let slot = self.durations.entry(state).or_insert(0);
        *slot = slot.saturating_add(ms);
    }

    pub fn add(&mut self, other: &MemDurationTable) {
        for (state, ms) in &other.durations {
            self.add_duration(*state, *ms);
        }
    }

    /// Duration in one memory factor summed across screen states.
    pub fn for_factor(&self, mem: MemFactor) -> u64 {
        ScreenState::ALL
            .into_iter()
            .map(|screen| self.get(MemState { screen, mem }))
            .fold(0u64, u64::saturating_add)
    }

    pub fn total(&self) -> u64 {
        self.durations.values().copied().fold(0u64, u64::saturating_add)
    }
}

/// Identity of a process across snapshots; pids are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessKey {
    pub name: String,
    pub uid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub name: String,
    pub uid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,
    pub uid: u32,
    /// Package that first launched the process.
    pub package: String,
    #[serde(default)]
    pub states: StateTable,
}

impl ProcessRecord {
    pub fn key(&self) -> ProcessKey {
        ProcessKey {
            name: self.name.clone(),
            uid: self.uid,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Process that most recently hosted the service.
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub started_ms: u64,
    #[serde(default)]
    pub bound_ms: u64,
    #[serde(default)]
    pub executing_ms: u64,
}

impl ServiceRecord {
    /// Merges an older record into this one; the newer host name is kept.
    pub fn add(&mut self, older: &ServiceRecord) {
        if self.process_name.is_none() {
            self.process_name = older.process_name.clone();
        }
        self.started_ms = self.started_ms.saturating_add(older.started_ms);
        self.bound_ms = self.bound_ms.saturating_add(older.bound_ms);
        self.executing_ms = self.executing_ms.saturating_add(older.executing_ms);
    }

    pub fn run_ms(&self) -> u64 {
        self.started_ms.max(self.bound_ms).max(self.executing_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub uid: u32,
    /// The package's share of each process it ran in, by process name.
    #[serde(default)]
    pub processes: BTreeMap<String, StateTable>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRecord>,
}

impl PackageRecord {
    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.clone(),
            uid: self.uid,
        }
    }

    pub fn add(&mut self, older: &PackageRecord) {
        for (proc_name, table) in &older.processes {
            self.processes
                .entry(proc_name.clone())
                .or_default()
                .add(table);
        }
        for (svc_name, svc) in &older.services {
            self.services.entry(svc_name.clone()).or_default().add(svc);
        }
    }

    pub fn longest_service_run_ms(&self) -> u64 {
        self.services.values().map(ServiceRecord::run_ms).max().unwrap_or(0)
    }
}

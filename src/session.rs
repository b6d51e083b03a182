//! Refresh cycle: view options, cached snapshot across restarts, and the report
//! handed to renderers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::collections::{BTreeSet, HashMap};

use crate::{
    AccumulatedSnapshot, MemFactor, MemoryRatios, MergeOutcome, RankedEntry, RunState,
    StatsCategory, StatsResult, StatsService, WeightParams, compare_by_weight, compute_entries,
    evaluate_target_package, format_elapsed, merge, rank, resolve_states, summarize_memory_ratios,
};

/// The complete parameterization of one ranking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOptions {
    #[serde(default)]
    pub show_system: bool,
    #[serde(default)]
    pub use_uss: bool,
    #[serde(default)]
    pub stats_type: StatsCategory,
}

impl ViewOptions {
    /// The show-system toggle only applies to background processes.
    pub fn show_system_enabled(&self) -> bool {
        self.stats_type == StatsCategory::Background
    }

    pub fn states(&self) -> BTreeSet<RunState> {
        resolve_states(self.stats_type, self.show_system)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands an accumulated snapshot from a torn-down session to its replacement.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<SessionId, AccumulatedSnapshot>,
}

impl SnapshotCache {
    pub fn store_on_teardown(&mut self, id: SessionId, snapshot: AccumulatedSnapshot) {
        self.entries.insert(id, snapshot);
    }

    /// Takes the stored snapshot, if any; a second fetch returns `None`.
    pub fn fetch_on_init(&mut self, id: SessionId) -> Option<AccumulatedSnapshot> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub category: StatsCategory,
    pub category_label: String,
    pub show_system: bool,
    pub use_uss: bool,
    pub elapsed_ms: u64,
    pub elapsed: String,
    pub mem_state: String,
    pub total_time_ms: u64,
    pub max_weight: f64,
    pub memory: Option<MemoryRatios>,
    pub entries: Vec<RankedEntry>,
}

/// Runs the full pipeline over an already merged snapshot.
pub fn build_report(
    snapshot: &AccumulatedSnapshot,
    options: &ViewOptions,
    mem_state: i32,
    now_ms: u64,
) -> StatsReport {
    let states = options.states();
    let total_time_ms = snapshot.total_time_ms(now_ms);
    let params = WeightParams {
        states: &states,
        use_uss: options.use_uss,
        weight_with_time: options.stats_type.weights_with_time(),
        total_time_ms,
        with_services: options.stats_type == StatsCategory::Background,
    };

    let mut ranking = rank(compute_entries(snapshot, &params));
    for entry in ranking.entries.iter_mut() {
        let target = evaluate_target_package(entry, snapshot, &params, compare_by_weight);
        entry.best_target_package = target;
    }
    let max_weight = ranking.max_weight;

    StatsReport {
        category: options.stats_type,
        category_label: options.stats_type.label().to_string(),
        show_system: options.show_system,
        use_uss: options.use_uss,
        elapsed_ms: snapshot.elapsed_ms(),
        elapsed: format_elapsed(snapshot.elapsed_ms()),
        mem_state: MemFactor::from_index(mem_state)
            .map(|m| m.label().to_string())
            .unwrap_or_else(|| "?".to_string()),
        total_time_ms,
        max_weight,
        memory: summarize_memory_ratios(snapshot, total_time_ms),
        entries: ranking.with_percentages(total_time_ms),
    }
}

/// One viewer's state across refreshes.
#[derive(Debug)]
pub struct StatsSession {
    options: ViewOptions,
    min_coverage_ms: u64,
    snapshot: Option<AccumulatedSnapshot>,
    stale: bool,
    mem_state: i32,
    last_merge: Option<MergeOutcome>,
    report: Option<StatsReport>,
}

impl StatsSession {
    pub fn new(options: ViewOptions, min_coverage_ms: u64) -> Self {
        Self {
            options,
            min_coverage_ms,
            snapshot: None,
            stale: false,
            mem_state: crate::UNKNOWN_MEM_STATE,
            last_merge: None,
            report: None,
        }
    }

    /// Resumes with a snapshot left behind by a previous session, if any.
    pub fn restore(
        options: ViewOptions,
        min_coverage_ms: u64,
        cache: &mut SnapshotCache,
        id: SessionId,
    ) -> Self {
        let mut session = Self::new(options, min_coverage_ms);
        session.snapshot = cache.fetch_on_init(id);
        if session.snapshot.is_some() {
            tracing::debug!(session = %id.0, "restored cached snapshot");
        }
        session
    }

    /// Leaves the snapshot behind for the session that replaces this one.
    pub fn teardown(self, cache: &mut SnapshotCache, id: SessionId) {
        if let Some(snapshot) = self.snapshot {
            cache.store_on_teardown(id, snapshot);
        }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn snapshot(&self) -> Option<&AccumulatedSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn report(&self) -> Option<&StatsReport> {
        self.report.as_ref()
    }

    pub fn last_merge(&self) -> Option<MergeOutcome> {
        self.last_merge
    }

    /// Forces the next refresh to reload from the service. The current
    /// snapshot stays until a reload succeeds.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn toggle_show_system(&mut self) {
        self.options.show_system = !self.options.show_system;
    }

    pub fn toggle_use_uss(&mut self) {
        self.options.use_uss = !self.options.use_uss;
    }

    pub fn set_category(&mut self, category: StatsCategory) {
        self.options.stats_type = category;
    }

    /// Loads (when nothing is cached or after [`Self::invalidate`]) and
    /// re-ranks. A service failure leaves the previous snapshot and report in
    /// place. `now_ms` defaults to the moment the snapshot was captured.
    pub fn refresh<S: StatsService>(
        &mut self,
        service: &S,
        now_ms: Option<u64>,
    ) -> StatsResult<&StatsReport> {
        if self.snapshot.is_none() || self.stale {
            match self.load(service) {
                Ok((snapshot, mem_state, outcome)) => {
                    self.snapshot = Some(snapshot);
                    self.stale = false;
                    self.mem_state = mem_state;
                    self.last_merge = Some(outcome);
                }
                Err(err) => {
                    tracing::error!("failed to load process stats: {err}");
                    return Err(err);
                }
            }
        }

        let Some(snapshot) = self.snapshot.as_ref() else {
            return Err(crate::StatsError::Service("no snapshot available".to_string()));
        };
        let now = now_ms.unwrap_or(snapshot.captured_at_ms);
        let report = build_report(snapshot, &self.options, self.mem_state, now);
        tracing::debug!(
            category = ?self.options.stats_type,
            listed = report.entries.len(),
            max_weight = report.max_weight,
            "refreshed process stats"
        );
        let report = self.report.insert(report);
        Ok(&*report)
    }

    fn load<S: StatsService>(
        &self,
        service: &S,
    ) -> StatsResult<(AccumulatedSnapshot, i32, MergeOutcome)> {
        let mem_state = service.current_memory_state()?;
        let (current, historical) = service.current_stats()?;
        let (snapshot, outcome) = merge(current, historical, self.min_coverage_ms);
        tracing::info!(
            merged = outcome.merged,
            skipped = outcome.skipped,
            released = outcome.released,
            elapsed = %format_elapsed(snapshot.elapsed_ms()),
            "loaded process stats"
        );
        Ok((snapshot, mem_state, outcome))
    }
}

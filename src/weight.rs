//! Per-process weight computation, service attribution and target-package resolution.

use serde::Serialize;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::{AccumulatedSnapshot, ProcessKey, ProcessRecord, RunState, StateTable, StateUsage};

/// Inputs shared by every weight computation in one refresh.
#[derive(Debug, Clone, Copy)]
pub struct WeightParams<'a> {
    pub states: &'a BTreeSet<RunState>,
    pub use_uss: bool,
    pub weight_with_time: bool,
    /// Denominator for time-weighted costs.
    pub total_time_ms: u64,
    /// Attach hosted services to entries; only the background list shows them.
    pub with_services: bool,
}

/// A ranked-list candidate derived from one process record.
#[derive(Debug, Clone, Serialize)]
pub struct ProcEntry {
    pub name: String,
    pub uid: u32,
    pub package: String,
    /// Every package that ran code in this process.
    pub packages: Vec<String>,
    pub weight: f64,
    /// Unweighted time spent in the selected run-states.
    pub duration_ms: u64,
    pub avg_pss_kb: u64,
    pub max_pss_kb: u64,
    pub avg_uss_kb: u64,
    pub max_uss_kb: u64,
    pub services: Vec<String>,
    pub best_target_package: Option<String>,
}

impl ProcEntry {
    pub fn key(&self) -> ProcessKey {
        ProcessKey {
            name: self.name.clone(),
            uid: self.uid,
        }
    }

    /// Looks the source record back up; entries never own it.
    pub fn record<'a>(&self, snapshot: &'a AccumulatedSnapshot) -> Option<&'a ProcessRecord> {
        snapshot.processes.get(&self.key())
    }

    /// True when only one package ever ran in the process.
    pub fn is_unique(&self) -> bool {
        self.packages.len() <= 1
    }

    fn from_table(
        key: &ProcessKey,
        package: &str,
        table: &StateTable,
        params: &WeightParams<'_>,
    ) -> Self {
        let mut combined = StateUsage::default();
        let mut cost = 0.0f64;
        for (state, usage) in table.iter() {
            if !params.states.contains(&state.run) {
                continue;
            }
            combined.add(usage);
            cost += usage.avg_kb(params.use_uss) as f64
                * state.run.weight_multiplier()
                * usage.duration_ms as f64;
        }

        let denominator = if params.weight_with_time {
            params.total_time_ms
        } else {
            combined.duration_ms
        };
        let weight = if denominator == 0 {
            0.0
        } else {
            cost / denominator as f64
        };

        Self {
            name: key.name.clone(),
            uid: key.uid,
            package: package.to_string(),
            packages: Vec::new(),
            weight,
            duration_ms: combined.duration_ms,
            avg_pss_kb: combined.avg_pss_kb,
            max_pss_kb: combined.max_pss_kb,
            avg_uss_kb: combined.avg_uss_kb,
            max_uss_kb: combined.max_uss_kb,
            services: Vec::new(),
            best_target_package: None,
        }
    }
}

/// Builds one entry per process record, then attributes services to them when
/// `params.with_services` is set.
pub fn compute_entries(
    snapshot: &AccumulatedSnapshot,
    params: &WeightParams<'_>,
) -> Vec<ProcEntry> {
    let mut entries: Vec<ProcEntry> = snapshot
        .processes
        .iter()
        .map(|(key, record)| {
            let mut entry = ProcEntry::from_table(key, &record.package, &record.states, params);
            entry.packages = snapshot
                .packages_for_process(key)
                .into_iter()
                .map(|pkg| pkg.name.clone())
                .collect();
            if entry.packages.is_empty() {
                entry.packages.push(record.package.clone());
            }
            entry
        })
        .collect();
    if params.with_services {
        attribute_services(snapshot, &mut entries);
    }
    entries
}

/// Attaches each service to the entry of the process that hosted it. Services
/// whose host has no entry are skipped. Returns how many were attached.
pub fn attribute_services(snapshot: &AccumulatedSnapshot, entries: &mut [ProcEntry]) -> usize {
    let mut by_key: HashMap<ProcessKey, usize> = HashMap::with_capacity(entries.len());
    let mut by_name: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        by_key.insert(entry.key(), idx);
        by_name.entry(entry.name.clone()).or_insert(idx);
    }

    let mut attached = 0;
    for pkg in snapshot.packages.values() {
        for (svc_name, svc) in &pkg.services {
            let Some(host) = svc.process_name.as_deref() else {
                continue;
            };
            let key = ProcessKey {
                name: host.to_string(),
                uid: pkg.uid,
            };
            let Some(idx) = by_key.get(&key).or_else(|| by_name.get(host)).copied() else {
                tracing::debug!(
                    package = %pkg.name,
                    service = %svc_name,
                    process = %host,
                    "service host has no entry; skipping attribution"
                );
                continue;
            };
            entries[idx].services.push(svc_name.clone());
            attached += 1;
        }
    }
    attached
}

/// Picks the package whose icon and label represent a shared process.
///
/// Per-package shares of the process are ordered with `compare`. The first one
/// wins outright when it outweighs the second more than threefold; otherwise,
/// among shares weighing at least half of the first, the package whose
/// services ran longest wins.
pub fn evaluate_target_package<F>(
    entry: &ProcEntry,
    snapshot: &AccumulatedSnapshot,
    params: &WeightParams<'_>,
    compare: F,
) -> Option<String>
where
    F: Fn(&ProcEntry, &ProcEntry) -> Ordering,
{
    if entry.is_unique() {
        return entry
            .packages
            .first()
            .cloned()
            .or_else(|| Some(entry.package.clone()));
    }

    let key = entry.key();
    let pkgs = snapshot.packages_for_process(&key);
    let mut sub: Vec<(ProcEntry, u64)> = Vec::with_capacity(pkgs.len());
    for pkg in pkgs {
        let Some(table) = pkg.processes.get(&key.name) else {
            tracing::warn!(
                package = %pkg.name,
                process = %key.name,
                "package lost its process share"
            );
            continue;
        };
        sub.push((
            ProcEntry::from_table(&key, &pkg.name, table, params),
            pkg.longest_service_run_ms(),
        ));
    }
    sub.sort_by(|a, b| compare(&a.0, &b.0));

    match sub.as_slice() {
        [] => Some(entry.package.clone()),
        [only] => Some(only.0.package.clone()),
        [first, second, ..] => {
            if first.0.weight > second.0.weight * 3.0 {
                return Some(first.0.package.clone());
            }
            let max_weight = first.0.weight;
            let mut best: Option<(&ProcEntry, u64)> = None;
            for (candidate, run_ms) in &sub {
                if candidate.weight < max_weight / 2.0 {
                    continue;
                }
                if best.is_none_or(|(_, best_run)| *run_ms > best_run) {
                    best = Some((candidate, *run_ms));
                }
            }
            best.map(|(e, _)| e.package.clone())
                .or_else(|| Some(first.0.package.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::{process, snapshot, table};
    use crate::{
        PackageRecord, ServiceRecord, SnapshotFile, StatsCategory, compare_by_weight,
        resolve_states,
    };
    use std::collections::BTreeMap;

    fn params(states: &BTreeSet<RunState>, weight_with_time: bool, total: u64) -> WeightParams<'_> {
        WeightParams {
            states,
            use_uss: false,
            weight_with_time,
            total_time_ms: total,
            with_services: true,
        }
    }

    fn package(
        name: &str,
        uid: u32,
        procs: &[(&str, StateTable)],
        services: &[(&str, Option<&str>, u64)],
    ) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            uid,
            processes: procs
                .iter()
                .map(|(p, t)| (p.to_string(), t.clone()))
                .collect::<BTreeMap<_, _>>(),
            services: services
                .iter()
                .map(|(s, host, run)| {
                    (
                        s.to_string(),
                        ServiceRecord {
                            process_name: host.map(str::to_string),
                            started_ms: *run,
                            ..ServiceRecord::default()
                        },
                    )
                })
                .collect(),
        }
    }

    fn acc(file: SnapshotFile) -> AccumulatedSnapshot {
        AccumulatedSnapshot::from_file(file)
    }

    #[test]
    fn weight_accumulates_only_selected_states() {
        let mut file = snapshot(0, 1_000);
        file.processes.push(process(
            "com.example",
            10_001,
            &[
                (RunState::Service, 500, 2_000),
                (RunState::Top, 500, 50_000),
            ],
        ));
        let states = resolve_states(StatsCategory::Background, false);
        let entries = compute_entries(&acc(file), &params(&states, true, 1_000));
        assert_eq!(entries.len(), 1);
        // 2000 kB * 0.5 (service) * 500ms / 1000ms
        assert!((entries[0].weight - 500.0).abs() < 1e-9);
        assert_eq!(entries[0].duration_ms, 500);
        assert_eq!(entries[0].avg_pss_kb, 2_000);
    }

    #[test]
    fn service_states_weigh_less_than_foreground_states() {
        let mut file = snapshot(0, 1_000);
        file.processes
            .push(process("svc", 10_001, &[(RunState::Service, 1_000, 1_000)]));
        file.processes
            .push(process("fg", 10_002, &[(RunState::ImportantForeground, 1_000, 1_000)]));
        let states = resolve_states(StatsCategory::Background, false);
        let entries = compute_entries(&acc(file), &params(&states, true, 1_000));
        let fg = entries.iter().find(|e| e.name == "fg").expect("fg");
        let svc = entries.iter().find(|e| e.name == "svc").expect("svc");
        assert!(fg.weight > svc.weight);
    }

    #[test]
    fn use_uss_switches_memory_proxy() {
        let mut file = snapshot(0, 1_000);
        file.processes
            .push(process("p", 10_001, &[(RunState::Top, 1_000, 4_000)]));
        let states = resolve_states(StatsCategory::Foreground, false);
        let snapshot = acc(file);
        let mut p = params(&states, false, 1_000);
        let pss = compute_entries(&snapshot, &p)[0].weight;
        p.use_uss = true;
        let uss = compute_entries(&snapshot, &p)[0].weight;
        assert!((pss - 4_000.0).abs() < 1e-9);
        assert!((uss - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn zero_denominators_give_zero_weight() {
        let mut file = snapshot(0, 1_000);
        file.processes
            .push(process("p", 10_001, &[(RunState::Service, 1_000, 4_000)]));
        let states = resolve_states(StatsCategory::Background, false);
        let snapshot = acc(file);
        assert_eq!(compute_entries(&snapshot, &params(&states, true, 0))[0].weight, 0.0);
        let cached = resolve_states(StatsCategory::Cached, false);
        let entry = &compute_entries(&snapshot, &params(&cached, false, 1_000))[0];
        assert_eq!(entry.weight, 0.0);
        assert_eq!(entry.duration_ms, 0);
    }

    #[test]
    fn services_attach_to_their_host_and_missing_hosts_are_skipped() {
        let mut file = snapshot(0, 1_000);
        file.processes
            .push(process("com.mail", 10_010, &[(RunState::Service, 10, 100)]));
        file.packages.push(package(
            "com.mail",
            10_010,
            &[("com.mail", table(&[(RunState::Service, 10, 100)]))],
            &[
                ("SyncService", Some("com.mail"), 10),
                ("GhostService", Some("com.mail:gone"), 10),
                ("IdleService", None, 0),
            ],
        ));
        let snapshot = acc(file);
        let states = resolve_states(StatsCategory::Background, false);
        let entries = compute_entries(&snapshot, &params(&states, true, 1_000));
        assert_eq!(entries[0].services, vec!["SyncService".to_string()]);
        assert!(entries[0].record(&snapshot).is_some());

        let mut quiet = params(&states, true, 1_000);
        quiet.with_services = false;
        assert!(compute_entries(&snapshot, &quiet)[0].services.is_empty());
    }

    fn shared_snapshot(a_pss: u64, b_pss: u64, a_run: u64, b_run: u64) -> AccumulatedSnapshot {
        let mut file = snapshot(0, 1_000);
        file.processes.push(process(
            "android.shared",
            1_000,
            &[(RunState::Service, 1_000, a_pss + b_pss)],
        ));
        file.packages.push(package(
            "com.alpha",
            1_000,
            &[("android.shared", table(&[(RunState::Service, 1_000, a_pss)]))],
            &[("AlphaService", Some("android.shared"), a_run)],
        ));
        file.packages.push(package(
            "com.beta",
            1_000,
            &[("android.shared", table(&[(RunState::Service, 1_000, b_pss)]))],
            &[("BetaService", Some("android.shared"), b_run)],
        ));
        acc(file)
    }

    #[test]
    fn dominant_package_wins_target_resolution() {
        let snapshot = shared_snapshot(10_000, 1_000, 0, 50);
        let states = resolve_states(StatsCategory::Background, false);
        let p = params(&states, true, 1_000);
        let entries = compute_entries(&snapshot, &p);
        assert!(!entries[0].is_unique());
        let target = evaluate_target_package(&entries[0], &snapshot, &p, compare_by_weight);
        assert_eq!(target.as_deref(), Some("com.alpha"));
    }

    #[test]
    fn close_packages_resolve_by_longest_running_service() {
        let snapshot = shared_snapshot(10_000, 8_000, 10, 500);
        let states = resolve_states(StatsCategory::Background, false);
        let p = params(&states, true, 1_000);
        let entries = compute_entries(&snapshot, &p);
        let target = evaluate_target_package(&entries[0], &snapshot, &p, compare_by_weight);
        assert_eq!(target.as_deref(), Some("com.beta"));
        let again = evaluate_target_package(&entries[0], &snapshot, &p, compare_by_weight);
        assert_eq!(target, again);
    }

    #[test]
    fn unique_process_resolves_to_own_package() {
        let mut file = snapshot(0, 1_000);
        file.processes
            .push(process("com.solo", 10_020, &[(RunState::Service, 10, 100)]));
        let snapshot = acc(file);
        let states = resolve_states(StatsCategory::Background, false);
        let p = params(&states, true, 1_000);
        let entries = compute_entries(&snapshot, &p);
        assert_eq!(
            evaluate_target_package(&entries[0], &snapshot, &p, compare_by_weight).as_deref(),
            Some("com.solo")
        );
    }
}

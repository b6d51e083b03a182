//! Ordering, truncation and significance filtering of process entries.

use serde::Serialize;

use std::cmp::Ordering;

use crate::ProcEntry;

pub const MAX_ITEMS_TO_LIST: usize = 40;

/// Entries below this share of the heaviest entry are not listed.
pub const MIN_PERCENT_OF_WEIGHT: f64 = 2.0;

/// Heaviest first. Equal weights compare equal so a stable sort keeps input order.
pub fn compare_by_weight(lhs: &ProcEntry, rhs: &ProcEntry) -> Ordering {
    rhs.weight.total_cmp(&lhs.weight)
}

#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    /// Weight of the heaviest entry after truncation; 0 for an empty list.
    pub max_weight: f64,
    pub entries: Vec<ProcEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry {
    #[serde(flatten)]
    pub entry: ProcEntry,
    pub percent_of_weight: f64,
    /// `None` when there is no elapsed time to compare against.
    pub percent_of_time: Option<f64>,
}

pub fn rank(mut entries: Vec<ProcEntry>) -> Ranking {
    entries.sort_by(compare_by_weight);
    entries.truncate(MAX_ITEMS_TO_LIST);

    let max_weight = entries.first().map(|e| e.weight).unwrap_or(0.0);
    if max_weight <= 0.0 {
        return Ranking {
            max_weight: 0.0,
            entries: Vec::new(),
        };
    }

    let visible = entries
        .iter()
        .take_while(|e| percent_of(e.weight, max_weight) >= MIN_PERCENT_OF_WEIGHT)
        .count();
    entries.truncate(visible);
    Ranking {
        max_weight,
        entries,
    }
}

impl Ranking {
    pub fn with_percentages(self, total_time_ms: u64) -> Vec<RankedEntry> {
        let max_weight = self.max_weight;
        self.entries
            .into_iter()
            .map(|entry| {
                let percent_of_time = (total_time_ms > 0)
                    .then(|| percent_of(entry.duration_ms as f64, total_time_ms as f64));
                RankedEntry {
                    percent_of_weight: percent_of(entry.weight, max_weight),
                    percent_of_time,
                    entry,
                }
            })
            .collect()
    }
}

fn percent_of(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    value / max * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, weight: f64) -> ProcEntry {
        ProcEntry {
            name: name.to_string(),
            uid: 10_000,
            package: name.to_string(),
            packages: vec![name.to_string()],
            weight,
            duration_ms: 500,
            avg_pss_kb: 0,
            max_pss_kb: 0,
            avg_uss_kb: 0,
            max_uss_kb: 0,
            services: Vec::new(),
            best_target_package: None,
        }
    }

    fn names(ranking: &Ranking) -> Vec<&str> {
        ranking.entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn one_percent_entry_falls_below_floor() {
        let ranking = rank(vec![entry("b", 1.0), entry("a", 100.0)]);
        assert_eq!(ranking.max_weight, 100.0);
        assert_eq!(names(&ranking), vec!["a"]);
    }

    #[test]
    fn forty_five_entries_truncate_to_forty_heaviest() {
        let entries: Vec<ProcEntry> = (0..45)
            .map(|i| entry(&format!("p{i:02}"), 1_000.0 - i as f64))
            .collect();
        let ranking = rank(entries);
        assert_eq!(ranking.entries.len(), MAX_ITEMS_TO_LIST);
        assert_eq!(ranking.entries[0].name, "p00");
        assert_eq!(ranking.entries[39].name, "p39");
        assert!(ranking
            .entries
            .windows(2)
            .all(|w| w[0].weight > w[1].weight));
    }

    #[test]
    fn ties_keep_input_order_and_rerun_is_identical() {
        let input = vec![
            entry("x", 5.0),
            entry("y", 9.0),
            entry("z", 5.0),
            entry("w", 5.0),
        ];
        let first = rank(input.clone());
        let second = rank(input);
        assert_eq!(names(&first), vec!["y", "x", "z", "w"]);
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn zero_max_weight_lists_nothing() {
        let ranking = rank(vec![entry("a", 0.0), entry("b", 0.0)]);
        assert_eq!(ranking.max_weight, 0.0);
        assert!(ranking.entries.is_empty());
        assert!(rank(Vec::new()).entries.is_empty());
    }

    #[test]
    fn floor_is_relative_to_max_weight() {
        let ranking = rank(vec![
            entry("a", 1_000.0),
            entry("b", 25.0),
            entry("c", 15.0),
            entry("d", 500.0),
        ]);
        assert_eq!(names(&ranking), vec!["a", "d", "b"]);
        assert!(ranking
            .entries
            .iter()
            .all(|e| e.weight >= 0.02 * ranking.max_weight));
    }

    #[test]
    fn percentages_guard_zero_total_time() {
        let ranking = rank(vec![entry("a", 10.0), entry("b", 5.0)]);
        let with_time = ranking.clone().with_percentages(1_000);
        assert_eq!(with_time[0].percent_of_weight, 100.0);
        assert_eq!(with_time[1].percent_of_weight, 50.0);
        assert_eq!(with_time[0].percent_of_time, Some(50.0));
        let without = ranking.with_percentages(0);
        assert!(without.iter().all(|e| e.percent_of_time.is_none()));
    }
}

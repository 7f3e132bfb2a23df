//! What a run prints.
//!

use crate::combine::FinalMapping;
use crate::strategy::{all_equivalent, Outcome, Strategy};
use crate::Key;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrategyReport {
    pub strategy: Strategy,
    pub distinct_keys: usize,
    pub total_count: u64,
    pub records_shuffled: u64,
    pub shuffle_rounds: u64,
    pub malformed_records: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopKey {
    pub key: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub run_id: String,
    pub workload: String,
    pub seed: u64,
    pub documents: u64,
    /// Whether every strategy produced the same mapping.
    pub consistent: bool,
    pub average_key_length: f64,
    pub strategies: Vec<StrategyReport>,
    pub top: Vec<TopKey>,
}

/// Mean length of the distinct keys, in characters. Zero for an empty mapping.
pub fn average_key_length<K: Key>(mapping: &FinalMapping<K>) -> f64 {
    if mapping.is_empty() {
        return 0.0;
    }
    let total: usize = mapping.keys().map(|key| key.to_string().chars().count()).sum();
    total as f64 / mapping.len() as f64
}

/// The `h` most frequent keys; ties go to the smaller key.
pub fn top_keys<K: Key>(mapping: &FinalMapping<K>, h: usize) -> Vec<(K, u64)> {
    let mut entries: Vec<(K, u64)> = mapping.iter().map(|(k, c)| (k.clone(), *c)).collect();
    // the map is already in key order, so a stable sort keeps ties sorted
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(h);
    entries
}

impl Report {
    /// Summarize the outcomes of one run. The first outcome provides the
    /// average key length and the top keys.
    pub fn new<K: Key>(
        run_id: impl ToString,
        workload: &str,
        seed: u64,
        outcomes: &[Outcome<K>],
        h: usize,
    ) -> Self {
        let first = outcomes.first();
        Self {
            run_id: run_id.to_string(),
            workload: workload.to_string(),
            seed,
            documents: first.map(|o| o.stats.documents).unwrap_or_default(),
            consistent: all_equivalent(outcomes),
            average_key_length: first
                .map(|o| average_key_length(&o.mapping))
                .unwrap_or_default(),
            strategies: outcomes
                .iter()
                .map(|o| StrategyReport {
                    strategy: o.strategy,
                    distinct_keys: o.mapping.len(),
                    total_count: o.mapping.values().sum(),
                    records_shuffled: o.stats.shuffle.records,
                    shuffle_rounds: o.stats.shuffle.rounds,
                    malformed_records: o.stats.malformed_records,
                })
                .collect(),
            top: first
                .map(|o| top_keys(&o.mapping, h))
                .unwrap_or_default()
                .into_iter()
                .map(|(key, count)| TopKey {
                    key: key.to_string(),
                    count,
                })
                .collect(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of documents = {}", self.documents)?;
        for s in &self.strategies {
            writeln!(
                f,
                "Number of distinct keys using {} = {} (total {}, {} records shuffled in {} rounds, {} malformed)",
                s.strategy,
                s.distinct_keys,
                s.total_count,
                s.records_shuffled,
                s.shuffle_rounds,
                s.malformed_records
            )?;
        }
        writeln!(f, "Average key length = {:.4}", self.average_key_length)?;
        if !self.top.is_empty() {
            writeln!(f, "Top {} keys:", self.top.len())?;
            for t in &self.top {
                writeln!(f, "{} {}", t.key, t.count)?;
            }
        }
        Ok(())
    }
}

//! The four aggregation pipelines.
//!
//! | strategy    | pre-aggregation                                | shuffles |
//! |-------------|------------------------------------------------|----------|
//! | `direct`    | none, one record per key occurrence            | 1        |
//! | `bucketed`  | per document, then per random bucket (tagged)  | 2        |
//! | `grouped`   | per document, then per random bucket (grouper) | 2        |
//! | `partition` | per physical partition                         | 1        |
//!
//! All four fold with the same [`combine`](crate::combine) and produce the
//! same [`FinalMapping`]; they differ only in how many records they move.

use crate::bucket::{FanOut, RandomSource};
use crate::combine::{combine, combine_keys, CombineScope, FinalMapping};
use crate::standalone::engine::{Dataset, ShuffleStats};
use crate::workload::Tokenizer;
use crate::{AggError, Document, Key, Observation, Result};
use serde::Serialize;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, info_span, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Emit every occurrence, redistribute by key, reduce.
    Direct,
    /// Combine per document, tag with a random bucket, combine per bucket,
    /// then reduce by key.
    Bucketed,
    /// Combine per document, group by a random bucket function, combine per
    /// bucket, then reduce by key.
    Grouped,
    /// Combine per partition, redistribute by key, sum.
    Partition,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Direct,
        Strategy::Bucketed,
        Strategy::Grouped,
        Strategy::Partition,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Bucketed => "bucketed",
            Strategy::Grouped => "grouped",
            Strategy::Partition => "partition",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Knobs shared by every pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of random buckets; disabled means every observation shares bucket 0.
    pub fan_out: FanOut,
    /// Number of reduce partitions after each shuffle.
    pub reducers: usize,
    pub random: RandomSource,
    /// Malformed records a single partition may skip before it fails.
    pub max_malformed: Option<usize>,
}

impl PipelineConfig {
    /// `k` buckets and `k` reducers.
    pub fn new(k: NonZeroU32, random: RandomSource) -> Self {
        Self {
            fan_out: FanOut::Buckets(k),
            reducers: k.get() as usize,
            random,
            max_malformed: None,
        }
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_max_malformed(mut self, limit: Option<usize>) -> Self {
        self.max_malformed = limit;
        self
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub documents: u64,
    pub malformed_records: u64,
    pub shuffle: ShuffleStats,
}

/// The result of one pipeline.
#[derive(Clone, Debug)]
pub struct Outcome<K: Key> {
    pub strategy: Strategy,
    pub mapping: FinalMapping<K>,
    pub stats: RunStats,
}

/// Run one pipeline over `docs`.
///
/// The input is left untouched, so the same dataset can feed every strategy.
/// Either every partition succeeds and a complete mapping is returned, or
/// the first failure is returned and nothing else.
pub fn run<T: Tokenizer>(
    strategy: Strategy,
    docs: &Dataset<Document>,
    tokenizer: &T,
    config: &PipelineConfig,
) -> Result<Outcome<T::Key>> {
    let span = info_span!("strategy", %strategy);
    let _guard = span.enter();

    let input = docs.fork();
    let documents = input.len() as u64;
    let malformed = AtomicU64::new(0);
    let keys = tokenize(input, tokenizer, config, &malformed)?;

    let reduced = match strategy {
        Strategy::Direct => direct_reduce(keys, config),
        Strategy::Bucketed => bucketed_combine(keys, config),
        Strategy::Grouped => grouped_by_bucket(keys, config),
        Strategy::Partition => partition_combine(keys, config),
    };
    let shuffle = reduced.shuffle_stats();
    let mapping = combine(CombineScope::Global, reduced.collect()).into_final();

    let stats = RunStats {
        documents,
        malformed_records: malformed.into_inner(),
        shuffle,
    };
    info!(
        keys = mapping.len(),
        records_shuffled = shuffle.records,
        rounds = shuffle.rounds,
        malformed = stats.malformed_records,
        "pipeline finished"
    );
    Ok(Outcome {
        strategy,
        mapping,
        stats,
    })
}

/// Run several pipelines over the same input, in order.
pub fn run_all<T: Tokenizer>(
    strategies: &[Strategy],
    docs: &Dataset<Document>,
    tokenizer: &T,
    config: &PipelineConfig,
) -> Result<Vec<Outcome<T::Key>>> {
    strategies
        .iter()
        .map(|strategy| run(*strategy, docs, tokenizer, config))
        .collect()
}

/// Whether every outcome carries the same final mapping.
pub fn all_equivalent<K: Key>(outcomes: &[Outcome<K>]) -> bool {
    outcomes
        .windows(2)
        .all(|pair| pair[0].mapping == pair[1].mapping)
}

/// Tokenize every document; each record of the result is the key multiset
/// of one document.
fn tokenize<T: Tokenizer>(
    docs: Dataset<Document>,
    tokenizer: &T,
    config: &PipelineConfig,
    malformed: &AtomicU64,
) -> Result<Dataset<Vec<T::Key>>> {
    docs.try_map_partitions(|partition, documents| {
        let mut skipped = 0usize;
        let mut keys = Vec::with_capacity(documents.len());
        for doc in &documents {
            let tokens = tokenizer.tokenize(doc);
            for error in tokens.malformed {
                if !error.is_recoverable() {
                    return Err(error);
                }
                warn!(partition, "skipping record: {error}");
                skipped += 1;
            }
            keys.push(tokens.keys);
        }
        malformed.fetch_add(skipped as u64, Ordering::Relaxed);
        match config.max_malformed {
            Some(limit) if skipped > limit => Err(AggError::PartitionFailure {
                partition,
                reason: format!("{skipped} malformed records, limit is {limit}"),
            }),
            _ => Ok(keys),
        }
    })
}

/// No pre-aggregation at all: every occurrence crosses the shuffle.
fn direct_reduce<K: Key>(docs: Dataset<Vec<K>>, config: &PipelineConfig) -> Dataset<Observation<K>> {
    debug!("emitting one observation per occurrence");
    docs.flat_map(|keys| keys.into_iter().map(|key| (key, 1)))
        .reduce_by_key(config.reducers, |a, b| a + b)
}

/// Bucket ids are attached to each observation as a tag, then shuffled on.
fn bucketed_combine<K: Key>(docs: Dataset<Vec<K>>, config: &PipelineConfig) -> Dataset<Observation<K>> {
    let fan_out = config.fan_out;
    docs.map_partitions(|partition, docs| {
        let mut assigner = config.random.assigner(fan_out, "tag", partition);
        docs.into_iter()
            .flat_map(|keys| combine_keys(CombineScope::Document, keys))
            .map(|observation| assigner.tag(observation).into_parts())
            .collect()
    })
    .group_by_key(config.reducers)
    .flat_map(|(_bucket, observations)| combine(CombineScope::Bucket, observations))
    .reduce_by_key(config.reducers, |a, b| a + b)
}

/// The bucket is drawn by the grouping function at shuffle time.
fn grouped_by_bucket<K: Key>(docs: Dataset<Vec<K>>, config: &PipelineConfig) -> Dataset<Observation<K>> {
    let fan_out = config.fan_out;
    docs.flat_map(|keys| combine_keys(CombineScope::Document, keys))
        .group_by(config.reducers, |partition| {
            let mut assigner = config.random.assigner(fan_out, "group", partition);
            move |_: &Observation<K>| assigner.next_bucket().unwrap_or_default()
        })
        .flat_map(|(_bucket, observations)| combine(CombineScope::Bucket, observations))
        .reduce_by_key(config.reducers, |a, b| a + b)
}

/// One combine per physical partition before the only shuffle.
fn partition_combine<K: Key>(docs: Dataset<Vec<K>>, config: &PipelineConfig) -> Dataset<Observation<K>> {
    docs.map_partitions(|_, docs| {
        combine_keys(CombineScope::Partition, docs.into_iter().flatten())
            .into_iter()
            .collect()
    })
    .group_by_key(config.reducers)
    .map_values(|counts| counts.into_iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::wc::WordCount;

    fn docs(texts: &[&str], partitions: usize) -> Dataset<Document> {
        let documents = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Document::new(i, text.to_string()))
            .collect();
        Dataset::from_records(documents, partitions)
    }

    fn config(k: u32) -> PipelineConfig {
        PipelineConfig::new(NonZeroU32::new(k).unwrap(), RandomSource::seeded(11))
    }

    #[test]
    fn two_documents_agree_under_every_strategy() {
        let expected = FinalMapping::from([
            ("a".to_string(), 2),
            ("b".to_string(), 2),
            ("c".to_string(), 1),
        ]);
        for k in [1, 2, 4] {
            let input = docs(&["a b a", "b c"], k as usize);
            for outcome in run_all(&Strategy::ALL, &input, &WordCount, &config(k)).unwrap() {
                assert_eq!(outcome.mapping, expected, "{} with K={k}", outcome.strategy);
                assert_eq!(outcome.stats.documents, 2);
            }
        }
    }

    #[test]
    fn partition_combine_moves_fewer_records_than_direct_reduce() {
        let input = docs(&["x x x x y", "x y y", "x"], 2);
        let direct = run(Strategy::Direct, &input, &WordCount, &config(2)).unwrap();
        let partition = run(Strategy::Partition, &input, &WordCount, &config(2)).unwrap();
        assert_eq!(direct.stats.shuffle, ShuffleStats { rounds: 1, records: 9 });
        assert_eq!(partition.stats.shuffle.rounds, 1);
        assert!(partition.stats.shuffle.records <= 4);
        assert_eq!(direct.mapping, partition.mapping);
    }

    #[test]
    fn bucketed_strategies_shuffle_twice() {
        let input = docs(&["a b", "c"], 2);
        for strategy in [Strategy::Bucketed, Strategy::Grouped] {
            let outcome = run(strategy, &input, &WordCount, &config(3)).unwrap();
            assert_eq!(outcome.stats.shuffle.rounds, 2);
        }
    }

    #[test]
    fn disabled_fan_out_puts_everything_in_one_bucket() {
        let input = docs(&["a b a", "b c", "c c d"], 3);
        let untagged = config(3).with_fan_out(FanOut::from_raw(-1).unwrap());
        let direct = run(Strategy::Direct, &input, &WordCount, &untagged).unwrap();
        for strategy in [Strategy::Bucketed, Strategy::Grouped] {
            let outcome = run(strategy, &input, &WordCount, &untagged).unwrap();
            assert_eq!(outcome.mapping, direct.mapping, "{strategy}");
            assert_eq!(outcome.stats.shuffle.rounds, 2);
        }
    }

    #[test]
    fn malformed_limit_fails_the_whole_run() {
        let input = Dataset::from_partitions(vec![
            vec![Document::new(0, "fine words")],
            vec![Document::new(1, vec![0xffu8]), Document::new(2, vec![0xfeu8])],
        ]);
        let strict = config(2).with_max_malformed(Some(1));
        let err = run(Strategy::Direct, &input, &WordCount, &strict).unwrap_err();
        assert!(matches!(err, AggError::PartitionFailure { partition: 1, .. }));

        let lenient = run(Strategy::Direct, &input, &WordCount, &config(2)).unwrap();
        assert_eq!(lenient.stats.malformed_records, 2);
        assert_eq!(lenient.mapping.len(), 2);
    }

    struct Unreadable;

    impl Tokenizer for Unreadable {
        type Key = String;

        fn tokenize(&self, doc: &Document) -> crate::workload::Tokens<String> {
            crate::workload::Tokens::from_malformed(AggError::PartitionFailure {
                partition: doc.index,
                reason: "out of memory".into(),
            })
        }
    }

    #[test]
    fn unrecoverable_tokenizer_errors_abort_the_run() {
        let input = docs(&["a", "b"], 2);
        let err = run(Strategy::Partition, &input, &Unreadable, &config(2)).unwrap_err();
        assert!(matches!(err, AggError::PartitionFailure { .. }));
    }

    #[test]
    fn empty_input_yields_an_empty_mapping() {
        let input = docs(&[], 3);
        for outcome in run_all(&Strategy::ALL, &input, &WordCount, &config(3)).unwrap() {
            assert!(outcome.mapping.is_empty());
        }
    }
}

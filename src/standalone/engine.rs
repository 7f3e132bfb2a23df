//! An in-process partitioned dataset.
//!
//! This is the stand-in for a distributed runtime: records live in
//! partitions, each partition is processed by its own rayon task, and the
//! only synchronization points are the shuffles, where every producer has to
//! finish before any reducer starts.

use crate::{ihash, Key, Result};
use dashmap::DashMap;
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// types related to this engine
type ReducerIndex = u32;
type Buckets<T> = DashMap<ReducerIndex, Vec<T>>;

/// What the shuffles of one pipeline cost.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ShuffleStats {
    /// Number of redistributions.
    pub rounds: u64,
    /// Records moved across all redistributions.
    pub records: u64,
}

#[derive(Debug, Default)]
struct ShuffleCounters {
    rounds: AtomicU64,
    records: AtomicU64,
}

impl ShuffleCounters {
    fn record(&self, moved: u64) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(moved, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ShuffleStats {
        ShuffleStats {
            rounds: self.rounds.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
        }
    }
}

/// A collection of records split into partitions.
///
/// Every transformation consumes the dataset, so a partition is owned by
/// exactly one worker until a shuffle hands its records to the next stage.
#[derive(Debug)]
pub struct Dataset<T> {
    partitions: Vec<Vec<T>>,
    counters: Arc<ShuffleCounters>,
}

impl<T: Send + Sync> Dataset<T> {
    pub fn from_partitions(partitions: Vec<Vec<T>>) -> Self {
        Self {
            partitions,
            counters: Arc::default(),
        }
    }

    /// Split `records` into `n` contiguous partitions of near-equal size.
    pub fn from_records(records: Vec<T>, n: usize) -> Self {
        let n = n.max(1);
        let chunk = records.len().div_ceil(n).max(1);
        let mut partitions: Vec<Vec<T>> = Vec::with_capacity(n);
        let mut records = records.into_iter();
        while partitions.len() < n {
            partitions.push(records.by_ref().take(chunk).collect());
        }
        Self::from_partitions(partitions)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn partitions(&self) -> &[Vec<T>] {
        &self.partitions
    }

    pub fn shuffle_stats(&self) -> ShuffleStats {
        self.counters.snapshot()
    }

    /// A copy of this dataset with its own shuffle counters.
    pub fn fork(&self) -> Self
    where
        T: Clone,
    {
        Self::from_partitions(self.partitions.clone())
    }

    /// Spread all records round-robin over `n` partitions.
    pub fn repartition(self, n: usize) -> Self {
        let n = n.max(1);
        let moved = self.len() as u64;
        let mut partitions: Vec<Vec<T>> = (0..n).map(|_| Vec::new()).collect();
        for (i, record) in self.partitions.into_iter().flatten().enumerate() {
            partitions[i % n].push(record);
        }
        self.counters.record(moved);
        debug!(partitions = n, records = moved, "repartitioned");
        Dataset {
            partitions,
            counters: self.counters,
        }
    }

    /// Apply `f` to every record.
    pub fn map<U, F>(self, f: F) -> Dataset<U>
    where
        U: Send + Sync,
        F: Fn(T) -> U + Sync + Send,
    {
        let partitions = self
            .partitions
            .into_par_iter()
            .map(|partition| partition.into_iter().map(&f).collect())
            .collect();
        Dataset {
            partitions,
            counters: self.counters,
        }
    }

    /// Replace every record with zero or more records.
    pub fn flat_map<U, I, F>(self, f: F) -> Dataset<U>
    where
        U: Send + Sync,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Sync + Send,
    {
        let partitions = self
            .partitions
            .into_par_iter()
            .map(|partition| partition.into_iter().flat_map(&f).collect())
            .collect();
        Dataset {
            partitions,
            counters: self.counters,
        }
    }

    /// Transform whole partitions. `f` receives the partition index.
    pub fn map_partitions<U, F>(self, f: F) -> Dataset<U>
    where
        U: Send + Sync,
        F: Fn(usize, Vec<T>) -> Vec<U> + Sync + Send,
    {
        let partitions = self
            .partitions
            .into_par_iter()
            .enumerate()
            .map(|(i, partition)| f(i, partition))
            .collect();
        Dataset {
            partitions,
            counters: self.counters,
        }
    }

    /// Like [`Dataset::map_partitions`], but any failed partition fails the
    /// whole dataset and no partial output survives.
    pub fn try_map_partitions<U, F>(self, f: F) -> Result<Dataset<U>>
    where
        U: Send + Sync,
        F: Fn(usize, Vec<T>) -> Result<Vec<U>> + Sync + Send,
    {
        let partitions = self
            .partitions
            .into_par_iter()
            .enumerate()
            .map(|(i, partition)| f(i, partition))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset {
            partitions,
            counters: self.counters,
        })
    }

    /// Group records by an arbitrary function and shuffle the groups over
    /// `n` partitions.
    ///
    /// `make` is called once per partition and returns that partition's
    /// grouping function, so stateful groupers (a random generator, say) are
    /// never shared between workers.
    pub fn group_by<G, F, M>(self, n: usize, make: M) -> Dataset<(G, Vec<T>)>
    where
        G: Key,
        M: Fn(usize) -> F + Sync + Send,
        F: FnMut(&T) -> G,
    {
        self.map_partitions(|i, partition| {
            let mut group_of = make(i);
            partition
                .into_iter()
                .map(|record| (group_of(&record), record))
                .collect()
        })
        .group_by_key(n)
    }

    pub fn collect(self) -> Vec<T> {
        self.partitions.into_iter().flatten().collect()
    }
}

impl<K: Key, V: Send + Sync> Dataset<(K, V)> {
    /// Move every record to reducer `ihash(key) % n` and gather the values
    /// of each key.
    pub fn group_by_key(self, n: usize) -> Dataset<(K, Vec<V>)> {
        let n = n.max(1);
        let buckets: Buckets<(K, V)> = Buckets::new();
        let moved = AtomicU64::new(0);

        // The map side: each worker splits its own partition first, then
        // hands every slice to its reducer in one go.
        self.partitions.into_par_iter().for_each(|partition| {
            moved.fetch_add(partition.len() as u64, Ordering::Relaxed);
            let mut local: Vec<Vec<(K, V)>> = (0..n).map(|_| Vec::new()).collect();
            for (key, value) in partition {
                let reducer = ihash(&key) as usize % n;
                local[reducer].push((key, value));
            }
            for (reducer, records) in local.into_iter().enumerate() {
                if records.is_empty() {
                    continue;
                }
                #[allow(clippy::unwrap_or_default)]
                buckets
                    .entry(reducer as ReducerIndex)
                    .or_insert(Vec::new())
                    .extend(records);
            }
        });

        let moved = moved.into_inner();
        self.counters.record(moved);
        debug!(reducers = n, records = moved, "shuffled by key");

        let mut slots: Vec<Vec<(K, V)>> = (0..n).map(|_| Vec::new()).collect();
        for (reducer, records) in buckets.into_iter() {
            slots[reducer as usize] = records;
        }

        // The reduce side: sort each bucket and gather runs of equal keys.
        let partitions = slots
            .into_par_iter()
            .map(|mut bkt| {
                bkt.sort_by(|a, b| a.0.cmp(&b.0));
                let runs = bkt.into_iter().chunk_by(|(key, _)| key.clone());
                let grouped = runs
                    .into_iter()
                    .map(|(key, group)| (key, group.map(|(_, value)| value).collect()))
                    .collect::<Vec<_>>();
                grouped
            })
            .collect();

        Dataset {
            partitions,
            counters: self.counters,
        }
    }

    /// Shuffle by key, then fold the values of each key with `f`.
    ///
    /// Values are only combined after the shuffle; nothing is pre-aggregated
    /// on the map side.
    pub fn reduce_by_key<F>(self, n: usize, f: F) -> Dataset<(K, V)>
    where
        F: Fn(V, V) -> V + Sync + Send,
    {
        self.group_by_key(n)
            .flat_map(|(key, values)| values.into_iter().reduce(&f).map(|value| (key, value)))
    }

    pub fn map_values<U, F>(self, f: F) -> Dataset<(K, U)>
    where
        U: Send + Sync,
        F: Fn(V) -> U + Sync + Send,
    {
        self.map(|(key, value)| (key, f(value)))
    }
}

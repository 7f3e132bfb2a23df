//! The associative fold shared by every pipeline.
//!
//! The same combine runs per document, per physical partition, per random
//! bucket, and after the last shuffle. It only ever adds counts, so the
//! result does not depend on the order or the grouping of its input.

use crate::{Key, Observation};
use fnv::FnvHashMap;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// Where a combine step runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CombineScope {
    Document,
    Partition,
    Bucket,
    Global,
}

impl fmt::Display for CombineScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombineScope::Document => "document",
            CombineScope::Partition => "partition",
            CombineScope::Bucket => "bucket",
            CombineScope::Global => "global",
        };
        f.write_str(name)
    }
}

/// The key to count table produced by a whole run.
///
/// Ordered by key, so that mappings from different strategies compare
/// (and print) identically.
pub type FinalMapping<K> = BTreeMap<K, u64>;

/// Counts for a subset of the documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialMapping<K: Key> {
    counts: FnvHashMap<K, u64>,
}

impl<K: Key> Default for PartialMapping<K> {
    fn default() -> Self {
        Self {
            counts: FnvHashMap::default(),
        }
    }
}

impl<K: Key> PartialMapping<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` occurrences of `key`. Zero counts leave the mapping unchanged.
    #[inline]
    pub fn add(&mut self, key: K, count: u64) {
        if count == 0 {
            return;
        }
        *self.counts.entry(key).or_insert(0) += count;
    }

    /// Merge another partial mapping into this one.
    pub fn merge(&mut self, mut other: PartialMapping<K>) {
        if other.counts.len() > self.counts.len() {
            std::mem::swap(&mut self.counts, &mut other.counts);
        }
        for (key, count) in other.counts {
            self.add(key, count);
        }
    }

    pub fn get(&self, key: &K) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &u64)> {
        self.counts.iter()
    }

    pub fn into_final(self) -> FinalMapping<K> {
        self.counts.into_iter().collect()
    }
}

impl<K: Key> FromIterator<Observation<K>> for PartialMapping<K> {
    fn from_iter<I: IntoIterator<Item = Observation<K>>>(iter: I) -> Self {
        let mut mapping = PartialMapping::new();
        mapping.extend(iter);
        mapping
    }
}

impl<K: Key> Extend<Observation<K>> for PartialMapping<K> {
    fn extend<I: IntoIterator<Item = Observation<K>>>(&mut self, iter: I) {
        for (key, count) in iter {
            self.add(key, count);
        }
    }
}

impl<K: Key> IntoIterator for PartialMapping<K> {
    type Item = Observation<K>;
    type IntoIter = std::collections::hash_map::IntoIter<K, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

/// Fold `(key, count)` observations into a partial mapping.
pub fn combine<K, I>(scope: CombineScope, observations: I) -> PartialMapping<K>
where
    K: Key,
    I: IntoIterator<Item = Observation<K>>,
{
    let mapping: PartialMapping<K> = observations.into_iter().collect();
    trace!(%scope, keys = mapping.len(), "combined observations");
    mapping
}

/// Fold a multiset of keys, one occurrence per item.
pub fn combine_keys<K, I>(scope: CombineScope, keys: I) -> PartialMapping<K>
where
    K: Key,
    I: IntoIterator<Item = K>,
{
    combine(scope, keys.into_iter().map(|key| (key, 1)))
}

/// Merge any number of partial mappings into one.
///
/// A single input is returned unchanged; no input yields an empty mapping.
pub fn merge_all<K, I>(scope: CombineScope, parts: I) -> PartialMapping<K>
where
    K: Key,
    I: IntoIterator<Item = PartialMapping<K>>,
{
    let merged = parts.into_iter().fold(PartialMapping::new(), |mut acc, part| {
        acc.merge(part);
        acc
    });
    trace!(%scope, keys = merged.len(), "merged partial mappings");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn combine_keys_counts_occurrences() {
        let mapping = combine_keys(CombineScope::Document, words("a b a"));
        assert_eq!(mapping.get(&"a".to_string()), Some(2));
        assert_eq!(mapping.get(&"b".to_string()), Some(1));
        assert_eq!(mapping.total(), 3);
    }

    #[test]
    fn singleton_group_is_returned_unchanged() {
        let only = combine_keys(CombineScope::Document, words("x y x"));
        let merged = merge_all(CombineScope::Bucket, vec![only.clone()]);
        assert_eq!(merged, only);
        assert!(merge_all::<String, _>(CombineScope::Global, Vec::new()).is_empty());
    }

    #[test]
    fn zero_counts_do_not_create_keys() {
        let mapping = combine(CombineScope::Global, vec![("a".to_string(), 0)]);
        assert!(mapping.is_empty());
    }

    #[test]
    fn folding_is_independent_of_partitioning() {
        let mut rng = StdRng::seed_from_u64(7);
        let vocabulary = ["the", "cat", "sat", "on", "mat", "a", "dog"];
        let docs: Vec<Vec<String>> = (0..40)
            .map(|_| {
                (0..rng.random_range(0..12))
                    .map(|_| vocabulary[rng.random_range(0..vocabulary.len())].to_string())
                    .collect()
            })
            .collect();

        let expected = combine_keys(CombineScope::Global, docs.iter().flatten().cloned());

        for _ in 0..20 {
            let mut shuffled = docs.clone();
            shuffled.shuffle(&mut rng);
            let groups = rng.random_range(1..8);
            let mut parts = vec![PartialMapping::new(); groups];
            for doc in shuffled {
                let mapping = combine_keys(CombineScope::Document, doc);
                parts[rng.random_range(0..groups)].merge(mapping);
            }
            parts.reverse();
            let merged = merge_all(CombineScope::Global, parts);
            assert_eq!(merged.into_final(), expected.clone().into_final());
        }
    }
}

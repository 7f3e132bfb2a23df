//! A combiner-aware MapReduce (lite) key aggregation engine.
//!
//! A collection of text documents is split into partitions, every document
//! is tokenized into keys, and the resulting `(key, count)` observations are
//! merged into global totals. The interesting part is *where* partial
//! aggregation happens: not at all, per document and per random bucket, or
//! per physical partition. The four pipelines in [`strategy`] make those
//! choices differently and are all required to produce the same final
//! mapping; they only differ in how many records cross a shuffle.

use bytes::Bytes;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};

pub mod bucket;
pub mod combine;
pub mod error;
pub mod report;
pub mod standalone;
pub mod strategy;
pub mod utils;
pub mod workload;

pub use error::{AggError, Result};

/////////////////////////////////////////////////////////////////////////////
// Aggregation types
/////////////////////////////////////////////////////////////////////////////

/// Anything that can be counted by the engine.
///
/// Keys are hashed to pick a reducer, sorted to group records after a
/// shuffle, and moved between worker threads.
pub trait Key: Clone + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> Key for T where T: Clone + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {}

/// A `(key, count)` pair produced from one document.
///
/// Observations are never mutated, only merged.
pub type Observation<K> = (K, u64);

/// Identifier of a load-balancing bucket, drawn from `[0, K)`.
pub type BucketId = u32;

/////////////////////////////////////////////////////////////////////////////
// Documents
/////////////////////////////////////////////////////////////////////////////

/// An opaque unit of input text.
///
/// A document is identified only by its position in the source collection.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Document {
    /// Position in the source collection.
    pub index: usize,
    /// Raw contents.
    pub body: Bytes,
}

impl Document {
    /// Construct a new document at position `index`.
    pub fn new(index: usize, body: impl Into<Bytes>) -> Self {
        Self {
            index,
            body: body.into(),
        }
    }

    /// Get the body of this document.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    /// Borrow the body as UTF-8 text.
    pub fn text(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        utils::str_from_bytes(&self.body)
    }
}

/// Hashes an intermediate key. Compute a reducer for a given key
/// by calculating `ihash(key) % n_reduce`.
pub fn ihash<K: Hash + ?Sized>(key: &K) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    key.hash(&mut hasher);
    (hasher.finish() & 0x7fffffff) as u32
}

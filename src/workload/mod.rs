//! Converts workload names to tokenizers.
//!
//! A tokenizer turns one [`Document`] into the multiset of keys it
//! contributes. It is pure and stateless: nothing it produces depends on any
//! other document, which is what lets the pipelines in
//! [`strategy`](crate::strategy) run it on any worker.
//!
//! # Example
//!
//! To get the word count tokenizer:
//! ```
//! use mrcombine::workload::{self, customers::CustomerFilter, Tokenizer, Workload};
//! use mrcombine::Document;
//! # fn main() -> mrcombine::Result<()> {
//! let Workload::WordCount(wc) = workload::named("wc", &CustomerFilter::default())? else {
//!     unreachable!()
//! };
//! let tokens = wc.tokenize(&Document::new(0, "a b a"));
//! assert_eq!(tokens.keys.len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::{AggError, Document, Key, Result};

pub mod customers;
pub mod wc;

use customers::{CustomerFilter, ProductCustomers};
use wc::WordCount;

/// Names accepted by [`named`].
pub const WORKLOAD_NAMES: &[&str] = &["wc", "customers"];

/// The keys found in one document, plus the records that had to be skipped.
#[derive(Debug)]
pub struct Tokens<K> {
    pub keys: Vec<K>,
    /// Skipped records. Any error that is not a
    /// [`AggError::MalformedRecord`] aborts the run instead.
    pub malformed: Vec<AggError>,
}

impl<K> Default for Tokens<K> {
    fn default() -> Self {
        Self::from_keys(Vec::new())
    }
}

impl<K> Tokens<K> {
    pub fn from_keys(keys: Vec<K>) -> Self {
        Self {
            keys,
            malformed: Vec::new(),
        }
    }

    pub fn from_malformed(error: AggError) -> Self {
        Self {
            keys: Vec::new(),
            malformed: vec![error],
        }
    }
}

/// Turns one document into keys, one item per occurrence.
pub trait Tokenizer: Send + Sync {
    type Key: Key;

    fn tokenize(&self, doc: &Document) -> Tokens<Self::Key>;
}

/// A tokenizer selected by name.
#[derive(Clone, Debug)]
pub enum Workload {
    WordCount(WordCount),
    ProductCustomer(ProductCustomers),
}

impl Workload {
    pub fn name(&self) -> &'static str {
        match self {
            Workload::WordCount(_) => "wc",
            Workload::ProductCustomer(_) => "customers",
        }
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no workload with the given name was found. The filter
/// is only used by the `customers` workload.
pub fn try_named(name: &str, filter: &CustomerFilter) -> Option<Workload> {
    match name {
        "wc" => Some(Workload::WordCount(WordCount)),
        "customers" => Some(Workload::ProductCustomer(ProductCustomers::new(
            filter.clone(),
        ))),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns [`AggError::InvalidParameter`] if no workload with the given name was found.
pub fn named(name: &str, filter: &CustomerFilter) -> Result<Workload> {
    try_named(name, filter).ok_or_else(|| {
        AggError::invalid(
            "workload",
            format!("no workload named `{name}`, expected one of {WORKLOAD_NAMES:?}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_resolves() {
        let filter = CustomerFilter::default();
        for name in WORKLOAD_NAMES {
            assert_eq!(named(name, &filter).unwrap().name(), *name);
        }
        assert!(matches!(
            named("grep", &filter),
            Err(AggError::InvalidParameter { name: "workload", .. })
        ));
    }
}

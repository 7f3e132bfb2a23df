//! Distinct (product, customer) purchases, filtered by country.
//!
//! Each line of a document is one comma-separated transaction record laid
//! out as
//!
//! ```text
//! invoice, product, description, quantity, date, unit price, customer, country
//! ```
//!
//! A record contributes the key `(product, customer)` when its quantity is at
//! least the filter's minimum and its country matches the filter. A document
//! contributes each distinct pair at most once, however many of its lines
//! qualify.

use crate::workload::{Tokenizer, Tokens};
use crate::{AggError, Document};
use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Country token that matches every record.
pub const ALL_COUNTRIES: &str = "all";

const PRODUCT: usize = 1;
const QUANTITY: usize = 3;
const CUSTOMER: usize = 6;
const COUNTRY: usize = 7;
const FIELDS: usize = 8;

/// The key counted by this workload.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct ProductCustomer {
    pub product: String,
    pub customer: String,
}

impl ProductCustomer {
    pub fn new(product: impl Into<String>, customer: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            customer: customer.into(),
        }
    }
}

impl fmt::Display for ProductCustomer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.product, self.customer)
    }
}

/// Which records qualify. Always passed in explicitly, never read from
/// ambient state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerFilter {
    /// Country code, or [`ALL_COUNTRIES`].
    pub country: String,
    /// Smallest quantity that counts. The default of 1 means `quantity > 0`.
    pub min_quantity: i64,
}

impl Default for CustomerFilter {
    fn default() -> Self {
        Self {
            country: ALL_COUNTRIES.to_string(),
            min_quantity: 1,
        }
    }
}

impl CustomerFilter {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Self::default()
        }
    }

    pub fn with_min_quantity(mut self, min_quantity: i64) -> Self {
        self.min_quantity = min_quantity;
        self
    }

    pub fn accepts(&self, quantity: i64, country: &str) -> bool {
        quantity >= self.min_quantity
            && (country == self.country || country == ALL_COUNTRIES || self.country == ALL_COUNTRIES)
    }
}

#[derive(Clone, Debug)]
pub struct ProductCustomers {
    filter: CustomerFilter,
}

impl ProductCustomers {
    pub fn new(filter: CustomerFilter) -> Self {
        Self { filter }
    }
}

fn parse_record(
    record: &csv::StringRecord,
) -> Result<(ProductCustomer, i64, &str), String> {
    if record.len() < FIELDS {
        return Err(format!("expected {FIELDS} fields, found {}", record.len()));
    }
    let field = move |i: usize| record.get(i).map(str::trim).unwrap_or_default();
    let quantity = field(QUANTITY)
        .parse::<i64>()
        .map_err(|e| format!("quantity `{}`: {e}", field(QUANTITY)))?;
    let (product, customer) = (field(PRODUCT), field(CUSTOMER));
    if product.is_empty() {
        return Err("missing product".to_string());
    }
    if customer.is_empty() {
        return Err("missing customer".to_string());
    }
    Ok((ProductCustomer::new(product, customer), quantity, field(COUNTRY)))
}

impl Tokenizer for ProductCustomers {
    type Key = ProductCustomer;

    fn tokenize(&self, doc: &Document) -> Tokens<ProductCustomer> {
        let mut tokens = Tokens::default();
        let mut seen = FnvHashSet::default();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(doc.body.as_ref());

        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    tokens
                        .malformed
                        .push(AggError::malformed(doc.index, line as usize, e.to_string()));
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or_default() as usize;
            match parse_record(&record) {
                Ok((key, quantity, country)) => {
                    if self.filter.accepts(quantity, country) && !seen.contains(&key) {
                        seen.insert(key.clone());
                        tokens.keys.push(key);
                    }
                }
                Err(reason) => tokens
                    .malformed
                    .push(AggError::malformed(doc.index, line, reason)),
            }
        }
        tokens
    }
}

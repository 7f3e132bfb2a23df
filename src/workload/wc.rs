//! Word count: every whitespace-delimited token is a key.
//!

use crate::workload::{Tokenizer, Tokens};
use crate::{AggError, Document};

#[derive(Copy, Clone, Debug, Default)]
pub struct WordCount;

impl Tokenizer for WordCount {
    type Key = String;

    fn tokenize(&self, doc: &Document) -> Tokens<String> {
        match doc.text() {
            Ok(text) => Tokens::from_keys(text.split_whitespace().map(str::to_string).collect()),
            Err(e) => Tokens::from_malformed(AggError::malformed(
                doc.index,
                0,
                format!("document is not valid UTF-8: {e}"),
            )),
        }
    }
}

use std::io;

use thiserror::Error;

/// Result alias used across the aggregation core.
pub type Result<T> = std::result::Result<T, AggError>;

/// Errors raised while validating a job or aggregating its documents.
///
/// [`AggError::MalformedRecord`] is recovered locally: the record is skipped
/// and counted. Every other variant aborts the run without partial results.
#[derive(Debug, Error)]
pub enum AggError {
    #[error("malformed record in document {document}, line {line}: {reason}")]
    MalformedRecord {
        document: usize,
        line: usize,
        reason: String,
    },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("partition {partition} failed: {reason}")]
    PartitionFailure { partition: usize, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

impl AggError {
    pub fn malformed(document: usize, line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            document,
            line,
            reason: reason.into(),
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether the run may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}

//! Error types for the rewire core library.
//!
//! Defines the engine-level error enum exposed by the public API, its stable
//! machine-readable codes and a convenient result alias.

use std::fmt;

use thiserror::Error;

use crate::{em::EmError, graph::SequenceError};

/// Stable codes describing [`EngineError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EngineErrorCode {
    /// The configured worker count was zero.
    InvalidNumThreads,
    /// The configured batch size was zero.
    InvalidBatchSize,
    /// The sorter budget cannot hold a single record.
    SorterMemTooSmall,
    /// The worker pool could not be constructed.
    ThreadPoolUnavailable,
    /// A swap referenced an edge position outside the edge sequence.
    EdgeIdOutOfRange,
    /// A swap referenced the same edge position on both sides.
    IdenticalEdgeIds,
    /// The edge sequence contained a non-canonical edge.
    NotCanonicalised,
    /// The edge sequence was not in ascending order.
    UnsortedSequence,
    /// The edge container failed.
    SequenceFailure,
    /// An external-memory primitive failed.
    StorageFailure,
    /// A synchronisation primitive became poisoned after a panic.
    LockPoisoned,
}

impl EngineErrorCode {
    /// Returns the stable machine-readable representation of this error code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidNumThreads => "REWIRE_INVALID_NUM_THREADS",
            Self::InvalidBatchSize => "REWIRE_INVALID_BATCH_SIZE",
            Self::SorterMemTooSmall => "REWIRE_SORTER_MEM_TOO_SMALL",
            Self::ThreadPoolUnavailable => "REWIRE_THREAD_POOL_UNAVAILABLE",
            Self::EdgeIdOutOfRange => "REWIRE_EDGE_ID_OUT_OF_RANGE",
            Self::IdenticalEdgeIds => "REWIRE_IDENTICAL_EDGE_IDS",
            Self::NotCanonicalised => "REWIRE_NOT_CANONICALISED",
            Self::UnsortedSequence => "REWIRE_UNSORTED_SEQUENCE",
            Self::SequenceFailure => "REWIRE_SEQUENCE_FAILURE",
            Self::StorageFailure => "REWIRE_STORAGE_FAILURE",
            Self::LockPoisoned => "REWIRE_LOCK_POISONED",
        }
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced when configuring or running the swap engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configured worker count was zero.
    #[error("num_threads must be at least 1")]
    InvalidNumThreads,
    /// The configured batch size was zero.
    #[error("batch_size_per_thread must be at least 1")]
    InvalidBatchSize,
    /// The sorter budget cannot hold a single record.
    #[error("sorter memory of {mem_bytes} bytes cannot hold one {record_bytes}-byte record")]
    SorterMemTooSmall {
        /// The configured budget.
        mem_bytes: usize,
        /// The record width it must accommodate.
        record_bytes: usize,
    },
    /// The worker pool could not be constructed.
    #[error("worker pool construction failed: {reason}")]
    ThreadPoolUnavailable {
        /// The pool builder's explanation.
        reason: String,
    },
    /// A swap referenced an edge position outside the edge sequence.
    #[error("swap references edge {edge_id}, but the sequence holds {len} edges")]
    EdgeIdOutOfRange {
        /// The offending edge position.
        edge_id: u64,
        /// The sequence length.
        len: u64,
    },
    /// A swap referenced the same edge position on both sides.
    #[error("swap pairs edge {edge_id} with itself")]
    IdenticalEdgeIds {
        /// The position referenced twice.
        edge_id: u64,
    },
    /// The edge sequence contained a non-canonical edge.
    #[error("edge at position {position} is not canonicalised (u > v)")]
    NotCanonicalised {
        /// The offending position.
        position: u64,
    },
    /// The edge sequence was not in ascending order.
    #[error("edge at position {position} breaks the sequence's ascending order")]
    UnsortedSequence {
        /// The offending position.
        position: u64,
    },
    /// The edge container failed.
    #[error("edge sequence failed")]
    Sequence {
        #[source]
        source: SequenceError,
    },
    /// An external-memory primitive failed.
    #[error("external-memory primitive failed")]
    Storage {
        #[source]
        source: EmError,
    },
    /// A synchronisation primitive became poisoned after a panic.
    #[error("lock for {resource} is poisoned")]
    LockPoisoned {
        /// Name of the locked resource that was poisoned.
        resource: &'static str,
    },
}

impl EngineError {
    /// Retrieve the stable [`EngineErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> EngineErrorCode {
        match self {
            Self::InvalidNumThreads => EngineErrorCode::InvalidNumThreads,
            Self::InvalidBatchSize => EngineErrorCode::InvalidBatchSize,
            Self::SorterMemTooSmall { .. } => EngineErrorCode::SorterMemTooSmall,
            Self::ThreadPoolUnavailable { .. } => EngineErrorCode::ThreadPoolUnavailable,
            Self::EdgeIdOutOfRange { .. } => EngineErrorCode::EdgeIdOutOfRange,
            Self::IdenticalEdgeIds { .. } => EngineErrorCode::IdenticalEdgeIds,
            Self::NotCanonicalised { .. } => EngineErrorCode::NotCanonicalised,
            Self::UnsortedSequence { .. } => EngineErrorCode::UnsortedSequence,
            Self::Sequence { .. } => EngineErrorCode::SequenceFailure,
            Self::Storage { .. } => EngineErrorCode::StorageFailure,
            Self::LockPoisoned { .. } => EngineErrorCode::LockPoisoned,
        }
    }
}

impl From<SequenceError> for EngineError {
    fn from(source: SequenceError) -> Self {
        Self::Sequence { source }
    }
}

impl From<EmError> for EngineError {
    fn from(source: EmError) -> Self {
        match source {
            EmError::BudgetTooSmall {
                mem_bytes,
                record_bytes,
            } => Self::SorterMemTooSmall {
                mem_bytes,
                record_bytes,
            },
            other => Self::Storage { source: other },
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::{EngineError, EngineErrorCode};

    #[test]
    fn codes_are_stable_strings() {
        let err = EngineError::EdgeIdOutOfRange { edge_id: 9, len: 4 };
        assert_eq!(err.code(), EngineErrorCode::EdgeIdOutOfRange);
        assert_eq!(err.code().as_str(), "REWIRE_EDGE_ID_OUT_OF_RANGE");
        assert_eq!(format!("{err}"), "swap references edge 9, but the sequence holds 4 edges");
    }
}

//! External-memory primitives: fixed-width records, a spilling sorter,
//! background run creation with k-way merging, a bounded message queue and a
//! prefetching stream adapter.

mod async_stream;
mod queue;
mod record;
mod runs;
mod sorter;

use std::io;

use thiserror::Error;

pub use self::{
    async_stream::AsyncStream,
    queue::MessageQueue,
    record::Record,
    runs::{RunsBuffer, RunsCreator, RunsMerger},
    sorter::Sorter,
};

/// An error produced by the external-memory layer.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EmError {
    /// A byte budget cannot hold even one record.
    #[error("budget of {mem_bytes} bytes cannot hold one {record_bytes}-byte record")]
    BudgetTooSmall {
        /// The configured budget.
        mem_bytes: usize,
        /// The record width it must accommodate.
        record_bytes: usize,
    },
    /// A spill file could not be created, written or read.
    #[error("spill I/O failed")]
    Io {
        #[source]
        source: io::Error,
    },
    /// A background worker terminated before its work was handed over.
    #[error("background run writer terminated unexpectedly")]
    WorkerLost,
}

impl From<io::Error> for EmError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

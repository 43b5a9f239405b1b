//! Rewire core library.
//!
//! External-memory edge switching for undirected multigraphs: a scripted
//! sequence of double-edge swaps is applied to an edge list that may not fit
//! in RAM, preserving every vertex's degree. Random access to the edge list
//! is replaced by a batched time-forward message flow built from sequential
//! passes, spilling sorters and merge joins; conflicting swaps that touch
//! the same edge position communicate along dependency chains in script
//! order, so the result equals a serial execution of the script.
//!
//! The entry point is [`SwapEngine`], configured through
//! [`SwapEngineBuilder`] and driven over any [`EdgeSequence`]
//! implementation. Per-swap outcome records can be enabled for validation
//! and debugging.

mod builder;
pub mod em;
mod engine;
mod error;
mod graph;

pub use crate::{
    builder::{
        DEFAULT_BATCH_SIZE_PER_THREAD, DEFAULT_PQ_MEM, DEFAULT_PQ_POOL_MEM, DEFAULT_SORTER_MEM,
        SwapEngineBuilder,
    },
    engine::SwapEngine,
    error::{EngineError, EngineErrorCode, Result},
    graph::{
        Edge, EdgeId, EdgeSequence, FileEdgeSequence, MemEdgeSequence, Node, SequenceError, Swap,
        SwapId, SwapOutcome,
    },
};

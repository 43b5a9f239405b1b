//! Graph data model: edges, swaps and sequential edge containers.

mod edge;
mod sequence;
mod swap;

pub use self::{
    edge::{Edge, Node},
    sequence::{EdgeSequence, FileEdgeSequence, MemEdgeSequence, SequenceError},
    swap::{EdgeId, Swap, SwapId, SwapOutcome},
};

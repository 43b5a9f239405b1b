//! Shared test utilities for the rewire workspace.
//!
//! Provides the fully-internal serial swap simulator used as the reference
//! implementation in equivalence tests, deterministic workload generators,
//! and degree-census helpers.

mod generate;
mod simulator;

pub use self::{
    generate::{random_sorted_multigraph, random_swaps},
    simulator::{degree_census, simulate},
};

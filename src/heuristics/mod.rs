//! Heuristics module for CVRP.
//!
//! This module exports the construction heuristics and the local search
//! used to improve their output.

pub mod construction;
pub mod local_search;

pub use construction::*;
pub use local_search::*;

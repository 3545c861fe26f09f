//! CVRP Solver Library
//!
//! Heuristic solver for the Capacitated Vehicle Routing Problem (CVRP).
//!
//! # Features
//!
//! - Construction heuristics (Clarke-Wright savings, Mole-Jameson insertion, sweep)
//! - Tabu-guided best-improvement local search over five neighborhoods
//! - Benchmarking with a semicolon-separated results log and performance profiles
//! - SVG route maps
//!
//! # Example
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//! use cvrp_solver::instance::CvrpInstance;
//! use cvrp_solver::heuristics::construction::{ConstructionHeuristic, SavingsHeuristic};
//! use cvrp_solver::heuristics::local_search::local_search;
//!
//! // Load instance
//! let instance = CvrpInstance::from_file("A-n32-k5.vrp").unwrap();
//!
//! // Construct initial solution
//! let start = Instant::now();
//! let initial = SavingsHeuristic::new().construct(&instance);
//!
//! // Improve it for at most ten seconds
//! let outcome = local_search(initial, &instance, start, Duration::from_secs(10));
//!
//! println!("Solution cost: {}", outcome.total_cost);
//! ```

pub mod benchmark;
pub mod distance;
pub mod heuristics;
pub mod instance;
pub mod solution;
pub mod visualization;

pub use instance::CvrpInstance;
pub use solution::Solution;

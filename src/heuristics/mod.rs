//! Routing heuristics.
//!
//! A* pathfinding with time windows, k-shortest candidate routes and the
//! genetic search that picks one candidate per aircraft.

pub mod astar;
pub mod candidates;
pub mod genetic;

pub use astar::{find_route, PathfinderConfig, TimeWindow};
pub use candidates::{generate_candidates, Candidate, CandidateConfig, CandidatePool, CandidateSet};
pub use genetic::{optimize, Evolution, GAConfig, GaOutcome, Sequencing};

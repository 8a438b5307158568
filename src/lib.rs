//! Surface Taxi Solver Library
//!
//! Plans taxi routes for aircraft moving between gates and runways on an
//! airport surface, keeping every node and taxiway segment within its
//! capacity under a minimum separation time.
//!
//! # Features
//!
//! - Time-dependent A* pathfinding with turn limits per aircraft class
//! - Candidate routes from k-shortest paths and departure offsets
//! - Genetic search over candidate choices with conflict penalties
//! - Exact scheduling by branch-and-bound, or Gurobi MIP (feature `gurobi`)
//! - Scenario generation and benchmarking tools
//!
//! # Example
//!
//! ```no_run
//! use surface_taxi_solver::config::PlannerConfig;
//! use surface_taxi_solver::instance::Scenario;
//! use surface_taxi_solver::orchestrator::{run, Mode};
//!
//! let scenario = Scenario::from_file("scenario.json").unwrap();
//! let graph = scenario.graph().unwrap();
//!
//! let outcome = run(&graph, &scenario.requests, Mode::Exact, &PlannerConfig::default()).unwrap();
//! println!("{}", outcome.report);
//! ```

pub mod benchmark;
pub mod config;
pub mod conflict;
pub mod error;
pub mod exact;
pub mod generate;
pub mod graph;
pub mod heuristics;
pub mod instance;
pub mod orchestrator;
pub mod solution;

pub use config::PlannerConfig;
pub use graph::SurfaceGraph;
pub use instance::{MovementRequest, Scenario};
pub use orchestrator::{run, Mode, PlanOutcome};
pub use solution::{Assignment, Route};

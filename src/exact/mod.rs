//! Exact conflict-free scheduling.
//!
//! Every aircraft picks exactly one of its candidate routes and a hold
//! `d_i >= 0` at the origin. For each pair of occupations of a shared
//! resource one of the two orderings must hold:
//! `d_j - d_i >= max(end_i + sep, start_i + MIN_HEADWAY) - start_j` or the
//! symmetric constraint (see [`required_lag`](crate::conflict::required_lag)).
//! The objective is the priority-weighted taxi time
//! `sum_i priority_i * (traversal_ir + (base_ir - ready_i) + d_i)`.
//!
//! Two backends solve this model: a conflict-driven branch-and-bound
//! (default) and Gurobi (feature `gurobi`).

pub mod branch_bound;

// When built with the `gurobi` feature, expose the real implementation
#[cfg(feature = "gurobi")]
pub mod gurobi;

use crate::conflict::{occupations, ConflictConfig, ConflictDetector, Occupation};
use crate::error::{InfeasibilityContext, SchedulerError, WindowOverflow};
use crate::graph::SurfaceGraph;
use crate::heuristics::candidates::CandidatePool;
use crate::solution::Assignment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Cap on the pairs and overflows kept for an infeasibility report
pub(crate) const CONTEXT_LIMIT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    BranchAndBound,
    Gurobi,
}

/// Exact scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub backend: Backend,
    /// Time limit in seconds
    pub time_limit: f64,
    /// Longest hold allowed after the ready time, in seconds
    pub max_delay: f64,
    /// Search nodes explored before giving up (optional)
    pub node_limit: Option<u64>,
    /// MIP gap tolerance (Gurobi)
    pub mip_gap: f64,
    /// Number of threads (0 = automatic, Gurobi)
    pub threads: i32,
    /// Enable verbose solver output
    pub verbose: bool,
    /// Known feasible assignment used as the first incumbent
    #[serde(skip)]
    pub warm_start: Option<Assignment>,
    /// Set to true from another thread to stop the search
    #[serde(skip)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            backend: Backend::BranchAndBound,
            time_limit: 60.0,
            max_delay: 900.0,
            node_limit: None,
            mip_gap: 1e-6,
            threads: 0,
            verbose: false,
            warm_start: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Proven optimal
    Optimal,
    /// Best incumbent when the time limit hit
    TimeLimitReached,
    /// Best incumbent when the node limit hit
    NodeLimitReached,
    /// Best incumbent when the search was cancelled
    Cancelled,
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        *self == SolveStatus::Optimal
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "Optimal",
            SolveStatus::TimeLimitReached => "TimeLimit",
            SolveStatus::NodeLimitReached => "NodeLimit",
            SolveStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Result of exact solving
#[derive(Debug, Clone)]
pub struct ExactResult {
    /// Best conflict-free assignment found
    pub assignment: Assignment,
    /// Its objective value
    pub objective: f64,
    /// Proven lower bound
    pub lower_bound: f64,
    /// Upper bound (best integer solution)
    pub upper_bound: f64,
    /// Relative optimality gap
    pub gap: f64,
    pub status: SolveStatus,
    /// Number of nodes explored
    pub nodes_explored: u64,
    pub computation_time: f64,
}

/// One candidate route as seen by the model
#[derive(Debug, Clone)]
pub(crate) struct RouteOption {
    /// Index into the aircraft's candidate set
    pub candidate: usize,
    pub base_departure: f64,
    /// Weighted cost with no extra hold
    pub base_cost: f64,
    /// Largest extra hold keeping the departure inside the window
    pub max_delay: f64,
    pub occupations: Vec<Occupation>,
}

#[derive(Debug, Clone)]
pub(crate) struct AircraftModel {
    pub aircraft: String,
    pub priority: f64,
    pub ready_time: f64,
    pub options: Vec<RouteOption>,
}

impl AircraftModel {
    pub fn cheapest(&self) -> f64 {
        self.options.iter().map(|o| o.base_cost).fold(f64::INFINITY, f64::min)
    }
}

/// Data shared by both backends
pub(crate) struct ScheduleModel<'a> {
    pub graph: &'a SurfaceGraph,
    pub pool: &'a CandidatePool,
    pub aircraft: Vec<AircraftModel>,
    pub separation: f64,
}

impl<'a> ScheduleModel<'a> {
    pub fn build(
        graph: &'a SurfaceGraph,
        pool: &'a CandidatePool,
        conflicts: &ConflictConfig,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let mut aircraft = Vec::with_capacity(pool.len());
        let mut context = InfeasibilityContext::default();

        for set in &pool.sets {
            let request = &set.request;
            let latest = (request.ready_time + config.max_delay.max(0.0))
                .min(request.latest_departure.unwrap_or(f64::INFINITY));
            let mut options = Vec::new();
            let mut earliest_base = f64::INFINITY;
            for (idx, candidate) in set.candidates.iter().enumerate() {
                let route = &candidate.route;
                let base = route.departure_time();
                earliest_base = earliest_base.min(base);
                let slack = latest - base;
                if slack < -1e-9 {
                    continue;
                }
                options.push(RouteOption {
                    candidate: idx,
                    base_departure: base,
                    base_cost: route.weighted_cost(),
                    max_delay: slack.max(0.0),
                    occupations: occupations(route),
                });
            }
            if options.is_empty() {
                context.window_overflows.push(WindowOverflow {
                    aircraft: request.aircraft.clone(),
                    required_departure: earliest_base,
                    latest_departure: latest,
                });
            }
            aircraft.push(AircraftModel {
                aircraft: request.aircraft.clone(),
                priority: request.priority,
                ready_time: request.ready_time,
                options,
            });
        }

        if !context.window_overflows.is_empty() {
            return Err(SchedulerError::Infeasible { context });
        }
        Ok(ScheduleModel {
            graph,
            pool,
            aircraft,
            separation: conflicts.separation.max(0.0),
        })
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    /// Objective of a full choice of options and holds
    pub fn objective(&self, choice: &[usize], delays: &[f64]) -> f64 {
        self.aircraft
            .iter()
            .zip(choice.iter().zip(delays))
            .map(|(a, (&o, &d))| a.options[o].base_cost + a.priority * d)
            .sum()
    }

    pub fn assignment(&self, choice: &[usize], delays: &[f64]) -> Assignment {
        self.aircraft
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let candidate = a.options[choice[i]].candidate;
                self.pool.sets[i].candidates[candidate].route.shifted(delays[i])
            })
            .collect()
    }

    /// Express a known assignment as option choices and holds. Returns None
    /// when some aircraft's route is not among its options, the hold falls
    /// outside the window, or the assignment has conflicts.
    pub fn match_assignment(&self, assignment: &Assignment) -> Option<(Vec<usize>, Vec<f64>)> {
        let mut choice = Vec::with_capacity(self.len());
        let mut delays = Vec::with_capacity(self.len());
        for (i, a) in self.aircraft.iter().enumerate() {
            let route = assignment.get(&a.aircraft)?;
            let nodes = route.nodes();
            let departure = route.departure_time();
            let (o, d) = a.options.iter().enumerate().find_map(|(o, opt)| {
                let candidate = &self.pool.sets[i].candidates[opt.candidate].route;
                let d = departure - opt.base_departure;
                (candidate.nodes() == nodes && d >= -1e-9 && d <= opt.max_delay + 1e-9).then_some((o, d.max(0.0)))
            })?;
            choice.push(o);
            delays.push(d);
        }
        let detector = ConflictDetector::new(self.graph, &ConflictConfig { separation: self.separation });
        if detector.count(&self.assignment(&choice, &delays)) > 0 {
            return None;
        }
        Some((choice, delays))
    }
}

/// Solve the scheduling model with the configured backend.
pub fn schedule(
    graph: &SurfaceGraph,
    pool: &CandidatePool,
    conflicts: &ConflictConfig,
    config: &SchedulerConfig,
) -> Result<ExactResult, SchedulerError> {
    let model = ScheduleModel::build(graph, pool, conflicts, config)?;
    let result = match config.backend {
        Backend::BranchAndBound => branch_bound::solve(&model, config),
        Backend::Gurobi => solve_gurobi(&model, config),
    };
    match &result {
        Ok(r) => log::info!(
            "scheduler: {} objective {:.2} bound {:.2} gap {:.4} ({} nodes, {:.2}s)",
            r.status,
            r.objective,
            r.lower_bound,
            r.gap,
            r.nodes_explored,
            r.computation_time
        ),
        Err(e) => log::error!("scheduler failed: {}", e),
    }
    result
}

#[cfg(feature = "gurobi")]
fn solve_gurobi(model: &ScheduleModel, config: &SchedulerConfig) -> Result<ExactResult, SchedulerError> {
    gurobi::solve(model, config)
}

// Without the feature the backend is reported as missing
#[cfg(not(feature = "gurobi"))]
fn solve_gurobi(_model: &ScheduleModel, _config: &SchedulerConfig) -> Result<ExactResult, SchedulerError> {
    Err(SchedulerError::Backend("Gurobi feature not enabled in this build".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeKind};
    use crate::heuristics::astar::PathfinderConfig;
    use crate::heuristics::candidates::{generate_candidates, CandidateConfig};
    use crate::instance::MovementRequest;

    fn corridor_pool(latest: Option<f64>) -> (SurfaceGraph, CandidatePool) {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::RunwayThreshold, 150.0, 0.0),
        ];
        let graph = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 150.0, 15.0)]).unwrap();
        let mut request = MovementRequest::new("A", 0, 1, 10.0);
        request.latest_departure = latest;
        let config = CandidateConfig { k_paths: 1, departure_offsets: 3, offset_step: 20.0 };
        let pool = generate_candidates(&graph, &[request], &config, &PathfinderConfig::default());
        (graph, pool)
    }

    #[test]
    fn test_model_windows() {
        let (graph, pool) = corridor_pool(Some(35.0));
        let model = ScheduleModel::build(&graph, &pool, &ConflictConfig::default(), &SchedulerConfig::default())
            .unwrap();
        // offsets 0 and 20 fit before 35, offset 40 was never generated
        let opts = &model.aircraft[0].options;
        assert_eq!(opts.len(), 2);
        assert!((opts[0].max_delay - 25.0).abs() < 1e-9);
        assert!((opts[1].max_delay - 5.0).abs() < 1e-9);
        assert!((model.aircraft[0].cheapest() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_match_assignment_recovers_hold() {
        let (graph, pool) = corridor_pool(None);
        let model = ScheduleModel::build(&graph, &pool, &ConflictConfig::default(), &SchedulerConfig::default())
            .unwrap();
        let assignment = model.assignment(&[0], &[7.0]);
        let (choice, delays) = model.match_assignment(&assignment).unwrap();
        assert_eq!(choice, vec![0]);
        assert!((delays[0] - 7.0).abs() < 1e-9);
        assert!((model.objective(&choice, &delays) - 17.0).abs() < 1e-9);
    }

    #[cfg(not(feature = "gurobi"))]
    #[test]
    fn test_gurobi_backend_reports_missing_feature() {
        let (graph, pool) = corridor_pool(None);
        let config = SchedulerConfig { backend: Backend::Gurobi, ..Default::default() };
        let err = schedule(&graph, &pool, &ConflictConfig::default(), &config).unwrap_err();
        assert!(matches!(err, SchedulerError::Backend(_)));
    }
}

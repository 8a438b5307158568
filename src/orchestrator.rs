//! Planning pipeline.
//!
//! Runs one of three strategies over a scenario, excludes requests that
//! cannot be routed, checks the final assignment for conflicts on its own
//! and summarizes the outcome in a [`PlanReport`].
//!
//! The final check runs both the sweep detector and the pairwise
//! [`audit`]; an exact plan must pass both.

use crate::config::PlannerConfig;
use crate::conflict::{audit, Conflict, ConflictDetector};
use crate::error::{PlanError, RequestError};
use crate::exact::{schedule, SchedulerConfig};
use crate::graph::SurfaceGraph;
use crate::heuristics::astar::{find_route, TimeWindow};
use crate::heuristics::candidates::generate_candidates;
use crate::heuristics::genetic::optimize;
use crate::instance::MovementRequest;
use crate::solution::{Assignment, Route};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Fastest route per aircraft at its ready time, no deconfliction
    PathfinderOnly,
    /// Candidate routes refined by the genetic search
    GaRefine,
    /// Proven conflict-free schedule
    Exact,
}

impl Mode {
    pub fn all() -> [Mode; 3] {
        [Mode::PathfinderOnly, Mode::GaRefine, Mode::Exact]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::PathfinderOnly => "pathfinder",
            Mode::GaRefine => "ga",
            Mode::Exact => "exact",
        };
        write!(f, "{}", s)
    }
}

/// Per-aircraft figures of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AircraftReport {
    pub aircraft: String,
    pub departure: f64,
    pub arrival: f64,
    pub delay: f64,
    pub taxi_time: f64,
    pub distance: f64,
    pub fuel: f64,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub mode: Mode,
    pub aircraft_planned: usize,
    pub objective: f64,
    pub total_taxi_time: f64,
    pub total_delay: f64,
    pub total_distance: f64,
    pub total_fuel: f64,
    pub makespan: f64,
    pub unresolved_conflicts: usize,
    pub conflicts: Vec<Conflict>,
    /// Entries into a full resource found by the pairwise audit
    pub capacity_violations: usize,
    pub per_aircraft: Vec<AircraftReport>,
    pub excluded: Vec<RequestError>,
    pub warnings: Vec<String>,
    /// Scheduler status in exact mode
    pub solver_status: Option<String>,
    pub lower_bound: Option<f64>,
    pub gap: Option<f64>,
    /// GA generations, when the GA ran
    pub generations: Option<usize>,
    pub elapsed: f64,
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan ({} mode)", self.mode)?;
        writeln!(f, "  Aircraft planned: {}", self.aircraft_planned)?;
        writeln!(f, "  Objective: {:.2}", self.objective)?;
        writeln!(f, "  Total taxi time: {:.2}s", self.total_taxi_time)?;
        writeln!(f, "  Total delay: {:.2}s", self.total_delay)?;
        writeln!(f, "  Total distance: {:.1}m", self.total_distance)?;
        writeln!(f, "  Fuel estimate: {:.2}", self.total_fuel)?;
        writeln!(f, "  Makespan: {:.2}s", self.makespan)?;
        writeln!(f, "  Unresolved conflicts: {}", self.unresolved_conflicts)?;
        if self.capacity_violations > 0 {
            writeln!(f, "  Capacity violations: {}", self.capacity_violations)?;
        }
        if let Some(status) = &self.solver_status {
            write!(f, "  Solver status: {}", status)?;
            if let (Some(lb), Some(gap)) = (self.lower_bound, self.gap) {
                write!(f, " (bound {:.2}, gap {:.2}%)", lb, gap * 100.0)?;
            }
            writeln!(f)?;
        }
        if let Some(g) = self.generations {
            writeln!(f, "  GA generations: {}", g)?;
        }
        writeln!(f, "  Elapsed: {:.3}s", self.elapsed)?;
        for a in &self.per_aircraft {
            writeln!(
                f,
                "    {:<10} dep {:>8.1}s arr {:>8.1}s delay {:>6.1}s taxi {:>7.1}s{}",
                a.aircraft,
                a.departure,
                a.arrival,
                a.delay,
                a.taxi_time,
                if a.conflicts > 0 { format!(" ({} conflicts)", a.conflicts) } else { String::new() }
            )?;
        }
        for e in &self.excluded {
            writeln!(f, "  Excluded: {}", e)?;
        }
        for w in &self.warnings {
            writeln!(f, "  Warning: {}", w)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub assignment: Assignment,
    pub report: PlanReport,
}

/// Solver-specific facts gathered while planning
#[derive(Default)]
struct RunDetails {
    excluded: Vec<RequestError>,
    warnings: Vec<String>,
    solver_status: Option<String>,
    lower_bound: Option<f64>,
    gap: Option<f64>,
    generations: Option<usize>,
}

fn pathfinder_only(
    graph: &SurfaceGraph,
    requests: &[MovementRequest],
    config: &PlannerConfig,
    details: &mut RunDetails,
) -> Assignment {
    let results: Vec<Result<Route, RequestError>> = requests
        .par_iter()
        .map(|r| find_route(graph, r, TimeWindow::unbounded(), &config.pathfinder))
        .collect();
    let mut assignment = Assignment::new();
    for result in results {
        match result {
            Ok(route) => assignment.insert(route),
            Err(e) => {
                log::warn!("excluding request: {}", e);
                details.excluded.push(e);
            }
        }
    }
    assignment
}

fn ga_refine(
    graph: &SurfaceGraph,
    requests: &[MovementRequest],
    config: &PlannerConfig,
    details: &mut RunDetails,
) -> Assignment {
    let pool = generate_candidates(graph, requests, &config.candidates, &config.pathfinder);
    details.excluded = pool.excluded.clone();
    let outcome = optimize(graph, &pool, &config.conflicts, &config.ga);
    details.generations = Some(outcome.generations);
    details.warnings.extend(outcome.warning);
    outcome.assignment
}

fn exact(
    graph: &SurfaceGraph,
    requests: &[MovementRequest],
    config: &PlannerConfig,
    details: &mut RunDetails,
) -> Result<Assignment, PlanError> {
    let pool = generate_candidates(graph, requests, &config.candidates, &config.pathfinder);
    details.excluded = pool.excluded.clone();

    let mut scheduler: SchedulerConfig = config.scheduler.clone();
    if config.ga_warm_start && scheduler.warm_start.is_none() && !pool.is_empty() {
        let ga = optimize(graph, &pool, &config.conflicts, &config.ga);
        details.generations = Some(ga.generations);
        if ga.conflicts == 0 {
            scheduler.warm_start = Some(ga.assignment);
        } else {
            log::debug!("GA warm start skipped: {} conflicts left", ga.conflicts);
        }
    }

    let result = schedule(graph, &pool.path_alternatives(), &config.conflicts, &scheduler)?;
    if !result.status.is_optimal() {
        details.warnings.push(format!(
            "scheduler stopped early ({}): gap {:.2}%",
            result.status,
            result.gap * 100.0
        ));
    }
    details.solver_status = Some(result.status.to_string());
    details.lower_bound = Some(result.lower_bound);
    details.gap = Some(result.gap);
    Ok(result.assignment)
}

/// Plan every request with the chosen strategy.
pub fn run(
    graph: &SurfaceGraph,
    requests: &[MovementRequest],
    mode: Mode,
    config: &PlannerConfig,
) -> Result<PlanOutcome, PlanError> {
    let start = Instant::now();
    let mut seen = HashSet::new();
    for r in requests {
        if !seen.insert(r.aircraft.as_str()) {
            return Err(PlanError::DuplicateAircraft(r.aircraft.clone()));
        }
    }
    log::info!("planning {} requests in {} mode", requests.len(), mode);

    let mut details = RunDetails::default();
    let assignment = match mode {
        Mode::PathfinderOnly => pathfinder_only(graph, requests, config, &mut details),
        Mode::GaRefine => ga_refine(graph, requests, config, &mut details),
        Mode::Exact => exact(graph, requests, config, &mut details)?,
    };

    let detector = ConflictDetector::new(graph, &config.conflicts);
    let conflicts = detector.detect(&assignment);
    let violations = audit(graph, &assignment, config.conflicts.separation);
    if conflicts.is_empty() && !violations.is_empty() {
        log::error!(
            "sweep found no conflicts but the audit found {} capacity violations",
            violations.len()
        );
    }
    if mode == Mode::Exact && (!conflicts.is_empty() || !violations.is_empty()) {
        log::error!(
            "exact schedule failed the final check with {} conflicts, {} capacity violations",
            conflicts.len(),
            violations.len()
        );
        return Err(PlanError::UnresolvedConflicts {
            conflicts: conflicts.len().max(violations.len()),
        });
    }
    if !conflicts.is_empty() {
        log::warn!("{} unresolved conflicts in {} mode", conflicts.len(), mode);
    }

    let by_aircraft: BTreeMap<&str, &MovementRequest> =
        requests.iter().map(|r| (r.aircraft.as_str(), r)).collect();
    for route in assignment.iter() {
        if let Some(request) = by_aircraft.get(route.aircraft.as_str()) {
            for issue in route.check(graph, request.max_speed()) {
                details.warnings.push(format!("{}: {}", route.aircraft, issue));
            }
        }
    }

    let mut per_conflict: BTreeMap<&str, usize> = BTreeMap::new();
    for c in &conflicts {
        *per_conflict.entry(c.first.as_str()).or_default() += 1;
        *per_conflict.entry(c.second.as_str()).or_default() += 1;
    }
    let per_aircraft = assignment
        .iter()
        .map(|r| AircraftReport {
            aircraft: r.aircraft.clone(),
            departure: r.departure_time(),
            arrival: r.arrival_time(),
            delay: r.delay(),
            taxi_time: r.taxi_time(),
            distance: r.distance,
            fuel: r.fuel(),
            conflicts: per_conflict.get(r.aircraft.as_str()).copied().unwrap_or(0),
        })
        .collect();

    let report = PlanReport {
        mode,
        aircraft_planned: assignment.len(),
        objective: assignment.objective(),
        total_taxi_time: assignment.total_taxi_time(),
        total_delay: assignment.total_delay(),
        total_distance: assignment.total_distance(),
        total_fuel: assignment.total_fuel(),
        makespan: assignment.makespan(),
        unresolved_conflicts: conflicts.len(),
        conflicts,
        capacity_violations: violations.len(),
        per_aircraft,
        excluded: details.excluded,
        warnings: details.warnings,
        solver_status: details.solver_status,
        lower_bound: details.lower_bound,
        gap: details.gap,
        generations: details.generations,
        elapsed: start.elapsed().as_secs_f64(),
    };
    log::info!(
        "{} mode: {} aircraft, objective {:.2}, {} conflicts, {:.3}s",
        mode,
        report.aircraft_planned,
        report.objective,
        report.unresolved_conflicts,
        report.elapsed
    );
    Ok(PlanOutcome { assignment, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictConfig;
    use crate::error::SchedulerError;
    use crate::generate::{generate_scenario, GeneratorConfig};
    use crate::graph::{Edge, Node, NodeKind};
    use crate::heuristics::genetic::tests::diamond;

    fn corridor() -> SurfaceGraph {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::RunwayThreshold, 150.0, 0.0),
        ];
        SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 150.0, 15.0)]).unwrap()
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            conflicts: ConflictConfig { separation: 5.0 },
            ..Default::default()
        }
    }

    fn head_on() -> Vec<MovementRequest> {
        vec![MovementRequest::new("A", 0, 1, 0.0), MovementRequest::new("B", 1, 0, 0.0)]
    }

    #[test]
    fn test_pathfinder_only_reports_conflicts() {
        let graph = corridor();
        let outcome = run(&graph, &head_on(), Mode::PathfinderOnly, &config()).unwrap();
        assert_eq!(outcome.report.aircraft_planned, 2);
        assert_eq!(outcome.report.unresolved_conflicts, 1);
        assert!((outcome.report.total_delay).abs() < 1e-9);
        assert!(outcome.report.per_aircraft.iter().all(|a| a.conflicts == 1));
    }

    #[test]
    fn test_exact_resolves_head_on() {
        let graph = corridor();
        let outcome = run(&graph, &head_on(), Mode::Exact, &config()).unwrap();
        assert_eq!(outcome.report.unresolved_conflicts, 0);
        assert_eq!(outcome.report.capacity_violations, 0);
        assert!(audit(&graph, &outcome.assignment, 5.0).is_empty());
        assert!((outcome.report.total_delay - 15.0).abs() < 1e-6);
        assert!((outcome.report.objective - 35.0).abs() < 1e-6);
        assert_eq!(outcome.report.solver_status.as_deref(), Some("Optimal"));
        assert!(serde_json::to_string(&outcome).is_ok());
    }

    #[test]
    fn test_exact_infeasible_is_an_error() {
        let graph = corridor();
        let mut config = config();
        config.scheduler.max_delay = 5.0;
        config.ga_warm_start = false;
        let err = run(&graph, &head_on(), Mode::Exact, &config).unwrap_err();
        assert!(matches!(err, PlanError::Scheduler(SchedulerError::Infeasible { .. })));
    }

    #[test]
    fn test_unroutable_request_is_excluded() {
        let graph = corridor();
        let mut requests = head_on();
        requests.push(MovementRequest::new("C", 0, 9, 0.0));
        for mode in Mode::all() {
            let outcome = run(&graph, &requests, mode, &config()).unwrap();
            assert!(outcome.assignment.get("C").is_none());
            assert_eq!(outcome.report.excluded.len(), 1);
            assert_eq!(outcome.report.excluded[0].aircraft(), "C");
        }
    }

    #[test]
    fn test_duplicate_aircraft_rejected() {
        let graph = corridor();
        let requests = vec![MovementRequest::new("A", 0, 1, 0.0), MovementRequest::new("A", 1, 0, 5.0)];
        let err = run(&graph, &requests, Mode::PathfinderOnly, &config()).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateAircraft(id) if id == "A"));
    }

    #[test]
    fn test_diamond_pipeline() {
        let (graph, requests) = diamond();
        let config = config();
        let ga = run(&graph, &requests, Mode::GaRefine, &config).unwrap();
        assert_eq!(ga.report.unresolved_conflicts, 0);
        let exact = run(&graph, &requests, Mode::Exact, &config).unwrap();
        assert_eq!(exact.report.unresolved_conflicts, 0);
        assert!(audit(&graph, &exact.assignment, 5.0).is_empty());
        assert!(exact.report.objective <= ga.report.objective + 1e-6);
        assert!(exact.report.warnings.is_empty());
    }

    #[test]
    fn test_exact_separates_same_instant_crossing() {
        let (graph, requests) = crate::conflict::tests::crossing();
        let config = PlannerConfig {
            conflicts: ConflictConfig { separation: 0.0 },
            ..Default::default()
        };
        let fastest = run(&graph, &requests, Mode::PathfinderOnly, &config).unwrap();
        assert_eq!(fastest.report.unresolved_conflicts, 1);
        assert!(fastest.report.capacity_violations > 0);

        let outcome = run(&graph, &requests, Mode::Exact, &config).unwrap();
        assert_eq!(outcome.report.unresolved_conflicts, 0);
        assert_eq!(outcome.report.capacity_violations, 0);
        assert_eq!(ConflictDetector::new(&graph, &config.conflicts).count(&outcome.assignment), 0);
        assert!(audit(&graph, &outcome.assignment, 0.0).is_empty());
        assert!(outcome.report.total_delay > 0.0);
    }

    #[test]
    fn test_exact_generated_scenario_passes_audit() {
        let scenario = generate_scenario(&GeneratorConfig { num_flights: 6, seed: 1, ..Default::default() });
        let graph = scenario.graph().unwrap();
        let mut config = PlannerConfig::default();
        config.scheduler.time_limit = 10.0;
        let outcome = run(&graph, &scenario.requests, Mode::Exact, &config).unwrap();
        assert_eq!(outcome.report.aircraft_planned, scenario.requests.len());
        assert_eq!(outcome.report.unresolved_conflicts, 0);
        assert_eq!(outcome.report.capacity_violations, 0);
        assert!(audit(&graph, &outcome.assignment, config.conflicts.separation).is_empty());
    }
}

//! Routes and assignments.
//!
//! A [`Route`] is the timed trajectory of one aircraft; an [`Assignment`]
//! maps every planned aircraft to its route.

use crate::graph::{EdgeId, NodeId, SurfaceGraph, Traversal};
use crate::instance::MovementRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TIME_EPS: f64 = 1e-6;

/// Fuel units per metre taxied
pub const FUEL_PER_METRE: f64 = 0.1;
/// Fuel units per second of taxi time
pub const FUEL_PER_SECOND: f64 = 0.05;

/// One node of a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub node: NodeId,
    pub arrival: f64,
    pub departure: f64,
    /// Edge used to reach this node (None for the origin)
    pub via: Option<EdgeId>,
}

/// Timed trajectory of one aircraft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub aircraft: String,
    pub steps: Vec<RouteStep>,
    /// Ready time of the request the route serves
    pub ready_time: f64,
    /// Objective weight of the request the route serves
    pub priority: f64,
    /// Total length in metres
    pub distance: f64,
}

impl Route {
    /// Time a sequence of traversals for `request`, leaving the origin at
    /// `departure` and never waiting on the way.
    pub fn timed(
        graph: &SurfaceGraph,
        request: &MovementRequest,
        path: &[Traversal],
        departure: f64,
    ) -> Route {
        let speed = request.max_speed();
        let mut steps = Vec::with_capacity(path.len() + 1);
        steps.push(RouteStep {
            node: request.origin,
            arrival: departure,
            departure,
            via: None,
        });

        let mut clock = departure;
        let mut distance = 0.0;
        for t in path {
            let edge = &graph.edges()[t.edge];
            clock += edge.length / edge.max_speed.min(speed);
            distance += edge.length;
            steps.push(RouteStep {
                node: t.to,
                arrival: clock,
                departure: clock,
                via: Some(t.edge),
            });
        }

        Route {
            aircraft: request.aircraft.clone(),
            steps,
            ready_time: request.ready_time,
            priority: request.priority,
            distance,
        }
    }

    pub fn origin(&self) -> Option<NodeId> {
        self.steps.first().map(|s| s.node)
    }

    pub fn destination(&self) -> Option<NodeId> {
        self.steps.last().map(|s| s.node)
    }

    pub fn departure_time(&self) -> f64 {
        self.steps.first().map(|s| s.departure).unwrap_or(self.ready_time)
    }

    pub fn arrival_time(&self) -> f64 {
        self.steps.last().map(|s| s.arrival).unwrap_or(self.ready_time)
    }

    /// Time spent moving, from leaving the origin to reaching the destination
    pub fn traversal_time(&self) -> f64 {
        self.arrival_time() - self.departure_time()
    }

    /// Time held at the origin beyond the ready time
    pub fn delay(&self) -> f64 {
        (self.departure_time() - self.ready_time).max(0.0)
    }

    /// Ready time to arrival
    pub fn taxi_time(&self) -> f64 {
        self.traversal_time() + self.delay()
    }

    /// Priority-weighted time, the quantity every optimizer minimizes
    pub fn weighted_cost(&self) -> f64 {
        self.priority * self.taxi_time()
    }

    pub fn fuel(&self) -> f64 {
        self.distance * FUEL_PER_METRE + self.traversal_time() * FUEL_PER_SECOND
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.steps.iter().map(|s| s.node).collect()
    }

    /// Same path, every time shifted by `delta` seconds
    pub fn shifted(&self, delta: f64) -> Route {
        let mut route = self.clone();
        for step in &mut route.steps {
            step.arrival += delta;
            step.departure += delta;
        }
        route
    }

    /// Check adjacency, time monotonicity and speed limits.
    pub fn check(&self, graph: &SurfaceGraph, max_speed: f64) -> Vec<String> {
        let mut issues = Vec::new();
        if self.steps.is_empty() {
            issues.push("empty route".to_string());
            return issues;
        }
        for step in &self.steps {
            if step.departure + TIME_EPS < step.arrival {
                issues.push(format!("node {} left before it was reached", step.node));
            }
        }
        for pair in self.steps.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.arrival + TIME_EPS < prev.departure {
                issues.push(format!("time goes backwards entering node {}", next.node));
            }
            let Some(edge_id) = next.via else {
                issues.push(format!("node {} reached without an edge", next.node));
                continue;
            };
            let Some(edge) = graph.edge(edge_id) else {
                issues.push(format!("unknown edge {}", edge_id));
                continue;
            };
            let forward = edge.from == prev.node && edge.to == next.node;
            let backward = edge.bidirectional && edge.to == prev.node && edge.from == next.node;
            if !forward && !backward {
                issues.push(format!("edge {} does not connect {} to {}", edge_id, prev.node, next.node));
            }
            let min_duration = edge.length / edge.max_speed.min(max_speed);
            if next.arrival - prev.departure + TIME_EPS < min_duration {
                issues.push(format!("speed limit exceeded on edge {}", edge_id));
            }
        }
        issues
    }
}

/// Aircraft id -> route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub routes: BTreeMap<String, Route>,
}

impl Assignment {
    pub fn new() -> Self {
        Assignment::default()
    }

    pub fn insert(&mut self, route: Route) {
        self.routes.insert(route.aircraft.clone(), route);
    }

    pub fn get(&self, aircraft: &str) -> Option<&Route> {
        self.routes.get(aircraft)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn total_taxi_time(&self) -> f64 {
        self.iter().map(|r| r.taxi_time()).sum()
    }

    pub fn total_traversal_time(&self) -> f64 {
        self.iter().map(|r| r.traversal_time()).sum()
    }

    pub fn total_delay(&self) -> f64 {
        self.iter().map(|r| r.delay()).sum()
    }

    pub fn total_distance(&self) -> f64 {
        self.iter().map(|r| r.distance).sum()
    }

    pub fn total_fuel(&self) -> f64 {
        self.iter().map(|r| r.fuel()).sum()
    }

    /// Sum of priority-weighted taxi times
    pub fn objective(&self) -> f64 {
        self.iter().map(|r| r.weighted_cost()).sum()
    }

    /// Latest arrival over all aircraft
    pub fn makespan(&self) -> f64 {
        self.iter().map(|r| r.arrival_time()).fold(0.0, f64::max)
    }
}

impl FromIterator<Route> for Assignment {
    fn from_iter<I: IntoIterator<Item = Route>>(iter: I) -> Self {
        let mut assignment = Assignment::new();
        for route in iter {
            assignment.insert(route);
        }
        assignment
    }
}

impl std::fmt::Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Assignment ({} aircraft)", self.len())?;
        writeln!(f, "  Objective: {:.2}", self.objective())?;
        writeln!(f, "  Taxi time: {:.2}s", self.total_taxi_time())?;
        writeln!(f, "  Delay: {:.2}s", self.total_delay())?;
        for route in self.iter() {
            writeln!(
                f,
                "  {}: {:?} dep {:.1}s arr {:.1}s",
                route.aircraft,
                route.nodes(),
                route.departure_time(),
                route.arrival_time()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeKind};

    fn graph() -> SurfaceGraph {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::Intersection, 150.0, 0.0),
            Node::new(2, NodeKind::RunwayThreshold, 300.0, 0.0),
        ];
        let edges = vec![Edge::new(0, 1, 150.0, 10.0), Edge::new(1, 2, 150.0, 30.0)];
        SurfaceGraph::new(nodes, edges).unwrap()
    }

    fn route(graph: &SurfaceGraph) -> Route {
        let request = MovementRequest::new("A", 0, 2, 10.0).with_priority(2.0);
        let path = vec![graph.find_traversal(0, 1).unwrap(), graph.find_traversal(1, 2).unwrap()];
        Route::timed(graph, &request, &path, 20.0)
    }

    #[test]
    fn test_timed_route_uses_slowest_limit() {
        let graph = graph();
        let route = route(&graph);
        // 150/10 on the first edge, 150/15 on the second (aircraft limit)
        assert!((route.arrival_time() - 45.0).abs() < 1e-9);
        assert!((route.traversal_time() - 25.0).abs() < 1e-9);
        assert!((route.delay() - 10.0).abs() < 1e-9);
        assert!((route.weighted_cost() - 70.0).abs() < 1e-9);
        assert!(route.check(&graph, 15.0).is_empty());
    }

    #[test]
    fn test_check_flags_speeding() {
        let graph = graph();
        let mut route = route(&graph);
        route.steps[1].arrival -= 5.0;
        route.steps[1].departure -= 5.0;
        let issues = route.check(&graph, 15.0);
        assert!(issues.iter().any(|i| i.contains("speed")));
    }

    #[test]
    fn test_shift_and_assignment_totals() {
        let graph = graph();
        let base = route(&graph);
        let shifted = base.shifted(5.0);
        assert!((shifted.delay() - 15.0).abs() < 1e-9);
        assert!((shifted.traversal_time() - base.traversal_time()).abs() < 1e-9);

        let assignment: Assignment = vec![base.clone()].into_iter().collect();
        assert_eq!(assignment.len(), 1);
        assert!((assignment.total_distance() - 300.0).abs() < 1e-9);
        assert!((assignment.total_fuel() - (30.0 + 25.0 * FUEL_PER_SECOND)).abs() < 1e-9);
    }
}

//! Movement requests and scenario files.
//!
//! A scenario bundles a surface graph with the movement requests of one
//! planning round. Scenarios are stored as JSON.

use crate::error::{RequestError, ScenarioError};
use crate::graph::{Edge, Node, NodeId, NodeKind, SurfaceGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Aircraft performance class; drives taxi speed and turn limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AircraftClass {
    Light,
    Medium,
    Heavy,
    Super,
}

impl AircraftClass {
    /// Maximum taxi speed in metres per second
    pub fn max_taxi_speed(&self) -> f64 {
        match self {
            AircraftClass::Light => 18.0,
            AircraftClass::Medium => 15.0,
            AircraftClass::Heavy => 12.5,
            AircraftClass::Super => 10.0,
        }
    }

    /// Largest heading change allowed between consecutive segments, in degrees
    pub fn max_turn_deg(&self) -> Option<f64> {
        match self {
            AircraftClass::Light | AircraftClass::Medium => None,
            AircraftClass::Heavy => Some(135.0),
            AircraftClass::Super => Some(120.0),
        }
    }

    pub fn all() -> [AircraftClass; 4] {
        [AircraftClass::Light, AircraftClass::Medium, AircraftClass::Heavy, AircraftClass::Super]
    }
}

impl Default for AircraftClass {
    fn default() -> Self {
        AircraftClass::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Gate to runway
    Departure,
    /// Runway to gate
    Arrival,
}

impl Default for Operation {
    fn default() -> Self {
        Operation::Departure
    }
}

fn default_priority() -> f64 {
    1.0
}

/// One aircraft's taxi request for a planning round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub aircraft: String,
    pub origin: NodeId,
    pub destination: NodeId,
    /// Earliest departure from the origin, in seconds
    pub ready_time: f64,
    /// Weight of this aircraft's time in the objective (>= 0)
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default)]
    pub class: AircraftClass,
    #[serde(default)]
    pub operation: Operation,
    /// Overrides the class speed when lower
    #[serde(default)]
    pub max_speed: Option<f64>,
    /// Latest acceptable departure, in seconds
    #[serde(default)]
    pub latest_departure: Option<f64>,
}

impl MovementRequest {
    pub fn new(aircraft: impl Into<String>, origin: NodeId, destination: NodeId, ready_time: f64) -> Self {
        MovementRequest {
            aircraft: aircraft.into(),
            origin,
            destination,
            ready_time,
            priority: 1.0,
            class: AircraftClass::Medium,
            operation: Operation::Departure,
            max_speed: None,
            latest_departure: None,
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_class(mut self, class: AircraftClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_max_speed(mut self, speed: f64) -> Self {
        self.max_speed = Some(speed);
        self
    }

    pub fn with_latest_departure(mut self, latest: f64) -> Self {
        self.latest_departure = Some(latest);
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Effective top taxi speed for this aircraft
    pub fn max_speed(&self) -> f64 {
        let class_speed = self.class.max_taxi_speed();
        match self.max_speed {
            Some(s) if s > 0.0 => s.min(class_speed),
            _ => class_speed,
        }
    }

    /// Check the request against the graph before any search.
    pub fn validate(&self, graph: &SurfaceGraph) -> Result<(), RequestError> {
        for node in [self.origin, self.destination] {
            if !graph.contains(node) {
                return Err(RequestError::UnknownNode {
                    aircraft: self.aircraft.clone(),
                    node,
                });
            }
        }
        let detail = if !(self.priority >= 0.0) {
            Some(format!("priority {} is negative", self.priority))
        } else if !self.ready_time.is_finite() {
            Some("ready time is not finite".to_string())
        } else if self.origin == self.destination {
            Some("origin equals destination".to_string())
        } else if matches!(self.latest_departure, Some(l) if l < self.ready_time) {
            Some("latest departure precedes ready time".to_string())
        } else {
            None
        };
        match detail {
            Some(detail) => Err(RequestError::InvalidRequest {
                aircraft: self.aircraft.clone(),
                detail,
            }),
            None => Ok(()),
        }
    }
}

/// Graph plus requests, as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub requests: Vec<MovementRequest>,
}

impl Scenario {
    /// Load a scenario from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        let mut scenario: Scenario = serde_json::from_str(text)?;
        if scenario.name.is_empty() {
            scenario.name = "unnamed".to_string();
        }
        Ok(scenario)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ScenarioError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Build the validated surface graph
    pub fn graph(&self) -> Result<SurfaceGraph, ScenarioError> {
        Ok(SurfaceGraph::new(self.nodes.clone(), self.edges.clone())?)
    }

    pub fn statistics(&self, graph: &SurfaceGraph) -> ScenarioStatistics {
        let count = |kind| graph.nodes_of_kind(kind).len();
        let ready: Vec<f64> = self.requests.iter().map(|r| r.ready_time).collect();
        let earliest = ready.iter().cloned().fold(f64::INFINITY, f64::min);
        let latest = ready.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let unreachable = self
            .requests
            .iter()
            .filter(|r| !graph.is_reachable(r.origin, r.destination))
            .count();
        let aircraft: HashSet<&str> = self.requests.iter().map(|r| r.aircraft.as_str()).collect();

        ScenarioStatistics {
            name: self.name.clone(),
            num_nodes: graph.node_count(),
            num_gates: count(NodeKind::Gate),
            num_intersections: count(NodeKind::Intersection),
            num_runway_thresholds: count(NodeKind::RunwayThreshold),
            num_holding_points: count(NodeKind::HoldingPoint),
            num_edges: graph.edge_count(),
            one_way_edges: graph.edges().iter().filter(|e| !e.bidirectional).count(),
            total_length: graph.total_length(),
            num_requests: self.requests.len(),
            distinct_aircraft: aircraft.len(),
            unreachable_requests: unreachable,
            ready_span: if ready.is_empty() { 0.0 } else { latest - earliest },
        }
    }
}

/// Summary of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStatistics {
    pub name: String,
    pub num_nodes: usize,
    pub num_gates: usize,
    pub num_intersections: usize,
    pub num_runway_thresholds: usize,
    pub num_holding_points: usize,
    pub num_edges: usize,
    pub one_way_edges: usize,
    pub total_length: f64,
    pub num_requests: usize,
    pub distinct_aircraft: usize,
    pub unreachable_requests: usize,
    pub ready_span: f64,
}

impl std::fmt::Display for ScenarioStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Scenario: {}", self.name)?;
        writeln!(
            f,
            "  Nodes: {} ({} gates, {} intersections, {} runway thresholds, {} holding points)",
            self.num_nodes,
            self.num_gates,
            self.num_intersections,
            self.num_runway_thresholds,
            self.num_holding_points
        )?;
        writeln!(f, "  Edges: {} ({} one-way)", self.num_edges, self.one_way_edges)?;
        writeln!(f, "  Total taxiway length: {:.1} m", self.total_length)?;
        writeln!(f, "  Requests: {} ({} aircraft)", self.num_requests, self.distinct_aircraft)?;
        writeln!(f, "  Unreachable requests: {}", self.unreachable_requests)?;
        writeln!(f, "  Ready-time span: {:.1} s", self.ready_span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_json() -> &'static str {
        r#"{
            "name": "mini",
            "nodes": [
                {"id": 0, "x": 0.0, "y": 0.0, "kind": "gate"},
                {"id": 1, "x": 100.0, "y": 0.0, "kind": "runway_threshold", "capacity": 2}
            ],
            "edges": [{"from": 0, "to": 1, "length": 100.0, "max_speed": 10.0}],
            "requests": [
                {"aircraft": "CA123", "origin": 0, "destination": 1, "ready_time": 5.0, "class": "heavy"}
            ]
        }"#
    }

    #[test]
    fn test_scenario_defaults() {
        let scenario = Scenario::from_json(scenario_json()).unwrap();
        let graph = scenario.graph().unwrap();
        assert_eq!(graph.node(1).unwrap().capacity, 2);
        assert_eq!(graph.node(0).unwrap().capacity, 1);
        assert!(graph.edges()[0].bidirectional);

        let req = &scenario.requests[0];
        assert_eq!(req.priority, 1.0);
        assert_eq!(req.class, AircraftClass::Heavy);
        assert_eq!(req.operation, Operation::Departure);
        assert!((req.max_speed() - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_speed_override_only_lowers() {
        let req = MovementRequest::new("A", 0, 1, 0.0).with_max_speed(8.0);
        assert!((req.max_speed() - 8.0).abs() < 1e-12);
        let req = MovementRequest::new("A", 0, 1, 0.0).with_max_speed(40.0);
        assert!((req.max_speed() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_request() {
        let scenario = Scenario::from_json(scenario_json()).unwrap();
        let graph = scenario.graph().unwrap();
        assert!(scenario.requests[0].validate(&graph).is_ok());

        let unknown = MovementRequest::new("B", 0, 9, 0.0);
        assert!(matches!(unknown.validate(&graph), Err(RequestError::UnknownNode { node: 9, .. })));

        let negative = MovementRequest::new("C", 0, 1, 0.0).with_priority(-1.0);
        assert!(matches!(negative.validate(&graph), Err(RequestError::InvalidRequest { .. })));
    }

    #[test]
    fn test_statistics() {
        let scenario = Scenario::from_json(scenario_json()).unwrap();
        let graph = scenario.graph().unwrap();
        let stats = scenario.statistics(&graph);
        assert_eq!(stats.num_gates, 1);
        assert_eq!(stats.num_runway_thresholds, 1);
        assert_eq!(stats.unreachable_requests, 0);
        assert!((stats.total_length - 100.0).abs() < 1e-9);
    }
}

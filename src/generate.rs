//! Synthetic airport scenarios.
//!
//! The surface is a grid of taxiway intersections. Gates hang off the west
//! column; each runway threshold sits east of the grid behind a holding
//! point. Flights alternate between departures (gate to runway) and
//! arrivals (runway to gate) with random ready times, priorities and
//! aircraft classes.

use crate::graph::{Edge, Node, NodeId, NodeKind, SurfaceGraph};
use crate::instance::{AircraftClass, MovementRequest, Operation, Scenario};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub name: String,
    /// Intersection rows
    pub rows: usize,
    /// Intersection columns
    pub cols: usize,
    /// Distance between neighbouring intersections, in metres
    pub spacing: f64,
    pub num_runways: usize,
    pub num_flights: usize,
    /// Ready times are drawn in `[0, horizon]` seconds
    pub horizon: f64,
    /// Share of grid segments made one-way
    pub one_way_fraction: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            name: "synthetic".to_string(),
            rows: 4,
            cols: 5,
            spacing: 150.0,
            num_runways: 2,
            num_flights: 8,
            horizon: 600.0,
            one_way_fraction: 0.0,
            seed: 42,
        }
    }
}

const TAXIWAY_SPEED: f64 = 15.0;
const APRON_SPEED: f64 = 8.0;
const RUNWAY_EXIT_SPEED: f64 = 20.0;

/// Grid surface with gates and runway thresholds
pub fn generate_airport(config: &GeneratorConfig, rng: &mut impl Rng) -> (Vec<Node>, Vec<Edge>) {
    let rows = config.rows.max(1);
    let cols = config.cols.max(1);
    let s = config.spacing;
    let grid = |r: usize, c: usize| -> NodeId { r * cols + c };

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            let name = format!("T{}{}", (b'A' + (r % 26) as u8) as char, c + 1);
            nodes.push(Node::new(grid(r, c), NodeKind::Intersection, c as f64 * s, r as f64 * s).with_name(name));
        }
    }
    for r in 0..rows {
        for c in 0..cols {
            for (nr, nc) in [(r, c + 1), (r + 1, c)] {
                if nr < rows && nc < cols {
                    let mut edge = Edge::new(grid(r, c), grid(nr, nc), s, TAXIWAY_SPEED);
                    if rng.gen::<f64>() < config.one_way_fraction {
                        edge = edge.one_way();
                    }
                    edges.push(edge);
                }
            }
        }
    }

    let mut next_id = rows * cols;
    for r in 0..rows {
        let gate = next_id;
        next_id += 1;
        nodes.push(Node::new(gate, NodeKind::Gate, -s * 0.5, r as f64 * s).with_name(format!("G{}", r + 1)));
        edges.push(Edge::new(gate, grid(r, 0), s * 0.5, APRON_SPEED));
    }

    let runways = config.num_runways.clamp(1, rows);
    for k in 0..runways {
        let r = if runways == 1 { rows / 2 } else { k * (rows - 1) / (runways - 1) };
        let x = (cols - 1) as f64 * s;
        let y = r as f64 * s;
        let hold = next_id;
        let threshold = next_id + 1;
        next_id += 2;
        nodes.push(Node::new(hold, NodeKind::HoldingPoint, x + s * 0.5, y).with_name(format!("H{}", k + 1)));
        nodes.push(
            Node::new(threshold, NodeKind::RunwayThreshold, x + s, y)
                .with_name(format!("RWY{}", k + 1))
                .with_capacity(1),
        );
        edges.push(Edge::new(grid(r, cols - 1), hold, s * 0.5, TAXIWAY_SPEED));
        edges.push(Edge::new(hold, threshold, s * 0.5, RUNWAY_EXIT_SPEED));
    }
    (nodes, edges)
}

/// Alternating departures and arrivals between gates and runways. Pairs
/// without a path are skipped, up to ten draws per requested flight.
pub fn generate_requests(graph: &SurfaceGraph, config: &GeneratorConfig, rng: &mut impl Rng) -> Vec<MovementRequest> {
    let gates = graph.nodes_of_kind(NodeKind::Gate);
    let runways = graph.nodes_of_kind(NodeKind::RunwayThreshold);
    if gates.is_empty() || runways.is_empty() {
        log::warn!("no gates or runway thresholds to generate flights for");
        return Vec::new();
    }

    let mut requests = Vec::with_capacity(config.num_flights);
    let mut attempts = 0;
    while requests.len() < config.num_flights && attempts < config.num_flights * 10 {
        attempts += 1;
        let departure = requests.len() % 2 == 0;
        let (gate, runway) = (gates[rng.gen_range(0..gates.len())], runways[rng.gen_range(0..runways.len())]);
        let (origin, destination, operation) = if departure {
            (gate, runway, Operation::Departure)
        } else {
            (runway, gate, Operation::Arrival)
        };
        if !graph.is_reachable(origin, destination) {
            log::debug!("skipping {} -> {}: no path", origin, destination);
            continue;
        }

        let classes = AircraftClass::all();
        let request = MovementRequest::new(
            format!("FL{}", 1000 + requests.len()),
            origin,
            destination,
            rng.gen_range(0.0..=config.horizon.max(0.0)).round(),
        )
        .with_operation(operation)
        .with_priority(*[1.0, 2.0, 3.0].choose(rng).unwrap_or(&1.0))
        .with_class(classes[rng.gen_range(0..classes.len())])
        .with_max_speed(rng.gen_range(12.0..18.0));
        requests.push(request);
    }
    requests
}

/// Build a complete scenario from a seed.
pub fn generate_scenario(config: &GeneratorConfig) -> Scenario {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (nodes, edges) = generate_airport(config, &mut rng);
    let requests = match SurfaceGraph::new(nodes.clone(), edges.clone()) {
        Ok(graph) => generate_requests(&graph, config, &mut rng),
        Err(e) => {
            log::error!("generated airport is invalid: {}", e);
            Vec::new()
        }
    };
    Scenario {
        name: config.name.clone(),
        nodes,
        edges,
        requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_scenario_is_valid() {
        let config = GeneratorConfig::default();
        let scenario = generate_scenario(&config);
        let graph = scenario.graph().unwrap();
        assert_eq!(graph.nodes_of_kind(NodeKind::Gate).len(), 4);
        assert_eq!(graph.nodes_of_kind(NodeKind::RunwayThreshold).len(), 2);
        assert_eq!(scenario.requests.len(), 8);
        for (i, r) in scenario.requests.iter().enumerate() {
            assert!(r.validate(&graph).is_ok());
            let expected = if i % 2 == 0 { Operation::Departure } else { Operation::Arrival };
            assert_eq!(r.operation, expected);
            assert!(r.ready_time >= 0.0 && r.ready_time <= config.horizon);
        }
    }

    #[test]
    fn test_seed_reproducible() {
        let config = GeneratorConfig { seed: 3, num_flights: 5, ..Default::default() };
        let a = generate_scenario(&config);
        let b = generate_scenario(&config);
        assert_eq!(a.requests, b.requests);
    }
}

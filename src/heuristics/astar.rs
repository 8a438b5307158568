//! Shortest-time pathfinding for a single aircraft.
//!
//! A* over the surface graph. The cost of a state is the time elapsed since
//! leaving the origin; the heuristic is the scaled straight-line distance to
//! the destination divided by the aircraft's top speed, which never
//! overestimates. For aircraft classes with a turn limit the search state
//! also carries the previous node so that sharp turns can be rejected.

use crate::error::RequestError;
use crate::graph::{NodeId, SurfaceGraph, Traversal};
use crate::instance::MovementRequest;
use crate::solution::Route;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A* settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    /// Expansion budget per search
    pub max_expansions: usize,
    /// Reject heading changes above the aircraft class limit
    pub enforce_turn_limits: bool,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        PathfinderConfig {
            max_expansions: 200_000,
            enforce_turn_limits: true,
        }
    }
}

/// Interval in which the aircraft may move, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        TimeWindow { start, end }
    }

    pub fn unbounded() -> Self {
        TimeWindow {
            start: f64::NEG_INFINITY,
            end: f64::INFINITY,
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::unbounded()
    }
}

/// Why a raw search found no path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchFailure {
    Unreachable,
    Exhausted(usize),
}

/// Restrictions applied to one search, used by the k-shortest spur searches
#[derive(Debug, Default)]
pub(crate) struct Restrictions {
    /// Directed moves `(from, to)` that may not be taken
    pub blocked_moves: HashSet<(NodeId, NodeId)>,
    /// Nodes that may not be entered
    pub blocked_nodes: HashSet<NodeId>,
}

/// Time needed to taxi a traversal at the aircraft's speed
pub(crate) fn traversal_time(graph: &SurfaceGraph, t: &Traversal, speed: f64) -> f64 {
    let edge = &graph.edges()[t.edge];
    edge.length / edge.max_speed.min(speed)
}

pub(crate) fn path_time(graph: &SurfaceGraph, path: &[Traversal], speed: f64) -> f64 {
    path.iter().map(|t| traversal_time(graph, t, speed)).sum()
}

/// Heading change in degrees when going `a -> b -> c`
fn turn_angle(graph: &SurfaceGraph, a: NodeId, b: NodeId, c: NodeId) -> f64 {
    let (Some(na), Some(nb), Some(nc)) = (graph.node(a), graph.node(b), graph.node(c)) else {
        return 0.0;
    };
    let (ux, uy) = (nb.x - na.x, nb.y - na.y);
    let (vx, vy) = (nc.x - nb.x, nc.y - nb.y);
    let norm = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
    if norm <= f64::EPSILON {
        return 0.0;
    }
    let cos = ((ux * vx + uy * vy) / norm).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

type State = (NodeId, Option<NodeId>);

/// A* from `start` to the request's destination. `prev` is the node the
/// aircraft arrived from, used only for turn limits.
pub(crate) fn search(
    graph: &SurfaceGraph,
    request: &MovementRequest,
    start: NodeId,
    prev: Option<NodeId>,
    restrictions: &Restrictions,
    config: &PathfinderConfig,
) -> Result<(Vec<Traversal>, f64), SearchFailure> {
    let goal = request.destination;
    let speed = request.max_speed();
    let turn_limit = if config.enforce_turn_limits {
        request.class.max_turn_deg()
    } else {
        None
    };
    let scale = graph.heuristic_scale();
    let h = |n: NodeId| graph.straight_line(n, goal) * scale / speed;

    let start_state: State = (start, if turn_limit.is_some() { prev } else { None });
    let mut g_score: HashMap<State, f64> = HashMap::new();
    let mut came_from: HashMap<State, (State, Traversal)> = HashMap::new();
    let mut open = BinaryHeap::new();
    let mut seq: u64 = 0;

    g_score.insert(start_state, 0.0);
    let h0 = h(start);
    open.push(Reverse((OrderedFloat(h0), OrderedFloat(h0), seq, OrderedFloat(0.0), start_state)));

    let mut expanded = 0usize;
    while let Some(Reverse((_, _, _, OrderedFloat(g), state))) = open.pop() {
        if g > g_score[&state] + 1e-12 {
            continue;
        }
        let (node, came) = state;
        if node == goal {
            let mut path = Vec::new();
            let mut cur = state;
            while let Some(&(parent, t)) = came_from.get(&cur) {
                path.push(t);
                cur = parent;
            }
            path.reverse();
            return Ok((path, g));
        }

        expanded += 1;
        if expanded > config.max_expansions {
            return Err(SearchFailure::Exhausted(expanded - 1));
        }

        for t in graph.neighbors(node) {
            if restrictions.blocked_nodes.contains(&t.to)
                || restrictions.blocked_moves.contains(&(t.from, t.to))
            {
                continue;
            }
            if let (Some(limit), Some(p)) = (turn_limit, came) {
                if turn_angle(graph, p, node, t.to) > limit + 1e-9 {
                    continue;
                }
            }
            let next: State = (t.to, if turn_limit.is_some() { Some(node) } else { None });
            let tentative = g + traversal_time(graph, t, speed);
            if g_score.get(&next).map_or(true, |&old| tentative < old - 1e-12) {
                g_score.insert(next, tentative);
                came_from.insert(next, (state, *t));
                let hn = h(t.to);
                seq += 1;
                open.push(Reverse((
                    OrderedFloat(tentative + hn),
                    OrderedFloat(hn),
                    seq,
                    OrderedFloat(tentative),
                    next,
                )));
            }
        }
    }
    Err(SearchFailure::Unreachable)
}

/// Fastest route for one request inside a time window.
///
/// The aircraft leaves at `max(ready_time, window.start)`. Failures are
/// returned per request and never abort a planning run.
pub fn find_route(
    graph: &SurfaceGraph,
    request: &MovementRequest,
    window: TimeWindow,
    config: &PathfinderConfig,
) -> Result<Route, RequestError> {
    request.validate(graph)?;
    let departure = request.ready_time.max(window.start);

    let (path, time) = search(graph, request, request.origin, None, &Restrictions::default(), config)
        .map_err(|failure| match failure {
            SearchFailure::Unreachable => RequestError::Unreachable {
                aircraft: request.aircraft.clone(),
                origin: request.origin,
                destination: request.destination,
            },
            SearchFailure::Exhausted(expanded) => RequestError::SearchExhausted {
                aircraft: request.aircraft.clone(),
                expanded,
            },
        })?;

    let arrival = departure + time;
    if arrival > window.end + 1e-9 {
        return Err(RequestError::OutsideWindow {
            aircraft: request.aircraft.clone(),
            earliest_arrival: arrival,
            window_end: window.end,
        });
    }
    log::debug!(
        "route for {}: {} segments, {:.1}s",
        request.aircraft,
        path.len(),
        time
    );
    Ok(Route::timed(graph, request, &path, departure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeKind};
    use crate::instance::AircraftClass;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn grid(n: usize) -> SurfaceGraph {
        let mut nodes = Vec::new();
        for r in 0..n {
            for c in 0..n {
                nodes.push(Node::new(r * n + c, NodeKind::Intersection, c as f64 * 100.0, r as f64 * 100.0));
            }
        }
        let mut edges = Vec::new();
        for r in 0..n {
            for c in 0..n {
                let id = r * n + c;
                if c + 1 < n {
                    edges.push(Edge::new(id, id + 1, 100.0, 15.0));
                }
                if r + 1 < n {
                    edges.push(Edge::new(id, id + n, 100.0, 15.0));
                }
            }
        }
        SurfaceGraph::new(nodes, edges).unwrap()
    }

    fn random_graph(rng: &mut ChaCha8Rng, n: usize) -> SurfaceGraph {
        let nodes: Vec<Node> = (0..n)
            .map(|i| Node::new(i, NodeKind::Intersection, rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0)))
            .collect();
        let mut edges = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if rng.gen_bool(0.3) {
                    let euclid = nodes[i].distance_to(&nodes[j]);
                    let length = euclid * rng.gen_range(1.0..1.5) + 1.0;
                    let mut edge = Edge::new(i, j, length, rng.gen_range(5.0..20.0));
                    if rng.gen_bool(0.3) {
                        edge = edge.one_way();
                    }
                    edges.push(edge);
                }
            }
        }
        SurfaceGraph::new(nodes, edges).unwrap()
    }

    /// Reference shortest times by Floyd-Warshall
    fn all_pairs(graph: &SurfaceGraph, speed: f64) -> Vec<Vec<f64>> {
        let n = graph.node_count();
        let mut dist = vec![vec![f64::INFINITY; n]; n];
        for i in 0..n {
            dist[i][i] = 0.0;
            for t in graph.neighbors(i) {
                dist[i][t.to] = dist[i][t.to].min(traversal_time(graph, t, speed));
            }
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if dist[i][k] + dist[k][j] < dist[i][j] {
                        dist[i][j] = dist[i][k] + dist[k][j];
                    }
                }
            }
        }
        dist
    }

    #[test]
    fn test_matches_brute_force_on_random_graphs() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let config = PathfinderConfig::default();
        for _ in 0..20 {
            let graph = random_graph(&mut rng, 12);
            let reference = all_pairs(&graph, 15.0);
            for o in 0..12 {
                for d in 0..12 {
                    if o == d {
                        continue;
                    }
                    let request = MovementRequest::new("T", o, d, 0.0);
                    match find_route(&graph, &request, TimeWindow::unbounded(), &config) {
                        Ok(route) => {
                            assert!((route.traversal_time() - reference[o][d]).abs() < 1e-6);
                            assert!(route.check(&graph, 15.0).is_empty());
                        }
                        Err(RequestError::Unreachable { .. }) => assert!(reference[o][d].is_infinite()),
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let graph = grid(5);
        let request = MovementRequest::new("A", 0, 24, 10.0);
        let config = PathfinderConfig::default();
        let first = find_route(&graph, &request, TimeWindow::unbounded(), &config).unwrap();
        let second = find_route(&graph, &request, TimeWindow::unbounded(), &config).unwrap();
        assert_eq!(first, second);
        assert!((first.departure_time() - 10.0).abs() < 1e-12);
        assert!((first.distance - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_start_delays_departure_and_end_rejects() {
        let graph = grid(3);
        let request = MovementRequest::new("A", 0, 2, 0.0);
        let config = PathfinderConfig::default();
        let route = find_route(&graph, &request, TimeWindow::new(50.0, 1000.0), &config).unwrap();
        assert!((route.departure_time() - 50.0).abs() < 1e-12);

        let err = find_route(&graph, &request, TimeWindow::new(0.0, 5.0), &config).unwrap_err();
        assert!(matches!(err, RequestError::OutsideWindow { .. }));
    }

    #[test]
    fn test_one_way_and_unknown_nodes() {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::RunwayThreshold, 100.0, 0.0),
        ];
        let graph = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 100.0, 10.0).one_way()]).unwrap();
        let config = PathfinderConfig::default();
        let back = MovementRequest::new("A", 1, 0, 0.0);
        let err = find_route(&graph, &back, TimeWindow::unbounded(), &config).unwrap_err();
        assert!(matches!(err, RequestError::Unreachable { .. }));

        let unknown = MovementRequest::new("B", 0, 5, 0.0);
        let err = find_route(&graph, &unknown, TimeWindow::unbounded(), &config).unwrap_err();
        assert!(matches!(err, RequestError::UnknownNode { node: 5, .. }));
    }

    #[test]
    fn test_expansion_budget() {
        let graph = grid(6);
        let request = MovementRequest::new("A", 0, 35, 0.0);
        let config = PathfinderConfig { max_expansions: 3, ..Default::default() };
        let err = find_route(&graph, &request, TimeWindow::unbounded(), &config).unwrap_err();
        assert!(matches!(err, RequestError::SearchExhausted { expanded: 3, .. }));
    }

    #[test]
    fn test_turn_limit_forces_detour() {
        // 0 -> 1 -> 2 is a hairpin; the heavy aircraft must take the long direct taxiway
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::Intersection, 300.0, 0.0),
            Node::new(2, NodeKind::RunwayThreshold, 200.0, 10.0),
        ];
        let edges = vec![
            Edge::new(0, 1, 300.0, 15.0),
            Edge::new(1, 2, 101.0, 15.0),
            Edge::new(0, 2, 500.0, 15.0),
        ];
        let graph = SurfaceGraph::new(nodes, edges).unwrap();
        let config = PathfinderConfig::default();

        let medium = MovementRequest::new("M", 0, 2, 0.0);
        let route = find_route(&graph, &medium, TimeWindow::unbounded(), &config).unwrap();
        assert_eq!(route.nodes(), vec![0, 1, 2]);

        let heavy = MovementRequest::new("H", 0, 2, 0.0).with_class(AircraftClass::Heavy);
        let route = find_route(&graph, &heavy, TimeWindow::unbounded(), &config).unwrap();
        assert_eq!(route.nodes(), vec![0, 2]);
    }
}

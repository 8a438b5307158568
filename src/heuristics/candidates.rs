//! Candidate routes per aircraft.
//!
//! Each request gets its `k` fastest loop-less paths (Yen's algorithm with
//! the A* search solving the spur problems), each timed at a few departure
//! offsets after the ready time. The genetic optimizer and the exact
//! scheduler both choose among these candidates.

use crate::error::RequestError;
use crate::graph::{NodeId, SurfaceGraph, Traversal};
use crate::heuristics::astar::{find_route, path_time, search, PathfinderConfig, Restrictions, TimeWindow};
use crate::instance::MovementRequest;
use crate::solution::Route;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Candidate generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Number of alternative paths per aircraft
    pub k_paths: usize,
    /// Number of departure times tried per path (offset 0 included)
    pub departure_offsets: usize,
    /// Seconds between two departure offsets
    pub offset_step: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        CandidateConfig {
            k_paths: 3,
            departure_offsets: 4,
            offset_step: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub route: Route,
    /// Rank of the path among the k fastest (0 = fastest)
    pub path_rank: usize,
    /// Hold at the origin before departure, in seconds
    pub offset: f64,
}

/// All candidates of one aircraft
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub request: MovementRequest,
    pub candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Index of the cheapest candidate
    pub fn cheapest(&self) -> usize {
        self.candidates
            .iter()
            .enumerate()
            .min_by_key(|(i, c)| (OrderedFloat(c.route.weighted_cost()), *i))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Candidate sets of every routable request, in request order
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    pub sets: Vec<CandidateSet>,
    /// Requests that could not be routed at all
    pub excluded: Vec<RequestError>,
}

impl CandidatePool {
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn total_candidates(&self) -> usize {
        self.sets.iter().map(|s| s.len()).sum()
    }

    /// Same pool restricted to departures at the ready time
    pub fn path_alternatives(&self) -> CandidatePool {
        CandidatePool {
            sets: self
                .sets
                .iter()
                .map(|set| CandidateSet {
                    request: set.request.clone(),
                    candidates: set.candidates.iter().filter(|c| c.offset == 0.0).cloned().collect(),
                })
                .collect(),
            excluded: self.excluded.clone(),
        }
    }
}

/// The `k` fastest loop-less paths for a request, fastest first.
pub fn k_shortest_paths(
    graph: &SurfaceGraph,
    request: &MovementRequest,
    first: Vec<Traversal>,
    k: usize,
    config: &PathfinderConfig,
) -> Vec<Vec<Traversal>> {
    let speed = request.max_speed();
    let mut accepted: Vec<Vec<Traversal>> = vec![first];
    let mut pending: Vec<(f64, u64, Vec<Traversal>)> = Vec::new();
    let mut seq = 0u64;

    while accepted.len() < k {
        let last = accepted[accepted.len() - 1].clone();
        let last_nodes = path_nodes(request.origin, &last);

        for i in 0..last.len() {
            let spur = last_nodes[i];
            let root = &last[..i];

            let mut restrictions = Restrictions::default();
            for path in &accepted {
                if path.len() > i && path[..i] == *root {
                    restrictions.blocked_moves.insert((path[i].from, path[i].to));
                }
            }
            restrictions.blocked_nodes.extend(last_nodes[..i].iter().copied());

            let prev = if i > 0 { Some(last_nodes[i - 1]) } else { None };
            let Ok((spur_path, _)) = search(graph, request, spur, prev, &restrictions, config) else {
                continue;
            };
            let mut total: Vec<Traversal> = root.to_vec();
            total.extend(spur_path);

            if accepted.contains(&total) || pending.iter().any(|(_, _, p)| *p == total) {
                continue;
            }
            seq += 1;
            pending.push((path_time(graph, &total, speed), seq, total));
        }

        let Some(best) = pending
            .iter()
            .enumerate()
            .min_by_key(|(_, (t, s, _))| (OrderedFloat(*t), *s))
            .map(|(i, _)| i)
        else {
            break;
        };
        let (_, _, path) = pending.swap_remove(best);
        accepted.push(path);
    }
    accepted
}

fn path_nodes(origin: NodeId, path: &[Traversal]) -> Vec<NodeId> {
    let mut nodes = Vec::with_capacity(path.len() + 1);
    nodes.push(origin);
    nodes.extend(path.iter().map(|t| t.to));
    nodes
}

fn candidates_for(
    graph: &SurfaceGraph,
    request: &MovementRequest,
    config: &CandidateConfig,
    pathfinder: &PathfinderConfig,
) -> Result<CandidateSet, RequestError> {
    let fastest = find_route(graph, request, TimeWindow::unbounded(), pathfinder)?;
    let first: Vec<Traversal> = fastest
        .steps
        .windows(2)
        .filter_map(|w| {
            let edge = w[1].via?;
            Some(Traversal { edge, from: w[0].node, to: w[1].node })
        })
        .collect();

    let paths = k_shortest_paths(graph, request, first, config.k_paths.max(1), pathfinder);
    let latest = request.latest_departure.unwrap_or(f64::INFINITY);

    let mut candidates = Vec::new();
    for (rank, path) in paths.iter().enumerate() {
        for step in 0..config.departure_offsets.max(1) {
            let offset = step as f64 * config.offset_step;
            let departure = request.ready_time + offset;
            if step > 0 && departure > latest + 1e-9 {
                break;
            }
            candidates.push(Candidate {
                route: Route::timed(graph, request, path, departure),
                path_rank: rank,
                offset,
            });
        }
    }
    Ok(CandidateSet {
        request: request.clone(),
        candidates,
    })
}

/// Build candidate sets for every request, in parallel.
pub fn generate_candidates(
    graph: &SurfaceGraph,
    requests: &[MovementRequest],
    config: &CandidateConfig,
    pathfinder: &PathfinderConfig,
) -> CandidatePool {
    let results: Vec<Result<CandidateSet, RequestError>> = requests
        .par_iter()
        .map(|r| candidates_for(graph, r, config, pathfinder))
        .collect();

    let mut pool = CandidatePool::default();
    for result in results {
        match result {
            Ok(set) => pool.sets.push(set),
            Err(e) => {
                log::warn!("excluding request: {}", e);
                pool.excluded.push(e);
            }
        }
    }
    log::info!(
        "generated {} candidates for {} aircraft ({} excluded)",
        pool.total_candidates(),
        pool.len(),
        pool.excluded.len()
    );
    pool
}

/// Distinct node sequences among the candidates of a set
pub fn distinct_paths(set: &CandidateSet) -> usize {
    let paths: HashSet<Vec<NodeId>> = set.candidates.iter().map(|c| c.route.nodes()).collect();
    paths.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeKind};

    /// Square 0-1-3 / 0-2-3 plus a long bypass 0-4-3
    fn square() -> SurfaceGraph {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::Intersection, 100.0, 0.0),
            Node::new(2, NodeKind::Intersection, 0.0, 100.0),
            Node::new(3, NodeKind::RunwayThreshold, 100.0, 100.0),
            Node::new(4, NodeKind::Intersection, -100.0, 200.0),
        ];
        let edges = vec![
            Edge::new(0, 1, 100.0, 15.0),
            Edge::new(1, 3, 100.0, 15.0),
            Edge::new(0, 2, 110.0, 15.0),
            Edge::new(2, 3, 110.0, 15.0),
            Edge::new(0, 4, 300.0, 15.0),
            Edge::new(4, 3, 300.0, 15.0),
        ];
        SurfaceGraph::new(nodes, edges).unwrap()
    }

    #[test]
    fn test_k_shortest_in_order() {
        let graph = square();
        let request = MovementRequest::new("A", 0, 3, 0.0);
        let config = CandidateConfig { k_paths: 3, departure_offsets: 1, offset_step: 30.0 };
        let pool = generate_candidates(&graph, &[request], &config, &PathfinderConfig::default());
        let set = &pool.sets[0];
        let nodes: Vec<Vec<NodeId>> = set.candidates.iter().map(|c| c.route.nodes()).collect();
        assert_eq!(nodes, vec![vec![0, 1, 3], vec![0, 2, 3], vec![0, 4, 3]]);
        assert_eq!(distinct_paths(set), 3);
        let times: Vec<f64> = set.candidates.iter().map(|c| c.route.traversal_time()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_offsets_respect_latest_departure() {
        let graph = square();
        let request = MovementRequest::new("A", 0, 3, 100.0).with_latest_departure(160.0);
        let config = CandidateConfig { k_paths: 1, departure_offsets: 4, offset_step: 30.0 };
        let pool = generate_candidates(&graph, &[request], &config, &PathfinderConfig::default());
        let offsets: Vec<f64> = pool.sets[0].candidates.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0.0, 30.0, 60.0]);
        assert_eq!(pool.path_alternatives().sets[0].len(), 1);
    }

    #[test]
    fn test_unroutable_request_is_excluded_in_order() {
        let graph = square();
        let requests = vec![
            MovementRequest::new("A", 0, 3, 0.0),
            MovementRequest::new("B", 0, 42, 0.0),
            MovementRequest::new("C", 3, 0, 5.0),
        ];
        let pool = generate_candidates(&graph, &requests, &CandidateConfig::default(), &PathfinderConfig::default());
        let names: Vec<&str> = pool.sets.iter().map(|s| s.request.aircraft.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(pool.excluded.len(), 1);
        assert_eq!(pool.excluded[0].aircraft(), "B");
    }

    #[test]
    fn test_fewer_paths_than_k() {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::RunwayThreshold, 100.0, 0.0),
        ];
        let graph = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 100.0, 10.0)]).unwrap();
        let request = MovementRequest::new("A", 0, 1, 0.0);
        let config = CandidateConfig { k_paths: 5, departure_offsets: 2, offset_step: 10.0 };
        let pool = generate_candidates(&graph, &[request], &config, &PathfinderConfig::default());
        assert_eq!(pool.sets[0].len(), 2);
        assert_eq!(pool.sets[0].cheapest(), 0);
    }
}

//! Airport surface graph.
//!
//! Nodes are intersections, gates, runway thresholds and holding points;
//! edges are taxiway segments with a length, a speed limit and an occupancy
//! capacity. Adjacency is index based (node id -> list of traversals) so the
//! graph can be shared read-only across worker threads.

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

pub type NodeId = usize;
pub type EdgeId = usize;

fn default_capacity() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Role of a node on the airport surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Gate,
    Intersection,
    RunwayThreshold,
    HoldingPoint,
}

/// A point of the surface network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Optional human readable label (stand number, taxiway name...)
    #[serde(default)]
    pub name: String,
    /// X coordinate in metres
    pub x: f64,
    /// Y coordinate in metres
    pub y: f64,
    /// Elevation in metres
    #[serde(default)]
    pub z: f64,
    pub kind: NodeKind,
    /// Maximum number of aircraft allowed on the node at the same time
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, x: f64, y: f64) -> Self {
        Node {
            id,
            name: String::new(),
            x,
            y,
            z: 0.0,
            kind,
            capacity: 1,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("N{}", self.id)
        } else {
            self.name.clone()
        }
    }

    /// Euclidean distance to another node
    pub fn distance_to(&self, other: &Node) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A taxiway segment between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    /// Length in metres
    pub length: f64,
    /// Speed limit in metres per second
    pub max_speed: f64,
    /// Whether the segment may also be taxied from `to` to `from`
    #[serde(default = "default_true")]
    pub bidirectional: bool,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, length: f64, max_speed: f64) -> Self {
        Edge {
            from,
            to,
            length,
            max_speed,
            bidirectional: true,
            capacity: 1,
        }
    }

    pub fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Directed use of an edge; a bidirectional edge yields two traversals
/// sharing the same `edge` id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Traversal {
    pub edge: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
}

/// Immutable surface graph
#[derive(Debug, Clone)]
pub struct SurfaceGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    adjacency: BTreeMap<NodeId, Vec<Traversal>>,
    heuristic_scale: f64,
}

impl SurfaceGraph {
    /// Build and validate a graph.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut node_map = BTreeMap::new();
        for node in nodes {
            if node.capacity == 0 {
                return Err(GraphError::ZeroCapacity { what: "node", id: node.id });
            }
            let id = node.id;
            if node_map.insert(id, node).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        let mut adjacency: BTreeMap<NodeId, Vec<Traversal>> =
            node_map.keys().map(|&id| (id, Vec::new())).collect();
        let mut heuristic_scale: f64 = 1.0;

        for (idx, edge) in edges.iter().enumerate() {
            for endpoint in [edge.from, edge.to] {
                if !node_map.contains_key(&endpoint) {
                    return Err(GraphError::UnknownEndpoint { edge: idx, node: endpoint });
                }
            }
            if edge.from == edge.to {
                return Err(GraphError::SelfLoop { edge: idx, node: edge.from });
            }
            if !(edge.length > 0.0) {
                return Err(GraphError::NonPositive { edge: idx, field: "length", value: edge.length });
            }
            if !(edge.max_speed > 0.0) {
                return Err(GraphError::NonPositive { edge: idx, field: "max_speed", value: edge.max_speed });
            }
            if edge.capacity == 0 {
                return Err(GraphError::ZeroCapacity { what: "edge", id: idx });
            }

            // Keep the straight-line heuristic below the true edge length.
            let euclid = node_map[&edge.from].distance_to(&node_map[&edge.to]);
            if euclid > 0.0 {
                heuristic_scale = heuristic_scale.min(edge.length / euclid);
            }

            if let Some(list) = adjacency.get_mut(&edge.from) {
                list.push(Traversal { edge: idx, from: edge.from, to: edge.to });
            }
            if edge.bidirectional {
                if let Some(list) = adjacency.get_mut(&edge.to) {
                    list.push(Traversal { edge: idx, from: edge.to, to: edge.from });
                }
            }
        }

        Ok(SurfaceGraph {
            nodes: node_map,
            edges,
            adjacency,
            heuristic_scale,
        })
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing traversals of a node (empty for unknown ids).
    pub fn neighbors(&self, id: NodeId) -> &[Traversal] {
        self.adjacency.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Shortest traversal connecting `from` to `to`, if any.
    pub fn find_traversal(&self, from: NodeId, to: NodeId) -> Option<Traversal> {
        self.neighbors(from)
            .iter()
            .filter(|t| t.to == to)
            .min_by(|a, b| self.edges[a.edge].length.total_cmp(&self.edges[b.edge].length))
            .copied()
    }

    /// Straight-line distance between two nodes, 0 if either is unknown.
    pub fn straight_line(&self, a: NodeId, b: NodeId) -> f64 {
        match (self.nodes.get(&a), self.nodes.get(&b)) {
            (Some(na), Some(nb)) => na.distance_to(nb),
            _ => 0.0,
        }
    }

    /// Factor in (0, 1] applied to straight-line distances so they never
    /// exceed the length of any real path.
    pub fn heuristic_scale(&self) -> f64 {
        self.heuristic_scale
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes.values().filter(|n| n.kind == kind).map(|n| n.id).collect()
    }

    /// Nearest node to a position, optionally restricted to one kind
    pub fn nearest_node(&self, x: f64, y: f64, kind: Option<NodeKind>) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| kind.map_or(true, |k| n.kind == k))
            .min_by(|a, b| {
                let da = (a.x - x).powi(2) + (a.y - y).powi(2);
                let db = (b.x - x).powi(2) + (b.y - y).powi(2);
                da.total_cmp(&db)
            })
            .map(|n| n.id)
    }

    pub fn total_length(&self) -> f64 {
        self.edges.iter().map(|e| e.length).sum()
    }

    /// Breadth-first reachability following edge directions.
    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        seen.insert(from);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for t in self.neighbors(current) {
                if seen.insert(t.to) {
                    queue.push_back(t.to);
                }
            }
        }
        false
    }

    /// Display label for an edge resource.
    pub fn edge_label(&self, id: EdgeId) -> String {
        match self.edges.get(id) {
            Some(e) => format!("E{}({}-{})", id, e.from, e.to),
            None => format!("E{}", id),
        }
    }

    pub fn node_label(&self, id: NodeId) -> String {
        self.nodes.get(&id).map(|n| n.label()).unwrap_or_else(|| format!("N{}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> SurfaceGraph {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::Intersection, 100.0, 0.0),
            Node::new(2, NodeKind::RunwayThreshold, 200.0, 0.0),
        ];
        let edges = vec![
            Edge::new(0, 1, 100.0, 10.0),
            Edge::new(1, 2, 100.0, 10.0).one_way(),
        ];
        SurfaceGraph::new(nodes, edges).unwrap()
    }

    #[test]
    fn test_adjacency_respects_direction() {
        let graph = line_graph();
        assert_eq!(graph.neighbors(0).len(), 1);
        // 1 -> 0 (reverse of bidirectional) and 1 -> 2
        assert_eq!(graph.neighbors(1).len(), 2);
        assert!(graph.neighbors(2).is_empty());
        assert!(graph.is_reachable(0, 2));
        assert!(!graph.is_reachable(2, 0));
    }

    #[test]
    fn test_reverse_traversal_shares_edge() {
        let graph = line_graph();
        let forward = graph.find_traversal(0, 1).unwrap();
        let backward = graph.find_traversal(1, 0).unwrap();
        assert_eq!(forward.edge, backward.edge);
        assert!(graph.find_traversal(2, 1).is_none());
    }

    #[test]
    fn test_rejects_unknown_endpoint() {
        let nodes = vec![Node::new(0, NodeKind::Gate, 0.0, 0.0)];
        let edges = vec![Edge::new(0, 7, 10.0, 5.0)];
        let err = SurfaceGraph::new(nodes, edges).unwrap_err();
        assert_eq!(err, GraphError::UnknownEndpoint { edge: 0, node: 7 });
    }

    #[test]
    fn test_rejects_duplicates_and_bad_values() {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(0, NodeKind::Gate, 1.0, 0.0),
        ];
        assert_eq!(SurfaceGraph::new(nodes, vec![]).unwrap_err(), GraphError::DuplicateNode(0));

        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::Gate, 1.0, 0.0),
        ];
        let err = SurfaceGraph::new(nodes.clone(), vec![Edge::new(0, 1, 0.0, 5.0)]).unwrap_err();
        assert!(matches!(err, GraphError::NonPositive { field: "length", .. }));
        let err = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 5.0, 5.0).with_capacity(0)]).unwrap_err();
        assert!(matches!(err, GraphError::ZeroCapacity { what: "edge", .. }));
    }

    #[test]
    fn test_heuristic_scale_shrinks_for_short_edges() {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::Gate, 100.0, 0.0),
        ];
        let graph = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 50.0, 5.0)]).unwrap();
        assert!((graph.heuristic_scale() - 0.5).abs() < 1e-12);
        assert!((line_graph().heuristic_scale() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_node_by_kind() {
        let graph = line_graph();
        assert_eq!(graph.nearest_node(190.0, 5.0, None), Some(2));
        assert_eq!(graph.nearest_node(190.0, 5.0, Some(NodeKind::Gate)), Some(0));
    }
}

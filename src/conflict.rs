//! Occupancy and conflict detection.
//!
//! Every route occupies its nodes during `[arrival, departure]` and its
//! edges during `[departure from tail, arrival at head]`. Two occupations
//! of one resource overlap when they come closer than the separation
//! buffer, or when they begin at the same instant. The second rule matters
//! for node occupations, which last zero seconds when an aircraft rolls
//! through without stopping. A resource of capacity `c` is violated whenever
//! an aircraft enters it while `c` other aircraft are still there.

use crate::graph::{EdgeId, NodeId, SurfaceGraph};
use crate::solution::{Assignment, Route};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entries this close together count as simultaneous; gaps short of the
/// separation by less than this count as kept
pub const SAME_INSTANT: f64 = 1e-6;
/// Smallest gap the schedulers leave between two ordered entries of one
/// resource, so zero-length occupations never coincide
pub const MIN_HEADWAY: f64 = 1e-3;

/// Separation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Minimum time gap between two aircraft on one resource, in seconds.
    /// Negative values are treated as zero.
    pub separation: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        ConflictConfig { separation: 30.0 }
    }
}

/// A capacity-limited piece of the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Resource {
    Node(NodeId),
    Edge(EdgeId),
}

impl Resource {
    pub fn capacity(&self, graph: &SurfaceGraph) -> u32 {
        match *self {
            Resource::Node(id) => graph.node(id).map(|n| n.capacity).unwrap_or(1),
            Resource::Edge(id) => graph.edge(id).map(|e| e.capacity).unwrap_or(1),
        }
    }

    pub fn label(&self, graph: &SurfaceGraph) -> String {
        match *self {
            Resource::Node(id) => graph.node_label(id),
            Resource::Edge(id) => graph.edge_label(id),
        }
    }
}

/// Time an aircraft spends on one resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupation {
    pub resource: Resource,
    pub start: f64,
    pub end: f64,
}

/// All occupations of a route, in route order
pub fn occupations(route: &Route) -> Vec<Occupation> {
    let mut out = Vec::with_capacity(route.steps.len() * 2);
    for (i, step) in route.steps.iter().enumerate() {
        if i > 0 {
            if let Some(edge) = step.via {
                out.push(Occupation {
                    resource: Resource::Edge(edge),
                    start: route.steps[i - 1].departure,
                    end: step.arrival,
                });
            }
        }
        out.push(Occupation {
            resource: Resource::Node(step.node),
            start: step.arrival,
            end: step.departure,
        });
    }
    out
}

/// An occupation tagged with its owner, as seen by the sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub owner: usize,
    pub start: f64,
    pub end: f64,
}

/// An entering slot that found the resource already full
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Index of the entering slot
    pub entrant: usize,
    /// Indices of the slots already present (at least `capacity` of them)
    pub occupants: Vec<usize>,
}

#[inline]
pub fn overlaps(a: &Slot, b: &Slot, separation: f64) -> bool {
    (a.start - b.start).abs() <= SAME_INSTANT
        || (a.start + SAME_INSTANT < b.end + separation && b.start + SAME_INSTANT < a.end + separation)
}

/// Hold `d_after - d_before` needed for `after` to enter a resource once
/// `before` has cleared it
#[inline]
pub fn required_lag(before: &Occupation, after: &Occupation, separation: f64) -> f64 {
    (before.end + separation).max(before.start + MIN_HEADWAY) - after.start
}

/// Sweep the slots of a single resource. With `first_only` the sweep stops
/// at the first violation.
pub fn sweep(slots: &[Slot], capacity: u32, separation: f64, first_only: bool) -> Vec<Violation> {
    let mut order: Vec<usize> = (0..slots.len()).collect();
    order.sort_by(|&a, &b| {
        slots[a]
            .start
            .total_cmp(&slots[b].start)
            .then(slots[a].owner.cmp(&slots[b].owner))
            .then(a.cmp(&b))
    });

    let mut violations = Vec::new();
    let mut active: Vec<usize> = Vec::new();
    for &idx in &order {
        let entering = &slots[idx];
        active.retain(|&a| {
            slots[a].end + separation > entering.start + SAME_INSTANT
                || entering.start - slots[a].start <= SAME_INSTANT
        });

        let mut present: Vec<usize> = Vec::new();
        for &a in &active {
            let other = &slots[a];
            if other.owner != entering.owner
                && overlaps(other, entering, separation)
                && !present.iter().any(|&p| slots[p].owner == other.owner)
            {
                present.push(a);
            }
        }
        if present.len() >= capacity as usize {
            violations.push(Violation { entrant: idx, occupants: present });
            if first_only {
                return violations;
            }
        }
        active.push(idx);
    }
    violations
}

/// Two aircraft on one resource closer than the separation allows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub resource: Resource,
    pub first: String,
    pub second: String,
    /// Start of the overlapping window
    pub start: f64,
    /// End of the overlapping window, separation included
    pub end: f64,
}

/// Pairwise conflict checker over whole assignments
pub struct ConflictDetector<'a> {
    graph: &'a SurfaceGraph,
    separation: f64,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(graph: &'a SurfaceGraph, config: &ConflictConfig) -> Self {
        ConflictDetector {
            graph,
            separation: config.separation.max(0.0),
        }
    }

    pub fn separation(&self) -> f64 {
        self.separation
    }

    fn slots_by_resource(&self, routes: &[&Route]) -> BTreeMap<Resource, Vec<Slot>> {
        let mut by_resource: BTreeMap<Resource, Vec<Slot>> = BTreeMap::new();
        for (owner, route) in routes.iter().enumerate() {
            for occ in occupations(route) {
                by_resource.entry(occ.resource).or_default().push(Slot {
                    owner,
                    start: occ.start,
                    end: occ.end,
                });
            }
        }
        by_resource
    }

    /// Every capacity violation among the given routes.
    pub fn detect_routes(&self, routes: &[&Route]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (resource, slots) in self.slots_by_resource(routes) {
            let capacity = resource.capacity(self.graph);
            for v in sweep(&slots, capacity, self.separation, false) {
                let entrant = slots[v.entrant];
                for occ in v.occupants {
                    let other = slots[occ];
                    conflicts.push(Conflict {
                        resource,
                        first: routes[other.owner].aircraft.clone(),
                        second: routes[entrant.owner].aircraft.clone(),
                        start: entrant.start.max(other.start),
                        end: (entrant.end.min(other.end) + self.separation).max(entrant.start),
                    });
                }
            }
        }
        conflicts
    }

    pub fn detect(&self, assignment: &Assignment) -> Vec<Conflict> {
        let routes: Vec<&Route> = assignment.iter().collect();
        self.detect_routes(&routes)
    }

    /// Number of conflicting pairs, without building the conflict records
    pub fn count_routes(&self, routes: &[&Route]) -> usize {
        self.slots_by_resource(routes)
            .iter()
            .map(|(resource, slots)| {
                sweep(slots, resource.capacity(self.graph), self.separation, false)
                    .iter()
                    .map(|v| v.occupants.len())
                    .sum::<usize>()
            })
            .sum()
    }

    pub fn count(&self, assignment: &Assignment) -> usize {
        let routes: Vec<&Route> = assignment.iter().collect();
        self.count_routes(&routes)
    }

    /// Conflicts each aircraft takes part in
    pub fn per_aircraft(&self, assignment: &Assignment) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> =
            assignment.routes.keys().map(|k| (k.clone(), 0)).collect();
        for c in self.detect(assignment) {
            *counts.entry(c.first).or_default() += 1;
            *counts.entry(c.second).or_default() += 1;
        }
        counts
    }
}

/// An entry that found its resource full, as reported by [`audit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityViolation {
    pub resource: Resource,
    /// Aircraft entering the resource
    pub aircraft: String,
    /// Aircraft already there at that instant
    pub present: Vec<String>,
    pub time: f64,
}

/// Capacity check comparing every occupation with every other one.
///
/// Written apart from [`sweep`] so a plan can be verified by code the
/// optimizers never ran. Simultaneous entries are reported once per entrant.
pub fn audit(graph: &SurfaceGraph, assignment: &Assignment, separation: f64) -> Vec<CapacityViolation> {
    let separation = separation.max(0.0);
    let all: Vec<(&str, Occupation)> = assignment
        .iter()
        .flat_map(|route| occupations(route).into_iter().map(move |occ| (route.aircraft.as_str(), occ)))
        .collect();

    let mut violations = Vec::new();
    for (owner, entry) in &all {
        let t = entry.start;
        let mut present: Vec<&str> = Vec::new();
        for (other, occ) in &all {
            if other == owner || occ.resource != entry.resource || present.contains(other) {
                continue;
            }
            let simultaneous = (occ.start - t).abs() <= SAME_INSTANT;
            let still_there = occ.start <= t && t + SAME_INSTANT < occ.end + separation;
            if simultaneous || still_there {
                present.push(*other);
            }
        }
        if present.len() >= entry.resource.capacity(graph) as usize {
            violations.push(CapacityViolation {
                resource: entry.resource,
                aircraft: owner.to_string(),
                present: present.iter().map(|p| p.to_string()).collect(),
                time: t,
            });
        }
    }
    violations
}

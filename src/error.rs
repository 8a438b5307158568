//! Error types shared by the planning components.
//!
//! Per-request problems (`RequestError`) never abort a planning run: the
//! affected aircraft is excluded and reported. Solver and orchestration
//! failures are returned as values, never as a truncated assignment.

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Invalid surface topology detected while building a [`crate::graph::SurfaceGraph`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    #[error("edge {edge} references unknown node {node}")]
    UnknownEndpoint { edge: usize, node: NodeId },
    #[error("edge {edge} is a self-loop on node {node}")]
    SelfLoop { edge: usize, node: NodeId },
    #[error("edge {edge} has non-positive {field} ({value})")]
    NonPositive { edge: usize, field: &'static str, value: f64 },
    #[error("{what} {id} has zero capacity")]
    ZeroCapacity { what: &'static str, id: usize },
}

/// Why a single movement request could not be routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RequestError {
    #[error("aircraft {aircraft}: unknown node {node}")]
    UnknownNode { aircraft: String, node: NodeId },
    #[error("aircraft {aircraft}: invalid request ({detail})")]
    InvalidRequest { aircraft: String, detail: String },
    #[error("aircraft {aircraft}: node {destination} unreachable from {origin}")]
    Unreachable { aircraft: String, origin: NodeId, destination: NodeId },
    #[error("aircraft {aircraft}: earliest arrival {earliest_arrival:.1}s is after window end {window_end:.1}s")]
    OutsideWindow { aircraft: String, earliest_arrival: f64, window_end: f64 },
    #[error("aircraft {aircraft}: search exhausted after {expanded} expansions")]
    SearchExhausted { aircraft: String, expanded: usize },
}

impl RequestError {
    pub fn aircraft(&self) -> &str {
        match self {
            RequestError::UnknownNode { aircraft, .. }
            | RequestError::InvalidRequest { aircraft, .. }
            | RequestError::Unreachable { aircraft, .. }
            | RequestError::OutsideWindow { aircraft, .. }
            | RequestError::SearchExhausted { aircraft, .. } => aircraft,
        }
    }
}

/// A pair of aircraft whose occupations could not be separated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingPair {
    pub first: String,
    pub second: String,
    pub resource: String,
}

/// An aircraft that would have to depart later than its window allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOverflow {
    pub aircraft: String,
    pub required_departure: f64,
    pub latest_departure: f64,
}

/// Constraints that were found violated while proving infeasibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfeasibilityContext {
    pub conflicting_pairs: Vec<ConflictingPair>,
    pub window_overflows: Vec<WindowOverflow>,
    pub cyclic_orderings: usize,
}

impl fmt::Display for InfeasibilityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflicting pair(s), {} window overflow(s), {} cyclic ordering(s)",
            self.conflicting_pairs.len(),
            self.window_overflows.len(),
            self.cyclic_orderings
        )?;
        if let Some(pair) = self.conflicting_pairs.first() {
            write!(f, "; e.g. {} vs {} on {}", pair.first, pair.second, pair.resource)?;
        }
        if let Some(w) = self.window_overflows.first() {
            write!(
                f,
                "; e.g. {} needs {:.1}s > latest {:.1}s",
                w.aircraft, w.required_departure, w.latest_departure
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("no conflict-free assignment exists: {context}")]
    Infeasible { context: InfeasibilityContext },
    #[error("time limit of {time_limit:.1}s reached before any incumbent was found")]
    TimedOutWithoutIncumbent { time_limit: f64 },
    #[error("solve cancelled before any incumbent was found")]
    Cancelled,
    #[error("solver backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("assignment still has {conflicts} unresolved conflict(s) in exact mode")]
    UnresolvedConflicts { conflicts: usize },
    #[error("aircraft id {0} appears in more than one request")]
    DuplicateAircraft(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("cannot access {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

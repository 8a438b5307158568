//! Conflict-driven branch-and-bound for the scheduling model.
//!
//! A search node fixes the route of some aircraft and carries a set of
//! precedence constraints `d_after >= d_before + lag`. Holds are the least
//! solution of those constraints (longest paths from zero), which is optimal
//! for any non-negative weights, so the node objective is exact once every
//! route is fixed and no conflict remains.
//!
//! Branching:
//! - conflict among fixed aircraft: one child per ordering of a pair taken
//!   from `capacity + 1` mutually overlapping occupations
//! - otherwise: one child per route option of the next unfixed aircraft
//!
//! Nodes are explored depth first, cheapest child first.
//!
//! The node bound adds, for disjoint pairs of aircraft sharing a unit
//! capacity resource, the cheapest hold that separates them whichever goes
//! first.

use super::{ExactResult, ScheduleModel, SchedulerConfig, SolveStatus, CONTEXT_LIMIT};
use crate::conflict::{required_lag, sweep, Occupation, Resource, Slot};
use crate::error::{ConflictingPair, InfeasibilityContext, SchedulerError, WindowOverflow};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Instant;

const EPS: f64 = 1e-7;

/// `d[after] >= d[before] + lag`
#[derive(Debug, Clone, Copy)]
struct Precedence {
    before: usize,
    after: usize,
    lag: f64,
}

#[derive(Debug, Clone)]
struct SearchNode {
    choice: Vec<Option<usize>>,
    precedences: Vec<Precedence>,
    delays: Vec<f64>,
    bound: f64,
}

enum Evaluation {
    Feasible(SearchNode),
    Cycle,
    Overflow(WindowOverflow),
    /// Two aircraft that cannot be separated inside their windows
    Blocked {
        first: usize,
        second: usize,
        resource: Resource,
        overflows: Vec<WindowOverflow>,
    },
}

/// Least hold cost separating two aircraft, per pair of route options
struct PairBound {
    first: usize,
    second: usize,
    /// `hold[o][p]`, infinite when no ordering fits the windows
    hold: Vec<Vec<f64>>,
}

/// Occupation of a fixed aircraft at its current hold
#[derive(Debug, Clone, Copy)]
struct Placed {
    aircraft: usize,
    start: f64,
    end: f64,
}

struct Incumbent {
    choice: Vec<usize>,
    delays: Vec<f64>,
    objective: f64,
}

struct BranchAndBound<'m, 'a> {
    model: &'m ScheduleModel<'a>,
    config: &'m SchedulerConfig,
    /// Order in which aircraft get their route fixed
    order: Vec<usize>,
    cheapest: Vec<f64>,
    pair_bounds: Vec<PairBound>,
    incumbent: Option<Incumbent>,
    context: InfeasibilityContext,
    nodes_explored: u64,
    started: Instant,
}

impl<'m, 'a> BranchAndBound<'m, 'a> {
    fn new(model: &'m ScheduleModel<'a>, config: &'m SchedulerConfig) -> Self {
        let mut order: Vec<usize> = (0..model.len()).collect();
        order.sort_by(|&a, &b| {
            let (ma, mb) = (&model.aircraft[a], &model.aircraft[b]);
            ma.ready_time
                .total_cmp(&mb.ready_time)
                .then(mb.priority.total_cmp(&ma.priority))
                .then(a.cmp(&b))
        });
        let mut pair_bounds = Vec::new();
        for first in 0..model.len() {
            for second in (first + 1)..model.len() {
                let hold: Vec<Vec<f64>> = (0..model.aircraft[first].options.len())
                    .map(|o| {
                        (0..model.aircraft[second].options.len())
                            .map(|p| pair_hold(model, first, o, second, p).0)
                            .collect()
                    })
                    .collect();
                if hold.iter().flatten().any(|&h| h > 0.0) {
                    pair_bounds.push(PairBound { first, second, hold });
                }
            }
        }
        log::debug!("{} aircraft pairs contribute to the hold bound", pair_bounds.len());

        BranchAndBound {
            model,
            config,
            order,
            cheapest: model.aircraft.iter().map(|a| a.cheapest()).collect(),
            pair_bounds,
            incumbent: None,
            context: InfeasibilityContext::default(),
            nodes_explored: 0,
            started: Instant::now(),
        }
    }

    /// Least holds satisfying the precedences, then the node bound.
    fn evaluate(&self, choice: Vec<Option<usize>>, precedences: Vec<Precedence>) -> Evaluation {
        let n = self.model.len();
        let mut delays = vec![0.0; n];
        let mut stable = false;
        for _ in 0..=n {
            let mut changed = false;
            for p in &precedences {
                let required = delays[p.before] + p.lag;
                if required > delays[p.after] + EPS {
                    delays[p.after] = required;
                    changed = true;
                }
            }
            if !changed {
                stable = true;
                break;
            }
        }
        if !stable {
            return Evaluation::Cycle;
        }

        let mut single = vec![0.0; n];
        for (i, aircraft) in self.model.aircraft.iter().enumerate() {
            single[i] = match choice[i] {
                Some(o) => {
                    let option = &aircraft.options[o];
                    if delays[i] > option.max_delay + EPS {
                        return Evaluation::Overflow(WindowOverflow {
                            aircraft: aircraft.aircraft.clone(),
                            required_departure: option.base_departure + delays[i],
                            latest_departure: option.base_departure + option.max_delay,
                        });
                    }
                    option.base_cost + aircraft.priority * delays[i]
                }
                None => self.cheapest[i],
            };
        }

        // pair terms, then a greedy matching so no aircraft counts twice
        let mut gains: Vec<(f64, usize, usize)> = Vec::new();
        for pb in &self.pair_bounds {
            let (i, j) = (pb.first, pb.second);
            let (ai, aj) = (&self.model.aircraft[i], &self.model.aircraft[j]);
            let options = |k: usize, len: usize| match choice[k] {
                Some(o) => o..o + 1,
                None => 0..len,
            };
            let current = ai.priority * delays[i] + aj.priority * delays[j];
            let mut term = f64::INFINITY;
            for o in options(i, ai.options.len()) {
                for p in options(j, aj.options.len()) {
                    let holds = pb.hold[o][p].max(current);
                    term = term.min(ai.options[o].base_cost + aj.options[p].base_cost + holds);
                }
            }
            if term.is_infinite() {
                let o = choice[i].unwrap_or(0);
                let p = choice[j].unwrap_or(0);
                let (resource, overflows) = blocking(self.model, i, o, j, p);
                return Evaluation::Blocked {
                    first: i,
                    second: j,
                    resource,
                    overflows,
                };
            }
            let gain = term - single[i] - single[j];
            if gain > EPS {
                gains.push((gain, i, j));
            }
        }
        gains.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut matched = vec![false; n];
        let mut bound: f64 = single.iter().sum();
        for (gain, i, j) in gains {
            if !matched[i] && !matched[j] {
                matched[i] = true;
                matched[j] = true;
                bound += gain;
            }
        }

        Evaluation::Feasible(SearchNode {
            choice,
            precedences,
            delays,
            bound,
        })
    }

    /// Earliest capacity violation among fixed aircraft, as the group of
    /// occupations that cannot all be present together.
    fn first_violation(&self, node: &SearchNode) -> Option<(Resource, Vec<Placed>)> {
        let mut by_resource: BTreeMap<Resource, Vec<Placed>> = BTreeMap::new();
        for (i, aircraft) in self.model.aircraft.iter().enumerate() {
            let Some(o) = node.choice[i] else { continue };
            let d = node.delays[i];
            for occ in &aircraft.options[o].occupations {
                by_resource.entry(occ.resource).or_default().push(Placed {
                    aircraft: i,
                    start: occ.start + d,
                    end: occ.end + d,
                });
            }
        }

        let mut earliest: Option<(f64, Resource, Vec<Placed>)> = None;
        for (resource, placed) in by_resource {
            if placed.len() < 2 {
                continue;
            }
            let slots: Vec<Slot> = placed
                .iter()
                .map(|p| Slot { owner: p.aircraft, start: p.start, end: p.end })
                .collect();
            let capacity = resource.capacity(self.model.graph);
            let Some(v) = sweep(&slots, capacity, self.model.separation, true).pop() else {
                continue;
            };
            let at = placed[v.entrant].start;
            if earliest.as_ref().map_or(true, |(t, _, _)| at < *t) {
                let mut group = vec![placed[v.entrant]];
                group.extend(v.occupants.iter().take(capacity as usize).map(|&k| placed[k]));
                earliest = Some((at, resource, group));
            }
        }
        earliest.map(|(_, resource, group)| (resource, group))
    }

    fn record_infeasible(&mut self, evaluation: &Evaluation) {
        match evaluation {
            Evaluation::Cycle => self.context.cyclic_orderings += 1,
            Evaluation::Overflow(w) => self.record_overflow(w),
            Evaluation::Blocked {
                first,
                second,
                resource,
                overflows,
            } => {
                self.record_pair(*resource, *first, *second);
                for w in overflows {
                    self.record_overflow(w);
                }
            }
            Evaluation::Feasible(_) => {}
        }
    }

    fn record_overflow(&mut self, w: &WindowOverflow) {
        let known = self.context.window_overflows.iter().any(|o| o.aircraft == w.aircraft);
        if !known && self.context.window_overflows.len() < CONTEXT_LIMIT {
            self.context.window_overflows.push(w.clone());
        }
    }

    fn record_pair(&mut self, resource: Resource, a: usize, b: usize) {
        let (first, second) = (&self.model.aircraft[a].aircraft, &self.model.aircraft[b].aircraft);
        let known = self
            .context
            .conflicting_pairs
            .iter()
            .any(|p| (p.first == *first && p.second == *second) || (p.first == *second && p.second == *first));
        if !known && self.context.conflicting_pairs.len() < CONTEXT_LIMIT {
            self.context.conflicting_pairs.push(ConflictingPair {
                first: first.clone(),
                second: second.clone(),
                resource: resource.label(self.model.graph),
            });
        }
    }

    fn ordering_children(&mut self, node: &SearchNode, resource: Resource, group: &[Placed]) -> Vec<SearchNode> {
        let sep = self.model.separation;
        let mut children = Vec::new();
        for a in group {
            for b in group {
                if a.aircraft == b.aircraft {
                    continue;
                }
                let unshifted = |p: &Placed| Occupation {
                    resource,
                    start: p.start - node.delays[p.aircraft],
                    end: p.end - node.delays[p.aircraft],
                };
                let mut precedences = node.precedences.clone();
                precedences.push(Precedence {
                    before: a.aircraft,
                    after: b.aircraft,
                    lag: required_lag(&unshifted(a), &unshifted(b), sep),
                });
                match self.evaluate(node.choice.clone(), precedences) {
                    Evaluation::Feasible(child) => children.push(child),
                    other => self.record_infeasible(&other),
                }
            }
        }
        if children.is_empty() {
            for (k, a) in group.iter().enumerate() {
                for b in &group[k + 1..] {
                    self.record_pair(resource, a.aircraft, b.aircraft);
                }
            }
        }
        children
    }

    fn route_children(&mut self, node: &SearchNode, next: usize) -> Vec<SearchNode> {
        let mut children = Vec::new();
        for o in 0..self.model.aircraft[next].options.len() {
            let mut choice = node.choice.clone();
            choice[next] = Some(o);
            match self.evaluate(choice, node.precedences.clone()) {
                Evaluation::Feasible(child) => children.push(child),
                other => self.record_infeasible(&other),
            }
        }
        children
    }

    fn prune_threshold(&self) -> f64 {
        match &self.incumbent {
            Some(inc) => inc.objective - EPS * inc.objective.abs().max(1.0),
            None => f64::INFINITY,
        }
    }

    fn stop_reason(&self) -> Option<SolveStatus> {
        if let Some(flag) = &self.config.cancel {
            if flag.load(Ordering::Relaxed) {
                return Some(SolveStatus::Cancelled);
            }
        }
        if self.started.elapsed().as_secs_f64() >= self.config.time_limit {
            return Some(SolveStatus::TimeLimitReached);
        }
        if let Some(limit) = self.config.node_limit {
            if self.nodes_explored >= limit {
                return Some(SolveStatus::NodeLimitReached);
            }
        }
        None
    }

    fn run(mut self) -> Result<ExactResult, SchedulerError> {
        let n = self.model.len();

        if let Some(warm) = &self.config.warm_start {
            match self.model.match_assignment(warm) {
                Some((choice, delays)) => {
                    let objective = self.model.objective(&choice, &delays);
                    log::debug!("warm start accepted with objective {:.2}", objective);
                    self.incumbent = Some(Incumbent { choice, delays, objective });
                }
                None => log::debug!("warm start rejected: not a conflict-free candidate assignment"),
            }
        }

        let mut stack: Vec<SearchNode> = Vec::new();
        match self.evaluate(vec![None; n], Vec::new()) {
            Evaluation::Feasible(root) => stack.push(root),
            other => self.record_infeasible(&other),
        }
        let root_bound = stack.first().map(|r| r.bound).unwrap_or(f64::INFINITY);

        let mut stopped = None;
        while let Some(node) = stack.pop() {
            if let Some(reason) = self.stop_reason() {
                stack.push(node);
                stopped = Some(reason);
                break;
            }
            self.nodes_explored += 1;
            if node.bound >= self.prune_threshold() {
                continue;
            }

            let mut children = if let Some((resource, group)) = self.first_violation(&node) {
                self.ordering_children(&node, resource, &group)
            } else if let Some(&next) = self.order.iter().find(|&&i| node.choice[i].is_none()) {
                self.route_children(&node, next)
            } else {
                let choice: Vec<usize> = node.choice.iter().map(|c| c.unwrap_or(0)).collect();
                let objective = self.model.objective(&choice, &node.delays);
                log::debug!(
                    "new incumbent {:.2} after {} nodes ({:.2}s)",
                    objective,
                    self.nodes_explored,
                    self.started.elapsed().as_secs_f64()
                );
                self.incumbent = Some(Incumbent {
                    choice,
                    delays: node.delays,
                    objective,
                });
                continue;
            };

            let threshold = self.prune_threshold();
            children.retain(|c| c.bound < threshold);
            children.sort_by_key(|c| std::cmp::Reverse(OrderedFloat(c.bound)));
            stack.extend(children);
        }

        let computation_time = self.started.elapsed().as_secs_f64();
        let Some(incumbent) = self.incumbent.take() else {
            return Err(match stopped {
                Some(SolveStatus::Cancelled) => SchedulerError::Cancelled,
                Some(_) => SchedulerError::TimedOutWithoutIncumbent {
                    time_limit: self.config.time_limit,
                },
                None => SchedulerError::Infeasible { context: self.context },
            });
        };

        let upper_bound = incumbent.objective;
        let (status, lower_bound) = match stopped {
            None => (SolveStatus::Optimal, upper_bound),
            Some(reason) => {
                let open = stack.iter().map(|s| s.bound).fold(f64::INFINITY, f64::min);
                (reason, open.min(upper_bound).max(root_bound.min(upper_bound)))
            }
        };
        let gap = if upper_bound.abs() > 1e-9 {
            ((upper_bound - lower_bound) / upper_bound.abs()).max(0.0)
        } else {
            0.0
        };

        Ok(ExactResult {
            assignment: self.model.assignment(&incumbent.choice, &incumbent.delays),
            objective: upper_bound,
            lower_bound,
            upper_bound,
            gap,
            status,
            nodes_explored: self.nodes_explored,
            computation_time,
        })
    }
}

/// Cheapest hold separating aircraft `i` on option `o` from aircraft `j` on
/// option `p` on every unit capacity resource they share, with the resource
/// that forces it.
fn pair_hold(model: &ScheduleModel, i: usize, o: usize, j: usize, p: usize) -> (f64, Option<Resource>) {
    let (ai, aj) = (&model.aircraft[i], &model.aircraft[j]);
    let (oi, oj) = (&ai.options[o], &aj.options[p]);
    let sep = model.separation;
    let mut hold = 0.0;
    let mut worst = None;
    for x in &oi.occupations {
        if x.resource.capacity(model.graph) > 1 {
            continue;
        }
        for y in oj.occupations.iter().filter(|y| y.resource == x.resource) {
            // j holds at least this long to follow i, and the reverse
            let j_follows = x.end + sep - y.start;
            let i_follows = y.end + sep - x.start;
            let cost = |lag: f64, priority: f64, window: f64| {
                if lag <= 0.0 {
                    0.0
                } else if lag > window + EPS {
                    f64::INFINITY
                } else {
                    priority * lag
                }
            };
            let least = cost(j_follows, aj.priority, oj.max_delay).min(cost(i_follows, ai.priority, oi.max_delay));
            if least > hold {
                hold = least;
                worst = Some(x.resource);
            }
        }
    }
    (hold, worst)
}

fn blocking(model: &ScheduleModel, i: usize, o: usize, j: usize, p: usize) -> (Resource, Vec<WindowOverflow>) {
    let (ai, aj) = (&model.aircraft[i], &model.aircraft[j]);
    let (oi, oj) = (&ai.options[o], &aj.options[p]);
    let resource = pair_hold(model, i, o, j, p)
        .1
        .or_else(|| oi.occupations.first().map(|occ| occ.resource))
        .unwrap_or(Resource::Node(0));
    let lag = |before: &[Occupation], after: &[Occupation]| {
        let mut worst: f64 = 0.0;
        for x in before.iter().filter(|x| x.resource == resource) {
            for y in after.iter().filter(|y| y.resource == resource) {
                worst = worst.max(x.end + model.separation - y.start);
            }
        }
        worst
    };
    let overflows = vec![
        WindowOverflow {
            aircraft: aj.aircraft.clone(),
            required_departure: oj.base_departure + lag(&oi.occupations, &oj.occupations),
            latest_departure: oj.base_departure + oj.max_delay,
        },
        WindowOverflow {
            aircraft: ai.aircraft.clone(),
            required_departure: oi.base_departure + lag(&oj.occupations, &oi.occupations),
            latest_departure: oi.base_departure + oi.max_delay,
        },
    ];
    (resource, overflows)
}

pub(crate) fn solve(model: &ScheduleModel, config: &SchedulerConfig) -> Result<ExactResult, SchedulerError> {
    BranchAndBound::new(model, config).run()
}

#[cfg(test)]
mod tests {
    use super::{BranchAndBound, Evaluation};
    use crate::conflict::{audit, ConflictConfig, ConflictDetector};
    use crate::error::SchedulerError;
    use crate::exact::{schedule, ScheduleModel, SchedulerConfig, SolveStatus};
    use crate::graph::{Edge, Node, NodeKind, SurfaceGraph};
    use crate::heuristics::astar::PathfinderConfig;
    use crate::heuristics::candidates::{generate_candidates, CandidateConfig, CandidatePool};
    use crate::heuristics::genetic::{optimize, GAConfig};
    use crate::instance::MovementRequest;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    const SEP: ConflictConfig = ConflictConfig { separation: 5.0 };

    fn corridor(capacity: u32) -> SurfaceGraph {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0).with_capacity(capacity),
            Node::new(1, NodeKind::RunwayThreshold, 150.0, 0.0).with_capacity(capacity),
        ];
        SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 150.0, 15.0).with_capacity(capacity)]).unwrap()
    }

    fn paths_only(graph: &SurfaceGraph, requests: &[MovementRequest], k: usize) -> CandidatePool {
        let config = CandidateConfig { k_paths: k, departure_offsets: 1, offset_step: 30.0 };
        generate_candidates(graph, requests, &config, &PathfinderConfig::default())
    }

    fn head_on() -> Vec<MovementRequest> {
        vec![MovementRequest::new("A", 0, 1, 0.0), MovementRequest::new("B", 1, 0, 0.0)]
    }

    #[test]
    fn test_head_on_delays_one_aircraft() {
        let graph = corridor(1);
        let pool = paths_only(&graph, &head_on(), 1);
        let result = schedule(&graph, &pool, &SEP, &SchedulerConfig::default()).unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        // 10 s each plus one hold of 10 + 5 s
        assert!((result.objective - 35.0).abs() < 1e-6);
        assert!((result.assignment.total_delay() - 15.0).abs() < 1e-6);
        assert!((result.lower_bound - result.objective).abs() < 1e-9);
        assert_eq!(ConflictDetector::new(&graph, &SEP).count(&result.assignment), 0);
        assert!(audit(&graph, &result.assignment, SEP.separation).is_empty());
    }

    #[test]
    fn test_head_on_infeasible_with_narrow_window() {
        let graph = corridor(1);
        let pool = paths_only(&graph, &head_on(), 1);
        let config = SchedulerConfig { max_delay: 10.0, ..Default::default() };
        match schedule(&graph, &pool, &SEP, &config) {
            Err(SchedulerError::Infeasible { context }) => {
                assert!(!context.window_overflows.is_empty());
                assert_eq!(context.conflicting_pairs.len(), 1);
            }
            other => panic!("expected infeasible, got {:?}", other.map(|r| r.status)),
        }
    }

    #[test]
    fn test_capacity_two_lets_one_aircraft_wait() {
        let graph = corridor(2);
        let requests = vec![
            MovementRequest::new("A", 0, 1, 0.0),
            MovementRequest::new("B", 0, 1, 0.0),
            MovementRequest::new("C", 0, 1, 0.0),
        ];
        let pool = paths_only(&graph, &requests, 1);
        let result = schedule(&graph, &pool, &SEP, &SchedulerConfig::default()).unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.objective - 45.0).abs() < 1e-6);
        assert_eq!(ConflictDetector::new(&graph, &SEP).count(&result.assignment), 0);
        assert!(audit(&graph, &result.assignment, SEP.separation).is_empty());

        let pool = paths_only(&graph, &requests[..2], 1);
        let result = schedule(&graph, &pool, &SEP, &SchedulerConfig::default()).unwrap();
        assert!((result.objective - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_diamond_optimal_beats_genetic() {
        let (graph, requests) = crate::heuristics::genetic::tests::diamond();
        let config = CandidateConfig { k_paths: 2, departure_offsets: 4, offset_step: 30.0 };
        let pool = generate_candidates(&graph, &requests, &config, &PathfinderConfig::default());

        let ga = optimize(&graph, &pool, &SEP, &GAConfig { seed: Some(1), ..Default::default() });
        assert_eq!(ga.conflicts, 0);

        let result = schedule(&graph, &pool, &SEP, &SchedulerConfig::default()).unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(ConflictDetector::new(&graph, &SEP).count(&result.assignment), 0);
        assert!(audit(&graph, &result.assignment, SEP.separation).is_empty());
        assert!(result.objective <= ga.cost + 1e-6);
        assert!((result.objective - result.assignment.objective()).abs() < 1e-6);

        let warm = SchedulerConfig { warm_start: Some(ga.assignment.clone()), ..Default::default() };
        let warmed = schedule(&graph, &pool, &SEP, &warm).unwrap();
        assert!((warmed.objective - result.objective).abs() < 1e-6);
    }

    #[test]
    fn test_limits_without_incumbent() {
        let graph = corridor(1);
        let pool = paths_only(&graph, &head_on(), 1);

        let config = SchedulerConfig { time_limit: 0.0, ..Default::default() };
        let err = schedule(&graph, &pool, &SEP, &config).unwrap_err();
        assert!(matches!(err, SchedulerError::TimedOutWithoutIncumbent { .. }));

        let config = SchedulerConfig { cancel: Some(Arc::new(AtomicBool::new(true))), ..Default::default() };
        assert_eq!(schedule(&graph, &pool, &SEP, &config).unwrap_err(), SchedulerError::Cancelled);
    }

    #[test]
    fn test_time_limit_keeps_warm_start() {
        let graph = corridor(1);
        let pool = paths_only(&graph, &head_on(), 1);
        let solved = schedule(&graph, &pool, &SEP, &SchedulerConfig::default()).unwrap();

        let config = SchedulerConfig {
            time_limit: 0.0,
            warm_start: Some(solved.assignment.clone()),
            ..Default::default()
        };
        let result = schedule(&graph, &pool, &SEP, &config).unwrap();
        assert_eq!(result.status, SolveStatus::TimeLimitReached);
        assert!((result.objective - 35.0).abs() < 1e-6);
        assert!(result.lower_bound <= result.objective + 1e-9);
    }

    #[test]
    fn test_five_node_diamond_optimal() {
        let (graph, requests) = crate::heuristics::genetic::tests::five_node_diamond();
        let config = CandidateConfig { k_paths: 2, departure_offsets: 4, offset_step: 30.0 };
        let pool = generate_candidates(&graph, &requests, &config, &PathfinderConfig::default());

        let ga = optimize(&graph, &pool, &SEP, &GAConfig { seed: Some(7), ..Default::default() });
        assert_eq!(ga.conflicts, 0);

        let result = schedule(&graph, &pool, &SEP, &SchedulerConfig::default()).unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(audit(&graph, &result.assignment, SEP.separation).is_empty());
        assert!(result.objective <= ga.cost + 1e-6);
    }

    #[test]
    fn test_root_bound_counts_unavoidable_holds() {
        let graph = corridor(1);
        let pool = paths_only(&graph, &head_on(), 1);
        let config = SchedulerConfig::default();
        let model = ScheduleModel::build(&graph, &pool, &SEP, &config).unwrap();
        let search = BranchAndBound::new(&model, &config);
        match search.evaluate(vec![None; 2], Vec::new()) {
            // 10 s each plus the 15 s one of them must hold
            Evaluation::Feasible(root) => assert!((root.bound - 35.0).abs() < 1e-6),
            _ => panic!("root should be feasible"),
        }

        let (graph, requests) = crate::heuristics::genetic::tests::five_node_diamond();
        let pool = paths_only(&graph, &requests, 2);
        let model = ScheduleModel::build(&graph, &pool, &SEP, &config).unwrap();
        let naive: f64 = model.aircraft.iter().map(|a| a.cheapest()).sum();
        let search = BranchAndBound::new(&model, &config);
        let Evaluation::Feasible(root) = search.evaluate(vec![None; 3], Vec::new()) else {
            panic!("root should be feasible");
        };
        let optimum = schedule(&graph, &pool, &SEP, &config).unwrap().objective;
        assert!(root.bound > naive + 1e-6);
        assert!(root.bound <= optimum + 1e-6);
    }
}

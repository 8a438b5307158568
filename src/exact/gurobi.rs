//! Gurobi backend for the scheduling model.
//!
//! The formulation uses:
//! - Binary variables y[i][o] selecting route option o of aircraft i
//! - Continuous variables d[i] for the hold at the origin
//! - Binary variables z for the ordering of every pair of occupations that
//!   may share a resource, linked to the holds with big-M constraints
//!
//! Only unit-capacity resources are modelled; larger capacities need the
//! branch-and-bound backend.
//!
//! The cancel flag is polled from a callback. An infeasible model is
//! explained from its irreducible inconsistent subsystem.

use super::{ExactResult, ScheduleModel, SchedulerConfig, SolveStatus, CONTEXT_LIMIT};
use crate::conflict::{required_lag, Resource};
use crate::error::{ConflictingPair, InfeasibilityContext, SchedulerError, WindowOverflow};
use grb::callback::{CbResult, Where};
use grb::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::Ordering;

/// What a constraint of the model stands for
#[derive(Debug, Clone, Copy, PartialEq)]
enum Tag {
    /// Hold of aircraft `aircraft` within the window of `option`
    Window { aircraft: usize, option: usize },
    /// Upper bound of the hold variable
    HoldBound { aircraft: usize },
    /// One side of the ordering of two occupations of `resource`;
    /// `follower` holds at least `lag` more than `leader`
    Ordering {
        leader: usize,
        leader_option: usize,
        follower: usize,
        follower_option: usize,
        resource: Resource,
        lag: f64,
    },
}

fn backend_error(what: &'static str) -> impl Fn(grb::Error) -> SchedulerError {
    move |e| SchedulerError::Backend(format!("{}: {}", what, e))
}

pub(crate) fn solve(model: &ScheduleModel, config: &SchedulerConfig) -> Result<ExactResult, SchedulerError> {
    let start = std::time::Instant::now();
    let n = model.len();
    let sep = model.separation;

    // Shared resources with capacity above one are outside this formulation
    let mut users: HashMap<Resource, usize> = HashMap::new();
    for a in &model.aircraft {
        let mut seen = std::collections::HashSet::new();
        for opt in &a.options {
            for occ in &opt.occupations {
                seen.insert(occ.resource);
            }
        }
        for r in seen {
            *users.entry(r).or_default() += 1;
        }
    }
    if let Some((r, _)) = users.iter().find(|(r, &count)| count > 1 && r.capacity(model.graph) > 1) {
        return Err(SchedulerError::Backend(format!(
            "Gurobi model supports unit capacities only ({} has capacity {}). Use the branch-and-bound backend.",
            r.label(model.graph),
            r.capacity(model.graph)
        )));
    }

    let env = Env::new("").map_err(backend_error("Failed to create Gurobi environment"))?;
    let mut grb_model = Model::with_env("TaxiSchedule", env).map_err(backend_error("Failed to create model"))?;

    grb_model
        .set_param(param::TimeLimit, config.time_limit)
        .map_err(backend_error("Failed to set time limit"))?;
    grb_model
        .set_param(param::MIPGap, config.mip_gap)
        .map_err(backend_error("Failed to set MIP gap"))?;
    grb_model
        .set_param(param::Threads, config.threads)
        .map_err(backend_error("Failed to set threads"))?;
    if let Some(limit) = config.node_limit {
        grb_model
            .set_param(param::NodeLimit, limit as f64)
            .map_err(backend_error("Failed to set node limit"))?;
    }
    if !config.verbose {
        grb_model
            .set_param(param::OutputFlag, 0)
            .map_err(backend_error("Failed to set output flag"))?;
    }

    // y[i][o] = 1 if aircraft i takes option o
    let mut y: Vec<Vec<Var>> = Vec::with_capacity(n);
    for (i, a) in model.aircraft.iter().enumerate() {
        let mut row = Vec::with_capacity(a.options.len());
        for (o, opt) in a.options.iter().enumerate() {
            let var = add_binvar!(grb_model, name: &format!("y_{}_{}", i, o), obj: opt.base_cost)
                .map_err(backend_error("Failed to add route variable"))?;
            row.push(var);
        }
        y.push(row);
    }

    // d[i] = hold at the origin
    let mut d: Vec<Var> = Vec::with_capacity(n);
    let mut horizon: f64 = 0.0;
    for (i, a) in model.aircraft.iter().enumerate() {
        let upper = a.options.iter().map(|o| o.max_delay).fold(0.0, f64::max);
        for opt in &a.options {
            for occ in &opt.occupations {
                horizon = horizon.max(occ.end + upper);
            }
        }
        let var = add_ctsvar!(grb_model, name: &format!("d_{}", i), bounds: 0.0..upper, obj: a.priority)
            .map_err(backend_error("Failed to add delay variable"))?;
        d.push(var);
    }
    let earliest = model
        .aircraft
        .iter()
        .flat_map(|a| a.options.iter().flat_map(|o| o.occupations.iter().map(|occ| occ.start)))
        .fold(f64::INFINITY, f64::min);
    let big_m = (horizon - earliest.min(horizon)) + sep + 1.0;

    grb_model.update().map_err(backend_error("Failed to update model"))?;

    let mut tagged: Vec<(Constr, Tag)> = Vec::new();
    for (i, a) in model.aircraft.iter().enumerate() {
        let pick: Expr = y[i].iter().copied().grb_sum();
        grb_model
            .add_constr(&format!("one_route_{}", i), c!(pick == 1.0))
            .map_err(backend_error("Failed to add route constraint"))?;
        for (o, opt) in a.options.iter().enumerate() {
            let constr = grb_model
                .add_constr(
                    &format!("window_{}_{}", i, o),
                    c!(d[i] <= opt.max_delay + big_m * (1.0 - y[i][o])),
                )
                .map_err(backend_error("Failed to add window constraint"))?;
            tagged.push((constr, Tag::Window { aircraft: i, option: o }));
        }
    }

    // Disjunctive separation of every pair of occupations on one resource
    let mut pairs = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            for (o, oi) in model.aircraft[i].options.iter().enumerate() {
                for (p, oj) in model.aircraft[j].options.iter().enumerate() {
                    for a in &oi.occupations {
                        for b in oj.occupations.iter().filter(|b| b.resource == a.resource) {
                            let i_first = required_lag(a, b, sep);
                            let j_first = required_lag(b, a, sep);
                            // already ordered whatever the holds are
                            if i_first <= -oi.max_delay || j_first <= -oj.max_delay {
                                continue;
                            }
                            let z = add_binvar!(grb_model, name: &format!("z_{}_{}_{}", pairs, i, j))
                                .map_err(backend_error("Failed to add ordering variable"))?;
                            let constr = grb_model
                                .add_constr(
                                    &format!("i_first_{}", pairs),
                                    c!(d[j] - d[i]
                                        >= i_first - big_m * (1.0 - z) - big_m * (2.0 - y[i][o] - y[j][p])),
                                )
                                .map_err(backend_error("Failed to add ordering constraint"))?;
                            tagged.push((
                                constr,
                                Tag::Ordering {
                                    leader: i,
                                    leader_option: o,
                                    follower: j,
                                    follower_option: p,
                                    resource: a.resource,
                                    lag: i_first,
                                },
                            ));
                            let constr = grb_model
                                .add_constr(
                                    &format!("j_first_{}", pairs),
                                    c!(d[i] - d[j] >= j_first - big_m * z - big_m * (2.0 - y[i][o] - y[j][p])),
                                )
                                .map_err(backend_error("Failed to add ordering constraint"))?;
                            tagged.push((
                                constr,
                                Tag::Ordering {
                                    leader: j,
                                    leader_option: p,
                                    follower: i,
                                    follower_option: o,
                                    resource: a.resource,
                                    lag: j_first,
                                },
                            ));
                            pairs += 1;
                        }
                    }
                }
            }
        }
    }
    log::debug!("gurobi model: {} aircraft, {} ordering pairs, big-M {:.1}", n, pairs, big_m);

    // Warm start
    if let Some(warm) = &config.warm_start {
        if let Some((choice, delays)) = model.match_assignment(warm) {
            for i in 0..n {
                for (o, var) in y[i].iter().enumerate() {
                    let value = if o == choice[i] { 1.0 } else { 0.0 };
                    grb_model
                        .set_obj_attr(attr::Start, var, value)
                        .map_err(backend_error("Failed to set warm start"))?;
                }
                grb_model
                    .set_obj_attr(attr::Start, &d[i], delays[i])
                    .map_err(backend_error("Failed to set warm start"))?;
            }
        }
    }

    grb_model
        .update()
        .map_err(backend_error("Failed to update model before optimization"))?;
    let cancel = config.cancel.clone();
    let mut callback = |w: Where| -> CbResult {
        if cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            match w {
                Where::Polling(ctx) => ctx.terminate(),
                Where::MIP(ctx) => ctx.terminate(),
                Where::MIPSol(ctx) => ctx.terminate(),
                Where::MIPNode(ctx) => ctx.terminate(),
                _ => {}
            }
        }
        Ok(())
    };
    grb_model
        .optimize_with_callback(&mut callback)
        .map_err(backend_error("Optimization failed"))?;

    let status = grb_model.status().map_err(backend_error("Failed to get status"))?;
    let solutions = grb_model.get_attr(attr::SolCount).unwrap_or(0);

    let solve_status = match status {
        Status::Optimal => SolveStatus::Optimal,
        Status::Infeasible | Status::InfOrUnbd => {
            let mut members = Vec::new();
            match grb_model.compute_iis() {
                Ok(()) => {
                    for (constr, tag) in &tagged {
                        if grb_model.get_obj_attr(attr::IISConstr, constr).unwrap_or(0) > 0 {
                            members.push(*tag);
                        }
                    }
                    for (i, var) in d.iter().enumerate() {
                        if grb_model.get_obj_attr(attr::IISUB, var).unwrap_or(0) > 0 {
                            members.push(Tag::HoldBound { aircraft: i });
                        }
                    }
                    log::debug!("IIS holds {} tagged constraints", members.len());
                }
                Err(e) => log::warn!("could not compute IIS: {}", e),
            }
            return Err(SchedulerError::Infeasible {
                context: explain(model, &members),
            });
        }
        Status::TimeLimit if solutions > 0 => SolveStatus::TimeLimitReached,
        Status::NodeLimit if solutions > 0 => SolveStatus::NodeLimitReached,
        Status::Interrupted if solutions > 0 => SolveStatus::Cancelled,
        Status::TimeLimit | Status::NodeLimit => {
            return Err(SchedulerError::TimedOutWithoutIncumbent {
                time_limit: config.time_limit,
            })
        }
        Status::Interrupted => return Err(SchedulerError::Cancelled),
        other => return Err(SchedulerError::Backend(format!("unexpected Gurobi status {:?}", other))),
    };

    let mut choice = Vec::with_capacity(n);
    let mut delays = Vec::with_capacity(n);
    for i in 0..n {
        let mut best = (0, f64::NEG_INFINITY);
        for (o, var) in y[i].iter().enumerate() {
            let value = grb_model.get_obj_attr(attr::X, var).unwrap_or(0.0);
            if value > best.1 {
                best = (o, value);
            }
        }
        choice.push(best.0);
        delays.push(grb_model.get_obj_attr(attr::X, &d[i]).unwrap_or(0.0).max(0.0));
    }

    let objective = model.objective(&choice, &delays);
    let lower_bound = grb_model.get_attr(attr::ObjBound).unwrap_or(objective);
    let gap = grb_model.get_attr(attr::MIPGap).unwrap_or(0.0);
    let nodes = grb_model.get_attr(attr::NodeCount).unwrap_or(0.0) as u64;

    Ok(ExactResult {
        assignment: model.assignment(&choice, &delays),
        objective,
        lower_bound,
        upper_bound: objective,
        gap,
        status: solve_status,
        nodes_explored: nodes,
        computation_time: start.elapsed().as_secs_f64(),
    })
}

/// Turn the members of an irreducible inconsistent subsystem into the pairs
/// and windows a user can act on.
fn explain(model: &ScheduleModel, members: &[Tag]) -> InfeasibilityContext {
    let mut context = InfeasibilityContext::default();

    // longest hold each (aircraft, option) is asked for by an ordering
    let mut asked: HashMap<(usize, usize), f64> = HashMap::new();
    for tag in members {
        if let Tag::Ordering {
            leader,
            follower,
            follower_option,
            resource,
            lag,
            ..
        } = *tag
        {
            let entry = asked.entry((follower, follower_option)).or_insert(0.0);
            *entry = entry.max(lag);
            let (first, second) = (&model.aircraft[leader].aircraft, &model.aircraft[follower].aircraft);
            let known = context
                .conflicting_pairs
                .iter()
                .any(|p| (p.first == *first && p.second == *second) || (p.first == *second && p.second == *first));
            if !known && context.conflicting_pairs.len() < CONTEXT_LIMIT {
                context.conflicting_pairs.push(ConflictingPair {
                    first: first.clone(),
                    second: second.clone(),
                    resource: resource.label(model.graph),
                });
            }
        }
    }

    for tag in members {
        let (i, o) = match *tag {
            Tag::Window { aircraft, option } => (aircraft, option),
            Tag::HoldBound { aircraft } => {
                let widest = model.aircraft[aircraft]
                    .options
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.max_delay.total_cmp(&b.1.max_delay))
                    .map(|(o, _)| o);
                match widest {
                    Some(o) => (aircraft, o),
                    None => continue,
                }
            }
            Tag::Ordering { .. } => continue,
        };
        let a = &model.aircraft[i];
        let option = &a.options[o];
        let hold = asked.get(&(i, o)).copied().unwrap_or(option.max_delay);
        let known = context.window_overflows.iter().any(|w| w.aircraft == a.aircraft);
        if !known && context.window_overflows.len() < CONTEXT_LIMIT {
            context.window_overflows.push(WindowOverflow {
                aircraft: a.aircraft.clone(),
                required_departure: option.base_departure + hold,
                latest_departure: option.base_departure + option.max_delay,
            });
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictConfig;
    use crate::graph::{Edge, Node, NodeKind, SurfaceGraph};
    use crate::heuristics::astar::PathfinderConfig;
    use crate::heuristics::candidates::{generate_candidates, CandidateConfig};
    use crate::instance::MovementRequest;

    #[test]
    fn test_explain_head_on_subsystem() {
        let nodes = vec![
            Node::new(0, NodeKind::Gate, 0.0, 0.0),
            Node::new(1, NodeKind::RunwayThreshold, 150.0, 0.0),
        ];
        let graph = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 150.0, 15.0)]).unwrap();
        let requests = vec![MovementRequest::new("A", 0, 1, 0.0), MovementRequest::new("B", 1, 0, 0.0)];
        let config = CandidateConfig { k_paths: 1, departure_offsets: 1, offset_step: 30.0 };
        let pool = generate_candidates(&graph, &requests, &config, &PathfinderConfig::default());
        let scheduler = SchedulerConfig { max_delay: 10.0, ..Default::default() };
        let model = ScheduleModel::build(&graph, &pool, &ConflictConfig { separation: 5.0 }, &scheduler).unwrap();

        let edge = Resource::Edge(0);
        let members = vec![
            Tag::Ordering { leader: 0, leader_option: 0, follower: 1, follower_option: 0, resource: edge, lag: 15.0 },
            Tag::Ordering { leader: 1, leader_option: 0, follower: 0, follower_option: 0, resource: edge, lag: 15.0 },
            Tag::Window { aircraft: 0, option: 0 },
            Tag::HoldBound { aircraft: 1 },
        ];
        let context = explain(&model, &members);
        assert_eq!(context.conflicting_pairs.len(), 1);
        assert_eq!(context.window_overflows.len(), 2);
        for w in &context.window_overflows {
            assert!((w.required_departure - 15.0).abs() < 1e-9);
            assert!((w.latest_departure - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_explain_empty_subsystem() {
        let nodes = vec![Node::new(0, NodeKind::Gate, 0.0, 0.0), Node::new(1, NodeKind::Gate, 10.0, 0.0)];
        let graph = SurfaceGraph::new(nodes, vec![Edge::new(0, 1, 10.0, 5.0)]).unwrap();
        let requests = vec![MovementRequest::new("A", 0, 1, 0.0)];
        let pool = generate_candidates(&graph, &requests, &CandidateConfig::default(), &PathfinderConfig::default());
        let model =
            ScheduleModel::build(&graph, &pool, &ConflictConfig::default(), &SchedulerConfig::default()).unwrap();
        let context = explain(&model, &[]);
        assert!(context.conflicting_pairs.is_empty());
        assert!(context.window_overflows.is_empty());
    }
}

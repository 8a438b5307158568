//! Genetic Algorithm over joint route assignments.
//!
//! A chromosome holds one candidate index per aircraft. Fitness is
//! `-(time_weight * cost + conflict_penalty * conflicts)` where cost is the
//! priority-weighted taxi time of the selected routes. The search uses:
//! - Tournament selection
//! - Uniform crossover
//! - Per-gene mutation with a geometrically decaying rate
//! - Elitism, so the best fitness never gets worse between generations
//!
//! The run state is held in an [`Evolution`] value advanced one generation
//! at a time by [`Evolution::step`].

use crate::conflict::{ConflictConfig, ConflictDetector};
use crate::graph::SurfaceGraph;
use crate::heuristics::candidates::CandidatePool;
use crate::instance::Operation;
use crate::solution::{Assignment, Route};
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Order in which greedy seeding places aircraft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequencing {
    /// First come first served: ready time
    Fcfs,
    /// Higher priority first, then ready time
    Priority,
    /// Departures before arrivals, then ready time
    DeparturesFirst,
}

impl Sequencing {
    pub fn all() -> Vec<Sequencing> {
        vec![Sequencing::Fcfs, Sequencing::Priority, Sequencing::DeparturesFirst]
    }
}

/// Genetic Algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GAConfig {
    /// Population size
    pub population_size: usize,
    /// Number of generations
    pub max_generations: usize,
    /// Maximum generations without improvement
    pub max_no_improve: usize,
    /// Crossover probability
    pub crossover_prob: f64,
    /// Probability of taking a gene from the first parent in uniform crossover
    pub uniform_rate: f64,
    /// Initial per-gene mutation probability
    pub mutation_prob: f64,
    /// Factor applied to the mutation probability after each generation
    pub mutation_decay: f64,
    /// Floor of the mutation probability
    pub min_mutation_prob: f64,
    /// Elite count (best individuals preserved)
    pub elite_count: usize,
    /// Tournament size for selection
    pub tournament_size: usize,
    /// Weight of the taxi-time cost in the fitness
    pub time_weight: f64,
    /// Penalty per conflicting pair
    pub conflict_penalty: f64,
    /// Random seed; entropy when absent
    pub seed: Option<u64>,
    /// Time limit in seconds for the GA run (optional)
    pub time_limit: Option<f64>,
    /// Greedy orderings seeded into the initial population
    pub sequencing: Vec<Sequencing>,
}

impl Default for GAConfig {
    fn default() -> Self {
        GAConfig {
            population_size: 60,
            max_generations: 200,
            max_no_improve: 50,
            crossover_prob: 0.9,
            uniform_rate: 0.5,
            mutation_prob: 0.2,
            mutation_decay: 0.99,
            min_mutation_prob: 0.02,
            elite_count: 2,
            tournament_size: 3,
            time_weight: 1.0,
            conflict_penalty: 10_000.0,
            seed: Some(42),
            time_limit: None,
            sequencing: Sequencing::all(),
        }
    }
}

/// Individual in the genetic algorithm population
#[derive(Debug, Clone)]
pub struct Individual {
    /// Candidate index per aircraft
    pub genes: Vec<usize>,
    /// Priority-weighted taxi time
    pub cost: f64,
    pub conflicts: usize,
    /// Higher is better
    pub fitness: f64,
}

impl Individual {
    fn evaluate(genes: Vec<usize>, pool: &CandidatePool, detector: &ConflictDetector, config: &GAConfig) -> Self {
        let routes = selected_routes(pool, &genes);
        let cost: f64 = routes.iter().map(|r| r.weighted_cost()).sum();
        let conflicts = detector.count_routes(&routes);
        let fitness = -(config.time_weight * cost + config.conflict_penalty * conflicts as f64);
        Individual {
            genes,
            cost,
            conflicts,
            fitness,
        }
    }
}

fn selected_routes<'p>(pool: &'p CandidatePool, genes: &[usize]) -> Vec<&'p Route> {
    pool.sets
        .iter()
        .zip(genes)
        .map(|(set, &g)| &set.candidates[g].route)
        .collect()
}

/// Result of a GA run
#[derive(Debug, Clone)]
pub struct GaOutcome {
    pub assignment: Assignment,
    pub genes: Vec<usize>,
    pub cost: f64,
    pub fitness: f64,
    /// Conflicts left in the best assignment
    pub conflicts: usize,
    pub generations: usize,
    /// Best fitness after initialization and after every generation
    pub history: Vec<f64>,
    /// Set when the best assignment still has conflicts
    pub warning: Option<String>,
    pub computation_time: f64,
}

/// Explicit state of one GA run
pub struct Evolution<'a> {
    config: GAConfig,
    pool: &'a CandidatePool,
    detector: ConflictDetector<'a>,
    population: Vec<Individual>,
    best: Individual,
    rng: ChaCha8Rng,
    generation: usize,
    no_improve_count: usize,
    current_mutation_prob: f64,
    history: Vec<f64>,
    started: Instant,
}

impl<'a> Evolution<'a> {
    /// Seed the population: the all-fastest chromosome, one greedy
    /// chromosome per configured sequencing, then random chromosomes.
    pub fn new(
        graph: &'a SurfaceGraph,
        pool: &'a CandidatePool,
        conflicts: &ConflictConfig,
        config: GAConfig,
    ) -> Self {
        let mut config = config;
        config.population_size = config.population_size.max(2);
        config.elite_count = config.elite_count.clamp(1, config.population_size);
        config.tournament_size = config.tournament_size.max(1);

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let detector = ConflictDetector::new(graph, conflicts);
        let current_mutation_prob = config.mutation_prob;

        let mut evolution = Evolution {
            pool,
            detector,
            population: Vec::new(),
            best: Individual {
                genes: Vec::new(),
                cost: 0.0,
                conflicts: 0,
                fitness: f64::NEG_INFINITY,
            },
            rng,
            generation: 0,
            no_improve_count: 0,
            current_mutation_prob,
            history: Vec::new(),
            started: Instant::now(),
            config,
        };
        evolution.initialize_population();
        evolution
    }

    fn initialize_population(&mut self) {
        let n = self.pool.len();
        let mut chromosomes = vec![vec![0; n]];
        for &sequencing in &self.config.sequencing {
            let genes = self.greedy_chromosome(sequencing);
            if !chromosomes.contains(&genes) {
                chromosomes.push(genes);
            }
        }
        while chromosomes.len() < self.config.population_size {
            let genes = self
                .pool
                .sets
                .iter()
                .map(|set| self.rng.gen_range(0..set.len().max(1)))
                .collect();
            chromosomes.push(genes);
        }
        chromosomes.truncate(self.config.population_size);

        self.population = self.evaluate_all(chromosomes);
        self.population.sort_by_key(|ind| OrderedFloat(-ind.fitness));
        if let Some(first) = self.population.first() {
            self.best = first.clone();
        }
        self.history.push(self.best.fitness);
        log::debug!(
            "[GA] initialized {} individuals, best fitness {:.2} ({} conflicts)",
            self.population.len(),
            self.best.fitness,
            self.best.conflicts
        );
    }

    /// Aircraft in `sequencing` order, each taking the candidate with the
    /// fewest conflicts against those already placed, then the lowest cost.
    pub fn greedy_chromosome(&self, sequencing: Sequencing) -> Vec<usize> {
        let sets = &self.pool.sets;
        let mut order: Vec<usize> = (0..sets.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&sets[a].request, &sets[b].request);
            let by_ready = ra.ready_time.total_cmp(&rb.ready_time);
            let by_priority = rb.priority.total_cmp(&ra.priority);
            let rank = |op: Operation| match op {
                Operation::Departure => 0,
                Operation::Arrival => 1,
            };
            match sequencing {
                Sequencing::Fcfs => by_ready.then(by_priority),
                Sequencing::Priority => by_priority.then(by_ready),
                Sequencing::DeparturesFirst => rank(ra.operation).cmp(&rank(rb.operation)).then(by_ready),
            }
            .then(a.cmp(&b))
        });

        let mut genes = vec![0; sets.len()];
        let mut placed: Vec<&Route> = Vec::with_capacity(sets.len());
        for i in order {
            let best = sets[i]
                .candidates
                .iter()
                .enumerate()
                .min_by_key(|(idx, c)| {
                    placed.push(&c.route);
                    let conflicts = self.detector.count_routes(&placed);
                    placed.pop();
                    (conflicts, OrderedFloat(c.route.weighted_cost()), *idx)
                })
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            genes[i] = best;
            placed.push(&sets[i].candidates[best].route);
        }
        genes
    }

    fn evaluate_all(&self, chromosomes: Vec<Vec<usize>>) -> Vec<Individual> {
        chromosomes
            .into_par_iter()
            .map(|genes| Individual::evaluate(genes, self.pool, &self.detector, &self.config))
            .collect()
    }

    fn tournament_select(&mut self) -> usize {
        let mut best_idx = self.rng.gen_range(0..self.population.len());
        for _ in 1..self.config.tournament_size {
            let idx = self.rng.gen_range(0..self.population.len());
            if self.population[idx].fitness > self.population[best_idx].fitness {
                best_idx = idx;
            }
        }
        best_idx
    }

    fn uniform_crossover(&mut self, p1: usize, p2: usize) -> Vec<usize> {
        let a = self.population[p1].genes.clone();
        let b = &self.population[p2].genes;
        let mut child = Vec::with_capacity(a.len());
        for (i, &ga) in a.iter().enumerate() {
            let gb = b[i];
            child.push(if self.rng.gen::<f64>() < self.config.uniform_rate { ga } else { gb });
        }
        child
    }

    fn mutate(&mut self, genes: &mut [usize]) {
        for (gene, set) in genes.iter_mut().zip(&self.pool.sets) {
            let n = set.len();
            if n > 1 && self.rng.gen::<f64>() < self.current_mutation_prob {
                let r = self.rng.gen_range(0..n - 1);
                *gene = if r >= *gene { r + 1 } else { r };
            }
        }
    }

    /// Advance one generation.
    pub fn step(&mut self) {
        let mut offspring = Vec::with_capacity(self.config.population_size);
        while offspring.len() + self.config.elite_count < self.config.population_size {
            let p1 = self.tournament_select();
            let p2 = self.tournament_select();
            let mut child = if self.rng.gen::<f64>() < self.config.crossover_prob {
                self.uniform_crossover(p1, p2)
            } else {
                self.population[p1].genes.clone()
            };
            self.mutate(&mut child);
            offspring.push(child);
        }

        let mut new_population: Vec<Individual> =
            self.population.iter().take(self.config.elite_count).cloned().collect();
        new_population.extend(self.evaluate_all(offspring));
        new_population.sort_by_key(|ind| OrderedFloat(-ind.fitness));

        if let Some(first) = new_population.first() {
            if first.fitness > self.best.fitness {
                self.best = first.clone();
                self.no_improve_count = 0;
            } else {
                self.no_improve_count += 1;
            }
        }

        self.current_mutation_prob =
            (self.current_mutation_prob * self.config.mutation_decay).max(self.config.min_mutation_prob);
        self.population = new_population;
        self.generation += 1;
        self.history.push(self.best.fitness);

        log::debug!(
            "[GA] Gen {}  Best fitness {:.2}  Conflicts {}  Diversity {:.2}  Mutation {:.3}",
            self.generation,
            self.best.fitness,
            self.best.conflicts,
            self.population_diversity(),
            self.current_mutation_prob
        );
    }

    /// Whether a termination criterion is met
    pub fn is_done(&self) -> bool {
        self.generation >= self.config.max_generations
            || self.no_improve_count >= self.config.max_no_improve
            || self
                .config
                .time_limit
                .is_some_and(|limit| self.started.elapsed().as_secs_f64() >= limit)
    }

    pub fn best(&self) -> &Individual {
        &self.best
    }

    pub fn current_generation(&self) -> usize {
        self.generation
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Average number of differing genes over pairs of the first 20 individuals
    pub fn population_diversity(&self) -> f64 {
        let sample = &self.population[..self.population.len().min(20)];
        let mut total_diff = 0.0;
        let mut count = 0;
        for i in 0..sample.len() {
            for j in i + 1..sample.len() {
                let diff = sample[i].genes.iter().zip(&sample[j].genes).filter(|(a, b)| a != b).count();
                total_diff += diff as f64;
                count += 1;
            }
        }
        if count > 0 {
            total_diff / count as f64
        } else {
            0.0
        }
    }

    pub fn into_outcome(self) -> GaOutcome {
        let assignment: Assignment = selected_routes(self.pool, &self.best.genes).into_iter().cloned().collect();
        let warning = if self.best.conflicts > 0 {
            let msg = format!(
                "genetic search ended with {} unresolved conflict(s) after {} generations",
                self.best.conflicts, self.generation
            );
            log::warn!("{}", msg);
            Some(msg)
        } else {
            None
        };
        GaOutcome {
            assignment,
            genes: self.best.genes,
            cost: self.best.cost,
            fitness: self.best.fitness,
            conflicts: self.best.conflicts,
            generations: self.generation,
            history: self.history,
            warning,
            computation_time: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Run the GA to termination.
pub fn optimize(
    graph: &SurfaceGraph,
    pool: &CandidatePool,
    conflicts: &ConflictConfig,
    config: &GAConfig,
) -> GaOutcome {
    if pool.is_empty() {
        return GaOutcome {
            assignment: Assignment::new(),
            genes: Vec::new(),
            cost: 0.0,
            fitness: 0.0,
            conflicts: 0,
            generations: 0,
            history: Vec::new(),
            warning: None,
            computation_time: 0.0,
        };
    }

    let mut evolution = Evolution::new(graph, pool, conflicts, config.clone());
    while !evolution.is_done() {
        evolution.step();
    }
    let outcome = evolution.into_outcome();
    log::info!(
        "[GA] finished after {} generations: cost {:.2}, {} conflicts, {:.2}s",
        outcome.generations,
        outcome.cost,
        outcome.conflicts,
        outcome.computation_time
    );
    outcome
}

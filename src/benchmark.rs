//! Benchmarking and experimentation module.
//!
//! Runs planning modes over scenarios and seeds, collects one row per run,
//! and aggregates the rows per mode.

use crate::config::PlannerConfig;
use crate::error::ScenarioError;
use crate::instance::Scenario;
use crate::orchestrator::{run, Mode};

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// Result of one planning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeResult {
    pub mode: Mode,
    /// Scenario name
    pub scenario: String,
    pub num_aircraft: usize,
    pub seed: u64,
    /// Objective value, absent when planning failed
    pub objective: Option<f64>,
    pub total_delay: Option<f64>,
    pub total_taxi_time: Option<f64>,
    pub unresolved_conflicts: usize,
    /// Aircraft left out of the plan
    pub excluded: usize,
    /// Plan produced and free of conflicts
    pub conflict_free: bool,
    pub status: String,
    /// Computation time in seconds
    pub time: f64,
    /// Gap to the best conflict-free objective on the scenario, in percent
    pub gap_to_best: Option<f64>,
}

/// Aggregated statistics for a mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeStatistics {
    pub mode: Mode,
    pub runs: usize,
    pub num_conflict_free: usize,
    pub avg_objective: f64,
    pub std_objective: f64,
    pub best_objective: f64,
    pub worst_objective: f64,
    pub avg_conflicts: f64,
    pub avg_time: f64,
    pub total_time: f64,
    pub avg_gap: Option<f64>,
}

impl fmt::Display for ModeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gap = self
            .avg_gap
            .map(|g| format!("{:.2}%", g))
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{:<12} {:>10} {:>12.2} {:>10.2} {:>12.2} {:>10.2} {:>10} {:>10.4}",
            self.mode,
            format!("{}/{}", self.num_conflict_free, self.runs),
            self.avg_objective,
            self.std_objective,
            self.best_objective,
            self.avg_conflicts,
            gap,
            self.avg_time
        )
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub modes: Vec<Mode>,
    /// One run per seed for stochastic modes
    pub seeds: Vec<u64>,
    /// Base planner settings; seed is overridden per run
    pub planner: PlannerConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            modes: Mode::all().to_vec(),
            seeds: (0..5).collect(),
            planner: PlannerConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Number of runs a scenario takes
    pub fn runs_per_scenario(&self) -> usize {
        self.modes.iter().map(|&m| self.seeds_for(m).len()).sum()
    }

    fn seeds_for(&self, mode: Mode) -> &[u64] {
        // the pathfinder ignores the seed
        match mode {
            Mode::PathfinderOnly => &self.seeds[..self.seeds.len().min(1)],
            _ => &self.seeds,
        }
    }
}

pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<ModeResult>,
    best_known: HashMap<String, f64>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
            best_known: HashMap::new(),
        }
    }

    pub fn run_scenario(&mut self, scenario: &Scenario) -> Result<(), ScenarioError> {
        self.run_scenario_with(scenario, |_| {})
    }

    /// Run every mode and seed on a scenario, reporting each finished run.
    pub fn run_scenario_with<F: FnMut(&ModeResult)>(
        &mut self,
        scenario: &Scenario,
        mut on_run: F,
    ) -> Result<(), ScenarioError> {
        let graph = scenario.graph()?;
        log::info!("Running benchmark on scenario: {}", scenario.name);
        let first = self.results.len();

        for &mode in &self.config.modes {
            for &seed in self.config.seeds_for(mode) {
                let planner = self.config.planner.clone().with_seed(seed);
                let result = match run(&graph, &scenario.requests, mode, &planner) {
                    Ok(outcome) => {
                        let report = outcome.report;
                        ModeResult {
                            mode,
                            scenario: scenario.name.clone(),
                            num_aircraft: scenario.requests.len(),
                            seed,
                            objective: Some(report.objective),
                            total_delay: Some(report.total_delay),
                            total_taxi_time: Some(report.total_taxi_time),
                            unresolved_conflicts: report.unresolved_conflicts,
                            excluded: report.excluded.len(),
                            conflict_free: report.unresolved_conflicts == 0 && report.capacity_violations == 0,
                            status: report.solver_status.unwrap_or_else(|| "Done".to_string()),
                            time: report.elapsed,
                            gap_to_best: None,
                        }
                    }
                    Err(e) => {
                        log::error!("{} mode failed on {}: {}", mode, scenario.name, e);
                        ModeResult {
                            mode,
                            scenario: scenario.name.clone(),
                            num_aircraft: scenario.requests.len(),
                            seed,
                            objective: None,
                            total_delay: None,
                            total_taxi_time: None,
                            unresolved_conflicts: 0,
                            excluded: 0,
                            conflict_free: false,
                            status: e.to_string(),
                            time: 0.0,
                            gap_to_best: None,
                        }
                    }
                };
                on_run(&result);
                self.results.push(result);
            }
        }

        let best = self.results[first..]
            .iter()
            .filter(|r| r.conflict_free)
            .filter_map(|r| r.objective)
            .fold(f64::INFINITY, f64::min);
        if best.is_finite() {
            self.best_known.insert(scenario.name.clone(), best);
            for r in &mut self.results[first..] {
                if let Some(obj) = r.objective.filter(|_| r.conflict_free) {
                    r.gap_to_best = Some(if best > 0.0 { (obj - best) / best * 100.0 } else { 0.0 });
                }
            }
        }
        Ok(())
    }

    /// Compute statistics for each mode
    pub fn compute_statistics(&self) -> Vec<ModeStatistics> {
        let mut by_mode: HashMap<Mode, Vec<&ModeResult>> = HashMap::new();
        for result in &self.results {
            by_mode.entry(result.mode).or_default().push(result);
        }

        let mut statistics = Vec::new();
        for mode in Mode::all() {
            let Some(results) = by_mode.get(&mode) else {
                continue;
            };
            let objectives: Vec<f64> = results.iter().filter_map(|r| r.objective).collect();
            if objectives.is_empty() {
                continue;
            }
            let times: Vec<f64> = results.iter().map(|r| r.time).collect();
            let conflicts: Vec<f64> = results.iter().map(|r| r.unresolved_conflicts as f64).collect();
            let gaps: Vec<f64> = results.iter().filter_map(|r| r.gap_to_best).collect();

            statistics.push(ModeStatistics {
                mode,
                runs: results.len(),
                num_conflict_free: results.iter().filter(|r| r.conflict_free).count(),
                avg_objective: objectives.iter().mean(),
                std_objective: if objectives.len() > 1 { objectives.iter().std_dev() } else { 0.0 },
                best_objective: objectives.iter().cloned().fold(f64::INFINITY, f64::min),
                worst_objective: objectives.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                avg_conflicts: conflicts.iter().mean(),
                avg_time: times.iter().mean(),
                total_time: times.iter().sum(),
                avg_gap: if gaps.is_empty() { None } else { Some(gaps.iter().mean()) },
            });
        }
        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        report.push_str("========================================\n");
        report.push_str("     Surface Taxi Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));

        report.push_str("Mode Performance Summary:\n");
        report.push_str(&"-".repeat(96));
        report.push('\n');
        report.push_str(&format!(
            "{:<12} {:>10} {:>12} {:>10} {:>12} {:>10} {:>10} {:>10}\n",
            "Mode", "Clean", "Avg Obj", "Std", "Best Obj", "Conflicts", "Avg Gap", "Avg Time"
        ));
        report.push_str(&"-".repeat(96));
        report.push('\n');
        for stat in self.compute_statistics() {
            report.push_str(&format!("{}\n", stat));
        }
        report.push_str(&"-".repeat(96));
        report.push('\n');

        report.push_str("\nBest conflict-free plan per scenario:\n");
        let mut names: Vec<_> = self.best_known.keys().collect();
        names.sort();
        for name in names {
            let best = self.best_known[name];
            let modes: Vec<String> = self
                .results
                .iter()
                .filter(|r| &r.scenario == name && r.conflict_free && r.objective == Some(best))
                .map(|r| r.mode.to_string())
                .collect();
            report.push_str(&format!("  {}: {:.2} ({})\n", name, best, modes.join(", ")));
        }

        let failures: Vec<_> = self.results.iter().filter(|r| r.objective.is_none()).collect();
        if !failures.is_empty() {
            report.push_str("\nFailed runs:\n");
            for r in failures {
                report.push_str(&format!("  {} / {} / seed {}: {}\n", r.scenario, r.mode, r.seed, r.status));
            }
        }
        report
    }

    pub fn results(&self) -> &[ModeResult] {
        &self.results
    }

    pub fn best_known(&self) -> &HashMap<String, f64> {
        &self.best_known
    }
}

/// Load every `*.json` scenario of a directory, smallest first.
pub fn load_scenarios_from_dir<P: AsRef<Path>>(dir: P) -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match Scenario::from_file(&path) {
                    Ok(scenario) => scenarios.push(scenario),
                    Err(e) => log::warn!("skipping {}: {}", path.display(), e),
                }
            }
        }
    }
    scenarios.sort_by_key(|s| s.requests.len());
    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{generate_scenario, GeneratorConfig};

    fn small_config() -> BenchmarkConfig {
        let mut planner = PlannerConfig::default();
        planner.ga.population_size = 12;
        planner.ga.max_generations = 15;
        BenchmarkConfig {
            modes: vec![Mode::PathfinderOnly, Mode::GaRefine],
            seeds: vec![1, 2],
            planner,
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.seeds.len(), 5);
        assert_eq!(config.runs_per_scenario(), 11);
    }

    #[test]
    fn test_runs_and_statistics() {
        let scenario = generate_scenario(&GeneratorConfig {
            num_flights: 4,
            ..Default::default()
        });
        let mut benchmark = Benchmark::new(small_config());
        let mut seen = 0;
        benchmark.run_scenario_with(&scenario, |_| seen += 1).unwrap();

        assert_eq!(seen, 3);
        assert_eq!(benchmark.results().len(), 3);
        assert!(benchmark.results().iter().all(|r| r.objective.is_some()));

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].mode, Mode::PathfinderOnly);
        assert_eq!(stats[0].std_objective, 0.0);
        for s in &stats {
            assert!(s.best_objective <= s.avg_objective + 1e-9);
            assert!(s.avg_objective <= s.worst_objective + 1e-9);
        }
        if let Some(best) = benchmark.best_known().get(&scenario.name) {
            for r in benchmark.results().iter().filter(|r| r.conflict_free) {
                assert!(r.objective.unwrap() >= best - 1e-9);
                assert!(r.gap_to_best.unwrap() >= -1e-9);
            }
        }
        assert!(benchmark.generate_report().contains("Mode Performance Summary"));
    }
}

//! Surface taxi solver - Command Line Interface
//!
//! Plans conflict-free taxi routes for aircraft on an airport surface.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use surface_taxi_solver::benchmark::{load_scenarios_from_dir, Benchmark, BenchmarkConfig};
use surface_taxi_solver::config::PlannerConfig;
use surface_taxi_solver::exact::Backend;
use surface_taxi_solver::generate::{generate_scenario, GeneratorConfig};
use surface_taxi_solver::heuristics::astar::{find_route, PathfinderConfig, TimeWindow};
use surface_taxi_solver::instance::Scenario;
use surface_taxi_solver::orchestrator::{run, Mode};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "taxi-solver")]
#[command(version = "1.0")]
#[command(about = "Conflict-free taxi route planning on an airport surface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a scenario with one strategy
    Solve {
        #[arg(short, long)]
        scenario: PathBuf,

        /// Planning strategy
        #[arg(short, long, value_enum, default_value = "exact")]
        mode: ModeArg,

        /// Planner configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed for the genetic search
        #[arg(long)]
        seed: Option<u64>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Minimum time between two aircraft on one resource, in seconds
        #[arg(long)]
        separation: Option<f64>,

        /// Exact scheduling backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Write the plan as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the scenario summary first
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run benchmarks on a directory of scenarios
    Benchmark {
        /// Directory containing scenario files
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Number of seeds per stochastic mode
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Time limit per run
        #[arg(short, long, default_value = "60")]
        time_limit: f64,

        /// Include the exact scheduler
        #[arg(long)]
        exact: bool,

        /// Maximum number of aircraft per scenario
        #[arg(long)]
        max_size: Option<usize>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Analyze a scenario
    Analyze {
        #[arg(short, long)]
        scenario: PathBuf,

        /// Planner configuration (JSON); its pathfinder settings are used
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compare all strategies on a scenario
    Compare {
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of seeds
        #[arg(short, long, default_value = "3")]
        runs: usize,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a synthetic scenario
    Generate {
        /// Output scenario file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value = "8")]
        flights: usize,

        #[arg(long, default_value = "4")]
        rows: usize,

        #[arg(long, default_value = "5")]
        cols: usize,

        #[arg(long, default_value = "2")]
        runways: usize,

        /// Ready times fall within this many seconds
        #[arg(long, default_value = "600")]
        horizon: f64,

        /// Share of one-way taxiway segments
        #[arg(long, default_value = "0.0")]
        one_way: f64,

        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum ModeArg {
    /// Fastest route per aircraft, no deconfliction
    Pathfinder,
    /// Genetic refinement of candidate routes
    Ga,
    /// Exact conflict-free scheduling
    Exact,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Pathfinder => Mode::PathfinderOnly,
            ModeArg::Ga => Mode::GaRefine,
            ModeArg::Exact => Mode::Exact,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum BackendArg {
    /// Built-in branch-and-bound
    BranchBound,
    /// Gurobi MIP (requires the `gurobi` feature)
    Gurobi,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            scenario,
            mode,
            config,
            seed,
            time_limit,
            separation,
            backend,
            output,
            verbose,
        } => {
            let mut planner = load_config(config.as_deref());
            if let Some(seed) = seed {
                planner = planner.with_seed(seed);
            }
            if let Some(limit) = time_limit {
                planner = planner.with_time_limit(limit);
            }
            if let Some(sep) = separation {
                planner.conflicts.separation = sep;
            }
            if let Some(backend) = backend {
                planner.scheduler.backend = match backend {
                    BackendArg::BranchBound => Backend::BranchAndBound,
                    BackendArg::Gurobi => Backend::Gurobi,
                };
            }
            solve_scenario(&scenario, mode.into(), &planner, output, verbose);
        }

        Commands::Benchmark {
            dir,
            output,
            runs,
            time_limit,
            exact,
            max_size,
            config,
        } => {
            let planner = load_config(config.as_deref()).with_time_limit(time_limit);
            run_benchmark(&dir, &output, runs, exact, max_size, planner);
        }

        Commands::Analyze { scenario, config } => {
            let planner = load_config(config.as_deref());
            analyze_scenario(&scenario, &planner.pathfinder);
        }

        Commands::Compare {
            scenario,
            runs,
            config,
            output,
        } => {
            compare_modes(&scenario, runs, load_config(config.as_deref()), output);
        }

        Commands::Generate {
            output,
            flights,
            rows,
            cols,
            runways,
            horizon,
            one_way,
            seed,
        } => {
            let name = output
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "synthetic".to_string());
            let config = GeneratorConfig {
                name,
                rows,
                cols,
                num_runways: runways,
                num_flights: flights,
                horizon,
                one_way_fraction: one_way,
                seed,
                ..Default::default()
            };
            let scenario = generate_scenario(&config);
            if let Err(e) = scenario.to_file(&output) {
                eprintln!("Error writing scenario: {}", e);
                std::process::exit(1);
            }
            println!(
                "Generated {} flights on {} nodes -> {:?}",
                scenario.requests.len(),
                scenario.nodes.len(),
                output
            );
        }
    }
}

fn load_config(path: Option<&Path>) -> PlannerConfig {
    match path {
        None => PlannerConfig::default(),
        Some(p) => match PlannerConfig::from_file(p) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn load_scenario(path: &Path) -> Scenario {
    match Scenario::from_file(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading scenario: {}", e);
            std::process::exit(1);
        }
    }
}

fn solve_scenario(path: &Path, mode: Mode, planner: &PlannerConfig, output: Option<PathBuf>, verbose: bool) {
    println!("Loading scenario from {:?}...", path);
    let scenario = load_scenario(path);
    let graph = match scenario.graph() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Invalid surface graph: {}", e);
            std::process::exit(1);
        }
    };

    if verbose {
        println!("{}", scenario.statistics(&graph));
    }

    let outcome = match run(&graph, &scenario.requests, mode, planner) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Planning failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n{}", outcome.report);

    if let Some(out) = output {
        let written = serde_json::to_string_pretty(&outcome)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&out, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => println!("Plan saved to {:?}", out),
            Err(e) => {
                eprintln!("Error saving plan: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_benchmark(
    dir: &Path,
    output: &Path,
    runs: usize,
    exact: bool,
    max_size: Option<usize>,
    planner: PlannerConfig,
) {
    println!("Loading scenarios from {:?}...", dir);
    let mut scenarios = load_scenarios_from_dir(dir);
    if let Some(max) = max_size {
        scenarios.retain(|s| s.requests.len() <= max);
    }
    println!("Found {} scenarios", scenarios.len());
    if scenarios.is_empty() {
        eprintln!("No scenarios found!");
        return;
    }

    if let Err(e) = std::fs::create_dir_all(output) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    let modes = if exact {
        Mode::all().to_vec()
    } else {
        vec![Mode::PathfinderOnly, Mode::GaRefine]
    };
    let config = BenchmarkConfig {
        modes,
        seeds: (0..runs.max(1) as u64).collect(),
        planner,
    };
    let total = (config.runs_per_scenario() * scenarios.len()) as u64;
    let mut benchmark = Benchmark::new(config);

    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    for scenario in &scenarios {
        let result = benchmark.run_scenario_with(scenario, |r| {
            bar.set_message(format!("{} / {}", r.scenario, r.mode));
            bar.inc(1);
        });
        if let Err(e) = result {
            bar.println(format!("Skipping {}: {}", scenario.name, e));
        }
    }
    bar.finish_and_clear();

    let results_path = output.join("results.csv");
    let stats_path = output.join("statistics.csv");
    let report_path = output.join("report.txt");
    let report = benchmark.generate_report();
    let saved = benchmark
        .export_to_csv(&results_path)
        .and_then(|_| benchmark.export_statistics_csv(&stats_path))
        .and_then(|_| std::fs::write(&report_path, &report));

    println!("\n{}", report);
    match saved {
        Ok(()) => println!("Results saved to {:?}", output),
        Err(e) => {
            eprintln!("Failed to save results: {}", e);
            std::process::exit(1);
        }
    }
}

fn analyze_scenario(path: &Path, pathfinder: &PathfinderConfig) {
    let scenario = load_scenario(path);
    let graph = match scenario.graph() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Invalid surface graph: {}", e);
            std::process::exit(1);
        }
    };

    println!("========== Scenario Analysis ==========\n");
    println!("{}", scenario.statistics(&graph));

    println!("Unconstrained taxi estimates:");
    let mut total = 0.0;
    for request in &scenario.requests {
        match find_route(&graph, request, TimeWindow::unbounded(), pathfinder) {
            Ok(route) => {
                total += route.traversal_time();
                println!(
                    "  {:<10} {} -> {}  {:>7.1}s  {:>7.1}m  ready {:.0}s",
                    request.aircraft,
                    graph.node_label(request.origin),
                    graph.node_label(request.destination),
                    route.traversal_time(),
                    route.distance,
                    request.ready_time
                );
            }
            Err(e) => println!("  {:<10} {}", request.aircraft, e),
        }
    }
    println!("  Total traversal time: {:.1}s", total);
}

fn compare_modes(path: &Path, runs: usize, planner: PlannerConfig, output: Option<PathBuf>) {
    let scenario = load_scenario(path);
    println!(
        "Comparing modes on {} ({} aircraft)...\n",
        scenario.name,
        scenario.requests.len()
    );

    let mut benchmark = Benchmark::new(BenchmarkConfig {
        modes: Mode::all().to_vec(),
        seeds: (0..runs.max(1) as u64).collect(),
        planner,
    });
    if let Err(e) = benchmark.run_scenario(&scenario) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    println!(
        "{:<12} {:>10} {:>12} {:>10} {:>12} {:>10} {:>10} {:>10}",
        "Mode", "Clean", "Avg Obj", "Std", "Best Obj", "Conflicts", "Avg Gap", "Avg Time"
    );
    println!("{}", "-".repeat(96));
    for stat in benchmark.compute_statistics() {
        println!("{}", stat);
    }

    if let Some(out) = output {
        match benchmark.export_to_csv(&out) {
            Ok(()) => println!("\nResults exported to {:?}", out),
            Err(e) => eprintln!("Failed to export results: {}", e),
        }
    }
}

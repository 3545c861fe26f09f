//! CVRP Solver - Command Line Interface
//!
//! Construct-then-improve solver for the Capacitated Vehicle Routing Problem.

use clap::{Parser, Subcommand, ValueEnum};
use cvrp_solver::benchmark::{
    append_record, format_profile, load_instances_from_dir, load_records, performance_profile, solve, Benchmark,
    BenchmarkConfig,
};
use cvrp_solver::heuristics::construction::ConstructionMethod;
use cvrp_solver::heuristics::local_search::{LocalSearch, LocalSearchConfig, TabuLocalSearch};
use cvrp_solver::instance::CvrpInstance;
use cvrp_solver::visualization::Visualizer;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cvrp-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Savings, insertion and sweep heuristics with tabu local search for the CVRP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single instance
    Solve {
        #[arg(short, long)]
        instance: PathBuf,

        /// Construction heuristic
        #[arg(short, long, value_enum, default_value = "savings")]
        method: Method,

        /// Weight of the broken edge in the insertion cost
        #[arg(short, long, default_value = "1.0")]
        lambda: f64,

        /// Time limit in seconds, construction included
        #[arg(short, long, default_value = "60")]
        time_limit: f64,

        /// Maximum number of local-search moves
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Instance index written to the run log
        #[arg(long, default_value = "0")]
        index: usize,

        /// Append a `;`-separated record to this run log
        #[arg(short, long)]
        results: Option<PathBuf>,

        /// Output solution to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Generate a route map
        #[arg(long)]
        visualize: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run benchmarks on a directory of instances
    Benchmark {
        /// Directory containing .vrp files
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Time limit per run
        #[arg(short, long, default_value = "60")]
        time_limit: f64,

        /// Maximum number of local-search moves per run
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Weight of the broken edge in the insertion cost
        #[arg(short, long, default_value = "1.0")]
        lambda: f64,

        /// Run jobs one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,
    },

    /// Write a random instance
    Generate {
        /// Output .vrp file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of customers
        #[arg(short, long, default_value = "50")]
        customers: usize,

        /// Vehicle capacity
        #[arg(long, default_value = "100")]
        capacity: i32,

        /// Largest customer demand
        #[arg(long, default_value = "30")]
        max_demand: i32,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },

    /// Print performance profiles from a run log
    Profile {
        /// Run log written by `solve --results` or `benchmark`
        #[arg(short, long)]
        results: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Method {
    /// Clarke-Wright savings
    Savings,
    /// Mole-Jameson sequential insertion
    Insertion,
    /// Polar sweep
    Sweep,
}

impl From<Method> for ConstructionMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Savings => ConstructionMethod::Savings,
            Method::Insertion => ConstructionMethod::Insertion,
            Method::Sweep => ConstructionMethod::Sweep,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            instance,
            method,
            lambda,
            time_limit,
            max_iterations,
            index,
            results,
            output,
            visualize,
            verbose,
        } => {
            let config = LocalSearchConfig {
                time_limit,
                max_iterations,
            };
            solve_instance(&instance, method.into(), lambda, &config, index, results, output, visualize, verbose);
        }

        Commands::Benchmark {
            dir,
            output,
            time_limit,
            max_iterations,
            lambda,
            sequential,
        } => {
            let config = BenchmarkConfig {
                time_limit,
                max_iterations,
                lambda,
                parallel: !sequential,
                output_dir: output.to_string_lossy().to_string(),
                ..Default::default()
            };
            run_benchmark(&dir, &output, config);
        }

        Commands::Analyze { instance } => {
            analyze_instance(&instance);
        }

        Commands::Generate {
            output,
            customers,
            capacity,
            max_demand,
            seed,
        } => {
            generate_instance(&output, customers, capacity, max_demand, seed);
        }

        Commands::Profile { results } => {
            print_profile(&results);
        }
    }
}

/// Print `context: error` and exit
fn or_exit<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{}: {}", context, e);
            std::process::exit(1);
        }
    }
}

fn load_instance(path: &Path) -> CvrpInstance {
    or_exit(CvrpInstance::from_file(path), "Error loading instance")
}

#[allow(clippy::too_many_arguments)]
fn solve_instance(
    path: &Path,
    method: ConstructionMethod,
    lambda: f64,
    config: &LocalSearchConfig,
    index: usize,
    results: Option<PathBuf>,
    output: Option<PathBuf>,
    visualize: bool,
    verbose: bool,
) {
    println!("Loading instance from {:?}...", path);
    let instance = load_instance(path);

    if verbose {
        println!("{}", instance.statistics());
    }

    println!("Solving with {} construction and local search...", method);
    let outcome = solve(&instance, method, lambda, config);
    let solution = &outcome.solution;

    println!("\n========== Results ==========");
    println!("Algorithm: {}", solution.algorithm);
    println!("Initial cost: {}", outcome.initial_cost);
    println!("Cost: {}", solution.cost);
    println!("Routes: {}", solution.num_routes());
    println!("Feasible: {}", solution.feasible);
    println!("Time: {:.4}s (best at {:.4}s)", outcome.time, outcome.time_best);
    println!("Iterations: {} ({})", outcome.iterations, outcome.termination);

    if verbose {
        println!();
        for (i, route) in solution.routes.iter().enumerate() {
            println!("Route {} (load {}/{}): {:?}", i + 1, route.load, instance.capacity, route.nodes);
        }
    }

    if let Some(log_path) = results {
        match append_record(&log_path, &outcome.record(index)) {
            Ok(()) => println!("\nRecord appended to {:?}", log_path),
            Err(e) => log::error!("Failed to append record to {:?}: {}", log_path, e),
        }
    }

    if let Some(out_path) = output {
        let json = or_exit(serde_json::to_string_pretty(solution), "Failed to serialize solution");
        or_exit(std::fs::write(&out_path, json), "Failed to write output");
        println!("\nSolution saved to {:?}", out_path);
    }

    if visualize {
        let viz = Visualizer::new();
        let svg = viz.generate_svg(&instance, solution);
        let png_path = path.with_extension("png");
        match viz.save_png(&svg, &png_path) {
            Ok(()) => println!("Visualization saved to {:?}", png_path),
            Err(e) => {
                let svg_path = path.with_extension("svg");
                or_exit(viz.save_svg(&svg, &svg_path), "Failed to save SVG");
                println!("PNG conversion failed ({}). Saved SVG to {:?}", e, svg_path);
            }
        }
    }
}

fn run_benchmark(dir: &Path, output: &Path, config: BenchmarkConfig) {
    println!("Loading instances from {:?}...", dir);

    let instances = load_instances_from_dir(dir);
    println!("Found {} instances", instances.len());

    if instances.is_empty() {
        eprintln!("No instances found!");
        return;
    }

    or_exit(std::fs::create_dir_all(output), "Failed to create output directory");

    let mut benchmark = Benchmark::new(config);
    benchmark.run_on_instances(&instances);

    let results_path = output.join("results.csv");
    or_exit(benchmark.export_to_csv(&results_path), "Failed to export results");
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    or_exit(benchmark.export_statistics_csv(&stats_path), "Failed to export statistics");
    println!("Statistics exported to {:?}", stats_path);

    let records_path = output.join("records.csv");
    if let Err(e) = benchmark.append_records(&records_path) {
        log::error!("Failed to append records to {:?}: {}", records_path, e);
    } else {
        println!("Run log appended to {:?}", records_path);
    }

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    or_exit(std::fs::write(&report_path, &report), "Failed to save report");
    println!("Report saved to {:?}", report_path);
}

fn analyze_instance(path: &Path) {
    let instance = load_instance(path);

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    let demands: Vec<i32> = instance.customers().map(|c| instance.demand(c)).collect();
    if !demands.is_empty() {
        let avg_demand = demands.iter().sum::<i32>() as f64 / demands.len() as f64;
        println!("\nDemand Statistics:");
        println!("  Average: {:.2}", avg_demand);
        println!("  Min: {}", demands.iter().min().copied().unwrap_or(0));
        println!("  Max: {}", demands.iter().max().copied().unwrap_or(0));
        println!("  Capacity utilization ratio: {:.2}%", avg_demand / instance.capacity as f64 * 100.0);
    }

    println!("\nQuick Solution Estimates:");
    let search = TabuLocalSearch::with_config(LocalSearchConfig {
        time_limit: 5.0,
        max_iterations: None,
    });
    for method in ConstructionMethod::ALL {
        let mut solution = method.heuristic(1.0).construct(&instance);
        let constructed = solution.cost;
        search.improve(&instance, &mut solution);
        println!(
            "  {:<10} {:>8} -> {:>8} after {}, {:>3} routes (feasible: {})",
            method.to_string(),
            constructed,
            solution.cost,
            search.name(),
            solution.num_routes(),
            solution.feasible
        );
    }
}

fn generate_instance(output: &Path, customers: usize, capacity: i32, max_demand: i32, seed: u64) {
    if capacity <= 0 || max_demand <= 0 {
        eprintln!("Capacity and maximum demand must be positive");
        std::process::exit(1);
    }

    let name = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "random".to_string());
    let instance = CvrpInstance::random(&name, customers, capacity, max_demand, seed);

    or_exit(std::fs::write(output, instance.to_vrp_string()), "Failed to write instance");
    println!(
        "Instance {} with {} customers saved to {:?}",
        instance.name,
        instance.num_customers(),
        output
    );
}

fn print_profile(path: &Path) {
    let records = or_exit(load_records(path), "Failed to read run log");
    if records.is_empty() {
        eprintln!("No records in {:?}", path);
        return;
    }

    print!("{}", format_profile(&performance_profile(&records)));
}

//! Benchmarking and experimentation module for CVRP.
//!
//! Provides the construct-then-improve pipeline, the semicolon-separated run
//! log, batch runs over instance directories and performance profiles.

use crate::heuristics::construction::ConstructionMethod;
use crate::heuristics::local_search::{LocalSearchConfig, TabuLocalSearch, Termination};
use crate::instance::CvrpInstance;
use crate::solution::Solution;

use indicatif::{ProgressBar, ProgressStyle};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One line of the run log: `instance;constructor;time;value;time_best`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Position of the instance in the benchmark order
    pub instance: usize,
    /// Construction method identifier
    pub constructor: String,
    /// Total elapsed seconds, construction included
    pub time: f64,
    /// Final cost
    pub value: i64,
    /// Seconds until the final cost was first reached
    pub time_best: f64,
}

/// Everything one pipeline run produces
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub method: ConstructionMethod,
    pub initial_cost: i64,
    pub solution: Solution,
    pub time: f64,
    pub time_best: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl RunOutcome {
    pub fn record(&self, instance_index: usize) -> RunRecord {
        RunRecord {
            instance: instance_index,
            constructor: self.method.id().to_string(),
            time: self.time,
            value: self.solution.cost,
            time_best: self.time_best,
        }
    }
}

/// Construct with `method`, then improve with the local search.
///
/// Both phases share one clock, so the time limit covers construction too.
pub fn solve(
    instance: &CvrpInstance,
    method: ConstructionMethod,
    lambda: f64,
    config: &LocalSearchConfig,
) -> RunOutcome {
    let start = Instant::now();
    let initial = method.heuristic(lambda).construct(instance);
    let initial_cost = initial.cost;
    log::info!(
        "{}: {} built {} routes with cost {}",
        instance.name,
        initial.algorithm,
        initial.num_routes(),
        initial_cost
    );

    let outcome = TabuLocalSearch::with_config(config.clone()).run(instance, initial, start);

    RunOutcome {
        method,
        initial_cost,
        time: outcome.elapsed,
        time_best: outcome.time_of_best,
        iterations: outcome.iterations,
        termination: outcome.termination,
        solution: outcome.solution,
    }
}

fn record_writer(file: File, headers: bool) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(headers)
        .from_writer(file)
}

/// Append one record, writing the header first if the file is new or empty
pub fn append_record<P: AsRef<Path>>(path: P, record: &RunRecord) -> std::io::Result<()> {
    let path = path.as_ref();
    let fresh = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = record_writer(file, fresh);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

/// Read back a run log written by [`append_record`]
pub fn load_records<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<RunRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Result of running one method on one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    /// Position of the instance in the benchmark order
    pub instance_index: usize,
    pub instance: String,
    pub dimension: usize,
    pub capacity: i32,
    /// Construction method identifier
    pub method: String,
    pub initial_cost: i64,
    pub cost: i64,
    pub routes: usize,
    pub feasible: bool,
    pub time: f64,
    pub time_best: f64,
    pub iterations: usize,
    pub termination: Termination,
    /// Percentage above the best method on the same instance
    pub gap_to_best: Option<f64>,
}

impl AlgorithmResult {
    fn from_outcome(instance_index: usize, instance: &CvrpInstance, outcome: &RunOutcome) -> Self {
        AlgorithmResult {
            instance_index,
            instance: instance.name.clone(),
            dimension: instance.dimension,
            capacity: instance.capacity,
            method: outcome.method.id().to_string(),
            initial_cost: outcome.initial_cost,
            cost: outcome.solution.cost,
            routes: outcome.solution.num_routes(),
            feasible: outcome.solution.feasible,
            time: outcome.time,
            time_best: outcome.time_best,
            iterations: outcome.iterations,
            termination: outcome.termination,
            gap_to_best: None,
        }
    }

    pub fn record(&self) -> RunRecord {
        RunRecord {
            instance: self.instance_index,
            constructor: self.method.clone(),
            time: self.time,
            value: self.cost,
            time_best: self.time_best,
        }
    }
}

/// Aggregated statistics for a method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub method: String,
    pub num_instances: usize,
    pub num_feasible: usize,
    pub avg_cost: f64,
    pub best_cost: i64,
    pub worst_cost: i64,
    pub avg_gap: f64,
    pub avg_time: f64,
    pub avg_time_best: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Time limit per run in seconds
    pub time_limit: f64,
    /// Optional cap on local-search iterations per run
    pub max_iterations: Option<usize>,
    /// Weight of the broken edge in the insertion heuristic
    pub lambda: f64,
    /// Run (instance, method) jobs in parallel
    pub parallel: bool,
    /// Construction methods to benchmark
    pub methods: Vec<ConstructionMethod>,
    /// Output directory
    pub output_dir: String,
}

impl BenchmarkConfig {
    pub fn search_config(&self) -> LocalSearchConfig {
        LocalSearchConfig {
            time_limit: self.time_limit,
            max_iterations: self.max_iterations,
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            time_limit: 60.0,
            max_iterations: None,
            lambda: 1.0,
            parallel: true,
            methods: ConstructionMethod::ALL.to_vec(),
            output_dir: "results".to_string(),
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<AlgorithmResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run every configured method on every instance.
    ///
    /// The instance index in each result is its position in `instances`.
    pub fn run_on_instances(&mut self, instances: &[CvrpInstance]) {
        let jobs: Vec<(usize, ConstructionMethod)> = (0..instances.len())
            .flat_map(|i| self.config.methods.iter().map(move |&m| (i, m)))
            .collect();

        let progress = ProgressBar::new(jobs.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let search = self.config.search_config();
        let lambda = self.config.lambda;
        let run_job = |&(index, method): &(usize, ConstructionMethod)| {
            let instance = &instances[index];
            let outcome = solve(instance, method, lambda, &search);
            progress.set_message(format!("{} {}", instance.name, method));
            progress.inc(1);
            AlgorithmResult::from_outcome(index, instance, &outcome)
        };

        let mut results: Vec<AlgorithmResult> = if self.config.parallel {
            jobs.par_iter().map(run_job).collect()
        } else {
            jobs.iter().map(run_job).collect()
        };
        progress.finish_and_clear();

        fill_gaps(&mut results);
        for result in &results {
            log::info!(
                "[{}] {} / {}: {} -> {} ({})",
                result.instance_index,
                result.instance,
                result.method,
                result.initial_cost,
                result.cost,
                result.termination
            );
        }
        self.results.extend(results);
    }

    /// Compute statistics for each method, best average cost first
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        let mut by_method: BTreeMap<&str, Vec<&AlgorithmResult>> = BTreeMap::new();
        for result in &self.results {
            by_method.entry(result.method.as_str()).or_default().push(result);
        }

        let mut statistics: Vec<AlgorithmStatistics> = by_method
            .into_iter()
            .map(|(method, results)| {
                let n = results.len() as f64;
                AlgorithmStatistics {
                    method: method.to_string(),
                    num_instances: results.len(),
                    num_feasible: results.iter().filter(|r| r.feasible).count(),
                    avg_cost: results.iter().map(|r| r.cost as f64).sum::<f64>() / n,
                    best_cost: results.iter().map(|r| r.cost).min().unwrap_or(0),
                    worst_cost: results.iter().map(|r| r.cost).max().unwrap_or(0),
                    avg_gap: results.iter().filter_map(|r| r.gap_to_best).sum::<f64>() / n,
                    avg_time: results.iter().map(|r| r.time).sum::<f64>() / n,
                    avg_time_best: results.iter().map(|r| r.time_best).sum::<f64>() / n,
                }
            })
            .collect();

        statistics.sort_by_key(|s| OrderedFloat(s.avg_cost));
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

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Append every result to a run log
    pub fn append_records<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        for result in &self.results {
            append_record(path, &result.record())?;
        }
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("        CVRP Benchmark Report\n");
        report.push_str("========================================\n\n");

        report.push_str("Method Performance Summary:\n");
        report.push_str(&"-".repeat(86));
        report.push('\n');
        report.push_str(&format!(
            "{:<12} {:>10} {:>12} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "Method", "Feasible", "Avg Cost", "Best", "Worst", "Avg Gap%", "Avg Time", "To Best"
        ));
        report.push_str(&"-".repeat(86));
        report.push('\n');

        for stat in self.compute_statistics() {
            report.push_str(&format!(
                "{:<12} {:>10} {:>12.2} {:>10} {:>10} {:>10.2} {:>10.4} {:>10.4}\n",
                stat.method,
                format!("{}/{}", stat.num_feasible, stat.num_instances),
                stat.avg_cost,
                stat.best_cost,
                stat.worst_cost,
                stat.avg_gap,
                stat.avg_time,
                stat.avg_time_best
            ));
        }

        report.push_str(&"-".repeat(86));
        report.push('\n');

        report.push_str("\nBest Solutions per Instance:\n");
        let mut instance_best: BTreeMap<usize, &AlgorithmResult> = BTreeMap::new();
        for result in self.results.iter().filter(|r| r.feasible) {
            let entry = instance_best.entry(result.instance_index).or_insert(result);
            if result.cost < entry.cost {
                *entry = result;
            }
        }
        for (index, best) in &instance_best {
            report.push_str(&format!("  [{}] {}: {} ({})\n", index, best.instance, best.cost, best.method));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }
}

/// Gap of each result to the best feasible cost on its instance
fn fill_gaps(results: &mut [AlgorithmResult]) {
    let mut best: HashMap<usize, i64> = HashMap::new();
    for r in results.iter().filter(|r| r.feasible) {
        let entry = best.entry(r.instance_index).or_insert(r.cost);
        *entry = (*entry).min(r.cost);
    }

    for r in results.iter_mut() {
        r.gap_to_best = best.get(&r.instance_index).map(|&b| {
            if b > 0 {
                (r.cost - b) as f64 / b as f64 * 100.0
            } else {
                0.0
            }
        });
    }
}

/// `.vrp` files in `dir`, sorted by file name
pub fn instance_paths<P: AsRef<Path>>(dir: P) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "vrp").unwrap_or(false))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Helper function to load instances from a directory
pub fn load_instances_from_dir<P: AsRef<Path>>(dir: P) -> Vec<CvrpInstance> {
    let paths = match instance_paths(&dir) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("Cannot read {}: {}", dir.as_ref().display(), e);
            return Vec::new();
        }
    };

    paths
        .iter()
        .filter_map(|path| match CvrpInstance::from_file(path) {
            Ok(instance) => Some(instance),
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// One point of a performance profile curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfilePoint {
    /// Ratio of the method's value to the best value on the instance
    pub tau: f64,
    /// Percentage of instances solved within `tau`
    pub cumulative: f64,
}

/// Performance profile of each constructor over a run log.
///
/// Runs are ranked by `value / best value on the instance`; each one adds
/// `100 / #instances` percent to its constructor's running total, and the
/// curve keeps the highest total reached at each ratio.
pub fn performance_profile(records: &[RunRecord]) -> BTreeMap<String, Vec<ProfilePoint>> {
    let mut best: HashMap<usize, i64> = HashMap::new();
    for r in records {
        let entry = best.entry(r.instance).or_insert(r.value);
        *entry = (*entry).min(r.value);
    }
    if best.is_empty() {
        return BTreeMap::new();
    }
    let share = 100.0 / best.len() as f64;

    let mut ratios: Vec<(&str, f64)> = records
        .iter()
        .map(|r| {
            let min = best[&r.instance];
            let tau = if min > 0 {
                r.value as f64 / min as f64
            } else if r.value == min {
                1.0
            } else {
                f64::INFINITY
            };
            (r.constructor.as_str(), tau)
        })
        .collect();
    ratios.sort_by_key(|&(_, tau)| OrderedFloat(tau));

    let mut running: HashMap<&str, f64> = HashMap::new();
    let mut curves: BTreeMap<String, BTreeMap<OrderedFloat<f64>, f64>> = BTreeMap::new();
    for (method, tau) in ratios {
        let total = running.entry(method).or_insert(0.0);
        *total += share;
        let point = curves
            .entry(method.to_string())
            .or_default()
            .entry(OrderedFloat(tau))
            .or_insert(*total);
        *point = point.max(*total);
    }

    curves
        .into_iter()
        .map(|(method, curve)| {
            let points = curve
                .into_iter()
                .map(|(tau, cumulative)| ProfilePoint { tau: tau.into_inner(), cumulative })
                .collect();
            (method, points)
        })
        .collect()
}

/// Render a profile as one `method:\n(tau,cum)(tau,cum)...` block per method
pub fn format_profile(profile: &BTreeMap<String, Vec<ProfilePoint>>) -> String {
    let mut out = String::new();
    for (method, points) in profile {
        out.push_str(method);
        out.push_str(":\n");
        for p in points {
            out.push_str(&format!("({},{})", p.tau, p.cumulative));
        }
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(instance: usize, constructor: &str, value: i64) -> RunRecord {
        RunRecord {
            instance,
            constructor: constructor.to_string(),
            time: 0.5,
            value,
            time_best: 0.25,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("cvrp-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.methods.len(), 3);
        assert_eq!(config.search_config().time_limit, 60.0);
        assert_eq!(config.search_config().max_iterations, None);
    }

    #[test]
    fn test_records_append_with_single_header() {
        let path = temp_path("records.csv");

        append_record(&path, &record(0, "savings", 784)).unwrap();
        append_record(&path, &record(1, "sweep", 1032)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "instance;constructor;time;value;time_best");
        assert_eq!(lines[1], "0;savings;0.5;784;0.25");
        assert_eq!(lines.len(), 3);

        let loaded = load_records(&path).unwrap();
        assert_eq!(loaded, vec![record(0, "savings", 784), record(1, "sweep", 1032)]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_performance_profile() {
        let records = vec![
            record(0, "a", 100),
            record(0, "b", 110),
            record(1, "a", 120),
            record(1, "b", 100),
        ];

        let profile = performance_profile(&records);

        assert_eq!(
            profile["a"],
            vec![
                ProfilePoint { tau: 1.0, cumulative: 50.0 },
                ProfilePoint { tau: 1.2, cumulative: 100.0 },
            ]
        );
        assert_eq!(
            profile["b"],
            vec![
                ProfilePoint { tau: 1.0, cumulative: 50.0 },
                ProfilePoint { tau: 1.1, cumulative: 100.0 },
            ]
        );
        assert_eq!(format_profile(&profile), "a:\n(1,50)(1.2,100)\n\nb:\n(1,50)(1.1,100)\n\n");
    }

    #[test]
    fn test_profile_keeps_highest_total_per_ratio() {
        let records = vec![record(0, "a", 10), record(1, "a", 20), record(1, "b", 20)];

        let profile = performance_profile(&records);

        assert_eq!(profile["a"], vec![ProfilePoint { tau: 1.0, cumulative: 100.0 }]);
        assert_eq!(profile["b"], vec![ProfilePoint { tau: 1.0, cumulative: 50.0 }]);
        assert!(performance_profile(&[]).is_empty());
    }

    #[test]
    fn test_solve_pipeline() {
        let instance = CvrpInstance::random("rand", 20, 40, 12, 9);
        let config = LocalSearchConfig::default();

        let outcome = solve(&instance, ConstructionMethod::Insertion, 1.0, &config);

        assert!(outcome.solution.feasible);
        assert!(outcome.solution.cost <= outcome.initial_cost);
        assert!(outcome.time_best <= outcome.time);
        assert_eq!(outcome.termination, Termination::LocalOptimum);

        let record = outcome.record(3);
        assert_eq!(record.instance, 3);
        assert_eq!(record.constructor, "insertion");
        assert_eq!(record.value, outcome.solution.cost);
    }

    #[test]
    fn test_benchmark_run() {
        let instances: Vec<CvrpInstance> = (0..2)
            .map(|seed| CvrpInstance::random(&format!("rand{}", seed), 12, 30, 10, seed))
            .collect();
        let config = BenchmarkConfig {
            time_limit: 10.0,
            parallel: false,
            ..Default::default()
        };
        let mut benchmark = Benchmark::new(config);

        benchmark.run_on_instances(&instances);

        assert_eq!(benchmark.results().len(), 6);
        for index in 0..2 {
            let gaps: Vec<f64> = benchmark
                .results()
                .iter()
                .filter(|r| r.instance_index == index)
                .filter_map(|r| r.gap_to_best)
                .collect();
            assert_eq!(gaps.len(), 3);
            assert!(gaps.iter().all(|&g| g >= 0.0));
            assert!(gaps.iter().any(|&g| g == 0.0));
        }

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 3);
        assert!(stats.iter().all(|s| s.num_instances == 2 && s.num_feasible == 2));
        assert!(benchmark.generate_report().contains("Best Solutions per Instance"));
    }

    #[test]
    fn test_instance_paths_sorted_by_name() {
        let dir = std::env::temp_dir().join(format!("cvrp-dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, seed) in [("b.vrp", 1), ("a.vrp", 2)] {
            let text = CvrpInstance::random(name, 5, 20, 5, seed).to_vrp_string();
            std::fs::write(dir.join(name), text).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let paths = instance_paths(&dir).unwrap();
        let names: Vec<_> = paths.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["a.vrp", "b.vrp"]);
        assert_eq!(load_instances_from_dir(&dir).len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

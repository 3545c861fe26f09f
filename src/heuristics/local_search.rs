//! Local search improvement for CVRP.
//!
//! A best-improvement descent over five neighborhoods, guarded by a
//! recency-based tabu list:
//! - Reinsertion of a customer into another route
//! - 2-opt segment reversal within a route
//! - Swap of two customers within a route
//! - Swap of two customers across routes
//! - Break of a route into two
//!
//! Every move is delta-evaluated from the handful of edges it touches; the
//! full solution cost is never recomputed inside the loop.

use crate::instance::CvrpInstance;
use crate::solution::{Route, Solution};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trait for local search improvement methods
pub trait LocalSearch {
    fn improve(&self, instance: &CvrpInstance, solution: &mut Solution) -> bool;
    fn name(&self) -> &str;
}

/// Fixed-capacity FIFO of recently touched nodes.
///
/// Every accepted move occupies two slots (an untouched slot is `None`), so a
/// node stays tabu for `capacity / 2` moves.
#[derive(Debug, Clone)]
pub struct TabuList {
    slots: VecDeque<Option<usize>>,
    capacity: usize,
}

impl TabuList {
    pub fn new(capacity: usize) -> Self {
        TabuList {
            slots: std::iter::repeat(None).take(capacity).collect(),
            capacity,
        }
    }

    /// Tabu list sized `2 * ceil(sqrt(n))` for an instance with `n` nodes
    pub fn for_dimension(dimension: usize) -> Self {
        Self::new(2 * (dimension as f64).sqrt().ceil() as usize)
    }

    pub fn contains(&self, node: usize) -> bool {
        self.slots.contains(&Some(node))
    }

    /// Push one slot, dropping the oldest when full
    pub fn push(&mut self, entry: Option<usize>) {
        if self.capacity == 0 {
            return;
        }
        while self.slots.len() >= self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(entry);
    }

    /// Record the nodes touched by one accepted move
    pub fn record(&mut self, touched: [Option<usize>; 2]) {
        for entry in touched {
            self.push(entry);
        }
    }

    /// Nodes currently tabu, oldest first
    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A neighborhood move, addressed by route index and position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Move `routes[from].nodes[pos]` to position `dest` of `routes[to]`
    Reinsertion { from: usize, pos: usize, to: usize, dest: usize },
    /// Reverse `nodes[i..=j]` of one route
    TwoOpt { route: usize, i: usize, j: usize },
    /// Exchange positions `i` and `j` of one route
    IntraSwap { route: usize, i: usize, j: usize },
    /// Exchange `routes[first].nodes[i]` with `routes[second].nodes[j]`
    InterSwap { first: usize, i: usize, second: usize, j: usize },
    /// Split the route before `pos`; the suffix becomes a new route
    BreakRoute { route: usize, pos: usize },
}

impl Move {
    pub fn kind(&self) -> &'static str {
        match self {
            Move::Reinsertion { .. } => "reinsertion",
            Move::TwoOpt { .. } => "2-opt",
            Move::IntraSwap { .. } => "intra-swap",
            Move::InterSwap { .. } => "inter-swap",
            Move::BreakRoute { .. } => "break-route",
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Move::Reinsertion { from, pos, to, dest } => {
                write!(f, "reinsertion r{}[{}] -> r{}[{}]", from, pos, to, dest)
            }
            Move::TwoOpt { route, i, j } => write!(f, "2-opt r{}[{}..={}]", route, i, j),
            Move::IntraSwap { route, i, j } => write!(f, "intra-swap r{}[{}] <-> r{}[{}]", route, i, route, j),
            Move::InterSwap { first, i, second, j } => {
                write!(f, "inter-swap r{}[{}] <-> r{}[{}]", first, i, second, j)
            }
            Move::BreakRoute { route, pos } => write!(f, "break-route r{} at {}", route, pos),
        }
    }
}

/// A move together with its cost change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub mv: Move,
    pub delta: i64,
}

/// Mutable state of one local-search run.
///
/// Evaluators only read it; [`apply_move`] is the single place it changes.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub routes: Vec<Route>,
    pub tabu: TabuList,
}

impl SearchState {
    pub fn new(instance: &CvrpInstance, mut routes: Vec<Route>) -> Self {
        routes.retain(|r| !r.is_depot_only());
        SearchState {
            routes,
            tabu: TabuList::for_dimension(instance.dimension),
        }
    }

    /// Total cost recomputed from scratch
    pub fn cost(&self, instance: &CvrpInstance) -> i64 {
        self.routes.iter().map(|r| r.cost(&instance.distances)).sum()
    }
}

/// Cost change of unlinking `node` from between `prev` and `next`
#[inline]
fn removal_delta(instance: &CvrpInstance, prev: usize, node: usize, next: usize) -> i64 {
    instance.distance(prev, next) - instance.distance(prev, node) - instance.distance(node, next)
}

/// Cost change of linking `node` between `prev` and `next`
#[inline]
fn insertion_delta(instance: &CvrpInstance, prev: usize, node: usize, next: usize) -> i64 {
    instance.distance(prev, node) + instance.distance(node, next) - instance.distance(prev, next)
}

/// Keep the first strictly best candidate
#[inline]
fn consider(best: &mut Option<Candidate>, candidate: Candidate) {
    if best.map_or(true, |b| candidate.delta < b.delta) {
        *best = Some(candidate);
    }
}

fn scan_reinsertion(
    state: &SearchState,
    instance: &CvrpInstance,
    from: usize,
    to: usize,
    best: &mut Option<Candidate>,
) {
    let source = &state.routes[from];
    let target = &state.routes[to];
    let room = instance.capacity - target.load;

    for pos in 1..source.len() {
        let node = source.nodes[pos];
        if state.tabu.contains(node) || instance.demand(node) > room {
            continue;
        }
        let gap = removal_delta(instance, source.nodes[pos - 1], node, source.next(pos));

        for dest in 1..=target.len() {
            let prev = target.nodes[dest - 1];
            let next = target.nodes[dest % target.len()];
            consider(
                best,
                Candidate {
                    mv: Move::Reinsertion { from, pos, to, dest },
                    delta: gap + insertion_delta(instance, prev, node, next),
                },
            );
        }
    }
}

fn scan_two_opt(state: &SearchState, instance: &CvrpInstance, r: usize, best: &mut Option<Candidate>) {
    let route = &state.routes[r];
    let len = route.len();
    if len < 3 {
        return;
    }

    for i in 1..len - 1 {
        let first = route.nodes[i];
        if state.tabu.contains(first) {
            continue;
        }
        let prev = route.nodes[i - 1];
        for j in i + 1..len {
            // Reversing the whole route changes nothing
            if i == 1 && j == len - 1 {
                continue;
            }
            let last = route.nodes[j];
            if state.tabu.contains(last) {
                continue;
            }
            let next = route.next(j);
            let delta = instance.distance(prev, last) + instance.distance(first, next)
                - instance.distance(prev, first)
                - instance.distance(last, next);
            consider(best, Candidate { mv: Move::TwoOpt { route: r, i, j }, delta });
        }
    }
}

fn scan_intra_swap(state: &SearchState, instance: &CvrpInstance, r: usize, best: &mut Option<Candidate>) {
    let route = &state.routes[r];
    let len = route.len();

    for i in 1..len.saturating_sub(1) {
        let a = route.nodes[i];
        if state.tabu.contains(a) {
            continue;
        }
        let (prev_i, next_i) = (route.nodes[i - 1], route.next(i));
        for j in i + 2..len {
            let b = route.nodes[j];
            if state.tabu.contains(b) {
                continue;
            }
            let (prev_j, next_j) = (route.nodes[j - 1], route.next(j));
            let delta = removal_delta(instance, prev_i, a, next_i)
                + insertion_delta(instance, prev_j, a, next_j)
                + removal_delta(instance, prev_j, b, next_j)
                + insertion_delta(instance, prev_i, b, next_i);
            consider(best, Candidate { mv: Move::IntraSwap { route: r, i, j }, delta });
        }
    }
}

fn scan_inter_swap(
    state: &SearchState,
    instance: &CvrpInstance,
    first: usize,
    second: usize,
    best: &mut Option<Candidate>,
) {
    let r1 = &state.routes[first];
    let r2 = &state.routes[second];

    for i in 1..r1.len() {
        let a = r1.nodes[i];
        if state.tabu.contains(a) {
            continue;
        }
        let (prev_1, next_1) = (r1.nodes[i - 1], r1.next(i));
        let demand_a = instance.demand(a);

        for j in 1..r2.len() {
            let b = r2.nodes[j];
            if state.tabu.contains(b) {
                continue;
            }
            let demand_b = instance.demand(b);
            if r1.load - demand_a + demand_b > instance.capacity
                || r2.load - demand_b + demand_a > instance.capacity
            {
                continue;
            }
            let (prev_2, next_2) = (r2.nodes[j - 1], r2.next(j));
            let delta = removal_delta(instance, prev_1, a, next_1)
                + insertion_delta(instance, prev_2, a, next_2)
                + removal_delta(instance, prev_2, b, next_2)
                + insertion_delta(instance, prev_1, b, next_1);
            consider(
                best,
                Candidate {
                    mv: Move::InterSwap { first, i, second, j },
                    delta,
                },
            );
        }
    }
}

fn scan_break_route(state: &SearchState, instance: &CvrpInstance, r: usize, best: &mut Option<Candidate>) {
    let route = &state.routes[r];

    for pos in 2..route.len() {
        let prev = route.nodes[pos - 1];
        let next = route.nodes[pos];
        if state.tabu.contains(next) {
            continue;
        }
        // prev now returns to the depot and next leaves from it; the old
        // closing edge stays with the suffix
        let delta = insertion_delta(instance, prev, 0, next);
        consider(best, Candidate { mv: Move::BreakRoute { route: r, pos }, delta });
    }
}

/// Best non-tabu, capacity-feasible move over all neighborhoods.
///
/// Ties go to the first candidate in the order reinsertion, 2-opt,
/// intra-swap, inter-swap, break-route.
pub fn select_move(state: &SearchState, instance: &CvrpInstance) -> Option<Candidate> {
    let mut best = None;
    let n = state.routes.len();

    for from in 0..n {
        for to in 0..n {
            if from != to {
                scan_reinsertion(state, instance, from, to, &mut best);
            }
        }
    }
    for r in 0..n {
        scan_two_opt(state, instance, r, &mut best);
    }
    for r in 0..n {
        scan_intra_swap(state, instance, r, &mut best);
    }
    for first in 0..n {
        for second in first + 1..n {
            scan_inter_swap(state, instance, first, second, &mut best);
        }
    }
    for r in 0..n {
        scan_break_route(state, instance, r, &mut best);
    }

    best
}

/// Apply a move, update route loads by its demand change and mark the
/// touched nodes tabu.
pub fn apply_move(state: &mut SearchState, instance: &CvrpInstance, mv: Move) {
    let touched = match mv {
        Move::Reinsertion { from, pos, to, dest } => {
            let node = state.routes[from].nodes.remove(pos);
            let demand = instance.demand(node);
            state.routes[from].load -= demand;
            state.routes[to].nodes.insert(dest, node);
            state.routes[to].load += demand;
            if state.routes[from].is_depot_only() {
                state.routes.remove(from);
            }
            [Some(node), None]
        }
        Move::TwoOpt { route, i, j } => {
            let nodes = &mut state.routes[route].nodes;
            let touched = [Some(nodes[i]), Some(nodes[j])];
            nodes[i..=j].reverse();
            touched
        }
        Move::IntraSwap { route, i, j } => {
            let nodes = &mut state.routes[route].nodes;
            let touched = [Some(nodes[i]), Some(nodes[j])];
            nodes.swap(i, j);
            touched
        }
        Move::InterSwap { first, i, second, j } => {
            let a = state.routes[first].nodes[i];
            let b = state.routes[second].nodes[j];
            let shift = instance.demand(b) - instance.demand(a);
            state.routes[first].nodes[i] = b;
            state.routes[first].load += shift;
            state.routes[second].nodes[j] = a;
            state.routes[second].load -= shift;
            [Some(a), Some(b)]
        }
        Move::BreakRoute { route, pos } => {
            let suffix = state.routes[route].nodes.split_off(pos);
            let moved: i32 = suffix.iter().map(|&c| instance.demand(c)).sum();
            state.routes[route].load -= moved;

            let touched = [suffix.first().copied(), suffix.last().copied()];
            let mut nodes = Vec::with_capacity(suffix.len() + 1);
            nodes.push(0);
            nodes.extend(suffix);
            state.routes.push(Route { nodes, load: moved });
            touched
        }
    };

    state.tabu.record(touched);
}

/// Why a local-search run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// No evaluated move has a negative delta
    LocalOptimum,
    /// The wall-clock limit was reached
    TimeLimit,
    /// The iteration budget was used up
    IterationLimit,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::LocalOptimum => f.write_str("local optimum"),
            Termination::TimeLimit => f.write_str("time limit"),
            Termination::IterationLimit => f.write_str("iteration limit"),
        }
    }
}

/// Result of a local-search run
#[derive(Debug, Clone)]
pub struct LocalSearchOutcome {
    pub solution: Solution,
    pub total_cost: i64,
    /// Seconds since the caller's start time when the best solution was reached
    pub time_of_best: f64,
    /// Seconds since the caller's start time when the search stopped
    pub elapsed: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// Local search configuration
#[derive(Debug, Clone)]
pub struct LocalSearchConfig {
    /// Wall-clock limit in seconds, measured from the caller's start time
    pub time_limit: f64,
    /// Optional cap on accepted moves
    pub max_iterations: Option<usize>,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        LocalSearchConfig {
            time_limit: 60.0,
            max_iterations: None,
        }
    }
}

/// Tabu-guided best-improvement local search
pub struct TabuLocalSearch {
    pub config: LocalSearchConfig,
}

impl TabuLocalSearch {
    pub fn new() -> Self {
        TabuLocalSearch {
            config: LocalSearchConfig::default(),
        }
    }

    pub fn with_config(config: LocalSearchConfig) -> Self {
        TabuLocalSearch { config }
    }

    /// Improve `solution` until a local optimum or a budget is hit.
    ///
    /// The deadline is checked between iterations only; an iteration that
    /// has started always finishes.
    pub fn run(&self, instance: &CvrpInstance, solution: Solution, start: Instant) -> LocalSearchOutcome {
        let time_limit = Duration::from_secs_f64(self.config.time_limit.max(0.0));
        let algorithm = format!("{}+{}", solution.algorithm, self.name());

        let mut state = SearchState::new(instance, solution.routes);
        let mut cost = state.cost(instance);
        let mut time_of_best = start.elapsed();
        let mut iterations = 0usize;

        let termination = loop {
            if start.elapsed() >= time_limit {
                break Termination::TimeLimit;
            }
            if self.config.max_iterations.map_or(false, |max| iterations >= max) {
                break Termination::IterationLimit;
            }

            let candidate = match select_move(&state, instance) {
                Some(c) if c.delta < 0 => c,
                _ => break Termination::LocalOptimum,
            };

            apply_move(&mut state, instance, candidate.mv);
            cost += candidate.delta;
            iterations += 1;
            time_of_best = start.elapsed();

            log::debug!(
                "iteration {}: {} (delta {}), cost {}, {} routes",
                iterations,
                candidate.mv,
                candidate.delta,
                cost,
                state.routes.len()
            );
            debug_assert_eq!(cost, state.cost(instance), "{} delta disagrees with the recomputed cost", candidate.mv);
        };

        let elapsed = start.elapsed();
        log::info!(
            "local search stopped ({}) after {} iterations: cost {}, {} routes",
            termination,
            iterations,
            cost,
            state.routes.len()
        );

        let mut improved = Solution::from_routes(instance, state.routes, &algorithm);
        improved.computation_time = elapsed.as_secs_f64();
        improved.iterations = Some(iterations);
        debug_assert!(improved.is_complete(instance));
        debug_assert_eq!(improved.cost, cost);

        LocalSearchOutcome {
            total_cost: improved.cost,
            solution: improved,
            time_of_best: time_of_best.as_secs_f64(),
            elapsed: elapsed.as_secs_f64(),
            iterations,
            termination,
        }
    }
}

impl Default for TabuLocalSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for TabuLocalSearch {
    fn improve(&self, instance: &CvrpInstance, solution: &mut Solution) -> bool {
        let before = solution.total_cost(&instance.distances);
        let outcome = self.run(instance, std::mem::take(solution), Instant::now());
        *solution = outcome.solution;
        solution.cost < before
    }

    fn name(&self) -> &str {
        "TabuLocalSearch"
    }
}

/// Run the local search on `solution` with a deadline of `time_limit` after
/// `start_time`.
pub fn local_search(
    solution: Solution,
    instance: &CvrpInstance,
    start_time: Instant,
    time_limit: Duration,
) -> LocalSearchOutcome {
    let config = LocalSearchConfig {
        time_limit: time_limit.as_secs_f64(),
        ..LocalSearchConfig::default()
    };
    TabuLocalSearch::with_config(config).run(instance, solution, start_time)
}

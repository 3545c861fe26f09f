//! Construction heuristics for CVRP.
//!
//! Three mutually exclusive ways to build an initial feasible solution:
//! - Clarke-Wright savings with endpoint merging
//! - Mole & Jameson sequential insertion
//! - Polar sweep around the depot

use crate::instance::CvrpInstance;
use crate::solution::{Route, Solution};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

pub trait ConstructionHeuristic {
    fn construct(&self, instance: &CvrpInstance) -> Solution;
    fn name(&self) -> &str;
}

/// Identifier of a construction heuristic, as recorded in result files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructionMethod {
    Savings,
    Insertion,
    Sweep,
}

impl ConstructionMethod {
    pub const ALL: [ConstructionMethod; 3] = [
        ConstructionMethod::Savings,
        ConstructionMethod::Insertion,
        ConstructionMethod::Sweep,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ConstructionMethod::Savings => "savings",
            ConstructionMethod::Insertion => "insertion",
            ConstructionMethod::Sweep => "sweep",
        }
    }

    /// Heuristic implementing this method; `lambda` only affects insertion
    pub fn heuristic(&self, lambda: f64) -> Box<dyn ConstructionHeuristic + Send + Sync> {
        match self {
            ConstructionMethod::Savings => Box::new(SavingsHeuristic::new()),
            ConstructionMethod::Insertion => Box::new(InsertionHeuristic::with_lambda(lambda)),
            ConstructionMethod::Sweep => Box::new(SweepHeuristic::new()),
        }
    }
}

impl std::fmt::Display for ConstructionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ConstructionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConstructionMethod::ALL
            .into_iter()
            .find(|m| m.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown construction method: {}", s))
    }
}

fn finish(instance: &CvrpInstance, routes: Vec<Route>, name: &str, start: std::time::Instant) -> Solution {
    let mut solution = Solution::from_routes(instance, routes, name);
    solution.computation_time = start.elapsed().as_secs_f64();

    debug_assert!(
        solution.is_complete(instance),
        "{} must serve every customer exactly once",
        name
    );
    log::debug!(
        "{}: {} routes, cost {}, feasible {}",
        name,
        solution.routes.len(),
        solution.cost,
        solution.feasible
    );

    solution
}

/// Which end of a partial route a customer sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteEnd {
    Head,
    Tail,
}

/// Immutable partial route used while merging savings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteDescriptor {
    customers: Vec<usize>,
    load: i32,
}

impl RouteDescriptor {
    fn singleton(instance: &CvrpInstance, customer: usize) -> Self {
        RouteDescriptor {
            customers: vec![customer],
            load: instance.demand(customer),
        }
    }

    /// End the customer sits on, or `None` for an interior customer
    fn end_of(&self, customer: usize) -> Option<RouteEnd> {
        if self.customers.last() == Some(&customer) {
            Some(RouteEnd::Tail)
        } else if self.customers.first() == Some(&customer) {
            Some(RouteEnd::Head)
        } else {
            None
        }
    }

    /// Concatenate `a` and `b` so that the customer at `a_end` of `a` is
    /// followed by the customer at `b_end` of `b`.
    fn merge(a: &Self, a_end: RouteEnd, b: &Self, b_end: RouteEnd) -> Self {
        let mut customers = Vec::with_capacity(a.customers.len() + b.customers.len());
        match a_end {
            RouteEnd::Tail => customers.extend(a.customers.iter().copied()),
            RouteEnd::Head => customers.extend(a.customers.iter().rev().copied()),
        }
        match b_end {
            RouteEnd::Head => customers.extend(b.customers.iter().copied()),
            RouteEnd::Tail => customers.extend(b.customers.iter().rev().copied()),
        }
        RouteDescriptor {
            customers,
            load: a.load + b.load,
        }
    }
}

/// Routes indexed by stable ids plus the customer → route id map.
/// Retired ids are left as `None`.
struct RouteArena {
    routes: Vec<Option<RouteDescriptor>>,
    route_of: Vec<usize>,
}

impl RouteArena {
    fn singletons(instance: &CvrpInstance) -> Self {
        let mut routes = Vec::with_capacity(2 * instance.dimension);
        let mut route_of = vec![usize::MAX; instance.dimension];
        for c in instance.customers() {
            route_of[c] = routes.len();
            routes.push(Some(RouteDescriptor::singleton(instance, c)));
        }
        RouteArena { routes, route_of }
    }

    fn get(&self, id: usize) -> Option<&RouteDescriptor> {
        self.routes.get(id).and_then(|r| r.as_ref())
    }

    /// Retire `a` and `b` and hand every customer of `merged` its new id
    fn replace(&mut self, a: usize, b: usize, merged: RouteDescriptor) {
        let id = self.routes.len();
        for &c in &merged.customers {
            self.route_of[c] = id;
        }
        self.routes[a] = None;
        self.routes[b] = None;
        self.routes.push(Some(merged));
    }

    /// Distinct live routes, in order of their lowest customer id
    fn into_routes(self, instance: &CvrpInstance) -> Vec<Route> {
        let mut emitted = vec![false; self.routes.len()];
        let mut routes = Vec::new();
        for c in instance.customers() {
            let id = self.route_of[c];
            if emitted[id] {
                continue;
            }
            emitted[id] = true;
            if let Some(desc) = self.get(id) {
                routes.push(Route::from_customers(instance, &desc.customers));
            }
        }
        routes
    }
}

#[derive(Debug, Clone, Copy)]
struct Saving {
    i: usize,
    j: usize,
    value: i64,
}

/// Clarke-Wright Savings Algorithm
///
/// Starts from one route per customer and merges route endpoints in
/// decreasing order of savings while respecting capacity.
pub struct SavingsHeuristic;

impl SavingsHeuristic {
    pub fn new() -> Self {
        SavingsHeuristic
    }

    /// Calculate savings for serving `i` and `j` on one route
    fn saving(&self, instance: &CvrpInstance, i: usize, j: usize) -> i64 {
        instance.distance(0, i) + instance.distance(0, j) - instance.distance(i, j)
    }

    /// Non-negative savings, largest first; ties keep `(i, j)` order.
    fn sorted_savings(&self, instance: &CvrpInstance) -> Vec<Saving> {
        let n = instance.dimension;
        let mut savings = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 1..n {
            for j in i + 1..n {
                let value = self.saving(instance, i, j);
                // Zero savings still remove a vehicle
                if value >= 0 {
                    savings.push(Saving { i, j, value });
                }
            }
        }
        savings.sort_by_key(|s| Reverse(s.value));
        savings
    }
}

impl Default for SavingsHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for SavingsHeuristic {
    fn construct(&self, instance: &CvrpInstance) -> Solution {
        let start = std::time::Instant::now();
        let mut arena = RouteArena::singletons(instance);

        for saving in self.sorted_savings(instance) {
            let ri = arena.route_of[saving.i];
            let rj = arena.route_of[saving.j];
            if ri == rj {
                continue;
            }

            let (Some(a), Some(b)) = (arena.get(ri), arena.get(rj)) else {
                continue;
            };
            let (Some(a_end), Some(b_end)) = (a.end_of(saving.i), b.end_of(saving.j)) else {
                continue;
            };
            if a.load + b.load > instance.capacity {
                continue;
            }

            // `i` must face `j`: leave `a` through its tail, enter `b` through its head
            let a_end = if a.customers.len() == 1 { RouteEnd::Tail } else { a_end };
            let b_end = if b.customers.len() == 1 { RouteEnd::Head } else { b_end };
            let merged = RouteDescriptor::merge(a, a_end, b, b_end);
            arena.replace(ri, rj, merged);
        }

        finish(instance, arena.into_routes(instance), self.name(), start)
    }

    fn name(&self) -> &str {
        "Savings-ClarkeWright"
    }
}

/// Sequential Insertion Heuristic (Mole & Jameson)
///
/// Seeds each route with the heaviest unrouted customer, then repeatedly
/// inserts the customer and slot with the lowest
/// `α(i,u,j) = d(i,u) + d(u,j) − λ·d(i,j)` until nothing else fits.
pub struct InsertionHeuristic {
    /// Weight of the edge broken by an insertion
    pub lambda: f64,
}

impl InsertionHeuristic {
    pub fn new() -> Self {
        InsertionHeuristic { lambda: 1.0 }
    }

    pub fn with_lambda(lambda: f64) -> Self {
        InsertionHeuristic { lambda }
    }

    fn alpha(&self, instance: &CvrpInstance, i: usize, u: usize, j: usize) -> f64 {
        (instance.distance(i, u) + instance.distance(u, j)) as f64
            - self.lambda * instance.distance(i, j) as f64
    }

    /// Cheapest feasible `(customer, insert position)` for the route.
    /// Slots lie strictly between consecutive stored nodes.
    fn best_insertion(
        &self,
        instance: &CvrpInstance,
        route: &Route,
        routed: &[bool],
    ) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;

        for u in instance.customers() {
            if routed[u] || route.load + instance.demand(u) > instance.capacity {
                continue;
            }
            for k in 0..route.len() - 1 {
                let cost = self.alpha(instance, route.nodes[k], u, route.nodes[k + 1]);
                if best.map_or(true, |(_, _, b)| cost < b) {
                    best = Some((u, k + 1, cost));
                }
            }
        }

        best.map(|(u, pos, _)| (u, pos))
    }
}

impl Default for InsertionHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for InsertionHeuristic {
    fn construct(&self, instance: &CvrpInstance) -> Solution {
        let start = std::time::Instant::now();

        let mut routed = vec![false; instance.dimension];
        let mut routes = Vec::new();

        // Heaviest unrouted customer, lowest id on ties
        while let Some(seed) = instance
            .customers()
            .filter(|&c| !routed[c])
            .max_by_key(|&c| (instance.demand(c), Reverse(c)))
        {
            let mut route = Route::with_customer(instance, seed);
            routed[seed] = true;

            while let Some((u, pos)) = self.best_insertion(instance, &route, &routed) {
                route.nodes.insert(pos, u);
                route.load += instance.demand(u);
                routed[u] = true;
            }

            routes.push(route);
        }

        finish(instance, routes, self.name(), start)
    }

    fn name(&self) -> &str {
        "Insertion-MoleJameson"
    }
}

/// Sweep Algorithm
///
/// Sorts customers by polar angle around the depot and cuts the sequence
/// into routes whenever the next customer would overflow the vehicle.
pub struct SweepHeuristic {
    /// Starting angle for the sweep
    pub start_angle: f64,
}

impl SweepHeuristic {
    pub fn new() -> Self {
        SweepHeuristic { start_angle: 0.0 }
    }

    pub fn with_start_angle(angle: f64) -> Self {
        SweepHeuristic { start_angle: angle }
    }

    /// Calculate polar angle from depot to node, measured from `start_angle`
    fn polar_angle(&self, instance: &CvrpInstance, node: usize) -> f64 {
        let dx = instance.nodes[node].x - instance.nodes[0].x;
        let dy = instance.nodes[node].y - instance.nodes[0].y;
        let angle = dy.atan2(dx);

        let normalized = angle - self.start_angle;
        if normalized < 0.0 {
            normalized + 2.0 * std::f64::consts::PI
        } else {
            normalized
        }
    }
}

impl Default for SweepHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for SweepHeuristic {
    fn construct(&self, instance: &CvrpInstance) -> Solution {
        let start = std::time::Instant::now();

        let mut customers: Vec<usize> = instance.customers().collect();
        customers.sort_by_key(|&c| OrderedFloat(self.polar_angle(instance, c)));

        let mut routes = Vec::new();
        let mut current = Route::new();

        for c in customers {
            let demand = instance.demand(c);
            if !current.is_depot_only() && current.load + demand > instance.capacity {
                routes.push(std::mem::take(&mut current));
            }
            current.nodes.push(c);
            current.load += demand;
        }
        if !current.is_depot_only() {
            routes.push(current);
        }

        finish(instance, routes, self.name(), start)
    }

    fn name(&self) -> &str {
        "Sweep"
    }
}

/// Build a solution with the savings heuristic
pub fn construct_savings(instance: &CvrpInstance) -> Solution {
    SavingsHeuristic::new().construct(instance)
}

/// Build a solution with sequential insertion using edge weight `lambda`
pub fn construct_insertion(instance: &CvrpInstance, lambda: f64) -> Solution {
    InsertionHeuristic::with_lambda(lambda).construct(instance)
}

/// Build a solution with the sweep heuristic
pub fn construct_sweep(instance: &CvrpInstance) -> Solution {
    SweepHeuristic::new().construct(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_instance(capacity: i32) -> CvrpInstance {
        CvrpInstance::new(
            "square",
            vec![(0.0, 0.0), (0.0, 10.0), (10.0, 0.0), (10.0, 10.0)],
            vec![0, 5, 5, 5],
            capacity,
        )
    }

    fn polar(degrees: f64) -> (f64, f64) {
        let rad = degrees.to_radians();
        (10.0 * rad.cos(), 10.0 * rad.sin())
    }

    fn route_nodes(solution: &Solution) -> Vec<Vec<usize>> {
        solution.routes.iter().map(|r| r.nodes.clone()).collect()
    }

    #[test]
    fn test_savings_merges_everything_when_capacity_allows() {
        let instance = create_test_instance(20);
        let solution = construct_savings(&instance);

        assert!(solution.feasible);
        assert_eq!(route_nodes(&solution), vec![vec![0, 2, 3, 1]]);
        assert_eq!(solution.routes[0].load, 15);
        assert_eq!(solution.cost, 40);
    }

    #[test]
    fn test_savings_respects_capacity() {
        let instance = create_test_instance(8);
        let solution = construct_savings(&instance);

        assert!(solution.feasible);
        assert!(solution.routes.len() >= 2);
        assert!(solution.routes.iter().all(|r| r.load <= 8));
    }

    #[test]
    fn test_savings_skips_negative_savings() {
        // Flooring makes d(1,2) exceed d(0,1) + d(0,2)
        let instance = CvrpInstance::new(
            "collinear",
            vec![(0.0, 0.0), (0.9, 0.0), (-0.9, 0.0)],
            vec![0, 1, 1],
            10,
        );
        let heuristic = SavingsHeuristic::new();
        assert_eq!(heuristic.saving(&instance, 1, 2), -1);
        assert!(heuristic.sorted_savings(&instance).is_empty());

        let solution = heuristic.construct(&instance);
        assert_eq!(route_nodes(&solution), vec![vec![0, 1], vec![0, 2]]);
    }

    #[test]
    fn test_savings_order_is_stable() {
        let instance = create_test_instance(20);
        let pairs: Vec<(usize, usize, i64)> = SavingsHeuristic::new()
            .sorted_savings(&instance)
            .iter()
            .map(|s| (s.i, s.j, s.value))
            .collect();

        assert_eq!(pairs, vec![(1, 3, 14), (2, 3, 14), (1, 2, 6)]);
    }

    #[test]
    fn test_descriptor_merge_orientation() {
        let a = RouteDescriptor { customers: vec![1, 2, 3], load: 3 };
        let b = RouteDescriptor { customers: vec![4, 5], load: 2 };

        assert_eq!(a.end_of(1), Some(RouteEnd::Head));
        assert_eq!(a.end_of(3), Some(RouteEnd::Tail));
        assert_eq!(a.end_of(2), None);

        let m = RouteDescriptor::merge(&a, RouteEnd::Head, &b, RouteEnd::Tail);
        assert_eq!(m.customers, vec![3, 2, 1, 5, 4]);
        assert_eq!(m.load, 5);

        let m = RouteDescriptor::merge(&a, RouteEnd::Tail, &b, RouteEnd::Head);
        assert_eq!(m.customers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_sweep_angular_order_and_split() {
        let instance = CvrpInstance::new(
            "sweep",
            vec![(0.0, 0.0), polar(190.0), polar(10.0), polar(350.0), polar(170.0)],
            vec![0, 3, 4, 6, 5],
            10,
        );
        let solution = construct_sweep(&instance);

        assert!(solution.feasible);
        assert_eq!(route_nodes(&solution), vec![vec![0, 2, 4], vec![0, 1, 3]]);
        assert_eq!(solution.routes[0].load, 9);
        assert_eq!(solution.routes[1].load, 9);
    }

    #[test]
    fn test_sweep_start_angle() {
        let instance = CvrpInstance::new(
            "sweep",
            vec![(0.0, 0.0), polar(190.0), polar(10.0), polar(350.0), polar(170.0)],
            vec![0, 3, 4, 6, 5],
            10,
        );
        let solution = SweepHeuristic::with_start_angle(-std::f64::consts::PI).construct(&instance);

        assert_eq!(route_nodes(&solution), vec![vec![0, 1, 3], vec![0, 2, 4]]);
    }

    #[test]
    fn test_insertion_seeds_with_largest_demand() {
        let instance = CvrpInstance::new(
            "insertion",
            vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (-10.0, 0.0)],
            vec![0, 3, 7, 5],
            10,
        );
        let solution = construct_insertion(&instance, 1.0);

        assert!(solution.feasible);
        assert_eq!(solution.routes[0].nodes[..], [0, 1, 2]);
        assert_eq!(solution.routes[0].load, 10);
        assert_eq!(route_nodes(&solution)[1], vec![0, 3]);
    }

    #[test]
    fn test_insertion_picks_cheapest_alpha() {
        // Seed is node 3 (heaviest); node 1 lies on the segment depot-3
        let instance = CvrpInstance::new(
            "line",
            vec![(0.0, 0.0), (5.0, 0.0), (0.0, 30.0), (10.0, 0.0)],
            vec![0, 1, 1, 2],
            3,
        );
        let solution = construct_insertion(&instance, 1.0);

        assert_eq!(route_nodes(&solution), vec![vec![0, 1, 3], vec![0, 2]]);
    }

    #[test]
    fn test_method_ids() {
        for method in ConstructionMethod::ALL {
            assert_eq!(method.id().parse::<ConstructionMethod>().unwrap(), method);
        }
        assert!("clarke".parse::<ConstructionMethod>().is_err());
        assert_eq!(ConstructionMethod::Sweep.heuristic(1.0).name(), "Sweep");
    }

    #[test]
    fn test_random_instances_stay_feasible() {
        for seed in 0..6 {
            let instance = CvrpInstance::random("rand", 30, 50, 20, seed);
            for method in ConstructionMethod::ALL {
                let solution = method.heuristic(1.0).construct(&instance);
                assert_eq!(solution.check_invariants(&instance), Ok(()), "{} seed {}", method, seed);
                assert_eq!(solution.cost, solution.total_cost(&instance.distances));
            }
        }
    }
}

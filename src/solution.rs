//! Solution representation and manipulation for CVRP.
//!
//! This module provides data structures and methods for representing,
//! manipulating, and evaluating solutions to the CVRP.

use crate::distance::DistanceMatrix;
use crate::instance::CvrpInstance;
use serde::{Deserialize, Serialize};

/// A single vehicle route.
///
/// Stored as the open path `[0, c1, ..., ck]`; the return to the depot after
/// `ck` is implicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Node sequence, depot first
    pub nodes: Vec<usize>,
    /// Sum of the customer demands on this route
    pub load: i32,
}

impl Route {
    /// Create a depot-only route
    pub fn new() -> Self {
        Route { nodes: vec![0], load: 0 }
    }

    /// Create the route `[0, customer]`
    pub fn with_customer(instance: &CvrpInstance, customer: usize) -> Self {
        Route {
            nodes: vec![0, customer],
            load: instance.demand(customer),
        }
    }

    /// Create a route from its customers, computing the load
    pub fn from_customers(instance: &CvrpInstance, customers: &[usize]) -> Self {
        let mut nodes = Vec::with_capacity(customers.len() + 1);
        nodes.push(0);
        nodes.extend_from_slice(customers);
        let load = customers.iter().map(|&c| instance.demand(c)).sum();
        Route { nodes, load }
    }

    /// Customers served by this route, in visiting order
    pub fn customers(&self) -> &[usize] {
        &self.nodes[1..]
    }

    /// Length of the stored path, depot included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the route serves no customer
    pub fn is_depot_only(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Successor of position `pos` on the closed tour
    #[inline]
    pub fn next(&self, pos: usize) -> usize {
        self.nodes[(pos + 1) % self.nodes.len()]
    }

    /// Cost of the closed tour, including the return to the depot
    pub fn cost(&self, distances: &DistanceMatrix) -> i64 {
        if self.nodes.len() < 2 {
            return 0;
        }
        let mut cost = 0;
        for w in self.nodes.windows(2) {
            cost += distances.get(w[0], w[1]);
        }
        cost + distances.get(self.nodes[self.nodes.len() - 1], self.nodes[0])
    }

    /// Load recomputed from the demands
    pub fn recompute_load(&self, instance: &CvrpInstance) -> i32 {
        self.customers().iter().map(|&c| instance.demand(c)).sum()
    }
}

impl Default for Route {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents a solution to the CVRP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Vehicle routes
    pub routes: Vec<Route>,
    /// Total travelled distance
    pub cost: i64,
    /// Whether the solution is feasible and covers every customer once
    pub feasible: bool,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Solution {
    /// Create a new empty solution
    pub fn new() -> Self {
        Solution {
            routes: Vec::new(),
            cost: 0,
            feasible: false,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create a solution from routes
    pub fn from_routes(instance: &CvrpInstance, routes: Vec<Route>, algorithm: &str) -> Self {
        let mut solution = Solution {
            routes,
            algorithm: algorithm.to_string(),
            ..Solution::new()
        };
        solution.validate(instance);
        solution
    }

    /// Validate and update solution properties
    pub fn validate(&mut self, instance: &CvrpInstance) {
        self.cost = self.total_cost(&instance.distances);
        self.feasible = self.check_invariants(instance).is_ok();
    }

    /// Sum of all route costs, recomputed from scratch
    pub fn total_cost(&self, distances: &DistanceMatrix) -> i64 {
        self.routes.iter().map(|r| r.cost(distances)).sum()
    }

    /// Number of vehicles used
    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    /// Check every structural invariant of a CVRP solution:
    /// depot heads every route and appears nowhere else, no route is empty,
    /// tracked loads match demands and respect capacity, and every customer
    /// is served exactly once.
    pub fn check_invariants(&self, instance: &CvrpInstance) -> Result<(), String> {
        let mut seen = vec![false; instance.dimension];

        for (r, route) in self.routes.iter().enumerate() {
            if route.nodes.first() != Some(&0) {
                return Err(format!("route {} does not start at the depot", r));
            }
            if route.is_depot_only() {
                return Err(format!("route {} serves no customer", r));
            }
            for &node in route.customers() {
                if node == 0 {
                    return Err(format!("route {} visits the depot twice", r));
                }
                if node >= instance.dimension {
                    return Err(format!("route {} visits unknown node {}", r, node));
                }
                if seen[node] {
                    return Err(format!("customer {} is served more than once", node));
                }
                seen[node] = true;
            }

            let load = route.recompute_load(instance);
            if load != route.load {
                return Err(format!(
                    "route {} tracks load {} but its demands sum to {}",
                    r, route.load, load
                ));
            }
            if load > instance.capacity {
                return Err(format!(
                    "route {} carries {} over capacity {}",
                    r, load, instance.capacity
                ));
            }
        }

        if let Some(missing) = instance.customers().find(|&c| !seen[c]) {
            return Err(format!("customer {} is not served", missing));
        }

        Ok(())
    }

    /// Check if all customers are visited exactly once
    pub fn is_complete(&self, instance: &CvrpInstance) -> bool {
        let mut count = vec![0usize; instance.dimension];
        for route in &self.routes {
            for &c in route.customers() {
                if c < count.len() {
                    count[c] += 1;
                }
            }
        }
        instance.customers().all(|c| count[c] == 1)
    }

    /// Index of the route serving `customer`
    pub fn route_of(&self, customer: usize) -> Option<usize> {
        self.routes
            .iter()
            .position(|r| r.customers().contains(&customer))
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Cost: {}", self.cost)?;
        writeln!(f, "  Routes: {}", self.routes.len())?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        for (i, route) in self.routes.iter().enumerate() {
            writeln!(f, "  Route {} (load {}): {:?}", i + 1, route.load, route.nodes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_instance() -> CvrpInstance {
        CvrpInstance::new(
            "test",
            vec![(0.0, 0.0), (0.0, 10.0), (10.0, 0.0), (10.0, 10.0)],
            vec![0, 5, 5, 5],
            10,
        )
    }

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new();
        assert!(sol.routes.is_empty());
        assert!(!sol.feasible);
        assert_eq!(sol.cost, 0);
    }

    #[test]
    fn test_route_cost_includes_return() {
        let instance = create_test_instance();
        let route = Route::from_customers(&instance, &[1, 3]);

        assert_eq!(route.load, 10);
        assert_eq!(route.cost(&instance.distances), 10 + 10 + 14);
        assert_eq!(route.next(2), 0);
        assert_eq!(Route::new().cost(&instance.distances), 0);
    }

    #[test]
    fn test_feasible_solution() {
        let instance = create_test_instance();
        let routes = vec![
            Route::from_customers(&instance, &[1, 3]),
            Route::with_customer(&instance, 2),
        ];
        let sol = Solution::from_routes(&instance, routes, "test");

        assert!(sol.feasible);
        assert!(sol.is_complete(&instance));
        assert_eq!(sol.cost, 34 + 20);
        assert_eq!(sol.route_of(3), Some(0));
        assert_eq!(sol.route_of(2), Some(1));
    }

    #[test]
    fn test_invariant_violations() {
        let instance = create_test_instance();

        let over = Solution::from_routes(&instance, vec![Route::from_customers(&instance, &[1, 2, 3])], "over");
        assert!(over.check_invariants(&instance).unwrap_err().contains("capacity"));

        let missing = Solution::from_routes(&instance, vec![Route::from_customers(&instance, &[1, 2])], "missing");
        assert!(missing.check_invariants(&instance).unwrap_err().contains("not served"));
        assert!(!missing.is_complete(&instance));

        let twice = Solution::from_routes(
            &instance,
            vec![
                Route::from_customers(&instance, &[1, 2]),
                Route::from_customers(&instance, &[2, 3]),
            ],
            "twice",
        );
        assert!(twice.check_invariants(&instance).unwrap_err().contains("more than once"));

        let mut stale = Route::from_customers(&instance, &[1]);
        stale.load = 0;
        let stale = Solution::from_routes(
            &instance,
            vec![stale, Route::from_customers(&instance, &[2, 3])],
            "stale",
        );
        assert!(stale.check_invariants(&instance).unwrap_err().contains("tracks load"));
    }
}

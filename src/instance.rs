//! Module for parsing and representing CVRP instances.
//!
//! This module handles the line-oriented `.vrp` files (TSPLIB CVRP flavour):
//! a `CAPACITY` header, a `NODE_COORD_SECTION` with `id x y` rows and a
//! `DEMAND_SECTION` with `id demand` rows, terminated by `DEPOT_SECTION`.
//! The first node is always the depot.

use crate::distance::DistanceMatrix;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Represents a node in the CVRP instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier (1-indexed in files, 0-indexed internally)
    pub id: usize,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Demand to deliver; always 0 for the depot
    pub demand: i32,
}

impl Node {
    pub fn new(id: usize, x: f64, y: f64, demand: i32) -> Self {
        Node { id, x, y, demand }
    }

    /// Check if this node is the depot
    pub fn is_depot(&self) -> bool {
        self.id == 0
    }
}

/// Represents a complete CVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvrpInstance {
    /// Name of the instance
    pub name: String,
    /// Comment/description
    pub comment: String,
    /// Number of nodes (including depot)
    pub dimension: usize,
    /// Vehicle capacity
    pub capacity: i32,
    /// List of all nodes, depot first
    pub nodes: Vec<Node>,
    /// Precomputed distance matrix
    #[serde(skip)]
    pub distances: DistanceMatrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Coords,
    Demands,
}

/// Value of a `KEY : value` or `KEY: value` header line.
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    if !line.starts_with(key) {
        return None;
    }
    line.split_once(':').map(|(_, value)| value.trim())
}

impl CvrpInstance {
    /// Build an instance from parsed coordinates and demands.
    ///
    /// Node 0 is the depot; its demand is forced to 0.
    pub fn new(name: &str, coords: Vec<(f64, f64)>, demands: Vec<i32>, capacity: i32) -> Self {
        assert_eq!(
            coords.len(),
            demands.len(),
            "every node needs both a coordinate and a demand"
        );

        let distances = DistanceMatrix::build(&coords);
        let nodes: Vec<Node> = coords
            .iter()
            .zip(demands.iter())
            .enumerate()
            .map(|(id, (&(x, y), &demand))| Node::new(id, x, y, if id == 0 { 0 } else { demand }))
            .collect();

        CvrpInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension: nodes.len(),
            capacity,
            nodes,
            distances,
        }
    }

    /// Parse a CVRP instance from a `.vrp` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let file = File::open(&path).map_err(|e| format!("Cannot open file: {}", e))?;
        let reader = BufReader::new(file);

        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line.map_err(|e| format!("Read error: {}", e))?);
        }

        let mut instance = Self::parse(&lines.join("\n"))?;
        if instance.name.is_empty() {
            instance.name = path
                .as_ref()
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        Ok(instance)
    }

    /// Parse a CVRP instance from the textual `.vrp` format
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut name = String::new();
        let mut comment = String::new();
        let mut dimension: Option<usize> = None;
        let mut capacity: Option<i32> = None;
        let mut coords: Vec<(f64, f64)> = Vec::new();
        let mut demands: Vec<i32> = Vec::new();

        let mut section = Section::Header;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() {
                continue;
            }
            if line.starts_with("DEPOT_SECTION") || line == "EOF" {
                break;
            }

            if line.starts_with("NODE_COORD_SECTION") {
                section = Section::Coords;
                continue;
            }
            if line.starts_with("DEMAND_SECTION") {
                section = Section::Demands;
                continue;
            }

            if let Some(value) = header_value(line, "NAME") {
                name = value.to_string();
                continue;
            }
            if let Some(value) = header_value(line, "COMMENT") {
                comment = value.to_string();
                continue;
            }
            if let Some(value) = header_value(line, "DIMENSION") {
                dimension = Some(value.parse().map_err(|_| "Invalid dimension")?);
                continue;
            }
            if let Some(value) = header_value(line, "CAPACITY") {
                capacity = Some(value.parse().map_err(|_| "Invalid capacity")?);
                continue;
            }
            if line.starts_with("TYPE") || line.starts_with("EDGE_WEIGHT_TYPE") {
                continue;
            }

            match section {
                Section::Coords => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() >= 3 {
                        let x: f64 = parts[1].parse().map_err(|_| "Invalid x coordinate")?;
                        let y: f64 = parts[2].parse().map_err(|_| "Invalid y coordinate")?;
                        coords.push((x, y));
                    }
                }
                Section::Demands => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() >= 2 {
                        let demand: i32 = parts[1].parse().map_err(|_| "Invalid demand")?;
                        if demand < 0 {
                            return Err(format!("Negative demand on node {}", parts[0]));
                        }
                        demands.push(demand);
                    }
                }
                Section::Header => {}
            }
        }

        let capacity = capacity.ok_or("Instance file missing CAPACITY")?;
        if capacity <= 0 {
            return Err(format!("Capacity must be positive, got {}", capacity));
        }
        if coords.is_empty() {
            return Err("Instance has no nodes".to_string());
        }
        if coords.len() != demands.len() {
            return Err(format!(
                "Found {} coordinates but {} demands",
                coords.len(),
                demands.len()
            ));
        }
        if let Some(dim) = dimension {
            if dim != coords.len() {
                log::warn!(
                    "DIMENSION declares {} nodes but {} were read; using the nodes read",
                    dim,
                    coords.len()
                );
            }
        }

        let mut instance = Self::new(&name, coords, demands, capacity);
        instance.comment = comment;
        Ok(instance)
    }

    /// Generate a random instance with the depot at the centre of a 100x100 square.
    /// Deterministic via seed.
    pub fn random(name: &str, num_customers: usize, capacity: i32, max_demand: i32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let upper = max_demand.clamp(1, capacity.max(1));

        let mut coords = Vec::with_capacity(num_customers + 1);
        let mut demands = Vec::with_capacity(num_customers + 1);
        coords.push((50.0, 50.0));
        demands.push(0);

        for _ in 0..num_customers {
            let x: f64 = rng.gen_range(0.0..100.0);
            let y: f64 = rng.gen_range(0.0..100.0);
            coords.push(((x * 100.0).round() / 100.0, (y * 100.0).round() / 100.0));
            demands.push(rng.gen_range(1..=upper));
        }

        let mut instance = Self::new(name, coords, demands, capacity);
        instance.comment = format!("random instance (seed {})", seed);
        instance
    }

    /// Render the instance in the `.vrp` format read by [`CvrpInstance::parse`]
    pub fn to_vrp_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "NAME : {}", self.name);
        if !self.comment.is_empty() {
            let _ = writeln!(out, "COMMENT : {}", self.comment);
        }
        let _ = writeln!(out, "TYPE : CVRP");
        let _ = writeln!(out, "DIMENSION : {}", self.dimension);
        let _ = writeln!(out, "EDGE_WEIGHT_TYPE : EUC_2D");
        let _ = writeln!(out, "CAPACITY : {}", self.capacity);
        let _ = writeln!(out, "NODE_COORD_SECTION");
        for node in &self.nodes {
            let _ = writeln!(out, "{} {} {}", node.id + 1, node.x, node.y);
        }
        let _ = writeln!(out, "DEMAND_SECTION");
        for node in &self.nodes {
            let _ = writeln!(out, "{} {}", node.id + 1, node.demand);
        }
        let _ = writeln!(out, "DEPOT_SECTION");
        let _ = writeln!(out, " 1");
        let _ = writeln!(out, " -1");
        let _ = writeln!(out, "EOF");
        out
    }

    /// Get the distance between two nodes
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> i64 {
        self.distances.get(i, j)
    }

    /// Get the demand of a node
    #[inline]
    pub fn demand(&self, node: usize) -> i32 {
        self.nodes[node].demand
    }

    /// Get the number of customer nodes (excluding depot)
    pub fn num_customers(&self) -> usize {
        self.dimension.saturating_sub(1)
    }

    /// Customer ids, depot excluded
    pub fn customers(&self) -> impl Iterator<Item = usize> {
        1..self.dimension
    }

    /// Sum of all customer demands
    pub fn total_demand(&self) -> i32 {
        self.nodes.iter().map(|n| n.demand).sum()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let total_demand = self.total_demand();
        let max_demand = self.nodes.iter().map(|n| n.demand).max().unwrap_or(0);

        let mut sum = 0i64;
        let mut count = 0usize;
        let mut max_distance = 0i64;
        for i in 0..self.dimension {
            for &d in &self.distances.row(i)[i + 1..] {
                sum += d;
                count += 1;
                max_distance = max_distance.max(d);
            }
        }
        let avg_distance = if count > 0 { sum as f64 / count as f64 } else { 0.0 };

        let min_vehicles = if self.capacity > 0 {
            ((total_demand + self.capacity - 1) / self.capacity) as usize
        } else {
            0
        };

        InstanceStatistics {
            name: self.name.clone(),
            dimension: self.dimension,
            capacity: self.capacity,
            total_demand,
            max_demand,
            min_vehicles,
            avg_distance,
            max_distance,
        }
    }
}

/// Statistics about a CVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub dimension: usize,
    pub capacity: i32,
    pub total_demand: i32,
    pub max_demand: i32,
    /// Lower bound on the number of vehicles: ceil(total demand / capacity)
    pub min_vehicles: usize,
    pub avg_distance: f64,
    pub max_distance: i64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(
            f,
            "  Nodes: {} (1 depot + {} customers)",
            self.dimension,
            self.dimension.saturating_sub(1)
        )?;
        writeln!(f, "  Capacity: {}", self.capacity)?;
        writeln!(f, "  Total demand: {}", self.total_demand)?;
        writeln!(f, "  Max demand: {}", self.max_demand)?;
        writeln!(f, "  Min vehicles: {}", self.min_vehicles)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {}", self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "NAME : sample
COMMENT : four nodes
TYPE : CVRP
DIMENSION : 4
EDGE_WEIGHT_TYPE : EUC_2D
CAPACITY : 20
NODE_COORD_SECTION
1 0 0
2 0 10
3 10 0
4 10 10
DEMAND_SECTION
1 0
2 5
3 5
4 5
DEPOT_SECTION
 1
 -1
EOF
";

    #[test]
    fn test_parse_sample() {
        let instance = CvrpInstance::parse(SAMPLE).unwrap();

        assert_eq!(instance.name, "sample");
        assert_eq!(instance.comment, "four nodes");
        assert_eq!(instance.dimension, 4);
        assert_eq!(instance.capacity, 20);
        assert_eq!(instance.demand(0), 0);
        assert_eq!(instance.demand(3), 5);
        assert_eq!(instance.distance(0, 3), 14);
        assert_eq!(instance.distance(1, 3), 10);
        assert_eq!(instance.total_demand(), 15);
    }

    #[test]
    fn test_parse_compact_headers() {
        let content = "CAPACITY: 7\nNODE_COORD_SECTION\n1 1.5 2.5\n2 4.5 6.5\nDEMAND_SECTION\n1 0\n2 3\nDEPOT_SECTION\n";
        let instance = CvrpInstance::parse(content).unwrap();

        assert_eq!(instance.capacity, 7);
        assert_eq!(instance.nodes[1].x, 4.5);
        assert_eq!(instance.distance(0, 1), 5);
    }

    #[test]
    fn test_missing_capacity() {
        let content = SAMPLE.replace("CAPACITY : 20\n", "");
        let err = CvrpInstance::parse(&content).unwrap_err();
        assert!(err.contains("CAPACITY"));
    }

    #[test]
    fn test_mismatched_sections() {
        let content = SAMPLE.replace("4 5\nDEPOT", "DEPOT");
        let err = CvrpInstance::parse(&content).unwrap_err();
        assert!(err.contains("demands"));
    }

    #[test]
    fn test_invalid_number() {
        let content = SAMPLE.replace("2 0 10", "2 zero 10");
        assert!(CvrpInstance::parse(&content).is_err());
    }

    #[test]
    fn test_random_round_trip() {
        let instance = CvrpInstance::random("rand", 12, 40, 15, 7);
        let again = CvrpInstance::random("rand", 12, 40, 15, 7);
        assert_eq!(instance.nodes, again.nodes);
        assert_eq!(instance.num_customers(), 12);
        assert_eq!(instance.dimension, 13);

        let parsed = CvrpInstance::parse(&instance.to_vrp_string()).unwrap();
        assert_eq!(parsed.nodes, instance.nodes);
        assert_eq!(parsed.capacity, 40);
        assert_eq!(parsed.distances, instance.distances);
        assert!(instance.customers().all(|c| (1..=15).contains(&instance.demand(c))));
    }

    #[test]
    fn test_statistics() {
        let instance = CvrpInstance::parse(SAMPLE).unwrap();
        let stats = instance.statistics();

        assert_eq!(stats.total_demand, 15);
        assert_eq!(stats.max_demand, 5);
        assert_eq!(stats.min_vehicles, 1);
        assert_eq!(stats.max_distance, 14);
    }
}

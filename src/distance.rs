//! Distance model for CVRP instances.
//!
//! Distances are Euclidean and floored to integers, so every cost in the
//! solver is exact integer arithmetic and move deltas can be compared
//! against a from-scratch recomputation without tolerance.

/// A dense n×n distance matrix stored in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistanceMatrix {
    data: Vec<i64>,
    size: usize,
}

impl DistanceMatrix {
    /// Compute the floored Euclidean distance between all ordered pairs.
    pub fn build(coords: &[(f64, f64)]) -> Self {
        let n = coords.len();
        let mut data = vec![0i64; n * n];

        for i in 0..n {
            let (xi, yi) = coords[i];
            for j in (i + 1)..n {
                let (xj, yj) = coords[j];
                let dx = xi - xj;
                let dy = yi - yj;
                let d = (dx * dx + dy * dy).sqrt().floor() as i64;
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }

        DistanceMatrix { data, size: n }
    }

    /// Distance from `from` to `to`.
    #[inline]
    pub fn get(&self, from: usize, to: usize) -> i64 {
        self.data[from * self.size + to]
    }

    /// Number of locations, depot included.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Row of distances leaving `from`.
    pub fn row(&self, from: usize) -> &[i64] {
        &self.data[from * self.size..(from + 1) * self.size]
    }
}

/// Build the distance model for a list of coordinates (node 0 is the depot).
pub fn build_distance_model(coords: &[(f64, f64)]) -> DistanceMatrix {
    DistanceMatrix::build(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floored_euclidean() {
        let dm = build_distance_model(&[(0.0, 0.0), (3.0, 4.0), (1.0, 1.0)]);

        assert_eq!(dm.get(0, 1), 5);
        assert_eq!(dm.get(0, 2), 1); // sqrt(2) floors to 1
        assert_eq!(dm.get(1, 2), 3); // sqrt(13) floors to 3
        assert_eq!(dm.size(), 3);
    }

    #[test]
    fn test_symmetric_with_zero_diagonal() {
        let coords = vec![
            (12.5, 3.0),
            (-4.0, 7.25),
            (100.0, 100.0),
            (0.0, -33.3),
            (12.5, 3.0),
        ];
        let dm = DistanceMatrix::build(&coords);

        for i in 0..coords.len() {
            assert_eq!(dm.get(i, i), 0);
            for j in 0..coords.len() {
                assert_eq!(dm.get(i, j), dm.get(j, i));
                assert!(dm.get(i, j) >= 0);
            }
        }
        assert_eq!(dm.get(0, 4), 0);
        assert_eq!(dm.row(2).len(), coords.len());
    }
}

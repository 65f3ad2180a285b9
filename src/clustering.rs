//! Density-based clustering (DBSCAN) over planar points.
//!
//! Core points are joined with a union-find; border points join the cluster of
//! their lowest-index core neighbor. Cluster ids follow the index order of each
//! cluster's first member, so results are deterministic for a given input order.

use geo::Coord;

use crate::spatial_index::{build_point_tree, points_within};
use crate::union_find::UnionFind;

/// Per-point cluster assignment. `None` marks noise.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLabels {
    pub labels: Vec<Option<usize>>,
    pub cluster_count: usize,
}

impl ClusterLabels {
    /// Member indices of every cluster, ascending, in cluster id order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.cluster_count];
        for (i, label) in self.labels.iter().enumerate() {
            if let Some(c) = label {
                members[*c].push(i);
            }
        }
        members
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }
}

/// Cluster points whose neighborhoods (radius `eps`, inclusive, self included)
/// hold at least `min_points` points.
pub fn dbscan(points: &[Coord<f64>], eps: f64, min_points: usize) -> ClusterLabels {
    let n = points.len();
    if n == 0 {
        return ClusterLabels {
            labels: Vec::new(),
            cluster_count: 0,
        };
    }

    let tree = build_point_tree(points);
    let neighbors: Vec<Vec<usize>> = points
        .iter()
        .map(|p| points_within(&tree, *p, eps))
        .collect();
    let is_core: Vec<bool> = neighbors
        .iter()
        .map(|nb| nb.len() >= min_points.max(1))
        .collect();

    let mut uf = UnionFind::new(n);
    for i in (0..n).filter(|&i| is_core[i]) {
        for &j in neighbors[i].iter().filter(|&&j| is_core[j]) {
            uf.union(i, j);
        }
    }

    let mut cluster_of_root: Vec<Option<usize>> = vec![None; n];
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut cluster_count = 0;

    for i in 0..n {
        let anchor = if is_core[i] {
            Some(i)
        } else {
            neighbors[i].iter().copied().find(|&j| is_core[j])
        };
        let Some(anchor) = anchor else {
            continue;
        };
        let root = uf.find(anchor);
        let id = *cluster_of_root[root].get_or_insert_with(|| {
            cluster_count += 1;
            cluster_count - 1
        });
        labels[i] = Some(id);
    }

    ClusterLabels {
        labels,
        cluster_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_two_clusters_and_noise() {
        let points = vec![
            c(0.0, 0.0),
            c(5.0, 0.0),
            c(10.0, 0.0),
            c(500.0, 0.0),
            c(505.0, 0.0),
            c(2000.0, 0.0),
        ];
        let result = dbscan(&points, 6.0, 2);
        assert_eq!(result.cluster_count, 2);
        assert_eq!(result.labels[0], Some(0));
        assert_eq!(result.labels[2], Some(0));
        assert_eq!(result.labels[3], Some(1));
        assert_eq!(result.labels[5], None);
        assert_eq!(result.noise_count(), 1);
    }

    #[test]
    fn test_min_points_one_is_connected_components() {
        let points = vec![c(0.0, 0.0), c(100.0, 0.0), c(40.0, 0.0)];
        let result = dbscan(&points, 60.0, 1);
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.members(), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // 0,1,2 dense; 3 is reachable only from 2
        let points = vec![c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0), c(4.4, 0.0)];
        let result = dbscan(&points, 2.5, 3);
        assert_eq!(result.labels[3], Some(0));
    }

    #[test]
    fn test_empty_input() {
        let result = dbscan(&[], 10.0, 2);
        assert_eq!(result.cluster_count, 0);
    }
}

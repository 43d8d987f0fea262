//! Single-linkage agglomerative clustering.
//!
//! Merging the closest pair of clusters until `k` remain gives the same
//! partition as building the minimum spanning tree over all points and
//! removing its `k - 1` longest edges, which is what is done here.

use super::{relabel_by_appearance, sq_euclidean, validate_points};
use crate::error::Result;

/// An MST edge between two points with its Euclidean length.
#[derive(Debug, Clone, Copy)]
struct Edge {
    a: usize,
    b: usize,
    length: f64,
}

/// Prim's algorithm on the complete Euclidean graph.
fn minimum_spanning_tree(points: &[Vec<f64>]) -> Vec<Edge> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if !in_tree[j] {
                let d = sq_euclidean(&points[current], &points[j]);
                if d < best[j] {
                    best[j] = d;
                    parent[j] = current;
                }
            }
        }
        let mut next = None;
        for j in 0..n {
            if !in_tree[j] && next.map_or(true, |m: usize| best[j] < best[m]) {
                next = Some(j);
            }
        }
        let Some(next) = next else { break };
        in_tree[next] = true;
        edges.push(Edge {
            a: parent[next],
            b: next,
            length: best[next].sqrt(),
        });
        current = next;
    }
    edges
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Partition `points` into `k` clusters with single linkage.
pub fn agglomerative_single(points: &[Vec<f64>], k: usize) -> Result<Vec<usize>> {
    validate_points(points, k)?;
    let n = points.len();

    let mut edges = minimum_spanning_tree(points);
    // Shortest first; equal lengths keep discovery order
    edges.sort_by(|x, y| {
        x.length
            .partial_cmp(&y.length)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    edges.truncate(n - k);

    let mut parent: Vec<usize> = (0..n).collect();
    for e in &edges {
        let ra = find(&mut parent, e.a);
        let rb = find(&mut parent, e.b);
        if ra != rb {
            parent[rb] = ra;
        }
    }
    let roots: Vec<usize> = (0..n).map(|i| find(&mut parent, i)).collect();
    Ok(relabel_by_appearance(&roots))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_stays_together() {
        // Single linkage follows the chain instead of splitting it in half
        let points = vec![
            vec![0.0],
            vec![1.0],
            vec![2.0],
            vec![3.0],
            vec![4.0],
            vec![20.0],
        ];
        let labels = agglomerative_single(&points, 2).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_k_extremes() {
        let points = vec![vec![0.0, 0.0], vec![5.0, 0.0], vec![0.0, 7.0]];
        assert_eq!(agglomerative_single(&points, 1).unwrap(), vec![0, 0, 0]);
        assert_eq!(agglomerative_single(&points, 3).unwrap(), vec![0, 1, 2]);
        assert!(agglomerative_single(&points, 4).is_err());
    }

    #[test]
    fn test_three_groups() {
        let points = vec![
            vec![0.0, 0.0],
            vec![10.0, 10.0],
            vec![0.5, 0.0],
            vec![-10.0, 5.0],
            vec![10.5, 10.0],
            vec![-10.0, 5.5],
        ];
        let labels = agglomerative_single(&points, 3).unwrap();
        assert_eq!(labels, vec![0, 1, 0, 2, 1, 2]);
    }
}

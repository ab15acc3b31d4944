use std::collections::VecDeque;

use rstar::{primitives::GeomWithData, RTree};

// Density-based clustering (DBSCAN) of 2-D points. Distances are plain
// euclidean in degree space; the radius is chosen per zoom by the caller.

type PointEntry = GeomWithData<[f64; 2], usize>;

/// One cluster: indices into the input point list.
#[derive(Debug, Clone)]
pub(crate) struct Cluster {
    pub(crate) points: Vec<usize>,
}

const UNVISITED: usize = usize::MAX;
const NOISE: usize = usize::MAX - 1;

/// Cluster `points` with radius `eps` and minimum cluster size `min_points`
/// (a point's neighborhood includes itself). Points in no cluster are noise
/// and are not returned. Member lists come back sorted ascending.
pub(crate) fn dbscan(points: &[[f64; 2]], eps: f64, min_points: usize) -> Vec<Cluster> {
    if points.is_empty() {
        return Vec::new();
    }
    let tree = RTree::bulk_load(
        points.iter().enumerate().map(|(i, &p)| PointEntry::new(p, i)).collect(),
    );

    let mut labels = vec![UNVISITED; points.len()];
    let mut clusters: Vec<Cluster> = Vec::new();

    for start in 0..points.len() {
        if labels[start] != UNVISITED {
            continue;
        }
        let neighbors = neighbors_of(&tree, points[start], eps);
        if neighbors.len() < min_points {
            labels[start] = NOISE;
            continue;
        }

        let cluster_id = clusters.len();
        clusters.push(Cluster { points: vec![start] });
        labels[start] = cluster_id;

        let mut queue: VecDeque<usize> = neighbors.into_iter().filter(|&i| i != start).collect();
        while let Some(idx) = queue.pop_front() {
            if labels[idx] == NOISE {
                // Border point: reachable from a core point, expands nothing.
                labels[idx] = cluster_id;
                clusters[cluster_id].points.push(idx);
                continue;
            }
            if labels[idx] != UNVISITED {
                continue;
            }
            labels[idx] = cluster_id;
            clusters[cluster_id].points.push(idx);
            let expansion = neighbors_of(&tree, points[idx], eps);
            if expansion.len() >= min_points {
                queue.extend(expansion);
            }
        }
        clusters[cluster_id].points.sort_unstable();
    }

    clusters
}

fn neighbors_of(tree: &RTree<PointEntry>, point: [f64; 2], eps: f64) -> Vec<usize> {
    let mut neighbors: Vec<usize> =
        tree.locate_within_distance(point, eps * eps).map(|entry| entry.data).collect();
    neighbors.sort_unstable();
    neighbors
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seeded k-means over 2D points, with k-means++ initialization and
//! empty-cluster reassignment, following §4.7(b).
use bl_error::{ErrorCode, PipelineError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Default cap on refinement iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

fn squared_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

fn nearest_centroid(point: (f64, f64), centroids: &[(f64, f64)]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, &c)| (i, squared_distance(point, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).expect("coordinates are finite"))
        .expect("centroids is non-empty")
        .0
}

fn initialize_centroids(points: &[(f64, f64)], k: usize, rng: &mut ChaCha8Rng) -> Vec<(f64, f64)> {
    let mut centroids = Vec::with_capacity(k);
    let first = rng.random_range(0..points.len());
    centroids.push(points[first]);

    while centroids.len() < k {
        let distances: Vec<f64> = points
            .iter()
            .map(|&p| {
                centroids
                    .iter()
                    .map(|&c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let total: f64 = distances.iter().sum();
        if total == 0.0 {
            let idx = rng.random_range(0..points.len());
            centroids.push(points[idx]);
            continue;
        }

        let threshold = rng.random::<f64>() * total;
        let mut cumsum = 0.0;
        let mut chosen = None;
        for (i, &d) in distances.iter().enumerate() {
            cumsum += d;
            if cumsum >= threshold {
                chosen = Some(i);
                break;
            }
        }
        let idx = chosen.unwrap_or_else(|| rng.random_range(0..points.len()));
        centroids.push(points[idx]);
    }

    centroids
}

/// Partition `points` into `k` clusters by Euclidean distance, seeded for
/// reproducibility. Returns, for each point, its assigned cluster index in
/// `0..k`.
///
/// `K <= 0` and `K > points.len()` are rejected per §4.7's error contract.
pub fn kmeans(
    points: &[(f64, f64)],
    k: usize,
    seed: u64,
    max_iterations: usize,
) -> Result<Vec<usize>> {
    if k == 0 {
        return Err(PipelineError::clustering(
            ErrorCode::ClusteringNonPositiveK,
            "k must be positive",
        ));
    }
    if k > points.len() {
        return Err(PipelineError::clustering(
            ErrorCode::ClusteringKExceedsSamples,
            "n_clusters must be <= n_samples",
        )
        .with_context("k", k)
        .with_context("n_samples", points.len()));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids = initialize_centroids(points, k, &mut rng);
    let mut assignments: Vec<usize> = vec![usize::MAX; points.len()];

    for _ in 0..max_iterations {
        let new_assignments: Vec<usize> =
            points.iter().map(|&p| nearest_centroid(p, &centroids)).collect();

        if new_assignments == assignments {
            break;
        }
        assignments = new_assignments;

        let mut sums = vec![(0.0_f64, 0.0_f64); k];
        let mut counts = vec![0usize; k];
        for (&point, &cluster) in points.iter().zip(assignments.iter()) {
            sums[cluster].0 += point.0;
            sums[cluster].1 += point.1;
            counts[cluster] += 1;
        }
        for i in 0..k {
            if counts[i] > 0 {
                centroids[i] = (sums[i].0 / counts[i] as f64, sums[i].1 / counts[i] as f64);
            } else {
                let idx = rng.random_range(0..points.len());
                centroids[i] = points[idx];
            }
        }
    }

    Ok(assignments)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cluster density and density-rank-percentile computation, per §4.12.
use std::collections::BTreeMap;

/// Density bookkeeping for one non-root cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density {
    /// `1 / (mean_euclidean_distance_from_centroid + 1e-10)`.
    pub density: f64,
    /// Dense rank by descending density; `1` is densest, ties share a rank.
    pub density_rank: usize,
    /// `(rank - 1) / max(1, total_clusters - 1)`.
    pub density_rank_percentile: f64,
}

/// Compute [`Density`] for every cluster in `member_points`, keyed by
/// cluster id.
///
/// Single-point clusters (and clusters whose members coincide) yield a
/// density of `1e10` — the centroid-distance term collapses to zero,
/// which already produces that value without a special case.
pub fn compute(member_points: &BTreeMap<String, Vec<(f64, f64)>>) -> BTreeMap<String, Density> {
    let mut raw: BTreeMap<String, f64> = BTreeMap::new();
    for (id, points) in member_points {
        let density = if points.is_empty() {
            1e10
        } else {
            let n = points.len() as f64;
            let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
            let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
            let mean_dist = points
                .iter()
                .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
                .sum::<f64>()
                / n;
            1.0 / (mean_dist + 1e-10)
        };
        raw.insert(id.clone(), density);
    }

    let mut sorted: Vec<(&String, f64)> = raw.iter().map(|(id, &d)| (id, d)).collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("density is finite"));

    let total = sorted.len();
    let mut ranks: BTreeMap<String, usize> = BTreeMap::new();
    let mut rank = 0usize;
    let mut prev: Option<f64> = None;
    for (id, d) in &sorted {
        if prev != Some(*d) {
            rank += 1;
        }
        ranks.insert((*id).clone(), rank);
        prev = Some(*d);
    }

    raw.into_iter()
        .map(|(id, density)| {
            let density_rank = ranks[&id];
            let density_rank_percentile = if total <= 1 {
                0.0
            } else {
                (density_rank - 1) as f64 / (total - 1) as f64
            };
            (
                id,
                Density {
                    density,
                    density_rank,
                    density_rank_percentile,
                },
            )
        })
        .collect()
}

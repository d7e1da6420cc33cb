// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clustering stage (§4.7): 2D reduction, per-level k-means, hierarchy
//! assembly.

use bl_clustering::{assemble_hierarchy, auto_cluster_nums, kmeans, DEFAULT_MAX_ITERATIONS};
use bl_core::model::{Argument, ClusterResults};
use bl_core::Config;
use bl_error::Result;
use bl_llm::Reducer2D;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Result of running the clustering stage.
pub struct ClusteringOutcome {
    /// Level-keyed flat partitions.
    pub cluster_results: ClusterResults,
}

/// Resolve the ascending list of `K` values to run, substituting
/// `auto_cluster_nums` when `config.cluster_nums` is absent and
/// `config.auto_cluster_nums` is set.
pub fn resolve_cluster_nums(config: &Config, n_arguments: usize) -> Vec<usize> {
    if let Some(nums) = &config.cluster_nums {
        let mut nums = nums.clone();
        nums.sort_unstable();
        nums
    } else if config.auto_cluster_nums {
        let (low, high) = auto_cluster_nums(n_arguments);
        vec![low, high]
    } else {
        Vec::new()
    }
}

/// Reduce, cluster at every configured level, and assemble the hierarchy,
/// writing `x`/`y`/`cluster_ids` back onto `arguments`. Each argument's
/// `cluster_ids` path is reconciled against the majority-parent rule
/// (`assemble_hierarchy`'s `parents` map), so every level's declared parent
/// matches its preceding path element even when two levels' independent
/// k-means runs would otherwise disagree about nesting.
pub async fn run(
    config: &Config,
    arguments: &mut [Argument],
    reducer: Arc<dyn Reducer2D>,
) -> Result<ClusteringOutcome> {
    let n = arguments.len();
    let vectors: Vec<Vec<f64>> = arguments
        .iter()
        .map(|a| a.embedding.clone().unwrap_or_default())
        .collect();

    let coords = reducer.reduce_2d(&vectors, config.random_state).await?;
    for (arg, (x, y)) in arguments.iter_mut().zip(coords.iter()) {
        arg.x = Some(*x);
        arg.y = Some(*y);
    }

    let cluster_nums = resolve_cluster_nums(config, n);
    let points: Vec<(f64, f64)> = arguments.iter().map(|a| (a.x.unwrap_or(0.0), a.y.unwrap_or(0.0))).collect();

    let mut cluster_results: ClusterResults = BTreeMap::new();
    for (level_idx, &k) in cluster_nums.iter().enumerate() {
        let level = level_idx + 1;
        let assignment = kmeans(&points, k, config.random_state, DEFAULT_MAX_ITERATIONS)?;
        cluster_results.insert(level, assignment);
    }

    let assembly = assemble_hierarchy(&cluster_nums, &cluster_results, n)?;
    for (arg, path) in arguments.iter_mut().zip(assembly.argument_cluster_ids) {
        arg.cluster_ids = path;
    }

    info!(target: "bl.clustering", levels = cluster_nums.len(), arguments = n, "clustering complete");

    Ok(ClusteringOutcome { cluster_results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_llm::MockReducer2D;

    fn args_with_embeddings() -> Vec<Argument> {
        vec![
            {
                let mut a = Argument::new("1", 0, "a");
                a.embedding = Some(vec![1.0, 0.0, 0.0]);
                a
            },
            {
                let mut a = Argument::new("1", 1, "b");
                a.embedding = Some(vec![0.0, 1.0, 0.0]);
                a
            },
            {
                let mut a = Argument::new("2", 0, "c");
                a.embedding = Some(vec![0.0, 0.0, 1.0]);
                a
            },
        ]
    }

    #[test]
    fn explicit_cluster_nums_are_sorted_ascending() {
        let mut config = Config::default();
        config.cluster_nums = Some(vec![3, 2]);
        assert_eq!(resolve_cluster_nums(&config, 10), vec![2, 3]);
    }

    #[test]
    fn auto_cluster_nums_used_when_absent_and_enabled() {
        let mut config = Config::default();
        config.auto_cluster_nums = true;
        let nums = resolve_cluster_nums(&config, 100);
        assert_eq!(nums.len(), 2);
        assert!(nums[0] <= nums[1]);
    }

    #[tokio::test]
    async fn assigns_coordinates_and_cluster_paths() {
        let mut config = Config::default();
        config.cluster_nums = Some(vec![2]);
        let reducer: Arc<dyn Reducer2D> =
            Arc::new(MockReducer2D::fixed(vec![(0.0, 0.0), (0.0, 0.0), (10.0, 10.0)]));
        let mut arguments = args_with_embeddings();
        let outcome = run(&config, &mut arguments, reducer).await.unwrap();
        assert!(arguments.iter().all(|a| a.x.is_some() && !a.cluster_ids.is_empty()));
        assert_eq!(outcome.cluster_results.len(), 1);
        assert_eq!(arguments[0].cluster_ids[0], "0");
    }
}

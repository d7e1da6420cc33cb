// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchy assembly: turns per-level flat partitions into a single
//! parent/child tree rooted at the synthetic `"0"` node, per §4.7(c).
use bl_core::model::ClusterResults;
use bl_error::{PipelineError, Result};
use std::collections::BTreeMap;

/// The result of assembling a hierarchy across all configured levels.
pub struct HierarchyAssembly {
    /// For each argument (by index into `context.arguments`), its
    /// root-to-leaf path, e.g. `["0", "1_0", "2_3"]`.
    pub argument_cluster_ids: Vec<Vec<String>>,
    /// Parent id for every non-root cluster id (level-1 clusters map to
    /// `"0"`).
    pub parents: BTreeMap<String, String>,
}

/// Assemble the hierarchy for `cluster_nums` (already sorted ascending)
/// given each level's flat-partition assignment.
///
/// Ties in the majority-parent rule are broken in favor of the smaller
/// parent index (§9's documented, not-necessarily-reference-matching,
/// choice).
pub fn assemble(
    cluster_nums: &[usize],
    cluster_results: &ClusterResults,
    n_arguments: usize,
) -> Result<HierarchyAssembly> {
    let mut level_assignments = Vec::with_capacity(cluster_nums.len());
    for level_idx in 0..cluster_nums.len() {
        let level = level_idx + 1;
        let assignment = cluster_results.get(&level).ok_or_else(|| {
            PipelineError::internal(format!("missing cluster assignment for level {level}"))
        })?;
        if assignment.len() != n_arguments {
            return Err(PipelineError::internal(format!(
                "cluster assignment for level {level} has {} entries, expected {n_arguments}",
                assignment.len()
            )));
        }
        level_assignments.push(assignment);
    }

    let mut parents = BTreeMap::new();

    if let Some(&first_k) = cluster_nums.first() {
        for c in 0..first_k {
            parents.insert(format!("1_{c}"), "0".to_string());
        }
    }

    for level_idx in 1..cluster_nums.len() {
        let parent_level = level_idx;
        let child_level = level_idx + 1;
        let parent_assignment = level_assignments[level_idx - 1];
        let child_assignment = level_assignments[level_idx];
        let child_k = cluster_nums[level_idx];

        let mut votes: Vec<BTreeMap<usize, usize>> = vec![BTreeMap::new(); child_k];
        for arg_idx in 0..n_arguments {
            let child_cluster = child_assignment[arg_idx];
            let parent_cluster = parent_assignment[arg_idx];
            *votes[child_cluster].entry(parent_cluster).or_insert(0) += 1;
        }

        for (child_cluster, vote_counts) in votes.into_iter().enumerate() {
            let mut best: Option<(usize, usize)> = None;
            for (parent_cluster, count) in vote_counts {
                best = match best {
                    None => Some((parent_cluster, count)),
                    Some((_, best_count)) if count > best_count => Some((parent_cluster, count)),
                    Some(existing) => Some(existing),
                };
            }
            let parent_cluster = best.map(|(p, _)| p).unwrap_or(0);
            parents.insert(
                format!("{child_level}_{child_cluster}"),
                format!("{parent_level}_{parent_cluster}"),
            );
        }
    }

    // Each argument's path is derived by following the majority-parent
    // chain up from its finest-level assignment, rather than from the
    // independent per-level k-means assignments directly: two levels'
    // k-means runs are free to disagree about where a point belongs (a
    // finer cluster need not nest inside the coarser cluster its own
    // members were "mostly" assigned to), but a chain built from `parents`
    // is consistent by construction, satisfying the declared-parent
    // invariant at every level.
    let deepest_level = cluster_nums.len();
    let mut argument_cluster_ids = vec![vec!["0".to_string()]; n_arguments];
    if deepest_level > 0 {
        let leaf_assignment = level_assignments[deepest_level - 1];
        for (arg_idx, &leaf_cluster) in leaf_assignment.iter().enumerate() {
            let mut path = vec![format!("{deepest_level}_{leaf_cluster}")];
            loop {
                let parent = parents
                    .get(path.last().unwrap())
                    .cloned()
                    .unwrap_or_else(|| "0".to_string());
                let reached_root = parent == "0";
                path.push(parent);
                if reached_root {
                    break;
                }
            }
            path.reverse();
            argument_cluster_ids[arg_idx] = path;
        }
    }

    Ok(HierarchyAssembly {
        argument_cluster_ids,
        parents,
    })
}

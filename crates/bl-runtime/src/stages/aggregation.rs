// SPDX-License-Identifier: MIT OR Apache-2.0
//! Aggregation stage (§4.11-4.12): assemble the final `PipelineResult`
//! from everything the prior stages computed. Pure; no I/O.

use bl_core::model::{Argument, Cluster, Comment, CommentEntry, OutputArgument, PipelineResult};
use bl_core::{numeric_comment_id, Config};
use std::collections::BTreeMap;

const ROOT_LABEL: &str = "全体";

/// Build the final result. `clusters` holds every non-root cluster
/// (merge labelling's output); the synthetic root `"0"` is synthesized
/// here.
pub fn run(
    config: &Config,
    comments: &[Comment],
    arguments: &[Argument],
    clusters: &[Cluster],
    overview: Option<String>,
) -> PipelineResult {
    let output_arguments: Vec<OutputArgument> = arguments
        .iter()
        .map(|arg| OutputArgument {
            arg_id: arg.arg_id.clone(),
            argument: arg.argument.clone(),
            comment_id: numeric_comment_id(&arg.comment_id, &arg.arg_id),
            x: arg.x.unwrap_or(0.0),
            y: arg.y.unwrap_or(0.0),
            p: 0,
            cluster_ids: arg.cluster_ids.clone(),
            attributes: comment_attributes(comments, &arg.comment_id),
            url: comment_url(comments, &arg.comment_id),
        })
        .collect();

    let root_value = arguments.len();
    let root = Cluster {
        level: 0,
        id: "0".to_string(),
        label: ROOT_LABEL.to_string(),
        takeaway: String::new(),
        value: root_value,
        parent: String::new(),
        density: 0.0,
        density_rank: 0,
        density_rank_percentile: None,
    };

    let mut all_clusters = clusters.to_vec();
    all_clusters.push(root);
    all_clusters.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));

    let mut commented_ids: BTreeMap<String, CommentEntry> = BTreeMap::new();
    for arg in arguments {
        if !commented_ids.contains_key(&arg.comment_id) {
            if let Some(c) = comments.iter().find(|c| c.id == arg.comment_id) {
                commented_ids.insert(c.id.clone(), CommentEntry { comment: c.body.clone() });
            }
        }
    }

    PipelineResult {
        arguments: output_arguments,
        clusters: all_clusters,
        comments: commented_ids,
        property_map: BTreeMap::new(),
        translations: BTreeMap::new(),
        overview,
        config: config.clone(),
        comment_num: comments.len(),
    }
}

fn comment_attributes(comments: &[Comment], comment_id: &str) -> Option<BTreeMap<String, String>> {
    comments
        .iter()
        .find(|c| c.id == comment_id)
        .filter(|c| !c.attributes.is_empty())
        .map(|c| c.attributes.clone())
}

fn comment_url(comments: &[Comment], comment_id: &str) -> Option<String> {
    comments.iter().find(|c| c.id == comment_id).and_then(|c| c.source_url.clone())
}

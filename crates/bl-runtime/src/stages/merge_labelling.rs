// SPDX-License-Identifier: MIT OR Apache-2.0
//! Merge labelling stage (§4.9, §4.12): label every non-leaf, non-root
//! cluster bottom-up, then attach structural metadata (value, parent,
//! density) to every non-root cluster.

use crate::worker_pool::run_bounded;
use bl_clustering::compute_density;
use bl_core::model::{Argument, Cluster};
use bl_core::Config;
use bl_error::{PipelineError, Result};
use bl_llm::{ChatClient, ResponseFormat};
use bl_retry::{is_retryable, retry_async, RetryConfig};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

/// Cap on children/members folded into one merge-labelling prompt.
const MAX_SAMPLE_SIZE: usize = 20;

#[derive(Deserialize)]
struct LabelResponse {
    label: String,
    description: String,
}

/// Find `id`'s parent by locating any argument whose path contains it and
/// reading the preceding path element (§4.11's on-demand derivation).
fn parent_of(arguments: &[Argument], level: usize, id: &str) -> String {
    for arg in arguments {
        if arg.cluster_ids.get(level).map(String::as_str) == Some(id) {
            return arg.cluster_ids.get(level - 1).cloned().unwrap_or_else(|| "0".to_string());
        }
    }
    "0".to_string()
}

fn cluster_value(arguments: &[Argument], level: usize, id: &str) -> usize {
    arguments
        .iter()
        .filter(|a| a.cluster_ids.get(level).map(String::as_str) == Some(id))
        .count()
}

fn ids_at_level(arguments: &[Argument], level: usize) -> Vec<String> {
    let set: BTreeSet<String> = arguments
        .iter()
        .filter_map(|a| a.cluster_ids.get(level).cloned())
        .collect();
    set.into_iter().collect()
}

/// Bottom-up label every non-root level, copying deepest-level labels from
/// `initial_labels` unchanged and calling the chat LLM for every level
/// above that, then attach value/parent/density to every non-root cluster.
pub async fn run(
    config: &Config,
    arguments: &[Argument],
    initial_labels: &BTreeMap<String, (String, String)>,
    chat: Arc<dyn ChatClient>,
) -> Result<(Vec<Cluster>, u64)> {
    let deepest_level = arguments.iter().map(|a| a.cluster_ids.len().saturating_sub(1)).max().unwrap_or(0);
    if deepest_level == 0 {
        return Ok((Vec::new(), 0));
    }

    let mut token_usage = 0u64;
    let mut labels_by_level: BTreeMap<usize, BTreeMap<String, (String, String)>> = BTreeMap::new();
    labels_by_level.insert(deepest_level, initial_labels.clone());

    let retry_config = RetryConfig::default();
    let model = config.model.clone();
    let prompt = config.prompts.merge_labelling.clone();
    let workers = config.workers;

    for level in (1..deepest_level).rev() {
        let ids = ids_at_level(arguments, level);
        let child_level = level + 1;
        let child_labels = labels_by_level.get(&child_level).cloned().unwrap_or_default();

        let jobs: Vec<(String, Vec<(String, String)>)> = ids
            .into_iter()
            .map(|id| {
                let child_ids = ids_at_level(arguments, child_level)
                    .into_iter()
                    .filter(|cid| parent_of(arguments, child_level, cid) == id)
                    .take(MAX_SAMPLE_SIZE)
                    .filter_map(|cid| child_labels.get(&cid).cloned())
                    .collect();
                (id, child_ids)
            })
            .collect();

        let results = run_bounded(jobs, workers, {
            let chat = Arc::clone(&chat);
            let model = model.clone();
            let prompt = prompt.clone();
            let retry_config = retry_config.clone();
            move |_idx, (id, children)| {
                let chat = Arc::clone(&chat);
                let model = model.clone();
                let prompt = prompt.clone();
                let retry_config = retry_config.clone();
                async move {
                    let user_message = children
                        .iter()
                        .map(|(label, description)| format!("{label}: {description}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let outcome = retry_async(
                        &retry_config,
                        || {
                            let chat = Arc::clone(&chat);
                            let model = model.clone();
                            let prompt = prompt.clone();
                            let user_message = user_message.clone();
                            async move {
                                let resp = chat
                                    .chat(&model, &prompt, &user_message, ResponseFormat::label_schema())
                                    .await?;
                                let parsed: LabelResponse = serde_json::from_str(&resp.content).map_err(|e| {
                                    PipelineError::internal("malformed label response").with_source(e)
                                })?;
                                Ok::<_, PipelineError>(((parsed.label, parsed.description), resp.tokens_used))
                            }
                        },
                        is_retryable,
                    )
                    .await;
                    match outcome {
                        Ok(ok) => (id, Some(ok.value)),
                        Err(err) => {
                            warn!(target: "bl.merge_labelling", cluster_id = %id, error = %err, "labelling failed after retries");
                            (id, None)
                        }
                    }
                }
            }
        })
        .await;

        let mut level_labels = BTreeMap::new();
        for (id, outcome) in results {
            match outcome {
                Some((label, tokens)) => {
                    token_usage += tokens;
                    level_labels.insert(id, label);
                }
                None => {
                    level_labels.insert(id, (String::new(), String::new()));
                }
            }
        }
        labels_by_level.insert(level, level_labels);
    }

    let mut member_points: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for arg in arguments {
        for level in 1..=deepest_level {
            if let Some(id) = arg.cluster_ids.get(level) {
                member_points
                    .entry(id.clone())
                    .or_default()
                    .push((arg.x.unwrap_or(0.0), arg.y.unwrap_or(0.0)));
            }
        }
    }
    let densities = compute_density(&member_points);

    let mut clusters = Vec::new();
    for level in 1..=deepest_level {
        for id in ids_at_level(arguments, level) {
            let (label, description) = labels_by_level
                .get(&level)
                .and_then(|m| m.get(&id))
                .cloned()
                .unwrap_or_else(|| (String::new(), String::new()));
            let density = densities.get(&id).copied();
            clusters.push(Cluster {
                level,
                id: id.clone(),
                label,
                takeaway: description,
                value: cluster_value(arguments, level, &id),
                parent: parent_of(arguments, level, &id),
                density: density.map(|d| d.density).unwrap_or(0.0),
                density_rank: density.map(|d| d.density_rank).unwrap_or(0),
                density_rank_percentile: density.map(|d| d.density_rank_percentile),
            });
        }
    }

    Ok((clusters, token_usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_llm::MockChatClient;

    fn args() -> Vec<Argument> {
        let mut a0 = Argument::new("1", 0, "parks are nice");
        a0.x = Some(0.0);
        a0.y = Some(0.0);
        a0.cluster_ids = vec!["0".into(), "1_0".into(), "2_0".into()];
        let mut a1 = Argument::new("2", 0, "more parks please");
        a1.x = Some(0.1);
        a1.y = Some(0.0);
        a1.cluster_ids = vec!["0".into(), "1_0".into(), "2_0".into()];
        let mut a2 = Argument::new("3", 0, "buses are slow");
        a2.x = Some(10.0);
        a2.y = Some(0.0);
        a2.cluster_ids = vec!["0".into(), "1_1".into(), "2_1".into()];
        vec![a0, a1, a2]
    }

    fn initial_labels() -> BTreeMap<String, (String, String)> {
        let mut m = BTreeMap::new();
        m.insert("2_0".to_string(), ("parks".to_string(), "people like parks".to_string()));
        m.insert("2_1".to_string(), ("buses".to_string(), "buses are slow".to_string()));
        m
    }

    #[tokio::test]
    async fn deepest_level_labels_are_copied_unchanged() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::labelling_stub());
        let (clusters, _) = run(&Config::default(), &args(), &initial_labels(), chat).await.unwrap();
        let c = clusters.iter().find(|c| c.id == "2_0").unwrap();
        assert_eq!(c.label, "parks");
        assert_eq!(c.takeaway, "people like parks");
    }

    #[tokio::test]
    async fn upper_levels_get_llm_labels_and_structural_metadata() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::labelling_stub());
        let (clusters, _) = run(&Config::default(), &args(), &initial_labels(), chat).await.unwrap();
        let c1 = clusters.iter().find(|c| c.id == "1_0").unwrap();
        assert!(!c1.label.is_empty());
        assert_eq!(c1.parent, "0");
        assert_eq!(c1.value, 2);
        let c2_0 = clusters.iter().find(|c| c.id == "2_0").unwrap();
        assert_eq!(c2_0.parent, "1_0");
        assert_eq!(c2_0.value, 2);
        assert!(c2_0.density_rank_percentile.is_some());
    }

    #[tokio::test]
    async fn no_clustering_yields_empty_clusters() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::labelling_stub());
        let plain = vec![Argument::new("1", 0, "x")];
        let (clusters, tokens) = run(&Config::default(), &plain, &BTreeMap::new(), chat).await.unwrap();
        assert!(clusters.is_empty());
        assert_eq!(tokens, 0);
    }
}

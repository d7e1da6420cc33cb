// SPDX-License-Identifier: MIT OR Apache-2.0
//! Initial labelling stage (§4.8): label every deepest-level (leaf)
//! cluster from its member arguments.

use crate::worker_pool::run_bounded;
use bl_core::model::Argument;
use bl_core::Config;
use bl_error::{PipelineError, Result};
use bl_llm::{ChatClient, ResponseFormat};
use bl_retry::{is_retryable, retry_async, RetryConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Cap on member opinions folded into one labelling prompt, earliest
/// argument index first, matching §4.8's deterministic-truncation rule.
const MAX_MEMBERS_PER_PROMPT: usize = 50;

#[derive(Deserialize)]
struct LabelResponse {
    label: String,
    description: String,
}

/// Label every deepest-level cluster, returning `cluster_id -> (label,
/// description)` plus tokens consumed. Per-cluster failure after retries
/// yields an empty label/description, not a stage failure.
pub async fn run(
    config: &Config,
    arguments: &[Argument],
    chat: Arc<dyn ChatClient>,
) -> Result<(BTreeMap<String, (String, String)>, u64)> {
    let deepest_level = arguments.iter().map(|a| a.cluster_ids.len().saturating_sub(1)).max().unwrap_or(0);
    if deepest_level == 0 {
        return Ok((BTreeMap::new(), 0));
    }

    let mut members: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arg in arguments {
        if let Some(id) = arg.cluster_ids.get(deepest_level) {
            members.entry(id.clone()).or_default().push(arg.argument.clone());
        }
    }

    let cluster_ids: Vec<(String, Vec<String>)> = members.into_iter().collect();
    let retry_config = RetryConfig::default();
    let model = config.model.clone();
    let prompt = config.prompts.initial_labelling.clone();
    let workers = config.workers;

    let results = run_bounded(cluster_ids, workers, move |_idx, (id, opinions)| {
        let chat = Arc::clone(&chat);
        let model = model.clone();
        let prompt = prompt.clone();
        let retry_config = retry_config.clone();
        async move {
            let user_message = opinions.iter().take(MAX_MEMBERS_PER_PROMPT).cloned().collect::<Vec<_>>().join("\n");
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
                        let parsed: LabelResponse = serde_json::from_str(&resp.content)
                            .map_err(|e| PipelineError::internal("malformed label response").with_source(e))?;
                        Ok::<_, PipelineError>(((parsed.label, parsed.description), resp.tokens_used))
                    }
                },
                is_retryable,
            )
            .await;

            match outcome {
                Ok(ok) => (id, Some(ok.value)),
                Err(err) => {
                    warn!(target: "bl.initial_labelling", cluster_id = %id, error = %err, "labelling failed after retries");
                    (id, None)
                }
            }
        }
    })
    .await;

    let mut labels = BTreeMap::new();
    let mut token_usage = 0u64;
    for (id, outcome) in results {
        match outcome {
            Some(((label, description), tokens)) => {
                token_usage += tokens;
                labels.insert(id, (label, description));
            }
            None => {
                labels.insert(id, (String::new(), String::new()));
            }
        }
    }

    Ok((labels, token_usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_llm::MockChatClient;

    fn args() -> Vec<Argument> {
        let mut a0 = Argument::new("1", 0, "parks are nice");
        a0.cluster_ids = vec!["0".into(), "1_0".into()];
        let mut a1 = Argument::new("2", 0, "buses are slow");
        a1.cluster_ids = vec!["0".into(), "1_1".into()];
        vec![a0, a1]
    }

    #[tokio::test]
    async fn labels_every_leaf_cluster() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::labelling_stub());
        let (labels, _) = run(&Config::default(), &args(), chat).await.unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains_key("1_0"));
        assert!(labels.contains_key("1_1"));
    }

    #[tokio::test]
    async fn no_cluster_assignments_yields_empty_map() {
        let chat: Arc<dyn ChatClient> = Arc::new(MockChatClient::labelling_stub());
        let plain = vec![Argument::new("1", 0, "x")];
        let (labels, tokens) = run(&Config::default(), &plain, chat).await.unwrap();
        assert!(labels.is_empty());
        assert_eq!(tokens, 0);
    }
}

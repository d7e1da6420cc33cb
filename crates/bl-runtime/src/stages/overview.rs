// SPDX-License-Identifier: MIT OR Apache-2.0
//! Overview stage (§4.10): summarize level-1 clusters into one paragraph.

use bl_core::model::Cluster;
use bl_core::Config;
use bl_error::{PipelineError, Result};
use bl_llm::{ChatClient, ResponseFormat};
use bl_retry::{is_retryable, retry_async, RetryConfig};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct OverviewResponse {
    summary: String,
}

/// Summarize every level-1 cluster's `(label, description)` into a single
/// overview paragraph. Empty labels leave the overview unset; the stage
/// still succeeds.
pub async fn run(config: &Config, clusters: &[Cluster], chat: Arc<dyn ChatClient>) -> Result<(Option<String>, u64)> {
    let level_one: Vec<&Cluster> = clusters.iter().filter(|c| c.level == 1 && !c.label.is_empty()).collect();
    if level_one.is_empty() {
        return Ok((None, 0));
    }

    let user_message = level_one
        .iter()
        .map(|c| format!("{}: {}", c.label, c.takeaway))
        .collect::<Vec<_>>()
        .join("\n");

    let retry_config = RetryConfig::default();
    let outcome = retry_async(
        &retry_config,
        || {
            let chat = Arc::clone(&chat);
            let model = config.model.clone();
            let prompt = config.prompts.overview.clone();
            let user_message = user_message.clone();
            async move {
                let resp = chat.chat(&model, &prompt, &user_message, ResponseFormat::overview_schema()).await?;
                let parsed: OverviewResponse = serde_json::from_str(&resp.content)
                    .map_err(|e| PipelineError::internal("malformed overview response").with_source(e))?;
                Ok::<_, PipelineError>((parsed.summary, resp.tokens_used))
            }
        },
        is_retryable,
    )
    .await?;

    Ok((Some(outcome.value.0), outcome.value.1))
}

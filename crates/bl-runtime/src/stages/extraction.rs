// SPDX-License-Identifier: MIT OR Apache-2.0
//! Extraction stage (§4.5): ask the chat LLM for 0..k opinion strings per
//! comment.

use crate::bus::{BroadlisteningEvent, EventBus};
use crate::worker_pool::run_bounded;
use bl_core::model::{Argument, Comment, Relation};
use bl_core::{Config, Stage};
use bl_error::{ErrorCode, PipelineError, Result};
use bl_llm::{ChatClient, ResponseFormat};
use bl_retry::{is_retryable, retry_async, RetryConfig};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Deserialize)]
struct ExtractedOpinions {
    #[serde(rename = "extractedOpinionList")]
    extracted_opinion_list: Vec<String>,
}

/// Outcome of running the extraction stage: the arguments and relations it
/// produced, plus total tokens consumed.
pub struct ExtractionOutcome {
    /// Newly extracted arguments, in comment order then opinion order.
    pub arguments: Vec<Argument>,
    /// Matching `(arg_id, comment_id)` pairs.
    pub relations: Vec<Relation>,
    /// Tokens consumed across every chat call.
    pub token_usage: u64,
}

/// Run extraction over `comments` (already truncated to `config.limit` by
/// the caller), emitting `progress.broadlistening` after each comment.
pub async fn run(
    config: &Config,
    comments: &[Comment],
    chat: Arc<dyn ChatClient>,
    bus: &EventBus,
) -> Result<ExtractionOutcome> {
    let non_empty: Vec<(usize, Comment)> = comments
        .iter()
        .filter(|c| !c.body.trim().is_empty())
        .cloned()
        .enumerate()
        .collect();
    let total = non_empty.len();

    let retry_config = RetryConfig::default();
    let model = config.model.clone();
    let prompt = config.prompts.extraction.clone();
    let workers = config.workers;

    let results = run_bounded(non_empty, workers, move |_idx, (_, comment)| {
        let chat = Arc::clone(&chat);
        let model = model.clone();
        let prompt = prompt.clone();
        let retry_config = retry_config.clone();
        async move {
            let outcome = retry_async(
                &retry_config,
                || {
                    let chat = Arc::clone(&chat);
                    let model = model.clone();
                    let prompt = prompt.clone();
                    let body = comment.body.clone();
                    async move {
                        let resp = chat
                            .chat(&model, &prompt, &body, ResponseFormat::extraction_schema())
                            .await?;
                        let parsed: ExtractedOpinions = serde_json::from_str(&resp.content)
                            .map_err(|e| {
                                PipelineError::new(ErrorCode::LlmRequestFailed, "malformed extraction response")
                                    .with_source(e)
                            })?;
                        Ok::<_, PipelineError>((parsed.extracted_opinion_list, resp.tokens_used))
                    }
                },
                is_retryable,
            )
            .await;

            match outcome {
                Ok(ok) => (comment, Some(ok.value)),
                Err(err) => {
                    warn!(target: "bl.extraction", comment_id = %comment.id, error = %err, "extraction failed after retries, recording zero arguments");
                    (comment, None)
                }
            }
        }
    })
    .await;

    let mut arguments = Vec::new();
    let mut relations = Vec::new();
    let mut token_usage = 0u64;
    let mut any_succeeded = false;

    for (i, (comment, outcome)) in results.into_iter().enumerate() {
        match outcome {
            Some((opinions, tokens)) => {
                any_succeeded = true;
                token_usage += tokens;
                for (idx, text) in opinions.into_iter().enumerate() {
                    let arg = Argument::new(comment.id.clone(), idx, text);
                    relations.push(Relation::from(&arg));
                    arguments.push(arg);
                }
            }
            None => {}
        }

        let current = i + 1;
        let percentage = (current as f64 / total.max(1) as f64 * 1000.0).round() / 10.0;
        bus.publish(BroadlisteningEvent::Progress {
            step: Stage::Extraction,
            current,
            total,
            percentage,
            message: None,
        });
    }

    if total > 0 && !any_succeeded {
        return Err(PipelineError::new(
            ErrorCode::ExtractionAllFailed,
            "every comment failed opinion extraction",
        ));
    }

    info!(target: "bl.extraction", arguments = arguments.len(), comments = total, "extraction complete");

    Ok(ExtractionOutcome { arguments, relations, token_usage })
}

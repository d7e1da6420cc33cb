// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedding stage (§4.6): embed every argument's text in batches of at
//! most 1000, validating a single dimensionality across the whole run.

use bl_core::model::Argument;
use bl_core::Config;
use bl_error::{ErrorCode, PipelineError, Result};
use bl_llm::EmbeddingClient;
use bl_retry::{is_retryable, retry_async, RetryConfig};
use std::sync::Arc;
use tracing::info;

const MAX_BATCH_SIZE: usize = 1000;

/// Embed every argument in `arguments`, mutating each in place.
///
/// An empty argument list is a no-op success.
pub async fn run(config: &Config, arguments: &mut [Argument], client: Arc<dyn EmbeddingClient>) -> Result<()> {
    if arguments.is_empty() {
        return Ok(());
    }

    let retry_config = RetryConfig::default();
    let mut expected_dim: Option<usize> = None;

    for batch_start in (0..arguments.len()).step_by(MAX_BATCH_SIZE) {
        let batch_end = (batch_start + MAX_BATCH_SIZE).min(arguments.len());
        let texts: Vec<String> = arguments[batch_start..batch_end]
            .iter()
            .map(|a| a.argument.clone())
            .collect();

        let model = config.embedding_model.clone();
        let client = Arc::clone(&client);
        let outcome = retry_async(
            &retry_config,
            || {
                let client = Arc::clone(&client);
                let model = model.clone();
                let texts = texts.clone();
                async move { client.embed(&model, &texts).await }
            },
            is_retryable,
        )
        .await
        .map_err(|e| PipelineError::embedding(ErrorCode::EmbeddingRequestFailed, e.message))?;

        let embeddings = outcome.value;
        if embeddings.len() != texts.len() {
            return Err(PipelineError::embedding(
                ErrorCode::EmbeddingDimensionMismatch,
                format!("expected {} embeddings, got {}", texts.len(), embeddings.len()),
            ));
        }

        for (arg, embedding) in arguments[batch_start..batch_end].iter_mut().zip(embeddings) {
            let dim = embedding.len();
            match expected_dim {
                None => expected_dim = Some(dim),
                Some(expected) if expected != dim => {
                    return Err(PipelineError::embedding(
                        ErrorCode::EmbeddingDimensionMismatch,
                        format!("embedding dimension {dim} does not match earlier dimension {expected}"),
                    ));
                }
                _ => {}
            }
            arg.embedding = Some(embedding);
        }
    }

    info!(target: "bl.embedding", arguments = arguments.len(), dimension = expected_dim, "embedding complete");
    Ok(())
}

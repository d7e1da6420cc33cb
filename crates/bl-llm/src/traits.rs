// SPDX-License-Identifier: MIT OR Apache-2.0
//! The three external collaborators the pipeline core depends on. Each is
//! injected via an async trait; the core owns no endpoint strings, API
//! keys, or provider-specific request shapes.
use crate::response_format::ResponseFormat;
use async_trait::async_trait;
use bl_error::Result;

/// Result of one chat completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Raw response content — a JSON document conforming to the requested
    /// [`ResponseFormat`], or free text for [`ResponseFormat::Text`].
    pub content: String,
    /// Tokens billed for this call (prompt + completion), for status
    /// bookkeeping.
    pub tokens_used: u64,
}

/// An OpenAI-compatible chat endpoint supporting structured outputs.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Perform one chat completion call.
    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
        response_format: ResponseFormat,
    ) -> Result<ChatResponse>;
}

/// An OpenAI-compatible embeddings endpoint.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of strings, returning one vector per input in the
    /// same order. All vectors in a single call share one dimensionality.
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f64>>>;
}

/// A 2D nonlinear dimensionality reducer (UMAP semantics).
#[async_trait]
pub trait Reducer2D: Send + Sync {
    /// Reduce a set of high-dimensional vectors to 2D coordinates, one pair
    /// per input vector, in the same order. `seed` governs the reducer's
    /// internal randomness so a run is reproducible.
    async fn reduce_2d(&self, vectors: &[Vec<f64>], seed: u64) -> Result<Vec<(f64, f64)>>;
}

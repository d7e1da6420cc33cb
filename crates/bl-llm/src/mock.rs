// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory deterministic implementations of the three collaborator
//! traits, for tests and for the end-to-end scenarios in §8.
use crate::response_format::ResponseFormat;
use crate::traits::{ChatClient, ChatResponse, EmbeddingClient, Reducer2D};
use async_trait::async_trait;
use bl_error::{ErrorCode, PipelineError, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A chat stub driven by a user-supplied closure over `(system_prompt,
/// user_message)`. Token usage is approximated by word count, which is
/// adequate for status bookkeeping in tests.
pub struct MockChatClient {
    responder: Arc<dyn Fn(&str, &str) -> serde_json::Value + Send + Sync>,
}

impl MockChatClient {
    /// Build a stub from an arbitrary responder closure.
    pub fn new(responder: impl Fn(&str, &str) -> serde_json::Value + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
        }
    }

    /// Extraction stub: echoes the user message back as the sole extracted
    /// opinion, matching scenario E1 ("LLM stub returning one opinion per
    /// comment equal to `body`").
    pub fn extraction_echo() -> Self {
        Self::new(|_system, user| serde_json::json!({ "extractedOpinionList": [user] }))
    }

    /// Labelling stub: derives a short label from the first line of the
    /// user message.
    pub fn labelling_stub() -> Self {
        Self::new(|_system, user| {
            let label = user.lines().next().unwrap_or("").chars().take(24).collect::<String>();
            serde_json::json!({ "label": label, "description": user })
        })
    }

    /// Overview stub: concatenates the user message into a one-line
    /// summary.
    pub fn overview_stub() -> Self {
        Self::new(|_system, user| {
            serde_json::json!({ "summary": format!("Overview: {user}") })
        })
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn chat(
        &self,
        _model: &str,
        system_prompt: &str,
        user_message: &str,
        _response_format: ResponseFormat,
    ) -> Result<ChatResponse> {
        let value = (self.responder)(system_prompt, user_message);
        let tokens_used = (system_prompt.split_whitespace().count() + user_message.split_whitespace().count()) as u64;
        Ok(ChatResponse {
            content: value.to_string(),
            tokens_used,
        })
    }
}

/// Decorator that fails the first `fail_first_n` calls with a retryable
/// error before delegating to `inner`, for exercising the retry/backoff
/// path (scenario E6).
pub struct FlakyChatClient<C> {
    inner: C,
    remaining_failures: Arc<AtomicU32>,
}

impl<C: ChatClient> FlakyChatClient<C> {
    /// Wrap `inner`, failing the first `fail_first_n` calls.
    pub fn new(inner: C, fail_first_n: u32) -> Self {
        Self {
            inner,
            remaining_failures: Arc::new(AtomicU32::new(fail_first_n)),
        }
    }
}

#[async_trait]
impl<C: ChatClient> ChatClient for FlakyChatClient<C> {
    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
        response_format: ResponseFormat,
    ) -> Result<ChatResponse> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::new(ErrorCode::LlmRequestFailed, "transient failure (mock)"));
        }
        self.inner.chat(model, system_prompt, user_message, response_format).await
    }
}

/// Embedding stub. `Custom` delegates to a closure per input string;
/// `SequentialUnit` returns one-hot vectors sized to the batch, matching
/// scenario E1's `e1, e2, e3 ∈ R³`.
enum EmbeddingMode {
    Custom(Arc<dyn Fn(&str) -> Vec<f64> + Send + Sync>),
    SequentialUnit,
}

/// Deterministic embeddings stub.
pub struct MockEmbeddingClient {
    mode: EmbeddingMode,
}

impl MockEmbeddingClient {
    /// Build a stub from an arbitrary per-input closure.
    pub fn new(embed_fn: impl Fn(&str) -> Vec<f64> + Send + Sync + 'static) -> Self {
        Self {
            mode: EmbeddingMode::Custom(Arc::new(embed_fn)),
        }
    }

    /// Returns the one-hot vectors `e1, ..., en ∈ R^n` for a batch of `n`
    /// inputs, in call order.
    pub fn sequential_unit_vectors() -> Self {
        Self {
            mode: EmbeddingMode::SequentialUnit,
        }
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f64>>> {
        match &self.mode {
            EmbeddingMode::Custom(f) => Ok(inputs.iter().map(|s| f(s)).collect()),
            EmbeddingMode::SequentialUnit => {
                let n = inputs.len();
                Ok((0..n)
                    .map(|i| {
                        let mut v = vec![0.0; n];
                        v[i] = 1.0;
                        v
                    })
                    .collect())
            }
        }
    }
}

/// Dimensionality-reduction stub that returns a fixed, cyclic sequence of
/// coordinates — e.g. `(0,0), (10,0), (0,10)` for scenario E1.
pub struct MockReducer2D {
    coords: Vec<(f64, f64)>,
}

impl MockReducer2D {
    /// Build a stub that returns `coords`, cycling if more vectors are
    /// requested than coordinates were supplied.
    pub fn fixed(coords: Vec<(f64, f64)>) -> Self {
        Self { coords }
    }
}

#[async_trait]
impl Reducer2D for MockReducer2D {
    async fn reduce_2d(&self, vectors: &[Vec<f64>], _seed: u64) -> Result<Vec<(f64, f64)>> {
        if self.coords.is_empty() {
            return Ok(vec![(0.0, 0.0); vectors.len()]);
        }
        Ok((0..vectors.len())
            .map(|i| self.coords[i % self.coords.len()])
            .collect())
    }
}

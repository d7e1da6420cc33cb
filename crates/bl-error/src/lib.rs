// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy for the broadlistening pipeline.
//!
//! Every pipeline error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`PipelineError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Status/lock subsystem errors (concurrent-run detection).
    Status,
    /// Configuration errors.
    Config,
    /// Opinion-extraction stage errors.
    Extraction,
    /// Embedding stage errors.
    Embedding,
    /// Clustering stage errors (dimensionality reduction, k-means, hierarchy).
    Clustering,
    /// Labelling stage errors (initial and merge).
    Labelling,
    /// Overview stage errors.
    Overview,
    /// Aggregation stage errors.
    Aggregation,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Status => "status",
            Self::Config => "config",
            Self::Extraction => "extraction",
            Self::Embedding => "embedding",
            Self::Clustering => "clustering",
            Self::Labelling => "labelling",
            Self::Overview => "overview",
            Self::Aggregation => "aggregation",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Status / lock --
    /// `output_dir/status.json` shows a run still inside its lock window.
    Locked,

    // -- Config --
    /// Configuration is invalid or missing a required field.
    ConfigInvalid,

    // -- Extraction --
    /// Every comment failed opinion extraction.
    ExtractionAllFailed,

    // -- Embedding --
    /// The embeddings endpoint returned vectors of differing length.
    EmbeddingDimensionMismatch,
    /// The embeddings endpoint request failed after exhausting retries.
    EmbeddingRequestFailed,

    // -- Clustering --
    /// A configured `K` was not positive.
    ClusteringNonPositiveK,
    /// A configured `K` exceeded the number of samples.
    ClusteringKExceedsSamples,

    // -- LLM (extraction / labelling / overview share this) --
    /// A chat completion request failed after exhausting retries.
    LlmRequestFailed,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Locked => ErrorCategory::Status,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::ExtractionAllFailed => ErrorCategory::Extraction,
            Self::EmbeddingDimensionMismatch | Self::EmbeddingRequestFailed => {
                ErrorCategory::Embedding
            }
            Self::ClusteringNonPositiveK | Self::ClusteringKExceedsSamples => {
                ErrorCategory::Clustering
            }
            Self::LlmRequestFailed => ErrorCategory::Internal,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"EMBEDDING_DIMENSION_MISMATCH"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ExtractionAllFailed => "EXTRACTION_ALL_FAILED",
            Self::EmbeddingDimensionMismatch => "EMBEDDING_DIMENSION_MISMATCH",
            Self::EmbeddingRequestFailed => "EMBEDDING_REQUEST_FAILED",
            Self::ClusteringNonPositiveK => "CLUSTERING_NON_POSITIVE_K",
            Self::ClusteringKExceedsSamples => "CLUSTERING_K_EXCEEDS_SAMPLES",
            Self::LlmRequestFailed => "LLM_REQUEST_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Unified pipeline error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use bl_error::{PipelineError, ErrorCode};
///
/// let err = PipelineError::new(ErrorCode::ClusteringKExceedsSamples, "k=50 but only 10 samples")
///     .with_context("k", 50)
///     .with_context("n_samples", 10);
/// ```
pub struct PipelineError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl PipelineError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// `output_dir/status.json` indicates a run still inside its lock window.
    pub fn locked(status_path: impl Into<String>) -> Self {
        let path = status_path.into();
        Self::new(
            ErrorCode::Locked,
            format!("pipeline is locked by an in-progress run: {path}"),
        )
        .with_context("status_path", path)
    }

    /// A chat-completion request failed after exhausting retries.
    pub fn llm(message: impl Into<String>, attempts: u32) -> Self {
        Self::new(ErrorCode::LlmRequestFailed, message).with_context("attempts", attempts)
    }

    /// An embeddings request failed, either on transport or on a dimension
    /// mismatch across the batch.
    pub fn embedding(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert!(matches!(
            code,
            ErrorCode::EmbeddingDimensionMismatch | ErrorCode::EmbeddingRequestFailed
        ));
        Self::new(code, message)
    }

    /// A k-means precondition was violated (`K <= 0` or `K > N`).
    pub fn clustering(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert!(matches!(
            code,
            ErrorCode::ClusteringNonPositiveK | ErrorCode::ClusteringKExceedsSamples
        ));
        Self::new(code, message)
    }

    /// Configuration is invalid or missing a required field.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Catch-all for unexpected internal errors.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Debug for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("PipelineError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::Locked,
        ErrorCode::ConfigInvalid,
        ErrorCode::ExtractionAllFailed,
        ErrorCode::EmbeddingDimensionMismatch,
        ErrorCode::EmbeddingRequestFailed,
        ErrorCode::ClusteringNonPositiveK,
        ErrorCode::ClusteringKExceedsSamples,
        ErrorCode::LlmRequestFailed,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = PipelineError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = PipelineError::new(ErrorCode::ConfigInvalid, "missing model");
        assert_eq!(err.to_string(), "[CONFIG_INVALID] missing model");
    }

    #[test]
    fn display_with_context() {
        let err = PipelineError::new(ErrorCode::ClusteringKExceedsSamples, "bad k")
            .with_context("k", 50)
            .with_context("n", 10);
        let s = err.to_string();
        assert!(s.starts_with("[CLUSTERING_K_EXCEEDS_SAMPLES] bad k"));
        assert!(s.contains("\"k\":50"));
        assert!(s.contains("\"n\":10"));
    }

    #[test]
    fn locked_constructor_sets_context() {
        let err = PipelineError::locked("/tmp/out/status.json");
        assert_eq!(err.code, ErrorCode::Locked);
        assert_eq!(
            err.context["status_path"],
            serde_json::json!("/tmp/out/status.json")
        );
    }

    #[test]
    fn llm_constructor_sets_attempts() {
        let err = PipelineError::llm("timed out", 3);
        assert_eq!(err.code, ErrorCode::LlmRequestFailed);
        assert_eq!(err.context["attempts"], serde_json::json!(3));
    }

    #[test]
    fn source_chain_preserved() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = PipelineError::internal("load failed").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn categories_match_expected() {
        assert_eq!(ErrorCode::Locked.category(), ErrorCategory::Status);
        assert_eq!(ErrorCode::ConfigInvalid.category(), ErrorCategory::Config);
        assert_eq!(
            ErrorCode::ExtractionAllFailed.category(),
            ErrorCategory::Extraction
        );
        assert_eq!(
            ErrorCode::EmbeddingDimensionMismatch.category(),
            ErrorCategory::Embedding
        );
        assert_eq!(
            ErrorCode::EmbeddingRequestFailed.category(),
            ErrorCategory::Embedding
        );
        assert_eq!(
            ErrorCode::ClusteringNonPositiveK.category(),
            ErrorCategory::Clustering
        );
        assert_eq!(
            ErrorCode::ClusteringKExceedsSamples.category(),
            ErrorCategory::Clustering
        );
        assert_eq!(ErrorCode::Internal.category(), ErrorCategory::Internal);
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()));
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
        }
    }

    #[test]
    fn error_code_serde_roundtrip() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, code);
        }
    }
}

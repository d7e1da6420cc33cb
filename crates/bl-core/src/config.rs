// SPDX-License-Identifier: MIT OR Apache-2.0
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// System prompts for each LLM-bound stage.
///
/// Exact prompt strings are a deployment concern; this crate only carries
/// them through — it never ships defaults beyond empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Prompts {
    /// System prompt for the extraction stage.
    #[serde(default)]
    pub extraction: String,
    /// System prompt for the initial-labelling stage.
    #[serde(default)]
    pub initial_labelling: String,
    /// System prompt for the merge-labelling stage.
    #[serde(default)]
    pub merge_labelling: String,
    /// System prompt for the overview stage.
    #[serde(default)]
    pub overview: String,
}

/// Configuration recognized by the pipeline core.
///
/// Provider/endpoint details (API keys, base URLs) belong to the injected
/// `bl-llm` collaborators, not here — this struct only carries the
/// parameters the core's own algorithms are sensitive to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Chat model identifier used by extraction, labelling, and overview.
    pub model: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Explicit, ascending list of `K` values for flat partitioning.
    /// Mutually exclusive in practice with `auto_cluster_nums`, though
    /// both may be present — `auto_cluster_nums` only fills this in when
    /// it is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_nums: Option<Vec<usize>>,
    /// When true and `cluster_nums` is absent, derive it from the comment
    /// count (see `bl_clustering::auto_cluster_nums`).
    #[serde(default)]
    pub auto_cluster_nums: bool,
    /// Size of the bounded worker pool used by stages that make external
    /// requests.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// System prompts for each LLM-bound stage.
    pub prompts: Prompts,
    /// If set, only the first `limit` comments (deterministic prefix) are
    /// processed by extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Seed for k-means initialization and empty-cluster reassignment.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

fn default_workers() -> usize {
    10
}

fn default_random_state() -> u64 {
    42
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: String::new(),
            embedding_model: String::new(),
            cluster_nums: None,
            auto_cluster_nums: false,
            workers: default_workers(),
            prompts: Prompts::default(),
            limit: None,
            random_state: default_random_state(),
        }
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            extraction: String::new(),
            initial_labelling: String::new(),
            merge_labelling: String::new(),
            overview: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workers_is_ten() {
        assert_eq!(Config::default().workers, 10);
    }

    #[test]
    fn serde_roundtrip_with_cluster_nums() {
        let mut cfg = Config::default();
        cfg.model = "gpt-4o-mini".into();
        cfg.embedding_model = "text-embedding-3-small".into();
        cfg.cluster_nums = Some(vec![2, 3]);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn json_schema_generates() {
        let schema = schemars::schema_for!(Config);
        let value = serde_json::to_value(&schema).unwrap();
        assert!(value.get("properties").is_some());
    }
}

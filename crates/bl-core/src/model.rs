// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// An input comment. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Stable identifier, unique within a run (duplicates are tolerated —
    /// see invariant 12 — but not recommended).
    pub id: String,
    /// Raw comment text.
    pub body: String,
    /// Originating proposal, if the source tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    /// Originating URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Free-form attribute columns (e.g. `attribute_age`, `attribute_region`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// An opinion extracted from a single comment.
///
/// Created empty-bodied by extraction, then progressively enriched by
/// embedding (`embedding`) and clustering (`x`, `y`, `cluster_ids`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// `"A<comment_id>_<idx>"`, unique within a run.
    pub arg_id: String,
    /// Extracted opinion text.
    pub argument: String,
    /// The comment this opinion was extracted from.
    pub comment_id: String,
    /// Embedding vector, assigned by the embedding stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
    /// 2D projection, assigned by the clustering stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// 2D projection, assigned by the clustering stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Root-to-leaf cluster path, e.g. `["0", "1_0", "2_3"]`.
    #[serde(default)]
    pub cluster_ids: Vec<String>,
}

impl Argument {
    /// Build the `arg_id` for the `index`-th opinion extracted from
    /// `comment_id` (zero-based).
    pub fn make_id(comment_id: &str, index: usize) -> String {
        format!("A{comment_id}_{index}")
    }

    /// Construct a freshly extracted argument with no embedding or
    /// cluster assignment yet.
    pub fn new(comment_id: impl Into<String>, index: usize, text: impl Into<String>) -> Self {
        let comment_id = comment_id.into();
        Self {
            arg_id: Self::make_id(&comment_id, index),
            argument: text.into(),
            comment_id,
            embedding: None,
            x: None,
            y: None,
            cluster_ids: Vec::new(),
        }
    }
}

/// The `(arg_id, comment_id)` pair, persisted separately from
/// [`Argument`] so extraction output can be reloaded without re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// The argument's id.
    pub arg_id: String,
    /// The originating comment's id.
    pub comment_id: String,
}

impl From<&Argument> for Relation {
    fn from(arg: &Argument) -> Self {
        Relation {
            arg_id: arg.arg_id.clone(),
            comment_id: arg.comment_id.clone(),
        }
    }
}

/// For each 1-based level (the position of a `K` in `config.cluster_nums`,
/// sorted ascending — not `K` itself, since two levels could in principle
/// share a `K`), the cluster index assigned to each argument, indexed by
/// that argument's position in `context.arguments`.
pub type ClusterResults = BTreeMap<usize, Vec<usize>>;

/// A label assigned to one cluster at one level.
///
/// Two parallel stores exist during a run: the *initial* store (leaf-only,
/// written by the initial-labelling stage) and the *merged* store (every
/// non-root level, written by the merge-labelling stage, which copies the
/// leaf entries through unchanged).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLabel {
    /// Cluster id, e.g. `"2_3"`.
    pub cluster_id: String,
    /// Hierarchy level (1-based; level 0 is the synthetic root).
    pub level: usize,
    /// Short label.
    pub label: String,
    /// Longer description ("takeaway" in the output view).
    pub description: String,
}

/// One row of the final `clusters` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Hierarchy level; 0 is the synthetic root.
    pub level: usize,
    /// Cluster id; `"0"` for the root, `"<level>_<k>"` otherwise.
    pub id: String,
    /// Short label (empty string for the root, which is named at
    /// aggregation time, and for clusters whose labelling failed).
    pub label: String,
    /// Longer description.
    pub takeaway: String,
    /// Count of arguments whose `cluster_ids` includes this id.
    pub value: usize,
    /// Parent cluster id; `""` for the root.
    pub parent: String,
    /// `1 / (mean distance from centroid + 1e-10)`; not serialized — the
    /// wire format only carries the derived percentile.
    #[serde(skip_serializing, default)]
    pub density: f64,
    /// Dense rank by descending density (1 = densest); not serialized.
    #[serde(skip_serializing, default)]
    pub density_rank: usize,
    /// `(rank - 1) / max(1, total_clusters - 1)`; `None` for the root.
    pub density_rank_percentile: Option<f64>,
}

/// A single entry of the output `comments` map: comments that produced at
/// least one argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentEntry {
    /// Original comment body.
    pub comment: String,
}

/// One row of the final `arguments` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputArgument {
    /// The argument's id.
    pub arg_id: String,
    /// Extracted opinion text.
    pub argument: String,
    /// Numeric form of the originating comment id (see
    /// [`crate::numeric_comment_id`]).
    pub comment_id: i64,
    /// 2D projection x-coordinate.
    pub x: f64,
    /// 2D projection y-coordinate.
    pub y: f64,
    /// Reserved polarity field; always `0` in this implementation.
    pub p: i32,
    /// Root-to-leaf cluster path.
    pub cluster_ids: Vec<String>,
    /// Free-form attributes carried through from the source comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    /// Source URL carried through from the source comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The top-level output artifact (`hierarchical_result.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// One row per extracted argument.
    pub arguments: Vec<OutputArgument>,
    /// One row per cluster, including the synthetic root.
    pub clusters: Vec<Cluster>,
    /// Comments that produced at least one argument, keyed by comment id.
    pub comments: BTreeMap<String, CommentEntry>,
    /// Reserved for downstream consumers; always empty here.
    #[serde(default, rename = "propertyMap")]
    pub property_map: BTreeMap<String, serde_json::Value>,
    /// Reserved for downstream consumers; always empty here.
    #[serde(default)]
    pub translations: BTreeMap<String, serde_json::Value>,
    /// Overview paragraph, or `None` if no cluster produced a label.
    pub overview: Option<String>,
    /// The configuration this result was produced under.
    pub config: crate::config::Config,
    /// Number of input comments.
    pub comment_num: usize,
}

/// Record of one stage's execution, retained in `status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJob {
    /// Which stage ran.
    pub step: Stage,
    /// When it finished.
    #[serde(with = "bl_duration_serde::rfc3339")]
    pub completed: chrono::DateTime<chrono::Utc>,
    /// How long it took.
    #[serde(with = "bl_duration_serde::duration_millis")]
    pub duration: Duration,
    /// The tracked parameter set this run used, for change detection on
    /// the next invocation (long strings replaced with their SHA-256 hex).
    pub params: BTreeMap<String, serde_json::Value>,
    /// Tokens consumed during this stage, if it calls an LLM.
    pub token_usage: u64,
}

/// One planner decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Which stage this decision concerns.
    pub step: Stage,
    /// Whether the stage should execute.
    pub run: bool,
    /// Human-readable justification (also used verbatim in tests).
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_id_format() {
        assert_eq!(Argument::make_id("12", 0), "A12_0");
        assert_eq!(Argument::make_id("abc", 3), "Aabc_3");
    }

    #[test]
    fn relation_from_argument() {
        let arg = Argument::new("7", 2, "buses");
        let rel = Relation::from(&arg);
        assert_eq!(rel.arg_id, "A7_2");
        assert_eq!(rel.comment_id, "7");
    }

    #[test]
    fn cluster_skips_internal_density_fields_on_serialize() {
        let cluster = Cluster {
            level: 1,
            id: "1_0".into(),
            label: "parks".into(),
            takeaway: "people like parks".into(),
            value: 3,
            parent: "0".into(),
            density: 12.5,
            density_rank: 1,
            density_rank_percentile: Some(0.0),
        };
        let json = serde_json::to_value(&cluster).unwrap();
        assert!(json.get("density").is_none());
        assert!(json.get("density_rank").is_none());
        assert_eq!(json["density_rank_percentile"], serde_json::json!(0.0));
    }

    #[test]
    fn comment_serializes_without_empty_optionals() {
        let comment = Comment {
            id: "1".into(),
            body: "hello".into(),
            proposal_id: None,
            source_url: None,
            attributes: BTreeMap::new(),
        };
        let json = serde_json::to_value(&comment).unwrap();
        assert!(json.get("proposal_id").is_none());
        assert!(json.get("source_url").is_none());
        assert!(json.get("attributes").is_none());
    }
}

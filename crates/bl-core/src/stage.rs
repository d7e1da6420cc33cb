// SPDX-License-Identifier: MIT OR Apache-2.0
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven stages of the pipeline, in execution order.
///
/// The ordinal ([`Stage::index`]) is load-bearing: the planner's
/// `from_step` comparison and the dependency cascade both reason about
/// stages by position in this sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Extract opinions from raw comments via the chat LLM.
    Extraction,
    /// Embed each argument's text.
    Embedding,
    /// Reduce to 2D, run k-means per configured `K`, assemble the hierarchy.
    Clustering,
    /// Label every deepest-level (leaf) cluster.
    InitialLabelling,
    /// Label every non-leaf, non-root cluster bottom-up.
    MergeLabelling,
    /// Summarize level-1 clusters into a single overview paragraph.
    Overview,
    /// Assemble the final result artifact.
    Aggregation,
}

/// All stages, in pipeline order. Used by the planner and the orchestrator
/// to iterate deterministically.
pub const ALL_STAGES: [Stage; 7] = [
    Stage::Extraction,
    Stage::Embedding,
    Stage::Clustering,
    Stage::InitialLabelling,
    Stage::MergeLabelling,
    Stage::Overview,
    Stage::Aggregation,
];

impl Stage {
    /// Zero-based position of this stage in [`ALL_STAGES`].
    pub fn index(&self) -> usize {
        ALL_STAGES.iter().position(|s| s == self).expect("Stage is exhaustively listed in ALL_STAGES")
    }

    /// Immediate dependency: the stage whose completion is required before
    /// this one may run. `None` for the first stage.
    pub fn dependency(&self) -> Option<Stage> {
        let i = self.index();
        if i == 0 {
            None
        } else {
            Some(ALL_STAGES[i - 1])
        }
    }

    /// Stable lowercase snake_case name, matching the wire form used in
    /// `status.json` and observability event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Embedding => "embedding",
            Stage::Clustering => "clustering",
            Stage::InitialLabelling => "initial_labelling",
            Stage::MergeLabelling => "merge_labelling",
            Stage::Overview => "overview",
            Stage::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_sequential() {
        for (i, stage) in ALL_STAGES.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn dependency_chain_matches_order() {
        assert_eq!(Stage::Extraction.dependency(), None);
        assert_eq!(Stage::Embedding.dependency(), Some(Stage::Extraction));
        assert_eq!(Stage::Clustering.dependency(), Some(Stage::Embedding));
        assert_eq!(Stage::InitialLabelling.dependency(), Some(Stage::Clustering));
        assert_eq!(Stage::MergeLabelling.dependency(), Some(Stage::InitialLabelling));
        assert_eq!(Stage::Overview.dependency(), Some(Stage::MergeLabelling));
        assert_eq!(Stage::Aggregation.dependency(), Some(Stage::Overview));
    }

    #[test]
    fn serde_roundtrip() {
        for stage in ALL_STAGES {
            let json = serde_json::to_string(&stage).unwrap();
            let back: Stage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, stage);
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Readers/writers for the pipeline's JSON artifacts: `embeddings.json` and
//! the final `hierarchical_result.json`.
use crate::model::PipelineResult;
use bl_error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct EmbeddingEntry {
    arg_id: String,
    embedding: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct EmbeddingsFile {
    arguments: Vec<EmbeddingEntry>,
}

fn io_err(e: std::io::Error) -> PipelineError {
    PipelineError::internal(e.to_string()).with_source(e)
}

fn json_err(e: serde_json::Error) -> PipelineError {
    PipelineError::internal(e.to_string()).with_source(e)
}

/// Write `embeddings.json`: `{"arguments": [{"arg_id", "embedding"}, ...]}`,
/// pretty-printed.
pub fn write_embeddings_json(
    path: impl AsRef<Path>,
    embeddings: &[(String, Vec<f64>)],
) -> Result<()> {
    let file = EmbeddingsFile {
        arguments: embeddings
            .iter()
            .map(|(arg_id, embedding)| EmbeddingEntry {
                arg_id: arg_id.clone(),
                embedding: embedding.clone(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&file).map_err(json_err)?;
    std::fs::write(path, json).map_err(io_err)
}

/// Read `embeddings.json` back into `(arg_id, embedding)` pairs, in file
/// order.
pub fn read_embeddings_json(path: impl AsRef<Path>) -> Result<Vec<(String, Vec<f64>)>> {
    let raw = std::fs::read_to_string(path).map_err(io_err)?;
    let file: EmbeddingsFile = serde_json::from_str(&raw).map_err(json_err)?;
    Ok(file
        .arguments
        .into_iter()
        .map(|e| (e.arg_id, e.embedding))
        .collect())
}

/// Write the final `hierarchical_result.json` artifact, pretty-printed.
pub fn write_hierarchical_result(path: impl AsRef<Path>, result: &PipelineResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).map_err(json_err)?;
    std::fs::write(path, json).map_err(io_err)
}

/// Read back a previously written `hierarchical_result.json`.
pub fn read_hierarchical_result(path: impl AsRef<Path>) -> Result<PipelineResult> {
    let raw = std::fs::read_to_string(path).map_err(io_err)?;
    serde_json::from_str(&raw).map_err(json_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let embeddings = vec![
            ("A1_0".to_string(), vec![1.0, 0.0, 0.0]),
            ("A2_0".to_string(), vec![0.0, 1.0, 0.0]),
        ];
        write_embeddings_json(&path, &embeddings).unwrap();
        let back = read_embeddings_json(&path).unwrap();
        assert_eq!(back, embeddings);
    }

    #[test]
    fn embeddings_json_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        write_embeddings_json(&path, &[("A1_0".into(), vec![1.0])]).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains('\n'));
    }
}

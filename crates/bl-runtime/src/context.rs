// SPDX-License-Identifier: MIT OR Apache-2.0
//! The shared execution context threaded through every stage (§4.4).

use bl_core::csv_io;
use bl_core::json_io;
use bl_core::model::{Argument, Cluster, ClusterResults, Comment, PipelineResult, Relation};
use bl_core::Stage;
use bl_error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Owns every piece of data that flows between stages, plus the on-disk
/// location it is (partially) mirrored to.
///
/// Comments are supplied by the caller at run start and are never
/// (re)loaded from disk here — they are not a stage *output*.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Input comments for this run.
    pub comments: Vec<Comment>,
    /// Extracted, progressively enriched opinions.
    pub arguments: Vec<Argument>,
    /// `(arg_id, comment_id)` pairs, redundant with `arguments` but kept in
    /// lockstep so `relations.csv` can be reloaded without re-deriving.
    pub relations: Vec<Relation>,
    /// Flat per-level partition assignment, indexed by argument position.
    pub cluster_results: ClusterResults,
    /// Leaf-cluster labels produced by initial labelling, before merge
    /// labelling folds them (unchanged) into `clusters`.
    pub initial_labels: BTreeMap<String, (String, String)>,
    /// Every non-root cluster's full record (label, description, value,
    /// parent, density), filled in by merge labelling.
    pub clusters: Vec<Cluster>,
    /// Overview paragraph, once the overview stage has run.
    pub overview: Option<String>,
    /// The final aggregated artifact, once aggregation has run.
    pub result: Option<PipelineResult>,
    /// Cumulative LLM/embedding tokens consumed so far this run.
    pub token_usage: u64,
    /// The output directory this context mirrors to disk.
    pub output_dir: PathBuf,
}

impl Context {
    /// A fresh, empty context rooted at `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Populate a context from whichever subset of `dir`'s output files
    /// exists, in stage order, so later files enrich earlier data.
    ///
    /// Missing files are tolerated; this is what makes `from_step`
    /// resumption and crash recovery possible.
    pub fn load_from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut ctx = Self::new(dir.clone());

        let args_path = dir.join("args.csv");
        let relations_path = dir.join("relations.csv");
        if args_path.is_file() && relations_path.is_file() {
            let args = csv_io::read_args_csv(&args_path)?;
            let relations = csv_io::read_relations_csv(&relations_path)?;
            let comment_by_arg: BTreeMap<String, String> =
                relations.iter().cloned().collect();
            ctx.arguments = args
                .into_iter()
                .map(|(arg_id, argument)| {
                    let comment_id = comment_by_arg.get(&arg_id).cloned().unwrap_or_default();
                    Argument {
                        arg_id,
                        argument,
                        comment_id,
                        embedding: None,
                        x: None,
                        y: None,
                        cluster_ids: Vec::new(),
                    }
                })
                .collect();
            ctx.relations = ctx.arguments.iter().map(Relation::from).collect();
        }

        let embeddings_path = dir.join("embeddings.json");
        if embeddings_path.is_file() && !ctx.arguments.is_empty() {
            let embeddings = json_io::read_embeddings_json(&embeddings_path)?;
            let by_id: BTreeMap<String, Vec<f64>> = embeddings.into_iter().collect();
            for arg in &mut ctx.arguments {
                if let Some(vec) = by_id.get(&arg.arg_id) {
                    arg.embedding = Some(vec.clone());
                }
            }
        }

        let clustering_path = dir.join("clustering.csv");
        if clustering_path.is_file() && !ctx.arguments.is_empty() {
            let rows = csv_io::read_clustering_csv(&clustering_path)?;
            let by_id: BTreeMap<String, csv_io::ClusteringRow> =
                rows.into_iter().map(|r| (r.arg_id.clone(), r)).collect();
            for arg in &mut ctx.arguments {
                if let Some(row) = by_id.get(&arg.arg_id) {
                    arg.x = Some(row.x);
                    arg.y = Some(row.y);
                    arg.cluster_ids = row.cluster_ids.clone();
                }
            }
            ctx.cluster_results = derive_cluster_results(&ctx.arguments);
        }

        let initial_labels_path = dir.join("initial_labels.csv");
        if initial_labels_path.is_file() {
            ctx.initial_labels = csv_io::read_initial_labels_csv(&initial_labels_path)?;
        }

        let merge_labels_path = dir.join("merge_labels.csv");
        if merge_labels_path.is_file() {
            ctx.clusters = csv_io::read_merge_labels_csv(&merge_labels_path)?;
        }

        let overview_path = dir.join("overview.txt");
        if overview_path.is_file() {
            ctx.overview = Some(csv_io::read_overview_txt(&overview_path)?);
        }

        let result_path = dir.join("hierarchical_result.json");
        if result_path.is_file() {
            ctx.result = Some(json_io::read_hierarchical_result(&result_path)?);
        }

        Ok(ctx)
    }

    /// Write only `step`'s declared output files to `dir`.
    pub fn save_step(&self, step: Stage, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| {
            bl_error::PipelineError::internal(format!(
                "failed to create output directory {}: {e}",
                dir.display()
            ))
        })?;
        match step {
            Stage::Extraction => {
                csv_io::write_args_csv(dir.join("args.csv"), &self.arguments)?;
                csv_io::write_relations_csv(dir.join("relations.csv"), &self.arguments)?;
            }
            Stage::Embedding => {
                let embeddings: Vec<(String, Vec<f64>)> = self
                    .arguments
                    .iter()
                    .map(|a| (a.arg_id.clone(), a.embedding.clone().unwrap_or_default()))
                    .collect();
                json_io::write_embeddings_json(dir.join("embeddings.json"), &embeddings)?;
            }
            Stage::Clustering => {
                let num_levels = self.cluster_results.len();
                csv_io::write_clustering_csv(dir.join("clustering.csv"), &self.arguments, num_levels)?;
            }
            Stage::InitialLabelling => {
                let num_levels = self.cluster_results.len();
                csv_io::write_initial_labels_csv(
                    dir.join("initial_labels.csv"),
                    &self.arguments,
                    num_levels,
                    &self.initial_labels,
                )?;
            }
            Stage::MergeLabelling => {
                csv_io::write_merge_labels_csv(dir.join("merge_labels.csv"), &self.clusters)?;
            }
            Stage::Overview => {
                csv_io::write_overview_txt(
                    dir.join("overview.txt"),
                    self.overview.as_deref().unwrap_or(""),
                )?;
            }
            Stage::Aggregation => {
                if let Some(result) = &self.result {
                    json_io::write_hierarchical_result(dir.join("hierarchical_result.json"), result)?;
                }
            }
        }
        Ok(())
    }

    /// Declared output file names for `step`, used by the Planner's
    /// missing-output-file check (§4.2).
    pub fn output_files(step: Stage) -> &'static [&'static str] {
        match step {
            Stage::Extraction => &["args.csv", "relations.csv"],
            Stage::Embedding => &["embeddings.json"],
            Stage::Clustering => &["clustering.csv"],
            Stage::InitialLabelling => &["initial_labels.csv"],
            Stage::MergeLabelling => &["merge_labels.csv"],
            Stage::Overview => &["overview.txt"],
            Stage::Aggregation => &["hierarchical_result.json"],
        }
    }
}

/// Rebuild the level-keyed flat-partition map from each argument's already
/// assigned `cluster_ids` path (used when reloading `clustering.csv`
/// without re-running k-means).
fn derive_cluster_results(arguments: &[Argument]) -> ClusterResults {
    let mut out: ClusterResults = BTreeMap::new();
    let max_levels = arguments
        .iter()
        .map(|a| a.cluster_ids.len().saturating_sub(1))
        .max()
        .unwrap_or(0);
    for level in 1..=max_levels {
        let assignment = arguments
            .iter()
            .map(|a| {
                a.cluster_ids
                    .get(level)
                    .and_then(|id| id.split('_').nth(1))
                    .and_then(|k| k.parse::<usize>().ok())
                    .unwrap_or(0)
            })
            .collect();
        out.insert(level, assignment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_arguments() -> Vec<Argument> {
        let mut a0 = Argument::new("1", 0, "parks");
        a0.x = Some(0.0);
        a0.y = Some(0.0);
        a0.cluster_ids = vec!["0".into(), "1_0".into()];
        let mut a1 = Argument::new("2", 0, "buses");
        a1.x = Some(10.0);
        a1.y = Some(0.0);
        a1.cluster_ids = vec!["0".into(), "1_1".into()];
        vec![a0, a1]
    }

    #[test]
    fn save_then_load_extraction_step_roundtrips_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::new(dir.path());
        ctx.arguments = sample_arguments();
        ctx.arguments.iter_mut().for_each(|a| {
            a.x = None;
            a.y = None;
            a.cluster_ids.clear();
        });
        ctx.save_step(Stage::Extraction, dir.path()).unwrap();

        let loaded = Context::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.arguments.len(), 2);
        assert_eq!(loaded.arguments[0].arg_id, "A1_0");
        assert_eq!(loaded.arguments[0].comment_id, "1");
    }

    #[test]
    fn save_then_load_clustering_step_derives_cluster_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::new(dir.path());
        ctx.arguments = sample_arguments();
        let mut level1 = BTreeMap::new();
        level1.insert(1usize, vec![0usize, 1usize]);
        ctx.cluster_results = level1;
        ctx.save_step(Stage::Extraction, dir.path()).unwrap();
        ctx.save_step(Stage::Clustering, dir.path()).unwrap();

        let loaded = Context::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.cluster_results[&1], vec![0, 1]);
        assert_eq!(loaded.arguments[1].cluster_ids, vec!["0", "1_1"]);
    }

    #[test]
    fn save_then_load_initial_labelling_step_reloads_initial_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::new(dir.path());
        ctx.arguments = sample_arguments();
        let mut level1 = BTreeMap::new();
        level1.insert(1usize, vec![0usize, 1usize]);
        ctx.cluster_results = level1;
        ctx.initial_labels.insert("1_0".into(), ("parks".into(), "people like parks".into()));
        ctx.initial_labels.insert("1_1".into(), ("buses".into(), "buses are slow".into()));
        ctx.save_step(Stage::Extraction, dir.path()).unwrap();
        ctx.save_step(Stage::Clustering, dir.path()).unwrap();
        ctx.save_step(Stage::InitialLabelling, dir.path()).unwrap();

        let loaded = Context::load_from_dir(dir.path()).unwrap();
        assert_eq!(
            loaded.initial_labels.get("1_0").unwrap(),
            &("parks".to_string(), "people like parks".to_string())
        );
        assert_eq!(
            loaded.initial_labels.get("1_1").unwrap(),
            &("buses".to_string(), "buses are slow".to_string())
        );
    }

    #[test]
    fn load_from_empty_dir_is_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::load_from_dir(dir.path()).unwrap();
        assert!(ctx.arguments.is_empty());
        assert!(ctx.clusters.is_empty());
        assert!(ctx.overview.is_none());
    }

    #[test]
    fn output_files_are_declared_per_stage() {
        assert_eq!(Context::output_files(Stage::Extraction), &["args.csv", "relations.csv"]);
        assert_eq!(Context::output_files(Stage::Aggregation), &["hierarchical_result.json"]);
    }
}

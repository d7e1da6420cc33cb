// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use bl_core::model::Comment;
use bl_core::{Config, Stage};
use bl_llm::{MockChatClient, MockEmbeddingClient, MockReducer2D};
use bl_runtime::{Collaborators, EventBus, RunOptions};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bl", version, about = "Broadlistening pipeline runner")]
struct Cli {
    /// Input comments file (`.json`: array of comment objects; `.csv`:
    /// `id,body[,proposal_id,source_url]` header).
    input: PathBuf,

    /// Output/working directory. Reused across runs for incremental
    /// re-execution and resume.
    output: PathBuf,

    /// Pipeline configuration JSON file (see `bl_core::Config`). Defaults
    /// to an empty configuration if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-run every stage regardless of prior state.
    #[arg(long)]
    force: bool,

    /// Run only this stage.
    #[arg(long)]
    only: Option<StageArg>,

    /// Run this stage and every stage after it.
    #[arg(long)]
    from_step: Option<StageArg>,

    /// Seed the output directory from a previously completed run before
    /// starting (see `RunOptions::input_dir`).
    #[arg(long)]
    resume_from: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum StageArg {
    Extraction,
    Embedding,
    Clustering,
    InitialLabelling,
    MergeLabelling,
    Overview,
    Aggregation,
}

impl From<StageArg> for Stage {
    fn from(v: StageArg) -> Self {
        match v {
            StageArg::Extraction => Stage::Extraction,
            StageArg::Embedding => Stage::Embedding,
            StageArg::Clustering => Stage::Clustering,
            StageArg::InitialLabelling => Stage::InitialLabelling,
            StageArg::MergeLabelling => Stage::MergeLabelling,
            StageArg::Overview => Stage::Overview,
            StageArg::Aggregation => Stage::Aggregation,
        }
    }
}

/// Exit code used when the pipeline itself raises an error.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("bl=debug") } else { EnvFilter::new("bl=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let comments = load_comments(&cli.input)?;

    let options = RunOptions {
        force: cli.force,
        only: cli.only.map(Stage::from),
        from_step: cli.from_step.map(Stage::from),
        input_dir: cli.resume_from,
    };

    // No networked chat/embedding/reducer implementation ships in this
    // workspace (those are external collaborators, injected at the call
    // site); wire in real `bl_llm::ChatClient`/`EmbeddingClient`/`Reducer2D`
    // implementations here to run against a live provider. The mocks below
    // make the binary runnable standalone.
    let collaborators = Collaborators {
        chat: Arc::new(MockChatClient::extraction_echo()),
        embedding: Arc::new(MockEmbeddingClient::sequential_unit_vectors()),
        reducer: Arc::new(MockReducer2D::fixed(Vec::new())),
    };

    let bus = EventBus::new();
    let result = bl_runtime::run(&config, comments, &cli.output, options, collaborators, &bus)
        .await
        .context("pipeline run failed")?;

    println!(
        "comments={} arguments={} clusters={}",
        result.comment_num,
        result.arguments.len(),
        result.clusters.len()
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read config file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse config from '{}'", path.display()))
}

fn load_comments(path: &Path) -> Result<Vec<Comment>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => load_comments_csv(path),
        _ => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read input file '{}'", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parse comments from '{}'", path.display()))
        }
    }
}

fn load_comments_csv(path: &Path) -> Result<Vec<Comment>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open input file '{}'", path.display()))?;
    let headers = reader.headers().context("read CSV header")?.clone();
    let mut comments = Vec::new();
    for record in reader.records() {
        let record = record.context("read CSV record")?;
        let mut id = None;
        let mut body = None;
        let mut proposal_id = None;
        let mut source_url = None;
        let mut attributes = std::collections::BTreeMap::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            match name {
                "id" => id = Some(value.to_string()),
                "body" | "comment" => body = Some(value.to_string()),
                "proposal_id" => proposal_id = (!value.is_empty()).then(|| value.to_string()),
                "source_url" => source_url = (!value.is_empty()).then(|| value.to_string()),
                other => {
                    if !value.is_empty() {
                        attributes.insert(other.to_string(), value.to_string());
                    }
                }
            }
        }
        let id = id.with_context(|| format!("CSV row missing 'id' column in '{}'", path.display()))?;
        let body = body.with_context(|| format!("CSV row missing 'body' column in '{}'", path.display()))?;
        comments.push(Comment { id, body, proposal_id, source_url, attributes });
    }
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_arg_maps_onto_every_stage() {
        assert_eq!(Stage::from(StageArg::Extraction), Stage::Extraction);
        assert_eq!(Stage::from(StageArg::Aggregation), Stage::Aggregation);
    }

    #[test]
    fn loads_comments_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comments.json");
        std::fs::write(&path, r#"[{"id":"1","body":"parks are great"}]"#).unwrap();
        let comments = load_comments(&path).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "parks are great");
    }

    #[test]
    fn loads_comments_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comments.csv");
        std::fs::write(&path, "id,body,source_url\n1,parks are great,https://example.com\n").unwrap();
        let comments = load_comments(&path).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].source_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn loads_default_config_when_unset() {
        assert_eq!(load_config(Path::new("/nonexistent/path")).is_err(), true);
    }
}

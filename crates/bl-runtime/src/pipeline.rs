// SPDX-License-Identifier: MIT OR Apache-2.0
//! The orchestrator (§4.1): ties the planner, status/lock, context, and
//! stage implementations into one `run` entry point.

use crate::bus::{BroadlisteningEvent, EventBus};
use crate::context::Context;
use crate::planner::{tracked_params, Planner};
use crate::stages;
use crate::status::Status;
use bl_core::model::{Comment, PipelineResult};
use bl_core::{Config, Stage, ALL_STAGES};
use bl_error::{PipelineError, Result};
use bl_llm::{ChatClient, EmbeddingClient, Reducer2D};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// The three external collaborators a pipeline run is injected with.
pub struct Collaborators {
    /// Chat completion endpoint (extraction, both labelling stages, overview).
    pub chat: Arc<dyn ChatClient>,
    /// Embeddings endpoint.
    pub embedding: Arc<dyn EmbeddingClient>,
    /// 2D dimensionality reducer.
    pub reducer: Arc<dyn Reducer2D>,
}

/// One pipeline invocation's options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Re-run every stage regardless of prior state.
    pub force: bool,
    /// Run only this stage.
    pub only: Option<Stage>,
    /// Run this stage and every stage after it.
    pub from_step: Option<Stage>,
    /// Seed a fresh `output_dir` from a completed run elsewhere, copying
    /// whichever output files the resumed stages need.
    pub input_dir: Option<std::path::PathBuf>,
}

/// Run the full broadlistening pipeline against `output_dir`, returning the
/// assembled [`PipelineResult`].
pub async fn run(
    config: &Config,
    comments: Vec<Comment>,
    output_dir: &Path,
    options: RunOptions,
    collaborators: Collaborators,
    bus: &EventBus,
) -> Result<PipelineResult> {
    let now = Utc::now();
    let mut status = Status::load(output_dir)?;
    if status.locked(now) {
        return Err(PipelineError::locked(Status::path(output_dir).display().to_string()));
    }

    if let Some(input_dir) = &options.input_dir {
        seed_from_input_dir(input_dir, output_dir, options.from_step)?;
    }

    let mut context = Context::load_from_dir(output_dir)?;
    context.comments = comments;

    let mut config = config.clone();
    if config.cluster_nums.is_none() && config.auto_cluster_nums {
        let (low, high) = bl_clustering::auto_cluster_nums(context.comments.len().max(context.arguments.len()));
        config.cluster_nums = Some(vec![low, high]);
    }

    let plan = Planner::new(&status, &context, &config).create_plan(options.force, options.only, options.from_step);
    status.start_pipeline(plan.clone(), now);
    status.save(output_dir)?;

    bus.publish(BroadlisteningEvent::PipelineStart { comment_count: context.comments.len() });

    let total_steps = plan.len();
    for (step_index, plan_step) in plan.iter().enumerate() {
        let stage = plan_step.step;
        if !plan_step.run {
            bus.publish(BroadlisteningEvent::StepSkip { step: stage, reason: plan_step.reason.clone() });
            continue;
        }

        let step_start = Utc::now();
        status.start_step(stage, step_start);
        status.save(output_dir)?;
        let params = tracked_params(stage, &config, &context);
        bus.publish(BroadlisteningEvent::StepStart {
            step: stage,
            step_index,
            step_total: total_steps,
            params: params.clone(),
        });

        let started_at = Instant::now();
        let outcome = execute_stage(stage, &config, &mut context, &collaborators, bus).await;
        let duration = started_at.elapsed();

        match outcome {
            Ok(tokens) => {
                context.token_usage += tokens;
                context.save_step(stage, output_dir)?;
                status.complete_step(stage, params, duration, tokens, Utc::now());
                status.save(output_dir)?;
                bus.publish(BroadlisteningEvent::StepComplete {
                    step: stage,
                    step_index,
                    step_total: total_steps,
                    params: tracked_params(stage, &config, &context),
                    files: Context::output_files(stage).iter().map(|s| s.to_string()).collect(),
                    error: None,
                });
            }
            Err(err) => {
                error!(target: "bl.pipeline", step = %stage, error = %err, "stage failed");
                status.error_pipeline(err.to_string(), Utc::now());
                status.save(output_dir).ok();
                bus.publish(BroadlisteningEvent::StepComplete {
                    step: stage,
                    step_index,
                    step_total: total_steps,
                    params,
                    files: Vec::new(),
                    error: Some(err.to_string()),
                });
                return Err(err);
            }
        }
    }

    let result = context.result.clone().ok_or_else(|| {
        PipelineError::internal("aggregation did not produce a result")
    })?;

    status.complete_pipeline(Utc::now());
    status.save(output_dir)?;

    info!(target: "bl.pipeline", comments = result.comment_num, arguments = result.arguments.len(), "pipeline run complete");
    Ok(result)
}

async fn execute_stage(
    stage: Stage,
    config: &Config,
    context: &mut Context,
    collaborators: &Collaborators,
    bus: &EventBus,
) -> Result<u64> {
    match stage {
        Stage::Extraction => {
            let outcome = stages::extraction::run(config, &context.comments, Arc::clone(&collaborators.chat), bus).await?;
            context.arguments = outcome.arguments;
            context.relations = outcome.relations;
            Ok(outcome.token_usage)
        }
        Stage::Embedding => {
            stages::embedding::run(config, &mut context.arguments, Arc::clone(&collaborators.embedding)).await?;
            Ok(0)
        }
        Stage::Clustering => {
            let outcome = stages::clustering::run(config, &mut context.arguments, Arc::clone(&collaborators.reducer)).await?;
            context.cluster_results = outcome.cluster_results;
            Ok(0)
        }
        Stage::InitialLabelling => {
            let (labels, tokens) = stages::initial_labelling::run(config, &context.arguments, Arc::clone(&collaborators.chat)).await?;
            context.initial_labels = labels;
            Ok(tokens)
        }
        Stage::MergeLabelling => {
            let (clusters, tokens) = stages::merge_labelling::run(
                config,
                &context.arguments,
                &context.initial_labels,
                Arc::clone(&collaborators.chat),
            )
            .await?;
            context.clusters = clusters;
            Ok(tokens)
        }
        Stage::Overview => {
            let (overview, tokens) = stages::overview::run(config, &context.clusters, Arc::clone(&collaborators.chat)).await?;
            context.overview = overview;
            Ok(tokens)
        }
        Stage::Aggregation => {
            let result = stages::aggregation::run(
                config,
                &context.comments,
                &context.arguments,
                &context.clusters,
                context.overview.clone(),
            );
            context.result = Some(result);
            Ok(0)
        }
    }
}

/// Copy whichever output files the resumed stages (every stage strictly
/// before `from_step`, or all of them if unset) need from `input_dir` into
/// `output_dir`, so a fresh run can continue from a previously completed
/// one without re-deriving already-settled data.
fn seed_from_input_dir(input_dir: &Path, output_dir: &Path, from_step: Option<Stage>) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| PipelineError::internal(format!("failed to create {}: {e}", output_dir.display())))?;

    let cutoff = from_step.map(|s| s.index()).unwrap_or(ALL_STAGES.len());
    for stage in ALL_STAGES.iter().take(cutoff) {
        for file in Context::output_files(*stage) {
            let src = input_dir.join(file);
            let dst = output_dir.join(file);
            if src.is_file() && !dst.exists() {
                std::fs::copy(&src, &dst).map_err(|e| {
                    PipelineError::internal(format!("failed to copy {} to {}: {e}", src.display(), dst.display()))
                })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_llm::{MockChatClient, MockEmbeddingClient, MockReducer2D};

    fn comments() -> Vec<Comment> {
        vec![
            Comment { id: "1".into(), body: "parks are great".into(), proposal_id: None, source_url: None, attributes: Default::default() },
            Comment { id: "2".into(), body: "buses are slow".into(), proposal_id: None, source_url: None, attributes: Default::default() },
        ]
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            chat: Arc::new(MockChatClient::new(|sys, user| match sys {
                "EXTRACT" => serde_json::json!({ "extractedOpinionList": [user] }),
                "OVERVIEW" => serde_json::json!({ "summary": format!("Overview: {user}") }),
                _ => serde_json::json!({ "label": "label", "description": user }),
            })),
            embedding: Arc::new(MockEmbeddingClient::sequential_unit_vectors()),
            reducer: Arc::new(MockReducer2D::fixed(vec![(0.0, 0.0), (10.0, 10.0)])),
        }
    }

    fn config() -> Config {
        let mut c = Config::default();
        c.model = "test-model".into();
        c.embedding_model = "test-embed".into();
        c.cluster_nums = Some(vec![2]);
        c.workers = 2;
        c.prompts.extraction = "EXTRACT".into();
        c.prompts.initial_labelling = "LABEL_LEAF".into();
        c.prompts.merge_labelling = "LABEL_MERGE".into();
        c.prompts.overview = "OVERVIEW".into();
        c
    }

    #[tokio::test]
    async fn full_run_produces_a_result_with_every_comment() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let result = run(&config(), comments(), dir.path(), RunOptions::default(), collaborators(), &bus)
            .await
            .unwrap();
        assert_eq!(result.comment_num, 2);
        assert_eq!(result.arguments.len(), 2);
        assert!(result.clusters.iter().any(|c| c.id == "0"));
    }

    #[tokio::test]
    async fn second_run_with_no_changes_skips_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        run(&config(), comments(), dir.path(), RunOptions::default(), collaborators(), &bus).await.unwrap();
        let status = Status::load(dir.path()).unwrap();
        assert_eq!(status.completed_jobs.len(), 7);

        // Second run: same config, same comments -> nothing should need to
        // rerun since every tracked parameter and output file is stable.
        run(&config(), comments(), dir.path(), RunOptions::default(), collaborators(), &bus).await.unwrap();
        let status2 = Status::load(dir.path()).unwrap();
        assert!(status2.completed_jobs.is_empty(), "{:?}", status2.completed_jobs);
    }

    #[tokio::test]
    async fn locked_status_rejects_a_new_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut status = Status::load(dir.path()).unwrap();
        status.start_pipeline(Vec::new(), Utc::now());
        status.save(dir.path()).unwrap();

        let bus = EventBus::new();
        let err = run(&config(), comments(), dir.path(), RunOptions::default(), collaborators(), &bus)
            .await
            .unwrap_err();
        assert_eq!(err.code, bl_error::ErrorCode::Locked);
    }
}

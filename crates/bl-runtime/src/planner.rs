// SPDX-License-Identifier: MIT OR Apache-2.0
//! Incremental-execution planning (§4.2): decide, per stage, whether a
//! fresh run needs to execute it.

use crate::context::Context;
use crate::status::{hash_long_values, Status};
use bl_core::model::PlanStep;
use bl_core::{Config, Stage, ALL_STAGES};
use serde_json::Value;
use std::collections::BTreeMap;

/// Decides per-stage `run`/`skip` for one invocation of the pipeline.
pub struct Planner<'a> {
    status: &'a Status,
    context: &'a Context,
    config: &'a Config,
}

impl<'a> Planner<'a> {
    /// Build a planner over the previous run's `status` and the (possibly
    /// freshly reloaded) `context`, judging parameter changes against
    /// `config`.
    pub fn new(status: &'a Status, context: &'a Context, config: &'a Config) -> Self {
        Self { status, context, config }
    }

    /// Build the ordered plan for this invocation.
    ///
    /// `only` and `from_step`, if set, name a stage by its [`Stage`] value.
    pub fn create_plan(
        &self,
        force: bool,
        only: Option<Stage>,
        from_step: Option<Stage>,
    ) -> Vec<PlanStep> {
        let mut plan = Vec::with_capacity(ALL_STAGES.len());
        let mut cascaded = false;

        for stage in ALL_STAGES {
            let decision = self.decide(stage, force, only, from_step, cascaded);
            if decision.run {
                cascaded = true;
            }
            plan.push(decision);
        }
        plan
    }

    fn decide(
        &self,
        stage: Stage,
        force: bool,
        only: Option<Stage>,
        from_step: Option<Stage>,
        cascade_active: bool,
    ) -> PlanStep {
        // 1. force
        if force {
            return run(stage, "forced");
        }

        // 2. only
        if let Some(target) = only {
            return if stage == target {
                run(stage, "only")
            } else {
                skip(stage, "not the requested stage")
            };
        }

        // 3. from_step
        if let Some(from) = from_step {
            if stage.index() < from.index() {
                return skip(stage, "before from");
            }
            if stage.index() == from.index() {
                return run(stage, "from_step");
            }
            // Stages after from_step still fall through to the normal rules
            // below, but the from_step itself already forced a cascade via
            // `cascade_active` on the caller side once it ran.
        }

        // 4. no prior completed job
        let prior = self.status.last_completed_job(stage);
        if prior.is_none() {
            return run(stage, "no prior run recorded");
        }
        let prior = prior.unwrap();

        // 5. missing declared output file
        for file in Context::output_files(stage) {
            if !self.context.output_dir.join(file).is_file() {
                return run(stage, "output file missing");
            }
        }

        // 6. dependency cascade: some earlier stage in this plan already
        // decided to run, and the pipeline is strictly linear, so every
        // stage behind it shares that dependency.
        if cascade_active {
            return run(stage, "dependency re-ran");
        }

        // 7. parameter change
        let current_params = hash_long_values(tracked_params(stage, self.config, self.context));
        if current_params != prior.params {
            return run(stage, "parameters changed");
        }

        // 8. nothing changed
        skip(stage, "nothing changed")
    }
}

fn run(stage: Stage, reason: &str) -> PlanStep {
    PlanStep { step: stage, run: true, reason: reason.to_string() }
}

fn skip(stage: Stage, reason: &str) -> PlanStep {
    PlanStep { step: stage, run: false, reason: reason.to_string() }
}

/// The tracked parameter set for `stage`, per §4.2's table.
pub fn tracked_params(stage: Stage, config: &Config, context: &Context) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    match stage {
        Stage::Extraction => {
            params.insert("model".to_string(), Value::from(config.model.clone()));
            params.insert("prompt".to_string(), Value::from(config.prompts.extraction.clone()));
            params.insert("limit".to_string(), serde_json::to_value(config.limit).unwrap());
            params.insert(
                "input".to_string(),
                Value::from(
                    context
                        .comments
                        .iter()
                        .map(|c| c.id.clone())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            );
        }
        Stage::Embedding => {
            params.insert("model".to_string(), Value::from(config.embedding_model.clone()));
        }
        Stage::Clustering => {
            params.insert(
                "cluster_nums".to_string(),
                serde_json::to_value(&config.cluster_nums).unwrap(),
            );
        }
        Stage::InitialLabelling => {
            params.insert("model".to_string(), Value::from(config.model.clone()));
            params.insert(
                "prompt".to_string(),
                Value::from(config.prompts.initial_labelling.clone()),
            );
        }
        Stage::MergeLabelling => {
            params.insert("model".to_string(), Value::from(config.model.clone()));
            params.insert(
                "prompt".to_string(),
                Value::from(config.prompts.merge_labelling.clone()),
            );
        }
        Stage::Overview => {
            params.insert("model".to_string(), Value::from(config.model.clone()));
            params.insert("prompt".to_string(), Value::from(config.prompts.overview.clone()));
        }
        Stage::Aggregation => {}
    }
    params
}

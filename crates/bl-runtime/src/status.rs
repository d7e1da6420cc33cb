// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed run status and lock, persisted to `output_dir/status.json`
//! (§4.3).

use bl_core::model::{CompletedJob, PlanStep};
use bl_core::Stage;
use bl_error::{ErrorCode, PipelineError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A tracked parameter value longer than this (in its JSON string form) is
/// replaced with its hexadecimal SHA-256 digest before being compared or
/// persisted — long prompts are the motivating case (§4.2).
const LONG_STRING_THRESHOLD: usize = 100;

/// Default lock duration: a fresh run holds the lock for this long from its
/// most recent `start_step` call, per §4.3's "on the order of hours".
const DEFAULT_LOCK_WINDOW: Duration = Duration::from_secs(3600);

/// Overall run status, as recorded in `status.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has started against this output directory yet.
    Initialized,
    /// A run is in progress and holds the lock.
    Running,
    /// The most recent run finished successfully.
    Completed,
    /// The most recent run raised an error.
    Error,
}

/// Persistent per-stage plan plus execution record for one output
/// directory, serialized to `status.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Status {
    /// Current overall status.
    pub status: RunStatus,
    /// The plan decided for the current (or most recent) run.
    #[serde(default)]
    pub plan: Vec<PlanStep>,
    /// When the current/most recent run started.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "bl_duration_serde::option_rfc3339")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the current/most recent run ended.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "bl_duration_serde::option_rfc3339")]
    pub end_time: Option<DateTime<Utc>>,
    /// Stage currently executing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job: Option<Stage>,
    /// When the current stage started.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "bl_duration_serde::option_rfc3339")]
    pub current_job_started: Option<DateTime<Utc>>,
    /// Lock expiry; a run holding the lock refreshes this at every
    /// `start_step`.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "bl_duration_serde::option_rfc3339")]
    pub lock_until: Option<DateTime<Utc>>,
    /// Stages completed during the current run, in completion order.
    #[serde(default)]
    pub completed_jobs: Vec<CompletedJob>,
    /// Stages completed during earlier, already-finished runs.
    #[serde(default)]
    pub previously_completed_jobs: Vec<CompletedJob>,
    /// Error message from the most recent failed run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            status: RunStatus::Initialized,
            plan: Vec::new(),
            start_time: None,
            end_time: None,
            current_job: None,
            current_job_started: None,
            lock_until: None,
            completed_jobs: Vec::new(),
            previously_completed_jobs: Vec::new(),
            error: None,
        }
    }
}

impl Status {
    /// Path to `status.json` under `output_dir`.
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join("status.json")
    }

    /// Load status from `output_dir/status.json`, or a fresh
    /// [`RunStatus::Initialized`] status if the file does not exist.
    pub fn load(output_dir: &Path) -> Result<Self> {
        let path = Self::path(output_dir);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                PipelineError::new(ErrorCode::ConfigInvalid, "malformed status.json")
                    .with_context("path", path.display().to_string())
                    .with_source(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PipelineError::new(ErrorCode::Internal, "failed to read status.json")
                .with_context("path", path.display().to_string())
                .with_source(e)),
        }
    }

    /// `true` iff this status is `running` and its lock has not yet
    /// expired.
    pub fn locked(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Running
            && self.lock_until.is_some_and(|until| now < until)
    }

    /// Begin a new run: record the plan, reset `completed_jobs`, mark
    /// `running`, and set the lock.
    pub fn start_pipeline(&mut self, plan: Vec<PlanStep>, now: DateTime<Utc>) {
        if self.status == RunStatus::Completed || self.status == RunStatus::Error {
            let mut carried = std::mem::take(&mut self.completed_jobs);
            self.previously_completed_jobs.append(&mut carried);
        }
        self.plan = plan;
        self.status = RunStatus::Running;
        self.start_time = Some(now);
        self.end_time = None;
        self.error = None;
        self.completed_jobs.clear();
        self.refresh_lock(now);
    }

    /// Mark `step` as the currently executing stage and refresh the lock
    /// window.
    pub fn start_step(&mut self, step: Stage, now: DateTime<Utc>) {
        self.current_job = Some(step);
        self.current_job_started = Some(now);
        self.refresh_lock(now);
    }

    /// Record a completed stage execution. Any tracked parameter whose JSON
    /// string form exceeds [`LONG_STRING_THRESHOLD`] bytes is replaced with
    /// its SHA-256 hex digest before being stored.
    pub fn complete_step(
        &mut self,
        step: Stage,
        params: BTreeMap<String, serde_json::Value>,
        duration: Duration,
        token_usage: u64,
        now: DateTime<Utc>,
    ) {
        let params = hash_long_values(params);
        self.completed_jobs.push(CompletedJob {
            step,
            completed: now,
            duration,
            params,
            token_usage,
        });
        self.current_job = None;
        self.current_job_started = None;
    }

    /// Mark the run complete and release the lock.
    pub fn complete_pipeline(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.end_time = Some(now);
        self.current_job = None;
        self.current_job_started = None;
        self.lock_until = None;
        self.error = None;
    }

    /// Mark the run as errored and release the lock.
    pub fn error_pipeline(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = RunStatus::Error;
        self.end_time = Some(now);
        self.error = Some(message.into());
        self.current_job = None;
        self.current_job_started = None;
        self.lock_until = None;
    }

    /// Completed jobs from the current run followed by those retained from
    /// earlier runs.
    pub fn all_completed_jobs(&self) -> Vec<&CompletedJob> {
        self.completed_jobs
            .iter()
            .chain(self.previously_completed_jobs.iter())
            .collect()
    }

    /// The most recent completed job for `step`, if any, searched current
    /// run first.
    pub fn last_completed_job(&self, step: Stage) -> Option<&CompletedJob> {
        self.all_completed_jobs().into_iter().find(|j| j.step == step)
    }

    fn refresh_lock(&mut self, now: DateTime<Utc>) {
        self.lock_until = Some(now + ChronoDuration::from_std(DEFAULT_LOCK_WINDOW).unwrap());
    }

    /// Atomically persist this status to `output_dir/status.json`
    /// (write to a temp file in the same directory, then rename).
    pub fn save(&self, output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir).map_err(|e| {
            PipelineError::new(ErrorCode::Internal, "failed to create output directory")
                .with_context("path", output_dir.display().to_string())
                .with_source(e)
        })?;
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            PipelineError::new(ErrorCode::Internal, "failed to serialize status.json").with_source(e)
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(output_dir).map_err(|e| {
            PipelineError::new(ErrorCode::Internal, "failed to create temp status file")
                .with_source(e)
        })?;
        use std::io::Write;
        tmp.write_all(json.as_bytes()).map_err(|e| {
            PipelineError::new(ErrorCode::Internal, "failed to write temp status file")
                .with_source(e)
        })?;
        tmp.persist(Self::path(output_dir)).map_err(|e| {
            PipelineError::new(ErrorCode::Internal, "failed to rename temp status file into place")
                .with_source(e.error)
        })?;
        Ok(())
    }
}

/// Recursively replace any string at or above [`LONG_STRING_THRESHOLD`]
/// bytes with its SHA-256 hex digest, leaving structure and short values
/// intact. Used both for persistence and for parameter-change comparison.
pub fn hash_long_values(
    params: BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, serde_json::Value> {
    params.into_iter().map(|(k, v)| (k, hash_long_value(v))).collect()
}

fn hash_long_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.len() >= LONG_STRING_THRESHOLD => {
            let mut hasher = Sha256::new();
            hasher.update(s.as_bytes());
            serde_json::Value::String(format!("{:x}", hasher.finalize()))
        }
        other => other,
    }
}

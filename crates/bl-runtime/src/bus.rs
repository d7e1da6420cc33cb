// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broadcast-based event bus for the five observability events in §6.
//!
//! Unlike a plain `tokio::sync::broadcast::Sender`, the bus tracks publish
//! statistics and silently drops events when no subscriber is attached.

use bl_core::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// One of the five named observability events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum BroadlisteningEvent {
    /// `pipeline.broadlistening` — emitted once at run start.
    #[serde(rename = "pipeline.broadlistening")]
    PipelineStart {
        /// Number of comments in this run.
        comment_count: usize,
    },
    /// `step.start.broadlistening` — emitted when a stage begins execution.
    #[serde(rename = "step.start.broadlistening")]
    StepStart {
        /// Stage about to run.
        step: Stage,
        /// Zero-based index of this stage in the plan.
        step_index: usize,
        /// Total number of stages in the plan.
        step_total: usize,
        /// Tracked parameters for this stage's execution.
        params: BTreeMap<String, Value>,
    },
    /// `step.broadlistening` — emitted when a stage finishes (success or error).
    #[serde(rename = "step.broadlistening")]
    StepComplete {
        /// Stage that ran.
        step: Stage,
        /// Zero-based index of this stage in the plan.
        step_index: usize,
        /// Total number of stages in the plan.
        step_total: usize,
        /// Tracked parameters for this stage's execution.
        params: BTreeMap<String, Value>,
        /// Output files the stage wrote.
        files: Vec<String>,
        /// Error message if the stage raised.
        error: Option<String>,
    },
    /// `step.skip.broadlistening` — emitted when the planner skips a stage.
    #[serde(rename = "step.skip.broadlistening")]
    StepSkip {
        /// Stage that was skipped.
        step: Stage,
        /// Why the planner skipped it.
        reason: String,
    },
    /// `progress.broadlistening` — emitted by long-running stages mid-execution.
    #[serde(rename = "progress.broadlistening")]
    Progress {
        /// Stage reporting progress.
        step: Stage,
        /// Items completed so far.
        current: usize,
        /// Total items for this stage's unit of work.
        total: usize,
        /// `current / total * 100`, rounded to one decimal place.
        percentage: f64,
        /// Free-form progress annotation (e.g. `"level 2"`).
        message: Option<String>,
    },
}

#[derive(Debug, Default)]
struct StatsInner {
    total_published: AtomicU64,
    dropped_events: AtomicU64,
}

/// Broadcast-based event bus distributing [`BroadlisteningEvent`]s to
/// subscribers. Best-effort: if no subscriber is attached, events are
/// silently dropped and counted in [`EventBusStats::dropped_events`].
pub struct EventBus {
    tx: broadcast::Sender<BroadlisteningEvent>,
    stats: Arc<StatsInner>,
}

impl EventBus {
    /// Create a new event bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: BroadlisteningEvent) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Snapshot of bus statistics.
    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_published: self.stats.total_published.load(Ordering::Relaxed),
            active_subscribers: self.tx.receiver_count(),
            dropped_events: self.stats.dropped_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for receiving events from an [`EventBus`].
pub struct EventSubscription {
    rx: broadcast::Receiver<BroadlisteningEvent>,
    stats: Arc<StatsInner>,
}

impl EventSubscription {
    /// Receive the next event, waiting asynchronously. Returns `None` when
    /// the bus is dropped.
    pub async fn recv(&mut self) -> Option<BroadlisteningEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Snapshot of event bus statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusStats {
    /// Total number of events published to the bus.
    pub total_published: u64,
    /// Number of subscribers currently listening.
    pub active_subscribers: usize,
    /// Events lost because no subscribers were listening or a subscriber lagged.
    pub dropped_events: u64,
}

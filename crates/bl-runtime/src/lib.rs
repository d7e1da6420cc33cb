// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline orchestrator, incremental-execution planner, status/lock
//! persistence, and the seven stage implementations of the
//! broadlistening pipeline.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod cancel;
pub mod context;
pub mod planner;
pub mod pipeline;
pub mod stages;
pub mod status;
pub mod worker_pool;

pub use bus::{BroadlisteningEvent, EventBus, EventBusStats, EventSubscription};
pub use cancel::CancellationToken;
pub use context::Context;
pub use pipeline::{run, Collaborators, RunOptions};
pub use planner::Planner;
pub use status::Status;

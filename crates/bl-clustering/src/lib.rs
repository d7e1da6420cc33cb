// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic k-means, hierarchy assembly, and density ranking for the
//! clustering stage (§4.7, §4.12).
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auto;
pub mod density;
pub mod hierarchy;
pub mod kmeans;

pub use auto::auto_cluster_nums;
pub use density::{compute as compute_density, Density};
pub use hierarchy::{assemble as assemble_hierarchy, HierarchyAssembly};
pub use kmeans::{kmeans, DEFAULT_MAX_ITERATIONS};

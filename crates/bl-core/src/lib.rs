// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core data model, configuration, and on-disk format for the
//! broadlistening pipeline.
//!
//! This crate owns the types every other `bl-*` crate shares: the entities
//! of §3 ([`model`]), the configuration surface ([`config::Config`]), the
//! stage ordering ([`stage::Stage`]), and the byte-stable CSV/JSON readers
//! and writers ([`csv_io`], [`json_io`]) that make on-disk resumption
//! possible.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod csv_io;
pub mod json_io;
pub mod model;
pub mod stage;

pub use config::Config;
pub use stage::{Stage, ALL_STAGES};

/// Derive the integer `comment_id` carried in the output `arguments` array.
///
/// Tries `comment_id` itself first; if it does not parse as an integer
/// (the source corpus used non-numeric comment ids), falls back to the
/// numeric run embedded in `arg_id`'s `"A<comment_id>_<idx>"` form.
pub fn numeric_comment_id(comment_id: &str, arg_id: &str) -> i64 {
    if let Ok(n) = comment_id.parse::<i64>() {
        return n;
    }
    let trimmed = arg_id.strip_prefix('A').unwrap_or(arg_id);
    let without_idx = trimmed.rsplit_once('_').map(|(head, _)| head).unwrap_or(trimmed);
    let digits: String = without_idx.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comment_id_prefers_parseable_comment_id() {
        assert_eq!(numeric_comment_id("42", "A42_0"), 42);
    }

    #[test]
    fn numeric_comment_id_falls_back_to_arg_id_digits() {
        assert_eq!(numeric_comment_id("abc123", "Aabc123_0"), 123);
    }

    #[test]
    fn numeric_comment_id_defaults_to_zero_when_no_digits() {
        assert_eq!(numeric_comment_id("xyz", "Axyz_0"), 0);
    }
}

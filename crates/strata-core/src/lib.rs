// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! strata-core: multi-tenant, multi-version in-memory index of a build graph.
//!
//! A build-tool server process holds the parsed build-rule graph for many
//! revisions of a source tree at once. This crate is the versioned,
//! concurrently-queried store behind that: "list all targets under directory
//! X at revision R", "forward deps of target T at R", or "transitive closure
//! of T at R" answer in microseconds without re-parsing build files.
//!
//! # Architecture
//!
//! - [`TargetInterner`]: monotone bijection between build targets and dense
//!   `u32` handles, so dependency lists are sorted integer arrays.
//! - [`GenerationMap`]: history-preserving dictionary whose values are
//!   append-only `(generation, value-or-tombstone)` timelines; historical
//!   reads are `O(log H)` with no copying.
//! - Delta computation: a commit's added / modified / removed packages are
//!   diffed against the current state to produce the minimal set of timeline
//!   appends — or none at all, in which case no generation is allocated.
//! - [`Index`]: the facade holding both generation maps under one fair
//!   reader/writer lock, the commit→generation table, and the frontier
//!   counter.
//!
//! # Concurrency contract
//!
//! Arbitrarily many readers query any past generation in parallel; one
//! commit at a time validates under the read lock and appends under the
//! write lock. History, once written, is immutable: results at generation
//! `g` never change, no matter how many commits land afterwards.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod delta;
mod ident;
mod index;
mod intern;
mod rule;
mod target;
mod timeline;

pub use delta::CommitError;
pub use ident::{make_commit_id, CommitId, Generation, Hash, TargetHandle};
pub use index::{Index, IndexBuilder};
pub use intern::TargetInterner;
pub use rule::{BuildPackage, Changes, RawBuildRule, TargetNode};
pub use target::{BuildTarget, DefaultTargetParser, PackagePath, RuleName, TargetParser};
pub use timeline::{GenerationMap, TimelineError};

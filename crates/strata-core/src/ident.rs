// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier types for commits, generations, and interned targets.
use blake3::Hasher;

/// Canonical 256-bit hash used for commit identifiers.
pub type Hash = [u8; 32];

/// Opaque identifier for a point in source-control history.
///
/// A `CommitId` is an opaque 32-byte value supplied by the embedding host,
/// typically a revision hash. The index never inspects the bytes; it only
/// compares and hashes them. [`make_commit_id`] derives a stable id from a
/// human-readable label (`blake3("commit:" || label)`) for hosts and tests
/// that do not already carry revision hashes.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommitId(pub Hash);

impl CommitId {
    /// Returns the canonical byte representation of this id.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

/// Produces a stable, domain-separated commit identifier (prefix `b"commit:"`) using BLAKE3.
pub fn make_commit_id(label: &str) -> CommitId {
    let mut hasher = Hasher::new();
    hasher.update(b"commit:");
    hasher.update(label.as_bytes());
    CommitId(hasher.finalize().into())
}

/// A point on the index's linear history.
///
/// Generation `0` is the empty state. Every commit that produces a non-empty
/// delta advances the frontier by exactly one; commits whose changes are
/// semantically empty are recorded at the generation that was current when
/// they were applied.
///
/// # Invariants
/// - Generations are totally ordered and never reused.
/// - A generation, once written, is immutable: queries at generation `g`
///   return the same results forever.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Generation(u32);

impl Generation {
    /// The empty state, before any commit has been applied.
    pub const ZERO: Self = Self(0);

    /// Constructs a `Generation` from a raw counter value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the generation immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for Generation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compact, process-local handle for an interned build target.
///
/// Handles are dense: the interner assigns them in insertion order so that at
/// any instant the live handles form the contiguous range `[0, N)`. They are
/// stable for the lifetime of the process and never reused. Dependency lists
/// are stored as sorted arrays of handles, which makes rule equality a dense
/// array comparison instead of a set comparison over structured targets.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetHandle(pub(crate) u32);

impl TargetHandle {
    /// Constructs a handle from a raw index.
    ///
    /// Intended for tests and FFI-style embedders; handles obtained this way
    /// are only meaningful if the interner actually assigned them.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns this handle as a `usize` index.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw numeric handle.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

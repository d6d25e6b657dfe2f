// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The index facade: versioned queries plus the single commit mutator.
//!
//! An [`Index`] holds the target interner, the two generation maps (packages
//! and rules), the commit→generation table, and the frontier counter. Reads
//! at any recorded generation proceed concurrently under a shared lock while
//! one commit at a time is validated (under the read lock) and applied
//! (under the write lock).
//!
//! # Locking discipline
//!
//! - One fair, writer-preferring `RwLock` guards both generation maps as a
//!   unit, so no reader can observe a half-applied commit.
//! - The interner synchronizes itself; handle↔target translation always
//!   happens outside the map lock.
//! - The commit table is a lock-free concurrent map and the frontier counter
//!   is atomic; the counter is advanced strictly after the maps and the
//!   commit table are updated, making it a safe monotonic lower bound on
//!   fully applied state.
//! - Reads at generations beyond the frontier resolve to the frontier state:
//!   timelines answer "latest entry at or before `g`", and history behind
//!   the frontier is immutable.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::delta::{compute_deltas, CommitError, Deltas, PackageDelta, RuleDelta};
use crate::ident::{CommitId, Generation, TargetHandle};
use crate::intern::TargetInterner;
use crate::rule::{internalize_changes, Changes, InternalRule, RawBuildRule};
use crate::target::{BuildTarget, DefaultTargetParser, PackagePath, RuleName, TargetParser};
use crate::timeline::GenerationMap;

/// Both generation maps, guarded together so commits become visible
/// atomically.
#[derive(Default)]
struct GenerationMaps {
    packages: GenerationMap<PackagePath, BTreeSet<RuleName>>,
    rules: GenerationMap<TargetHandle, InternalRule>,
}

/// Fluent builder for [`Index`] instances.
///
/// # Example
///
/// ```rust
/// use strata_core::{Index, IndexBuilder};
///
/// let index: Index = IndexBuilder::new()
///     .expected_targets(4096)
///     .build();
/// ```
pub struct IndexBuilder {
    parser: Arc<dyn TargetParser>,
    expected_targets: usize,
}

impl IndexBuilder {
    /// Creates a builder with the default `//<package>:<name>` parser.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parser: Arc::new(DefaultTargetParser),
            expected_targets: 0,
        }
    }

    /// Injects the host's target parser.
    ///
    /// The parser must be pure and thread-safe; it runs on query paths that
    /// rebuild targets from package-map entries.
    #[must_use]
    pub fn target_parser(mut self, parser: Arc<dyn TargetParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Pre-sizes the interner for roughly this many distinct targets.
    #[must_use]
    pub fn expected_targets(mut self, count: usize) -> Self {
        self.expected_targets = count;
        self
    }

    /// Builds the index. Infallible.
    #[must_use]
    pub fn build(self) -> Index {
        Index {
            interner: TargetInterner::with_capacity(self.expected_targets),
            parser: self.parser,
            generation: AtomicU32::new(Generation::ZERO.value()),
            commit_table: DashMap::new(),
            maps: RwLock::new(GenerationMaps::default()),
            commit_guard: Mutex::new(()),
        }
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Multi-version index over a build-rule graph.
///
/// One `Index` instance serves every revision of one source tree. Commits
/// append to per-key timelines instead of overwriting, so any number of
/// readers can keep querying old generations while the next commit lands.
/// See the [module docs](self) for the locking discipline.
pub struct Index {
    interner: TargetInterner,
    parser: Arc<dyn TargetParser>,
    /// Frontier generation: the newest fully applied state.
    generation: AtomicU32,
    commit_table: DashMap<CommitId, Generation>,
    maps: RwLock<GenerationMaps>,
    /// Serializes [`Index::add_commit`]. Commit application is single-caller
    /// by contract; this mutex makes the contract unconditional so a
    /// misbehaving host cannot corrupt the generation sequence.
    commit_guard: Mutex<()>,
}

impl Index {
    /// Creates an index with default configuration.
    #[must_use]
    pub fn new() -> Self {
        IndexBuilder::new().build()
    }

    /// Returns a builder for custom configuration.
    #[must_use]
    pub fn builder() -> IndexBuilder {
        IndexBuilder::new()
    }

    /// Returns the generation a commit was recorded at, if it was.
    pub fn generation_of(&self, commit: &CommitId) -> Option<Generation> {
        self.commit_table.get(commit).map(|entry| *entry.value())
    }

    /// Returns the newest fully applied generation.
    pub fn latest_generation(&self) -> Generation {
        Generation::from_raw(self.generation.load(Ordering::Acquire))
    }

    /// Returns the rule for `target` at `generation`, or `None` if the
    /// target does not exist there.
    pub fn target_node(&self, generation: Generation, target: &BuildTarget) -> Option<RawBuildRule> {
        self.target_nodes(generation, std::slice::from_ref(target))
            .pop()
            .flatten()
    }

    /// Returns the rule for each target at `generation`, preserving input
    /// order; absent targets yield `None` at their position.
    pub fn target_nodes(
        &self,
        generation: Generation,
        targets: &[BuildTarget],
    ) -> Vec<Option<RawBuildRule>> {
        // Translate outside the lock; unknown targets can never have rules.
        let handles: Vec<Option<TargetHandle>> = targets
            .iter()
            .map(|target| self.interner.handle_of(target))
            .collect();

        let rules: Vec<Option<InternalRule>> = {
            let maps = self.maps.read();
            handles
                .iter()
                .map(|handle| {
                    handle.and_then(|h| maps.rules.get_version(&h, generation).cloned())
                })
                .collect()
        };

        rules
            .into_iter()
            .zip(targets)
            .map(|(rule, target)| rule.map(|r| self.externalize_rule(target.clone(), &r)))
            .collect()
    }

    /// Returns the transitive forward closure of `target` at `generation`,
    /// excluding `target` itself.
    ///
    /// The BFS runs under a single read-lock acquisition: the frontier is an
    /// ordered set popped front-first, `visited` is unordered, and dep
    /// arrays come straight out of the rule map. Translation back to
    /// external targets happens after the lock is released.
    pub fn transitive_deps(
        &self,
        generation: Generation,
        target: &BuildTarget,
    ) -> BTreeSet<BuildTarget> {
        let Some(root) = self.interner.handle_of(target) else {
            return BTreeSet::new();
        };

        let mut visited: FxHashSet<TargetHandle> = FxHashSet::default();
        let mut frontier: BTreeSet<TargetHandle> = BTreeSet::new();
        frontier.insert(root);
        {
            let maps = self.maps.read();
            while let Some(handle) = frontier.pop_first() {
                visited.insert(handle);
                let Some(rule) = maps.rules.get_version(&handle, generation) else {
                    continue;
                };
                for dep in rule.deps.iter() {
                    if !visited.contains(dep) {
                        frontier.insert(*dep);
                    }
                }
            }
        }
        visited.remove(&root);

        self.interner.lookup_all(visited).into_iter().collect()
    }

    /// Returns the direct forward dependencies of each listed target at
    /// `generation`, concatenated in input order.
    ///
    /// Targets with no rule at `generation` are skipped silently; each
    /// target's own deps keep their sorted handle order.
    pub fn fwd_deps(&self, generation: Generation, targets: &[BuildTarget]) -> Vec<BuildTarget> {
        let handles: Vec<Option<TargetHandle>> = targets
            .iter()
            .map(|target| self.interner.handle_of(target))
            .collect();

        let dep_handles: Vec<TargetHandle> = {
            let maps = self.maps.read();
            handles
                .into_iter()
                .flatten()
                .filter_map(|h| maps.rules.get_version(&h, generation))
                .flat_map(|rule| rule.deps.iter().copied())
                .collect()
        };

        self.interner.lookup_all(dep_handles)
    }

    /// Returns every target whose dep array contains `target` at
    /// `generation`.
    ///
    /// This scans the live rule entries; it is a reporting query, not a hot
    /// path, and the index keeps no reverse adjacency.
    pub fn reverse_deps(
        &self,
        generation: Generation,
        target: &BuildTarget,
    ) -> BTreeSet<BuildTarget> {
        let Some(needle) = self.interner.handle_of(target) else {
            return BTreeSet::new();
        };

        let owners: Vec<TargetHandle> = {
            let maps = self.maps.read();
            maps.rules
                .entries_at(generation)
                .filter(|(_, rule)| rule.deps.binary_search(&needle).is_ok())
                .map(|(handle, _)| *handle)
                .collect()
        };

        self.interner.lookup_all(owners).into_iter().collect()
    }

    /// Returns every target that exists at `generation`.
    pub fn targets(&self, generation: Generation) -> Vec<BuildTarget> {
        let handles: Vec<TargetHandle> = {
            let maps = self.maps.read();
            maps.rules
                .entries_at(generation)
                .map(|(handle, _)| *handle)
                .collect()
        };
        self.interner.lookup_all(handles)
    }

    /// Returns the targets declared by exactly the package at `base`, or an
    /// empty list if no such package exists at `generation`.
    pub fn targets_in_base_path(
        &self,
        generation: Generation,
        base: &PackagePath,
    ) -> Vec<BuildTarget> {
        let names: Option<BTreeSet<RuleName>> = {
            let maps = self.maps.read();
            maps.packages.get_version(base, generation).cloned()
        };
        let Some(names) = names else {
            return Vec::new();
        };
        self.render_package_targets(base, &names)
    }

    /// Returns the targets of every package at or below `base` at
    /// `generation`. An empty `base` is equivalent to [`Index::targets`].
    pub fn targets_under_base_path(
        &self,
        generation: Generation,
        base: &PackagePath,
    ) -> Vec<BuildTarget> {
        if base.is_root() {
            return self.targets(generation);
        }

        let packages: Vec<(PackagePath, BTreeSet<RuleName>)> = {
            let maps = self.maps.read();
            maps.packages
                .entries_at_filtered(generation, |path| path.starts_with(base))
                .map(|(path, names)| (path.clone(), names.clone()))
                .collect()
        };

        packages
            .iter()
            .flat_map(|(path, names)| self.render_package_targets(path, names))
            .collect()
    }

    /// Number of live packages at `generation`.
    pub fn package_count(&self, generation: Generation) -> usize {
        self.maps.read().packages.entries_at(generation).count()
    }

    /// Number of live targets at `generation`.
    pub fn target_count(&self, generation: Generation) -> usize {
        self.maps.read().rules.entries_at(generation).count()
    }

    /// Applies one commit's changes on top of the current frontier.
    ///
    /// Returns the generation the commit was recorded at: the frontier
    /// itself when the changes are semantically empty, otherwise a freshly
    /// allocated successor generation. Validation runs under the read lock,
    /// so concurrent queries proceed during the expensive part; only the
    /// brief append phase takes the write lock.
    ///
    /// Commit application is serialized internally; callers still must not
    /// interleave commits out of history order.
    ///
    /// # Errors
    ///
    /// [`CommitError::DuplicateCommit`] if `commit` was already recorded,
    /// [`CommitError::PackageAlreadyPresent`] / [`CommitError::PackageAbsent`]
    /// when `changes` disagree with the state at the frontier, and
    /// [`CommitError::InternalInconsistency`] on index corruption. On error
    /// the index is unchanged.
    pub fn add_commit(
        &self,
        commit: CommitId,
        changes: &Changes,
    ) -> Result<Generation, CommitError> {
        let _serial = self.commit_guard.lock();

        // Fail before validation so a duplicate cannot re-apply deltas.
        if self.commit_table.contains_key(&commit) {
            return Err(CommitError::DuplicateCommit { commit });
        }

        let base = self.latest_generation();
        let internal = internalize_changes(&self.interner, changes);

        let deltas = {
            let maps = self.maps.read();
            compute_deltas(&maps.packages, &maps.rules, &self.interner, &internal, base)?
        };

        if deltas.is_empty() {
            self.commit_table.insert(commit, base);
            trace!(generation = base.value(), "commit produced no deltas");
            return Ok(base);
        }

        let next = base.next();
        let package_deltas = deltas.packages.len();
        let rule_deltas = deltas.rules.len();
        self.apply_deltas(deltas, next);
        self.commit_table.insert(commit, next);
        self.generation.store(next.value(), Ordering::Release);
        debug!(
            generation = next.value(),
            package_deltas, rule_deltas, "commit applied"
        );
        Ok(next)
    }

    /// Appends every delta at `generation` under one write-lock section.
    fn apply_deltas(&self, deltas: Deltas, generation: Generation) {
        let mut maps = self.maps.write();
        for delta in deltas.packages {
            let result = match delta {
                PackageDelta::Updated { path, names } => {
                    maps.packages.add_version(path, Some(names), generation)
                }
                PackageDelta::Removed { path } => {
                    maps.packages.add_version(path, None, generation)
                }
            };
            if let Err(err) = result {
                debug_assert!(false, "package timeline rejected a validated append: {err}");
            }
        }
        for delta in deltas.rules {
            let result = match delta {
                RuleDelta::Updated { handle, rule } => {
                    maps.rules.add_version(handle, Some(rule), generation)
                }
                RuleDelta::Removed { handle } => maps.rules.add_version(handle, None, generation),
            };
            if let Err(err) = result {
                debug_assert!(false, "rule timeline rejected a validated append: {err}");
            }
        }
    }

    /// Rebuilds the external rule for `target` from its interned form.
    fn externalize_rule(&self, target: BuildTarget, rule: &InternalRule) -> RawBuildRule {
        let deps: BTreeSet<BuildTarget> = self
            .interner
            .lookup_all(rule.deps.iter().copied())
            .into_iter()
            .collect();
        RawBuildRule {
            target,
            node: rule.node.clone(),
            deps,
        }
    }

    /// Renders `(package, name)` pairs and runs them through the injected
    /// parser. Strings the parser rejects are dropped; the default parser
    /// accepts everything the index itself renders.
    fn render_package_targets(
        &self,
        path: &PackagePath,
        names: &BTreeSet<RuleName>,
    ) -> Vec<BuildTarget> {
        names
            .iter()
            .filter_map(|name| self.parser.parse_target(&format!("//{path}:{name}")))
            .collect()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Index {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Index")
            .field("generation", &self.latest_generation())
            .field("commits", &self.commit_table.len())
            .field("interned_targets", &self.interner.len())
            .finish_non_exhaustive()
    }
}

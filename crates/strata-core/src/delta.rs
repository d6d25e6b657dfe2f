// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Commit delta computation.
//!
//! Given one commit's added / modified / removed packages and the generation
//! the commit is based on, [`compute_deltas`] produces the exact set of
//! package-map and rule-map appends needed to represent the commit — or
//! proves the commit is a semantic no-op, in which case the caller records it
//! against the current generation without advancing. All validation happens
//! here, under the index's read lock, so a failing commit writes nothing.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ident::{CommitId, Generation, TargetHandle};
use crate::intern::TargetInterner;
use crate::rule::{InternalChanges, InternalPackage, InternalRule};
use crate::target::{BuildTarget, PackagePath, RuleName};
use crate::timeline::GenerationMap;

/// Errors surfaced by [`Index::add_commit`](crate::Index::add_commit).
///
/// Every variant leaves the index unchanged: validation completes under the
/// read lock before any append is performed under the write lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// An `added` package targets a directory that already has a live build
    /// file at the commit's base generation.
    #[error("package '{path}' already present at generation {generation}")]
    PackageAlreadyPresent {
        /// Directory of the conflicting package.
        path: PackagePath,
        /// Generation the commit was validated against.
        generation: Generation,
    },
    /// A `modified` or `removed` package targets a directory with no live
    /// build file at the commit's base generation.
    #[error("package '{path}' absent at generation {generation}")]
    PackageAbsent {
        /// Directory of the missing package.
        path: PackagePath,
        /// Generation the commit was validated against.
        generation: Generation,
    },
    /// A rule listed in a package's name set had no entry in the rule map.
    ///
    /// The package map and rule map are written together under one write
    /// lock, so this can only arise from index corruption. Unrecoverable.
    #[error("rule map has no entry for '{target}' named by its package")]
    InternalInconsistency {
        /// Target whose rule entry was missing.
        target: BuildTarget,
    },
    /// The same commit id was applied twice.
    #[error("commit {commit:?} already recorded")]
    DuplicateCommit {
        /// The duplicated commit id.
        commit: CommitId,
    },
}

/// One package-map append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PackageDelta {
    /// The package exists after this commit with exactly these rule names.
    Updated {
        path: PackagePath,
        names: BTreeSet<RuleName>,
    },
    /// The package's build file is gone after this commit.
    Removed { path: PackagePath },
}

/// One rule-map append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RuleDelta {
    /// The target exists after this commit with this definition.
    Updated {
        handle: TargetHandle,
        rule: InternalRule,
    },
    /// The target is gone after this commit.
    Removed { handle: TargetHandle },
}

/// The full set of generation-map appends for one commit.
#[derive(Clone, Debug, Default)]
pub(crate) struct Deltas {
    pub packages: Vec<PackageDelta>,
    pub rules: Vec<RuleDelta>,
}

impl Deltas {
    /// `true` iff the commit changes nothing and no generation is needed.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.rules.is_empty()
    }
}

/// Computes the deltas for one commit against the state at `generation`.
///
/// Runs under the index's read lock. Modified packages whose new rule set is
/// value-equal to the old one contribute nothing, which is what lets
/// whitespace-only build-file edits commit without allocating a generation.
pub(crate) fn compute_deltas(
    package_map: &GenerationMap<PackagePath, BTreeSet<RuleName>>,
    rule_map: &GenerationMap<TargetHandle, InternalRule>,
    interner: &TargetInterner,
    changes: &InternalChanges,
    generation: Generation,
) -> Result<Deltas, CommitError> {
    let mut deltas = Deltas::default();

    for package in &changes.added {
        if package_map.get_version(&package.path, generation).is_some() {
            return Err(CommitError::PackageAlreadyPresent {
                path: package.path.clone(),
                generation,
            });
        }
        deltas.packages.push(PackageDelta::Updated {
            path: package.path.clone(),
            names: package.rule_names(),
        });
        for (handle, _, rule) in &package.rules {
            deltas.rules.push(RuleDelta::Updated {
                handle: *handle,
                rule: rule.clone(),
            });
        }
    }

    for path in &changes.removed {
        let Some(old_names) = package_map.get_version(path, generation) else {
            return Err(CommitError::PackageAbsent {
                path: path.clone(),
                generation,
            });
        };
        deltas.packages.push(PackageDelta::Removed { path: path.clone() });
        for name in old_names {
            let (handle, _) = resolve_rule(rule_map, interner, path, name, generation)?;
            deltas.rules.push(RuleDelta::Removed { handle });
        }
    }

    for package in &changes.modified {
        let Some(old_names) = package_map.get_version(&package.path, generation) else {
            return Err(CommitError::PackageAbsent {
                path: package.path.clone(),
                generation,
            });
        };

        let mut old_rules: FxHashMap<TargetHandle, InternalRule> = FxHashMap::default();
        for name in old_names {
            let (handle, rule) =
                resolve_rule(rule_map, interner, &package.path, name, generation)?;
            old_rules.insert(handle, rule.clone());
        }

        let rule_changes = diff_rules(&old_rules, package);
        if rule_changes.is_empty() {
            continue;
        }
        deltas.packages.push(PackageDelta::Updated {
            path: package.path.clone(),
            names: package.rule_names(),
        });
        deltas.rules.extend(rule_changes);
    }

    Ok(deltas)
}

/// Resolves one `(package, name)` pair to its live rule at `generation`.
///
/// The name came out of the package map, so both the interned handle and the
/// rule entry must exist; a miss on either is corruption.
fn resolve_rule<'a>(
    rule_map: &'a GenerationMap<TargetHandle, InternalRule>,
    interner: &TargetInterner,
    path: &PackagePath,
    name: &RuleName,
    generation: Generation,
) -> Result<(TargetHandle, &'a InternalRule), CommitError> {
    let target = BuildTarget {
        package: path.clone(),
        name: name.clone(),
    };
    let handle = interner
        .handle_of(&target)
        .ok_or_else(|| CommitError::InternalInconsistency {
            target: target.clone(),
        })?;
    let rule = rule_map
        .get_version(&handle, generation)
        .ok_or(CommitError::InternalInconsistency { target })?;
    Ok((handle, rule))
}

/// Diffs a package's old rule set against its new one.
///
/// Targets present in `new` but absent from `old` — or present with a
/// different payload or dependency array — yield `Updated`; targets in `old`
/// that `new` no longer declares yield `Removed`. The result is empty iff
/// the two sets are value-equal.
fn diff_rules(
    old_rules: &FxHashMap<TargetHandle, InternalRule>,
    package: &InternalPackage,
) -> Vec<RuleDelta> {
    let mut changes = Vec::new();
    let mut seen: FxHashSet<TargetHandle> = FxHashSet::default();

    for (handle, _, new_rule) in &package.rules {
        seen.insert(*handle);
        if old_rules.get(handle) != Some(new_rule) {
            changes.push(RuleDelta::Updated {
                handle: *handle,
                rule: new_rule.clone(),
            });
        }
    }
    for handle in old_rules.keys() {
        if !seen.contains(handle) {
            changes.push(RuleDelta::Removed { handle: *handle });
        }
    }
    changes
}

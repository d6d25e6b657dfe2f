// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Build rules and packages, in host-facing and interned internal forms.

use std::collections::BTreeSet;

use bytes::Bytes;

use crate::ident::TargetHandle;
use crate::intern::TargetInterner;
use crate::target::{BuildTarget, PackagePath, RuleName};

/// Opaque payload describing a rule beyond its dependency edges.
///
/// The index treats the payload as a value: two nodes are "the same rule
/// definition" exactly when their `kind` and `attrs` compare equal. Hosts
/// must therefore encode attributes canonically (stable key order, stable
/// number formatting); a host that re-encodes identical rules into different
/// bytes will see spurious rule updates on otherwise no-op commits.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetNode {
    /// Rule kind, e.g. `java_library`.
    pub kind: String,
    /// Canonically encoded rule attributes.
    pub attrs: Bytes,
}

impl TargetNode {
    /// Creates a node from a rule kind and canonical attribute bytes.
    pub fn new(kind: impl Into<String>, attrs: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            attrs: attrs.into(),
        }
    }
}

/// A single build rule as supplied by the host's build-file parser.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawBuildRule {
    /// The fully qualified target this rule declares.
    pub target: BuildTarget,
    /// Opaque rule definition payload.
    pub node: TargetNode,
    /// Forward dependencies of this rule.
    pub deps: BTreeSet<BuildTarget>,
}

impl RawBuildRule {
    /// Creates a rule with no dependencies.
    pub fn leaf(target: BuildTarget, node: TargetNode) -> Self {
        Self {
            target,
            node,
            deps: BTreeSet::new(),
        }
    }
}

/// All rules declared by one build file.
///
/// Rule names must be unique within the package; the host's parser enforces
/// that before changes reach the index.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildPackage {
    /// Directory containing the build file.
    pub path: PackagePath,
    /// Rules declared in the build file.
    pub rules: Vec<RawBuildRule>,
}

/// The package-level change set of one commit relative to its parent.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Changes {
    /// Packages whose build file is new in this commit.
    pub added: Vec<BuildPackage>,
    /// Packages whose build file existed and was edited.
    pub modified: Vec<BuildPackage>,
    /// Packages whose build file was deleted.
    pub removed: Vec<PackagePath>,
}

impl Changes {
    /// Returns `true` if the commit touched no build files at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Interned form of a rule: the payload plus a sorted, deduplicated array of
/// dependency handles.
///
/// The sorted array makes rule equality a dense comparison and keeps
/// per-target dependency iteration allocation-free on the query path.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct InternalRule {
    pub node: TargetNode,
    pub deps: Box<[TargetHandle]>,
}

/// Interned form of one package's rule set.
#[derive(Clone, Debug)]
pub(crate) struct InternalPackage {
    pub path: PackagePath,
    /// One entry per rule: handle, name within the package, interned rule.
    pub rules: Vec<(TargetHandle, RuleName, InternalRule)>,
}

impl InternalPackage {
    /// The set of rule names declared by this package.
    pub fn rule_names(&self) -> BTreeSet<RuleName> {
        self.rules.iter().map(|(_, name, _)| name.clone()).collect()
    }
}

/// Interned form of [`Changes`].
#[derive(Clone, Debug)]
pub(crate) struct InternalChanges {
    pub added: Vec<InternalPackage>,
    pub modified: Vec<InternalPackage>,
    pub removed: Vec<PackagePath>,
}

/// Translates host-facing changes into interned form.
///
/// Every target touched by the commit is interned here, and every rule's
/// dependency set is flattened to a sorted handle array. This runs outside
/// both the read and write lock on the commit path.
pub(crate) fn internalize_changes(interner: &TargetInterner, changes: &Changes) -> InternalChanges {
    InternalChanges {
        added: changes
            .added
            .iter()
            .map(|pkg| internalize_package(interner, pkg))
            .collect(),
        modified: changes
            .modified
            .iter()
            .map(|pkg| internalize_package(interner, pkg))
            .collect(),
        removed: changes.removed.clone(),
    }
}

fn internalize_package(interner: &TargetInterner, package: &BuildPackage) -> InternalPackage {
    let rules = package
        .rules
        .iter()
        .map(|rule| {
            let handle = interner.intern(&rule.target);
            let mut deps: Vec<TargetHandle> =
                rule.deps.iter().map(|dep| interner.intern(dep)).collect();
            deps.sort_unstable();
            deps.dedup();
            (
                handle,
                rule.target.name.clone(),
                InternalRule {
                    node: rule.node.clone(),
                    deps: deps.into_boxed_slice(),
                },
            )
        })
        .collect();
    InternalPackage {
        path: package.path.clone(),
        rules,
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(dead_code)]

use bytes::Bytes;
use strata_core::{
    BuildPackage, BuildTarget, Changes, PackagePath, RawBuildRule, TargetNode,
};

/// Parses targets from the `//pkg:name` test shorthand.
pub fn target(raw: &str) -> BuildTarget {
    let rest = raw.strip_prefix("//").unwrap_or(raw);
    let (package, name) = rest.rsplit_once(':').expect("test target needs a ':'");
    BuildTarget::new(package, name)
}

pub fn rule(raw_target: &str, deps: &[&str]) -> RawBuildRule {
    rule_with_kind(raw_target, "lib", deps)
}

pub fn rule_with_kind(raw_target: &str, kind: &str, deps: &[&str]) -> RawBuildRule {
    RawBuildRule {
        target: target(raw_target),
        node: TargetNode::new(kind, Bytes::new()),
        deps: deps.iter().map(|d| target(d)).collect(),
    }
}

pub fn package(path: &str, rules: Vec<RawBuildRule>) -> BuildPackage {
    BuildPackage {
        path: PackagePath::new(path),
        rules,
    }
}

pub fn added(packages: Vec<BuildPackage>) -> Changes {
    Changes {
        added: packages,
        ..Changes::default()
    }
}

pub fn modified(packages: Vec<BuildPackage>) -> Changes {
    Changes {
        modified: packages,
        ..Changes::default()
    }
}

pub fn removed(paths: &[&str]) -> Changes {
    Changes {
        removed: paths.iter().map(|p| PackagePath::new(*p)).collect(),
        ..Changes::default()
    }
}

/// Sorted rendering of a target list, for order-insensitive comparisons.
pub fn rendered(targets: &[BuildTarget]) -> Vec<String> {
    let mut out: Vec<String> = targets.iter().map(ToString::to_string).collect();
    out.sort();
    out
}

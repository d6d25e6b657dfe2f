// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Build-target naming: package paths, rule names, and the `//pkg:name` form.

/// Normalized, filesystem-agnostic path of the directory containing a build file.
///
/// Paths are relative to the repository root, use `/` as the separator, and
/// carry no leading or trailing separators. The empty path denotes the
/// repository root itself. [`PackagePath::new`] strips stray leading `//` or
/// `/` prefixes and trailing slashes so that host-supplied spellings collapse
/// to one canonical key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackagePath(String);

impl PackagePath {
    /// Creates a normalized package path.
    pub fn new(path: impl Into<String>) -> Self {
        let raw: String = path.into();
        let trimmed = raw.trim_start_matches('/').trim_end_matches('/');
        if trimmed.len() == raw.len() {
            Self(raw)
        } else {
            Self(trimmed.to_owned())
        }
    }

    /// The repository root.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns the path as a string slice (empty for the root).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the repository root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `self` is `base` or lives below it.
    ///
    /// The comparison is by path component, not string prefix: `a` covers `a`
    /// and `a/b` but not `ab`. The root covers everything.
    #[must_use]
    pub fn starts_with(&self, base: &PackagePath) -> bool {
        if base.is_root() {
            return true;
        }
        match self.0.strip_prefix(base.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }
}

impl core::fmt::Display for PackagePath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackagePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for PackagePath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// Name of a single rule, unique within its build package.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleName(String);

impl RuleName {
    /// Creates a rule name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RuleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RuleName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A fully qualified build target: a package path plus a rule name.
///
/// Rendered externally as `//<package>:<name>` (with an empty package for
/// root-level targets, i.e. `//:name`). Targets are plain values; equality
/// and hashing are structural, and the interner relies on that.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildTarget {
    /// Directory of the build file declaring this target.
    pub package: PackagePath,
    /// Rule name within the package.
    pub name: RuleName,
}

impl BuildTarget {
    /// Creates a target from a package path and rule name.
    pub fn new(package: impl Into<PackagePath>, name: impl Into<RuleName>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl core::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "//{}:{}", self.package, self.name)
    }
}

/// Parser from the rendered `//<package>:<name>` form back to a [`BuildTarget`].
///
/// The index renders targets when answering package-level queries and runs
/// every rendered string through the injected parser, so that embedders with
/// their own target type (cells, flavors, configuration) can hook canonical
/// construction. Implementations must be pure and thread-safe.
pub trait TargetParser: Send + Sync {
    /// Parses a rendered target string, or `None` if it is malformed.
    fn parse_target(&self, raw: &str) -> Option<BuildTarget>;
}

/// Parser for the plain `//<package>:<name>` syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTargetParser;

impl TargetParser for DefaultTargetParser {
    fn parse_target(&self, raw: &str) -> Option<BuildTarget> {
        let rest = raw.strip_prefix("//")?;
        let (package, name) = rest.rsplit_once(':')?;
        if name.is_empty() {
            return None;
        }
        Some(BuildTarget::new(package, name))
    }
}

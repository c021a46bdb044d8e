//! Version parsing and range-selector matching

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::error::{BuildError, Result};

/// Parse a concrete version string (e.g. "3.10.0", "3.11.0-SNAPSHOT")
pub fn parse_version(version_str: &str) -> Result<Version> {
    // Strip leading 'v' if present
    let version_str = version_str.strip_prefix('v').unwrap_or(version_str);
    Ok(Version::parse(version_str)?)
}

/// Compare two versions on their release triple only.
///
/// Pre-release suffixes are ignored, so "3.11.0-SNAPSHOT" compares equal to
/// "3.11.0". This is a deliberate normalization: a snapshot of a release must
/// resolve through the same compatibility tables as the release itself.
pub fn release_cmp(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch).cmp(&(b.major, b.minor, b.patch))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
struct Clause {
    op: Op,
    version: Version,
}

impl Clause {
    fn holds(&self, version: &Version) -> bool {
        let ord = release_cmp(version, &self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
        }
    }
}

/// A textual version-range predicate (e.g. ">=3.2.0 <3.10.0", "=3.11.0").
///
/// An expression is zero or more whitespace-separated clauses of the form
/// `<op><version>` with op in {=, <, <=, >, >=}; clauses are ANDed. The empty
/// expression matches every version.
#[derive(Debug, Clone)]
pub struct VersionSelector {
    expr: String,
    clauses: Vec<Clause>,
}

impl VersionSelector {
    /// Parse a selector expression. Malformed expressions are configuration
    /// errors and fail fast.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        for token in expr.split_whitespace() {
            let (op, rest) = if let Some(rest) = token.strip_prefix(">=") {
                (Op::Ge, rest)
            } else if let Some(rest) = token.strip_prefix("<=") {
                (Op::Le, rest)
            } else if let Some(rest) = token.strip_prefix('>') {
                (Op::Gt, rest)
            } else if let Some(rest) = token.strip_prefix('<') {
                (Op::Lt, rest)
            } else if let Some(rest) = token.strip_prefix('=') {
                (Op::Eq, rest)
            } else {
                return Err(BuildError::MalformedSelector(expr.to_string()));
            };
            let version = Version::parse(rest)
                .map_err(|_| BuildError::MalformedSelector(expr.to_string()))?;
            clauses.push(Clause { op, version });
        }
        Ok(Self {
            expr: expr.to_string(),
            clauses,
        })
    }

    /// True when every clause holds for the given version.
    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().all(|clause| clause.holds(version))
    }

    /// The original expression text.
    pub fn expr(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let sel = VersionSelector::parse("").unwrap();
        assert!(sel.matches(&v("0.0.1")));
        assert!(sel.matches(&v("3.10.0")));
        assert!(sel.matches(&v("99.0.0")));
    }

    #[test]
    fn test_exact_match() {
        let sel = VersionSelector::parse("=3.6.0").unwrap();
        assert!(sel.matches(&v("3.6.0")));
        assert!(!sel.matches(&v("3.6.1")));
    }

    #[test]
    fn test_strict_lower_bound_excludes_itself() {
        let sel = VersionSelector::parse("<3.6.0").unwrap();
        assert!(!sel.matches(&v("3.6.0")));
        assert!(sel.matches(&v("3.5.9")));
    }

    #[test]
    fn test_range_is_conjunction() {
        let sel = VersionSelector::parse(">=3.2.0 <3.10.0").unwrap();
        assert!(sel.matches(&v("3.2.0")));
        assert!(sel.matches(&v("3.9.9")));
        assert!(!sel.matches(&v("3.10.0")));
        assert!(!sel.matches(&v("3.1.0")));
    }

    #[test]
    fn test_prerelease_suffix_is_stripped() {
        let sel = VersionSelector::parse(">=3.11.0").unwrap();
        assert!(sel.matches(&v("3.11.0-SNAPSHOT")));

        let exact = VersionSelector::parse("=3.11.0").unwrap();
        assert!(exact.matches(&v("3.11.0-SNAPSHOT")));
    }

    #[test]
    fn test_malformed_selectors_fail_fast() {
        assert!(VersionSelector::parse("~3.0.0").is_err());
        assert!(VersionSelector::parse(">=not.a.version").is_err());
        assert!(VersionSelector::parse("3.0.0").is_err());
    }

    #[test]
    fn test_version_with_v_prefix() {
        assert_eq!(v("v3.6.0"), v("3.6.0"));
    }
}

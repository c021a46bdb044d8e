//! Range-keyed compatibility tables

use semver::Version;

use crate::error::{BuildError, Result};
use crate::version::VersionSelector;

/// An ordered mapping from version selectors to values.
///
/// A concrete version may match zero, one, or multiple entries; `resolve_all`
/// returns every match. Entries are expected, by convention, to be mutually
/// exclusive when a single value is required — the table does not enforce
/// this, and `resolve_one` picks the first match in declaration order.
#[derive(Debug, Clone)]
pub struct VersionTable<T> {
    what: &'static str,
    entries: Vec<(VersionSelector, T)>,
}

impl<T> VersionTable<T> {
    /// Create an empty table. `what` names the mapping in error messages
    /// (e.g. "runtime", "API generation").
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            entries: Vec::new(),
        }
    }

    /// Build a table from (selector expression, value) pairs. Selector parse
    /// failures surface here, before any resolution runs.
    pub fn from_entries(what: &'static str, entries: Vec<(&str, T)>) -> Result<Self> {
        let mut table = Self::new(what);
        for (expr, value) in entries {
            table.insert(expr, value)?;
        }
        Ok(table)
    }

    /// Append an entry. Declaration order is resolution order.
    pub fn insert(&mut self, expr: &str, value: T) -> Result<()> {
        let selector = VersionSelector::parse(expr)?;
        self.entries.push((selector, value));
        Ok(())
    }

    /// Every value whose selector matches, in declaration order.
    pub fn resolve_all(&self, version: &Version) -> Vec<&T> {
        self.entries
            .iter()
            .filter(|(selector, _)| selector.matches(version))
            .map(|(_, value)| value)
            .collect()
    }

    /// The first matching value in declaration order. Zero matches is an
    /// error — never a silent default.
    pub fn resolve_one(&self, version: &Version) -> Result<&T> {
        self.entries
            .iter()
            .find(|(selector, _)| selector.matches(version))
            .map(|(_, value)| value)
            .ok_or_else(|| BuildError::NoCompatibleMapping {
                what: self.what,
                version: version.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

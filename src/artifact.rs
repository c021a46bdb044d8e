//! Artifact declarations and outputs

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// A declared request to produce one compiled artifact.
///
/// Declared by the build description, consumed once per
/// (spec × target-version) pair during orchestration, never mutated after
/// declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Absolute schema resource path (e.g. "/com/example/pcap.dfdl.xsd")
    pub schema: String,
    /// Root element name; None means "use the first element"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Disambiguates multiple artifacts sharing a target version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Compiler-tunable configuration file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
}

impl ArtifactSpec {
    /// Create a spec for a schema resource path
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            root: None,
            label: None,
            config: None,
        }
    }

    /// Set the root element name
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the disambiguating label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the tunable configuration file
    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Structural validation: the schema path must be an absolute resource
    /// path, resolvable against the worker search path.
    pub fn validate(&self) -> Result<()> {
        if !self.schema.starts_with('/') {
            return Err(BuildError::SchemaPathNotAbsolute(self.schema.clone()));
        }
        Ok(())
    }

    /// Human-readable identity for error reporting: the label when present,
    /// else the schema path.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.schema)
    }
}

/// Reject duplicate labels across a build's artifact specs.
///
/// Two unlabeled specs also collide: without distinct labels their output
/// file names would be identical for every target version. Checked once,
/// before any compilation runs.
pub fn validate_labels(specs: &[ArtifactSpec]) -> Result<()> {
    let mut seen: HashSet<Option<&str>> = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.label.as_deref()) {
            return Err(BuildError::DuplicateLabel(
                spec.label.clone().unwrap_or_else(|| "<none>".to_string()),
            ));
        }
    }
    Ok(())
}

/// A produced compiled-processor artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// Label of the spec that produced this artifact, if any
    pub label: Option<String>,
    /// Target backend version this artifact was compiled for
    pub target_version: String,
    /// Version/label-derived classifier embedded in the file name
    pub classifier: String,
    /// Location on disk
    pub path: PathBuf,
}

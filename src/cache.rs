//! Incremental-rebuild cache
//!
//! Keyed on the content of the full watched file set (the general project
//! classpath, directories expanded recursively). The cache is all-or-nothing:
//! any change recompiles every (artifact × target-version) pair, a deliberate
//! simplification given schema compilation cost dominates over redundant
//! recompiles.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::artifact::CompiledArtifact;
use crate::error::Result;

/// SHA256 fingerprint of a watched file set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the watched set: every file reachable from the given
    /// roots, in root declaration order, files in deterministic walk order.
    pub fn of_watched_set(roots: &[PathBuf]) -> Result<Self> {
        let mut hasher = Sha256::new();
        for root in roots {
            if root.is_dir() {
                for entry in WalkDir::new(root)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    let relative = entry
                        .path()
                        .strip_prefix(root)
                        .unwrap_or_else(|_| entry.path());
                    hash_file(&mut hasher, relative, entry.path())?;
                }
            } else if root.is_file() {
                hash_file(&mut hasher, root, root)?;
            }
            // Missing roots contribute nothing; appearing later changes the
            // fingerprint through their files.
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hash_file(hasher: &mut Sha256, label: &Path, path: &Path) -> Result<()> {
    hasher.update(label.to_string_lossy().as_bytes());
    hasher.update([0]);
    let content = fs::read(path)?;
    hasher.update(Sha256::digest(&content));
    hasher.update([0]);
    Ok(())
}

/// Persisted record of the last successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub fingerprint: String,
    pub artifacts: Vec<CompiledArtifact>,
    pub recorded_at: DateTime<Utc>,
}

/// The cache state directory. Single-writer: concurrent orchestration runs
/// over the same state directory are not supported.
#[derive(Debug, Clone)]
pub struct IncrementalCache {
    state_dir: PathBuf,
}

impl IncrementalCache {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.state_dir.join("manifest.json")
    }

    /// Load the recorded manifest; unreadable or undecodable state is a miss,
    /// never an error.
    pub fn load(&self) -> Option<CacheManifest> {
        let text = fs::read_to_string(self.manifest_path()).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Return the previously produced artifact set when the watched set is
    /// unchanged and every recorded artifact is still on disk.
    pub fn check(&self, fingerprint: &Fingerprint) -> Option<Vec<CompiledArtifact>> {
        let manifest = self.load()?;
        if manifest.fingerprint != fingerprint.as_str() {
            debug!("watched set changed; cache is stale");
            return None;
        }
        if manifest.artifacts.iter().any(|a| !a.path.is_file()) {
            debug!("recorded artifact missing on disk; cache is stale");
            return None;
        }
        Some(manifest.artifacts)
    }

    /// Record a successful run
    pub fn store(&self, fingerprint: &Fingerprint, artifacts: &[CompiledArtifact]) -> Result<()> {
        fs::create_dir_all(&self.state_dir)?;
        let manifest = CacheManifest {
            fingerprint: fingerprint.as_str().to_string(),
            artifacts: artifacts.to_vec(),
            recorded_at: Utc::now(),
        };
        fs::write(
            self.manifest_path(),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        Ok(())
    }

    /// Drop all cache state
    pub fn clean(&self) -> Result<()> {
        if self.state_dir.exists() {
            fs::remove_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(path: &Path) -> CompiledArtifact {
        CompiledArtifact {
            label: None,
            target_version: "3.6.0".to_string(),
            classifier: "daffodil360".to_string(),
            path: path.to_path_buf(),
        }
    }

    #[test]
    fn test_fingerprint_stable_for_unchanged_set() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.xsd"), b"alpha").unwrap();
        fs::write(dir.path().join("b.xsd"), b"beta").unwrap();

        let roots = vec![dir.path().to_path_buf()];
        let first = Fingerprint::of_watched_set(&roots).unwrap();
        let second = Fingerprint::of_watched_set(&roots).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprint_changes_on_content_change() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.xsd"), b"alpha").unwrap();
        let roots = vec![dir.path().to_path_buf()];

        let before = Fingerprint::of_watched_set(&roots).unwrap();
        fs::write(dir.path().join("a.xsd"), b"alpha2").unwrap();
        let after = Fingerprint::of_watched_set(&roots).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_changes_on_new_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.xsd"), b"alpha").unwrap();
        let roots = vec![dir.path().to_path_buf()];

        let before = Fingerprint::of_watched_set(&roots).unwrap();
        fs::write(dir.path().join("z.xsd"), b"zeta").unwrap();
        let after = Fingerprint::of_watched_set(&roots).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_check_returns_recorded_artifacts_when_fresh() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.bin");
        fs::write(&out, b"compiled").unwrap();

        let cache = IncrementalCache::new(dir.path().join("state"));
        let fingerprint = Fingerprint("abc".to_string());
        cache.store(&fingerprint, &[artifact(&out)]).unwrap();

        let reused = cache.check(&fingerprint).unwrap();
        assert_eq!(reused, vec![artifact(&out)]);
    }

    #[test]
    fn test_check_misses_on_different_fingerprint() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.bin");
        fs::write(&out, b"compiled").unwrap();

        let cache = IncrementalCache::new(dir.path().join("state"));
        cache
            .store(&Fingerprint("abc".to_string()), &[artifact(&out)])
            .unwrap();
        assert!(cache.check(&Fingerprint("def".to_string())).is_none());
    }

    #[test]
    fn test_check_misses_when_artifact_deleted() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.bin");
        fs::write(&out, b"compiled").unwrap();

        let cache = IncrementalCache::new(dir.path().join("state"));
        let fingerprint = Fingerprint("abc".to_string());
        cache.store(&fingerprint, &[artifact(&out)]).unwrap();

        fs::remove_file(&out).unwrap();
        assert!(cache.check(&fingerprint).is_none());
    }

    #[test]
    fn test_clean_removes_state() {
        let dir = tempdir().unwrap();
        let cache = IncrementalCache::new(dir.path().join("state"));
        cache
            .store(&Fingerprint("abc".to_string()), &[])
            .unwrap();
        assert!(cache.load().is_some());
        cache.clean().unwrap();
        assert!(cache.load().is_none());
    }
}

//! Build orchestration
//!
//! Crosses every declared target backend version with every artifact spec,
//! resolves the compatibility tables up front, and runs one isolated worker
//! subprocess per pair. Process isolation is the point: the worker gets a
//! search path constructed for the chosen backend version, distinct from
//! whatever the project classpath carries.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::artifact::{validate_labels, ArtifactSpec, CompiledArtifact};
use crate::cache::{Fingerprint, IncrementalCache};
use crate::config::BuildConfig;
use crate::dispatch::{ApiGeneration, WORKER_PATH_ENV};
use crate::error::{BuildError, Result};
use crate::naming;
use crate::toolchain::Toolchains;
use crate::version::parse_version;

/// File name of the worker executable
pub const WORKER_PROGRAM: &str = "daffodil-worker";

/// One fully resolved (artifact × target-version) compilation
#[derive(Debug, Clone, Serialize)]
pub struct CompileJob {
    pub artifact: ArtifactSpec,
    pub target_version: String,
    pub generation: ApiGeneration,
    pub runtime_version: String,
    pub classifier: String,
    pub output: PathBuf,
    /// Effective tunable config: the version-qualified sibling when present
    pub config_file: Option<PathBuf>,
    /// Ordered worker search path. Order is significant: worker assets
    /// first, the chosen backend version next, the project classpath last so
    /// a different backend version there cannot shadow the chosen one.
    pub search_path: Vec<PathBuf>,
}

impl CompileJob {
    /// Identity used in failure reporting
    pub fn display_name(&self) -> String {
        format!(
            "{} (daffodil {})",
            self.artifact.display_name(),
            self.target_version
        )
    }
}

/// The build orchestrator
pub struct Orchestrator {
    config: BuildConfig,
    toolchains: Toolchains,
    cache: IncrementalCache,
}

impl Orchestrator {
    pub fn new(config: BuildConfig) -> Result<Self> {
        let toolchains = Toolchains::builtin()?;
        let cache = IncrementalCache::new(&config.build.state_dir);
        Ok(Self {
            config,
            toolchains,
            cache,
        })
    }

    /// Resolve the full job matrix without compiling anything.
    ///
    /// Every table lookup happens here: configuration errors (duplicate
    /// labels, relative schema paths, unmapped versions) abort the build
    /// before any subprocess is launched.
    pub fn plan(&self) -> Result<Vec<CompileJob>> {
        validate_labels(&self.config.artifacts)?;
        for spec in &self.config.artifacts {
            spec.validate()?;
        }

        let platform = parse_version(&self.config.build.platform_version)?;
        let worker_dir = self.worker_dir()?;

        let mut jobs = Vec::new();
        for target_version in &self.config.build.target_versions {
            let target = parse_version(target_version)?;
            let generation = self.toolchains.api_generation(&target)?;
            let runtime_version = self.toolchains.resolve_runtime(&target, &platform)?;
            let aux = self.toolchains.aux_libraries(&target);
            let search_path =
                self.search_path(&worker_dir, target_version, &runtime_version, &aux);

            for spec in &self.config.artifacts {
                let classifier = naming::classifier(spec.label.as_deref(), target_version);
                let file_name = naming::artifact_file_name(
                    &self.config.project.name,
                    &self.config.project.version,
                    spec.label.as_deref(),
                    target_version,
                );
                let config_file = spec
                    .config
                    .as_ref()
                    .map(|base| versioned_config_override(base, target_version));

                jobs.push(CompileJob {
                    artifact: spec.clone(),
                    target_version: target_version.clone(),
                    generation,
                    runtime_version: runtime_version.clone(),
                    classifier,
                    output: self.config.build.output_dir.join(file_name),
                    config_file,
                    search_path: search_path.clone(),
                });
            }
        }
        debug!(jobs = jobs.len(), "resolved compile jobs");
        Ok(jobs)
    }

    /// Compile every job, honoring the incremental cache.
    pub fn build(&self) -> Result<Vec<CompiledArtifact>> {
        let jobs = self.plan()?;
        let fingerprint = Fingerprint::of_watched_set(&self.config.build.classpath)?;

        if let Some(artifacts) = self.cache.check(&fingerprint) {
            info!(
                artifacts = artifacts.len(),
                "classpath unchanged; reusing previous artifacts"
            );
            return Ok(artifacts);
        }

        fs::create_dir_all(&self.config.build.output_dir)?;
        let worker = self.worker_program()?;

        let total = jobs.len();
        let mut produced = Vec::new();
        let mut failed = 0usize;
        for job in &jobs {
            info!(
                artifact = %job.display_name(),
                generation = %job.generation,
                runtime = %job.runtime_version,
                "compiling"
            );
            match self.run_worker(&worker, job) {
                Ok(artifact) => produced.push(artifact),
                Err(err) if self.config.build.fail_fast => return Err(err),
                Err(err) => {
                    error!(artifact = %job.display_name(), error = %err, "compilation failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(BuildError::BuildFailed { failed, total });
        }

        self.cache.store(&fingerprint, &produced)?;
        Ok(produced)
    }

    /// Drop incremental-cache state
    pub fn clean_cache(&self) -> Result<()> {
        self.cache.clean()
    }

    fn run_worker(&self, worker: &Path, job: &CompileJob) -> Result<CompiledArtifact> {
        let joined = std::env::join_paths(&job.search_path)
            .map_err(|err| BuildError::InvalidSearchPath(err.to_string()))?;

        let empty = Path::new("");
        let status = Command::new(worker)
            .arg(job.generation.tag().to_string())
            .arg(&job.artifact.schema)
            .arg(&job.output)
            .arg(job.artifact.root.as_deref().unwrap_or(""))
            .arg(job.config_file.as_deref().unwrap_or(empty))
            .env(WORKER_PATH_ENV, joined)
            .status()
            .map_err(|err| BuildError::WorkerLaunch {
                artifact: job.display_name(),
                source: err,
            })?;

        if !status.success() {
            return Err(BuildError::WorkerFailed {
                artifact: job.display_name(),
                status: status.code().unwrap_or(-1),
            });
        }

        Ok(CompiledArtifact {
            label: job.artifact.label.clone(),
            target_version: job.target_version.clone(),
            classifier: job.classifier.clone(),
            path: job.output.clone(),
        })
    }

    /// Ordered worker search path for one target version.
    fn search_path(
        &self,
        worker_dir: &Path,
        target_version: &str,
        runtime_version: &str,
        aux: &[String],
    ) -> Vec<PathBuf> {
        let lib_root = &self.config.build.lib_root;
        let mut path = Vec::with_capacity(3 + aux.len() + self.config.build.classpath.len());
        path.push(worker_dir.to_path_buf());
        path.push(lib_root.join(format!("daffodil-{target_version}")));
        path.push(lib_root.join(format!("runtime-{runtime_version}")));
        for name in aux {
            path.push(lib_root.join(name));
        }
        path.extend(self.config.build.classpath.iter().cloned());
        path
    }

    fn worker_program(&self) -> Result<PathBuf> {
        if let Some(program) = &self.config.build.worker_program {
            return Ok(program.clone());
        }
        let exe = std::env::current_exe()?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(dir.join(format!("{WORKER_PROGRAM}{}", std::env::consts::EXE_SUFFIX)))
    }

    fn worker_dir(&self) -> Result<PathBuf> {
        let program = self.worker_program()?;
        Ok(program
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    }
}

/// Per-target-version configuration override discovery.
///
/// Given base config `P` with basename `B` and extension `E`, a sibling
/// `B.<ivy_config_name>.E` replaces `P` for that target version only.
pub fn versioned_config_override(base: &Path, target_version: &str) -> PathBuf {
    let config_name = naming::ivy_config_name(target_version);
    let candidate = match (base.file_stem(), base.extension()) {
        (Some(stem), Some(ext)) => base.with_file_name(format!(
            "{}.{}.{}",
            stem.to_string_lossy(),
            config_name,
            ext.to_string_lossy()
        )),
        (Some(stem), None) => {
            base.with_file_name(format!("{}.{}", stem.to_string_lossy(), config_name))
        }
        _ => return base.to_path_buf(),
    };
    if candidate.is_file() {
        candidate
    } else {
        base.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildSection, ProjectConfig};
    use tempfile::tempdir;

    fn config(targets: &[&str], artifacts: Vec<ArtifactSpec>) -> BuildConfig {
        BuildConfig {
            project: ProjectConfig {
                name: "pcap".to_string(),
                version: "1.2.0".to_string(),
            },
            build: BuildSection {
                target_versions: targets.iter().map(|s| s.to_string()).collect(),
                worker_program: Some(PathBuf::from("/opt/daffodil-build/daffodil-worker")),
                ..BuildSection::default()
            },
            artifacts,
        }
    }

    #[test]
    fn test_plan_crosses_versions_with_artifacts() {
        let config = config(
            &["3.6.0", "3.5.0"],
            vec![ArtifactSpec::new("/a/b.xsd")],
        );
        let jobs = Orchestrator::new(config).unwrap().plan().unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].target_version, "3.6.0");
        assert_eq!(jobs[0].classifier, "daffodil360");
        assert_eq!(
            jobs[0].output,
            PathBuf::from("target/daffodil/pcap-1.2.0-daffodil360.bin")
        );
        assert_eq!(jobs[1].target_version, "3.5.0");
        assert_eq!(
            jobs[1].output,
            PathBuf::from("target/daffodil/pcap-1.2.0-daffodil350.bin")
        );
    }

    #[test]
    fn test_plan_resolves_generation_per_target() {
        let config = config(
            &["3.6.0", "3.10.0"],
            vec![ArtifactSpec::new("/a/b.xsd")],
        );
        let jobs = Orchestrator::new(config).unwrap().plan().unwrap();
        assert_eq!(jobs[0].generation, ApiGeneration::Gen1);
        assert_eq!(jobs[1].generation, ApiGeneration::Gen2);
    }

    #[test]
    fn test_plan_rejects_duplicate_labels_before_anything_runs() {
        let config = config(
            &["3.6.0", "3.5.0"],
            vec![
                ArtifactSpec::new("/a.xsd").with_label("file"),
                ArtifactSpec::new("/b.xsd").with_label("file"),
            ],
        );
        let err = Orchestrator::new(config).unwrap().plan().unwrap_err();
        assert!(matches!(err, BuildError::DuplicateLabel(_)));
    }

    #[test]
    fn test_plan_rejects_relative_schema_path() {
        let config = config(&["3.6.0"], vec![ArtifactSpec::new("relative.xsd")]);
        let err = Orchestrator::new(config).unwrap().plan().unwrap_err();
        assert!(matches!(err, BuildError::SchemaPathNotAbsolute(_)));
    }

    #[test]
    fn test_plan_rejects_unsupported_target_version() {
        let config = config(&["2.0.0"], vec![ArtifactSpec::new("/a.xsd")]);
        let err = Orchestrator::new(config).unwrap().plan().unwrap_err();
        assert!(matches!(err, BuildError::NoCompatibleMapping { .. }));
    }

    #[test]
    fn test_search_path_order_worker_then_backend_then_classpath() {
        let mut config = config(&["3.6.0"], vec![ArtifactSpec::new("/a.xsd")]);
        config.build.classpath = vec![PathBuf::from("src/main/resources")];
        let jobs = Orchestrator::new(config).unwrap().plan().unwrap();

        let path = &jobs[0].search_path;
        assert_eq!(path[0], PathBuf::from("/opt/daffodil-build"));
        assert_eq!(path[1], PathBuf::from("lib/daffodil-3.6.0"));
        assert_eq!(path[2], PathBuf::from("lib/runtime-2.12.18"));
        assert_eq!(path[3], PathBuf::from("lib/daffodil-udf"));
        assert_eq!(
            path.last().unwrap(),
            &PathBuf::from("src/main/resources")
        );
    }

    #[test]
    fn test_config_override_used_when_sibling_present() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cfg.toml");
        std::fs::write(&base, "[tunables]\n").unwrap();
        let sibling = dir.path().join("cfg.daffodil390.toml");
        std::fs::write(&sibling, "[tunables]\n").unwrap();

        assert_eq!(versioned_config_override(&base, "3.9.0"), sibling);
        // Any other target version falls back to the base config.
        assert_eq!(versioned_config_override(&base, "3.6.0"), base);
    }

    #[test]
    fn test_plan_picks_versioned_config_per_job() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cfg.toml");
        std::fs::write(&base, "[tunables]\n").unwrap();
        let sibling = dir.path().join("cfg.daffodil390.toml");
        std::fs::write(&sibling, "[tunables]\n").unwrap();

        let config = config(
            &["3.9.0", "3.6.0"],
            vec![ArtifactSpec::new("/a.xsd").with_config(&base)],
        );
        let jobs = Orchestrator::new(config).unwrap().plan().unwrap();
        assert_eq!(jobs[0].config_file.as_deref(), Some(sibling.as_path()));
        assert_eq!(jobs[1].config_file.as_deref(), Some(base.as_path()));
    }
}

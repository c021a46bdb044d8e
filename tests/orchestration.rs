//! End-to-end orchestration tests
//!
//! These substitute a stub worker executable for the real one: the contract
//! between orchestrator and worker is the argument vector, the search-path
//! environment variable, and the exit code, so a script that records its
//! arguments and touches the output file exercises the whole loop.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use daffodil_build::config::{BuildConfig, BuildSection, ProjectConfig};
use daffodil_build::{ArtifactSpec, BuildError, Orchestrator};
use tempfile::TempDir;

struct Scratch {
    dir: TempDir,
    log: PathBuf,
}

impl Scratch {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("scratch dir");
        let log = dir.path().join("worker.log");
        Self { dir, log }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a stub worker that appends its argument vector to the log and
    /// produces the requested output file.
    fn stub_worker(&self) -> PathBuf {
        self.write_worker(&format!(
            "#!/bin/sh\necho \"$1|$2|$3|$4|$5\" >> {}\ntouch \"$3\"\n",
            self.log.display()
        ))
    }

    /// Write a stub worker that always fails without producing output.
    fn failing_worker(&self) -> PathBuf {
        self.write_worker(&format!(
            "#!/bin/sh\necho \"$1|$2|$3|$4|$5\" >> {}\necho '[error] stub rejection' >&2\nexit 1\n",
            self.log.display()
        ))
    }

    fn write_worker(&self, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.path().join("daffodil-worker");
        fs::write(&path, script).expect("write stub worker");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub worker");
        path
    }

    fn invocations(&self) -> Vec<String> {
        match fs::read_to_string(&self.log) {
            Ok(text) => text.lines().map(String::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn config(&self, worker: &Path, targets: &[&str], artifacts: Vec<ArtifactSpec>) -> BuildConfig {
        let classpath = self.path().join("resources");
        fs::create_dir_all(&classpath).expect("classpath dir");
        // The watched set must be non-empty for staleness tests to bite.
        fs::write(classpath.join("a.dfdl.xsd"), b"<schema/>").expect("seed classpath");

        BuildConfig {
            project: ProjectConfig {
                name: "pcap".to_string(),
                version: "1.2.0".to_string(),
            },
            build: BuildSection {
                target_versions: targets.iter().map(|s| s.to_string()).collect(),
                classpath: vec![classpath],
                output_dir: self.path().join("out"),
                state_dir: self.path().join("state"),
                worker_program: Some(worker.to_path_buf()),
                ..BuildSection::default()
            },
            artifacts,
        }
    }
}

#[test]
fn build_produces_one_artifact_per_target_version() {
    let scratch = Scratch::new();
    let worker = scratch.stub_worker();
    let config = scratch.config(&worker, &["3.6.0", "3.5.0"], vec![ArtifactSpec::new("/a/b.xsd")]);

    let artifacts = Orchestrator::new(config).unwrap().build().unwrap();

    let names: Vec<_> = artifacts
        .iter()
        .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["pcap-1.2.0-daffodil360.bin", "pcap-1.2.0-daffodil350.bin"]
    );
    for artifact in &artifacts {
        assert!(artifact.path.is_file());
    }
    assert_eq!(scratch.invocations().len(), 2);
}

#[test]
fn worker_receives_the_five_argument_vector() {
    let scratch = Scratch::new();
    let worker = scratch.stub_worker();
    let config = scratch.config(
        &worker,
        &["3.10.0"],
        vec![ArtifactSpec::new("/a/b.xsd").with_root("PCAP")],
    );

    Orchestrator::new(config).unwrap().build().unwrap();

    let invocations = scratch.invocations();
    assert_eq!(invocations.len(), 1);
    let fields: Vec<_> = invocations[0].split('|').collect();
    assert_eq!(fields.len(), 5);
    // 3.10.0 speaks generation 2.
    assert_eq!(fields[0], "2");
    assert_eq!(fields[1], "/a/b.xsd");
    assert!(fields[2].ends_with("pcap-1.2.0-daffodil3100.bin"));
    assert_eq!(fields[3], "PCAP");
    assert_eq!(fields[4], "");
}

#[test]
fn unchanged_classpath_skips_the_worker_and_returns_same_set() {
    let scratch = Scratch::new();
    let worker = scratch.stub_worker();
    let config = scratch.config(&worker, &["3.6.0", "3.5.0"], vec![ArtifactSpec::new("/a/b.xsd")]);
    let orchestrator = Orchestrator::new(config).unwrap();

    let first = orchestrator.build().unwrap();
    assert_eq!(scratch.invocations().len(), 2);

    let second = orchestrator.build().unwrap();
    assert_eq!(second, first);
    // No new worker invocations on the cached run.
    assert_eq!(scratch.invocations().len(), 2);
}

#[test]
fn classpath_change_invalidates_the_cache() {
    let scratch = Scratch::new();
    let worker = scratch.stub_worker();
    let config = scratch.config(&worker, &["3.6.0"], vec![ArtifactSpec::new("/a/b.xsd")]);
    let classpath_file = config.build.classpath[0].join("a.dfdl.xsd");
    let orchestrator = Orchestrator::new(config).unwrap();

    orchestrator.build().unwrap();
    assert_eq!(scratch.invocations().len(), 1);

    fs::write(&classpath_file, b"<schema version='2'/>").unwrap();
    orchestrator.build().unwrap();
    assert_eq!(scratch.invocations().len(), 2);
}

#[test]
fn deleted_artifact_forces_a_rebuild() {
    let scratch = Scratch::new();
    let worker = scratch.stub_worker();
    let config = scratch.config(&worker, &["3.6.0"], vec![ArtifactSpec::new("/a/b.xsd")]);
    let orchestrator = Orchestrator::new(config).unwrap();

    let artifacts = orchestrator.build().unwrap();
    fs::remove_file(&artifacts[0].path).unwrap();

    orchestrator.build().unwrap();
    assert_eq!(scratch.invocations().len(), 2);
}

#[test]
fn failing_pair_fails_the_build_but_runs_remaining_pairs() {
    let scratch = Scratch::new();
    let worker = scratch.failing_worker();
    let config = scratch.config(&worker, &["3.6.0", "3.5.0"], vec![ArtifactSpec::new("/a/b.xsd")]);

    let err = Orchestrator::new(config).unwrap().build().unwrap_err();
    assert!(matches!(
        err,
        BuildError::BuildFailed {
            failed: 2,
            total: 2
        }
    ));
    // Both pairs were attempted; one failure does not abort the other.
    assert_eq!(scratch.invocations().len(), 2);
}

#[test]
fn fail_fast_stops_after_the_first_failure() {
    let scratch = Scratch::new();
    let worker = scratch.failing_worker();
    let mut config =
        scratch.config(&worker, &["3.6.0", "3.5.0"], vec![ArtifactSpec::new("/a/b.xsd")]);
    config.build.fail_fast = true;

    let err = Orchestrator::new(config).unwrap().build().unwrap_err();
    assert!(matches!(err, BuildError::WorkerFailed { .. }));
    assert_eq!(scratch.invocations().len(), 1);
}

#[test]
fn failed_build_leaves_cache_stale() {
    let scratch = Scratch::new();
    let failing = scratch.failing_worker();
    let config = scratch.config(&failing, &["3.6.0"], vec![ArtifactSpec::new("/a/b.xsd")]);
    assert!(Orchestrator::new(config).unwrap().build().is_err());

    // Same watched set, now with a working worker: the failed run must not
    // have recorded a reusable artifact set.
    let worker = scratch.stub_worker();
    let config = scratch.config(&worker, &["3.6.0"], vec![ArtifactSpec::new("/a/b.xsd")]);
    let artifacts = Orchestrator::new(config).unwrap().build().unwrap();
    assert_eq!(artifacts.len(), 1);
}

#[test]
fn versioned_config_sibling_is_passed_for_its_target_only() {
    let scratch = Scratch::new();
    let worker = scratch.stub_worker();

    let base = scratch.path().join("cfg.toml");
    fs::write(&base, "[tunables]\n").unwrap();
    let sibling = scratch.path().join("cfg.daffodil390.toml");
    fs::write(&sibling, "[tunables]\n").unwrap();

    let config = scratch.config(
        &worker,
        &["3.9.0", "3.6.0"],
        vec![ArtifactSpec::new("/a/b.xsd").with_config(&base)],
    );
    Orchestrator::new(config).unwrap().build().unwrap();

    let invocations = scratch.invocations();
    assert!(invocations[0].ends_with(&format!("|{}", sibling.display())));
    assert!(invocations[1].ends_with(&format!("|{}", base.display())));
}

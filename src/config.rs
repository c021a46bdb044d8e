//! Build-description configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (daffodil.toml)
//! - Environment variables (DAFFODIL_*)
//!
//! ## Example config file (daffodil.toml):
//! ```toml
//! [project]
//! name = "pcap"
//! version = "1.2.0"
//!
//! [build]
//! target_versions = ["3.6.0", "3.10.0"]
//! lib_root = "lib"
//! classpath = ["src/main/resources"]
//!
//! [[artifact]]
//! schema = "/com/example/pcap.dfdl.xsd"
//! root = "PCAP"
//! label = "file"
//! config = "config/pcap.toml"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::artifact::ArtifactSpec;

/// Main configuration for a build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Project identity (feeds artifact file names)
    #[serde(default)]
    pub project: ProjectConfig,

    /// Orchestration settings
    #[serde(default)]
    pub build: BuildSection,

    /// Declared artifacts
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSpec>,
}

/// Project identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Project version
    #[serde(default = "default_project_version")]
    pub version: String,
}

/// Orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Target backend versions to compile for
    #[serde(default)]
    pub target_versions: Vec<String>,

    /// Build platform version (keys the runtime-floor tables)
    #[serde(default = "default_platform_version")]
    pub platform_version: String,

    /// Root directory holding versioned backend/runtime library directories
    #[serde(default = "default_lib_root")]
    pub lib_root: PathBuf,

    /// General project classpath: resource roots appended last to the worker
    /// search path, and the watched set of the incremental cache
    #[serde(default)]
    pub classpath: Vec<PathBuf>,

    /// Directory compiled artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Incremental-cache state directory
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Worker executable; defaults to the daffodil-worker sibling of the
    /// running executable
    #[serde(default)]
    pub worker_program: Option<PathBuf>,

    /// Abort on the first failed (artifact × version) pair instead of
    /// finishing the remaining pairs
    #[serde(default)]
    pub fail_fast: bool,
}

// Default value functions
fn default_project_name() -> String {
    "project".to_string()
}

fn default_project_version() -> String {
    "0.0.0".to_string()
}

fn default_platform_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_lib_root() -> PathBuf {
    PathBuf::from("lib")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/daffodil")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".daffodil-build")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            version: default_project_version(),
        }
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            target_versions: Vec::new(),
            platform_version: default_platform_version(),
            lib_root: default_lib_root(),
            classpath: Vec::new(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            worker_program: None,
            fail_fast: false,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            build: BuildSection::default(),
            artifacts: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["daffodil.toml", ".daffodil.toml", "config/daffodil.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "daffodil", "build") {
            let xdg_config = config_dir.config_dir().join("daffodil.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (DAFFODIL_*)
        builder = builder.add_source(
            Environment::with_prefix("DAFFODIL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

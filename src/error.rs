//! Error types for the build orchestrator

use thiserror::Error;

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Build orchestration errors
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Malformed version selector: {0:?}")]
    MalformedSelector(String),

    #[error("No compatible {what} mapping for version {version}")]
    NoCompatibleMapping { what: &'static str, version: String },

    #[error("Duplicate artifact label: {0:?}")]
    DuplicateLabel(String),

    #[error("Schema resource path must be absolute (start with '/'): {0:?}")]
    SchemaPathNotAbsolute(String),

    #[error("Unsupported API generation: {0}")]
    UnsupportedGeneration(u32),

    #[error("Schema resource not found on the worker search path: {0}")]
    SchemaResourceNotFound(String),

    #[error("No backend library {name} found on the worker search path")]
    BackendNotFound { name: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Failed to bind backend symbol: {0}")]
    Library(#[from] libloading::Error),

    #[error("{stage} reported error diagnostics")]
    CompileRejected { stage: &'static str },

    #[error("Tunable {name:?} has unsupported {kind} value")]
    InvalidTunable { name: String, kind: &'static str },

    #[error("Invalid search path entry: {0}")]
    InvalidSearchPath(String),

    #[error("Failed to launch compilation worker for {artifact}: {source}")]
    WorkerLaunch {
        artifact: String,
        source: std::io::Error,
    },

    #[error("Compilation failed for {artifact} (worker exit status {status})")]
    WorkerFailed { artifact: String, status: i32 },

    #[error("{failed} of {total} artifacts failed to compile")]
    BuildFailed { failed: usize, total: usize },

    #[error("Invalid version: {0}")]
    Semver(#[from] semver::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

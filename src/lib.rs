//! Daffodil Build
//!
//! A multi-version DFDL schema compilation orchestrator: compiles declared
//! schemas into serialized, reusable processor artifacts for every requested
//! Apache Daffodil backend version.
//!
//! ## Features
//!
//! - **Version Tables**: range-keyed compatibility tables pick the support
//!   runtime, API generation, and auxiliary libraries per backend version
//! - **Isolated Workers**: each compilation runs in a subprocess with an
//!   independently constructed library search path, so version-specific
//!   backend binaries never collide in one process
//! - **Generation Dispatch**: the small closed set of backend API shapes is
//!   bound at runtime via dynamic symbol resolution, never linked statically
//! - **Incremental Cache**: content fingerprints of the project classpath
//!   skip recompilation when nothing changed
//! - **Deterministic Naming**: artifact file names are a stable wire
//!   contract derived from project, label, and target version
//!
//! ## Architecture
//!
//! ```text
//! daffodil-build (CLI)
//! └── Orchestrator
//!     ├── Toolchains ── VersionTable ── VersionSelector
//!     ├── IncrementalCache (classpath fingerprint)
//!     └── daffodil-worker (subprocess, per artifact × version)
//!         └── run_pipeline ── DynBackend (gen 1 | gen 2)
//!             └── libdaffodil on DAFFODIL_WORKER_PATH
//! ```

pub mod artifact;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod table;
pub mod toolchain;
pub mod version;

pub use artifact::{ArtifactSpec, CompiledArtifact};
pub use cache::{Fingerprint, IncrementalCache};
pub use config::BuildConfig;
pub use dispatch::{ApiGeneration, CompileRequest, Diagnostic, SchemaRef};
pub use error::{BuildError, Result};
pub use orchestrator::{CompileJob, Orchestrator};
pub use table::VersionTable;
pub use toolchain::Toolchains;
pub use version::VersionSelector;

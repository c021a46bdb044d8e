//! Compilation dispatch across backend API generations
//!
//! The backend library has shipped a small number of discrete API shapes.
//! Rather than linking statically against every shape, the worker resolves
//! the chosen generation's entry points at runtime from whichever backend
//! library the orchestrator placed on the search path. The
//! compile → diagnose → save pipeline is written exactly once against the
//! [`SchemaCompiler`] seam; only the method bindings differ per generation.

use std::ffi::{CStr, CString};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use libloading::Library;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BuildError, Result};

/// Environment variable carrying the worker's ordered search path
/// (platform path-list syntax). The orchestrator constructs it; the worker
/// and the backend library both consume it.
pub const WORKER_PATH_ENV: &str = "DAFFODIL_WORKER_PATH";

/// Internal API generation: selects which structural variant of the backend
/// compile API the worker binds. Not the backend's own version number —
/// many backend versions map to the same generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiGeneration {
    /// Source-URI compile entry point
    Gen1,
    /// Resource-path compile entry point (more reproducible, added later)
    Gen2,
}

impl ApiGeneration {
    /// Decode the integer tag used on the worker argument vector
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(ApiGeneration::Gen1),
            2 => Ok(ApiGeneration::Gen2),
            other => Err(BuildError::UnsupportedGeneration(other)),
        }
    }

    /// The integer tag used on the worker argument vector
    pub fn tag(self) -> u32 {
        match self {
            ApiGeneration::Gen1 => 1,
            ApiGeneration::Gen2 => 2,
        }
    }
}

impl fmt::Display for ApiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A single compiler or processor diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub is_error: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.is_error { "error" } else { "warning" };
        write!(f, "[{}] {}", severity, self.message)
    }
}

/// Write diagnostics to the error stream, one per line, in reported order
pub fn emit_diagnostics(diagnostics: &[Diagnostic], out: &mut dyn Write) -> std::io::Result<()> {
    for diagnostic in diagnostics {
        writeln!(out, "{diagnostic}")?;
    }
    Ok(())
}

/// How the schema is handed to the backend: the one logical input of the
/// abstract compile operation, with one constructor per generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRef {
    /// `file:` URI of the resolved schema file (generation 1)
    SourceUri(String),
    /// Absolute resource path, resolved by the backend itself against the
    /// same search path (generation 2)
    ResourcePath(String),
}

impl SchemaRef {
    /// Build the generation-appropriate reference for a schema resource that
    /// has already been resolved to `resolved` on the search path.
    pub fn for_generation(
        generation: ApiGeneration,
        resource_path: &str,
        resolved: &Path,
    ) -> SchemaRef {
        match generation {
            ApiGeneration::Gen1 => SchemaRef::SourceUri(format!("file://{}", resolved.display())),
            ApiGeneration::Gen2 => SchemaRef::ResourcePath(resource_path.to_string()),
        }
    }
}

/// The abstract compile seam. One implementation binds the real backend
/// dynamically; tests drive the pipeline with in-memory fakes.
pub trait SchemaCompiler {
    /// Apply one named tunable to the compiler configuration
    fn apply_tunable(&mut self, name: &str, value: &str) -> Result<()>;

    /// Compile the schema, producing a processor factory
    fn compile(&mut self, schema: &SchemaRef, root: Option<&str>)
        -> Result<Box<dyn ProcessorFactory>>;
}

/// A compiled-schema factory: diagnostics, error state, processor creation
pub trait ProcessorFactory {
    fn diagnostics(&self) -> Vec<Diagnostic>;
    fn is_error(&self) -> bool;
    fn on_path(&self, path: &str) -> Result<Box<dyn DataProcessor>>;
}

/// A data processor bound to a root path, ready to serialize
pub trait DataProcessor {
    fn diagnostics(&self) -> Vec<Diagnostic>;
    fn is_error(&self) -> bool;
    fn save(&self, output: &Path) -> Result<()>;
}

/// Parse the ordered search path from the worker environment
pub fn search_path_from_env() -> Vec<PathBuf> {
    std::env::var_os(WORKER_PATH_ENV)
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default()
}

/// Resolve an absolute resource path against the search-path directories:
/// first directory containing the relative path wins.
pub fn resolve_resource(search_path: &[PathBuf], resource: &str) -> Result<PathBuf> {
    let relative = resource
        .strip_prefix('/')
        .ok_or_else(|| BuildError::SchemaPathNotAbsolute(resource.to_string()))?;
    for root in search_path {
        let candidate = root.join(relative);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(BuildError::SchemaResourceNotFound(resource.to_string()))
}

/// Tunable configuration file: a `[tunables]` table of name = value pairs,
/// applied to the compiler in declaration order.
#[derive(Debug, Default, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub tunables: toml::Table,
}

/// Load a tunable configuration file
pub fn load_worker_config(path: &Path) -> Result<WorkerConfig> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

fn tunable_value(name: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        other => Err(BuildError::InvalidTunable {
            name: name.to_string(),
            kind: other.type_str(),
        }),
    }
}

/// One compile request, as carried on the worker argument vector
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub generation: ApiGeneration,
    pub schema_resource: &'a str,
    pub output: &'a Path,
    pub root: Option<&'a str>,
    pub config: Option<&'a Path>,
}

/// The compile → diagnose → save pipeline, identical across generations.
///
/// Ordering is contractual: the schema resource must resolve before anything
/// else runs, and the output location must be writable before the expensive
/// compile starts. `open_compiler` is only invoked once both hold.
pub fn run_pipeline<F>(
    request: &CompileRequest<'_>,
    search_path: &[PathBuf],
    open_compiler: F,
    diag_out: &mut dyn Write,
) -> Result<()>
where
    F: FnOnce() -> Result<Box<dyn SchemaCompiler>>,
{
    let resolved = resolve_resource(search_path, request.schema_resource)?;
    debug!(schema = %resolved.display(), "resolved schema resource");

    // Truncate/create up front so an unwritable output fails before compiling
    File::create(request.output)?;

    let mut compiler = open_compiler()?;

    if let Some(config_path) = request.config {
        let config = load_worker_config(config_path)?;
        for (name, value) in &config.tunables {
            compiler.apply_tunable(name, &tunable_value(name, value)?)?;
        }
    }

    let schema_ref = SchemaRef::for_generation(request.generation, request.schema_resource, &resolved);
    let factory = compiler.compile(&schema_ref, request.root)?;

    emit_diagnostics(&factory.diagnostics(), diag_out)?;
    if factory.is_error() {
        return Err(BuildError::CompileRejected {
            stage: "Schema compilation",
        });
    }

    let processor = factory.on_path("/")?;
    emit_diagnostics(&processor.diagnostics(), diag_out)?;
    if processor.is_error() {
        return Err(BuildError::CompileRejected {
            stage: "Processor construction",
        });
    }

    processor.save(request.output)?;
    debug!(output = %request.output.display(), "processor serialized");
    Ok(())
}

// ---------------------------------------------------------------------------
// Dynamic backend binding
// ---------------------------------------------------------------------------

#[repr(C)]
struct RawCompiler {
    _opaque: [u8; 0],
}

#[repr(C)]
struct RawFactory {
    _opaque: [u8; 0],
}

#[repr(C)]
struct RawProcessor {
    _opaque: [u8; 0],
}

type CompilerNewFn = unsafe extern "C" fn() -> *mut RawCompiler;
type CompilerFreeFn = unsafe extern "C" fn(*mut RawCompiler);
type SetTunableFn =
    unsafe extern "C" fn(*mut RawCompiler, *const c_char, *const c_char) -> c_int;
type CompileSourceFn = unsafe extern "C" fn(
    *mut RawCompiler,
    *const c_char,
    *const c_char,
    *const c_char,
) -> *mut RawFactory;
type CompileResourceFn = CompileSourceFn;
type FactoryDiagCountFn = unsafe extern "C" fn(*mut RawFactory) -> usize;
type FactoryDiagMessageFn = unsafe extern "C" fn(*mut RawFactory, usize) -> *const c_char;
type FactoryDiagIsErrorFn = unsafe extern "C" fn(*mut RawFactory, usize) -> c_int;
type FactoryIsErrorFn = unsafe extern "C" fn(*mut RawFactory) -> c_int;
type FactoryOnPathFn = unsafe extern "C" fn(*mut RawFactory, *const c_char) -> *mut RawProcessor;
type FactoryFreeFn = unsafe extern "C" fn(*mut RawFactory);
type ProcessorDiagCountFn = unsafe extern "C" fn(*mut RawProcessor) -> usize;
type ProcessorDiagMessageFn = unsafe extern "C" fn(*mut RawProcessor, usize) -> *const c_char;
type ProcessorDiagIsErrorFn = unsafe extern "C" fn(*mut RawProcessor, usize) -> c_int;
type ProcessorIsErrorFn = unsafe extern "C" fn(*mut RawProcessor) -> c_int;
type ProcessorSaveFn = unsafe extern "C" fn(*mut RawProcessor, *const c_char) -> c_int;
type ProcessorFreeFn = unsafe extern "C" fn(*mut RawProcessor);

/// Backend entry points, resolved once when the library is opened. Plain fn
/// pointers stay valid as long as the owning [`Library`] is alive; everything
/// holding a pointer also holds the shared [`BackendLibrary`].
struct Vtable {
    compiler_free: CompilerFreeFn,
    set_tunable: SetTunableFn,
    compile_source: Option<CompileSourceFn>,
    compile_resource: Option<CompileResourceFn>,
    factory_diag_count: FactoryDiagCountFn,
    factory_diag_message: FactoryDiagMessageFn,
    factory_diag_is_error: FactoryDiagIsErrorFn,
    factory_is_error: FactoryIsErrorFn,
    factory_on_path: FactoryOnPathFn,
    factory_free: FactoryFreeFn,
    processor_diag_count: ProcessorDiagCountFn,
    processor_diag_message: ProcessorDiagMessageFn,
    processor_diag_is_error: ProcessorDiagIsErrorFn,
    processor_is_error: ProcessorIsErrorFn,
    processor_save: ProcessorSaveFn,
    processor_free: ProcessorFreeFn,
}

struct BackendLibrary {
    // Keeps every vtable fn pointer valid; dropped last.
    _library: Library,
    vtable: Vtable,
}

/// Platform shared-library file name of the backend (e.g. `libdaffodil.so`)
pub fn backend_library_name() -> String {
    format!(
        "{}daffodil{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// Locate the backend library on the search path: first directory containing
/// it wins, which is exactly why search-path order is significant.
pub fn locate_backend(search_path: &[PathBuf]) -> Result<PathBuf> {
    let name = backend_library_name();
    for dir in search_path {
        let candidate = dir.join(&name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(BuildError::BackendNotFound { name })
}

fn c_string(what: &'static str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| BuildError::Backend(format!("embedded NUL byte in {what}: {value:?}")))
}

fn collect_diagnostics(
    count: usize,
    message_at: impl Fn(usize) -> *const c_char,
    is_error_at: impl Fn(usize) -> bool,
) -> Vec<Diagnostic> {
    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        let raw_message = message_at(index);
        let message = if raw_message.is_null() {
            String::new()
        } else {
            // Message storage is owned by the backend object and outlives
            // this call.
            unsafe { CStr::from_ptr(raw_message) }
                .to_string_lossy()
                .into_owned()
        };
        out.push(Diagnostic {
            message,
            is_error: is_error_at(index),
        });
    }
    out
}

/// The dynamically bound backend compiler for one API generation
pub struct DynBackend {
    shared: Arc<BackendLibrary>,
    generation: ApiGeneration,
    compiler: *mut RawCompiler,
}

impl DynBackend {
    /// Open the backend library found on the search path and bind the entry
    /// points for `generation`. Binding the generation's compile symbol here
    /// means a backend/generation mismatch fails before any work is done.
    pub fn open(search_path: &[PathBuf], generation: ApiGeneration) -> Result<Self> {
        let path = locate_backend(search_path)?;
        debug!(backend = %path.display(), %generation, "opening backend library");
        let library = unsafe { Library::new(&path) }?;

        let vtable = unsafe {
            Vtable {
                compiler_free: *library.get::<CompilerFreeFn>(b"daffodil_compiler_free\0")?,
                set_tunable: *library.get::<SetTunableFn>(b"daffodil_compiler_set_tunable\0")?,
                compile_source: match generation {
                    ApiGeneration::Gen1 => {
                        Some(*library.get::<CompileSourceFn>(b"daffodil_compile_source\0")?)
                    }
                    ApiGeneration::Gen2 => None,
                },
                compile_resource: match generation {
                    ApiGeneration::Gen1 => None,
                    ApiGeneration::Gen2 => {
                        Some(*library.get::<CompileResourceFn>(b"daffodil_compile_resource\0")?)
                    }
                },
                factory_diag_count: *library
                    .get::<FactoryDiagCountFn>(b"daffodil_factory_diagnostic_count\0")?,
                factory_diag_message: *library
                    .get::<FactoryDiagMessageFn>(b"daffodil_factory_diagnostic_message\0")?,
                factory_diag_is_error: *library
                    .get::<FactoryDiagIsErrorFn>(b"daffodil_factory_diagnostic_is_error\0")?,
                factory_is_error: *library
                    .get::<FactoryIsErrorFn>(b"daffodil_factory_is_error\0")?,
                factory_on_path: *library.get::<FactoryOnPathFn>(b"daffodil_factory_on_path\0")?,
                factory_free: *library.get::<FactoryFreeFn>(b"daffodil_factory_free\0")?,
                processor_diag_count: *library
                    .get::<ProcessorDiagCountFn>(b"daffodil_processor_diagnostic_count\0")?,
                processor_diag_message: *library
                    .get::<ProcessorDiagMessageFn>(b"daffodil_processor_diagnostic_message\0")?,
                processor_diag_is_error: *library
                    .get::<ProcessorDiagIsErrorFn>(b"daffodil_processor_diagnostic_is_error\0")?,
                processor_is_error: *library
                    .get::<ProcessorIsErrorFn>(b"daffodil_processor_is_error\0")?,
                processor_save: *library.get::<ProcessorSaveFn>(b"daffodil_processor_save\0")?,
                processor_free: *library.get::<ProcessorFreeFn>(b"daffodil_processor_free\0")?,
            }
        };

        let compiler_new = unsafe { *library.get::<CompilerNewFn>(b"daffodil_compiler_new\0")? };
        let compiler = unsafe { compiler_new() };
        if compiler.is_null() {
            return Err(BuildError::Backend(
                "compiler construction returned null".to_string(),
            ));
        }

        Ok(Self {
            shared: Arc::new(BackendLibrary {
                _library: library,
                vtable,
            }),
            generation,
            compiler,
        })
    }
}

impl SchemaCompiler for DynBackend {
    fn apply_tunable(&mut self, name: &str, value: &str) -> Result<()> {
        let name_c = c_string("tunable name", name)?;
        let value_c = c_string("tunable value", value)?;
        let status = unsafe {
            (self.shared.vtable.set_tunable)(self.compiler, name_c.as_ptr(), value_c.as_ptr())
        };
        if status != 0 {
            return Err(BuildError::Backend(format!(
                "tunable {name:?} rejected (status {status})"
            )));
        }
        Ok(())
    }

    fn compile(
        &mut self,
        schema: &SchemaRef,
        root: Option<&str>,
    ) -> Result<Box<dyn ProcessorFactory>> {
        let root_c = root.map(|r| c_string("root element name", r)).transpose()?;
        let root_ptr = root_c.as_ref().map_or(ptr::null(), |c| c.as_ptr());
        // Root namespace is left unspecified; the backend derives it.
        let namespace_ptr = ptr::null();

        let raw = match (self.generation, schema) {
            (ApiGeneration::Gen1, SchemaRef::SourceUri(uri)) => {
                let compile = self.shared.vtable.compile_source.ok_or_else(|| {
                    BuildError::Backend("source entry point not bound".to_string())
                })?;
                let uri_c = c_string("schema URI", uri)?;
                unsafe { compile(self.compiler, uri_c.as_ptr(), root_ptr, namespace_ptr) }
            }
            (ApiGeneration::Gen2, SchemaRef::ResourcePath(path)) => {
                let compile = self.shared.vtable.compile_resource.ok_or_else(|| {
                    BuildError::Backend("resource entry point not bound".to_string())
                })?;
                let path_c = c_string("schema resource path", path)?;
                unsafe { compile(self.compiler, path_c.as_ptr(), root_ptr, namespace_ptr) }
            }
            _ => {
                return Err(BuildError::Backend(
                    "schema reference does not match API generation".to_string(),
                ))
            }
        };

        if raw.is_null() {
            return Err(BuildError::Backend(
                "schema compilation returned no factory".to_string(),
            ));
        }
        Ok(Box::new(DynFactory {
            shared: self.shared.clone(),
            raw,
        }))
    }
}

impl Drop for DynBackend {
    fn drop(&mut self) {
        unsafe { (self.shared.vtable.compiler_free)(self.compiler) };
    }
}

struct DynFactory {
    shared: Arc<BackendLibrary>,
    raw: *mut RawFactory,
}

impl ProcessorFactory for DynFactory {
    fn diagnostics(&self) -> Vec<Diagnostic> {
        let vt = &self.shared.vtable;
        let count = unsafe { (vt.factory_diag_count)(self.raw) };
        collect_diagnostics(
            count,
            |i| unsafe { (vt.factory_diag_message)(self.raw, i) },
            |i| unsafe { (vt.factory_diag_is_error)(self.raw, i) } != 0,
        )
    }

    fn is_error(&self) -> bool {
        unsafe { (self.shared.vtable.factory_is_error)(self.raw) != 0 }
    }

    fn on_path(&self, path: &str) -> Result<Box<dyn DataProcessor>> {
        let path_c = c_string("root path", path)?;
        let raw = unsafe { (self.shared.vtable.factory_on_path)(self.raw, path_c.as_ptr()) };
        if raw.is_null() {
            return Err(BuildError::Backend(
                "processor construction returned null".to_string(),
            ));
        }
        Ok(Box::new(DynProcessor {
            shared: self.shared.clone(),
            raw,
        }))
    }
}

impl Drop for DynFactory {
    fn drop(&mut self) {
        unsafe { (self.shared.vtable.factory_free)(self.raw) };
    }
}

struct DynProcessor {
    shared: Arc<BackendLibrary>,
    raw: *mut RawProcessor,
}

impl DataProcessor for DynProcessor {
    fn diagnostics(&self) -> Vec<Diagnostic> {
        let vt = &self.shared.vtable;
        let count = unsafe { (vt.processor_diag_count)(self.raw) };
        collect_diagnostics(
            count,
            |i| unsafe { (vt.processor_diag_message)(self.raw, i) },
            |i| unsafe { (vt.processor_diag_is_error)(self.raw, i) } != 0,
        )
    }

    fn is_error(&self) -> bool {
        unsafe { (self.shared.vtable.processor_is_error)(self.raw) != 0 }
    }

    fn save(&self, output: &Path) -> Result<()> {
        let path_c = c_string("output path", &output.to_string_lossy())?;
        let status = unsafe { (self.shared.vtable.processor_save)(self.raw, path_c.as_ptr()) };
        if status != 0 {
            return Err(BuildError::Backend(format!(
                "processor serialization failed (status {status})"
            )));
        }
        Ok(())
    }
}

impl Drop for DynProcessor {
    fn drop(&mut self) {
        unsafe { (self.shared.vtable.processor_free)(self.raw) };
    }
}

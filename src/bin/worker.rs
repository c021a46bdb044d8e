//! Daffodil compilation worker
//!
//! The isolated subprocess entry point. Invoked by the orchestrator with a
//! fixed five-argument positional vector; reports success or failure purely
//! through the exit code and the diagnostic lines on stderr.

use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use daffodil_build::dispatch::{
    run_pipeline, search_path_from_env, ApiGeneration, CompileRequest, DynBackend, SchemaCompiler,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daffodil-worker")]
#[command(about = "Compile one DFDL schema against one backend version")]
struct Cli {
    /// API generation tag (1 or 2)
    api_generation: u32,

    /// Absolute schema resource path
    schema_path: String,

    /// Output file path for the serialized processor
    output: PathBuf,

    /// Root element name; empty means "use the first element"
    root: String,

    /// Tunable config file path; empty means "no config"
    config: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> daffodil_build::Result<()> {
    let generation = ApiGeneration::from_tag(cli.api_generation)?;
    let search_path = search_path_from_env();

    let config = (!cli.config.is_empty()).then(|| Path::new(&cli.config));
    let request = CompileRequest {
        generation,
        schema_resource: &cli.schema_path,
        output: &cli.output,
        root: (!cli.root.is_empty()).then_some(cli.root.as_str()),
        config,
    };

    let mut stderr = io::stderr();
    run_pipeline(
        &request,
        &search_path,
        || {
            DynBackend::open(&search_path, generation)
                .map(|backend| Box::new(backend) as Box<dyn SchemaCompiler>)
        },
        &mut stderr,
    )
}

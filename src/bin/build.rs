//! Daffodil Build CLI
//!
//! Compiles declared schemas into processor artifacts for every target
//! backend version.

use clap::{Parser, Subcommand};
use daffodil_build::{BuildConfig, Orchestrator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daffodil-build")]
#[command(about = "Compile DFDL schemas for multiple Daffodil backend versions")]
struct Cli {
    /// Path to the build description file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every declared artifact for every target version
    Build {
        /// Ignore the incremental cache and recompile everything
        #[arg(long)]
        force: bool,
    },

    /// Print the resolved compile jobs without running them
    Plan {
        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove incremental-cache state
    Clean,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = BuildConfig::load_from(cli.config.as_deref())?;
    let orchestrator = Orchestrator::new(config)?;

    match cli.command {
        Commands::Build { force } => {
            if force {
                orchestrator.clean_cache()?;
            }

            let artifacts = orchestrator.build()?;
            for artifact in &artifacts {
                println!("✅ {} -> {}", artifact.classifier, artifact.path.display());
            }
            println!("{} artifact(s) up to date", artifacts.len());
            Ok(())
        }

        Commands::Plan { json } => {
            let jobs = orchestrator.plan()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                for job in &jobs {
                    println!(
                        "{} daffodil {} (gen {}, runtime {}) -> {}",
                        job.classifier,
                        job.target_version,
                        job.generation,
                        job.runtime_version,
                        job.output.display()
                    );
                }
                println!("{} job(s) planned", jobs.len());
            }
            Ok(())
        }

        Commands::Clean => {
            orchestrator.clean_cache()?;
            println!("✅ Cache state removed");
            Ok(())
        }
    }
}

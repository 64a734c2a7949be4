//! cfgtree CLI
//!
//! Entry point for the `cfgtree` command-line tool.

use cfgtree::deployment::{self, DeploymentConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cfgtree")]
#[command(about = "Resolve hierarchical deployment configuration", version)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "debug" or "cfgtree_core=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print deployment defaults and each environment's resolved settings
    Show {
        /// Deployment document (.toml or .json)
        file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a deployment document without printing it
    Check {
        /// Deployment document (.toml or .json)
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Show { file, json } => run_show(&file, json),
        Commands::Check { file } => run_check(&file),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(file: &Path) -> DeploymentConfig {
    let registry = match deployment::registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Schema error: {}", e);
            process::exit(2);
        }
    };
    let mut config = match DeploymentConfig::new(registry) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Schema error: {}", e);
            process::exit(2);
        }
    };

    match config.load_file(file) {
        Ok(document) => {
            tracing::info!(
                path = %document.path.display(),
                digest = %document.digest,
                "configuration loaded"
            );
            config
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn run_show(file: &Path, json: bool) {
    let config = load(file);
    let report = match config.report() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Resolution error: {}", e);
            process::exit(1);
        }
    };

    if json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", report.to_human());
    }
}

fn run_check(file: &Path) {
    let config = load(file);
    if let Err(e) = config.report() {
        eprintln!("Resolution error: {}", e);
        process::exit(1);
    }
    println!("Configuration valid: {}", file.display());
}

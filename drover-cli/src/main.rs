//! Drover CLI - Command line interface for Drover working copies

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use drover_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CloneArgs, StatusArgs};

/// Drover: git working copies for repository automation
#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to git executable (overrides config and env)
    #[arg(long, global = true, env = "DROVER_GIT_PATH")]
    git_path: Option<String>,

    /// Root for working copies (overrides config and env)
    #[arg(long, global = true, env = "DROVER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Clone a repository into a managed working copy
    Clone(CloneArgs),

    /// Show the git state of a working copy
    #[command(visible_alias = "st")]
    Status(StatusArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = Config::load_with_overrides(cli.git_path.clone(), cli.cache_dir.clone())?;

    if cli.verbose {
        tracing::debug!(
            git_path = %config.git.git_path,
            strategy = ?config.directories.strategy,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("drover {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Clone(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Status(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("Drover - git working copies for repository automation");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    println!("Drover Configuration");
    println!("====================");
    println!();
    println!("Git:");
    println!("  git_path: {}", config.git.git_path);
    println!("  depth: {}", config.git.depth);
    println!("  always_deep: {}", config.git.always_deep);
    println!();
    println!("Retry:");
    println!("  max_attempts: {}", config.retry.max_attempts);
    println!("  initial_delay: {:?}", config.retry.initial_delay);
    println!("  factor: {}", config.retry.factor);
    println!("  max_delay: {:?}", config.retry.max_delay);
    println!();
    println!("Directories:");
    println!("  strategy: {:?}", config.directories.strategy);
    match config.directories.cache_dir {
        Some(ref dir) => println!("  cache_dir: {}", dir.display()),
        None => println!("  cache_dir: (default)"),
    }
    println!("  max_per_repo: {}", config.directories.max_per_repo);
    println!("  max_age: {:?}", config.directories.max_age);
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}

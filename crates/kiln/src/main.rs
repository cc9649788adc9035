//! kiln CLI - build orchestrator for static websites.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::Project;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Build orchestrator for static websites")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to kiln.toml config file
    #[arg(short, long, default_value = "kiln.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Stop at the first failing task
    #[arg(long, global = true)]
    fail_fast: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site (the default task)
    Build,

    /// Run the named tasks and their dependencies
    Run {
        /// Task names, see `kiln list`
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// List registered tasks
    List,

    /// Build, then watch sources and serve the output with live reload
    Serve {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Write a starter kiln.toml and src/ skeleton
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let project = || Project::load(&cli.config);

    // Execute command
    match cli.command {
        None | Some(Commands::Build) => {
            commands::build::run(&project()?, cli.fail_fast).await?;
        }
        Some(Commands::Run { tasks }) => {
            commands::run::run(&project()?, &tasks, cli.fail_fast).await?;
        }
        Some(Commands::List) => {
            commands::list::run(&project()?)?;
        }
        Some(Commands::Serve { port, no_open }) => {
            commands::serve::run(&project()?, port, no_open, cli.fail_fast).await?;
        }
        Some(Commands::Init { yes }) => {
            commands::init::run(&cli.config, yes).await?;
        }
    }

    Ok(())
}

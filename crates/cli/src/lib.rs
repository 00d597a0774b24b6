mod clear;
mod derive;
mod project;
mod proxies;
mod session;
mod stats;
mod sync;
mod watch;

use clap::{Parser, Subcommand};
use project::Project;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "modelsync",
    version,
    about = "Incrementally synchronizes model files into a property graph",
    long_about = "Modelsync keeps a persistent graph of model elements in step with the \
                  *.model.json files of a project. Each file change is applied as a delta, \
                  cross-file references wait as proxies until their target is synced, and \
                  derived attributes are recomputed when what they read changes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync every model file under a project root
    #[command(
        long_about = "Registers the *.metamodel.json files, syncs each *.model.json file whose \
                      content changed and removes files gone from disk. The store is kept in \
                      ~/.modelsync/stores/ unless MODELSYNC_STORE_DIR says otherwise."
    )]
    Sync {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        /// Repository name recorded in file keys (defaults to the directory name)
        #[arg(long)]
        repo: Option<String>,
    },
    /// Sync once, then keep syncing changed model files
    Watch {
        /// Path to the project root
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        #[arg(long)]
        repo: Option<String>,
    },
    /// Resolve pending cross-file references
    Proxies {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        #[arg(long)]
        repo: Option<String>,
    },
    /// Declare derived attributes and recompute dirty ones
    Derive {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        #[arg(long)]
        repo: Option<String>,
        /// Expression language to recompute
        #[arg(long, default_value = modelsync_core::PATH_LANGUAGE)]
        language: String,
        /// JSON array of derived attribute declarations to register first
        #[arg(long, value_name = "FILE")]
        declare: Option<PathBuf>,
    },
    /// Show node, file and proxy counts of a project's store
    Stats {
        #[arg(value_name = "PROJECT_PATH")]
        path: PathBuf,
        #[arg(long)]
        repo: Option<String>,
    },
    /// Remove persisted stores
    #[command(
        long_about = "Removes the store of one project, or every store when no path is given."
    )]
    Clear {
        #[arg(value_name = "PROJECT_PATH")]
        path: Option<PathBuf>,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let component = match &cli.command {
        Commands::Watch { .. } => "watch",
        _ => "cli",
    };
    let _guard = modelsync_core::logging::init_logging(component, true);

    let rt = tokio::runtime::Runtime::new()?;

    let result = match cli.command {
        Commands::Sync { path, repo } => rt.block_on(sync::run(Project::new(path, repo))),
        Commands::Watch { path, repo } => rt.block_on(watch::run(Project::new(path, repo))),
        Commands::Proxies { path, repo } => rt.block_on(proxies::run(Project::new(path, repo))),
        Commands::Derive {
            path,
            repo,
            language,
            declare,
        } => rt.block_on(derive::run(Project::new(path, repo), language, declare)),
        Commands::Stats { path, repo } => rt.block_on(stats::run(Project::new(path, repo))),
        Commands::Clear { path } => clear::run(path),
    };
    result.map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}

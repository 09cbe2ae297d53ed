use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rust_schemasync::project::{Config, CONFIG_FILE_NAME, DEFAULT_PROFILE};
use rust_schemasync::{check_project, open_change_manager, FileChangeManager, SyncOptions};

#[derive(Parser)]
#[command(name = "rust-schemasync")]
#[command(author, version, about = "Dependency-ordered deployment of database schema scripts")]
struct Cli {
    /// Root of the script tree
    #[arg(short, long, global = true, env = "SCRIPT_ROOT", default_value = ".")]
    root: PathBuf,

    /// Parameter profile (selects parameter-<profile>.properties)
    #[arg(short, long, global = true, env = "SCHEMASYNC_PROFILE", default_value = DEFAULT_PROFILE)]
    profile: String,

    /// Repository state file (defaults to <root>/.schemasync-state.json)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changed scripts in deployment order without deploying
    Plan,

    /// Deploy every changed script in dependency order
    Deploy {
        /// Record script hashes without executing anything
        #[arg(long)]
        only_hashes: bool,
    },

    /// Roll back migrations removed from source and restore changed objects
    Rollback,

    /// Compare the database with the script source
    Verify,

    /// Run the companion test of every script that has one
    Test,

    /// Record the dependency lineage of every script
    Lineage,

    /// Write scripts for the objects in the database
    CreateScripts {
        /// Schemas to export (defaults to every schema)
        #[arg(long, value_delimiter = ',')]
        schemas: Option<Vec<String>>,
    },

    /// List database objects that have no script in source
    Cleanup,

    /// Check that every script can be read and sequenced
    Check,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("rust_schemasync={}", default_level))),
        )
        .with_target(false)
        .init();
}

/// Run a repository-mutating command and persist the state, also when the
/// command failed.
fn with_manager<T>(options: &SyncOptions, run: impl FnOnce(&mut FileChangeManager) -> Result<T>) -> Result<T> {
    let mut manager = open_change_manager(options)?;
    let result = run(&mut manager);
    manager.repository().save()?;
    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = SyncOptions {
        script_root: cli.root,
        profile: cli.profile,
        state_file: cli.state,
    };

    match cli.command {
        Commands::Plan => {
            let mut manager = open_change_manager(&options)?;
            let plan = manager.plan()?;
            if plan.is_empty() {
                println!("Nothing to deploy");
            }
            for (step, script) in plan.iter().enumerate() {
                println!("{:>4}. {}", step + 1, script);
            }
        }
        Commands::Deploy { only_hashes } => {
            let deployed = with_manager(&options, |manager| manager.deploy(only_hashes))?;
            println!("Deployed {} scripts", deployed);
        }
        Commands::Rollback => {
            let count = with_manager(&options, |manager| manager.rollback())?;
            println!("Rolled back {} scripts", count);
        }
        Commands::Verify => {
            let report = with_manager(&options, |manager| manager.verify())?;
            println!("Verified {} scripts", report.checked);
        }
        Commands::Test => {
            let report = with_manager(&options, |manager| manager.test())?;
            println!("{} tests passed, {} failed", report.passed(), report.failed().count());
        }
        Commands::Lineage => {
            let edges = with_manager(&options, |manager| manager.create_lineage())?;
            println!("Recorded {} dependencies", edges);
        }
        Commands::CreateScripts { schemas } => {
            let count = with_manager(&options, |manager| manager.create_scripts_from_db(schemas.as_deref()))?;
            println!("Created {} scripts", count);
        }
        Commands::Cleanup => {
            let missing = with_manager(&options, |manager| manager.cleanup())?;
            for name in &missing {
                println!("{}", name);
            }
        }
        Commands::Check => {
            let config_path = options.script_root.join(CONFIG_FILE_NAME);
            let config = if config_path.is_file() {
                Config::load(&config_path)?
            } else {
                Config::default()
            };
            let ordered = check_project(&options.script_root, &config)?;
            println!("{} scripts can be sequenced", ordered.len());
        }
    }

    Ok(())
}

/*
* fleet-accounting command line
* -----------------------------
*
* fleet-accounting [--config PATH]
* ├── serve [--port]              read-only HTTP API
* ├── usage --owner ID            elapsed, reserved and total minutes
* │         [--breakdown]         print the pair instead of the sum
* ├── granularity                 configured charge granularity
* ├── vm
* │   ├── list [filters]          VM snapshots, filtered by node/group/owner/state
* │   └── show --id               one VM snapshot
* ├── ledger
* │   └── import --from PATH      merge a store file from another install
* └── init [--force]              write <CONFIG_PATH>/default.toml and an empty store
*/

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{self, AppState};
use crate::config::{generate_default_config, Settings};
use crate::core::{SnapshotFilter, VMSnapshot, VMStatus};
use crate::store::{FileStore, StoreDocument};

#[derive(Parser)]
#[command(name = "fleet-accounting")]
#[command(about = "Usage accounting and VM snapshots for a VM fleet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the read-only API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show billable minutes for one owner identity
    Usage {
        #[arg(short, long)]
        owner: String,
        #[arg(short, long)]
        breakdown: bool,
    },
    /// Show the configured charge granularity
    Granularity,
    /// Inspect virtual machines
    VM {
        #[command(subcommand)]
        command: VMCommands,
    },
    /// Maintain the usage store
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum VMCommands {
    /// List VM snapshots
    List {
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        group_id: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        state: Option<VMStatus>,
    },
    /// Show one VM snapshot
    Show {
        #[arg(short, long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Merge a store file from another install into the configured one
    Import {
        #[arg(short, long)]
        from: PathBuf,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::new_from_file(path)?,
        None => Settings::new()?,
    };
    init_tracing(&settings);

    match cli.command {
        Commands::Serve { port } => {
            let state = Arc::new(crate::file_backed_state(&settings)?);
            let server_port = port.unwrap_or(settings.server.port);
            info!("Starting server on port {}", server_port);
            api::serve(state, &settings.server.host, server_port, &settings.server.api_prefix).await?;
        }
        Commands::Usage { owner, breakdown } => {
            let state = crate::file_backed_state(&settings)?;
            handle_usage_command(&state, &owner, breakdown).await?;
        }
        Commands::Granularity => {
            println!("Charge granularity: {}", settings.charge_granularity()?.to_string().bold());
        }
        Commands::VM { command } => {
            let state = crate::file_backed_state(&settings)?;
            handle_vm_command(&state, command).await?;
        }
        Commands::Ledger { command } => handle_ledger_command(&settings, command).await?,
        Commands::Init { force } => handle_init_command(force, &settings).await?,
    }

    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn handle_usage_command(state: &AppState, owner: &str, breakdown: bool) -> Result<()> {
    let tuple = state
        .engine
        .total_elapsed_and_reserved_minutes_tuple(owner)
        .await?;
    let granularity = state.engine.charge_granularity();

    println!("{} {}", "Usage for".bold(), owner);
    if breakdown {
        println!("  elapsed:  {} min", tuple.elapsed_minutes.to_string().green());
        println!("  reserved: {} min", tuple.reserved_minutes.to_string().yellow());
    } else {
        let total = tuple.total().ok_or_else(|| anyhow::anyhow!("usage total overflowed for {}", owner))?;
        println!("  total:    {} min", total.to_string().green());
    }
    println!("  charged in blocks of {}", granularity);
    Ok(())
}

async fn handle_vm_command(state: &AppState, command: VMCommands) -> Result<()> {
    match command {
        VMCommands::List { node, group_id, owner, state: vm_state } => {
            let filter = SnapshotFilter {
                node,
                group_id,
                owner,
                state: vm_state,
            };
            let snapshots = state.projector.list_snapshots(&filter).await?;
            println!("{}", "Virtual Machines:".bold());
            if snapshots.is_empty() {
                println!("  (none)");
            }
            for snapshot in &snapshots {
                print_snapshot_line(snapshot);
            }
        }
        VMCommands::Show { id } => {
            let snapshot = state.projector.get_snapshot(&id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

fn print_snapshot_line(snapshot: &VMSnapshot) {
    let status = match snapshot.state() {
        "running" => snapshot.state().green(),
        "stopped" | "failed" => snapshot.state().red(),
        other => other.yellow(),
    };
    println!(
        "- {} ({}) on {} owner={} mem={}MB cpus={} since {}",
        snapshot.id(),
        status,
        snapshot.node(),
        snapshot.caller_identity(),
        snapshot.memory(),
        snapshot.cpu_count(),
        snapshot.start_time(),
    );
}

async fn handle_ledger_command(settings: &Settings, command: LedgerCommands) -> Result<()> {
    match command {
        LedgerCommands::Import { from } => {
            let store = FileStore::new(&settings.store.path, settings.read_timeout());
            let summary = store.import_from(&from).await?;
            println!(
                "{} imported {} intervals ({} already present), {} instances ({} already present)",
                "✓".green(),
                summary.intervals_added,
                summary.intervals_skipped,
                summary.instances_added,
                summary.instances_skipped,
            );
        }
    }
    Ok(())
}

async fn handle_init_command(force: bool, settings: &Settings) -> Result<()> {
    let config_dir = PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string()));
    let written = write_default_config(&config_dir, settings, force)?;
    println!("{} Default configuration written to {}", "✓".green(), written.display());

    let store_path = settings.store.path.as_path();
    if !store_path.exists() {
        FileStore::new(store_path, settings.read_timeout())
            .write_document(&StoreDocument::default())
            .await?;
        println!("{} Empty usage store created at {}", "✓".green(), store_path.display());
    }
    Ok(())
}

/// Writes `<config_dir>/default.toml`, keeping the store settings already in
/// effect. Refuses to replace an existing file unless `force` is set.
fn write_default_config(config_dir: &Path, settings: &Settings, force: bool) -> Result<PathBuf> {
    let target = config_dir.join("default.toml");
    if target.exists() && !force {
        bail!(
            "configuration already exists at {}; use --force to overwrite",
            target.display()
        );
    }

    std::fs::create_dir_all(config_dir)?;
    let mut default_config = generate_default_config();
    default_config.store = settings.store.clone();
    std::fs::write(&target, toml::to_string_pretty(&default_config)?)?;
    info!(path = %target.display(), "Wrote default configuration");
    Ok(target)
}

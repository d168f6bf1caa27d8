//! seeBeads CLI - a live view of a Beads issue graph.

use clap::Parser;
use seebeads::cli::{Cli, Commands};
use seebeads::commands::{self, DataLocation, ListArgs, Output};
use seebeads::config::ConfigOverrides;
use seebeads::graph::BeadsGraph;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "SEEBEADS_LOG";

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;
    init_tracing();

    let dir = resolve_dir(cli.dir, human);
    if let Err(e) = run_command(cli.command, &dir, cli.data.as_deref(), cli.format, human) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("seebeads=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Resolve the working directory: -C/--dir (must exist) or the current directory.
fn resolve_dir(explicit: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit {
        Some(path) => {
            if !path.exists() {
                let message = format!("Specified directory does not exist: {}", path.display());
                if human {
                    eprintln!("Error: {}", message);
                } else {
                    eprintln!("{}", serde_json::json!({ "error": message }));
                }
                process::exit(1);
            }
            path
        }
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn run_command(
    command: Commands,
    dir: &Path,
    data: Option<&Path>,
    format: Option<seebeads::SourceFormat>,
    human: bool,
) -> Result<(), seebeads::Error> {
    if let Commands::Version = command {
        output(&commands::version(), human);
        return Ok(());
    }

    let location = commands::locate(dir, data, format)?;

    match command {
        Commands::Stats => output(&commands::stats(&load(&location)?), human),
        Commands::List {
            status,
            issue_type,
            priority,
            label,
            search,
            ready,
            limit,
            offset,
        } => {
            let args = ListArgs {
                statuses: status,
                types: issue_type,
                priorities: priority,
                labels: label,
                search,
                ready,
                limit,
                offset,
            };
            output(&commands::list(&load(&location)?, &args), human);
        }
        Commands::Show { id } => output(&commands::show(&load(&location)?, &id)?, human),
        Commands::Epics => output(&commands::epics(&load(&location)?), human),
        Commands::Health { diagnostics } => {
            output(&commands::health(&load(&location)?, diagnostics), human)
        }
        Commands::Config => {
            let settings = commands::load_settings(&location, &ConfigOverrides::default())?;
            output(&commands::config_show(&location, settings), human);
        }
        Commands::Watch {
            agent_mode,
            debounce_ms,
        } => {
            let mut overrides = ConfigOverrides::new();
            if agent_mode {
                overrides = overrides.with_agent_mode(true);
            }
            if let Some(ms) = debounce_ms {
                overrides = overrides.with_debounce_ms(ms);
            }
            let settings = commands::load_settings(&location, &overrides)?;
            run_watch(load(&location)?, &settings, human)?;
        }
        Commands::Version => {}
    }
    Ok(())
}

fn load(location: &DataLocation) -> Result<BeadsGraph, seebeads::Error> {
    BeadsGraph::load(&location.data_path, Some(location.format))
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Run the watch loop on a tokio runtime until Ctrl-C.
fn run_watch(
    graph: BeadsGraph,
    settings: &seebeads::config::Settings,
    human: bool,
) -> Result<(), seebeads::Error> {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let stop_tx = Mutex::new(Some(stop_tx));
    ctrlc::set_handler(move || {
        let sender = stop_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    })
    .map_err(|e| seebeads::Error::Other(format!("Failed to install Ctrl-C handler: {}", e)))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| seebeads::Error::Other(format!("Failed to create runtime: {}", e)))?
        .block_on(commands::watch(Arc::new(graph), settings, stop_rx, |event| {
            if human {
                println!("[{:?}] {}", event.kind, event.data);
            } else {
                println!("{}", event.to_json());
            }
        }))
}

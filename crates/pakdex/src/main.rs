//! Pakdex launcher
//!
//! Subcommands for one-shot ingestion, watched-directory management, the
//! live session and remote imports. Whatever the command, the calling
//! thread is the consumer context: it drains index events and owns the
//! index; workers and watchers only feed it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pakdex::remote_import::import_remote;
use pakdex::{MetadataStore, PakdexConfig, Session};
use pakdex_index::{format_row, Column, SortDirection, SortOrder, SortedIndex};
use pakdex_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// How long the pipeline must stay quiet before a one-shot command ends.
const ONESHOT_IDLE: Duration = Duration::from_millis(800);

#[derive(Parser, Debug)]
#[command(name = "pakdex", about = "Content archive ingestion and indexing")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Use an alternative config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest archive files (directories are expanded non-recursively)
    Add {
        /// Files or directories to ingest
        paths: Vec<PathBuf>,
    },

    /// Ingest every archive under a directory
    Scan {
        path: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Declare a directory to keep synchronized with the index
    Watch {
        path: PathBuf,

        /// Watch the whole subtree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Stop watching a directory
    Unwatch { path: PathBuf },

    /// Run the live session until interrupted
    Run,

    /// Import archive metadata from a remote device
    RemoteImport {
        /// Remote address; defaults to the most recently used one
        host: Option<String>,

        /// Control channel port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the indexed archives
    List {
        /// Sort column (e.g. filename, title, size)
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Case-insensitive filter over file name, title and title id
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = pakdex_logging::init_logging(LogConfig {
        app_name: "pakdex",
        verbose: cli.verbose,
    }) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(PakdexConfig::default_path);
    let mut config = PakdexConfig::load(&config_path)?;
    let store = MetadataStore::new(config.store_path.clone());

    match cli.command {
        Commands::Add { paths } => cmd_add(&config, &store, paths),
        Commands::Scan { path, recursive } => cmd_scan(&config, &store, path, recursive),
        Commands::Watch { path, recursive } => {
            config.add_watched_directory(path.to_string_lossy().into_owned(), recursive);
            config.save(&config_path)?;
            println!("Watching {} (recursive: {recursive})", path.display());
            Ok(())
        }
        Commands::Unwatch { path } => {
            let removed = config.remove_watched_directory(&path.to_string_lossy());
            config.save(&config_path)?;
            if removed {
                println!("No longer watching {}", path.display());
            } else {
                println!("{} was not being watched", path.display());
            }
            Ok(())
        }
        Commands::Run => cmd_run(&config, &store),
        Commands::RemoteImport { host, port } => {
            cmd_remote_import(&mut config, &config_path, &store, host, port)
        }
        Commands::List { sort, desc, filter } => cmd_list(&config, &store, sort, desc, filter),
    }
}

fn cmd_add(config: &PakdexConfig, store: &MetadataStore, paths: Vec<PathBuf>) -> Result<()> {
    let mut session = Session::start(config, store.load()?)?;
    for path in paths {
        if path.is_dir() {
            session.submit_directory(path, false);
        } else {
            session.submit_path(path);
        }
    }
    session.drain_until_idle(ONESHOT_IDLE);
    finish(session, store)
}

fn cmd_scan(
    config: &PakdexConfig,
    store: &MetadataStore,
    path: PathBuf,
    recursive: bool,
) -> Result<()> {
    let mut session = Session::start(config, store.load()?)?;
    session.submit_directory(path, recursive);
    session.drain_until_idle(ONESHOT_IDLE);
    finish(session, store)
}

fn cmd_run(config: &PakdexConfig, store: &MetadataStore) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install interrupt handler")?;

    let mut session = Session::start(config, store.load()?)?;
    println!(
        "Session running with {} watched directories, {} records. Ctrl-C to stop.",
        config.watched_directories.len(),
        session.index().len()
    );

    let mut last_len = session.index().len();
    while !interrupted.load(Ordering::SeqCst) {
        session.drain_for(Duration::from_millis(300));
        let len = session.index().len();
        if len != last_len {
            info!(records = len, "index updated");
            last_len = len;
        }
    }

    println!("Interrupted, shutting down...");
    finish(session, store)
}

fn cmd_remote_import(
    config: &mut PakdexConfig,
    config_path: &std::path::Path,
    store: &MetadataStore,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let host = host
        .or_else(|| config.remote_hosts.first().cloned())
        .context("No remote host configured")?;
    let port = port
        .or_else(|| config.remote_ports.first().copied())
        .context("No remote port configured")?;

    // Remember the chosen endpoint as the new default.
    config.promote_host(&host);
    config.promote_port(port);
    config.save(config_path)?;

    let mut session = Session::start(config, store.load()?)?;
    let cancel = session
        .cancel_token()
        .context("Worker is not running")?;
    let interrupt_cancel = cancel.clone();
    ctrlc::set_handler(move || interrupt_cancel.cancel())
        .context("Failed to install interrupt handler")?;

    let stats = import_remote(&host, port, session.queue(), &cancel)?;
    println!(
        "Found {} archives, imported {}, failed {}",
        stats.found, stats.imported, stats.failed
    );

    session.drain_until_idle(ONESHOT_IDLE);
    finish(session, store)
}

fn cmd_list(
    config: &PakdexConfig,
    store: &MetadataStore,
    sort: Option<String>,
    desc: bool,
    filter: Option<String>,
) -> Result<()> {
    let format = config.format_config();
    let mut index = SortedIndex::new();
    for (stamp, record) in store.load()?.into_iter().enumerate() {
        let row = format_row(&record, stamp as u64, &format);
        index.upsert(record, row);
    }

    if let Some(name) = sort {
        let column = Column::from_arg(&name)
            .with_context(|| format!("Unknown column {name:?}"))?;
        index.set_sort(SortOrder::By {
            column,
            direction: if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            },
        });
    }
    index.set_filter(filter);

    print_table(&index);
    Ok(())
}

/// Columns shown by the list command.
const LIST_COLUMNS: [Column; 7] = [
    Column::Filename,
    Column::Title,
    Column::TitleId,
    Column::Region,
    Column::Type,
    Column::Version,
    Column::Size,
];

fn print_table(index: &SortedIndex) {
    let mut widths: Vec<usize> = LIST_COLUMNS
        .iter()
        .map(|column| column.display_name().len())
        .collect();
    for item in index.visible() {
        for (i, column) in LIST_COLUMNS.iter().enumerate() {
            widths[i] = widths[i].max(item.row.cell(*column).chars().count());
        }
    }

    let header: Vec<String> = LIST_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{:<width$}", column.display_name(), width = widths[i]))
        .collect();
    println!("{}", header.join("  "));
    println!("{}", "-".repeat(header.join("  ").len()));

    let mut shown = 0usize;
    for item in index.visible() {
        let cells: Vec<String> = LIST_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{:<width$}", item.row.cell(*column), width = widths[i]))
            .collect();
        println!("{}", cells.join("  "));
        shown += 1;
    }
    println!("{shown} of {} archives", index.len());
}

/// Shut the session down and persist whatever is indexed.
fn finish(session: Session, store: &MetadataStore) -> Result<()> {
    let index = session.shutdown();
    store.save(index.items().iter().map(|item| &item.record))?;
    println!("{} archives indexed", index.len());
    Ok(())
}

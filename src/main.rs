use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mergefs::config::{BackendConfig, Config, LoggingConfig};
use mergefs::fs::path::{display, normalize_path, split_parent};
use mergefs::{EntryType, MergedEntry, MergedFilesystem, OpenMode};

#[derive(Parser)]
#[command(name = "mergefs")]
#[command(about = "Browse and edit several directory trees as one merged tree")]
struct Cli {
    /// Config file listing backends in priority order
    #[arg(short, long, env = "MERGEFS_CONFIG")]
    config: Option<PathBuf>,

    /// Extra host directory to merge, lowest priority last (repeatable)
    #[arg(short, long = "layer", value_name = "DIR")]
    layers: Vec<PathBuf>,

    /// Allow every operation on --layer directories instead of read only
    #[arg(long)]
    writable: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the children of a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the merged tree below a directory
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file
    Cat { path: String },
    /// Replace a file's content with stdin, creating it if needed
    Write { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or directory from every backend holding it
    Rm { path: String },
    /// Show aggregate and per-backend capabilities
    Caps,
}

#[derive(Serialize)]
struct Listing<'a> {
    name: &'a str,
    path: String,
    #[serde(rename = "type")]
    entry_type: EntryType,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging, cli.log_json);

    let fs = config.build_filesystem().context("Failed to assemble merged filesystem")?;
    tracing::info!(backends = ?fs.backend_names(), "Starting mergefs");

    run(&fs, cli.command)
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    let operations: &[&str] = if cli.writable { &["all"] } else { &["read"] };
    for (index, layer) in cli.layers.iter().enumerate() {
        config
            .backends
            .push(BackendConfig::local(format!("layer-{}", index), layer).with_operations(operations));
    }

    Ok(config)
}

fn init_tracing(logging: &LoggingConfig, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if json || logging.json {
        registry.with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr)).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(io::stderr)).init();
    }
}

fn run(fs: &MergedFilesystem, command: Command) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();

    match command {
        Command::Ls { path, json } => {
            let dir = lookup(fs, &path)?;
            let children = dir.list_children()?;
            if json {
                let listing: Vec<Listing> = children
                    .iter()
                    .map(|child| Listing {
                        name: child.name(),
                        path: display(child.path()),
                        entry_type: child.entry_type(),
                    })
                    .collect();
                serde_json::to_writer_pretty(&mut out, &listing)?;
                writeln!(out)?;
            } else {
                for child in children {
                    let suffix = if child.is_dir() { "/" } else { "" };
                    writeln!(out, "{}{}", child.name(), suffix)?;
                }
            }
        }
        Command::Tree { path } => {
            let dir = lookup(fs, &path)?;
            writeln!(out, "{}", display(dir.path()))?;
            print_tree(&mut out, &dir, 1)?;
        }
        Command::Cat { path } => {
            let file = lookup(fs, &path)?;
            let mut stream = file.open(OpenMode::READ)?;
            io::copy(&mut stream, &mut out)?;
        }
        Command::Write { path } => {
            let file = match fs.entry(&path)? {
                Some(file) => file,
                None => {
                    let (parent, name) = parent_and_name(fs, &path)?;
                    parent
                        .create_entry(EntryType::File, &name)?
                        .with_context(|| format!("No backend could create {}", path))?
                }
            };
            let mut stream = file.open(OpenMode::WRITE | OpenMode::TRUNCATE)?;
            io::copy(&mut io::stdin().lock(), &mut stream)?;
            stream.flush()?;
        }
        Command::Mkdir { path } => {
            let (parent, name) = parent_and_name(fs, &path)?;
            if parent.create_entry(EntryType::Directory, &name)?.is_none() {
                bail!("No backend could create {}", path);
            }
        }
        Command::Rm { path } => {
            let (parent, name) = parent_and_name(fs, &path)?;
            if !parent.delete_child(&name)? {
                bail!("Not found: {}", path);
            }
        }
        Command::Caps => {
            writeln!(out, "merged\t{}", fs.supported_operations())?;
            for slot in fs.backends() {
                writeln!(out, "{}\t{}", slot.name(), slot.capabilities())?;
            }
        }
    }

    Ok(())
}

fn lookup<'fs>(fs: &'fs MergedFilesystem, entry_path: &str) -> anyhow::Result<Rc<MergedEntry<'fs>>> {
    fs.entry(entry_path)?.with_context(|| format!("Not found: {}", entry_path))
}

/// Resolve the parent directory of `entry_path` and return it with the final name.
fn parent_and_name<'fs>(
    fs: &'fs MergedFilesystem,
    entry_path: &str,
) -> anyhow::Result<(Rc<MergedEntry<'fs>>, String)> {
    let normalized = normalize_path(entry_path)?;
    if normalized.is_empty() {
        bail!("The root has no parent");
    }
    let (parent, name) = split_parent(&normalized);
    Ok((lookup(fs, parent)?, name.to_string()))
}

fn print_tree(out: &mut impl Write, dir: &MergedEntry<'_>, depth: usize) -> anyhow::Result<()> {
    for child in dir.list_children()? {
        let suffix = if child.is_dir() { "/" } else { "" };
        writeln!(out, "{}{}{}", "  ".repeat(depth), child.name(), suffix)?;
        if child.is_dir() {
            print_tree(out, &child, depth + 1)?;
        }
    }
    Ok(())
}

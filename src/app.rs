//! Command dispatch for the dupetree binary.
//!
//! Each subcommand opens the store, does its work through the library and
//! prints results to stdout. Logs and progress go to stderr.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use yansi::Paint;

use crate::cli::{
    Cli, Commands, ConfigArgs, ConfigCommand, DirsArgs, DirsCommand, GroupArgs, ScanArgs,
    TreeArgs,
};
use crate::config::Config;
use crate::error::ExitCode;
use crate::grouping::{DuplicateTree, EquivalenceKey, ViewSettings};
use crate::logging::init_logging;
use crate::pipeline::{ScanOutcome, ScanPipeline};
use crate::progress::ScanProgressBar;
use crate::signal::{cancel_on_interrupt, CancelToken};
use crate::store::{FileStore, SqliteStore};

/// Run the parsed command line and return the process exit code.
///
/// # Errors
///
/// Returns an error if configuration, the store or the command itself
/// fails. A canceled scan is not an error; it maps to
/// [`ExitCode::Interrupted`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let Cli {
        verbose,
        quiet,
        no_color,
        config: config_path,
        db,
        command,
        ..
    } = cli;

    if no_color || !io::stdout().is_terminal() {
        yansi::disable();
    }
    if let Err(e) = init_logging(verbose, quiet) {
        eprintln!("Logging unavailable: {}", e);
    }

    let mut config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = db {
        config.database = db;
    }

    if let Commands::Config(args) = command {
        return run_config(args, &config, config_path.as_deref());
    }

    let store = Arc::new(
        SqliteStore::open(&config.database)
            .with_context(|| format!("Failed to open database {}", config.database.display()))?,
    );

    match command {
        Commands::Scan(args) => run_scan(args, config, store, quiet),
        Commands::Dirs(args) => run_dirs(args, store.as_ref()),
        Commands::Tree(args) => run_tree(args, &config, store.as_ref()),
        Commands::Group(args) => run_group(args, &config, store.as_ref()),
        Commands::Config(_) => Ok(ExitCode::Success),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}

fn run_scan(
    args: ScanArgs,
    mut config: Config,
    store: Arc<SqliteStore>,
    quiet: bool,
) -> Result<ExitCode> {
    if let Some(threads) = args.io_threads {
        config.io_threads = threads;
    }
    if let Some(bytes) = args.chunk_size {
        config.chunk_size = bytes;
    }
    let config = config.normalized();

    let mut roots = store
        .read_all_directories()
        .context("Failed to read remembered directories")?;
    for path in &args.paths {
        let path = absolute(path)?;
        if args.remember {
            store
                .add_directory(&path)
                .with_context(|| format!("Failed to remember {}", path.display()))?;
        }
        roots.push(path);
    }
    if roots.is_empty() {
        bail!("Nothing to scan: pass a directory or remember one with `dupetree dirs add PATH`");
    }

    let token = CancelToken::new();
    if let Err(e) = cancel_on_interrupt(&token) {
        log::warn!("Ctrl+C will not cancel this scan: {}", e);
    }

    let progress = Arc::new(ScanProgressBar::with_accessible(quiet, args.accessible));
    let pipeline = ScanPipeline::new(store, config.scan_options()).with_observer(progress);
    let outcome = pipeline.run(&roots, &token)?;

    if !quiet {
        print_scan_summary(&outcome);
    }
    Ok(ExitCode::from_outcome(&outcome))
}

fn print_scan_summary(outcome: &ScanOutcome) {
    let stats = outcome.stats();
    let verb = if outcome.is_canceled() {
        "Canceled".yellow().bold()
    } else {
        "Scanned".green().bold()
    };
    println!(
        "{} {} files ({} hashed, {} skipped) in {:.2?}",
        verb, stats.files_discovered, stats.files_hashed, stats.files_failed, stats.duration
    );
    if stats.write_failures > 0 {
        println!(
            "{} {} records could not be saved",
            "Warning:".red().bold(),
            stats.write_failures
        );
    }
}

fn run_dirs(args: DirsArgs, store: &dyn FileStore) -> Result<ExitCode> {
    match args.action {
        DirsCommand::Add { path } => {
            let path = absolute(&path)?;
            if !path.is_dir() {
                bail!("{} is not a directory", path.display());
            }
            store.add_directory(&path)?;
            println!("Remembered {}", path.display());
        }
        DirsCommand::Remove { path } => {
            let path = absolute(&path)?;
            store.remove_directory(&path)?;
            println!("Forgot {}", path.display());
        }
        DirsCommand::List => {
            for dir in store.read_all_directories()? {
                println!("{}", dir.display());
            }
        }
    }
    Ok(ExitCode::Success)
}

fn load_tree(store: &dyn FileStore, settings: ViewSettings) -> Result<DuplicateTree> {
    let files = store.read_all_files().context("Failed to read scan results")?;
    log::debug!("Loaded {} records", files.len());
    Ok(DuplicateTree::build(files, settings))
}

fn run_tree(args: TreeArgs, config: &Config, store: &dyn FileStore) -> Result<ExitCode> {
    let defaults = config.view_settings();
    let duplicates_only = args
        .duplicates_only_choice()
        .unwrap_or(defaults.duplicates_only);
    let settings = ViewSettings::new(args.key.map_or(defaults.key, EquivalenceKey::from))
        .with_duplicates_only(duplicates_only);
    let tree = load_tree(store, settings)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.json {
        serde_json::to_writer_pretty(&mut out, &tree.view())?;
        writeln!(out)?;
        return Ok(ExitCode::Success);
    }

    if tree.is_empty() {
        writeln!(out, "No scan results. Run `dupetree scan` first.")?;
        return Ok(ExitCode::Success);
    }

    for (depth, id) in tree.visible_nodes() {
        let Some(node) = tree.node(id) else { continue };
        let indent = "  ".repeat(depth);
        if node.is_directory() {
            let label = node.label();
            let name = if label.ends_with(std::path::MAIN_SEPARATOR) {
                label.to_string()
            } else {
                format!("{}{}", label, std::path::MAIN_SEPARATOR)
            };
            if node.has_duplicates() {
                writeln!(out, "{}{}", indent, name.bold())?;
            } else {
                writeln!(out, "{}{}", indent, name.dim())?;
            }
        } else if node.has_duplicates() {
            let copies = tree.duplicate_group(id).len();
            writeln!(
                out,
                "{}{} {}",
                indent,
                node.label().yellow().bold(),
                format!("[{} copies]", copies).dim()
            )?;
        } else {
            writeln!(out, "{}{}", indent, node.label())?;
        }
    }
    Ok(ExitCode::Success)
}

fn run_group(args: GroupArgs, config: &Config, store: &dyn FileStore) -> Result<ExitCode> {
    let key = args.key.map_or(config.default_key, EquivalenceKey::from);
    let tree = load_tree(store, ViewSettings::new(key))?;

    let wanted = absolute(&args.path)?;
    let Some(id) = tree
        .find_file(&wanted)
        .or_else(|| tree.find_file(&args.path))
    else {
        bail!("{} is not in the last scan results", wanted.display());
    };

    let group = tree.duplicate_group(id);
    let selected = tree.record(id).map(|r| r.path.clone()).unwrap_or(wanted);
    println!(
        "{} file(s) with the same {} as {}",
        group.len(),
        key,
        selected.display()
    );

    for record in group {
        let modified = fs::metadata(&record.path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| {
                DateTime::<Local>::from(t)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            });
        let status = match modified {
            Some(time) => time.green().to_string(),
            None => "missing".red().to_string(),
        };
        let path = record.path.display().to_string();
        if record.path == selected {
            println!("* {}  {}", path.bold().underline(), status);
        } else {
            println!("  {}  {}", path, status);
        }
    }
    Ok(ExitCode::Success)
}

fn run_config(args: ConfigArgs, config: &Config, path: Option<&Path>) -> Result<ExitCode> {
    match args.action {
        ConfigCommand::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommand::Init { force } => {
            let target = path.map(Path::to_path_buf).or_else(Config::default_path);
            if let Some(existing) = target.as_ref().filter(|p| p.exists() && !force) {
                bail!("{} already exists (use --force to overwrite)", existing.display());
            }
            let written = match path {
                Some(path) => {
                    config.save(path)?;
                    path.to_path_buf()
                }
                None => config.save_default()?,
            };
            println!("Wrote {}", written.display());
        }
    }
    Ok(ExitCode::Success)
}

mod logging;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::{bail, eyre};
use dui_core::{
    Collaborators, LifecycleHandle, LifecycleView, Phase, ScanConfig, ScanLifecycle,
    SnapshotStore, normalize_path, validate_root,
};
use tracing::{debug, info};

/// DUI - incremental disk usage index
#[derive(Parser, Debug)]
#[command(name = "dui")]
#[command(about = "Index disk usage under a directory, cache it, and prune it after deletions")]
#[command(version)]
struct Args {
    /// Path to analyze (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Skip entries smaller than this many kilobytes
    #[arg(long, default_value_t = dui_core::DEFAULT_MIN_SIZE_KB)]
    min_size_kb: u64,

    /// Additional directory name to exclude (repeatable)
    #[arg(long = "exclude", value_name = "NAME")]
    excludes: Vec<String>,

    /// Do not exclude version control, dependency and build directories
    #[arg(long)]
    no_default_excludes: bool,

    /// Snapshot directory (defaults to the user cache directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Discard any saved snapshot before starting
    #[arg(long)]
    no_cache: bool,

    /// Rescan after the index is ready
    #[arg(long)]
    refresh: bool,

    /// Permanently delete this path once the index is ready (repeatable)
    #[arg(long, value_name = "PATH", action = clap::ArgAction::Append)]
    delete: Vec<PathBuf>,

    /// Number of largest entries to list
    #[arg(long, default_value_t = 20)]
    top: usize,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn scan_config(&self) -> ScanConfig {
        let mut config = ScanConfig {
            min_size_kb: self.min_size_kb,
            ..ScanConfig::default()
        };
        if self.no_default_excludes {
            config.excluded_dirs.clear();
        }
        for name in &self.excludes {
            if !config.excluded_dirs.contains(name) {
                config.excluded_dirs.push(name.clone());
            }
        }
        config
    }

    fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("dui")
        })
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    logging::init(args.verbose);

    // Resolve path
    let root = args
        .path
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(&args.path));
    validate_root(&root)?;

    let config = args.scan_config();
    let store = SnapshotStore::new(&args.cache_dir(), &root, &config);
    if args.no_cache {
        store.invalidate();
    }

    let collaborators = Collaborators::system(&config);
    let handle = ScanLifecycle::new(&root, config, store, collaborators).spawn();

    let result = run(&handle, &args, &root);
    handle.shutdown();

    let view = result?;
    print!("{}", report::render(&view, args.top));
    Ok(())
}

fn run(handle: &LifecycleHandle, args: &Args, root: &Path) -> Result<Arc<LifecycleView>> {
    let mut view = wait_settled(handle, 0)?;
    ensure_ready(&view)?;

    if args.refresh {
        info!("refreshing index");
        let revision = view.revision;
        handle.refresh();
        view = wait_settled(handle, revision)?;
        ensure_ready(&view)?;
    }

    if !args.delete.is_empty() {
        let targets = resolve_targets(&args.delete, root)?;
        let revision = view.revision;
        handle.delete(targets);
        view = wait_settled(handle, revision)?;
        if let Some(notice) = &view.notice {
            bail!("{notice}");
        }
    }

    Ok(view)
}

/// Block until a view newer than `after` has nothing in flight
fn wait_settled(handle: &LifecycleHandle, after: u64) -> Result<Arc<LifecycleView>> {
    let mut last_path = None;
    loop {
        let view = handle.view();
        if view.revision > after && view.is_settled() {
            return Ok(view);
        }
        if view.active_path != last_path {
            if let Some(path) = &view.active_path {
                debug!(path = %path.display(), "scanning");
            }
            last_path = view.active_path.clone();
        }
        handle
            .updates()
            .recv()
            .map_err(|_| eyre!("lifecycle stopped unexpectedly"))?;
    }
}

fn ensure_ready(view: &LifecycleView) -> Result<()> {
    match (&view.phase, &view.error) {
        (Phase::Error, Some(message)) => bail!("{message}"),
        (Phase::Error, None) => bail!("scan failed"),
        _ => Ok(()),
    }
}

/// Resolve deletion targets and refuse anything outside `root`
fn resolve_targets(paths: &[PathBuf], root: &Path) -> Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|path| -> Result<PathBuf> {
            // Symlinks are deleted themselves, not their targets
            let resolved = normalize_path(std::path::absolute(path)?);
            std::fs::symlink_metadata(&resolved)
                .map_err(|e| eyre!("{}: {e}", path.display()))?;
            if resolved == root || !resolved.starts_with(root) {
                bail!(
                    "refusing to delete {}: not inside {}",
                    resolved.display(),
                    root.display()
                );
            }
            Ok(resolved)
        })
        .collect()
}

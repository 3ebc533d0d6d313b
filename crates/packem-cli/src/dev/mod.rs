//! Watch mode for `packem build --watch`.
//!
//! One [`BuildContext`] lives for the whole session, so the file cache and
//! resolved paths carry over between builds. Each file change starts a new
//! cycle; a build still running when the next change arrives is dropped,
//! and a build that finishes after a newer change was seen is discarded.
//! Changes to `package.json` or `tsconfig.json` reload the options and the
//! context, and with them the watcher's ignore rules and the `onSuccess`
//! command.

mod watcher;

pub use watcher::{FileChange, FileWatcher, IgnoreRules};

use packem::cache::FileCache;
use packem::{BuildContext, BuildOptions, Bundler, Runtime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::commands::print_outcome;
use crate::error::Result;
use crate::ui;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Monotonic cycle counter. Only the newest cycle may report.
#[derive(Debug, Default)]
pub struct Cycles {
    current: u64,
}

impl Cycles {
    /// Start a new cycle, superseding every earlier one.
    pub fn begin(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_current(&self, cycle: u64) -> bool {
        cycle == self.current
    }
}

/// Files whose change invalidates the prepared context.
fn reloads_context(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|name| name.to_str()),
        Some("package.json" | "tsconfig.json")
    )
}

/// Run the `onSuccess` command, one process at a time.
struct SideProcess {
    command: Option<String>,
    root: PathBuf,
    child: Option<Child>,
}

impl SideProcess {
    fn new(ctx: &BuildContext) -> Self {
        let mut side = Self {
            command: None,
            root: PathBuf::new(),
            child: None,
        };
        side.follow(ctx);
        side
    }

    /// Take the command and working directory from a (re)loaded context.
    /// A running process keeps running until the next restart.
    fn follow(&mut self, ctx: &BuildContext) {
        self.command = ctx.options.on_success.clone();
        self.root = ctx.paths.root.clone();
    }

    async fn restart(&mut self) {
        self.stop().await;
        let Some(command) = &self.command else {
            return;
        };

        tracing::debug!(%command, "running onSuccess");
        match shell(command).current_dir(&self.root).kill_on_drop(true).spawn() {
            Ok(child) => self.child = Some(child),
            Err(error) => ui::error(&format!("Failed to run \"{command}\": {error}")),
        }
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(error) = child.kill().await {
                tracing::debug!(%error, "onSuccess process already exited");
            }
        }
    }
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

async fn open_context(options: BuildOptions, runtime: &dyn Runtime) -> Result<BuildContext> {
    let mut ctx = packem::prepare(options, runtime).await?;
    if ctx.options.file_cache {
        ctx.cache = Some(Arc::new(FileCache::open(&ctx.paths.cache_dir)));
    }
    Ok(ctx)
}

/// Load options, prepare the context and watch the package with ignore
/// rules derived from that context.
async fn open_session<L>(
    load: &L,
    runtime: &dyn Runtime,
) -> Result<(BuildContext, FileWatcher, mpsc::Receiver<FileChange>)>
where
    L: Fn() -> Result<BuildOptions>,
{
    let ctx = open_context(load()?, runtime).await?;
    let (watcher, rx) = FileWatcher::new(ctx.paths.root.clone(), ignore_rules(&ctx)?, DEBOUNCE)?;
    Ok((ctx, watcher, rx))
}

/// Ignore the output and cache directories of this package.
fn ignore_rules(ctx: &BuildContext) -> Result<IgnoreRules> {
    let mut rules = vec![ctx.paths.out_dir_relative()];
    rules.push(packem::options::relative_slash(&ctx.paths.root, &ctx.paths.cache_dir));
    for entry in &ctx.entries {
        if let Some(dir) = &entry.out_dir {
            rules.push(packem::options::relative_slash(&ctx.paths.root, dir));
        }
    }
    IgnoreRules::new(rules)
}

/// Collect changes that arrive within the debounce window after `first`.
/// Returns whether any of them reloads the context.
async fn settle(first: &FileChange, rx: &mut mpsc::Receiver<FileChange>) -> bool {
    tracing::info!(path = %first.path().display(), "{}", first.kind());
    let mut reload = reloads_context(first.path());
    tokio::time::sleep(DEBOUNCE).await;
    while let Ok(change) = rx.try_recv() {
        tracing::debug!(path = %change.path().display(), "{}", change.kind());
        reload |= reloads_context(change.path());
    }
    reload
}

/// Build, then rebuild on every change until Ctrl-C.
///
/// `load` produces the options; it runs again whenever a manifest change
/// reloads the context.
pub async fn watch<L>(load: L, bundler: Arc<dyn Bundler>, runtime: Arc<dyn Runtime>) -> Result<()>
where
    L: Fn() -> Result<BuildOptions>,
{
    // The watcher only has to stay alive; changes arrive on `rx`.
    let (mut ctx, mut _watcher, mut rx) = open_session(&load, runtime.as_ref()).await?;
    let mut side = SideProcess::new(&ctx);
    let mut cycles = Cycles::default();

    ui::info(&format!("Watching {} for changes", ctx.paths.root.display()));

    let mut cycle = cycles.begin();
    let mut reload = false;
    loop {
        if reload {
            match open_session(&load, runtime.as_ref()).await {
                Ok((fresh, fresh_watcher, fresh_rx)) => {
                    tracing::debug!(root = %fresh_watcher.root().display(), "reloaded options");
                    side.follow(&fresh);
                    ctx = fresh;
                    _watcher = fresh_watcher;
                    rx = fresh_rx;
                }
                Err(error) => ui::error(&error.to_string()),
            }
        }

        let finished = {
            let build = packem::rebuild(&mut ctx, Arc::clone(&bundler), Arc::clone(&runtime));
            tokio::pin!(build);
            tokio::select! {
                result = &mut build => Some(result),
                change = rx.recv() => match change {
                    Some(change) => {
                        tracing::info!("change during build, restarting");
                        reload = settle(&change, &mut rx).await;
                        None
                    }
                    None => return Ok(()),
                },
                _ = tokio::signal::ctrl_c() => {
                    side.stop().await;
                    return Ok(());
                }
            }
        };

        let Some(result) = finished else {
            cycle = cycles.begin();
            continue;
        };

        reload = false;
        while let Ok(change) = rx.try_recv() {
            reload |= reloads_context(change.path());
            cycles.begin();
        }
        if !cycles.is_current(cycle) {
            tracing::debug!(cycle, current = cycles.current(), "discarding superseded build");
            cycle = cycles.current();
            continue;
        }

        match result {
            Ok(outcome) => {
                print_outcome(&outcome);
                side.restart().await;
            }
            Err(error) => ui::error(&error.to_string()),
        }
        ui::info("Waiting for changes...");

        tokio::select! {
            change = rx.recv() => match change {
                Some(change) => reload = settle(&change, &mut rx).await,
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                side.stop().await;
                return Ok(());
            }
        }
        cycle = cycles.begin();
    }
}

//! Recursive file watcher over the package root.
//!
//! Changes under `node_modules`, the output and cache directories and any
//! hidden path are dropped before they reach the channel, so a build never
//! triggers itself.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileChange::Modified(_) => "modified",
            FileChange::Created(_) => "created",
            FileChange::Removed(_) => "removed",
        }
    }
}

/// Ignore rules, relative to the watched root.
///
/// A rule containing `*`, `?` or `[` is a glob matched against the whole
/// relative path; anything else is a directory prefix.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    prefixes: Vec<PathBuf>,
    globs: Vec<glob::Pattern>,
}

impl IgnoreRules {
    pub fn new<I, S>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for rule in rules {
            let rule = rule.as_ref().trim_end_matches('/');
            if rule.is_empty() {
                continue;
            }
            if rule.contains(['*', '?', '[']) {
                let pattern = glob::Pattern::new(rule).map_err(|e| {
                    CliError::InvalidArgument(format!("invalid ignore pattern \"{rule}\": {e}"))
                })?;
                out.globs.push(pattern);
            } else {
                out.prefixes.push(PathBuf::from(rule));
            }
        }
        Ok(out)
    }

    /// Whether a change at `path` should be dropped.
    pub fn should_ignore(&self, path: &Path, root: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return true;
        };

        if relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        }) {
            return true;
        }

        if relative
            .components()
            .any(|c| c.as_os_str() == "node_modules")
        {
            return true;
        }

        if self.prefixes.iter().any(|prefix| relative.starts_with(prefix)) {
            return true;
        }

        let slash = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        self.globs.iter().any(|glob| glob.matches(&slash))
    }
}

/// Keeps the notify watcher alive; changes arrive on the paired receiver.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Watch `root` recursively. Repeated events for the same path within
    /// `debounce` are collapsed.
    pub fn new(
        root: PathBuf,
        rules: IgnoreRules,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(100);
        let mut last_event: Option<(PathBuf, Instant)> = None;
        let watched = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(%error, "file watcher error");
                    return;
                }
            };

            for path in &event.paths {
                if rules.should_ignore(path, &watched) {
                    continue;
                }

                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < debounce {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                // The receiver is gone once the session ends.
                let _ = tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

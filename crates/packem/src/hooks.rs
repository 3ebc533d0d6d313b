//! Lifecycle hooks.
//!
//! An ordered observer registry. Handlers run synchronously on the
//! orchestrator's task, in registration order, and see borrowed views of the
//! build state. A handler error aborts the build with [`Error::Hook`].
//!
//! ```
//! use packem::{HookEvent, HookRegistry};
//! use packem::hooks::HookPayload;
//!
//! let mut hooks = HookRegistry::new();
//! hooks.on(HookEvent::EntriesResolved, |payload| {
//!     if let HookPayload::EntriesResolved { entries } = payload {
//!         println!("{} entries", entries.len());
//!     }
//!     Ok(())
//! });
//! ```

use std::fmt;

use crate::entry::BuildEntry;
use crate::group::{BuildTask, TaskResult};
use crate::options::BuildOptions;
use crate::package_json::PackageJson;
use crate::report::BuildReport;
use crate::{Error, Result};

/// Lifecycle events, in the order a build emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BuildPrepare,
    EntriesResolved,
    TaskBefore,
    TaskDone,
    BuildDone,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::BuildPrepare => "build:prepare",
            HookEvent::EntriesResolved => "entries:resolved",
            HookEvent::TaskBefore => "task:before",
            HookEvent::TaskDone => "task:done",
            HookEvent::BuildDone => "build:done",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler sees for each event.
#[derive(Debug)]
pub enum HookPayload<'a> {
    BuildPrepare {
        options: &'a BuildOptions,
        package: &'a PackageJson,
    },
    EntriesResolved {
        entries: &'a [BuildEntry],
    },
    TaskBefore {
        task: &'a BuildTask,
    },
    TaskDone {
        task: &'a BuildTask,
        result: &'a TaskResult,
    },
    BuildDone {
        report: &'a BuildReport,
        warnings: &'a [String],
    },
}

impl HookPayload<'_> {
    pub fn event(&self) -> HookEvent {
        match self {
            HookPayload::BuildPrepare { .. } => HookEvent::BuildPrepare,
            HookPayload::EntriesResolved { .. } => HookEvent::EntriesResolved,
            HookPayload::TaskBefore { .. } => HookEvent::TaskBefore,
            HookPayload::TaskDone { .. } => HookEvent::TaskDone,
            HookPayload::BuildDone { .. } => HookEvent::BuildDone,
        }
    }
}

type Handler = Box<dyn Fn(&HookPayload<'_>) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub struct HookRegistry {
    handlers: Vec<(HookEvent, Handler)>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field(
                "handlers",
                &self.handlers.iter().map(|(e, _)| e.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`.
    pub fn on<F>(&mut self, event: HookEvent, handler: F) -> &mut Self
    where
        F: Fn(&HookPayload<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.push((event, Box::new(handler)));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler registered for the payload's event. Stops at the
    /// first failure.
    pub fn emit(&self, payload: HookPayload<'_>) -> Result<()> {
        let event = payload.event();
        for (_, handler) in self.handlers.iter().filter(|(e, _)| *e == event) {
            handler(&payload).map_err(|e| Error::Hook {
                event: event.to_string(),
                message: format!("{e:#}"),
            })?;
        }
        Ok(())
    }
}

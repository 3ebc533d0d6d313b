//! Bundler adapter seam.
//!
//! The orchestrator never bundles anything itself. Each planned
//! [`BuildTask`] is handed to a [`Bundler`], which returns the emitted
//! chunks and assets in memory; writing them to disk, caching and reporting
//! happen on the orchestrator side.

#[cfg(feature = "rolldown")]
mod rolldown;
#[cfg(feature = "transpile")]
mod transpile;

#[cfg(feature = "rolldown")]
pub use rolldown::RolldownBundler;
#[cfg(feature = "transpile")]
pub use transpile::TranspileBundler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::diagnostics::BundlerError;
use crate::group::BuildTask;

/// Size contribution of one source module to a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSize {
    pub id: String,
    pub bytes: u64,
}

/// An emitted JavaScript chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputChunk {
    /// Path relative to the task's output directory.
    pub file_name: String,
    pub code: String,
    /// Entry chunks must use the file name planned for their entry.
    pub is_entry: bool,
    pub name: Option<String>,
    /// Other chunks of this task imported by this one, as file names.
    pub imports: Vec<String>,
    /// Bare specifiers left external.
    pub external_imports: Vec<String>,
    pub exports: Vec<String>,
    pub modules: Vec<ModuleSize>,
}

impl OutputChunk {
    pub fn new(file_name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn entry(mut self) -> Self {
        self.is_entry = true;
        self
    }
}

/// Any other emitted file: declarations, source maps, copied assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAsset {
    /// Path relative to the task's output directory.
    pub file_name: String,
    pub source: Vec<u8>,
}

impl OutputAsset {
    pub fn new(file_name: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            source: source.into(),
        }
    }
}

/// Everything one bundler invocation produced.
#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub chunks: Vec<OutputChunk>,
    pub assets: Vec<OutputAsset>,
    /// Non-fatal diagnostics, surfaced as build warnings.
    pub warnings: Vec<String>,
}

/// A bundling engine.
///
/// JS tasks go through [`Bundler::bundle`]; declaration tasks through
/// [`Bundler::emit_declarations`], which returns `.d.*ts` files as assets.
/// Entry chunks and declaration assets are expected under the file names
/// planned in [`BuildTask::entries`].
#[async_trait]
pub trait Bundler: Send + Sync + std::fmt::Debug {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    async fn bundle(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError>;

    async fn emit_declarations(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError>;
}

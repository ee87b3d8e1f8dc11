//! Engines: pluggable extensions applied to the shared context at startup.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ PluginSource │────►│   discover   │────►│ ModuleLoader │──► apply(ctx)
//! │ (ext, bundle)│     │ (descriptors)│     │  (manifest)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Engine files follow `<name>.engine.js` (plain manifest) or
//! `<name>.engine.jsc` (packed manifest).

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::Context;

pub mod heartbeat;
pub mod loader;
pub mod registry;

pub const PLAIN_SUFFIX: &str = ".engine.js";
pub const COMPILED_SUFFIX: &str = ".engine.jsc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Plain,
    Compiled,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Plain => "plain",
            EngineKind::Compiled => "compiled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDescriptor {
    pub name: String,
    pub filename: String,
    pub kind: EngineKind,
    pub path: PathBuf,
    /// Shipped with the shell rather than dropped in by the user.
    pub hidden: bool,
}

pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Called exactly once, before config is available. Work that needs
    /// config must wait on [`Context::when_ready`].
    fn apply(&self, ctx: &Arc<Context>) -> Result<()>;
}

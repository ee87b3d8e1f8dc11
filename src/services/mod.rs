//! Collaborators the shell consumes through narrow interfaces.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::bus::Handler;
use crate::context::Context;

pub mod auth;
pub mod config;
pub mod profile;

pub use auth::{AuthData, AuthService, LoginGate};
pub use config::{ConfigService, JsonConfigService, LogConfig, ShellConfig};
pub use profile::{ProfileCache, ProfileService, SelfProfile};

/// Network-facing listeners. `start` returns the handler that bridges bus
/// events to connected clients.
#[async_trait]
pub trait ServerSubsystem: Send + Sync {
    async fn start(&self, ctx: Arc<Context>) -> Result<Handler>;
}

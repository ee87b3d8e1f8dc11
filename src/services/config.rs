//! User configuration as seen by the shell core.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::auth::AuthService;

/// Value shipped in config templates; never a real endpoint.
pub const PLACEHOLDER_SELF_URL: &str = "https://chronocat.vercel.app";
pub const DEFAULT_SELF_URL: &str = "http://127.0.0.1:5500";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub enable: bool,
    pub log: LogConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable: true,
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base URL used when rendering links to media in logged messages.
    pub self_url: Option<String>,
}

/// Placeholder or missing URLs fall back to the loopback default; one
/// trailing slash is dropped.
pub fn normalize_self_url(raw: Option<&str>) -> String {
    let url = match raw {
        None | Some("") | Some(PLACEHOLDER_SELF_URL) => DEFAULT_SELF_URL,
        Some(url) => url,
    };
    url.strip_suffix('/').unwrap_or(url).to_string()
}

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Blocks until the account is authenticated.
    async fn get_config(&self) -> Result<ShellConfig>;
}

/// Reads a JSON config file once, after login. A missing file yields the
/// defaults.
pub struct JsonConfigService {
    path: PathBuf,
    auth: Arc<dyn AuthService>,
    cache: OnceCell<ShellConfig>,
}

impl JsonConfigService {
    pub fn new(path: PathBuf, auth: Arc<dyn AuthService>) -> Self {
        Self {
            path,
            auth,
            cache: OnceCell::new(),
        }
    }

    async fn read(&self) -> Result<ShellConfig> {
        self.auth.wait_auth().await?;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("invalid config {}", self.path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ShellConfig::default()),
            Err(err) => {
                Err(err).with_context(|| format!("cannot read config {}", self.path.display()))
            }
        }
    }
}

#[async_trait]
impl ConfigService for JsonConfigService {
    async fn get_config(&self) -> Result<ShellConfig> {
        self.cache.get_or_try_init(|| self.read()).await.cloned()
    }
}

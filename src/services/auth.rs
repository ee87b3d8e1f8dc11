use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    pub uid: String,
    pub account: String,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolves once a login has happened.
    async fn wait_auth(&self) -> Result<AuthData>;

    fn current(&self) -> Option<AuthData>;
}

/// Auth state fed by whoever observes the login.
pub struct LoginGate {
    tx: watch::Sender<Option<AuthData>>,
}

impl LoginGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn login(&self, data: AuthData) {
        self.tx.send_replace(Some(data));
    }
}

impl Default for LoginGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthService for LoginGate {
    async fn wait_auth(&self) -> Result<AuthData> {
        let mut rx = self.tx.subscribe();
        let current = rx
            .wait_for(|auth| auth.is_some())
            .await
            .map_err(|_| anyhow!("auth source closed before login"))?;
        (*current)
            .clone()
            .ok_or_else(|| anyhow!("auth source closed before login"))
    }

    fn current(&self) -> Option<AuthData> {
        self.tx.borrow().clone()
    }
}

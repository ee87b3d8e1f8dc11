use anyhow::{anyhow, Result};
use std::future::Future;
use std::path::Path;
use tokio::time::Duration;

pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Runs `fut`, failing if it has not completed within `ms` milliseconds.
pub async fn timeout<F, T>(ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_millis(ms), fut)
        .await
        .map_err(|_| anyhow!("timed out after {}ms", ms))
}

pub async fn exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

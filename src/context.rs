//! The capability context shared by every engine and server.
//!
//! Built once per [`Application`](crate::app::Application) and never mutated
//! afterwards; everything behind it is reached through shared references.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bus::{Event, EventBus};
use crate::element::Element;
use crate::logging::Logger;
use crate::readiness::Readiness;
use crate::services::{AuthData, AuthService, ConfigService, ProfileService, SelfProfile, ShellConfig};
use crate::style::Style;
use crate::util;

pub struct Context {
    platform: String,
    base_dir: PathBuf,
    log: Logger,
    config: Arc<dyn ConfigService>,
    auth: Arc<dyn AuthService>,
    profile: Arc<dyn ProfileService>,
    bus: Arc<EventBus>,
    readiness: Arc<Readiness>,
}

/// Already-constructed collaborators the context forwards to.
pub struct ContextParts {
    pub platform: String,
    pub base_dir: PathBuf,
    pub log: Logger,
    pub config: Arc<dyn ConfigService>,
    pub auth: Arc<dyn AuthService>,
    pub profile: Arc<dyn ProfileService>,
    pub bus: Arc<EventBus>,
    pub readiness: Arc<Readiness>,
}

impl Context {
    pub fn new(parts: ContextParts) -> Self {
        Self {
            platform: parts.platform,
            base_dir: parts.base_dir,
            log: parts.log,
            config: parts.config,
            auth: parts.auth,
            profile: parts.profile,
            bus: parts.bus,
            readiness: parts.readiness,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Waits for login before returning.
    pub async fn get_config(&self) -> Result<ShellConfig> {
        self.config.get_config().await
    }

    pub async fn get_auth_data(&self) -> Result<AuthData> {
        self.auth.wait_auth().await
    }

    pub fn self_profile(&self) -> Option<SelfProfile> {
        self.profile.get()
    }

    pub fn emit(&self, event: Event) -> usize {
        self.bus.emit(event)
    }

    pub fn when_ready(&self) -> impl Future<Output = ()> + Send + 'static {
        self.readiness.when_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Element builder.
    pub fn h(&self, tag: &str) -> Element {
        Element::new(tag)
    }

    pub fn paint(&self, style: Style, text: &str) -> String {
        style.paint(text)
    }

    pub async fn sleep(&self, ms: u64) {
        util::sleep(ms).await
    }

    pub async fn timeout<F, T>(&self, ms: u64, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        util::timeout(ms, fut).await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        util::exists(path).await
    }

    /// Checks that `value` is an object carrying every key in `required`.
    pub fn validate(&self, value: &Value, required: &[&str]) -> Result<()> {
        let map = value
            .as_object()
            .ok_or_else(|| anyhow!("expected an object, got {}", value))?;
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| !map.contains_key(*key))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("missing keys: {}", missing.join(", ")))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::logging::MemorySink;
    use crate::readiness::ReadyResolver;
    use crate::services::{LoginGate, ProfileCache};
    use async_trait::async_trait;

    pub struct FixedConfig(pub ShellConfig);

    #[async_trait]
    impl ConfigService for FixedConfig {
        async fn get_config(&self) -> Result<ShellConfig> {
            Ok(self.0.clone())
        }
    }

    pub struct Fixture {
        pub ctx: Arc<Context>,
        pub bus: Arc<EventBus>,
        pub sink: Arc<MemorySink>,
        pub resolver: ReadyResolver,
    }

    pub fn fixture() -> Fixture {
        let sink = Arc::new(MemorySink::new());
        let log = Logger::new(sink.clone()).with_min_level(crate::logging::Level::Trace);
        let bus = Arc::new(EventBus::new(&log));
        let (readiness, resolver) = Readiness::new();
        let ctx = Arc::new(Context::new(ContextParts {
            platform: "test".to_string(),
            base_dir: PathBuf::from("/tmp"),
            log,
            config: Arc::new(FixedConfig(ShellConfig::default())),
            auth: Arc::new(LoginGate::new()),
            profile: Arc::new(ProfileCache::new()),
            bus: bus.clone(),
            readiness,
        }));
        Fixture {
            ctx,
            bus,
            sink,
            resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::fixture;
    use crate::bus::sync_handler;
    use crate::bus::ExtensionEvent;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_validate() {
        let fx = fixture();
        let v = json!({"name": "a", "version": "1"});
        assert!(fx.ctx.validate(&v, &["name", "version"]).is_ok());
        let err = fx.ctx.validate(&v, &["name", "apply"]).unwrap_err();
        assert!(err.to_string().contains("apply"));
        assert!(fx.ctx.validate(&json!(3), &[]).is_err());
    }

    #[tokio::test]
    async fn test_emit_reaches_bus() {
        let fx = fixture();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        fx.bus.register(sync_handler(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        fx.ctx.emit(crate::bus::Event::Extension(ExtensionEvent::new("x", json!({}))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_when_ready_via_context() {
        let fx = fixture();
        assert!(!fx.ctx.is_ready());
        let wait = fx.ctx.when_ready();
        fx.resolver.resolve();
        wait.await;
        assert!(fx.ctx.is_ready());
    }
}

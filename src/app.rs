//! Bootstrap sequencing.
//!
//! Startup order:
//! 1. build the context (no I/O)
//! 2. discover engines (external dir first, then bundled) and apply them
//! 3. subscribe the self-profile refresher
//! 4. wait for config (which waits for login); stop here if disabled
//! 5. subscribe the protocol logger and the server bridge
//! 6. resolve readiness

use anyhow::{Context as _, Result};
use serde_json::json;
use std::sync::{Arc, Weak};
use url::Url;

use crate::bus::{handler, sync_handler, Event, EventBus, Handler};
use crate::context::{Context, ContextParts};
use crate::engine::loader::{load_all, ModuleLoader};
use crate::engine::registry::{discover, DirSource, PluginSource};
use crate::logging::{codes, obj, v_str, Domain, Logger};
use crate::readiness::{Readiness, ReadyResolver};
use crate::services::config::normalize_self_url;
use crate::services::{AuthService, ConfigService, LogConfig, ProfileService, ServerSubsystem};
use crate::settings::ShellSettings;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Collaborators handed to [`Application::new`].
pub struct Services {
    pub config: Arc<dyn ConfigService>,
    pub auth: Arc<dyn AuthService>,
    pub profile: Arc<dyn ProfileService>,
    pub servers: Arc<dyn ServerSubsystem>,
    pub loader: Arc<dyn ModuleLoader>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Engines applied, servers bridged, readiness resolved.
    Started,
    /// Config asked the shell not to run; readiness stays pending.
    Disabled,
}

pub struct Application {
    ctx: Arc<Context>,
    bus: Arc<EventBus>,
    resolver: ReadyResolver,
    sources: Vec<Box<dyn PluginSource>>,
    profile: Arc<dyn ProfileService>,
    servers: Arc<dyn ServerSubsystem>,
    loader: Arc<dyn ModuleLoader>,
    log: Logger,
}

impl Application {
    pub fn new(settings: &ShellSettings, services: Services, log: &Logger) -> Self {
        let log = log.domain(Domain::System);
        let bus = Arc::new(EventBus::new(&log));
        let (readiness, resolver) = Readiness::new();
        let ctx = Arc::new(Context::new(ContextParts {
            platform: settings.platform.clone(),
            base_dir: settings.base_dir.clone(),
            log: log.clone(),
            config: services.config,
            auth: services.auth,
            profile: services.profile.clone(),
            bus: bus.clone(),
            readiness,
        }));
        let sources: Vec<Box<dyn PluginSource>> = vec![
            Box::new(DirSource::external(settings.engines_dir())),
            Box::new(DirSource::bundled(settings.bundled_dir.clone())),
        ];

        Self {
            ctx,
            bus,
            resolver,
            sources,
            profile: services.profile,
            servers: services.servers,
            loader: services.loader,
            log,
        }
    }

    /// Replaces the engine sources; earlier sources load first.
    pub fn with_sources(mut self, sources: Vec<Box<dyn PluginSource>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn context(&self) -> Arc<Context> {
        self.ctx.clone()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Runs the startup sequence. A failing engine is returned as `Err`
    /// after being logged; the caller owns the exit.
    pub async fn boot(self) -> Result<BootOutcome> {
        let log = &self.log;
        log.info(
            "startup",
            obj(&[
                ("msg", v_str(&format!("botshell v{}", VERSION))),
                ("platform", v_str(self.ctx.platform())),
            ]),
        );

        let engines = discover(&self.sources, &log.domain(Domain::Engine))
            .map_err(|err| fatal(log, "discovery_failed", err))?;
        if engines.is_empty() {
            log.domain(Domain::Engine).warn(
                "no_engines",
                obj(&[
                    ("msg", v_str("no engines found; the shell will still start")),
                    ("code", json!(codes::NO_ENGINES)),
                ]),
            );
        }
        load_all(&engines, self.loader.as_ref(), &self.ctx, log)?;

        let profile = self.profile.clone();
        self.bus.register_named(
            "self_profile",
            sync_handler(move |event| {
                profile.observe(event);
                Ok(())
            }),
        );

        // First point that waits for login; anything that must run before
        // login belongs above.
        log.debug("waiting_for_login", obj(&[]));
        let config = self
            .ctx
            .get_config()
            .await
            .context("failed to fetch config")
            .map_err(|err| fatal(log, "config_failed", err))?;
        if !config.enable {
            log.info(
                "disabled",
                obj(&[
                    ("msg", v_str("shell disabled by configuration; exiting")),
                    ("code", json!(codes::SHELL_DISABLED)),
                ]),
            );
            return Ok(BootOutcome::Disabled);
        }

        let log_config = LogConfig {
            self_url: Some(normalize_self_url(config.log.self_url.as_deref())),
        };
        if let Some(url) = &log_config.self_url {
            if let Err(err) = Url::parse(url) {
                log.domain(Domain::Config).warn(
                    "self_url_invalid",
                    obj(&[("self_url", v_str(url)), ("cause", v_str(&err.to_string()))]),
                );
            }
        }

        self.bus.register_named(
            "protocol_log",
            protocol_logger(Arc::downgrade(&self.ctx), Arc::new(log_config), log.clone()),
        );

        let bridge = self
            .servers
            .start(self.ctx.clone())
            .await
            .context("failed to start servers")
            .map_err(|err| fatal(log, "servers_failed", err))?;
        self.bus.register_named("servers", bridge);

        log.info(
            "startup_complete",
            obj(&[
                ("msg", v_str("shell started")),
                ("code", json!(codes::STARTUP_COMPLETE)),
                ("handlers", json!(self.bus.len())),
            ]),
        );
        self.resolver.resolve();
        Ok(BootOutcome::Started)
    }
}

fn fatal(log: &Logger, event: &str, err: anyhow::Error) -> anyhow::Error {
    log.error_with_cause(event, &err, codes::BOOT_FAILED, true);
    err
}

/// Renders protocol events and feeds each element to the log.
fn protocol_logger(ctx: Weak<Context>, log_config: Arc<LogConfig>, log: Logger) -> Handler {
    handler(move |event: Arc<Event>| {
        let ctx = ctx.clone();
        let log_config = log_config.clone();
        let log = log.clone();
        async move {
            let Event::Protocol(protocol) = &*event else {
                return Ok(());
            };
            let Some(ctx) = ctx.upgrade() else {
                return Ok(());
            };
            for element in protocol.to_elements(&ctx, &log_config).await? {
                log.parse(&element);
            }
            Ok(())
        }
    })
}

//! Process-wide publish/subscribe bus.
//!
//! Handlers are invoked in registration order with the same shared event.
//! The synchronous part of every handler runs inside `emit`; the future it
//! returns is spawned as its own task and never awaited by the caller. A
//! handler that panics or fails is logged and does not affect its siblings.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::element::Element;
use crate::logging::{codes, obj, v_str, Domain, Logger};
use crate::services::config::LogConfig;
use crate::services::profile::SelfProfile;

/// A chat event that can be rendered as protocol elements for logging.
#[async_trait]
pub trait ProtocolEvent: Send + Sync + fmt::Debug {
    /// Discriminator, e.g. `message-created`.
    fn kind(&self) -> &str;

    async fn to_elements(&self, ctx: &Context, log: &LogConfig) -> Result<Vec<Element>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionEvent {
    pub kind: String,
    pub payload: Value,
}

impl ExtensionEvent {
    pub fn new(kind: &str, payload: Value) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Loggable chat traffic.
    Protocol(Arc<dyn ProtocolEvent>),
    /// The account the shell runs as has (re)logged in.
    Login(SelfProfile),
    /// Engine-defined payloads; opaque to the shell.
    Extension(ExtensionEvent),
}

impl Event {
    pub fn kind(&self) -> &str {
        match self {
            Event::Protocol(p) => p.kind(),
            Event::Login(_) => "login",
            Event::Extension(e) => &e.kind,
        }
    }
}

pub type HandlerFuture = BoxFuture<'static, Result<()>>;
pub type Handler = Arc<dyn Fn(Arc<Event>) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure as a bus handler.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Wraps a closure that does all its work during dispatch.
pub fn sync_handler<F>(f: F) -> Handler
where
    F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(move |event| {
        let res = f(&event);
        async move { res }.boxed()
    })
}

struct Registered {
    name: String,
    handler: Handler,
}

pub struct EventBus {
    handlers: Mutex<Vec<Arc<Registered>>>,
    log: Logger,
}

impl EventBus {
    pub fn new(log: &Logger) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            log: log.domain(Domain::Bus),
        }
    }

    pub fn register(&self, handler: Handler) {
        let name = format!("handler-{}", self.len());
        self.register_named(&name, handler);
    }

    pub fn register_named(&self, name: &str, handler: Handler) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|p| p.into_inner());
        handlers.push(Arc::new(Registered {
            name: name.to_string(),
            handler,
        }));
        self.log.debug(
            "handler_registered",
            obj(&[("name", v_str(name)), ("position", json!(handlers.len()))]),
        );
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatches `event` to every handler registered at call time.
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let snapshot: Vec<Arc<Registered>> = self
            .handlers
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|p| p.into_inner().clone());
        let runtime = tokio::runtime::Handle::try_current().ok();

        for entry in &snapshot {
            let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| {
                (entry.handler)(event.clone())
            }));
            let fut = match invoked {
                Ok(fut) => fut,
                Err(panic) => {
                    self.report(&entry.name, event.kind(), &anyhow!(panic_message(&*panic)));
                    continue;
                }
            };

            let Some(runtime) = &runtime else {
                self.log.warn(
                    "no_runtime",
                    obj(&[
                        ("msg", v_str("emit outside a runtime; async handler work dropped")),
                        ("name", v_str(&entry.name)),
                    ]),
                );
                continue;
            };

            let log = self.log.clone();
            let name = entry.name.clone();
            let kind = event.kind().to_string();
            runtime.spawn(async move {
                let outcome = AssertUnwindSafe(fut).catch_unwind().await;
                let err = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => err,
                    Err(panic) => anyhow!(panic_message(&*panic)),
                };
                report_failure(&log, &name, &kind, &err);
            });
        }
        snapshot.len()
    }

    fn report(&self, name: &str, kind: &str, err: &anyhow::Error) {
        report_failure(&self.log, name, kind, err);
    }
}

fn report_failure(log: &Logger, name: &str, kind: &str, err: &anyhow::Error) {
    log.error(
        "handler_failed",
        obj(&[
            ("msg", v_str(&format!("handler {} failed on {}", name, kind))),
            ("cause", v_str(&format!("{:#}", err))),
            ("code", json!(codes::HANDLER_FAILED)),
            ("name", v_str(name)),
        ]),
    );
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

//! Minimal HTTP health endpoint bridged to the event bus.
//!
//! Endpoints:
//!   GET /health  - status, readiness and number of bridged events
//!   GET /events/last - kind of the most recent bridged event

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::bus::{sync_handler, Handler};
use crate::context::Context;
use crate::logging::{obj, v_str, Domain, Logger};
use crate::services::ServerSubsystem;
use crate::util;

/// How long a client may take to send its request line.
const READ_TIMEOUT_MS: u64 = 5_000;
/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF_MS: u64 = 100;

#[derive(Default)]
struct Counters {
    events: AtomicU64,
    last_kind: Mutex<Option<String>>,
}

pub struct HealthServer {
    addr: String,
    bound: OnceLock<SocketAddr>,
    log: Logger,
}

impl HealthServer {
    pub fn new(addr: &str, log: &Logger) -> Self {
        Self {
            addr: addr.to_string(),
            bound: OnceLock::new(),
            log: log.domain(Domain::Server),
        }
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }
}

#[async_trait]
impl ServerSubsystem for HealthServer {
    async fn start(&self, ctx: Arc<Context>) -> Result<Handler> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("cannot bind {}", self.addr))?;
        let local = listener.local_addr()?;
        let _ = self.bound.set(local);
        self.log.info(
            "listening",
            obj(&[("msg", v_str(&format!("health endpoint at http://{}", local)))]),
        );

        let counters = Arc::new(Counters::default());
        let log = self.log.clone();
        let served = counters.clone();
        let weak = Arc::downgrade(&ctx);
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(err) => {
                        log.warn("accept_failed", obj(&[("cause", v_str(&err.to_string()))]));
                        util::sleep(ACCEPT_BACKOFF_MS).await;
                        continue;
                    }
                };
                let ready = weak.upgrade().map(|c| c.is_ready()).unwrap_or(false);
                let served = served.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    if let Err(err) = respond(stream, &served, ready).await {
                        log.debug("request_failed", obj(&[("cause", v_str(&format!("{:#}", err)))]));
                    }
                });
            }
        });

        Ok(sync_handler(move |event| {
            counters.events.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = counters.last_kind.lock() {
                *last = Some(event.kind().to_string());
            }
            Ok(())
        }))
    }
}

async fn respond(mut stream: TcpStream, counters: &Counters, ready: bool) -> Result<()> {
    let mut request = String::new();
    util::timeout(READ_TIMEOUT_MS, BufReader::new(&mut stream).read_line(&mut request))
        .await
        .context("no request line")??;

    let (status, content_type, body) = if request.starts_with("GET /health") {
        let body = json!({
            "status": "ok",
            "ready": ready,
            "events": counters.events.load(Ordering::SeqCst),
        });
        ("200 OK", "application/json", body.to_string())
    } else if request.starts_with("GET /events/last") {
        let last = counters.last_kind.lock().ok().and_then(|l| l.clone());
        ("200 OK", "application/json", json!({ "kind": last }).to_string())
    } else {
        ("404 NOT FOUND", "text/plain", "Not Found".to_string())
    };

    let response = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Event, ExtensionEvent};
    use crate::context::testing::fixture;
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: x\r\n\r\n", path).as_bytes())
            .await
            .unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_health_reports_bridged_events() {
        let fx = fixture();
        let server = HealthServer::new("127.0.0.1:0", fx.ctx.log());
        let bridge = server.start(fx.ctx.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();

        fx.bus.register(bridge);
        fx.ctx.emit(Event::Extension(ExtensionEvent::new("ping", Value::Null)));
        fx.ctx.emit(Event::Extension(ExtensionEvent::new("pong", Value::Null)));

        let health = get(addr, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200 OK"));
        assert!(health.contains(r#""events":2"#));
        assert!(health.contains(r#""ready":false"#));

        let last = get(addr, "/events/last").await;
        assert!(last.contains(r#""kind":"pong""#));

        assert!(get(addr, "/nope").await.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_idle_client_does_not_block_others() {
        let fx = fixture();
        let server = HealthServer::new("127.0.0.1:0", fx.ctx.log());
        server.start(fx.ctx.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::task::yield_now().await;

        let health = tokio::time::timeout(std::time::Duration::from_secs(2), get(addr, "/health"))
            .await
            .expect("health answered while another client is idle");
        assert!(health.starts_with("HTTP/1.1 200 OK"));
    }
}

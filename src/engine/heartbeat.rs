//! Built-in engine that announces liveness on the bus once the shell is up.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::Engine;
use crate::bus::{Event, ExtensionEvent};
use crate::context::Context;
use crate::logging::ts_now;

pub const KEY: &str = "heartbeat";
pub const EVENT_KIND: &str = "heartbeat";

fn default_interval_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize)]
struct Options {
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

pub struct Heartbeat {
    interval_ms: u64,
}

pub fn factory(options: &Value) -> Result<Box<dyn Engine>> {
    let opts: Options = if options.is_null() {
        Options {
            interval_ms: default_interval_ms(),
        }
    } else {
        serde_json::from_value(options.clone()).context("invalid heartbeat options")?
    };
    if opts.interval_ms == 0 {
        anyhow::bail!("heartbeat interval must be positive");
    }
    Ok(Box::new(Heartbeat {
        interval_ms: opts.interval_ms,
    }))
}

impl Engine for Heartbeat {
    fn name(&self) -> &str {
        KEY
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn apply(&self, ctx: &Arc<Context>) -> Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().context("heartbeat needs a running runtime")?;
        let ready = ctx.when_ready();
        let weak = Arc::downgrade(ctx);
        let interval_ms = self.interval_ms;

        runtime.spawn(async move {
            ready.await;
            let mut seq = 0u64;
            loop {
                tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
                let Some(ctx) = weak.upgrade() else {
                    break;
                };
                seq += 1;
                ctx.emit(Event::Extension(ExtensionEvent::new(
                    EVENT_KIND,
                    json!({ "seq": seq, "ts": ts_now(), "platform": ctx.platform() }),
                )));
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::sync_handler;
    use crate::context::testing::fixture;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_factory_options() {
        assert!(factory(&Value::Null).is_ok());
        assert!(factory(&json!({})).is_ok());
        assert!(factory(&json!({"interval_ms": 0})).is_err());
        assert!(factory(&json!({"interval_ms": "soon"})).is_err());
    }

    #[tokio::test]
    async fn test_beats_only_after_ready() {
        let fx = fixture();
        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.bus.register(sync_handler(move |event| {
            if let Event::Extension(e) = event {
                let _ = tx.send(e.payload["seq"].as_u64());
            }
            Ok(())
        }));

        let engine = factory(&json!({"interval_ms": 5})).unwrap();
        engine.apply(&fx.ctx).unwrap();

        assert!(timeout(Duration::from_millis(40), rx.recv()).await.is_err());
        fx.resolver.resolve();
        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first, Some(Some(1)));
    }

    #[test]
    fn test_apply_without_runtime_fails() {
        let fx = fixture();
        let engine = factory(&Value::Null).unwrap();
        assert!(engine.apply(&fx.ctx).is_err());
    }
}

//! Engine loading.
//!
//! A plain engine file holds a JSON manifest:
//!
//! ```json
//! { "engine": "heartbeat", "options": { "interval_ms": 30000 } }
//! ```
//!
//! Both keys are optional; an empty file resolves the catalog entry named
//! after the file. A compiled file holds the same manifest base64-packed and
//! needs the compiled-engine decoder, activated once per loader.
//!
//! Any failure while loading or applying an engine is fatal: the remaining
//! engines are not loaded and the error is returned to the caller.

use anyhow::{anyhow, bail, Context as _, Result};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use super::{heartbeat, Engine, EngineDescriptor, EngineKind};
use crate::context::Context;
use crate::logging::{codes, obj, v_str, Domain, Logger};
use crate::style::Style;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub engine: Option<String>,
    pub options: Value,
}

pub type EngineFactory = Arc<dyn Fn(&Value) -> Result<Box<dyn Engine>> + Send + Sync>;

/// Engines this build knows how to construct, by key.
#[derive(Clone, Default)]
pub struct EngineCatalog {
    factories: HashMap<String, EngineFactory>,
}

impl EngineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(heartbeat::KEY, heartbeat::factory);
        catalog
    }

    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Engine>> + Send + Sync + 'static,
    {
        self.factories.insert(key.to_string(), Arc::new(factory));
    }

    pub fn get(&self, key: &str) -> Option<&EngineFactory> {
        self.factories.get(key)
    }
}

pub trait ModuleLoader: Send + Sync {
    fn load(&self, descriptor: &EngineDescriptor) -> Result<Box<dyn Engine>>;
}

/// Resolves engine files through an [`EngineCatalog`].
pub struct ManifestLoader {
    catalog: EngineCatalog,
    compiled: OnceLock<base64::engine::GeneralPurpose>,
    log: Logger,
}

impl ManifestLoader {
    pub fn new(catalog: EngineCatalog, log: &Logger) -> Self {
        Self {
            catalog,
            compiled: OnceLock::new(),
            log: log.domain(Domain::Engine),
        }
    }

    fn compiled_decoder(&self) -> &base64::engine::GeneralPurpose {
        self.compiled.get_or_init(|| {
            self.log.debug(
                "compiled_support",
                obj(&[("msg", v_str("compiled engine decoder activated"))]),
            );
            base64::engine::general_purpose::STANDARD
        })
    }

    pub fn compiled_active(&self) -> bool {
        self.compiled.get().is_some()
    }

    fn decode(&self, kind: EngineKind, bytes: &[u8]) -> Result<Manifest> {
        let raw = match kind {
            EngineKind::Plain => bytes.to_vec(),
            EngineKind::Compiled => {
                let packed: Vec<u8> = bytes
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                self.compiled_decoder()
                    .decode(packed)
                    .context("compiled engine is not valid base64")?
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Manifest::default());
        }
        serde_json::from_slice(&raw).context("invalid engine manifest")
    }
}

impl ModuleLoader for ManifestLoader {
    fn load(&self, descriptor: &EngineDescriptor) -> Result<Box<dyn Engine>> {
        if descriptor.kind == EngineKind::Compiled {
            self.compiled_decoder();
        }

        let bytes = std::fs::read(&descriptor.path)
            .with_context(|| format!("cannot read {}", descriptor.path.display()))?;
        self.log.debug(
            "engine_file",
            obj(&[
                ("filename", v_str(&descriptor.filename)),
                ("kind", v_str(descriptor.kind.as_str())),
                ("sha256", v_str(&hex::encode(Sha256::digest(&bytes)))),
            ]),
        );

        let manifest = self.decode(descriptor.kind, &bytes)?;
        let key = manifest.engine.as_deref().unwrap_or(&descriptor.name);
        let factory = self
            .catalog
            .get(key)
            .ok_or_else(|| anyhow!("no engine named {:?} is available", key))?;
        factory(&manifest.options)
    }
}

/// Rejects engines that do not identify themselves.
pub fn validate_engine(engine: &dyn Engine) -> Result<()> {
    if engine.name().trim().is_empty() {
        bail!("engine has an empty name");
    }
    if engine.version().trim().is_empty() {
        bail!("engine {} has an empty version", engine.name());
    }
    Ok(())
}

fn load_one(
    descriptor: &EngineDescriptor,
    loader: &dyn ModuleLoader,
    ctx: &Arc<Context>,
    log: &Logger,
) -> Result<()> {
    let engine = loader.load(descriptor)?;
    validate_engine(engine.as_ref())?;

    let mut msg = format!(
        "using engine {} v{}",
        Style::Green.paint(engine.name()),
        engine.version()
    );
    if !descriptor.hidden {
        msg.push_str(&Style::Grey.paint(&format!(", from {}", descriptor.filename)));
    }
    log.info(
        "engine_selected",
        obj(&[
            ("msg", v_str(&msg)),
            ("engine", v_str(engine.name())),
            ("version", v_str(engine.version())),
        ]),
    );

    match std::panic::catch_unwind(AssertUnwindSafe(|| engine.apply(ctx))) {
        Ok(res) => res,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            Err(anyhow!("apply panicked: {}", detail))
        }
    }
}

/// Loads and applies every engine in order, stopping at the first failure.
/// Returns how many engines were applied.
pub fn load_all(
    descriptors: &[EngineDescriptor],
    loader: &dyn ModuleLoader,
    ctx: &Arc<Context>,
    log: &Logger,
) -> Result<usize> {
    let log = log.domain(Domain::Engine);

    for (applied, descriptor) in descriptors.iter().enumerate() {
        log.debug(
            "engine_loading",
            obj(&[
                ("msg", v_str(&format!("loading {}", Style::Green.paint(&descriptor.filename)))),
                ("position", json!(applied)),
            ]),
        );

        if let Err(err) = load_one(descriptor, loader, ctx, &log) {
            let err = err.context(format!("failed to load engine {}", descriptor.filename));
            log.error_with_cause("engine_load_failed", &err, codes::ENGINE_LOAD_FAILED, true);
            return Err(err);
        }
    }
    Ok(descriptors.len())
}

//! Engine discovery.

use anyhow::{Context as _, Result};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{EngineDescriptor, EngineKind, COMPILED_SUFFIX, PLAIN_SUFFIX};
use crate::logging::{obj, v_str, Logger};

/// A place engines are listed from.
pub trait PluginSource: Send + Sync {
    fn root(&self) -> &Path;

    fn hidden(&self) -> bool;

    /// Entry names in listing order.
    fn list(&self) -> Result<Vec<String>>;
}

/// A directory on disk, listed non-recursively.
pub struct DirSource {
    root: PathBuf,
    hidden: bool,
    create: bool,
}

impl DirSource {
    /// User-writable directory; created if absent.
    pub fn external(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hidden: false,
            create: true,
        }
    }

    /// Directory shipped with the shell; a missing one lists as empty.
    pub fn bundled(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hidden: true,
            create: false,
        }
    }
}

impl PluginSource for DirSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn hidden(&self) -> bool {
        self.hidden
    }

    fn list(&self) -> Result<Vec<String>> {
        if self.create {
            std::fs::create_dir_all(&self.root)
                .with_context(|| format!("cannot create {}", self.root.display()))?;
        } else if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("cannot list {}", self.root.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("cannot list {}", self.root.display()))?;
            // Non-UTF-8 names are never engine files.
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Fixed listing, for tests and embedded manifests.
pub struct MemorySource {
    root: PathBuf,
    hidden: bool,
    entries: Vec<String>,
}

impl MemorySource {
    pub fn new(root: impl Into<PathBuf>, hidden: bool, entries: &[&str]) -> Self {
        Self {
            root: root.into(),
            hidden,
            entries: entries.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl PluginSource for MemorySource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn hidden(&self) -> bool {
        self.hidden
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries.clone())
    }
}

/// Derives `(name, kind)` from an engine filename; `None` for anything else.
pub fn parse_filename(filename: &str) -> Option<(String, EngineKind)> {
    if let Some(name) = filename.strip_suffix(COMPILED_SUFFIX) {
        return Some((name.to_string(), EngineKind::Compiled));
    }
    filename
        .strip_suffix(PLAIN_SUFFIX)
        .map(|name| (name.to_string(), EngineKind::Plain))
}

/// Lists every source in order and keeps recognized engine files.
/// Same-named engines from different sources are all kept.
pub fn discover(sources: &[Box<dyn PluginSource>], log: &Logger) -> Result<Vec<EngineDescriptor>> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for source in sources {
        for filename in source.list()? {
            let Some((name, kind)) = parse_filename(&filename) else {
                continue;
            };
            if !seen.insert(name.clone()) {
                log.warn(
                    "duplicate_engine",
                    obj(&[
                        ("msg", v_str(&format!("engine {} found more than once", name))),
                        ("filename", v_str(&filename)),
                        ("dir", v_str(&source.root().to_string_lossy())),
                    ]),
                );
            }
            found.push(EngineDescriptor {
                name,
                path: source.root().join(&filename),
                filename,
                kind,
                hidden: source.hidden(),
            });
        }
    }

    log.debug("discovered", obj(&[("count", json!(found.len()))]));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use std::sync::Arc;

    fn logger() -> (Logger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Logger::new(sink.clone()), sink)
    }

    #[test]
    fn test_parse_filename() {
        assert_eq!(
            parse_filename("echo.engine.js"),
            Some(("echo".to_string(), EngineKind::Plain))
        );
        assert_eq!(
            parse_filename("echo.engine.jsc"),
            Some(("echo".to_string(), EngineKind::Compiled))
        );
        assert_eq!(
            parse_filename("a.b.engine.js"),
            Some(("a.b".to_string(), EngineKind::Plain))
        );
        assert_eq!(parse_filename("echo.js"), None);
        assert_eq!(parse_filename("echo.engine.js.map"), None);
        assert_eq!(parse_filename("README.md"), None);
    }

    #[test]
    fn test_external_then_bundled_order() {
        let (log, _) = logger();
        let sources: Vec<Box<dyn PluginSource>> = vec![
            Box::new(MemorySource::new("/ext", false, &["a.engine.js", "notes.txt", "b.engine.jsc"])),
            Box::new(MemorySource::new("/bundled", true, &["c.engine.js", "d.engine.js"])),
        ];
        let found = discover(&sources, &log).unwrap();

        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(
            found.iter().map(|d| d.hidden).collect::<Vec<_>>(),
            vec![false, false, true, true]
        );
        assert_eq!(found[1].kind, EngineKind::Compiled);
        assert_eq!(found[2].path, PathBuf::from("/bundled/c.engine.js"));
    }

    #[test]
    fn test_listing_order_not_sorted() {
        let (log, _) = logger();
        let sources: Vec<Box<dyn PluginSource>> = vec![Box::new(MemorySource::new(
            "/ext",
            false,
            &["z.engine.js", "a.engine.js"],
        ))];
        let found = discover(&sources, &log).unwrap();
        assert_eq!(found[0].name, "z");
        assert_eq!(found[1].name, "a");
    }

    #[test]
    fn test_duplicates_kept_with_warning() {
        let (log, sink) = logger();
        let sources: Vec<Box<dyn PluginSource>> = vec![
            Box::new(MemorySource::new("/ext", false, &["a.engine.js"])),
            Box::new(MemorySource::new("/bundled", true, &["a.engine.jsc"])),
        ];
        let found = discover(&sources, &log).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(sink.with_event("duplicate_engine").len(), 1);
    }

    #[test]
    fn test_external_dir_created() {
        let tmp = tempfile::tempdir().unwrap();
        let ext = tmp.path().join("base").join("engines");
        assert!(!ext.exists());

        let (log, _) = logger();
        let sources: Vec<Box<dyn PluginSource>> = vec![Box::new(DirSource::external(&ext))];
        let found = discover(&sources, &log).unwrap();
        assert!(found.is_empty());
        assert!(ext.is_dir());
    }

    #[test]
    fn test_missing_bundled_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let src = DirSource::bundled(tmp.path().join("nope"));
        assert!(src.list().unwrap().is_empty());
        assert!(!tmp.path().join("nope").exists());
    }

    #[test]
    fn test_dir_source_lists_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("x.engine.js"), "").unwrap();
        std::fs::write(tmp.path().join("other.bin"), "").unwrap();

        let (log, _) = logger();
        let sources: Vec<Box<dyn PluginSource>> = vec![Box::new(DirSource::bundled(tmp.path()))];
        let found = discover(&sources, &log).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename, "x.engine.js");
        assert!(found[0].hidden);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_entries_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("ok.engine.js"), "").unwrap();
        let raw = OsStr::from_bytes(b"bad\xff.engine.js");
        std::fs::write(tmp.path().join(raw), "").unwrap();

        let (log, _) = logger();
        let sources: Vec<Box<dyn PluginSource>> = vec![Box::new(DirSource::bundled(tmp.path()))];
        let found = discover(&sources, &log).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ok");
        assert!(found[0].path.exists());
    }
}

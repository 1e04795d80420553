//! Module reference resolution
//!
//! Maps the literal string of a `require` call, relative to the requiring
//! file, to an absolute project file or to a configured global module.
//! Candidates are probed one after another; the first hit wins.

use std::{
    ffi::OsString,
    path::{Component, Path, PathBuf},
};

use anyhow::Result;
use log::{debug, trace, warn};

use crate::{config::Config, error::BundleError, file_registry::Resolved, io::Io};

/// Node core modules that `include-node` maps onto the shim directory
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "vm",
    "zlib",
];

const MANIFEST_FILE: &str = "package.json";
const INDEX_FILE: &str = "index.js";

pub fn is_node_builtin(name: &str) -> bool {
    NODE_BUILTINS.contains(&name)
}

/// Lexically resolve `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn is_path_reference(reference: &str) -> bool {
    reference.starts_with("./")
        || reference.starts_with("../")
        || reference.starts_with('/')
        || reference == "."
        || reference == ".."
}

pub struct ModuleResolver<'a, I: Io> {
    io: &'a I,
    modules_directories: Vec<String>,
    /// Global module names; the position is the module's index
    global_modules: Vec<String>,
    node_shims: Option<PathBuf>,
}

impl<'a, I: Io> ModuleResolver<'a, I> {
    pub fn new(io: &'a I, config: &Config) -> Self {
        let node_shims = if config.include_node {
            if config.node_shims.is_none() {
                warn!("include-node is set but no node-shims directory is configured");
            }
            config.node_shims.clone()
        } else {
            None
        };
        Self {
            io,
            modules_directories: config.modules_directories.clone(),
            global_modules: config.global_modules.keys().cloned().collect(),
            node_shims,
        }
    }

    pub async fn resolve(&self, from: &Path, reference: &str) -> Result<Resolved> {
        if let Some(index) = self.global_modules.iter().position(|name| name == reference) {
            trace!("'{reference}' is global module #{index}");
            return Ok(Resolved::Global(index));
        }

        if let Some(shims) = &self.node_shims
            && is_node_builtin(reference)
        {
            if let Some(found) = self.probe_shim(shims, reference).await? {
                debug!("Resolved '{reference}' to shim {}", found.display());
                return Ok(Resolved::File(found));
            }
            debug!("No shim for '{reference}', falling back to normal resolution");
        }

        let base = from.parent().unwrap_or_else(|| Path::new("/"));
        let found = if is_path_reference(reference) {
            self.probe_path(&normalize_path(&base.join(reference))).await?
        } else {
            self.probe_named(base, reference).await?
        };

        match found {
            Some(path) => {
                debug!(
                    "Resolved '{reference}' from {} to {}",
                    from.display(),
                    path.display()
                );
                Ok(Resolved::File(path))
            }
            None => Err(BundleError::Resolution {
                reference: reference.to_owned(),
                from: from.to_path_buf(),
            }
            .into()),
        }
    }

    async fn probe_shim(&self, shims: &Path, name: &str) -> Result<Option<PathBuf>> {
        let file = shims.join(format!("{name}.js"));
        if self.io.file_exists(&file).await? {
            return Ok(Some(normalize_path(&file)));
        }
        self.probe_directory(&normalize_path(&shims.join(name))).await
    }

    /// Literal path, then `.js`, then `.json`, then a directory
    async fn probe_path(&self, candidate: &Path) -> Result<Option<PathBuf>> {
        for path in [
            candidate.to_path_buf(),
            with_suffix(candidate, ".js"),
            with_suffix(candidate, ".json"),
        ] {
            if self.io.file_exists(&path).await? {
                return Ok(Some(path));
            }
        }
        self.probe_directory(candidate).await
    }

    /// Search modules directories of every ancestor, nearest first
    async fn probe_named(&self, base: &Path, reference: &str) -> Result<Option<PathBuf>> {
        for ancestor in base.ancestors() {
            let inside_modules_directory = ancestor.file_name().is_some_and(|name| {
                self.modules_directories
                    .iter()
                    .any(|directory| name == directory.as_str())
            });
            if inside_modules_directory {
                continue;
            }

            for directory in &self.modules_directories {
                let candidate = normalize_path(&ancestor.join(directory).join(reference));
                trace!("Probing {}", candidate.display());
                if self.io.file_exists(&candidate).await? {
                    return Ok(Some(candidate));
                }
                let script = with_suffix(&candidate, ".js");
                if self.io.file_exists(&script).await? {
                    return Ok(Some(script));
                }
                if let Some(found) = self.probe_directory(&candidate).await? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// `package.json` main (as `<main>.js`, then literally), then `index.js`
    async fn probe_directory(&self, directory: &Path) -> Result<Option<PathBuf>> {
        if !self.io.directory_exists(directory).await? {
            return Ok(None);
        }

        let manifest = directory.join(MANIFEST_FILE);
        if self.io.file_exists(&manifest).await?
            && let Some(main) = self.read_main(&manifest).await?
        {
            let main = normalize_path(&directory.join(main));
            for path in [with_suffix(&main, ".js"), main] {
                if self.io.file_exists(&path).await? {
                    return Ok(Some(path));
                }
            }
        }

        let index = directory.join(INDEX_FILE);
        if self.io.file_exists(&index).await? {
            return Ok(Some(index));
        }
        Ok(None)
    }

    async fn read_main(&self, manifest: &Path) -> Result<Option<String>> {
        let content = self.io.read_file(manifest).await?;
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(value) => Ok(value
                .get("main")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)),
            Err(err) => {
                warn!("Ignoring unreadable {}: {err}", manifest.display());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{config::PackageData, io::MemoryIo};

    async fn resolve(io: &MemoryIo, config: &Config, from: &str, reference: &str) -> Result<Resolved> {
        ModuleResolver::new(io, config)
            .resolve(Path::new(from), reference)
            .await
    }

    fn file(path: &str) -> Resolved {
        Resolved::File(PathBuf::from(path))
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/p/src/./lib/../util.js")),
            PathBuf::from("/p/src/util.js")
        );
    }

    #[tokio::test]
    async fn test_relative_probe_order() -> Result<()> {
        let io = MemoryIo::with_files([
            ("/p/a.js", ""),
            ("/p/lib.js", ""),
            ("/p/lib/index.js", ""),
            ("/p/data.json", "{}"),
            ("/p/dir/index.js", ""),
        ]);
        let config = Config::default();

        assert_eq!(resolve(&io, &config, "/p/a.js", "./lib").await?, file("/p/lib.js"));
        assert_eq!(resolve(&io, &config, "/p/a.js", "./data").await?, file("/p/data.json"));
        assert_eq!(resolve(&io, &config, "/p/a.js", "./dir").await?, file("/p/dir/index.js"));
        assert_eq!(
            resolve(&io, &config, "/p/dir/index.js", "../lib/index").await?,
            file("/p/lib/index.js")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_package_main() -> Result<()> {
        let io = MemoryIo::with_files([
            ("/p/a.js", ""),
            ("/p/node_modules/x/package.json", r#"{"main": "lib/x"}"#),
            ("/p/node_modules/x/lib/x.js", ""),
            ("/p/node_modules/y/package.json", r#"{"name": "y"}"#),
            ("/p/node_modules/y/index.js", ""),
        ]);
        let config = Config::default();

        assert_eq!(
            resolve(&io, &config, "/p/a.js", "x").await?,
            file("/p/node_modules/x/lib/x.js")
        );
        assert_eq!(
            resolve(&io, &config, "/p/a.js", "y").await?,
            file("/p/node_modules/y/index.js")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_nearest_modules_directory_wins() -> Result<()> {
        let io = MemoryIo::with_files([
            ("/p/node_modules/x.js", "outer"),
            ("/p/src/node_modules/x.js", "inner"),
            ("/p/src/node_modules/y/index.js", ""),
            ("/p/src/a.js", ""),
        ]);
        let config = Config::default();

        assert_eq!(
            resolve(&io, &config, "/p/src/a.js", "x").await?,
            file("/p/src/node_modules/x.js")
        );
        // Packages inside a modules directory search above it, not inside it
        assert_eq!(
            resolve(&io, &config, "/p/src/node_modules/y/index.js", "x").await?,
            file("/p/src/node_modules/x.js")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_global_modules_and_shims() -> Result<()> {
        let io = MemoryIo::with_files([("/p/a.js", ""), ("/shims/events.js", "")]);
        let mut global_modules = BTreeMap::new();
        global_modules.insert("jquery".to_owned(), PackageData::universal("jQuery".to_owned()));
        global_modules.insert("angular".to_owned(), PackageData::universal("angular".to_owned()));
        let config = Config {
            global_modules,
            include_node: true,
            node_shims: Some(PathBuf::from("/shims")),
            ..Config::default()
        };

        assert_eq!(resolve(&io, &config, "/p/a.js", "jquery").await?, Resolved::Global(1));
        assert_eq!(resolve(&io, &config, "/p/a.js", "events").await?, file("/shims/events.js"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_reference_names_both_sides() {
        let io = MemoryIo::with_files([("/p/a.js", "")]);
        let err = resolve(&io, &Config::default(), "/p/a.js", "./missing")
            .await
            .expect_err("nothing to find");
        assert_eq!(
            err.to_string(),
            "Cannot find module './missing' referenced from /p/a.js"
        );
    }
}

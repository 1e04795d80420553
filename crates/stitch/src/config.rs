//! Bundler configuration
//!
//! Options come from a `stitch.toml` file (explicit path, current directory,
//! or the user configuration directory, first hit wins) and are then
//! overridden by command-line flags.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "stitch.toml";
pub const DEFAULT_VAR_PREFIX: &str = "__small$_";
pub const DEFAULT_MODULES_DIRECTORY: &str = "node_modules";

/// The four distributable output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Standalone,
    CommonJs,
    Amd,
    Universal,
}

impl OutputFormat {
    pub const ALL: [Self; 4] = [Self::Standalone, Self::CommonJs, Self::Amd, Self::Universal];

    pub fn name(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::CommonJs => "commonjs",
            Self::Amd => "amd",
            Self::Universal => "universal",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per output format
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageData<T> {
    pub standalone: Option<T>,
    pub commonjs: Option<T>,
    pub amd: Option<T>,
    pub universal: Option<T>,
}

impl<T> Default for PackageData<T> {
    fn default() -> Self {
        Self {
            standalone: None,
            commonjs: None,
            amd: None,
            universal: None,
        }
    }
}

impl<T> PackageData<T> {
    /// Same value for every format, stored once as `universal`
    pub fn universal(value: T) -> Self {
        Self {
            universal: Some(value),
            ..Self::default()
        }
    }

    /// The member for exactly this format
    pub fn get(&self, format: OutputFormat) -> Option<&T> {
        match format {
            OutputFormat::Standalone => self.standalone.as_ref(),
            OutputFormat::CommonJs => self.commonjs.as_ref(),
            OutputFormat::Amd => self.amd.as_ref(),
            OutputFormat::Universal => self.universal.as_ref(),
        }
    }

    /// The member for this format, falling back to `universal`
    pub fn get_or_universal(&self, format: OutputFormat) -> Option<&T> {
        self.get(format).or(self.universal.as_ref())
    }

    pub fn set(&mut self, format: OutputFormat, value: T) {
        let slot = match format {
            OutputFormat::Standalone => &mut self.standalone,
            OutputFormat::CommonJs => &mut self.commonjs,
            OutputFormat::Amd => &mut self.amd,
            OutputFormat::Universal => &mut self.universal,
        };
        *slot = Some(value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Directory names searched while resolving named modules
    pub modules_directories: Vec<String>,
    /// References satisfied by variables supplied from outside the bundle
    pub global_modules: BTreeMap<String, PackageData<String>>,
    /// Prefix of every generated variable name
    pub var_prefix: String,
    /// Resolve Node core module names through the shim directory
    pub include_node: bool,
    /// Directory holding `<name>.js` shims for Node core modules
    pub node_shims: Option<PathBuf>,
    /// Exported package name per format
    pub export_package: PackageData<String>,
    /// Output file per format; formats without a file are not written
    pub output_file_name: PackageData<PathBuf>,
    /// Append a `//# sourceMappingURL=` comment to written bundles
    pub source_map_comment: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modules_directories: vec![DEFAULT_MODULES_DIRECTORY.to_owned()],
            global_modules: BTreeMap::new(),
            var_prefix: DEFAULT_VAR_PREFIX.to_owned(),
            include_node: false,
            node_shims: None,
            export_package: PackageData::default(),
            output_file_name: PackageData::default(),
            source_map_comment: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid stitch configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// Load configuration, trying the explicit path first, then
    /// `./stitch.toml`, then the user configuration directory
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        for candidate in Self::discovery_candidates() {
            if candidate.is_file() {
                debug!("Loading config from {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn discovery_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        match choose_base_strategy() {
            Ok(strategy) => {
                candidates.push(strategy.config_dir().join("stitch").join(CONFIG_FILE_NAME));
            }
            Err(err) => debug!("No user config directory: {err}"),
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.modules_directories, vec!["node_modules".to_owned()]);
        assert_eq!(config.var_prefix, "__small$_");
        assert!(!config.include_node);
        assert!(config.global_modules.is_empty());
    }

    #[test]
    fn test_parse_full_config() -> Result<()> {
        let config = Config::from_toml_str(
            r#"
            modules-directories = ["node_modules", "bower_components"]
            var-prefix = "__b$"
            include-node = true
            source-map-comment = true

            [global-modules.jquery]
            universal = "jQuery"
            amd = "jquery"

            [export-package]
            standalone = "window.lib"

            [output-file-name]
            standalone = "dist/lib.js"
            "#,
        )?;

        assert_eq!(config.modules_directories.len(), 2);
        assert_eq!(config.var_prefix, "__b$");
        let jquery = &config.global_modules["jquery"];
        assert_eq!(
            jquery.get_or_universal(OutputFormat::Amd).map(String::as_str),
            Some("jquery")
        );
        assert_eq!(
            jquery.get_or_universal(OutputFormat::CommonJs).map(String::as_str),
            Some("jQuery")
        );
        assert_eq!(
            config.output_file_name.get(OutputFormat::Standalone),
            Some(&PathBuf::from("dist/lib.js"))
        );
        assert_eq!(config.output_file_name.get(OutputFormat::Amd), None);
        Ok(())
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Config::from_toml_str("var_prefix = \"x\"").is_err());
    }

    #[test]
    fn test_load_explicit_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "include-node = true\n")?;

        let config = Config::load(Some(&path))?;
        assert!(config.include_node);
        assert_eq!(config.var_prefix, DEFAULT_VAR_PREFIX);
        Ok(())
    }
}

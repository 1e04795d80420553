use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info, warn};
use stitch::{Config, DiskIo, OutputFormat, PackageData, compile};

/// Bundle a CommonJS project into a single closure tree
#[derive(Parser, Debug)]
#[command(name = "stitch", version, about, long_about = None)]
struct Cli {
    /// Start file of the project
    #[arg(short, long)]
    input: PathBuf,

    /// Output file for the standalone bundle
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file for the AMD bundle
    #[arg(long)]
    amd: Option<PathBuf>,

    /// Output file for the CommonJS bundle
    #[arg(long)]
    commonjs: Option<PathBuf>,

    /// Output file for the universal (UMD) bundle
    #[arg(long)]
    universal: Option<PathBuf>,

    /// Modules supplied from outside, as `name=expression` pairs.
    /// `require('name')` then evaluates to `expression`.
    #[arg(short = 'm', long, value_delimiter = ',', value_parser = parse_global_module)]
    global_modules: Vec<(String, String)>,

    /// Name the bundle is exported under, e.g. `window.lib`
    #[arg(short = 'e', long)]
    global_export: Option<String>,

    /// Directory names searched for named modules
    #[arg(short = 'p', long = "modules-directory", value_delimiter = ',')]
    modules_directories: Vec<String>,

    /// Resolve Node core modules through the shim directory
    #[arg(short = 'n', long)]
    include_node: bool,

    /// Directory holding shims for Node core modules
    #[arg(long)]
    node_shims: Option<PathBuf>,

    /// Prefix of generated variable names
    #[arg(long)]
    var_prefix: Option<String>,

    /// Append a sourceMappingURL comment to written bundles
    #[arg(long)]
    source_map_comment: bool,

    /// Configuration file, instead of discovering stitch.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_global_module(value: &str) -> Result<(String, String), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty global module".to_owned());
    }
    Ok(match value.split_once('=') {
        Some((name, expression)) => (name.to_owned(), expression.to_owned()),
        None => (value.to_owned(), value.to_owned()),
    })
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(self, config: &mut Config) {
        for (name, expression) in self.global_modules {
            config
                .global_modules
                .insert(name, PackageData::universal(expression));
        }
        if let Some(name) = self.global_export {
            config.export_package.set(OutputFormat::Universal, name);
        }
        if !self.modules_directories.is_empty() {
            config.modules_directories = self.modules_directories;
        }
        if self.include_node {
            config.include_node = true;
        }
        if let Some(shims) = self.node_shims {
            config.node_shims = Some(shims);
        }
        if let Some(prefix) = self.var_prefix {
            config.var_prefix = prefix;
        }
        if self.source_map_comment {
            config.source_map_comment = true;
        }

        let outputs = [
            (OutputFormat::Standalone, self.output),
            (OutputFormat::Amd, self.amd),
            (OutputFormat::CommonJs, self.commonjs),
            (OutputFormat::Universal, self.universal),
        ];
        for (format, path) in outputs {
            if let Some(path) = path {
                config.output_file_name.set(format, path);
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    let input = cli.input.clone();
    cli.apply(&mut config);

    if OutputFormat::ALL
        .iter()
        .all(|&format| config.output_file_name.get(format).is_none())
    {
        warn!("No output file configured, the bundle is only checked");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let compilation = runtime
        .block_on(compile(&input, &config, &DiskIo))
        .with_context(|| format!("Failed to bundle {}", input.display()))?;

    info!(
        "Bundled {} files into {} output files",
        compilation.registry.len(),
        compilation.written.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "stitch",
            "-i",
            "src/index.js",
            "-o",
            "dist/bundle.js",
            "--amd",
            "dist/bundle.amd.js",
            "-m",
            "jquery=jQuery,doc=document",
            "-m",
            "raw",
            "-e",
            "window.lib",
            "-p",
            "bower_components",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);

        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.global_modules.len(), 3);
        assert_eq!(
            config.global_modules["doc"].get_or_universal(OutputFormat::Standalone),
            Some(&"document".to_owned())
        );
        assert_eq!(
            config.global_modules["raw"].get_or_universal(OutputFormat::Amd),
            Some(&"raw".to_owned())
        );
        assert_eq!(
            config.export_package.get_or_universal(OutputFormat::Standalone),
            Some(&"window.lib".to_owned())
        );
        assert_eq!(config.modules_directories, vec!["bower_components".to_owned()]);
        assert_eq!(
            config.output_file_name.get(OutputFormat::Amd),
            Some(&PathBuf::from("dist/bundle.amd.js"))
        );
        assert_eq!(config.output_file_name.get(OutputFormat::CommonJs), None);
    }

    #[test]
    fn test_rejects_empty_global_module() {
        assert!(parse_global_module("").is_err());
        assert_eq!(
            parse_global_module("a=b=c"),
            Ok(("a".to_owned(), "b=c".to_owned()))
        );
    }
}

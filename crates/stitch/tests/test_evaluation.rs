//! Runs emitted CommonJS bundles under Node and compares them with running
//! the unbundled files. Skipped when `node` is not on `PATH`.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};
use pretty_assertions::assert_eq;
use serde_json::Value;
use stitch::{Config, DiskIo, OutputFormat, compile};
use tempfile::TempDir;

fn node_available() -> bool {
    Command::new("node").arg("--version").output().is_ok()
}

/// `JSON.stringify(require(module))` as printed by Node
fn evaluate(module: &Path) -> Result<String> {
    let specifier = Value::from(module.display().to_string());
    let output = Command::new("node")
        .arg("-e")
        .arg(format!("console.log(JSON.stringify(require({specifier})))"))
        .output()
        .context("failed to run node")?;
    if !output.status.success() {
        bail!(
            "node failed on {}: {}",
            module.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

/// Writes `files` under a fresh directory, bundles `a.js` to CommonJS and
/// returns the unbundled and bundled results
async fn evaluate_both(files: &[(&str, &str)]) -> Result<(String, String)> {
    let temp_dir = TempDir::new()?;
    let src = temp_dir.path().join("src");
    fs::create_dir_all(&src)?;
    for (name, source) in files {
        fs::write(src.join(name), source)?;
    }

    let bundle: PathBuf = temp_dir.path().join("dist/bundle.cjs.js");
    let mut config = Config::default();
    config
        .output_file_name
        .set(OutputFormat::CommonJs, bundle.clone());
    compile(&src.join("a.js"), &config, &DiskIo).await?;

    Ok((evaluate(&src.join("a.js"))?, evaluate(&bundle)?))
}

#[tokio::test]
async fn test_round_trip_value() -> Result<()> {
    if !node_available() {
        return Ok(());
    }
    let (unbundled, bundled) = evaluate_both(&[
        ("a.js", "module.exports = require('./b');"),
        ("b.js", "module.exports = 42;"),
    ])
    .await?;
    assert_eq!(bundled, "42");
    assert_eq!(bundled, unbundled);
    Ok(())
}

#[tokio::test]
async fn test_circular_partial_exports() -> Result<()> {
    if !node_available() {
        return Ok(());
    }
    let (unbundled, bundled) = evaluate_both(&[
        (
            "a.js",
            "var b = require('./b');\nexports.name = 'a';\nmodule.exports.total = b.value + b.readA();",
        ),
        (
            "b.js",
            "var a = require('./a');\nexports.value = 1;\nexports.readA = function() { return a.name ? 10 : 20; };",
        ),
    ])
    .await?;
    assert_eq!(bundled, unbundled);
    Ok(())
}

#[tokio::test]
async fn test_strict_modules_stay_strict() -> Result<()> {
    if !node_available() {
        return Ok(());
    }
    let (unbundled, bundled) = evaluate_both(&[
        (
            "a.js",
            "'use strict';\nvar b = require('./b');\nvar c = require('./c');\nmodule.exports = [b, c];",
        ),
        (
            "b.js",
            "'use strict';\nmodule.exports = (function() { return this === undefined; })();",
        ),
        ("c.js", "module.exports = require('./b');"),
    ])
    .await?;
    assert_eq!(bundled, "[true,true]");
    assert_eq!(bundled, unbundled);
    Ok(())
}

#[tokio::test]
async fn test_shared_declarators_are_removed() -> Result<()> {
    if !node_available() {
        return Ok(());
    }
    let (unbundled, bundled) = evaluate_both(&[
        (
            "a.js",
            "var x = 5, b = require('./b'), y = 6;\n\
             var first = require('./b'), z = 7;\n\
             var w = 8, last = require('./b');\n\
             module.exports = [b, x, y, first, z, w, last, require('./c')];",
        ),
        ("b.js", "module.exports = 'b';"),
        ("c.js", "var b = require('./b');\nmodule.exports = [b, 'c'];"),
    ])
    .await?;
    assert_eq!(bundled, r#"["b",5,6,"b",7,8,"b",["b","c"]]"#);
    assert_eq!(bundled, unbundled);
    Ok(())
}

#[tokio::test]
async fn test_diamond_runs_shared_file_once() -> Result<()> {
    if !node_available() {
        return Ok(());
    }
    let (unbundled, bundled) = evaluate_both(&[
        (
            "a.js",
            "var b = require('./b');\nvar c = require('./c');\nmodule.exports = [b, c, require('./d').count];",
        ),
        ("b.js", "module.exports = require('./d').count + 1;"),
        ("c.js", "module.exports = require('./d').count + 2;"),
        ("d.js", "var count = 0;\ncount++;\nexports.count = count;"),
    ])
    .await?;
    assert_eq!(bundled, "[2,3,1]");
    assert_eq!(bundled, unbundled);
    Ok(())
}

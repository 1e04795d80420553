use std::fs;

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::Value;
use stitch::{Config, DiskIo, OutputFormat, compile};
use tempfile::TempDir;

fn write_project(root: &std::path::Path) -> Result<()> {
    fs::create_dir_all(root.join("src/lib"))?;
    fs::create_dir_all(root.join("node_modules/greeting"))?;
    fs::write(
        root.join("src/index.js"),
        "var greet = require('./lib/greet');\nvar config = require('./config.json');\nmodule.exports = greet(config.name);\n",
    )?;
    fs::write(
        root.join("src/lib/greet.js"),
        "var prefix = require('greeting');\nmodule.exports = function(name) {\n  return prefix + name;\n};\n",
    )?;
    fs::write(root.join("src/config.json"), "{ \"name\": \"world\" }\n")?;
    fs::write(
        root.join("node_modules/greeting/package.json"),
        "{ \"main\": \"./hello.js\" }",
    )?;
    fs::write(
        root.join("node_modules/greeting/hello.js"),
        "module.exports = 'hello, ';\n",
    )?;
    Ok(())
}

#[tokio::test]
async fn test_writes_bundles_and_source_maps() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    write_project(root)?;

    let out = root.join("dist");
    let mut config = Config {
        source_map_comment: true,
        ..Config::default()
    };
    config
        .output_file_name
        .set(OutputFormat::Standalone, out.join("bundle.js"));
    config
        .output_file_name
        .set(OutputFormat::Amd, out.join("bundle.amd.js"));
    config
        .export_package
        .set(OutputFormat::Standalone, "greeting".to_owned());

    let compilation = compile(&root.join("src/index.js"), &config, &DiskIo).await?;
    assert_eq!(compilation.registry.len(), 4);
    assert_eq!(compilation.written.len(), 4);

    let code = fs::read_to_string(out.join("bundle.js"))?;
    assert!(code.starts_with("var greeting = (function() {\n"));
    assert!(code.ends_with("})();\n//# sourceMappingURL=bundle.js.map\n"));
    assert!(code.contains("return ({ \"name\": \"world\" }\n);"));
    assert!(!code.contains("require("));

    let amd = fs::read_to_string(out.join("bundle.amd.js"))?;
    assert!(amd.starts_with("define([], (function() {\n"));
    assert!(amd.ends_with("}));\n//# sourceMappingURL=bundle.amd.js.map\n"));

    let map: Value = serde_json::from_str(&fs::read_to_string(out.join("bundle.js.map"))?)?;
    assert_eq!(map["version"], 3);
    assert_eq!(map["file"], "bundle.js");
    let sources = map["sources"].as_array().map(Vec::len);
    assert_eq!(sources, Some(4));
    assert_eq!(
        map["sources"][0].as_str().map(|path| path.ends_with("src/index.js")),
        Some(true)
    );
    assert_eq!(
        map["sourcesContent"][3].as_str(),
        Some("module.exports = 'hello, ';\n")
    );
    let mappings = map["mappings"].as_str().unwrap_or_default();
    assert!(!mappings.is_empty());
    assert!(mappings.contains(';'));
    Ok(())
}

#[tokio::test]
async fn test_missing_package_reports_requester() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    fs::write(root.join("index.js"), "require('not-installed');\n")?;

    let err = compile(&root.join("index.js"), &Config::default(), &DiskIo)
        .await
        .expect_err("package is not installed");
    let message = err.to_string();
    assert!(message.contains("'not-installed'"));
    assert!(message.contains("index.js"));
    assert!(!root.join("dist").exists());
    Ok(())
}

#[tokio::test]
async fn test_byte_order_mark_is_ignored() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    fs::write(root.join("index.js"), "\u{feff}exports.answer = 42;\n")?;

    let compilation = compile(&root.join("index.js"), &Config::default(), &DiskIo).await?;
    let text = compilation.packages.standalone.to_text();
    assert!(text.contains("__small$_exports.answer = 42;"));
    assert!(!text.contains('\u{feff}'));
    Ok(())
}

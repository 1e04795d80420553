//! Package emission
//!
//! Wraps the root closure into the four distributable formats. The root
//! closure is shared between all of them; only the header and the argument
//! list differ.

use std::{collections::BTreeMap, rc::Rc};

use serde_json::Value;

use crate::{
    config::{Config, OutputFormat, PackageData},
    source_map::SourceNode,
};

/// The root closure wrapped once per output format
#[derive(Debug, Clone)]
pub struct Packages {
    pub standalone: Rc<SourceNode>,
    pub commonjs: Rc<SourceNode>,
    pub amd: Rc<SourceNode>,
    pub universal: Rc<SourceNode>,
}

impl Packages {
    pub fn get(&self, format: OutputFormat) -> &Rc<SourceNode> {
        match format {
            OutputFormat::Standalone => &self.standalone,
            OutputFormat::CommonJs => &self.commonjs,
            OutputFormat::Amd => &self.amd,
            OutputFormat::Universal => &self.universal,
        }
    }
}

fn quote(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

/// Argument lists passed to the root closure, one rendering per format
struct Dependencies {
    standalone: String,
    amd: String,
    commonjs: String,
}

impl Dependencies {
    fn new(global_modules: &BTreeMap<String, PackageData<String>>) -> Self {
        let mut standalone = Vec::new();
        let mut amd = Vec::new();
        let mut commonjs = Vec::new();
        for (name, data) in global_modules {
            standalone.push(
                data.get_or_universal(OutputFormat::Standalone)
                    .cloned()
                    .unwrap_or_else(|| "undefined".to_owned()),
            );
            let amd_name = data.get_or_universal(OutputFormat::Amd).unwrap_or(name);
            amd.push(quote(amd_name));
            let commonjs_name = data.get_or_universal(OutputFormat::CommonJs).unwrap_or(name);
            commonjs.push(format!("require({})", quote(commonjs_name)));
        }
        Self {
            standalone: standalone.join(", "),
            amd: amd.join(", "),
            commonjs: commonjs.join(", "),
        }
    }
}

fn wrap(header: String, root: &Rc<SourceNode>, footer: String) -> Rc<SourceNode> {
    Rc::new(SourceNode::Group(vec![
        SourceNode::generated(header),
        Rc::clone(root),
        SourceNode::generated(footer),
    ]))
}

fn standalone_header(name: Option<&String>) -> String {
    match name {
        Some(name) if name.contains('.') => format!("{name} = "),
        Some(name) => format!("var {name} = "),
        None => String::new(),
    }
}

fn amd_header(name: Option<&String>, deps: &str) -> String {
    match name.filter(|name| !name.is_empty()) {
        Some(name) => format!("define({}, [{deps}], ", quote(name)),
        None => format!("define([{deps}], "),
    }
}

fn universal_header(exports: &PackageData<String>, deps: &Dependencies) -> String {
    let Some(universal) = exports.universal.as_ref() else {
        return format!(
            "(function(__root, __factory) {{ if (typeof define === \"function\" && define.amd) {{ \
             define([{amd}], __factory);}} else if (typeof exports === \"object\") {{\
             __factory({commonjs});}} else {{__factory({standalone});}}}})(this, ",
            amd = deps.amd,
            commonjs = deps.commonjs,
            standalone = deps.standalone,
        );
    };

    // An empty universal name defers to the per-format names
    let pick = |format: OutputFormat| {
        let name = if universal.is_empty() {
            exports.get(format).map(String::as_str).unwrap_or_default()
        } else {
            universal.as_str()
        };
        quote(name)
    };
    format!(
        "(function(__root, __factory) {{ if (typeof define === \"function\" && define.amd) {{ \
         define({amd_name}, [{amd}], __factory);}} else if (typeof exports === \"object\") {{\
         module.exports = __factory({commonjs});}} else {{\
         __root[{standalone_name}] = __factory({standalone});}}}})(this, ",
        amd_name = pick(OutputFormat::Amd),
        amd = deps.amd,
        commonjs = deps.commonjs,
        standalone_name = pick(OutputFormat::Standalone),
        standalone = deps.standalone,
    )
}

/// Wrap the uninvoked root closure into every output format
pub fn emit_packages(root: &Rc<SourceNode>, config: &Config) -> Packages {
    let deps = Dependencies::new(&config.global_modules);
    let exports = &config.export_package;

    Packages {
        standalone: wrap(
            standalone_header(exports.get_or_universal(OutputFormat::Standalone)),
            root,
            format!("({});", deps.standalone),
        ),
        commonjs: wrap(
            "module.exports = ".to_owned(),
            root,
            format!("({});", deps.commonjs),
        ),
        amd: wrap(
            amd_header(exports.get(OutputFormat::Amd), &deps.amd),
            root,
            ");".to_owned(),
        ),
        universal: wrap(universal_header(exports, &deps), root, ");".to_owned()),
    }
}

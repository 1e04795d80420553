//! Import/export extraction with safety classification
//!
//! Runs the parser adapter over a script and decides, per site, whether the
//! rewriter may inline or rename it. JSON files have no sites.

use std::path::Path;

use anyhow::Result;
use log::trace;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::{
    nodes::{ExportNode, ExportShape, ExtractedNodes, ImportNode},
    parser::parse_script,
    types::SymbolId,
};

/// How a file's text becomes a closure body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Script,
    Json,
}

impl SourceKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Script,
        }
    }
}

pub fn extract(path: &Path, kind: SourceKind, source: &str) -> Result<ExtractedNodes> {
    if kind == SourceKind::Json {
        return Ok(ExtractedNodes::default());
    }

    let parsed = parse_script(path, source)?;
    let mut nodes = parsed.nodes;
    mark_import_safety(&mut nodes.imports, &parsed.reassigned);
    mark_export_safety(&mut nodes.exports);

    trace!(
        "{}: {} imports, {} exports",
        path.display(),
        nodes.imports.len(),
        nodes.exports.len()
    );
    Ok(nodes)
}

/// A simple import is safe when it always runs and its variable is never written again
fn mark_import_safety(imports: &mut [ImportNode], reassigned: &HashSet<SymbolId>) {
    for import in imports {
        import.safe = match &import.declaration {
            Some(declaration) => !import.conditional && !reassigned.contains(&declaration.symbol),
            None => false,
        };
    }
}

fn mark_export_safety(exports: &mut [ExportNode]) {
    let full = exports.iter().filter(|export| export.is_full()).count();
    let property = exports
        .iter()
        .filter(|export| export.shape == ExportShape::Property)
        .count();
    let unknown = exports
        .iter()
        .any(|export| export.shape == ExportShape::Unknown);

    if unknown || full > 1 || (full == 1 && property > 0) {
        for export in exports.iter_mut() {
            export.safe = false;
        }
        return;
    }

    let mut per_name: HashMap<String, usize> = HashMap::default();
    for name in exports.iter().filter_map(|export| export.exported_name()) {
        *per_name.entry(name.to_owned()).or_default() += 1;
    }

    for export in exports.iter_mut() {
        let unique = match export.exported_name() {
            Some(name) => per_name.get(name) == Some(&1),
            None => true,
        };
        export.safe = !export.conditional && unique;
    }
}

/// Fallback when an import has no binding: the file exports nothing unsafe
pub fn exports_safe(exports: &[ExportNode]) -> bool {
    exports.iter().all(|export| export.safe)
}

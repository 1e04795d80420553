//! Closure assembly
//!
//! Applies each file's replacement list over its original text and wraps the
//! result in a closure. Nested files are bundled recursively. Every file is
//! bundled at most once; later requests get the cached node back.

use std::rc::Rc;

use anyhow::Result;
use log::{debug, trace};
use rustc_hash::FxHashMap as HashMap;

use crate::{
    error::BundleError,
    file_registry::FileRegistry,
    names::NameAllocator,
    rewriter::Substitution,
    source_map::SourceNode,
    types::{FileId, TextRange},
};

pub struct Bundler<'a> {
    registry: &'a FileRegistry,
    names: &'a NameAllocator,
    /// Global module count; the root closure takes one parameter per module
    global_modules: usize,
    compiled: HashMap<FileId, Rc<SourceNode>>,
}

impl<'a> Bundler<'a> {
    pub fn new(registry: &'a FileRegistry, names: &'a NameAllocator, global_modules: usize) -> Self {
        Self {
            registry,
            names,
            global_modules,
            compiled: HashMap::default(),
        }
    }

    /// The uninvoked root closure taking the global modules as parameters
    pub fn bundle_root(&mut self) -> Result<Rc<SourceNode>> {
        let start = self.registry.start();
        self.bundle(start)
    }

    /// Closure of `id`: invoked for nested files, uninvoked for the root
    pub fn bundle(&mut self, id: FileId) -> Result<Rc<SourceNode>> {
        if let Some(node) = self.compiled.get(&id) {
            trace!("Reusing bundle of {id}");
            return Ok(Rc::clone(node));
        }

        let registry: &'a FileRegistry = self.registry;
        let file = registry.get(id);
        let rewrite = file.rewrite.as_ref().ok_or_else(|| {
            BundleError::invariant(format!("{} was bundled before being rewritten", file.path.display()))
        })?;

        let mut parts: Vec<Rc<SourceNode>> = Vec::new();
        let is_root = id == registry.start();
        if is_root {
            let params: Vec<String> = (0..self.global_modules)
                .map(|index| self.names.global_module(index))
                .collect();
            parts.push(SourceNode::generated(format!("(function({}) {{\n", params.join(", "))));
        } else {
            parts.push(SourceNode::generated("(function() {\n"));
        }

        let source = file.source.as_str();
        // Directives must stay first in the body
        let mut cursor = file.prologue_end.min(source.len());
        if cursor > 0 {
            parts.push(Rc::new(SourceNode::Original {
                file: id,
                offset: 0,
                text: source[..cursor].to_owned(),
            }));
            parts.push(SourceNode::generated("\n"));
        }
        if !rewrite.top.is_empty() {
            parts.push(SourceNode::generated(rewrite.top.clone()));
        }

        for replace in &rewrite.replaces {
            let range = trim_whitespace(source, replace.range);
            if range.start < cursor {
                return Err(BundleError::invariant(format!(
                    "replacement {} in {} starts before {cursor}",
                    replace.range,
                    file.path.display()
                ))
                .into());
            }
            if range.start > cursor {
                parts.push(Rc::new(SourceNode::Original {
                    file: id,
                    offset: cursor,
                    text: source[cursor..range.start].to_owned(),
                }));
            }
            match &replace.substitution {
                Substitution::Text(text) => parts.push(Rc::new(SourceNode::Replacement {
                    file: id,
                    offset: range.start,
                    text: text.clone(),
                })),
                Substitution::File {
                    file: child,
                    before,
                    after,
                } => {
                    let nested = self.bundle(*child)?;
                    parts.push(Rc::new(SourceNode::Group(vec![
                        SourceNode::generated(before.clone()),
                        nested,
                        SourceNode::generated(after.clone()),
                    ])));
                }
            }
            cursor = range.end;
        }
        if cursor < source.len() {
            parts.push(Rc::new(SourceNode::Original {
                file: id,
                offset: cursor,
                text: source[cursor..].to_owned(),
            }));
        }

        let mut closing = String::from("\n");
        if !rewrite.bottom.is_empty() {
            closing.push_str(&rewrite.bottom);
            closing.push('\n');
        }
        closing.push_str(if is_root { "})" } else { "})()" });
        parts.push(SourceNode::generated(closing));

        debug!("Bundled {}", file.path.display());
        let node = Rc::new(SourceNode::Group(parts));
        self.compiled.insert(id, Rc::clone(&node));
        Ok(node)
    }
}

/// Shrink a non-empty range so surrounding whitespace inside it survives
fn trim_whitespace(source: &str, range: TextRange) -> TextRange {
    let Some(text) = source.get(range.start..range.end) else {
        return range;
    };
    if text.is_empty() {
        return range;
    }
    let leading = text.len() - text.trim_start().len();
    let trailing = text.len() - text.trim_end().len();
    if leading == text.len() {
        return TextRange::empty(range.start);
    }
    TextRange::new(range.start + leading, range.end - trailing)
}

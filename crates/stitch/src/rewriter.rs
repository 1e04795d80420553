//! Per-file rewrite decisions
//!
//! For every file the rewriter picks an output strategy for each import,
//! maps each export target onto an in-closure variable, decides which
//! declarators become dead, and emits one sorted, non-overlapping list of
//! [`Replace`] instructions plus the closure's top and bottom text.

use std::fmt::Write as _;

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace};

use crate::{
    dependency_graph::files_in_order,
    error::BundleError,
    extractor::{SourceKind, exports_safe},
    file_registry::{FileRegistry, SourceFile},
    names::NameAllocator,
    nodes::{ExportStyle, ImportNode, ImportTarget},
    types::{FileId, TextRange},
};

/// What a replaced range becomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    Text(String),
    /// Another file's closure, wrapped in literal text
    File {
        file: FileId,
        before: String,
        after: String,
    },
}

/// One text splice over the original source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub range: TextRange,
    pub substitution: Substitution,
    /// Orders zero-width insertions at the same position
    pub secondary: usize,
}

impl Replace {
    fn text(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            substitution: Substitution::Text(text.into()),
            secondary: 0,
        }
    }

    fn delete(range: TextRange) -> Self {
        Self::text(range, "")
    }
}

/// How one import site is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// The target closure replaces the call
    SingleInline,
    /// `(T = closure)` at the first import, `T` afterwards
    HoistedAssign,
    /// Like [`Self::HoistedAssign`], with the declared variable renamed to `T`
    HoistedAssignAndRename,
    /// Declarator elided, references renamed to `T`
    Rename,
    /// The call becomes `T`
    BareReference,
}

/// Everything the bundler needs to emit one file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewriteData {
    pub replaces: Vec<Replace>,
    pub top: String,
    pub bottom: String,
    /// One entry per import, in import order
    pub strategies: Vec<ImportStrategy>,
    /// Children whose closure is placed at an import site instead of the top
    pub defined: IndexSet<FileId>,
}

/// In-closure variables that `exports`, `this` and `module.exports` map to
struct ExportScheme {
    exports_var: String,
    module_exports_var: String,
    top: String,
    bottom: String,
}

/// Storage and accessor declarations for every circular file, placed at the
/// top of the root closure
pub fn circular_declarations(registry: &FileRegistry, names: &NameAllocator) -> String {
    let members: Vec<FileId> = registry
        .files()
        .iter()
        .filter(|file| file.circular)
        .map(|file| file.id)
        .collect();
    if members.is_empty() {
        return String::new();
    }

    let storage: Vec<String> = members
        .iter()
        .map(|&id| format!("{} = {{}}", names.circular_storage(id)))
        .collect();
    let mut out = format!("var {};\n", storage.join(", "));
    for &id in &members {
        let _ = writeln!(
            out,
            "function {}() {{ return {}; }}",
            names.file_var(id),
            names.circular_storage(id)
        );
    }
    out
}

struct FileRewriter<'a> {
    registry: &'a FileRegistry,
    names: &'a NameAllocator,
    file: &'a SourceFile,
    replaces: Vec<Replace>,
    defined: IndexSet<FileId>,
    /// `var T;` lines for hoisted assignments
    hoisted: Vec<String>,
    /// Imports whose declarator is removed
    elided: Vec<usize>,
    strategies: Vec<ImportStrategy>,
}

impl<'a> FileRewriter<'a> {
    fn new(registry: &'a FileRegistry, names: &'a NameAllocator, file: &'a SourceFile) -> Self {
        Self {
            registry,
            names,
            file,
            replaces: Vec::new(),
            defined: IndexSet::new(),
            hoisted: Vec::new(),
            elided: Vec::new(),
            strategies: Vec::with_capacity(file.imports.len()),
        }
    }

    fn rewrite(mut self) -> Result<RewriteData> {
        if self.file.kind == SourceKind::Json {
            let end = self.file.source.len();
            self.replaces.push(Replace::text(TextRange::empty(0), "return ("));
            self.replaces.push(Replace::text(TextRange::empty(end), ");"));
            let top = self.root_declarations();
            self.insert_children();
            return self.finish(top, String::new());
        }

        let scheme = self.export_scheme();
        self.rewrite_exports(&scheme);
        for index in 0..self.file.imports.len() {
            let strategy = self.rewrite_import(index);
            trace!(
                "{}: require('{}') -> {strategy:?}",
                self.file.path.display(),
                self.file.imports[index].specifier
            );
            self.strategies.push(strategy);
        }
        self.elide_declarators();
        self.insert_children();

        let mut top = self.root_declarations();
        top.push_str(&scheme.top);
        for line in &self.hoisted {
            top.push_str(line);
        }
        let bottom = scheme.bottom.clone();
        self.finish(top, bottom)
    }

    fn finish(mut self, top: String, bottom: String) -> Result<RewriteData> {
        self.replaces.sort_by(|a, b| {
            (a.range.start, a.range.end, a.secondary).cmp(&(b.range.start, b.range.end, b.secondary))
        });
        for pair in self.replaces.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.range.start < a.range.end {
                return Err(BundleError::invariant(format!(
                    "overlapping replacements {} and {} in {}",
                    a.range,
                    b.range,
                    self.file.path.display()
                ))
                .into());
            }
        }

        Ok(RewriteData {
            replaces: self.replaces,
            top,
            bottom,
            strategies: self.strategies,
            defined: self.defined,
        })
    }

    fn root_declarations(&self) -> String {
        if self.file.id == self.registry.start() {
            circular_declarations(self.registry, self.names)
        } else {
            String::new()
        }
    }

    fn export_scheme(&self) -> ExportScheme {
        let exports_var = self.names.exports_var();
        if self.file.circular {
            let storage = self.names.circular_storage(self.file.id);
            return ExportScheme {
                top: format!("var {exports_var} = {storage};\n"),
                bottom: format!("return {storage};"),
                exports_var,
                module_exports_var: storage,
            };
        }

        let exports = &self.file.exports;
        let full = exports.iter().any(|export| export.is_full());
        let other = exports.iter().any(|export| !export.is_full());
        if full && other {
            let module_exports_var = self.names.module_exports_var();
            ExportScheme {
                top: format!("var {exports_var} = {{}}, {module_exports_var} = {exports_var};\n"),
                bottom: format!("return {module_exports_var};"),
                exports_var,
                module_exports_var,
            }
        } else {
            ExportScheme {
                top: format!("var {exports_var} = {{}};\n"),
                bottom: format!("return {exports_var};"),
                module_exports_var: exports_var.clone(),
                exports_var,
            }
        }
    }

    fn rewrite_exports(&mut self, scheme: &ExportScheme) {
        for export in &self.file.exports {
            let variable = match export.style {
                ExportStyle::ModuleExports => &scheme.module_exports_var,
                ExportStyle::Exports | ExportStyle::This => &scheme.exports_var,
            };
            let text = if export.shorthand {
                format!("exports: {variable}")
            } else {
                variable.clone()
            };
            self.replaces.push(Replace::text(export.target, text));
        }
    }

    /// Expression that evaluates to the exports of `target` from inside this file
    fn reference_to(&self, target: FileId) -> String {
        let name = self.names.file_var(target);
        if self.registry.get(target).circular {
            format!("{name}()")
        } else {
            name
        }
    }

    fn binding_safe(&self, import: &ImportNode, target: &SourceFile) -> bool {
        match import.binding {
            Some(binding) => self.registry.bindings[binding.index()].safe,
            None => exports_safe(&target.exports),
        }
    }

    fn rewrite_import(&mut self, index: usize) -> ImportStrategy {
        let file: &'a SourceFile = self.file;
        let import = &file.imports[index];
        let target_id = match import.target {
            Some(ImportTarget::File(id)) => id,
            Some(ImportTarget::Global(global)) => {
                self.replaces
                    .push(Replace::text(import.call, self.names.global_module(global)));
                return ImportStrategy::BareReference;
            }
            // Unresolved imports never reach the rewriter
            None => return ImportStrategy::BareReference,
        };

        let registry: &'a FileRegistry = self.registry;
        let target = registry.get(target_id);
        let own_child = target.structure_parent == Some(self.file.id);
        let binding_safe = self.binding_safe(import, target);
        let renamable = import.safe && import.dot_path.is_empty() && binding_safe;

        if own_child
            && !target.circular
            && binding_safe
            && import.runs_at_most_once()
            && !self.defined.contains(&target_id)
            && registry.import_site_count(target_id) == 1
        {
            self.defined.insert(target_id);
            self.replaces.push(Replace {
                range: import.call,
                substitution: Substitution::File {
                    file: target_id,
                    before: "(".to_owned(),
                    after: ")".to_owned(),
                },
                secondary: 0,
            });
            return ImportStrategy::SingleInline;
        }

        let variable = self.names.file_var(target_id);
        if own_child
            && !target.circular
            && binding_safe
            && !self.defined.contains(&target_id)
            && target.dependants.len() == 1
            && target.dependants.contains(&self.file.id)
            && self.imports_of(target_id).all(|other| {
                other.top_level_index.is_some() && !other.conditional
            })
        {
            self.defined.insert(target_id);
            if renamable {
                if let Some(declaration) = &import.declaration {
                    self.replaces
                        .push(Replace::text(declaration.binding_range, variable.clone()));
                }
                self.replaces.push(Replace {
                    range: import.call,
                    substitution: Substitution::File {
                        file: target_id,
                        before: "(".to_owned(),
                        after: ")".to_owned(),
                    },
                    secondary: 0,
                });
                self.rename_references(import, &variable);
                return ImportStrategy::HoistedAssignAndRename;
            }

            self.hoisted.push(format!("var {variable};\n"));
            self.replaces.push(Replace {
                range: import.call,
                substitution: Substitution::File {
                    file: target_id,
                    before: format!("({variable} = "),
                    after: ")".to_owned(),
                },
                secondary: 0,
            });
            return ImportStrategy::HoistedAssign;
        }

        let reference = self.reference_to(target_id);
        if renamable {
            self.elided.push(index);
            self.rename_references(import, &reference);
            return ImportStrategy::Rename;
        }

        self.replaces.push(Replace::text(import.call, reference));
        ImportStrategy::BareReference
    }

    fn imports_of(&self, target: FileId) -> impl Iterator<Item = &'a ImportNode> + '_ {
        let file: &'a SourceFile = self.file;
        file.imports
            .iter()
            .filter(move |import| import.target_file() == Some(target))
    }

    fn rename_references(&mut self, import: &ImportNode, replacement: &str) {
        let Some(declaration) = &import.declaration else {
            return;
        };
        for reference in &import.references {
            let text = if reference.shorthand {
                format!("{}: {replacement}", declaration.name)
            } else {
                replacement.to_owned()
            };
            self.replaces.push(Replace::text(reference.range, text));
        }
    }

    /// Remove elided declarators, keeping the comma structure of shared
    /// statements valid
    fn elide_declarators(&mut self) {
        let mut by_statement: IndexMap<TextRange, (Vec<TextRange>, Vec<usize>)> = IndexMap::new();
        for &index in &self.elided {
            let Some(declaration) = &self.file.imports[index].declaration else {
                continue;
            };
            by_statement
                .entry(declaration.statement)
                .or_insert_with(|| (declaration.siblings.clone(), Vec::new()))
                .1
                .push(declaration.position);
        }

        for (statement, (siblings, mut positions)) in by_statement {
            positions.sort_unstable();
            positions.dedup();
            if positions.len() == siblings.len() {
                self.replaces.push(Replace::delete(statement));
                continue;
            }

            let Some(last_kept) = (0..siblings.len()).rev().find(|i| !positions.contains(i)) else {
                continue;
            };
            for &position in &positions {
                if position < last_kept {
                    self.replaces.push(Replace::delete(TextRange::new(
                        siblings[position].start,
                        siblings[position + 1].start,
                    )));
                }
            }
            if positions.iter().any(|&position| position > last_kept) {
                self.replaces.push(Replace::delete(TextRange::new(
                    siblings[last_kept].end,
                    siblings[siblings.len() - 1].end,
                )));
            }
        }
    }

    /// Structural children not placed at an import site go to the top of
    /// the body, after any directives, in order
    fn insert_children(&mut self) {
        let at = TextRange::empty(self.file.prologue_end);
        for &child in &self.file.structure_children {
            if self.defined.contains(&child) {
                continue;
            }
            let child_file = self.registry.get(child);
            let before = if child_file.circular {
                String::new()
            } else {
                format!("var {} = ", self.names.file_var(child))
            };
            self.replaces.push(Replace {
                range: at,
                substitution: Substitution::File {
                    file: child,
                    before,
                    after: ";\n".to_owned(),
                },
                secondary: 1 + child_file.order_index,
            });
        }
    }
}

pub fn rewrite_file(
    registry: &FileRegistry,
    names: &NameAllocator,
    id: FileId,
) -> Result<RewriteData> {
    FileRewriter::new(registry, names, registry.get(id)).rewrite()
}

/// Compute and store the rewrite data of every file
pub fn rewrite_all(registry: &mut FileRegistry, names: &NameAllocator) -> Result<()> {
    let mut rewritten = Vec::with_capacity(registry.len());
    for id in files_in_order(registry) {
        let data = rewrite_file(registry, names, id)?;
        debug!(
            "{}: {} replacements, strategies {:?}",
            registry.get(id).path.display(),
            data.replaces.len(),
            data.strategies
        );
        rewritten.push((id, data));
    }
    for (id, data) in rewritten {
        registry.get_mut(id).rewrite = Some(data);
    }
    info!("Rewrote {} files", registry.len());
    Ok(())
}

//! Import and export records extracted from one source file
//!
//! These are plain data: byte ranges into the original text plus the flags
//! the rewriter needs. Nothing here refers to parser types.

use crate::types::{BindingId, FileId, SymbolId, TextRange};

/// Which spelling of the export object an export site uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStyle {
    /// `exports`
    Exports,
    /// `module.exports`
    ModuleExports,
    /// top-level `this`
    This,
}

/// How an export site touches the export object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportShape {
    /// `module.exports = value`, replacing the whole object
    Full,
    /// `exports.name = value` and deeper paths
    Property,
    /// The target escapes, e.g. passed to a function or read
    Unknown,
}

/// What an import resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportTarget {
    File(FileId),
    /// Index into the configured global module list
    Global(usize),
}

/// An occurrence of the symbol declared by a simple import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolReference {
    pub range: TextRange,
    /// Written as `{ name }`, so a rename must keep the property key
    pub shorthand: bool,
    pub binding: Option<BindingId>,
}

/// The `var x = require(...)` declarator that makes an import "simple"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    pub symbol: SymbolId,
    pub name: String,
    /// Binding identifier span, excluded from the reference list
    pub binding_range: TextRange,
    pub declarator: TextRange,
    /// The whole `var ...` declaration holding the declarator
    pub statement: TextRange,
    /// Every declarator of `statement`, in source order
    pub siblings: Vec<TextRange>,
    /// Position of `declarator` within `siblings`
    pub position: usize,
}

/// One `require('...')` site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportNode {
    /// The literal module reference
    pub specifier: String,
    /// The `require(...)` call itself
    pub call: TextRange,
    /// The call plus any trailing property accesses
    pub expression: TextRange,
    /// Property accesses applied to the result, `require('x').a.b` gives `[a, b]`
    pub dot_path: Vec<String>,
    pub declaration: Option<ImportDeclaration>,
    pub references: Vec<SymbolReference>,
    pub conditional: bool,
    pub in_function: bool,
    pub in_loop: bool,
    /// Index of the enclosing top-level statement when the site runs
    /// unconditionally at module level
    pub top_level_index: Option<usize>,
    pub safe: bool,
    pub target: Option<ImportTarget>,
    pub binding: Option<BindingId>,
}

impl ImportNode {
    pub fn is_simple(&self) -> bool {
        self.declaration.is_some()
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level_index.is_some()
    }

    /// Executed at most once per evaluation of the file
    pub fn runs_at_most_once(&self) -> bool {
        !self.in_function && !self.in_loop
    }

    pub fn target_file(&self) -> Option<FileId> {
        match self.target {
            Some(ImportTarget::File(id)) => Some(id),
            _ => None,
        }
    }
}

/// One site that writes to or exposes the export object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNode {
    pub style: ExportStyle,
    pub shape: ExportShape,
    /// The whole assignment, or the target chain for unknown shapes
    pub range: TextRange,
    /// `exports`, `module.exports` or `this`
    pub target: TextRange,
    pub dot_path: Vec<String>,
    /// Right-hand side of the assignment
    pub value: Option<TextRange>,
    pub compound: bool,
    /// Written as `{ exports }`, so the replacement must keep the key
    pub shorthand: bool,
    pub conditional: bool,
    pub top_level_index: Option<usize>,
    pub safe: bool,
    pub binding: Option<BindingId>,
}

impl ExportNode {
    /// Name of the binding this export contributes to; `None` is the whole module
    pub fn exported_name(&self) -> Option<&str> {
        match self.shape {
            ExportShape::Full => None,
            ExportShape::Property | ExportShape::Unknown => {
                self.dot_path.first().map(String::as_str)
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.shape == ExportShape::Full
    }
}

/// Everything the parser adapter extracts from one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedNodes {
    pub imports: Vec<ImportNode>,
    pub exports: Vec<ExportNode>,
    /// Offset just past the last directive (`'use strict';`), 0 without one
    pub prologue_end: usize,
}

//! AST visitors over swc scripts
//!
//! This module is the only place that inspects swc node kinds. It reduces every
//! interesting expression to a [`Site`] and hands plain records with byte
//! ranges to the rest of the crate.

mod reference_collector;
mod site_collector;

use swc_common::{BytePos, Mark, SourceMap, Span, Spanned, sync::Lrc};
use swc_ecma_ast::{CallExpr, Callee, Expr, ExprOrSpread, Id, Ident, Lit, MemberExpr, MemberProp};
use rustc_hash::FxHashMap;

pub(crate) use reference_collector::ReferenceCollector;
pub(crate) use site_collector::SiteCollector;

use crate::{
    nodes::ExportStyle,
    types::{SymbolId, TextRange},
};

/// Answers scope questions about identifiers after the swc resolver pass
pub(crate) struct SymbolOracle {
    source_map: Lrc<SourceMap>,
    start_pos: BytePos,
    unresolved_mark: Mark,
    symbols: FxHashMap<Id, SymbolId>,
}

impl std::fmt::Debug for SymbolOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolOracle")
            .field("symbols", &self.symbols.len())
            .finish_non_exhaustive()
    }
}

impl SymbolOracle {
    pub(crate) fn new(source_map: Lrc<SourceMap>, start_pos: BytePos, unresolved_mark: Mark) -> Self {
        Self {
            source_map,
            start_pos,
            unresolved_mark,
            symbols: FxHashMap::default(),
        }
    }

    /// True when the identifier refers to no declaration in the file
    pub(crate) fn is_unbound(&self, ident: &Ident) -> bool {
        ident.ctxt.outer() == self.unresolved_mark
    }

    /// Stable identity of the declaration `ident` refers to
    pub(crate) fn intern(&mut self, ident: &Ident) -> SymbolId {
        let next = SymbolId::new(self.symbols.len() as u32);
        *self.symbols.entry(ident.to_id()).or_insert(next)
    }

    /// Identity of `ident` if its declaration was interned before
    pub(crate) fn lookup(&self, ident: &Ident) -> Option<SymbolId> {
        self.symbols.get(&ident.to_id()).copied()
    }

    pub(crate) fn range(&self, span: Span) -> TextRange {
        let base = self.start_pos.0;
        TextRange::new(
            span.lo.0.saturating_sub(base) as usize,
            span.hi.0.saturating_sub(base) as usize,
        )
    }

    /// 1-based line and column of a position
    pub(crate) fn location(&self, pos: BytePos) -> (usize, usize) {
        let loc = self.source_map.lookup_char_pos(pos);
        (loc.line, loc.col_display + 1)
    }
}

/// Lexical context the walker is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeElement {
    Function,
    Arrow,
    Class,
    Accessor,
    Branch,
    Loop,
    ShortCircuit,
}

impl ScopeElement {
    fn is_function_like(self) -> bool {
        matches!(
            self,
            Self::Function | Self::Arrow | Self::Class | Self::Accessor
        )
    }

    /// Arrows keep the enclosing `this`
    fn rebinds_this(self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Accessor)
    }
}

/// Flags derived from a scope stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScopeFlags {
    pub(crate) conditional: bool,
    pub(crate) in_function: bool,
    pub(crate) in_loop: bool,
    pub(crate) this_rebound: bool,
}

impl ScopeFlags {
    pub(crate) fn of(stack: &[ScopeElement]) -> Self {
        Self {
            conditional: !stack.is_empty(),
            in_function: stack.iter().any(|e| e.is_function_like()),
            in_loop: stack.contains(&ScopeElement::Loop),
            this_rebound: stack.iter().any(|e| e.rebinds_this()),
        }
    }
}

/// A `require('...')` call, possibly followed by property accesses
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportMatch {
    pub(crate) specifier: String,
    pub(crate) call: Span,
    pub(crate) expression: Span,
    pub(crate) dot_path: Vec<String>,
}

/// `exports`, `module.exports` or `this`, possibly followed by property accesses
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExportPath {
    pub(crate) style: ExportStyle,
    pub(crate) target: Span,
    pub(crate) dot_path: Vec<String>,
}

/// Classification of one expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Site {
    Import(ImportMatch),
    Export(ExportPath),
    Other,
}

/// A `require` call that cannot be bundled
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SiteError {
    pub(crate) span: Span,
    pub(crate) message: String,
}

pub(crate) fn classify(
    oracle: &SymbolOracle,
    expr: &Expr,
    this_allowed: bool,
) -> Result<Site, SiteError> {
    if let Some(found) = match_import(oracle, expr)? {
        return Ok(Site::Import(found));
    }
    Ok(match_export(oracle, expr, this_allowed).map_or(Site::Other, Site::Export))
}

pub(crate) fn match_import(
    oracle: &SymbolOracle,
    expr: &Expr,
) -> Result<Option<ImportMatch>, SiteError> {
    match expr {
        Expr::Call(call) => match_require_call(oracle, call),
        Expr::Member(member) => {
            let MemberProp::Ident(prop) = &member.prop else {
                return Ok(None);
            };
            let Some(mut found) = match_import(oracle, &member.obj)? else {
                return Ok(None);
            };
            found.dot_path.push(prop.sym.to_string());
            found.expression = member.span;
            Ok(Some(found))
        }
        _ => Ok(None),
    }
}

fn match_require_call(
    oracle: &SymbolOracle,
    call: &CallExpr,
) -> Result<Option<ImportMatch>, SiteError> {
    let Callee::Expr(callee) = &call.callee else {
        return Ok(None);
    };
    let Expr::Ident(ident) = &**callee else {
        return Ok(None);
    };
    if &*ident.sym != "require" || !oracle.is_unbound(ident) {
        return Ok(None);
    }

    match call.args.as_slice() {
        [ExprOrSpread { spread: None, expr }] => match &**expr {
            Expr::Lit(Lit::Str(literal)) => Ok(Some(ImportMatch {
                specifier: literal.value.to_string(),
                call: call.span,
                expression: call.span,
                dot_path: Vec::new(),
            })),
            other => Err(SiteError {
                span: other.span(),
                message: "the argument of require() must be a string literal".to_owned(),
            }),
        },
        args => Err(SiteError {
            span: call.span,
            message: format!(
                "require() takes exactly one string literal argument, found {}",
                args.len()
            ),
        }),
    }
}

pub(crate) fn match_export(
    oracle: &SymbolOracle,
    expr: &Expr,
    this_allowed: bool,
) -> Option<ExportPath> {
    match expr {
        Expr::Ident(ident) if is_free_exports(oracle, ident) => Some(ExportPath {
            style: ExportStyle::Exports,
            target: ident.span,
            dot_path: Vec::new(),
        }),
        Expr::This(this) if this_allowed => Some(ExportPath {
            style: ExportStyle::This,
            target: this.span,
            dot_path: Vec::new(),
        }),
        Expr::Member(member) => match_export_member(oracle, member, this_allowed),
        Expr::Paren(paren) => match_export(oracle, &paren.expr, this_allowed),
        _ => None,
    }
}

pub(crate) fn match_export_member(
    oracle: &SymbolOracle,
    member: &MemberExpr,
    this_allowed: bool,
) -> Option<ExportPath> {
    let MemberProp::Ident(prop) = &member.prop else {
        return None;
    };

    if &*prop.sym == "exports"
        && let Expr::Ident(object) = &*member.obj
        && &*object.sym == "module"
        && oracle.is_unbound(object)
    {
        return Some(ExportPath {
            style: ExportStyle::ModuleExports,
            target: member.span,
            dot_path: Vec::new(),
        });
    }

    let mut path = match_export(oracle, &member.obj, this_allowed)?;
    path.dot_path.push(prop.sym.to_string());
    Some(path)
}

pub(crate) fn is_free_exports(oracle: &SymbolOracle, ident: &Ident) -> bool {
    &*ident.sym == "exports" && oracle.is_unbound(ident)
}

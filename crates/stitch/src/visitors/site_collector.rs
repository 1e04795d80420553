//! First walk: finds `require` sites and export sites with their execution context

use swc_ecma_ast::{
    ArrowExpr, AssignExpr, AssignOp, AssignTarget, BinExpr, BinaryOp, Class, CondExpr,
    DoWhileStmt, Expr, ForInStmt, ForOfStmt, ForStmt, Function, GetterProp, IfStmt, Lit, Pat,
    Prop, Script, SetterProp, SimpleAssignTarget, Stmt, SwitchStmt, TryStmt, VarDecl, WhileStmt,
};
use swc_common::Spanned;
use swc_ecma_visit::{Visit, VisitWith};

use super::{
    ExportPath, ImportMatch, ScopeElement, ScopeFlags, Site, SiteError, SymbolOracle, classify,
    is_free_exports, match_export, match_export_member, match_import,
};
use crate::{
    nodes::{ExportNode, ExportShape, ExportStyle, ExtractedNodes, ImportDeclaration, ImportNode},
    types::TextRange,
};

pub(crate) struct SiteCollector<'a> {
    oracle: &'a mut SymbolOracle,
    /// Current scope stack
    scope_stack: Vec<ScopeElement>,
    /// Index of the top-level statement being walked
    statement_index: usize,
    imports: Vec<ImportNode>,
    exports: Vec<ExportNode>,
    /// First unsupported site; stops all further recording
    error: Option<SiteError>,
}

impl<'a> SiteCollector<'a> {
    pub(crate) fn new(oracle: &'a mut SymbolOracle) -> Self {
        Self {
            oracle,
            scope_stack: Vec::new(),
            statement_index: 0,
            imports: Vec::new(),
            exports: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn collect(mut self, script: &Script) -> Result<ExtractedNodes, SiteError> {
        for (index, stmt) in script.body.iter().enumerate() {
            self.statement_index = index;
            stmt.visit_with(&mut self);
            if let Some(err) = self.error.take() {
                return Err(err);
            }
        }
        Ok(ExtractedNodes {
            prologue_end: self.prologue_end(script),
            imports: self.imports,
            exports: self.exports,
        })
    }

    /// End of the leading run of string literal statements
    fn prologue_end(&self, script: &Script) -> usize {
        script
            .body
            .iter()
            .take_while(|stmt| match stmt {
                Stmt::Expr(expr) => matches!(&*expr.expr, Expr::Lit(Lit::Str(_))),
                _ => false,
            })
            .last()
            .map_or(0, |stmt| self.range(stmt.span()).end)
    }

    fn flags(&self) -> ScopeFlags {
        ScopeFlags::of(&self.scope_stack)
    }

    fn top_level_index(&self) -> Option<usize> {
        self.scope_stack.is_empty().then_some(self.statement_index)
    }

    fn within<F>(&mut self, element: ScopeElement, walk: F)
    where
        F: FnOnce(&mut Self),
    {
        self.scope_stack.push(element);
        walk(self);
        self.scope_stack.pop();
    }

    fn range(&self, span: swc_common::Span) -> TextRange {
        self.oracle.range(span)
    }

    fn push_import(&mut self, found: ImportMatch, declaration: Option<ImportDeclaration>) {
        let flags = self.flags();
        self.imports.push(ImportNode {
            specifier: found.specifier,
            call: self.range(found.call),
            expression: self.range(found.expression),
            dot_path: found.dot_path,
            declaration,
            references: Vec::new(),
            conditional: flags.conditional,
            in_function: flags.in_function,
            in_loop: flags.in_loop,
            top_level_index: self.top_level_index(),
            safe: false,
            target: None,
            binding: None,
        });
    }

    fn push_export(
        &mut self,
        path: ExportPath,
        shape: ExportShape,
        range: TextRange,
        value: Option<TextRange>,
        compound: bool,
        shorthand: bool,
    ) {
        let flags = self.flags();
        self.exports.push(ExportNode {
            style: path.style,
            shape,
            range,
            target: self.range(path.target),
            dot_path: path.dot_path,
            value,
            compound,
            shorthand,
            conditional: flags.conditional,
            top_level_index: self.top_level_index(),
            safe: false,
            binding: None,
        });
    }

    fn fail(&mut self, err: SiteError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn export_target(&self, target: &AssignTarget) -> Option<ExportPath> {
        let this_allowed = !self.flags().this_rebound;
        match target {
            AssignTarget::Simple(SimpleAssignTarget::Ident(binding))
                if is_free_exports(self.oracle, &binding.id) =>
            {
                Some(ExportPath {
                    style: ExportStyle::Exports,
                    target: binding.id.span,
                    dot_path: Vec::new(),
                })
            }
            AssignTarget::Simple(SimpleAssignTarget::Member(member)) => {
                match_export_member(self.oracle, member, this_allowed)
            }
            AssignTarget::Simple(SimpleAssignTarget::Paren(paren)) => {
                match_export(self.oracle, &paren.expr, this_allowed)
            }
            _ => None,
        }
    }

    fn visit_assign_value(&mut self, assign: &AssignExpr) {
        if matches!(
            assign.op,
            AssignOp::AndAssign | AssignOp::OrAssign | AssignOp::NullishAssign
        ) {
            self.within(ScopeElement::ShortCircuit, |this| assign.right.visit_with(this));
        } else {
            assign.right.visit_with(self);
        }
    }
}

impl Visit for SiteCollector<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if self.error.is_some() {
            return;
        }
        let this_allowed = !self.flags().this_rebound;
        match classify(self.oracle, expr, this_allowed) {
            Ok(Site::Import(found)) => self.push_import(found, None),
            Ok(Site::Export(path)) => {
                let range = self.range(expr.span());
                self.push_export(path, ExportShape::Unknown, range, None, false, false);
            }
            Ok(Site::Other) => expr.visit_children_with(self),
            Err(err) => self.fail(err),
        }
    }

    fn visit_prop(&mut self, prop: &Prop) {
        if let Prop::Shorthand(ident) = prop
            && is_free_exports(self.oracle, ident)
        {
            let path = ExportPath {
                style: ExportStyle::Exports,
                target: ident.span,
                dot_path: Vec::new(),
            };
            let range = self.range(ident.span);
            self.push_export(path, ExportShape::Unknown, range, None, false, true);
            return;
        }
        prop.visit_children_with(self);
    }

    fn visit_assign_expr(&mut self, assign: &AssignExpr) {
        if self.error.is_some() {
            return;
        }
        let Some(path) = self.export_target(&assign.left) else {
            assign.left.visit_with(self);
            self.visit_assign_value(assign);
            return;
        };

        let compound = assign.op != AssignOp::Assign;
        let shape = if !path.dot_path.is_empty() {
            ExportShape::Property
        } else if path.style != ExportStyle::ModuleExports {
            let spelling = if path.style == ExportStyle::This {
                "this"
            } else {
                "exports"
            };
            self.fail(SiteError {
                span: assign.span,
                message: format!(
                    "assigning to `{spelling}` does not replace the module exports; use `module.exports =`"
                ),
            });
            return;
        } else if compound {
            ExportShape::Unknown
        } else {
            ExportShape::Full
        };

        let range = self.range(assign.span);
        let value = Some(self.range(assign.right.span()));
        self.push_export(path, shape, range, value, compound, false);
        self.visit_assign_value(assign);
    }

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        let siblings: Vec<TextRange> = decl.decls.iter().map(|d| self.range(d.span)).collect();
        for (position, declarator) in decl.decls.iter().enumerate() {
            if self.error.is_some() {
                return;
            }
            if let (Pat::Ident(binding), Some(init)) = (&declarator.name, declarator.init.as_deref())
            {
                match match_import(self.oracle, init) {
                    Ok(Some(found)) => {
                        let declaration = ImportDeclaration {
                            symbol: self.oracle.intern(&binding.id),
                            name: binding.id.sym.to_string(),
                            binding_range: self.range(binding.id.span),
                            declarator: self.range(declarator.span),
                            statement: self.range(decl.span),
                            siblings: siblings.clone(),
                            position,
                        };
                        self.push_import(found, Some(declaration));
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        self.fail(err);
                        return;
                    }
                }
            }
            declarator.visit_with(self);
        }
    }

    fn visit_function(&mut self, function: &Function) {
        self.within(ScopeElement::Function, |this| function.visit_children_with(this));
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        self.within(ScopeElement::Arrow, |this| arrow.visit_children_with(this));
    }

    fn visit_class(&mut self, class: &Class) {
        self.within(ScopeElement::Class, |this| class.visit_children_with(this));
    }

    fn visit_getter_prop(&mut self, getter: &GetterProp) {
        self.within(ScopeElement::Accessor, |this| getter.visit_children_with(this));
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        self.within(ScopeElement::Accessor, |this| setter.visit_children_with(this));
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) {
        stmt.test.visit_with(self);
        self.within(ScopeElement::Branch, |this| {
            stmt.cons.visit_with(this);
            if let Some(alt) = &stmt.alt {
                alt.visit_with(this);
            }
        });
    }

    fn visit_cond_expr(&mut self, cond: &CondExpr) {
        cond.test.visit_with(self);
        self.within(ScopeElement::Branch, |this| {
            cond.cons.visit_with(this);
            cond.alt.visit_with(this);
        });
    }

    fn visit_switch_stmt(&mut self, stmt: &SwitchStmt) {
        stmt.discriminant.visit_with(self);
        self.within(ScopeElement::Branch, |this| stmt.cases.visit_with(this));
    }

    fn visit_try_stmt(&mut self, stmt: &TryStmt) {
        stmt.block.visit_with(self);
        if let Some(handler) = &stmt.handler {
            self.within(ScopeElement::Branch, |this| handler.visit_with(this));
        }
        if let Some(finalizer) = &stmt.finalizer {
            finalizer.visit_with(self);
        }
    }

    fn visit_bin_expr(&mut self, expr: &BinExpr) {
        match expr.op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing => {
                expr.left.visit_with(self);
                self.within(ScopeElement::ShortCircuit, |this| expr.right.visit_with(this));
            }
            _ => expr.visit_children_with(self),
        }
    }

    fn visit_while_stmt(&mut self, stmt: &WhileStmt) {
        self.within(ScopeElement::Loop, |this| stmt.visit_children_with(this));
    }

    fn visit_do_while_stmt(&mut self, stmt: &DoWhileStmt) {
        self.within(ScopeElement::Loop, |this| stmt.visit_children_with(this));
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) {
        if let Some(init) = &stmt.init {
            init.visit_with(self);
        }
        self.within(ScopeElement::Loop, |this| {
            if let Some(test) = &stmt.test {
                test.visit_with(this);
            }
            if let Some(update) = &stmt.update {
                update.visit_with(this);
            }
            stmt.body.visit_with(this);
        });
    }

    fn visit_for_in_stmt(&mut self, stmt: &ForInStmt) {
        stmt.right.visit_with(self);
        self.within(ScopeElement::Loop, |this| {
            stmt.left.visit_with(this);
            stmt.body.visit_with(this);
        });
    }

    fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
        stmt.right.visit_with(self);
        self.within(ScopeElement::Loop, |this| {
            stmt.left.visit_with(this);
            stmt.body.visit_with(this);
        });
    }
}

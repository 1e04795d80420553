//! Second walk: occurrences and reassignments of symbols declared by simple imports

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use swc_ecma_ast::{
    AssignExpr, AssignTarget, BindingIdent, ClassDecl, Expr, FnDecl, ForInStmt,
    ForOfStmt, Ident, Pat, Prop, SimpleAssignTarget, UpdateExpr, VarDeclarator,
};
use swc_ecma_visit::{Visit, VisitWith};

use super::SymbolOracle;
use crate::{
    nodes::SymbolReference,
    types::{SymbolId, TextRange},
};

pub(crate) struct ReferenceCollector<'a> {
    oracle: &'a SymbolOracle,
    /// Declaring identifiers, which are not references
    excluded: HashSet<TextRange>,
    references: HashMap<SymbolId, Vec<SymbolReference>>,
    reassigned: HashSet<SymbolId>,
    initialized: HashMap<SymbolId, usize>,
    /// Binding identifiers visited now are written to
    in_write_pattern: bool,
}

impl<'a> ReferenceCollector<'a> {
    pub(crate) fn new(oracle: &'a SymbolOracle, excluded: HashSet<TextRange>) -> Self {
        Self {
            oracle,
            excluded,
            references: HashMap::default(),
            reassigned: HashSet::default(),
            initialized: HashMap::default(),
            in_write_pattern: false,
        }
    }

    pub(crate) fn finish(
        self,
    ) -> (
        HashMap<SymbolId, Vec<SymbolReference>>,
        HashSet<SymbolId>,
    ) {
        (self.references, self.reassigned)
    }

    fn mark_reassigned(&mut self, ident: &Ident) {
        if let Some(symbol) = self.oracle.lookup(ident) {
            self.reassigned.insert(symbol);
        }
    }

    fn record(&mut self, ident: &Ident, shorthand: bool) {
        let Some(symbol) = self.oracle.lookup(ident) else {
            return;
        };
        let range = self.oracle.range(ident.span);
        if self.excluded.contains(&range) {
            return;
        }
        self.references
            .entry(symbol)
            .or_default()
            .push(SymbolReference {
                range,
                shorthand,
                binding: None,
            });
    }

    fn visit_written<T: VisitWith<Self>>(&mut self, node: &T) {
        let saved = std::mem::replace(&mut self.in_write_pattern, true);
        node.visit_with(self);
        self.in_write_pattern = saved;
    }
}

impl Visit for ReferenceCollector<'_> {
    fn visit_ident(&mut self, ident: &Ident) {
        self.record(ident, false);
    }

    fn visit_binding_ident(&mut self, binding: &BindingIdent) {
        if self.in_write_pattern {
            self.mark_reassigned(&binding.id);
        }
        binding.visit_children_with(self);
    }

    fn visit_prop(&mut self, prop: &Prop) {
        if let Prop::Shorthand(ident) = prop {
            self.record(ident, true);
            return;
        }
        prop.visit_children_with(self);
    }

    fn visit_assign_expr(&mut self, assign: &AssignExpr) {
        match &assign.left {
            AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => {
                self.mark_reassigned(&binding.id);
                binding.visit_with(self);
            }
            AssignTarget::Pat(pattern) => self.visit_written(pattern),
            AssignTarget::Simple(other) => other.visit_with(self),
        }
        assign.right.visit_with(self);
    }

    fn visit_update_expr(&mut self, update: &UpdateExpr) {
        if let Expr::Ident(ident) = &*update.arg {
            self.mark_reassigned(ident);
        }
        update.visit_children_with(self);
    }

    fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
        match &declarator.name {
            Pat::Ident(binding) if declarator.init.is_some() => {
                if let Some(symbol) = self.oracle.lookup(&binding.id) {
                    let count = self.initialized.entry(symbol).or_default();
                    *count += 1;
                    if *count > 1 {
                        self.reassigned.insert(symbol);
                    }
                }
                binding.visit_with(self);
            }
            pattern if declarator.init.is_some() => self.visit_written(pattern),
            pattern => pattern.visit_with(self),
        }
        if let Some(init) = &declarator.init {
            init.visit_with(self);
        }
    }

    fn visit_for_in_stmt(&mut self, stmt: &ForInStmt) {
        self.visit_written(&stmt.left);
        stmt.right.visit_with(self);
        stmt.body.visit_with(self);
    }

    fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
        self.visit_written(&stmt.left);
        stmt.right.visit_with(self);
        stmt.body.visit_with(self);
    }

    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        self.mark_reassigned(&decl.ident);
        decl.function.visit_with(self);
    }

    fn visit_class_decl(&mut self, decl: &ClassDecl) {
        self.mark_reassigned(&decl.ident);
        decl.class.visit_with(self);
    }
}

// Copyright (c) 2024-2026 The shannon developers

//! A convenience layer for evaluating snippets of source text.
//!
//! A [`ScriptSession`] keeps one growing scope. Each snippet handed to
//! [`eval`](ScriptSession::eval) is classified as a parameter declaration,
//! function declaration, variable declaration, or expression; declarations
//! accumulate in the scope for later snippets to use, and expressions (and
//! initializers) evaluate to constant values immediately.

use crate::binder::Binder;
use crate::compilation::{Compilation, GlobalArenas};
use crate::eval::ConstantValue;
use crate::symbols::*;
use shannon_common::errors::{DiagBuilder2, DiagEmitter, Diagnostics};
use shannon_common::name::get_name_table;
use shannon_common::source::INVALID_SPAN;
use shannon_syntax::ast;
use shannon_syntax::parser;
use shannon_syntax::preproc::Preprocessor;
use std::cell::Cell;
use std::cell::RefCell;

/// An interactive session evaluating one snippet at a time.
pub struct ScriptSession<'t> {
    cx: Compilation<'t>,
    scope: SymbolId,
}

impl<'t> ScriptSession<'t> {
    pub fn new(arena: &'t GlobalArenas<'t>) -> ScriptSession<'t> {
        let cx = Compilation::new(arena);
        let root = cx.root();
        let scope = cx.alloc_symbol(
            get_name_table().intern("$session"),
            INVALID_SPAN,
            Some(root),
            SymbolKind::CompilationUnit(Scope::new(Vec::new())),
        );
        // There is no deferred syntax; snippets are symbolized as they
        // arrive.
        if let Some(sc) = scope_of(&cx.symbol(scope)) {
            sc.materialized.set(true);
        }
        ScriptSession { cx, scope }
    }

    /// The underlying compilation, for inspecting symbols and types.
    pub fn compilation(&self) -> &Compilation<'t> {
        &self.cx
    }

    /// The diagnostics accumulated so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.cx.diag
    }

    /// Evaluate one snippet. Declarations return `None` and stay visible
    /// for later snippets; expressions and initialized declarations return
    /// their constant value.
    pub fn eval(&mut self, text: &str) -> Option<ConstantValue> {
        let first_word: String = text
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        match first_word.as_str() {
            "parameter" | "localparam" => self.eval_declaration(text, false),
            "typedef" | "import" | "function" | "task" => self.eval_declaration(text, true),
            "const" | "var" | "int" | "integer" | "logic" | "bit" | "reg" | "byte"
            | "shortint" | "longint" | "time" | "real" | "shortreal" | "realtime" | "string"
            | "enum" | "struct" | "union" => self.eval_var_declaration(text),
            _ => self.eval_expression(text),
        }
    }

    fn parse_member(&self, text: &str) -> Option<ast::Item> {
        // Snippets conventionally omit the trailing semicolon.
        let trimmed = text.trim_end();
        let text = if trimmed.ends_with(';')
            || trimmed.ends_with("endfunction")
            || trimmed.ends_with("endtask")
        {
            trimmed.to_string()
        } else {
            format!("{};", trimmed)
        };
        let source = shannon_syntax::add_snippet_source(&text);
        let pp = Preprocessor::new(source, &self.cx.diag);
        let (item, _) = parser::parse_member(pp, &self.cx.diag);
        item
    }

    fn eval_declaration(&mut self, text: &str, quiet: bool) -> Option<ConstantValue> {
        let item = self.parse_member(text)?;
        let scope_sym = self.cx.symbol(self.scope);
        let scope = scope_of(&scope_sym)?;
        let before: Vec<SymbolId> = scope.members.borrow().clone();
        self.cx.symbolize_item(self.scope, scope, &item);
        if quiet {
            return None;
        }
        // Report the value of the last parameter the snippet declared.
        let members = scope.members.borrow().clone();
        let new_members = &members[before.len()..];
        let mut result = None;
        for &id in new_members {
            if let SymbolKind::Parameter(_) = &self.cx.symbol(id).kind {
                result = self.cx.constant_value_of(id).ok();
            }
        }
        result
    }

    /// A variable declaration: the initializer is evaluated immediately and
    /// the name keeps its value for later snippets, which makes it behave
    /// like a parameter within the session.
    fn eval_var_declaration(&mut self, text: &str) -> Option<ConstantValue> {
        let item = self.parse_member(text)?;
        let decl = match &item.data {
            ast::ItemData::VarDecl(decl) => decl.clone(),
            // Some snippets starting with a type keyword are really other
            // declarations (e.g. a typedef'd enum); fall back.
            _ => {
                let scope_sym = self.cx.symbol(self.scope);
                let scope = scope_of(&scope_sym)?;
                self.cx.symbolize_item(self.scope, scope, &item);
                return None;
            }
        };
        let scope_sym = self.cx.symbol(self.scope);
        let scope = scope_of(&scope_sym)?;
        let mut result = None;
        for da in &decl.decls {
            let id = self.cx.alloc_symbol(
                da.name.name,
                da.name.span,
                Some(self.scope),
                SymbolKind::Parameter(ParamSym {
                    local: false,
                    ty: RefCell::new(None),
                    ty_ast: decl.ty.clone(),
                    init: da.init.clone(),
                    value: RefCell::new(None),
                    evaluating: Cell::new(false),
                }),
            );
            self.cx.add_member(scope, id);
            match &da.init {
                Some(_) => result = self.cx.constant_value_of(id).ok(),
                None => {
                    self.cx.diag.emit(
                        DiagBuilder2::warning(format!(
                            "`{}` has no initializer; its value is undefined in this session",
                            da.name.name
                        ))
                        .span(da.name.span),
                    );
                }
            }
        }
        result
    }

    fn eval_expression(&mut self, text: &str) -> Option<ConstantValue> {
        let source = shannon_syntax::add_snippet_source(text);
        let pp = Preprocessor::new(source, &self.cx.diag);
        let (expr, _) = parser::parse_expression(pp, &self.cx.diag);
        let expr = expr?;
        let binder = Binder::new(&self.cx, self.scope);
        let bound = binder.bind(&expr);
        self.cx.eval_const(&bound).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shannon_common::svint::SVInt;

    fn int(width: u32, signed: bool, value: i64) -> ConstantValue {
        ConstantValue::Int(SVInt::new(width, signed, value.into()))
    }

    #[test]
    fn expressions_evaluate() {
        let arena = GlobalArenas::default();
        let mut session = ScriptSession::new(&arena);
        assert_eq!(session.eval("1 + 2"), Some(int(32, true, 3)));
        assert_eq!(session.eval("4'b1001"), Some(int(4, false, 9)));
        assert_eq!(session.eval("3 > 2"), Some(int(1, false, 1)));
    }

    #[test]
    fn parameters_accumulate() {
        let arena = GlobalArenas::default();
        let mut session = ScriptSession::new(&arena);
        assert_eq!(session.eval("parameter W = 8"), Some(int(32, true, 8)));
        assert_eq!(session.eval("W * 2"), Some(int(32, true, 16)));
        assert_eq!(
            session.eval("localparam int D = W + 1"),
            Some(int(32, true, 9))
        );
        assert_eq!(session.eval("D"), Some(int(32, true, 9)));
    }

    #[test]
    fn variables_evaluate_immediately() {
        let arena = GlobalArenas::default();
        let mut session = ScriptSession::new(&arena);
        assert_eq!(session.eval("int x = 5 * 5"), Some(int(32, true, 25)));
        assert_eq!(session.eval("x + 1"), Some(int(32, true, 26)));
    }

    #[test]
    fn functions_declare_and_call() {
        let arena = GlobalArenas::default();
        let mut session = ScriptSession::new(&arena);
        assert_eq!(
            session.eval(
                "function int add(int a, int b);\n return a + b;\n endfunction"
            ),
            None
        );
        assert_eq!(session.eval("add(2, 3)"), Some(int(32, true, 5)));
        assert!(session.diagnostics().is_empty());
    }

    #[test]
    fn function_with_loop() {
        let arena = GlobalArenas::default();
        let mut session = ScriptSession::new(&arena);
        session.eval(
            "function int sum_to(int n);\n\
             int acc;\n\
             acc = 0;\n\
             for (int i = 1; i <= n; i = i + 1) acc = acc + i;\n\
             return acc;\n\
             endfunction",
        );
        assert_eq!(session.eval("sum_to(10)"), Some(int(32, true, 55)));
    }

    #[test]
    fn bad_expression_reports_not_constant() {
        let arena = GlobalArenas::default();
        let mut session = ScriptSession::new(&arena);
        assert_eq!(session.eval("undeclared_thing + 1"), None);
        assert!(!session.diagnostics().is_empty());
    }
}

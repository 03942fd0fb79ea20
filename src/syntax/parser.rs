// Copyright (c) 2024-2026 The shannon developers

//! A parser for the SystemVerilog language. Based on IEEE 1800-2017.
//!
//! The parser pulls preprocessed tokens and assembles the concrete syntax
//! tree. Expressions use precedence climbing over the operator table in
//! `token.rs`; lists recover from errors by skipping to a delimiter or the
//! end of the list, so one bad item does not take the whole file down.

use crate::ast::*;
use crate::preproc::Preprocessor;
use crate::token::*;
use shannon_common::errors::*;
use shannon_common::name::{get_name_table, Name};
use shannon_common::source::{Span, INVALID_SPAN};
use shannon_common::svint::{LiteralBase, SVIntBuilder};
use std::collections::VecDeque;

/// Return type of functions that emit diagnostic messages and only need to
/// communicate success to the parent.
type ReportedResult<T> = Result<T, ()>;

/// The cap on expression and statement nesting. Exceeding it synthesizes a
/// missing expression and reports a diagnostic instead of blowing the stack.
const MAX_RECURSION_DEPTH: usize = 256;

/// Parse a whole source buffer into a compilation unit. Returns the root
/// node together with every consumed token, which the caller keeps for
/// re-rendering.
pub fn parse_source_file<'a>(
    input: Preprocessor<'a>,
    diag: &'a dyn DiagEmitter,
) -> (Root, Vec<Token>) {
    let mut p = Parser::new(input, diag);
    let root = parse_root(&mut p);
    (root, p.finish())
}

/// Parse a single module declaration.
pub fn parse_module<'a>(
    input: Preprocessor<'a>,
    diag: &'a dyn DiagEmitter,
) -> (Option<Item>, Vec<Token>) {
    let mut p = Parser::new(input, diag);
    let item = parse_item(&mut p).ok();
    (item, p.finish())
}

/// Parse a single item, as it would appear inside a module or at file
/// level.
pub fn parse_member<'a>(
    input: Preprocessor<'a>,
    diag: &'a dyn DiagEmitter,
) -> (Option<Item>, Vec<Token>) {
    parse_module(input, diag)
}

/// Parse a single expression.
pub fn parse_expression<'a>(
    input: Preprocessor<'a>,
    diag: &'a dyn DiagEmitter,
) -> (Option<Expr>, Vec<Token>) {
    let mut p = Parser::new(input, diag);
    let expr = parse_expr(&mut p).ok();
    (expr, p.finish())
}

/// Parse a single statement.
pub fn parse_statement<'a>(
    input: Preprocessor<'a>,
    diag: &'a dyn DiagEmitter,
) -> (Option<Stmt>, Vec<Token>) {
    let mut p = Parser::new(input, diag);
    let stmt = parse_stmt(&mut p).ok();
    (stmt, p.finish())
}

struct Parser<'a> {
    input: Preprocessor<'a>,
    diag: &'a dyn DiagEmitter,
    queue: VecDeque<Token>,
    consumed: Vec<Token>,
    last_span: Span,
    severity: Severity,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: Preprocessor<'a>, diag: &'a dyn DiagEmitter) -> Parser<'a> {
        Parser {
            input,
            diag,
            queue: VecDeque::new(),
            consumed: Vec::new(),
            last_span: INVALID_SPAN,
            severity: Severity::Note,
            depth: 0,
        }
    }

    /// Drain the remaining input up to and including the end-of-file token
    /// and hand back the consumed token list.
    fn finish(mut self) -> Vec<Token> {
        loop {
            if self.peek(0).0 == TokenKind::Eof {
                self.bump();
                return self.consumed;
            }
            self.bump();
        }
    }

    fn ensure_queue_filled(&mut self, min_tokens: usize) {
        if let Some(tok) = self.queue.back() {
            if tok.kind == TokenKind::Eof {
                return;
            }
        }
        while self.queue.len() <= min_tokens {
            let tok = self.input.next();
            let done = tok.kind == TokenKind::Eof;
            self.queue.push_back(tok);
            if done {
                break;
            }
        }
    }

    fn peek(&mut self, offset: usize) -> (TokenKind, Span) {
        self.ensure_queue_filled(offset);
        let idx = offset.min(self.queue.len() - 1);
        let tok = &self.queue[idx];
        (tok.kind, tok.span)
    }

    fn bump(&mut self) {
        if self.queue.is_empty() {
            self.ensure_queue_filled(0);
        }
        if let Some(tok) = self.queue.pop_front() {
            if tok.span.source.is_valid() {
                self.last_span = tok.span;
            }
            self.consumed.push(tok);
        }
    }

    fn skip(&mut self) {
        self.bump()
    }

    fn last_span(&self) -> Span {
        self.last_span
    }

    fn add_diag(&mut self, diag: DiagBuilder2) {
        if diag.get_severity() > self.severity {
            self.severity = diag.get_severity();
        }
        self.diag.emit(diag);
    }

    fn is_fatal(&self) -> bool {
        self.severity >= Severity::Fatal
    }

    fn try_eat(&mut self, expect: TokenKind) -> bool {
        if self.peek(0).0 == expect {
            self.bump();
            true
        } else {
            false
        }
    }

    fn require_reported(&mut self, expect: TokenKind) -> ReportedResult<()> {
        let (actual, span) = self.peek(0);
        if actual == expect {
            self.bump();
            Ok(())
        } else {
            self.add_diag(
                DiagBuilder2::error(format!(
                    "expected `{}`, but found `{}` instead",
                    expect, actual
                ))
                .code(DiagCode::ExpectedToken)
                .span(span),
            );
            Err(())
        }
    }

    fn try_eat_ident(&mut self) -> Option<Identifier> {
        match self.peek(0) {
            (TokenKind::Ident(name), span) | (TokenKind::EscIdent(name), span) => {
                self.bump();
                Some(Identifier { span, name })
            }
            _ => None,
        }
    }

    fn eat_ident(&mut self, msg: &str) -> ReportedResult<Identifier> {
        match self.try_eat_ident() {
            Some(ident) => Ok(ident),
            None => {
                let (tkn, span) = self.peek(0);
                self.add_diag(
                    DiagBuilder2::error(format!("expected {} before `{}`", msg, tkn))
                        .code(DiagCode::ExpectedToken)
                        .span(span),
                );
                Err(())
            }
        }
    }

    /// Skip ahead to one of the given terminator tokens, respecting
    /// delimiter nesting. A closing delimiter that does not match an
    /// earlier opening one aborts the parse with a fatal diagnostic.
    fn recover_balanced(&mut self, terminators: &[TokenKind], eat_terminator: bool) {
        let mut stack = Vec::new();
        loop {
            let (tkn, sp) = self.peek(0);
            if stack.is_empty() {
                for t in terminators {
                    if *t == tkn {
                        if eat_terminator {
                            self.skip();
                        }
                        return;
                    }
                }
            }
            match tkn {
                TokenKind::OpenDelim(x) => stack.push(x),
                TokenKind::CloseDelim(x) => match stack.pop() {
                    Some(open) if open == x => (),
                    Some(open) => {
                        self.add_diag(
                            DiagBuilder2::fatal(format!(
                                "found closing `{}` which is not the complement to the \
                                 previous opening `{}`",
                                TokenKind::CloseDelim(x),
                                TokenKind::OpenDelim(open)
                            ))
                            .code(DiagCode::ExpectedToken)
                            .span(sp),
                        );
                        return;
                    }
                    None => {
                        self.add_diag(
                            DiagBuilder2::fatal(format!(
                                "found closing `{}` without an earlier opening `{}`",
                                TokenKind::CloseDelim(x),
                                TokenKind::OpenDelim(x)
                            ))
                            .code(DiagCode::ExpectedToken)
                            .span(sp),
                        );
                        return;
                    }
                },
                TokenKind::Eof => return,
                _ => (),
            }
            self.skip();
        }
    }

    /// Guard against runaway recursion. Returns `Err` once the depth cap is
    /// hit, after reporting a diagnostic.
    fn enter(&mut self) -> ReportedResult<()> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            let sp = self.peek(0).1;
            self.add_diag(
                DiagBuilder2::fatal("expression nesting is too deep")
                    .code(DiagCode::ParserDepthExceeded)
                    .span(sp),
            );
            self.depth -= 1;
            return Err(());
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

/// Parses the opening delimiter, calls the `inner` function, and parses the
/// closing delimiter. Properly recovers to and including the closing
/// delimiter if the `inner` function throws an error.
fn flanked<R, F>(p: &mut Parser, delim: DelimToken, mut inner: F) -> ReportedResult<R>
where
    F: FnMut(&mut Parser) -> ReportedResult<R>,
{
    p.require_reported(TokenKind::OpenDelim(delim))?;
    match inner(p) {
        Ok(r) => match p.require_reported(TokenKind::CloseDelim(delim)) {
            Ok(_) => Ok(r),
            Err(e) => {
                p.recover_balanced(&[TokenKind::CloseDelim(delim)], true);
                Err(e)
            }
        },
        Err(e) => {
            p.recover_balanced(&[TokenKind::CloseDelim(delim)], true);
            Err(e)
        }
    }
}

/// If the opening delimiter is present, consumes it, calls the `inner`
/// function, and parses the closing delimiter. Returns `None` if the
/// opening delimiter is not present.
fn try_flanked<R, F>(p: &mut Parser, delim: DelimToken, inner: F) -> ReportedResult<Option<R>>
where
    F: FnMut(&mut Parser) -> ReportedResult<R>,
{
    if p.peek(0).0 == TokenKind::OpenDelim(delim) {
        flanked(p, delim, inner).map(Some)
    } else {
        Ok(None)
    }
}

/// Parse a comma-separated list of items until the terminator is reached.
/// The terminator is not consumed. On a bad item the parser skips to the
/// next comma or the terminator and keeps going.
fn comma_list<R, F>(
    p: &mut Parser,
    term: TokenKind,
    msg: &str,
    mut item: F,
) -> ReportedResult<Vec<R>>
where
    F: FnMut(&mut Parser) -> ReportedResult<R>,
{
    let mut v = Vec::new();
    while !p.is_fatal() && p.peek(0).0 != TokenKind::Eof && p.peek(0).0 != term {
        match item(p) {
            Ok(x) => v.push(x),
            Err(_) => {
                p.recover_balanced(&[TokenKind::Comma, term], false);
            }
        }

        if p.peek(0).0 == term {
            break;
        } else if p.try_eat(TokenKind::Comma) {
            if p.peek(0).0 == term {
                let q = p.last_span();
                p.add_diag(
                    DiagBuilder2::warning(format!("superfluous trailing comma in {} list", msg))
                        .code(DiagCode::SuperfluousComma)
                        .span(q),
                );
                break;
            }
        } else {
            let (tkn, sp) = p.peek(0);
            p.add_diag(
                DiagBuilder2::error(format!(
                    "expected `,` or `{}` after {}, found `{}`",
                    term, msg, tkn
                ))
                .code(DiagCode::ExpectedToken)
                .span(sp),
            );
            p.recover_balanced(&[TokenKind::Comma, term], false);
            if !p.try_eat(TokenKind::Comma) {
                break;
            }
        }
    }
    Ok(v)
}

fn comma_list_nonempty<R, F>(
    p: &mut Parser,
    term: TokenKind,
    msg: &str,
    item: F,
) -> ReportedResult<Vec<R>>
where
    F: FnMut(&mut Parser) -> ReportedResult<R>,
{
    let q = p.peek(0).1;
    let v = comma_list(p, term, msg, item)?;
    if v.is_empty() {
        p.add_diag(
            DiagBuilder2::error(format!("expected at least one {}", msg))
                .code(DiagCode::ExpectedItem)
                .span(q),
        );
        Err(())
    } else {
        Ok(v)
    }
}

// ----------------------------------------------------------------------
// Items
// ----------------------------------------------------------------------

fn parse_root(p: &mut Parser) -> Root {
    let begin = p.peek(0).1;
    let mut items = Vec::new();
    let mut timeunits = None;
    loop {
        match p.peek(0).0 {
            TokenKind::Eof => break,
            TokenKind::Keyword(Kw::Timeunit) | TokenKind::Keyword(Kw::Timeprecision) => {
                timeunits = parse_timeunit(p).ok().or(timeunits);
            }
            _ => match parse_item(p) {
                Ok(item) => items.push(item),
                Err(_) => {
                    if p.is_fatal() {
                        break;
                    }
                    p.recover_balanced(&[TokenKind::Semicolon], true);
                }
            },
        }
    }
    let mut span = begin;
    span.expand(p.last_span());
    Root::new(span, RootData { timeunits, items })
}

/// Parse a `timeunit 1ns / 1ps;` or `timeprecision 1ps;` declaration.
fn parse_timeunit(p: &mut Parser) -> ReportedResult<Timeunit> {
    let mut unit = None;
    let mut prec = None;
    while let TokenKind::Keyword(Kw::Timeunit) | TokenKind::Keyword(Kw::Timeprecision) =
        p.peek(0).0
    {
        let is_unit = p.peek(0).0 == TokenKind::Keyword(Kw::Timeunit);
        p.bump();
        let value = parse_time_literal(p)?;
        if is_unit {
            unit = Some(value);
            if p.try_eat(TokenKind::Operator(Op::Div)) {
                prec = Some(parse_time_literal(p)?);
            }
        } else {
            prec = Some(value);
        }
        p.require_reported(TokenKind::Semicolon)?;
    }
    Ok(Timeunit { unit, prec })
}

fn parse_time_literal(
    p: &mut Parser,
) -> ReportedResult<shannon_common::source::Spanned<(f64, TimeUnit)>> {
    match p.peek(0) {
        (TokenKind::Literal(Lit::Time(value, frac, unit)), span) => {
            p.bump();
            Ok(shannon_common::source::Spanned::new(
                (time_to_f64(value, frac), unit),
                span,
            ))
        }
        (tkn, span) => {
            p.add_diag(
                DiagBuilder2::error(format!("expected time literal, found `{}`", tkn))
                    .code(DiagCode::ExpectedToken)
                    .span(span),
            );
            Err(())
        }
    }
}

fn time_to_f64(value: Name, frac: Option<Name>) -> f64 {
    let text = match frac {
        Some(frac) => format!("{}.{}", value, frac),
        None => value.as_str().to_string(),
    };
    text.parse().unwrap_or(0.0)
}

/// Parse one item as it appears at file level or in a module body.
fn parse_item(p: &mut Parser) -> ReportedResult<Item> {
    let (tkn, begin) = p.peek(0);
    let data = match tkn {
        TokenKind::Keyword(Kw::Module) | TokenKind::Keyword(Kw::Macromodule) => {
            parse_module_decl(p, ModuleKind::Module)?
        }
        TokenKind::Keyword(Kw::Interface) => parse_module_decl(p, ModuleKind::Interface)?,
        TokenKind::Keyword(Kw::Program) => parse_module_decl(p, ModuleKind::Program)?,
        TokenKind::Keyword(Kw::Package) => parse_package_decl(p)?,
        TokenKind::Keyword(Kw::Class) => parse_class_decl(p)?,
        TokenKind::Keyword(Kw::Virtual) if p.peek(1).0 == TokenKind::Keyword(Kw::Class) => {
            p.bump();
            parse_class_decl(p)?
        }
        TokenKind::Keyword(Kw::Import) => parse_import_decl(p)?,
        TokenKind::Keyword(Kw::Parameter) => parse_param_decl(p, false)?,
        TokenKind::Keyword(Kw::Localparam) => parse_param_decl(p, true)?,
        TokenKind::Keyword(Kw::Typedef) => parse_typedef(p)?,
        TokenKind::Keyword(Kw::Genvar) => {
            p.bump();
            let decls = comma_list_nonempty(p, TokenKind::Semicolon, "genvar name", |p| {
                parse_decl_assignment(p)
            })?;
            p.require_reported(TokenKind::Semicolon)?;
            ItemData::GenvarDecl(decls)
        }
        TokenKind::Keyword(Kw::Assign) => {
            p.bump();
            let assignments =
                comma_list_nonempty(p, TokenKind::Semicolon, "continuous assignment", |p| {
                    let lhs = parse_expr_prec(p, Precedence::Unary)?;
                    p.require_reported(TokenKind::Operator(Op::Assign))?;
                    let rhs = parse_expr(p)?;
                    Ok((lhs, rhs))
                })?;
            p.require_reported(TokenKind::Semicolon)?;
            ItemData::ContAssign(ContAssign { assignments })
        }
        TokenKind::Keyword(Kw::Initial) => parse_procedure(p, ProcedureKind::Initial)?,
        TokenKind::Keyword(Kw::Always) => parse_procedure(p, ProcedureKind::Always)?,
        TokenKind::Keyword(Kw::AlwaysComb) => parse_procedure(p, ProcedureKind::AlwaysComb)?,
        TokenKind::Keyword(Kw::AlwaysLatch) => parse_procedure(p, ProcedureKind::AlwaysLatch)?,
        TokenKind::Keyword(Kw::AlwaysFf) => parse_procedure(p, ProcedureKind::AlwaysFf)?,
        TokenKind::Keyword(Kw::Final) => parse_procedure(p, ProcedureKind::Final)?,
        TokenKind::Keyword(Kw::Function) => parse_subroutine(p, SubroutineKind::Func)?,
        TokenKind::Keyword(Kw::Task) => parse_subroutine(p, SubroutineKind::Task)?,
        TokenKind::Keyword(Kw::Generate) => {
            p.bump();
            let mut items = Vec::new();
            while !matches!(
                p.peek(0).0,
                TokenKind::Keyword(Kw::Endgenerate) | TokenKind::Eof
            ) && !p.is_fatal()
            {
                match parse_item(p) {
                    Ok(item) => items.push(item),
                    Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
                }
            }
            p.require_reported(TokenKind::Keyword(Kw::Endgenerate))?;
            ItemData::GenerateRegion(items)
        }
        TokenKind::Keyword(Kw::If) => parse_generate_if(p)?,
        TokenKind::Keyword(Kw::For) => parse_generate_for(p)?,
        TokenKind::Keyword(Kw::Case) => parse_generate_case(p)?,
        TokenKind::Keyword(kw) if net_type_keyword(kw) => parse_net_decl(p, kw)?,
        TokenKind::Keyword(Kw::Const) | TokenKind::Keyword(Kw::Var) => parse_var_decl(p)?,
        TokenKind::Keyword(kw) if data_type_keyword(kw) => parse_var_decl(p)?,
        TokenKind::Keyword(Kw::Enum) | TokenKind::Keyword(Kw::Struct)
        | TokenKind::Keyword(Kw::Union) => parse_var_decl(p)?,
        TokenKind::Ident(_) | TokenKind::EscIdent(_) => parse_inst_or_var(p)?,
        _ => {
            p.add_diag(
                DiagBuilder2::error(format!("expected item, found `{}` instead", tkn))
                    .code(DiagCode::ExpectedItem)
                    .span(begin),
            );
            return Err(());
        }
    };
    let mut span = begin;
    span.expand(p.last_span());
    Ok(Item::new(span, data))
}

fn net_type_keyword(kw: Kw) -> bool {
    matches!(
        kw,
        Kw::Wire
            | Kw::Tri
            | Kw::Tri0
            | Kw::Tri1
            | Kw::Triand
            | Kw::Trior
            | Kw::Trireg
            | Kw::Wand
            | Kw::Wor
            | Kw::Uwire
            | Kw::Supply0
            | Kw::Supply1
    )
}

fn data_type_keyword(kw: Kw) -> bool {
    matches!(
        kw,
        Kw::Bit
            | Kw::Logic
            | Kw::Reg
            | Kw::Byte
            | Kw::Shortint
            | Kw::Int
            | Kw::Longint
            | Kw::Integer
            | Kw::Time
            | Kw::Real
            | Kw::Shortreal
            | Kw::Realtime
            | Kw::String
            | Kw::Chandle
            | Kw::Event
            | Kw::Void
    )
}

fn parse_module_decl(p: &mut Parser, kind: ModuleKind) -> ReportedResult<ItemData> {
    p.bump(); // the module/interface/program keyword
    let name = p.eat_ident("module name")?;

    // Optional parameter port list `#( ... )`.
    let param_ports = if p.try_eat(TokenKind::Hashtag) {
        flanked(p, DelimToken::Paren, parse_param_ports)?
    } else {
        Vec::new()
    };

    // Optional port list.
    let ports = match try_flanked(p, DelimToken::Paren, |p| {
        comma_list(p, TokenKind::CloseDelim(DelimToken::Paren), "port", parse_port)
    })? {
        Some(ports) => ports,
        None => Vec::new(),
    };
    p.require_reported(TokenKind::Semicolon)?;

    // Body items up to the matching end keyword.
    let end_kw = match kind {
        ModuleKind::Module => Kw::Endmodule,
        ModuleKind::Interface => Kw::Endinterface,
        ModuleKind::Program => Kw::Endprogram,
    };
    let mut items = Vec::new();
    while !matches!(p.peek(0).0, TokenKind::Keyword(kw) if kw == end_kw)
        && p.peek(0).0 != TokenKind::Eof
        && !p.is_fatal()
    {
        match parse_item(p) {
            Ok(item) => items.push(item),
            Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
        }
    }
    p.require_reported(TokenKind::Keyword(end_kw))?;
    parse_optional_label(p);

    Ok(ItemData::ModuleDecl(ModuleDecl {
        kind,
        name,
        param_ports,
        ports,
        items,
    }))
}

/// Parse the `: name` that may trail an `endmodule` or `end`.
fn parse_optional_label(p: &mut Parser) -> Option<Identifier> {
    if p.peek(0).0 == TokenKind::Colon {
        p.bump();
        p.try_eat_ident()
    } else {
        None
    }
}

fn parse_package_decl(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump();
    let name = p.eat_ident("package name")?;
    p.require_reported(TokenKind::Semicolon)?;
    let mut items = Vec::new();
    while !matches!(
        p.peek(0).0,
        TokenKind::Keyword(Kw::Endpackage) | TokenKind::Eof
    ) && !p.is_fatal()
    {
        match parse_item(p) {
            Ok(item) => items.push(item),
            Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
        }
    }
    p.require_reported(TokenKind::Keyword(Kw::Endpackage))?;
    parse_optional_label(p);
    Ok(ItemData::PackageDecl(PackageDecl { name, items }))
}

/// Parse a class declaration. The shell (name and base class) is kept;
/// body items parse with the regular member machinery but stay
/// unelaborated.
fn parse_class_decl(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump(); // class
    let name = p.eat_ident("class name")?;
    let extends = if p.try_eat(TokenKind::Keyword(Kw::Extends)) {
        Some(p.eat_ident("base class name")?)
    } else {
        None
    };
    p.require_reported(TokenKind::Semicolon)?;
    let mut items = Vec::new();
    while !matches!(p.peek(0).0, TokenKind::Keyword(Kw::Endclass) | TokenKind::Eof)
        && !p.is_fatal()
    {
        match parse_item(p) {
            Ok(item) => items.push(item),
            Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
        }
    }
    p.require_reported(TokenKind::Keyword(Kw::Endclass))?;
    parse_optional_label(p);
    Ok(ItemData::ClassDecl(ClassDecl {
        name,
        extends,
        items,
    }))
}

fn parse_import_decl(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump();
    let items = comma_list_nonempty(p, TokenKind::Semicolon, "import item", |p| {
        let pkg = p.eat_ident("package name")?;
        p.require_reported(TokenKind::Namespace)?;
        let name = match p.peek(0).0 {
            TokenKind::Operator(Op::Mul) => {
                p.bump();
                None
            }
            _ => Some(p.eat_ident("imported name")?),
        };
        Ok(ImportItem { pkg, name })
    })?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(ItemData::ImportDecl(ImportDecl { items }))
}

/// Parse the contents of a `#( ... )` parameter port list.
fn parse_param_ports(p: &mut Parser) -> ReportedResult<Vec<ParamDecl>> {
    let term = TokenKind::CloseDelim(DelimToken::Paren);
    let elements = comma_list(p, term, "parameter port", |p| {
        let local = match p.peek(0).0 {
            TokenKind::Keyword(Kw::Parameter) => {
                p.bump();
                Some(false)
            }
            TokenKind::Keyword(Kw::Localparam) => {
                p.bump();
                Some(true)
            }
            _ => None,
        };
        let ty = parse_optional_data_type(p)?;
        let decl = parse_decl_assignment(p)?;
        Ok((local, ty, decl))
    })?;
    let mut decls: Vec<ParamDecl> = Vec::new();
    for (local, ty, decl) in elements {
        // Continuation elements without their own `parameter` keyword or
        // type attach to the preceding declaration.
        let continuation = local.is_none()
            && ty.data.kind == TypeKind::ImplicitType
            && ty.data.dims.is_empty()
            && !decls.is_empty();
        if continuation {
            decls.last_mut().unwrap().decls.push(decl);
        } else {
            decls.push(ParamDecl {
                local: local.unwrap_or(false),
                ty,
                decls: vec![decl],
            });
        }
    }
    Ok(decls)
}

fn parse_port(p: &mut Parser) -> ReportedResult<Port> {
    let begin = p.peek(0).1;
    let dir = match p.peek(0).0 {
        TokenKind::Keyword(Kw::Input) => {
            p.bump();
            Some(PortDir::Input)
        }
        TokenKind::Keyword(Kw::Output) => {
            p.bump();
            Some(PortDir::Output)
        }
        TokenKind::Keyword(Kw::Inout) => {
            p.bump();
            Some(PortDir::Inout)
        }
        TokenKind::Keyword(Kw::Ref) => {
            p.bump();
            Some(PortDir::Ref)
        }
        _ => None,
    };
    // An optional net type keyword, e.g. `input wire [7:0] a`.
    if let TokenKind::Keyword(kw) = p.peek(0).0 {
        if net_type_keyword(kw) {
            p.bump();
        }
    }
    let ty = parse_optional_data_type(p)?;
    let name = p.eat_ident("port name")?;
    let dims = parse_optional_dimensions(p)?;
    let default = if p.try_eat(TokenKind::Operator(Op::Assign)) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    let mut span = begin;
    span.expand(p.last_span());
    Ok(Port {
        span,
        dir,
        ty,
        name,
        dims,
        default,
    })
}

fn parse_param_decl(p: &mut Parser, local: bool) -> ReportedResult<ItemData> {
    p.bump(); // parameter/localparam
    let ty = parse_optional_data_type(p)?;
    let decls = comma_list_nonempty(p, TokenKind::Semicolon, "parameter", |p| {
        parse_decl_assignment(p)
    })?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(ItemData::ParamDecl(ParamDecl { local, ty, decls }))
}

fn parse_typedef(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump();
    let ty = parse_explicit_type(p)?;
    let name = p.eat_ident("type name")?;
    let dims = parse_optional_dimensions(p)?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(ItemData::TypedefDecl(Typedef { name, ty, dims }))
}

fn parse_var_decl(p: &mut Parser) -> ReportedResult<ItemData> {
    let konst = p.try_eat(TokenKind::Keyword(Kw::Const));
    p.try_eat(TokenKind::Keyword(Kw::Var));
    let ty = parse_optional_data_type(p)?;
    let decls = comma_list_nonempty(p, TokenKind::Semicolon, "variable", |p| {
        parse_decl_assignment(p)
    })?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(ItemData::VarDecl(VarDecl { konst, ty, decls }))
}

fn parse_net_decl(p: &mut Parser, net_type: Kw) -> ReportedResult<ItemData> {
    p.bump();
    let ty = parse_optional_data_type(p)?;
    let decls = comma_list_nonempty(p, TokenKind::Semicolon, "net", |p| {
        parse_decl_assignment(p)
    })?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(ItemData::NetDecl(NetDecl {
        net_type,
        ty,
        decls,
    }))
}

fn parse_decl_assignment(p: &mut Parser) -> ReportedResult<DeclAssignment> {
    let name = p.eat_ident("declaration name")?;
    let dims = parse_optional_dimensions(p)?;
    let init = if p.try_eat(TokenKind::Operator(Op::Assign)) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    Ok(DeclAssignment { name, dims, init })
}

/// Disambiguate between an instantiation (`foo bar(...)`, `foo #(...)
/// bar(...)`) and a variable declaration with a named type (`foo bar;`).
fn parse_inst_or_var(p: &mut Parser) -> ReportedResult<ItemData> {
    let looks_like_inst = match (p.peek(0).0, p.peek(1).0) {
        (_, TokenKind::Hashtag) => true,
        (_, TokenKind::Ident(_)) | (_, TokenKind::EscIdent(_)) => {
            matches!(
                p.peek(2).0,
                TokenKind::OpenDelim(DelimToken::Paren) | TokenKind::OpenDelim(DelimToken::Brack)
            ) && instantiation_follows(p)
        }
        _ => false,
    };
    if looks_like_inst {
        parse_instantiation(p)
    } else {
        parse_var_decl(p)
    }
}

/// A second look to keep `foo bar[3:0];` (a variable with an unpacked
/// dimension) from being taken for an instance array.
fn instantiation_follows(p: &mut Parser) -> bool {
    if p.peek(2).0 == TokenKind::OpenDelim(DelimToken::Paren) {
        return true;
    }
    // Scan past the bracketed dimension; an opening parenthesis after it
    // means an instance array.
    let mut i = 3;
    let mut depth = 1;
    loop {
        match p.peek(i).0 {
            TokenKind::OpenDelim(DelimToken::Brack) => depth += 1,
            TokenKind::CloseDelim(DelimToken::Brack) => {
                depth -= 1;
                if depth == 0 {
                    return p.peek(i + 1).0 == TokenKind::OpenDelim(DelimToken::Paren);
                }
            }
            TokenKind::Eof => return false,
            _ => (),
        }
        i += 1;
    }
}

fn parse_instantiation(p: &mut Parser) -> ReportedResult<ItemData> {
    let target = p.eat_ident("module name")?;
    let params = if p.try_eat(TokenKind::Hashtag) {
        flanked(p, DelimToken::Paren, parse_call_args)?
    } else {
        Vec::new()
    };
    let insts = comma_list_nonempty(p, TokenKind::Semicolon, "instance", |p| {
        let begin = p.peek(0).1;
        let name = p.eat_ident("instance name")?;
        let dims = parse_optional_dimensions(p)?;
        let conns = flanked(p, DelimToken::Paren, parse_port_conns)?;
        let mut span = begin;
        span.expand(p.last_span());
        Ok(InstName {
            span,
            name,
            dims,
            conns,
        })
    })?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(ItemData::Inst(Instantiation {
        target,
        params,
        insts,
    }))
}

fn parse_port_conns(p: &mut Parser) -> ReportedResult<Vec<PortConn>> {
    comma_list(
        p,
        TokenKind::CloseDelim(DelimToken::Paren),
        "port connection",
        |p| {
            if p.peek(0).0 == TokenKind::Period {
                p.bump();
                if p.try_eat(TokenKind::Operator(Op::Mul)) {
                    return Ok(PortConn::Auto);
                }
                let name = p.eat_ident("port name")?;
                let expr = try_flanked(p, DelimToken::Paren, |p| {
                    if p.peek(0).0 == TokenKind::CloseDelim(DelimToken::Paren) {
                        Ok(None)
                    } else {
                        parse_expr(p).map(Some)
                    }
                })?;
                Ok(PortConn::Named(name, expr))
            } else {
                Ok(PortConn::Positional(parse_expr(p)?))
            }
        },
    )
}

fn parse_procedure(p: &mut Parser, kind: ProcedureKind) -> ReportedResult<ItemData> {
    p.bump();
    let stmt = parse_stmt(p)?;
    Ok(ItemData::Procedure(Procedure { kind, stmt }))
}

fn parse_subroutine(p: &mut Parser, kind: SubroutineKind) -> ReportedResult<ItemData> {
    p.bump(); // function/task
    p.try_eat(TokenKind::Keyword(Kw::Automatic));
    p.try_eat(TokenKind::Keyword(Kw::Static));
    let ret = match kind {
        SubroutineKind::Func => Some(parse_optional_data_type(p)?),
        SubroutineKind::Task => None,
    };
    let name = p.eat_ident("subroutine name")?;
    let args = match try_flanked(p, DelimToken::Paren, |p| {
        comma_list(
            p,
            TokenKind::CloseDelim(DelimToken::Paren),
            "subroutine argument",
            parse_subroutine_arg,
        )
    })? {
        Some(args) => args,
        None => Vec::new(),
    };
    p.require_reported(TokenKind::Semicolon)?;

    let end_kw = match kind {
        SubroutineKind::Func => Kw::Endfunction,
        SubroutineKind::Task => Kw::Endtask,
    };
    let mut stmts = Vec::new();
    while !matches!(p.peek(0).0, TokenKind::Keyword(kw) if kw == end_kw)
        && p.peek(0).0 != TokenKind::Eof
        && !p.is_fatal()
    {
        match parse_stmt(p) {
            Ok(stmt) => stmts.push(stmt),
            Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
        }
    }
    p.require_reported(TokenKind::Keyword(end_kw))?;
    parse_optional_label(p);

    Ok(ItemData::SubroutineDecl(SubroutineDecl {
        kind,
        ret,
        name,
        args,
        stmts,
    }))
}

fn parse_subroutine_arg(p: &mut Parser) -> ReportedResult<SubroutineArg> {
    let begin = p.peek(0).1;
    let dir = match p.peek(0).0 {
        TokenKind::Keyword(Kw::Input) => {
            p.bump();
            Some(PortDir::Input)
        }
        TokenKind::Keyword(Kw::Output) => {
            p.bump();
            Some(PortDir::Output)
        }
        TokenKind::Keyword(Kw::Inout) => {
            p.bump();
            Some(PortDir::Inout)
        }
        TokenKind::Keyword(Kw::Ref) => {
            p.bump();
            Some(PortDir::Ref)
        }
        _ => None,
    };
    let ty = parse_optional_data_type(p)?;
    let name = p.eat_ident("argument name")?;
    let default = if p.try_eat(TokenKind::Operator(Op::Assign)) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    let mut span = begin;
    span.expand(p.last_span());
    Ok(SubroutineArg {
        span,
        dir,
        ty,
        name,
        default,
    })
}

// ----------------------------------------------------------------------
// Generate constructs
// ----------------------------------------------------------------------

fn parse_generate_if(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump(); // if
    let cond = flanked(p, DelimToken::Paren, parse_expr)?;
    let main = parse_generate_block(p)?;
    let alt = if p.try_eat(TokenKind::Keyword(Kw::Else)) {
        Some(parse_generate_block(p)?)
    } else {
        None
    };
    Ok(ItemData::GenerateIf(GenerateIf { cond, main, alt }))
}

fn parse_generate_for(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump(); // for
    let (genvar, var, init, cond, step) = flanked(p, DelimToken::Paren, |p| {
        let genvar = p.try_eat(TokenKind::Keyword(Kw::Genvar));
        let var = p.eat_ident("genvar name")?;
        p.require_reported(TokenKind::Operator(Op::Assign))?;
        let init = parse_expr(p)?;
        p.require_reported(TokenKind::Semicolon)?;
        let cond = parse_expr(p)?;
        p.require_reported(TokenKind::Semicolon)?;
        let step = parse_expr(p)?;
        Ok((genvar, var, init, cond, step))
    })?;
    let block = parse_generate_block(p)?;
    Ok(ItemData::GenerateFor(GenerateFor {
        genvar,
        var,
        init,
        cond,
        step,
        block,
    }))
}

fn parse_generate_case(p: &mut Parser) -> ReportedResult<ItemData> {
    p.bump(); // case
    let expr = flanked(p, DelimToken::Paren, parse_expr)?;
    let mut arms = Vec::new();
    while !matches!(p.peek(0).0, TokenKind::Keyword(Kw::Endcase) | TokenKind::Eof)
        && !p.is_fatal()
    {
        let guards = if p.try_eat(TokenKind::Keyword(Kw::Default)) {
            p.try_eat(TokenKind::Colon);
            Vec::new()
        } else {
            let guards = comma_list_nonempty(p, TokenKind::Colon, "case guard", parse_expr)?;
            p.require_reported(TokenKind::Colon)?;
            guards
        };
        let block = parse_generate_block(p)?;
        arms.push(GenerateCaseArm { guards, block });
    }
    p.require_reported(TokenKind::Keyword(Kw::Endcase))?;
    Ok(ItemData::GenerateCase(GenerateCase { expr, arms }))
}

/// Parse a generate block: either `begin [: label] items end` or a single
/// item.
fn parse_generate_block(p: &mut Parser) -> ReportedResult<GenerateBlock> {
    let begin = p.peek(0).1;
    if p.try_eat(TokenKind::Keyword(Kw::Begin)) {
        let label = parse_optional_label(p);
        let mut items = Vec::new();
        while !matches!(p.peek(0).0, TokenKind::Keyword(Kw::End) | TokenKind::Eof) && !p.is_fatal()
        {
            match parse_item(p) {
                Ok(item) => items.push(item),
                Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
            }
        }
        p.require_reported(TokenKind::Keyword(Kw::End))?;
        let trailing = parse_optional_label(p);
        let mut span = begin;
        span.expand(p.last_span());
        Ok(GenerateBlock {
            span,
            label: label.or(trailing),
            items,
        })
    } else {
        let item = parse_item(p)?;
        let mut span = begin;
        span.expand(p.last_span());
        Ok(GenerateBlock {
            span,
            label: None,
            items: vec![item],
        })
    }
}

// ----------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------

/// Parse a type where one is required.
fn parse_explicit_type(p: &mut Parser) -> ReportedResult<Type> {
    let ty = parse_optional_data_type(p)?;
    if ty.data.kind == TypeKind::ImplicitType {
        let (tkn, sp) = p.peek(0);
        p.add_diag(
            DiagBuilder2::error(format!("expected type, found `{}` instead", tkn))
                .code(DiagCode::ExpectedType)
                .span(sp),
        );
        return Err(());
    }
    Ok(ty)
}

/// Parse a data type if one is present; otherwise produce an implicit type
/// that may still carry a signing and packed dimensions.
fn parse_optional_data_type(p: &mut Parser) -> ReportedResult<Type> {
    let begin = p.peek(0).1;
    let kind = match p.peek(0).0 {
        TokenKind::Keyword(Kw::Bit) => some_kind(p, TypeKind::BitType),
        TokenKind::Keyword(Kw::Logic) => some_kind(p, TypeKind::LogicType),
        TokenKind::Keyword(Kw::Reg) => some_kind(p, TypeKind::RegType),
        TokenKind::Keyword(Kw::Byte) => some_kind(p, TypeKind::ByteType),
        TokenKind::Keyword(Kw::Shortint) => some_kind(p, TypeKind::ShortIntType),
        TokenKind::Keyword(Kw::Int) => some_kind(p, TypeKind::IntType),
        TokenKind::Keyword(Kw::Longint) => some_kind(p, TypeKind::LongIntType),
        TokenKind::Keyword(Kw::Integer) => some_kind(p, TypeKind::IntegerType),
        TokenKind::Keyword(Kw::Time) => some_kind(p, TypeKind::TimeType),
        TokenKind::Keyword(Kw::Real) => some_kind(p, TypeKind::RealType),
        TokenKind::Keyword(Kw::Shortreal) => some_kind(p, TypeKind::ShortRealType),
        TokenKind::Keyword(Kw::Realtime) => some_kind(p, TypeKind::RealtimeType),
        TokenKind::Keyword(Kw::String) => some_kind(p, TypeKind::StringType),
        TokenKind::Keyword(Kw::Chandle) => some_kind(p, TypeKind::ChandleType),
        TokenKind::Keyword(Kw::Event) => some_kind(p, TypeKind::EventType),
        TokenKind::Keyword(Kw::Void) => some_kind(p, TypeKind::VoidType),
        TokenKind::Keyword(Kw::Enum) => parse_enum_type(p)?,
        TokenKind::Keyword(Kw::Struct) => parse_struct_type(p, StructKind::Struct)?,
        TokenKind::Keyword(Kw::Union) => parse_struct_type(p, StructKind::Union)?,
        TokenKind::Ident(_) if named_type_follows(p) => {
            let first = p.try_eat_ident().unwrap();
            if p.try_eat(TokenKind::Namespace) {
                let name = p.eat_ident("type name")?;
                TypeKind::ScopedType { pkg: first, name }
            } else {
                TypeKind::NamedType(first)
            }
        }
        _ => TypeKind::ImplicitType,
    };

    let sign = match p.peek(0).0 {
        TokenKind::Keyword(Kw::Signed) => {
            p.bump();
            TypeSign::Signed
        }
        TokenKind::Keyword(Kw::Unsigned) => {
            p.bump();
            TypeSign::Unsigned
        }
        _ => TypeSign::None,
    };

    let dims = parse_optional_dimensions(p)?;
    let mut span = begin;
    span.expand(p.last_span());
    if kind == TypeKind::ImplicitType && sign == TypeSign::None && dims.is_empty() {
        span = begin;
    }
    Ok(Type::new(span, TypeData { kind, sign, dims }))
}

fn some_kind(p: &mut Parser, kind: TypeKind) -> TypeKind {
    p.bump();
    kind
}

/// Whether the identifier at the cursor is a type name rather than a
/// declared name: `foo bar`, `foo::bar x`, or `foo [3:0] bar`.
fn named_type_follows(p: &mut Parser) -> bool {
    match p.peek(1).0 {
        TokenKind::Ident(_) | TokenKind::EscIdent(_) => true,
        TokenKind::Namespace => true,
        TokenKind::OpenDelim(DelimToken::Brack) => {
            // Distinguish `foo [3:0] bar` from the expression `foo[3]`.
            let mut i = 2;
            let mut depth = 1;
            loop {
                match p.peek(i).0 {
                    TokenKind::OpenDelim(DelimToken::Brack) => depth += 1,
                    TokenKind::CloseDelim(DelimToken::Brack) => {
                        depth -= 1;
                        if depth == 0 {
                            return matches!(
                                p.peek(i + 1).0,
                                TokenKind::Ident(_) | TokenKind::EscIdent(_)
                            );
                        }
                    }
                    TokenKind::Eof => return false,
                    _ => (),
                }
                i += 1;
            }
        }
        _ => false,
    }
}

fn parse_enum_type(p: &mut Parser) -> ReportedResult<TypeKind> {
    p.bump(); // enum
    let base = if p.peek(0).0 != TokenKind::OpenDelim(DelimToken::Brace) {
        Some(Box::new(parse_explicit_type(p)?))
    } else {
        None
    };
    let variants = flanked(p, DelimToken::Brace, |p| {
        comma_list_nonempty(
            p,
            TokenKind::CloseDelim(DelimToken::Brace),
            "enum variant",
            |p| {
                let name = p.eat_ident("variant name")?;
                let value = if p.try_eat(TokenKind::Operator(Op::Assign)) {
                    Some(parse_expr(p)?)
                } else {
                    None
                };
                Ok(EnumVariant { name, value })
            },
        )
    })?;
    Ok(TypeKind::EnumType { base, variants })
}

fn parse_struct_type(p: &mut Parser, kind: StructKind) -> ReportedResult<TypeKind> {
    p.bump(); // struct/union
    let packed = p.try_eat(TokenKind::Keyword(Kw::Packed));
    // An optional signing after `packed` applies to the whole struct; it is
    // re-parsed by the caller through the common signing slot.
    let members = flanked(p, DelimToken::Brace, |p| {
        let mut members = Vec::new();
        while p.peek(0).0 != TokenKind::CloseDelim(DelimToken::Brace)
            && p.peek(0).0 != TokenKind::Eof
        {
            let begin = p.peek(0).1;
            let ty = match parse_explicit_type(p) {
                Ok(ty) => ty,
                Err(_) => {
                    p.recover_balanced(&[TokenKind::Semicolon], true);
                    continue;
                }
            };
            let decls =
                comma_list_nonempty(p, TokenKind::Semicolon, "struct member", |p| {
                    parse_decl_assignment(p)
                })?;
            p.require_reported(TokenKind::Semicolon)?;
            let mut span = begin;
            span.expand(p.last_span());
            members.push(StructMember { span, ty, decls });
        }
        Ok(members)
    })?;
    Ok(TypeKind::StructType {
        kind,
        packed,
        members,
    })
}

/// Parse zero or more `[...]` dimensions.
fn parse_optional_dimensions(p: &mut Parser) -> ReportedResult<Vec<TypeDim>> {
    let mut dims = Vec::new();
    while let Some(dim) = try_flanked(p, DelimToken::Brack, parse_dimension)? {
        dims.push(dim);
    }
    Ok(dims)
}

fn parse_dimension(p: &mut Parser) -> ReportedResult<TypeDim> {
    match p.peek(0).0 {
        TokenKind::CloseDelim(DelimToken::Brack) => return Ok(TypeDim::Unsized),
        TokenKind::Dollar => {
            p.bump();
            return Ok(TypeDim::Queue);
        }
        _ => (),
    }
    let first = parse_expr(p)?;
    if p.try_eat(TokenKind::Colon) {
        let second = parse_expr(p)?;
        Ok(TypeDim::Range(first, second))
    } else {
        Ok(TypeDim::Expr(first))
    }
}

// ----------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------

fn parse_stmt(p: &mut Parser) -> ReportedResult<Stmt> {
    p.enter()?;
    let result = parse_stmt_inner(p);
    p.leave();
    result
}

fn parse_stmt_inner(p: &mut Parser) -> ReportedResult<Stmt> {
    let (tkn, begin) = p.peek(0);

    // A `label:` prefix is consumed and ignored beyond its block use.
    let data = match tkn {
        TokenKind::Semicolon => {
            p.bump();
            NullStmt
        }
        TokenKind::Keyword(Kw::Begin) => {
            p.bump();
            let label = parse_optional_label(p);
            let mut stmts = Vec::new();
            while !matches!(p.peek(0).0, TokenKind::Keyword(Kw::End) | TokenKind::Eof)
                && !p.is_fatal()
            {
                match parse_stmt(p) {
                    Ok(stmt) => stmts.push(stmt),
                    Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
                }
            }
            p.require_reported(TokenKind::Keyword(Kw::End))?;
            let trailing = parse_optional_label(p);
            SequentialBlock {
                label: label.or(trailing),
                stmts,
            }
        }
        TokenKind::Keyword(Kw::Fork) => {
            p.bump();
            let label = parse_optional_label(p);
            let mut stmts = Vec::new();
            while !matches!(
                p.peek(0).0,
                TokenKind::Keyword(Kw::Join)
                    | TokenKind::Keyword(Kw::JoinAny)
                    | TokenKind::Keyword(Kw::JoinNone)
                    | TokenKind::Eof
            ) && !p.is_fatal()
            {
                match parse_stmt(p) {
                    Ok(stmt) => stmts.push(stmt),
                    Err(_) => p.recover_balanced(&[TokenKind::Semicolon], true),
                }
            }
            let join = match p.peek(0).0 {
                TokenKind::Keyword(Kw::JoinAny) => JoinKind::Any,
                TokenKind::Keyword(Kw::JoinNone) => JoinKind::None,
                _ => JoinKind::All,
            };
            match p.peek(0).0 {
                TokenKind::Keyword(Kw::Join)
                | TokenKind::Keyword(Kw::JoinAny)
                | TokenKind::Keyword(Kw::JoinNone) => p.bump(),
                _ => p.require_reported(TokenKind::Keyword(Kw::Join))?,
            }
            let trailing = parse_optional_label(p);
            ParallelBlock {
                label: label.or(trailing),
                join,
                stmts,
            }
        }
        TokenKind::Keyword(Kw::If) => {
            p.bump();
            let cond = flanked(p, DelimToken::Paren, parse_condition_expr)?;
            let main = Box::new(parse_stmt(p)?);
            let alt = if p.try_eat(TokenKind::Keyword(Kw::Else)) {
                Some(Box::new(parse_stmt(p)?))
            } else {
                None
            };
            IfStmt {
                cond: Box::new(cond),
                main,
                alt,
            }
        }
        TokenKind::Keyword(Kw::Unique)
        | TokenKind::Keyword(Kw::Unique0)
        | TokenKind::Keyword(Kw::Priority) => {
            // A case/if qualifier; consume it and parse the underlying
            // statement.
            p.bump();
            return parse_stmt_inner(p);
        }
        TokenKind::Keyword(Kw::Case) => parse_case_stmt(p, CaseKind::Normal)?,
        TokenKind::Keyword(Kw::Casex) => parse_case_stmt(p, CaseKind::DontCareXZ)?,
        TokenKind::Keyword(Kw::Casez) => parse_case_stmt(p, CaseKind::DontCareZ)?,
        TokenKind::Keyword(Kw::For) => {
            p.bump();
            let (init, cond, step) = flanked(p, DelimToken::Paren, |p| {
                let init = Box::new(parse_for_init(p)?);
                let cond = Box::new(parse_expr(p)?);
                p.require_reported(TokenKind::Semicolon)?;
                let step =
                    comma_list(p, TokenKind::CloseDelim(DelimToken::Paren), "step", |p| {
                        parse_stmt_expr_only(p)
                    })?;
                Ok((init, cond, step))
            })?;
            let body = Box::new(parse_stmt(p)?);
            ForStmt {
                init,
                cond,
                step,
                body,
            }
        }
        TokenKind::Keyword(Kw::Foreach) => {
            p.bump();
            let (array, vars) = flanked(p, DelimToken::Paren, |p| {
                let array = parse_expr_prec(p, Precedence::Scope)?;
                let vars = flanked(p, DelimToken::Brack, |p| {
                    comma_list(
                        p,
                        TokenKind::CloseDelim(DelimToken::Brack),
                        "loop variable",
                        |p| Ok(p.try_eat_ident()),
                    )
                })?;
                Ok((array, vars))
            })?;
            let body = Box::new(parse_stmt(p)?);
            ForeachStmt {
                array: Box::new(array),
                vars,
                body,
            }
        }
        TokenKind::Keyword(Kw::While) => {
            p.bump();
            let cond = flanked(p, DelimToken::Paren, parse_expr)?;
            let body = Box::new(parse_stmt(p)?);
            WhileStmt {
                cond: Box::new(cond),
                body,
            }
        }
        TokenKind::Keyword(Kw::Do) => {
            p.bump();
            let body = Box::new(parse_stmt(p)?);
            p.require_reported(TokenKind::Keyword(Kw::While))?;
            let cond = flanked(p, DelimToken::Paren, parse_expr)?;
            p.require_reported(TokenKind::Semicolon)?;
            DoWhileStmt {
                body,
                cond: Box::new(cond),
            }
        }
        TokenKind::Keyword(Kw::Repeat) => {
            p.bump();
            let count = flanked(p, DelimToken::Paren, parse_expr)?;
            let body = Box::new(parse_stmt(p)?);
            RepeatStmt {
                count: Box::new(count),
                body,
            }
        }
        TokenKind::Keyword(Kw::Forever) => {
            p.bump();
            let body = Box::new(parse_stmt(p)?);
            ForeverStmt { body }
        }
        TokenKind::At => {
            let control = parse_event_control(p)?;
            let stmt = Box::new(parse_stmt(p)?);
            TimedStmt { control, stmt }
        }
        TokenKind::Hashtag => {
            p.bump();
            let delay = parse_expr_prec(p, Precedence::Scope)?;
            let stmt = Box::new(parse_stmt(p)?);
            TimedStmt {
                control: TimingControl::Delay(Box::new(delay)),
                stmt,
            }
        }
        TokenKind::Keyword(Kw::Wait) => {
            p.bump();
            let cond = flanked(p, DelimToken::Paren, parse_expr)?;
            let stmt = Box::new(parse_stmt(p)?);
            WaitStmt {
                cond: Box::new(cond),
                stmt,
            }
        }
        TokenKind::Keyword(Kw::Assert) => parse_assertion_stmt(p, AssertionKind::Assert)?,
        TokenKind::Keyword(Kw::Assume) => parse_assertion_stmt(p, AssertionKind::Assume)?,
        TokenKind::Keyword(Kw::Cover) => parse_assertion_stmt(p, AssertionKind::Cover)?,
        TokenKind::Keyword(Kw::Restrict) => parse_assertion_stmt(p, AssertionKind::Restrict)?,
        TokenKind::Keyword(Kw::Return) => {
            p.bump();
            let expr = if p.peek(0).0 != TokenKind::Semicolon {
                Some(Box::new(parse_expr(p)?))
            } else {
                None
            };
            p.require_reported(TokenKind::Semicolon)?;
            ReturnStmt(expr)
        }
        TokenKind::Keyword(Kw::Break) => {
            p.bump();
            p.require_reported(TokenKind::Semicolon)?;
            BreakStmt
        }
        TokenKind::Keyword(Kw::Continue) => {
            p.bump();
            p.require_reported(TokenKind::Semicolon)?;
            ContinueStmt
        }
        TokenKind::Keyword(Kw::Disable) => {
            p.bump();
            let name = p.eat_ident("block or task name")?;
            p.require_reported(TokenKind::Semicolon)?;
            DisableStmt(name)
        }
        TokenKind::Keyword(Kw::Const) | TokenKind::Keyword(Kw::Var) => {
            return parse_var_decl_stmt(p, begin)
        }
        TokenKind::Keyword(kw) if data_type_keyword(kw) => return parse_var_decl_stmt(p, begin),
        TokenKind::Keyword(Kw::Enum) | TokenKind::Keyword(Kw::Struct)
        | TokenKind::Keyword(Kw::Union) => return parse_var_decl_stmt(p, begin),
        TokenKind::Ident(_) if named_type_follows(p) => return parse_var_decl_stmt(p, begin),
        _ => parse_assign_or_expr_stmt(p)?,
    };
    let mut span = begin;
    span.expand(p.last_span());
    Ok(Stmt::new(span, data))
}

fn parse_var_decl_stmt(p: &mut Parser, begin: Span) -> ReportedResult<Stmt> {
    let item = parse_var_decl(p)?;
    let mut span = begin;
    span.expand(p.last_span());
    match item {
        ItemData::VarDecl(decl) => Ok(Stmt::new(span, VarDeclStmt(decl))),
        _ => Err(()),
    }
}

/// The first clause of a `for` statement: either a variable declaration or
/// an assignment.
fn parse_for_init(p: &mut Parser) -> ReportedResult<Stmt> {
    let begin = p.peek(0).1;
    match p.peek(0).0 {
        TokenKind::Keyword(kw) if data_type_keyword(kw) => {
            return parse_var_decl_stmt(p, begin);
        }
        TokenKind::Ident(_) if named_type_follows(p) => {
            return parse_var_decl_stmt(p, begin);
        }
        _ => (),
    }
    let stmt = parse_stmt_expr_only(p)?;
    p.require_reported(TokenKind::Semicolon)?;
    let mut span = begin;
    span.expand(p.last_span());
    Ok(Stmt::new(span, stmt.data))
}

/// An assignment or expression, without the trailing semicolon. Used for
/// `for` steps and initializers.
fn parse_stmt_expr_only(p: &mut Parser) -> ReportedResult<Stmt> {
    let begin = p.peek(0).1;
    let data = parse_assign_or_expr_data(p)?;
    let mut span = begin;
    span.expand(p.last_span());
    Ok(Stmt::new(span, data))
}

fn parse_assign_or_expr_stmt(p: &mut Parser) -> ReportedResult<StmtData> {
    let data = parse_assign_or_expr_data(p)?;
    p.require_reported(TokenKind::Semicolon)?;
    Ok(data)
}

/// Parse an assignment or expression statement body. The left-hand side is
/// parsed tightly so that `<=` can be told apart from the less-or-equal
/// operator in this position.
fn parse_assign_or_expr_data(p: &mut Parser) -> ReportedResult<StmtData> {
    let lhs = parse_expr_prec(p, Precedence::Unary)?;
    let (tkn, _) = p.peek(0);
    if let Some(op) = as_assign_operator(tkn) {
        p.bump();
        let rhs = parse_expr(p)?;
        return Ok(AssignStmt {
            lhs: Box::new(lhs),
            op: if op == Op::Assign { None } else { Some(op) },
            rhs: Box::new(rhs),
            nonblocking: false,
        });
    }
    if tkn == TokenKind::Operator(Op::Leq) {
        p.bump();
        // An optional intra-assignment delay.
        if p.try_eat(TokenKind::Hashtag) {
            let _delay = parse_expr_prec(p, Precedence::Scope)?;
        }
        let rhs = parse_expr(p)?;
        return Ok(AssignStmt {
            lhs: Box::new(lhs),
            op: None,
            rhs: Box::new(rhs),
            nonblocking: true,
        });
    }
    // Not an assignment after all; resume the precedence climb with the
    // already-parsed operand as prefix.
    let expr = parse_expr_suffix(p, lhs, Precedence::Min)?;
    Ok(ExprStmt(Box::new(expr)))
}

fn parse_case_stmt(p: &mut Parser, kind: CaseKind) -> ReportedResult<StmtData> {
    p.bump(); // case keyword
    let expr = flanked(p, DelimToken::Paren, parse_expr)?;
    let mut items = Vec::new();
    while !matches!(p.peek(0).0, TokenKind::Keyword(Kw::Endcase) | TokenKind::Eof) && !p.is_fatal()
    {
        let begin = p.peek(0).1;
        let guards = if p.try_eat(TokenKind::Keyword(Kw::Default)) {
            p.try_eat(TokenKind::Colon);
            Vec::new()
        } else {
            let guards = comma_list_nonempty(p, TokenKind::Colon, "case guard", parse_expr)?;
            p.require_reported(TokenKind::Colon)?;
            guards
        };
        let stmt = parse_stmt(p)?;
        let mut span = begin;
        span.expand(p.last_span());
        items.push(CaseItem { span, guards, stmt });
    }
    p.require_reported(TokenKind::Keyword(Kw::Endcase))?;
    Ok(CaseStmt {
        kind,
        expr: Box::new(expr),
        items,
    })
}

fn parse_assertion_stmt(p: &mut Parser, kind: AssertionKind) -> ReportedResult<StmtData> {
    p.bump(); // assert/assume/cover/restrict
    // Immediate assertions only; a `property` clause is parsed but its body
    // is treated as a plain expression.
    p.try_eat(TokenKind::Keyword(Kw::Property));
    let cond = flanked(p, DelimToken::Paren, parse_expr)?;
    let mut then_stmt = None;
    let mut else_stmt = None;
    if p.peek(0).0 == TokenKind::Keyword(Kw::Else) {
        p.bump();
        else_stmt = Some(Box::new(parse_stmt(p)?));
    } else if p.try_eat(TokenKind::Semicolon) {
        // Bare assertion.
    } else {
        then_stmt = Some(Box::new(parse_stmt(p)?));
        if p.try_eat(TokenKind::Keyword(Kw::Else)) {
            else_stmt = Some(Box::new(parse_stmt(p)?));
        }
    }
    Ok(AssertionStmt {
        kind,
        cond: Box::new(cond),
        then_stmt,
        else_stmt,
    })
}

/// Parse an `@` event control.
fn parse_event_control(p: &mut Parser) -> ReportedResult<TimingControl> {
    p.require_reported(TokenKind::At)?;
    match p.peek(0).0 {
        TokenKind::Operator(Op::Mul) => {
            p.bump();
            Ok(TimingControl::EventStar)
        }
        TokenKind::OpenDelim(DelimToken::Paren) => {
            if p.peek(1).0 == TokenKind::Operator(Op::Mul)
                && p.peek(2).0 == TokenKind::CloseDelim(DelimToken::Paren)
            {
                p.bump();
                p.bump();
                p.bump();
                return Ok(TimingControl::EventStar);
            }
            let terms = flanked(p, DelimToken::Paren, |p| {
                let mut terms = vec![parse_event_term(p)?];
                loop {
                    match p.peek(0).0 {
                        TokenKind::Keyword(Kw::Or) | TokenKind::Comma => {
                            p.bump();
                            terms.push(parse_event_term(p)?);
                        }
                        _ => break,
                    }
                }
                Ok(terms)
            })?;
            Ok(TimingControl::Event(terms))
        }
        _ => {
            let term = parse_event_term(p)?;
            Ok(TimingControl::Event(vec![term]))
        }
    }
}

fn parse_event_term(p: &mut Parser) -> ReportedResult<EventTerm> {
    let edge = match p.peek(0).0 {
        TokenKind::Keyword(Kw::Posedge) => {
            p.bump();
            Some(EdgeKind::Posedge)
        }
        TokenKind::Keyword(Kw::Negedge) => {
            p.bump();
            Some(EdgeKind::Negedge)
        }
        TokenKind::Keyword(Kw::Edge) => {
            p.bump();
            Some(EdgeKind::Edge)
        }
        _ => None,
    };
    // Event expressions bind tighter than `or`, which separates terms.
    let expr = parse_expr_prec(p, Precedence::Ternary)?;
    Ok(EventTerm { edge, expr })
}

/// Condition of an `if`: a plain expression, or `expr matches pattern`.
fn parse_condition_expr(p: &mut Parser) -> ReportedResult<Expr> {
    let expr = parse_expr(p)?;
    if p.try_eat(TokenKind::Keyword(Kw::Matches)) {
        let pattern = parse_expr(p)?;
        let mut span = expr.span;
        span.expand(p.last_span());
        return Ok(Expr::new(
            span,
            MatchesExpr {
                expr: Box::new(expr),
                pattern: Box::new(pattern),
            },
        ));
    }
    Ok(expr)
}

// ----------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------

fn parse_expr(p: &mut Parser) -> ReportedResult<Expr> {
    parse_expr_prec(p, Precedence::Min)
}

fn parse_expr_prec(p: &mut Parser, precedence: Precedence) -> ReportedResult<Expr> {
    p.enter()?;
    let result = parse_expr_prec_inner(p, precedence);
    p.leave();
    result
}

fn parse_expr_prec_inner(p: &mut Parser, precedence: Precedence) -> ReportedResult<Expr> {
    // Class-new and dynamic-array-new expressions, used on the right hand
    // side of assignments.
    if p.try_eat(TokenKind::Keyword(Kw::New)) {
        let mut span = p.last_span();
        if let Some(dim_expr) = try_flanked(p, DelimToken::Brack, parse_expr)? {
            let init = try_flanked(p, DelimToken::Paren, parse_expr)?;
            span.expand(p.last_span());
            return Ok(Expr::new(
                span,
                ArrayNewExpr(Box::new(dim_expr), init.map(Box::new)),
            ));
        }
        let args = try_flanked(p, DelimToken::Paren, parse_call_args)?;
        span.expand(p.last_span());
        return Ok(Expr::new(span, NewExpr(args)));
    }

    // A cast with an explicit type: `type '( expr )`. Only unambiguous
    // leads are treated as types here.
    if cast_follows(p) {
        let mut span = p.peek(0).1;
        let ty = parse_explicit_type(p)?;
        p.require_reported(TokenKind::Apostrophe)?;
        let expr = flanked(p, DelimToken::Paren, parse_expr)?;
        span.expand(p.last_span());
        let cast = Expr::new(span, CastExpr(ty, Box::new(expr)));
        return parse_expr_suffix(p, cast, precedence);
    }

    // A sign cast, `signed'(x)` or `unsigned'(x)`.
    if let TokenKind::Keyword(kw @ Kw::Signed) | TokenKind::Keyword(kw @ Kw::Unsigned) =
        p.peek(0).0
    {
        let mut span = p.peek(0).1;
        p.bump();
        let sign = if kw == Kw::Signed {
            TypeSign::Signed
        } else {
            TypeSign::Unsigned
        };
        let sign = shannon_common::source::Spanned::new(sign, span);
        p.require_reported(TokenKind::Apostrophe)?;
        let expr = flanked(p, DelimToken::Paren, parse_expr)?;
        span.expand(p.last_span());
        let cast = Expr::new(span, CastSignExpr(sign, Box::new(expr)));
        return parse_expr_suffix(p, cast, precedence);
    }

    let prefix = parse_expr_first(p, precedence)?;
    parse_expr_suffix(p, prefix, precedence)
}

/// Whether the tokens at the cursor unambiguously start a cast: a type
/// keyword followed by an apostrophe and parenthesis.
fn cast_follows(p: &mut Parser) -> bool {
    let is_type_kw = match p.peek(0).0 {
        TokenKind::Keyword(kw) => data_type_keyword(kw),
        _ => false,
    };
    is_type_kw
        && p.peek(1).0 == TokenKind::Apostrophe
        && p.peek(2).0 == TokenKind::OpenDelim(DelimToken::Paren)
}

fn parse_expr_suffix(p: &mut Parser, prefix: Expr, precedence: Precedence) -> ReportedResult<Expr> {
    let (tkn, _) = p.peek(0);
    match tkn {
        // Index: "[" range_expression "]"
        TokenKind::OpenDelim(DelimToken::Brack) if precedence <= Precedence::Postfix => {
            p.bump();
            let index = match parse_range_expr(p) {
                Ok(x) => x,
                Err(e) => {
                    p.recover_balanced(&[TokenKind::CloseDelim(DelimToken::Brack)], true);
                    return Err(e);
                }
            };
            p.require_reported(TokenKind::CloseDelim(DelimToken::Brack))?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                IndexExpr {
                    indexee: Box::new(prefix),
                    index: Box::new(index),
                },
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // Call: "(" [list_of_arguments] ")"
        TokenKind::OpenDelim(DelimToken::Paren) if precedence <= Precedence::Postfix => {
            let args = flanked(p, DelimToken::Paren, parse_call_args)?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                CallExpr(Box::new(prefix), args),
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // expr "." ident
        TokenKind::Period if precedence <= Precedence::Scope => {
            p.bump();
            let name = p.eat_ident("member name")?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                MemberExpr {
                    expr: Box::new(prefix),
                    name,
                },
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // expr "::" ident
        TokenKind::Namespace if precedence <= Precedence::Scope => {
            p.bump();
            let name = p.eat_ident("scoped name")?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                ScopeExpr(Box::new(prefix), name),
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // expr "++" and expr "--"
        TokenKind::Operator(op @ Op::Inc) | TokenKind::Operator(op @ Op::Dec)
            if precedence <= Precedence::Unary =>
        {
            p.bump();
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                UnaryExpr {
                    op,
                    expr: Box::new(prefix),
                    postfix: true,
                },
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // expr "?" expr ":" expr
        TokenKind::Ternary if precedence < Precedence::Ternary => {
            p.bump();
            let true_expr = parse_expr_prec(p, Precedence::Ternary)?;
            p.require_reported(TokenKind::Colon)?;
            let false_expr = parse_expr_prec(p, Precedence::Ternary)?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                TernaryExpr {
                    cond: Box::new(prefix),
                    true_expr: Box::new(true_expr),
                    false_expr: Box::new(false_expr),
                },
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // expr "inside" "{" open_range_list "}"
        TokenKind::Keyword(Kw::Inside) if precedence <= Precedence::Relational => {
            p.bump();
            let set = flanked(p, DelimToken::Brace, |p| {
                comma_list_nonempty(
                    p,
                    TokenKind::CloseDelim(DelimToken::Brace),
                    "value range",
                    parse_value_range,
                )
            })?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                InsideExpr(Box::new(prefix), set),
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        // expr "'" "(" expr ")" — size cast
        TokenKind::Apostrophe if precedence <= Precedence::Postfix => {
            if p.peek(1).0 == TokenKind::OpenDelim(DelimToken::Paren) {
                p.bump();
                let inner = flanked(p, DelimToken::Paren, parse_expr)?;
                let expr = Expr::new(
                    Span::union(prefix.span, p.last_span()),
                    CastSizeExpr(Box::new(prefix), Box::new(inner)),
                );
                return parse_expr_suffix(p, expr, precedence);
            }
        }

        // expr "with" "{ ... }" or "with (...)"
        TokenKind::Keyword(Kw::With) if precedence <= Precedence::Postfix => {
            p.bump();
            let body = match p.peek(0).0 {
                TokenKind::OpenDelim(DelimToken::Brace) => {
                    flanked(p, DelimToken::Brace, parse_expr)?
                }
                _ => flanked(p, DelimToken::Paren, parse_expr)?,
            };
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                WithExpr(Box::new(prefix), Box::new(body)),
            );
            return parse_expr_suffix(p, expr, precedence);
        }

        _ => (),
    }

    // Assignment operators within expressions.
    if let Some(op) = as_assign_operator(tkn) {
        if precedence <= Precedence::Assignment {
            p.bump();
            let rhs = parse_expr_prec(p, Precedence::Assignment)?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                AssignExpr {
                    op,
                    lhs: Box::new(prefix),
                    rhs: Box::new(rhs),
                },
            );
            return parse_expr_suffix(p, expr, precedence);
        }
    }

    // Binary operators.
    if let Some(op) = as_binary_operator(tkn) {
        let prec = op.get_precedence();
        let binds = if op.is_right_associative() {
            precedence <= prec
        } else {
            precedence < prec
        };
        if binds {
            p.bump();
            let rhs = parse_expr_prec(p, prec)?;
            let expr = Expr::new(
                Span::union(prefix.span, p.last_span()),
                BinaryExpr {
                    op,
                    lhs: Box::new(prefix),
                    rhs: Box::new(rhs),
                },
            );
            return parse_expr_suffix(p, expr, precedence);
        }
    }

    Ok(prefix)
}

fn parse_expr_first(p: &mut Parser, precedence: Precedence) -> ReportedResult<Expr> {
    let first = p.peek(0).1;

    // Prefix increment and decrement.
    if let TokenKind::Operator(op @ Op::Inc) | TokenKind::Operator(op @ Op::Dec) = p.peek(0).0 {
        if precedence <= Precedence::Unary {
            p.bump();
            let expr = parse_expr_prec(p, Precedence::Unary)?;
            return Ok(Expr::new(
                Span::union(first, p.last_span()),
                UnaryExpr {
                    op,
                    expr: Box::new(expr),
                    postfix: false,
                },
            ));
        }
    }

    // Unary prefix operators.
    if let Some(op) = as_unary_operator(p.peek(0).0) {
        p.bump();
        let expr = parse_expr_prec(p, Precedence::Unary)?;
        return Ok(Expr::new(
            Span::union(first, p.last_span()),
            UnaryExpr {
                op,
                expr: Box::new(expr),
                postfix: false,
            },
        ));
    }

    parse_primary_expr(p)
}

fn parse_primary_expr(p: &mut Parser) -> ReportedResult<Expr> {
    let (tkn, sp) = p.peek(0);
    match tkn {
        // Number literals, including the size prefix of based literals.
        TokenKind::Literal(Lit::Number(value)) => {
            p.bump();
            if let TokenKind::IntegerBase(signed, base) = p.peek(0).0 {
                let size = parse_literal_size(p, value, sp);
                return parse_based_literal(p, Some((size, sp)), signed, base);
            }
            // A plain decimal literal is a signed 32-bit integer.
            let mut builder = SVIntBuilder::new(LiteralBase::Decimal, true);
            push_digits(p, &mut builder, value, sp);
            Ok(Expr::new(sp, IntExpr(builder.finish(None))))
        }
        TokenKind::IntegerBase(signed, base) => parse_based_literal(p, None, signed, base),
        TokenKind::Literal(Lit::UnbasedUnsized(logic)) => {
            p.bump();
            Ok(Expr::new(sp, UnbasedUnsizedExpr(logic)))
        }
        TokenKind::Literal(Lit::Real(value)) => {
            p.bump();
            // Out-of-range exponents quietly become infinity.
            let parsed = value.as_str().parse::<f64>().unwrap_or(f64::INFINITY);
            Ok(Expr::new(sp, RealExpr(parsed)))
        }
        TokenKind::Literal(Lit::Time(value, frac, unit)) => {
            p.bump();
            Ok(Expr::new(sp, TimeExpr(time_to_f64(value, frac), unit)))
        }
        TokenKind::Literal(Lit::Str(value)) => {
            p.bump();
            Ok(Expr::new(sp, StrExpr(value)))
        }
        TokenKind::Keyword(Kw::Null) => {
            p.bump();
            Ok(Expr::new(sp, NullExpr))
        }
        TokenKind::Dollar => {
            p.bump();
            Ok(Expr::new(sp, UnboundedExpr))
        }
        TokenKind::Keyword(Kw::This) | TokenKind::Keyword(Kw::Super) => {
            p.bump();
            let name = get_name_table().intern(match tkn {
                TokenKind::Keyword(Kw::This) => "this",
                _ => "super",
            });
            Ok(Expr::new(sp, IdentExpr(Identifier { span: sp, name })))
        }

        TokenKind::Ident(name) | TokenKind::EscIdent(name) => {
            p.bump();
            Ok(Expr::new(sp, IdentExpr(Identifier { span: sp, name })))
        }
        TokenKind::SysIdent(name) => {
            p.bump();
            Ok(Expr::new(sp, SysIdentExpr(Identifier { span: sp, name })))
        }

        // Concatenations, streaming concatenations, and the empty queue.
        TokenKind::OpenDelim(DelimToken::Brace) => {
            p.bump();
            if p.try_eat(TokenKind::CloseDelim(DelimToken::Brace)) {
                return Ok(Expr::new(Span::union(sp, p.last_span()), EmptyQueueExpr));
            }
            let data = match parse_concat_body(p) {
                Ok(x) => x,
                Err(e) => {
                    p.recover_balanced(&[TokenKind::CloseDelim(DelimToken::Brace)], true);
                    return Err(e);
                }
            };
            p.require_reported(TokenKind::CloseDelim(DelimToken::Brace))?;
            Ok(Expr::new(Span::union(sp, p.last_span()), data))
        }

        // Parenthesized expression.
        TokenKind::OpenDelim(DelimToken::Paren) => {
            p.bump();
            let expr = match parse_expr(p) {
                Ok(x) => x,
                Err(e) => {
                    p.recover_balanced(&[TokenKind::CloseDelim(DelimToken::Paren)], true);
                    return Err(e);
                }
            };
            p.require_reported(TokenKind::CloseDelim(DelimToken::Paren))?;
            Ok(Expr::new(Span::union(sp, p.last_span()), expr.data))
        }

        // Assignment patterns '{...}.
        TokenKind::Apostrophe if p.peek(1).0 == TokenKind::OpenDelim(DelimToken::Brace) => {
            p.bump();
            let fields = flanked(p, DelimToken::Brace, |p| {
                comma_list_nonempty(
                    p,
                    TokenKind::CloseDelim(DelimToken::Brace),
                    "pattern field",
                    parse_pattern_field,
                )
            })?;
            Ok(Expr::new(Span::union(sp, p.last_span()), PatternExpr(fields)))
        }

        TokenKind::Keyword(Kw::Tagged) => {
            p.add_diag(
                DiagBuilder2::error("tagged union expressions are not supported")
                    .code(DiagCode::ExpectedExpression)
                    .span(sp),
            );
            Err(())
        }

        tkn => {
            p.add_diag(
                DiagBuilder2::error(format!("expected expression, found `{}` instead", tkn))
                    .code(DiagCode::ExpectedExpression)
                    .span(sp),
            );
            Err(())
        }
    }
}

/// Parse the size prefix of a based literal from its already-consumed
/// decimal token.
fn parse_literal_size(p: &mut Parser, value: Name, sp: Span) -> u32 {
    match value.as_str().parse::<u32>() {
        Ok(size) if size >= 1 => size,
        _ => {
            p.add_diag(
                DiagBuilder2::error(format!("`{}` is not a valid literal size", value))
                    .code(DiagCode::ValueOutOfRange)
                    .span(sp),
            );
            32
        }
    }
}

/// Parse a based integer literal. The `IntegerBase` token is at the cursor;
/// the digits follow as digit-run tokens which are fed through the vector
/// builder.
fn parse_based_literal(
    p: &mut Parser,
    size: Option<(u32, Span)>,
    signed: bool,
    base: LiteralBase,
) -> ReportedResult<Expr> {
    let base_sp = p.peek(0).1;
    p.bump(); // the base token
    let mut builder = SVIntBuilder::new(base, signed);
    match p.peek(0) {
        (TokenKind::Digits(digits), dsp) => {
            p.bump();
            push_digits(p, &mut builder, digits, dsp);
        }
        (tkn, dsp) => {
            p.add_diag(
                DiagBuilder2::error(format!("expected literal digits, found `{}`", tkn))
                    .code(DiagCode::ExpectedLiteralDigits)
                    .span(dsp),
            );
            return Err(());
        }
    }
    let mut span = size.map(|(_, sp)| sp).unwrap_or(base_sp);
    span.expand(p.last_span());
    let size_bits = size.map(|(bits, _)| bits);
    if let Some(bits) = size_bits {
        if builder.significant_bits() > bits {
            p.add_diag(
                DiagBuilder2::warning(format!(
                    "literal value does not fit in {} bits and is truncated",
                    bits
                ))
                .code(DiagCode::LiteralSizeTruncated)
                .span(span),
            );
        }
    }
    Ok(Expr::new(span, IntExpr(builder.finish(size_bits))))
}

fn push_digits(p: &mut Parser, builder: &mut SVIntBuilder, digits: Name, span: Span) {
    let mut reported = false;
    for c in digits.as_str().chars() {
        if builder.push_digit(c).is_err() && !reported {
            reported = true;
            p.add_diag(
                DiagBuilder2::error(format!("invalid digit `{}` in literal", c))
                    .code(DiagCode::ExpectedLiteralDigits)
                    .span(span),
            );
        }
    }
}

/// The body of a `{...}` expression: a plain concatenation, a
/// multiple-concatenation `{n{...}}`, or a streaming concatenation.
fn parse_concat_body(p: &mut Parser) -> ReportedResult<ExprData> {
    // Streaming operators.
    if let TokenKind::Operator(op @ Op::LogicShL) | TokenKind::Operator(op @ Op::LogicShR) =
        p.peek(0).0
    {
        p.bump();
        let slice = if p.peek(0).0 != TokenKind::OpenDelim(DelimToken::Brace) {
            Some(Box::new(parse_expr_prec(p, Precedence::Postfix)?))
        } else {
            None
        };
        let exprs = flanked(p, DelimToken::Brace, |p| {
            comma_list_nonempty(
                p,
                TokenKind::CloseDelim(DelimToken::Brace),
                "stream expression",
                parse_expr,
            )
        })?;
        return Ok(StreamConcatExpr {
            reverse: op == Op::LogicShL,
            slice,
            exprs,
        });
    }

    let first = parse_expr(p)?;

    // `{n{a, b}}` is a multiple concatenation.
    if p.peek(0).0 == TokenKind::OpenDelim(DelimToken::Brace) {
        let exprs = flanked(p, DelimToken::Brace, |p| {
            comma_list_nonempty(
                p,
                TokenKind::CloseDelim(DelimToken::Brace),
                "expression",
                parse_expr,
            )
        })?;
        return Ok(ConcatExpr {
            repeat: Some(Box::new(first)),
            exprs,
        });
    }

    let mut exprs = vec![first];
    while p.try_eat(TokenKind::Comma) {
        exprs.push(parse_expr(p)?);
    }
    Ok(ConcatExpr {
        repeat: None,
        exprs,
    })
}

/// An element select or part select inside brackets.
fn parse_range_expr(p: &mut Parser) -> ReportedResult<Expr> {
    let begin = p.peek(0).1;
    let first = parse_expr(p)?;
    let mode = match p.peek(0).0 {
        TokenKind::Colon => RangeMode::Absolute,
        TokenKind::AddColon => RangeMode::RelativeUp,
        TokenKind::SubColon => RangeMode::RelativeDown,
        _ => return Ok(first),
    };
    p.bump();
    let second = parse_expr(p)?;
    let mut span = begin;
    span.expand(p.last_span());
    Ok(Expr::new(
        span,
        RangeExpr {
            mode,
            lhs: Box::new(first),
            rhs: Box::new(second),
        },
    ))
}

fn parse_value_range(p: &mut Parser) -> ReportedResult<ValueRange> {
    if p.peek(0).0 == TokenKind::OpenDelim(DelimToken::Brack) {
        p.require_reported(TokenKind::OpenDelim(DelimToken::Brack))?;
        let mut sp = p.last_span();
        let lo = parse_expr(p)?;
        p.require_reported(TokenKind::Colon)?;
        let hi = parse_expr(p)?;
        p.require_reported(TokenKind::CloseDelim(DelimToken::Brack))?;
        sp.expand(p.last_span());
        Ok(ValueRange::Range { lo, hi, span: sp })
    } else {
        Ok(ValueRange::Single(parse_expr(p)?))
    }
}

fn parse_call_args(p: &mut Parser) -> ReportedResult<Vec<CallArg>> {
    comma_list(
        p,
        TokenKind::CloseDelim(DelimToken::Paren),
        "call argument",
        |p| {
            let begin = p.peek(0).1;
            // Named arguments: `.name(expr)` or `.name()`.
            if p.peek(0).0 == TokenKind::Period {
                p.bump();
                let name = p.eat_ident("argument name")?;
                let expr = flanked(p, DelimToken::Paren, |p| {
                    if p.peek(0).0 == TokenKind::CloseDelim(DelimToken::Paren) {
                        Ok(None)
                    } else {
                        parse_expr(p).map(Some)
                    }
                })?;
                let mut span = begin;
                span.expand(p.last_span());
                return Ok(CallArg {
                    span,
                    name: Some(name),
                    expr,
                });
            }
            // An empty positional argument before a comma.
            if matches!(
                p.peek(0).0,
                TokenKind::Comma | TokenKind::CloseDelim(DelimToken::Paren)
            ) {
                return Ok(CallArg {
                    span: begin,
                    name: None,
                    expr: None,
                });
            }
            let expr = parse_expr(p)?;
            let mut span = begin;
            span.expand(p.last_span());
            Ok(CallArg {
                span,
                name: None,
                expr: Some(expr),
            })
        },
    )
}

fn parse_pattern_field(p: &mut Parser) -> ReportedResult<PatternField> {
    let mut span = p.peek(0).1;

    if p.try_eat(TokenKind::Keyword(Kw::Default)) {
        p.require_reported(TokenKind::Colon)?;
        let value = Box::new(parse_expr(p)?);
        span.expand(p.last_span());
        return Ok(PatternField {
            span,
            data: PatternFieldData::Default(value),
        });
    }

    let first = parse_expr(p)?;
    let data = if p.try_eat(TokenKind::Colon) {
        let value = Box::new(parse_expr(p)?);
        PatternFieldData::Member(Box::new(first), value)
    } else if p.peek(0).0 == TokenKind::OpenDelim(DelimToken::Brace) {
        let exprs = flanked(p, DelimToken::Brace, |p| {
            comma_list_nonempty(
                p,
                TokenKind::CloseDelim(DelimToken::Brace),
                "expression",
                parse_expr,
            )
        })?;
        PatternFieldData::Repeat(Box::new(first), exprs)
    } else {
        PatternFieldData::Expr(Box::new(first))
    };
    span.expand(p.last_span());
    Ok(PatternField { span, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shannon_common::source::{get_source_manager, Source};
    use shannon_common::svint::SVInt;
    use std::cell::Cell;

    fn add_source(input: &str) -> Source {
        thread_local!(static INDEX: Cell<usize> = Cell::new(0));
        let sm = get_source_manager();
        let idx = INDEX.with(|i| {
            let v = i.get();
            i.set(v + 1);
            v
        });
        sm.add(&format!("parser_test_{}.sv", idx), input)
    }

    fn parse(input: &str) -> (Root, Vec<Token>, Diagnostics) {
        let diag = Diagnostics::new();
        let source = add_source(input);
        let pp = Preprocessor::new(source, &diag);
        let (root, tokens) = parse_source_file(pp, &diag);
        (root, tokens, diag)
    }

    fn parse_expr_text(input: &str) -> (Option<Expr>, Diagnostics) {
        let diag = Diagnostics::new();
        let source = add_source(input);
        let pp = Preprocessor::new(source, &diag);
        let (expr, _) = parse_expression(pp, &diag);
        (expr, diag)
    }

    fn parse_stmt_text(input: &str) -> (Option<Stmt>, Diagnostics) {
        let diag = Diagnostics::new();
        let source = add_source(input);
        let pp = Preprocessor::new(source, &diag);
        let (stmt, _) = parse_statement(pp, &diag);
        (stmt, diag)
    }

    fn expr(input: &str) -> Expr {
        let (expr, diag) = parse_expr_text(input);
        assert!(diag.is_empty(), "diagnostics for {:?}: {:?}", input, diag.sorted_codes());
        expr.expect("expression should parse")
    }

    fn render(tokens: &[Token]) -> String {
        let mut out = String::new();
        for tok in tokens {
            for trivia in &tok.trivia {
                out.push_str(&trivia.span.extract());
            }
            out.push_str(&tok.span.extract());
        }
        out
    }

    #[test]
    fn empty_module() {
        let (root, _, diag) = parse("module foo; endmodule");
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        assert_eq!(root.items.len(), 1);
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => {
                assert_eq!(decl.kind, ModuleKind::Module);
                assert_eq!(&*decl.name.name.as_str(), "foo");
                assert!(decl.items.is_empty());
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn module_with_ports_and_params() {
        let (root, _, diag) = parse(
            "module counter #(parameter WIDTH = 8, localparam ZERO = 0) (\n\
             \tinput  logic clk,\n\
             \tinput  logic rst_n,\n\
             \toutput logic [WIDTH-1:0] count\n\
             );\n\
             endmodule",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => {
                assert_eq!(decl.param_ports.len(), 2);
                assert!(!decl.param_ports[0].local);
                assert!(decl.param_ports[1].local);
                assert_eq!(decl.ports.len(), 3);
                assert_eq!(decl.ports[0].dir, Some(PortDir::Input));
                assert_eq!(decl.ports[2].dir, Some(PortDir::Output));
                assert_eq!(decl.ports[2].ty.data.dims.len(), 1);
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn parameter_continuation_elements() {
        let (root, _, diag) = parse("module m #(parameter A = 1, B = 2, parameter C = 3) (); endmodule");
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => {
                assert_eq!(decl.param_ports.len(), 2);
                assert_eq!(decl.param_ports[0].decls.len(), 2);
                assert_eq!(decl.param_ports[1].decls.len(), 1);
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn binary_precedence() {
        let e = expr("a + b * c");
        match e.data {
            BinaryExpr { op: Op::Add, rhs, .. } => match rhs.data {
                BinaryExpr { op: Op::Mul, .. } => (),
                other => panic!("expected multiplication on the right, got {:?}", other),
            },
            other => panic!("expected addition at the top, got {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let e = expr("a ** b ** c");
        match e.data {
            BinaryExpr { op: Op::Pow, lhs, rhs } => {
                assert!(matches!(lhs.data, IdentExpr(_)));
                assert!(matches!(rhs.data, BinaryExpr { op: Op::Pow, .. }));
            }
            other => panic!("expected power at the top, got {:?}", other),
        }
    }

    #[test]
    fn ternary_is_right_associative() {
        let e = expr("a ? b : c ? d : e");
        match e.data {
            TernaryExpr { false_expr, .. } => {
                assert!(matches!(false_expr.data, TernaryExpr { .. }));
            }
            other => panic!("expected ternary, got {:?}", other),
        }
    }

    #[test]
    fn shift_binds_looser_than_addition() {
        let e = expr("a << b + c");
        match e.data {
            BinaryExpr { op: Op::LogicShL, rhs, .. } => {
                assert!(matches!(rhs.data, BinaryExpr { op: Op::Add, .. }));
            }
            other => panic!("expected shift at the top, got {:?}", other),
        }
    }

    #[test]
    fn based_literal_values() {
        match expr("4'b1001").data {
            IntExpr(v) => {
                assert_eq!(v, SVInt::from_u64(4, false, 9));
            }
            other => panic!("expected integer, got {:?}", other),
        }
        match expr("32'hdead_beef").data {
            IntExpr(v) => assert_eq!(v.to_u32(), Some(0xdead_beef)),
            other => panic!("expected integer, got {:?}", other),
        }
        match expr("8'sd255").data {
            IntExpr(v) => {
                assert!(v.is_signed());
                assert_eq!(v.to_i32(), Some(-1));
            }
            other => panic!("expected integer, got {:?}", other),
        }
        // Unsized decimal literals are 32-bit signed.
        match expr("42").data {
            IntExpr(v) => {
                assert_eq!(v.width(), 32);
                assert!(v.is_signed());
                assert_eq!(v.to_i32(), Some(42));
            }
            other => panic!("expected integer, got {:?}", other),
        }
    }

    #[test]
    fn literal_size_truncation_is_diagnosed() {
        let (e, diag) = parse_expr_text("2'hff");
        assert!(e.is_some());
        assert_eq!(diag.sorted_codes(), vec![DiagCode::LiteralSizeTruncated]);
    }

    #[test]
    fn real_and_string_literals() {
        assert!(matches!(expr("3.25").data, RealExpr(v) if v == 3.25));
        assert!(matches!(expr("1e3").data, RealExpr(v) if v == 1000.0));
        match expr("\"hi\\n\"").data {
            StrExpr(n) => assert_eq!(&*n.as_str(), "hi\n"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn concatenations() {
        match expr("{a, b, c}").data {
            ConcatExpr { repeat: None, exprs } => assert_eq!(exprs.len(), 3),
            other => panic!("expected concatenation, got {:?}", other),
        }
        match expr("{3{x}}").data {
            ConcatExpr {
                repeat: Some(_),
                exprs,
            } => assert_eq!(exprs.len(), 1),
            other => panic!("expected multiple concatenation, got {:?}", other),
        }
        match expr("{<< 8 {a}}").data {
            StreamConcatExpr { reverse, slice, .. } => {
                assert!(reverse);
                assert!(slice.is_some());
            }
            other => panic!("expected streaming concatenation, got {:?}", other),
        }
        assert!(matches!(expr("{}").data, EmptyQueueExpr));
    }

    #[test]
    fn postfix_chains() {
        let e = expr("foo.bar[3].baz(1, 2)");
        match e.data {
            CallExpr(callee, args) => {
                assert_eq!(args.len(), 2);
                assert!(matches!(callee.data, MemberExpr { .. }));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn range_selects() {
        match expr("v[7:0]").data {
            IndexExpr { index, .. } => match index.data {
                RangeExpr {
                    mode: RangeMode::Absolute,
                    ..
                } => (),
                other => panic!("expected absolute range, got {:?}", other),
            },
            other => panic!("expected index, got {:?}", other),
        }
        match expr("v[base +: 4]").data {
            IndexExpr { index, .. } => {
                assert!(matches!(
                    index.data,
                    RangeExpr {
                        mode: RangeMode::RelativeUp,
                        ..
                    }
                ));
            }
            other => panic!("expected index, got {:?}", other),
        }
    }

    #[test]
    fn casts() {
        assert!(matches!(expr("int'(x)").data, CastExpr(..)));
        assert!(matches!(expr("signed'(x)").data, CastSignExpr(..)));
        assert!(matches!(expr("N'(x)").data, CastSizeExpr(..)));
    }

    #[test]
    fn inside_expression() {
        match expr("x inside {1, [2:5]}").data {
            InsideExpr(_, ranges) => {
                assert_eq!(ranges.len(), 2);
                assert!(matches!(ranges[1], ValueRange::Range { .. }));
            }
            other => panic!("expected inside expression, got {:?}", other),
        }
    }

    #[test]
    fn scoped_names() {
        match expr("pkg::thing").data {
            ScopeExpr(base, name) => {
                assert!(matches!(base.data, IdentExpr(_)));
                assert_eq!(&*name.name.as_str(), "thing");
            }
            other => panic!("expected scoped name, got {:?}", other),
        }
    }

    #[test]
    fn system_call() {
        match expr("$clog2(DEPTH)").data {
            CallExpr(callee, args) => {
                assert!(matches!(callee.data, SysIdentExpr(_)));
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn assignment_statements() {
        let (stmt, diag) = parse_stmt_text("begin x = 1; y <= 2; z += 3; end");
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match stmt.unwrap().data {
            SequentialBlock { stmts, .. } => {
                assert_eq!(stmts.len(), 3);
                assert!(matches!(
                    stmts[0].data,
                    AssignStmt {
                        nonblocking: false,
                        op: None,
                        ..
                    }
                ));
                assert!(matches!(
                    stmts[1].data,
                    AssignStmt {
                        nonblocking: true,
                        ..
                    }
                ));
                assert!(matches!(
                    stmts[2].data,
                    AssignStmt {
                        op: Some(Op::AssignAdd),
                        ..
                    }
                ));
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn leq_in_expression_context() {
        // Inside an if condition `<=` is relational, not an assignment.
        let (stmt, diag) = parse_stmt_text("if (a <= b) x = 1;");
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match stmt.unwrap().data {
            IfStmt { cond, .. } => {
                assert!(matches!(cond.data, BinaryExpr { op: Op::Leq, .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn control_flow_statements() {
        let (stmt, diag) = parse_stmt_text(
            "begin\n\
             if (x) y = 1; else y = 2;\n\
             case (sel) 2'd0: a = 1; 2'd1, 2'd2: a = 2; default: a = 3; endcase\n\
             for (int i = 0; i < 8; i = i + 1) s = s + i;\n\
             while (busy) @(posedge clk);\n\
             do t = t - 1; while (t > 0);\n\
             repeat (4) @(posedge clk);\n\
             forever #5 clk = ~clk;\n\
             foreach (mem[i]) mem[i] = 0;\n\
             end",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match stmt.unwrap().data {
            SequentialBlock { stmts, .. } => {
                assert_eq!(stmts.len(), 8);
                assert!(matches!(stmts[0].data, IfStmt { .. }));
                match &stmts[1].data {
                    CaseStmt { items, .. } => {
                        assert_eq!(items.len(), 3);
                        assert_eq!(items[1].guards.len(), 2);
                        assert!(items[2].guards.is_empty());
                    }
                    other => panic!("expected case, got {:?}", other),
                }
                assert!(matches!(stmts[2].data, ForStmt { .. }));
                assert!(matches!(stmts[3].data, WhileStmt { .. }));
                assert!(matches!(stmts[4].data, DoWhileStmt { .. }));
                assert!(matches!(stmts[5].data, RepeatStmt { .. }));
                assert!(matches!(stmts[6].data, ForeverStmt { .. }));
                assert!(matches!(stmts[7].data, ForeachStmt { .. }));
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn timing_controls() {
        let (stmt, diag) = parse_stmt_text("@(posedge clk or negedge rst_n) q <= d;");
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match stmt.unwrap().data {
            TimedStmt { control, .. } => match control {
                TimingControl::Event(terms) => {
                    assert_eq!(terms.len(), 2);
                    assert_eq!(terms[0].edge, Some(EdgeKind::Posedge));
                    assert_eq!(terms[1].edge, Some(EdgeKind::Negedge));
                }
                other => panic!("expected event control, got {:?}", other),
            },
            other => panic!("expected timed statement, got {:?}", other),
        }

        let (stmt, diag) = parse_stmt_text("@* y = a & b;");
        assert!(diag.is_empty());
        assert!(matches!(
            stmt.unwrap().data,
            TimedStmt {
                control: TimingControl::EventStar,
                ..
            }
        ));
    }

    #[test]
    fn assertion_statement() {
        let (stmt, diag) = parse_stmt_text("assert (x == 1) else $error(\"bad\");");
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match stmt.unwrap().data {
            AssertionStmt {
                kind: AssertionKind::Assert,
                else_stmt,
                ..
            } => assert!(else_stmt.is_some()),
            other => panic!("expected assertion, got {:?}", other),
        }
    }

    #[test]
    fn module_items() {
        let (root, _, diag) = parse(
            "module top;\n\
             import pkg::*;\n\
             parameter int W = 4;\n\
             typedef logic [W-1:0] word_t;\n\
             wire [7:0] bus;\n\
             logic valid;\n\
             word_t data;\n\
             assign bus = 8'hff;\n\
             always_ff @(posedge clk) data <= bus;\n\
             initial valid = 0;\n\
             function int add(int a, int b);\n\
             return a + b;\n\
             endfunction\n\
             endmodule",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => {
                assert_eq!(decl.items.len(), 10);
                assert!(matches!(decl.items[0].data, ItemData::ImportDecl(_)));
                assert!(matches!(decl.items[1].data, ItemData::ParamDecl(_)));
                assert!(matches!(decl.items[2].data, ItemData::TypedefDecl(_)));
                assert!(matches!(decl.items[3].data, ItemData::NetDecl(_)));
                assert!(matches!(decl.items[4].data, ItemData::VarDecl(_)));
                assert!(matches!(decl.items[5].data, ItemData::VarDecl(_)));
                assert!(matches!(decl.items[6].data, ItemData::ContAssign(_)));
                assert!(matches!(decl.items[7].data, ItemData::Procedure(_)));
                assert!(matches!(decl.items[8].data, ItemData::Procedure(_)));
                assert!(matches!(decl.items[9].data, ItemData::SubroutineDecl(_)));
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn instantiation_vs_variable() {
        let (root, _, diag) = parse(
            "module top;\n\
             foo u_foo (.clk(clk), .*);\n\
             foo #(.W(8)) u_bar (a, b);\n\
             bar_t my_var;\n\
             bar_t arr [3:0];\n\
             endmodule",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => {
                assert!(matches!(decl.items[0].data, ItemData::Inst(_)));
                match &decl.items[1].data {
                    ItemData::Inst(inst) => {
                        assert_eq!(inst.params.len(), 1);
                        assert_eq!(inst.insts[0].conns.len(), 2);
                    }
                    other => panic!("expected instantiation, got {:?}", other),
                }
                assert!(matches!(decl.items[2].data, ItemData::VarDecl(_)));
                assert!(matches!(decl.items[3].data, ItemData::VarDecl(_)));
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn generate_constructs() {
        let (root, _, diag) = parse(
            "module top #(parameter N = 4) ();\n\
             generate\n\
             for (genvar i = 0; i < N; i = i + 1) begin : gen_loop\n\
             foo u (.x(i));\n\
             end\n\
             if (N > 2) begin : gen_big\n\
             bar u ();\n\
             end else begin : gen_small\n\
             baz u ();\n\
             end\n\
             endgenerate\n\
             endmodule",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => match &decl.items[0].data {
                ItemData::GenerateRegion(items) => {
                    assert_eq!(items.len(), 2);
                    match &items[0].data {
                        ItemData::GenerateFor(gf) => {
                            assert!(gf.genvar);
                            assert_eq!(
                                gf.block.label.map(|l| l.name.as_str().to_string()),
                                Some("gen_loop".to_string())
                            );
                        }
                        other => panic!("expected generate for, got {:?}", other),
                    }
                    assert!(matches!(items[1].data, ItemData::GenerateIf(_)));
                }
                other => panic!("expected generate region, got {:?}", other),
            },
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn package_and_enum() {
        let (root, _, diag) = parse(
            "package my_pkg;\n\
             typedef enum logic [1:0] { IDLE = 0, RUN = 1, DONE = 2 } state_t;\n\
             parameter int DEPTH = 16;\n\
             endpackage",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::PackageDecl(pkg) => {
                assert_eq!(&*pkg.name.name.as_str(), "my_pkg");
                match &pkg.items[0].data {
                    ItemData::TypedefDecl(td) => match &td.ty.data.kind {
                        TypeKind::EnumType { variants, .. } => assert_eq!(variants.len(), 3),
                        other => panic!("expected enum, got {:?}", other),
                    },
                    other => panic!("expected typedef, got {:?}", other),
                }
            }
            other => panic!("expected package, got {:?}", other),
        }
    }

    #[test]
    fn struct_type() {
        let (root, _, diag) = parse(
            "module m;\n\
             typedef struct packed { logic [7:0] lo; logic [7:0] hi; } pair_t;\n\
             endmodule",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => match &decl.items[0].data {
                ItemData::TypedefDecl(td) => match &td.ty.data.kind {
                    TypeKind::StructType {
                        kind: StructKind::Struct,
                        packed: true,
                        members,
                    } => assert_eq!(members.len(), 2),
                    other => panic!("expected struct, got {:?}", other),
                },
                other => panic!("expected typedef, got {:?}", other),
            },
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn error_recovery_in_lists() {
        let (root, _, diag) = parse(
            "module m;\n\
             parameter p = ;\n\
             parameter q = 2;\n\
             endmodule",
        );
        assert!(diag
            .sorted_codes()
            .contains(&DiagCode::ExpectedExpression));
        // The second parameter survives the bad first one.
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => {
                assert!(decl
                    .items
                    .iter()
                    .any(|i| matches!(i.data, ItemData::ParamDecl(_))));
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn depth_guard() {
        let mut input = String::new();
        for _ in 0..300 {
            input.push('(');
        }
        input.push('x');
        for _ in 0..300 {
            input.push(')');
        }
        let (_, diag) = parse_expr_text(&input);
        assert!(diag
            .sorted_codes()
            .contains(&DiagCode::ParserDepthExceeded));
    }

    #[test]
    fn reparse_is_idempotent() {
        let input = "module m #(parameter W = 8) (input logic [W-1:0] a, output logic b);\n\
                     // a comment\n\
                     assign b = ^a;\n\
                     always_comb begin\n\
                     if (a == 0) b = 1'b0;\n\
                     end\n\
                     endmodule\n";
        let (_, tokens, diag) = parse(input);
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        let first = render(&tokens);
        assert_eq!(first, input);
        let (_, tokens2, diag2) = parse(&first);
        assert!(diag2.is_empty());
        assert_eq!(render(&tokens2), first);
    }

    #[test]
    fn macro_fed_module() {
        let (root, _, diag) = parse(
            "`define REG(n) logic [7:0] n;\n\
             module m;\n\
             `REG(r0)\n\
             `REG(r1)\n\
             endmodule",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ModuleDecl(decl) => assert_eq!(decl.items.len(), 2),
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn class_shell() {
        let (root, _, diag) = parse(
            "class packet extends base_packet;\n\
             int payload;\n\
             function int size();\n\
             return payload;\n\
             endfunction\n\
             endclass",
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
        match &root.items[0].data {
            ItemData::ClassDecl(decl) => {
                assert_eq!(&*decl.name.name.as_str(), "packet");
                assert!(decl.extends.is_some());
                assert_eq!(decl.items.len(), 2);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }
}

// Copyright (c) 2024-2026 The shannon developers

//! A preprocessor for SystemVerilog files, based on IEEE 1800-2017,
//! clause 22.
//!
//! The preprocessor wraps a stack of lexers and hands out a stream of
//! tokens with all directives interpreted: macros are expanded, conditional
//! branches are taken or folded into disabled-text trivia, include files are
//! pushed onto the lexer stack, and directive state (timescale, default net
//! type, keyword version) is tracked for the outside world to query.

use crate::keywords::{Kw, KeywordVersion};
use crate::lexer::{concatenate_tokens, lex_one, stringify_tokens, Lexer, LexerMode, LexerOptions};
use crate::token::*;
use shannon_common::errors::*;
use shannon_common::name::{get_name_table, Name, RcStr};
use shannon_common::source::*;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

/// Options controlling preprocessing behavior.
#[derive(Default)]
pub struct PreprocessorOptions {
    /// The maximum depth of the include stack; further attempts to include a
    /// file produce an error.
    pub max_include_depth: Option<usize>,
    /// Macros to predefine, of the form `NAME=value` or just `NAME` to
    /// define it to 1.
    pub predefines: Vec<String>,
    /// Macro names to undefine before reading any source.
    pub undefines: Vec<String>,
    /// The keyword version in effect at the start of the stream.
    pub keyword_version: Option<KeywordVersion>,
    /// Limits for the lexers spawned by this preprocessor.
    pub lexer: LexerOptions,
}

const DEFAULT_MAX_INCLUDE_DEPTH: usize = 1024;

/// The magnitude of one half of a `` `timescale `` specification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimescaleMagnitude {
    One,
    Ten,
    Hundred,
}

impl TimescaleMagnitude {
    fn from_digits(digits: &str) -> Option<TimescaleMagnitude> {
        match digits {
            "1" => Some(TimescaleMagnitude::One),
            "10" => Some(TimescaleMagnitude::Ten),
            "100" => Some(TimescaleMagnitude::Hundred),
            _ => None,
        }
    }
}

/// A magnitude and unit, e.g. the `10 ns` in a timescale.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TimescaleValue {
    pub magnitude: TimescaleMagnitude,
    pub unit: TimeUnit,
}

/// The state set by a `` `timescale `` directive.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Timescale {
    pub base: TimescaleValue,
    pub precision: TimescaleValue,
}

/// Resolves `` `include `` operands to source buffers. Supplied by the host;
/// the default implementation consults the source manager and the file
/// system relative to the including file.
pub trait IncludeResolver {
    fn resolve(&self, from: Source, file_name: &str, quoted: bool) -> Option<Source>;
}

/// The default resolver: previously registered buffers win, then paths
/// relative to the including file, then the bare path.
pub struct DefaultIncludeResolver;

impl IncludeResolver for DefaultIncludeResolver {
    fn resolve(&self, from: Source, file_name: &str, _quoted: bool) -> Option<Source> {
        let sm = get_source_manager();
        if let Some(src) = sm.find(file_name) {
            return Some(src);
        }
        if from.is_valid() {
            let base = from.get_path();
            if let Some(dir) = Path::new(&*base).parent() {
                if let Some(joined) = dir.join(file_name).to_str() {
                    if let Some(src) = sm.open(joined) {
                        return Some(src);
                    }
                }
            }
        }
        sm.open(file_name)
    }
}

/// A formal parameter of a user-defined macro.
#[derive(Debug)]
struct MacroFormal {
    name: Name,
    default: Option<Vec<Token>>,
}

/// A user-defined macro: its formals and replacement token list.
#[derive(Debug)]
struct UserMacro {
    name: Name,
    span: Span,
    formals: Option<Vec<MacroFormal>>,
    body: Vec<Token>,
}

/// The intrinsic macros, which cannot be undefined.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Intrinsic {
    Line,
    File,
}

#[derive(Clone)]
enum MacroDef {
    User(Rc<UserMacro>),
    Intrinsic(Intrinsic),
}

/// One level of the conditional-compilation stack.
#[derive(Debug)]
struct BranchEntry {
    /// Whether any branch of this chain has been taken yet; decides `elsif
    /// and `else.
    any_taken: bool,
    /// Whether the current branch is active.
    current_active: bool,
    /// Whether `else has been seen; further `elsif or `else are errors.
    else_seen: bool,
}

/// The preprocessor. Pull tokens with [`next`](Preprocessor::next); the
/// stream ends with an `Eof` token once the outermost buffer is exhausted.
pub struct Preprocessor<'a> {
    diag: &'a dyn DiagEmitter,
    options: PreprocessorOptions,
    stack: Vec<Lexer<'a>>,
    /// A token pulled from the lexer while peeking for concatenation.
    lookahead: Option<Token>,
    /// Expanded macro tokens to drain before pulling from the lexers.
    expanded: VecDeque<Token>,
    /// Trivia waiting to be attached to the next emitted token: consumed
    /// directives, disabled regions, and trailing trivia of popped buffers.
    pending: Vec<Trivia>,
    macros: HashMap<Name, MacroDef>,
    expansion_stack: Vec<Name>,
    branch_stack: Vec<BranchEntry>,
    keyword_stack: Vec<KeywordVersion>,
    keyword_version: KeywordVersion,
    timescale: Option<Timescale>,
    default_nettype: Option<Kw>,
    in_celldefine: bool,
    unconnected_drive: Option<Kw>,
    resolver: Box<dyn IncludeResolver + 'a>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(source: Source, diag: &'a dyn DiagEmitter) -> Preprocessor<'a> {
        Preprocessor::with_options(source, diag, Default::default())
    }

    pub fn with_options(
        source: Source,
        diag: &'a dyn DiagEmitter,
        options: PreprocessorOptions,
    ) -> Preprocessor<'a> {
        let keyword_version = options.keyword_version.unwrap_or_default();
        let nt = get_name_table();
        let mut macros = HashMap::new();
        macros.insert(
            nt.intern("__LINE__"),
            MacroDef::Intrinsic(Intrinsic::Line),
        );
        macros.insert(
            nt.intern("__FILE__"),
            MacroDef::Intrinsic(Intrinsic::File),
        );
        let mut pp = Preprocessor {
            diag,
            stack: Vec::new(),
            lookahead: None,
            expanded: VecDeque::new(),
            pending: Vec::new(),
            macros,
            expansion_stack: Vec::new(),
            branch_stack: Vec::new(),
            keyword_stack: Vec::new(),
            keyword_version,
            timescale: None,
            default_nettype: Some(Kw::Wire),
            in_celldefine: false,
            unconnected_drive: None,
            resolver: Box::new(DefaultIncludeResolver),
            options,
        };
        let predefines = std::mem::replace(&mut pp.options.predefines, Vec::new());
        for def in &predefines {
            pp.predefine(def);
        }
        pp.options.predefines = predefines;
        let undefines = std::mem::replace(&mut pp.options.undefines, Vec::new());
        for name in &undefines {
            pp.undefine(name);
        }
        pp.options.undefines = undefines;
        pp.push_source(source);
        pp
    }

    /// Replace the include resolver.
    pub fn set_include_resolver(&mut self, resolver: Box<dyn IncludeResolver + 'a>) {
        self.resolver = resolver;
    }

    /// Push a source buffer onto the include stack.
    pub fn push_source(&mut self, source: Source) {
        self.stack.push(Lexer::with_options(
            source,
            self.diag,
            self.keyword_version,
            self.options.lexer,
        ));
    }

    /// Push a piece of source text onto the include stack, registering it
    /// as an anonymous buffer.
    pub fn push_text(&mut self, text: &str) {
        let source = get_source_manager().add_anonymous(text.to_string());
        self.push_source(source);
    }

    /// Parse `def` (of the form `NAME`, `NAME=value`, or `NAME(args)=value`)
    /// as if it followed a `` `define `` directive and install the macro.
    pub fn predefine(&mut self, def: &str) {
        let text = match def.find('=') {
            Some(idx) => format!("`define {} {}\n", &def[..idx], &def[idx + 1..]),
            None => format!("`define {} 1\n", def),
        };
        let source = get_source_manager().add_anonymous(text);
        let saved = self.lookahead.take();
        self.stack.push(Lexer::with_options(
            source,
            self.diag,
            self.keyword_version,
            self.options.lexer,
        ));
        let dtok = self.lexer_token(LexerMode::Normal);
        if let TokenKind::Directive(_) = dtok.kind {
            let body = self.collect_to_end_of_directive();
            self.parse_define(&dtok, body);
        }
        self.stack.pop();
        self.lookahead = saved;
    }

    /// Remove a user macro. Returns false for unknown names and for the
    /// intrinsic macros, which cannot be undefined.
    pub fn undefine(&mut self, name: &str) -> bool {
        let name = get_name_table().intern(name);
        match self.macros.get(&name) {
            Some(MacroDef::User(_)) => {
                self.macros.remove(&name);
                true
            }
            _ => false,
        }
    }

    /// Remove all user macros, leaving the intrinsics in place.
    pub fn undefine_all(&mut self) {
        self.macros.retain(|_, def| match def {
            MacroDef::Intrinsic(_) => true,
            MacroDef::User(_) => false,
        });
    }

    /// Check whether a macro is defined. Includes the intrinsics.
    pub fn is_defined(&self, name: &str) -> bool {
        get_name_table()
            .find(name)
            .map(|n| self.macros.contains_key(&n))
            .unwrap_or(false)
    }

    /// The active timescale, if any `` `timescale `` directive has been seen.
    pub fn timescale(&self) -> Option<Timescale> {
        self.timescale
    }

    /// The net type used for implicit declarations; `None` after
    /// `` `default_nettype none ``.
    pub fn default_nettype(&self) -> Option<Kw> {
        self.default_nettype
    }

    /// The keyword version currently in effect.
    pub fn keyword_version(&self) -> KeywordVersion {
        self.keyword_version
    }

    /// Whether the stream is currently between `` `celldefine `` and
    /// `` `endcelldefine ``.
    pub fn in_celldefine(&self) -> bool {
        self.in_celldefine
    }

    /// The pull strength set by `` `unconnected_drive ``, if any.
    pub fn unconnected_drive(&self) -> Option<Kw> {
        self.unconnected_drive
    }

    /// Get the next token, after applying preprocessor rules.
    pub fn next(&mut self) -> Token {
        loop {
            let tok = match self.expanded.pop_front() {
                Some(tok) => tok,
                None => {
                    let tok = self.raw(LexerMode::Normal);
                    match tok.kind {
                        TokenKind::Directive(name) => {
                            if self.is_active() {
                                self.handle_directive(tok, name);
                            } else {
                                self.handle_inactive_directive(tok, name);
                            }
                            continue;
                        }
                        TokenKind::Eof => {
                            if self.stack.len() > 1 {
                                self.pending.extend(tok.trivia);
                                self.stack.pop();
                                continue;
                            }
                            if !self.branch_stack.is_empty() {
                                self.diag.emit(
                                    DiagBuilder2::error(
                                        "unexpected end of file before `endif; \
                                         conditional stack is unbalanced",
                                    )
                                    .code(DiagCode::UnbalancedConditionalDirective)
                                    .span(tok.span),
                                );
                                self.branch_stack.clear();
                            }
                            return self.emit(tok);
                        }
                        _ if !self.is_active() => {
                            self.absorb_disabled(&tok);
                            continue;
                        }
                        _ => tok,
                    }
                }
            };

            let tok = self.try_implicit_concat(tok);
            return self.emit(tok);
        }
    }

    /// Attach any pending trivia to a token about to be handed out.
    fn emit(&mut self, mut tok: Token) -> Token {
        if !self.pending.is_empty() {
            let mut trivia = std::mem::replace(&mut self.pending, Vec::new());
            trivia.extend(tok.trivia);
            tok.trivia = trivia;
        }
        tok
    }

    /// When a token that could paste is directly followed by a macro usage
    /// with no intervening trivia, the expansion's first token is glued on.
    /// This is what makes `1`FOO`BAR` a single literal.
    fn try_implicit_concat(&mut self, mut tok: Token) -> Token {
        while self.expanded.is_empty() && is_concat_eligible(tok.kind) {
            let la = self.raw(LexerMode::Normal);
            let name = match la.kind {
                TokenKind::Directive(name) if la.trivia.is_empty() => name,
                _ => {
                    self.lookahead = Some(la);
                    break;
                }
            };
            let mac = match self.macros.get(&name) {
                Some(MacroDef::User(mac)) => mac.clone(),
                _ => {
                    self.lookahead = Some(la);
                    break;
                }
            };
            let out = match self.expand_usage_from_stream(&la, &mac) {
                Some(out) => out,
                None => break,
            };
            let mut iter = out.into_iter();
            match iter.next() {
                Some(first)
                    if first.trivia.is_empty() && is_concat_eligible(first.kind) =>
                {
                    match concatenate_tokens(&tok, &first) {
                        Some(mut merged) => {
                            merged.trivia = std::mem::replace(&mut tok.trivia, Vec::new());
                            tok = merged;
                            self.expanded.extend(iter);
                        }
                        None => {
                            self.expanded.push_back(first);
                            self.expanded.extend(iter);
                            break;
                        }
                    }
                }
                Some(first) => {
                    self.expanded.push_back(first);
                    self.expanded.extend(iter);
                    break;
                }
                None => break,
            }
        }
        tok
    }

    /// Pull the next raw token from the lexer stack, honoring the lookahead
    /// buffer.
    fn raw(&mut self, mode: LexerMode) -> Token {
        if let Some(tok) = self.lookahead.take() {
            return tok;
        }
        match self.stack.last_mut() {
            Some(lexer) => lexer.next_token(mode),
            None => Token::missing(TokenKind::Eof),
        }
    }

    fn lexer_token(&mut self, mode: LexerMode) -> Token {
        match self.stack.last_mut() {
            Some(lexer) => lexer.next_token(mode),
            None => Token::missing(TokenKind::Eof),
        }
    }

    /// Read one operand token of a directive. An end-of-directive token is
    /// pushed back so the directive's epilogue still sees it, keeping the
    /// stream synchronized after malformed directives.
    fn directive_operand(&mut self) -> Option<Token> {
        let tok = self.raw(LexerMode::Directive);
        match tok.kind {
            TokenKind::EndOfDirective | TokenKind::Eof => {
                self.lookahead = Some(tok);
                None
            }
            _ => Some(tok),
        }
    }

    fn is_active(&self) -> bool {
        self.branch_stack.iter().all(|b| b.current_active)
    }

    fn parent_active(&self) -> bool {
        self.branch_stack
            .iter()
            .take(self.branch_stack.len().saturating_sub(1))
            .all(|b| b.current_active)
    }

    /// Fold a skipped token into the disabled-text trivia lump.
    fn absorb_disabled(&mut self, tok: &Token) {
        let mut span = tok.span;
        for t in &tok.trivia {
            span.expand(t.span);
        }
        self.absorb_disabled_span(span);
    }

    fn absorb_disabled_span(&mut self, span: Span) {
        if !span.source.is_valid() {
            return;
        }
        if let Some(last) = self.pending.last_mut() {
            if last.kind == TriviaKind::DisabledText && last.span.source == span.source {
                last.span.expand(span);
                return;
            }
        }
        self.pending.push(Trivia::new(TriviaKind::DisabledText, span));
    }

    // ------------------------------------------------------------------
    // Directive dispatch
    // ------------------------------------------------------------------

    fn handle_directive(&mut self, tok: Token, name: Name) {
        let text = name.as_str();
        match &*text {
            "ifdef" => self.handle_conditional_push(tok, false),
            "ifndef" => self.handle_conditional_push(tok, true),
            "elsif" => self.handle_elsif(tok),
            "else" => self.handle_else(tok),
            "endif" => self.handle_endif(tok),
            "define" => {
                self.pending.extend(tok.trivia.clone());
                let body = self.collect_to_end_of_directive();
                let end = self.parse_define(&tok, body);
                self.push_directive_trivia(DirectiveKind::Define, tok.span, end);
            }
            "undef" => self.handle_undef(tok),
            "undefineall" => {
                self.undefine_all();
                self.finish_simple_directive(tok, DirectiveKind::UndefineAll);
            }
            "include" => self.handle_include(tok),
            "timescale" => self.handle_timescale(tok),
            "default_nettype" => self.handle_default_nettype(tok),
            "resetall" => {
                self.timescale = None;
                self.default_nettype = Some(Kw::Wire);
                self.in_celldefine = false;
                self.unconnected_drive = None;
                self.keyword_stack.clear();
                let version = self.options.keyword_version.unwrap_or_default();
                self.set_keyword_version(version);
                self.finish_simple_directive(tok, DirectiveKind::Resetall);
            }
            "line" => self.handle_line(tok),
            "begin_keywords" => self.handle_begin_keywords(tok),
            "end_keywords" => {
                match self.keyword_stack.pop() {
                    Some(_) => {
                        let restored = self
                            .keyword_stack
                            .last()
                            .copied()
                            .unwrap_or_else(|| self.options.keyword_version.unwrap_or_default());
                        self.set_keyword_version(restored);
                    }
                    None => {
                        self.diag.emit(
                            DiagBuilder2::error("`end_keywords without matching `begin_keywords")
                                .code(DiagCode::MismatchedEndKeywords)
                                .span(tok.span),
                        );
                    }
                }
                self.finish_simple_directive(tok, DirectiveKind::EndKeywords);
            }
            "celldefine" => {
                self.in_celldefine = true;
                self.finish_simple_directive(tok, DirectiveKind::Celldefine);
            }
            "endcelldefine" => {
                self.in_celldefine = false;
                self.finish_simple_directive(tok, DirectiveKind::Endcelldefine);
            }
            "unconnected_drive" => {
                match self.directive_operand() {
                    Some(operand) => match operand.kind {
                        TokenKind::Ident(name)
                            if matches!(&*name.as_str(), "pull0" | "pull1") =>
                        {
                            self.unconnected_drive = Some(if &*name.as_str() == "pull0" {
                                Kw::Tri0
                            } else {
                                Kw::Tri1
                            });
                        }
                        _ => {
                            self.diag.emit(
                                DiagBuilder2::error("expected `pull0` or `pull1`")
                                    .code(DiagCode::ExpectedEndOfDirective)
                                    .span(operand.span),
                            );
                        }
                    },
                    None => {
                        self.diag.emit(
                            DiagBuilder2::error("expected `pull0` or `pull1`")
                                .code(DiagCode::ExpectedEndOfDirective)
                                .span(tok.span),
                        );
                    }
                }
                self.finish_simple_directive(tok, DirectiveKind::UnconnectedDrive);
            }
            "nounconnected_drive" => {
                self.unconnected_drive = None;
                self.finish_simple_directive(tok, DirectiveKind::NoUnconnectedDrive);
            }
            "pragma" => self.finish_simple_directive(tok, DirectiveKind::Pragma),
            _ => self.handle_macro_usage(tok, name),
        }
    }

    /// Directives inside an inactive conditional branch: the conditional
    /// family still steers the branch stack, everything else is skipped as
    /// disabled text.
    fn handle_inactive_directive(&mut self, tok: Token, name: Name) {
        let text = name.as_str();
        match &*text {
            "ifdef" => self.handle_conditional_push(tok, false),
            "ifndef" => self.handle_conditional_push(tok, true),
            "elsif" => self.handle_elsif(tok),
            "else" => self.handle_else(tok),
            "endif" => self.handle_endif(tok),
            _ => self.absorb_disabled(&tok),
        }
    }

    /// Consume directive-mode tokens up to the end of the directive,
    /// complaining about the first unexpected one. Returns the end location.
    fn expect_end_of_directive(&mut self) -> Span {
        let mut reported = false;
        loop {
            let tok = self.raw(LexerMode::Directive);
            match tok.kind {
                TokenKind::EndOfDirective | TokenKind::Eof => return tok.span,
                _ => {
                    if !reported {
                        reported = true;
                        self.diag.emit(
                            DiagBuilder2::warning(format!(
                                "extra tokens after directive: `{}`",
                                tok.kind
                            ))
                            .code(DiagCode::ExpectedEndOfDirective)
                            .span(tok.span),
                        );
                    }
                }
            }
        }
    }

    /// Collect all tokens up to the end of the current directive.
    fn collect_to_end_of_directive(&mut self) -> Vec<Token> {
        let mut toks = Vec::new();
        loop {
            let tok = self.raw(LexerMode::Directive);
            match tok.kind {
                TokenKind::EndOfDirective | TokenKind::Eof => return toks,
                _ => toks.push(tok),
            }
        }
    }

    fn finish_simple_directive(&mut self, tok: Token, kind: DirectiveKind) {
        self.pending.extend(tok.trivia.clone());
        let end = self.expect_end_of_directive();
        self.push_directive_trivia(kind, tok.span, end);
    }

    fn push_directive_trivia(&mut self, kind: DirectiveKind, begin: Span, end: Span) {
        let mut span = begin;
        span.expand(end);
        self.pending
            .push(Trivia::new(TriviaKind::Directive(kind), span));
    }

    // ------------------------------------------------------------------
    // Conditional compilation
    // ------------------------------------------------------------------

    /// Read the macro-name operand of a conditional directive. The operand
    /// may itself be a macro usage that expands to a name.
    fn conditional_operand(&mut self) -> Option<Name> {
        let tok = match self.directive_operand() {
            Some(tok) => tok,
            None => {
                self.diag.emit(
                    DiagBuilder2::error("expected macro name after conditional directive")
                        .code(DiagCode::ExpectedMacroName),
                );
                return None;
            }
        };
        match tok.kind {
            TokenKind::Ident(name) | TokenKind::EscIdent(name) => Some(name),
            TokenKind::Directive(name) => {
                let mac = match self.macros.get(&name) {
                    Some(MacroDef::User(mac)) => mac.clone(),
                    _ => {
                        self.diag.emit(
                            DiagBuilder2::error(format!("`{} is not a defined macro", name))
                                .code(DiagCode::UnknownMacro)
                                .span(tok.span),
                        );
                        return None;
                    }
                };
                let out = self.expand_usage_in_directive(&tok, &mac)?;
                match out.first().map(|t| t.kind) {
                    Some(TokenKind::Ident(name)) => Some(name),
                    _ => {
                        self.diag.emit(
                            DiagBuilder2::error("macro must expand to a name here")
                                .code(DiagCode::ExpectedMacroName)
                                .span(tok.span),
                        );
                        None
                    }
                }
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error("expected macro name after conditional directive")
                        .code(DiagCode::ExpectedMacroName)
                        .span(tok.span),
                );
                None
            }
        }
    }

    fn handle_conditional_push(&mut self, tok: Token, inverted: bool) {
        self.pending.extend(tok.trivia.clone());
        let name = self.conditional_operand();
        let end = self.expect_end_of_directive();
        let defined = name
            .map(|n| self.macros.contains_key(&n))
            .unwrap_or(false);
        let parent_active = self.is_active();
        let taken = parent_active && (defined ^ inverted);
        self.branch_stack.push(BranchEntry {
            any_taken: taken,
            current_active: taken,
            else_seen: false,
        });
        let kind = if inverted {
            DirectiveKind::Ifndef
        } else {
            DirectiveKind::Ifdef
        };
        self.push_directive_trivia(kind, tok.span, end);
    }

    fn handle_elsif(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let name = self.conditional_operand();
        let end = self.expect_end_of_directive();
        let defined = name
            .map(|n| self.macros.contains_key(&n))
            .unwrap_or(false);
        let parent_active = self.parent_active();
        match self.branch_stack.last_mut() {
            Some(entry) if !entry.else_seen => {
                if entry.any_taken {
                    entry.current_active = false;
                } else {
                    entry.current_active = parent_active && defined;
                    entry.any_taken |= entry.current_active;
                }
            }
            Some(_) => {
                self.diag.emit(
                    DiagBuilder2::error("`elsif is not allowed after `else")
                        .code(DiagCode::ElsifAfterElse)
                        .span(tok.span),
                );
            }
            None => {
                self.diag.emit(
                    DiagBuilder2::error("`elsif without a preceding `ifdef")
                        .code(DiagCode::UnexpectedConditionalDirective)
                        .span(tok.span),
                );
            }
        }
        self.push_directive_trivia(DirectiveKind::Elsif, tok.span, end);
    }

    fn handle_else(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let end = self.expect_end_of_directive();
        let parent_active = self.parent_active();
        match self.branch_stack.last_mut() {
            Some(entry) if !entry.else_seen => {
                entry.else_seen = true;
                entry.current_active = parent_active && !entry.any_taken;
                entry.any_taken = true;
            }
            Some(_) => {
                self.diag.emit(
                    DiagBuilder2::error("multiple `else branches in one conditional")
                        .code(DiagCode::UnexpectedConditionalDirective)
                        .span(tok.span),
                );
            }
            None => {
                self.diag.emit(
                    DiagBuilder2::error("`else without a preceding `ifdef")
                        .code(DiagCode::UnexpectedConditionalDirective)
                        .span(tok.span),
                );
            }
        }
        self.push_directive_trivia(DirectiveKind::Else, tok.span, end);
    }

    fn handle_endif(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let end = self.expect_end_of_directive();
        if self.branch_stack.pop().is_none() {
            self.diag.emit(
                DiagBuilder2::error("`endif without a preceding `ifdef")
                    .code(DiagCode::UnexpectedConditionalDirective)
                    .span(tok.span),
            );
        }
        self.push_directive_trivia(DirectiveKind::Endif, tok.span, end);
    }

    // ------------------------------------------------------------------
    // Simple state directives
    // ------------------------------------------------------------------

    fn handle_undef(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let operand = match self.directive_operand() {
            Some(operand) => operand,
            None => {
                self.diag.emit(
                    DiagBuilder2::error("expected macro name after `undef")
                        .code(DiagCode::ExpectedMacroName)
                        .span(tok.span),
                );
                let end = self.expect_end_of_directive();
                self.push_directive_trivia(DirectiveKind::Undef, tok.span, end);
                return;
            }
        };
        match operand.kind {
            TokenKind::Ident(name) | TokenKind::EscIdent(name) => {
                match self.macros.get(&name) {
                    Some(MacroDef::Intrinsic(_)) => {
                        self.diag.emit(
                            DiagBuilder2::error(format!(
                                "`{}` is an intrinsic macro and cannot be undefined",
                                name
                            ))
                            .code(DiagCode::InvalidMacroName)
                            .span(operand.span),
                        );
                    }
                    _ => {
                        self.macros.remove(&name);
                    }
                }
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error("expected macro name after `undef")
                        .code(DiagCode::ExpectedMacroName)
                        .span(operand.span),
                );
            }
        }
        let end = self.expect_end_of_directive();
        self.push_directive_trivia(DirectiveKind::Undef, tok.span, end);
    }

    fn handle_include(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let operand = self.raw(LexerMode::IncludeFileName);
        let resolved = match operand.kind {
            TokenKind::EndOfDirective | TokenKind::Eof => {
                self.lookahead = Some(operand);
                None
            }
            TokenKind::IncludeFileName(name, quoted) => Some((name, quoted)),
            TokenKind::Directive(name) => {
                // The operand may be a macro that expands to the quoted form.
                let mac = match self.macros.get(&name) {
                    Some(MacroDef::User(mac)) => Some(mac.clone()),
                    _ => None,
                };
                match mac {
                    Some(mac) => match self.expand_usage_in_directive(&operand, &mac) {
                        Some(out) => match out.first().map(|t| t.kind) {
                            Some(TokenKind::Literal(Lit::Str(name))) => Some((name, true)),
                            _ => None,
                        },
                        None => None,
                    },
                    None => None,
                }
            }
            _ => None,
        };
        let end = self.expect_end_of_directive();
        match resolved {
            Some((name, quoted)) => {
                let max_depth = self
                    .options
                    .max_include_depth
                    .unwrap_or(DEFAULT_MAX_INCLUDE_DEPTH);
                if self.stack.len() >= max_depth {
                    self.diag.emit(
                        DiagBuilder2::fatal(format!(
                            "maximum include depth of {} exceeded",
                            max_depth
                        ))
                        .code(DiagCode::IncludeDepthExceeded)
                        .span(tok.span),
                    );
                } else {
                    let from = self.stack.last().map(|l| l.source()).unwrap_or(INVALID_SOURCE);
                    match self.resolver.resolve(from, &name.as_str(), quoted) {
                        Some(source) => {
                            trace!("including {:?}", source);
                            self.push_source(source);
                        }
                        None => {
                            self.diag.emit(
                                DiagBuilder2::error(format!(
                                    "include file `{}` not found",
                                    name
                                ))
                                .code(DiagCode::IncludeNotFound)
                                .span(tok.span),
                            );
                        }
                    }
                }
            }
            None => {
                self.diag.emit(
                    DiagBuilder2::error(
                        "expected `\"filename\"` or `<filename>` after `include",
                    )
                    .code(DiagCode::ExpectedIncludeFileName)
                    .span(tok.span),
                );
            }
        }
        self.push_directive_trivia(DirectiveKind::Include, tok.span, end);
    }

    /// Parse one half of a timescale specification: either a time literal
    /// like `10ns` or a number and unit separated by whitespace.
    fn timescale_value(&mut self) -> Option<TimescaleValue> {
        let tok = self.directive_operand()?;
        let (digits, frac, unit) = match tok.kind {
            TokenKind::Literal(Lit::Time(value, frac, unit)) => (value, frac, Some(unit)),
            TokenKind::Literal(Lit::Number(value)) => {
                let unit_tok = self.directive_operand()?;
                match unit_tok.kind {
                    TokenKind::Ident(name) => {
                        (value, None, TimeUnit::from_suffix(&name.as_str()))
                    }
                    _ => (value, None, None),
                }
            }
            _ => return None,
        };
        let magnitude = TimescaleMagnitude::from_digits(&digits.as_str())?;
        if frac.is_some() {
            return None;
        }
        Some(TimescaleValue {
            magnitude,
            unit: unit?,
        })
    }

    fn handle_timescale(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let base = self.timescale_value();
        let slash_ok = match self.directive_operand() {
            Some(slash) => slash.kind == TokenKind::Operator(Op::Div),
            None => false,
        };
        let precision = if slash_ok { self.timescale_value() } else { None };
        let end = self.expect_end_of_directive();
        match (base, precision) {
            (Some(base), Some(precision)) if slash_ok => {
                self.timescale = Some(Timescale { base, precision });
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error(
                        "expected timescale of the form `<magnitude> <unit> / \
                         <magnitude> <unit>` with magnitude 1, 10, or 100",
                    )
                    .code(DiagCode::InvalidTimescale)
                    .span(tok.span),
                );
            }
        }
        self.push_directive_trivia(DirectiveKind::Timescale, tok.span, end);
    }

    fn handle_default_nettype(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let operand = match self.directive_operand() {
            Some(operand) => operand,
            None => {
                self.diag.emit(
                    DiagBuilder2::error("expected a net type or `none`")
                        .code(DiagCode::ExpectedEndOfDirective)
                        .span(tok.span),
                );
                let end = self.expect_end_of_directive();
                self.push_directive_trivia(DirectiveKind::DefaultNettype, tok.span, end);
                return;
            }
        };
        match operand.kind {
            TokenKind::Keyword(kw)
                if matches!(
                    kw,
                    Kw::Wire
                        | Kw::Tri
                        | Kw::Tri0
                        | Kw::Tri1
                        | Kw::Wand
                        | Kw::Triand
                        | Kw::Wor
                        | Kw::Trior
                        | Kw::Trireg
                        | Kw::Uwire
                ) =>
            {
                self.default_nettype = Some(kw);
            }
            TokenKind::Ident(name) if &*name.as_str() == "none" => {
                self.default_nettype = None;
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error("expected a net type or `none`")
                        .code(DiagCode::ExpectedEndOfDirective)
                        .span(operand.span),
                );
            }
        }
        let end = self.expect_end_of_directive();
        self.push_directive_trivia(DirectiveKind::DefaultNettype, tok.span, end);
    }

    fn handle_line(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let line_tok = self.directive_operand();
        let file_tok = self.directive_operand();
        let level_tok = self.directive_operand();
        let end = self.expect_end_of_directive();
        let line = match line_tok.map(|t| t.kind) {
            Some(TokenKind::Literal(Lit::Number(n))) => n.as_str().parse::<usize>().ok(),
            _ => None,
        };
        let file = match file_tok.map(|t| t.kind) {
            Some(TokenKind::Literal(Lit::Str(n))) => Some(n),
            _ => None,
        };
        let level_ok = match level_tok.map(|t| t.kind) {
            Some(TokenKind::Literal(Lit::Number(n))) => {
                matches!(&*n.as_str(), "0" | "1" | "2")
            }
            _ => false,
        };
        match (line, file, level_ok) {
            (Some(line), Some(file), true) => {
                let source = self
                    .stack
                    .last()
                    .map(|l| l.source())
                    .unwrap_or(INVALID_SOURCE);
                if source.is_valid() {
                    // The requested numbering applies starting on the line
                    // after the directive.
                    let content = source.get_content();
                    let bytes = content.bytes();
                    let mut offset = end.end;
                    if bytes.get(offset) == Some(&b'\r') {
                        offset += 1;
                    }
                    if bytes.get(offset) == Some(&b'\n') {
                        offset += 1;
                    }
                    get_source_manager().add_line_override(
                        source,
                        offset,
                        line,
                        RcStr::new(&file.as_str()),
                    );
                }
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error(
                        "expected `line <number> \"<file>\" <level>` with level 0, 1, or 2",
                    )
                    .code(DiagCode::InvalidLineDirective)
                    .span(tok.span),
                );
            }
        }
        self.push_directive_trivia(DirectiveKind::Line, tok.span, end);
    }

    fn handle_begin_keywords(&mut self, tok: Token) {
        self.pending.extend(tok.trivia.clone());
        let operand = self.directive_operand();
        let version = match operand.as_ref().map(|t| t.kind) {
            Some(TokenKind::Literal(Lit::Str(name))) => {
                KeywordVersion::from_version_token(&name.as_str())
            }
            _ => None,
        };
        match version {
            Some(version) => {
                self.keyword_stack.push(version);
                self.set_keyword_version(version);
            }
            None => {
                let span = operand.map(|t| t.span).unwrap_or(tok.span);
                self.diag.emit(
                    DiagBuilder2::error(
                        "expected a version string such as \"1800-2017\" after `begin_keywords",
                    )
                    .code(DiagCode::UnrecognizedKeywordVersion)
                    .span(span),
                );
            }
        }
        let end = self.expect_end_of_directive();
        self.push_directive_trivia(DirectiveKind::BeginKeywords, tok.span, end);
    }

    fn set_keyword_version(&mut self, version: KeywordVersion) {
        self.keyword_version = version;
        for lexer in &mut self.stack {
            lexer.set_keyword_version(version);
        }
    }

    // ------------------------------------------------------------------
    // Macro definition and expansion
    // ------------------------------------------------------------------

    /// Parse a `` `define `` directive from its collected body tokens.
    /// Returns the span of the end of the definition for trivia purposes.
    fn parse_define(&mut self, dtok: &Token, toks: Vec<Token>) -> Span {
        let end = toks.last().map(|t| t.span).unwrap_or(dtok.span);
        let mut i = 0;
        let name = match toks.get(0).map(|t| t.kind) {
            Some(TokenKind::Ident(name)) | Some(TokenKind::EscIdent(name)) => name,
            Some(TokenKind::Keyword(kw)) => {
                self.diag.emit(
                    DiagBuilder2::error(format!(
                        "keyword `{}` cannot be used as a macro name",
                        kw.as_str()
                    ))
                    .code(DiagCode::InvalidMacroName)
                    .span(toks[0].span),
                );
                return end;
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error("expected macro name after `define")
                        .code(DiagCode::ExpectedMacroName)
                        .span(dtok.span),
                );
                return end;
            }
        };
        if let Some(MacroDef::Intrinsic(_)) = self.macros.get(&name) {
            self.diag.emit(
                DiagBuilder2::error(format!("`{}` is an intrinsic macro", name))
                    .code(DiagCode::InvalidMacroName)
                    .span(toks[0].span),
            );
            return end;
        }
        i += 1;

        // A formal argument list only exists if the parenthesis directly
        // follows the name, without whitespace.
        let formals = match toks.get(i) {
            Some(t)
                if t.kind == TokenKind::OpenDelim(DelimToken::Paren)
                    && t.trivia.is_empty() =>
            {
                i += 1;
                match self.parse_formal_list(&toks, &mut i) {
                    Some(formals) => Some(formals),
                    None => return end,
                }
            }
            _ => None,
        };

        let body: Vec<Token> = toks[i..].to_vec();
        trace!("defined macro `{}` with {} body tokens", name, body.len());
        let mut span = dtok.span;
        span.expand(end);
        self.macros.insert(
            name,
            MacroDef::User(Rc::new(UserMacro {
                name,
                span,
                formals,
                body,
            })),
        );
        end
    }

    fn parse_formal_list(
        &mut self,
        toks: &[Token],
        i: &mut usize,
    ) -> Option<Vec<MacroFormal>> {
        let mut formals = Vec::new();
        loop {
            match toks.get(*i).map(|t| t.kind) {
                Some(TokenKind::CloseDelim(DelimToken::Paren)) => {
                    *i += 1;
                    return Some(formals);
                }
                Some(TokenKind::Ident(name)) | Some(TokenKind::EscIdent(name)) => {
                    *i += 1;
                    self.parse_formal_tail(toks, i, name, &mut formals)?;
                }
                // Keywords are acceptable as formal names; they are matched
                // textually during substitution.
                Some(TokenKind::Keyword(kw)) => {
                    let name = get_name_table().intern(kw.as_str());
                    *i += 1;
                    self.parse_formal_tail(toks, i, name, &mut formals)?;
                }
                _ => {
                    let span = toks
                        .get(*i)
                        .map(|t| t.span)
                        .or_else(|| toks.last().map(|t| t.span))
                        .unwrap_or(INVALID_SPAN);
                    self.diag.emit(
                        DiagBuilder2::error("expected formal argument name or `)`")
                            .code(DiagCode::ExpectedToken)
                            .span(span),
                    );
                    return None;
                }
            }
            match toks.get(*i).map(|t| t.kind) {
                Some(TokenKind::Comma) => *i += 1,
                Some(TokenKind::CloseDelim(DelimToken::Paren)) => (),
                _ => {
                    let span = toks
                        .get(*i)
                        .map(|t| t.span)
                        .or_else(|| toks.last().map(|t| t.span))
                        .unwrap_or(INVALID_SPAN);
                    self.diag.emit(
                        DiagBuilder2::error("expected `,` or `)` in macro formal list")
                            .code(DiagCode::ExpectedToken)
                            .span(span),
                    );
                    return None;
                }
            }
        }
    }

    fn parse_formal_tail(
        &mut self,
        toks: &[Token],
        i: &mut usize,
        name: Name,
        formals: &mut Vec<MacroFormal>,
    ) -> Option<()> {
        let default = if toks.get(*i).map(|t| t.kind) == Some(TokenKind::Operator(Op::Assign)) {
            *i += 1;
            Some(collect_balanced(toks, i))
        } else {
            None
        };
        formals.push(MacroFormal { name, default });
        Some(())
    }

    /// Handle a directive token that is not a built-in directive: either a
    /// macro usage or an unknown name.
    fn handle_macro_usage(&mut self, tok: Token, name: Name) {
        let def = match self.macros.get(&name) {
            Some(def) => def.clone(),
            None => {
                self.diag.emit(
                    DiagBuilder2::error(format!("unknown directive or macro `{}`", name))
                        .code(DiagCode::UnknownDirective)
                        .span(tok.span),
                );
                self.pending.extend(tok.trivia.clone());
                self.push_directive_trivia(DirectiveKind::Unknown, tok.span, tok.span);
                return;
            }
        };
        match def {
            MacroDef::Intrinsic(which) => {
                let out = self.expand_intrinsic(which, tok.span.begin(), &tok);
                self.expanded.push_back(out);
            }
            MacroDef::User(mac) => {
                if let Some(out) = self.expand_usage_from_stream(&tok, &mac) {
                    if out.is_empty() {
                        self.pending.extend(tok.trivia.clone());
                    } else {
                        self.expanded.extend(out);
                    }
                }
            }
        }
    }

    /// Expand a macro usage whose arguments (if any) come from the main
    /// token stream. Returns the fully expanded token list.
    fn expand_usage_from_stream(&mut self, usage: &Token, mac: &Rc<UserMacro>) -> Option<Vec<Token>> {
        let args = if mac.formals.is_some() {
            match self.collect_args_from_stream(usage, LexerMode::Normal) {
                Some(args) => Some(args),
                None => return None,
            }
        } else {
            None
        };
        Some(self.expand_usage(usage, mac, args, usage.span.begin()))
    }

    /// Like [`expand_usage_from_stream`], but pulls argument tokens in
    /// directive mode so the usage cannot leak past the end of a directive
    /// line. Used for operands of `ifdef and `include.
    fn expand_usage_in_directive(&mut self, usage: &Token, mac: &Rc<UserMacro>) -> Option<Vec<Token>> {
        let args = if mac.formals.is_some() {
            match self.collect_args_from_stream(usage, LexerMode::Directive) {
                Some(args) => Some(args),
                None => return None,
            }
        } else {
            None
        };
        Some(self.expand_usage(usage, mac, args, usage.span.begin()))
    }

    fn expand_usage(
        &mut self,
        usage: &Token,
        mac: &Rc<UserMacro>,
        args: Option<Vec<Vec<Token>>>,
        usage_loc: Location,
    ) -> Vec<Token> {
        // Pre-expand the actual arguments so that macro usages within them
        // are resolved before substitution.
        let args = args.map(|lists| {
            lists
                .into_iter()
                .map(|list| self.expand_token_list(list, usage_loc))
                .collect::<Vec<_>>()
        });

        self.expansion_stack.push(mac.name);
        let out = self.expand_with_args(mac, usage, args);
        let out = self.expand_token_list(out, usage_loc);
        self.expansion_stack.pop();
        out
    }

    /// Substitute formals, apply pastes and stringification over a macro
    /// body. This is the first expansion pass; nested macro usages are left
    /// in place for the rescan.
    fn expand_with_args(
        &mut self,
        mac: &UserMacro,
        usage: &Token,
        args: Option<Vec<Vec<Token>>>,
    ) -> Vec<Token> {
        let mut map: HashMap<Name, Vec<Token>> = HashMap::new();
        if let Some(formals) = &mac.formals {
            let actuals = args.unwrap_or_default();
            if actuals.len() > formals.len() {
                self.diag.emit(
                    DiagBuilder2::error(format!(
                        "macro `{}` takes {} arguments, but {} were provided",
                        mac.name,
                        formals.len(),
                        actuals.len()
                    ))
                    .code(DiagCode::TooManyMacroArgs)
                    .span(usage.span),
                );
            }
            for (idx, formal) in formals.iter().enumerate() {
                let tokens = match actuals.get(idx) {
                    Some(list) if !list.is_empty() => list.clone(),
                    Some(_) => match &formal.default {
                        Some(def) => def.clone(),
                        None => {
                            self.diag.emit(
                                DiagBuilder2::warning(format!(
                                    "argument `{}` of macro `{}` is empty and has no default",
                                    formal.name, mac.name
                                ))
                                .code(DiagCode::NotEnoughMacroArgs)
                                .span(usage.span),
                            );
                            Vec::new()
                        }
                    },
                    None => match &formal.default {
                        Some(def) => def.clone(),
                        None => {
                            self.diag.emit(
                                DiagBuilder2::error(format!(
                                    "macro `{}` is missing argument `{}`",
                                    mac.name, formal.name
                                ))
                                .code(DiagCode::NotEnoughMacroArgs)
                                .span(usage.span),
                            );
                            Vec::new()
                        }
                    },
                };
                map.insert(formal.name, tokens);
            }
        }

        let mut out = Vec::new();
        self.apply_body(&mac.body, &map, &mut out);
        if let Some(first) = out.first_mut() {
            first.trivia = usage.trivia.clone();
        }
        out
    }

    fn apply_body(
        &mut self,
        body: &[Token],
        map: &HashMap<Name, Vec<Token>>,
        out: &mut Vec<Token>,
    ) {
        let mut carry: Vec<Trivia> = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let tok = &body[i];
            match tok.kind {
                // Token pasting. Whitespace before the right operand is an
                // error and falls back to plain juxtaposition.
                TokenKind::MacroPaste => {
                    i += 1;
                    let rhs_tok = match body.get(i) {
                        Some(t) => t,
                        None => {
                            self.diag.emit(
                                DiagBuilder2::error("`` must be followed by a token to paste")
                                    .code(DiagCode::MacroPasteFailed)
                                    .span(tok.span),
                            );
                            continue;
                        }
                    };
                    i += 1;
                    let rhs = self.substitute_one(rhs_tok, map);
                    if !rhs_tok.trivia.is_empty() {
                        self.diag.emit(
                            DiagBuilder2::error("whitespace is not allowed after ``")
                                .code(DiagCode::MacroPasteFailed)
                                .span(tok.span),
                        );
                        push_with_carry(out, rhs, &mut carry);
                        continue;
                    }
                    let lhs = out.pop();
                    match (lhs, rhs) {
                        (Some(lhs), rhs) if rhs.is_empty() => out.push(lhs),
                        (Some(lhs), mut rhs) => {
                            let mut first_rhs = rhs.remove(0);
                            first_rhs.trivia.clear();
                            match concatenate_tokens(&lhs, &first_rhs) {
                                Some(mut merged) => {
                                    merged.trivia = lhs.trivia.clone();
                                    out.push(merged);
                                }
                                None => {
                                    self.diag.emit(
                                        DiagBuilder2::error(format!(
                                            "`{}` and `{}` do not paste into a valid token",
                                            lhs.kind, first_rhs.kind
                                        ))
                                        .code(DiagCode::MacroPasteFailed)
                                        .span(tok.span),
                                    );
                                    out.push(lhs);
                                    out.push(first_rhs);
                                }
                            }
                            out.extend(rhs);
                        }
                        (None, rhs) => {
                            self.diag.emit(
                                DiagBuilder2::error("`` has nothing on its left to paste")
                                    .code(DiagCode::MacroPasteFailed)
                                    .span(tok.span),
                            );
                            push_with_carry(out, rhs, &mut carry);
                        }
                    }
                }

                // Stringification: substitute and paste within the quoted
                // region, then form a single string literal.
                TokenKind::MacroQuote => {
                    let open_trivia = tok.trivia.clone();
                    let mut close = i + 1;
                    while close < body.len() && body[close].kind != TokenKind::MacroQuote {
                        close += 1;
                    }
                    if close >= body.len() {
                        self.diag.emit(
                            DiagBuilder2::error("unterminated `\" in macro body")
                                .code(DiagCode::MacroStringifyFailed)
                                .span(tok.span),
                        );
                        i = body.len();
                        continue;
                    }
                    let mut collected = Vec::new();
                    self.apply_body(&body[i + 1..close], map, &mut collected);
                    let mut s = stringify_tokens(&collected);
                    let mut trivia = std::mem::replace(&mut carry, Vec::new());
                    trivia.extend(open_trivia);
                    s.trivia = trivia;
                    out.push(s);
                    i = close + 1;
                }

                _ => {
                    i += 1;
                    let sub = self.substitute_one(tok, map);
                    if sub.is_empty() {
                        carry.extend(tok.trivia.clone());
                        continue;
                    }
                    push_with_carry(out, sub, &mut carry);
                }
            }
        }
    }

    /// Substitute a single body token: formals become their actual argument
    /// token lists, and a directive token naming a formal becomes a
    /// directive formed from the actual's text.
    fn substitute_one(&mut self, tok: &Token, map: &HashMap<Name, Vec<Token>>) -> Vec<Token> {
        let formal = match tok.kind {
            TokenKind::Ident(n) | TokenKind::EscIdent(n) => Some(n),
            TokenKind::Keyword(kw) => Some(get_name_table().intern(kw.as_str())),
            _ => None,
        };
        if let Some(n) = formal {
            if let Some(actual) = map.get(&n) {
                let mut out = actual.clone();
                if let Some(first) = out.first_mut() {
                    first.trivia = tok.trivia.clone();
                }
                return out;
            }
        }
        if let TokenKind::Directive(n) = tok.kind {
            if let Some(actual) = map.get(&n) {
                let text: String = actual.iter().map(|t| t.raw_text()).collect();
                let formed = lex_one(&format!("`{}", text));
                match formed.kind {
                    TokenKind::Directive(_) => {
                        let mut formed = formed;
                        formed.trivia = tok.trivia.clone();
                        return vec![formed];
                    }
                    _ => {
                        self.diag.emit(
                            DiagBuilder2::error(format!(
                                "`{}` does not form a valid directive name",
                                text
                            ))
                            .code(DiagCode::InvalidMacroName)
                            .span(tok.span),
                        );
                        return Vec::new();
                    }
                }
            }
        }
        vec![tok.clone()]
    }

    /// The rescan pass: interpret directives within an expanded token list.
    /// Nested macro usages expand (with the recursion guard), conditional
    /// directives select branches against the current macro table, and
    /// `define/`undef mutate it. Finally, abutting atoms are concatenated.
    fn expand_token_list(&mut self, list: Vec<Token>, usage_loc: Location) -> Vec<Token> {
        let mut out: Vec<Token> = Vec::new();
        let mut branches: Vec<BranchEntry> = Vec::new();
        let mut i = 0;
        while i < list.len() {
            let active = branches.iter().all(|b| b.current_active);
            let tok = &list[i];
            let name = match tok.kind {
                TokenKind::Directive(name) => name,
                _ => {
                    if active {
                        out.push(tok.clone());
                    }
                    i += 1;
                    continue;
                }
            };
            let text = name.as_str();
            match &*text {
                "ifdef" | "ifndef" => {
                    let inverted = &*text == "ifndef";
                    i += 1;
                    let defined = match list.get(i).map(|t| t.kind) {
                        Some(TokenKind::Ident(n)) | Some(TokenKind::EscIdent(n)) => {
                            i += 1;
                            self.macros.contains_key(&n)
                        }
                        _ => false,
                    };
                    let taken = active && (defined ^ inverted);
                    branches.push(BranchEntry {
                        any_taken: taken,
                        current_active: taken,
                        else_seen: false,
                    });
                }
                "elsif" => {
                    i += 1;
                    let defined = match list.get(i).map(|t| t.kind) {
                        Some(TokenKind::Ident(n)) | Some(TokenKind::EscIdent(n)) => {
                            i += 1;
                            self.macros.contains_key(&n)
                        }
                        _ => false,
                    };
                    let parent = branches
                        .iter()
                        .take(branches.len().saturating_sub(1))
                        .all(|b| b.current_active);
                    if let Some(entry) = branches.last_mut() {
                        if entry.any_taken {
                            entry.current_active = false;
                        } else {
                            entry.current_active = parent && defined;
                            entry.any_taken |= entry.current_active;
                        }
                    }
                }
                "else" => {
                    i += 1;
                    let parent = branches
                        .iter()
                        .take(branches.len().saturating_sub(1))
                        .all(|b| b.current_active);
                    if let Some(entry) = branches.last_mut() {
                        entry.else_seen = true;
                        entry.current_active = parent && !entry.any_taken;
                        entry.any_taken = true;
                    }
                }
                "endif" => {
                    i += 1;
                    branches.pop();
                }
                _ if !active => {
                    i += 1;
                }
                "define" => {
                    // A define formed within an expansion consumes the rest
                    // of the list as its body.
                    let dtok = tok.clone();
                    let rest: Vec<Token> = list[i + 1..].to_vec();
                    self.parse_define(&dtok, rest);
                    i = list.len();
                }
                "undef" => {
                    i += 1;
                    if let Some(TokenKind::Ident(n)) | Some(TokenKind::EscIdent(n)) =
                        list.get(i).map(|t| t.kind)
                    {
                        i += 1;
                        self.macros.remove(&n);
                    }
                }
                "__LINE__" | "__FILE__" => {
                    let which = if &*text == "__LINE__" {
                        Intrinsic::Line
                    } else {
                        Intrinsic::File
                    };
                    out.push(self.expand_intrinsic(which, usage_loc, tok));
                    i += 1;
                }
                _ => {
                    i += 1;
                    let mac = match self.macros.get(&name) {
                        Some(MacroDef::User(mac)) => mac.clone(),
                        Some(MacroDef::Intrinsic(_)) => {
                            self.diag.emit(
                                DiagBuilder2::bug("intrinsic macro leaked into rescan")
                                    .span(tok.span),
                            );
                            continue;
                        }
                        None => {
                            self.diag.emit(
                                DiagBuilder2::error(format!(
                                    "unknown macro `{}` in expansion",
                                    name
                                ))
                                .code(DiagCode::UnknownMacro)
                                .span(tok.span),
                            );
                            continue;
                        }
                    };
                    if self.expansion_stack.contains(&name) {
                        self.diag.emit(
                            DiagBuilder2::error(format!(
                                "macro `{}` cannot expand recursively",
                                name
                            ))
                            .code(DiagCode::MacroRecursion)
                            .span(tok.span),
                        );
                        continue;
                    }
                    let args = if mac.formals.is_some() {
                        match collect_args_from_list(&list, &mut i) {
                            Some(args) => Some(args),
                            None => {
                                self.diag.emit(
                                    DiagBuilder2::error(format!(
                                        "macro `{}` requires an argument list",
                                        name
                                    ))
                                    .code(DiagCode::ExpectedMacroArgs)
                                    .span(tok.span),
                                );
                                continue;
                            }
                        }
                    } else {
                        None
                    };
                    let mut expanded = self.expand_usage(tok, &mac, args, usage_loc);
                    if let Some(first) = expanded.first_mut() {
                        first.trivia = tok.trivia.clone();
                    }
                    out.extend(expanded);
                }
            }
        }
        implicit_concat(out)
    }

    fn expand_intrinsic(&mut self, which: Intrinsic, usage_loc: Location, usage: &Token) -> Token {
        let mut tok = match which {
            Intrinsic::Line => {
                let (_, line) = get_source_manager().reported(usage_loc);
                lex_one(&line.to_string())
            }
            Intrinsic::File => {
                let (file, _) = get_source_manager().reported(usage_loc);
                lex_one(&format!("\"{}\"", file))
            }
        };
        tok.trivia = usage.trivia.clone();
        tok
    }

    /// Collect the parenthesized actual argument list of a macro usage from
    /// the live token stream, splitting on top-level commas. Bracket,
    /// brace, and parenthesis groups keep their commas.
    fn collect_args_from_stream(
        &mut self,
        usage: &Token,
        mode: LexerMode,
    ) -> Option<Vec<Vec<Token>>> {
        let open = self.raw(mode);
        if open.kind != TokenKind::OpenDelim(DelimToken::Paren) {
            self.diag.emit(
                DiagBuilder2::error("expected `(` to begin macro arguments")
                    .code(DiagCode::ExpectedMacroArgs)
                    .span(usage.span),
            );
            self.lookahead = Some(open);
            return None;
        }
        let mut toks = Vec::new();
        let mut depth = 0usize;
        loop {
            let tok = self.raw(mode);
            match tok.kind {
                TokenKind::OpenDelim(_) => depth += 1,
                TokenKind::CloseDelim(DelimToken::Paren) if depth == 0 => {
                    return Some(split_args(toks));
                }
                TokenKind::CloseDelim(_) => depth = depth.saturating_sub(1),
                TokenKind::Eof | TokenKind::EndOfDirective => {
                    self.diag.emit(
                        DiagBuilder2::error("unbalanced macro argument list")
                            .code(DiagCode::UnbalancedMacroArgs)
                            .span(usage.span),
                    );
                    self.lookahead = Some(tok);
                    return None;
                }
                _ => (),
            }
            toks.push(tok);
        }
    }
}

/// Collect a balanced token run from a list: stops at a top-level comma or
/// closing parenthesis without consuming it.
fn collect_balanced(toks: &[Token], i: &mut usize) -> Vec<Token> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    while let Some(tok) = toks.get(*i) {
        match tok.kind {
            TokenKind::OpenDelim(_) => depth += 1,
            TokenKind::CloseDelim(DelimToken::Paren) if depth == 0 => break,
            TokenKind::CloseDelim(_) => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => break,
            _ => (),
        }
        out.push(tok.clone());
        *i += 1;
    }
    out
}

/// Collect a parenthesized macro argument list out of a token list.
fn collect_args_from_list(list: &[Token], i: &mut usize) -> Option<Vec<Vec<Token>>> {
    match list.get(*i).map(|t| t.kind) {
        Some(TokenKind::OpenDelim(DelimToken::Paren)) => (),
        _ => return None,
    }
    *i += 1;
    let mut toks = Vec::new();
    let mut depth = 0usize;
    while let Some(tok) = list.get(*i) {
        match tok.kind {
            TokenKind::OpenDelim(_) => depth += 1,
            TokenKind::CloseDelim(DelimToken::Paren) if depth == 0 => {
                *i += 1;
                return Some(split_args(toks));
            }
            TokenKind::CloseDelim(_) => depth = depth.saturating_sub(1),
            _ => (),
        }
        toks.push(tok.clone());
        *i += 1;
    }
    None
}

/// Split a collected argument region on its top-level commas.
fn split_args(toks: Vec<Token>) -> Vec<Vec<Token>> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for tok in toks {
        match tok.kind {
            TokenKind::OpenDelim(_) => depth += 1,
            TokenKind::CloseDelim(_) => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                args.push(std::mem::replace(&mut current, Vec::new()));
                continue;
            }
            _ => (),
        }
        current.push(tok);
    }
    args.push(current);
    args
}

fn push_with_carry(out: &mut Vec<Token>, mut list: Vec<Token>, carry: &mut Vec<Trivia>) {
    if list.is_empty() {
        return;
    }
    if !carry.is_empty() {
        let mut trivia = std::mem::replace(carry, Vec::new());
        trivia.extend(std::mem::replace(&mut list[0].trivia, Vec::new()));
        list[0].trivia = trivia;
    }
    out.extend(list);
}

/// Whether a token can take part in implicit concatenation of abutting
/// expansion results.
fn is_concat_eligible(kind: TokenKind) -> bool {
    match kind {
        TokenKind::Ident(_)
        | TokenKind::Keyword(_)
        | TokenKind::Digits(_)
        | TokenKind::Literal(Lit::Number(_)) => true,
        _ => false,
    }
}

/// Concatenate abutting eligible atoms in an expansion result.
fn implicit_concat(list: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    for tok in list {
        if tok.trivia.is_empty() && is_concat_eligible(tok.kind) {
            if let Some(last) = out.last() {
                if is_concat_eligible(last.kind) {
                    if let Some(mut merged) = concatenate_tokens(last, &tok) {
                        let last = out.pop().unwrap();
                        merged.trivia = last.trivia;
                        out.push(merged);
                        continue;
                    }
                }
            }
        }
        out.push(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shannon_common::errors::Diagnostics;
    use shannon_common::svint::Logic;
    use std::cell::Cell;

    fn add_source(input: &str) -> Source {
        thread_local!(static INDEX: Cell<usize> = Cell::new(0));
        let sm = get_source_manager();
        let idx = INDEX.with(|i| {
            let v = i.get();
            i.set(v + 1);
            v
        });
        sm.add(&format!("preproc_test_{}.sv", idx), input)
    }

    fn preprocess(input: &str) -> (Vec<Token>, Diagnostics) {
        let diag = Diagnostics::new();
        let source = add_source(input);
        let mut pp = Preprocessor::new(source, &diag);
        let mut tokens = Vec::new();
        loop {
            let tok = pp.next();
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        drop(pp);
        (tokens, diag)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens
            .iter()
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Eof)
            .collect()
    }

    fn name(n: &str) -> Name {
        get_name_table().intern(n)
    }

    /// Reproduce the token stream's text, dropping the directives that were
    /// folded into trivia. This mirrors how expanded output is compared.
    fn render_expanded(tokens: &[Token]) -> String {
        let mut out = String::new();
        for tok in tokens {
            for trivia in &tok.trivia {
                match trivia.kind {
                    TriviaKind::Directive(_) | TriviaKind::DisabledText => (),
                    _ => out.push_str(&trivia.span.extract()),
                }
            }
            out.push_str(&tok.span.extract());
        }
        out
    }

    fn render_full(tokens: &[Token]) -> String {
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
    fn simple_macro() {
        let (tokens, diag) = preprocess("`define FOO 42\n`FOO");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("42")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn function_macro() {
        let (tokens, diag) = preprocess("`define FOO(x) x\n`FOO(3)");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("3")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn function_macro_defaults() {
        let (tokens, diag) = preprocess("`define FOO(x=9(,), y=2) x\n`FOO()");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Literal(Lit::Number(name("9")))
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn function_macro_empty_default() {
        let (tokens, diag) = preprocess("`define FOO(x=) x\n`FOO()");
        assert_eq!(kinds(&tokens), vec![]);
        assert!(diag.is_empty());
    }

    #[test]
    fn function_macro_nesting() {
        let (tokens, diag) = preprocess(
            "`define BLAHBLAH(x) x\n`define BAR(x) `BLAHBLAH(x)\n`define BAZ(x) `BAR(x)\n`define FOO(y) `BAZ(y)\n`FOO(15)",
        );
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("15")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn function_macro_arg_nesting() {
        let (tokens, diag) = preprocess("`define FOO(x) x\n`FOO(`FOO(3))");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("3")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn keyword_as_formal() {
        let (tokens, diag) = preprocess("`define FOO(type) type\n`FOO(3)");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("3")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn balanced_groups_in_args() {
        let (tokens, diag) = preprocess("`define M(a,b) b a\n`M({1,2}, 3)");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Literal(Lit::Number(name("3")))
        );
        assert_eq!(tokens[1].kind, TokenKind::OpenDelim(DelimToken::Brace));
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_pasting_identifiers() {
        let (tokens, diag) = preprocess("`define FOO(x,y) x``_blah``y\n`FOO(   bar,    _BAZ)");
        assert_eq!(kinds(&tokens), vec![TokenKind::Ident(name("bar_blah_BAZ"))]);
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_pasting_operator() {
        let (tokens, diag) = preprocess("`define FOO(x) x``+\n`FOO(+)");
        assert_eq!(kinds(&tokens), vec![TokenKind::Operator(Op::Inc)]);
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_pasting_keyword() {
        let (tokens, diag) = preprocess("`define FOO(x) x``gic\n`FOO(lo)");
        assert_eq!(kinds(&tokens), vec![TokenKind::Keyword(Kw::Logic)]);
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_pasting_whitespace_is_an_error() {
        let (tokens, diag) = preprocess("`define FOO(x) x`` y\n`FOO(a)");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Ident(name("a")), TokenKind::Ident(name("y"))]
        );
        assert_eq!(diag.sorted_codes(), vec![DiagCode::MacroPasteFailed]);
    }

    #[test]
    fn macro_stringify() {
        let (tokens, diag) =
            preprocess("`define FOO(x) `\" `\\`\" x``foo``42 `\\`\" `\"\n`FOO(bar_)");
        match tokens[0].kind {
            TokenKind::Literal(Lit::Str(n)) => {
                assert_eq!(&*n.as_str(), " \" bar_foo42 \"")
            }
            k => panic!("expected string literal, got {:?}", k),
        }
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn macro_expansion_text() {
        let (tokens, diag) = preprocess(
            "`define max(a,b)((a) > (b)) ? (a) : (b)\nn = `max(p+q, r+s) ;",
        );
        assert_eq!(
            render_expanded(&tokens),
            "\nn = ((p+q) > (r+s)) ? (p+q) : (r+s) ;"
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_stringify_escaped_quotes() {
        let (tokens, diag) = preprocess(
            "`define msg(x,y) `\"x: `\\`\"y`\\`\"`\"\n`msg(left side,right side)",
        );
        match tokens[0].kind {
            TokenKind::Literal(Lit::Str(n)) => {
                assert_eq!(&*n.as_str(), "left side: \"right side\"")
            }
            k => panic!("expected string literal, got {:?}", k),
        }
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn macro_meta_repetition() {
        let (tokens, diag) = preprocess(
            "`define REPEAT(n, d) `REPEAT_``n(d)\n\
             `define REPEAT_0(d)\n\
             `define REPEAT_1(d) d\n\
             `define REPEAT_2(d) `REPEAT_1(d) d\n\
             `define REPEAT_3(d) `REPEAT_2(d) d\n\
             `define REPEAT_4(d) `REPEAT_3(d) d\n\
             `define FUNC(n) n\n\
             `REPEAT(`FUNC(4), \"hello\")",
        );
        let hello = name("hello");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Str(hello)); 4]
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn macro_directive_from_argument() {
        let (tokens, diag) = preprocess("`define FOO 1\n`define FROB(asdf) `asdf\n`FROB(FOO)");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("1")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_define_through_argument() {
        let (tokens, diag) =
            preprocess("`define FROB(asdf) `asdf STUFF 1\n`FROB(define)\n\n`STUFF");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("1")))]
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn macro_implicit_concatenation() {
        let (tokens, diag) = preprocess("`define FOO 8\r\n`define BAR 9\n1`FOO`BAR");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("189")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_nested_implicit_concatenation() {
        let (tokens, diag) = preprocess("`define FOO 8\n`define BAR 9`FOO\n1`BAR");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("198")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn macro_recursion_is_diagnosed() {
        let (_, diag) = preprocess("`define A `A\n`A");
        assert_eq!(diag.sorted_codes(), vec![DiagCode::MacroRecursion]);
    }

    #[test]
    fn undefined_macro_usage() {
        let (tokens, diag) = preprocess("`NOT_DEFINED x");
        assert_eq!(kinds(&tokens), vec![TokenKind::Ident(name("x"))]);
        assert_eq!(diag.sorted_codes(), vec![DiagCode::UnknownDirective]);
    }

    #[test]
    fn too_many_args_is_diagnosed() {
        let (tokens, diag) = preprocess("`define FOO(x) x\n`FOO(1,2)");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Literal(Lit::Number(name("1")))
        );
        assert_eq!(diag.sorted_codes(), vec![DiagCode::TooManyMacroArgs]);
    }

    #[test]
    fn missing_args_are_diagnosed() {
        let (_, diag) = preprocess("`define D(x,y) x y\n`D(1)");
        assert_eq!(diag.sorted_codes(), vec![DiagCode::NotEnoughMacroArgs]);
    }

    #[test]
    fn ifdef_taken_and_not_taken() {
        let (tokens, diag) = preprocess("`define FOO\n`ifdef FOO\n42\n`endif");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("42")))]
        );
        assert!(diag.is_empty());

        let (tokens, diag) = preprocess("`ifdef FOO\n42\n`endif");
        assert_eq!(kinds(&tokens), vec![]);
        assert!(diag.is_empty());
        // The skipped region survives as disabled-text trivia.
        assert!(tokens
            .last()
            .unwrap()
            .trivia
            .iter()
            .any(|t| t.kind == TriviaKind::DisabledText));
    }

    #[test]
    fn ifdef_and_ifndef_are_symmetric() {
        for (input, expect_taken) in &[
            ("`define FOO\n`ifdef FOO\n1\n`endif", true),
            ("`define FOO\n`ifndef FOO\n1\n`endif", false),
            ("`ifdef FOO\n1\n`endif", false),
            ("`ifndef FOO\n1\n`endif", true),
        ] {
            let (tokens, diag) = preprocess(input);
            let got = !kinds(&tokens).is_empty();
            assert_eq!(got, *expect_taken, "branch selection for {:?}", input);
            assert!(diag.is_empty());
        }
    }

    #[test]
    fn else_and_elsif_branches() {
        let (tokens, diag) =
            preprocess("`define B\n`ifdef A\n1\n`elsif B\n2\n`else\n3\n`endif");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("2")))]
        );
        assert!(diag.is_empty());

        let (tokens, diag) = preprocess("`ifdef A\n1\n`elsif B\n2\n`else\n3\n`endif");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("3")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn nested_conditionals() {
        let (tokens, diag) = preprocess(
            "`define FOO\n`ifdef FOO\n`ifdef BAR\n1\n`else\n2\n`endif\n`else\n3\n`endif",
        );
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("2")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn elsif_after_else_is_an_error() {
        let (_, diag) = preprocess("`ifdef A\n`else\n`elsif B\n`endif");
        assert_eq!(diag.sorted_codes(), vec![DiagCode::ElsifAfterElse]);
    }

    #[test]
    fn unbalanced_conditional_is_diagnosed() {
        let (_, diag) = preprocess("`ifdef FOO\n1\n");
        assert_eq!(
            diag.sorted_codes(),
            vec![DiagCode::UnbalancedConditionalDirective]
        );
    }

    #[test]
    fn ifdef_inside_macro_body() {
        let (tokens, diag) = preprocess(
            "`define FOO \\\n  `ifdef BAR \\\n    32 \\\n  `else \\\n    63 \\\n  `endif\n\
             `define BAR\n`FOO",
        );
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("32")))]
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn ifdef_with_macro_operand() {
        let (tokens, diag) = preprocess(
            "`define DEFINED\n`define INDIRECT(d) d\n`ifdef `INDIRECT(DEFINED)\na\n`else\nb\n`endif",
        );
        assert_eq!(kinds(&tokens), vec![TokenKind::Ident(name("a"))]);
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn line_intrinsic() {
        let (tokens, diag) = preprocess("`__LINE__");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("1")))]
        );
        assert!(diag.is_empty());

        let (tokens, _) = preprocess("\n\n`__LINE__");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("3")))]
        );
    }

    #[test]
    fn line_intrinsic_reports_usage_site() {
        // The `__LINE__ inside the body must report the line of the usage,
        // not of the definition.
        let (tokens, diag) = preprocess("`define L `__LINE__\n\n\n`L");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Literal(Lit::Number(name("4")))]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn line_directive_overrides() {
        let (tokens, diag) = preprocess("`line 6 \"other.sv\" 0\n`__LINE__ `__FILE__");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Literal(Lit::Number(name("6"))),
                TokenKind::Literal(Lit::Str(name("other.sv"))),
            ]
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn include_virtual_file() {
        get_source_manager().add("incl_helper.svh", "abc\n");
        let (tokens, diag) = preprocess("`include \"incl_helper.svh\"\nxyz");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Ident(name("abc")), TokenKind::Ident(name("xyz"))]
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn include_not_found() {
        let (_, diag) = preprocess("`include \"does_not_exist.svh\"\n");
        assert_eq!(diag.sorted_codes(), vec![DiagCode::IncludeNotFound]);
    }

    #[test]
    fn include_depth_limit() {
        get_source_manager().add("self_incl.svh", "`include \"self_incl.svh\"\n");
        let diag = Diagnostics::new();
        let source = add_source("`include \"self_incl.svh\"\n");
        let mut pp = Preprocessor::with_options(
            source,
            &diag,
            PreprocessorOptions {
                max_include_depth: Some(4),
                ..Default::default()
            },
        );
        loop {
            if pp.next().kind == TokenKind::Eof {
                break;
            }
        }
        assert!(diag
            .sorted_codes()
            .contains(&DiagCode::IncludeDepthExceeded));
    }

    #[test]
    fn timescale_directive() {
        let diag = Diagnostics::new();
        let source = add_source("`timescale 10 ns / 1 fs\nmodule");
        let mut pp = Preprocessor::new(source, &diag);
        assert_eq!(pp.next().kind, TokenKind::Keyword(Kw::Module));
        assert_eq!(
            pp.timescale(),
            Some(Timescale {
                base: TimescaleValue {
                    magnitude: TimescaleMagnitude::Ten,
                    unit: TimeUnit::NanoSecond,
                },
                precision: TimescaleValue {
                    magnitude: TimescaleMagnitude::One,
                    unit: TimeUnit::FemtoSecond,
                },
            })
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn timescale_compact_form() {
        let diag = Diagnostics::new();
        let source = add_source("`timescale 1ns/1ps\n");
        let mut pp = Preprocessor::new(source, &diag);
        while pp.next().kind != TokenKind::Eof {}
        assert_eq!(
            pp.timescale(),
            Some(Timescale {
                base: TimescaleValue {
                    magnitude: TimescaleMagnitude::One,
                    unit: TimeUnit::NanoSecond,
                },
                precision: TimescaleValue {
                    magnitude: TimescaleMagnitude::One,
                    unit: TimeUnit::PicoSecond,
                },
            })
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn default_nettype_directive() {
        let diag = Diagnostics::new();
        let source = add_source("`default_nettype none\n");
        let mut pp = Preprocessor::new(source, &diag);
        while pp.next().kind != TokenKind::Eof {}
        assert_eq!(pp.default_nettype(), None);
        assert!(diag.is_empty());

        let diag = Diagnostics::new();
        let source = add_source("`default_nettype tri\n`resetall\n");
        let mut pp = Preprocessor::new(source, &diag);
        while pp.next().kind != TokenKind::Eof {}
        // `resetall restored the default.
        assert_eq!(pp.default_nettype(), Some(Kw::Wire));
        assert!(diag.is_empty());
    }

    #[test]
    fn begin_keywords_switches_version() {
        let (tokens, diag) = preprocess(
            "`begin_keywords \"1364-2005\"\nlogic\n`end_keywords\nlogic",
        );
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident(name("logic")),
                TokenKind::Keyword(Kw::Logic),
            ]
        );
        assert!(diag.is_empty(), "{:?}", diag.sorted_codes());
    }

    #[test]
    fn predefine_and_undefine() {
        let diag = Diagnostics::new();
        let source = add_source("`WIDTH");
        let mut pp = Preprocessor::with_options(
            source,
            &diag,
            PreprocessorOptions {
                predefines: vec!["WIDTH=8".to_string()],
                ..Default::default()
            },
        );
        assert!(pp.is_defined("WIDTH"));
        assert_eq!(
            pp.next().kind,
            TokenKind::Literal(Lit::Number(name("8")))
        );
        assert!(pp.undefine("WIDTH"));
        assert!(!pp.is_defined("WIDTH"));
        assert!(diag.is_empty());
    }

    #[test]
    fn undefine_all_keeps_intrinsics() {
        let diag = Diagnostics::new();
        let source = add_source("");
        let mut pp = Preprocessor::new(source, &diag);
        pp.predefine("FOO=1");
        pp.predefine("BAR");
        assert!(pp.is_defined("FOO"));
        pp.undefine_all();
        assert!(!pp.is_defined("FOO"));
        assert!(!pp.is_defined("BAR"));
        assert!(pp.is_defined("__LINE__"));
        assert!(pp.is_defined("__FILE__"));
        assert!(!pp.undefine("__LINE__"));
        assert!(pp.is_defined("__LINE__"));
    }

    #[test]
    fn macro_without_args_keeps_surrounding_trivia() {
        let (tokens, diag) = preprocess("`define FOO 42\na `FOO b");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident(name("a")),
                TokenKind::Literal(Lit::Number(name("42"))),
                TokenKind::Ident(name("b")),
            ]
        );
        // The whitespace around the usage is still there.
        assert_eq!(tokens[1].trivia.len(), 1);
        assert_eq!(tokens[1].trivia[0].kind, TriviaKind::Whitespace);
        assert_eq!(tokens[2].trivia[0].kind, TriviaKind::Whitespace);
        assert!(diag.is_empty());
    }

    #[test]
    fn conditional_round_trip() {
        let input = "`define X 1\n`ifdef X\nabc\n`else\ndef\n`endif\n";
        let (tokens, diag) = preprocess(input);
        assert_eq!(render_full(&tokens), input);
        assert!(diag.is_empty());
    }

    #[test]
    fn unbased_unsized_pass_through() {
        let (tokens, diag) = preprocess("'1 'x");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::One)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::X)),
            ]
        );
        assert!(diag.is_empty());
    }
}

// Copyright (c) 2024-2026 The shannon developers

//! A lexical analyzer for SystemVerilog files, based on IEEE 1800-2017,
//! section 5.
//!
//! The lexer is a pull-based tokenizer over a source buffer. Every token
//! carries the trivia (whitespace, comments, line continuations) that
//! precedes it, so concatenating trivia and raw text over a whole token
//! stream reproduces the buffer byte for byte. The tokenizer runs in one of
//! three modes: `Normal` for regular source text, `Directive` for the
//! remainder of a preprocessor directive line, and `IncludeFileName` for the
//! operand of an `` `include `` directive.

use crate::keywords::{find_keyword, KeywordVersion};
use crate::token::*;
use shannon_common::errors::*;
use shannon_common::name::{get_name_table, Name};
use shannon_common::source::*;
use shannon_common::svint::{LiteralBase, Logic};
use std::rc::Rc;

/// The scanning modes of the lexer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LexerMode {
    /// Regular source text.
    Normal,
    /// Inside a directive: an unescaped newline ends the token stream with
    /// an `EndOfDirective` token.
    Directive,
    /// Expecting the quoted or bracketed file name of an `` `include ``.
    IncludeFileName,
}

/// Limits and switches for the lexer.
#[derive(Clone, Copy, Debug)]
pub struct LexerOptions {
    /// Number of errors after which the lexer jumps to the end of the buffer
    /// and goes quiet.
    pub max_errors: usize,
}

impl Default for LexerOptions {
    fn default() -> LexerOptions {
        LexerOptions { max_errors: 64 }
    }
}

/// A lexical analyzer for one source buffer.
pub struct Lexer<'a> {
    source: Source,
    content: Rc<dyn SourceContent>,
    pos: usize,
    diag: &'a dyn DiagEmitter,
    options: LexerOptions,
    keyword_version: KeywordVersion,
    errors: usize,
    gagged: bool,
    /// Set after an `IntegerBase` token; the next token is lexed as a run of
    /// literal digits.
    after_base: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: Source, diag: &'a dyn DiagEmitter) -> Lexer<'a> {
        Lexer::with_options(source, diag, Default::default(), Default::default())
    }

    pub fn with_options(
        source: Source,
        diag: &'a dyn DiagEmitter,
        keyword_version: KeywordVersion,
        options: LexerOptions,
    ) -> Lexer<'a> {
        Lexer {
            source,
            content: source.get_content(),
            pos: 0,
            diag,
            options,
            keyword_version,
            errors: 0,
            gagged: false,
            after_base: false,
        }
    }

    /// The buffer this lexer reads from.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Change the keyword version used to classify identifiers, as directed
    /// by `` `begin_keywords ``.
    pub fn set_keyword_version(&mut self, version: KeywordVersion) {
        self.keyword_version = version;
    }

    fn byte(&self, off: usize) -> Option<u8> {
        self.content.bytes().get(self.pos + off).copied()
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
    }

    fn span_from(&self, begin: usize) -> Span {
        Span::new(self.source, begin, self.pos)
    }

    fn here(&self) -> Location {
        Location::new(self.source, self.pos)
    }

    /// Emit an error diagnostic, honoring the error cap. Once the cap trips
    /// the lexer jumps to the end of the buffer and stops diagnosing.
    fn error(&mut self, diag: DiagBuilder2) {
        if self.gagged {
            return;
        }
        if diag.get_severity() >= Severity::Error {
            self.errors += 1;
            if self.errors > self.options.max_errors {
                self.gagged = true;
                self.diag.emit(
                    DiagBuilder2::fatal("too many lexical errors; giving up on this buffer")
                        .code(DiagCode::TooManyErrors)
                        .span(self.here()),
                );
                self.pos = self.content.bytes().len();
                return;
            }
        }
        self.diag.emit(diag);
    }

    /// Produce the next token in the given mode.
    pub fn next_token(&mut self, mode: LexerMode) -> Token {
        let mut trivia = Vec::new();
        if let Some(tok) = self.scan_trivia(mode, &mut trivia) {
            return tok;
        }

        let begin = self.pos;
        let c0 = match self.byte(0) {
            Some(c) => c,
            None => {
                return Token::with_trivia(TokenKind::Eof, self.span_from(begin), trivia);
            }
        };

        // The operand of an `include directive is lexed as a file name if it
        // starts with a quote or angle bracket; a macro usage falls through
        // to the regular rules.
        if mode == LexerMode::IncludeFileName && (c0 == b'"' || c0 == b'<') {
            return self.lex_include_file_name(begin, c0, trivia);
        }

        // After an integer base token the following token is a run of
        // literal digits, which may include x/z/? characters.
        if self.after_base {
            self.after_base = false;
            if c0.is_ascii_alphanumeric() || c0 == b'?' || c0 == b'_' {
                return self.lex_digits(begin, trivia);
            }
        }

        match c0 {
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.lex_ident_or_keyword(begin, trivia),
            b'0'..=b'9' => self.lex_number(begin, trivia),
            b'"' => self.lex_string(begin, trivia),
            b'`' => self.lex_directive(begin, trivia),
            b'\'' => self.lex_apostrophe(begin, trivia),
            b'$' => {
                self.bump(1);
                match self.byte(0) {
                    Some(c) if is_ident_char(c) => {
                        let word = self.eat_ident_chars();
                        let name = get_name_table().intern(&word);
                        Token::with_trivia(
                            TokenKind::SysIdent(name),
                            self.span_from(begin),
                            trivia,
                        )
                    }
                    _ => Token::with_trivia(TokenKind::Dollar, self.span_from(begin), trivia),
                }
            }
            b'\\' => {
                // IEEE 1800-2017 5.6.1 Escaped identifiers
                self.bump(1);
                let mut word = String::new();
                while let Some(c) = self.byte(0) {
                    if c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' {
                        break;
                    }
                    word.push(c as char);
                    self.bump(1);
                }
                if word.is_empty() {
                    self.error(
                        DiagBuilder2::error("expected identifier after backslash `\\`")
                            .code(DiagCode::ExpectedToken)
                            .span(self.span_from(begin)),
                    );
                    return Token::with_trivia(
                        TokenKind::Unknown,
                        self.span_from(begin),
                        trivia,
                    );
                }
                let name = get_name_table().intern(&word);
                Token::with_trivia(TokenKind::EscIdent(name), self.span_from(begin), trivia)
            }
            c if c >= 0x80 => {
                // Valid UTF-8, but not ASCII: skip the full sequence and
                // report it as one unknown token.
                let len = utf8_sequence_len(c);
                self.bump(len);
                let sp = self.span_from(begin);
                self.error(
                    DiagBuilder2::error("non-ASCII character in source text")
                        .code(DiagCode::NonAsciiChar)
                        .span(sp),
                );
                if self.gagged {
                    return Token::with_trivia(TokenKind::Eof, self.span_from(self.pos), trivia);
                }
                Token::with_trivia(TokenKind::Unknown, sp, trivia)
            }
            c if c < 0x20 || c == 0x7F => {
                self.bump(1);
                let sp = self.span_from(begin);
                let code = if c == 0 {
                    DiagCode::EmbeddedNull
                } else {
                    DiagCode::NonPrintableChar
                };
                self.error(
                    DiagBuilder2::error(format!("non-printable character 0x{:02x}", c))
                        .code(code)
                        .span(sp),
                );
                if self.gagged {
                    return Token::with_trivia(TokenKind::Eof, self.span_from(self.pos), trivia);
                }
                Token::with_trivia(TokenKind::Unknown, sp, trivia)
            }
            _ => self.lex_symbol(begin, trivia),
        }
    }

    /// Scan the trivia leading up to the next token. In directive mode a
    /// newline ends the directive instead of becoming trivia, yielding an
    /// `EndOfDirective` token.
    fn scan_trivia(&mut self, mode: LexerMode, trivia: &mut Vec<Trivia>) -> Option<Token> {
        loop {
            let begin = self.pos;
            match (self.byte(0), self.byte(1)) {
                (Some(b' '), _) | (Some(b'\t'), _) => {
                    while let Some(b' ') | Some(b'\t') = self.byte(0) {
                        self.bump(1);
                    }
                    trivia.push(Trivia::new(TriviaKind::Whitespace, self.span_from(begin)));
                }

                // A UTF-8 byte order mark may appear at the very start of the
                // buffer; complain and skip it.
                (Some(0xEF), Some(0xBB)) if self.pos == 0 && self.byte(2) == Some(0xBF) => {
                    self.bump(3);
                    let sp = self.span_from(begin);
                    self.error(
                        DiagBuilder2::warning("byte order mark at start of file")
                            .code(DiagCode::UnicodeBOM)
                            .span(sp),
                    );
                    trivia.push(Trivia::new(TriviaKind::Whitespace, sp));
                }

                (Some(b'\r'), _) | (Some(b'\n'), _) => {
                    if mode != LexerMode::Normal {
                        // The newline is left for the next normal-mode token.
                        return Some(Token::with_trivia(
                            TokenKind::EndOfDirective,
                            self.span_from(begin),
                            std::mem::replace(trivia, Vec::new()),
                        ));
                    }
                    if self.byte(0) == Some(b'\r') && self.byte(1) == Some(b'\n') {
                        self.bump(2);
                    } else {
                        self.bump(1);
                    }
                    trivia.push(Trivia::new(TriviaKind::Newline, self.span_from(begin)));
                }

                // A backslash immediately before a newline continues a
                // directive onto the next line.
                (Some(b'\\'), Some(b'\r')) | (Some(b'\\'), Some(b'\n'))
                    if mode == LexerMode::Directive =>
                {
                    self.bump(2);
                    if self.byte(0) == Some(b'\n') && self.content.bytes()[self.pos - 1] == b'\r'
                    {
                        self.bump(1);
                    }
                    trivia.push(Trivia::new(
                        TriviaKind::LineContinuation,
                        self.span_from(begin),
                    ));
                }

                // IEEE 1800-2017 5.4 Comments
                (Some(b'/'), Some(b'/')) => {
                    self.bump(2);
                    while let Some(c) = self.byte(0) {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.bump(1);
                    }
                    trivia.push(Trivia::new(TriviaKind::LineComment, self.span_from(begin)));
                }

                (Some(b'/'), Some(b'*')) => {
                    if let Some(tok) = self.scan_block_comment(mode, begin, trivia) {
                        return Some(tok);
                    }
                }

                _ => return None,
            }
        }
    }

    /// Scan a `/* */` comment. Block comments do not nest; an attempted
    /// nesting is diagnosed and absorbed. In directive mode a newline inside
    /// the comment is an error that ends the directive.
    fn scan_block_comment(
        &mut self,
        mode: LexerMode,
        begin: usize,
        trivia: &mut Vec<Trivia>,
    ) -> Option<Token> {
        self.bump(2);
        let mut nested_reported = false;
        loop {
            match (self.byte(0), self.byte(1)) {
                (Some(b'*'), Some(b'/')) => {
                    self.bump(2);
                    trivia.push(Trivia::new(TriviaKind::BlockComment, self.span_from(begin)));
                    return None;
                }
                (Some(b'/'), Some(b'*')) => {
                    if !nested_reported {
                        nested_reported = true;
                        self.error(
                            DiagBuilder2::error("block comments cannot be nested")
                                .code(DiagCode::NestedBlockComment)
                                .span(Span::new(self.source, self.pos, self.pos + 2)),
                        );
                    }
                    self.bump(2);
                }
                (Some(b'\r'), _) | (Some(b'\n'), _) if mode == LexerMode::Directive => {
                    self.error(
                        DiagBuilder2::error("block comment split across directive lines")
                            .code(DiagCode::SplitBlockCommentInDirective)
                            .span(self.span_from(begin)),
                    );
                    trivia.push(Trivia::new(TriviaKind::BlockComment, self.span_from(begin)));
                    return Some(Token::with_trivia(
                        TokenKind::EndOfDirective,
                        Span::new(self.source, self.pos, self.pos),
                        std::mem::replace(trivia, Vec::new()),
                    ));
                }
                (Some(_), _) => self.bump(1),
                (None, _) => {
                    self.error(
                        DiagBuilder2::error("unterminated block comment")
                            .code(DiagCode::UnterminatedBlockComment)
                            .span(self.span_from(begin)),
                    );
                    trivia.push(Trivia::new(TriviaKind::BlockComment, self.span_from(begin)));
                    return None;
                }
            }
        }
    }

    fn eat_ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.byte(0) {
            if is_ident_char(c) {
                s.push(c as char);
                self.bump(1);
            } else {
                break;
            }
        }
        s
    }

    // IEEE 1800-2017 5.6 Identifiers and 5.6.2 Keywords
    fn lex_ident_or_keyword(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        let word = self.eat_ident_chars();
        let kind = match find_keyword(&word, self.keyword_version) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(get_name_table().intern(&word)),
        };
        Token::with_trivia(kind, self.span_from(begin), trivia)
    }

    /// Lex the digit run following an integer base token. The run is a
    /// stretch of alphanumerics, `?`, and `_`; validity per base is checked
    /// by the parser when it feeds the digits into the vector builder.
    fn lex_digits(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        let mut digits = String::new();
        while let Some(c) = self.byte(0) {
            if c.is_ascii_alphanumeric() || c == b'?' || c == b'_' {
                if c != b'_' {
                    digits.push(c as char);
                }
                self.bump(1);
            } else {
                break;
            }
        }
        let name = get_name_table().intern(&digits);
        Token::with_trivia(TokenKind::Digits(name), self.span_from(begin), trivia)
    }

    // IEEE 1800-2017 5.7 Numbers
    fn lex_number(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        let value = self.eat_decimal_digits();
        if value.is_empty() {
            // A lone underscore run cannot happen here since `_` starts an
            // identifier, but separators directly after the first digit were
            // already consumed; an empty result means a stray separator.
            self.error(
                DiagBuilder2::error("number literals cannot start with `_`")
                    .code(DiagCode::DigitsLeadingUnderscore)
                    .span(self.span_from(begin)),
            );
        }

        let mut frac = None;
        let mut has_exponent = false;

        // A fraction makes this a real (or, with a unit suffix, a time)
        // literal.
        if self.byte(0) == Some(b'.') && self.byte(1).map(|c| c.is_ascii_digit()) == Some(true) {
            self.bump(1);
            frac = Some(self.eat_decimal_digits());
        } else if self.byte(0) == Some(b'.') {
            self.error(
                DiagBuilder2::error("expected digits after decimal point")
                    .code(DiagCode::MissingDigits)
                    .span(Span::new(self.source, self.pos, self.pos + 1)),
            );
            self.bump(1);
            frac = Some(String::new());
        }

        // An exponent also promotes the literal to a real. The value is
        // parsed by the parser; overflow quietly becomes infinity there.
        if let Some(b'e') | Some(b'E') = self.byte(0) {
            let after_sign = match self.byte(1) {
                Some(b'+') | Some(b'-') => 2,
                _ => 1,
            };
            if self
                .byte(after_sign)
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
            {
                has_exponent = true;
                self.bump(after_sign);
                self.eat_decimal_digits();
            } else if frac.is_some() {
                self.error(
                    DiagBuilder2::error("expected digits in exponent")
                        .code(DiagCode::MissingExponentDigits)
                        .span(Span::new(self.source, self.pos, self.pos + 1)),
                );
                self.bump(1);
                has_exponent = true;
            }
        }

        // A time unit suffix takes precedence over leaving letters for the
        // next token.
        if !has_exponent {
            if let Some(unit) = self.try_time_unit() {
                let nt = get_name_table();
                let value = nt.intern(&value);
                let frac = frac.map(|f| nt.intern(&f));
                return Token::with_trivia(
                    TokenKind::Literal(Lit::Time(value, frac, unit)),
                    self.span_from(begin),
                    trivia,
                );
            }
        }

        let nt = get_name_table();
        let kind = if frac.is_some() || has_exponent {
            let text = self.source.extract(begin, self.pos).replace('_', "");
            TokenKind::Literal(Lit::Real(nt.intern(&text)))
        } else {
            TokenKind::Literal(Lit::Number(nt.intern(&value)))
        };
        Token::with_trivia(kind, self.span_from(begin), trivia)
    }

    fn eat_decimal_digits(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.byte(0) {
            if c.is_ascii_digit() {
                s.push(c as char);
                self.bump(1);
            } else if c == b'_' && !s.is_empty() {
                self.bump(1);
            } else {
                break;
            }
        }
        s
    }

    /// Try to consume a time unit suffix. Only fires if the full identifier
    /// run at the cursor is exactly a unit.
    fn try_time_unit(&mut self) -> Option<TimeUnit> {
        let mut len = 0;
        let mut word = String::new();
        while let Some(c) = self.byte(len) {
            if c.is_ascii_alphabetic() {
                word.push(c as char);
                len += 1;
            } else {
                break;
            }
        }
        let unit = TimeUnit::from_suffix(&word)?;
        self.bump(len);
        Some(unit)
    }

    // IEEE 1800-2017 5.7.1 Integer literal constants
    fn lex_apostrophe(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        self.bump(1);

        // An optional sign indicator followed by a base character starts a
        // based literal; the digits follow as their own token.
        let (signed, base_off) = match self.byte(0) {
            Some(b's') | Some(b'S') => (true, 1),
            _ => (false, 0),
        };
        let base = self
            .byte(base_off)
            .and_then(|c| LiteralBase::from_char(c as char));
        if let Some(base) = base {
            self.bump(base_off + 1);
            self.after_base = true;
            return Token::with_trivia(
                TokenKind::IntegerBase(signed, base),
                self.span_from(begin),
                trivia,
            );
        }

        // Unbased unsized literals '0, '1, 'x, 'z, '?. The digit must not
        // run on into an identifier.
        if !signed {
            if let Some(logic) = self.byte(0).and_then(|c| Logic::from_char(c as char)) {
                let next_is_ident = self.byte(1).map(is_ident_char).unwrap_or(false);
                if !next_is_ident {
                    self.bump(1);
                    return Token::with_trivia(
                        TokenKind::Literal(Lit::UnbasedUnsized(logic)),
                        self.span_from(begin),
                        trivia,
                    );
                }
            }
        }

        Token::with_trivia(TokenKind::Apostrophe, self.span_from(begin), trivia)
    }

    // IEEE 1800-2017 5.9 String literals
    fn lex_string(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        self.bump(1);
        let mut value = String::new();
        loop {
            match self.byte(0) {
                Some(b'"') => {
                    self.bump(1);
                    break;
                }
                Some(b'\\') => self.lex_string_escape(&mut value),
                Some(b'\r') | Some(b'\n') | None => {
                    self.error(
                        DiagBuilder2::error("string literal is missing a closing quote")
                            .code(DiagCode::UnterminatedString)
                            .span(self.span_from(begin)),
                    );
                    break;
                }
                Some(c) => {
                    value.push(c as char);
                    self.bump(1);
                }
            }
        }
        let name = get_name_table().intern(&value);
        Token::with_trivia(
            TokenKind::Literal(Lit::Str(name)),
            self.span_from(begin),
            trivia,
        )
    }

    fn lex_string_escape(&mut self, value: &mut String) {
        let escape_begin = self.pos;
        self.bump(1);
        match self.byte(0) {
            Some(b'n') => {
                value.push('\n');
                self.bump(1);
            }
            Some(b't') => {
                value.push('\t');
                self.bump(1);
            }
            Some(b'v') => {
                value.push('\x0B');
                self.bump(1);
            }
            Some(b'f') => {
                value.push('\x0C');
                self.bump(1);
            }
            Some(b'a') => {
                value.push('\x07');
                self.bump(1);
            }
            Some(b'\\') => {
                value.push('\\');
                self.bump(1);
            }
            Some(b'"') => {
                value.push('"');
                self.bump(1);
            }
            Some(b'\'') => {
                value.push('\'');
                self.bump(1);
            }
            // A backslash-newline joins the next line to the string.
            Some(b'\r') | Some(b'\n') => {
                if self.byte(0) == Some(b'\r') && self.byte(1) == Some(b'\n') {
                    self.bump(2);
                } else {
                    self.bump(1);
                }
            }
            // Octal escapes of up to three digits, valued at most 255.
            Some(c @ b'0'..=b'7') => {
                let mut v = (c - b'0') as u32;
                self.bump(1);
                for _ in 0..2 {
                    match self.byte(0) {
                        Some(c @ b'0'..=b'7') => {
                            v = v * 8 + (c - b'0') as u32;
                            self.bump(1);
                        }
                        _ => break,
                    }
                }
                if v > 255 {
                    self.error(
                        DiagBuilder2::error("octal escape sequence exceeds 8 bits")
                            .code(DiagCode::EscapeSequenceTooLarge)
                            .span(self.span_from(escape_begin)),
                    );
                    v &= 0xFF;
                }
                value.push(v as u8 as char);
            }
            Some(b'x') => {
                self.bump(1);
                let mut v: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match self.byte(0).and_then(|c| (c as char).to_digit(16)) {
                        Some(d) => {
                            v = v * 16 + d;
                            digits += 1;
                            self.bump(1);
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    self.error(
                        DiagBuilder2::error("expected hexadecimal digits after `\\x`")
                            .code(DiagCode::InvalidEscapeSequence)
                            .span(self.span_from(escape_begin)),
                    );
                } else {
                    value.push(v as u8 as char);
                }
            }
            Some(c) => {
                self.error(
                    DiagBuilder2::error(format!("unknown escape sequence `\\{}`", c as char))
                        .code(DiagCode::InvalidEscapeSequence)
                        .span(self.span_from(escape_begin)),
                );
                value.push(c as char);
                self.bump(1);
            }
            None => (),
        }
    }

    // IEEE 1800-2017 5.6.4 and clause 22: compiler directives
    fn lex_directive(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        match (self.byte(1), self.byte(2), self.byte(3)) {
            (Some(b'"'), _, _) => {
                self.bump(2);
                Token::with_trivia(TokenKind::MacroQuote, self.span_from(begin), trivia)
            }
            (Some(b'`'), _, _) => {
                self.bump(2);
                Token::with_trivia(TokenKind::MacroPaste, self.span_from(begin), trivia)
            }
            (Some(b'\\'), Some(b'`'), Some(b'"')) => {
                self.bump(4);
                Token::with_trivia(TokenKind::MacroEscapedQuote, self.span_from(begin), trivia)
            }
            (Some(c), _, _) if c == b'_' || c.is_ascii_alphabetic() => {
                self.bump(1);
                let word = self.eat_ident_chars();
                let name = get_name_table().intern(&word);
                Token::with_trivia(TokenKind::Directive(name), self.span_from(begin), trivia)
            }
            _ => {
                self.bump(1);
                let sp = self.span_from(begin);
                self.error(
                    DiagBuilder2::error("grave accent must introduce a directive or macro usage")
                        .code(DiagCode::MisplacedDirectiveChar)
                        .span(sp),
                );
                Token::with_trivia(TokenKind::Unknown, sp, trivia)
            }
        }
    }

    fn lex_include_file_name(&mut self, begin: usize, open: u8, trivia: Vec<Trivia>) -> Token {
        let close = if open == b'"' { b'"' } else { b'>' };
        self.bump(1);
        let mut name = String::new();
        loop {
            match self.byte(0) {
                Some(c) if c == close => {
                    self.bump(1);
                    let interned = get_name_table().intern(&name);
                    return Token::with_trivia(
                        TokenKind::IncludeFileName(interned, open == b'"'),
                        self.span_from(begin),
                        trivia,
                    );
                }
                Some(b'\r') | Some(b'\n') | None => {
                    let sp = self.span_from(begin);
                    self.error(
                        DiagBuilder2::error("expected `\"` or `>` to close the include file name")
                            .code(DiagCode::ExpectedIncludeFileName)
                            .span(sp),
                    );
                    return Token::with_trivia(TokenKind::Unknown, sp, trivia);
                }
                Some(c) => {
                    name.push(c as char);
                    self.bump(1);
                }
            }
        }
    }

    // IEEE 1800-2017 5.5 Operators and 11.3 Operators
    fn lex_symbol(&mut self, begin: usize, trivia: Vec<Trivia>) -> Token {
        let b = |n: usize| self.byte(n);

        // Match 4-character symbols.
        let sym4 = match (b(0), b(1), b(2), b(3)) {
            (Some(b'<'), Some(b'<'), Some(b'<'), Some(b'=')) => {
                Some(TokenKind::Operator(Op::AssignArithShL))
            }
            (Some(b'>'), Some(b'>'), Some(b'>'), Some(b'=')) => {
                Some(TokenKind::Operator(Op::AssignArithShR))
            }
            _ => None,
        };
        if let Some(kind) = sym4 {
            self.bump(4);
            return Token::with_trivia(kind, self.span_from(begin), trivia);
        }

        // Match 3-character symbols.
        let sym3 = match (b(0), b(1), b(2)) {
            (Some(b'<'), Some(b'<'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignLogicShL)),
            (Some(b'>'), Some(b'>'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignLogicShR)),
            (Some(b'='), Some(b'='), Some(b'=')) => Some(TokenKind::Operator(Op::CaseEq)),
            (Some(b'!'), Some(b'='), Some(b'=')) => Some(TokenKind::Operator(Op::CaseNeq)),
            (Some(b'='), Some(b'='), Some(b'?')) => Some(TokenKind::Operator(Op::WildcardEq)),
            (Some(b'!'), Some(b'='), Some(b'?')) => Some(TokenKind::Operator(Op::WildcardNeq)),
            (Some(b'<'), Some(b'-'), Some(b'>')) => Some(TokenKind::Operator(Op::LogicEquiv)),
            (Some(b'<'), Some(b'<'), Some(b'<')) => Some(TokenKind::Operator(Op::ArithShL)),
            (Some(b'>'), Some(b'>'), Some(b'>')) => Some(TokenKind::Operator(Op::ArithShR)),
            _ => None,
        };
        if let Some(kind) = sym3 {
            self.bump(3);
            return Token::with_trivia(kind, self.span_from(begin), trivia);
        }

        // Match 2-character symbols.
        let sym2 = match (b(0), b(1)) {
            (Some(b'+'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignAdd)),
            (Some(b'-'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignSub)),
            (Some(b'*'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignMul)),
            (Some(b'/'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignDiv)),
            (Some(b'%'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignMod)),
            (Some(b'&'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignBitAnd)),
            (Some(b'|'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignBitOr)),
            (Some(b'^'), Some(b'=')) => Some(TokenKind::Operator(Op::AssignBitXor)),
            (Some(b'+'), Some(b'+')) => Some(TokenKind::Operator(Op::Inc)),
            (Some(b'-'), Some(b'-')) => Some(TokenKind::Operator(Op::Dec)),
            (Some(b'*'), Some(b'*')) => Some(TokenKind::Operator(Op::Pow)),
            (Some(b'<'), Some(b'=')) => Some(TokenKind::Operator(Op::Leq)),
            (Some(b'>'), Some(b'=')) => Some(TokenKind::Operator(Op::Geq)),
            (Some(b'='), Some(b'=')) => Some(TokenKind::Operator(Op::LogicEq)),
            (Some(b'!'), Some(b'=')) => Some(TokenKind::Operator(Op::LogicNeq)),
            (Some(b'-'), Some(b'>')) => Some(TokenKind::Operator(Op::LogicImpl)),
            (Some(b'|'), Some(b'|')) => Some(TokenKind::Operator(Op::LogicOr)),
            (Some(b'&'), Some(b'&')) => Some(TokenKind::Operator(Op::LogicAnd)),
            (Some(b'~'), Some(b'&')) => Some(TokenKind::Operator(Op::BitNand)),
            (Some(b'~'), Some(b'|')) => Some(TokenKind::Operator(Op::BitNor)),
            (Some(b'~'), Some(b'^')) => Some(TokenKind::Operator(Op::BitNxor)),
            (Some(b'^'), Some(b'~')) => Some(TokenKind::Operator(Op::BitXnor)),
            (Some(b'<'), Some(b'<')) => Some(TokenKind::Operator(Op::LogicShL)),
            (Some(b'>'), Some(b'>')) => Some(TokenKind::Operator(Op::LogicShR)),
            (Some(b':'), Some(b':')) => Some(TokenKind::Namespace),
            (Some(b'+'), Some(b':')) => Some(TokenKind::AddColon),
            (Some(b'-'), Some(b':')) => Some(TokenKind::SubColon),
            (Some(b'#'), Some(b'#')) => Some(TokenKind::DoubleHashtag),
            _ => None,
        };
        if let Some(kind) = sym2 {
            self.bump(2);
            return Token::with_trivia(kind, self.span_from(begin), trivia);
        }

        // Match 1-character symbols.
        let sym1 = match b(0) {
            Some(b'=') => Some(TokenKind::Operator(Op::Assign)),
            Some(b'+') => Some(TokenKind::Operator(Op::Add)),
            Some(b'-') => Some(TokenKind::Operator(Op::Sub)),
            Some(b'*') => Some(TokenKind::Operator(Op::Mul)),
            Some(b'/') => Some(TokenKind::Operator(Op::Div)),
            Some(b'%') => Some(TokenKind::Operator(Op::Mod)),
            Some(b'<') => Some(TokenKind::Operator(Op::Lt)),
            Some(b'>') => Some(TokenKind::Operator(Op::Gt)),
            Some(b'!') => Some(TokenKind::Operator(Op::LogicNot)),
            Some(b'~') => Some(TokenKind::Operator(Op::BitNot)),
            Some(b'&') => Some(TokenKind::Operator(Op::BitAnd)),
            Some(b'|') => Some(TokenKind::Operator(Op::BitOr)),
            Some(b'^') => Some(TokenKind::Operator(Op::BitXor)),
            Some(b'(') => Some(TokenKind::OpenDelim(DelimToken::Paren)),
            Some(b')') => Some(TokenKind::CloseDelim(DelimToken::Paren)),
            Some(b'[') => Some(TokenKind::OpenDelim(DelimToken::Brack)),
            Some(b']') => Some(TokenKind::CloseDelim(DelimToken::Brack)),
            Some(b'{') => Some(TokenKind::OpenDelim(DelimToken::Brace)),
            Some(b'}') => Some(TokenKind::CloseDelim(DelimToken::Brace)),
            Some(b'#') => Some(TokenKind::Hashtag),
            Some(b',') => Some(TokenKind::Comma),
            Some(b'.') => Some(TokenKind::Period),
            Some(b':') => Some(TokenKind::Colon),
            Some(b';') => Some(TokenKind::Semicolon),
            Some(b'?') => Some(TokenKind::Ternary),
            Some(b'@') => Some(TokenKind::At),
            _ => None,
        };
        if let Some(kind) = sym1 {
            self.bump(1);
            return Token::with_trivia(kind, self.span_from(begin), trivia);
        }

        self.bump(1);
        let sp = self.span_from(begin);
        self.error(
            DiagBuilder2::error(format!(
                "unknown character `{}`",
                self.source.extract(begin, self.pos)
            ))
            .code(DiagCode::NonPrintableChar)
            .span(sp),
        );
        Token::with_trivia(TokenKind::Unknown, sp, trivia)
    }
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

fn utf8_sequence_len(first: u8) -> usize {
    match first {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

/// Concatenate the raw text of two tokens and re-lex the result. Returns the
/// single token it produces, or `None` if the texts do not combine into
/// exactly one token. This is the primitive behind `` `` `` pasting.
pub fn concatenate_tokens(a: &Token, b: &Token) -> Option<Token> {
    let text = format!("{}{}", a.raw_text(), b.raw_text());
    if text.is_empty() {
        return None;
    }
    let source = get_source_manager().add_anonymous(text);
    let scratch = Diagnostics::new();
    let mut lexer = Lexer::new(source, &scratch);
    let first = lexer.next_token(LexerMode::Normal);
    let second = lexer.next_token(LexerMode::Normal);
    let ok = second.kind == TokenKind::Eof
        && second.trivia.is_empty()
        && first.trivia.is_empty()
        && first.kind != TokenKind::Unknown
        && first.kind != TokenKind::Eof
        && scratch.is_empty();
    if ok {
        Some(first)
    } else {
        None
    }
}

/// Build a string literal token from a token list, preserving the
/// inter-token whitespace and escaping embedded quotes, then re-lex it as a
/// string. This is the primitive behind `` `" `` stringification.
pub fn stringify_tokens(tokens: &[Token]) -> Token {
    let mut text = String::from("\"");
    for tok in tokens {
        for trivia in &tok.trivia {
            match trivia.kind {
                // A continued line reads as a single separating space.
                TriviaKind::LineContinuation => text.push(' '),
                TriviaKind::Directive(_) | TriviaKind::DisabledText => (),
                _ => text.push_str(&trivia.span.extract()),
            }
        }
        match tok.kind {
            TokenKind::MacroEscapedQuote => text.push_str("\\\""),
            _ => {
                for ch in tok.raw_text().chars() {
                    match ch {
                        '"' => text.push_str("\\\""),
                        '\\' => text.push_str("\\\\"),
                        _ => text.push(ch),
                    }
                }
            }
        }
    }
    text.push('"');
    let source = get_source_manager().add_anonymous(text);
    let scratch = Diagnostics::new();
    let mut lexer = Lexer::new(source, &scratch);
    lexer.next_token(LexerMode::Normal)
}

/// Lex a piece of text into a single token on an anonymous buffer. Used by
/// the preprocessor to synthesize intrinsic macro expansions.
pub fn lex_one(text: &str) -> Token {
    let source = get_source_manager().add_anonymous(text.to_string());
    let scratch = Diagnostics::new();
    let mut lexer = Lexer::new(source, &scratch);
    lexer.next_token(LexerMode::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shannon_common::name::get_name_table;
    use std::cell::Cell;

    fn add_source(input: &str) -> Source {
        thread_local!(static INDEX: Cell<usize> = Cell::new(0));
        let sm = get_source_manager();
        let idx = INDEX.with(|i| {
            let v = i.get();
            i.set(v + 1);
            v
        });
        sm.add(&format!("lexer_test_{}.sv", idx), input)
    }

    fn lex(input: &str) -> (Vec<Token>, Diagnostics) {
        let diag = Diagnostics::new();
        let source = add_source(input);
        let mut lexer = Lexer::new(source, &diag);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token(LexerMode::Normal);
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        (tokens, diag)
    }

    fn check(input: &str, expected: &[TokenKind]) {
        let (tokens, diag) = lex(input);
        let kinds: Vec<_> = tokens
            .iter()
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Eof)
            .collect();
        assert_eq!(kinds, expected, "token mismatch for input {:?}", input);
        assert!(diag.is_empty(), "unexpected diagnostics for {:?}", input);
    }

    fn name(n: &str) -> Name {
        get_name_table().intern(n)
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

    /// According to IEEE 1800-2017 5.6
    #[test]
    fn idents() {
        check(
            "shiftreg_a busa_index error_condition merge_ab _bus3 n$657",
            &[
                TokenKind::Ident(name("shiftreg_a")),
                TokenKind::Ident(name("busa_index")),
                TokenKind::Ident(name("error_condition")),
                TokenKind::Ident(name("merge_ab")),
                TokenKind::Ident(name("_bus3")),
                TokenKind::Ident(name("n$657")),
            ],
        );
    }

    /// According to IEEE 1800-2017 5.6.1
    #[test]
    fn esc_idents() {
        check(
            "\\busa+index \\-clock \\{a,b} module \\module",
            &[
                TokenKind::EscIdent(name("busa+index")),
                TokenKind::EscIdent(name("-clock")),
                TokenKind::EscIdent(name("{a,b}")),
                TokenKind::Keyword(Kw::Module),
                TokenKind::EscIdent(name("module")),
            ],
        );
    }

    /// According to IEEE 1800-2017 5.6.3
    #[test]
    fn sys_idents() {
        check(
            "$display $finish $01_ad$as3_ $",
            &[
                TokenKind::SysIdent(name("display")),
                TokenKind::SysIdent(name("finish")),
                TokenKind::SysIdent(name("01_ad$as3_")),
                TokenKind::Dollar,
            ],
        );
    }

    #[test]
    fn keywords_and_delims() {
        check(
            "module foo; endmodule",
            &[
                TokenKind::Keyword(Kw::Module),
                TokenKind::Ident(name("foo")),
                TokenKind::Semicolon,
                TokenKind::Keyword(Kw::Endmodule),
            ],
        );
    }

    /// According to IEEE 1800-2017 5.7.1
    #[test]
    fn unbased_unsized_literals() {
        check(
            "'0 '1 'x 'X 'z 'Z '?",
            &[
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::Zero)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::One)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::X)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::X)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::Z)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::Z)),
                TokenKind::Literal(Lit::UnbasedUnsized(Logic::Z)),
            ],
        );
    }

    #[test]
    fn based_literals() {
        check(
            "659; 'h 837FF; 'o7460",
            &[
                TokenKind::Literal(Lit::Number(name("659"))),
                TokenKind::Semicolon,
                TokenKind::IntegerBase(false, LiteralBase::Hex),
                TokenKind::Digits(name("837FF")),
                TokenKind::Semicolon,
                TokenKind::IntegerBase(false, LiteralBase::Octal),
                TokenKind::Digits(name("7460")),
            ],
        );
        check(
            "4'b1001; 5 'D 3; 3'b01x; 12'hx; 16'hz",
            &[
                TokenKind::Literal(Lit::Number(name("4"))),
                TokenKind::IntegerBase(false, LiteralBase::Binary),
                TokenKind::Digits(name("1001")),
                TokenKind::Semicolon,
                TokenKind::Literal(Lit::Number(name("5"))),
                TokenKind::IntegerBase(false, LiteralBase::Decimal),
                TokenKind::Digits(name("3")),
                TokenKind::Semicolon,
                TokenKind::Literal(Lit::Number(name("3"))),
                TokenKind::IntegerBase(false, LiteralBase::Binary),
                TokenKind::Digits(name("01x")),
                TokenKind::Semicolon,
                TokenKind::Literal(Lit::Number(name("12"))),
                TokenKind::IntegerBase(false, LiteralBase::Hex),
                TokenKind::Digits(name("x")),
                TokenKind::Semicolon,
                TokenKind::Literal(Lit::Number(name("16"))),
                TokenKind::IntegerBase(false, LiteralBase::Hex),
                TokenKind::Digits(name("z")),
            ],
        );
    }

    #[test]
    fn signed_based_literals() {
        check(
            "4 'shf; 16'sd?",
            &[
                TokenKind::Literal(Lit::Number(name("4"))),
                TokenKind::IntegerBase(true, LiteralBase::Hex),
                TokenKind::Digits(name("f")),
                TokenKind::Semicolon,
                TokenKind::Literal(Lit::Number(name("16"))),
                TokenKind::IntegerBase(true, LiteralBase::Decimal),
                TokenKind::Digits(name("?")),
            ],
        );
    }

    #[test]
    fn underscores_in_literals() {
        check(
            "27_195_000; 16'b0011_0101_0001_1111",
            &[
                TokenKind::Literal(Lit::Number(name("27195000"))),
                TokenKind::Semicolon,
                TokenKind::Literal(Lit::Number(name("16"))),
                TokenKind::IntegerBase(false, LiteralBase::Binary),
                TokenKind::Digits(name("0011010100011111")),
            ],
        );
    }

    #[test]
    fn real_literals() {
        check(
            "4.2 1e6 2.5E-3 1_0.5",
            &[
                TokenKind::Literal(Lit::Real(name("4.2"))),
                TokenKind::Literal(Lit::Real(name("1e6"))),
                TokenKind::Literal(Lit::Real(name("2.5E-3"))),
                TokenKind::Literal(Lit::Real(name("10.5"))),
            ],
        );
    }

    #[test]
    fn time_literals() {
        check(
            "42s 14.3ms 16.32us 9ns 0.1ps 8123fs",
            &[
                TokenKind::Literal(Lit::Time(name("42"), None, TimeUnit::Second)),
                TokenKind::Literal(Lit::Time(
                    name("14"),
                    Some(name("3")),
                    TimeUnit::MilliSecond,
                )),
                TokenKind::Literal(Lit::Time(
                    name("16"),
                    Some(name("32")),
                    TimeUnit::MicroSecond,
                )),
                TokenKind::Literal(Lit::Time(name("9"), None, TimeUnit::NanoSecond)),
                TokenKind::Literal(Lit::Time(name("0"), Some(name("1")), TimeUnit::PicoSecond)),
                TokenKind::Literal(Lit::Time(name("8123"), None, TimeUnit::FemtoSecond)),
            ],
        );
        // `ns2` is not a unit; the letters stay with the next token.
        check(
            "5 nsx",
            &[
                TokenKind::Literal(Lit::Number(name("5"))),
                TokenKind::Ident(name("nsx")),
            ],
        );
    }

    /// According to IEEE 1800-2017 5.9
    #[test]
    fn string_literals() {
        check(
            r#""hello" "a\"b" "tab\tend" "\x41\102\n""#,
            &[
                TokenKind::Literal(Lit::Str(name("hello"))),
                TokenKind::Literal(Lit::Str(name("a\"b"))),
                TokenKind::Literal(Lit::Str(name("tab\tend"))),
                TokenKind::Literal(Lit::Str(name("AB\n"))),
            ],
        );
    }

    #[test]
    fn multiline_string_literal() {
        check(
            "\"Humpty Dumpty sat on a wall. \\\nHumpty Dumpty had a great fall.\"",
            &[TokenKind::Literal(Lit::Str(name(
                "Humpty Dumpty sat on a wall. Humpty Dumpty had a great fall.",
            )))],
        );
    }

    #[test]
    fn string_with_comment_markers() {
        // The `//` inside the string must not start a comment.
        check(
            r#""http://example.com""#,
            &[TokenKind::Literal(Lit::Str(name("http://example.com")))],
        );
    }

    #[test]
    fn unterminated_string() {
        let (tokens, diag) = lex("\"abc\nx");
        assert_eq!(tokens[0].kind, TokenKind::Literal(Lit::Str(name("abc"))));
        assert_eq!(diag.sorted_codes(), vec![DiagCode::UnterminatedString]);
    }

    #[test]
    fn unknown_escape_keeps_char() {
        let (tokens, diag) = lex(r#""a\qb""#);
        assert_eq!(tokens[0].kind, TokenKind::Literal(Lit::Str(name("aqb"))));
        assert_eq!(diag.sorted_codes(), vec![DiagCode::InvalidEscapeSequence]);
    }

    #[test]
    fn directives_and_macro_tokens() {
        check(
            "`timescale `FOO `` `\"",
            &[
                TokenKind::Directive(name("timescale")),
                TokenKind::Directive(name("FOO")),
                TokenKind::MacroPaste,
                TokenKind::MacroQuote,
            ],
        );
    }

    #[test]
    fn non_printable_char() {
        let (tokens, diag) = lex("\x04");
        assert_eq!(tokens[0].kind, TokenKind::Unknown);
        assert_eq!(diag.sorted_codes(), vec![DiagCode::NonPrintableChar]);
    }

    #[test]
    fn non_ascii_char_is_one_token() {
        let (tokens, diag) = lex("a 老 b");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident(name("a")),
                TokenKind::Unknown,
                TokenKind::Ident(name("b")),
                TokenKind::Eof,
            ],
        );
        assert_eq!(diag.sorted_codes(), vec![DiagCode::NonAsciiChar]);
    }

    #[test]
    fn bom_is_diagnosed_and_skipped() {
        let (tokens, diag) = lex("\u{FEFF}module");
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Kw::Module));
        assert_eq!(diag.sorted_codes(), vec![DiagCode::UnicodeBOM]);
    }

    #[test]
    fn nested_block_comment_diagnosed() {
        let (tokens, diag) = lex("/* a /* b */ x");
        assert_eq!(tokens[0].kind, TokenKind::Ident(name("x")));
        assert_eq!(diag.sorted_codes(), vec![DiagCode::NestedBlockComment]);
    }

    #[test]
    fn error_cap_stops_the_lexer() {
        let diag = Diagnostics::new();
        let source = add_source("\x01\x02\x03\x04 module");
        let mut lexer = Lexer::with_options(
            source,
            &diag,
            Default::default(),
            LexerOptions { max_errors: 2 },
        );
        let mut kinds = Vec::new();
        loop {
            let tok = lexer.next_token(LexerMode::Normal);
            let done = tok.kind == TokenKind::Eof;
            kinds.push(tok.kind);
            if done {
                break;
            }
        }
        // Two unknown tokens, then the cap trips and the lexer jumps to the
        // end of the buffer.
        assert_eq!(
            kinds,
            vec![TokenKind::Unknown, TokenKind::Unknown, TokenKind::Eof]
        );
        assert!(diag
            .sorted_codes()
            .contains(&DiagCode::TooManyErrors));
    }

    #[test]
    fn directive_mode_ends_at_newline() {
        let diag = Diagnostics::new();
        let source = add_source("`define FOO bar\nnext");
        let mut lexer = Lexer::new(source, &diag);
        assert_eq!(
            lexer.next_token(LexerMode::Normal).kind,
            TokenKind::Directive(name("define"))
        );
        assert_eq!(
            lexer.next_token(LexerMode::Directive).kind,
            TokenKind::Ident(name("FOO"))
        );
        assert_eq!(
            lexer.next_token(LexerMode::Directive).kind,
            TokenKind::Ident(name("bar"))
        );
        assert_eq!(
            lexer.next_token(LexerMode::Directive).kind,
            TokenKind::EndOfDirective
        );
        // Back in normal mode the newline becomes leading trivia.
        let next = lexer.next_token(LexerMode::Normal);
        assert_eq!(next.kind, TokenKind::Ident(name("next")));
        assert_eq!(next.trivia[0].kind, TriviaKind::Newline);
        assert!(diag.is_empty());
    }

    #[test]
    fn directive_mode_line_continuation() {
        let diag = Diagnostics::new();
        let source = add_source("a \\\n b\nc");
        let mut lexer = Lexer::new(source, &diag);
        assert_eq!(
            lexer.next_token(LexerMode::Directive).kind,
            TokenKind::Ident(name("a"))
        );
        let b = lexer.next_token(LexerMode::Directive);
        assert_eq!(b.kind, TokenKind::Ident(name("b")));
        assert!(b
            .trivia
            .iter()
            .any(|t| t.kind == TriviaKind::LineContinuation));
        assert_eq!(
            lexer.next_token(LexerMode::Directive).kind,
            TokenKind::EndOfDirective
        );
    }

    #[test]
    fn include_file_name_modes() {
        let diag = Diagnostics::new();
        let source = add_source("\"stuff.svh\" <bits.svh>");
        let mut lexer = Lexer::new(source, &diag);
        assert_eq!(
            lexer.next_token(LexerMode::IncludeFileName).kind,
            TokenKind::IncludeFileName(name("stuff.svh"), true)
        );
        assert_eq!(
            lexer.next_token(LexerMode::IncludeFileName).kind,
            TokenKind::IncludeFileName(name("bits.svh"), false)
        );
    }

    #[test]
    fn round_trip_exact() {
        let inputs = [
            "module foo;\r\n  // comment\r\n  int x = 4'b10_01;\r\nendmodule\r\n",
            "/* block\n   comment */ a + b\t// tail\n",
            "`define FOO(x) (x)\nassign y = `FOO(12);\n",
            "\"a string with // no comment\"\n",
            "x <= #3 'habc;\n",
        ];
        for input in &inputs {
            let (tokens, _) = lex(input);
            assert_eq!(&render(&tokens), input, "round trip failed for {:?}", input);
        }
    }

    #[test]
    fn trivia_attachment() {
        let (tokens, diag) = lex("  // lead\n foo");
        assert!(diag.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Ident(name("foo")));
        let kinds: Vec<_> = tokens[0].trivia.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TriviaKind::Whitespace,
                TriviaKind::LineComment,
                TriviaKind::Newline,
                TriviaKind::Whitespace,
            ],
        );
        // Only the end-of-file token carries trailing trivia.
        let (tokens, _) = lex("foo  ");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
        assert_eq!(tokens[1].trivia.len(), 1);
    }

    #[test]
    fn concatenation_primitive() {
        let a = lex_one("foo");
        let b = lex_one("bar");
        let pasted = concatenate_tokens(&a, &b).expect("paste should produce a token");
        assert_eq!(pasted.kind, TokenKind::Ident(name("foobar")));

        let lt = lex_one("<");
        let eq = lex_one("=");
        let pasted = concatenate_tokens(&lt, &eq).expect("paste should produce a token");
        assert_eq!(pasted.kind, TokenKind::Operator(Op::Leq));

        // Pasting something that lexes as two tokens fails.
        let paren = lex_one(")");
        assert_eq!(concatenate_tokens(&a, &paren), None);
        let semi = lex_one(";");
        assert_eq!(concatenate_tokens(&semi, &semi), None);
    }

    #[test]
    fn stringify_primitive() {
        let toks = [lex_one("a"), lex_one("+"), lex_one("b")];
        let s = stringify_tokens(&toks);
        match s.kind {
            TokenKind::Literal(Lit::Str(n)) => assert_eq!(&*n.as_str(), "a+b"),
            k => panic!("expected string literal, got {:?}", k),
        }
    }
}

// Copyright (c) 2024-2026 The shannon developers

//! Defines all tokens that may result from performing lexical analysis on a
//! SystemVerilog source file. This module is inspired heavily by the tokens
//! used in the Rust compiler.

use shannon_common::name::Name;
use shannon_common::source::{Span, INVALID_SPAN};
use shannon_common::svint::{LiteralBase, Logic};
use std::fmt;

pub use crate::keywords::{Kw, KeywordVersion};

/// The different kinds of tokens the lexer can emit. The payload of a token
/// is interned where it is textual; the raw text is always recoverable from
/// the token's span.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TokenKind {
    /// An operator symbol such as `+` or `<<=`.
    Operator(Op),
    /// An opening delimiter.
    OpenDelim(DelimToken),
    /// A closing delimiter.
    CloseDelim(DelimToken),
    Comma,
    Period,
    Colon,
    Semicolon,
    Ternary,
    At,
    Hashtag,
    DoubleHashtag,
    Namespace,
    AddColon,
    SubColon,
    Dollar,
    Apostrophe,
    /// An identifier.
    Ident(Name),
    /// An escaped identifier; the name is the text after the backslash.
    EscIdent(Name),
    /// A system task or function identifier, e.g. `$display`. The name does
    /// not include the dollar sign.
    SysIdent(Name),
    /// A keyword under the active keyword version.
    Keyword(Kw),
    /// A literal.
    Literal(Lit),
    /// The `'s?[bodh]` base of a based integer literal. The digits follow as
    /// separate [`TokenKind::Digits`] tokens which the parser assembles.
    IntegerBase(bool, LiteralBase),
    /// A run of literal digits following an integer base token. Underscores
    /// are stripped from the interned name.
    Digits(Name),
    /// A file name operand of an `include directive; the flag is true for
    /// the quoted form and false for the bracketed form.
    IncludeFileName(Name, bool),
    /// A compiler directive, e.g. `` `timescale `` or a macro usage. The
    /// name does not include the grave accent.
    Directive(Name),
    /// The `` `" `` token inside a macro body.
    MacroQuote,
    /// The `` `\`" `` token inside a macro body.
    MacroEscapedQuote,
    /// The `` `` `` token pasting its two neighbors together.
    MacroPaste,
    /// The end of a directive line. Produced only in directive mode.
    EndOfDirective,
    /// The end of the input buffer.
    Eof,
    /// A byte sequence the lexer could not make sense of.
    Unknown,
}

/// A delimiter token such as parentheses or brackets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DelimToken {
    /// A round parenthesis `(` or `)`.
    Paren,
    /// A square bracket `[` or `]`.
    Brack,
    /// A curly brace `{` or `}`.
    Brace,
}

/// Abstract literals. Numeric values are carried as interned digit strings
/// and decoded by the parser.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Lit {
    /// A string literal; the name holds the unescaped value.
    Str(Name),
    /// An unsigned decimal number.
    Number(Name),
    /// A real number, including its fraction and exponent text.
    Real(Name),
    /// A time literal with integer part, optional fraction, and unit.
    Time(Name, Option<Name>, TimeUnit),
    /// An unbased unsized literal `'0`, `'1`, `'x`, or `'z`.
    UnbasedUnsized(Logic),
}

/// The unit of a time literal or timescale specification.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TimeUnit {
    Second,
    MilliSecond,
    MicroSecond,
    NanoSecond,
    PicoSecond,
    FemtoSecond,
}

impl TimeUnit {
    /// Interpret a literal suffix as a time unit.
    pub fn from_suffix(s: &str) -> Option<TimeUnit> {
        match s {
            "s" => Some(TimeUnit::Second),
            "ms" => Some(TimeUnit::MilliSecond),
            "us" => Some(TimeUnit::MicroSecond),
            "ns" => Some(TimeUnit::NanoSecond),
            "ps" => Some(TimeUnit::PicoSecond),
            "fs" => Some(TimeUnit::FemtoSecond),
            _ => None,
        }
    }

    pub fn to_suffix(self) -> &'static str {
        match self {
            TimeUnit::Second => "s",
            TimeUnit::MilliSecond => "ms",
            TimeUnit::MicroSecond => "us",
            TimeUnit::NanoSecond => "ns",
            TimeUnit::PicoSecond => "ps",
            TimeUnit::FemtoSecond => "fs",
        }
    }
}

/// An operator symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Op {
    // Assignment
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignBitAnd,
    AssignBitOr,
    AssignBitXor,
    AssignLogicShL,
    AssignLogicShR,
    AssignArithShL,
    AssignArithShR,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Inc,
    Dec,

    // Equality
    LogicEq,
    LogicNeq,
    CaseEq,
    CaseNeq,
    WildcardEq,
    WildcardNeq,

    // Relational
    Lt,
    Leq,
    Gt,
    Geq,

    // Logic
    LogicNot,
    LogicAnd,
    LogicOr,
    LogicImpl,
    LogicEquiv,

    // Bitwise
    BitNot,
    BitAnd,
    BitNand,
    BitOr,
    BitNor,
    BitXor,
    BitXnor,
    BitNxor,

    // Shift
    LogicShL,
    LogicShR,
    ArithShL,
    ArithShR,
}

/// The precedence levels of the expression grammar, from loosest to
/// tightest binding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Precedence {
    Min,
    MinTypMax,
    Assignment,
    Implication,
    Ternary,
    LogicOr,
    LogicAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Relational,
    Shift,
    Addition,
    Multiplication,
    Pow,
    Unary,
    Postfix,
    Scope,
    Max,
}

impl Op {
    /// The precedence this operator climbs at when used as a binary
    /// operator.
    pub fn get_precedence(self) -> Precedence {
        match self {
            Op::Assign
            | Op::AssignAdd
            | Op::AssignSub
            | Op::AssignMul
            | Op::AssignDiv
            | Op::AssignMod
            | Op::AssignBitAnd
            | Op::AssignBitOr
            | Op::AssignBitXor
            | Op::AssignLogicShL
            | Op::AssignLogicShR
            | Op::AssignArithShL
            | Op::AssignArithShR => Precedence::Assignment,
            Op::LogicImpl | Op::LogicEquiv => Precedence::Implication,
            Op::LogicOr => Precedence::LogicOr,
            Op::LogicAnd => Precedence::LogicAnd,
            Op::BitOr | Op::BitNor => Precedence::BitOr,
            Op::BitXor | Op::BitXnor | Op::BitNxor => Precedence::BitXor,
            Op::BitAnd | Op::BitNand => Precedence::BitAnd,
            Op::LogicEq
            | Op::LogicNeq
            | Op::CaseEq
            | Op::CaseNeq
            | Op::WildcardEq
            | Op::WildcardNeq => Precedence::Equality,
            Op::Lt | Op::Leq | Op::Gt | Op::Geq => Precedence::Relational,
            Op::LogicShL | Op::LogicShR | Op::ArithShL | Op::ArithShR => Precedence::Shift,
            Op::Add | Op::Sub => Precedence::Addition,
            Op::Mul | Op::Div | Op::Mod => Precedence::Multiplication,
            Op::Pow => Precedence::Pow,
            _ => Precedence::Unary,
        }
    }

    /// Whether this operator associates to the right. Only exponentiation
    /// does; the ternary is handled separately.
    pub fn is_right_associative(self) -> bool {
        self == Op::Pow
    }
}

/// Classify a token as a binary operator.
pub fn as_binary_operator(tkn: TokenKind) -> Option<Op> {
    match tkn {
        TokenKind::Operator(op) => match op {
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Pow
            | Op::LogicEq
            | Op::LogicNeq
            | Op::CaseEq
            | Op::CaseNeq
            | Op::WildcardEq
            | Op::WildcardNeq
            | Op::Lt
            | Op::Leq
            | Op::Gt
            | Op::Geq
            | Op::LogicAnd
            | Op::LogicOr
            | Op::LogicImpl
            | Op::LogicEquiv
            | Op::BitAnd
            | Op::BitNand
            | Op::BitOr
            | Op::BitNor
            | Op::BitXor
            | Op::BitXnor
            | Op::BitNxor
            | Op::LogicShL
            | Op::LogicShR
            | Op::ArithShL
            | Op::ArithShR => Some(op),
            _ => None,
        },
        _ => None,
    }
}

/// Classify a token as a unary prefix operator.
pub fn as_unary_operator(tkn: TokenKind) -> Option<Op> {
    match tkn {
        TokenKind::Operator(op) => match op {
            Op::Add
            | Op::Sub
            | Op::LogicNot
            | Op::BitNot
            | Op::BitAnd
            | Op::BitNand
            | Op::BitOr
            | Op::BitNor
            | Op::BitXor
            | Op::BitXnor
            | Op::BitNxor => Some(op),
            _ => None,
        },
        _ => None,
    }
}

/// Classify a token as an assignment operator.
pub fn as_assign_operator(tkn: TokenKind) -> Option<Op> {
    match tkn {
        TokenKind::Operator(op) => match op {
            Op::Assign
            | Op::AssignAdd
            | Op::AssignSub
            | Op::AssignMul
            | Op::AssignDiv
            | Op::AssignMod
            | Op::AssignBitAnd
            | Op::AssignBitOr
            | Op::AssignBitXor
            | Op::AssignLogicShL
            | Op::AssignLogicShR
            | Op::AssignArithShL
            | Op::AssignArithShR => Some(op),
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Op::Assign => "=",
            Op::AssignAdd => "+=",
            Op::AssignSub => "-=",
            Op::AssignMul => "*=",
            Op::AssignDiv => "/=",
            Op::AssignMod => "%=",
            Op::AssignBitAnd => "&=",
            Op::AssignBitOr => "|=",
            Op::AssignBitXor => "^=",
            Op::AssignLogicShL => "<<=",
            Op::AssignLogicShR => ">>=",
            Op::AssignArithShL => "<<<=",
            Op::AssignArithShR => ">>>=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "**",
            Op::Inc => "++",
            Op::Dec => "--",
            Op::LogicEq => "==",
            Op::LogicNeq => "!=",
            Op::CaseEq => "===",
            Op::CaseNeq => "!==",
            Op::WildcardEq => "==?",
            Op::WildcardNeq => "!=?",
            Op::Lt => "<",
            Op::Leq => "<=",
            Op::Gt => ">",
            Op::Geq => ">=",
            Op::LogicNot => "!",
            Op::LogicAnd => "&&",
            Op::LogicOr => "||",
            Op::LogicImpl => "->",
            Op::LogicEquiv => "<->",
            Op::BitNot => "~",
            Op::BitAnd => "&",
            Op::BitNand => "~&",
            Op::BitOr => "|",
            Op::BitNor => "~|",
            Op::BitXor => "^",
            Op::BitXnor => "^~",
            Op::BitNxor => "~^",
            Op::LogicShL => "<<",
            Op::LogicShR => ">>",
            Op::ArithShL => "<<<",
            Op::ArithShR => ">>>",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TokenKind::Operator(op) => write!(f, "{}", op),
            TokenKind::OpenDelim(DelimToken::Paren) => write!(f, "("),
            TokenKind::OpenDelim(DelimToken::Brack) => write!(f, "["),
            TokenKind::OpenDelim(DelimToken::Brace) => write!(f, "{{"),
            TokenKind::CloseDelim(DelimToken::Paren) => write!(f, ")"),
            TokenKind::CloseDelim(DelimToken::Brack) => write!(f, "]"),
            TokenKind::CloseDelim(DelimToken::Brace) => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Period => write!(f, "."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Ternary => write!(f, "?"),
            TokenKind::At => write!(f, "@"),
            TokenKind::Hashtag => write!(f, "#"),
            TokenKind::DoubleHashtag => write!(f, "##"),
            TokenKind::Namespace => write!(f, "::"),
            TokenKind::AddColon => write!(f, "+:"),
            TokenKind::SubColon => write!(f, "-:"),
            TokenKind::Dollar => write!(f, "$"),
            TokenKind::Apostrophe => write!(f, "'"),
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::EscIdent(name) => write!(f, "\\{}", name),
            TokenKind::SysIdent(name) => write!(f, "${}", name),
            TokenKind::Keyword(kw) => write!(f, "{}", kw.as_str()),
            TokenKind::Literal(lit) => write!(f, "{}", lit),
            TokenKind::IntegerBase(signed, base) => {
                let base = match base {
                    LiteralBase::Binary => 'b',
                    LiteralBase::Octal => 'o',
                    LiteralBase::Decimal => 'd',
                    LiteralBase::Hex => 'h',
                };
                write!(f, "'{}{}", if signed { "s" } else { "" }, base)
            }
            TokenKind::Digits(name) => write!(f, "{}", name),
            TokenKind::IncludeFileName(name, true) => write!(f, "\"{}\"", name),
            TokenKind::IncludeFileName(name, false) => write!(f, "<{}>", name),
            TokenKind::Directive(name) => write!(f, "`{}", name),
            TokenKind::MacroQuote => write!(f, "`\""),
            TokenKind::MacroEscapedQuote => write!(f, "`\\`\""),
            TokenKind::MacroPaste => write!(f, "``"),
            TokenKind::EndOfDirective => write!(f, "<end of directive>"),
            TokenKind::Eof => write!(f, "<eof>"),
            TokenKind::Unknown => write!(f, "<unknown>"),
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Lit::Str(name) => write!(f, "\"{}\"", name),
            Lit::Number(name) => write!(f, "{}", name),
            Lit::Real(name) => write!(f, "{}", name),
            Lit::Time(value, None, unit) => write!(f, "{}{}", value, unit.to_suffix()),
            Lit::Time(value, Some(frac), unit) => {
                write!(f, "{}.{}{}", value, frac, unit.to_suffix())
            }
            Lit::UnbasedUnsized(logic) => write!(f, "'{}", logic),
        }
    }
}

/// The categories of trivia that can precede a token.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TriviaKind {
    /// Spaces and horizontal tabs.
    Whitespace,
    /// A line ending, including the CR of a CRLF pair.
    Newline,
    /// A backslash immediately followed by a newline inside a directive.
    LineContinuation,
    /// A `//` comment up to the end of the line.
    LineComment,
    /// A `/* */` comment.
    BlockComment,
    /// Source text skipped by an untaken conditional branch.
    DisabledText,
    /// A preprocessor directive that was consumed by the preprocessor.
    Directive(DirectiveKind),
}

/// The directive a [`TriviaKind::Directive`] trivia originated from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirectiveKind {
    Include,
    Define,
    Undef,
    UndefineAll,
    Ifdef,
    Ifndef,
    Elsif,
    Else,
    Endif,
    Timescale,
    DefaultNettype,
    Resetall,
    Line,
    BeginKeywords,
    EndKeywords,
    Celldefine,
    Endcelldefine,
    UnconnectedDrive,
    NoUnconnectedDrive,
    Pragma,
    MacroUsage,
    Unknown,
}

/// A piece of trivia preceding a token. The raw text is the span's extract.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub span: Span,
}

impl Trivia {
    pub fn new(kind: TriviaKind, span: Span) -> Trivia {
        Trivia { kind, span }
    }
}

/// A token produced by the lexer: a kind, the span covering its raw text,
/// and the trivia leading up to it.
#[derive(Clone, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub trivia: Vec<Trivia>,
}

impl Token {
    /// Create a token with no leading trivia.
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            span,
            trivia: Vec::new(),
        }
    }

    /// Create a token with leading trivia.
    pub fn with_trivia(kind: TokenKind, span: Span, trivia: Vec<Trivia>) -> Token {
        Token { kind, span, trivia }
    }

    /// Synthesize a token that did not appear in the input. Its span is the
    /// invalid sentinel, which marks it as missing and makes it render as
    /// empty text.
    pub fn missing(kind: TokenKind) -> Token {
        Token::new(kind, INVALID_SPAN)
    }

    /// Whether this token was synthesized rather than lexed.
    pub fn is_missing(&self) -> bool {
        !self.span.source.is_valid()
    }

    /// The raw source text of this token, excluding trivia.
    pub fn raw_text(&self) -> String {
        self.span.extract()
    }

    /// Whether any of the leading trivia contains a line ending.
    pub fn is_first_on_line(&self) -> bool {
        self.trivia
            .iter()
            .any(|t| t.kind == TriviaKind::Newline)
    }
}

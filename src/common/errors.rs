// Copyright (c) 2024-2026 The shannon developers

//! Utilities to implement diagnostics and error reporting facilities.

use crate::source::{Span, INVALID_SOURCE};
use std::cell::RefCell;
use std::fmt;

/// Emits diagnostic messages.
pub trait DiagEmitter {
    /// Emit a diagnostic message.
    fn emit(&self, diag: DiagBuilder2);
}

impl<'a, T> DiagEmitter for &'a T
where
    T: DiagEmitter + ?Sized,
{
    fn emit(&self, diag: DiagBuilder2) {
        (*self).emit(diag)
    }
}

/// A diagnostic result type. Either carries the result `T` in the Ok variant,
/// or an assembled diagnostic in the Err variant.
pub type DiagResult2<T> = Result<T, DiagBuilder2>;

/// Used to emit structured error messages.
#[must_use]
#[derive(Clone, Debug)]
pub struct DiagBuilder2 {
    pub severity: Severity,
    pub code: Option<DiagCode>,
    pub message: String,
    pub segments: Vec<DiagSegment>,
}

/// A portion of a diagnostic message.
#[derive(Clone, Debug)]
pub enum DiagSegment {
    Span(Span),
    Note(String),
}

impl DiagBuilder2 {
    pub fn new<S: Into<String>>(severity: Severity, message: S) -> DiagBuilder2 {
        DiagBuilder2 {
            severity,
            code: None,
            message: message.into(),
            segments: Vec::new(),
        }
    }

    pub fn bug<S: Into<String>>(message: S) -> DiagBuilder2 {
        DiagBuilder2::new(Severity::Bug, message)
    }

    pub fn fatal<S: Into<String>>(message: S) -> DiagBuilder2 {
        DiagBuilder2::new(Severity::Fatal, message)
    }

    pub fn error<S: Into<String>>(message: S) -> DiagBuilder2 {
        DiagBuilder2::new(Severity::Error, message)
    }

    pub fn warning<S: Into<String>>(message: S) -> DiagBuilder2 {
        DiagBuilder2::new(Severity::Warning, message)
    }

    pub fn note<S: Into<String>>(message: S) -> DiagBuilder2 {
        DiagBuilder2::new(Severity::Note, message)
    }

    pub fn segment(self, segment: DiagSegment) -> DiagBuilder2 {
        let mut segments = self.segments;
        segments.push(segment);
        DiagBuilder2 { segments, ..self }
    }

    /// Attach the machine-readable code for this diagnostic.
    pub fn code(self, code: DiagCode) -> DiagBuilder2 {
        DiagBuilder2 {
            code: Some(code),
            ..self
        }
    }

    pub fn span<S: Into<Span>>(self, span: S) -> DiagBuilder2 {
        self.segment(DiagSegment::Span(span.into()))
    }

    pub fn add_note<S: Into<String>>(self, message: S) -> DiagBuilder2 {
        self.segment(DiagSegment::Note(message.into()))
    }

    pub fn get_severity(&self) -> Severity {
        self.severity
    }

    pub fn get_code(&self) -> Option<DiagCode> {
        self.code
    }

    pub fn get_message(&self) -> &String {
        &self.message
    }

    pub fn get_segments(&self) -> &[DiagSegment] {
        &self.segments
    }

    /// Obtain the first span attached to this diagnostic, if any. This is the
    /// span diagnostics are sorted by when reported.
    pub fn first_span(&self) -> Option<Span> {
        self.segments.iter().find_map(|s| match s {
            DiagSegment::Span(sp) => Some(*sp),
            _ => None,
        })
    }
}

/// The severity of a diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
    Bug,
}

impl Severity {
    pub fn to_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Bug => "compiler bug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// A machine-readable code identifying the kind of a diagnostic.
///
/// The codes are grouped by the compilation stage that emits them. Tests
/// match on these rather than on message strings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiagCode {
    // Lexical errors
    UnicodeBOM,
    NonAsciiChar,
    NonPrintableChar,
    EmbeddedNull,
    UnterminatedString,
    UnterminatedBlockComment,
    NestedBlockComment,
    SplitBlockCommentInDirective,
    InvalidEscapeSequence,
    EscapeSequenceTooLarge,
    MissingDigits,
    MissingExponentDigits,
    RealExponentTooLarge,
    DigitsLeadingUnderscore,
    ExpectedClosingQuote,
    TooManyErrors,

    // Directive errors
    UnknownDirective,
    MisplacedDirectiveChar,
    ExpectedIncludeFileName,
    IncludeNotFound,
    ExpectedEndOfDirective,
    InvalidTimescale,
    InvalidLineDirective,
    UnrecognizedKeywordVersion,
    MismatchedEndKeywords,

    // Macro errors
    UnknownMacro,
    ExpectedMacroName,
    InvalidMacroName,
    ExpectedMacroArgs,
    NotEnoughMacroArgs,
    TooManyMacroArgs,
    MacroRecursion,
    MacroPasteFailed,
    MacroStringifyFailed,
    UnbalancedMacroArgs,

    // Conditional directive errors
    UnexpectedConditionalDirective,
    UnbalancedConditionalDirective,
    ElsifAfterElse,

    // Syntax errors
    ExpectedToken,
    ExpectedExpression,
    ExpectedStatement,
    ExpectedItem,
    ExpectedType,
    ExpectedLiteralDigits,
    LiteralSizeTruncated,
    SuperfluousComma,

    // Semantic errors
    UnknownName,
    NotAValue,
    NotACallable,
    NotAType,
    NotAScope,
    MemberAccessNotStruct,
    UnknownMember,
    IndexMustBeIntegral,
    CannotIndexScalar,
    BadUnaryOperand,
    BadBinaryOperands,
    BadAssignment,
    NoImplicitConversion,
    ExpressionNotAssignable,
    DuplicateDefinition,
    UnknownSystemFunction,
    FinalizedCompilation,

    // Constant evaluation errors
    ExpressionNotConstant,
    ValueMustBePositive,
    ValueMustNotBeUnknown,
    ValueOutOfRange,
    WrongNumberOfArguments,

    // Limit errors
    IncludeDepthExceeded,
    ParserDepthExceeded,
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An append-only store for diagnostics.
///
/// Diagnostics are kept in emission order. When read back through
/// [`sorted`](Diagnostics::sorted) they are ordered by the buffer and offset
/// of their first span so that reports are independent of internal traversal
/// order; diagnostics without a span sort first.
#[derive(Default)]
pub struct Diagnostics {
    diags: RefCell<Vec<DiagBuilder2>>,
}

impl Diagnostics {
    /// Create a new empty diagnostics store.
    pub fn new() -> Diagnostics {
        Default::default()
    }

    /// Check whether no diagnostics were emitted.
    pub fn is_empty(&self) -> bool {
        self.diags.borrow().is_empty()
    }

    /// The number of diagnostics emitted.
    pub fn len(&self) -> usize {
        self.diags.borrow().len()
    }

    /// The number of diagnostics of at least error severity.
    pub fn num_errors(&self) -> usize {
        self.diags
            .borrow()
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .count()
    }

    /// Obtain the diagnostics sorted by source order.
    pub fn sorted(&self) -> Vec<DiagBuilder2> {
        let mut v = self.diags.borrow().clone();
        v.sort_by_key(|d| {
            d.first_span()
                .map(|sp| (sp.source, sp.begin))
                .unwrap_or((INVALID_SOURCE, 0))
        });
        v
    }

    /// Obtain the codes of the sorted diagnostics. Convenient in tests.
    pub fn sorted_codes(&self) -> Vec<DiagCode> {
        self.sorted().iter().filter_map(|d| d.code).collect()
    }
}

impl DiagEmitter for Diagnostics {
    fn emit(&self, diag: DiagBuilder2) {
        self.diags.borrow_mut().push(diag);
    }
}

impl fmt::Display for DiagBuilder2 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.code {
            Some(code) => write!(
                f,
                "{}[{}]: {}",
                self.get_severity(),
                code,
                self.get_message()
            )?,
            None => write!(f, "{}: {}", self.get_severity(), self.get_message())?,
        }
        for segment in &self.segments {
            match *segment {
                DiagSegment::Span(sp) => {
                    if sp.source.is_valid() {
                        let (line, col, _) = sp.begin().human();
                        write!(f, "\n  --> {}:{}:{}", sp.source.get_path(), line, col)?;
                    }
                }
                DiagSegment::Note(ref message) => write!(f, "\n   = note: {}", message)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::get_source_manager;

    #[test]
    fn sorted_by_source_order() {
        let sm = get_source_manager();
        let source = sm.add("sorted_by_source_order.sv", "abc\ndef\n");
        let diag = Diagnostics::new();
        diag.emit(
            DiagBuilder2::error("second")
                .code(DiagCode::ExpectedToken)
                .span(Span::new(source, 4, 5)),
        );
        diag.emit(
            DiagBuilder2::error("first")
                .code(DiagCode::ExpectedExpression)
                .span(Span::new(source, 0, 1)),
        );
        let sorted = diag.sorted();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].get_message(), "first");
        assert_eq!(sorted[1].get_message(), "second");
        assert_eq!(
            diag.sorted_codes(),
            vec![DiagCode::ExpectedExpression, DiagCode::ExpectedToken]
        );
    }

    #[test]
    fn severity_counting() {
        let diag = Diagnostics::new();
        diag.emit(DiagBuilder2::warning("w"));
        diag.emit(DiagBuilder2::error("e"));
        assert_eq!(diag.len(), 2);
        assert_eq!(diag.num_errors(), 1);
    }
}

// Copyright (c) 2024-2026 The shannon developers

//! Lexical analysis, preprocessing, and parsing for SystemVerilog, based on
//! IEEE 1800-2017.
//!
//! The stages in this crate turn raw source bytes into a concrete syntax
//! tree. The [`Lexer`](lexer::Lexer) produces trivia-preserving tokens, the
//! [`Preprocessor`](preproc::Preprocessor) interprets directives and expands
//! macros on the token stream, and the parser assembles the result into a
//! [`SyntaxTree`].

#[macro_use]
extern crate log;

pub mod ast;
pub mod keywords;
pub mod lexer;
pub mod parser;
pub mod preproc;
pub mod token;

use shannon_common::errors::DiagEmitter;
use shannon_common::source::{get_source_manager, Source};
use std::cell::Cell;

use crate::preproc::{Preprocessor, PreprocessorOptions};
use crate::token::Token;

/// A parsed source file.
///
/// Keeps the root of the concrete syntax tree together with the token stream
/// it was assembled from. The token stream retains all trivia, which is what
/// makes [`render`](SyntaxTree::render) reproduce the preprocessed text
/// byte-for-byte.
#[derive(Debug)]
pub struct SyntaxTree {
    /// The buffer this tree was parsed from.
    pub source: Source,
    /// The root node of the tree.
    pub root: ast::Root,
    /// Every token consumed while parsing, in order, including the final
    /// end-of-file token with its trailing trivia.
    pub tokens: Vec<Token>,
}

impl SyntaxTree {
    /// Parse a source buffer into a syntax tree.
    pub fn from_source(source: Source, diag: &dyn DiagEmitter) -> SyntaxTree {
        SyntaxTree::from_source_with_options(source, diag, Default::default())
    }

    /// Parse a source buffer into a syntax tree, with explicit preprocessor
    /// options.
    pub fn from_source_with_options(
        source: Source,
        diag: &dyn DiagEmitter,
        options: PreprocessorOptions,
    ) -> SyntaxTree {
        let pp = Preprocessor::with_options(source, diag, options);
        let (root, tokens) = parser::parse_source_file(pp, diag);
        SyntaxTree {
            source,
            root,
            tokens,
        }
    }

    /// Parse a string into a syntax tree. The text is registered with the
    /// source manager under a unique name.
    pub fn from_text(text: &str, diag: &dyn DiagEmitter) -> SyntaxTree {
        SyntaxTree::from_source(add_snippet_source(text), diag)
    }

    /// Reproduce the text this tree was parsed from by concatenating every
    /// token's trivia and raw text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            for trivia in &token.trivia {
                out.push_str(&trivia.span.extract());
            }
            out.push_str(&token.span.extract());
        }
        out
    }
}

/// Register a string with the source manager under a fresh synthetic name.
/// Used by tests and by `ScriptSession`-style callers that feed snippets.
pub fn add_snippet_source(text: &str) -> Source {
    thread_local!(static INDEX: Cell<usize> = Cell::new(0));
    let idx = INDEX.with(|i| {
        let v = i.get();
        i.set(v + 1);
        v
    });
    get_source_manager().add(&format!("<snippet_{}>", idx), text)
}

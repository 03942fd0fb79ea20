// Copyright (c) 2024-2026 The shannon developers

//! A SystemVerilog compiler front end.
//!
//! This crate bundles the individual stages of the front end into one
//! convenient package. The heavy lifting happens in the subcrates: source
//! buffers, diagnostics, and the 4-state integer live in `shannon-common`;
//! lexing, preprocessing, and parsing live in `shannon-syntax`; symbol and
//! type elaboration together with constant evaluation live in
//! `shannon-elab`.

// Re-export everything from the common crate.
pub extern crate shannon_common as common;
pub use crate::common::*;

// Pull in the subcrates covering the individual compilation stages.
pub extern crate shannon_elab as elab;
pub extern crate shannon_syntax as syntax;

pub use crate::elab::{compilation::Compilation, script::ScriptSession};
pub use crate::syntax::{
    lexer::Lexer,
    preproc::{Preprocessor, PreprocessorOptions},
    SyntaxTree,
};

// Copyright (c) 2024-2026 The shannon developers

//! This crate contains the fundamental utilities used by the rest of the
//! shannon compiler.

#[macro_use]
extern crate bitflags;

pub mod arenas;
pub mod errors;
pub mod name;
pub mod source;
pub mod svint;
pub mod util;

use crate::errors::{DiagBuilder2, DiagEmitter, Severity};
use std::cell::Cell;

/// A compiler session.
///
/// Owns the options all stages consult and the failure latch that is set as
/// soon as an error diagnostic is emitted anywhere.
pub struct Session {
    pub opts: SessionOptions,
    /// Whether any error diagnostics were produced.
    pub failed: Cell<bool>,
}

impl Session {
    /// Create a new session.
    pub fn new() -> Session {
        Session {
            opts: Default::default(),
            failed: Cell::new(false),
        }
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

impl DiagEmitter for Session {
    fn emit(&self, diag: DiagBuilder2) {
        if diag.severity >= Severity::Error {
            self.failed.set(true);
        }
        eprintln!("{}", diag);
    }
}

/// A set of options for a session.
#[derive(Debug, Default)]
pub struct SessionOptions {
    /// The verbosity options.
    pub verbosity: Verbosity,
}

bitflags! {
    /// A set of verbosity options for a session.
    ///
    /// These flags control how much information the compiler traces.
    #[derive(Default)]
    pub struct Verbosity: u8 {
        const TOKENS = 0b00001;
        const TYPES  = 0b00010;
        const NAMES  = 0b00100;
        const SCOPES = 0b01000;
        const CONSTS = 0b10000;
    }
}

// Copyright (c) 2024-2026 The shannon developers

//! Elaboration for SystemVerilog: scope construction, name lookup, type
//! resolution, and constant evaluation.
//!
//! The [`Compilation`](compilation::Compilation) object ties the stages
//! together: syntax trees go in, and out come a symbol hierarchy rooted at
//! [`root()`](compilation::Compilation::root), interned types, and
//! constant-folded values for everything that must be known at elaboration
//! time.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod binder;
pub mod compilation;
pub mod eval;
pub mod script;
pub mod symbols;
pub mod ty;

pub use crate::compilation::{Compilation, GlobalArenas};
pub use crate::eval::ConstantValue;
pub use crate::script::ScriptSession;
pub use crate::symbols::SymbolId;
pub use crate::ty::Type;

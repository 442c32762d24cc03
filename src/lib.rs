// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Compiler for the Common Assembly language.
//!
//! Common Assembly exposes machine-level register discipline with named
//! variables, structured control flow, chained comparisons and explicit
//! syscalls. This crate compiles a single source file into GAS-syntax
//! x86-64 Linux assembly: lexer, recursive-descent parser, a fused
//! semantic analyzer and code generator, and a link pass that resolves
//! call/return sentinels into either inlined jumps or `call`/`ret`.
//!
//! Given the same source, the output is byte-identical across runs.

#![forbid(unsafe_code)]

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod logging;
pub mod parser;

pub use error::CodeError;

use tracing::{debug, instrument};

/// Compile one Common Assembly source file into x86-64 Linux assembly.
///
/// Returns the emitted assembly and the error list; the assembly is empty
/// whenever errors were reported. Lexer errors accumulate, a parser error
/// is reported alone, and code generation may report several at once.
#[instrument(level = "info", skip(source))]
pub fn compile(source: &str) -> (String, Vec<CodeError>) {
    let (tokens, errors) = lexer::lex(source);
    debug!(tokens = tokens.len(), errors = errors.len(), "lexed");
    if !errors.is_empty() {
        return (String::new(), errors);
    }

    let items = match parser::parse(&tokens) {
        Ok(items) => items,
        Err(error) => return (String::new(), vec![error]),
    };
    debug!(items = items.len(), "parsed");

    match codegen::compile_program(&items) {
        Ok(assembly) => {
            debug!(bytes = assembly.len(), "generated");
            (assembly, Vec::new())
        }
        Err(errors) => (String::new(), errors),
    }
}

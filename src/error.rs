// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Source-anchored errors shared by every pipeline stage.

use crate::ast::Location;

/// A diagnostic tied to a 1-based source position.
///
/// The lexer accumulates these and keeps scanning; the parser stops at the
/// first one; code generation may report several per statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct CodeError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl CodeError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            line: location.line,
            column: location.column,
            message: message.into(),
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
}

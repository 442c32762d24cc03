// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Caret-style rendering of compile errors against their source lines.

use casm::CodeError;

/// Render every error as `file:line:column: error: message`, followed by
/// the offending source line and a caret under the offending column.
pub fn render(file: &str, source: &str, errors: &[CodeError]) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();
    for error in errors {
        out.push_str(&format!(
            "{file}:{}:{}: error: {}\n",
            error.line, error.column, error.message
        ));
        let Some(line) = lines.get(error.line.saturating_sub(1) as usize) else {
            continue;
        };
        out.push_str(&format!("    {line}\n"));
        let padding = " ".repeat(error.column.saturating_sub(1) as usize);
        out.push_str(&format!("    {padding}^\n"));
    }
    out
}

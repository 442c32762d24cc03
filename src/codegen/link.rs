// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! The link pass: rewrite sentinel assembly into final assembly.
//!
//! Starting from the entry function, every reachable function is visited
//! exactly once. A `\` becomes the caller-chosen return assembly. A
//! `/name/` becomes either an inline `jmp` with a resume label (callee
//! referenced exactly once) or a plain `call` (callee referenced more
//! than once, finalized with `ret`). Single-quoted character literals
//! are respected while scanning, since `\` and `/` may appear inside
//! them.

use crate::codegen::Codegen;

impl Codegen<'_> {
    /// Resolve one function's sentinels in place. A second visit is a
    /// no-op, guarded by the already-assigned jump label.
    pub(super) fn finalize_function(&mut self, name: &str, return_assembly: &str) {
        let already_finalized = {
            let Some(function) = self.functions.get(name) else {
                panic!("internal: finalizing unregistered function `{name}`");
            };
            !function.jump_label.is_empty()
        };
        if already_finalized {
            return;
        }

        // Assign the label before scanning so a recursive call site
        // inside this very function short-circuits instead of looping.
        let label = if name == "main" {
            "_start".to_string()
        } else {
            self.new_jump_label()
        };
        let body = {
            let function = self
                .functions
                .get_mut(name)
                .unwrap_or_else(|| panic!("internal: finalizing unregistered function `{name}`"));
            function.jump_label = label.clone();
            std::mem::take(&mut function.assembly)
        };

        let bytes = body.as_bytes();
        let mut out = format!("\n{label}:");
        let mut index = 0;
        let mut run_start = 0;
        let mut in_char_literal = false;
        while index < bytes.len() {
            match bytes[index] {
                b'\'' => {
                    in_char_literal = !in_char_literal;
                    index += 1;
                }
                b'\\' if !in_char_literal => {
                    out.push_str(&body[run_start..index]);
                    out.push_str(return_assembly);
                    index += 1;
                    run_start = index;
                }
                b'/' if !in_char_literal => {
                    out.push_str(&body[run_start..index]);
                    let end = body[index + 1..]
                        .find('/')
                        .map(|offset| index + 1 + offset)
                        .unwrap_or_else(|| {
                            panic!("internal: unterminated call sentinel in `{name}`")
                        });
                    let callee = body[index + 1..end].to_string();
                    let call = self.call_site_assembly(&callee);
                    out.push_str(&call);
                    index = end + 1;
                    run_start = index;
                }
                _ => index += 1,
            }
        }
        out.push_str(&body[run_start..]);

        self.functions
            .get_mut(name)
            .unwrap_or_else(|| panic!("internal: finalizing unregistered function `{name}`"))
            .assembly = out;
    }

    /// The assembly standing in for one `/name/` call site.
    fn call_site_assembly(&mut self, name: &str) -> String {
        let references = self
            .functions
            .get(name)
            .unwrap_or_else(|| panic!("internal: call sentinel names unknown function `{name}`"))
            .references;
        match references {
            0 => panic!("internal: function `{name}` resolved with zero references"),
            1 => {
                let resume_label = self.new_jump_label();
                self.finalize_function(name, &format!("jmp {resume_label}"));
                format!("jmp {}\n{resume_label}:", self.functions[name].jump_label)
            }
            _ => {
                self.finalize_function(name, "ret");
                format!("call {}", self.functions[name].jump_label)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::{Codegen, CompiledFunction};
    use indexmap::IndexMap;

    fn state_with(name: &str, references: u32, assembly: &str) -> Codegen<'static> {
        let mut functions = IndexMap::new();
        functions.insert(
            name.to_string(),
            CompiledFunction {
                references,
                jump_label: String::new(),
                assembly: assembly.to_string(),
            },
        );
        Codegen {
            definitions: IndexMap::new(),
            functions,
            jump_labels: 0,
            data_labels: 0,
            data_section: String::new(),
        }
    }

    #[test]
    fn return_sentinel_is_replaced_and_entry_gets_start_label() {
        let mut state = state_with("main", 0, "\nmov $1, %rax\n\\");
        state.finalize_function("main", "ret");
        let function = &state.functions["main"];
        assert_eq!(function.jump_label, "_start");
        assert_eq!(function.assembly, "\n_start:\nmov $1, %rax\nret");
    }

    #[test]
    fn finalization_is_idempotent() {
        let mut state = state_with("main", 0, "\nmov $1, %rax\n\\");
        state.finalize_function("main", "ret");
        let first = state.functions["main"].assembly.clone();
        state.finalize_function("main", "something else entirely");
        assert_eq!(state.functions["main"].assembly, first);
    }

    #[test]
    fn sentinels_inside_character_literals_are_ignored() {
        let mut state = state_with("main", 0, "\nmov $'\\\\', %rax\nmov $'/', %rbx\n\\");
        state.finalize_function("main", "ret");
        assert_eq!(
            state.functions["main"].assembly,
            "\n_start:\nmov $'\\\\', %rax\nmov $'/', %rbx\nret"
        );
    }

    #[test]
    fn once_referenced_callee_is_inlined_with_a_resume_label() {
        let mut state = state_with("main", 0, "\n/helper/\n\\");
        state.functions.insert(
            "helper".to_string(),
            CompiledFunction {
                references: 1,
                jump_label: String::new(),
                assembly: "\nmov $2, %rbx\n\\".to_string(),
            },
        );
        state.finalize_function("main", "ret");
        assert_eq!(
            state.functions["main"].assembly,
            "\n_start:\njmp jumpLabel2\njumpLabel1:\nret"
        );
        assert_eq!(
            state.functions["helper"].assembly,
            "\njumpLabel2:\nmov $2, %rbx\njmp jumpLabel1"
        );
    }

    #[test]
    fn twice_referenced_callee_uses_call_and_ret() {
        let mut state = state_with("main", 0, "\n/helper/\n/helper/\n\\");
        state.functions.insert(
            "helper".to_string(),
            CompiledFunction {
                references: 2,
                jump_label: String::new(),
                assembly: "\nmov $2, %rbx\n\\".to_string(),
            },
        );
        state.finalize_function("main", "ret");
        assert_eq!(
            state.functions["main"].assembly,
            "\n_start:\ncall jumpLabel1\ncall jumpLabel1\nret"
        );
        assert_eq!(
            state.functions["helper"].assembly,
            "\njumpLabel1:\nmov $2, %rbx\nret"
        );
    }
}

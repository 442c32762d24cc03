// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Structural properties every emitted program must satisfy.

use casm::compile;

const PROGRAM: &str = r#"
fn r0 exitCode, r3, r4, r5 = sayHello() {
    r0 exitCode = sysWrite(r5 = 1, r4 = "hello\n", r3 = 6)
    return exitCode
}

fn r0, r1, r3, r4, r5 = main() {
    r1 ch = '/'
    if ch == '\\' {
        ch = '!'
    }
    drop ch
    r0 code, r3, r4, r5 = sayHello()
    drop code
    r0 = sysExit(r5 = 0)
}
"#;

fn compile_ok(source: &str) -> String {
    let (assembly, errors) = compile(source);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assembly
}

#[test]
fn output_starts_with_the_global_header_and_ends_with_a_newline() {
    let assembly = compile_ok(PROGRAM);
    assert!(assembly.starts_with(".global _start\n.text"));
    assert!(assembly.ends_with('\n'));
    assert!(assembly.contains("\n_start:\n"));
}

#[test]
fn no_sentinels_survive_outside_character_literals() {
    let assembly = compile_ok(PROGRAM);
    // Scan the function bodies only; the data section holds escape
    // sequences inside double-quoted `.ascii` strings.
    let code_start = assembly.find("\n_start:").expect("entry label");
    let mut in_char_literal = false;
    for byte in assembly[code_start..].bytes() {
        match byte {
            b'\'' => in_char_literal = !in_char_literal,
            b'\\' | b'/' if !in_char_literal => {
                panic!("sentinel byte `{}` left in output:\n{assembly}", byte as char)
            }
            _ => {}
        }
    }
}

#[test]
fn every_referenced_data_label_is_defined() {
    let assembly = compile_ok(PROGRAM);
    for (index, _) in assembly.match_indices("$dataSectionLabel") {
        let rest = &assembly[index + 1..];
        let label: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        assert!(
            assembly.contains(&format!("\n{label}: .ascii ")),
            "label {label} referenced but never defined"
        );
    }
    assert!(assembly.contains("dataSectionLabel1: .ascii \"hello\\n\""));
}

#[test]
fn unreachable_functions_are_not_emitted() {
    let source = "fn r0 = orphan() {\n    r0 x = 1\n}\n\
                  fn r0 = main() {\n    r0 = sysExit(r5 = 0)\n}\n";
    let assembly = compile_ok(source);
    // Only the entry label exists; the orphan was never compiled.
    assert!(!assembly.contains("jumpLabel"));
    assert_eq!(assembly.matches(':').count(), 1);
}

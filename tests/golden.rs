// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! End-to-end golden test: a multi-function program covering string
//! data, loops, branches, and both call-lowering strategies, compared
//! byte-for-byte against the expected assembly.

use casm::compile;

const SOURCE: &str = r#"# Write a banner twice, then sum a countdown and exit.

fn r0 exitCode, r3, r4, r5 = banner() {
    r0 exitCode = sysWrite(r5 = 1, r4 = "tick\n", r3 = 5)
    return exitCode
}

fn r0 done, r1, r2 = countdown(r2 = steps) {
    r1 total = 0
    while steps > 0 {
        total += steps
        steps --
    }
    r0 done = 0
    if total >= 10 {
        done = 1
    }
    return done
}

fn r0, r1, r2, r3, r4, r5 = main() {
    r0 code, r3, r4, r5 = banner()
    drop code
    r0 code2, r3, r4, r5 = banner()
    drop code2
    r2 ticks = 5
    r0 flag, r1, r2 = countdown(drop ticks)
    drop flag
    r0 = sysExit(r5 = 0)
}
"#;

const EXPECTED: &str = r#".global _start
.text
dataSectionLabel1: .ascii "tick\n"
_start:
call jumpLabel5
call jumpLabel5
mov $5, %rcx
jmp jumpLabel7
jumpLabel6:
mov $0, %rdi
mov $60, %rax
syscall
mov $60, %rax
mov $0, %rdi
syscall
jumpLabel5:
mov $1, %rdi
mov $dataSectionLabel1, %rsi
mov $5, %rdx
mov $1, %rax
syscall
ret
jumpLabel7:
mov $0, %rbx
jmp jumpLabel2
jumpLabel1:
add %rcx, %rbx
dec %rcx
jumpLabel2:
cmp $0, %rcx
jg jumpLabel1
jumpLabel3:
mov $0, %rax
cmp $10, %rbx
jl jumpLabel4
mov $1, %rax
jumpLabel4:
jmp jumpLabel6
"#;

#[test]
fn golden_program_compiles_byte_for_byte() {
    let (assembly, errors) = compile(SOURCE);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(assembly, EXPECTED);
}

#[test]
fn golden_output_is_deterministic() {
    let (first, _) = compile(SOURCE);
    let (second, _) = compile(SOURCE);
    assert_eq!(first, second);
}

#[test]
fn twice_called_function_uses_call_ret_and_once_called_is_inlined() {
    let (assembly, errors) = compile(SOURCE);
    assert!(errors.is_empty());
    // banner is referenced twice: one body, two call sites, a ret.
    assert_eq!(assembly.matches("call jumpLabel5").count(), 2);
    assert!(assembly.contains("\nret\n"));
    // countdown is referenced once: no call, a jmp into it and a resume
    // label jump back out.
    assert_eq!(assembly.matches("call jumpLabel7").count(), 0);
    assert!(assembly.contains("jmp jumpLabel7"));
    assert!(assembly.contains("jmp jumpLabel6"));
}

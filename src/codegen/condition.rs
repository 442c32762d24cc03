// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Condition lowering.
//!
//! A condition lowers against a pair of jump targets; an empty target
//! means "fall through on this outcome". Because `cmp` is emitted in
//! AT&T operand order, the comparison computes `right - left` and the
//! greater/less jump mnemonics come out inverted relative to Intel
//! syntax.

use crate::ast::{ComparisonOp, Condition, RawValue};
use crate::codegen::{Codegen, RegisterState};
use crate::error::CodeError;

/// `cmp`'s last operand must be a register or memory reference.
fn is_register_or_memory(value: &RawValue) -> bool {
    matches!(value, RawValue::Variable(_))
}

/// `(on-true, on-false)` jump mnemonics for an operator, in AT&T
/// operand order.
fn jump_mnemonics(operator: ComparisonOp) -> (&'static str, &'static str) {
    match operator {
        ComparisonOp::Greater => ("jl", "jge"),
        ComparisonOp::GreaterOrEqual => ("jle", "jg"),
        ComparisonOp::Less => ("jg", "jle"),
        ComparisonOp::LessOrEqual => ("jge", "jl"),
        ComparisonOp::Equal => ("je", "jne"),
        ComparisonOp::NotEqual => ("jne", "je"),
    }
}

impl Codegen<'_> {
    pub(super) fn condition_assembly(
        &mut self,
        registers: &mut RegisterState,
        condition: &Condition,
        jump_if_true: &str,
        jump_if_false: &str,
    ) -> Result<String, CodeError> {
        debug_assert!(!jump_if_true.is_empty() || !jump_if_false.is_empty());

        match condition {
            Condition::Bool(_, value) => {
                let target = if *value { jump_if_true } else { jump_if_false };
                if target.is_empty() {
                    Ok(String::new())
                } else {
                    Ok(format!("\njmp {target}"))
                }
            }

            Condition::Boolean(boolean) => {
                // In an `and`, any false clause short-circuits past the
                // rest; in an `or`, any true clause does. The tail label
                // is allocated up front and always emitted, which keeps
                // label numbering stable even when it ends up unused.
                let after_label = self.new_jump_label();
                let clause_true: &str;
                let clause_false: &str;
                if boolean.is_and {
                    clause_true = "";
                    clause_false = if jump_if_false.is_empty() {
                        &after_label
                    } else {
                        jump_if_false
                    };
                } else {
                    clause_true = if jump_if_true.is_empty() {
                        &after_label
                    } else {
                        jump_if_true
                    };
                    clause_false = "";
                }

                let mut out = String::new();
                for (index, clause) in boolean.clauses.iter().enumerate() {
                    let (on_true, on_false) = if index == boolean.clauses.len() - 1 {
                        (jump_if_true, jump_if_false)
                    } else {
                        (clause_true, clause_false)
                    };
                    out.push_str(&self.condition_assembly(registers, clause, on_true, on_false)?);
                }
                out.push_str(&format!("\n{after_label}:"));
                Ok(out)
            }

            Condition::Comparison(comparison) => {
                let mut operator = comparison.operator;
                let mut left = &comparison.left;
                let mut right = &comparison.right;
                if !is_register_or_memory(right) {
                    if !is_register_or_memory(left) {
                        return Err(CodeError::new(
                            comparison.location,
                            "comparisons must have at least 1 variable name or pointer to \
                             memory in them",
                        ));
                    }
                    (left, right) = (right, left);
                    operator = operator.flipped();
                }

                let first = self.value_operand(registers, left)?;
                let second = self.value_operand(registers, right)?;
                let mut out = format!("\ncmp {first}, {second}");

                let (on_true, on_false) = jump_mnemonics(operator);
                if !jump_if_true.is_empty() {
                    out.push_str(&format!("\n{on_true} {jump_if_true}"));
                    if !jump_if_false.is_empty() {
                        out.push_str(&format!("\njmp {jump_if_false}"));
                    }
                } else if !jump_if_false.is_empty() {
                    out.push_str(&format!("\n{on_false} {jump_if_false}"));
                }
                Ok(out)
            }
        }
    }
}

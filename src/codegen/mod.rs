// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! AST-to-assembly lowering.
//!
//! Functions are compiled on first reference into an intermediate form
//! that still contains two sentinels: `\` where the function returns and
//! `/name/` where it calls another user function. The link pass resolves
//! both once the total reference counts are known, choosing between
//! inlining and `call`/`ret`.

mod condition;
mod link;
mod regstate;

pub use regstate::RegisterState;

use crate::ast::{
    CallArg, FunctionCall, FunctionDefinition, Location, MutationDestination, Operation, RawValue,
    Reg, Statement, TopLevelItem,
};
use crate::builtins;
use crate::error::CodeError;
use indexmap::IndexMap;
use tracing::debug;

/// Exit path appended to the entry function on x86-64 Linux.
const EXIT_ASSEMBLY: &str = "mov $60, %rax\nmov $0, %rdi\nsyscall";

struct CompiledFunction {
    references: u32,
    /// Empty until the link pass finalizes the function.
    jump_label: String,
    assembly: String,
}

/// Assembly substituted for `break` and `continue`. Empty strings mean
/// the keyword is not valid in the current scope.
#[derive(Default)]
struct LoopExits {
    break_assembly: String,
    continue_assembly: String,
}

pub struct Codegen<'a> {
    definitions: IndexMap<&'a str, &'a FunctionDefinition>,
    /// Insertion-ordered so the final concatenation is deterministic.
    functions: IndexMap<String, CompiledFunction>,
    jump_labels: u32,
    data_labels: u32,
    data_section: String,
}

/// Compile a parsed file into its final assembly text.
pub fn compile_program(items: &[TopLevelItem]) -> Result<String, Vec<CodeError>> {
    let mut definitions: IndexMap<&str, &FunctionDefinition> = IndexMap::new();
    for item in items {
        let TopLevelItem::Function(function) = item else {
            continue;
        };
        if let Some(existing) = definitions.get(function.name.as_str()) {
            let message = format!("the function `{}` is declared twice", function.name);
            return Err(vec![
                CodeError::new(existing.location, message.clone()),
                CodeError::new(function.location, message),
            ]);
        }
        definitions.insert(function.name.as_str(), function);
    }

    if !definitions.contains_key("main") {
        return Err(vec![CodeError::new(
            Location::new(1, 1),
            "could not find a `main` function definition",
        )]);
    }

    let mut state = Codegen {
        definitions,
        functions: IndexMap::new(),
        jump_labels: 0,
        data_labels: 0,
        data_section: String::new(),
    };
    state.compile_function("main")?;
    debug!(functions = state.functions.len(), "reachable functions compiled");

    state.finalize_function("main", EXIT_ASSEMBLY);

    let mut out = format!(".global {}\n.text", state.functions["main"].jump_label);
    out.push_str(&state.data_section);
    for function in state.functions.values() {
        out.push_str(&function.assembly);
    }
    out.push('\n');
    Ok(out)
}

impl<'a> Codegen<'a> {
    fn new_jump_label(&mut self) -> String {
        self.jump_labels += 1;
        format!("jumpLabel{}", self.jump_labels)
    }

    fn new_data_label(&mut self) -> String {
        self.data_labels += 1;
        format!("dataSectionLabel{}", self.data_labels)
    }

    /// Compile one function body into sentinel form. The entry is
    /// registered up front so that recursive calls see it and stop.
    fn compile_function(&mut self, name: &str) -> Result<(), Vec<CodeError>> {
        let definition = *self
            .definitions
            .get(name)
            .unwrap_or_else(|| panic!("internal: compiling unknown function `{name}`"));
        self.functions.insert(
            name.to_string(),
            CompiledFunction {
                references: 0,
                jump_label: String::new(),
                assembly: String::new(),
            },
        );

        let registers =
            RegisterState::for_function(&definition.mutated_registers, &definition.arguments)?;
        let mut assembly =
            self.block_assembly(&definition.body, registers, &LoopExits::default())?;
        if !assembly.ends_with('\\') {
            assembly.push_str("\n\\");
        }

        let entry = self
            .functions
            .get_mut(name)
            .unwrap_or_else(|| panic!("internal: function `{name}` lost its entry"));
        entry.assembly = assembly;
        Ok(())
    }

    fn block_assembly(
        &mut self,
        block: &[Statement],
        mut registers: RegisterState,
        exits: &LoopExits,
    ) -> Result<String, Vec<CodeError>> {
        let mut assembly = String::new();
        for (index, statement) in block.iter().enumerate() {
            match statement {
                Statement::Comment(_) => {}

                Statement::Return(statement) => {
                    if index != block.len() - 1 {
                        return Err(vec![CodeError::new(
                            statement.location,
                            "a return statement must be the last statement in its block",
                        )]);
                    }
                    let (value_assembly, value_registers) =
                        self.call_argument_assembly(&statement.values, &mut registers, false)?;
                    check_register_lists(
                        registers.return_registers(),
                        &value_registers,
                        statement.location,
                    )
                    .map_err(|error| vec![error])?;
                    assembly.push_str(&value_assembly);
                    assembly.push_str("\n\\");
                    return Ok(assembly);
                }

                Statement::Mutation(statement) => {
                    let lowered = match &statement.operation {
                        Operation::Call(call) => {
                            self.call_assembly(&statement.destinations, call, &mut registers)?
                        }
                        Operation::Inc1(location) => self.mutation_assembly(
                            "inc",
                            None,
                            &statement.destinations,
                            *location,
                            &mut registers,
                        )?,
                        Operation::Dec1(location) => self.mutation_assembly(
                            "dec",
                            None,
                            &statement.destinations,
                            *location,
                            &mut registers,
                        )?,
                        Operation::SetTo(value) => self.mutation_assembly(
                            "mov",
                            Some(value),
                            &statement.destinations,
                            statement.location,
                            &mut registers,
                        )?,
                        Operation::AddTo(value) => self.mutation_assembly(
                            "add",
                            Some(value),
                            &statement.destinations,
                            statement.location,
                            &mut registers,
                        )?,
                        Operation::SubFrom(value) => self.mutation_assembly(
                            "sub",
                            Some(value),
                            &statement.destinations,
                            statement.location,
                            &mut registers,
                        )?,
                        Operation::MulBy(value) => self.mutation_assembly(
                            "mul",
                            Some(value),
                            &statement.destinations,
                            statement.location,
                            &mut registers,
                        )?,
                        Operation::DivBy(value) => self.mutation_assembly(
                            "div",
                            Some(value),
                            &statement.destinations,
                            statement.location,
                            &mut registers,
                        )?,
                    };
                    assembly.push_str(&lowered);
                }

                Statement::While(statement) => {
                    let body_label = self.new_jump_label();
                    let condition_label = self.new_jump_label();
                    let end_label = self.new_jump_label();

                    assembly.push_str(&format!("\njmp {condition_label}"));
                    assembly.push_str(&format!("\n{body_label}:"));
                    let body = self.block_assembly(
                        &statement.body,
                        registers.inner_scope(),
                        &LoopExits {
                            break_assembly: format!("\njmp {end_label}"),
                            continue_assembly: format!("\njmp {condition_label}"),
                        },
                    )?;
                    assembly.push_str(&body);

                    assembly.push_str(&format!("\n{condition_label}:"));
                    let condition = self
                        .condition_assembly(&mut registers, &statement.condition, &body_label, "")
                        .map_err(|error| vec![error])?;
                    assembly.push_str(&condition);
                    assembly.push_str(&format!("\n{end_label}:"));
                }

                Statement::IfElse(statement) => {
                    let else_label = self.new_jump_label();
                    let check = self
                        .condition_assembly(&mut registers, &statement.condition, "", &else_label)
                        .map_err(|error| vec![error])?;
                    let inner_scope = registers.inner_scope();
                    let if_body =
                        self.block_assembly(&statement.if_block, inner_scope.clone(), exits)?;
                    assembly.push_str(&check);
                    assembly.push_str(&if_body);
                    if statement.else_block.is_empty() {
                        assembly.push_str(&format!("\n{else_label}:"));
                    } else {
                        let end_label = self.new_jump_label();
                        let else_body =
                            self.block_assembly(&statement.else_block, inner_scope, exits)?;
                        assembly.push_str(&format!("\njmp {end_label}"));
                        assembly.push_str(&format!("\n{else_label}:"));
                        assembly.push_str(&else_body);
                        assembly.push_str(&format!("\n{end_label}:"));
                    }
                }

                Statement::Break(location) => {
                    if exits.break_assembly.is_empty() {
                        return Err(vec![CodeError::new(
                            *location,
                            "`break` is only valid inside a loop",
                        )]);
                    }
                    assembly.push_str(&exits.break_assembly);
                }
                Statement::Continue(location) => {
                    if exits.continue_assembly.is_empty() {
                        return Err(vec![CodeError::new(
                            *location,
                            "`continue` is only valid inside a loop",
                        )]);
                    }
                    assembly.push_str(&exits.continue_assembly);
                }

                Statement::Drop(statement) => {
                    registers
                        .register_for_variable(&statement.variable, true, statement.location)
                        .map_err(|error| vec![error])?;
                }
            }
        }
        Ok(assembly)
    }

    /// Lower `inc`/`dec`/`mov`/`add`/`sub`/`mul`/`div` onto one
    /// destination. `source` is `None` for the one-operand forms.
    fn mutation_assembly(
        &mut self,
        instruction: &str,
        source: Option<&RawValue>,
        destinations: &[MutationDestination],
        location: Location,
        registers: &mut RegisterState,
    ) -> Result<String, Vec<CodeError>> {
        if destinations.len() != 1 {
            return Err(vec![CodeError::new(
                location,
                format!(
                    "expected one destination on the left of the mutation, got {}; \
                     only function calls may have several",
                    destinations.len()
                ),
            )]);
        }
        let destination = &destinations[0];
        let register = registers.bind_destination(destination)?;
        if destination.name.is_empty() {
            return Err(vec![CodeError::new(
                destination.location,
                "a value assigned to a bare register cannot be used later; \
                 bind the register to a variable name",
            )]);
        }

        let target = wrap_dereference(register.x86(), destination.deref_depth);
        match source {
            None => Ok(format!("\n{instruction} {target}")),
            Some(value) => {
                let operand = self
                    .value_operand(registers, value)
                    .map_err(|error| vec![error])?;
                Ok(format!("\n{instruction} {operand}, {target}"))
            }
        }
    }

    /// Lower a function call: resolve the callee (user function or
    /// syscall wrapper), place the arguments, validate the destinations
    /// against the callee's mutated list, and emit either the call
    /// sentinel or the inline syscall sequence.
    fn call_assembly(
        &mut self,
        destinations: &[MutationDestination],
        call: &FunctionCall,
        registers: &mut RegisterState,
    ) -> Result<String, Vec<CodeError>> {
        let call_code: String;
        let expected_arguments: Vec<Reg>;
        let expected_mutated: Vec<(Reg, String)>;

        if self.definitions.contains_key(call.name.as_str()) {
            if !self.functions.contains_key(call.name.as_str()) {
                self.compile_function(&call.name)?;
            }
            self.functions
                .get_mut(call.name.as_str())
                .unwrap_or_else(|| panic!("internal: callee `{}` lost its entry", call.name))
                .references += 1;

            let definition = self.definitions[call.name.as_str()];
            call_code = format!("/{}/", call.name);
            expected_arguments = definition
                .arguments
                .iter()
                .map(|argument| argument.register)
                .collect();
            expected_mutated = definition
                .mutated_registers
                .iter()
                .map(|binding| (binding.register, binding.name.clone()))
                .collect();
        } else if let Some(builtin) = builtins::lookup(&call.name) {
            call_code = builtin.call_assembly();
            expected_arguments = builtin.argument_registers.to_vec();
            expected_mutated = vec![(builtin.mutated_register, builtin.return_name.to_string())];
        } else {
            return Err(vec![CodeError::new(
                call.location,
                format!("call to an undefined function `{}`", call.name),
            )]);
        }

        let (argument_assembly, argument_registers) =
            self.call_argument_assembly(&call.arguments, registers, true)?;
        check_register_lists(&expected_arguments, &argument_registers, call.location)
            .map_err(|error| vec![error])?;

        let mut errors = Vec::new();
        let mut destination_registers = Vec::with_capacity(destinations.len());
        for destination in destinations {
            match registers.bind_destination(destination) {
                Ok(register) => destination_registers.push((register, destination.location)),
                Err(mut destination_errors) => errors.append(&mut destination_errors),
            }
            if destination.deref_depth > 0 {
                errors.push(CodeError::new(
                    destination.location,
                    "a function-call destination cannot be dereferenced",
                ));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let expected_destination_registers: Vec<Reg> =
            expected_mutated.iter().map(|(register, _)| *register).collect();
        check_register_lists(
            &expected_destination_registers,
            &destination_registers,
            call.location,
        )
        .map_err(|error| vec![error])?;

        for ((register, callee_name), destination) in expected_mutated.iter().zip(destinations) {
            if callee_name.is_empty() && !destination.name.is_empty() {
                return Err(vec![CodeError::new(
                    destination.location,
                    format!(
                        "`{}` cannot be bound here because the callee does not guarantee a \
                         value in {register}",
                        destination.name
                    ),
                )]);
            }
        }

        Ok(format!("{argument_assembly}\n{call_code}"))
    }

    /// Lower the argument list of a call or the value list of a return.
    ///
    /// A slot without a register must be a plain variable and resolves to
    /// that variable's register; a slot with a register gets an explicit
    /// `mov`. `check_implicit_mutation` rejects explicit registers that
    /// currently belong to a variable; returns skip that check because
    /// the function is being left anyway.
    fn call_argument_assembly(
        &mut self,
        arguments: &[CallArg],
        registers: &mut RegisterState,
        check_implicit_mutation: bool,
    ) -> Result<(String, Vec<(Reg, Location)>), Vec<CodeError>> {
        let mut assembly = String::new();
        let mut used: Vec<(Reg, Location)> = Vec::new();
        for argument in arguments {
            let register = match argument.register {
                None => {
                    let RawValue::Variable(variable) = &argument.value else {
                        return Err(vec![CodeError::new(
                            argument.location,
                            "an argument that does not name a register must be a variable",
                        )]);
                    };
                    registers
                        .register_for_variable(
                            &variable.name,
                            variable.dropped,
                            variable.location,
                        )
                        .map_err(|error| vec![error])?
                }
                Some(register) => {
                    if check_implicit_mutation {
                        if let Some(variable) = registers.variable_name(register) {
                            return Err(vec![CodeError::new(
                                argument.location,
                                format!(
                                    "{register} can only be mutated through the variable \
                                     `{variable}`"
                                ),
                            )]);
                        }
                    }
                    let operand = self
                        .value_operand(registers, &argument.value)
                        .map_err(|error| vec![error])?;
                    assembly.push_str(&format!("\nmov {operand}, {}", register.x86()));
                    register
                }
            };

            if let Some((_, previous)) = used.iter().find(|(used, _)| *used == register) {
                let message = format!("the register {register} is used twice in one value list");
                return Err(vec![
                    CodeError::new(*previous, message.clone()),
                    CodeError::new(argument.location, message),
                ]);
            }
            used.push((register, argument.location));
        }
        Ok((assembly, used))
    }

    /// The assembly operand for a raw value: `$` immediates for numbers
    /// and characters, a fresh data-section label for strings, the bound
    /// register (wrapped per dereference layer) for variables.
    fn value_operand(
        &mut self,
        registers: &mut RegisterState,
        value: &RawValue,
    ) -> Result<String, CodeError> {
        match value {
            RawValue::Unsigned(_, value) => Ok(format!("${value}")),
            RawValue::Signed(_, value) => Ok(format!("${value}")),
            RawValue::Float(_, value) => Ok(format!("${value}")),
            RawValue::Char(_, value) => Ok(format!("$'{value}'")),
            RawValue::Str(_, value) => {
                let label = self.new_data_label();
                self.data_section
                    .push_str(&format!("\n{label}: .ascii \"{value}\""));
                Ok(format!("${label}"))
            }
            RawValue::Variable(variable) => {
                let register = registers.register_for_variable(
                    &variable.name,
                    variable.dropped,
                    variable.location,
                )?;
                Ok(wrap_dereference(register.x86(), variable.deref_depth))
            }
        }
    }
}

/// One pair of AT&T parentheses per dereference layer.
fn wrap_dereference(operand: &str, depth: u32) -> String {
    let depth = depth as usize;
    format!("{}{}{}", "(".repeat(depth), operand, ")".repeat(depth))
}

/// Require `got` to match `expected` register-by-register, in order.
/// Diagnostics anchor on the offending slot.
fn check_register_lists(
    expected: &[Reg],
    got: &[(Reg, Location)],
    fallback: Location,
) -> Result<(), CodeError> {
    for (index, (register, location)) in got.iter().enumerate() {
        match expected.get(index) {
            Some(expected) if expected == register => {}
            Some(expected) => {
                return Err(CodeError::new(
                    *location,
                    format!("expected {expected} here, got {register}"),
                ));
            }
            None => {
                return Err(CodeError::new(
                    *location,
                    format!("expected {} registers, got {}", expected.len(), got.len()),
                ));
            }
        }
    }
    if got.len() < expected.len() {
        let location = got.last().map(|(_, location)| *location).unwrap_or(fallback);
        return Err(CodeError::new(
            location,
            format!("expected {} registers, got {}", expected.len(), got.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_dereference_adds_one_paren_pair_per_layer() {
        assert_eq!(wrap_dereference("%rax", 0), "%rax");
        assert_eq!(wrap_dereference("%rax", 1), "(%rax)");
        assert_eq!(wrap_dereference("%rsi", 2), "((%rsi))");
    }

    #[test]
    fn register_list_mismatch_points_at_the_offending_slot() {
        let fallback = Location::new(1, 1);
        let got = vec![(Reg::R4, Location::new(2, 9))];
        let error =
            check_register_lists(&[Reg::R5, Reg::R4, Reg::R3], &got, fallback).unwrap_err();
        assert_eq!(error.location(), Location::new(2, 9));
        assert!(error.message.contains("expected r5 here, got r4"));
    }

    #[test]
    fn register_list_length_mismatch_is_reported() {
        let fallback = Location::new(3, 3);
        let error = check_register_lists(&[Reg::R5], &[], fallback).unwrap_err();
        assert_eq!(error.location(), Location::new(3, 3));
        assert!(error.message.contains("expected 1 registers, got 0"));
    }
}

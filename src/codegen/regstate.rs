// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Per-function register bookkeeping.
//!
//! One state exists per function being compiled. Entering a loop or
//! branch body works on a copy with the drop-locks set, so bindings made
//! inside a nested scope never leak back out.

use crate::ast::{Location, MutationDestination, Reg, RegisterBinding, REGISTER_COUNT};
use crate::error::CodeError;

#[derive(Debug, Clone, Default)]
struct Slot {
    /// Empty when the register is not bound to a variable.
    variable: String,
    bound_at: Option<Location>,
    /// Where the enclosing function declared this register mutable.
    /// `None` means the register may not be written to in this function.
    mutable_at: Option<Location>,
    /// Set when the binding comes from an enclosing scope; such a
    /// variable cannot be dropped here.
    locked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterState {
    slots: [Slot; REGISTER_COUNT],
    return_registers: Vec<Reg>,
}

impl RegisterState {
    /// Build the state a function body starts from: its mutated-register
    /// list and its parameters.
    pub fn for_function(
        mutated_registers: &[RegisterBinding],
        arguments: &[RegisterBinding],
    ) -> Result<Self, Vec<CodeError>> {
        let mut state = Self::default();

        for binding in mutated_registers {
            if !binding.name.is_empty() {
                state.return_registers.push(binding.register);
            }
            let slot = &mut state.slots[binding.register.index()];
            if let Some(previous) = slot.mutable_at {
                let message = format!(
                    "the register {} is listed twice in the mutated registers",
                    binding.register
                );
                return Err(vec![
                    CodeError::new(previous, message.clone()),
                    CodeError::new(binding.location, message),
                ]);
            }
            slot.mutable_at = Some(binding.location);
        }

        for argument in arguments {
            let slot = &state.slots[argument.register.index()];
            if !slot.variable.is_empty() {
                let message = format!(
                    "the register {} is used by two parameters",
                    argument.register
                );
                return Err(vec![
                    CodeError::new(slot.bound_at.unwrap_or_default(), message.clone()),
                    CodeError::new(argument.location, message),
                ]);
            }
            if let Some(existing) = state.find_variable(&argument.name) {
                let message = format!("the parameter name `{}` is used twice", argument.name);
                return Err(vec![
                    CodeError::new(
                        state.slots[existing.index()].bound_at.unwrap_or_default(),
                        message.clone(),
                    ),
                    CodeError::new(argument.location, message),
                ]);
            }
            state.bind(argument.register, &argument.name, argument.location);
        }

        Ok(state)
    }

    /// Copy for a loop or branch body: everything currently bound gets its
    /// drop-lock set.
    pub fn inner_scope(&self) -> Self {
        let mut state = self.clone();
        for slot in &mut state.slots {
            if !slot.variable.is_empty() {
                slot.locked = true;
            }
        }
        state
    }

    pub fn return_registers(&self) -> &[Reg] {
        &self.return_registers
    }

    pub fn find_variable(&self, name: &str) -> Option<Reg> {
        (0..REGISTER_COUNT as u8)
            .filter_map(Reg::new)
            .find(|register| self.slots[register.index()].variable == name)
    }

    /// The variable bound to a register, if any.
    pub fn variable_name(&self, register: Reg) -> Option<&str> {
        let slot = &self.slots[register.index()];
        (!slot.variable.is_empty()).then_some(slot.variable.as_str())
    }

    pub fn is_mutable(&self, register: Reg) -> bool {
        self.slots[register.index()].mutable_at.is_some()
    }

    fn bind(&mut self, register: Reg, name: &str, location: Location) {
        let slot = &mut self.slots[register.index()];
        slot.variable = name.to_string();
        slot.bound_at = Some(location);
    }

    fn unbind(&mut self, register: Reg) {
        let slot = &mut self.slots[register.index()];
        slot.variable.clear();
        slot.bound_at = None;
    }

    /// Resolve a variable to its register; with `dropping` the binding is
    /// also removed, which requires the variable to be unlocked and its
    /// register mutable.
    pub fn register_for_variable(
        &mut self,
        name: &str,
        dropping: bool,
        location: Location,
    ) -> Result<Reg, CodeError> {
        let Some(register) = self.find_variable(name) else {
            return Err(CodeError::new(
                location,
                format!("could not find a variable called `{name}`"),
            ));
        };
        if !dropping {
            return Ok(register);
        }

        let slot = &self.slots[register.index()];
        if slot.locked {
            return Err(CodeError::new(
                location,
                format!("`{name}` is declared outside this scope and cannot be dropped here"),
            ));
        }
        if slot.mutable_at.is_none() {
            return Err(CodeError::new(
                location,
                format!("dropping `{name}` is useless because {register} is never mutable here"),
            ));
        }
        self.unbind(register);
        Ok(register)
    }

    /// Check a mutation destination and update the bindings it creates.
    ///
    /// Catches: writing through a register that belongs to a variable,
    /// mutating an undefined variable, rebinding a variable or register
    /// without dropping first, and writing a register the function never
    /// declared mutable. Violations accumulate.
    pub fn bind_destination(
        &mut self,
        destination: &MutationDestination,
    ) -> Result<Reg, Vec<CodeError>> {
        let mut errors = Vec::new();
        let mut existing_register = None;

        if let Some(register) = destination.register {
            if let Some(variable) = self.variable_name(register) {
                errors.push(CodeError::new(
                    destination.location,
                    format!(
                        "the register {register} is already bound to `{variable}`; \
                         `drop {variable}` before reusing it"
                    ),
                ));
            }
        }

        if !destination.name.is_empty() {
            existing_register = self.find_variable(&destination.name);
            match (existing_register, destination.register) {
                (None, None) => errors.push(CodeError::new(
                    destination.location,
                    format!(
                        "the variable `{}` has not been defined; name a register to define it",
                        destination.name
                    ),
                )),
                (Some(existing), Some(register)) if existing != register => {
                    errors.push(CodeError::new(
                        destination.location,
                        format!(
                            "`{}` is bound to {existing}; drop it before rebinding to {register}",
                            destination.name
                        ),
                    ));
                }
                (Some(_), Some(_)) => errors.push(CodeError::new(
                    destination.location,
                    format!(
                        "`{}` is already defined; mutate it by naming just the variable",
                        destination.name
                    ),
                )),
                _ => {}
            }
        }

        let Some(register) = destination.register.or(existing_register) else {
            if errors.is_empty() {
                errors.push(CodeError::new(
                    destination.location,
                    "expected a register or a variable name to mutate",
                ));
            }
            return Err(errors);
        };

        if !self.is_mutable(register) {
            errors.push(CodeError::new(
                destination.location,
                format!(
                    "{register} cannot be mutated unless the function lists it in its \
                     mutated registers"
                ),
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        if destination.register.is_some() && !destination.name.is_empty() {
            self.bind(register, &destination.name, destination.location);
        }
        Ok(register)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(register: Reg, name: &str) -> RegisterBinding {
        RegisterBinding {
            location: Location::new(1, 1),
            register,
            name: name.to_string(),
        }
    }

    fn destination(register: Option<Reg>, name: &str) -> MutationDestination {
        MutationDestination {
            location: Location::new(2, 1),
            register,
            name: name.to_string(),
            deref_depth: 0,
        }
    }

    #[test]
    fn named_mutated_registers_become_return_registers() {
        let state = RegisterState::for_function(
            &[binding(Reg::R0, "out"), binding(Reg::R1, "")],
            &[binding(Reg::R5, "input")],
        )
        .unwrap();
        assert_eq!(state.return_registers(), &[Reg::R0]);
        assert_eq!(state.find_variable("input"), Some(Reg::R5));
        assert!(state.is_mutable(Reg::R1));
        assert!(!state.is_mutable(Reg::R5));
    }

    #[test]
    fn duplicate_mutated_register_reports_both_locations() {
        let errors = RegisterState::for_function(
            &[binding(Reg::R0, ""), binding(Reg::R0, "out")],
            &[],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("listed twice"));
    }

    #[test]
    fn duplicate_parameter_name_reports_both_locations() {
        let errors = RegisterState::for_function(
            &[],
            &[binding(Reg::R4, "x"), binding(Reg::R5, "x")],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("used twice"));
    }

    #[test]
    fn binding_then_rebinding_requires_a_drop() {
        let mut state = RegisterState::for_function(&[binding(Reg::R0, "")], &[]).unwrap();
        state.bind_destination(&destination(Some(Reg::R0), "x")).unwrap();

        let errors = state
            .bind_destination(&destination(Some(Reg::R0), "y"))
            .unwrap_err();
        assert!(errors[0].message.contains("already bound to `x`"));

        state
            .register_for_variable("x", true, Location::new(3, 1))
            .unwrap();
        state.bind_destination(&destination(Some(Reg::R0), "y")).unwrap();
        assert_eq!(state.find_variable("y"), Some(Reg::R0));
    }

    #[test]
    fn mutating_an_undeclared_register_is_rejected() {
        let mut state = RegisterState::for_function(&[binding(Reg::R0, "")], &[]).unwrap();
        let errors = state
            .bind_destination(&destination(Some(Reg::R3), "x"))
            .unwrap_err();
        assert!(errors[0].message.contains("mutated registers"));
    }

    #[test]
    fn locked_variables_cannot_be_dropped_in_inner_scopes() {
        let mut state = RegisterState::for_function(&[binding(Reg::R0, "")], &[]).unwrap();
        state.bind_destination(&destination(Some(Reg::R0), "x")).unwrap();

        let mut inner = state.inner_scope();
        let error = inner
            .register_for_variable("x", true, Location::new(4, 5))
            .unwrap_err();
        assert!(error.message.contains("cannot be dropped here"));

        // The outer scope is unaffected and may still drop it.
        state
            .register_for_variable("x", true, Location::new(5, 5))
            .unwrap();
    }

    #[test]
    fn dropping_a_never_mutable_register_is_pointless() {
        let mut state =
            RegisterState::for_function(&[], &[binding(Reg::R5, "input")]).unwrap();
        let error = state
            .register_for_variable("input", true, Location::new(2, 2))
            .unwrap_err();
        assert!(error.message.contains("never mutable"));
    }
}

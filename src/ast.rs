// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Abstract syntax tree for Common Assembly source files.
//!
//! Every node carries the 1-based source position it was parsed from so
//! that later stages can anchor their diagnostics.

use std::fmt;

/// 1-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

pub const REGISTER_COUNT: usize = 16;

const X86_REGISTERS: [&str; REGISTER_COUNT] = [
    "%rax", "%rbx", "%rcx", "%rdx", "%rsi", "%rdi", "%r8", "%r9", "%r10", "%r11", "%r12", "%r13",
    "%r14", "%r15", "%rsp", "%rbp",
];

/// One of the 16 Common Assembly registers, `r0` through `r15`.
///
/// An argument or destination slot whose register was omitted by the user
/// is represented as `Option<Reg>` being `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(u8);

impl Reg {
    pub const R0: Reg = Reg(0);
    pub const R1: Reg = Reg(1);
    pub const R2: Reg = Reg(2);
    pub const R3: Reg = Reg(3);
    pub const R4: Reg = Reg(4);
    pub const R5: Reg = Reg(5);
    pub const R6: Reg = Reg(6);
    pub const R7: Reg = Reg(7);
    pub const R8: Reg = Reg(8);
    pub const R9: Reg = Reg(9);
    pub const R10: Reg = Reg(10);
    pub const R11: Reg = Reg(11);
    pub const R12: Reg = Reg(12);
    pub const R13: Reg = Reg(13);
    pub const R14: Reg = Reg(14);
    pub const R15: Reg = Reg(15);

    pub fn new(index: u8) -> Option<Self> {
        ((index as usize) < REGISTER_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The x86-64 mnemonic this register lowers to, in AT&T syntax.
    pub fn x86(self) -> &'static str {
        X86_REGISTERS[self.0 as usize]
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelItem {
    Comment(Comment),
    Function(FunctionDefinition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub location: Location,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub location: Location,
    pub name: String,
    /// Parameters, in call order. The name is never empty here.
    pub arguments: Vec<RegisterBinding>,
    /// Registers the function may write to. A named entry is a return
    /// register; an unnamed one is scratch.
    pub mutated_registers: Vec<RegisterBinding>,
    pub body: Vec<Statement>,
}

/// A register paired with a variable name, as written in a function head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBinding {
    pub location: Location,
    pub register: Reg,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Comment(Comment),
    Mutation(MutationStatement),
    Return(ReturnStatement),
    IfElse(IfElseStatement),
    While(WhileLoop),
    Break(Location),
    Continue(Location),
    Drop(DropVariableStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationStatement {
    pub location: Location,
    /// More than one destination is legal only for function calls.
    pub destinations: Vec<MutationDestination>,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationDestination {
    pub location: Location,
    pub register: Option<Reg>,
    /// Empty when the destination names only a register.
    pub name: String,
    pub deref_depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Inc1(Location),
    Dec1(Location),
    SetTo(RawValue),
    AddTo(RawValue),
    SubFrom(RawValue),
    MulBy(RawValue),
    DivBy(RawValue),
    Call(FunctionCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub location: Location,
    pub name: String,
    pub arguments: Vec<CallArg>,
}

/// One argument slot in a call, or one value slot in a return statement.
///
/// The location is the position of the value, which is where argument
/// diagnostics are anchored.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub location: Location,
    pub register: Option<Reg>,
    pub value: RawValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub location: Location,
    pub values: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfElseStatement {
    pub location: Location,
    pub condition: Condition,
    pub if_block: Vec<Statement>,
    pub else_block: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    pub location: Location,
    pub condition: Condition,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropVariableStatement {
    pub location: Location,
    pub variable: String,
}

/// Anything that can stand on the right side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Variable(VariableValue),
    Unsigned(Location, u64),
    Signed(Location, i64),
    Float(Location, f64),
    Char(Location, String),
    Str(Location, String),
}

impl RawValue {
    pub fn location(&self) -> Location {
        match self {
            RawValue::Variable(variable) => variable.location,
            RawValue::Unsigned(location, _)
            | RawValue::Signed(location, _)
            | RawValue::Float(location, _)
            | RawValue::Char(location, _)
            | RawValue::Str(location, _) => *location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    pub location: Location,
    pub name: String,
    /// Reading this value also unbinds the variable from its register.
    pub dropped: bool,
    /// Number of `^` prefixes; each one is a layer of memory indirection.
    pub deref_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOp {
    /// The operator that holds when both operands are swapped.
    pub fn flipped(self) -> Self {
        match self {
            ComparisonOp::Greater => ComparisonOp::Less,
            ComparisonOp::Less => ComparisonOp::Greater,
            ComparisonOp::GreaterOrEqual => ComparisonOp::LessOrEqual,
            ComparisonOp::LessOrEqual => ComparisonOp::GreaterOrEqual,
            ComparisonOp::Equal => ComparisonOp::Equal,
            ComparisonOp::NotEqual => ComparisonOp::NotEqual,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Bool(Location, bool),
    Comparison(Box<Comparison>),
    Boolean(BooleanCondition),
}

impl Condition {
    pub fn location(&self) -> Location {
        match self {
            Condition::Bool(location, _) => *location,
            Condition::Comparison(comparison) => comparison.location,
            Condition::Boolean(boolean) => boolean.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub location: Location,
    pub operator: ComparisonOp,
    pub left: RawValue,
    pub right: RawValue,
}

/// `and`/`or` composition of nested conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanCondition {
    pub location: Location,
    pub is_and: bool,
    pub clauses: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn register_indices_map_bijectively_to_x86_names() {
        let names: BTreeSet<&str> = (0..REGISTER_COUNT as u8)
            .map(|index| Reg::new(index).unwrap().x86())
            .collect();
        assert_eq!(names.len(), REGISTER_COUNT);
        assert_eq!(Reg::R0.x86(), "%rax");
        assert_eq!(Reg::R5.x86(), "%rdi");
        assert_eq!(Reg::R14.x86(), "%rsp");
        assert_eq!(Reg::R15.x86(), "%rbp");
    }

    #[test]
    fn register_out_of_range_is_rejected() {
        assert_eq!(Reg::new(16), None);
        assert_eq!(Reg::new(8), Some(Reg::R8));
    }

    #[test]
    fn comparison_flip_is_an_involution() {
        for op in [
            ComparisonOp::Greater,
            ComparisonOp::Less,
            ComparisonOp::GreaterOrEqual,
            ComparisonOp::LessOrEqual,
            ComparisonOp::Equal,
            ComparisonOp::NotEqual,
        ] {
            assert_eq!(op.flipped().flipped(), op);
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Recursive-descent parser: tokens in, top-level AST items out.
//!
//! Unlike the lexer, parsing is fail-fast: the first error aborts the
//! whole parse and is reported on its own.

use crate::ast::{
    BooleanCondition, CallArg, Comment, Comparison, ComparisonOp, Condition,
    DropVariableStatement, FunctionCall, FunctionDefinition, IfElseStatement, Location,
    MutationDestination, MutationStatement, Operation, RawValue, Reg, RegisterBinding,
    ReturnStatement, Statement, TopLevelItem, VariableValue, WhileLoop,
};
use crate::error::CodeError;
use crate::lexer::{Token, TokenKind};

pub fn parse(tokens: &[Token]) -> Result<Vec<TopLevelItem>, CodeError> {
    Parser { tokens, pos: 0 }.top_level()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    /// Position for an unexpected-end-of-file diagnostic.
    fn end_location(&self) -> Location {
        self.tokens
            .last()
            .map(|token| token.location)
            .unwrap_or(Location::new(1, 1))
    }

    fn error(&self, location: Location, message: impl Into<String>) -> CodeError {
        CodeError::new(location, message)
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == Some(TokenKind::Newline) {
            self.pos += 1;
        }
    }

    fn top_level(&mut self) -> Result<Vec<TopLevelItem>, CodeError> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Newline => self.pos += 1,
                TokenKind::Comment => {
                    items.push(TopLevelItem::Comment(Comment {
                        location: token.location,
                        contents: token.contents.clone(),
                    }));
                    self.pos += 1;
                }
                TokenKind::Import => {
                    return Err(self.error(token.location, "`import` is not supported"));
                }
                TokenKind::Function => {
                    items.push(TopLevelItem::Function(self.function_definition()?));
                }
                _ => {
                    return Err(self.error(
                        token.location,
                        format!("expected a function definition, got `{}`", token.contents),
                    ));
                }
            }
        }
        Ok(items)
    }

    /// `fn r0 name, r1 = functionName(r2 = argName) { … }`
    ///
    /// The head has the shape of a mutation statement whose operation is a
    /// function call, so it reuses that parser and validates the result.
    fn function_definition(&mut self) -> Result<FunctionDefinition, CodeError> {
        let location = self.tokens[self.pos].location;
        self.pos += 1; // `fn`

        let head = self.mutation_statement()?;
        let Operation::Call(call) = head.operation else {
            return Err(self.error(
                location,
                "a function definition head must have the shape `fn registers = name(arguments)`",
            ));
        };

        let mut mutated_registers = Vec::with_capacity(head.destinations.len());
        for destination in &head.destinations {
            let Some(register) = destination.register else {
                return Err(self.error(
                    destination.location,
                    "every entry in the mutated-register list must name a register",
                ));
            };
            if destination.deref_depth > 0 {
                return Err(self.error(
                    destination.location,
                    "a mutated register in a function head cannot be dereferenced",
                ));
            }
            mutated_registers.push(RegisterBinding {
                location: destination.location,
                register,
                name: destination.name.clone(),
            });
        }

        let mut arguments = Vec::with_capacity(call.arguments.len());
        for argument in &call.arguments {
            let Some(register) = argument.register else {
                return Err(self.error(
                    argument.location,
                    "function parameters must be written as `rN = name`",
                ));
            };
            match &argument.value {
                RawValue::Variable(variable) if variable.deref_depth == 0 && !variable.dropped => {
                    arguments.push(RegisterBinding {
                        location: argument.location,
                        register,
                        name: variable.name.clone(),
                    });
                }
                _ => {
                    return Err(self.error(
                        argument.location,
                        "function parameters must be plain variable names",
                    ));
                }
            }
        }

        self.skip_newlines();
        self.expect_block_open()?;
        let body = self.block()?;

        Ok(FunctionDefinition {
            location,
            name: call.name,
            arguments,
            mutated_registers,
            body,
        })
    }

    fn expect_block_open(&mut self) -> Result<(), CodeError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::IncreaseNesting && token.contents == "{" => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(self.error(
                token.location,
                format!("expected `{{`, got `{}`", token.contents),
            )),
            None => Err(self.error(self.end_location(), "expected `{`")),
        }
    }

    /// Parse statements up to and including the closing `}`.
    fn block(&mut self) -> Result<Vec<Statement>, CodeError> {
        let mut statements = Vec::new();
        loop {
            let Some(token) = self.peek() else {
                return Err(self.error(self.end_location(), "expected `}` to close a block"));
            };
            let location = token.location;
            match token.kind {
                TokenKind::Newline => self.pos += 1,
                TokenKind::Comment => {
                    statements.push(Statement::Comment(Comment {
                        location,
                        contents: token.contents.clone(),
                    }));
                    self.pos += 1;
                }
                TokenKind::DecreaseNesting => {
                    if token.contents == "}" {
                        self.pos += 1;
                        return Ok(statements);
                    }
                    return Err(self.error(
                        location,
                        format!("unexpected `{}` inside a block", token.contents),
                    ));
                }
                TokenKind::FunctionReturn => {
                    statements.push(Statement::Return(self.return_statement()?));
                    self.skip_newlines();
                    return match self.peek() {
                        Some(token)
                            if token.kind == TokenKind::DecreaseNesting
                                && token.contents == "}" =>
                        {
                            self.pos += 1;
                            Ok(statements)
                        }
                        Some(token) => Err(self.error(
                            token.location,
                            "a return statement must be the last statement in its block",
                        )),
                        None => {
                            Err(self.error(self.end_location(), "expected `}` to close a block"))
                        }
                    };
                }
                TokenKind::IfStatement => {
                    statements.push(Statement::IfElse(self.if_statement()?));
                }
                TokenKind::WhileLoop => {
                    self.pos += 1;
                    let condition = self.condition()?;
                    let body = self.block()?;
                    statements.push(Statement::While(WhileLoop {
                        location,
                        condition,
                        body,
                    }));
                }
                TokenKind::BreakStatement => {
                    statements.push(Statement::Break(location));
                    self.pos += 1;
                }
                TokenKind::ContinueStatement => {
                    statements.push(Statement::Continue(location));
                    self.pos += 1;
                }
                TokenKind::DropVariable => {
                    self.pos += 1;
                    let Some(name) = self.peek() else {
                        return Err(
                            self.error(self.end_location(), "expected a variable after `drop`")
                        );
                    };
                    if name.kind != TokenKind::Name {
                        return Err(self.error(
                            name.location,
                            format!("expected a variable after `drop`, got `{}`", name.contents),
                        ));
                    }
                    statements.push(Statement::Drop(DropVariableStatement {
                        location,
                        variable: name.contents.clone(),
                    }));
                    self.pos += 1;
                }
                TokenKind::Register | TokenKind::Dereference | TokenKind::Name => {
                    statements.push(Statement::Mutation(self.mutation_statement()?));
                }
                _ => {
                    return Err(self.error(
                        location,
                        format!("unexpected `{}` at the start of a statement", token.contents),
                    ));
                }
            }
        }
    }

    /// `if condition { … }` with optional `elif`/`else` tails. `elif` is
    /// sugar for `else { if … }`.
    fn if_statement(&mut self) -> Result<IfElseStatement, CodeError> {
        let location = self.tokens[self.pos].location;
        self.pos += 1; // `if` or `elif`
        let condition = self.condition()?;
        let if_block = self.block()?;

        let checkpoint = self.pos;
        self.skip_newlines();
        let else_block = match self.peek_kind() {
            Some(TokenKind::ElifStatement) => {
                vec![Statement::IfElse(self.if_statement()?)]
            }
            Some(TokenKind::ElseStatement) => {
                self.pos += 1;
                self.skip_newlines();
                self.expect_block_open()?;
                self.block()?
            }
            _ => {
                self.pos = checkpoint;
                Vec::new()
            }
        };

        Ok(IfElseStatement {
            location,
            condition,
            if_block,
            else_block,
        })
    }

    fn return_statement(&mut self) -> Result<ReturnStatement, CodeError> {
        let location = self.tokens[self.pos].location;
        self.pos += 1; // `return`

        let mut values = Vec::new();
        match self.peek_kind() {
            None | Some(TokenKind::Newline) | Some(TokenKind::DecreaseNesting) => {}
            _ => {
                values.push(self.call_argument()?);
                while self.peek_kind() == Some(TokenKind::ListSyntax) {
                    self.pos += 1;
                    values.push(self.call_argument()?);
                }
            }
        }
        Ok(ReturnStatement { location, values })
    }

    /// One or more destinations, then the operator and its operand.
    fn mutation_statement(&mut self) -> Result<MutationStatement, CodeError> {
        let location = match self.peek() {
            Some(token) => token.location,
            None => return Err(self.error(self.end_location(), "expected a mutation statement")),
        };

        let mut destinations = vec![self.mutation_destination()?];
        while self.peek_kind() == Some(TokenKind::ListSyntax) {
            self.pos += 1;
            destinations.push(self.mutation_destination()?);
        }

        let Some(operator) = self.peek() else {
            return Err(self.error(self.end_location(), "expected a mutation operator"));
        };
        let operator_location = operator.location;
        let operation = match operator.kind {
            TokenKind::Increment => {
                self.pos += 1;
                Operation::Inc1(operator_location)
            }
            TokenKind::Decrement => {
                self.pos += 1;
                Operation::Dec1(operator_location)
            }
            TokenKind::Assignment => {
                self.pos += 1;
                let call_follows = self.peek_kind() == Some(TokenKind::Name)
                    && self.peek_at(1).is_some_and(|token| {
                        token.kind == TokenKind::IncreaseNesting && token.contents == "("
                    });
                if call_follows {
                    Operation::Call(self.function_call()?)
                } else {
                    Operation::SetTo(self.raw_value()?)
                }
            }
            TokenKind::PlusEquals => {
                self.pos += 1;
                Operation::AddTo(self.raw_value()?)
            }
            TokenKind::MinusEquals => {
                self.pos += 1;
                Operation::SubFrom(self.raw_value()?)
            }
            TokenKind::MultiplyEquals => {
                self.pos += 1;
                Operation::MulBy(self.raw_value()?)
            }
            TokenKind::DivideEquals => {
                self.pos += 1;
                Operation::DivBy(self.raw_value()?)
            }
            _ => {
                return Err(self.error(
                    operator_location,
                    format!(
                        "after a mutation destination, expecting `=`, `+=`, `-=`, `*=`, `/=`, `++` or `--`, got `{}`",
                        operator.contents
                    ),
                ));
            }
        };

        if destinations.len() > 1 && !matches!(operation, Operation::Call(_)) {
            return Err(self.error(
                location,
                "multiple destinations are only allowed when calling a function",
            ));
        }

        Ok(MutationStatement {
            location,
            destinations,
            operation,
        })
    }

    /// `[register] [^…] [name]` — at least one of register or name.
    fn mutation_destination(&mut self) -> Result<MutationDestination, CodeError> {
        let location = match self.peek() {
            Some(token) => token.location,
            None => return Err(self.error(self.end_location(), "expected a mutation destination")),
        };

        let mut register = None;
        if self.peek_kind() == Some(TokenKind::Register) {
            register = Some(self.register()?);
        }

        let mut deref_depth = 0;
        while self.peek_kind() == Some(TokenKind::Dereference) {
            deref_depth += 1;
            self.pos += 1;
        }

        let mut name = String::new();
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Name {
                name = token.contents.clone();
                self.pos += 1;
            }
        }

        if register.is_none() && name.is_empty() {
            return Err(self.error(
                location,
                "expected a register or a variable name to mutate",
            ));
        }

        Ok(MutationDestination {
            location,
            register,
            name,
            deref_depth,
        })
    }

    /// The current token must be a `Register`; lexing guarantees `r0`–`r15`.
    fn register(&mut self) -> Result<Reg, CodeError> {
        let token = &self.tokens[self.pos];
        let register = token.contents[1..]
            .parse::<u8>()
            .ok()
            .and_then(Reg::new)
            .ok_or_else(|| {
                self.error(
                    token.location,
                    format!("`{}` is not a register", token.contents),
                )
            })?;
        self.pos += 1;
        Ok(register)
    }

    /// `name(argument, …)` — the caller has already checked that a `Name`
    /// followed by `(` comes next.
    fn function_call(&mut self) -> Result<FunctionCall, CodeError> {
        let name_token = &self.tokens[self.pos];
        let location = name_token.location;
        let name = name_token.contents.clone();
        self.pos += 2; // name and `(`

        let mut arguments = Vec::new();
        if self
            .peek()
            .is_some_and(|token| token.kind == TokenKind::DecreaseNesting && token.contents == ")")
        {
            self.pos += 1;
        } else {
            loop {
                arguments.push(self.call_argument()?);
                let Some(token) = self.peek() else {
                    return Err(self.error(self.end_location(), "expected `,` or `)` in a call"));
                };
                match token.kind {
                    TokenKind::ListSyntax => self.pos += 1,
                    TokenKind::DecreaseNesting if token.contents == ")" => {
                        self.pos += 1;
                        break;
                    }
                    _ => {
                        return Err(self.error(
                            token.location,
                            format!("expected `,` or `)` in a call, got `{}`", token.contents),
                        ));
                    }
                }
            }
        }

        Ok(FunctionCall {
            location,
            name,
            arguments,
        })
    }

    /// `rN = value` or a bare value. Diagnostics anchor on the value.
    fn call_argument(&mut self) -> Result<CallArg, CodeError> {
        let mut register = None;
        if self.peek_kind() == Some(TokenKind::Register)
            && self.peek_at(1).map(|token| token.kind) == Some(TokenKind::Assignment)
        {
            register = Some(self.register()?);
            self.pos += 1; // `=`
        }
        let value = self.raw_value()?;
        Ok(CallArg {
            location: value.location(),
            register,
            value,
        })
    }

    /// A variable (with optional `^` and `drop` prefixes) or a literal.
    fn raw_value(&mut self) -> Result<RawValue, CodeError> {
        let mut deref_depth = 0;
        let mut dropped = false;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dereference) => {
                    deref_depth += 1;
                    self.pos += 1;
                }
                Some(TokenKind::DropVariable) => {
                    if dropped {
                        let location = self.tokens[self.pos].location;
                        return Err(self.error(location, "a value cannot be dropped twice"));
                    }
                    dropped = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }

        let Some(token) = self.peek() else {
            return Err(self.error(self.end_location(), "expected a value"));
        };
        let location = token.location;

        if token.kind != TokenKind::Name && (dropped || deref_depth > 0) {
            return Err(self.error(location, "only variables can be dropped or dereferenced"));
        }

        let value = match token.kind {
            TokenKind::Name => RawValue::Variable(VariableValue {
                location,
                name: token.contents.clone(),
                dropped,
                deref_depth,
            }),
            TokenKind::PositiveInteger => {
                let digits = token.contents.replace('_', "");
                let value = digits.parse::<u64>().map_err(|_| {
                    self.error(
                        location,
                        format!("`{}` does not fit in 64 bits", token.contents),
                    )
                })?;
                RawValue::Unsigned(location, value)
            }
            TokenKind::NegativeInteger => {
                let digits = token.contents.replace('_', "");
                let value = digits.parse::<i64>().map_err(|_| {
                    self.error(
                        location,
                        format!("`{}` does not fit in 64 bits", token.contents),
                    )
                })?;
                RawValue::Signed(location, value)
            }
            TokenKind::Decimal => {
                let digits = token.contents.replace('_', "");
                let value = digits.parse::<f64>().map_err(|_| {
                    self.error(
                        location,
                        format!("`{}` is not a decimal number", token.contents),
                    )
                })?;
                RawValue::Float(location, value)
            }
            TokenKind::CharValue => RawValue::Char(location, strip_quotes(&token.contents)),
            TokenKind::StringValue => RawValue::Str(location, strip_quotes(&token.contents)),
            _ => {
                return Err(self.error(
                    location,
                    format!("expected a value, got `{}`", token.contents),
                ));
            }
        };
        self.pos += 1;
        Ok(value)
    }

    /// Collect the condition tokens up to the block-opening `{` and hand
    /// them to the recursive splitter.
    fn condition(&mut self) -> Result<Condition, CodeError> {
        let start = self.pos;
        let mut depth = 0i32;
        loop {
            let Some(token) = self.peek() else {
                return Err(self.error(self.end_location(), "expected `{` after a condition"));
            };
            match token.kind {
                TokenKind::IncreaseNesting if token.contents == "{" => break,
                TokenKind::IncreaseNesting => depth += 1,
                TokenKind::DecreaseNesting => depth -= 1,
                TokenKind::Newline => {
                    return Err(self.error(token.location, "expected `{` after a condition"));
                }
                _ => {}
            }
            self.pos += 1;
        }
        let condition_tokens = &self.tokens[start..self.pos];
        self.pos += 1; // `{`

        if condition_tokens.is_empty() {
            return Err(self.error(self.tokens[start].location, "expected a condition"));
        }
        condition_tokens_to_ast(condition_tokens)
    }
}

/// Recursive condition splitter over a token slice:
/// strip one outer paren pair, split on top-level `and`, then `or`, accept
/// a lone `true`/`false`, else parse a chained comparison.
fn condition_tokens_to_ast(tokens: &[Token]) -> Result<Condition, CodeError> {
    let location = tokens[0].location;

    if wrapped_in_outer_parens(tokens) {
        let inner = &tokens[1..tokens.len() - 1];
        if inner.is_empty() {
            return Err(CodeError::new(location, "expected a condition inside `()`"));
        }
        return condition_tokens_to_ast(inner);
    }

    for (kind, keyword) in [(TokenKind::And, "and"), (TokenKind::Or, "or")] {
        let pieces = split_top_level(tokens, kind)?;
        if pieces.len() > 1 {
            let mut clauses = Vec::with_capacity(pieces.len());
            for piece in pieces {
                if piece.is_empty() {
                    return Err(CodeError::new(
                        location,
                        format!("`{keyword}` is missing a condition on one side"),
                    ));
                }
                clauses.push(condition_tokens_to_ast(piece)?);
            }
            return Ok(Condition::Boolean(BooleanCondition {
                location,
                is_and: kind == TokenKind::And,
                clauses,
            }));
        }
    }

    if tokens.len() == 1 {
        let token = &tokens[0];
        if token.kind == TokenKind::BoolValue {
            return Ok(Condition::Bool(location, token.contents == "true"));
        }
        return Err(CodeError::new(
            location,
            format!(
                "a single-token condition must be `true` or `false`, got `{}`",
                token.contents
            ),
        ));
    }

    chained_comparison(tokens)
}

/// Does the slice start with `(` whose matching `)` is the final token?
fn wrapped_in_outer_parens(tokens: &[Token]) -> bool {
    let Some(first) = tokens.first() else {
        return false;
    };
    if first.kind != TokenKind::IncreaseNesting || tokens.len() < 2 {
        return false;
    }
    let mut depth = 0i32;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::IncreaseNesting => depth += 1,
            TokenKind::DecreaseNesting => {
                depth -= 1;
                if depth == 0 {
                    return index == tokens.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Split on every `kind` token at bracket depth zero.
fn split_top_level(tokens: &[Token], kind: TokenKind) -> Result<Vec<&[Token]>, CodeError> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut piece_start = 0;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::IncreaseNesting => depth += 1,
            TokenKind::DecreaseNesting => {
                depth -= 1;
                if depth < 0 {
                    return Err(CodeError::new(
                        token.location,
                        "unbalanced parentheses in a condition",
                    ));
                }
            }
            k if k == kind && depth == 0 => {
                pieces.push(&tokens[piece_start..index]);
                piece_start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(CodeError::new(
            tokens[tokens.len() - 1].location,
            "unbalanced parentheses in a condition",
        ));
    }
    pieces.push(&tokens[piece_start..]);
    Ok(pieces)
}

/// Which chain family a comparator belongs to, keyed by its first
/// character: `=` for `==`, `!` for `!=`, `<` or `>` for the rest.
fn chain_direction(operator: ComparisonOp) -> char {
    match operator {
        ComparisonOp::Equal => '=',
        ComparisonOp::NotEqual => '!',
        ComparisonOp::Less | ComparisonOp::LessOrEqual => '<',
        ComparisonOp::Greater | ComparisonOp::GreaterOrEqual => '>',
    }
}

fn comparison_operator(contents: &str) -> ComparisonOp {
    match contents {
        "==" => ComparisonOp::Equal,
        "!=" => ComparisonOp::NotEqual,
        "<" => ComparisonOp::Less,
        "<=" => ComparisonOp::LessOrEqual,
        ">" => ComparisonOp::Greater,
        ">=" => ComparisonOp::GreaterOrEqual,
        other => unreachable!("`{other}` lexed as a comparison operator"),
    }
}

/// `a cmp b cmp c …` — one comparison, or same-direction pairs joined
/// with AND. `!=` never chains.
fn chained_comparison(tokens: &[Token]) -> Result<Condition, CodeError> {
    let location = tokens[0].location;
    let mut parser = Parser { tokens, pos: 0 };

    let mut values: Vec<RawValue> = vec![parser.raw_value()?];
    let mut operators: Vec<(ComparisonOp, Location)> = Vec::new();
    while let Some(token) = parser.peek() {
        if token.kind != TokenKind::ComparisonSyntax {
            return Err(CodeError::new(
                token.location,
                format!("unexpected `{}` in a condition", token.contents),
            ));
        }
        operators.push((comparison_operator(&token.contents), token.location));
        parser.pos += 1;
        values.push(parser.raw_value()?);
    }

    if operators.is_empty() {
        return Err(CodeError::new(location, "expected a comparison"));
    }

    if operators.len() == 1 {
        let right = values.swap_remove(1);
        let left = values.swap_remove(0);
        return Ok(Condition::Comparison(Box::new(Comparison {
            location,
            operator: operators[0].0,
            left,
            right,
        })));
    }

    let direction = chain_direction(operators[0].0);
    for (operator, operator_location) in &operators {
        if *operator == ComparisonOp::NotEqual {
            return Err(CodeError::new(*operator_location, "`!=` cannot be chained"));
        }
        if chain_direction(*operator) != direction {
            return Err(CodeError::new(
                *operator_location,
                "a comparison chain cannot change direction",
            ));
        }
    }

    let clauses = operators
        .iter()
        .enumerate()
        .map(|(index, (operator, _))| {
            Condition::Comparison(Box::new(Comparison {
                location: values[index].location(),
                operator: *operator,
                left: values[index].clone(),
                right: values[index + 1].clone(),
            }))
        })
        .collect();
    Ok(Condition::Boolean(BooleanCondition {
        location,
        is_and: true,
        clauses,
    }))
}

fn strip_quotes(contents: &str) -> String {
    contents
        .get(1..contents.len().saturating_sub(1))
        .unwrap_or_default()
        .to_string()
}

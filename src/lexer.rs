// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Lexical analysis: turns a source string into a flat token stream.
//!
//! The concatenated contents of the produced tokens equal the input minus
//! the spaces, tabs and carriage returns that sit outside string and
//! character literals. Lexer errors are recoverable; scanning continues
//! past the offending byte and all errors are reported together.

use crate::ast::Location;
use crate::error::CodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Register,
    StringValue,
    CharValue,
    BoolValue,
    PositiveInteger,
    NegativeInteger,
    Decimal,
    IncreaseNesting,
    DecreaseNesting,
    Function,
    FunctionReturn,
    DropVariable,
    Assignment,
    Increment,
    Decrement,
    PlusEquals,
    MinusEquals,
    MultiplyEquals,
    DivideEquals,
    WhileLoop,
    BreakStatement,
    ContinueStatement,
    IfStatement,
    ElifStatement,
    ElseStatement,
    ComparisonSyntax,
    And,
    Or,
    ListSyntax,
    Import,
    Dereference,
    Comment,
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub contents: String,
    /// Bracket depth: the depth before the bracket for `IncreaseNesting`,
    /// after it for `DecreaseNesting`. Negative depth is surfaced as an
    /// error by the parser, not here.
    pub nesting: i32,
    pub location: Location,
}

struct Cursor<'a> {
    source: &'a str,
    bytes: &'a [u8],
    index: usize,
    location: Location,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            index: 0,
            location: Location::new(1, 1),
        }
    }

    fn at_end(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.index]
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn advance(&mut self) {
        if self.at_end() {
            return;
        }
        if self.current() == b'\n' {
            self.location.line += 1;
            self.location.column = 1;
        } else {
            self.location.column += 1;
        }
        self.index += 1;
    }

    /// Skip spaces, tabs and carriage returns.
    fn skip_ignorable(&mut self) {
        while !self.at_end() && matches!(self.current(), b' ' | b'\t' | b'\r') {
            self.advance();
        }
    }

    /// Advance while `keep` holds and return the consumed slice.
    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a str {
        let start = self.index;
        while !self.at_end() && keep(self.current()) {
            self.advance();
        }
        &self.source[start..self.index]
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn is_number_byte(byte: u8) -> bool {
    byte.is_ascii_digit() || byte == b'_'
}

/// Symbols that extend a run once one of the starters opened it.
fn is_symbol_continuation(byte: u8) -> bool {
    matches!(
        byte,
        b':' | b'=' | b'|' | b'<' | b'>' | b'&' | b'+' | b'-' | b'*' | b'/' | b'.' | b'%'
    )
}

pub fn lex(source: &str) -> (Vec<Token>, Vec<CodeError>) {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut nesting: i32 = 0;

    loop {
        cursor.skip_ignorable();
        if cursor.at_end() {
            break;
        }

        let location = cursor.location;
        let (kind, contents) = match cursor.current() {
            b'\n' => {
                cursor.advance();
                (TokenKind::Newline, "\n".to_string())
            }

            b'#' => {
                let contents = cursor.take_while(|byte| byte != b'\n');
                (TokenKind::Comment, contents.to_string())
            }

            byte @ (b'(' | b'{' | b'[') => {
                cursor.advance();
                (TokenKind::IncreaseNesting, (byte as char).to_string())
            }
            byte @ (b')' | b'}' | b']') => {
                nesting -= 1;
                cursor.advance();
                (TokenKind::DecreaseNesting, (byte as char).to_string())
            }

            b'\'' => match character_literal(&mut cursor, &mut errors) {
                Some(contents) => (TokenKind::CharValue, contents),
                None => continue,
            },

            b'"' => {
                let mut contents = String::from("\"");
                cursor.advance();
                contents.push_str(cursor.take_while(|byte| byte != b'"'));
                contents.push('"');
                cursor.advance();
                (TokenKind::StringValue, contents)
            }

            b',' | b':' | b'=' | b'|' | b'<' | b'>' | b'&' | b'+' | b'-' | b'*' | b'/' | b'.'
            | b'%' | b'!' | b'^' => {
                let mut run = (cursor.current() as char).to_string();
                cursor.advance();
                // Collect the rest of the symbol run, tolerating spaces and
                // tabs between the symbols.
                loop {
                    cursor.skip_ignorable();
                    if cursor.at_end() || !is_symbol_continuation(cursor.current()) {
                        break;
                    }
                    run.push(cursor.current() as char);
                    cursor.advance();
                }

                match run.as_str() {
                    "=" => (TokenKind::Assignment, run),
                    "++" => (TokenKind::Increment, run),
                    "--" => (TokenKind::Decrement, run),
                    "+=" => (TokenKind::PlusEquals, run),
                    "-=" => (TokenKind::MinusEquals, run),
                    "*=" => (TokenKind::MultiplyEquals, run),
                    "/=" => (TokenKind::DivideEquals, run),
                    "==" | "!=" | "<=" | ">=" | "<" | ">" => (TokenKind::ComparisonSyntax, run),
                    "^" => (TokenKind::Dereference, run),
                    "," => (TokenKind::ListSyntax, run),
                    "-" => {
                        if cursor.at_end() || !cursor.current().is_ascii_digit() {
                            errors.push(CodeError::new(location, "After `-`, expecting a number"));
                            continue;
                        }
                        let (kind, digits) = number(&mut cursor);
                        let kind = match kind {
                            TokenKind::Decimal => TokenKind::Decimal,
                            _ => TokenKind::NegativeInteger,
                        };
                        (kind, format!("-{digits}"))
                    }
                    _ => {
                        errors.push(CodeError::new(
                            location,
                            format!("Unknown symbol series `{run}`"),
                        ));
                        continue;
                    }
                }
            }

            byte if byte.is_ascii_alphabetic() || byte == b'_' => {
                let word = cursor.take_while(is_word_byte);
                match word {
                    "fn" => (TokenKind::Function, word.to_string()),
                    "drop" => (TokenKind::DropVariable, word.to_string()),
                    "if" => (TokenKind::IfStatement, word.to_string()),
                    "elif" => (TokenKind::ElifStatement, word.to_string()),
                    "else" => (TokenKind::ElseStatement, word.to_string()),
                    "while" => (TokenKind::WhileLoop, word.to_string()),
                    "break" => (TokenKind::BreakStatement, word.to_string()),
                    "continue" => (TokenKind::ContinueStatement, word.to_string()),
                    "true" | "false" => (TokenKind::BoolValue, word.to_string()),
                    "return" => (TokenKind::FunctionReturn, word.to_string()),
                    "import" => (TokenKind::Import, word.to_string()),
                    "and" => (TokenKind::And, word.to_string()),
                    "or" => (TokenKind::Or, word.to_string()),
                    "r0" | "r1" | "r2" | "r3" | "r4" | "r5" | "r6" | "r7" | "r8" | "r9" | "r10"
                    | "r11" | "r12" | "r13" | "r14" | "r15" => {
                        (TokenKind::Register, word.to_string())
                    }
                    _ => {
                        let mut name = word.to_string();
                        // A dot extends the name with the following word.
                        cursor.skip_ignorable();
                        if !cursor.at_end() && cursor.current() == b'.' {
                            name.push('.');
                            cursor.advance();
                            cursor.skip_ignorable();
                            name.push_str(cursor.take_while(is_word_byte));
                        }
                        (TokenKind::Name, name)
                    }
                }
            }

            byte if byte.is_ascii_digit() => {
                let (kind, digits) = number(&mut cursor);
                (kind, digits)
            }

            byte => {
                errors.push(CodeError::new(
                    location,
                    format!("Unexpected character: `{}`", byte as char),
                ));
                cursor.advance();
                continue;
            }
        };

        tokens.push(Token {
            kind,
            contents,
            nesting,
            location,
        });

        // An opening bracket carries the depth before it increments, so
        // bump the depth only after the token was recorded.
        if kind == TokenKind::IncreaseNesting {
            nesting += 1;
        }
    }

    (tokens, errors)
}

/// Scan a decimal integer, extending it to a decimal literal when a `.`
/// followed by another digit (not `..`) comes next.
fn number(cursor: &mut Cursor<'_>) -> (TokenKind, String) {
    let mut contents = cursor.take_while(is_number_byte).to_string();
    if !cursor.at_end()
        && cursor.current() == b'.'
        && cursor.peek_next().is_some_and(|byte| byte.is_ascii_digit())
    {
        contents.push('.');
        cursor.advance();
        contents.push_str(cursor.take_while(is_number_byte));
        return (TokenKind::Decimal, contents);
    }
    (TokenKind::PositiveInteger, contents)
}

/// Scan `'x'` or `'\x'`. Returns `None` when the text ends mid-literal;
/// the contents always carry a normalized closing quote.
fn character_literal(cursor: &mut Cursor<'_>, errors: &mut Vec<CodeError>) -> Option<String> {
    let mut contents = String::from("'");
    cursor.advance();
    if cursor.at_end() {
        errors.push(CodeError::new(
            cursor.location,
            "Unexpected end of text while scanning a character literal",
        ));
        return None;
    }
    if cursor.current() == b'\\' {
        contents.push('\\');
        cursor.advance();
        if cursor.at_end() {
            errors.push(CodeError::new(
                cursor.location,
                "Unexpected end of text while scanning a character literal",
            ));
            return None;
        }
    }
    contents.push(cursor.current() as char);
    contents.push('\'');
    cursor.advance();
    if cursor.at_end() {
        errors.push(CodeError::new(
            cursor.location,
            "Expected `'` to close a character literal",
        ));
        return Some(contents);
    }
    if cursor.current() != b'\'' {
        errors.push(CodeError::new(
            cursor.location,
            format!(
                "Expected `'` to close a character literal, got `{}`",
                cursor.current() as char
            ),
        ));
    }
    cursor.advance();
    Some(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn keywords_and_names_classify() {
        assert_eq!(
            kinds("fn main while break continue drop import"),
            vec![
                TokenKind::Function,
                TokenKind::Name,
                TokenKind::WhileLoop,
                TokenKind::BreakStatement,
                TokenKind::ContinueStatement,
                TokenKind::DropVariable,
                TokenKind::Import,
            ]
        );
    }

    #[test]
    fn registers_classify_and_near_misses_do_not() {
        let (tokens, errors) = lex("r0 r15 r16 rax");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Register);
        assert_eq!(tokens[1].kind, TokenKind::Register);
        assert_eq!(tokens[2].kind, TokenKind::Name);
        assert_eq!(tokens[3].kind, TokenKind::Name);
    }

    #[test]
    fn symbol_runs_classify() {
        // Newline-separated: spaces would merge adjacent runs into one.
        let source = "=\n++\n--\n+=\n-=\n*=\n/=\n==\n!=\n<=\n>=\n<\n>\n^\n,";
        let got: Vec<TokenKind> = kinds(source)
            .into_iter()
            .filter(|kind| *kind != TokenKind::Newline)
            .collect();
        assert_eq!(
            got,
            vec![
                TokenKind::Assignment,
                TokenKind::Increment,
                TokenKind::Decrement,
                TokenKind::PlusEquals,
                TokenKind::MinusEquals,
                TokenKind::MultiplyEquals,
                TokenKind::DivideEquals,
                TokenKind::ComparisonSyntax,
                TokenKind::ComparisonSyntax,
                TokenKind::ComparisonSyntax,
                TokenKind::ComparisonSyntax,
                TokenKind::ComparisonSyntax,
                TokenKind::ComparisonSyntax,
                TokenKind::Dereference,
                TokenKind::ListSyntax,
            ]
        );
    }

    #[test]
    fn symbol_runs_tolerate_interior_whitespace() {
        let (tokens, errors) = lex("x + = 1");
        assert!(errors.is_empty());
        assert_eq!(tokens[1].kind, TokenKind::PlusEquals);
        assert_eq!(tokens[1].contents, "+=");
    }

    #[test]
    fn unknown_symbol_series_recovers() {
        let (tokens, errors) = lex(":= x");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unknown symbol series `:=`"));
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Name);
    }

    #[test]
    fn numbers_classify() {
        let (tokens, errors) = lex("42 1_000 3.25 -7 -2.5");
        assert!(errors.is_empty());
        let got: Vec<(TokenKind, &str)> = tokens
            .iter()
            .map(|token| (token.kind, token.contents.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (TokenKind::PositiveInteger, "42"),
                (TokenKind::PositiveInteger, "1_000"),
                (TokenKind::Decimal, "3.25"),
                (TokenKind::NegativeInteger, "-7"),
                (TokenKind::Decimal, "-2.5"),
            ]
        );
    }

    #[test]
    fn lone_minus_requires_a_number() {
        let (tokens, errors) = lex("- x");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("After `-`, expecting a number"));
        assert_eq!(tokens[0].kind, TokenKind::Name);
    }

    #[test]
    fn character_literals_keep_their_quotes() {
        let (tokens, errors) = lex(r"'a' '\n'");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].contents, "'a'");
        assert_eq!(tokens[1].contents, r"'\n'");
        assert_eq!(tokens[1].kind, TokenKind::CharValue);
    }

    #[test]
    fn unterminated_character_literal_reports_its_closer() {
        // The stray `b` is consumed, and the orphaned quote then starts a
        // second literal that runs into the end of the text.
        let (tokens, errors) = lex("'ab'");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("close a character literal"));
        assert!(errors[1].message.contains("end of text"));
        assert_eq!(tokens[0].contents, "'a'");
    }

    #[test]
    fn string_literals_keep_both_quotes() {
        let (tokens, errors) = lex("\"hi\\n\"");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::StringValue);
        assert_eq!(tokens[0].contents, "\"hi\\n\"");
    }

    #[test]
    fn comments_run_to_the_end_of_the_line() {
        let (tokens, errors) = lex("# note\nx");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].contents, "# note");
        assert_eq!(tokens[1].kind, TokenKind::Newline);
        assert_eq!(tokens[2].kind, TokenKind::Name);
    }

    #[test]
    fn dotted_names_extend_with_the_following_word() {
        let (tokens, errors) = lex("std.exit x");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].contents, "std.exit");
        assert_eq!(tokens[1].contents, "x");
    }

    #[test]
    fn nesting_depth_attaches_before_increment_and_after_decrement() {
        let (tokens, errors) = lex("({x})");
        assert!(errors.is_empty());
        let depths: Vec<(TokenKind, i32)> = tokens
            .iter()
            .map(|token| (token.kind, token.nesting))
            .collect();
        assert_eq!(
            depths,
            vec![
                (TokenKind::IncreaseNesting, 0),
                (TokenKind::IncreaseNesting, 1),
                (TokenKind::Name, 2),
                (TokenKind::DecreaseNesting, 1),
                (TokenKind::DecreaseNesting, 0),
            ]
        );
    }

    #[test]
    fn unexpected_byte_recovers_and_reports_position() {
        let (tokens, errors) = lex("x @ y");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].column, 3);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn positions_are_one_based_and_monotone() {
        let source = "fn r0 = main() {\n    r0 x = 1\n}\n";
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].location, Location::new(1, 1));
        let mut previous = (0u32, 0u32);
        for token in &tokens {
            let position = (token.location.line, token.location.column);
            assert!(position.0 >= previous.0, "line went backwards");
            if position.0 == previous.0 {
                assert!(position.1 > previous.1, "column did not advance");
            }
            previous = position;
        }
    }

    #[test]
    fn token_contents_reconstruct_the_input() {
        // Spaces, tabs and carriage returns outside literals are the only
        // bytes the token stream drops. (Comments keep their interior
        // spaces, so none appear here.)
        let source = "fn r0 = main() {\n    r5 x = 'a'\n    \"s\" 3.5 -2\n}\n";
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty());
        let reconstructed: String = tokens.iter().map(|token| token.contents.as_str()).collect();
        let stripped: String = source
            .chars()
            .filter(|&c| c != ' ' && c != '\t' && c != '\r')
            .collect();
        assert_eq!(reconstructed, stripped);
    }
}

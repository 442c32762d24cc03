// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Command-line driver for the Common Assembly compiler.
//!
//! Wraps the `casm` library with file handling: check a source file,
//! emit its assembly, or build an executable by handing the assembly to
//! the system `as` and `ld`.

#![forbid(unsafe_code)]

mod diagnostics;

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use thiserror::Error;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "casm",
    about = "Compiler for the Common Assembly language (x86-64 Linux)",
    version
)]
struct Cli {
    /// Global log level (trace|debug|info|warn|error)
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
    )]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a file and report diagnostics without writing anything
    Check(CheckArgs),
    /// Compile a file and write the generated assembly
    Emit(EmitArgs),
    /// Compile, assemble and link a file into an executable
    Build(BuildArgs),
    /// Dump the token stream of a file as a table
    Tokens(TokensArgs),
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// Path to a .ca file
    path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct EmitArgs {
    /// Path to a .ca file
    path: PathBuf,
    /// Output path; defaults to the source path with a .s extension
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct TokensArgs {
    /// Path to a .ca file
    path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Path to a .ca file
    path: PathBuf,
    /// Executable path; defaults to the source path without extension
    #[arg(long)]
    out: Option<PathBuf>,
    /// Keep the intermediate .s and .o files next to the executable
    #[arg(long, default_value_t = false)]
    keep_asm: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("{0} error(s) in {1}")]
    Compile(usize, String),
    #[error("io error: {source}: {path}")]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
    #[error("{tool} failed with {status}:\n{stderr}")]
    Tool {
        tool: &'static str,
        status: String,
        stderr: String,
    },
}

impl CliError {
    fn code(&self) -> i32 {
        match self {
            CliError::Compile(..) => 3,
            CliError::Io { .. } => 5,
            CliError::Tool { .. } => 6,
        }
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        source,
        path: path.to_path_buf(),
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), CliError> {
    fs::write(path, contents).map_err(|source| CliError::Io {
        source,
        path: path.to_path_buf(),
    })
}

/// Compile the file or print its diagnostics to stderr.
fn compile_file(path: &Path) -> Result<String, CliError> {
    let source = read_source(path)?;
    let (assembly, errors) = casm::compile(&source);
    if !errors.is_empty() {
        let file = path.display().to_string();
        eprint!("{}", diagnostics::render(&file, &source, &errors));
        return Err(CliError::Compile(errors.len(), file));
    }
    Ok(assembly)
}

fn run_tool(tool: &'static str, args: &[&str]) -> Result<(), CliError> {
    debug!(tool, ?args, "running external tool");
    let output = Process::new(tool)
        .args(args)
        .output()
        .map_err(|source| CliError::Io {
            source,
            path: PathBuf::from(tool),
        })?;
    if !output.status.success() {
        return Err(CliError::Tool {
            tool,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

fn cmd_check(args: CheckArgs) -> Result<(), CliError> {
    compile_file(&args.path)?;
    println!("OK");
    Ok(())
}

/// Token-table dump, mostly useful when debugging the language itself.
fn cmd_tokens(args: TokensArgs) -> Result<(), CliError> {
    let source = read_source(&args.path)?;
    let (tokens, errors) = casm::lexer::lex(&source);

    println!(" Line   Column   Nesting   Kind               Contents");
    for token in &tokens {
        let contents = token.contents.replace('\n', "\\n").replace('\t', "    ");
        println!(
            " {:>4}   {:>6}   {:>7}   {:<18} {}",
            token.location.line,
            token.location.column,
            token.nesting,
            format!("{:?}", token.kind),
            contents,
        );
    }

    if !errors.is_empty() {
        let file = args.path.display().to_string();
        eprint!("{}", diagnostics::render(&file, &source, &errors));
        return Err(CliError::Compile(errors.len(), file));
    }
    Ok(())
}

fn cmd_emit(args: EmitArgs) -> Result<(), CliError> {
    let assembly = compile_file(&args.path)?;
    let out = args
        .out
        .unwrap_or_else(|| args.path.with_extension("s"));
    write_file(&out, &assembly)?;
    println!("assembly written to {}", out.display());
    Ok(())
}

fn cmd_build(args: BuildArgs) -> Result<(), CliError> {
    let assembly = compile_file(&args.path)?;
    let executable = args.out.unwrap_or_else(|| args.path.with_extension(""));
    let assembly_path = executable.with_extension("s");
    let object_path = executable.with_extension("o");

    write_file(&assembly_path, &assembly)?;
    run_tool(
        "as",
        &[
            "-o",
            &object_path.display().to_string(),
            &assembly_path.display().to_string(),
        ],
    )?;
    run_tool(
        "ld",
        &[
            "-o",
            &executable.display().to_string(),
            &object_path.display().to_string(),
        ],
    )?;

    if !args.keep_asm {
        let _ = fs::remove_file(&assembly_path);
        let _ = fs::remove_file(&object_path);
    }
    println!("executable written to {}", executable.display());
    Ok(())
}

fn try_main(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Check(args) => cmd_check(args),
        Command::Emit(args) => cmd_emit(args),
        Command::Build(args) => cmd_build(args),
        Command::Tokens(args) => cmd_tokens(args),
    }
}

fn main() {
    let cli = Cli::parse();
    casm::logging::init_with_level(Some(&cli.log_level));

    if let Err(error) = try_main(cli) {
        eprintln!("error: {error}");
        std::process::exit(error.code());
    }
}

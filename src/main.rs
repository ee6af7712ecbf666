//! Quasicode front end
//!
//! Scans, parses, resolves and type checks Quasicode programs.

mod utils;
mod frontend;
mod types;
mod semantic;
mod stdlib;
mod feedback;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use feedback::{CompilationFeedback, CompilationStats};
use frontend::ast::Program;
use frontend::lexer::Lexer;
use frontend::parser::Parser as QuasiParser;
use frontend::token::Token;
use semantic::SemanticAnalyzer;
use stdlib::BUILTIN_CLASS_NAMES;
use utils::{Error, LineIndex, Phase};

/// Quasicode front end
#[derive(Parser, Debug)]
#[command(name = "qsc")]
#[command(version)]
#[command(about = "Quasicode front end - checks programs without running them")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input source file; shorthand for `qsc check FILE`
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a source file for errors
    Check {
        input: PathBuf,

        /// Print a JSON feedback document instead of plain diagnostics
        #[arg(long)]
        json: bool,
    },
    /// Print the symbol table of a source file as JSON
    Symbols { input: PathBuf },
    /// Print the token stream of a source file
    Tokens { input: PathBuf },
    /// Print version information
    Version,
}

/// Everything one run of the pipeline produced
struct Compilation {
    source: String,
    token_count: usize,
    program: Program,
    analyzer: SemanticAnalyzer,
    errors: Vec<Error>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Some(Commands::Check { input, json }) => check_file(input, *json),
        Some(Commands::Symbols { input }) => print_symbols(input),
        Some(Commands::Tokens { input }) => print_tokens(input),
        Some(Commands::Version) => {
            println!("qsc {}", env!("CARGO_PKG_VERSION"));
            println!("Quasicode front end");
            Ok(true)
        }
        None => match &cli.input {
            Some(input) => check_file(input, false),
            None => {
                eprintln!("Error: No input file specified");
                eprintln!("Usage: qsc <FILE> or qsc check <FILE>");
                process::exit(2);
            }
        },
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn read_source(input: &Path) -> Result<String> {
    let source = fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?;
    if source.trim().is_empty() {
        log::warn!("{} is empty", input.display());
    }
    Ok(source)
}

fn scan(source: &str) -> (Vec<Token>, Vec<Error>) {
    Lexer::new(source, 0).tokenize()
}

/// Run every phase; diagnostics come back in phase order
fn compile(input: &Path) -> Result<Compilation> {
    let source = read_source(input)?;

    let (tokens, mut errors) = scan(&source);
    let token_count = tokens.len();
    let (mut program, parse_errors) = QuasiParser::new(tokens, BUILTIN_CLASS_NAMES).parse_program();
    errors.extend(parse_errors);

    let mut analyzer = SemanticAnalyzer::new();
    errors.extend(analyzer.analyze(&mut program));

    let count = |phase: Phase| errors.iter().filter(|error| error.phase() == phase).count();
    log::debug!(
        "{} diagnostics: {} scan, {} parse, {} resolve, {} type",
        errors.len(),
        count(Phase::Scan),
        count(Phase::Parse),
        count(Phase::Resolve),
        count(Phase::Type)
    );
    Ok(Compilation { source, token_count, program, analyzer, errors })
}

/// Returns whether the file is free of errors
fn check_file(input: &Path, json: bool) -> Result<bool> {
    let compilation = compile(input)?;
    let file_name = input.display().to_string();

    if json {
        let stats = CompilationStats::collect(
            &compilation.source,
            compilation.token_count,
            &compilation.program,
            compilation.analyzer.table(),
        );
        let feedback = CompilationFeedback::new(file_name, &compilation.source, &compilation.errors, stats);
        println!("{}", feedback.to_json().context("failed to serialize feedback")?);
        return Ok(feedback.success);
    }

    let lines = LineIndex::new(&compilation.source);
    for error in &compilation.errors {
        match error.span() {
            Some(span) => {
                let at = lines.line_col(span.start);
                eprintln!("{}:{}:{}: error: {}", file_name, at.line, at.column, error);
            }
            None => eprintln!("{}: error: {}", file_name, error),
        }
    }
    Ok(compilation.errors.is_empty())
}

fn print_symbols(input: &Path) -> Result<bool> {
    let compilation = compile(input)?;
    let json =
        serde_json::to_string_pretty(compilation.analyzer.table()).context("failed to serialize symbol table")?;
    println!("{}", json);
    Ok(compilation.errors.is_empty())
}

fn print_tokens(input: &Path) -> Result<bool> {
    let source = read_source(input)?;
    let lines = LineIndex::new(&source);
    let (tokens, errors) = scan(&source);
    for token in &tokens {
        let at = lines.line_col(token.span.start);
        println!("{:>4}:{:<3} {:<12} {:?}", at.line, at.column, token.kind.to_string(), token.lexeme);
    }
    for error in &errors {
        eprintln!("{}: error: {}", input.display(), error);
    }
    Ok(errors.is_empty())
}

mod ast;
mod config;
mod constfold;
mod diagnostic;
mod emptyblock;
mod error;
mod ir;
mod irgen;
mod lexer;
mod parser;
mod scope;
mod sema;
mod token;
mod trace;
mod ty;

use clap::Parser;
use diagnostic::Diagnostics;
use error::CompileError;
use lexer::lex;
use parser::parse;
use sema::analyze;
use std::io::Write;
use std::path::PathBuf;
use trace::Traces;

/// Ahead-of-time compiler for a small C-like language, emitting textual SSA IR
#[derive(Parser, Debug)]
#[command(name = config::NAME)]
#[command(version = config::VERSION)]
#[command(about = config::ABOUT)]
struct CliArgs {
    /// Source file to compile
    source: PathBuf,

    /// Where to write the generated IR (defaults to stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the lexer, parser, and symbol-table traces to stderr
    #[arg(long)]
    trace: bool,

    /// Skip the empty-block coalescing pass
    #[arg(long)]
    no_empty_block_pass: bool,
}

fn main() {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(had_diagnostics) => {
            std::process::exit(i32::from(had_diagnostics));
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Runs the full pipeline once. Returns whether any diagnostics were
/// emitted (fatal I/O and lex failures are returned as `Err` instead).
fn run(args: &CliArgs) -> Result<bool, CompileError> {
    let source = std::fs::read_to_string(&args.source)
        .map_err(|e| CompileError::read_source(args.source.display().to_string(), e))?;

    let mut diags = Diagnostics::new();
    let tokens = lex(&source, &mut diags)?;

    if args.trace {
        for tok in &tokens {
            eprintln!("{} {:?} {:?}", tok.line, tok.kind, tok.lexeme);
        }
    }

    let (unit, parse_trace) = parse(&tokens, &mut diags);
    if args.trace {
        for line in &parse_trace {
            eprintln!("{}", line);
        }
    }

    let mut traces = Traces::new(args.trace);
    analyze(&unit, &mut diags, &mut traces);
    if args.trace {
        let rendered = traces.render();
        if !rendered.is_empty() {
            eprintln!("{}", rendered);
        }
    }

    let module = irgen::generate(&unit, !args.no_empty_block_pass);
    let rendered_ir = module.to_string();

    match &args.output {
        Some(path) => {
            let mut f = std::fs::File::create(path).map_err(CompileError::WriteOutput)?;
            f.write_all(rendered_ir.as_bytes())
                .map_err(CompileError::WriteOutput)?;
        }
        None => {
            print!("{}", rendered_ir);
        }
    }

    if !diags.is_empty() {
        eprintln!("{}", diags.render());
    }

    Ok(!diags.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_args_default_to_stdout_and_enabled_empty_block_pass() {
        let args = CliArgs {
            source: PathBuf::from("a.bl"),
            output: None,
            trace: false,
            no_empty_block_pass: false,
        };
        assert!(args.output.is_none());
        assert!(!args.no_empty_block_pass);
    }

    #[test]
    fn run_reports_a_missing_source_file_as_a_compile_error() {
        let args = CliArgs {
            source: PathBuf::from("/nonexistent/path/does-not-exist.bl"),
            output: None,
            trace: false,
            no_empty_block_pass: false,
        };
        assert!(run(&args).is_err());
    }
}

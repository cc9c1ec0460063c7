//! YAIL CLI: inspect the AST of a source file or run it on the VM.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::process;

use colored::Colorize;

use yail::lexer::Scanner;
use yail::parser::Parser;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Parse a file (or stdin) and show the AST
    Ast { file: Option<String> },
    /// Compile and run a file (or start the interactive VM shell)
    Vm {
        file: Option<String>,
        disassemble: bool,
    },
}

fn print_usage() {
    eprintln!("yail {} - YAIL interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: yail <command> [script.yail]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ast [file]   Parse and write the AST and token stream to <file>.out");
    eprintln!("  vm [file]    Compile and run the file on the virtual machine");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --disassemble  Print the compiled bytecode before running (vm only)");
    eprintln!();
    eprintln!("Without a file, both commands start an interactive shell:");
    eprintln!("  ast          reads lines until an empty line, then prints the AST");
    eprintln!("  vm           compiles and runs each line, printing its value");
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("ast") => Command::Ast {
            file: args.get(1).cloned(),
        },
        Some("vm") => {
            let rest: Vec<&String> = args.iter().skip(1).collect();
            let disassemble = rest.iter().any(|a| a.as_str() == "--disassemble");
            let file = rest
                .iter()
                .find(|a| !a.starts_with("--"))
                .map(|a| a.to_string());
            Command::Vm { file, disassemble }
        }
        Some("--help") | Some("-h") => {
            print_usage();
            process::exit(0);
        }
        _ => {
            print_usage();
            process::exit(64);
        }
    }
}

fn main() {
    match parse_args() {
        Command::Ast { file: Some(path) } => run_ast_file(&path),
        Command::Ast { file: None } => yail::repl::run_ast_repl(),
        Command::Vm {
            file: Some(path),
            disassemble,
        } => run_vm_file(&path, disassemble),
        Command::Vm { file: None, .. } => yail::repl::run_vm_repl(),
    }
}

fn read_source(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("{}", format!("error reading {}: {}", path, error).red());
            process::exit(1);
        }
    }
}

/// Parse a file and write its AST plus token stream to `<path>.out`. Parser
/// errors also go to stderr and the exit code is 1.
fn run_ast_file(path: &str) {
    let source = read_source(path);
    let mut out = String::new();

    let tokens = match Scanner::new(&source).scan_tokens() {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("{}", error.to_string().red());
            process::exit(1);
        }
    };

    writeln!(out, "========================================= AST =========================================").unwrap();
    let parse_result = Parser::new(tokens.clone()).parse();
    let had_errors = match &parse_result {
        Ok(program) => {
            writeln!(out, "\n{}", program.print_ast()).unwrap();
            false
        }
        Err(errors) => {
            writeln!(out, "\nparser errors:").unwrap();
            for error in errors {
                writeln!(out, "\t{}", error).unwrap();
            }
            true
        }
    };

    writeln!(out, "========================================= TOKENS =========================================\n").unwrap();
    out.push_str(&yail::ast::pretty::print_tokens(&tokens));

    let out_path = format!("{}.out", path);
    if let Err(error) = fs::write(&out_path, out) {
        eprintln!("{}", format!("error writing {}: {}", out_path, error).red());
        process::exit(1);
    }

    if had_errors {
        if let Err(errors) = parse_result {
            eprintln!("{}", "parser errors:".red());
            for error in errors {
                eprintln!("\t{}", error.to_string().red());
            }
        }
        process::exit(1);
    }
}

/// Compile and run a file. Errors from any stage go to stderr with a
/// non-zero exit code.
fn run_vm_file(path: &str, disassemble: bool) {
    let source = read_source(path);

    let bytecode = match yail::compile(&source) {
        Ok(bytecode) => bytecode,
        Err(error) => {
            eprintln!("{}", error.to_string().red());
            process::exit(1);
        }
    };

    if disassemble {
        print!("{}", yail::bytecode::disassemble_bytecode(&bytecode));
        println!("---");
    }

    let mut vm = yail::bytecode::Vm::new(bytecode);
    if let Err(error) = vm.run() {
        eprintln!("{}", format!("Runtime error: {}", error).red());
        process::exit(1);
    }
}

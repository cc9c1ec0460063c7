//! Interactive shells: one showing the AST, one running the VM.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::{Compiler, SymbolTable, Value, Vm};
use crate::error::ParserError;
use crate::lexer::Scanner;
use crate::parser::Parser;

const PROMPT: &str = "yail> ";
const PROMPT_CONTINUE: &str = " ...> ";
const HISTORY_FILE: &str = ".yail_history";

fn history_path() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        home.join(HISTORY_FILE)
    } else {
        PathBuf::from(HISTORY_FILE)
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit")
}

fn print_parser_errors(errors: &[ParserError]) {
    eprintln!("{}", "parser errors:".red());
    for error in errors {
        eprintln!("\t{}", error.to_string().red());
    }
}

/// Read lines until an empty one, then print the parsed AST.
pub fn run_ast_repl() {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(_) => {
            run_ast_repl_basic();
            return;
        }
    };
    let history = history_path();
    let _ = editor.load_history(&history);

    let mut buffer: Vec<String> = Vec::new();

    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            PROMPT_CONTINUE
        };
        match editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim_end().to_string();
                if is_exit(line.as_str()) {
                    break;
                }
                if line.is_empty() {
                    if !buffer.is_empty() {
                        show_ast(&buffer.join("\n"));
                        buffer.clear();
                    }
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                buffer.push(line);
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(_) => break,
        }
    }

    let _ = editor.save_history(&history);
}

fn run_ast_repl_basic() {
    let stdin = io::stdin();
    let mut buffer: Vec<String> = Vec::new();

    print!("{}", PROMPT);
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim_end().to_string();
        if is_exit(line.as_str()) {
            return;
        }
        if line.is_empty() {
            if !buffer.is_empty() {
                show_ast(&buffer.join("\n"));
                buffer.clear();
            }
            print!("{}", PROMPT);
        } else {
            buffer.push(line);
            print!("{}", PROMPT_CONTINUE);
        }
        let _ = io::stdout().flush();
    }
}

fn show_ast(source: &str) {
    let tokens = match Scanner::new(source).scan_tokens() {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("{}", error.to_string().red());
            return;
        }
    };
    match Parser::new(tokens).parse() {
        Ok(program) => println!("\n{}", program.print_ast()),
        Err(errors) => print_parser_errors(&errors),
    }
}

/// The line-at-a-time VM shell. Symbol table, constants and globals carry
/// over between lines, so definitions accumulate.
pub struct VmRepl {
    symbol_table: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
    globals: Rc<RefCell<Vec<Value>>>,
}

impl VmRepl {
    pub fn new() -> Self {
        Self {
            symbol_table: SymbolTable::new_with_builtins(),
            constants: Vec::new(),
            globals: Vm::new_globals(),
        }
    }

    pub fn run(&mut self) {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(_) => {
                self.run_basic();
                return;
            }
        };
        let history = history_path();
        let _ = editor.load_history(&history);

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if is_exit(line) {
                        break;
                    }
                    let _ = editor.add_history_entry(line);
                    self.eval_line(line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(_) => break,
            }
        }

        let _ = editor.save_history(&history);
    }

    fn run_basic(&mut self) {
        let stdin = io::stdin();
        print!("{}", PROMPT);
        let _ = io::stdout().flush();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if is_exit(line) {
                return;
            }
            if !line.is_empty() {
                self.eval_line(line);
            }
            print!("{}", PROMPT);
            let _ = io::stdout().flush();
        }
    }

    /// Compile and run one input line against the accumulated state.
    pub fn eval_line(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(error) => {
                eprintln!("{}", error.to_string().red());
                return;
            }
        };
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(errors) => {
                print_parser_errors(&errors);
                return;
            }
        };

        let mut compiler =
            Compiler::new_with_state(self.symbol_table.clone(), std::mem::take(&mut self.constants));
        if let Err(error) = compiler.compile(&program) {
            // Keep the constants accumulated so far even when this line
            // failed to compile.
            self.constants = compiler.bytecode().constants;
            eprintln!("{}", format!("compilation failed: {}", error).red());
            return;
        }

        let bytecode = compiler.bytecode();
        self.constants = bytecode.constants.clone();

        let mut vm = Vm::new_with_globals_store(bytecode, self.globals.clone());
        if let Err(error) = vm.run() {
            eprintln!("{}", format!("executing bytecode failed: {}", error).red());
            return;
        }

        println!("{}", vm.last_popped_stack_element().inspect());
    }
}

impl Default for VmRepl {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_vm_repl() {
    VmRepl::new().run();
}

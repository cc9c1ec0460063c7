//! Built-in functions exposed to YAIL programs.
//!
//! The table order is the `GetBuiltin` index space and must stay stable.

use std::io::{self, BufRead, Write};

use crate::bytecode::value::Value;

/// `Ok(None)` means the builtin produced no meaningful value; the VM pushes
/// `Null` in that case. `Err` aborts execution as a builtin error.
pub type BuiltinResult = Result<Option<Value>, String>;

/// A host function callable from bytecode.
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(Vec<Value>) -> BuiltinResult,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// The builtin table. Indices are referenced by compiled `GetBuiltin`
/// instructions and therefore part of the bytecode format.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "pow",
        func: builtin_pow,
    },
    Builtin {
        name: "square_root",
        func: builtin_square_root,
    },
    Builtin {
        name: "gen",
        func: builtin_gen,
    },
    Builtin {
        name: "write",
        func: builtin_write,
    },
    Builtin {
        name: "write_all",
        func: builtin_write_all,
    },
    Builtin {
        name: "write_string",
        func: builtin_write_string,
    },
    Builtin {
        name: "read",
        func: builtin_read,
    },
    Builtin {
        name: "read_all",
        func: builtin_read_all,
    },
    Builtin {
        name: "read_string",
        func: builtin_read_string,
    },
];

/// Look up a builtin by name, returning its index and definition.
pub fn get_builtin_by_name(name: &str) -> Option<(usize, &'static Builtin)> {
    BUILTINS
        .iter()
        .enumerate()
        .find(|(_, builtin)| builtin.name == name)
}

fn builtin_len(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => Ok(Some(Value::Int(elements.borrow().len() as i64))),
        Value::Str(s) => Ok(Some(Value::Int(s.chars().count() as i64))),
        other => Err(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_pow(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 2 {
        return Err(format!(
            "wrong number of arguments for 'pow'. got={}, want=2",
            args.len()
        ));
    }
    let base = numeric_argument(&args[0], "first argument to 'pow'")?;
    let exponent = numeric_argument(&args[1], "second argument to 'pow'")?;
    Ok(Some(Value::Float(base.powf(exponent))))
}

fn builtin_square_root(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments for 'square_root'. got={}, want=1",
            args.len()
        ));
    }
    let number = numeric_argument(&args[0], "argument to 'square_root'")?;
    if number < 0.0 {
        return Err("argument to 'square_root' must be non-negative".to_string());
    }
    Ok(Some(Value::Float(number.sqrt())))
}

fn builtin_gen(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 2 {
        return Err(format!(
            "wrong number of arguments for 'gen'. got={}, want=2",
            args.len()
        ));
    }
    let (Value::Int(start), Value::Int(end)) = (&args[0], &args[1]) else {
        return Err(format!(
            "arguments to 'gen' must be INTEGERs, got {} and {}",
            args[0].type_name(),
            args[1].type_name()
        ));
    };
    let elements: Vec<Value> = (*start..=*end).map(Value::Int).collect();
    Ok(Some(Value::array(elements)))
}

fn builtin_write(args: Vec<Value>) -> BuiltinResult {
    let parts: Vec<String> = args.iter().map(|arg| arg.inspect()).collect();
    println!("{}", parts.join(" "));
    Ok(None)
}

fn builtin_write_all(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments for 'write_all'. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            let parts: Vec<String> = elements.borrow().iter().map(|e| e.inspect()).collect();
            println!("{}", parts.join(", "));
            Ok(None)
        }
        Value::Struct(s) => {
            let parts: Vec<String> = s.borrow().attributes.values().map(|v| v.inspect()).collect();
            println!("{}", parts.join(", "));
            Ok(None)
        }
        other => Err(format!(
            "argument to 'write_all' must be ARRAY or STRUCT, got {}",
            other.type_name()
        )),
    }
}

fn builtin_write_string(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments for 'write_string'. got={}, want=1",
            args.len()
        ));
    }
    let Value::Array(elements) = &args[0] else {
        return Err(format!(
            "argument to 'write_string' must be ARRAY, got {}",
            args[0].type_name()
        ));
    };

    let mut text = String::new();
    for element in elements.borrow().iter() {
        match element {
            Value::Int(code) => {
                let c = u32::try_from(*code)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                text.push(c);
            }
            other => {
                return Err(format!(
                    "write_string array elements must be INTEGERS, got {}",
                    other.type_name()
                ));
            }
        }
    }
    println!("{}", text);
    Ok(None)
}

fn builtin_read(_args: Vec<Value>) -> BuiltinResult {
    // The trailing newline is preserved.
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("failed to read input: {}", e))?;
    Ok(Some(Value::string(line)))
}

fn builtin_read_all(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments for 'read_all'. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            let len = elements.borrow().len();
            for i in 0..len {
                print!("v[{}]: ", i);
                flush_stdout()?;
                let line = read_line()?;
                elements.borrow_mut()[i] = Value::Int(parse_input(&line));
            }
            Ok(None)
        }
        Value::Struct(s) => {
            let keys: Vec<String> = s.borrow().attributes.keys().cloned().collect();
            let type_name = s.borrow().name.clone();
            for key in keys {
                print!("struct {}\n{}: ", type_name, key);
                flush_stdout()?;
                let line = read_line()?;
                s.borrow_mut()
                    .attributes
                    .insert(key, Value::Int(parse_input(&line)));
            }
            Ok(None)
        }
        other => Err(format!(
            "argument to 'read_all' must be ARRAY or STRUCT, got {}",
            other.type_name()
        )),
    }
}

fn builtin_read_string(args: Vec<Value>) -> BuiltinResult {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments for 'read_string'. got={}, want=1",
            args.len()
        ));
    }
    let Value::Array(elements) = &args[0] else {
        return Err(format!(
            "argument to 'read_string' must be ARRAY, got {}",
            args[0].type_name()
        ));
    };

    let line = read_line()?;
    let line = line.strip_suffix('\n').unwrap_or(&line);

    let mut elements = elements.borrow_mut();
    let len = elements.len();
    let mut chars = line.chars();
    for slot in elements.iter_mut().take(len) {
        *slot = match chars.next() {
            Some(c) => Value::Int(c as i64),
            None => Value::Int(0),
        };
    }
    Ok(None)
}

// ===== Helpers =====

fn numeric_argument(value: &Value, what: &str) -> Result<f64, String> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(n) => Ok(*n),
        other => Err(format!(
            "{} must be INTEGER or FLOAT, got {}",
            what,
            other.type_name()
        )),
    }
}

fn read_line() -> Result<String, String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("failed to read input: {}", e))?;
    Ok(line)
}

fn flush_stdout() -> Result<(), String> {
    io::stdout().flush().map_err(|e| e.to_string())
}

/// Parse one line of user input as an integer; anything unparsable is 0.
fn parse_input(line: &str) -> i64 {
    line.trim().parse::<i64>().unwrap_or(0)
}

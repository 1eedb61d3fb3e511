//! The built-in native function library and the VM's native registry.
//!
//! A native has the shape `fn(&[Value], &mut dyn PrintWriter) -> Value`: it
//! receives the argument window copied out of the registers plus the
//! session's print writer, and returns exactly one value. Natives never halt
//! the VM; arity or type mismatches simply return `Null`. Returned strings
//! and lists are owned by the caller register.
//!
//! Lists and files are shared handles, so `append(xs, v)` mutates the list
//! seen by every register aliasing it, and returns the same handle.

use std::{
    fs::OpenOptions,
    io::{Read as _, Seek as _, SeekFrom, Write as _},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{io::PrintWriter, value::Value};

/// A host function callable through `CALL_NATIVE`.
pub type NativeFn = fn(args: &[Value], io: &mut dyn PrintWriter) -> Value;

/// Registry capacity; registration fails once it is full.
pub const MAX_NATIVES: usize = 64;

/// Name → function registry. Lookup is a linear scan; re-registering an
/// existing name updates it in place. Names are borrowed, never owned.
#[derive(Debug, Default)]
pub struct NativeRegistry {
    entries: Vec<(&'static str, NativeFn)>,
}

impl NativeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` under `name`. Returns `false` when the registry is
    /// full.
    pub fn register(&mut self, name: &'static str, func: NativeFn) -> bool {
        for entry in &mut self.entries {
            if entry.0 == name {
                entry.1 = func;
                return true;
            }
        }
        if self.entries.len() >= MAX_NATIVES {
            return false;
        }
        self.entries.push((name, func));
        true
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<NativeFn> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every native the runtime registers by default. The compiler pre-registers
/// these names in its function table with the native sentinel address.
pub const NATIVE_NAMES: &[&str] = &[
    "print",
    "split",
    "join",
    "substring",
    "replace",
    "to_upper",
    "to_lower",
    "len",
    "append",
    "pop",
    "insert",
    "remove",
    "sqrt",
    "pow",
    "sin",
    "cos",
    "tan",
    "log",
    "abs",
    "int",
    "float",
    "str",
    "bool",
    "open",
    "read",
    "write",
    "close",
    "exit",
    "time",
    "type",
    "range",
    "enumerate",
];

#[must_use]
pub fn is_native_name(name: &str) -> bool {
    NATIVE_NAMES.contains(&name)
}

/// Fills `registry` with the default library.
pub fn register_defaults(registry: &mut NativeRegistry) {
    registry.register("print", native_print);
    registry.register("split", native_split);
    registry.register("join", native_join);
    registry.register("substring", native_substring);
    registry.register("replace", native_replace);
    registry.register("to_upper", native_to_upper);
    registry.register("to_lower", native_to_lower);
    registry.register("len", native_len);
    registry.register("append", native_append);
    registry.register("pop", native_pop);
    registry.register("insert", native_insert);
    registry.register("remove", native_remove);
    registry.register("sqrt", native_sqrt);
    registry.register("pow", native_pow);
    registry.register("sin", native_sin);
    registry.register("cos", native_cos);
    registry.register("tan", native_tan);
    registry.register("log", native_log);
    registry.register("abs", native_abs);
    registry.register("int", native_int);
    registry.register("float", native_float);
    registry.register("str", native_str);
    registry.register("bool", native_bool);
    registry.register("open", native_open);
    registry.register("read", native_read);
    registry.register("write", native_write);
    registry.register("close", native_close);
    registry.register("exit", native_exit);
    registry.register("time", native_time);
    registry.register("type", native_type);
    registry.register("range", native_range);
    registry.register("enumerate", native_enumerate);
}

// ---- output ----

fn native_print(args: &[Value], io: &mut dyn PrintWriter) -> Value {
    for (i, arg) in args.iter().enumerate() {
        io.write_str(&arg.to_string());
        if i + 1 < args.len() {
            io.push_char(' ');
        }
    }
    io.push_char('\n');
    Value::Null
}

// ---- strings ----

fn native_split(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(Value::Str(s)), Some(Value::Str(delim))) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    if delim.is_empty() {
        return Value::list(vec![Value::Str(s.clone())]);
    }
    // Any byte of the delimiter splits, and empty pieces are dropped.
    let pieces = s
        .split(|c: char| delim.contains(c))
        .filter(|piece| !piece.is_empty())
        .map(Value::str)
        .collect();
    Value::list(pieces)
}

fn native_join(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(Value::List(list)), Some(Value::Str(delim))) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    let joined = list
        .borrow()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(delim);
    Value::str(&joined)
}

fn native_substring(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(Value::Str(s)), Some(Value::Int(start)), Some(Value::Int(length))) =
        (args.first(), args.get(1), args.get(2))
    else {
        return Value::Null;
    };
    let bytes = s.as_bytes();
    let start = (*start).max(0) as usize;
    if start >= bytes.len() {
        return Value::str("");
    }
    let available = bytes.len() - start;
    let length = (*length).max(0) as usize;
    let length = length.min(available);
    Value::str(&String::from_utf8_lossy(&bytes[start..start + length]))
}

fn native_replace(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(Value::Str(s)), Some(Value::Str(from)), Some(Value::Str(to))) =
        (args.first(), args.get(1), args.get(2))
    else {
        return Value::Null;
    };
    if from.is_empty() {
        return Value::Str(s.clone());
    }
    Value::str(&s.replace(&**from, to))
}

fn native_to_upper(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    match args.first() {
        Some(Value::Str(s)) => Value::str(&s.to_ascii_uppercase()),
        _ => Value::Null,
    }
}

fn native_to_lower(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    match args.first() {
        Some(Value::Str(s)) => Value::str(&s.to_ascii_lowercase()),
        _ => Value::Null,
    }
}

// ---- lists ----

fn native_len(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let n = match args.first() {
        Some(Value::Str(s)) => s.len() as i64,
        Some(Value::List(list)) => list.borrow().len() as i64,
        _ => 0,
    };
    Value::Int(n)
}

fn native_append(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(list_value), Some(item)) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    let Value::List(list) = list_value else {
        return Value::Null;
    };
    list.borrow_mut().push(item.clone());
    list_value.clone()
}

fn native_pop(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    match args.first() {
        Some(Value::List(list)) => list.borrow_mut().pop().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn native_insert(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(list_value), Some(Value::Int(index)), Some(item)) = (args.first(), args.get(1), args.get(2)) else {
        return Value::Null;
    };
    let Value::List(list) = list_value else {
        return Value::Null;
    };
    {
        let mut items = list.borrow_mut();
        let index = (*index).max(0) as usize;
        let index = index.min(items.len());
        items.insert(index, item.clone());
    }
    list_value.clone()
}

fn native_remove(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(list_value), Some(needle)) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    let Value::List(list) = list_value else {
        return Value::Null;
    };
    {
        let mut items = list.borrow_mut();
        if let Some(at) = items.iter().position(|item| item.structurally_equals(needle)) {
            items.remove(at);
        }
    }
    list_value.clone()
}

// ---- math ----

fn arg_f64(args: &[Value], index: usize) -> f64 {
    args.get(index).and_then(Value::as_f64).unwrap_or(0.0)
}

fn native_sqrt(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if args.is_empty() {
        return Value::Null;
    }
    Value::Float(arg_f64(args, 0).sqrt())
}

fn native_pow(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if args.len() < 2 {
        return Value::Null;
    }
    Value::Float(arg_f64(args, 0).powf(arg_f64(args, 1)))
}

fn native_sin(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if args.is_empty() {
        return Value::Null;
    }
    Value::Float(arg_f64(args, 0).sin())
}

fn native_cos(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if args.is_empty() {
        return Value::Null;
    }
    Value::Float(arg_f64(args, 0).cos())
}

fn native_tan(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if args.is_empty() {
        return Value::Null;
    }
    Value::Float(arg_f64(args, 0).tan())
}

fn native_log(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if args.is_empty() {
        return Value::Null;
    }
    Value::Float(arg_f64(args, 0).ln())
}

fn native_abs(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    match args.first() {
        Some(Value::Int(n)) => Value::Int(n.wrapping_abs()),
        Some(Value::Float(f)) => Value::Float(f.abs()),
        _ => Value::Null,
    }
}

// ---- conversions ----

/// Leading-integer parse: optional sign and a digit prefix, 0 otherwise.
fn parse_leading_int(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1i64, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return 0;
    }
    match digits.parse::<i64>() {
        Ok(n) => sign * n,
        Err(_) => {
            if sign < 0 {
                i64::MIN
            } else {
                i64::MAX
            }
        }
    }
}

/// Leading-float parse: the longest numeric prefix, 0.0 otherwise.
fn parse_leading_float(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let mut seen_digit = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        seen_digit = true;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            seen_digit = true;
        }
    }
    if seen_digit && end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    if !seen_digit {
        return 0.0;
    }
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

fn native_int(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let n = match args.first() {
        Some(Value::Int(n)) => *n,
        Some(Value::Float(f)) => *f as i64,
        Some(Value::Bool(b)) => i64::from(*b),
        Some(Value::Str(s)) => parse_leading_int(s),
        Some(_) => 0,
        None => return Value::Null,
    };
    Value::Int(n)
}

fn native_float(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let f = match args.first() {
        Some(Value::Int(n)) => *n as f64,
        Some(Value::Float(f)) => *f,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Str(s)) => parse_leading_float(s),
        Some(_) => 0.0,
        None => return Value::Null,
    };
    Value::Float(f)
}

fn native_str(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    match args.first() {
        Some(value) => Value::str(&value.to_string()),
        None => Value::Null,
    }
}

fn native_bool(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let b = match args.first() {
        Some(Value::Int(n)) => *n != 0,
        Some(Value::Float(f)) => *f != 0.0,
        Some(Value::Bool(b)) => *b,
        Some(Value::Str(s)) => !s.is_empty(),
        Some(Value::Null) => false,
        Some(_) => true,
        None => return Value::Null,
    };
    Value::Bool(b)
}

// ---- files ----

fn native_open(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(Value::Str(path)), Some(Value::Str(mode))) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    let mut options = OpenOptions::new();
    let plus = mode.contains('+');
    match mode.as_bytes().first() {
        Some(b'r') => {
            options.read(true);
            if plus {
                options.write(true);
            }
        }
        Some(b'w') => {
            options.write(true).create(true).truncate(true);
            if plus {
                options.read(true);
            }
        }
        Some(b'a') => {
            options.append(true).create(true);
            if plus {
                options.read(true);
            }
        }
        _ => return Value::Null,
    }
    match options.open(&**path) {
        Ok(file) => Value::File(std::rc::Rc::new(std::cell::RefCell::new(Some(file)))),
        Err(_) => Value::Null,
    }
}

fn native_read(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let Some(Value::File(handle)) = args.first() else {
        return Value::Null;
    };
    let mut slot = handle.borrow_mut();
    let Some(file) = slot.as_mut() else {
        return Value::Null;
    };
    // Whole-file read from the start, regardless of the current position.
    if file.seek(SeekFrom::Start(0)).is_err() {
        return Value::Null;
    }
    let mut bytes = Vec::new();
    match file.read_to_end(&mut bytes) {
        Ok(_) => Value::str(&String::from_utf8_lossy(&bytes)),
        Err(_) => Value::Null,
    }
}

fn native_write(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let (Some(Value::File(handle)), Some(Value::Str(text))) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    let mut slot = handle.borrow_mut();
    let Some(file) = slot.as_mut() else {
        return Value::Null;
    };
    let _ = file.write_all(text.as_bytes());
    Value::Int(text.len() as i64)
}

fn native_close(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    if let Some(Value::File(handle)) = args.first() {
        handle.borrow_mut().take();
    }
    Value::Null
}

// ---- system ----

fn native_exit(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let code = args.first().and_then(Value::as_int).unwrap_or(0);
    std::process::exit(code as i32);
}

fn native_time(_args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Value::Float(seconds)
}

// ---- misc ----

fn native_type(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    match args.first() {
        Some(value) => Value::str(value.kind_name()),
        None => Value::str("null"),
    }
}

fn native_range(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let start = args.first().and_then(Value::as_int).unwrap_or(0);
    let end = args.get(1).and_then(Value::as_int).unwrap_or(0);
    let mut step = args.get(2).and_then(Value::as_int).unwrap_or(1);
    if step == 0 {
        step = 1;
    }
    let mut items = Vec::new();
    let mut i = start;
    while if step > 0 { i < end } else { i > end } {
        items.push(Value::Int(i));
        i += step;
    }
    Value::list(items)
}

fn native_enumerate(args: &[Value], _io: &mut dyn PrintWriter) -> Value {
    let Some(Value::List(list)) = args.first() else {
        return Value::Null;
    };
    let pairs = list
        .borrow()
        .iter()
        .enumerate()
        .map(|(i, item)| Value::list(vec![Value::Int(i as i64), item.clone()]))
        .collect();
    Value::list(pairs)
}

//! Runtime values held in registers, frames, lists, and object properties.

use std::{cell::RefCell, fmt, fs::File, rc::Rc};

use crate::vm::object::ObjectId;

/// Shared storage for list values.
///
/// Lists are handles: copying a value into another register aliases the same
/// storage, so a native mutating a list through one register copy is visible
/// through every other.
pub type ListHandle = Rc<RefCell<Vec<Value>>>;

/// Shared storage for open file values. `None` after `close`.
pub type FileHandle = Rc<RefCell<Option<File>>>;

/// A runtime value.
///
/// Primitives are stored inline. Strings are shared immutable buffers; lists
/// and files are shared mutable handles; objects are indices into the VM's
/// object pool, which owns their refcounts.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    List(ListHandle),
    File(FileHandle),
    Object(ObjectId),
}

impl Value {
    /// Builds a fresh list value from items.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    /// The kind name reported by the `type` native.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::File(_) => "file",
            Self::Object(_) => "object",
        }
    }

    /// Numeric coercion used by the math natives: ints and floats convert,
    /// everything else is `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Structural equality: primitives by value, strings by content, lists
    /// and files by handle identity, objects by id.
    #[must_use]
    pub fn structurally_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::File(a), Self::File(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality; see [`Value::structurally_equals`].
    fn eq(&self, other: &Self) -> bool {
        self.structurally_equals(other)
    }
}

impl fmt::Display for Value {
    /// The `str(...)` rendering: floats use the shortest round-trip form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => f.write_str(ryu::Buffer::new().format(*x)),
            Self::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Self::Str(s) => f.write_str(s),
            Self::List(_) => f.write_str("[list]"),
            Self::File(_) => f.write_str("[file]"),
            Self::Object(_) => f.write_str("[object]"),
        }
    }
}

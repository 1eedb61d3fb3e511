//! OSFL: a small dynamically-typed scripting language, implemented as a
//! strictly linear compile-and-execute pipeline.
//!
//! Source text flows one way through the stages, each consuming the previous
//! stage's output wholesale:
//!
//! 1. [`lexer`]: bytes to tokens, with string interpolation, docstrings,
//!    regex literals, and multi-radix numerics.
//! 2. [`parser`]: tokens to an AST, recursive descent with full operator
//!    precedence and error recovery.
//! 3. [`semantic`]: a light scope-population pre-pass with an error count.
//! 4. [`compiler`]: AST to register-allocated instructions plus string and
//!    float constant pools.
//! 5. [`vm`]: a 16-register virtual machine with call frames, a refcounted
//!    object pool, a cooperative coroutine table, and a native-function
//!    registry.
//!
//! The easiest way in is [`Session`]:
//!
//! ```
//! use osfl::{Session, Value};
//!
//! let session = Session::default();
//! let vm = session
//!     .run_source("frame Main { func main() { return 40 + 2; } }", "demo.osfl")
//!     .unwrap();
//! assert_eq!(vm.register(2), Some(&Value::Int(42)));
//! ```

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod io;
pub mod lexer;
pub mod location;
pub mod natives;
pub mod parser;
pub mod run;
pub mod semantic;
pub mod symbol;
pub mod token;
pub mod tracer;
pub mod value;
pub mod vm;

pub use crate::{
    ast::{AstNode, BinaryOp, LiteralValue, NodeKind, UnaryOp},
    bytecode::{Bytecode, Instruction, Opcode},
    compiler::{CompiledProgram, Compiler, FunctionEntry, FunctionTable},
    error::{Diagnostic, ErrorKind, OsflError},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    lexer::{LexError, LexErrorKind, Lexer, LexerConfig},
    location::SourceLocation,
    natives::{NativeFn, NativeRegistry},
    parser::Parser,
    run::{Config, Session},
    semantic::{SemanticReport, analyze},
    token::{Token, TokenKind, TokenValue},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    value::Value,
    vm::{MAX_CALL_DEPTH, MAX_COROUTINES, REGISTER_COUNT, RuntimeError, RuntimeErrorKind, Vm},
};

/// Crate version, reported by `osfl --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

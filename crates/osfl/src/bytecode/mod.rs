//! The in-memory bytecode representation.
//!
//! Instructions are a fixed five-field shape (opcode plus four `i32`
//! operands). A [`Bytecode`] owns the instruction list and two constant
//! pools: interned strings (used by `LOAD_CONST_STR` and `CALL_NATIVE`) and
//! floats (used by `LOAD_CONST_FLOAT`). Nothing here is persisted; there is
//! no serialized format.

pub use code::{Bytecode, Instruction};
pub use op::Opcode;

mod code;
mod op;

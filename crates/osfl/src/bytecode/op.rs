//! Opcode definitions.

use strum::Display;

/// Every opcode the VM executes.
///
/// Operand positions are fixed per opcode; see the dispatch loop in
/// [`crate::vm`] for the exact semantics of `op1..op4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Nop,
    /// `R[op1] <- Int(op2)`. Also used for booleans (1/0).
    LoadConst,
    /// `R[op1] <- Float(float_pool[op2])`.
    LoadConstFloat,
    /// `R[op1] <- Str(string_pool[op2])`.
    LoadConstStr,
    Move,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Jump,
    JumpIfZero,
    /// Call a bytecode function at `op1`; `op2` carries the callee frame's
    /// local slot count (0 means the historical default of 8).
    Call,
    /// `R[op1] <- native(string_pool[op2])(R[op4..op4+op3])`.
    CallNative,
    Ret,
    Halt,
    NewObj,
    SetProp,
    GetProp,
    CoroInit,
    CoroYield,
    CoroResume,
}

//! The register-based virtual machine.
//!
//! Sixteen general-purpose registers, a call stack of frames, an object
//! pool, a cooperative coroutine table, and a native-function registry. The
//! dispatch loop runs one instruction at a time: most opcodes advance the
//! program counter by one; jumps, calls, returns, and coroutine switches set
//! it explicitly.
//!
//! Registers are not windowed across calls. Callers and callees share the
//! one register file; the compiler places arguments into low registers with
//! `MOVE` and assumes nothing is preserved across a `CALL`.
//!
//! The VM does not throw. A fatal condition (bad register, bad jump target,
//! bad pool index, type mismatch, unknown native, stack overflow, division
//! by zero) records a [`RuntimeError`] and stops the dispatch loop.

pub mod object;

use std::fmt::{self, Write as _};

use smallvec::SmallVec;
use strum::Display;

use crate::{
    bytecode::{Bytecode, Instruction, Opcode},
    io::PrintWriter,
    natives::{NativeFn, NativeRegistry},
    tracer::{NoopTracer, VmTracer},
    value::Value,
};
use object::{ObjectId, ObjectPool};

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 16;
/// Maximum call depth.
pub const MAX_CALL_DEPTH: usize = 1024;
/// Number of coroutine slots.
pub const MAX_COROUTINES: usize = 64;
/// Frame local count used when `CALL` does not carry one.
pub const DEFAULT_FRAME_LOCALS: usize = 8;

/// Why the VM halted abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RuntimeErrorKind {
    InvalidRegister,
    InvalidJumpTarget,
    InvalidCallTarget,
    InvalidConstant,
    TypeMismatch,
    DivisionByZero,
    UnknownNative,
    StackOverflow,
    InvalidObject,
    InvalidCoroutine,
}

/// A fatal runtime error: the kind, a message, and the pc of the
/// instruction that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub pc: usize,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// One call-stack entry: the callee's locals, a link to the caller's frame,
/// and where to resume after `RET`.
///
/// The parent link records nesting; lookups never walk it.
#[derive(Debug)]
pub struct CallFrame {
    locals: Vec<Value>,
    parent: Option<usize>,
    return_address: usize,
}

impl CallFrame {
    #[must_use]
    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub fn return_address(&self) -> usize {
        self.return_address
    }
}

/// One coroutine slot: the resume pc, a register-file snapshot, the frame
/// the coroutine last ran in, and the active flag.
#[derive(Debug)]
struct CoroSlot {
    active: bool,
    pc: usize,
    registers: [Value; REGISTER_COUNT],
    frame: Option<usize>,
}

impl CoroSlot {
    fn inactive() -> Self {
        Self {
            active: false,
            pc: 0,
            registers: fresh_registers(),
            frame: None,
        }
    }
}

fn fresh_registers() -> [Value; REGISTER_COUNT] {
    std::array::from_fn(|_| Value::Null)
}

/// The virtual machine.
#[derive(Debug)]
pub struct Vm {
    code: Bytecode,
    registers: [Value; REGISTER_COUNT],
    pc: usize,
    frames: Vec<CallFrame>,
    objects: ObjectPool,
    coroutines: Vec<CoroSlot>,
    current_coro: usize,
    natives: NativeRegistry,
    running: bool,
    error: Option<RuntimeError>,
}

impl Vm {
    /// Builds a VM over compiled bytecode. All registers start as `Null`;
    /// coroutine slot 0 is the implicit main coroutine and starts active.
    #[must_use]
    pub fn new(code: Bytecode) -> Self {
        let mut coroutines: Vec<CoroSlot> = (0..MAX_COROUTINES).map(|_| CoroSlot::inactive()).collect();
        coroutines[0].active = true;
        Self {
            code,
            registers: fresh_registers(),
            pc: 0,
            frames: Vec::new(),
            objects: ObjectPool::new(),
            coroutines,
            current_coro: 0,
            natives: NativeRegistry::new(),
            running: true,
            error: None,
        }
    }

    // ---- public surface ----

    /// Registers a native function. Returns `false` when the registry is
    /// full; re-registering an existing name updates it in place.
    pub fn register_native(&mut self, name: &'static str, func: NativeFn) -> bool {
        self.natives.register(name, func)
    }

    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Invokes a registered native by name. `None` when the name is unknown.
    pub fn call_native(&mut self, name: &str, args: &[Value], print: &mut dyn PrintWriter) -> Option<Value> {
        let func = self.natives.lookup(name)?;
        let result = func(args, print);
        if let Value::Object(id) = &result {
            // An object return transfers a +1 refcount to the caller.
            self.objects.retain(*id);
        }
        Some(result)
    }

    /// Runs until `HALT`, the end of the instruction stream, or a fatal
    /// runtime error.
    pub fn run(&mut self, print: &mut dyn PrintWriter) -> Result<(), RuntimeError> {
        self.run_traced(print, &mut NoopTracer)
    }

    /// [`run`](Self::run), reporting execution events to `tracer`.
    pub fn run_traced(&mut self, print: &mut dyn PrintWriter, tracer: &mut dyn VmTracer) -> Result<(), RuntimeError> {
        while self.running && self.pc < self.code.len() {
            let instruction = self.code.instructions()[self.pc];
            tracer.on_instruction(self.pc, &instruction);
            if let Err(error) = self.execute(instruction, print, tracer) {
                tracer.on_error(&error);
                self.running = false;
                self.error = Some(error.clone());
                return Err(error);
            }
        }
        tracer.on_halt(self.pc);
        Ok(())
    }

    #[must_use]
    pub fn register(&self, index: usize) -> Option<&Value> {
        self.registers.get(index)
    }

    #[must_use]
    pub fn registers(&self) -> &[Value] {
        &self.registers
    }

    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    #[must_use]
    pub fn objects(&self) -> &ObjectPool {
        &self.objects
    }

    #[must_use]
    pub fn code(&self) -> &Bytecode {
        &self.code
    }

    #[must_use]
    pub fn current_coroutine(&self) -> usize {
        self.current_coro
    }

    /// The call-frame index recorded for `slot` when it last yielded.
    #[must_use]
    pub fn coroutine_frame(&self, slot: usize) -> Option<usize> {
        self.coroutines.get(slot).and_then(|s| s.frame)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    /// Renders every register, one per line, for debugging.
    #[must_use]
    pub fn dump_registers(&self) -> String {
        let mut out = String::new();
        for (i, value) in self.registers.iter().enumerate() {
            let _ = writeln!(out, "R{i}: {}", self.describe(value));
        }
        out
    }

    fn describe(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_owned(),
            Value::Int(n) => format!("INT({n})"),
            Value::Float(f) => format!("FLOAT({})", ryu::Buffer::new().format(*f)),
            Value::Bool(b) => format!("BOOL({b})"),
            Value::Str(s) => format!("STRING({s})"),
            Value::List(list) => format!("LIST({} items)", list.borrow().len()),
            Value::File(_) => "FILE".to_owned(),
            Value::Object(id) => {
                let refcount = self.objects.refcount(*id).unwrap_or(0);
                format!("OBJ(#{}, rc={refcount})", id.index())
            }
        }
    }

    // ---- dispatch ----

    fn fail(&self, kind: RuntimeErrorKind, message: String) -> RuntimeError {
        RuntimeError {
            kind,
            message,
            pc: self.pc,
        }
    }

    fn reg_index(&self, operand: i32) -> Result<usize, RuntimeError> {
        if (0..REGISTER_COUNT as i32).contains(&operand) {
            Ok(operand as usize)
        } else {
            Err(self.fail(
                RuntimeErrorKind::InvalidRegister,
                format!("Invalid register index {operand}"),
            ))
        }
    }

    fn int_operand(&self, operand: i32, op: Opcode) -> Result<i64, RuntimeError> {
        let index = self.reg_index(operand)?;
        match &self.registers[index] {
            Value::Int(n) => Ok(*n),
            other => Err(self.fail(
                RuntimeErrorKind::TypeMismatch,
                format!("{op} requires an int register, got {}", other.kind_name()),
            )),
        }
    }

    fn jump_target(&self, operand: i32, op: Opcode) -> Result<usize, RuntimeError> {
        if operand >= 0 && (operand as usize) < self.code.len() {
            Ok(operand as usize)
        } else {
            Err(self.fail(
                RuntimeErrorKind::InvalidJumpTarget,
                format!("{op}: target {operand} out of range"),
            ))
        }
    }

    fn execute(
        &mut self,
        instruction: Instruction,
        print: &mut dyn PrintWriter,
        tracer: &mut dyn VmTracer,
    ) -> Result<(), RuntimeError> {
        let Instruction { opcode, op1, op2, op3, op4 } = instruction;
        match opcode {
            Opcode::Nop => self.pc += 1,
            Opcode::LoadConst => {
                let r = self.reg_index(op1)?;
                self.registers[r] = Value::Int(i64::from(op2));
                self.pc += 1;
            }
            Opcode::LoadConstFloat => {
                let r = self.reg_index(op1)?;
                let value = usize::try_from(op2).ok().and_then(|i| self.code.float(i)).ok_or_else(|| {
                    self.fail(
                        RuntimeErrorKind::InvalidConstant,
                        format!("{opcode}: float pool index {op2} out of range"),
                    )
                })?;
                self.registers[r] = Value::Float(value);
                self.pc += 1;
            }
            Opcode::LoadConstStr => {
                let r = self.reg_index(op1)?;
                let value = usize::try_from(op2)
                    .ok()
                    .and_then(|i| self.code.string(i))
                    .cloned()
                    .ok_or_else(|| {
                        self.fail(
                            RuntimeErrorKind::InvalidConstant,
                            format!("{opcode}: constant pool index {op2} out of range"),
                        )
                    })?;
                self.registers[r] = Value::Str(value);
                self.pc += 1;
            }
            Opcode::Move => {
                let dest = self.reg_index(op1)?;
                let src = self.reg_index(op2)?;
                self.registers[dest] = self.registers[src].clone();
                self.pc += 1;
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let dest = self.reg_index(op1)?;
                let a = self.int_operand(op2, opcode)?;
                let b = self.int_operand(op3, opcode)?;
                let result = match opcode {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Sub => a.wrapping_sub(b),
                    Opcode::Mul => a.wrapping_mul(b),
                    _ => {
                        if b == 0 {
                            return Err(self.fail(RuntimeErrorKind::DivisionByZero, "Division by zero".to_owned()));
                        }
                        a.wrapping_div(b)
                    }
                };
                self.registers[dest] = Value::Int(result);
                self.pc += 1;
            }
            Opcode::Eq | Opcode::Neq => {
                let dest = self.reg_index(op1)?;
                let a = self.int_operand(op2, opcode)?;
                let b = self.int_operand(op3, opcode)?;
                let equal = a == b;
                let result = if opcode == Opcode::Eq { equal } else { !equal };
                self.registers[dest] = Value::Int(i64::from(result));
                self.pc += 1;
            }
            Opcode::Jump => {
                self.pc = self.jump_target(op1, opcode)?;
            }
            Opcode::JumpIfZero => {
                let cond = self.int_operand(op2, opcode)?;
                if cond == 0 {
                    self.pc = self.jump_target(op1, opcode)?;
                } else {
                    self.pc += 1;
                }
            }
            Opcode::Call => {
                let target = op1;
                if target < 0 || (target as usize) >= self.code.len() {
                    return Err(self.fail(
                        RuntimeErrorKind::InvalidCallTarget,
                        format!("{opcode}: function addr {target} out of range"),
                    ));
                }
                if self.frames.len() >= MAX_CALL_DEPTH {
                    return Err(self.fail(RuntimeErrorKind::StackOverflow, "Call stack overflow".to_owned()));
                }
                let local_count = if op2 > 0 { op2 as usize } else { DEFAULT_FRAME_LOCALS };
                let parent = self.frames.len().checked_sub(1);
                self.frames.push(CallFrame {
                    locals: vec![Value::Null; local_count],
                    parent,
                    return_address: self.pc + 1,
                });
                self.pc = target as usize;
            }
            Opcode::CallNative => {
                let dest = self.reg_index(op1)?;
                let name = usize::try_from(op2)
                    .ok()
                    .and_then(|i| self.code.string(i))
                    .cloned()
                    .ok_or_else(|| {
                        self.fail(
                            RuntimeErrorKind::InvalidConstant,
                            format!("{opcode}: constant pool index {op2} out of range"),
                        )
                    })?;
                let argc = op3.max(0) as usize;
                let base = op4;
                let mut args: SmallVec<[Value; 8]> = SmallVec::new();
                for i in 0..argc {
                    let index = self.reg_index(base + i as i32)?;
                    args.push(self.registers[index].clone());
                }
                tracer.on_native_call(&name, argc);
                let func = self.natives.lookup(&name).ok_or_else(|| {
                    self.fail(
                        RuntimeErrorKind::UnknownNative,
                        format!("Unknown native function '{name}'"),
                    )
                })?;
                let result = func(&args, print);
                if let Value::Object(id) = &result {
                    self.objects.retain(*id);
                }
                self.registers[dest] = result;
                self.pc += 1;
            }
            Opcode::Ret => {
                match self.frames.pop() {
                    // No caller frame exists (e.g. main returned): halt.
                    None => self.running = false,
                    Some(frame) => self.pc = frame.return_address,
                }
            }
            Opcode::Halt => self.running = false,
            Opcode::NewObj => {
                let dest = self.reg_index(op1)?;
                let id = self.objects.create();
                self.registers[dest] = Value::Object(id);
                self.pc += 1;
            }
            Opcode::SetProp => {
                let object_id = self.object_operand(op1, opcode)?;
                let key = self.int_operand(op2, opcode)?;
                let value_index = self.reg_index(op3)?;
                let value = self.registers[value_index].clone();
                let object = self.objects.get_mut(object_id).ok_or_else(|| {
                    RuntimeError {
                        kind: RuntimeErrorKind::InvalidObject,
                        message: format!("{opcode}: object #{} is not live", object_id.index()),
                        pc: self.pc,
                    }
                })?;
                object.set_property(&key.to_string(), value);
                self.pc += 1;
            }
            Opcode::GetProp => {
                let dest = self.reg_index(op1)?;
                let object_id = self.object_operand(op2, opcode)?;
                let key = self.int_operand(op3, opcode)?;
                let value = self
                    .objects
                    .get(object_id)
                    .and_then(|object| object.get_property(&key.to_string()).cloned())
                    .unwrap_or(Value::Null);
                self.registers[dest] = value;
                self.pc += 1;
            }
            Opcode::CoroInit => {
                let slot = self.coroutine_slot(op1, opcode)?;
                self.coroutines[slot] = CoroSlot {
                    active: true,
                    pc: 0,
                    registers: fresh_registers(),
                    frame: None,
                };
                self.pc += 1;
            }
            Opcode::CoroYield => {
                let current = self.current_coro;
                let mut next = current;
                // Round-robin scan; the current slot is found last, so a lone
                // coroutine resumes itself.
                for i in 1..=MAX_COROUTINES {
                    let candidate = (current + i) % MAX_COROUTINES;
                    if self.coroutines[candidate].active {
                        next = candidate;
                        break;
                    }
                }
                self.switch_to(next, tracer);
            }
            Opcode::CoroResume => {
                let slot = self.coroutine_slot(op1, opcode)?;
                if !self.coroutines[slot].active {
                    return Err(self.fail(
                        RuntimeErrorKind::InvalidCoroutine,
                        format!("{opcode}: coroutine {slot} is inactive"),
                    ));
                }
                self.switch_to(slot, tracer);
            }
        }
        Ok(())
    }

    fn object_operand(&self, operand: i32, op: Opcode) -> Result<ObjectId, RuntimeError> {
        let index = self.reg_index(operand)?;
        match &self.registers[index] {
            Value::Object(id) => Ok(*id),
            other => Err(self.fail(
                RuntimeErrorKind::TypeMismatch,
                format!("{op}: register {operand} is not an object, got {}", other.kind_name()),
            )),
        }
    }

    fn coroutine_slot(&self, operand: i32, op: Opcode) -> Result<usize, RuntimeError> {
        if operand >= 0 && (operand as usize) < MAX_COROUTINES {
            Ok(operand as usize)
        } else {
            Err(self.fail(
                RuntimeErrorKind::InvalidCoroutine,
                format!("{op}: coroutine index {operand} out of range"),
            ))
        }
    }

    /// Saves the current coroutine's context (resume pc, register snapshot,
    /// frame reference) and restores `target`'s. The register file is
    /// swapped atomically, so a yielded coroutine's registers survive until
    /// it is resumed.
    fn switch_to(&mut self, target: usize, tracer: &mut dyn VmTracer) {
        let current = self.current_coro;
        self.coroutines[current].pc = self.pc + 1;
        self.coroutines[current].frame = self.frames.len().checked_sub(1);
        std::mem::swap(&mut self.coroutines[current].registers, &mut self.registers);
        std::mem::swap(&mut self.coroutines[target].registers, &mut self.registers);
        self.current_coro = target;
        self.pc = self.coroutines[target].pc;
        tracer.on_coroutine_switch(current, target);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        io::{CollectStringPrint, NoPrint},
        natives,
        tracer::RecordingTracer,
    };

    fn vm_with(instructions: &[Instruction]) -> Vm {
        let mut code = Bytecode::new();
        for &inst in instructions {
            code.push(inst);
        }
        Vm::new(code)
    }

    fn run_ok(vm: &mut Vm) {
        vm.run(&mut NoPrint).expect("program should run to completion");
    }

    #[test]
    fn branch_taken_on_zero() {
        // LOAD_CONST R0,0; JUMP_IF_ZERO 4, R0; LOAD_CONST R1,999; HALT;
        // LOAD_CONST R1,123; HALT
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 0, 0),
            Instruction::new(Opcode::JumpIfZero, 4, 0, 0),
            Instruction::new(Opcode::LoadConst, 1, 999, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
            Instruction::new(Opcode::LoadConst, 1, 123, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.register(1), Some(&Value::Int(123)));
    }

    #[test]
    fn branch_falls_through_on_nonzero() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 7, 0),
            Instruction::new(Opcode::JumpIfZero, 4, 0, 0),
            Instruction::new(Opcode::LoadConst, 1, 999, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
            Instruction::new(Opcode::LoadConst, 1, 123, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.register(1), Some(&Value::Int(999)));
    }

    #[test]
    fn call_and_return_restore_the_stack() {
        // LOAD_CONST R0,10; CALL 5; HALT; NOP; NOP; LOAD_CONST R0,99; RET
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 10, 0),
            Instruction::new(Opcode::Call, 5, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
            Instruction::new(Opcode::Nop, 0, 0, 0),
            Instruction::new(Opcode::Nop, 0, 0, 0),
            Instruction::new(Opcode::LoadConst, 0, 99, 0),
            Instruction::new(Opcode::Ret, 0, 0, 0),
        ]);
        let depth_before = vm.call_depth();
        run_ok(&mut vm);
        assert_eq!(vm.register(0), Some(&Value::Int(99)));
        assert_eq!(vm.call_depth(), depth_before);
    }

    #[test]
    fn call_sizes_the_frame_from_its_operand() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::Call, 2, 12, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        // Step one instruction by running; the callee halts immediately with
        // the frame still pushed.
        run_ok(&mut vm);
        assert_eq!(vm.call_depth(), 1);
        assert_eq!(vm.frames()[0].locals().len(), 12);
        assert!(vm.frames()[0].locals().iter().all(|v| matches!(v, Value::Null)));
        assert_eq!(vm.frames()[0].return_address(), 1);
    }

    #[test]
    fn call_defaults_to_eight_locals() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::Call, 2, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.frames()[0].locals().len(), DEFAULT_FRAME_LOCALS);
    }

    #[test]
    fn arithmetic_on_ints() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 10, 0),
            Instruction::new(Opcode::LoadConst, 1, 3, 0),
            Instruction::new(Opcode::Add, 2, 0, 1),
            Instruction::new(Opcode::Sub, 3, 0, 1),
            Instruction::new(Opcode::Mul, 4, 0, 1),
            Instruction::new(Opcode::Div, 5, 0, 1),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.register(2), Some(&Value::Int(13)));
        assert_eq!(vm.register(3), Some(&Value::Int(7)));
        assert_eq!(vm.register(4), Some(&Value::Int(30)));
        assert_eq!(vm.register(5), Some(&Value::Int(3)));
    }

    #[test]
    fn division_by_zero_halts_with_an_error() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 1, 0),
            Instruction::new(Opcode::LoadConst, 1, 0, 0),
            Instruction::new(Opcode::Div, 2, 0, 1),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(err.pc, 2);
        assert!(!vm.is_running());
        // No value was produced in the destination register.
        assert_eq!(vm.register(2), Some(&Value::Null));
    }

    #[test]
    fn arithmetic_type_mismatch_halts() {
        let mut code = Bytecode::new();
        let s = code.intern_str("not a number");
        code.push(Instruction::new(Opcode::LoadConstStr, 0, s as i32, 0));
        code.push(Instruction::new(Opcode::LoadConst, 1, 1, 0));
        code.push(Instruction::new(Opcode::Add, 2, 0, 1));
        let mut vm = Vm::new(code);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn eq_and_neq_produce_int_flags() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 5, 0),
            Instruction::new(Opcode::LoadConst, 1, 5, 0),
            Instruction::new(Opcode::Eq, 2, 0, 1),
            Instruction::new(Opcode::Neq, 3, 0, 1),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.register(2), Some(&Value::Int(1)));
        assert_eq!(vm.register(3), Some(&Value::Int(0)));
    }

    #[test]
    fn invalid_register_halts() {
        let mut vm = vm_with(&[Instruction::new(Opcode::LoadConst, 20, 1, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidRegister);
    }

    #[test]
    fn out_of_range_jump_halts() {
        let mut vm = vm_with(&[Instruction::new(Opcode::Jump, 99, 0, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidJumpTarget);
    }

    #[test]
    fn jump_if_zero_requires_an_int() {
        let mut vm = vm_with(&[Instruction::new(Opcode::JumpIfZero, 0, 0, 0)]);
        // R0 is Null.
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn ret_on_an_empty_stack_is_a_clean_halt() {
        let mut vm = vm_with(&[Instruction::new(Opcode::Ret, 0, 0, 0)]);
        run_ok(&mut vm);
        assert!(!vm.is_running());
        assert!(vm.last_error().is_none());
    }

    #[test]
    fn deep_recursion_overflows_the_call_stack() {
        let mut vm = vm_with(&[Instruction::new(Opcode::Call, 0, 0, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StackOverflow);
        assert_eq!(vm.call_depth(), MAX_CALL_DEPTH);
    }

    #[test]
    fn object_property_round_trip_keeps_the_object_live() {
        // NEWOBJ R0; key 5 in R2; value 42 in R3;
        // SETPROP R0,R2,R3; GETPROP R1,R0,R2; HALT
        let mut vm = vm_with(&[
            Instruction::new(Opcode::NewObj, 0, 0, 0),
            Instruction::new(Opcode::LoadConst, 2, 5, 0),
            Instruction::new(Opcode::LoadConst, 3, 42, 0),
            Instruction::new(Opcode::SetProp, 0, 2, 3),
            Instruction::new(Opcode::GetProp, 1, 0, 2),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.register(1), Some(&Value::Int(42)));
        assert_eq!(vm.objects().live_objects(), 1);
        let Some(Value::Object(id)) = vm.register(0).cloned() else {
            panic!("expected object in R0");
        };
        assert!(vm.objects().refcount(id).unwrap_or(0) >= 1);
    }

    #[test]
    fn getprop_miss_yields_null() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::NewObj, 0, 0, 0),
            Instruction::new(Opcode::LoadConst, 2, 99, 0),
            Instruction::new(Opcode::LoadConst, 1, 1, 0),
            Instruction::new(Opcode::GetProp, 1, 0, 2),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.register(1), Some(&Value::Null));
    }

    #[test]
    fn setprop_on_a_non_object_halts() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 1, 0),
            Instruction::new(Opcode::SetProp, 0, 0, 0),
        ]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn property_keys_are_formatted_decimal_ints() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::NewObj, 0, 0, 0),
            Instruction::new(Opcode::LoadConst, 2, -3, 0),
            Instruction::new(Opcode::LoadConst, 3, 7, 0),
            Instruction::new(Opcode::SetProp, 0, 2, 3),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        let Some(Value::Object(id)) = vm.register(0) else {
            panic!("expected object");
        };
        let object = vm.objects().get(*id).unwrap();
        assert_eq!(object.get_property("-3"), Some(&Value::Int(7)));
    }

    #[test]
    fn native_dispatch_copies_the_argument_window() {
        let mut code = Bytecode::new();
        let hello = code.intern_str("hello");
        let print = code.intern_str("print");
        code.push(Instruction::new(Opcode::LoadConstStr, 0, hello as i32, 0));
        code.push(Instruction::wide(Opcode::CallNative, 1, print as i32, 1, 0));
        code.push(Instruction::new(Opcode::Halt, 0, 0, 0));
        let mut vm = Vm::new(code);
        natives::register_defaults(vm.natives_mut());

        let mut out = CollectStringPrint::new();
        let mut tracer = RecordingTracer::new();
        vm.run_traced(&mut out, &mut tracer).unwrap();

        assert_eq!(out.output(), "hello\n");
        assert_eq!(tracer.native_calls(), vec![("print".to_owned(), 1)]);
        // print returns Null into the destination register.
        assert_eq!(vm.register(1), Some(&Value::Null));
    }

    #[test]
    fn unknown_native_halts() {
        let mut code = Bytecode::new();
        let name = code.intern_str("no_such_native");
        code.push(Instruction::wide(Opcode::CallNative, 0, name as i32, 0, 0));
        let mut vm = Vm::new(code);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UnknownNative);
    }

    #[test]
    fn call_native_out_of_range_pool_index_halts() {
        let mut vm = vm_with(&[Instruction::wide(Opcode::CallNative, 0, 5, 0, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidConstant);
    }

    #[test]
    fn registering_a_native_twice_updates_in_place() {
        let mut vm = vm_with(&[Instruction::new(Opcode::Halt, 0, 0, 0)]);
        fn one(_args: &[Value], _io: &mut dyn crate::io::PrintWriter) -> Value {
            Value::Int(1)
        }
        fn two(_args: &[Value], _io: &mut dyn crate::io::PrintWriter) -> Value {
            Value::Int(2)
        }
        assert!(vm.register_native("probe", one));
        assert!(vm.register_native("probe", two));
        let result = vm.call_native("probe", &[], &mut NoPrint);
        assert_eq!(result, Some(Value::Int(2)));
        assert_eq!(vm.call_native("missing", &[], &mut NoPrint), None);
    }

    #[test]
    fn yield_swaps_register_snapshots() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::CoroYield, 0, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        // Slot 1: active, resumes at the HALT, with its own R0.
        vm.coroutines[1].active = true;
        vm.coroutines[1].pc = 1;
        vm.coroutines[1].registers[0] = Value::Int(7);
        vm.registers[0] = Value::Int(99);

        let mut tracer = RecordingTracer::new();
        vm.run_traced(&mut NoPrint, &mut tracer).unwrap();

        assert_eq!(vm.current_coroutine(), 1);
        // The live register file is slot 1's snapshot.
        assert_eq!(vm.register(0), Some(&Value::Int(7)));
        // Slot 0's registers survived the switch, and it resumes after the yield.
        assert_eq!(vm.coroutines[0].registers[0], Value::Int(99));
        assert_eq!(vm.coroutines[0].pc, 1);
        assert_eq!(tracer.coroutine_switches(), vec![(0, 1)]);
    }

    #[test]
    fn lone_coroutine_yields_to_itself() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 42, 0),
            Instruction::new(Opcode::CoroYield, 0, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert_eq!(vm.current_coroutine(), 0);
        assert_eq!(vm.register(0), Some(&Value::Int(42)));
    }

    #[test]
    fn coro_init_activates_a_slot() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::CoroInit, 3, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        assert!(vm.coroutines[3].active);
        assert_eq!(vm.coroutines[3].pc, 0);
    }

    #[test]
    fn resume_of_an_inactive_slot_halts() {
        let mut vm = vm_with(&[Instruction::new(Opcode::CoroResume, 5, 0, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidCoroutine);
    }

    #[test]
    fn coro_init_out_of_range_halts() {
        let mut vm = vm_with(&[Instruction::new(Opcode::CoroInit, 64, 0, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidCoroutine);
    }

    #[test]
    fn resume_switches_directly_to_the_target() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::CoroResume, 2, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        vm.coroutines[2].active = true;
        vm.coroutines[2].pc = 2;
        run_ok(&mut vm);
        assert_eq!(vm.current_coroutine(), 2);
        // Slot 0 saved its resume point past the RESUME instruction.
        assert_eq!(vm.coroutines[0].pc, 1);
    }

    #[test]
    fn dump_registers_describes_each_slot() {
        let mut vm = vm_with(&[
            Instruction::new(Opcode::LoadConst, 0, 7, 0),
            Instruction::new(Opcode::Halt, 0, 0, 0),
        ]);
        run_ok(&mut vm);
        let dump = vm.dump_registers();
        assert!(dump.contains("R0: INT(7)"));
        assert!(dump.contains("R1: NULL"));
    }

    #[test]
    fn load_const_float_reads_the_float_pool() {
        let mut code = Bytecode::new();
        let idx = code.intern_float(2.75);
        code.push(Instruction::new(Opcode::LoadConstFloat, 0, idx as i32, 0));
        code.push(Instruction::new(Opcode::Halt, 0, 0, 0));
        let mut vm = Vm::new(code);
        run_ok(&mut vm);
        assert_eq!(vm.register(0), Some(&Value::Float(2.75)));
    }

    #[test]
    fn load_const_float_out_of_range_halts() {
        let mut vm = vm_with(&[Instruction::new(Opcode::LoadConstFloat, 0, 3, 0)]);
        let err = vm.run(&mut NoPrint).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidConstant);
    }
}

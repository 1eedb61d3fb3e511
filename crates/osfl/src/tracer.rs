//! Pluggable VM tracing.
//!
//! The VM reports instruction execution, native dispatch, coroutine
//! switches, and halts through a [`VmTracer`]. The default [`NoopTracer`]
//! costs nothing; [`StderrTracer`] backs `--debug`; [`RecordingTracer`]
//! captures events for assertions in tests.

use crate::{bytecode::Instruction, vm::RuntimeError};

/// Observer for VM execution events. Every hook has an empty default body.
pub trait VmTracer {
    fn on_instruction(&mut self, _pc: usize, _instruction: &Instruction) {}

    fn on_native_call(&mut self, _name: &str, _argc: usize) {}

    fn on_coroutine_switch(&mut self, _from: usize, _to: usize) {}

    fn on_halt(&mut self, _pc: usize) {}

    fn on_error(&mut self, _error: &RuntimeError) {}
}

/// Tracer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Tracer that narrates execution to stderr, used in debug mode.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, pc: usize, instruction: &Instruction) {
        eprintln!(
            "[vm] {pc:>4}: {} {} {} {} {}",
            instruction.opcode, instruction.op1, instruction.op2, instruction.op3, instruction.op4
        );
    }

    fn on_native_call(&mut self, name: &str, argc: usize) {
        eprintln!("[vm] native {name}/{argc}");
    }

    fn on_coroutine_switch(&mut self, from: usize, to: usize) {
        eprintln!("[vm] coroutine {from} -> {to}");
    }

    fn on_halt(&mut self, pc: usize) {
        eprintln!("[vm] halt at {pc}");
    }

    fn on_error(&mut self, error: &RuntimeError) {
        eprintln!("[vm] error at {}: {}", error.pc, error.message);
    }
}

/// One recorded execution event.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Instruction { pc: usize, opcode: String },
    NativeCall { name: String, argc: usize },
    CoroutineSwitch { from: usize, to: usize },
    Halted { pc: usize },
    Error { pc: usize, message: String },
}

/// Tracer that records every event, for tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The native calls seen, in order, as `(name, argc)` pairs.
    #[must_use]
    pub fn native_calls(&self) -> Vec<(String, usize)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::NativeCall { name, argc } => Some((name.clone(), *argc)),
                _ => None,
            })
            .collect()
    }

    /// The coroutine switches seen, in order, as `(from, to)` pairs.
    #[must_use]
    pub fn coroutine_switches(&self) -> Vec<(usize, usize)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::CoroutineSwitch { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, pc: usize, instruction: &Instruction) {
        self.events.push(TraceEvent::Instruction {
            pc,
            opcode: instruction.opcode.to_string(),
        });
    }

    fn on_native_call(&mut self, name: &str, argc: usize) {
        self.events.push(TraceEvent::NativeCall {
            name: name.to_owned(),
            argc,
        });
    }

    fn on_coroutine_switch(&mut self, from: usize, to: usize) {
        self.events.push(TraceEvent::CoroutineSwitch { from, to });
    }

    fn on_halt(&mut self, pc: usize) {
        self.events.push(TraceEvent::Halted { pc });
    }

    fn on_error(&mut self, error: &RuntimeError) {
        self.events.push(TraceEvent::Error {
            pc: error.pc,
            message: error.message.clone(),
        });
    }
}

//! The bytecode compiler: AST in, instructions and constant pools out.
//!
//! Register allocation is a naive monotonic counter. Every function body
//! compiles in a child scope with its parameters bound to registers
//! `0..param_count`; the caller places arguments into those registers with
//! `MOVE` instructions before the `CALL`. Conditionals and loops use
//! back-patched jumps.
//!
//! Calls resolve through the function table first; anything else is compiled
//! as a native call: the arguments are moved into consecutive registers, the
//! callee name is interned into the constant pool, and a `CALL_NATIVE`
//! carries the destination, the name index, the argument count, and the base
//! register.
//!
//! The compiler never fails: problems are reported as diagnostics and
//! compilation continues, leaving a `NOP` hole or a dummy register behind.

use ahash::AHashMap;

use crate::{
    ast::{AstNode, BinaryOp, LiteralValue, NodeKind, UnaryOp},
    bytecode::{Bytecode, Instruction, Opcode},
    error::Diagnostic,
    natives,
    symbol::{ScopeStack, SymbolKind},
    vm::DEFAULT_FRAME_LOCALS,
};

/// The distinguished frame whose body gets the entry epilogue.
pub const ENTRY_FRAME: &str = "Main";
/// The function the entry epilogue calls, when declared.
pub const ENTRY_FUNCTION: &str = "main";
/// Sentinel address marking a native entry in the function table.
pub const NATIVE_ADDRESS: i32 = -1;

/// One function table entry: the instruction address (negative for natives)
/// and the declared parameter count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub address: i32,
    pub param_count: usize,
}

impl FunctionEntry {
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.address < 0
    }

    /// The frame local count a call to this function should carry: the
    /// parameter count, but never below the historical default of 8.
    #[must_use]
    pub fn frame_locals(&self) -> i32 {
        self.param_count.max(DEFAULT_FRAME_LOCALS) as i32
    }
}

/// Compile-time name → instruction-address map.
#[derive(Debug, Default)]
pub struct FunctionTable {
    entries: AHashMap<String, FunctionEntry>,
}

impl FunctionTable {
    pub fn insert(&mut self, name: &str, entry: FunctionEntry) -> Option<FunctionEntry> {
        self.entries.insert(name.to_owned(), entry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.entries.get(name)
    }

    /// The recorded address, `-1` meaning native.
    #[must_use]
    pub fn address(&self, name: &str) -> Option<i32> {
        self.entries.get(name).map(|entry| entry.address)
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

/// Everything one compilation produces.
#[derive(Debug)]
pub struct CompiledProgram {
    pub bytecode: Bytecode,
    pub functions: FunctionTable,
    pub diagnostics: Vec<Diagnostic>,
}

/// The bytecode compiler. One-shot: build, call [`compile`](Self::compile).
pub struct Compiler {
    code: Bytecode,
    next_register: i32,
    scopes: ScopeStack,
    functions: FunctionTable,
    diagnostics: Vec<Diagnostic>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a compiler with the native library pre-registered at the
    /// sentinel address.
    #[must_use]
    pub fn new() -> Self {
        let mut functions = FunctionTable::default();
        for name in natives::NATIVE_NAMES {
            functions.insert(
                name,
                FunctionEntry {
                    address: NATIVE_ADDRESS,
                    param_count: 0,
                },
            );
        }
        Self {
            code: Bytecode::new(),
            next_register: 0,
            scopes: ScopeStack::new(),
            functions,
            diagnostics: Vec::new(),
        }
    }

    /// Compiles `root` and appends the program epilogue `HALT`.
    #[must_use]
    pub fn compile(mut self, root: &AstNode) -> CompiledProgram {
        self.compile_node(root);
        self.emit(Opcode::Halt, 0, 0, 0);
        CompiledProgram {
            bytecode: self.code,
            functions: self.functions,
            diagnostics: self.diagnostics,
        }
    }

    // ---- helpers ----

    fn emit(&mut self, opcode: Opcode, op1: i32, op2: i32, op3: i32) -> usize {
        self.code.push(Instruction::new(opcode, op1, op2, op3))
    }

    fn alloc_register(&mut self) -> i32 {
        let register = self.next_register;
        self.next_register += 1;
        register
    }

    fn diagnostic(&mut self, node: &AstNode, message: String) {
        self.diagnostics.push(Diagnostic::new(node.loc.clone(), message));
    }

    /// Reports an operation with no bytecode form and leaves a `NOP` hole.
    fn unsupported(&mut self, node: &AstNode, what: &str) -> i32 {
        self.diagnostic(node, format!("{what} has no bytecode form; emitting a hole"));
        self.emit(Opcode::Nop, 0, 0, 0);
        self.alloc_register()
    }

    // ---- statements and declarations ----

    fn compile_node(&mut self, node: &AstNode) {
        match &node.kind {
            NodeKind::Block(stmts) => {
                for stmt in stmts {
                    self.compile_node(stmt);
                }
            }
            NodeKind::Frame { name, body } => {
                for stmt in body {
                    self.compile_node(stmt);
                }
                if name == ENTRY_FRAME {
                    if let Some(entry) = self.functions.get(ENTRY_FUNCTION).cloned()
                        && !entry.is_native()
                    {
                        self.emit(Opcode::Call, entry.address, entry.frame_locals(), 0);
                    }
                    self.emit(Opcode::Halt, 0, 0, 0);
                }
            }
            NodeKind::VarDecl { name, is_const, init } => {
                let register = match init {
                    Some(init) => self.compile_expression(init),
                    None => self.alloc_register(),
                };
                let kind = if *is_const { SymbolKind::Const } else { SymbolKind::Var };
                if !self.scopes.declare(name, kind, register) {
                    self.diagnostic(node, format!("Duplicate declaration of '{name}' in this scope"));
                }
            }
            NodeKind::FuncDecl { name, params, body } => {
                let address = self.code.len() as i32;
                let previous = self.functions.insert(
                    name,
                    FunctionEntry {
                        address,
                        param_count: params.len(),
                    },
                );
                if previous.is_some_and(|entry| !entry.is_native()) {
                    self.diagnostic(node, format!("Function '{name}' declared more than once"));
                }

                let saved_register = self.next_register;
                self.next_register = params.len() as i32;
                self.scopes.push_scope();
                for (i, param) in params.iter().enumerate() {
                    if !self.scopes.declare(param, SymbolKind::Var, i as i32) {
                        self.diagnostic(node, format!("Duplicate parameter '{param}'"));
                    }
                }
                self.compile_node(body);
                self.emit(Opcode::Ret, 0, 0, 0);
                self.scopes.pop_scope();
                self.next_register = saved_register;
            }
            NodeKind::ClassDecl { members, .. } => {
                for member in members {
                    self.compile_node(member);
                }
            }
            // Imports record the module path only; resolution is a no-op.
            NodeKind::Import { .. } => {}
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_register = self.compile_expression(cond);
                let exit_jump = self.emit(Opcode::JumpIfZero, 0, cond_register, 0);
                self.compile_node(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        let else_jump = self.emit(Opcode::Jump, 0, 0, 0);
                        let else_start = self.code.len();
                        self.code.patch_target(exit_jump, else_start);
                        self.compile_node(else_branch);
                        let after = self.code.len();
                        self.code.patch_target(else_jump, after);
                    }
                    None => {
                        let after = self.code.len();
                        self.code.patch_target(exit_jump, after);
                    }
                }
            }
            NodeKind::While { cond, body } => {
                let loop_start = self.code.len();
                let cond_register = self.compile_expression(cond);
                let exit_jump = self.emit(Opcode::JumpIfZero, 0, cond_register, 0);
                self.compile_node(body);
                self.emit(Opcode::Jump, loop_start as i32, 0, 0);
                let after = self.code.len();
                self.code.patch_target(exit_jump, after);
            }
            NodeKind::For { init, cond, incr, body } => {
                self.compile_expression(init);
                let loop_start = self.code.len();
                let cond_register = self.compile_expression(cond);
                let exit_jump = self.emit(Opcode::JumpIfZero, 0, cond_register, 0);
                self.compile_node(body);
                self.compile_expression(incr);
                self.emit(Opcode::Jump, loop_start as i32, 0, 0);
                let after = self.code.len();
                self.code.patch_target(exit_jump, after);
            }
            NodeKind::Switch { .. } => {
                self.diagnostic(node, "switch has no compiled form yet; cases skipped".to_owned());
            }
            NodeKind::TryCatch { .. } => {
                self.diagnostic(node, "try/catch has no runtime support; block skipped".to_owned());
            }
            NodeKind::OnError { .. } => {
                self.diagnostic(node, "on_error has no runtime support; block skipped".to_owned());
            }
            NodeKind::Return { value } => {
                // The result register is discarded; return values travel by
                // register convention, not through RET.
                if let Some(value) = value {
                    self.compile_expression(value);
                }
                self.emit(Opcode::Ret, 0, 0, 0);
            }
            NodeKind::ExprStmt(expr) => {
                self.compile_expression(expr);
            }
            _ => {
                self.compile_expression(node);
            }
        }
    }

    // ---- expressions ----

    fn compile_expression(&mut self, node: &AstNode) -> i32 {
        match &node.kind {
            NodeKind::Literal(LiteralValue::Int(n)) => {
                let register = self.alloc_register();
                self.emit(Opcode::LoadConst, register, *n as i32, 0);
                register
            }
            NodeKind::Literal(LiteralValue::Bool(b)) => {
                let register = self.alloc_register();
                self.emit(Opcode::LoadConst, register, i32::from(*b), 0);
                register
            }
            NodeKind::Literal(LiteralValue::Float(f)) => {
                let index = self.code.intern_float(*f);
                let register = self.alloc_register();
                self.emit(Opcode::LoadConstFloat, register, index as i32, 0);
                register
            }
            NodeKind::Literal(LiteralValue::Str(s)) => self.emit_string_load(s),
            NodeKind::Docstring(s) | NodeKind::Regex(s) => self.emit_string_load(s),
            // Registers start as Null, so a fresh one is the literal itself.
            NodeKind::Literal(LiteralValue::Null) => self.alloc_register(),
            NodeKind::Identifier(name) => self.compile_identifier_read(node, name),
            NodeKind::Binary { op, left, right } => {
                if op.is_assignment() {
                    self.compile_assignment(node, *op, left, right)
                } else {
                    self.compile_binary(node, *op, left, right)
                }
            }
            NodeKind::Unary { op, operand } => self.compile_unary(node, *op, operand),
            NodeKind::Call { callee, args } => self.compile_call(node, callee, args),
            NodeKind::Index { object, index } => {
                let object_register = self.compile_expression(object);
                let index_register = self.compile_expression(index);
                let dest = self.alloc_register();
                self.emit(Opcode::GetProp, dest, object_register, index_register);
                dest
            }
            NodeKind::Member { .. } => self.unsupported(node, "member access"),
            NodeKind::Interpolation(inner) => {
                let inner_register = self.compile_expression(inner);
                self.emit_native_call("str", &[inner_register])
            }
            _ => {
                self.diagnostic(node, "expected an expression here".to_owned());
                self.alloc_register()
            }
        }
    }

    fn emit_string_load(&mut self, text: &str) -> i32 {
        let index = self.code.intern_str(text);
        let register = self.alloc_register();
        self.emit(Opcode::LoadConstStr, register, index as i32, 0);
        register
    }

    /// Resolution order for reads: scope chain, then the function table;
    /// otherwise report and hand back a fresh register.
    fn compile_identifier_read(&mut self, node: &AstNode, name: &str) -> i32 {
        if let Some(symbol) = self.scopes.resolve(name) {
            return symbol.register;
        }
        if let Some(entry) = self.functions.get(name)
            && !entry.is_native()
        {
            return entry.address;
        }
        self.diagnostic(node, format!("Unresolved identifier '{name}'; using a fresh register"));
        self.alloc_register()
    }

    fn compile_binary(&mut self, node: &AstNode, op: BinaryOp, left: &AstNode, right: &AstNode) -> i32 {
        let opcode = match op {
            BinaryOp::Add => Some(Opcode::Add),
            BinaryOp::Sub => Some(Opcode::Sub),
            BinaryOp::Mul => Some(Opcode::Mul),
            BinaryOp::Div => Some(Opcode::Div),
            BinaryOp::Eq => Some(Opcode::Eq),
            BinaryOp::Ne => Some(Opcode::Neq),
            _ => None,
        };
        let left_register = self.compile_expression(left);
        let right_register = self.compile_expression(right);
        match opcode {
            Some(opcode) => {
                let dest = self.alloc_register();
                self.emit(opcode, dest, left_register, right_register);
                dest
            }
            None => self.unsupported(node, &format!("operator '{}'", op.symbol())),
        }
    }

    fn compile_assignment(&mut self, node: &AstNode, op: BinaryOp, target: &AstNode, value: &AstNode) -> i32 {
        match &target.kind {
            NodeKind::Identifier(name) => {
                let Some(target_register) = self.scopes.resolve(name).map(|s| s.register) else {
                    self.diagnostic(node, format!("Assignment to unresolved identifier '{name}'"));
                    return self.compile_expression(value);
                };
                let value_register = self.compile_expression(value);
                match op {
                    BinaryOp::Assign => {
                        self.emit(Opcode::Move, target_register, value_register, 0);
                    }
                    BinaryOp::AddAssign => {
                        self.emit(Opcode::Add, target_register, target_register, value_register);
                    }
                    BinaryOp::SubAssign => {
                        self.emit(Opcode::Sub, target_register, target_register, value_register);
                    }
                    BinaryOp::MulAssign => {
                        self.emit(Opcode::Mul, target_register, target_register, value_register);
                    }
                    BinaryOp::DivAssign => {
                        self.emit(Opcode::Div, target_register, target_register, value_register);
                    }
                    _ => {
                        self.unsupported(node, &format!("operator '{}'", op.symbol()));
                    }
                }
                target_register
            }
            NodeKind::Index { object, index } => {
                if op != BinaryOp::Assign {
                    return self.unsupported(node, &format!("operator '{}' on an index target", op.symbol()));
                }
                let object_register = self.compile_expression(object);
                let index_register = self.compile_expression(index);
                let value_register = self.compile_expression(value);
                self.emit(Opcode::SetProp, object_register, index_register, value_register);
                value_register
            }
            _ => {
                self.diagnostic(node, "Invalid assignment target".to_owned());
                self.compile_expression(value)
            }
        }
    }

    fn compile_unary(&mut self, node: &AstNode, op: UnaryOp, operand: &AstNode) -> i32 {
        match op {
            // Unary minus lowers to 0 - x.
            UnaryOp::Neg => {
                let operand_register = self.compile_expression(operand);
                let dest = self.alloc_register();
                self.emit(Opcode::LoadConst, dest, 0, 0);
                self.emit(Opcode::Sub, dest, dest, operand_register);
                dest
            }
            UnaryOp::Plus => self.compile_expression(operand),
            _ => {
                self.compile_expression(operand);
                self.unsupported(node, &format!("unary operator '{}'", op.symbol()))
            }
        }
    }

    fn compile_call(&mut self, node: &AstNode, callee: &AstNode, args: &[AstNode]) -> i32 {
        let NodeKind::Identifier(name) = &callee.kind else {
            self.diagnostic(node, "Unsupported callee expression in call".to_owned());
            return self.alloc_register();
        };

        if let Some(entry) = self.functions.get(name).cloned()
            && !entry.is_native()
        {
            // Bytecode call: place arguments into the callee's parameter
            // registers 0..n, then jump.
            let arg_registers: Vec<i32> = args.iter().map(|arg| self.compile_expression(arg)).collect();
            for (i, arg_register) in arg_registers.into_iter().enumerate() {
                self.emit(Opcode::Move, i as i32, arg_register, 0);
            }
            self.emit(Opcode::Call, entry.address, entry.frame_locals(), 0);
            return self.alloc_register();
        }

        // Anything unresolved is a native reference.
        let arg_registers: Vec<i32> = args.iter().map(|arg| self.compile_expression(arg)).collect();
        self.emit_native_call(name, &arg_registers)
    }

    /// Moves `arg_registers` into a consecutive block ending at the register
    /// top, interns `name`, and emits the extended `CALL_NATIVE` form.
    fn emit_native_call(&mut self, name: &str, arg_registers: &[i32]) -> i32 {
        let base = self.next_register;
        for &arg_register in arg_registers {
            let slot = self.alloc_register();
            self.emit(Opcode::Move, slot, arg_register, 0);
        }
        let name_index = self.code.intern_str(name);
        let dest = self.alloc_register();
        self.code.push(Instruction::wide(
            Opcode::CallNative,
            dest,
            name_index as i32,
            arg_registers.len() as i32,
            base,
        ));
        dest
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        lexer::{Lexer, LexerConfig},
        parser::Parser,
        token::{Token, TokenKind},
    };

    fn compile_source(source: &str) -> CompiledProgram {
        let mut lx = Lexer::new(source.as_bytes().to_vec(), LexerConfig::default());
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let tok = lx.next_token();
            let kind = tok.kind;
            tokens.push(tok);
            if matches!(kind, TokenKind::Eof | TokenKind::Error) {
                break;
            }
        }
        let (root, diags) = Parser::new(&tokens).parse();
        assert!(diags.is_empty(), "parse diagnostics: {diags:?}");
        Compiler::new().compile(&root)
    }

    fn opcodes(program: &CompiledProgram) -> Vec<Opcode> {
        program.bytecode.instructions().iter().map(|i| i.opcode).collect()
    }

    #[test]
    fn entry_frame_compiles_body_then_call_and_halt() {
        let program = compile_source("frame Main { func main() { var a = 10; var b = 20; return a + b; } }");
        assert!(program.diagnostics.is_empty(), "diagnostics: {:?}", program.diagnostics);

        // main's first body instruction is at its recorded address.
        let main = program.functions.get("main").expect("main in function table");
        assert_eq!(main.address, 0);
        assert_eq!(main.param_count, 0);

        let instructions = program.bytecode.instructions();
        assert_eq!(instructions[0], Instruction::new(Opcode::LoadConst, 0, 10, 0));
        assert_eq!(instructions[1], Instruction::new(Opcode::LoadConst, 1, 20, 0));
        assert_eq!(instructions[2], Instruction::new(Opcode::Add, 2, 0, 1));
        assert_eq!(instructions[3].opcode, Opcode::Ret);
        // Entry epilogue: CALL main with its frame size, then HALT.
        assert_eq!(instructions[4].opcode, Opcode::Call);
        assert_eq!(instructions[4].op1, 0);
        assert_eq!(instructions[4].op2, DEFAULT_FRAME_LOCALS as i32);
        assert_eq!(instructions[5].opcode, Opcode::Halt);
    }

    #[test]
    fn function_addresses_point_at_first_body_instruction() {
        let program = compile_source("func a() { return 1; } func b(x, y) { return x; }");
        let a = program.functions.get("a").unwrap();
        let b = program.functions.get("b").unwrap();
        assert_eq!(a.address, 0);
        // a compiles to LOAD_CONST + RET, so b starts at 2.
        assert_eq!(b.address, 2);
        assert_eq!(b.param_count, 2);
    }

    #[test]
    fn parameters_bind_to_low_registers() {
        let program = compile_source("func add(a, b) { return a + b; }");
        let instructions = program.bytecode.instructions();
        // a + b reads registers 0 and 1 into a fresh destination.
        assert_eq!(instructions[0], Instruction::new(Opcode::Add, 2, 0, 1));
    }

    #[test]
    fn call_moves_arguments_into_parameter_registers() {
        let program = compile_source("func add(a, b) { return a + b; }\nadd(7, 8)");
        assert!(program.diagnostics.is_empty(), "diagnostics: {:?}", program.diagnostics);
        let instructions = program.bytecode.instructions();
        // Body: ADD, RET. Then args into fresh registers, moved into 0 and 1.
        assert_eq!(instructions[2], Instruction::new(Opcode::LoadConst, 0, 7, 0));
        assert_eq!(instructions[3], Instruction::new(Opcode::LoadConst, 1, 8, 0));
        assert_eq!(instructions[4], Instruction::new(Opcode::Move, 0, 0, 0));
        assert_eq!(instructions[5], Instruction::new(Opcode::Move, 1, 1, 0));
        assert_eq!(instructions[6].opcode, Opcode::Call);
        assert_eq!(instructions[6].op1, 0);
        assert_eq!(instructions[6].op2, DEFAULT_FRAME_LOCALS as i32);
    }

    #[test]
    fn native_call_uses_consecutive_registers_and_the_pool() {
        let program = compile_source("print(\"hello\")");
        assert!(program.diagnostics.is_empty(), "diagnostics: {:?}", program.diagnostics);
        let instructions = program.bytecode.instructions();

        assert_eq!(instructions[0].opcode, Opcode::LoadConstStr);
        let hello_index = instructions[0].op2 as usize;
        assert_eq!(program.bytecode.string(hello_index).map(|s| &**s), Some("hello"));

        assert_eq!(instructions[1], Instruction::new(Opcode::Move, 1, 0, 0));

        let call = instructions[2];
        assert_eq!(call.opcode, Opcode::CallNative);
        assert_eq!(call.op3, 1, "argc");
        assert_eq!(call.op4, 1, "base register");
        assert_eq!(program.bytecode.string(call.op2 as usize).map(|s| &**s), Some("print"));
    }

    #[test]
    fn call_native_pool_indices_are_always_in_range() {
        let program = compile_source("print(\"a\"); var s = str(1); var n = len(\"xy\")");
        for instruction in program.bytecode.instructions() {
            if instruction.opcode == Opcode::CallNative {
                let index = instruction.op2;
                assert!(index >= 0 && (index as usize) < program.bytecode.string_count());
            }
        }
    }

    #[test]
    fn jump_targets_are_always_in_range() {
        let program = compile_source(
            "var x = 3; while (x != 0) { x = x - 1 }\nif (x == 0) { x = 5 } else { x = 6 }\nfor (x = 0; x != 2; x = x + 1) { }",
        );
        let count = program.bytecode.len();
        for instruction in program.bytecode.instructions() {
            if matches!(instruction.opcode, Opcode::Jump | Opcode::JumpIfZero) {
                let target = instruction.op1;
                assert!(
                    target >= 0 && (target as usize) < count,
                    "target {target} out of range 0..{count}"
                );
            }
        }
    }

    #[test]
    fn if_else_backpatching_shapes() {
        let program = compile_source("if (1) { 2 } else { 3 }");
        let instructions = program.bytecode.instructions();
        // LOAD 1; JZ -> else; LOAD 2; JUMP -> end; LOAD 3; HALT
        assert_eq!(instructions[1].opcode, Opcode::JumpIfZero);
        assert_eq!(instructions[1].op1, 4);
        assert_eq!(instructions[3].opcode, Opcode::Jump);
        assert_eq!(instructions[3].op1, 5);
        assert_eq!(instructions[5].opcode, Opcode::Halt);
    }

    #[test]
    fn while_loop_jumps_back_to_the_condition() {
        let program = compile_source("var x = 2; while (x != 0) { x = x - 1 }");
        let instructions = program.bytecode.instructions();
        let back_jump = instructions
            .iter()
            .find(|i| i.opcode == Opcode::Jump)
            .expect("loop back-jump");
        // The condition starts right after the var initializer.
        assert_eq!(back_jump.op1, 1);
    }

    #[test]
    fn floats_go_through_the_float_pool() {
        let program = compile_source("var x = 1.5");
        let instructions = program.bytecode.instructions();
        assert_eq!(instructions[0].opcode, Opcode::LoadConstFloat);
        let index = instructions[0].op2 as usize;
        assert_eq!(program.bytecode.float(index), Some(1.5));
    }

    #[test]
    fn booleans_load_as_int_constants() {
        let program = compile_source("var t = true; var f = false");
        let instructions = program.bytecode.instructions();
        assert_eq!(instructions[0], Instruction::new(Opcode::LoadConst, 0, 1, 0));
        assert_eq!(instructions[1], Instruction::new(Opcode::LoadConst, 1, 0, 0));
    }

    #[test]
    fn docstring_and_regex_intern_into_the_string_pool() {
        let program = compile_source("\"\"\"doc text\"\"\"\n/ab+c/");
        let instructions = program.bytecode.instructions();
        assert_eq!(instructions[0].opcode, Opcode::LoadConstStr);
        assert_eq!(instructions[1].opcode, Opcode::LoadConstStr);
        assert_eq!(
            program.bytecode.string(instructions[1].op2 as usize).map(|s| &**s),
            Some("ab+c")
        );
    }

    #[test]
    fn interpolation_lowers_to_a_str_native_call() {
        let program = compile_source("\"v=${1+2}\"");
        let instructions = program.bytecode.instructions();
        let call = instructions
            .iter()
            .find(|i| i.opcode == Opcode::CallNative)
            .expect("native string conversion");
        assert_eq!(program.bytecode.string(call.op2 as usize).map(|s| &**s), Some("str"));
        assert_eq!(call.op3, 1);
    }

    #[test]
    fn assignment_moves_into_the_binding_register() {
        let program = compile_source("var x; x = 5");
        let instructions = program.bytecode.instructions();
        // var x binds register 0 without emitting; then LOAD 5 into R1, MOVE.
        assert_eq!(instructions[0], Instruction::new(Opcode::LoadConst, 1, 5, 0));
        assert_eq!(instructions[1], Instruction::new(Opcode::Move, 0, 1, 0));
    }

    #[test]
    fn compound_assignment_reuses_the_binding_register() {
        let program = compile_source("var x = 1; x += 2");
        let instructions = program.bytecode.instructions();
        assert_eq!(instructions[1], Instruction::new(Opcode::LoadConst, 1, 2, 0));
        assert_eq!(instructions[2], Instruction::new(Opcode::Add, 0, 0, 1));
    }

    #[test]
    fn unary_minus_lowers_to_zero_minus_x() {
        let program = compile_source("var x = -3");
        let instructions = program.bytecode.instructions();
        assert_eq!(instructions[0], Instruction::new(Opcode::LoadConst, 0, 3, 0));
        assert_eq!(instructions[1], Instruction::new(Opcode::LoadConst, 1, 0, 0));
        assert_eq!(instructions[2], Instruction::new(Opcode::Sub, 1, 1, 0));
    }

    #[test]
    fn unsupported_operator_leaves_a_hole_and_a_diagnostic() {
        let program = compile_source("var x = 1 < 2");
        assert!(!program.diagnostics.is_empty());
        assert!(program.diagnostics[0].message.contains("'<'"));
        assert!(program.bytecode.instructions().iter().any(|i| i.opcode == Opcode::Nop));
    }

    #[test]
    fn index_reads_and_writes_use_property_opcodes() {
        let program = compile_source("var o; var v = o[0]; o[1] = 2");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::GetProp));
        assert!(ops.contains(&Opcode::SetProp));
    }

    #[test]
    fn switch_and_try_are_reported_and_skipped() {
        let program = compile_source("switch (1) { }\ntry { 1 } catch { 2 }\non_error { 3 }");
        assert_eq!(program.diagnostics.len(), 3);
        // Only the program epilogue made it into the bytecode.
        assert_eq!(opcodes(&program), vec![Opcode::Halt]);
    }

    #[test]
    fn duplicate_variable_declaration_is_reported() {
        let program = compile_source("var x = 1; var x = 2");
        assert!(
            program
                .diagnostics
                .iter()
                .any(|d| d.message.contains("Duplicate declaration"))
        );
    }

    #[test]
    fn assignment_to_unknown_identifier_is_reported() {
        let program = compile_source("ghost = 1");
        assert!(
            program
                .diagnostics
                .iter()
                .any(|d| d.message.contains("unresolved identifier 'ghost'"))
        );
    }

    #[test]
    fn unresolved_read_gets_a_fresh_register() {
        let program = compile_source("var x = ghost + 1");
        assert!(
            program
                .diagnostics
                .iter()
                .any(|d| d.message.contains("Unresolved identifier 'ghost'"))
        );
        // Compilation continued to the ADD.
        assert!(program.bytecode.instructions().iter().any(|i| i.opcode == Opcode::Add));
    }

    #[test]
    fn natives_are_preregistered_with_the_sentinel_address() {
        let compiler = Compiler::new();
        assert_eq!(compiler.functions.address("print"), Some(NATIVE_ADDRESS));
        assert_eq!(compiler.functions.address("enumerate"), Some(NATIVE_ADDRESS));
        assert!(compiler.functions.get("print").unwrap().is_native());
    }

    #[test]
    fn user_functions_shadow_native_names() {
        let program = compile_source("func print(x) { return x; }\nprint(1)");
        let entry = program.functions.get("print").unwrap();
        assert!(!entry.is_native());
        // The call compiles as a bytecode CALL, not CALL_NATIVE.
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::Call));
        assert!(!ops.contains(&Opcode::CallNative));
    }
}

//! End-to-end pipeline orchestration: source text to a halted VM.
//!
//! A [`Session`] owns one [`Config`] and threads it through every stage
//! explicitly; there is no process-wide state. The pipeline is strictly
//! linear: read bytes, lex to a token vector, parse, run the semantic
//! pre-pass, compile, build a VM with the default natives, run.
//!
//! Each stage's first fatal error is returned as an [`OsflError`] and later
//! stages never run. Parser and compiler diagnostics are non-fatal; they are
//! echoed to stderr in debug mode.

use std::fs;

use crate::{
    compiler::Compiler,
    error::{ErrorKind, OsflError},
    io::{PrintWriter, StdPrint},
    lexer::{Lexer, LexerConfig},
    natives,
    parser::Parser,
    semantic,
    token::{Token, TokenKind},
    tracer::{NoopTracer, StderrTracer, VmTracer},
    vm::Vm,
};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Lexer advisory; columns always advance one per byte.
    pub tab_width: usize,
    /// Forwarded to the lexer.
    pub include_comments: bool,
    pub input_file: Option<String>,
    /// Recorded but unused until an emitter exists.
    pub output_file: Option<String>,
    /// Verbose diagnostics: instruction tracing and diagnostic echo.
    pub debug_mode: bool,
    /// Placeholder; there is no optimizer yet.
    pub optimize: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tab_width: 4,
            include_comments: false,
            input_file: None,
            output_file: None,
            debug_mode: false,
            optimize: true,
        }
    }
}

/// One compile-and-execute session.
#[derive(Debug, Default)]
pub struct Session {
    config: Config,
}

impl Session {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reads `path` once into memory and runs the whole pipeline on it.
    /// Returns the halted VM so callers can inspect final register state.
    pub fn run_file(&self, path: &str) -> Result<Vm, OsflError> {
        let bytes = fs::read(path)
            .map_err(|err| OsflError::new(ErrorKind::FileIo, format!("Could not open file '{path}': {err}")))?;
        self.run_bytes(bytes, path)
    }

    /// Runs the pipeline on in-memory source, with `file_name` stamped into
    /// every location.
    pub fn run_source(&self, source: &str, file_name: &str) -> Result<Vm, OsflError> {
        self.run_bytes(source.as_bytes().to_vec(), file_name)
    }

    fn run_bytes(&self, bytes: Vec<u8>, file_name: &str) -> Result<Vm, OsflError> {
        let mut noop = NoopTracer;
        let mut verbose = StderrTracer;
        let tracer: &mut dyn VmTracer = if self.config.debug_mode { &mut verbose } else { &mut noop };
        self.run_bytes_with(bytes, file_name, &mut StdPrint, tracer)
    }

    /// Runs the pipeline with an explicit print writer and tracer; the entry
    /// point for embedders and tests.
    pub fn run_source_with(
        &self,
        source: &str,
        file_name: &str,
        print: &mut dyn PrintWriter,
        tracer: &mut dyn VmTracer,
    ) -> Result<Vm, OsflError> {
        self.run_bytes_with(source.as_bytes().to_vec(), file_name, print, tracer)
    }

    fn run_bytes_with(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        print: &mut dyn PrintWriter,
        tracer: &mut dyn VmTracer,
    ) -> Result<Vm, OsflError> {
        // 1) Lex the whole buffer up front.
        let lexer_config = LexerConfig {
            include_comments: self.config.include_comments,
            tab_width: self.config.tab_width,
            file_name: file_name.to_owned(),
            ..LexerConfig::default()
        };
        let mut lexer = Lexer::new(bytes, lexer_config);
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let token = lexer.next_token();
            let kind = token.kind;
            tokens.push(token);
            if matches!(kind, TokenKind::Eof | TokenKind::Error) {
                break;
            }
        }
        if let Some(error) = lexer.last_error() {
            return Err(OsflError::at(
                ErrorKind::Lexer,
                error.message.clone(),
                error.location.clone(),
            ));
        }

        // 2) Parse. The parser always yields a (possibly partial) AST.
        let (root, parse_diagnostics) = Parser::new(&tokens).parse();
        if self.config.debug_mode {
            for diagnostic in &parse_diagnostics {
                eprintln!("parse: {diagnostic}");
            }
        }

        // 3) Semantic pre-pass; abort only when it counted errors.
        let report = semantic::analyze(&root);
        if report.error_count > 0 {
            let first = &report.diagnostics[0];
            return Err(OsflError::at(
                ErrorKind::Syntax,
                format!(
                    "semantic analysis reported {} error(s); first: {}",
                    report.error_count, first.message
                ),
                first.location.clone(),
            ));
        }

        // 4) Compile.
        let program = Compiler::new().compile(&root);
        if self.config.debug_mode {
            for diagnostic in &program.diagnostics {
                eprintln!("compile: {diagnostic}");
            }
        }

        // 5) Execute.
        let mut vm = Vm::new(program.bytecode);
        natives::register_defaults(vm.natives_mut());
        vm.run_traced(print, tracer)
            .map_err(|error| OsflError::new(ErrorKind::Runtime, error.to_string()))?;
        Ok(vm)
    }
}

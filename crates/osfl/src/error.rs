//! The pipeline-level error taxonomy and the diagnostic channel.
//!
//! Each pipeline stage reports failures as an [`OsflError`] carrying one of
//! the stable [`ErrorKind`]s. Non-fatal problems (parser recovery, compiler
//! holes) flow through [`Diagnostic`] lists instead and never abort the
//! pipeline on their own.

use std::fmt;

use strum::Display;

use crate::location::SourceLocation;

/// Stable error taxonomy for the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    MemoryAllocation,
    InvalidInput,
    FileIo,
    /// Semantic-pass failures.
    Syntax,
    Lexer,
    Parser,
    Compiler,
    /// VM creation or setup failures.
    Vm,
    /// Failures raised while executing bytecode.
    Runtime,
}

/// A fatal pipeline error, rendered for the user as
/// `Error in <file> at line <L>, column <C>:` followed by `Error: <message>`.
#[derive(Debug, Clone, PartialEq)]
pub struct OsflError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl OsflError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn at(kind: ErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Some(location),
        }
    }
}

impl fmt::Display for OsflError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            writeln!(f, "Error in {} at line {}, column {}:", loc.file, loc.line, loc.column)?;
        }
        write!(f, "Error: {}", self.message)
    }
}

impl std::error::Error for OsflError {}

/// One entry on a stage's diagnostic channel.
///
/// The parser and compiler accumulate these while recovering; they are
/// surfaced in debug mode but do not stop the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn error_renders_in_the_documented_format() {
        let loc = SourceLocation::new(3, 7, Rc::from("prog.osfl"));
        let err = OsflError::at(ErrorKind::Lexer, "Unterminated string literal before EOF", loc);
        assert_eq!(
            err.to_string(),
            "Error in prog.osfl at line 3, column 7:\nError: Unterminated string literal before EOF"
        );
    }

    #[test]
    fn error_without_location_renders_message_only() {
        let err = OsflError::new(ErrorKind::FileIo, "Could not open file 'missing.osfl'");
        assert_eq!(err.to_string(), "Error: Could not open file 'missing.osfl'");
    }
}

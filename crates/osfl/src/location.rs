//! Source positions attached to tokens, AST nodes, and diagnostics.

use std::{fmt, rc::Rc};

/// A position in a source file.
///
/// Lines and columns are both 1-based. Columns advance by one per byte
/// consumed; a tab counts as a single byte. The file name is shared between
/// every location produced from one lexer, so cloning a location is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub file: Rc<str>,
}

impl SourceLocation {
    #[must_use]
    pub fn new(line: u32, column: u32, file: Rc<str>) -> Self {
        Self { line, column, file }
    }

    /// The location of the first byte of `file`.
    #[must_use]
    pub fn start_of(file: &Rc<str>) -> Self {
        Self::new(1, 1, Rc::clone(file))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

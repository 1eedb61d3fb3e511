//! Lexical scanner: raw bytes in, tokens out.
//!
//! The scanner handles docstrings (`"""..."""`), string literals with
//! `${...}` interpolation, regex literals, multi-radix numeric literals with
//! underscore separators and scientific notation, and the full operator set,
//! trying two-character operators before single-character ones.
//!
//! Interpolation splits a string literal into alternating pieces: the
//! accumulated prefix is emitted as a `Str` token (empty allowed), followed by
//! `InterpolationStart`; the expression tokens then flow as usual, and the
//! matching `}` becomes `InterpolationEnd` before string scanning resumes.
//!
//! Errors are in-band: the failing construct produces an `Error` token and
//! [`Lexer::last_error`] exposes the details, located at the byte where the
//! construct began. The lexer stays usable afterwards.

use std::rc::Rc;

use strum::Display;

use crate::{
    location::SourceLocation,
    token::{Token, TokenKind, TokenValue},
};

/// String, docstring, and regex literals hold at most this many usable bytes.
pub const MAX_LITERAL_LEN: usize = 63;

/// Lexer configuration.
#[derive(Debug, Clone)]
pub struct LexerConfig {
    /// Skip inline whitespace instead of emitting `Whitespace` tokens.
    pub skip_whitespace: bool,
    /// Stop at comment markers without emitting tokens; comments are never
    /// tokens either way, so both settings consume the comment text.
    pub include_comments: bool,
    /// Emit a `Newline` token per `\n`; otherwise newlines are whitespace.
    pub track_line_endings: bool,
    /// Advisory only; columns always advance one per byte.
    pub tab_width: usize,
    /// Stamped into every token's location.
    pub file_name: String,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self {
            skip_whitespace: true,
            include_comments: false,
            track_line_endings: true,
            tab_width: 4,
            file_name: "input.osfl".to_owned(),
        }
    }
}

/// What went wrong inside the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LexErrorKind {
    InvalidChar,
    UnterminatedString,
    UnterminatedComment,
    InvalidEscape,
    BufferOverflow,
}

/// The most recent lexer error, exposed via [`Lexer::last_error`].
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    pub location: SourceLocation,
}

/// The lexical scanner.
pub struct Lexer {
    source: Vec<u8>,
    file: Rc<str>,
    pos: usize,
    line: u32,
    column: u32,
    config: LexerConfig,
    error: Option<LexError>,
    /// One-slot queue so a `${` can yield its prefix `Str` token and the
    /// `InterpolationStart` token from a single scan.
    queued: Option<Token>,
    /// Open interpolation count; a `}` closes one instead of lexing as
    /// `RBrace` while this is non-zero.
    interp_depth: u32,
    /// Set when an `InterpolationEnd` was just emitted and string scanning
    /// must resume before anything else.
    resume_string: bool,
}

impl Lexer {
    #[must_use]
    pub fn new(source: Vec<u8>, config: LexerConfig) -> Self {
        let file = Rc::from(config.file_name.as_str());
        Self {
            source,
            file,
            pos: 0,
            line: 1,
            column: 1,
            config,
            error: None,
            queued: None,
            interp_depth: 0,
            resume_string: false,
        }
    }

    /// Returns the lexer to its post-create state for a new source buffer.
    pub fn reset(&mut self, source: Vec<u8>) {
        self.source = source;
        self.pos = 0;
        self.line = 1;
        self.column = 1;
        self.error = None;
        self.queued = None;
        self.interp_depth = 0;
        self.resume_string = false;
    }

    /// The most recent error, if any. Cleared at the start of every
    /// [`next_token`](Self::next_token) call.
    #[must_use]
    pub fn last_error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &LexerConfig {
        &self.config
    }

    /// Produces the next token, advancing the lexer.
    pub fn next_token(&mut self) -> Token {
        self.error = None;
        self.next_token_internal()
    }

    /// Produces the next token without consuming it: position, line, column,
    /// and the last-error record are all restored afterwards.
    pub fn peek_token(&mut self) -> Token {
        let saved_pos = self.pos;
        let saved_line = self.line;
        let saved_column = self.column;
        let saved_error = self.error.clone();
        let saved_queued = self.queued.clone();
        let saved_depth = self.interp_depth;
        let saved_resume = self.resume_string;

        let token = self.next_token();

        self.pos = saved_pos;
        self.line = saved_line;
        self.column = saved_column;
        self.error = saved_error;
        self.queued = saved_queued;
        self.interp_depth = saved_depth;
        self.resume_string = saved_resume;

        token
    }

    // ---- byte-level helpers ----

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn current(&self) -> u8 {
        self.source.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_byte(&self) -> u8 {
        self.source.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn byte_at(&self, offset: usize) -> u8 {
        self.source.get(self.pos + offset).copied().unwrap_or(0)
    }

    /// Consumes one byte. Line increments and column resets to 1 exactly when
    /// a `\n` has been consumed.
    fn advance(&mut self) {
        if self.at_end() {
            return;
        }
        let consumed = self.source[self.pos];
        self.pos += 1;
        if consumed == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, Rc::clone(&self.file))
    }

    fn set_error(&mut self, kind: LexErrorKind, message: String, location: SourceLocation) {
        self.error = Some(LexError { kind, message, location });
    }

    fn error_token(&mut self, kind: LexErrorKind, message: String, location: SourceLocation, text: &str) -> Token {
        self.set_error(kind, message, location.clone());
        Token::new(TokenKind::Error, location, text)
    }

    // ---- token production ----

    fn next_token_internal(&mut self) -> Token {
        if let Some(token) = self.queued.take() {
            return token;
        }
        if self.resume_string {
            self.resume_string = false;
            let loc = self.location();
            if let Some(token) = self.scan_string_segment(loc, false) {
                return token;
            }
            // Empty trailing segment: fall through to normal scanning.
        }

        loop {
            if self.config.skip_whitespace {
                self.skip_whitespace();
            } else if self.is_whitespace_byte(self.current()) {
                return self.scan_whitespace();
            }
            if self.current() == b'/' && self.peek_byte() == b'/' {
                self.skip_line_comment();
                continue;
            }
            if self.current() == b'/' && self.peek_byte() == b'*' {
                self.skip_block_comment();
                continue;
            }
            break;
        }

        if self.at_end() {
            return Token::new(TokenKind::Eof, self.location(), "");
        }

        let loc = self.location();

        if self.current() == b'\n' && self.config.track_line_endings {
            self.advance();
            return Token::new(TokenKind::Newline, loc, "\\n");
        }

        self.dispatch(loc)
    }

    /// Decides what to scan based on the first byte.
    fn dispatch(&mut self, loc: SourceLocation) -> Token {
        let c = self.current();

        if c == b'"' && self.peek_byte() == b'"' && self.byte_at(2) == b'"' {
            return self.scan_docstring(loc);
        }
        if c == b'"' {
            self.advance();
            // The first segment always yields a token, empty string included.
            let empty = Token::with_value(TokenKind::Str, loc.clone(), "", TokenValue::Str(Rc::from("")));
            return self.scan_string_segment(loc, true).unwrap_or(empty);
        }
        if c == b'}' && self.interp_depth > 0 {
            self.advance();
            self.interp_depth -= 1;
            self.resume_string = true;
            return Token::new(TokenKind::InterpolationEnd, loc, "}");
        }
        if c == b'/' && self.peek_byte() != b'/' && self.peek_byte() != b'*' {
            return self.scan_regex(loc);
        }
        if is_identifier_start(c) {
            return self.scan_identifier(loc);
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek_byte().is_ascii_digit()) {
            return self.scan_number(loc);
        }
        self.scan_operator(loc)
    }

    fn is_whitespace_byte(&self, c: u8) -> bool {
        matches!(c, b' ' | b'\r' | b'\t') || (c == b'\n' && !self.config.track_line_endings)
    }

    fn skip_whitespace(&mut self) {
        while !self.at_end() && self.is_whitespace_byte(self.current()) {
            self.advance();
        }
    }

    fn scan_whitespace(&mut self) -> Token {
        let loc = self.location();
        let start = self.pos;
        while !self.at_end() && self.is_whitespace_byte(self.current()) {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        Token::new(TokenKind::Whitespace, loc, text)
    }

    fn skip_line_comment(&mut self) {
        while !self.at_end() && self.current() != b'\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        let loc = self.location();
        self.advance();
        self.advance();
        loop {
            if self.at_end() {
                self.set_error(
                    LexErrorKind::UnterminatedComment,
                    "Unterminated multi-line comment".to_owned(),
                    loc,
                );
                return;
            }
            if self.current() == b'*' && self.peek_byte() == b'/' {
                self.advance();
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn scan_docstring(&mut self, loc: SourceLocation) -> Token {
        self.advance();
        self.advance();
        self.advance();

        let mut buffer = String::new();
        loop {
            if self.at_end() {
                return self.error_token(
                    LexErrorKind::UnterminatedString,
                    "Unterminated docstring before EOF".to_owned(),
                    loc,
                    &buffer,
                );
            }
            if self.current() == b'"' && self.peek_byte() == b'"' && self.byte_at(2) == b'"' {
                self.advance();
                self.advance();
                self.advance();
                break;
            }
            if buffer.len() >= MAX_LITERAL_LEN {
                return self.error_token(
                    LexErrorKind::BufferOverflow,
                    format!("Docstring exceeds max length of {MAX_LITERAL_LEN}"),
                    loc,
                    &buffer,
                );
            }
            buffer.push(self.current() as char);
            self.advance();
        }

        let value: Rc<str> = Rc::from(buffer.as_str());
        Token::with_value(TokenKind::Docstring, loc, buffer, TokenValue::Str(value))
    }

    /// Scans one string segment starting at the current byte (the opening
    /// quote has already been consumed).
    ///
    /// Returns `None` for an empty segment that immediately closes after a
    /// resumed interpolation, so `"a${x}"` produces no trailing empty token.
    /// A `${` inside the segment queues the `InterpolationStart` token and
    /// returns the accumulated prefix.
    fn scan_string_segment(&mut self, loc: SourceLocation, first: bool) -> Option<Token> {
        let mut buffer = String::new();
        loop {
            if self.at_end() {
                return Some(self.error_token(
                    LexErrorKind::UnterminatedString,
                    "Unterminated string literal before EOF".to_owned(),
                    loc,
                    &buffer,
                ));
            }
            let c = self.current();
            if c == b'"' {
                self.advance();
                if buffer.is_empty() && !first {
                    return None;
                }
                let value: Rc<str> = Rc::from(buffer.as_str());
                return Some(Token::with_value(TokenKind::Str, loc, buffer, TokenValue::Str(value)));
            }
            if c == b'$' && self.peek_byte() == b'{' {
                let start_loc = self.location();
                self.advance();
                self.advance();
                self.interp_depth += 1;
                self.queued = Some(Token::new(TokenKind::InterpolationStart, start_loc, "${"));
                let value: Rc<str> = Rc::from(buffer.as_str());
                return Some(Token::with_value(TokenKind::Str, loc, buffer, TokenValue::Str(value)));
            }
            if c == b'\\' {
                let escape_loc = self.location();
                self.advance();
                if self.at_end() {
                    return Some(self.error_token(
                        LexErrorKind::UnterminatedString,
                        "Unterminated string literal (ends after backslash)".to_owned(),
                        loc,
                        &buffer,
                    ));
                }
                let escaped = match self.current() {
                    b'n' => '\n',
                    b't' => '\t',
                    b'\\' => '\\',
                    b'"' => '"',
                    other => {
                        return Some(self.error_token(
                            LexErrorKind::InvalidEscape,
                            format!("Invalid escape sequence \\{}", other as char),
                            escape_loc,
                            &buffer,
                        ));
                    }
                };
                if buffer.len() >= MAX_LITERAL_LEN {
                    return Some(self.error_token(
                        LexErrorKind::BufferOverflow,
                        format!("String literal exceeds max length of {MAX_LITERAL_LEN}"),
                        loc,
                        &buffer,
                    ));
                }
                buffer.push(escaped);
                self.advance();
                continue;
            }
            if buffer.len() >= MAX_LITERAL_LEN {
                return Some(self.error_token(
                    LexErrorKind::BufferOverflow,
                    format!("String literal exceeds max length of {MAX_LITERAL_LEN}"),
                    loc,
                    &buffer,
                ));
            }
            buffer.push(c as char);
            self.advance();
        }
    }

    fn scan_regex(&mut self, loc: SourceLocation) -> Token {
        self.advance();

        let mut buffer = String::new();
        loop {
            if self.at_end() {
                break;
            }
            let c = self.current();
            if c == b'\\' {
                // Escape pairs are preserved verbatim inside a regex.
                if buffer.len() + 1 >= MAX_LITERAL_LEN {
                    return self.error_token(
                        LexErrorKind::BufferOverflow,
                        format!("Regex literal exceeds max length of {MAX_LITERAL_LEN}"),
                        loc,
                        &buffer,
                    );
                }
                buffer.push('\\');
                self.advance();
                if !self.at_end() {
                    buffer.push(self.current() as char);
                    self.advance();
                }
                continue;
            }
            if c == b'/' {
                self.advance();
                break;
            }
            if buffer.len() >= MAX_LITERAL_LEN {
                return self.error_token(
                    LexErrorKind::BufferOverflow,
                    format!("Regex literal exceeds max length of {MAX_LITERAL_LEN}"),
                    loc,
                    &buffer,
                );
            }
            buffer.push(c as char);
            self.advance();
        }

        let value: Rc<str> = Rc::from(buffer.as_str());
        Token::with_value(TokenKind::Regex, loc, buffer, TokenValue::Str(value))
    }

    fn scan_identifier(&mut self, loc: SourceLocation) -> Token {
        let start = self.pos;
        while !self.at_end() && is_identifier_char(self.current()) {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();

        match TokenKind::keyword(&text) {
            Some(TokenKind::True) => Token::with_value(TokenKind::True, loc, text, TokenValue::Bool(true)),
            Some(TokenKind::False) => Token::with_value(TokenKind::False, loc, text, TokenValue::Bool(false)),
            Some(kind) => Token::new(kind, loc, text),
            None => Token::new(TokenKind::Identifier, loc, text),
        }
    }

    fn scan_number(&mut self, loc: SourceLocation) -> Token {
        if self.current() == b'0' {
            match self.peek_byte() {
                b'x' | b'X' => return self.scan_radix_literal(loc, 16, "0x", |c| c.is_ascii_hexdigit(), false),
                b'b' | b'B' => return self.scan_radix_literal(loc, 2, "0b", |c| matches!(c, b'0' | b'1'), true),
                b'o' | b'O' => return self.scan_radix_literal(loc, 8, "0o", |c| (b'0'..=b'7').contains(&c), true),
                _ => {}
            }
        }

        let mut buffer = String::new();
        let mut is_float = false;
        let mut seen_dot = false;
        loop {
            let c = self.current();
            if c == b'_' {
                // Separators are stripped.
                self.advance();
                continue;
            }
            if c == b'.' {
                if seen_dot {
                    break;
                }
                seen_dot = true;
                is_float = true;
                buffer.push('.');
                self.advance();
            } else if c.is_ascii_digit() {
                buffer.push(c as char);
                self.advance();
            } else if (c == b'e' || c == b'E') && self.has_exponent_digits() {
                is_float = true;
                buffer.push(c as char);
                self.advance();
                if matches!(self.current(), b'+' | b'-') {
                    buffer.push(self.current() as char);
                    self.advance();
                }
                while self.current().is_ascii_digit() {
                    buffer.push(self.current() as char);
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }

        if is_float {
            let value = buffer.parse::<f64>().unwrap_or(0.0);
            Token::with_value(TokenKind::Float, loc, buffer, TokenValue::Float(value))
        } else {
            let value = buffer.parse::<i64>().unwrap_or(i64::MAX);
            Token::with_value(TokenKind::Int, loc, buffer, TokenValue::Int(value))
        }
    }

    /// True when the byte after an `e`/`E` begins a valid exponent: a digit,
    /// or a sign followed by a digit.
    fn has_exponent_digits(&self) -> bool {
        let next = self.peek_byte();
        next.is_ascii_digit() || (matches!(next, b'+' | b'-') && self.byte_at(2).is_ascii_digit())
    }

    fn scan_radix_literal(
        &mut self,
        loc: SourceLocation,
        radix: u32,
        prefix: &str,
        is_digit: fn(u8) -> bool,
        allow_underscores: bool,
    ) -> Token {
        self.advance();
        self.advance();

        let mut digits = String::new();
        while !self.at_end() {
            let c = self.current();
            if is_digit(c) {
                digits.push(c as char);
                self.advance();
            } else if allow_underscores && c == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        let value = if digits.is_empty() {
            0
        } else {
            i64::from_str_radix(&digits, radix).unwrap_or(i64::MAX)
        };
        let text = format!("{prefix}{digits}");
        Token::with_value(TokenKind::Int, loc, text, TokenValue::Int(value))
    }

    fn scan_operator(&mut self, loc: SourceLocation) -> Token {
        let c = self.current();
        let p = self.peek_byte();

        let two = match (c, p) {
            (b'*', b'*') => Some((TokenKind::Pow, "**")),
            (b'+', b'+') => Some((TokenKind::Increment, "++")),
            (b'-', b'-') => Some((TokenKind::Decrement, "--")),
            (b'=', b'=') => Some((TokenKind::EqEq, "==")),
            (b'!', b'=') => Some((TokenKind::NotEq, "!=")),
            (b'<', b'=') => Some((TokenKind::LtEq, "<=")),
            (b'>', b'=') => Some((TokenKind::GtEq, ">=")),
            (b'&', b'&') => Some((TokenKind::AndAnd, "&&")),
            (b'|', b'|') => Some((TokenKind::OrOr, "||")),
            (b'+', b'=') => Some((TokenKind::PlusAssign, "+=")),
            (b'-', b'=') => Some((TokenKind::MinusAssign, "-=")),
            (b'*', b'=') => Some((TokenKind::StarAssign, "*=")),
            (b'/', b'=') => Some((TokenKind::SlashAssign, "/=")),
            (b'%', b'=') => Some((TokenKind::PercentAssign, "%=")),
            (b'-', b'>') => Some((TokenKind::Arrow, "->")),
            (b'=', b'>') => Some((TokenKind::FatArrow, "=>")),
            (b':', b':') => Some((TokenKind::ColonColon, "::")),
            _ => None,
        };
        if let Some((kind, text)) = two {
            self.advance();
            self.advance();
            return Token::new(kind, loc, text);
        }

        let single = match c {
            b'~' => Some((TokenKind::BitNot, "~")),
            b'^' => Some((TokenKind::BitXor, "^")),
            b'&' => Some((TokenKind::BitAnd, "&")),
            b'|' => Some((TokenKind::BitOr, "|")),
            b'[' => Some((TokenKind::LBracket, "[")),
            b']' => Some((TokenKind::RBracket, "]")),
            b'+' => Some((TokenKind::Plus, "+")),
            b'-' => Some((TokenKind::Minus, "-")),
            b'*' => Some((TokenKind::Star, "*")),
            b'/' => Some((TokenKind::Slash, "/")),
            b'%' => Some((TokenKind::Percent, "%")),
            b'=' => Some((TokenKind::Assign, "=")),
            b'!' => Some((TokenKind::Not, "!")),
            b'<' => Some((TokenKind::Lt, "<")),
            b'>' => Some((TokenKind::Gt, ">")),
            b'(' => Some((TokenKind::LParen, "(")),
            b')' => Some((TokenKind::RParen, ")")),
            b'{' => Some((TokenKind::LBrace, "{")),
            b'}' => Some((TokenKind::RBrace, "}")),
            b';' => Some((TokenKind::Semicolon, ";")),
            b':' => Some((TokenKind::Colon, ":")),
            b',' => Some((TokenKind::Comma, ",")),
            b'.' => Some((TokenKind::Dot, ".")),
            _ => None,
        };
        if let Some((kind, text)) = single {
            self.advance();
            return Token::new(kind, loc, text);
        }

        let text = (c as char).to_string();
        self.advance();
        self.error_token(
            LexErrorKind::InvalidChar,
            format!("Invalid character '{}'", c as char),
            loc,
            &text,
        )
    }
}

/// ASCII letters, underscore, or any byte >= 128 (a coarse Unicode pass).
fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 128
}

fn is_identifier_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c >= 128
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lexer(source: &str) -> Lexer {
        Lexer::new(source.as_bytes().to_vec(), LexerConfig::default())
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lx = lexer(source);
        let mut out = Vec::new();
        loop {
            let tok = lx.next_token();
            let kind = tok.kind;
            out.push(kind);
            if matches!(kind, TokenKind::Eof | TokenKind::Error) {
                break;
            }
        }
        out
    }

    #[test]
    fn keywords_and_identifiers() {
        let mut lx = lexer("frame Main var x const k on_error elif");
        let expected = [
            TokenKind::Frame,
            TokenKind::Identifier,
            TokenKind::Var,
            TokenKind::Identifier,
            TokenKind::Const,
            TokenKind::Identifier,
            TokenKind::OnError,
            TokenKind::Elif,
        ];
        for kind in expected {
            assert_eq!(lx.next_token().kind, kind);
        }
        assert_eq!(lx.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn boolean_literals_carry_values() {
        let mut lx = lexer("true false");
        let t = lx.next_token();
        assert_eq!(t.kind, TokenKind::True);
        assert_eq!(t.value, TokenValue::Bool(true));
        let f = lx.next_token();
        assert_eq!(f.kind, TokenKind::False);
        assert_eq!(f.value, TokenValue::Bool(false));
    }

    #[test]
    fn two_char_operators_win_over_single() {
        let mut lx = lexer("== != <= >= && || += -> => :: ** ++ --");
        let expected = [
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::PlusAssign,
            TokenKind::Arrow,
            TokenKind::FatArrow,
            TokenKind::ColonColon,
            TokenKind::Pow,
            TokenKind::Increment,
            TokenKind::Decrement,
        ];
        for kind in expected {
            assert_eq!(lx.next_token().kind, kind);
        }
    }

    #[test]
    fn multi_char_operator_advances_column_by_token_length() {
        let mut lx = lexer("== =");
        let op = lx.next_token();
        assert_eq!(op.location.column, 1);
        let eq = lx.next_token();
        assert_eq!(eq.location.column, 4);
    }

    #[test]
    fn numeric_radix_forms() {
        let mut lx = lexer("0xFF 0b1010 0o17 1_000_000 3.5 1e3 2.5e-2 .5");
        assert_eq!(lx.next_token().value, TokenValue::Int(255));
        assert_eq!(lx.next_token().value, TokenValue::Int(10));
        assert_eq!(lx.next_token().value, TokenValue::Int(15));
        assert_eq!(lx.next_token().value, TokenValue::Int(1_000_000));
        assert_eq!(lx.next_token().value, TokenValue::Float(3.5));
        assert_eq!(lx.next_token().value, TokenValue::Float(1000.0));
        assert_eq!(lx.next_token().value, TokenValue::Float(0.025));
        assert_eq!(lx.next_token().value, TokenValue::Float(0.5));
    }

    #[test]
    fn isolated_dot_is_not_a_number() {
        let mut lx = lexer(". 1");
        assert_eq!(lx.next_token().kind, TokenKind::Dot);
        assert_eq!(lx.next_token().value, TokenValue::Int(1));
    }

    #[test]
    fn string_escapes() {
        let mut lx = lexer(r#""a\nb\t\"\\""#);
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Str);
        assert_eq!(tok.value.as_str(), Some("a\nb\t\"\\"));
    }

    #[test]
    fn empty_string_and_empty_docstring_are_valid() {
        let mut lx = lexer(r#""" """""""#);
        let s = lx.next_token();
        assert_eq!(s.kind, TokenKind::Str);
        assert_eq!(s.value.as_str(), Some(""));
        let d = lx.next_token();
        assert_eq!(d.kind, TokenKind::Docstring);
        assert_eq!(d.value.as_str(), Some(""));
    }

    #[test]
    fn docstring_spans_lines_without_escapes() {
        let mut lx = lexer("\"\"\"line one\nline \\n two\"\"\"");
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Docstring);
        assert_eq!(tok.value.as_str(), Some("line one\nline \\n two"));
    }

    #[test]
    fn invalid_escape_is_an_error() {
        let mut lx = lexer(r#""bad\q""#);
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(lx.last_error().unwrap().kind, LexErrorKind::InvalidEscape);
    }

    #[test]
    fn unterminated_string_reports_its_opening_location() {
        let mut lx = lexer("\n  \"oops");
        lx.next_token(); // newline
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        let err = lx.last_error().unwrap();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!((err.location.line, err.location.column), (2, 3));
    }

    #[test]
    fn string_boundary_63_succeeds_64_overflows() {
        let ok = format!("\"{}\"", "x".repeat(63));
        let mut lx = lexer(&ok);
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Str);
        assert_eq!(tok.value.as_str().unwrap().len(), 63);

        let overflow = format!("\"{}\"", "x".repeat(64));
        let mut lx = lexer(&overflow);
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(lx.last_error().unwrap().kind, LexErrorKind::BufferOverflow);
    }

    #[test]
    fn regex_literal_preserves_escape_pairs() {
        let mut lx = lexer(r"/[A-Za-z]+\/x/");
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Regex);
        assert_eq!(tok.value.as_str(), Some(r"[A-Za-z]+\/x"));
    }

    #[test]
    fn slash_not_starting_a_comment_is_a_regex() {
        let mut lx = lexer("/ab/ //tail");
        assert_eq!(lx.next_token().kind, TokenKind::Regex);
        assert_eq!(lx.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn interpolation_token_sequence() {
        let mut lx = lexer(r#""val=${1+2}""#);
        let prefix = lx.next_token();
        assert_eq!(prefix.kind, TokenKind::Str);
        assert_eq!(prefix.value.as_str(), Some("val="));
        assert_eq!(lx.next_token().kind, TokenKind::InterpolationStart);
        assert_eq!(lx.next_token().value, TokenValue::Int(1));
        assert_eq!(lx.next_token().kind, TokenKind::Plus);
        assert_eq!(lx.next_token().value, TokenValue::Int(2));
        assert_eq!(lx.next_token().kind, TokenKind::InterpolationEnd);
        assert_eq!(lx.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn interpolation_with_empty_prefix_and_suffix_text() {
        let mut lx = lexer(r#""${x} tail""#);
        let prefix = lx.next_token();
        assert_eq!(prefix.kind, TokenKind::Str);
        assert_eq!(prefix.value.as_str(), Some(""));
        assert_eq!(lx.next_token().kind, TokenKind::InterpolationStart);
        assert_eq!(lx.next_token().kind, TokenKind::Identifier);
        assert_eq!(lx.next_token().kind, TokenKind::InterpolationEnd);
        let tail = lx.next_token();
        assert_eq!(tail.kind, TokenKind::Str);
        assert_eq!(tail.value.as_str(), Some(" tail"));
        assert_eq!(lx.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn comments_are_skipped_silently() {
        let kinds = kinds("a // line\n/* block\nstill */ b");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn newline_tracking_and_column_reset() {
        let mut lx = lexer("a\nb");
        let a = lx.next_token();
        assert_eq!((a.location.line, a.location.column), (1, 1));
        let nl = lx.next_token();
        assert_eq!(nl.kind, TokenKind::Newline);
        let b = lx.next_token();
        assert_eq!((b.location.line, b.location.column), (2, 1));
    }

    #[test]
    fn newlines_become_whitespace_when_not_tracked() {
        let config = LexerConfig {
            track_line_endings: false,
            ..LexerConfig::default()
        };
        let mut lx = Lexer::new(b"a\nb".to_vec(), config);
        assert_eq!(lx.next_token().kind, TokenKind::Identifier);
        let b = lx.next_token();
        assert_eq!(b.kind, TokenKind::Identifier);
        assert_eq!(b.location.line, 2);
    }

    #[test]
    fn whitespace_tokens_when_not_skipping() {
        let config = LexerConfig {
            skip_whitespace: false,
            ..LexerConfig::default()
        };
        let mut lx = Lexer::new(b"a  b".to_vec(), config);
        assert_eq!(lx.next_token().kind, TokenKind::Identifier);
        let ws = lx.next_token();
        assert_eq!(ws.kind, TokenKind::Whitespace);
        assert_eq!(&*ws.text, "  ");
        assert_eq!(lx.next_token().kind, TokenKind::Identifier);
    }

    #[test]
    fn peek_then_next_yields_equal_tokens() {
        let mut lx = lexer("var answer = 42");
        for _ in 0..4 {
            let peeked = lx.peek_token();
            let taken = lx.next_token();
            assert_eq!(peeked, taken);
        }
    }

    #[test]
    fn repeated_peek_is_stable() {
        let mut lx = lexer("frame Main { }");
        let first = lx.peek_token();
        let second = lx.peek_token();
        assert_eq!(first, second);
        assert_eq!(lx.next_token(), first);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut lx = lexer("var x");
        lx.next_token();
        lx.next_token();
        lx.reset(b"const y".to_vec());
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Const);
        assert_eq!((tok.location.line, tok.location.column), (1, 1));
        assert!(lx.last_error().is_none());
    }

    #[test]
    fn every_token_is_stamped_with_the_configured_file() {
        let config = LexerConfig {
            file_name: "stamped.osfl".to_owned(),
            ..LexerConfig::default()
        };
        let mut lx = Lexer::new(b"var x = 1 + 2".to_vec(), config);
        loop {
            let tok = lx.next_token();
            assert_eq!(&*tok.location.file, "stamped.osfl");
            if tok.kind == TokenKind::Eof {
                break;
            }
        }
    }

    #[test]
    fn token_text_never_exceeds_source_length() {
        let source = "var total = alpha + 12_34 * (beta)";
        let mut lx = lexer(source);
        let mut total = 0usize;
        loop {
            let tok = lx.next_token();
            if tok.kind == TokenKind::Eof {
                break;
            }
            if !tok.kind.is_trivia() {
                total += tok.text.len();
            }
        }
        assert!(total <= source.len());
    }

    #[test]
    fn invalid_character_keeps_lexer_usable() {
        let mut lx = lexer("@ var");
        let bad = lx.next_token();
        assert_eq!(bad.kind, TokenKind::Error);
        assert_eq!(lx.last_error().unwrap().kind, LexErrorKind::InvalidChar);
        // The lexer advanced past the failing byte and keeps going.
        assert_eq!(lx.next_token().kind, TokenKind::Var);
        assert!(lx.last_error().is_none());
    }

    #[test]
    fn unterminated_block_comment_sets_error() {
        let mut lx = lexer("/* never closed");
        let tok = lx.next_token();
        assert_eq!(tok.kind, TokenKind::Eof);
        assert_eq!(lx.last_error().unwrap().kind, LexErrorKind::UnterminatedComment);
    }
}

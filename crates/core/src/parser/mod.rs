//! Recursive-descent parser for RPL.
//!
//! Consumes the token stream from [`crate::lexer::tokenize`] and builds a
//! [`Program`]. No names are resolved and nothing is evaluated.
use crate::ast::{Program, Statement};
use crate::error::SyntaxError;
use crate::lexer::{Token, TokenKind};

mod constructs;
mod expressions;

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// Current nesting of conditions, expressions and value lists.
    depth: usize,
    /// Returned once the slice is exhausted, so a stream without a trailing
    /// `Eof` cannot index out of bounds.
    eof: Token,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let (line, column) = tokens
            .last()
            .map(|t| (t.line, t.column + t.text.chars().count() as u32))
            .unwrap_or((1, 1));
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            eof: Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
                column,
            },
        }
    }

    fn cur(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek(&self) -> TokenKind {
        self.cur().kind
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn cur_line(&self) -> u32 {
        self.cur().line
    }

    fn advance(&mut self) -> Token {
        let t = self.cur().clone();
        if t.kind != TokenKind::Eof {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a token of `kind`, or fail with `expected {what}`.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, SyntaxError> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.err(format!("expected {}, found {}", what, self.cur().describe())))
        }
    }

    /// Enter one nesting level, failing past [`MAX_NESTING`]. Levels are
    /// released by resetting `depth`; a failed statement resets it anyway.
    fn descend(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(self.err(format!(
                "conditions, expressions and lists may nest at most {} levels",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect_colon(&mut self) -> Result<(), SyntaxError> {
        self.expect(TokenKind::Colon, "':'").map(|_| ())
    }

    fn err(&self, msg: impl Into<String>) -> SyntaxError {
        let t = self.cur();
        SyntaxError::syntax(t.line, t.column, msg)
    }

    /// Contextual words (`allow`, `on`, `if`, ...) are plain identifiers
    /// to the lexer and matched case-insensitively here.
    fn is_word(&self, w: &str) -> bool {
        self.peek() == TokenKind::Ident && self.cur().text.eq_ignore_ascii_case(w)
    }

    fn expect_word(&mut self, w: &str) -> Result<(), SyntaxError> {
        if self.is_word(w) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', found {}", w, self.cur().describe())))
        }
    }

    fn take_ident(&mut self, what: &str) -> Result<String, SyntaxError> {
        self.expect(TokenKind::Ident, what).map(|t| t.text)
    }

    // -- Top-level ------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        let line = self.cur_line();
        match self.peek() {
            TokenKind::Role => self.parse_role(line).map(Statement::Role),
            TokenKind::User => self.parse_user(line).map(Statement::User),
            TokenKind::Resource => self.parse_resource(line).map(Statement::Resource),
            TokenKind::Group => self.parse_group(line).map(Statement::Group),
            TokenKind::Ident if self.is_word("allow") || self.is_word("deny") => {
                self.parse_rule(line).map(Statement::Rule)
            }
            _ => Err(self.err(format!(
                "expected a declaration (ROLE, USER, RESOURCE, GROUP, ALLOW or DENY), found {}",
                self.cur().describe()
            ))),
        }
    }

    /// A keyword that opens a statement, followed by the identifier that
    /// names it (or the `action` word of a rule).
    fn at_statement_start(&self) -> bool {
        let opener = match self.peek() {
            TokenKind::Role | TokenKind::User | TokenKind::Resource | TokenKind::Group => true,
            TokenKind::Ident => self.is_word("allow") || self.is_word("deny"),
            _ => false,
        };
        opener && self.peek_at(1) == TokenKind::Ident
    }

    /// Skip tokens after an error inside the statement that began at `start`.
    ///
    /// Stops before the next statement opener, or just after the `}` that
    /// closes the broken statement.
    fn recover_to_next_statement(&mut self, start: usize) {
        let mut depth: i32 = self.tokens[start.min(self.tokens.len())..self.pos.min(self.tokens.len())]
            .iter()
            .map(|t| match t.kind {
                TokenKind::LBrace => 1,
                TokenKind::RBrace => -1,
                _ => 0,
            })
            .sum();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    depth -= 1;
                    self.advance();
                    if depth <= 0 {
                        break;
                    }
                }
                _ => {
                    if self.at_statement_start() && self.pos > start {
                        break;
                    }
                    self.advance();
                }
            }
        }
        // A statement that failed on its first token must still move on.
        if self.pos == start {
            self.advance();
        }
    }

    fn parse_program(&mut self, max_errors: usize) -> (Program, Vec<SyntaxError>) {
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        while self.peek() != TokenKind::Eof {
            let start = self.pos;
            self.depth = 0;
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    errors.push(e);
                    if errors.len() >= max_errors {
                        break;
                    }
                    self.recover_to_next_statement(start);
                }
            }
        }

        (Program { statements }, errors)
    }
}

/// Deepest nesting accepted inside a condition. Each `NOT`, parenthesis,
/// unary sign, list bracket and chained binary operator counts one level,
/// which bounds the depth of every condition tree the parser builds.
pub const MAX_NESTING: usize = 128;

/// Default maximum number of syntax errors collected before giving up.
pub const DEFAULT_MAX_ERRORS: usize = 10;

/// Parse a token stream. Returns `None` for the program if any syntax error
/// was found; all errors (up to [`DEFAULT_MAX_ERRORS`]) are reported.
pub fn parse(tokens: &[Token]) -> (Option<Program>, Vec<SyntaxError>) {
    let (program, errors) = parse_recovering(tokens, DEFAULT_MAX_ERRORS);
    if errors.is_empty() {
        (Some(program), errors)
    } else {
        (None, errors)
    }
}

/// Parse in multi-error recovery mode.
///
/// Returns the statements that parsed cleanly plus accumulated errors. When a
/// statement fails, the parser skips to the next statement opener (a
/// statement keyword followed by an identifier) or past the `}` closing the
/// broken statement, then resumes. Stops after `max_errors` errors.
pub fn parse_recovering(tokens: &[Token], max_errors: usize) -> (Program, Vec<SyntaxError>) {
    let mut p = Parser::new(tokens);
    p.parse_program(max_errors.max(1))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

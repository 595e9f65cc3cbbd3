use crate::error::LexError;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Declaration keywords
    Role,
    User,
    Resource,
    Group,
    Extends,
    Permissions,
    Can,
    Actions,
    Resources,
    Conditions,
    Members,
    ValidFrom,
    ValidUntil,
    Path,
    Type,
    Metadata,
    // Resource types
    Api,
    Folder,
    Database,
    // Logical keywords
    And,
    Or,
    Not,
    In,
    Contains,
    // Action words
    Read,
    Write,
    Modify,
    Start,
    Stop,
    Deploy,
    Delete,
    Execute,
    // Literals
    StringLit,
    CharLit,
    IntLit,
    RealLit,
    BoolLit,
    Ident,
    // Operators
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Star, // wildcard or multiply
    Slash,
    Dot,
    // Delimiters
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Eof,
}

/// Keyword spellings. Matching is case-insensitive, letter by letter.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("ROLE", TokenKind::Role),
    ("USER", TokenKind::User),
    ("RESOURCE", TokenKind::Resource),
    ("GROUP", TokenKind::Group),
    ("EXTENDS", TokenKind::Extends),
    ("PERMISSIONS", TokenKind::Permissions),
    ("CAN", TokenKind::Can),
    ("ACTIONS", TokenKind::Actions),
    ("RESOURCES", TokenKind::Resources),
    ("CONDITIONS", TokenKind::Conditions),
    ("MEMBERS", TokenKind::Members),
    ("VALID_FROM", TokenKind::ValidFrom),
    ("VALID_UNTIL", TokenKind::ValidUntil),
    ("PATH", TokenKind::Path),
    ("TYPE", TokenKind::Type),
    ("METADATA", TokenKind::Metadata),
    ("API", TokenKind::Api),
    ("FOLDER", TokenKind::Folder),
    ("DATABASE", TokenKind::Database),
    ("AND", TokenKind::And),
    ("OR", TokenKind::Or),
    ("NOT", TokenKind::Not),
    ("IN", TokenKind::In),
    ("CONTAINS", TokenKind::Contains),
    ("READ", TokenKind::Read),
    ("WRITE", TokenKind::Write),
    ("MODIFY", TokenKind::Modify),
    ("START", TokenKind::Start),
    ("STOP", TokenKind::Stop),
    ("DEPLOY", TokenKind::Deploy),
    ("DELETE", TokenKind::Delete),
    ("EXECUTE", TokenKind::Execute),
];

impl TokenKind {
    /// Symbolic name used in token dumps (`ROLE`, `IDENTIFIER`, `LBRACE`, ...).
    pub fn name(self) -> &'static str {
        if let Some((kw, _)) = KEYWORDS.iter().find(|(_, k)| *k == self) {
            return kw;
        }
        match self {
            TokenKind::StringLit => "STRING",
            TokenKind::CharLit => "CHARACTER",
            TokenKind::IntLit => "INTEGER",
            TokenKind::RealLit => "REAL",
            TokenKind::BoolLit => "BOOLEAN",
            TokenKind::Ident => "IDENTIFIER",
            TokenKind::Eq => "EQ",
            TokenKind::Neq => "NEQ",
            TokenKind::Lt => "LT",
            TokenKind::Gt => "GT",
            TokenKind::Lte => "LTE",
            TokenKind::Gte => "GTE",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "STAR",
            TokenKind::Slash => "DIV",
            TokenKind::Dot => "DOT",
            TokenKind::LBracket => "LBRACK",
            TokenKind::RBracket => "RBRACK",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::Colon => "COLON",
            TokenKind::Comma => "COMMA",
            TokenKind::Eof => "EOF",
            // keywords are handled by the table above
            _ => "KEYWORD",
        }
    }

    pub fn is_keyword(self) -> bool {
        KEYWORDS.iter().any(|(_, k)| *k == self)
    }

    /// READ .. EXECUTE, the words a permission list may contain besides `*`.
    pub fn is_action(self) -> bool {
        matches!(
            self,
            TokenKind::Read
                | TokenKind::Write
                | TokenKind::Modify
                | TokenKind::Start
                | TokenKind::Stop
                | TokenKind::Deploy
                | TokenKind::Delete
                | TokenKind::Execute
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Neq
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::Lte
                | TokenKind::Gte
        )
    }
}

impl Serialize for TokenKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Look up a keyword by comparing each letter against its upper/lower pair,
/// the way the grammar's `[Rr][Oo][Ll][Ee]` classes do.
pub fn keyword(word: &str) -> Option<TokenKind> {
    KEYWORDS.iter().find_map(|(kw, kind)| {
        let same = kw.len() == word.len()
            && kw
                .bytes()
                .zip(word.bytes())
                .all(|(k, w)| k == w || k == w.to_ascii_uppercase());
        same.then_some(*kind)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Exact source lexeme; string and character literals keep their quotes.
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    /// Human form for diagnostics: the quoted lexeme, or `end of input`.
    pub fn describe(&self) -> String {
        if self.kind == TokenKind::Eof {
            "end of input".to_owned()
        } else {
            format!("'{}'", self.text)
        }
    }
}

// ──────────────────────────────────────────────
// Scanner
// ──────────────────────────────────────────────

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl Scanner {
    fn new(src: &str) -> Self {
        Scanner {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn text_from(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) {
        let text = self.text_from(start);
        self.tokens.push(Token {
            kind,
            text,
            line,
            column,
        });
    }

    /// Skip the remainder of the current line, leaving the newline in place.
    fn skip_line(&mut self) {
        while let Some(c) = self.peek_at(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<LexError>) {
        while let Some(c) = self.peek_at(0) {
            let (start, line, column) = (self.pos, self.line, self.column);

            if matches!(c, ' ' | '\t' | '\r' | '\n') {
                self.bump();
                continue;
            }

            if c == '/' && self.peek_at(1) == Some('/') {
                self.skip_line();
                continue;
            }

            if c == '/' && self.peek_at(1) == Some('*') {
                self.bump();
                self.bump();
                let mut closed = false;
                while let Some(bc) = self.bump() {
                    if bc == '*' && self.peek_at(0) == Some('/') {
                        self.bump();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    self.errors
                        .push(LexError::lex(line, column, "unterminated block comment"));
                }
                continue;
            }

            if c == '"' {
                self.string_literal(start, line, column);
                continue;
            }

            if c == '\'' {
                self.char_literal(start, line, column);
                continue;
            }

            if c.is_ascii_digit() {
                self.number(start, line, column);
                continue;
            }

            if c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                self.bump();
                while self.peek_at(0).is_some_and(|d| d.is_ascii_digit()) {
                    self.bump();
                }
                self.push(TokenKind::RealLit, start, line, column);
                continue;
            }

            if c.is_ascii_alphabetic() || c == '_' {
                while self
                    .peek_at(0)
                    .is_some_and(|d| d.is_ascii_alphanumeric() || d == '_')
                {
                    self.bump();
                }
                let word = self.text_from(start);
                let kind = match word.as_str() {
                    "true" | "false" => TokenKind::BoolLit,
                    w => keyword(w).unwrap_or(TokenKind::Ident),
                };
                self.push(kind, start, line, column);
                continue;
            }

            let two = (c, self.peek_at(1).unwrap_or('\0'));
            let double = match two {
                ('=', '=') => Some(TokenKind::Eq),
                ('!', '=') => Some(TokenKind::Neq),
                ('<', '=') => Some(TokenKind::Lte),
                ('>', '=') => Some(TokenKind::Gte),
                _ => None,
            };
            if let Some(kind) = double {
                self.bump();
                self.bump();
                self.push(kind, start, line, column);
                continue;
            }

            let single = match c {
                '<' => Some(TokenKind::Lt),
                '>' => Some(TokenKind::Gt),
                '+' => Some(TokenKind::Plus),
                '-' => Some(TokenKind::Minus),
                '*' => Some(TokenKind::Star),
                '/' => Some(TokenKind::Slash),
                '.' => Some(TokenKind::Dot),
                '[' => Some(TokenKind::LBracket),
                ']' => Some(TokenKind::RBracket),
                '(' => Some(TokenKind::LParen),
                ')' => Some(TokenKind::RParen),
                '{' => Some(TokenKind::LBrace),
                '}' => Some(TokenKind::RBrace),
                ':' => Some(TokenKind::Colon),
                ',' => Some(TokenKind::Comma),
                _ => None,
            };
            self.bump();
            match single {
                Some(kind) => self.push(kind, start, line, column),
                None => self.errors.push(LexError::lex(
                    line,
                    column,
                    format!("unrecognized character '{}'", c.escape_debug()),
                )),
            }
        }

        let eof_line = self.line;
        let eof_column = self.column;
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            line: eof_line,
            column: eof_column,
        });
        (self.tokens, self.errors)
    }

    fn string_literal(&mut self, start: usize, line: u32, column: u32) {
        self.bump(); // opening quote
        loop {
            match self.peek_at(0) {
                None | Some('\n') | Some('\r') => {
                    self.errors
                        .push(LexError::lex(line, column, "unterminated string literal"));
                    self.skip_line();
                    return;
                }
                Some('"') => {
                    self.bump();
                    self.push(TokenKind::StringLit, start, line, column);
                    return;
                }
                Some('\\') => {
                    self.bump();
                    if self.bump().is_none() {
                        self.errors
                            .push(LexError::lex(line, column, "unterminated string literal"));
                        return;
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn char_literal(&mut self, start: usize, line: u32, column: u32) {
        self.bump(); // opening quote
        let body_ok = match self.peek_at(0) {
            Some('\\') => {
                self.bump();
                self.bump().is_some()
            }
            Some('\'') | Some('\n') | Some('\r') | None => false,
            Some(_) => {
                self.bump();
                true
            }
        };
        if body_ok && self.peek_at(0) == Some('\'') {
            self.bump();
            self.push(TokenKind::CharLit, start, line, column);
            return;
        }
        self.errors
            .push(LexError::lex(line, column, "unterminated character literal"));
        self.skip_line();
    }

    fn number(&mut self, start: usize, line: u32, column: u32) {
        while self.peek_at(0).is_some_and(|d| d.is_ascii_digit()) {
            self.bump();
        }
        if self.peek_at(0) == Some('.') {
            self.bump();
            while self.peek_at(0).is_some_and(|d| d.is_ascii_digit()) {
                self.bump();
            }
            self.push(TokenKind::RealLit, start, line, column);
        } else {
            self.push(TokenKind::IntLit, start, line, column);
        }
    }
}

/// Tokenize RPL source.
///
/// Never fails: unrecognized characters are reported and skipped so the
/// full stream is still returned. The stream always ends with one `Eof`.
pub fn tokenize(src: &str) -> (Vec<Token>, Vec<LexError>) {
    Scanner::new(src).run()
}

/// Strip the quotes from a string or character lexeme and resolve escapes.
pub fn unescape(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix(&['"', '\''][..])
        .and_then(|s| s.strip_suffix(&['"', '\''][..]))
        .unwrap_or(lexeme);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

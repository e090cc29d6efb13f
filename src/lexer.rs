//! Lexical analysis for STL.
//!
//! This module tokenizes STL source text into a stream of tokens consumed by
//! the parser. The lexer handles keywords, identifiers, integer and string
//! literals, punctuation, the `->` arrow, and `//` comments.
//!
//! # Example
//!
//! ```rust
//! use stlang::lexer::{Lexer, TokenKind};
//!
//! let mut lexer = Lexer::new("state sTlsState(int) { kConnected }");
//!
//! assert_eq!(lexer.next_token().kind, TokenKind::State);
//! assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
//! assert_eq!(lexer.next_token().kind, TokenKind::LeftParen);
//! ```
//!
//! Integer literals are digit runs only; STL has no negative literals, so a
//! stray `-` (outside `->`) is an unexpected character.

use crate::ast::Span;
use crate::error::LexError;
use serde::{Deserialize, Serialize};

/// A lexical token produced by the lexer.
///
/// Tokens carry their kind, the original source text (lexeme), and source
/// location information for error reporting. For string literals the lexeme
/// holds the unescaped content.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The category of this token
    pub kind: TokenKind,

    /// The original source text that produced this token
    pub lexeme: String,

    /// Source location for error reporting
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }
}

impl Default for Token {
    fn default() -> Self {
        Self {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: Span::default(),
        }
    }
}

/// The category of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // === Declaration Keywords ===
    /// The `const` keyword
    Const,
    /// The `module` keyword
    Module,
    /// The `role` keyword
    Role,
    /// The `state` keyword
    State,
    /// The `transition` keyword
    Transition,
    /// The `message` keyword
    Message,
    /// The `qualifier` keyword
    Qualifier,
    /// The `event` keyword
    Event,

    // === Block Keywords ===
    /// The `pre_states` keyword
    PreStates,
    /// The `post_states` keyword
    PostStates,
    /// The `error_states` keyword
    ErrorStates,
    /// The `events` keyword
    Events,

    // === Message Keywords ===
    /// The `encode` keyword
    Encode,
    /// The `external` keyword
    External,
    /// The `required` multiplicity
    Required,
    /// The `optional` multiplicity
    Optional,
    /// The `repeated` multiplicity
    Repeated,

    // === Type Keywords ===
    /// The `int` type keyword
    Int,
    /// The `bool` type keyword
    Bool,
    /// The `string` type keyword
    StringType,

    // === Literals ===
    /// The `true` literal
    True,
    /// The `false` literal
    False,
    /// An integer literal (digits only)
    IntLiteral,
    /// A double-quoted string literal
    StringLiteral,
    /// An identifier
    Identifier,

    // === Punctuation ===
    /// Left brace `{`
    LeftBrace,
    /// Right brace `}`
    RightBrace,
    /// Left bracket `[`
    LeftBracket,
    /// Right bracket `]`
    RightBracket,
    /// Left parenthesis `(`
    LeftParen,
    /// Right parenthesis `)`
    RightParen,
    /// Comma `,`
    Comma,
    /// Semicolon `;`
    Semicolon,
    /// Member access `.`
    Dot,
    /// Equals `=`
    Equal,
    /// Reference marker `&`
    Ampersand,
    /// Reserved `*`
    Star,
    /// The arrow `->`
    Arrow,

    // === Special ===
    /// End of file
    Eof,
    /// Unrecognized input
    Error,
}

impl TokenKind {
    /// Returns true if this is a keyword.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Const
                | TokenKind::Module
                | TokenKind::Role
                | TokenKind::State
                | TokenKind::Transition
                | TokenKind::Message
                | TokenKind::Qualifier
                | TokenKind::Event
                | TokenKind::PreStates
                | TokenKind::PostStates
                | TokenKind::ErrorStates
                | TokenKind::Events
                | TokenKind::Encode
                | TokenKind::External
                | TokenKind::Required
                | TokenKind::Optional
                | TokenKind::Repeated
                | TokenKind::Int
                | TokenKind::Bool
                | TokenKind::StringType
                | TokenKind::True
                | TokenKind::False
        )
    }

    /// Returns true if this token starts a type.
    pub fn is_type_start(&self) -> bool {
        matches!(
            self,
            TokenKind::Int | TokenKind::Bool | TokenKind::StringType | TokenKind::Identifier
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Const => write!(f, "const"),
            TokenKind::Module => write!(f, "module"),
            TokenKind::Role => write!(f, "role"),
            TokenKind::State => write!(f, "state"),
            TokenKind::Transition => write!(f, "transition"),
            TokenKind::Message => write!(f, "message"),
            TokenKind::Qualifier => write!(f, "qualifier"),
            TokenKind::Event => write!(f, "event"),
            TokenKind::PreStates => write!(f, "pre_states"),
            TokenKind::PostStates => write!(f, "post_states"),
            TokenKind::ErrorStates => write!(f, "error_states"),
            TokenKind::Events => write!(f, "events"),
            TokenKind::Encode => write!(f, "encode"),
            TokenKind::External => write!(f, "external"),
            TokenKind::Required => write!(f, "required"),
            TokenKind::Optional => write!(f, "optional"),
            TokenKind::Repeated => write!(f, "repeated"),
            TokenKind::Int => write!(f, "int"),
            TokenKind::Bool => write!(f, "bool"),
            TokenKind::StringType => write!(f, "string"),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::IntLiteral => write!(f, "integer"),
            TokenKind::StringLiteral => write!(f, "string literal"),
            TokenKind::Identifier => write!(f, "identifier"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::Error => write!(f, "error"),
        }
    }
}

/// The lexer for STL source text.
///
/// The lexer maintains internal state as it scans through source text,
/// producing tokens on demand. Whitespace and `//` comments are skipped
/// automatically; source locations are tracked for every token.
pub struct Lexer<'a> {
    /// Remaining source to process
    remaining: &'a str,

    /// Current byte position in source
    position: usize,

    /// Current line number (1-indexed)
    line: usize,

    /// Current column number (1-indexed)
    column: usize,

    /// Accumulated errors
    errors: Vec<LexError>,

    /// True once Eof has been produced (stops the iterator)
    finished: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            remaining: source,
            position: 0,
            line: 1,
            column: 1,
            errors: Vec::new(),
            finished: false,
        }
    }

    /// Returns any errors accumulated during lexing.
    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    /// Returns the most recent lexing error, if any.
    pub fn last_error(&self) -> Option<LexError> {
        self.errors.last().cloned()
    }

    /// Produces the next token from the source.
    ///
    /// Advances the lexer position and returns the next token. Returns a
    /// `TokenKind::Eof` token when the source is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        if self.remaining.is_empty() {
            return Token::new(
                TokenKind::Eof,
                "",
                Span::new(self.position, self.position, self.line, self.column),
            );
        }

        if let Some(token) = self.try_string() {
            return token;
        }

        if let Some(token) = self.try_number() {
            return token;
        }

        if let Some(token) = self.try_punctuation() {
            return token;
        }

        if let Some(token) = self.try_keyword_or_identifier() {
            return token;
        }

        // Unknown character - record the error and produce an error token
        let start_pos = self.position;
        let start_line = self.line;
        let start_col = self.column;
        let ch = match self.remaining.chars().next() {
            Some(ch) => ch,
            None => {
                return Token::new(
                    TokenKind::Eof,
                    "",
                    Span::new(self.position, self.position, self.line, self.column),
                )
            }
        };
        self.advance(ch.len_utf8());

        let span = Span::new(start_pos, self.position, start_line, start_col);
        self.errors.push(LexError::UnexpectedChar { ch, span });
        Token::new(TokenKind::Error, ch.to_string(), span)
    }

    /// Skips whitespace and `//` comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let before = self.remaining.len();
            self.skip_whitespace();
            if self.remaining.starts_with("//") {
                self.skip_line_comment();
            }
            if self.remaining.len() == before {
                break;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.remaining.chars().next() {
            if ch.is_whitespace() {
                self.advance(ch.len_utf8());
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.remaining.chars().next() {
            self.advance(ch.len_utf8());
            if ch == '\n' {
                break;
            }
        }
    }

    /// Tries to lex a string literal. `\` escapes the next character;
    /// `\n`, `\t`, `\r` map to their control characters.
    fn try_string(&mut self) -> Option<Token> {
        if !self.remaining.starts_with('"') {
            return None;
        }

        let start_pos = self.position;
        let start_line = self.line;
        let start_col = self.column;

        self.advance(1); // opening quote

        let mut content = String::new();
        while let Some(ch) = self.remaining.chars().next() {
            if ch == '\\' {
                self.advance(1);
                match self.remaining.chars().next() {
                    Some(escaped) => {
                        content.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                        self.advance(escaped.len_utf8());
                    }
                    None => {
                        let span =
                            Span::new(self.position - 1, self.position, self.line, self.column);
                        self.errors.push(LexError::StrayEscape { span });
                        return Some(Token::new(
                            TokenKind::Error,
                            content,
                            Span::new(start_pos, self.position, start_line, start_col),
                        ));
                    }
                }
            } else if ch == '"' {
                self.advance(1); // closing quote
                return Some(Token::new(
                    TokenKind::StringLiteral,
                    content,
                    Span::new(start_pos, self.position, start_line, start_col),
                ));
            } else if ch == '\n' {
                let span = Span::new(start_pos, self.position, start_line, start_col);
                self.errors.push(LexError::UnterminatedString { span });
                return Some(Token::new(TokenKind::Error, content, span));
            } else {
                content.push(ch);
                self.advance(ch.len_utf8());
            }
        }

        // EOF while inside the string
        let span = Span::new(start_pos, self.position, start_line, start_col);
        self.errors.push(LexError::UnterminatedString { span });
        Some(Token::new(TokenKind::Error, content, span))
    }

    /// Tries to lex an integer literal (digits only, non-negative).
    fn try_number(&mut self) -> Option<Token> {
        let first = self.remaining.chars().next()?;
        if !first.is_ascii_digit() {
            return None;
        }

        let start_pos = self.position;
        let start_line = self.line;
        let start_col = self.column;

        let mut text = String::new();
        while let Some(ch) = self.remaining.chars().next() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance(1);
            } else {
                break;
            }
        }

        let span = Span::new(start_pos, self.position, start_line, start_col);
        if text.parse::<i64>().is_err() {
            self.errors.push(LexError::IntegerOverflow {
                text: text.clone(),
                span,
            });
            return Some(Token::new(TokenKind::Error, text, span));
        }
        Some(Token::new(TokenKind::IntLiteral, text, span))
    }

    /// Tries to lex punctuation or the arrow.
    fn try_punctuation(&mut self) -> Option<Token> {
        let start_pos = self.position;
        let start_line = self.line;
        let start_col = self.column;

        let (kind, len) = if self.remaining.starts_with("->") {
            (TokenKind::Arrow, 2)
        } else if self.remaining.starts_with("//") {
            return None;
        } else if self.remaining.starts_with('{') {
            (TokenKind::LeftBrace, 1)
        } else if self.remaining.starts_with('}') {
            (TokenKind::RightBrace, 1)
        } else if self.remaining.starts_with('[') {
            (TokenKind::LeftBracket, 1)
        } else if self.remaining.starts_with(']') {
            (TokenKind::RightBracket, 1)
        } else if self.remaining.starts_with('(') {
            (TokenKind::LeftParen, 1)
        } else if self.remaining.starts_with(')') {
            (TokenKind::RightParen, 1)
        } else if self.remaining.starts_with(',') {
            (TokenKind::Comma, 1)
        } else if self.remaining.starts_with(';') {
            (TokenKind::Semicolon, 1)
        } else if self.remaining.starts_with('.') {
            (TokenKind::Dot, 1)
        } else if self.remaining.starts_with('=') {
            (TokenKind::Equal, 1)
        } else if self.remaining.starts_with('&') {
            (TokenKind::Ampersand, 1)
        } else if self.remaining.starts_with('*') {
            (TokenKind::Star, 1)
        } else {
            return None;
        };

        let lexeme: String = self.remaining.chars().take(len).collect();
        self.advance(len);

        Some(Token::new(
            kind,
            lexeme,
            Span::new(start_pos, self.position, start_line, start_col),
        ))
    }

    /// Tries to lex a keyword or identifier.
    ///
    /// Identifiers start with a letter and continue with letters, digits,
    /// and underscores.
    fn try_keyword_or_identifier(&mut self) -> Option<Token> {
        let first = self.remaining.chars().next()?;
        if !first.is_alphabetic() {
            return None;
        }

        let start_pos = self.position;
        let start_line = self.line;
        let start_col = self.column;

        let mut lexeme = String::new();
        while let Some(ch) = self.remaining.chars().next() {
            if ch.is_alphanumeric() || ch == '_' {
                lexeme.push(ch);
                self.advance(ch.len_utf8());
            } else {
                break;
            }
        }

        let kind = keyword_kind(&lexeme).unwrap_or(TokenKind::Identifier);
        Some(Token::new(
            kind,
            lexeme,
            Span::new(start_pos, self.position, start_line, start_col),
        ))
    }

    /// Consumes `len` bytes, updating position, line, and column.
    fn advance(&mut self, len: usize) {
        let consumed = &self.remaining[..len];
        for ch in consumed.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position += len;
        self.remaining = &self.remaining[len..];
    }
}

/// Maps keyword text to its token kind.
fn keyword_kind(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "const" => TokenKind::Const,
        "module" => TokenKind::Module,
        "role" => TokenKind::Role,
        "state" => TokenKind::State,
        "transition" => TokenKind::Transition,
        "message" => TokenKind::Message,
        "qualifier" => TokenKind::Qualifier,
        "event" => TokenKind::Event,
        "pre_states" => TokenKind::PreStates,
        "post_states" => TokenKind::PostStates,
        "error_states" => TokenKind::ErrorStates,
        "events" => TokenKind::Events,
        "encode" => TokenKind::Encode,
        "external" => TokenKind::External,
        "required" => TokenKind::Required,
        "optional" => TokenKind::Optional,
        "repeated" => TokenKind::Repeated,
        "int" => TokenKind::Int,
        "bool" => TokenKind::Bool,
        "string" => TokenKind::StringType,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    };
    Some(kind)
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.finished = true;
            return None;
        }
        Some(token)
    }
}

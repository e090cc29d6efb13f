//! Parser for STL.
//!
//! This module provides a recursive descent parser with one token of
//! lookahead that transforms a stream of tokens into the syntactic tree
//! defined in [`crate::ast`].
//!
//! # Example
//!
//! ```rust
//! use stlang::parser::Parser;
//!
//! let input = r#"
//! module tls;
//!
//! state sTlsState(int) { kNotConnected, kConnected }
//! "#;
//!
//! let mut parser = Parser::new(input);
//! let file = parser.parse_source_file().unwrap();
//! assert_eq!(file.module, "tls");
//! assert_eq!(file.decls.len(), 1);
//! ```

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};

/// The parser for STL source text.
///
/// The parser uses recursive descent to transform tokens into an AST and
/// reports syntax violations with source locations.
pub struct Parser<'a> {
    /// The underlying lexer
    lexer: Lexer<'a>,

    /// Current token
    current: Token,

    /// Previous token (for span tracking)
    previous: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source text.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            previous: Token::default(),
        }
    }

    /// Parses a complete STL file: module header plus declarations.
    pub fn parse_source_file(&mut self) -> Result<SourceFile, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Module, "module header")?;
        let module = self.parse_dotted_name("module name")?;
        self.expect(TokenKind::Semicolon, "';' after module name")?;
        let span = start.merge(&self.previous.span);

        let mut decls = Vec::new();
        while self.current.kind != TokenKind::Eof {
            decls.push(self.parse_decl()?);
        }

        Ok(SourceFile {
            module,
            decls,
            span,
        })
    }

    /// Parses a single top-level declaration.
    fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        self.bail_if_lex_error()?;
        match self.current.kind {
            TokenKind::Const => self.parse_const().map(Decl::Const),
            TokenKind::State => self.parse_state().map(Decl::State),
            TokenKind::Role => self.parse_role().map(Decl::Role),
            TokenKind::Message => self.parse_message().map(Decl::Message),
            TokenKind::Qualifier => self.parse_qualifier().map(Decl::Qualifier),
            TokenKind::Event => self.parse_event().map(Decl::Event),
            TokenKind::Transition => self.parse_transition_or_binding(),
            TokenKind::Eof => Err(self.eof_error("declaration")),
            _ => Err(self.unexpected("a declaration keyword")),
        }
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    /// `const <type> <name> = <literal | name>;`
    fn parse_const(&mut self) -> Result<ConstDecl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Const, "'const'")?;
        let ty = self.parse_type()?;
        let name = self.expect_identifier("constant name")?;
        self.expect(TokenKind::Equal, "'=' in constant declaration")?;

        let value = if let Some(lit) = self.try_parse_literal()? {
            ConstValue::Literal(lit)
        } else if self.current.kind == TokenKind::Identifier {
            ConstValue::Ref(self.parse_dotted_name("constant reference")?)
        } else {
            return Err(self.unexpected("a literal or constant reference"));
        };

        self.expect(TokenKind::Semicolon, "';' after constant")?;
        Ok(ConstDecl {
            name,
            ty,
            value,
            span: start.merge(&self.previous.span),
        })
    }

    /// `state <name>(<types>) { <value>, ... }`
    fn parse_state(&mut self) -> Result<StateDecl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::State, "'state'")?;
        let name = self.expect_identifier("state name")?;

        self.expect(TokenKind::LeftParen, "'(' after state name")?;
        let mut params = Vec::new();
        if self.current.kind != TokenKind::RightParen {
            loop {
                params.push(self.parse_type()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')' after state parameters")?;

        self.expect(TokenKind::LeftBrace, "'{' before state values")?;
        let mut values = vec![self.expect_identifier("state value")?];
        while self.eat(TokenKind::Comma) {
            values.push(self.expect_identifier("state value")?);
        }
        self.expect(TokenKind::RightBrace, "'}' after state values")?;

        Ok(StateDecl {
            name,
            params,
            values,
            span: start.merge(&self.previous.span),
        })
    }

    /// `role <name> { <type> <field>; ... }`
    fn parse_role(&mut self) -> Result<RoleDecl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Role, "'role'")?;
        let name = self.expect_identifier("role name")?;
        self.expect(TokenKind::LeftBrace, "'{' after role name")?;

        let mut fields = Vec::new();
        while self.current.kind != TokenKind::RightBrace {
            let field_start = self.current.span;
            let ty = self.parse_type()?;
            let field_name = self.expect_identifier("role field name")?;
            self.expect(TokenKind::Semicolon, "';' after role field")?;
            fields.push(RoleField {
                ty,
                name: field_name,
                span: field_start.merge(&self.previous.span),
            });
        }
        self.expect(TokenKind::RightBrace, "'}' after role fields")?;

        Ok(RoleDecl {
            name,
            fields,
            span: start.merge(&self.previous.span),
        })
    }

    /// `message <name>[]? { encode "..."; external "..."; <fields>; <nested> }`
    fn parse_message(&mut self) -> Result<MessageDecl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Message, "'message'")?;
        let name = self.expect_identifier("message name")?;

        let is_array = if self.eat(TokenKind::LeftBracket) {
            self.expect(TokenKind::RightBracket, "']' in array message declaration")?;
            true
        } else {
            false
        };

        self.expect(TokenKind::LeftBrace, "'{' after message name")?;

        let mut encoding = Encoding::default();
        let mut external = None;
        let mut fields = Vec::new();
        let mut nested = Vec::new();

        while self.current.kind != TokenKind::RightBrace {
            match self.current.kind {
                TokenKind::Encode => {
                    self.advance();
                    let token = self.expect(TokenKind::StringLiteral, "encoding name string")?;
                    encoding = match token.lexeme.as_str() {
                        "json" => Encoding::Json,
                        "bytestream" => Encoding::Bytestream,
                        "protobuf" => Encoding::Protobuf,
                        other => {
                            return Err(ParseError::UnknownEncoding {
                                name: other.to_string(),
                                span: token.span,
                            })
                        }
                    };
                    self.expect(TokenKind::Semicolon, "';' after encoding")?;
                }
                TokenKind::External => {
                    self.advance();
                    let token = self.expect(TokenKind::StringLiteral, "external reference")?;
                    external = Some(token.lexeme);
                    self.expect(TokenKind::Semicolon, "';' after external reference")?;
                }
                TokenKind::Required | TokenKind::Optional | TokenKind::Repeated => {
                    fields.push(self.parse_field()?);
                }
                TokenKind::Message => {
                    nested.push(self.parse_message()?);
                }
                TokenKind::Eof => return Err(self.eof_error("message body")),
                _ => return Err(self.unexpected("a message item")),
            }
        }
        self.expect(TokenKind::RightBrace, "'}' after message body")?;

        Ok(MessageDecl {
            name,
            is_array,
            encoding,
            external,
            fields,
            nested,
            span: start.merge(&self.previous.span),
        })
    }

    /// `<multiplicity> <type> <name>;`
    fn parse_field(&mut self) -> Result<FieldDecl, ParseError> {
        let start = self.current.span;
        let multiplicity = match self.current.kind {
            TokenKind::Required => Multiplicity::Required,
            TokenKind::Optional => Multiplicity::Optional,
            TokenKind::Repeated => Multiplicity::Repeated,
            _ => return Err(self.unexpected("a field multiplicity")),
        };
        self.advance();
        let ty = self.parse_type()?;
        let name = self.expect_identifier("field name")?;
        self.expect(TokenKind::Semicolon, "';' after field")?;
        Ok(FieldDecl {
            multiplicity,
            ty,
            name,
            span: start.merge(&self.previous.span),
        })
    }

    /// `qualifier <type> <name>(<params>) = external "...";`
    fn parse_qualifier(&mut self) -> Result<QualifierDecl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Qualifier, "'qualifier'")?;
        let return_ty = self.parse_type()?;
        let name = self.expect_identifier("qualifier name")?;

        self.expect(TokenKind::LeftParen, "'(' after qualifier name")?;
        let params = self.parse_param_list(false)?;
        self.expect(TokenKind::Equal, "'=' in qualifier declaration")?;
        self.expect(TokenKind::External, "'external' in qualifier declaration")?;
        let token = self.expect(TokenKind::StringLiteral, "external reference")?;
        self.expect(TokenKind::Semicolon, "';' after qualifier")?;

        Ok(QualifierDecl {
            name,
            return_ty,
            params,
            external: token.lexeme,
            span: start.merge(&self.previous.span),
        })
    }

    /// `event <name>(<params>) [= external "..." | = Event(<args>)];`
    fn parse_event(&mut self) -> Result<EventDecl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Event, "'event'")?;
        let name = self.expect_identifier("event name")?;

        self.expect(TokenKind::LeftParen, "'(' after event name")?;
        let params = self.parse_param_list(true)?;

        let body = if self.eat(TokenKind::Equal) {
            if self.eat(TokenKind::External) {
                let token = self.expect(TokenKind::StringLiteral, "external reference")?;
                EventBody::External(token.lexeme)
            } else {
                let callee = self.parse_dotted_name("event name")?;
                self.expect(TokenKind::LeftParen, "'(' in composite event body")?;
                let args = self.parse_args()?;
                EventBody::Composite { callee, args }
            }
        } else {
            EventBody::NoOp
        };
        self.expect(TokenKind::Semicolon, "';' after event declaration")?;

        Ok(EventDecl {
            name,
            params,
            body,
            span: start.merge(&self.previous.span),
        })
    }

    /// Dispatches between a transition declaration and a transition binding.
    fn parse_transition_or_binding(&mut self) -> Result<Decl, ParseError> {
        let start = self.current.span;
        self.expect(TokenKind::Transition, "'transition'")?;
        let name = self.expect_identifier("transition name")?;

        if self.eat(TokenKind::Equal) {
            // transition <name> = <decl>(<args>);
            let target = self.parse_dotted_name("transition reference")?;
            self.expect(TokenKind::LeftParen, "'(' in transition binding")?;
            let args = self.parse_args()?;
            self.expect(TokenKind::Semicolon, "';' after transition binding")?;
            return Ok(Decl::Binding(BindingDecl {
                name,
                target,
                args,
                span: start.merge(&self.previous.span),
            }));
        }

        self.expect(TokenKind::LeftParen, "'(' after transition name")?;
        let params = self.parse_param_list(false)?;
        self.expect(TokenKind::LeftBrace, "'{' after transition header")?;

        let mut locals = Vec::new();
        let mut pre_states = Vec::new();
        let mut events = Vec::new();
        let mut post_states = Vec::new();
        let mut error_states = None;

        while self.current.kind != TokenKind::RightBrace {
            match self.current.kind {
                TokenKind::PreStates => {
                    self.advance();
                    self.expect(TokenKind::LeftBrace, "'{' after pre_states")?;
                    while self.current.kind != TokenKind::RightBrace {
                        pre_states.push(self.parse_pre_state_entry()?);
                    }
                    self.expect(TokenKind::RightBrace, "'}' after pre_states")?;
                }
                TokenKind::Events => {
                    self.advance();
                    self.expect(TokenKind::LeftBrace, "'{' after events")?;
                    while self.current.kind != TokenKind::RightBrace {
                        events.push(self.parse_event_line()?);
                    }
                    self.expect(TokenKind::RightBrace, "'}' after events")?;
                }
                TokenKind::PostStates => {
                    self.advance();
                    self.expect(TokenKind::LeftBrace, "'{' after post_states")?;
                    while self.current.kind != TokenKind::RightBrace {
                        post_states.push(self.parse_post_state_entry()?);
                    }
                    self.expect(TokenKind::RightBrace, "'}' after post_states")?;
                }
                TokenKind::ErrorStates => {
                    self.advance();
                    self.expect(TokenKind::LeftBrace, "'{' after error_states")?;
                    let entries = error_states.get_or_insert_with(Vec::new);
                    while self.current.kind != TokenKind::RightBrace {
                        entries.push(self.parse_post_state_entry()?);
                    }
                    self.expect(TokenKind::RightBrace, "'}' after error_states")?;
                }
                TokenKind::Int | TokenKind::Bool | TokenKind::StringType | TokenKind::Identifier => {
                    let local_start = self.current.span;
                    let ty = self.parse_type()?;
                    let local_name = self.expect_identifier("local variable name")?;
                    self.expect(TokenKind::Semicolon, "';' after local variable")?;
                    locals.push(LocalDecl {
                        ty,
                        name: local_name,
                        span: local_start.merge(&self.previous.span),
                    });
                }
                TokenKind::Eof => return Err(self.eof_error("transition body")),
                _ => return Err(self.unexpected("a transition item")),
            }
        }
        self.expect(TokenKind::RightBrace, "'}' after transition body")?;

        Ok(Decl::Transition(TransitionDecl {
            name,
            params,
            locals,
            pre_states,
            events,
            post_states,
            error_states,
            span: start.merge(&self.previous.span),
        }))
    }

    /// `sName(<args>) = <value>;` or `sName(<args>) = [<value>, ...];`
    fn parse_pre_state_entry(&mut self) -> Result<PreStateEntry, ParseError> {
        let start = self.current.span;
        let state = self.parse_state_ref()?;
        self.expect(TokenKind::Equal, "'=' in pre_states entry")?;

        let values = if self.eat(TokenKind::LeftBracket) {
            let mut values = vec![self.expect_identifier("state value")?];
            while self.eat(TokenKind::Comma) {
                values.push(self.expect_identifier("state value")?);
            }
            self.expect(TokenKind::RightBracket, "']' after value set")?;
            values
        } else {
            vec![self.expect_identifier("state value")?]
        };

        self.expect(TokenKind::Semicolon, "';' after pre_states entry")?;
        Ok(PreStateEntry {
            state,
            values,
            span: start.merge(&self.previous.span),
        })
    }

    /// `sName(<args>) = <value>;`
    fn parse_post_state_entry(&mut self) -> Result<PostStateEntry, ParseError> {
        let start = self.current.span;
        let state = self.parse_state_ref()?;
        self.expect(TokenKind::Equal, "'=' in state assignment")?;
        let value = self.expect_identifier("state value")?;
        self.expect(TokenKind::Semicolon, "';' after state assignment")?;
        Ok(PostStateEntry {
            state,
            value,
            span: start.merge(&self.previous.span),
        })
    }

    /// `sName(<args>)`
    fn parse_state_ref(&mut self) -> Result<StateRef, ParseError> {
        let start = self.current.span;
        let name = self.parse_dotted_name("state name")?;
        self.expect(TokenKind::LeftParen, "'(' after state name")?;
        let args = self.parse_args()?;
        Ok(StateRef {
            name,
            args,
            span: start.merge(&self.previous.span),
        })
    }

    /// `<source> -> <Event>(<args>) -> <target>;`
    fn parse_event_line(&mut self) -> Result<EventLine, ParseError> {
        let start = self.current.span;
        let source = self.parse_dotted_name("source role")?;
        self.expect(TokenKind::Arrow, "'->' after source role")?;
        let event = self.parse_dotted_name("event name")?;
        self.expect(TokenKind::LeftParen, "'(' after event name")?;
        let args = self.parse_args()?;
        self.expect(TokenKind::Arrow, "'->' before target role")?;
        let target = self.parse_dotted_name("target role")?;
        self.expect(TokenKind::Semicolon, "';' after event line")?;
        Ok(EventLine {
            source,
            event,
            args,
            target,
            span: start.merge(&self.previous.span),
        })
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// Parses a comma-separated argument list and the closing ')'.
    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.current.kind != TokenKind::RightParen {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')' after arguments")?;
        Ok(args)
    }

    /// Parses a single expression.
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.bail_if_lex_error()?;
        let start = self.current.span;

        if let Some(value) = self.try_parse_literal()? {
            return Ok(Expr::Literal {
                value,
                span: start.merge(&self.previous.span),
            });
        }

        if self.current.kind != TokenKind::Identifier {
            return Err(self.unexpected("an expression"));
        }
        let name = self.parse_dotted_name("name")?;

        match self.current.kind {
            TokenKind::LeftParen => {
                self.advance();
                let args = self.parse_args()?;
                let write_to = if self.eat(TokenKind::Arrow) {
                    Some(self.expect_identifier("write target")?)
                } else {
                    None
                };
                Ok(Expr::Call {
                    name,
                    args,
                    write_to,
                    span: start.merge(&self.previous.span),
                })
            }
            TokenKind::LeftBrace => {
                let fields = self.parse_field_inits()?;
                Ok(Expr::MessageLit(MessageLit {
                    message: name,
                    fields,
                    span: start.merge(&self.previous.span),
                }))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if self.current.kind != TokenKind::RightBracket {
                    loop {
                        elements.push(self.parse_field_inits()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RightBracket, "']' after array literal")?;
                Ok(Expr::ArrayLit {
                    message: name,
                    elements,
                    span: start.merge(&self.previous.span),
                })
            }
            _ => Ok(Expr::Name {
                name,
                span: start.merge(&self.previous.span),
            }),
        }
    }

    /// Parses `{ <field> = <expr>; ... }`.
    fn parse_field_inits(&mut self) -> Result<Vec<FieldInit>, ParseError> {
        self.expect(TokenKind::LeftBrace, "'{' in message literal")?;
        let mut fields = Vec::new();
        while self.current.kind != TokenKind::RightBrace {
            let start = self.current.span;
            let name = self.expect_identifier("field name")?;
            self.expect(TokenKind::Equal, "'=' in field assignment")?;
            let value = self.parse_expr()?;
            self.expect(TokenKind::Semicolon, "';' after field assignment")?;
            fields.push(FieldInit {
                name,
                value,
                span: start.merge(&self.previous.span),
            });
        }
        self.expect(TokenKind::RightBrace, "'}' after message literal")?;
        Ok(fields)
    }

    /// Parses a literal if the current token is one.
    fn try_parse_literal(&mut self) -> Result<Option<Literal>, ParseError> {
        let lit = match self.current.kind {
            TokenKind::IntLiteral => {
                // The lexer has already validated the digits
                let n = self.current.lexeme.parse::<i64>().unwrap_or_default();
                Literal::Int(n)
            }
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            TokenKind::StringLiteral => Literal::Str(self.current.lexeme.clone()),
            _ => return Ok(None),
        };
        self.advance();
        Ok(Some(lit))
    }

    // -----------------------------------------------------------------------
    // Shared pieces
    // -----------------------------------------------------------------------

    /// Parses a type name: `int`, `bool`, `string`, or a message reference.
    fn parse_type(&mut self) -> Result<TypeName, ParseError> {
        match self.current.kind {
            TokenKind::Int => {
                self.advance();
                Ok(TypeName::Int)
            }
            TokenKind::Bool => {
                self.advance();
                Ok(TypeName::Bool)
            }
            TokenKind::StringType => {
                self.advance();
                Ok(TypeName::String)
            }
            TokenKind::Identifier => Ok(TypeName::Message(self.parse_dotted_name("type name")?)),
            _ => Err(self.unexpected("a type")),
        }
    }

    /// Parses `([&] <type> <name>, ...)` up to and including the ')'.
    ///
    /// `allow_ref` permits the `&` reference marker (event parameters only).
    fn parse_param_list(&mut self, allow_ref: bool) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if self.current.kind != TokenKind::RightParen {
            loop {
                let start = self.current.span;
                let by_ref = if self.current.kind == TokenKind::Ampersand {
                    if !allow_ref {
                        return Err(self.unexpected("a parameter type"));
                    }
                    self.advance();
                    true
                } else {
                    false
                };
                let ty = self.parse_type()?;
                let name = self.expect_identifier("parameter name")?;
                params.push(Param {
                    ty,
                    name,
                    by_ref,
                    span: start.merge(&self.previous.span),
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')' after parameters")?;
        Ok(params)
    }

    /// Parses `IDENT (. IDENT)*` into a dotted name.
    fn parse_dotted_name(&mut self, what: &str) -> Result<String, ParseError> {
        let mut name = self.expect_identifier(what)?;
        while self.current.kind == TokenKind::Dot {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_identifier(what)?);
        }
        Ok(name)
    }

    /// Consumes an identifier token and returns its text.
    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        let token = self.expect(TokenKind::Identifier, what)?;
        Ok(token.lexeme)
    }

    /// Consumes a token of the given kind or fails.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        self.bail_if_lex_error()?;
        if self.current.kind == kind {
            let token = self.current.clone();
            self.advance();
            Ok(token)
        } else if self.current.kind == TokenKind::Eof {
            Err(self.eof_error(what))
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Consumes the current token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.current.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    /// Converts an error token into the underlying lexer error.
    fn bail_if_lex_error(&mut self) -> Result<(), ParseError> {
        if self.current.kind == TokenKind::Error {
            if let Some(err) = self.lexer.last_error() {
                return Err(ParseError::Lexer(err));
            }
        }
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = if self.current.kind == TokenKind::Identifier {
            format!("'{}'", self.current.lexeme)
        } else {
            format!("'{}'", self.current.kind)
        };
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            span: self.current.span,
        }
    }

    fn eof_error(&self, context: &str) -> ParseError {
        ParseError::UnexpectedEof {
            context: context.to_string(),
            span: self.current.span,
        }
    }
}

/// Parses several STL sources, returning one tree per source.
pub fn parse_sources<S: AsRef<str>>(sources: &[S]) -> Result<Vec<SourceFile>, ParseError> {
    sources
        .iter()
        .map(|source| Parser::new(source.as_ref()).parse_source_file())
        .collect()
}

//! # STL - State Transition Language
//!
//! STL is a small domain-specific language for conformance-testing
//! distributed protocols. A protocol is described as roles, states,
//! messages, qualifiers, events, and transitions; this crate parses that
//! description, links and type-checks it, and then executes it: from a given
//! pre-state it drives roles through firable transitions, invoking
//! externally-registered primitives for every I/O effect, and commits
//! `post_states` or `error_states` atomically per transition.
//!
//! ## Pipeline
//!
//! ```text
//! .stl sources -> Lexer -> Parser -> Linker -> TypeChecker -> Program
//!                                                                |
//!                             Registry (host primitives) -> Executor
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use stlang::compile;
//!
//! let source = r#"
//! module tls;
//!
//! state sTlsState(int) { kNotConnected, kConnected }
//!
//! role rSender { string ipAddress; }
//! role rReceiver { string ipAddress; }
//!
//! event eConnect(int sessionId) = external "stl.events.LogParams";
//!
//! transition tConnect(int sessionId) {
//!   pre_states { sTlsState(sessionId) = [kNotConnected]; }
//!   events { rSender -> eConnect(sessionId) -> rReceiver; }
//!   post_states { sTlsState(sessionId) = kConnected; }
//! }
//!
//! transition tConnectActual = tConnect(1);
//! "#;
//!
//! let program = compile(&[source]).expect("a well-formed program");
//! assert!(program.binding("tls::tConnectActual").is_some());
//! ```
//!
//! ## Modules
//!
//! - [`ast`]: syntactic tree produced by the parser
//! - [`lexer`]: tokenization of STL source text
//! - [`parser`]: recursive descent parser
//! - [`error`]: error types with source location information
//! - [`linker`]: name resolution producing the linked [`program::Program`]
//! - [`typecheck`]: type checking over the linked program
//! - [`value`]: runtime values and the canonical JSON codec
//! - [`registry`]: the external primitive registry
//! - [`builtins`]: stock primitives (`LogParams`, `UniqueInt`, ...)
//! - [`executor`]: the transition executor
//! - [`manifest`]: test manifest loading with `$key` substitution

#![doc(html_root_url = "https://docs.rs/stl/0.3.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ast;
pub mod builtins;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod linker;
pub mod manifest;
pub mod parser;
pub mod program;
pub mod registry;
pub mod typecheck;
pub mod value;

// Re-exports for convenience
pub use ast::{SourceFile, Span};
pub use error::{CompileError, LexError, LinkError, ManifestError, ParseError, RegistryError};
pub use executor::{Executor, SelectionPolicy, StepOutcome, TransitionResult};
pub use lexer::{Lexer, Token, TokenKind};
pub use linker::link;
pub use parser::Parser;
pub use program::Program;
pub use registry::{EventOutcome, Registry};
pub use typecheck::{check_program, TypeChecker, TypeError};
pub use value::{MessageValue, RoleInstance, StateInstance, Value};

/// Parses a single STL source string into its syntactic tree.
///
/// This is the entry point for one file; see [`compile`] for the full
/// pipeline over a set of files.
///
/// # Errors
///
/// Returns a [`ParseError`] with a source position on any syntax violation.
pub fn parse_file(source: &str) -> Result<SourceFile, ParseError> {
    let mut parser = Parser::new(source);
    parser.parse_source_file()
}

/// Runs the full front end: parse every source, link, and type-check.
///
/// # Errors
///
/// Returns the first [`ParseError`] or [`LinkError`] encountered, or every
/// [`TypeError`] when the linked program fails checking.
pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Program, CompileError> {
    let files = sources
        .iter()
        .map(|source| parse_file(source.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let program = link(&files)?;
    check_program(&program).map_err(CompileError::Type)?;
    Ok(program)
}

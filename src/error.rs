//! Error types for the STL core.
//!
//! This module defines the static error kinds produced by the front end
//! (lexing, parsing, linking) and the runtime error kinds produced by the
//! executor and registry, each carrying source locations where one exists.
//!
//! # Error Categories
//!
//! - [`LexError`]: errors during tokenization
//! - [`ParseError`]: errors during parsing
//! - [`LinkError`]: errors during name resolution
//! - [`RegistryError`]: a used external name has no registered implementation
//! - [`ExecError`]: fatal conditions during execution
//! - [`ManifestError`]: errors reading the test manifest
//!
//! Type errors live in [`crate::typecheck`], next to the checker that
//! produces them. Recoverable event failures and stuck reports are not
//! errors; they are ordinary executor outcomes (see [`crate::executor`]).

use crate::ast::Span;
use thiserror::Error;

/// Errors that can occur during lexical analysis.
///
/// These errors are produced by the [`Lexer`](crate::lexer::Lexer) when
/// it encounters invalid or unexpected input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    /// An unexpected character was encountered.
    ///
    /// This typically occurs when the input contains characters that are
    /// not part of the STL syntax, such as a bare `-` outside the `->`
    /// arrow or punctuation from another language.
    #[error("unexpected character '{ch}' at line {}, column {}", span.line, span.column)]
    UnexpectedChar {
        /// The unexpected character
        ch: char,
        /// Location in the source
        span: Span,
    },

    /// A string literal was not properly terminated.
    ///
    /// String literals must end with a closing double quote on the same
    /// line; a newline or the end of input inside a string produces this
    /// error.
    #[error("unterminated string literal starting at line {}, column {}", span.line, span.column)]
    UnterminatedString {
        /// Location of the opening quote
        span: Span,
    },

    /// A backslash with nothing to escape.
    ///
    /// In STL a backslash escapes the character that follows it; a
    /// backslash sitting at the end of the input has no such character.
    #[error("stray escape at line {}, column {}", span.line, span.column)]
    StrayEscape {
        /// Location of the backslash
        span: Span,
    },

    /// An integer literal does not fit in 64 bits.
    ///
    /// STL integers are non-negative decimal digit runs; anything beyond
    /// the 64-bit signed range cannot be represented by the value model.
    #[error("integer literal '{text}' out of range at line {}, column {}", span.line, span.column)]
    IntegerOverflow {
        /// The offending literal text
        text: String,
        /// Location in the source
        span: Span,
    },
}

impl LexError {
    /// Returns the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::StrayEscape { span } => *span,
            LexError::IntegerOverflow { span, .. } => *span,
        }
    }
}

/// Errors that can occur during parsing.
///
/// These errors are produced by the [`Parser`](crate::parser::Parser) when
/// the token stream does not match the expected grammar.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// An unexpected token was encountered.
    ///
    /// This is the most common parse error, indicating that the parser
    /// expected one token but found another.
    #[error("expected {expected}, found {found} at line {}, column {}", span.line, span.column)]
    UnexpectedToken {
        /// Description of what was expected
        expected: String,
        /// Description of what was found
        found: String,
        /// Location of the unexpected token
        span: Span,
    },

    /// Unexpected end of file.
    ///
    /// The source ended in the middle of a declaration or block; the
    /// context describes what was being parsed when the input ran out.
    #[error("unexpected end of file at line {}, column {}: {context}", span.line, span.column)]
    UnexpectedEof {
        /// Context about what was being parsed
        context: String,
        /// Location at end of file
        span: Span,
    },

    /// An `encode` item names an unknown encoding.
    ///
    /// Messages may declare `json`, `bytestream`, or `protobuf`; any other
    /// string in an `encode` item is rejected at parse time rather than
    /// surfacing later as a missing codec.
    #[error("unknown encoding '{name}' at line {}, column {} (expected json, bytestream, or protobuf)", span.line, span.column)]
    UnknownEncoding {
        /// The encoding string found
        name: String,
        /// Location of the string
        span: Span,
    },

    /// A lexer error occurred during parsing.
    ///
    /// The parser surfaces the underlying [`LexError`] the moment it
    /// reaches the offending token, so the position points at the
    /// lexical problem itself.
    #[error("lexer error: {0}")]
    Lexer(#[from] LexError),
}

impl ParseError {
    /// Returns the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span, .. } => *span,
            ParseError::UnknownEncoding { span, .. } => *span,
            ParseError::Lexer(err) => err.span(),
        }
    }
}

/// Errors that can occur during linking and name resolution.
///
/// These errors are produced by the [`linker`](crate::linker) after every
/// input file has parsed, while it registers top-level names and resolves
/// the references inside declaration bodies.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Two input files declare the same module name.
    ///
    /// Module names identify their declarations program-wide, so each
    /// module may be supplied at most once per run.
    #[error("duplicate module '{name}'")]
    DuplicateModule {
        /// The module name
        name: String,
    },

    /// Two declarations of the same kind share a name within one module.
    ///
    /// Names are unique per declaration kind and module; the same name may
    /// still be used for, say, a state and a role side by side.
    #[error("duplicate {kind} '{name}' in module '{module}'")]
    DuplicateName {
        /// The module
        module: String,
        /// Declaration kind (e.g. "state", "event")
        kind: String,
        /// The duplicated local name
        name: String,
    },

    /// A reference could not be resolved to any declaration.
    ///
    /// Either the name is not declared anywhere, or it is declared only
    /// for a different kind than the reference requires.
    #[error("undefined {kind} '{name}' at line {}, column {}", span.line, span.column)]
    Undefined {
        /// Expected declaration kind
        kind: String,
        /// The unresolved name
        name: String,
        /// Location of the reference
        span: Span,
    },

    /// An unqualified reference matches declarations in several modules.
    ///
    /// A name not found in the current module resolves across the whole
    /// program only when exactly one module declares it; otherwise the
    /// reference must be qualified with a module path.
    #[error("ambiguous {kind} '{name}' at line {}, column {} (candidates: {})", span.line, span.column, candidates.join(", "))]
    Ambiguous {
        /// Expected declaration kind
        kind: String,
        /// The ambiguous name
        name: String,
        /// Fully-qualified candidates
        candidates: Vec<String>,
        /// Location of the reference
        span: Span,
    },

    /// A call or instantiation supplies the wrong number of arguments.
    ///
    /// Applies to state references, event calls, qualifier calls, and
    /// transition bindings alike; the per-argument types are checked
    /// separately by the type checker.
    #[error("'{name}' expects {expected} argument(s), got {got} at line {}, column {}", span.line, span.column)]
    ArityMismatch {
        /// The referenced declaration
        name: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
        /// Location of the call
        span: Span,
    },

    /// Constant definitions form a cycle.
    ///
    /// Constants may reference other constants and are folded to literals
    /// at link time, which is only possible when the reference graph is
    /// acyclic.
    #[error("cyclic constant definition involving '{name}'")]
    ConstCycle {
        /// A constant on the cycle
        name: String,
    },
}

/// An `external` name used by the program has no registered implementation.
///
/// External references are recorded verbatim at link time and only bound
/// through the [`Registry`](crate::registry::Registry) before execution;
/// a missing binding is fatal and reported by the preflight check rather
/// than mid-run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no registered {kind} for external name '{name}'")]
pub struct RegistryError {
    /// What kind of primitive was expected ("event", "qualifier", "codec")
    pub kind: String,
    /// The dotted external name
    pub name: String,
}

/// Fatal conditions during execution.
///
/// Recoverable event failures never surface here; they are consumed by the
/// transition frame (`error_states` or rollback). Everything in this enum
/// aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// A primitive reported a fatal condition.
    ///
    /// Unlike a recoverable failure, a fatal result means the primitive
    /// considers the run itself unsound to continue, so no `error_states`
    /// or rollback handling applies.
    #[error("fatal failure in transition '{transition}', event {event_index}: {reason}")]
    Fatal {
        /// The in-flight transition binding
        transition: String,
        /// Zero-based index into the transition's events list
        event_index: usize,
        /// The primitive's reason string
        reason: String,
    },

    /// Composite event expansion exceeded the depth bound.
    ///
    /// Recursive event definitions are legal and flagged at link time;
    /// the bound is what rejects the non-terminating ones at runtime.
    #[error("event expansion depth exceeded {limit} while expanding '{event}'")]
    DepthExceeded {
        /// The event being expanded
        event: String,
        /// The configured bound
        limit: usize,
    },

    /// A role named by the program has no manifest instance.
    ///
    /// Every role appearing as an event source or target must have been
    /// instantiated before the driver steps, normally from the manifest's
    /// `roles` list.
    #[error("role '{role}' has no instance")]
    MissingRole {
        /// Fully-qualified role name
        role: String,
    },

    /// An external name has no registered implementation.
    ///
    /// Normally caught by the preflight check at executor construction;
    /// reaching it mid-run means the registry and program went out of
    /// sync.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An invariant violation inside the executor.
    ///
    /// These conditions are unreachable for programs that passed linking
    /// and type checking; hitting one indicates a bug rather than a bad
    /// input.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Errors reading or resolving a test manifest.
///
/// These cover the whole manifest path: reading the file, `$key`
/// substitution, JSON parsing, and validating role entries against the
/// linked program.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    ///
    /// Wraps the underlying I/O error; the path is the one handed to the
    /// loader.
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest is not valid JSON.
    ///
    /// Substitution happens before parsing, so a malformed substituted
    /// value can also end up here.
    #[error("malformed manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// A `$key` substitution has no matching argument.
    ///
    /// Every `$key` occurrence in the manifest text must be covered by a
    /// `key=value` argument; substitution never silently leaves a key in
    /// place.
    #[error("no value supplied for manifest substitution '${key}'")]
    UnknownSubstitution {
        /// The unmatched key
        key: String,
    },

    /// A manifest argument is not of the form `key=value`.
    ///
    /// Arguments arrive as space-separated words (the CLI's `-a` flag);
    /// each must contain an `=` splitting key from value.
    #[error("malformed manifest argument '{arg}' (expected key=value)")]
    MalformedArg {
        /// The offending argument
        arg: String,
    },

    /// A required top-level key is missing or has the wrong shape.
    ///
    /// The manifest is a JSON object with exactly three list-valued keys:
    /// `stl_files`, `roles`, and `test`.
    #[error("manifest key '{key}': {reason}")]
    BadKey {
        /// The top-level key
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// A role entry names an unknown role declaration.
    ///
    /// Role entries are matched against the linked program by their
    /// fully-qualified `module::role` name.
    #[error("manifest role '{role}' is not declared by the program")]
    UnknownRole {
        /// The fully-qualified role name
        role: String,
    },

    /// A role entry is missing a declared field or has a wrong-typed value.
    ///
    /// Every field declared on the role must be supplied with a value of
    /// the declared scalar type, and no undeclared fields may appear.
    #[error("manifest role '{role}', field '{field}': {reason}")]
    BadRoleField {
        /// The fully-qualified role name
        role: String,
        /// The field name
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A driven role from `test` does not appear in `roles`.
    ///
    /// The driver can only step roles that were instantiated, so `test`
    /// must be a subset of the names under `roles`.
    #[error("test role '{role}' is not instantiated under 'roles'")]
    UndrivenRole {
        /// The fully-qualified role name
        role: String,
    },
}

/// Umbrella error for the parse-link-typecheck pipeline.
///
/// Produced by [`crate::compile`]; each variant is fatal for the run and
/// carries a human-readable location.
#[derive(Error, Debug)]
pub enum CompileError {
    /// A file failed to parse.
    ///
    /// Parsing stops at the first syntax violation; later files are not
    /// examined.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The files failed to link.
    ///
    /// Reported after all files parsed, while registering names or
    /// resolving references.
    #[error("{0}")]
    Link(#[from] LinkError),

    /// The linked program failed type checking.
    ///
    /// The checker accumulates rather than failing fast, so this variant
    /// carries every violation found in the program.
    #[error("{}", format_type_errors(.0))]
    Type(Vec<crate::typecheck::TypeError>),
}

fn format_type_errors(errors: &[crate::typecheck::TypeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

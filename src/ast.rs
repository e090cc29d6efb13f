//! Abstract syntax tree for STL source files.
//!
//! This module defines the syntactic representation produced by the parser:
//! one [`SourceFile`] per input, holding the module header and every
//! declaration in source order. Nothing here is resolved; references between
//! declarations are plain (possibly dotted) names that the linker turns into
//! fully-qualified handles.
//!
//! # Structure
//!
//! Every STL file opens with a module header followed by declarations:
//!
//! ```text
//! module tls;
//!
//! state sTlsState(int) { kNotConnected, kConnected }
//!
//! role rSender {
//!   string ipAddress;
//! }
//! ```
//!
//! The `Display` implementations pretty-print a tree back to canonical STL,
//! which is what the parser round-trip tests rely on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location information for error reporting and tooling.
///
/// Spans track byte offsets and line/column positions of AST nodes in the
/// original source, enabling precise error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl Span {
    /// Creates a new span with the given positions.
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Merges two spans, covering both.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: if self.line <= other.line {
                self.column
            } else {
                other.column
            },
        }
    }

    /// Returns the length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A literal value: integer, boolean, or string.
///
/// Integer literals are non-negative in current STL; a leading minus sign is
/// reserved syntax and rejected during lexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal
    Int(i64),
    /// Boolean literal (`true` / `false`)
    Bool(bool),
    /// Double-quoted string literal
    Str(String),
}

impl Literal {
    /// Returns the STL type name this literal inhabits.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int",
            Literal::Bool(_) => "bool",
            Literal::Str(_) => "string",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Str(s) => write!(f, "\"{}\"", escape_str(s)),
        }
    }
}

/// Escapes a string for re-emission as an STL string literal.
///
/// The inverse of the lexer's escape handling: quotes, backslashes, and
/// the control characters the lexer maps get their backslash form back,
/// so printed output re-lexes to the original content.
pub(crate) fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

/// A syntactic type name.
///
/// `int`, `bool`, and `string` are keywords; anything else is a reference to
/// a message declaration, resolved at link time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeName {
    /// The `int` keyword
    Int,
    /// The `bool` keyword
    Bool,
    /// The `string` keyword
    String,
    /// A (possibly dotted) message reference
    Message(String),
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Int => write!(f, "int"),
            TypeName::Bool => write!(f, "bool"),
            TypeName::String => write!(f, "string"),
            TypeName::Message(name) => write!(f, "{}", name),
        }
    }
}

/// Field multiplicity inside a message declaration.
///
/// Multiplicity governs what a literal may assign and what an encoded
/// payload must contain: required fields appear in every instance,
/// optional and repeated fields may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Must be populated in every literal
    Required,
    /// May be absent
    Optional,
    /// Zero or more values
    Repeated,
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Multiplicity::Required => write!(f, "required"),
            Multiplicity::Optional => write!(f, "optional"),
            Multiplicity::Repeated => write!(f, "repeated"),
        }
    }
}

/// Message wire encoding.
///
/// `json` is implemented by the core; `bytestream` and `protobuf` delegate
/// to a codec registered under the message's `external` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// Canonical JSON, keys in declaration order
    #[default]
    Json,
    /// Concatenated per-field encodings, layout owned by the codec
    Bytestream,
    /// Delegated to the registered protobuf schema
    Protobuf,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Json => write!(f, "json"),
            Encoding::Bytestream => write!(f, "bytestream"),
            Encoding::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// A parsed STL source file: module header plus declarations in order.
///
/// One `SourceFile` is produced per input file; the linker merges a set
/// of them into a single program, so nothing here is resolved beyond the
/// file's own text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Dotted module name from the header
    pub module: String,
    /// All declarations, in source order
    pub decls: Vec<Decl>,
    /// Span of the module header
    pub span: Span,
}

/// A top-level declaration.
///
/// Each variant corresponds to one declaration keyword; the `transition`
/// keyword introduces either a declaration or a binding, distinguished
/// by the token after the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    /// `const <type> <name> = <value>;`
    Const(ConstDecl),
    /// `state <name>(<types>) { <values> }`
    State(StateDecl),
    /// `role <name> { <fields> }`
    Role(RoleDecl),
    /// `message <name>[]? { ... }`
    Message(MessageDecl),
    /// `qualifier <type> <name>(<params>) = external "...";`
    Qualifier(QualifierDecl),
    /// `event <name>(<params>) <body>`
    Event(EventDecl),
    /// `transition <name>(<params>) { ... }`
    Transition(TransitionDecl),
    /// `transition <name> = <decl>(<args>);`
    Binding(BindingDecl),
}

impl Decl {
    /// Returns the declared name.
    pub fn name(&self) -> &str {
        match self {
            Decl::Const(d) => &d.name,
            Decl::State(d) => &d.name,
            Decl::Role(d) => &d.name,
            Decl::Message(d) => &d.name,
            Decl::Qualifier(d) => &d.name,
            Decl::Event(d) => &d.name,
            Decl::Transition(d) => &d.name,
            Decl::Binding(d) => &d.name,
        }
    }

    /// Returns the declaration's source span.
    pub fn span(&self) -> Span {
        match self {
            Decl::Const(d) => d.span,
            Decl::State(d) => d.span,
            Decl::Role(d) => d.span,
            Decl::Message(d) => d.span,
            Decl::Qualifier(d) => d.span,
            Decl::Event(d) => d.span,
            Decl::Transition(d) => d.span,
            Decl::Binding(d) => d.span,
        }
    }
}

/// A typed constant declaration.
///
/// Constants hold a literal value, possibly via a chain of references to
/// other constants; the linker folds the chain and rejects cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    /// Constant name
    pub name: String,
    /// Declared type
    pub ty: TypeName,
    /// Literal value or a reference to another constant
    pub value: ConstValue,
    /// Source location
    pub span: Span,
}

/// The right-hand side of a constant declaration.
///
/// A reference names another constant, locally or with a module path;
/// after linking, only the folded literal survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    /// A literal value
    Literal(Literal),
    /// A reference to another constant, folded at link time
    Ref(String),
}

/// A state declaration: parameter types plus the set of symbolic values.
///
/// Each concrete parameter tuple names one slot of the global valuation;
/// the symbolic values are the only values that slot can ever hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDecl {
    /// State name
    pub name: String,
    /// Ordered parameter types
    pub params: Vec<TypeName>,
    /// Symbolic values (e.g. `kConnected`), unique within the declaration
    pub values: Vec<String>,
    /// Source location
    pub span: Span,
}

/// A role declaration with ordered typed fields.
///
/// Roles are the actors the driver steps; one instance is created per
/// role named in the manifest, with the field values it supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDecl {
    /// Role name
    pub name: String,
    /// Ordered fields, instantiated from the manifest
    pub fields: Vec<RoleField>,
    /// Source location
    pub span: Span,
}

/// A single typed field of a role.
///
/// Role fields carry configuration such as addresses and ports; their
/// values come from the manifest, not from STL source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleField {
    /// Field type
    pub ty: TypeName,
    /// Field name
    pub name: String,
    /// Source location
    pub span: Span,
}

/// A message declaration.
///
/// A message either lists its fields explicitly or names an `external`
/// schema from which the field list is derived; `bytestream`/`protobuf`
/// messages additionally use the external reference as the codec key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDecl {
    /// Message name
    pub name: String,
    /// True for `message mName[] { ... }` array declarations
    pub is_array: bool,
    /// Declared encoding; defaults to `json` when no `encode` item appears
    pub encoding: Encoding,
    /// Optional `external "..."` schema/codec reference
    pub external: Option<String>,
    /// Ordered field declarations
    pub fields: Vec<FieldDecl>,
    /// Message declarations nested inside this one
    pub nested: Vec<MessageDecl>,
    /// Source location
    pub span: Span,
}

/// A single field of a message.
///
/// The declaration order of fields is the order literals are evaluated
/// in and the order the JSON encoding emits keys in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field multiplicity
    pub multiplicity: Multiplicity,
    /// Field type
    pub ty: TypeName,
    /// Field name
    pub name: String,
    /// Source location
    pub span: Span,
}

/// A qualifier declaration.
///
/// Qualifiers are always external: the declaration fixes the signature
/// while the implementation is looked up in the primitive registry at
/// execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierDecl {
    /// Qualifier name
    pub name: String,
    /// Return type
    pub return_ty: TypeName,
    /// Ordered parameters
    pub params: Vec<Param>,
    /// Dotted external reference, bound via the registry at execution time
    pub external: String,
    /// Source location
    pub span: Span,
}

/// A named, typed parameter of an event, qualifier, or transition.
///
/// Only event parameters may carry the `&` reference marker; the parser
/// rejects it in the other positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter type
    pub ty: TypeName,
    /// Parameter name
    pub name: String,
    /// True for `&`-marked reference parameters (events only)
    pub by_ref: bool,
    /// Source location
    pub span: Span,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.by_ref {
            write!(f, "&")?;
        }
        write!(f, "{} {}", self.ty, self.name)
    }
}

/// An event declaration.
///
/// An event is an interaction between a source and a target role; its
/// body says whether it is implemented externally, by composing another
/// event, or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDecl {
    /// Event name
    pub name: String,
    /// Ordered parameters, each by-value or by-reference
    pub params: Vec<Param>,
    /// Event body: terminal, composite, or no-op
    pub body: EventBody,
    /// Source location
    pub span: Span,
}

/// The body of an event declaration.
///
/// Composite bodies may reference events that themselves are composite,
/// including recursively; the executor bounds expansion depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventBody {
    /// `= external "name";` - a terminal event bound via the registry
    External(String),
    /// `= <EventName>(<args>);` - a composite call of another event
    Composite {
        /// Callee event name
        callee: String,
        /// Actual arguments
        args: Vec<Expr>,
    },
    /// Omitted body - a no-op event
    NoOp,
}

/// A transition declaration.
///
/// A transition is the unit of atomic state change: preconditions over
/// the global valuation, an ordered list of events, and the states to
/// assign on success or on a recoverable failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDecl {
    /// Transition name
    pub name: String,
    /// Optional parameters, fixed by a binding
    pub params: Vec<Param>,
    /// Local variable declarations
    pub locals: Vec<LocalDecl>,
    /// Preconditions: each entry is an OR-set over one state instance
    pub pre_states: Vec<PreStateEntry>,
    /// Ordered event lines
    pub events: Vec<EventLine>,
    /// States assigned atomically on success
    pub post_states: Vec<PostStateEntry>,
    /// States assigned atomically when an event fails, if declared
    pub error_states: Option<Vec<PostStateEntry>>,
    /// Source location
    pub span: Span,
}

/// A transition-local variable declaration.
///
/// Locals are the cells that reference parameters and qualifier writes
/// target; they start absent and live for one firing of the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDecl {
    /// Variable type
    pub ty: TypeName,
    /// Variable name
    pub name: String,
    /// Source location
    pub span: Span,
}

/// A reference to a state instance: `sName(<args>)`.
///
/// The arguments select one concrete slot of the global valuation; they
/// must be fixed before any event runs, so only literals, constants, and
/// transition parameters are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRef {
    /// State declaration name, possibly dotted
    pub name: String,
    /// Concrete parameter expressions
    pub args: Vec<Expr>,
    /// Source location
    pub span: Span,
}

/// One `pre_states` entry: a state instance and its OR-set of values.
///
/// The entry is satisfied when the valuation maps the instance to any of
/// the listed values; states not named in `pre_states` impose no
/// constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreStateEntry {
    /// The constrained state instance
    pub state: StateRef,
    /// Acceptable symbolic values
    pub values: Vec<String>,
    /// Source location
    pub span: Span,
}

/// One `post_states` / `error_states` entry: a state instance and its value.
///
/// Entries of a block are applied together at commit time; a transition
/// never leaves a half-applied block visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostStateEntry {
    /// The assigned state instance
    pub state: StateRef,
    /// The symbolic value to assign
    pub value: String,
    /// Source location
    pub span: Span,
}

/// One line of a transition's `events` block: `src -> Event(args) -> dst;`.
///
/// Lines execute sequentially in source order; the first line's source
/// role decides which stepped role can select the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLine {
    /// Originating role
    pub source: String,
    /// Event name
    pub event: String,
    /// Actual arguments
    pub args: Vec<Expr>,
    /// Target role
    pub target: String,
    /// Source location
    pub span: Span,
}

/// A transition binding: `transition <name> = <decl>(<args>);`.
///
/// Bindings fix a transition declaration's parameters to concrete values and
/// are the units the executor fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingDecl {
    /// Binding name
    pub name: String,
    /// Bound transition declaration, possibly dotted
    pub target: String,
    /// Bound parameter values
    pub args: Vec<Expr>,
    /// Source location
    pub span: Span,
}

/// An expression: argument positions, field assignments, state parameters.
///
/// STL has no operators; expressions are literals, name references,
/// qualifier calls, and message literals. What a name refers to (a
/// constant, parameter, or local) is decided by the linker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A literal value
    Literal {
        /// The value
        value: Literal,
        /// Source location
        span: Span,
    },
    /// A name reference: constant, parameter, or transition local
    Name {
        /// The (possibly dotted) name
        name: String,
        /// Source location
        span: Span,
    },
    /// A qualifier call, optionally writing its value to a local: `q(a) -> v`
    Call {
        /// Qualifier name, possibly dotted
        name: String,
        /// Actual arguments
        args: Vec<Expr>,
        /// Local variable receiving the value, for the `-> var` form
        write_to: Option<String>,
        /// Source location
        span: Span,
    },
    /// An object message literal: `mName { f = e; ... }`
    MessageLit(MessageLit),
    /// An array message literal: `mName [ { ... }, { ... } ]`
    ArrayLit {
        /// Element message name, possibly dotted
        message: String,
        /// Element field blocks
        elements: Vec<Vec<FieldInit>>,
        /// Source location
        span: Span,
    },
}

impl Expr {
    /// Returns the expression's source span.
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. } => *span,
            Expr::Name { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::MessageLit(lit) => lit.span,
            Expr::ArrayLit { span, .. } => *span,
        }
    }
}

/// An object message literal.
///
/// Assignments may appear in any order; evaluation still follows the
/// declaration order of the message's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLit {
    /// Message name, possibly dotted
    pub message: String,
    /// Field assignments in source order
    pub fields: Vec<FieldInit>,
    /// Source location
    pub span: Span,
}

/// One field assignment inside a message literal.
///
/// The value may be any expression, including the qualifier-write form
/// `Qualifier(args) -> localVar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    /// Field name
    pub name: String,
    /// Assigned expression
    pub value: Expr,
    /// Source location
    pub span: Span,
}

// ---------------------------------------------------------------------------
// Pretty printing
//
// The printer emits canonical STL: two-space indents, one declaration item
// per line, message literals on one line. Re-parsing printed output must
// yield a structurally equal tree.
// ---------------------------------------------------------------------------

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {};", self.module)?;
        for decl in &self.decls {
            writeln!(f)?;
            write!(f, "{}", decl)?;
        }
        Ok(())
    }
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decl::Const(d) => writeln!(f, "const {} {} = {};", d.ty, d.name, d.value),
            Decl::State(d) => {
                write!(f, "state {}(", d.name)?;
                write_list(f, &d.params)?;
                writeln!(f, ") {{ {} }}", d.values.join(", "))
            }
            Decl::Role(d) => {
                writeln!(f, "role {} {{", d.name)?;
                for field in &d.fields {
                    writeln!(f, "  {} {};", field.ty, field.name)?;
                }
                writeln!(f, "}}")
            }
            Decl::Message(d) => write_message(f, d, 0),
            Decl::Qualifier(d) => {
                write!(f, "qualifier {} {}(", d.return_ty, d.name)?;
                write_list(f, &d.params)?;
                writeln!(f, ") = external \"{}\";", escape_str(&d.external))
            }
            Decl::Event(d) => {
                write!(f, "event {}(", d.name)?;
                write_list(f, &d.params)?;
                write!(f, ")")?;
                match &d.body {
                    EventBody::External(name) => {
                        writeln!(f, " = external \"{}\";", escape_str(name))
                    }
                    EventBody::Composite { callee, args } => {
                        write!(f, " = {}(", callee)?;
                        write_list(f, args)?;
                        writeln!(f, ");")
                    }
                    EventBody::NoOp => writeln!(f, ";"),
                }
            }
            Decl::Transition(d) => write_transition(f, d),
            Decl::Binding(d) => {
                write!(f, "transition {} = {}(", d.name, d.target)?;
                write_list(f, &d.args)?;
                writeln!(f, ");")
            }
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Literal(lit) => write!(f, "{}", lit),
            ConstValue::Ref(name) => write!(f, "{}", name),
        }
    }
}

fn write_message(f: &mut fmt::Formatter<'_>, d: &MessageDecl, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    let inner = "  ".repeat(indent + 1);
    write!(f, "{}message {}", pad, d.name)?;
    if d.is_array {
        write!(f, "[]")?;
    }
    writeln!(f, " {{")?;
    writeln!(f, "{}encode \"{}\";", inner, d.encoding)?;
    if let Some(external) = &d.external {
        writeln!(f, "{}external \"{}\";", inner, escape_str(external))?;
    }
    for field in &d.fields {
        writeln!(
            f,
            "{}{} {} {};",
            inner, field.multiplicity, field.ty, field.name
        )?;
    }
    for nested in &d.nested {
        write_message(f, nested, indent + 1)?;
    }
    writeln!(f, "{}}}", pad)
}

fn write_transition(f: &mut fmt::Formatter<'_>, d: &TransitionDecl) -> fmt::Result {
    write!(f, "transition {}(", d.name)?;
    write_list(f, &d.params)?;
    writeln!(f, ") {{")?;
    for local in &d.locals {
        writeln!(f, "  {} {};", local.ty, local.name)?;
    }
    writeln!(f, "  pre_states {{")?;
    for entry in &d.pre_states {
        writeln!(f, "    {} = [{}];", entry.state, entry.values.join(", "))?;
    }
    writeln!(f, "  }}")?;
    writeln!(f, "  events {{")?;
    for line in &d.events {
        write!(f, "    {} -> {}(", line.source, line.event)?;
        write_list(f, &line.args)?;
        writeln!(f, ") -> {};", line.target)?;
    }
    writeln!(f, "  }}")?;
    writeln!(f, "  post_states {{")?;
    for entry in &d.post_states {
        writeln!(f, "    {} = {};", entry.state, entry.value)?;
    }
    writeln!(f, "  }}")?;
    if let Some(entries) = &d.error_states {
        writeln!(f, "  error_states {{")?;
        for entry in entries {
            writeln!(f, "    {} = {};", entry.state, entry.value)?;
        }
        writeln!(f, "  }}")?;
    }
    writeln!(f, "}}")
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_list(f, &self.args)?;
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value, .. } => write!(f, "{}", value),
            Expr::Name { name, .. } => write!(f, "{}", name),
            Expr::Call {
                name,
                args,
                write_to,
                ..
            } => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")?;
                if let Some(var) = write_to {
                    write!(f, " -> {}", var)?;
                }
                Ok(())
            }
            Expr::MessageLit(lit) => write!(f, "{}", lit),
            Expr::ArrayLit {
                message, elements, ..
            } => {
                write!(f, "{} [", message)?;
                for (i, fields) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {{")?;
                    for init in fields {
                        write!(f, " {}", init)?;
                    }
                    write!(f, " }}")?;
                }
                write!(f, " ]")
            }
        }
    }
}

impl fmt::Display for MessageLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.message)?;
        for init in &self.fields {
            write!(f, " {}", init)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for FieldInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {};", self.name, self.value)
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(0, 5, 1, 1);
        let b = Span::new(10, 20, 2, 3);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 20);
        assert_eq!(merged.line, 1);
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Int(42).to_string(), "42");
        assert_eq!(Literal::Bool(true).to_string(), "true");
        assert_eq!(Literal::Str("a\"b".to_string()).to_string(), "\"a\\\"b\"");
    }

    #[test]
    fn test_message_lit_display() {
        let lit = MessageLit {
            message: "mConnect".to_string(),
            fields: vec![FieldInit {
                name: "requestId".to_string(),
                value: Expr::Literal {
                    value: Literal::Int(7),
                    span: Span::default(),
                },
                span: Span::default(),
            }],
            span: Span::default(),
        };
        assert_eq!(lit.to_string(), "mConnect { requestId = 7; }");
    }
}

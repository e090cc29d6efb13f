//! The linked, type-checked program representation.
//!
//! A [`Program`] is the immutable output of the linker: every module's
//! declarations with all cross-references resolved to fully-qualified
//! `module::name` handles, constants folded to literals, and message types
//! made explicit. The executor interprets this representation directly.
//!
//! Unlike [`crate::ast`], nothing here carries source spans or unresolved
//! names; the linker has already rejected programs that would need them.

pub use crate::ast::{Encoding, Literal, Multiplicity};
use std::fmt;

/// Separator used in fully-qualified names.
pub const FQN_SEP: &str = "::";

/// Builds a fully-qualified `module::name` handle.
pub fn fqn(module: &str, name: &str) -> String {
    format!("{}{}{}", module, FQN_SEP, name)
}

/// Splits a fully-qualified name into module and local name.
pub fn split_fqn(name: &str) -> Option<(&str, &str)> {
    name.rsplit_once(FQN_SEP)
}

/// A semantic type: the three scalars or a message reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// UTF-8 string
    Str,
    /// A message, by fully-qualified declaration name
    Message(String),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "string"),
            Type::Message(name) => write!(f, "{}", name),
        }
    }
}

/// The linked program: the union of all linked modules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Modules in input order
    pub modules: Vec<Module>,
}

/// A linked module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Dotted module name
    pub name: String,
    /// Folded constants
    pub consts: Vec<Constant>,
    /// State declarations
    pub states: Vec<StateDecl>,
    /// Role declarations
    pub roles: Vec<RoleDecl>,
    /// Message declarations (nested declarations are flattened here)
    pub messages: Vec<MessageDecl>,
    /// Qualifier declarations
    pub qualifiers: Vec<QualifierDecl>,
    /// Event declarations
    pub events: Vec<EventDecl>,
    /// Transition declarations
    pub transitions: Vec<TransitionDecl>,
    /// Transition bindings, in declaration order
    pub bindings: Vec<TransitionBinding>,
}

/// A constant with its folded literal value.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    /// Local name
    pub name: String,
    /// Declared type
    pub ty: Type,
    /// Folded value
    pub value: Literal,
}

/// A linked state declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDecl {
    /// Local name
    pub name: String,
    /// Ordered parameter types
    pub params: Vec<Type>,
    /// Symbolic values
    pub values: Vec<String>,
}

impl StateDecl {
    /// Returns true if `value` is one of the declared symbolic values.
    pub fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// A linked role declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDecl {
    /// Local name
    pub name: String,
    /// Ordered fields: name and type
    pub fields: Vec<(String, Type)>,
}

/// A linked message declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDecl {
    /// Local name
    pub name: String,
    /// True for array message declarations
    pub is_array: bool,
    /// Wire encoding
    pub encoding: Encoding,
    /// External schema/codec reference
    pub external: Option<String>,
    /// Ordered fields
    pub fields: Vec<Field>,
}

impl MessageDecl {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single linked message field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: Type,
    /// Field multiplicity
    pub multiplicity: Multiplicity,
}

/// A linked qualifier declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifierDecl {
    /// Local name
    pub name: String,
    /// Return type
    pub return_ty: Type,
    /// Ordered parameters: name and type
    pub params: Vec<(String, Type)>,
    /// Dotted external reference
    pub external: String,
}

/// A linked event declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDecl {
    /// Local name
    pub name: String,
    /// Ordered parameters
    pub params: Vec<EventParam>,
    /// Event body
    pub body: EventBody,
    /// True if this event participates in a composite-reference cycle.
    /// Flagged by the linker; the executor bounds expansion depth.
    pub recursive: bool,
}

/// One parameter of an event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParam {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: Type,
    /// True for `&` reference parameters
    pub by_ref: bool,
}

/// The linked body of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// A terminal event, bound via the primitive registry
    External(String),
    /// A composite call of another event
    Composite(EventCall),
    /// A no-op
    NoOp,
}

/// A resolved event call.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCall {
    /// Fully-qualified event name
    pub event: String,
    /// Actual arguments
    pub args: Vec<Expr>,
}

/// A linked transition declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDecl {
    /// Local name
    pub name: String,
    /// Ordered parameters: name and type
    pub params: Vec<(String, Type)>,
    /// Local variables: name and type
    pub locals: Vec<(String, Type)>,
    /// Preconditions over state instances
    pub pre_states: Vec<PreState>,
    /// Ordered event steps
    pub events: Vec<EventStep>,
    /// States assigned on success
    pub post_states: Vec<PostState>,
    /// States assigned on event failure, if declared
    pub error_states: Option<Vec<PostState>>,
}

/// A resolved reference to a state instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRef {
    /// Fully-qualified state declaration name
    pub decl: String,
    /// Parameter expressions
    pub args: Vec<Expr>,
}

/// One precondition: a state instance and its OR-set of acceptable values.
#[derive(Debug, Clone, PartialEq)]
pub struct PreState {
    /// The constrained instance
    pub state: StateRef,
    /// Acceptable values
    pub values: Vec<String>,
}

/// One postcondition: a state instance and the value it is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PostState {
    /// The assigned instance
    pub state: StateRef,
    /// The assigned value
    pub value: String,
}

/// One step of a transition's events list.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStep {
    /// Fully-qualified source role
    pub source: String,
    /// The event call
    pub call: EventCall,
    /// Fully-qualified target role
    pub target: String,
}

/// A linked transition binding: a transition declaration plus bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBinding {
    /// Local name
    pub name: String,
    /// Fully-qualified transition declaration
    pub decl: String,
    /// Bound parameter values (literals and message literals only)
    pub args: Vec<Expr>,
}

/// A linked expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal (includes folded constant references)
    Literal(Literal),
    /// A parameter of the enclosing transition or event
    Param(String),
    /// A local variable of the enclosing transition
    Local(String),
    /// A qualifier call, optionally writing its value through `-> var`
    Qualifier {
        /// Fully-qualified qualifier declaration
        decl: String,
        /// Actual arguments
        args: Vec<Expr>,
        /// Write target, when the `-> var` form was used
        write_to: Option<String>,
    },
    /// An object message literal
    Message(MessageLit),
    /// An array message literal
    Array {
        /// Fully-qualified element message declaration
        decl: String,
        /// Element field blocks
        elements: Vec<Vec<FieldInit>>,
    },
}

/// A linked object message literal.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageLit {
    /// Fully-qualified message declaration
    pub decl: String,
    /// Field assignments in source order
    pub fields: Vec<FieldInit>,
}

/// One linked field assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    /// Field name
    pub name: String,
    /// Assigned expression
    pub value: Expr,
}

impl Program {
    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Looks up a state declaration by fully-qualified name.
    pub fn state(&self, name: &str) -> Option<&StateDecl> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?.states.iter().find(|d| d.name == local)
    }

    /// Looks up a role declaration by fully-qualified name.
    pub fn role(&self, name: &str) -> Option<&RoleDecl> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?.roles.iter().find(|d| d.name == local)
    }

    /// Looks up a message declaration by fully-qualified name.
    pub fn message(&self, name: &str) -> Option<&MessageDecl> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?
            .messages
            .iter()
            .find(|d| d.name == local)
    }

    /// Looks up a qualifier declaration by fully-qualified name.
    pub fn qualifier(&self, name: &str) -> Option<&QualifierDecl> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?
            .qualifiers
            .iter()
            .find(|d| d.name == local)
    }

    /// Looks up an event declaration by fully-qualified name.
    pub fn event(&self, name: &str) -> Option<&EventDecl> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?.events.iter().find(|d| d.name == local)
    }

    /// Looks up a transition declaration by fully-qualified name.
    pub fn transition(&self, name: &str) -> Option<&TransitionDecl> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?
            .transitions
            .iter()
            .find(|d| d.name == local)
    }

    /// Looks up a transition binding by fully-qualified name.
    pub fn binding(&self, name: &str) -> Option<&TransitionBinding> {
        let (module, local) = split_fqn(name)?;
        self.module(module)?
            .bindings
            .iter()
            .find(|d| d.name == local)
    }

    /// Iterates all transition bindings in program order.
    pub fn bindings(&self) -> impl Iterator<Item = (&Module, &TransitionBinding)> {
        self.modules
            .iter()
            .flat_map(|m| m.bindings.iter().map(move |b| (m, b)))
    }

    /// Collects every external name the program uses, for registry preflight.
    ///
    /// Returns `(event_names, qualifier_names, codec_names)`.
    pub fn external_names(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut events = Vec::new();
        let mut qualifiers = Vec::new();
        let mut codecs = Vec::new();
        for module in &self.modules {
            for event in &module.events {
                if let EventBody::External(name) = &event.body {
                    events.push(name.clone());
                }
            }
            for qualifier in &module.qualifiers {
                qualifiers.push(qualifier.external.clone());
            }
            for message in &module.messages {
                if matches!(message.encoding, Encoding::Bytestream | Encoding::Protobuf) {
                    if let Some(name) = &message.external {
                        codecs.push(name.clone());
                    }
                }
            }
        }
        events.dedup();
        qualifiers.dedup();
        codecs.dedup();
        (events, qualifiers, codecs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqn_round_trip() {
        let name = fqn("tls", "sTlsState");
        assert_eq!(name, "tls::sTlsState");
        assert_eq!(split_fqn(&name), Some(("tls", "sTlsState")));
    }

    #[test]
    fn test_split_fqn_dotted_module() {
        assert_eq!(
            split_fqn("pkg.tls::rSender"),
            Some(("pkg.tls", "rSender"))
        );
    }

    #[test]
    fn test_state_has_value() {
        let decl = StateDecl {
            name: "sTlsState".to_string(),
            params: vec![Type::Int],
            values: vec!["kNotConnected".to_string(), "kConnected".to_string()],
        };
        assert!(decl.has_value("kConnected"));
        assert!(!decl.has_value("kListening"));
    }
}

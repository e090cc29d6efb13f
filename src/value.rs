//! Runtime values for STL execution.
//!
//! This module defines the tagged value representation used at execution
//! time: scalars, message instances, message arrays, and state instances.
//! A message instance is an ordered mapping from field name to value, with
//! absent optional fields represented explicitly so that encoding and
//! equality never depend on lookup order.
//!
//! The canonical JSON codec lives here as well: encoding emits object keys
//! in field-declaration order with decimal numbers and standard escaping,
//! and decoding is its inverse. `bytestream` and `protobuf` encodings are
//! delegated to registered codecs (see [`crate::registry`]).

use crate::ast::Multiplicity;
use crate::program::{Program, Type};
use serde_json::{Map, Number};
use std::fmt;
use thiserror::Error;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    Str(String),
    /// A message instance
    Message(MessageValue),
    /// An array of values (message arrays, repeated fields)
    Array(Vec<Value>),
    /// An absent value (uninitialized local, missing optional field)
    Absent,
}

impl Value {
    /// Attempts to read this value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to read this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to read this value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Message(_) => "message",
            Value::Array(_) => "array",
            Value::Absent => "absent",
        }
    }

    /// Returns true if this value inhabits the given semantic type.
    pub fn has_type(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Int(_), Type::Int) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Str(_), Type::Str) => true,
            (Value::Message(msg), Type::Message(decl)) => &msg.decl == decl,
            (Value::Array(items), Type::Message(decl)) => items.iter().all(|item| {
                matches!(item, Value::Message(msg) if &msg.decl == decl)
            }),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Message(msg) => write!(f, "{}", msg),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Absent => write!(f, "<absent>"),
        }
    }
}

/// A message instance: ordered field slots over a declaration.
///
/// Fields appear in declaration order; an absent optional or repeated field
/// holds `None`. Equality is structural over `(decl, per-field values)`;
/// field order is significant for encoding only, and instances built from
/// the same declaration always agree on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageValue {
    /// Fully-qualified message declaration name
    pub decl: String,
    /// Field slots in declaration order
    pub fields: Vec<FieldValue>,
}

impl MessageValue {
    /// Looks up a field slot by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.decl)?;
        for field in &self.fields {
            match &field.value {
                Some(value) => write!(f, " {} = {};", field.name, value)?,
                None => write!(f, " {} = <absent>;", field.name)?,
            }
        }
        write!(f, " }}")
    }
}

/// One field slot of a message instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldValue {
    /// Field name
    pub name: String,
    /// The field's value, or `None` when absent
    pub value: Option<Value>,
}

/// A state instance: a state declaration plus concrete parameter values.
///
/// Equality is structural over `(decl, params)`, which is what makes these
/// usable as keys of the global-state valuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateInstance {
    /// Fully-qualified state declaration name
    pub decl: String,
    /// Concrete parameter values
    pub params: Vec<Value>,
}

impl fmt::Display for StateInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.decl)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

/// A role instance: a role declaration plus concrete field values.
///
/// One instance exists per role named in the manifest; the driver steps
/// roles and terminal events receive the source and target instances.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleInstance {
    /// Fully-qualified role declaration name
    pub role: String,
    /// Field values in declaration order
    pub fields: Vec<(String, Value)>,
}

impl RoleInstance {
    /// Looks up a field value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for RoleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.role)
    }
}

/// Errors produced by message encoding and decoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A required field is absent.
    #[error("message '{message}': required field '{field}' is absent")]
    MissingField {
        /// The message declaration
        message: String,
        /// The missing field
        field: String,
    },

    /// A value does not match the declared field type.
    #[error("message '{message}', field '{field}': expected {expected}, got {got}")]
    WrongType {
        /// The message declaration
        message: String,
        /// The field
        field: String,
        /// The declared type
        expected: String,
        /// What was found
        got: String,
    },

    /// The message declaration is unknown to the program.
    #[error("unknown message declaration '{0}'")]
    UnknownMessage(String),

    /// The payload is not valid JSON.
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A registered codec failed.
    #[error("codec failure for '{name}': {reason}")]
    Codec {
        /// The external codec name
        name: String,
        /// The codec's reason string
        reason: String,
    },
}

/// Encodes a message instance as canonical JSON.
///
/// Keys are emitted in field-declaration order, numbers in decimal, strings
/// with standard JSON escaping. Absent fields are omitted. Encoding the same
/// instance twice produces byte-identical output.
pub fn encode_json(msg: &MessageValue) -> Result<Vec<u8>, CodecError> {
    let object = message_to_json(msg)?;
    Ok(serde_json::to_vec(&object)?)
}

/// Decodes a canonical-JSON payload back into a message instance of the
/// given declaration.
///
/// Required fields must be present; absent optional and repeated fields
/// decode to explicit `None` slots, so decode is the inverse of
/// [`encode_json`] up to instance equality.
pub fn decode_json(program: &Program, decl: &str, payload: &[u8]) -> Result<MessageValue, CodecError> {
    let parsed: serde_json::Value = serde_json::from_slice(payload)?;
    json_to_message(program, decl, &parsed)
}

fn message_to_json(msg: &MessageValue) -> Result<serde_json::Value, CodecError> {
    let mut object = Map::new();
    for field in &msg.fields {
        if let Some(value) = &field.value {
            object.insert(field.name.clone(), value_to_json(value)?);
        }
    }
    Ok(serde_json::Value::Object(object))
}

fn value_to_json(value: &Value) -> Result<serde_json::Value, CodecError> {
    Ok(match value {
        Value::Int(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Message(msg) => message_to_json(msg)?,
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Value::Absent => serde_json::Value::Null,
    })
}

fn json_to_message(
    program: &Program,
    decl_name: &str,
    json: &serde_json::Value,
) -> Result<MessageValue, CodecError> {
    let decl = program
        .message(decl_name)
        .ok_or_else(|| CodecError::UnknownMessage(decl_name.to_string()))?;
    let object = json.as_object().ok_or_else(|| CodecError::WrongType {
        message: decl_name.to_string(),
        field: String::new(),
        expected: "object".to_string(),
        got: json_kind(json).to_string(),
    })?;

    let mut fields = Vec::with_capacity(decl.fields.len());
    for field in &decl.fields {
        let value = match object.get(&field.name) {
            Some(json_value) => Some(json_to_field(program, decl_name, field, json_value)?),
            None => {
                if field.multiplicity == Multiplicity::Required {
                    return Err(CodecError::MissingField {
                        message: decl_name.to_string(),
                        field: field.name.clone(),
                    });
                }
                None
            }
        };
        fields.push(FieldValue {
            name: field.name.clone(),
            value,
        });
    }
    Ok(MessageValue {
        decl: decl_name.to_string(),
        fields,
    })
}

fn json_to_field(
    program: &Program,
    message: &str,
    field: &crate::program::Field,
    json: &serde_json::Value,
) -> Result<Value, CodecError> {
    if field.multiplicity == Multiplicity::Repeated {
        let items = json.as_array().ok_or_else(|| CodecError::WrongType {
            message: message.to_string(),
            field: field.name.clone(),
            expected: "array".to_string(),
            got: json_kind(json).to_string(),
        })?;
        return items
            .iter()
            .map(|item| json_to_scalar(program, message, field, item))
            .collect::<Result<_, _>>()
            .map(Value::Array);
    }
    json_to_scalar(program, message, field, json)
}

fn json_to_scalar(
    program: &Program,
    message: &str,
    field: &crate::program::Field,
    json: &serde_json::Value,
) -> Result<Value, CodecError> {
    let wrong = |expected: &str| CodecError::WrongType {
        message: message.to_string(),
        field: field.name.clone(),
        expected: expected.to_string(),
        got: json_kind(json).to_string(),
    };
    match &field.ty {
        Type::Int => json.as_i64().map(Value::Int).ok_or_else(|| wrong("int")),
        Type::Bool => json.as_bool().map(Value::Bool).ok_or_else(|| wrong("bool")),
        Type::Str => json
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| wrong("string")),
        Type::Message(nested) => {
            let nested_decl = program
                .message(nested)
                .ok_or_else(|| CodecError::UnknownMessage(nested.clone()))?;
            if nested_decl.is_array {
                let items = json.as_array().ok_or_else(|| wrong("array"))?;
                items
                    .iter()
                    .map(|item| json_to_message(program, nested, item).map(Value::Message))
                    .collect::<Result<_, _>>()
                    .map(Value::Array)
            } else {
                json_to_message(program, nested, json).map(Value::Message)
            }
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

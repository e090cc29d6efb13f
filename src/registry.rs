//! The external primitive registry.
//!
//! STL programs name their I/O effects, value generators, and non-JSON
//! codecs by dotted `external` references; the host supplies implementations
//! by populating a [`Registry`] before execution. The core never loads code;
//! it only looks names up here.
//!
//! Three primitive kinds exist:
//!
//! - [`ExternalEvent`]: a terminal event handler receiving the source role,
//!   target role, and evaluated parameters (with message parameters also
//!   encoded into a payload).
//! - [`Qualifier`]: generates or validates a field value.
//! - [`Codec`]: encodes and decodes `bytestream`/`protobuf` messages.
//!
//! The registry is read-only after startup; [`Registry::validate`] performs
//! the preflight check that every external name a program uses is bound.
//!
//! # Example
//!
//! ```rust
//! use stlang::registry::{EventOutcome, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register_event("test.events.Drop", |_ctx: &stlang::registry::EventContext<'_>| {
//!     EventOutcome::Ok
//! });
//! assert!(registry.event("test.events.Drop").is_ok());
//! ```

use crate::error::RegistryError;
use crate::program::{Encoding, Program};
use crate::value::{self, CodecError, MessageValue, RoleInstance, Value};
use std::collections::HashMap;

/// The result of invoking an external event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event succeeded.
    Ok,
    /// The event failed; the transition frame consumes this
    /// (`error_states` or rollback) and execution continues.
    Recoverable(String),
    /// A framework-fatal condition; the run aborts.
    Fatal(String),
}

/// Everything a terminal event handler receives.
#[derive(Debug)]
pub struct EventContext<'a> {
    /// The role originating the event
    pub source: &'a RoleInstance,
    /// The role receiving the event
    pub target: &'a RoleInstance,
    /// Evaluated parameters, in declaration order
    pub params: &'a [Value],
    /// Encoded message parameters, concatenated in order, when any exist
    pub payload: Option<&'a [u8]>,
}

/// A terminal event handler.
pub trait ExternalEvent {
    /// Performs the event's effect.
    fn invoke(&self, ctx: &EventContext<'_>) -> EventOutcome;
}

impl<F> ExternalEvent for F
where
    F: Fn(&EventContext<'_>) -> EventOutcome,
{
    fn invoke(&self, ctx: &EventContext<'_>) -> EventOutcome {
        self(ctx)
    }
}

/// An external qualifier: generates or validates a field value.
///
/// Failure is recoverable; the enclosing transition applies `error_states`
/// or rolls back, exactly as for a failing event.
pub trait Qualifier {
    /// Produces a value from the evaluated arguments.
    fn invoke(&self, args: &[Value]) -> Result<Value, String>;
}

impl<F> Qualifier for F
where
    F: Fn(&[Value]) -> Result<Value, String>,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        self(args)
    }
}

impl std::fmt::Debug for dyn Qualifier + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<qualifier>")
    }
}

/// A codec for `bytestream` or `protobuf` messages.
///
/// The per-field layout is entirely the codec's business; the core hands it
/// the full message instance and expects round-tripping up to instance
/// equality.
pub trait Codec {
    /// Encodes a message instance to bytes.
    fn encode(&self, program: &Program, msg: &MessageValue) -> Result<Vec<u8>, CodecError>;

    /// Decodes bytes back into an instance of the given declaration.
    fn decode(
        &self,
        program: &Program,
        decl: &str,
        payload: &[u8],
    ) -> Result<MessageValue, CodecError>;
}

/// The map from dotted external names to callable implementations.
#[derive(Default)]
pub struct Registry {
    events: HashMap<String, Box<dyn ExternalEvent>>,
    qualifiers: HashMap<String, Box<dyn Qualifier>>,
    codecs: HashMap<String, Box<dyn Codec>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a terminal event handler under a dotted name.
    pub fn register_event(&mut self, name: impl Into<String>, handler: impl ExternalEvent + 'static) {
        self.events.insert(name.into(), Box::new(handler));
    }

    /// Registers a qualifier under a dotted name.
    pub fn register_qualifier(&mut self, name: impl Into<String>, qualifier: impl Qualifier + 'static) {
        self.qualifiers.insert(name.into(), Box::new(qualifier));
    }

    /// Registers a codec under a dotted name.
    pub fn register_codec(&mut self, name: impl Into<String>, codec: impl Codec + 'static) {
        self.codecs.insert(name.into(), Box::new(codec));
    }

    /// Looks up a terminal event handler.
    pub fn event(&self, name: &str) -> Result<&dyn ExternalEvent, RegistryError> {
        self.events
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| RegistryError {
                kind: "event".to_string(),
                name: name.to_string(),
            })
    }

    /// Looks up a qualifier.
    pub fn qualifier(&self, name: &str) -> Result<&dyn Qualifier, RegistryError> {
        self.qualifiers
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| RegistryError {
                kind: "qualifier".to_string(),
                name: name.to_string(),
            })
    }

    /// Looks up a codec.
    pub fn codec(&self, name: &str) -> Result<&dyn Codec, RegistryError> {
        self.codecs
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| RegistryError {
                kind: "codec".to_string(),
                name: name.to_string(),
            })
    }

    /// Verifies that every external name the program uses is registered.
    ///
    /// Run this before execution; a missing binding is fatal.
    pub fn validate(&self, program: &Program) -> Result<(), RegistryError> {
        let (events, qualifiers, codecs) = program.external_names();
        for name in &events {
            self.event(name)?;
        }
        for name in &qualifiers {
            self.qualifier(name)?;
        }
        for name in &codecs {
            self.codec(name)?;
        }
        Ok(())
    }

    /// Encodes a message instance per its declared encoding.
    ///
    /// `json` is handled by the core; `bytestream` and `protobuf` dispatch
    /// to the codec registered under the declaration's external reference.
    pub fn encode_message(
        &self,
        program: &Program,
        msg: &MessageValue,
    ) -> Result<Vec<u8>, CodecError> {
        let decl = program
            .message(&msg.decl)
            .ok_or_else(|| CodecError::UnknownMessage(msg.decl.clone()))?;
        match decl.encoding {
            Encoding::Json => value::encode_json(msg),
            Encoding::Bytestream | Encoding::Protobuf => {
                let name = decl.external.as_deref().ok_or_else(|| CodecError::Codec {
                    name: msg.decl.clone(),
                    reason: "message has no external codec reference".to_string(),
                })?;
                let codec = self.codec(name).map_err(|err| CodecError::Codec {
                    name: name.to_string(),
                    reason: err.to_string(),
                })?;
                codec.encode(program, msg)
            }
        }
    }

    /// Decodes a payload per the declaration's encoding, the inverse of
    /// [`Registry::encode_message`].
    pub fn decode_message(
        &self,
        program: &Program,
        decl_name: &str,
        payload: &[u8],
    ) -> Result<MessageValue, CodecError> {
        let decl = program
            .message(decl_name)
            .ok_or_else(|| CodecError::UnknownMessage(decl_name.to_string()))?;
        match decl.encoding {
            Encoding::Json => value::decode_json(program, decl_name, payload),
            Encoding::Bytestream | Encoding::Protobuf => {
                let name = decl.external.as_deref().ok_or_else(|| CodecError::Codec {
                    name: decl_name.to_string(),
                    reason: "message has no external codec reference".to_string(),
                })?;
                let codec = self.codec(name).map_err(|err| CodecError::Codec {
                    name: name.to_string(),
                    reason: err.to_string(),
                })?;
                codec.decode(program, decl_name, payload)
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("qualifiers", &self.qualifiers.keys().collect::<Vec<_>>())
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

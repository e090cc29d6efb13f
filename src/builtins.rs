//! Stock primitives shipped with the core.
//!
//! Conformance programs lean on a handful of well-known externals: logging
//! events that always succeed and the `UniqueInt` qualifier. Hosts register
//! their own primitives for everything protocol-specific; these cover the
//! scaffolding every suite needs.
//!
//! Names follow the `stl.<kind>.<Name>` convention:
//!
//! | Name | Kind | Behavior |
//! |---|---|---|
//! | `stl.events.LogParams` | event | logs roles and raw parameters |
//! | `stl.events.LogEncodedParams` | event | logs roles and the encoded payload |
//! | `stl.qualifiers.UniqueInt` | qualifier | fresh integer per call |

use crate::registry::{EventContext, EventOutcome, ExternalEvent, Qualifier, Registry};
use crate::value::Value;
use std::cell::Cell;

/// Logs the source role, target role, and raw parameter values.
///
/// Always succeeds.
#[derive(Debug, Default)]
pub struct LogParams;

impl ExternalEvent for LogParams {
    fn invoke(&self, ctx: &EventContext<'_>) -> EventOutcome {
        let params = ctx
            .params
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        log::info!("{} -> {}: params [{}]", ctx.source, ctx.target, params);
        EventOutcome::Ok
    }
}

/// Logs the source role, target role, and the encoded payload.
///
/// Always succeeds. Messages without a payload log as such.
#[derive(Debug, Default)]
pub struct LogEncodedParams;

impl ExternalEvent for LogEncodedParams {
    fn invoke(&self, ctx: &EventContext<'_>) -> EventOutcome {
        match ctx.payload {
            Some(payload) => log::info!(
                "{} -> {}: payload {}",
                ctx.source,
                ctx.target,
                String::from_utf8_lossy(payload)
            ),
            None => log::info!("{} -> {}: no payload", ctx.source, ctx.target),
        }
        EventOutcome::Ok
    }
}

/// Produces a fresh integer on every call.
///
/// Values generated by one instance are pairwise distinct within a run.
/// The executor is single-threaded, so a plain cell suffices.
#[derive(Debug)]
pub struct UniqueInt {
    next: Cell<i64>,
}

impl UniqueInt {
    /// Creates a generator starting at 1.
    pub fn new() -> Self {
        UniqueInt { next: Cell::new(1) }
    }
}

impl Default for UniqueInt {
    fn default() -> Self {
        Self::new()
    }
}

impl Qualifier for UniqueInt {
    fn invoke(&self, _args: &[Value]) -> Result<Value, String> {
        let value = self.next.get();
        self.next.set(value + 1);
        Ok(Value::Int(value))
    }
}

/// Registers every stock primitive under its conventional name.
pub fn register_builtins(registry: &mut Registry) {
    registry.register_event("stl.events.LogParams", LogParams);
    registry.register_event("stl.events.LogEncodedParams", LogEncodedParams);
    registry.register_qualifier("stl.qualifiers.UniqueInt", UniqueInt::new());
}

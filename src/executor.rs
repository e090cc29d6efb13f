//! The transition executor.
//!
//! The executor owns the mutable global-state valuation `G` and drives roles
//! through firable transitions. Each step:
//!
//! 1. enumerates the program's transition bindings whose events list begins
//!    with an event originating at the stepped role,
//! 2. keeps those whose `pre_states` are satisfied by `G` (an empty
//!    `pre_states` is unconditionally firable),
//! 3. picks one per the selection policy (declaration order by default, or
//!    seeded-random for exploration),
//! 4. executes the transition's events in order, expanding composite events
//!    bottom-up with a bounded depth, invoking external primitives through
//!    the registry, and
//! 5. commits `post_states` atomically on success, `error_states` atomically
//!    on a recoverable failure when declared, and rolls back otherwise.
//!
//! A transition frame moves through the lifecycle
//! `INIT -> RUNNING -> COMMIT | ROLLBACK | ERROR_COMMIT -> DONE`; `G` is
//! only ever mutated in the commit phases, so a half-applied `post_states`
//! is never observable.
//!
//! The executor is single-threaded and cooperative: every step runs to
//! completion, and primitive calls are opaque synchronous operations.

use crate::error::ExecError;
use crate::program::{
    fqn, EventBody, EventCall, EventStep, Expr, Literal, PostState, Program, TransitionDecl,
};
use crate::registry::{EventContext, EventOutcome, Registry};
use crate::value::{FieldValue, MessageValue, RoleInstance, StateInstance, Value};
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Default bound on composite event expansion depth.
pub const DEFAULT_DEPTH_LIMIT: usize = 64;

/// The global-state valuation: a partial mapping from state instances to
/// symbolic values.
pub type Valuation = HashMap<StateInstance, String>;

/// How the executor picks among several firable transitions.
#[derive(Debug)]
pub enum SelectionPolicy {
    /// First firable transition in declaration order (the default)
    DeclarationOrder,
    /// Uniformly random among the firable set, from a seeded generator
    Random(rand::rngs::StdRng),
}

impl SelectionPolicy {
    /// Creates a reproducible randomized policy from a seed.
    pub fn random(seed: u64) -> Self {
        SelectionPolicy::Random(rand::rngs::StdRng::seed_from_u64(seed))
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::DeclarationOrder
    }
}

/// The lifecycle of one transition frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Created, no event dispatched yet
    Init,
    /// Events executing in declared order
    Running,
    /// All events succeeded; `post_states` being applied
    Commit,
    /// An event failed with no `error_states`; `G` restored
    Rollback,
    /// An event failed; `error_states` being applied
    ErrorCommit,
    /// Terminal
    Done,
}

/// The outcome of a driver step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A transition was selected and executed.
    Fired {
        /// Fully-qualified name of the fired binding
        transition: String,
        /// How the frame terminated
        result: TransitionResult,
    },
    /// No transition was firable for the role.
    Stuck(StuckReport),
}

/// How a fired transition's frame terminated.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// All events succeeded and `post_states` was applied.
    Committed,
    /// An event failed and `error_states` was applied.
    ErrorCommitted {
        /// Index of the failing event
        event_index: usize,
        /// The primitive's reason string
        reason: String,
    },
    /// An event failed with no `error_states`; `G` is unchanged.
    RolledBack {
        /// Index of the failing event
        event_index: usize,
        /// The primitive's reason string
        reason: String,
    },
}

/// A stuck report: the stepped role and why each candidate was not firable.
#[derive(Debug, Clone, PartialEq)]
pub struct StuckReport {
    /// The role that was stepped
    pub role: String,
    /// Per-candidate unmet preconditions
    pub preconditions: Vec<PreconditionReport>,
}

/// The unmet preconditions of one non-firable candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct PreconditionReport {
    /// Fully-qualified binding name
    pub transition: String,
    /// Every precondition the valuation does not satisfy
    pub unmet: Vec<UnmetPrecondition>,
}

/// One unsatisfied precondition.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmetPrecondition {
    /// The constrained state instance
    pub state: StateInstance,
    /// The declared OR-set
    pub acceptable: Vec<String>,
    /// The instance's current value, if mapped at all
    pub actual: Option<String>,
}

/// How an event parameter is bound inside an expansion environment.
///
/// A by-value parameter carries the evaluated value; a `&` parameter is a
/// handle to a transition-frame local cell, so writes through it land in
/// the frame.
#[derive(Debug, Clone)]
enum Binding {
    Value(Value),
    Cell(String),
}

/// Failure modes of a single event, before the frame decides what to do.
enum EventError {
    /// Consumed by the frame: `error_states` or rollback
    Recoverable(String),
    /// Aborts the run with the raw reason (frame adds context)
    Fatal(String),
    /// Aborts the run with an already-formed error
    Exec(ExecError),
}

impl From<ExecError> for EventError {
    fn from(err: ExecError) -> Self {
        EventError::Exec(err)
    }
}

/// The transition executor.
#[derive(Debug)]
pub struct Executor<'p> {
    program: &'p Program,
    registry: &'p Registry,
    valuation: Valuation,
    roles: HashMap<String, RoleInstance>,
    policy: SelectionPolicy,
    depth_limit: usize,
}

impl<'p> Executor<'p> {
    /// Creates an executor over a linked program and a populated registry.
    ///
    /// Performs the registry preflight: every external name the program
    /// uses must be registered.
    pub fn new(program: &'p Program, registry: &'p Registry) -> Result<Self, ExecError> {
        registry.validate(program)?;
        Ok(Executor {
            program,
            registry,
            valuation: Valuation::new(),
            roles: HashMap::new(),
            policy: SelectionPolicy::default(),
            depth_limit: DEFAULT_DEPTH_LIMIT,
        })
    }

    /// Replaces the selection policy.
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the composite-expansion depth bound.
    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    /// Installs a role instance, keyed by its fully-qualified role name.
    pub fn add_role(&mut self, instance: RoleInstance) {
        self.roles.insert(instance.role.clone(), instance);
    }

    /// Assigns a state instance in the global valuation.
    pub fn set_state(&mut self, instance: StateInstance, value: impl Into<String>) {
        self.valuation.insert(instance, value.into());
    }

    /// Reads a state instance's current value.
    pub fn state(&self, instance: &StateInstance) -> Option<&str> {
        self.valuation.get(instance).map(String::as_str)
    }

    /// Returns the full global valuation.
    pub fn valuation(&self) -> &Valuation {
        &self.valuation
    }

    /// Performs one driver step for the given role.
    ///
    /// Enumerates firable transitions whose first event originates at the
    /// role, selects one per the policy, and executes it. Returns
    /// [`StepOutcome::Stuck`] when nothing is firable; that is a report,
    /// not an error.
    pub fn step(&mut self, role: &str) -> Result<StepOutcome, ExecError> {
        struct Candidate<'p> {
            name: String,
            decl: &'p TransitionDecl,
            params: HashMap<String, Binding>,
        }

        let mut firable = Vec::new();
        let mut reports = Vec::new();
        for (module, binding) in self.program.bindings() {
            let decl = self.program.transition(&binding.decl).ok_or_else(|| {
                ExecError::Invariant(format!("binding targets unknown transition '{}'", binding.decl))
            })?;
            let starts_here = decl
                .events
                .first()
                .map(|step| step.source == role)
                .unwrap_or(false);
            if !starts_here {
                continue;
            }

            let name = fqn(&module.name, &binding.name);
            let params = self.bind_params(decl, &binding.args)?;
            let unmet = self.unmet_preconditions(decl, &params)?;
            if unmet.is_empty() {
                firable.push(Candidate { name, decl, params });
            } else {
                reports.push(PreconditionReport {
                    transition: name,
                    unmet,
                });
            }
        }

        if firable.is_empty() {
            log::info!("role '{}' is stuck ({} candidate(s) blocked)", role, reports.len());
            return Ok(StepOutcome::Stuck(StuckReport {
                role: role.to_string(),
                preconditions: reports,
            }));
        }

        let chosen = match &mut self.policy {
            SelectionPolicy::DeclarationOrder => firable.remove(0),
            SelectionPolicy::Random(rng) => firable.remove(rng.gen_range(0..firable.len())),
        };

        let result = self.run_transition(&chosen.name, chosen.decl, chosen.params)?;
        Ok(StepOutcome::Fired {
            transition: chosen.name,
            result,
        })
    }

    // -----------------------------------------------------------------------
    // Firability
    // -----------------------------------------------------------------------

    /// Evaluates a binding's arguments against the declaration parameters.
    fn bind_params(
        &self,
        decl: &TransitionDecl,
        args: &[Expr],
    ) -> Result<HashMap<String, Binding>, ExecError> {
        let empty_bindings = HashMap::new();
        let mut locals = HashMap::new();
        let mut params = HashMap::new();
        for ((name, _), arg) in decl.params.iter().zip(args) {
            let value = self
                .eval_expr(arg, &empty_bindings, &mut locals)
                .map_err(|err| match err {
                    EventError::Exec(err) => err,
                    EventError::Recoverable(reason) | EventError::Fatal(reason) => {
                        ExecError::Invariant(format!(
                            "binding argument for '{}' is not constant: {}",
                            name, reason
                        ))
                    }
                })?;
            params.insert(name.clone(), Binding::Value(value));
        }
        Ok(params)
    }

    /// Returns every precondition of `decl` the valuation fails to satisfy.
    fn unmet_preconditions(
        &self,
        decl: &TransitionDecl,
        params: &HashMap<String, Binding>,
    ) -> Result<Vec<UnmetPrecondition>, ExecError> {
        let mut unmet = Vec::new();
        let mut scratch = HashMap::new();
        for pre in &decl.pre_states {
            let instance = self.eval_state_instance(&pre.state.decl, &pre.state.args, params, &mut scratch)?;
            let actual = self.valuation.get(&instance);
            let satisfied = actual
                .map(|value| pre.values.iter().any(|v| v == value))
                .unwrap_or(false);
            if !satisfied {
                unmet.push(UnmetPrecondition {
                    state: instance,
                    acceptable: pre.values.clone(),
                    actual: actual.cloned(),
                });
            }
        }
        Ok(unmet)
    }

    fn eval_state_instance(
        &self,
        decl: &str,
        args: &[Expr],
        params: &HashMap<String, Binding>,
        locals: &mut HashMap<String, Value>,
    ) -> Result<StateInstance, ExecError> {
        let values = args
            .iter()
            .map(|arg| self.eval_expr(arg, params, locals))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| match err {
                EventError::Exec(err) => err,
                EventError::Recoverable(reason) | EventError::Fatal(reason) => {
                    ExecError::Invariant(format!("state parameter is not constant: {}", reason))
                }
            })?;
        Ok(StateInstance {
            decl: decl.to_string(),
            params: values,
        })
    }

    // -----------------------------------------------------------------------
    // Transition frames
    // -----------------------------------------------------------------------

    /// Runs one selected transition to completion.
    fn run_transition(
        &mut self,
        name: &str,
        decl: &TransitionDecl,
        params: HashMap<String, Binding>,
    ) -> Result<TransitionResult, ExecError> {
        let snapshot = self.valuation.clone();
        let mut locals: HashMap<String, Value> = decl
            .locals
            .iter()
            .map(|(local, _)| (local.clone(), Value::Absent))
            .collect();
        let mut state = FrameState::Init;
        log::debug!("transition '{}': {:?}", name, state);

        state = FrameState::Running;
        log::debug!("transition '{}': {:?}", name, state);
        for (index, step) in decl.events.iter().enumerate() {
            match self.run_event_step(step, &params, &mut locals) {
                Ok(()) => {}
                Err(EventError::Recoverable(reason)) => {
                    log::warn!(
                        "transition '{}', event {}, role '{}': event failed: {}",
                        name,
                        index,
                        step.source,
                        reason
                    );
                    return if decl.error_states.is_some() {
                        state = FrameState::ErrorCommit;
                        log::debug!("transition '{}': {:?}", name, state);
                        let entries = decl.error_states.as_deref().unwrap_or_default();
                        self.apply_states(entries, &params)?;
                        log::debug!("transition '{}': {:?}", name, FrameState::Done);
                        Ok(TransitionResult::ErrorCommitted {
                            event_index: index,
                            reason,
                        })
                    } else {
                        state = FrameState::Rollback;
                        log::debug!("transition '{}': {:?}", name, state);
                        self.valuation = snapshot;
                        log::debug!("transition '{}': {:?}", name, FrameState::Done);
                        Ok(TransitionResult::RolledBack {
                            event_index: index,
                            reason,
                        })
                    };
                }
                Err(EventError::Fatal(reason)) => {
                    log::error!(
                        "transition '{}', event {}, role '{}': fatal: {}",
                        name,
                        index,
                        step.source,
                        reason
                    );
                    return Err(ExecError::Fatal {
                        transition: name.to_string(),
                        event_index: index,
                        reason,
                    });
                }
                Err(EventError::Exec(err)) => return Err(err),
            }
        }

        state = FrameState::Commit;
        log::debug!("transition '{}': {:?}", name, state);
        self.apply_states(&decl.post_states, &params)?;
        log::debug!("transition '{}': committed", name);
        Ok(TransitionResult::Committed)
    }

    /// Applies a `post_states`/`error_states` block atomically.
    ///
    /// Every instance and value is computed before the first insertion, so
    /// an evaluation error leaves the valuation untouched.
    fn apply_states(
        &mut self,
        entries: &[PostState],
        params: &HashMap<String, Binding>,
    ) -> Result<(), ExecError> {
        let mut scratch = HashMap::new();
        let mut updates = Vec::with_capacity(entries.len());
        for entry in entries {
            let instance =
                self.eval_state_instance(&entry.state.decl, &entry.state.args, params, &mut scratch)?;
            updates.push((instance, entry.value.clone()));
        }
        for (instance, value) in updates {
            self.valuation.insert(instance, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event expansion
    // -----------------------------------------------------------------------

    fn run_event_step(
        &self,
        step: &EventStep,
        params: &HashMap<String, Binding>,
        locals: &mut HashMap<String, Value>,
    ) -> Result<(), EventError> {
        self.run_call(&step.call, params, locals, &step.source, &step.target, 0)
    }

    /// Expands one event call, recursing through composite bodies.
    fn run_call(
        &self,
        call: &EventCall,
        bindings: &HashMap<String, Binding>,
        locals: &mut HashMap<String, Value>,
        source: &str,
        target: &str,
        depth: usize,
    ) -> Result<(), EventError> {
        if depth > self.depth_limit {
            return Err(EventError::Exec(ExecError::DepthExceeded {
                event: call.event.clone(),
                limit: self.depth_limit,
            }));
        }
        let decl = self.program.event(&call.event).ok_or_else(|| {
            ExecError::Invariant(format!("call to unknown event '{}'", call.event))
        })?;

        // Bind actuals to the callee's parameters. By-reference parameters
        // forward the underlying frame cell.
        let mut child = HashMap::with_capacity(decl.params.len());
        for (arg, param) in call.args.iter().zip(&decl.params) {
            if param.by_ref {
                let cell = match arg {
                    Expr::Local(local) => local.clone(),
                    Expr::Param(outer) => match bindings.get(outer) {
                        Some(Binding::Cell(cell)) => cell.clone(),
                        _ => {
                            return Err(EventError::Exec(ExecError::Invariant(format!(
                                "reference argument '{}' of '{}' is not a cell",
                                outer, call.event
                            ))))
                        }
                    },
                    _ => {
                        return Err(EventError::Exec(ExecError::Invariant(format!(
                            "reference argument of '{}' is not an lvalue",
                            call.event
                        ))))
                    }
                };
                child.insert(param.name.clone(), Binding::Cell(cell));
            } else {
                let value = self.eval_expr(arg, bindings, locals)?;
                child.insert(param.name.clone(), Binding::Value(value));
            }
        }

        match &decl.body {
            EventBody::NoOp => Ok(()),
            EventBody::Composite(inner) => {
                self.run_call(inner, &child, locals, source, target, depth + 1)
            }
            EventBody::External(external) => {
                self.invoke_external(external, decl, &child, locals, source, target)
            }
        }
    }

    /// Invokes a terminal event through the registry.
    fn invoke_external(
        &self,
        external: &str,
        decl: &crate::program::EventDecl,
        bindings: &HashMap<String, Binding>,
        locals: &HashMap<String, Value>,
        source: &str,
        target: &str,
    ) -> Result<(), EventError> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let value = match bindings.get(&param.name) {
                Some(Binding::Value(value)) => value.clone(),
                Some(Binding::Cell(cell)) => {
                    locals.get(cell).cloned().unwrap_or(Value::Absent)
                }
                None => {
                    return Err(EventError::Exec(ExecError::Invariant(format!(
                        "parameter '{}' of '{}' is unbound",
                        param.name, decl.name
                    ))))
                }
            };
            params.push(value);
        }

        // Message parameters travel encoded as well, concatenated in order.
        let mut payload = Vec::new();
        let mut has_payload = false;
        for value in &params {
            match value {
                Value::Message(msg) => {
                    let bytes = self
                        .registry
                        .encode_message(self.program, msg)
                        .map_err(|err| EventError::Recoverable(err.to_string()))?;
                    payload.extend_from_slice(&bytes);
                    has_payload = true;
                }
                Value::Array(items) => {
                    for item in items {
                        if let Value::Message(msg) = item {
                            let bytes = self
                                .registry
                                .encode_message(self.program, msg)
                                .map_err(|err| EventError::Recoverable(err.to_string()))?;
                            payload.extend_from_slice(&bytes);
                            has_payload = true;
                        }
                    }
                }
                _ => {}
            }
        }

        let handler = self
            .registry
            .event(external)
            .map_err(|err| EventError::Exec(err.into()))?;
        let source_role = self.role_instance(source)?;
        let target_role = self.role_instance(target)?;
        let ctx = EventContext {
            source: source_role,
            target: target_role,
            params: &params,
            payload: has_payload.then_some(payload.as_slice()),
        };
        match handler.invoke(&ctx) {
            EventOutcome::Ok => Ok(()),
            EventOutcome::Recoverable(reason) => Err(EventError::Recoverable(reason)),
            EventOutcome::Fatal(reason) => Err(EventError::Fatal(reason)),
        }
    }

    fn role_instance(&self, role: &str) -> Result<&RoleInstance, EventError> {
        self.roles.get(role).ok_or_else(|| {
            EventError::Exec(ExecError::MissingRole {
                role: role.to_string(),
            })
        })
    }

    // -----------------------------------------------------------------------
    // Expression evaluation
    // -----------------------------------------------------------------------

    /// Evaluates an expression against the current bindings and frame cells.
    ///
    /// Field values and arguments evaluate left to right in declaration
    /// order; a qualifier's value is bound to its position and also written
    /// through any `-> var` target.
    fn eval_expr(
        &self,
        expr: &Expr,
        bindings: &HashMap<String, Binding>,
        locals: &mut HashMap<String, Value>,
    ) -> Result<Value, EventError> {
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Param(name) => match bindings.get(name) {
                Some(Binding::Value(value)) => Ok(value.clone()),
                Some(Binding::Cell(cell)) => {
                    Ok(locals.get(cell).cloned().unwrap_or(Value::Absent))
                }
                None => Err(EventError::Exec(ExecError::Invariant(format!(
                    "unbound parameter '{}'",
                    name
                )))),
            },
            Expr::Local(name) => Ok(locals.get(name).cloned().unwrap_or(Value::Absent)),
            Expr::Qualifier {
                decl,
                args,
                write_to,
            } => {
                let qualifier_decl = self.program.qualifier(decl).ok_or_else(|| {
                    ExecError::Invariant(format!("call to unknown qualifier '{}'", decl))
                })?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, bindings, locals)?);
                }
                let qualifier = self
                    .registry
                    .qualifier(&qualifier_decl.external)
                    .map_err(|err| EventError::Exec(err.into()))?;
                let value = qualifier
                    .invoke(&values)
                    .map_err(EventError::Recoverable)?;
                // Qualifier validation failure is a recoverable event failure
                if !value.has_type(&qualifier_decl.return_ty) {
                    return Err(EventError::Recoverable(format!(
                        "qualifier '{}' returned {}, declared {}",
                        decl,
                        value.type_name(),
                        qualifier_decl.return_ty
                    )));
                }
                if let Some(target) = write_to {
                    self.write_cell(target, value.clone(), bindings, locals)?;
                }
                Ok(value)
            }
            Expr::Message(lit) => self
                .eval_message(&lit.decl, &lit.fields, bindings, locals)
                .map(Value::Message),
            Expr::Array { decl, elements } => {
                let mut items = Vec::with_capacity(elements.len());
                for fields in elements {
                    items.push(Value::Message(
                        self.eval_message(decl, fields, bindings, locals)?,
                    ));
                }
                Ok(Value::Array(items))
            }
        }
    }

    /// Builds a message instance, evaluating fields in declaration order.
    fn eval_message(
        &self,
        decl_name: &str,
        inits: &[crate::program::FieldInit],
        bindings: &HashMap<String, Binding>,
        locals: &mut HashMap<String, Value>,
    ) -> Result<MessageValue, EventError> {
        let decl = self.program.message(decl_name).ok_or_else(|| {
            ExecError::Invariant(format!("literal of unknown message '{}'", decl_name))
        })?;
        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let value = match inits.iter().find(|init| init.name == field.name) {
                Some(init) => Some(self.eval_expr(&init.value, bindings, locals)?),
                None => None,
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

    /// Writes a qualifier value through a `-> var` target.
    fn write_cell(
        &self,
        target: &str,
        value: Value,
        bindings: &HashMap<String, Binding>,
        locals: &mut HashMap<String, Value>,
    ) -> Result<(), EventError> {
        match bindings.get(target) {
            Some(Binding::Cell(cell)) => {
                locals.insert(cell.clone(), value);
                Ok(())
            }
            Some(Binding::Value(_)) => Err(EventError::Exec(ExecError::Invariant(format!(
                "qualifier write targets by-value parameter '{}'",
                target
            )))),
            None => {
                locals.insert(target.to_string(), value);
                Ok(())
            }
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => Value::Int(*n),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_policy_default_is_declaration_order() {
        assert!(matches!(
            SelectionPolicy::default(),
            SelectionPolicy::DeclarationOrder
        ));
    }

    #[test]
    fn test_frame_state_terminals() {
        assert_ne!(FrameState::Rollback, FrameState::ErrorCommit);
        assert_eq!(FrameState::Done, FrameState::Done);
    }
}

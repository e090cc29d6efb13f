//! Type checking for linked STL programs.
//!
//! The checker runs over the [`Program`] the linker produced, after every
//! name has been resolved. It enforces:
//!
//! - state parameter arity and types at every reference, and membership of
//!   symbolic values in the state's declared set;
//! - event and transition call-site types;
//! - message-field assignments: right-hand types match field declarations,
//!   nested messages accept only literals of the declared type, repeated
//!   fields accept array literals, required fields appear in every literal;
//! - reference parameters: a `&` parameter takes only an lvalue of identical
//!   type (a transition local, or a forwarded `&` parameter inside an event
//!   body), and a qualifier write `-> var` targets only such an lvalue;
//! - qualifier arity and return types at every call site.
//!
//! Errors are accumulated rather than failing fast, so one pass reports
//! every violation in the program.

use crate::program::{
    EventDecl, EventParam, Expr, FieldInit, Literal, MessageDecl, Module, Multiplicity, PostState,
    PreState, Program, StateRef, TransitionDecl, Type,
};
use std::collections::HashSet;
use std::fmt;

/// A type violation: where it happened, what was expected, what was found.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeError {
    /// Human-readable location ("transition 'tls::tConnect', event 0, ...")
    pub context: String,
    /// The expected type or shape, if applicable
    pub expected: Option<String>,
    /// What was actually found, if applicable
    pub got: Option<String>,
}

impl TypeError {
    /// Creates an error with only a message.
    pub fn new(context: impl Into<String>) -> Self {
        TypeError {
            context: context.into(),
            expected: None,
            got: None,
        }
    }

    /// Creates a mismatch error.
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl fmt::Display,
        got: impl fmt::Display,
    ) -> Self {
        TypeError {
            context: context.into(),
            expected: Some(expected.to_string()),
            got: Some(got.to_string()),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type error in {}", self.context)?;
        match (&self.expected, &self.got) {
            (Some(expected), Some(got)) => {
                write!(f, ": expected {}, got {}", expected, got)
            }
            _ => Ok(()),
        }
    }
}

impl std::error::Error for TypeError {}

/// Checks a linked program, returning every violation found.
pub fn check_program(program: &Program) -> Result<(), Vec<TypeError>> {
    let mut checker = TypeChecker::new(program);
    checker.check();
    if checker.errors.is_empty() {
        Ok(())
    } else {
        Err(checker.errors)
    }
}

/// What kind of lvalue scope the current expression sits in.
enum LvalueScope<'a> {
    /// Inside a transition: locals are the writable cells
    Transition(&'a TransitionDecl),
    /// Inside an event body: forwarded `&` parameters are the writable cells
    Event(&'a EventDecl),
    /// No writable cells (bindings, state parameters)
    None,
}

/// Context for checking one expression tree.
struct ExprCtx<'a> {
    /// Visible parameters: name and type
    params: &'a [(String, Type)],
    /// Visible locals: name and type
    locals: &'a [(String, Type)],
    /// Where writes and by-ref passing may land
    lvalues: LvalueScope<'a>,
    /// Whether qualifier calls are allowed here
    allow_qualifiers: bool,
}

/// The program checker. Accumulates errors across the whole program.
pub struct TypeChecker<'a> {
    program: &'a Program,
    errors: Vec<TypeError>,
}

impl<'a> TypeChecker<'a> {
    /// Creates a checker for the given program.
    pub fn new(program: &'a Program) -> Self {
        TypeChecker {
            program,
            errors: Vec::new(),
        }
    }

    /// Returns the errors accumulated so far.
    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    /// Returns true if no errors have been recorded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Checks every module of the program.
    pub fn check(&mut self) {
        for module in &self.program.modules {
            self.check_module(module);
        }
    }

    fn check_module(&mut self, module: &'a Module) {
        for constant in &module.consts {
            let where_ = format!("constant '{}::{}'", module.name, constant.name);
            match &constant.ty {
                Type::Message(_) => {
                    self.errors.push(TypeError::mismatch(
                        where_,
                        "a scalar type",
                        &constant.ty,
                    ));
                }
                scalar => {
                    if literal_type(&constant.value) != *scalar {
                        self.errors.push(TypeError::mismatch(
                            where_,
                            scalar,
                            literal_type(&constant.value),
                        ));
                    }
                }
            }
        }

        for role in &module.roles {
            for (field, ty) in &role.fields {
                if matches!(ty, Type::Message(_)) {
                    self.errors.push(TypeError::mismatch(
                        format!("role '{}::{}', field '{}'", module.name, role.name, field),
                        "a scalar type",
                        ty,
                    ));
                }
            }
        }

        for message in &module.messages {
            self.check_message_decl(module, message);
        }

        for event in &module.events {
            self.check_event_decl(module, event);
        }

        for transition in &module.transitions {
            self.check_transition(module, transition);
        }

        for binding in &module.bindings {
            self.check_binding(module, binding);
        }
    }

    fn check_message_decl(&mut self, module: &Module, message: &MessageDecl) {
        use crate::program::Encoding;
        if matches!(message.encoding, Encoding::Bytestream | Encoding::Protobuf)
            && message.external.is_none()
        {
            self.errors.push(TypeError::new(format!(
                "message '{}::{}': {} encoding requires an external codec reference",
                module.name, message.name, message.encoding
            )));
        }
    }

    fn check_event_decl(&mut self, module: &Module, event: &'a EventDecl) {
        if let crate::program::EventBody::Composite(call) = &event.body {
            let where_ = format!("event '{}::{}'", module.name, event.name);
            let params: Vec<(String, Type)> = event
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.clone()))
                .collect();
            let ctx = ExprCtx {
                params: &params,
                locals: &[],
                lvalues: LvalueScope::Event(event),
                allow_qualifiers: true,
            };
            self.check_event_call(&call.event, &call.args, &ctx, &where_);
        }
    }

    fn check_transition(&mut self, module: &Module, transition: &'a TransitionDecl) {
        let name = format!("{}::{}", module.name, transition.name);

        // State parameters must be fixed before any event runs, so they may
        // only use literals and transition parameters.
        let const_ctx = ExprCtx {
            params: &transition.params,
            locals: &[],
            lvalues: LvalueScope::None,
            allow_qualifiers: false,
        };
        for (idx, pre) in transition.pre_states.iter().enumerate() {
            let where_ = format!("transition '{}', pre_states entry {}", name, idx);
            self.check_state_ref(&pre.state, &const_ctx, &where_);
            self.check_pre_values(pre, &where_);
        }
        for (idx, post) in transition.post_states.iter().enumerate() {
            let where_ = format!("transition '{}', post_states entry {}", name, idx);
            self.check_state_ref(&post.state, &const_ctx, &where_);
            self.check_post_value(post, &where_);
        }
        if let Some(entries) = &transition.error_states {
            for (idx, post) in entries.iter().enumerate() {
                let where_ = format!("transition '{}', error_states entry {}", name, idx);
                self.check_state_ref(&post.state, &const_ctx, &where_);
                self.check_post_value(post, &where_);
            }
        }

        let ctx = ExprCtx {
            params: &transition.params,
            locals: &transition.locals,
            lvalues: LvalueScope::Transition(transition),
            allow_qualifiers: true,
        };
        for (idx, step) in transition.events.iter().enumerate() {
            let where_ = format!("transition '{}', event {}", name, idx);
            self.check_event_call(&step.call.event, &step.call.args, &ctx, &where_);
        }
    }

    fn check_binding(&mut self, module: &Module, binding: &crate::program::TransitionBinding) {
        let where_base = format!("binding '{}::{}'", module.name, binding.name);
        let Some(decl) = self.program.transition(&binding.decl) else {
            // The linker guarantees this; stay silent rather than double-report
            return;
        };
        let ctx = ExprCtx {
            params: &[],
            locals: &[],
            lvalues: LvalueScope::None,
            allow_qualifiers: false,
        };
        for (idx, (arg, (param, ty))) in
            binding.args.iter().zip(decl.params.iter()).enumerate()
        {
            let where_ = format!("{}, argument {} ('{}')", where_base, idx, param);
            self.check_expr(arg, ty, &ctx, &where_);
        }
    }

    // -----------------------------------------------------------------------
    // Pieces
    // -----------------------------------------------------------------------

    fn check_pre_values(&mut self, pre: &PreState, where_: &str) {
        let Some(decl) = self.program.state(&pre.state.decl) else {
            return;
        };
        for value in &pre.values {
            if !decl.has_value(value) {
                self.errors.push(TypeError::mismatch(
                    where_.to_string(),
                    format!("a value of state '{}'", pre.state.decl),
                    format!("'{}'", value),
                ));
            }
        }
    }

    fn check_post_value(&mut self, post: &PostState, where_: &str) {
        let Some(decl) = self.program.state(&post.state.decl) else {
            return;
        };
        if !decl.has_value(&post.value) {
            self.errors.push(TypeError::mismatch(
                where_.to_string(),
                format!("a value of state '{}'", post.state.decl),
                format!("'{}'", post.value),
            ));
        }
    }

    fn check_state_ref(&mut self, state: &StateRef, ctx: &ExprCtx<'_>, where_: &str) {
        let Some(decl) = self.program.state(&state.decl) else {
            return;
        };
        let params = decl.params.clone();
        for (idx, (arg, ty)) in state.args.iter().zip(params.iter()).enumerate() {
            let where_ = format!("{}, state parameter {}", where_, idx);
            self.check_expr(arg, ty, ctx, &where_);
        }
    }

    fn check_event_call(
        &mut self,
        event_fqn: &str,
        args: &[Expr],
        ctx: &ExprCtx<'_>,
        where_: &str,
    ) {
        let Some(decl) = self.program.event(event_fqn) else {
            return;
        };
        let params = decl.params.clone();
        for (idx, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
            let where_ = format!("{} ('{}' parameter {})", where_, event_fqn, idx);
            if param.by_ref {
                self.check_ref_arg(arg, param, ctx, &where_);
            } else {
                self.check_expr(arg, &param.ty, ctx, &where_);
            }
        }
    }

    /// A `&` parameter accepts only an lvalue of identical type.
    fn check_ref_arg(&mut self, arg: &Expr, param: &EventParam, ctx: &ExprCtx<'_>, where_: &str) {
        match (arg, &ctx.lvalues) {
            (Expr::Local(name), LvalueScope::Transition(transition)) => {
                match transition.locals.iter().find(|(local, _)| local == name) {
                    Some((_, ty)) if *ty == param.ty => {}
                    Some((_, ty)) => {
                        self.errors
                            .push(TypeError::mismatch(where_.to_string(), &param.ty, ty));
                    }
                    None => {
                        self.errors.push(TypeError::new(format!(
                            "{}: unknown local '{}'",
                            where_, name
                        )));
                    }
                }
            }
            (Expr::Param(name), LvalueScope::Event(event)) => {
                match event.params.iter().find(|p| &p.name == name) {
                    Some(outer) if outer.by_ref && outer.ty == param.ty => {}
                    Some(outer) if !outer.by_ref => {
                        self.errors.push(TypeError::mismatch(
                            where_.to_string(),
                            "a reference parameter",
                            format!("by-value parameter '{}'", name),
                        ));
                    }
                    Some(outer) => {
                        self.errors.push(TypeError::mismatch(
                            where_.to_string(),
                            &param.ty,
                            &outer.ty,
                        ));
                    }
                    None => {
                        self.errors.push(TypeError::new(format!(
                            "{}: unknown parameter '{}'",
                            where_, name
                        )));
                    }
                }
            }
            _ => {
                self.errors.push(TypeError::mismatch(
                    where_.to_string(),
                    format!("an lvalue of type {}", param.ty),
                    describe_expr(arg),
                ));
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr, expected: &Type, ctx: &ExprCtx<'_>, where_: &str) {
        match expr {
            Expr::Literal(lit) => {
                let got = literal_type(lit);
                if got != *expected {
                    self.errors
                        .push(TypeError::mismatch(where_.to_string(), expected, got));
                }
            }
            Expr::Param(name) => {
                match ctx.params.iter().find(|(param, _)| param == name) {
                    Some((_, ty)) if ty == expected => {}
                    Some((_, ty)) => {
                        self.errors
                            .push(TypeError::mismatch(where_.to_string(), expected, ty));
                    }
                    None => {
                        self.errors.push(TypeError::new(format!(
                            "{}: unknown parameter '{}'",
                            where_, name
                        )));
                    }
                }
            }
            Expr::Local(name) => {
                if matches!(ctx.lvalues, LvalueScope::None) {
                    self.errors.push(TypeError::mismatch(
                        where_.to_string(),
                        "a constant expression",
                        format!("local variable '{}'", name),
                    ));
                    return;
                }
                match ctx.locals.iter().find(|(local, _)| local == name) {
                    Some((_, ty)) if ty == expected => {}
                    Some((_, ty)) => {
                        self.errors
                            .push(TypeError::mismatch(where_.to_string(), expected, ty));
                    }
                    None => {
                        self.errors.push(TypeError::new(format!(
                            "{}: unknown local '{}'",
                            where_, name
                        )));
                    }
                }
            }
            Expr::Qualifier {
                decl,
                args,
                write_to,
            } => {
                if !ctx.allow_qualifiers {
                    self.errors.push(TypeError::mismatch(
                        where_.to_string(),
                        "a constant expression",
                        format!("qualifier call '{}'", decl),
                    ));
                    return;
                }
                let Some(qualifier) = self.program.qualifier(decl) else {
                    return;
                };
                let params = qualifier.params.clone();
                let return_ty = qualifier.return_ty.clone();
                for (idx, (arg, (_, ty))) in args.iter().zip(params.iter()).enumerate() {
                    let where_ = format!("{} ('{}' argument {})", where_, decl, idx);
                    self.check_expr(arg, ty, ctx, &where_);
                }
                if return_ty != *expected {
                    self.errors.push(TypeError::mismatch(
                        format!("{} (return of '{}')", where_, decl),
                        expected,
                        &return_ty,
                    ));
                }
                if let Some(target) = write_to {
                    self.check_write_target(target, &return_ty, ctx, where_);
                }
            }
            Expr::Message(lit) => {
                match expected {
                    Type::Message(decl) if decl == &lit.decl => {}
                    _ => {
                        self.errors.push(TypeError::mismatch(
                            where_.to_string(),
                            expected,
                            format!("message literal '{}'", lit.decl),
                        ));
                        return;
                    }
                }
                let Some(decl) = self.program.message(&lit.decl) else {
                    return;
                };
                if decl.is_array {
                    self.errors.push(TypeError::mismatch(
                        where_.to_string(),
                        format!("an array literal of '{}'", lit.decl),
                        "an object literal",
                    ));
                    return;
                }
                let decl = decl.clone();
                self.check_field_inits(&decl, &lit.fields, ctx, where_);
            }
            Expr::Array { decl, elements } => {
                match expected {
                    Type::Message(expected_decl) if expected_decl == decl => {}
                    _ => {
                        self.errors.push(TypeError::mismatch(
                            where_.to_string(),
                            expected,
                            format!("array literal '{}'", decl),
                        ));
                        return;
                    }
                }
                let Some(message) = self.program.message(decl) else {
                    return;
                };
                if !message.is_array {
                    self.errors.push(TypeError::mismatch(
                        where_.to_string(),
                        format!("an object literal of '{}'", decl),
                        "an array literal",
                    ));
                    return;
                }
                let message = message.clone();
                for (idx, fields) in elements.iter().enumerate() {
                    let where_ = format!("{}, element {}", where_, idx);
                    self.check_field_inits(&message, fields, ctx, &where_);
                }
            }
        }
    }

    /// Checks the field assignments of one message literal against the
    /// declaration: known names, no duplicates, required presence, per-field
    /// types and multiplicities.
    fn check_field_inits(
        &mut self,
        decl: &MessageDecl,
        inits: &[FieldInit],
        ctx: &ExprCtx<'_>,
        where_: &str,
    ) {
        let mut assigned = HashSet::new();
        for init in inits {
            let where_ = format!("{}, field '{}'", where_, init.name);
            let Some(field) = decl.field(&init.name) else {
                self.errors.push(TypeError::new(format!(
                    "{}: no such field in '{}'",
                    where_, decl.name
                )));
                continue;
            };
            if !assigned.insert(init.name.clone()) {
                self.errors.push(TypeError::new(format!(
                    "{}: assigned more than once",
                    where_
                )));
                continue;
            }
            if field.multiplicity == Multiplicity::Repeated {
                self.check_repeated_field(field, &init.value, ctx, &where_);
            } else {
                self.check_expr(&init.value, &field.ty, ctx, &where_);
            }
        }
        for field in &decl.fields {
            if field.multiplicity == Multiplicity::Required && !assigned.contains(&field.name) {
                self.errors.push(TypeError::mismatch(
                    where_.to_string(),
                    format!("required field '{}'", field.name),
                    "absent",
                ));
            }
        }
    }

    /// A repeated field accepts an array literal of its message type.
    fn check_repeated_field(
        &mut self,
        field: &crate::program::Field,
        value: &Expr,
        ctx: &ExprCtx<'_>,
        where_: &str,
    ) {
        let Type::Message(element) = &field.ty else {
            self.errors.push(TypeError::mismatch(
                where_.to_string(),
                "a message-typed repeated field",
                format!("repeated {}", field.ty),
            ));
            return;
        };
        match value {
            Expr::Array { decl, elements } if decl == element => {
                let Some(message) = self.program.message(decl) else {
                    return;
                };
                let message = message.clone();
                for (idx, fields) in elements.iter().enumerate() {
                    let where_ = format!("{}, element {}", where_, idx);
                    self.check_field_inits(&message, fields, ctx, &where_);
                }
            }
            _ => {
                self.errors.push(TypeError::mismatch(
                    where_.to_string(),
                    format!("an array literal of '{}'", element),
                    describe_expr(value),
                ));
            }
        }
    }

    /// A qualifier write `-> var` targets only a transition local (or a
    /// forwarded `&` parameter inside an event body) of the value's type.
    fn check_write_target(&mut self, target: &str, ty: &Type, ctx: &ExprCtx<'_>, where_: &str) {
        match &ctx.lvalues {
            LvalueScope::Transition(transition) => {
                match transition.locals.iter().find(|(local, _)| local == target) {
                    Some((_, local_ty)) if local_ty == ty => {}
                    Some((_, local_ty)) => {
                        self.errors.push(TypeError::mismatch(
                            format!("{} (write to '{}')", where_, target),
                            ty,
                            local_ty,
                        ));
                    }
                    None => {
                        self.errors.push(TypeError::new(format!(
                            "{}: qualifier write targets unknown local '{}'",
                            where_, target
                        )));
                    }
                }
            }
            LvalueScope::Event(event) => {
                match event.params.iter().find(|p| p.name == target) {
                    Some(param) if param.by_ref && param.ty == *ty => {}
                    Some(param) if !param.by_ref => {
                        self.errors.push(TypeError::mismatch(
                            format!("{} (write to '{}')", where_, target),
                            "a reference parameter",
                            format!("by-value parameter '{}'", target),
                        ));
                    }
                    Some(param) => {
                        self.errors.push(TypeError::mismatch(
                            format!("{} (write to '{}')", where_, target),
                            ty,
                            &param.ty,
                        ));
                    }
                    None => {
                        self.errors.push(TypeError::new(format!(
                            "{}: qualifier write targets unknown name '{}'",
                            where_, target
                        )));
                    }
                }
            }
            LvalueScope::None => {
                self.errors.push(TypeError::new(format!(
                    "{}: qualifier write is not allowed here",
                    where_
                )));
            }
        }
    }
}

fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::Int,
        Literal::Bool(_) => Type::Bool,
        Literal::Str(_) => Type::Str,
    }
}

fn describe_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => format!("{} literal", lit.type_name()),
        Expr::Param(name) => format!("parameter '{}'", name),
        Expr::Local(name) => format!("local '{}'", name),
        Expr::Qualifier { decl, .. } => format!("qualifier call '{}'", decl),
        Expr::Message(lit) => format!("message literal '{}'", lit.decl),
        Expr::Array { decl, .. } => format!("array literal '{}'", decl),
    }
}

//! Name resolution and linking.
//!
//! The linker runs after every input file has been parsed. It works in two
//! phases: first every top-level name is registered under its module, then
//! every reference inside declaration bodies is resolved to a fully-qualified
//! `module::name` handle, producing the immutable [`Program`].
//!
//! Resolution of an unqualified name prefers the current module; a name found
//! in exactly one other module resolves there, and a name found in several is
//! ambiguous. A dotted reference `pkg.mod.name` is split at the last dot into
//! module path and local name.
//!
//! Constants are folded to literals here, with cycle detection. `external`
//! reference strings are recorded verbatim; binding them to callables is the
//! primitive registry's job at execution time. Cycles through composite event
//! bodies are allowed but flagged, since the executor bounds expansion depth.

use crate::ast::{self, ConstValue, Literal, Span, TypeName};
use crate::error::LinkError;
use crate::program::{self, fqn, EventBody, Program};
use std::collections::{HashMap, HashSet};

/// Links parsed source files into a [`Program`].
///
/// # Errors
///
/// Returns a [`LinkError`] for duplicate modules or names, undefined or
/// ambiguous references, arity mismatches, and cyclic constant definitions.
pub fn link(files: &[ast::SourceFile]) -> Result<Program, LinkError> {
    let mut linker = Linker::new(files);
    linker.register_all()?;
    linker.resolve_all()
}

/// Per-kind symbol tables: local name to the modules declaring it.
#[derive(Default)]
struct SymbolTable {
    consts: HashMap<String, Vec<String>>,
    states: HashMap<String, Vec<String>>,
    roles: HashMap<String, Vec<String>>,
    messages: HashMap<String, Vec<String>>,
    qualifiers: HashMap<String, Vec<String>>,
    events: HashMap<String, Vec<String>>,
    /// Transition declarations and bindings share the `transition` namespace
    transitions: HashMap<String, Vec<String>>,
}

struct Linker<'a> {
    files: &'a [ast::SourceFile],
    table: SymbolTable,
    /// Parameter counts per fully-qualified name, for arity checks
    state_arity: HashMap<String, usize>,
    event_arity: HashMap<String, usize>,
    qualifier_arity: HashMap<String, usize>,
    transition_arity: HashMap<String, usize>,
    /// AST constants by fully-qualified name, for folding
    ast_consts: HashMap<String, &'a ast::ConstDecl>,
}

/// Scope for resolving expressions inside a declaration body.
#[derive(Default)]
struct Scope<'a> {
    params: Vec<&'a str>,
    locals: Vec<&'a str>,
}

impl<'a> Linker<'a> {
    fn new(files: &'a [ast::SourceFile]) -> Self {
        Linker {
            files,
            table: SymbolTable::default(),
            state_arity: HashMap::new(),
            event_arity: HashMap::new(),
            qualifier_arity: HashMap::new(),
            transition_arity: HashMap::new(),
            ast_consts: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Phase 1: registration
    // -----------------------------------------------------------------------

    fn register_all(&mut self) -> Result<(), LinkError> {
        let mut seen_modules = HashSet::new();
        for file in self.files {
            if !seen_modules.insert(file.module.clone()) {
                return Err(LinkError::DuplicateModule {
                    name: file.module.clone(),
                });
            }
            for decl in &file.decls {
                self.register_decl(&file.module, decl)?;
            }
        }
        Ok(())
    }

    fn register_decl(&mut self, module: &str, decl: &'a ast::Decl) -> Result<(), LinkError> {
        match decl {
            ast::Decl::Const(d) => {
                register(&mut self.table.consts, module, "constant", &d.name)?;
                self.ast_consts.insert(fqn(module, &d.name), d);
            }
            ast::Decl::State(d) => {
                register(&mut self.table.states, module, "state", &d.name)?;
                self.state_arity.insert(fqn(module, &d.name), d.params.len());
                let mut seen = HashSet::new();
                for value in &d.values {
                    if !seen.insert(value.as_str()) {
                        return Err(LinkError::DuplicateName {
                            module: module.to_string(),
                            kind: "state value".to_string(),
                            name: value.clone(),
                        });
                    }
                }
            }
            ast::Decl::Role(d) => {
                register(&mut self.table.roles, module, "role", &d.name)?;
                let mut seen = HashSet::new();
                for field in &d.fields {
                    if !seen.insert(field.name.as_str()) {
                        return Err(LinkError::DuplicateName {
                            module: module.to_string(),
                            kind: "role field".to_string(),
                            name: field.name.clone(),
                        });
                    }
                }
            }
            ast::Decl::Message(d) => self.register_message(module, d)?,
            ast::Decl::Qualifier(d) => {
                register(&mut self.table.qualifiers, module, "qualifier", &d.name)?;
                self.qualifier_arity
                    .insert(fqn(module, &d.name), d.params.len());
            }
            ast::Decl::Event(d) => {
                register(&mut self.table.events, module, "event", &d.name)?;
                self.event_arity.insert(fqn(module, &d.name), d.params.len());
            }
            ast::Decl::Transition(d) => {
                register(&mut self.table.transitions, module, "transition", &d.name)?;
                self.transition_arity
                    .insert(fqn(module, &d.name), d.params.len());
            }
            ast::Decl::Binding(d) => {
                register(&mut self.table.transitions, module, "transition", &d.name)?;
            }
        }
        Ok(())
    }

    fn register_message(&mut self, module: &str, decl: &'a ast::MessageDecl) -> Result<(), LinkError> {
        register(&mut self.table.messages, module, "message", &decl.name)?;
        let mut seen = HashSet::new();
        for field in &decl.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(LinkError::DuplicateName {
                    module: module.to_string(),
                    kind: "message field".to_string(),
                    name: field.name.clone(),
                });
            }
        }
        for nested in &decl.nested {
            self.register_message(module, nested)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase 2: resolution
    // -----------------------------------------------------------------------

    fn resolve_all(&mut self) -> Result<Program, LinkError> {
        let mut folded = HashMap::new();
        let mut modules = Vec::with_capacity(self.files.len());
        for file in self.files {
            modules.push(self.resolve_module(file, &mut folded)?);
        }
        let mut program = Program { modules };
        flag_recursive_events(&mut program);
        Ok(program)
    }

    fn resolve_module(
        &self,
        file: &ast::SourceFile,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<program::Module, LinkError> {
        let module = &file.module;
        let mut out = program::Module {
            name: module.clone(),
            ..program::Module::default()
        };

        for decl in &file.decls {
            match decl {
                ast::Decl::Const(d) => {
                    let value =
                        self.fold_const(&fqn(module, &d.name), folded, &mut HashSet::new())?;
                    out.consts.push(program::Constant {
                        name: d.name.clone(),
                        ty: self.resolve_type(&d.ty, module, d.span)?,
                        value,
                    });
                }
                ast::Decl::State(d) => {
                    let params = d
                        .params
                        .iter()
                        .map(|ty| self.resolve_type(ty, module, d.span))
                        .collect::<Result<_, _>>()?;
                    out.states.push(program::StateDecl {
                        name: d.name.clone(),
                        params,
                        values: d.values.clone(),
                    });
                }
                ast::Decl::Role(d) => {
                    let fields = d
                        .fields
                        .iter()
                        .map(|f| {
                            Ok((f.name.clone(), self.resolve_type(&f.ty, module, f.span)?))
                        })
                        .collect::<Result<_, LinkError>>()?;
                    out.roles.push(program::RoleDecl {
                        name: d.name.clone(),
                        fields,
                    });
                }
                ast::Decl::Message(d) => self.resolve_message(d, module, &mut out.messages)?,
                ast::Decl::Qualifier(d) => {
                    let params = d
                        .params
                        .iter()
                        .map(|p| {
                            Ok((p.name.clone(), self.resolve_type(&p.ty, module, p.span)?))
                        })
                        .collect::<Result<_, LinkError>>()?;
                    out.qualifiers.push(program::QualifierDecl {
                        name: d.name.clone(),
                        return_ty: self.resolve_type(&d.return_ty, module, d.span)?,
                        params,
                        external: d.external.clone(),
                    });
                }
                ast::Decl::Event(d) => out.events.push(self.resolve_event(d, module, folded)?),
                ast::Decl::Transition(d) => {
                    out.transitions.push(self.resolve_transition(d, module, folded)?)
                }
                ast::Decl::Binding(d) => {
                    let decl_fqn =
                        self.resolve_name(&self.table.transitions, "transition", &d.target, module, d.span)?;
                    // A binding must target a declaration, not another binding
                    let expected = *self.transition_arity.get(&decl_fqn).ok_or_else(|| {
                        LinkError::Undefined {
                            kind: "transition declaration".to_string(),
                            name: d.target.clone(),
                            span: d.span,
                        }
                    })?;
                    if d.args.len() != expected {
                        return Err(LinkError::ArityMismatch {
                            name: decl_fqn,
                            expected,
                            got: d.args.len(),
                            span: d.span,
                        });
                    }
                    let scope = Scope::default();
                    let args = d
                        .args
                        .iter()
                        .map(|arg| self.resolve_expr(arg, module, &scope, folded))
                        .collect::<Result<_, _>>()?;
                    out.bindings.push(program::TransitionBinding {
                        name: d.name.clone(),
                        decl: decl_fqn,
                        args,
                    });
                }
            }
        }
        Ok(out)
    }

    fn resolve_message(
        &self,
        decl: &ast::MessageDecl,
        module: &str,
        out: &mut Vec<program::MessageDecl>,
    ) -> Result<(), LinkError> {
        let fields = decl
            .fields
            .iter()
            .map(|f| {
                Ok(program::Field {
                    name: f.name.clone(),
                    ty: self.resolve_type(&f.ty, module, f.span)?,
                    multiplicity: f.multiplicity,
                })
            })
            .collect::<Result<_, LinkError>>()?;
        out.push(program::MessageDecl {
            name: decl.name.clone(),
            is_array: decl.is_array,
            encoding: decl.encoding,
            external: decl.external.clone(),
            fields,
        });
        // Nested declarations are flattened into the module namespace
        for nested in &decl.nested {
            self.resolve_message(nested, module, out)?;
        }
        Ok(())
    }

    fn resolve_event(
        &self,
        decl: &ast::EventDecl,
        module: &str,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<program::EventDecl, LinkError> {
        check_unique_params(&decl.params, module)?;
        let params = decl
            .params
            .iter()
            .map(|p| {
                Ok(program::EventParam {
                    name: p.name.clone(),
                    ty: self.resolve_type(&p.ty, module, p.span)?,
                    by_ref: p.by_ref,
                })
            })
            .collect::<Result<Vec<_>, LinkError>>()?;

        let scope = Scope {
            params: decl.params.iter().map(|p| p.name.as_str()).collect(),
            locals: Vec::new(),
        };
        let body = match &decl.body {
            ast::EventBody::External(name) => EventBody::External(name.clone()),
            ast::EventBody::Composite { callee, args } => {
                let call = self.resolve_event_call(callee, args, module, &scope, folded, decl.span)?;
                EventBody::Composite(call)
            }
            ast::EventBody::NoOp => EventBody::NoOp,
        };

        Ok(program::EventDecl {
            name: decl.name.clone(),
            params,
            body,
            recursive: false,
        })
    }

    fn resolve_transition(
        &self,
        decl: &ast::TransitionDecl,
        module: &str,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<program::TransitionDecl, LinkError> {
        check_unique_params(&decl.params, module)?;
        let mut seen = decl
            .params
            .iter()
            .map(|p| p.name.as_str())
            .collect::<HashSet<_>>();
        for local in &decl.locals {
            if !seen.insert(local.name.as_str()) {
                return Err(LinkError::DuplicateName {
                    module: module.to_string(),
                    kind: "local variable".to_string(),
                    name: local.name.clone(),
                });
            }
        }

        let params = decl
            .params
            .iter()
            .map(|p| Ok((p.name.clone(), self.resolve_type(&p.ty, module, p.span)?)))
            .collect::<Result<_, LinkError>>()?;
        let locals = decl
            .locals
            .iter()
            .map(|l| Ok((l.name.clone(), self.resolve_type(&l.ty, module, l.span)?)))
            .collect::<Result<_, LinkError>>()?;

        let scope = Scope {
            params: decl.params.iter().map(|p| p.name.as_str()).collect(),
            locals: decl.locals.iter().map(|l| l.name.as_str()).collect(),
        };

        let pre_states = decl
            .pre_states
            .iter()
            .map(|entry| {
                Ok(program::PreState {
                    state: self.resolve_state_ref(&entry.state, module, &scope, folded)?,
                    values: entry.values.clone(),
                })
            })
            .collect::<Result<_, LinkError>>()?;

        let events = decl
            .events
            .iter()
            .map(|line| {
                Ok(program::EventStep {
                    source: self.resolve_name(&self.table.roles, "role", &line.source, module, line.span)?,
                    call: self.resolve_event_call(
                        &line.event,
                        &line.args,
                        module,
                        &scope,
                        folded,
                        line.span,
                    )?,
                    target: self.resolve_name(&self.table.roles, "role", &line.target, module, line.span)?,
                })
            })
            .collect::<Result<_, LinkError>>()?;

        let post_states = self.resolve_post_states(&decl.post_states, module, &scope, folded)?;
        let error_states = decl
            .error_states
            .as_ref()
            .map(|entries| self.resolve_post_states(entries, module, &scope, folded))
            .transpose()?;

        Ok(program::TransitionDecl {
            name: decl.name.clone(),
            params,
            locals,
            pre_states,
            events,
            post_states,
            error_states,
        })
    }

    fn resolve_post_states(
        &self,
        entries: &[ast::PostStateEntry],
        module: &str,
        scope: &Scope<'_>,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<Vec<program::PostState>, LinkError> {
        entries
            .iter()
            .map(|entry| {
                Ok(program::PostState {
                    state: self.resolve_state_ref(&entry.state, module, scope, folded)?,
                    value: entry.value.clone(),
                })
            })
            .collect()
    }

    fn resolve_state_ref(
        &self,
        state: &ast::StateRef,
        module: &str,
        scope: &Scope<'_>,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<program::StateRef, LinkError> {
        let decl = self.resolve_name(&self.table.states, "state", &state.name, module, state.span)?;
        let expected = self.state_arity[&decl];
        if state.args.len() != expected {
            return Err(LinkError::ArityMismatch {
                name: decl,
                expected,
                got: state.args.len(),
                span: state.span,
            });
        }
        let args = state
            .args
            .iter()
            .map(|arg| self.resolve_expr(arg, module, scope, folded))
            .collect::<Result<_, _>>()?;
        Ok(program::StateRef { decl, args })
    }

    fn resolve_event_call(
        &self,
        callee: &str,
        args: &[ast::Expr],
        module: &str,
        scope: &Scope<'_>,
        folded: &mut HashMap<String, Literal>,
        span: Span,
    ) -> Result<program::EventCall, LinkError> {
        let event = self.resolve_name(&self.table.events, "event", callee, module, span)?;
        let expected = self.event_arity[&event];
        if args.len() != expected {
            return Err(LinkError::ArityMismatch {
                name: event,
                expected,
                got: args.len(),
                span,
            });
        }
        let args = args
            .iter()
            .map(|arg| self.resolve_expr(arg, module, scope, folded))
            .collect::<Result<_, _>>()?;
        Ok(program::EventCall { event, args })
    }

    fn resolve_expr(
        &self,
        expr: &ast::Expr,
        module: &str,
        scope: &Scope<'_>,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<program::Expr, LinkError> {
        match expr {
            ast::Expr::Literal { value, .. } => Ok(program::Expr::Literal(value.clone())),
            ast::Expr::Name { name, span } => {
                if scope.params.iter().any(|p| *p == name) {
                    return Ok(program::Expr::Param(name.clone()));
                }
                if scope.locals.iter().any(|l| *l == name) {
                    return Ok(program::Expr::Local(name.clone()));
                }
                let const_fqn =
                    self.resolve_name(&self.table.consts, "constant", name, module, *span)?;
                let value = self.fold_const(&const_fqn, folded, &mut HashSet::new())?;
                Ok(program::Expr::Literal(value))
            }
            ast::Expr::Call {
                name,
                args,
                write_to,
                span,
            } => {
                let decl =
                    self.resolve_name(&self.table.qualifiers, "qualifier", name, module, *span)?;
                let expected = self.qualifier_arity[&decl];
                if args.len() != expected {
                    return Err(LinkError::ArityMismatch {
                        name: decl,
                        expected,
                        got: args.len(),
                        span: *span,
                    });
                }
                let args = args
                    .iter()
                    .map(|arg| self.resolve_expr(arg, module, scope, folded))
                    .collect::<Result<_, _>>()?;
                Ok(program::Expr::Qualifier {
                    decl,
                    args,
                    write_to: write_to.clone(),
                })
            }
            ast::Expr::MessageLit(lit) => Ok(program::Expr::Message(
                self.resolve_message_lit(lit, module, scope, folded)?,
            )),
            ast::Expr::ArrayLit {
                message,
                elements,
                span,
            } => {
                let decl =
                    self.resolve_name(&self.table.messages, "message", message, module, *span)?;
                let elements = elements
                    .iter()
                    .map(|fields| self.resolve_field_inits(fields, module, scope, folded))
                    .collect::<Result<_, _>>()?;
                Ok(program::Expr::Array { decl, elements })
            }
        }
    }

    fn resolve_message_lit(
        &self,
        lit: &ast::MessageLit,
        module: &str,
        scope: &Scope<'_>,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<program::MessageLit, LinkError> {
        let decl =
            self.resolve_name(&self.table.messages, "message", &lit.message, module, lit.span)?;
        let fields = self.resolve_field_inits(&lit.fields, module, scope, folded)?;
        Ok(program::MessageLit { decl, fields })
    }

    fn resolve_field_inits(
        &self,
        fields: &[ast::FieldInit],
        module: &str,
        scope: &Scope<'_>,
        folded: &mut HashMap<String, Literal>,
    ) -> Result<Vec<program::FieldInit>, LinkError> {
        fields
            .iter()
            .map(|init| {
                Ok(program::FieldInit {
                    name: init.name.clone(),
                    value: self.resolve_expr(&init.value, module, scope, folded)?,
                })
            })
            .collect()
    }

    fn resolve_type(
        &self,
        ty: &TypeName,
        module: &str,
        span: Span,
    ) -> Result<program::Type, LinkError> {
        match ty {
            TypeName::Int => Ok(program::Type::Int),
            TypeName::Bool => Ok(program::Type::Bool),
            TypeName::String => Ok(program::Type::Str),
            TypeName::Message(name) => {
                let decl = self.resolve_name(&self.table.messages, "message", name, module, span)?;
                Ok(program::Type::Message(decl))
            }
        }
    }

    /// Resolves a (possibly dotted) reference of one declaration kind.
    fn resolve_name(
        &self,
        map: &HashMap<String, Vec<String>>,
        kind: &str,
        name: &str,
        current: &str,
        span: Span,
    ) -> Result<String, LinkError> {
        if let Some((module_part, local)) = name.rsplit_once('.') {
            // Qualified: everything before the last dot is the module path
            if let Some(modules) = map.get(local) {
                if modules.iter().any(|m| m == module_part) {
                    return Ok(fqn(module_part, local));
                }
            }
            return Err(LinkError::Undefined {
                kind: kind.to_string(),
                name: name.to_string(),
                span,
            });
        }
        match map.get(name) {
            Some(modules) if modules.iter().any(|m| m == current) => Ok(fqn(current, name)),
            Some(modules) if modules.len() == 1 => Ok(fqn(&modules[0], name)),
            Some(modules) => Err(LinkError::Ambiguous {
                kind: kind.to_string(),
                name: name.to_string(),
                candidates: modules.iter().map(|m| fqn(m, name)).collect(),
                span,
            }),
            None => Err(LinkError::Undefined {
                kind: kind.to_string(),
                name: name.to_string(),
                span,
            }),
        }
    }

    /// Folds a constant to its literal value, detecting reference cycles.
    fn fold_const(
        &self,
        name: &str,
        folded: &mut HashMap<String, Literal>,
        visiting: &mut HashSet<String>,
    ) -> Result<Literal, LinkError> {
        if let Some(value) = folded.get(name) {
            return Ok(value.clone());
        }
        if !visiting.insert(name.to_string()) {
            return Err(LinkError::ConstCycle {
                name: name.to_string(),
            });
        }
        let decl = self.ast_consts.get(name).ok_or_else(|| LinkError::Undefined {
            kind: "constant".to_string(),
            name: name.to_string(),
            span: Span::default(),
        })?;
        let value = match &decl.value {
            ConstValue::Literal(lit) => lit.clone(),
            ConstValue::Ref(target) => {
                let module = program::split_fqn(name)
                    .map(|(m, _)| m)
                    .unwrap_or_default();
                let target_fqn =
                    self.resolve_name(&self.table.consts, "constant", target, module, decl.span)?;
                self.fold_const(&target_fqn, folded, visiting)?
            }
        };
        visiting.remove(name);
        folded.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

fn register(
    map: &mut HashMap<String, Vec<String>>,
    module: &str,
    kind: &str,
    name: &str,
) -> Result<(), LinkError> {
    let modules = map.entry(name.to_string()).or_default();
    if modules.iter().any(|m| m == module) {
        return Err(LinkError::DuplicateName {
            module: module.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
    modules.push(module.to_string());
    Ok(())
}

fn check_unique_params(params: &[ast::Param], module: &str) -> Result<(), LinkError> {
    let mut seen = HashSet::new();
    for param in params {
        if !seen.insert(param.name.as_str()) {
            return Err(LinkError::DuplicateName {
                module: module.to_string(),
                kind: "parameter".to_string(),
                name: param.name.clone(),
            });
        }
    }
    Ok(())
}

/// Marks events that participate in a composite-reference cycle.
///
/// Recursion through events is legal STL; the flag exists so tooling can
/// report it and the executor knows the depth bound is load-bearing.
fn flag_recursive_events(program: &mut Program) {
    // Collect composite edges: event -> callee
    let mut edges: HashMap<String, String> = HashMap::new();
    for module in &program.modules {
        for event in &module.events {
            if let EventBody::Composite(call) = &event.body {
                edges.insert(fqn(&module.name, &event.name), call.event.clone());
            }
        }
    }

    let mut on_cycle: HashSet<String> = HashSet::new();
    for start in edges.keys() {
        let mut path: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = start.as_str();
        loop {
            if !seen.insert(current) {
                // Found a cycle; everything from the first occurrence on is in it
                if let Some(pos) = path.iter().position(|n| *n == current) {
                    for name in &path[pos..] {
                        on_cycle.insert((*name).to_string());
                    }
                }
                break;
            }
            path.push(current);
            match edges.get(current) {
                Some(next) => current = next.as_str(),
                None => break,
            }
        }
    }

    for module in &mut program.modules {
        let module_name = module.name.clone();
        for event in &mut module.events {
            if on_cycle.contains(&fqn(&module_name, &event.name)) {
                event.recursive = true;
                log::warn!(
                    "event '{}' is recursive; expansion is bounded at runtime",
                    fqn(&module_name, &event.name)
                );
            }
        }
    }
}

//! Linker tests: resolution across modules, error cases, idempotence.

use pretty_assertions::assert_eq;
use stlang::error::LinkError;
use stlang::linker::link;
use stlang::parser::Parser;
use stlang::program::Program;

fn parse_and_link(sources: &[&str]) -> Result<Program, LinkError> {
    let files = sources
        .iter()
        .map(|source| {
            Parser::new(source)
                .parse_source_file()
                .expect("parse failed")
        })
        .collect::<Vec<_>>();
    link(&files)
}

// ============================================
// 1. Cross-module resolution
// ============================================

#[test]
fn test_cross_module_reference() {
    let program = parse_and_link(&[
        r#"
module common;
state sLink(int) { kUp, kDown }
role rPeer { string host; }
"#,
        r#"
module tls;
event ePing(int id) = external "stl.events.LogParams";
transition tPing(int id) {
  pre_states { sLink(id) = [kUp]; }
  events { common.rPeer -> ePing(id) -> common.rPeer; }
  post_states { sLink(id) = kDown; }
}
"#,
    ])
    .expect("link failed");

    let transition = program.transition("tls::tPing").expect("missing transition");
    // Unqualified reference resolved into the declaring module
    assert_eq!(transition.pre_states[0].state.decl, "common::sLink");
    // Qualified reference resolved at its last dot
    assert_eq!(transition.events[0].source, "common::rPeer");
}

#[test]
fn test_ambiguous_reference() {
    let err = parse_and_link(&[
        "module a; state sShared() { kX }",
        "module b; state sShared() { kX }",
        r#"
module c;
transition tUse() {
  pre_states { sShared() = [kX]; }
}
"#,
    ])
    .unwrap_err();
    match err {
        LinkError::Ambiguous { kind, candidates, .. } => {
            assert_eq!(kind, "state");
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected ambiguity, got {:?}", other),
    }
}

#[test]
fn test_current_module_wins_over_other_modules() {
    let program = parse_and_link(&[
        "module a; state sShared() { kX }",
        r#"
module b;
state sShared() { kX }
transition tUse() {
  pre_states { sShared() = [kX]; }
}
"#,
    ])
    .expect("link failed");
    let transition = program.transition("b::tUse").unwrap();
    assert_eq!(transition.pre_states[0].state.decl, "b::sShared");
}

#[test]
fn test_duplicate_module() {
    let err = parse_and_link(&["module tls;", "module tls;"]).unwrap_err();
    assert!(matches!(err, LinkError::DuplicateModule { .. }));
}

#[test]
fn test_duplicate_name_same_kind() {
    let err = parse_and_link(&[
        "module tls; state sFoo() { kA } state sFoo() { kB }",
    ])
    .unwrap_err();
    assert!(matches!(err, LinkError::DuplicateName { ref kind, .. } if kind == "state"));
}

#[test]
fn test_same_name_different_kinds_is_fine() {
    // Name uniqueness is per kind
    parse_and_link(&["module tls; state xShared() { kA } role xShared { string ip; }"])
        .expect("link failed");
}

// ============================================
// 2. Constants
// ============================================

#[test]
fn test_const_folding_through_references() {
    let program = parse_and_link(&[
        r#"
module tls;
const int kBase = 4433;
const int kAlias = kBase;
state sPort(int) { kOpen }
transition tOpen() {
  pre_states { sPort(kAlias) = [kOpen]; }
}
"#,
    ])
    .expect("link failed");
    let module = program.module("tls").unwrap();
    let alias = module.consts.iter().find(|c| c.name == "kAlias").unwrap();
    assert_eq!(alias.value, stlang::ast::Literal::Int(4433));
    // The reference in the state argument folded to a literal
    let transition = program.transition("tls::tOpen").unwrap();
    assert_eq!(
        transition.pre_states[0].state.args[0],
        stlang::program::Expr::Literal(stlang::ast::Literal::Int(4433))
    );
}

#[test]
fn test_const_cycle_detected() {
    let err = parse_and_link(&[
        "module tls; const int kA = kB; const int kB = kC; const int kC = kA;",
    ])
    .unwrap_err();
    assert!(matches!(err, LinkError::ConstCycle { .. }));
}

// ============================================
// 3. Arity
// ============================================

#[test]
fn test_event_arity_mismatch() {
    let err = parse_and_link(&[
        r#"
module tls;
role rA { string ip; }
role rB { string ip; }
event eSend(int a, int b) = external "x";
transition tBad() {
  events { rA -> eSend(1) -> rB; }
}
"#,
    ])
    .unwrap_err();
    assert!(matches!(err, LinkError::ArityMismatch { expected: 2, got: 1, .. }));
}

#[test]
fn test_binding_arity_mismatch() {
    let err = parse_and_link(&[
        r#"
module tls;
transition tDecl(int a) {
}
transition tBound = tDecl(1, 2);
"#,
    ])
    .unwrap_err();
    assert!(matches!(err, LinkError::ArityMismatch { expected: 1, got: 2, .. }));
}

#[test]
fn test_binding_must_target_declaration() {
    let err = parse_and_link(&[
        r#"
module tls;
transition tDecl() {
}
transition tFirst = tDecl();
transition tSecond = tFirst();
"#,
    ])
    .unwrap_err();
    assert!(matches!(err, LinkError::Undefined { ref kind, .. } if kind == "transition declaration"));
}

// ============================================
// 4. Events
// ============================================

#[test]
fn test_recursive_events_flagged_not_rejected() {
    let program = parse_and_link(&[
        r#"
module tls;
event ePing(int id) = ePong(id);
event ePong(int id) = ePing(id);
event eLeaf(int id) = external "x";
"#,
    ])
    .expect("recursive events must link");
    let module = program.module("tls").unwrap();
    assert!(module.events.iter().find(|e| e.name == "ePing").unwrap().recursive);
    assert!(module.events.iter().find(|e| e.name == "ePong").unwrap().recursive);
    assert!(!module.events.iter().find(|e| e.name == "eLeaf").unwrap().recursive);
}

#[test]
fn test_nested_messages_flattened_into_module() {
    let program = parse_and_link(&[
        r#"
module tls;
message mOuter {
  required mInner inner;
  message mInner {
    required int id;
  }
}
"#,
    ])
    .expect("link failed");
    assert!(program.message("tls::mOuter").is_some());
    assert!(program.message("tls::mInner").is_some());
    let outer = program.message("tls::mOuter").unwrap();
    assert_eq!(
        outer.fields[0].ty,
        stlang::program::Type::Message("tls::mInner".to_string())
    );
}

// ============================================
// 5. Idempotence
// ============================================

#[test]
fn test_linking_is_deterministic_and_idempotent() {
    let sources = [
        r#"
module tls;
const int kSession = 1;
state sTlsState(int) { kNotConnected, kConnected }
role rSender { string ipAddress; }
role rReceiver { string ipAddress; }
message mConnect { required int requestId; }
qualifier int qUniqueInt() = external "stl.qualifiers.UniqueInt";
event eConnect(mConnect msg) = external "stl.events.LogParams";
transition tConnect(int sessionId) {
  int requestId;
  pre_states { sTlsState(sessionId) = [kNotConnected]; }
  events { rSender -> eConnect(mConnect { requestId = qUniqueInt() -> requestId; }) -> rReceiver; }
  post_states { sTlsState(sessionId) = kConnected; }
}
transition tConnectActual = tConnect(kSession);
"#,
    ];
    let first = parse_and_link(&sources).expect("link failed");
    let second = parse_and_link(&sources).expect("link failed");
    assert_eq!(first, second);
}
